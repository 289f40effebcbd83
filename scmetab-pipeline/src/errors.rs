use thiserror::Error;

/// Error type for configuration problems.
///
/// Configuration errors are fatal for the whole run and are surfaced before
/// any computation starts, unlike [`scmetab_core::errors::DataError`] which
/// only skips the affected job.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A rule expression references a column the metadata does not have.
    #[error("Rule `{rule}` references unknown column: {column}")]
    UnknownColumn { rule: String, column: String },

    /// A design references a subset name no rule defines.
    #[error("Design `{design}` references unknown subset: {subset}")]
    UnknownSubset { design: String, subset: String },

    /// A design lists fewer than two subsets.
    #[error("Design `{0}` needs at least two subset names")]
    ShortDesign(String),

    /// Two rules share a name within one rule set.
    #[error("Duplicate rule name: {0}")]
    DuplicateRule(String),

    /// A rule expression could not be parsed.
    #[error("Can't parse rule `{name}`: {reason}")]
    RuleParse { name: String, reason: String },

    /// The `Idents` mode was selected without naming an identity column.
    #[error("`{0} = \"Idents\"` requires `{0}_column` to name a metadata column")]
    IdentColumnUnset(String),

    /// The named identity column is absent from the metadata.
    #[error("Identity column `{0}` not found in metadata")]
    IdentColumnMissing(String),

    /// The `Input` mode was selected without supplying a partition file.
    #[error("`{0} = \"Input\"` requires an external partition file")]
    InputFileUnset(String),

    /// A configuration value has the wrong shape.
    #[error("Bad value for `{key}`: {reason}")]
    BadValue { key: String, reason: String },

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for configuration handling.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
