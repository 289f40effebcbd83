use thiserror::Error;

/// Error type for data-level failures.
///
/// A `DataError` is fatal for the subset or design it occurred in, not for
/// the whole run: the batch runner records it as a skipped job and keeps
/// going with the sibling jobs.
#[derive(Error, Debug)]
pub enum DataError {
    /// A required column is absent from a table.
    #[error("Required column `{0}` is missing")]
    MissingColumn(String),

    /// The same cell identifier appeared twice in a metadata table.
    #[error("Duplicate cell identifier: {0}")]
    DuplicateCell(String),

    /// A metadata row does not have one field per column.
    #[error("Row for cell `{cell}` has {found} fields, expected {expected}")]
    RowWidth {
        cell: String,
        expected: usize,
        found: usize,
    },

    /// A cell identifier was referenced that no loaded table knows about.
    #[error("Unknown cell identifier: {0}")]
    UnknownCell(String),

    /// A subset resolved to zero cells.
    #[error("Subset `{0}` resolved to zero cells")]
    EmptySubset(String),

    /// Every group inside a subset resolved to zero cells.
    #[error("Subset `{0}` has no non-empty groups")]
    NoGroups(String),

    /// Matrix dimensions disagree with the named axes.
    #[error("Matrix is {rows}x{cols} but axes name {genes} genes and {cells} cells")]
    ShapeMismatch {
        rows: usize,
        cols: usize,
        genes: usize,
        cells: usize,
    },

    /// Expression matrices being merged do not share a feature list.
    #[error("Sample `{0}` has a different feature list than the first sample")]
    FeatureMismatch(String),

    /// A line in an input file could not be parsed.
    #[error("Malformed line {line} in {path}: {reason}")]
    MalformedLine {
        path: String,
        line: usize,
        reason: String,
    },

    /// An expected expression input file is absent.
    #[error("Missing expression input `{name}` under {dir}")]
    MissingFile { dir: String, name: String },

    /// No gene set survived filtering against the expression matrix.
    #[error("No gene set overlaps the expression matrix after filtering")]
    EmptyGeneSets,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type alias for data-level operations.
pub type DataResult<T> = std::result::Result<T, DataError>;
