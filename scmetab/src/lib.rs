//! Umbrella crate re-exporting the scmetab member crates behind feature
//! flags. Enable `core`, `io` or `pipeline` as needed; the `scmetab` binary
//! lives in `scmetab-cli`.

#[cfg(feature = "core")]
pub use scmetab_core as core;

#[cfg(feature = "io")]
pub use scmetab_io as io;

#[cfg(feature = "pipeline")]
pub use scmetab_pipeline as pipeline;
