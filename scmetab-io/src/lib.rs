pub mod gmt;
pub mod group_file;
pub mod matrix;
pub mod metadata;
pub mod sample_sheet;

// re-exports
pub use gmt::*;
pub use group_file::*;
pub use matrix::*;
pub use metadata::*;
pub use sample_sheet::*;
