pub mod config;
pub mod dataset;
pub mod engine;
pub mod entry;
pub mod errors;
pub mod external_sort;
pub mod geometry;
pub mod grid;
pub mod hilbert;
#[cfg(feature = "setup_tracing")]
mod logging;
pub mod objects;
pub mod pairs;
pub mod pbsm;
pub mod report;
pub mod s3;
pub mod sweep;
pub mod touch;
pub mod tree;
