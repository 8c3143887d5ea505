//! PDF handling for drivemerge.
//!
//! - [`merge`]: concatenates the pages of several PDFs, in order, into one
//! - [`LocalExporter`]: writes the result into a local directory

pub mod export;
pub mod merge;

pub use export::{Exporter, LocalExporter};
pub use merge::{merge, page_count};
