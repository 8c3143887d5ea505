//! Acquisition-and-merge pipeline for drivemerge.
//!
//! Each requested name becomes an [`ItemStatus`] that moves through
//! `pending → searching → found → downloading → downloaded`, or ends early
//! in `not-found` or `error`. Downloaded items are merged in request order
//! and the result handed to an exporter.

pub mod pipeline;
pub mod state;

pub use pipeline::{Pipeline, PipelineConfig, RunReport};
pub use state::{count_by_state, ItemState, ItemStatus};
