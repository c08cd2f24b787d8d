//! Tokio runtime for ndnfs-core: transport face, request pipeline and the
//! file consumer built on it.

pub mod config;
pub mod consumer;
pub mod face;
pub mod pipeline;

pub use consumer::{Consumer, ConsumerError, FileInfo};
pub use face::Face;
pub use pipeline::{Pipeline, PipelineHandle};
