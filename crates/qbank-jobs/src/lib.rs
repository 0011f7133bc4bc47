//! Job lifecycle tracking for uploads and document parsing.
//!
//! [`InMemoryJobTracker`] holds job snapshots; [`UploadParsePipeline`] is the worker that drives an
//! upload job to completion and chains a parse job onto it.

mod category;
mod memory;
mod parser;
mod pipeline;
mod trait_;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use category::InMemoryCategoryStore;
pub use memory::InMemoryJobTracker;
pub use parser::TextQuestionParser;
pub use pipeline::{PipelineError, UploadParsePipeline, UploadRequest};
pub use trait_::{JobQuery, JobTracker, Occupancy};

#[cfg(feature = "test-util")]
pub use mock::StaticParser;
