//! Archiving: moving a full hot memory into warm and cold storage

mod pipeline;
mod retry;

pub use pipeline::{ArchiveOutcome, ArchivePipeline, ArchiveReport};
pub use retry::{RetryPolicy, with_retry};
