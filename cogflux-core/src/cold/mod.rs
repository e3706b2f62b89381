//! Cold memory: pointers into an immutable external archive
//!
//! The archive itself is a collaborator reached through
//! [`ColdArchiveService`]; this crate only keeps [`ColdReference`]s to it.

mod index;
mod reference;
mod service;

pub use index::ColdReferenceIndex;
pub use reference::{ArchiveEntry, ArchiveReceipt, ColdEntryType, ColdReference};
pub use service::{ColdArchiveService, HttpColdArchive, InMemoryColdArchive};
