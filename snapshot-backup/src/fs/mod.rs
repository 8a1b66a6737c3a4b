//! Filesystem traversal and metadata.

pub mod metadata;
pub mod walker;
