//! Utility modules for the snapshot engine.

pub mod errors;
pub mod logger;
pub mod paths;

pub use errors::{Result, SnapshotError};
