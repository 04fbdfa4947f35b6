//! Shared utilities.

pub mod filename;
pub mod process;
