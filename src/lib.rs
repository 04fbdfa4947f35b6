//! mediagrab: a job-supervision web service around yt-dlp.
//!
//! The core is a job lifecycle layer: an in-memory registry of download
//! jobs, each owning at most one live yt-dlp subprocess, a supervisor that
//! parses the worker's progress output into structured events, and a per-job
//! broadcast channel that fans those events out to HTTP observers.

pub mod api;
pub mod config;
pub mod error;
pub mod extractor;
pub mod jobs;
pub mod logging;
pub mod utils;

pub use error::{Error, Result};
