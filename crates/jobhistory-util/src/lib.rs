//! Shared utilities for jobhistory.
//!
//! This crate provides common utilities used across the jobhistory workspace:
//! - Logging setup with tracing
//! - Path utilities for locating and validating history directories

pub mod log;
pub mod path;

pub use log::{LogConfig, LogLevel};
