//! Framefx Common Utilities
//!
//! Shared infrastructure for all framefx crates:
//! - Error types and result aliases
//! - Presentation-time helpers
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
