//! Error types for the setup tool.
//!
//! Provides a unified error handling system using thiserror.

mod types;

pub use types::*;
