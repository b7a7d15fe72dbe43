//! Command executor module.
//!
//! Handles subprocess spawning, execution timeouts and the process
//! invocation seam used by the managers.

mod output;
mod runner;
mod subprocess;

pub use output::sanitize_output;
pub use runner::{ProcessRunner, SystemRunner};
pub use subprocess::{SubprocessBuilder, SubprocessResult};
