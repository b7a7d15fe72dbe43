//! Process invocation seam.
//!
//! Managers talk to systemctl and modprobe through [`ProcessRunner`] so the
//! lifecycle can be exercised against a fake host. Callers classify the
//! returned exit status themselves.

use std::time::Duration;

use crate::error::SetupError;

use super::subprocess::{SubprocessBuilder, SubprocessResult};

/// Runs one external program to completion.
pub trait ProcessRunner: Send + Sync {
    /// Run `program` with `args`, capturing exit status and output.
    ///
    /// A non-zero exit is *not* an error here; only failing to run the
    /// program at all is.
    fn run(&self, program: &str, args: &[&str]) -> Result<SubprocessResult, SetupError>;
}

/// Runs programs on the local host.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
}

impl SystemRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<SubprocessResult, SetupError> {
        // Stable, untranslated tool output
        SubprocessBuilder::new(program)
            .args(args.iter().copied())
            .env("LC_ALL", "C")
            .timeout(self.timeout)
            .run()
    }
}
