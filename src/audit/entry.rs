//! Audit entry types.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::SetupError;
use crate::lifecycle::{ExecutionContext, StepOutcome};

/// A single audit log entry: one executed lifecycle step.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    /// RFC 3339 timestamp.
    pub timestamp: String,
    pub run_id: Uuid,
    /// Operation the step belongs to ("install", "uninstall").
    pub operation: String,
    pub step: String,
    pub result: AuditResult,
    pub duration_ms: u64,
}

/// Result of a step for audit purposes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditResult {
    Applied,
    Unchanged,
    Skipped { reason: String },
    Failure {
        error_code: String,
        error_message: String,
    },
}

impl AuditEntry {
    /// Entry for a step that returned an outcome.
    pub fn completed(
        ctx: &ExecutionContext,
        step: &str,
        outcome: &StepOutcome,
        duration_ms: u64,
    ) -> Self {
        let result = match outcome {
            StepOutcome::Applied => AuditResult::Applied,
            StepOutcome::Unchanged => AuditResult::Unchanged,
            StepOutcome::Skipped { reason } => AuditResult::Skipped {
                reason: reason.clone(),
            },
        };
        Self::new(ctx, step, result, duration_ms)
    }

    /// Entry for a step that failed.
    pub fn failed(ctx: &ExecutionContext, step: &str, error: &SetupError, duration_ms: u64) -> Self {
        let result = AuditResult::Failure {
            error_code: error.code().to_string(),
            error_message: error.to_string(),
        };
        Self::new(ctx, step, result, duration_ms)
    }

    fn new(ctx: &ExecutionContext, step: &str, result: AuditResult, duration_ms: u64) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            run_id: ctx.run_id,
            operation: ctx.operation.clone(),
            step: step.to_string(),
            result,
            duration_ms,
        }
    }
}
