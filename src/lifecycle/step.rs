//! Lifecycle steps and their outcomes.

use std::fmt;
use std::time::Instant;

use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::audit::{AuditEntry, AuditLogger};
use crate::error::{SetupError, SetupResult};

/// What a step did to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Host state was changed.
    Applied,
    /// Host was already in the desired state; nothing was changed.
    Unchanged,
    /// A best-effort step failed and was tolerated.
    Skipped { reason: String },
}

impl StepOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, StepOutcome::Applied)
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Applied => write!(f, "applied"),
            StepOutcome::Unchanged => write!(f, "unchanged"),
            StepOutcome::Skipped { reason } => write!(f, "skipped ({})", reason),
        }
    }
}

/// One idempotent (check-state, apply-if-needed) unit of work.
///
/// Steps re-derive the host state they care about every time they run.
pub trait Step {
    /// Stable step identifier (e.g., "unit.enable", "module.load").
    fn name(&self) -> &'static str;

    /// Bring the host into this step's desired state.
    fn execute(&self) -> SetupResult<StepOutcome>;
}

/// A step backed by a closure.
pub struct FnStep<'a> {
    name: &'static str,
    action: Box<dyn Fn() -> SetupResult<StepOutcome> + 'a>,
}

impl<'a> FnStep<'a> {
    pub fn new(name: &'static str, action: impl Fn() -> SetupResult<StepOutcome> + 'a) -> Self {
        Self {
            name,
            action: Box::new(action),
        }
    }

    /// Boxed, ready to push onto a plan.
    pub fn boxed(
        name: &'static str,
        action: impl Fn() -> SetupResult<StepOutcome> + 'a,
    ) -> Box<dyn Step + 'a> {
        Box::new(Self::new(name, action))
    }
}

impl Step for FnStep<'_> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn execute(&self) -> SetupResult<StepOutcome> {
        (self.action)()
    }
}

/// Ordered list of steps for one operation.
pub type Plan<'a> = Vec<Box<dyn Step + 'a>>;

/// Metadata for one lifecycle run.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// Correlates log lines and audit entries of a single run.
    pub run_id: Uuid,
    /// "install", "uninstall", ...
    pub operation: String,
}

impl ExecutionContext {
    pub fn new(operation: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            operation: operation.to_string(),
        }
    }
}

/// Result row for one executed step.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: String,
    #[serde(flatten)]
    pub outcome: StepOutcome,
    pub duration_ms: u64,
}

/// Everything a completed operation did, in order.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub run_id: Uuid,
    pub operation: String,
    pub steps: Vec<StepRecord>,
}

impl Report {
    fn new(ctx: &ExecutionContext) -> Self {
        Self {
            run_id: ctx.run_id,
            operation: ctx.operation.clone(),
            steps: Vec::new(),
        }
    }

    /// Whether any step changed host state.
    pub fn changed(&self) -> bool {
        self.steps.iter().any(|s| s.outcome.is_applied())
    }

    /// Outcome of the named step, if it ran.
    pub fn outcome(&self, step: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.step == step).map(|s| &s.outcome)
    }
}

/// Run `plan` in order, stopping at the first error.
///
/// Every executed step is logged and, when `audit` is set, recorded in
/// the audit log. The failing step's name is attached to the error.
pub fn run_plan(
    ctx: &ExecutionContext,
    plan: Plan<'_>,
    audit: Option<&AuditLogger>,
) -> SetupResult<Report> {
    let mut report = Report::new(ctx);

    for step in plan {
        let name = step.name();
        let started = Instant::now();
        let result = step.execute();
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(outcome) => {
                match &outcome {
                    StepOutcome::Skipped { reason } => warn!(
                        run_id = %ctx.run_id,
                        step = name,
                        reason = %reason,
                        "Step skipped"
                    ),
                    _ => info!(
                        run_id = %ctx.run_id,
                        step = name,
                        outcome = %outcome,
                        duration_ms,
                        "Step completed"
                    ),
                }
                record(audit, AuditEntry::completed(ctx, name, &outcome, duration_ms));
                report.steps.push(StepRecord {
                    step: name.to_string(),
                    outcome,
                    duration_ms,
                });
            }
            Err(e) => {
                error!(
                    run_id = %ctx.run_id,
                    step = name,
                    code = e.code(),
                    error = %e,
                    "Step failed, aborting"
                );
                record(audit, AuditEntry::failed(ctx, name, &e, duration_ms));
                return Err(e.in_step(name));
            }
        }
    }

    Ok(report)
}

fn record(audit: Option<&AuditLogger>, entry: AuditEntry) {
    if let Some(logger) = audit {
        if let Err(e) = logger.log(&entry) {
            warn!(error = %e, "Failed to write audit entry");
        }
    }
}

/// Map a failure to `Skipped` when the step is best-effort for that error.
pub fn tolerate(
    result: SetupResult<StepOutcome>,
    tolerated: impl Fn(&SetupError) -> bool,
) -> SetupResult<StepOutcome> {
    match result {
        Err(e) if tolerated(&e) => Ok(StepOutcome::Skipped {
            reason: e.to_string(),
        }),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_plan_runs_in_order() {
        let seen = RefCell::new(Vec::new());
        let plan: Plan<'_> = vec![
            FnStep::boxed("a", || {
                seen.borrow_mut().push("a");
                Ok(StepOutcome::Applied)
            }),
            FnStep::boxed("b", || {
                seen.borrow_mut().push("b");
                Ok(StepOutcome::Unchanged)
            }),
        ];

        let report = run_plan(&ExecutionContext::new("install"), plan, None).unwrap();
        assert_eq!(*seen.borrow(), vec!["a", "b"]);
        assert_eq!(report.steps.len(), 2);
        assert!(report.changed());
        assert_eq!(report.outcome("b"), Some(&StepOutcome::Unchanged));
    }

    #[test]
    fn test_plan_aborts_at_first_error() {
        let ran_last = RefCell::new(false);
        let plan: Plan<'_> = vec![
            FnStep::boxed("first", || Ok(StepOutcome::Applied)),
            FnStep::boxed("broken", || {
                Err(SetupError::Config {
                    message: "boom".to_string(),
                })
            }),
            FnStep::boxed("last", || {
                *ran_last.borrow_mut() = true;
                Ok(StepOutcome::Applied)
            }),
        ];

        let err = run_plan(&ExecutionContext::new("install"), plan, None).unwrap_err();
        assert!(matches!(err, SetupError::StepFailed { ref step, .. } if step == "broken"));
        assert!(!*ran_last.borrow());
    }

    #[test]
    fn test_tolerate_maps_selected_errors() {
        let load_error = || {
            Err(SetupError::ModuleLoad {
                module: "gpio_ts".to_string(),
                message: "exit 1".to_string(),
            })
        };

        let tolerated = tolerate(load_error(), |e| matches!(e, SetupError::ModuleLoad { .. }));
        assert!(matches!(tolerated, Ok(StepOutcome::Skipped { .. })));

        let fatal = tolerate(load_error(), |_| false);
        assert!(fatal.is_err());
    }

    #[test]
    fn test_outcome_serialization() {
        let record = StepRecord {
            step: "module.load".to_string(),
            outcome: StepOutcome::Skipped {
                reason: "no module".to_string(),
            },
            duration_ms: 3,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["step"], "module.load");
        assert_eq!(json["result"], "skipped");
        assert_eq!(json["reason"], "no module");
    }
}
