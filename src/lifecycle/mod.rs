//! Lifecycle orchestration.
//!
//! `install` runs the module steps then the unit steps; `uninstall` runs
//! the unit steps then the module steps. Each step checks the live host
//! state before changing it, so both operations can be repeated safely.
//!
//! Concurrent invocations are not guarded against; callers are expected
//! to run one operation at a time.

mod manager;
mod status;
mod step;

pub use manager::Lifecycle;
pub use status::{LifecycleState, LifecycleStatus};
pub use step::{
    run_plan, tolerate, ExecutionContext, FnStep, Plan, Report, Step, StepOutcome, StepRecord,
};
