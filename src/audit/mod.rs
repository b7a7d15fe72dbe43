//! Audit logging module.
//!
//! Records every executed lifecycle step, with its outcome and timing, as
//! a JSON line. Disabled unless `[audit] enabled = true`.

mod entry;
mod logger;

pub use entry::{AuditEntry, AuditResult};
pub use logger::AuditLogger;
