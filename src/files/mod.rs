//! Filesystem helpers shared by the unit and module managers.

mod delete;
mod write;

pub use delete::remove_if_exists;
pub use write::{read_optional, write_atomic, write_if_changed, WriteOutcome};
