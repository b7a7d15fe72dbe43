//! Template rendering for generated configuration files.

mod engine;

pub use engine::{TemplateEngine, UNIT_TEMPLATE};
