//! Tera template engine wrapper.

use std::path::Path;

use tera::{Context, Tera};
use tracing::{debug, info};

use crate::error::SetupError;

/// Name of the service unit template.
pub const UNIT_TEMPLATE: &str = "unit.service.tera";

const BUILTIN_UNIT_TEMPLATE: &str = r#"[Unit]
Description={{ description }}
After={{ after }}

[Service]
Type=simple
ExecStart={{ exec_start }}
WorkingDirectory={{ working_directory }}
{% for entry in environment %}Environment="{{ entry }}"
{% endfor %}Restart={{ restart }}
RestartSec={{ restart_sec }}
User={{ user }}

[Install]
WantedBy={{ wanted_by }}
"#;

/// Template engine for rendering unit files.
#[derive(Clone)]
pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    /// Engine holding only the built-in templates.
    pub fn builtin() -> Result<Self, SetupError> {
        let mut tera = Tera::default();
        register_builtins(&mut tera)?;
        Ok(Self { tera })
    }

    /// Load `*.tera` templates from `template_dir`.
    ///
    /// Built-in templates fill in anything the directory does not provide.
    pub fn new(template_dir: &Path) -> Result<Self, SetupError> {
        let pattern = template_dir.join("**/*.tera");
        let pattern_str = pattern.to_string_lossy();

        debug!(pattern = %pattern_str, "Loading templates");

        let tera = Tera::new(&pattern_str).map_err(|e| SetupError::Template {
            message: format!(
                "Failed to load templates from '{}': {}",
                template_dir.display(),
                e
            ),
        })?;

        let mut engine = Self { tera };
        let overridden = engine.has_template(UNIT_TEMPLATE);
        if !overridden {
            register_builtins(&mut engine.tera)?;
        }

        info!(
            directory = %template_dir.display(),
            count = engine.tera.get_template_names().count(),
            unit_template_overridden = overridden,
            "Template engine initialized"
        );

        Ok(engine)
    }

    /// Render a template with a JSON context.
    pub fn render(
        &self,
        template_name: &str,
        context: &serde_json::Value,
    ) -> Result<String, SetupError> {
        let tera_context = Context::from_serialize(context).map_err(|e| SetupError::Template {
            message: format!("Invalid template context: {}", e),
        })?;

        self.tera
            .render(template_name, &tera_context)
            .map_err(|e| SetupError::Template {
                message: format!("Failed to render template '{}': {}", template_name, e),
            })
    }

    /// Check if a template exists.
    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|n| n == name)
    }
}

fn register_builtins(tera: &mut Tera) -> Result<(), SetupError> {
    tera.add_raw_template(UNIT_TEMPLATE, BUILTIN_UNIT_TEMPLATE)
        .map_err(|e| SetupError::Template {
            message: format!("Built-in template '{}' is invalid: {}", UNIT_TEMPLATE, e),
        })
}
