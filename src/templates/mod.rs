use anyhow::{Context as _, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tera::{Context, Tera};

/// Renders configuration templates from a base directory
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    base_dir: PathBuf,
}

impl TemplateRenderer {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Read `template_path` (relative to the base directory) and render it with `vars`
    pub fn render_file(&self, template_path: &str, vars: &HashMap<String, Value>) -> Result<String> {
        let path = self.base_dir.join(template_path);
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read template {}", path.display()))?;
        render_str(template_path, &content, vars)
    }
}

/// Render template text with a variables map. Each top-level key becomes
/// a template variable, so `{"addressbook": [...]}` is used as `{% for entry in addressbook %}`.
pub fn render_str(name: &str, content: &str, vars: &HashMap<String, Value>) -> Result<String> {
    let mut tera = Tera::default();
    tera.add_raw_template(name, content)
        .map_err(|e| anyhow::anyhow!("Invalid template {}: {}", name, e))?;

    let mut context = Context::new();
    for (key, value) in vars {
        context.insert(key.as_str(), value);
    }

    let rendered = tera
        .render(name, &context)
        .map_err(|e| anyhow::anyhow!("Template rendering failed for {}: {}", name, describe(&e)))?;

    Ok(strip_blank_lines(&rendered))
}

/// tera nests the useful cause (e.g. a missing variable) under a generic message
fn describe(err: &tera::Error) -> String {
    let mut msg = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}

/// Loop tags leave empty lines behind; the device doesn't need them
fn strip_blank_lines(rendered: &str) -> String {
    rendered
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
