//! Remote configuration primitives. Each returns a TaskResult instead of
//! an error so the calling task can decide what runs next.

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;

use crate::junos::ConfigSession;
use crate::models::{DataFormat, ResolvedHost, Severity, TaskResult};
use crate::templates::TemplateRenderer;

pub const CONFIG: &str = "junos_config";
pub const DIFF: &str = "junos_diff";
pub const COMMIT: &str = "junos_commit";
pub const ROLLBACK: &str = "junos_rollback";

/// Render a template and load it into the locked candidate.
/// The result carries the rendered configuration.
pub fn junos_config(
    session: &mut dyn ConfigSession,
    host: &ResolvedHost,
    renderer: &TemplateRenderer,
    template_path: &str,
    vars: &HashMap<String, Value>,
    format: DataFormat,
    severity: Severity,
) -> TaskResult {
    match push(session, renderer, template_path, vars, format) {
        Ok(config) => {
            tracing::debug!("{}: loaded {} lines from {}", host.name, config.lines().count(), template_path);
            TaskResult::new(&host.name, CONFIG)
                .with_result(config)
                .with_severity(severity)
        }
        Err(e) => {
            tracing::warn!("{}: configuration push failed: {:#}", host.name, e);
            TaskResult::failure(&host.name, CONFIG, &e)
        }
    }
}

fn push(
    session: &mut dyn ConfigSession,
    renderer: &TemplateRenderer,
    template_path: &str,
    vars: &HashMap<String, Value>,
    format: DataFormat,
) -> Result<String> {
    // Render first so a bad template never takes the lock
    let config = renderer.render_file(template_path, vars)?;
    session.lock().context("Failed to lock candidate configuration")?;

    if let Err(e) = session.load(&config, format) {
        // A partial load must not linger in the candidate
        if let Err(rb) = session.rollback() {
            tracing::warn!("Rollback after failed load also failed: {}", rb);
        }
        return Err(e.context(format!("Failed to load {} configuration", format)));
    }
    Ok(config)
}

/// Fetch pending candidate changes. Reading a diff never marks the result changed.
pub fn junos_diff(session: &mut dyn ConfigSession, host: &ResolvedHost) -> TaskResult {
    match session.diff() {
        Ok(Some(diff)) => TaskResult::new(&host.name, DIFF)
            .with_result(diff.clone())
            .with_diff(Some(diff)),
        Ok(None) => TaskResult::new(&host.name, DIFF).with_diff(None),
        Err(e) => TaskResult::failure(&host.name, DIFF, &e.context("Failed to fetch diff")),
    }
}

pub fn junos_commit(
    session: &mut dyn ConfigSession,
    host: &ResolvedHost,
    comment: Option<&str>,
) -> TaskResult {
    match session.commit(comment) {
        Ok(()) => {
            tracing::info!("{}: configuration committed", host.name);
            TaskResult::new(&host.name, COMMIT)
                .with_result("commit complete")
                .with_changed(true)
        }
        Err(e) => TaskResult::failure(&host.name, COMMIT, &e.context("Commit failed")),
    }
}

pub fn junos_rollback(session: &mut dyn ConfigSession, host: &ResolvedHost, reason: &str) -> TaskResult {
    match session.rollback() {
        Ok(()) => TaskResult::new(&host.name, ROLLBACK)
            .with_result(format!("candidate changes discarded ({})", reason)),
        Err(e) => TaskResult::failure(&host.name, ROLLBACK, &e.context("Rollback failed")),
    }
}
