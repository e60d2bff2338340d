pub mod junos;

use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;

use crate::junos::{ConfigSession, Connector};
use crate::models::{DataFormat, MultiResult, ResolvedHost, Severity, TaskResult};
use crate::templates::TemplateRenderer;

/// Options shared by every task in one invocation
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Fetch the diff, then discard instead of committing
    pub dry_run: bool,
    pub comment: Option<String>,
}

/// ConfigTask pushes one inventory attribute through one template.
/// Address-book and security-policy deployment differ only in key and template.
#[derive(Debug, Clone)]
pub struct ConfigTask {
    pub name: String,
    /// Banner printed before the task runs
    pub description: String,
    /// Inventory attribute handed to the template
    pub key: String,
    pub template: String,
    pub format: DataFormat,
}

impl ConfigTask {
    pub fn addressbook() -> Self {
        Self {
            name: "configure_addressbook".to_string(),
            description: "Configuring our address book now".to_string(),
            key: "addressbook".to_string(),
            template: "templates/addressbook.j2".to_string(),
            format: DataFormat::Set,
        }
    }

    pub fn policies() -> Self {
        Self {
            name: "configure_policies".to_string(),
            description: "Configuring our security policies now".to_string(),
            key: "secpolicies".to_string(),
            template: "templates/policies.j2".to_string(),
            format: DataFormat::Set,
        }
    }

    /// Template variables for one host: just `{key: host[key]}`
    pub fn data(&self, host: &ResolvedHost) -> Result<HashMap<String, Value>> {
        let value = host.get(&self.key)?;
        Ok(HashMap::from([(self.key.clone(), value.clone())]))
    }

    /// Push, diff, then commit when a diff exists. Always closes the session.
    pub fn run(
        &self,
        host: &ResolvedHost,
        connector: &dyn Connector,
        renderer: &TemplateRenderer,
        options: &RunOptions,
    ) -> MultiResult {
        let mut multi = MultiResult::new(&self.name);

        let data = match self.data(host) {
            Ok(data) => data,
            Err(e) => {
                multi.set_parent(TaskResult::failure(&host.name, &self.name, &e));
                return multi;
            }
        };
        crate::output::print_data(&host.name, &data);

        let mut session = match connector.connect(host) {
            Ok(session) => session,
            Err(e) => {
                multi.set_parent(TaskResult::failure(&host.name, &self.name, &e));
                return multi;
            }
        };

        let committed = self.apply(session.as_mut(), host, renderer, options, &data, &mut multi);
        session.close();

        let parent = match multi.iter().find(|r| r.failed) {
            Some(failed) => TaskResult::failure(
                &host.name,
                &self.name,
                &anyhow::anyhow!("subtask {} failed", failed.name),
            ),
            None => TaskResult::new(&host.name, &self.name)
                .with_changed(committed)
                .with_result(summary(
                    committed,
                    multi.iter().any(|r| r.diff.is_some()),
                    options.dry_run,
                )),
        };
        multi.set_parent(parent);
        multi
    }

    /// Returns true when a commit happened
    fn apply(
        &self,
        session: &mut dyn ConfigSession,
        host: &ResolvedHost,
        renderer: &TemplateRenderer,
        options: &RunOptions,
        data: &HashMap<String, Value>,
        multi: &mut MultiResult,
    ) -> bool {
        let push = junos::junos_config(
            session,
            host,
            renderer,
            &self.template,
            data,
            self.format,
            Severity::Debug,
        );
        let pushed = push.is_ok();
        multi.push(push);
        if !pushed {
            return false;
        }

        let diff = junos::junos_diff(session, host);
        let diff_ok = diff.is_ok();
        let pending = diff.diff.clone();
        multi.push(diff);
        if !diff_ok {
            multi.push(
                junos::junos_rollback(session, host, "diff failed").with_severity(Severity::Warning),
            );
            return false;
        }

        match pending {
            None => {
                tracing::info!("{}: {} produced no changes", host.name, self.name);
                false
            }
            Some(_) if options.dry_run => {
                multi.push(junos::junos_rollback(session, host, "dry run"));
                false
            }
            Some(_) => {
                let comment = options
                    .comment
                    .clone()
                    .unwrap_or_else(|| format!("junos-push {}", self.name));
                let commit = junos::junos_commit(session, host, Some(&comment));
                let committed = commit.is_ok();
                multi.push(commit);
                if !committed {
                    multi.push(
                        junos::junos_rollback(session, host, "commit failed")
                            .with_severity(Severity::Warning),
                    );
                }
                committed
            }
        }
    }
}

fn summary(committed: bool, had_diff: bool, dry_run: bool) -> &'static str {
    match (committed, had_diff, dry_run) {
        (true, _, _) => "changes committed",
        (false, true, true) => "dry run: changes not committed",
        _ => "no changes",
    }
}
