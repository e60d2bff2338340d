use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::inventory::Inventory;
use crate::models::{AggregatedResult, MultiResult, ResolvedHost, TaskResult};

/// Runner executes a task against every inventory host, at most
/// `num_workers` at a time. Task bodies block (SSH), so each runs
/// on the blocking thread pool.
pub struct Runner {
    inventory: Arc<Inventory>,
    num_workers: usize,
}

impl Runner {
    pub fn new(inventory: Arc<Inventory>, num_workers: usize) -> Self {
        Self {
            inventory,
            num_workers: num_workers.max(1),
        }
    }

    /// Run `task` for each host and collect the per-host results.
    /// A failing or panicking host never affects the others.
    pub async fn run<F>(&self, name: &str, task: F) -> AggregatedResult
    where
        F: Fn(&ResolvedHost) -> MultiResult + Send + Sync + 'static,
    {
        let task = Arc::new(task);
        let semaphore = Arc::new(Semaphore::new(self.num_workers));
        let mut aggregated = AggregatedResult::new(name);
        let mut handles = Vec::new();

        tracing::info!(
            "Running {} on {} hosts ({} workers)",
            name,
            self.inventory.len(),
            self.num_workers
        );

        for host_name in self.inventory.host_names() {
            let host = match self.inventory.resolve(host_name) {
                Ok(host) => host,
                Err(e) => {
                    aggregated.insert(host_name, single_failure(host_name, name, &e));
                    continue;
                }
            };

            let task = task.clone();
            let semaphore = semaphore.clone();
            let task_name = name.to_string();

            handles.push(tokio::spawn(async move {
                let host_name = host.name.clone();
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        let err = anyhow::anyhow!("Worker pool closed: {}", e);
                        return (host_name.clone(), single_failure(&host_name, &task_name, &err));
                    }
                };

                let span_task = task_name.clone();
                let joined = tokio::task::spawn_blocking(move || {
                    let _span = tracing::info_span!("task", task = %span_task, host = %host.name).entered();
                    (*task)(&host)
                })
                .await;

                let multi = match joined {
                    Ok(multi) => multi,
                    Err(e) => {
                        let err = anyhow::anyhow!("Task panicked: {}", e);
                        tracing::error!("{} on {}: {}", task_name, host_name, err);
                        single_failure(&host_name, &task_name, &err)
                    }
                };
                (host_name, multi)
            }));
        }

        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok((host_name, multi)) => aggregated.insert(&host_name, multi),
                Err(e) => tracing::error!("Runner worker for {} failed: {}", name, e),
            }
        }

        let failed = aggregated.failed_hosts();
        if failed.is_empty() {
            tracing::info!("{} completed on {} hosts", name, aggregated.len());
        } else {
            tracing::warn!("{} failed on {} of {} hosts: {}", name, failed.len(), aggregated.len(), failed.join(", "));
        }
        aggregated
    }
}

fn single_failure(host: &str, task: &str, err: &anyhow::Error) -> MultiResult {
    let mut multi = MultiResult::new(task);
    multi.set_parent(TaskResult::failure(host, task, err));
    multi
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn inventory(n: usize) -> Arc<Inventory> {
        let hosts: String = (1..=n).map(|i| format!("srx{}: {{}}\n", i)).collect();
        Arc::new(Inventory::from_yaml(&hosts, None, None).unwrap())
    }

    fn host_result<'a>(result: &'a AggregatedResult, host: &str) -> &'a MultiResult {
        result.iter().find(|(h, _)| h.as_str() == host).map(|(_, m)| m).unwrap()
    }

    #[tokio::test]
    async fn test_runs_every_host() {
        let runner = Runner::new(inventory(5), 2);
        let result = runner
            .run("noop", |host| {
                let mut multi = MultiResult::new("noop");
                multi.set_parent(TaskResult::new(&host.name, "noop"));
                multi
            })
            .await;

        assert_eq!(result.len(), 5);
        assert!(result.failed_hosts().is_empty());
        assert_eq!(host_result(&result, "srx3").iter().next().unwrap().host, "srx3");
    }

    #[tokio::test]
    async fn test_worker_limit_is_respected() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (running.clone(), peak.clone());

        let runner = Runner::new(inventory(8), 3);
        runner
            .run("sleep", move |host| {
                let now = r.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(20));
                r.fetch_sub(1, Ordering::SeqCst);
                let mut multi = MultiResult::new("sleep");
                multi.set_parent(TaskResult::new(&host.name, "sleep"));
                multi
            })
            .await;

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let runner = Runner::new(inventory(3), 4);
        let result = runner
            .run("flaky", |host| {
                if host.name == "srx2" {
                    panic!("device exploded");
                }
                let mut multi = MultiResult::new("flaky");
                multi.set_parent(TaskResult::new(&host.name, "flaky"));
                multi
            })
            .await;

        assert_eq!(result.len(), 3);
        assert_eq!(result.failed_hosts(), vec!["srx2"]);
        let exception = host_result(&result, "srx2").iter().next().unwrap().exception.clone().unwrap();
        assert!(exception.contains("Task panicked"));
    }

    #[test]
    fn test_zero_workers_becomes_one() {
        let runner = Runner::new(inventory(1), 0);
        assert_eq!(runner.num_workers, 1);
        assert_eq!(runner.inventory.len(), 1);

        let result = tokio_test::block_on(runner.run("noop", |host| {
            let mut multi = MultiResult::new("noop");
            multi.set_parent(TaskResult::new(&host.name, "noop"));
            multi
        }));
        assert_eq!(result.len(), 1);
    }
}
