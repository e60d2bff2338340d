mod config;
mod inventory;
mod junos;
mod models;
mod netconf;
mod output;
mod runner;
mod tasks;
mod templates;
mod utils;

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use inventory::Inventory;
use junos::{Connector, NetconfConnector};
use models::DataFormat;
use runner::Runner;
use tasks::{ConfigTask, RunOptions};
use templates::TemplateRenderer;

#[derive(Parser, Debug)]
#[command(
    name = "junos-push",
    version,
    about = "Push templated address-book entries and security policies to Juniper devices"
)]
struct Cli {
    #[arg(short, long, default_value = "config.yaml", env = "JUNOS_PUSH_CONFIG")]
    config: PathBuf,
    #[arg(long, value_enum, default_value_t = TaskSelection::All)]
    task: TaskSelection,
    /// Only run against these hosts
    #[arg(long, num_args = 1..)]
    hosts: Vec<String>,
    /// Only run against members of this group
    #[arg(long)]
    group: Option<String>,
    /// Show the diff, then discard it instead of committing
    #[arg(long)]
    dry_run: bool,
    /// Commit log message
    #[arg(long)]
    comment: Option<String>,
    /// Syntax the templates render to
    #[arg(long, value_enum, default_value_t = DataFormat::Set)]
    data_format: DataFormat,
    /// Also print DEBUG-level results (rendered configuration)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum TaskSelection {
    Addressbook,
    Policies,
    All,
}

impl TaskSelection {
    fn tasks(self) -> Vec<ConfigTask> {
        match self {
            TaskSelection::Addressbook => vec![ConfigTask::addressbook()],
            TaskSelection::Policies => vec![ConfigTask::policies()],
            TaskSelection::All => vec![ConfigTask::addressbook(), ConfigTask::policies()],
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Load configuration
    let cfg = Config::load(&cli.config)?;

    // Initialize tracing
    let default_filter = cfg
        .logging
        .level
        .clone()
        .unwrap_or_else(|| "junos_push=info".to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let start_time = Instant::now();
    let run_id = uuid::Uuid::new_v4();
    tracing::info!("Starting junos-push run {}", run_id);
    tracing::info!("Config: {}", cli.config.display());

    let mut inventory = Inventory::load(&cfg)?;
    if !cli.hosts.is_empty() {
        inventory = inventory.filter_names(&cli.hosts);
    }
    if let Some(group) = &cli.group {
        inventory = inventory.filter_group(group);
    }
    if inventory.is_empty() {
        tracing::warn!("No hosts matched; nothing to do");
    }

    let runner = Runner::new(Arc::new(inventory), cfg.runner.num_workers);
    let renderer = Arc::new(TemplateRenderer::new(cfg.templates_path()));
    let connector: Arc<dyn Connector> = Arc::new(NetconfConnector);
    let options = Arc::new(RunOptions {
        dry_run: cli.dry_run,
        comment: cli.comment.clone(),
    });
    if options.dry_run {
        tracing::info!("Dry run: changes will be discarded, not committed");
    }

    let mut failed_hosts = 0;
    for mut task in cli.task.tasks() {
        task.format = cli.data_format;
        println!("{}", task.description);

        let name = task.name.clone();
        let renderer = renderer.clone();
        let connector = connector.clone();
        let options = options.clone();
        let result = runner
            .run(&name, move |host| {
                task.run(host, connector.as_ref(), &renderer, &options)
            })
            .await;

        output::print_result(&result, cli.verbose);
        failed_hosts += result.failed_hosts().len();
    }

    println!(
        "junos-push took: {:.3} seconds to execute",
        start_time.elapsed().as_secs_f64()
    );

    if failed_hosts > 0 {
        tracing::error!("Run {} finished with {} failed host results", run_id, failed_hosts);
        std::process::exit(1);
    }
    Ok(())
}
