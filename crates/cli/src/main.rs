//! weathervane — operator CLI for the automation engine.

mod commands;

use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use tracing::error;

use vane_core::config::load_dotenv;
use vane_core::Config;

/// Operator CLI for the weather-triggered ad automation engine.
#[derive(Parser, Debug)]
#[command(name = "weathervane", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a worker in the foreground until interrupted.
    StartWorker,
    /// Ask a worker to stop at its next heartbeat.
    StopWorker {
        /// Worker id as shown by list-workers.
        worker_id: String,
    },
    /// List registered workers, newest first.
    ListWorkers,
    /// List rules in the durable store.
    ListRules,
    /// Schedule (or reschedule) the recurring check job for a rule.
    ScheduleRule {
        rule_id: String,
        user_id: String,
        /// Check interval in minutes.
        #[arg(default_value_t = 60)]
        interval_minutes: i64,
    },
    /// Run a rule's pipeline right now, bypassing the scheduler.
    RunRule { rule_id: String },
    /// Dry-run a rule: evaluate conditions without touching platforms.
    TestRule { rule_id: String },
    /// List scheduled and processing jobs.
    ListJobs,
    /// Recent execution records for a rule.
    ListExecutions {
        rule_id: String,
        #[arg(default_value_t = 20)]
        limit: i64,
    },
    /// Queue depth counters.
    JobStats,
    /// Sliding-window usage per external service.
    RateLimitStats,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            std::process::exit(code);
        }
    };

    load_dotenv();
    let config = Config::from_env();

    if let Err(e) = run(cli.command, config).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(command: Command, config: Config) -> anyhow::Result<()> {
    match command {
        Command::StartWorker => vane_engine::runtime::run_worker(config).await,
        Command::StopWorker { worker_id } => commands::stop_worker(&config, &worker_id).await,
        Command::ListWorkers => commands::list_workers(&config).await,
        Command::ListRules => commands::list_rules(&config).await,
        Command::ScheduleRule {
            rule_id,
            user_id,
            interval_minutes,
        } => commands::schedule_rule(&config, &rule_id, &user_id, interval_minutes).await,
        Command::RunRule { rule_id } => commands::run_rule(&config, &rule_id).await,
        Command::TestRule { rule_id } => commands::test_rule(&config, &rule_id).await,
        Command::ListJobs => commands::list_jobs(&config).await,
        Command::ListExecutions { rule_id, limit } => {
            commands::list_executions(&config, &rule_id, limit).await
        }
        Command::JobStats => commands::job_stats(&config).await,
        Command::RateLimitStats => commands::rate_limit_stats(&config).await,
    }
}
