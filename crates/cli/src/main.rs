use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use followup_core::EngineConfig;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod commands;

#[derive(Parser)]
#[command(name = "followup")]
#[command(about = "Follow-up scheduling and execution engine for sales conversations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the job poller and the reminder poller until Ctrl-C
    Serve,
    /// Apply PostgreSQL migrations and exit
    Migrate,
    /// Schedule a one-off follow-up for a lead
    Schedule {
        lead: Uuid,
        #[arg(short, long, value_enum, default_value_t = ScheduleKind::Custom)]
        kind: ScheduleKind,
        /// Absolute time (RFC 3339); defaults to now
        #[arg(long, conflicts_with = "in_minutes")]
        at: Option<DateTime<Utc>>,
        #[arg(long)]
        in_minutes: Option<i64>,
        /// Verbatim text for a custom follow-up
        #[arg(short, long)]
        text: Option<String>,
    },
    /// Cancel pending follow-ups of a lead, or a single job
    Cancel {
        #[arg(long, required_unless_present = "job", conflicts_with = "job")]
        lead: Option<Uuid>,
        #[arg(long)]
        job: Option<Uuid>,
    },
    /// List pending jobs that are due now
    Due {
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
    /// Job counts per status
    Stats,
    /// Show one job
    Job { id: Uuid },
}

#[derive(Clone, Copy, ValueEnum)]
pub(crate) enum ScheduleKind {
    Custom,
    Abandonment,
}

fn resolve_at(at: Option<DateTime<Utc>>, in_minutes: Option<i64>) -> DateTime<Utc> {
    match (at, in_minutes) {
        (Some(at), _) => at,
        (None, Some(minutes)) => Utc::now() + chrono::Duration::minutes(minutes),
        (None, None) => Utc::now(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env()?;

    match cli.command {
        Commands::Serve => commands::serve::run(config).await?,
        Commands::Migrate => commands::migrate::run(&config).await?,
        Commands::Schedule { lead, kind, at, in_minutes, text } => {
            let at = resolve_at(at, in_minutes);
            commands::jobs::schedule(&config, lead, kind, at, text).await?;
        },
        Commands::Cancel { lead, job } => commands::jobs::cancel(&config, lead, job).await?,
        Commands::Due { limit } => commands::jobs::due(&config, limit).await?,
        Commands::Stats => commands::jobs::stats(&config).await?,
        Commands::Job { id } => commands::jobs::show(&config, id).await?,
    }

    Ok(())
}
