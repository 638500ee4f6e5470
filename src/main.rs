use std::path::PathBuf;

use clap::{Parser, Subcommand};

use cutover::cmd;
use cutover::errors::CutoverError;

#[derive(Parser)]
#[command(name = "cutover")]
#[command(version, about = "Source-of-truth cutover coordinator")]
struct Cli {
    /// Project directory holding cutover.toml and the coordinator database
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the coordinator HTTP server
    Serve {
        /// Port to serve on
        #[arg(short, long, default_value = "3240")]
        port: u16,

        /// Enable dev mode (permissive CORS, bind on all interfaces)
        #[arg(long)]
        dev: bool,

        /// Seed both in-memory stores with demo tables
        #[arg(long)]
        seed: bool,
    },
    /// Write a default cutover.toml and initialize the database
    Init,
    /// Manage the migration plan
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// List every table in the migration plan
    List,
    /// Show one table in detail, checklist included
    Show { table: String },
    /// Run the consistency validator and seed the checklist
    Prepare { table: String },
    /// Check a readiness gate (e.g. backup_complete)
    Gate {
        table: String,
        gate: String,
        /// Who checked the gate
        #[arg(long)]
        by: String,
    },
    /// Execute the cutover sequence for a ready table
    Cutover {
        table: String,
        #[arg(long)]
        actor: String,
    },
    /// Finish the migration after the stabilization period
    Complete { table: String },
    /// Revert a table to the legacy store
    Rollback {
        table: String,
        #[arg(long)]
        actor: String,
        #[arg(long)]
        reason: String,
    },
    /// Reopen a rolled-back table for another attempt
    Retry { table: String },
    /// List freeze windows
    Windows,
    /// List reconciliation jobs
    Jobs {
        #[arg(long)]
        table: Option<String>,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Add a table to the migration plan
    Add { table: String },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // The server logs at info; one-shot commands keep stdout for their own
    // output and only surface warnings.
    let default_filter = if matches!(cli.command, Commands::Serve { .. }) {
        "cutover=info"
    } else {
        "cutover=warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(&cli).await {
        eprintln!("{} {}", console::style("error:").red().bold(), e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: &Cli) -> Result<(), CutoverError> {
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir()
            .map_err(|e| CutoverError::Internal(anyhow::anyhow!("Failed to get current directory: {}", e)))?,
    };

    match &cli.command {
        Commands::Serve { port, dev, seed } => {
            cmd::cmd_serve(&project_dir, *port, *dev, *seed).await
        }
        Commands::Init => cmd::cmd_init(&project_dir),
        Commands::Plan { command } => match command {
            PlanCommands::Add { table } => cmd::cmd_plan_add(&project_dir, table).await,
        },
        Commands::List => cmd::cmd_list(&project_dir).await,
        Commands::Show { table } => cmd::cmd_show(&project_dir, table).await,
        Commands::Prepare { table } => cmd::cmd_prepare(&project_dir, table).await,
        Commands::Gate { table, gate, by } => {
            cmd::cmd_gate(&project_dir, table, gate, by).await
        }
        Commands::Cutover { table, actor } => {
            cmd::cmd_cutover(&project_dir, table, actor).await
        }
        Commands::Complete { table } => cmd::cmd_complete(&project_dir, table).await,
        Commands::Rollback { table, actor, reason } => {
            cmd::cmd_rollback(&project_dir, table, actor, reason).await
        }
        Commands::Retry { table } => cmd::cmd_retry(&project_dir, table).await,
        Commands::Windows => cmd::cmd_windows(&project_dir).await,
        Commands::Jobs { table } => cmd::cmd_jobs(&project_dir, table.as_deref()).await,
    }
}
