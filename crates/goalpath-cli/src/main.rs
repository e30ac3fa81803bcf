//! goalpath CLI - record workflow events and inspect the collected metrics.
//!
//! # Usage
//!
//! ```bash
//! # Write a default configuration
//! goalpath init
//!
//! # Fire a record point for an execution
//! goalpath record workflowStart --workflow wf-1 --execution 3
//!
//! # Dump the public snapshots
//! goalpath export --output metrics.json
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use goalpath_cli::{commands, AssignmentArgs, Session};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "goalpath")]
#[command(about = "goalpath - workflow metrics collection", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// List registered metrics
    List {
        /// Include private metrics
        #[arg(long)]
        all: bool,

        /// Print definitions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fire a record point
    Record {
        /// Record point name
        point: String,

        /// Value passed to metrics that take one
        #[arg(long, allow_hyphen_values = true)]
        value: Option<f64>,

        #[command(flatten)]
        assignment: AssignmentArgs,
    },

    /// Export public snapshots as JSON
    Export {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Allocate a new execution id for a workflow
    NewExecutionId {
        /// Workflow id
        workflow: String,
    },

    /// Allocate a new schedule id
    NewScheduleId,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {:#}", e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Init { force } => {
            let path = commands::init_config(cli.config, force).await?;
            println!("Configuration written to {}", path.display());
        }
        Commands::List { all, json } => {
            let session = Session::open(cli.config.as_deref()).await?;
            println!("{}", commands::list_metrics(&session, all, json)?);
        }
        Commands::Record { point, value, assignment } => {
            let session = Session::open(cli.config.as_deref()).await?;
            let report =
                commands::record_event(&session, &point, &assignment.to_assignment(), value).await?;
            println!("{}", commands::describe_report(&point, &report));
            if !report.is_success() {
                anyhow::bail!("{} metric(s) failed to handle {}", report.failed.len(), point);
            }
        }
        Commands::Export { output } => {
            let session = Session::open(cli.config.as_deref()).await?;
            let json = commands::export_snapshots(&session, output.as_deref()).await?;
            if output.is_none() {
                println!("{}", json);
            }
        }
        Commands::NewExecutionId { workflow } => {
            let session = Session::open(cli.config.as_deref()).await?;
            println!("{}", session.service.get_new_execution_id(&workflow).await?);
        }
        Commands::NewScheduleId => {
            let session = Session::open(cli.config.as_deref()).await?;
            println!("{}", session.service.get_new_schedule_id().await?);
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("goalpath=debug,goalpath_metrics=debug,goalpath_storage=debug,goalpath_cli=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}
