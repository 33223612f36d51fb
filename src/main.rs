use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{ArgGroup, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

use crewplan::{
    app::{self, App},
    config::Config,
    logging::init_tracing,
};
use crewplan_core::calendar::DateRange;
use crewplan_core::feedback::{FeedbackSubmission, ImplementationOutcome};

#[derive(Parser)]
#[command(name = "crewplan")]
#[command(about = "Detects crew overallocation, ranks remediations and learns from feedback")]
#[command(version)]
struct Args {
    /// Extra configuration file layered over config/default and config/local
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a full analysis over a snapshot file and print the ranked solutions
    Analyze {
        /// Allocation snapshot (JSON)
        #[arg(long)]
        snapshot: PathBuf,

        /// Project to include; repeat for several, omit for all
        #[arg(long = "project")]
        projects: Vec<String>,

        /// First day of the analysis window (YYYY-MM-DD)
        #[arg(long, requires = "to")]
        from: Option<NaiveDate>,

        /// Last day of the analysis window (YYYY-MM-DD)
        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,

        /// URL notified with the summary when the pass completes
        #[arg(long)]
        callback: Option<String>,

        /// Use the rule-based provider and in-memory stores
        #[arg(long)]
        offline: bool,
    },
    /// Evaluate a what-if scenario against a snapshot file
    Simulate {
        #[arg(long)]
        snapshot: PathBuf,

        /// add_resource, delay_project or prioritize_project
        #[arg(long)]
        scenario: String,

        /// Scenario parameters as a JSON object
        #[arg(long, default_value = "{}")]
        params: String,

        #[arg(long, requires = "to")]
        from: Option<NaiveDate>,

        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,
    },
    /// Record a manager's decision on a ranked solution and run the learning cycle
    #[command(group(ArgGroup::new("decision").required(true).args(["accept", "reject"])))]
    Feedback {
        /// Execution printed by `analyze`
        execution_id: Uuid,

        /// Solution being rated
        #[arg(long)]
        solution: Uuid,

        #[arg(long)]
        accept: bool,

        #[arg(long)]
        reject: bool,

        /// Rating from 1 to 5
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        rating: u8,

        /// success, partial or failed
        #[arg(long, default_value = "success", value_parser = parse_outcome)]
        outcome: ImplementationOutcome,

        #[arg(long)]
        manager: Option<String>,

        /// Free-form context as a JSON object
        #[arg(long, default_value = "{}")]
        context: String,
    },
    /// Print the stored state of an execution
    Status {
        execution_id: Uuid,
    },
    /// List stored executions, newest first
    Runs {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Summarize stored feedback by strategy
    Patterns {
        /// Restrict to one manager's feedback
        #[arg(long)]
        manager: Option<String>,
    },
    /// Print the ranking weight history
    Weights,
}

fn date_range(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<Option<DateRange>> {
    match (from, to) {
        (Some(start), Some(end)) => Ok(Some(DateRange::new(start, end)?)),
        _ => Ok(None),
    }
}

fn parse_outcome(value: &str) -> std::result::Result<ImplementationOutcome, String> {
    serde_json::from_value(serde_json::Value::String(value.to_ascii_lowercase()))
        .map_err(|_| format!("unknown outcome '{}', expected success, partial or failed", value))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    let _guard = init_tracing(&config.logging)?;

    info!("Starting CrewPlan {}", env!("CARGO_PKG_VERSION"));

    match args.command {
        Command::Analyze {
            snapshot,
            projects,
            from,
            to,
            callback,
            offline,
        } => {
            let range = date_range(from, to)?;
            if offline {
                warn!("Offline runs are not stored; feedback and status cannot reach them later");
            }
            let app = App::build(&config, app::file_source(&snapshot), offline).await?;
            let output = app.analyze(projects, range, callback).await?;
            print_json(&output)?;
            app.shutdown().await;
        }
        Command::Simulate {
            snapshot,
            scenario,
            params,
            from,
            to,
        } => {
            let params: serde_json::Value =
                serde_json::from_str(&params).context("--params must be a JSON object")?;
            let result = app::simulate(&snapshot, &scenario, params, date_range(from, to)?).await?;
            print_json(&result)?;
        }
        Command::Feedback {
            execution_id,
            solution,
            accept,
            reject: _,
            rating,
            outcome,
            manager,
            context,
        } => {
            let context: serde_json::Value =
                serde_json::from_str(&context).context("--context must be JSON")?;
            let app = App::build(&config, app::empty_source(), false).await?;
            let response = app
                .submit_feedback(FeedbackSubmission {
                    execution_id,
                    solution_id: solution,
                    manager_id: manager,
                    accepted: accept,
                    rating,
                    outcome,
                    context,
                })
                .await?;
            print_json(&response)?;
            app.shutdown().await;
        }
        Command::Status { execution_id } => {
            let app = App::build(&config, app::empty_source(), false).await?;
            print_json(&app.status(execution_id).await?)?;
            app.shutdown().await;
        }
        Command::Runs { limit } => {
            let app = App::build(&config, app::empty_source(), false).await?;
            print_json(&app.recent_runs(limit).await?)?;
            app.shutdown().await;
        }
        Command::Patterns { manager } => {
            let app = App::build(&config, app::empty_source(), false).await?;
            print_json(&app.patterns(manager).await?)?;
            app.shutdown().await;
        }
        Command::Weights => {
            let app = App::build(&config, app::empty_source(), false).await?;
            print_json(&app.weights())?;
            app.shutdown().await;
        }
    }

    Ok(())
}
