//! fieldwork: bulk field maintenance jobs for MongoDB collections.

mod config;
mod error;
mod progress;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use fieldwork_jobs::Runner;
use fieldwork_store::{MongoConfig, MongoConnector};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use config::{JobFile, Overrides};
use error::{Error, Result};
use progress::BarSink;

#[derive(Parser)]
#[command(name = "fieldwork")]
#[command(about = "Run bulk field maintenance jobs against MongoDB", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a job file
    Run {
        /// Path to the job YAML file
        job: PathBuf,

        /// Override the worker count
        #[arg(long)]
        workers: Option<usize>,

        /// Override the batch size
        #[arg(long)]
        batch_size: Option<usize>,

        /// Do not draw a progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Check a job file without connecting to the database
    Validate {
        job: PathBuf,
    },

    /// Print a sample job file
    Sample {
        /// Job kind, such as rename-fields
        kind: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run {
            job,
            workers,
            batch_size,
            no_progress,
        } => run_command(
            job,
            Overrides {
                workers,
                batch_size,
            },
            no_progress,
        ),
        Commands::Validate { job } => validate_command(job),
        Commands::Sample { kind } => sample_command(&kind),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "fieldwork failed");
            ExitCode::FAILURE
        }
    }
}

fn run_command(path: PathBuf, overrides: Overrides, no_progress: bool) -> Result<()> {
    let spec = JobFile::from_file(&path)?.prepare(overrides)?;
    let mongo = MongoConfig::from_env()?.with_min_pool_size(spec.workers());
    info!(job = spec.kind(), uri = %mongo.redacted_uri(), "loaded job");

    let connector = MongoConnector::new(mongo);
    let mut runner = Runner::new(&connector);
    if !no_progress {
        runner = runner.with_progress(Arc::new(BarSink::new(spec.kind())));
    }
    let report = runner.run(&spec)?;
    println!("{report}");
    if report.is_success() {
        Ok(())
    } else {
        Err(Error::Unfinished {
            job: report.job,
            state: report.state,
        })
    }
}

fn validate_command(path: PathBuf) -> Result<()> {
    let spec = JobFile::from_file(&path)?.prepare(Overrides::default())?;
    println!("{} job is valid", spec.kind());
    Ok(())
}

fn sample_command(kind: &str) -> Result<()> {
    print!("{}", config::sample(kind)?);
    Ok(())
}
