//! scope-daq command line entry point.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use daq_core::{Job, JobStatus, JobType, NewJob, ParameterMap};
use daq_experiment::{GeneratorRegistry, Steps};
use scope_daq::config::{config_path, AppConfig};
use scope_daq::{logging, station::apply_capture_defaults, Station};
use serde_json::json;
use tracing::info;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "scope-daq")]
#[command(about = "Automated microscope acquisition on a simulated stage and camera", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to config/scope.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one job to completion and print the final record
    Run {
        /// timelapse, grid, zstack or manual
        job_type: JobType,
        /// Job parameters as a JSON object
        #[arg(short, long, default_value = "{}")]
        params: String,
        /// Job name
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Print the steps a job would execute without touching hardware
    Plan {
        /// timelapse, grid, zstack or manual
        job_type: JobType,
        /// Job parameters as a JSON object
        #[arg(short, long, default_value = "{}")]
        params: String,
        /// Print at most this many steps
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Load and validate the configuration
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let path = config_path(cli.config.as_deref());
    let config = AppConfig::load_from(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;

    match cli.command {
        Commands::Run {
            job_type,
            params,
            name,
        } => {
            logging::init(&config.application)?;
            run(&config, job_type, &params, name).await
        }
        Commands::Plan {
            job_type,
            params,
            limit,
        } => plan(&config, job_type, &params, limit),
        Commands::CheckConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            println!("Configuration OK: {}", path.display());
            Ok(())
        }
    }
}

fn parse_params(raw: &str) -> Result<ParameterMap> {
    let value: serde_json::Value =
        serde_json::from_str(raw).context("job parameters are not valid JSON")?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => bail!("job parameters must be a JSON object, got {other}"),
    }
}

async fn run(
    config: &AppConfig,
    job_type: JobType,
    params: &str,
    name: Option<String>,
) -> Result<()> {
    let station = Station::simulated(config);
    let name = name.unwrap_or_else(|| format!("{job_type} acquisition"));
    let request = station.job_request(name, job_type, parse_params(params)?);

    let job = station.scheduler.create(request).await?;
    info!(job_id = job.id, "Submitting job");
    let job = station.scheduler.run(job.id).await?;

    let images = station.images.for_job(job.id);
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "job": job, "images": images }))?
    );

    if job.status == JobStatus::Failed {
        bail!(
            "job {} failed: {}",
            job.id,
            job.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

fn plan(config: &AppConfig, job_type: JobType, params: &str, limit: Option<usize>) -> Result<()> {
    let mut parameters = parse_params(params)?;
    apply_capture_defaults(&mut parameters, &config.camera);
    let job = Job::new(0, NewJob::new("plan", job_type, parameters));

    let generator = GeneratorRegistry::default().create(&job)?;
    println!("{} steps", generator.total_steps());
    for step in Steps::new(generator.as_ref()).take(limit.unwrap_or(usize::MAX)) {
        let verdict = match config.limits.validate(&step.target) {
            Ok(()) => "ok".to_string(),
            Err(violation) => violation.to_string(),
        };
        println!("{}  [{verdict}]", serde_json::to_string(&step)?);
    }
    Ok(())
}
