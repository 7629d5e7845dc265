//! # StepChain Splitter CLI
//!
//! `split` runs at submit time: it partitions a request into jobs and writes
//! one `job<N>.json` per job plus the shared request archive. `copies` and
//! `run` run on the worker: the first prints the step-1 copy tweaks a job file
//! resolves to, the second executes the job's step chain.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode as ProcessExitCode;
use std::sync::Arc;
use tracing::{error, info};

use stepchain_splitter::artifacts::{
    self, load_request_files, read_job_file, unpack_request_archive, write_job_files,
};
use stepchain_splitter::constants::files;
use stepchain_splitter::execution::{ChainRunner, CommandStepExecutor};
use stepchain_splitter::logging::{init_structured_logging, log_error, log_job_operation};
use stepchain_splitter::models::Request;
use stepchain_splitter::orchestration::{ConfiguratorOptions, JobSetBuilder, StepConfigurator};
use stepchain_splitter::{ExitCode, SplitterConfig, SplitterError};

#[derive(Parser)]
#[command(name = "stepchain-splitter")]
#[command(about = "Split StepChain requests into jobs and run them")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Configuration file (default: config/stepchain.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Partition a request and write job files plus the request archive
    Split {
        /// ReqMgr request document (JSON)
        #[arg(short, long)]
        request: PathBuf,

        /// Splitting policy document (JSON)
        #[arg(short, long)]
        splitting: PathBuf,

        /// Directory receiving job files and the archive
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Directory holding the base step configurations
        #[arg(short, long)]
        psets: Option<PathBuf>,
    },

    /// Print the step-1 copy tweaks for one job file
    Copies {
        /// Job descriptor file (job<N>.json)
        #[arg(short, long)]
        job: PathBuf,

        #[arg(short, long)]
        request: PathBuf,

        /// Splitting policy; defaults to splitting.json beside the request
        #[arg(short, long)]
        splitting: Option<PathBuf>,
    },

    /// Execute every step of one job
    Run {
        #[arg(short, long)]
        job: PathBuf,

        /// Request document; defaults to request.json from the unpacked archive
        #[arg(short, long)]
        request: Option<PathBuf>,

        /// Splitting policy; defaults to splitting.json beside the request
        #[arg(short, long)]
        splitting: Option<PathBuf>,

        /// Request archive to unpack into the work directory
        #[arg(short, long)]
        archive: Option<PathBuf>,

        /// Unpacked base configurations; defaults to <work-dir>/PSets
        #[arg(short, long)]
        psets: Option<PathBuf>,

        #[arg(short, long, default_value = ".")]
        work_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ProcessExitCode {
    let cli = Cli::parse();

    let config = match SplitterConfig::load_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            init_structured_logging(cli.json_logs);
            error!(error = %err, "Failed to load configuration");
            return err.exit_code().into();
        }
    };
    init_structured_logging(cli.json_logs || config.logging.json);

    match dispatch(cli.command, config).await {
        Ok(()) => ExitCode::Success.into(),
        Err(err) => {
            let code = exit_code_for(&err);
            log_error("cli", "dispatch", &format!("{err:#}"), Some(code.as_str()));
            eprintln!("error: {err:#}");
            code.into()
        }
    }
}

/// Classified failures keep their exit code; anything else is a bad invocation.
fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<SplitterError>())
        .map_or(ExitCode::BadArguments, SplitterError::exit_code)
}

async fn dispatch(command: Commands, config: SplitterConfig) -> anyhow::Result<()> {
    match command {
        Commands::Split {
            request,
            splitting,
            output_dir,
            psets,
        } => split(&config, &request, &splitting, &output_dir, psets.as_deref()),
        Commands::Copies {
            job,
            request,
            splitting,
        } => copies(&config, &job, &request, splitting.as_deref()),
        Commands::Run {
            job,
            request,
            splitting,
            archive,
            psets,
            work_dir,
        } => {
            run(
                &config,
                &job,
                request.as_deref(),
                splitting.as_deref(),
                archive.as_deref(),
                psets.as_deref(),
                &work_dir,
            )
            .await
        }
    }
}

fn split(
    config: &SplitterConfig,
    request_path: &Path,
    splitting_path: &Path,
    output_dir: &Path,
    psets: Option<&Path>,
) -> anyhow::Result<()> {
    let request = Request::load(request_path, splitting_path)
        .with_context(|| format!("loading request {}", request_path.display()))?;
    log_job_operation("split", Some(&request.request_name), None, "started", None);

    let jobs = JobSetBuilder::new(&request)
        .with_options(ConfiguratorOptions::from(config))
        .build()?;
    let written = write_job_files(output_dir, &jobs)?;

    let archive = match psets {
        Some(psets) => Some(artifacts::write_request_archive(
            &request,
            request_path,
            splitting_path,
            psets,
            output_dir,
        )?),
        None => None,
    };

    log_job_operation(
        "split",
        Some(&request.request_name),
        None,
        "completed",
        Some(&format!("{} job files", written.len())),
    );
    let summary = json!({
        "request_name": request.request_name,
        "job_count": jobs.len(),
        "chain_length": request.chain_length(),
        "step1_copies": request.step1_copies(),
        "output_dir": output_dir.display().to_string(),
        "archive": archive.map(|p| p.display().to_string()),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn copies(
    config: &SplitterConfig,
    job_path: &Path,
    request_path: &Path,
    splitting_path: Option<&Path>,
) -> anyhow::Result<()> {
    let request = load_request_files(request_path, splitting_path)
        .with_context(|| format!("loading request {}", request_path.display()))?;
    let job = read_job_file(job_path)?;
    let configurator = StepConfigurator::new(&request, ConfiguratorOptions::from(config))?;

    let copies = configurator.step1_copy_tweaks(&job)?;
    info!(job_index = job.job_index, copies = copies.len(), "Step-1 copies derived");
    println!("{}", serde_json::to_string_pretty(&copies)?);
    Ok(())
}

async fn run(
    config: &SplitterConfig,
    job_path: &Path,
    request_path: Option<&Path>,
    splitting_path: Option<&Path>,
    archive: Option<&Path>,
    psets: Option<&Path>,
    work_dir: &Path,
) -> anyhow::Result<()> {
    let unpacked_psets = match archive {
        Some(archive) => Some(unpack_request_archive(archive, work_dir)?),
        None => None,
    };

    let archived_request = work_dir.join(files::ARCHIVED_REQUEST);
    let request_path = request_path.unwrap_or(&archived_request);
    let request = load_request_files(request_path, splitting_path)
        .with_context(|| format!("loading request {}", request_path.display()))?;
    let job = read_job_file(job_path)?;

    let executor = Arc::new(CommandStepExecutor::new(config.executor.clone()));
    let mut runner = ChainRunner::new(request, config, executor, work_dir)?;

    let psets_dir = psets
        .map(Path::to_path_buf)
        .or(unpacked_psets)
        .unwrap_or_else(|| work_dir.join(files::ARCHIVED_PSETS_DIR));
    if psets_dir.is_dir() {
        runner = runner.with_psets_dir(psets_dir);
    }

    let report = runner.run(&job).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
