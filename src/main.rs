use clap::{Parser, Subcommand};
use imgpipe::config::{self, RunConfig};
use imgpipe::job::{self, JobPayload};
use imgpipe::output;
use imgpipe::pipeline::{self, JobReport};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup, called exactly once
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "imgpipe")]
#[command(about = "Batch image transformation jobs")]
#[command(long_about = "\
Batch image transformation jobs

A job is a JSON document naming one source image and an ordered list of
operations. Every operation transforms the original source and writes its
result into the output directory; results are then uploaded to S3 unless
the job sets disable_network.

  {
    \"image_url\": \"https://example.com/photos/in.jpg\",
    \"operations\": [
      {\"op\": \"resize\", \"destination\": \"small.jpg\", \"width\": 100, \"height\": 50},
      {\"op\": \"sketch\", \"destination\": \"sketch.png\", \"format\": \"png\"},
      {\"op\": \"tile\", \"num_tiles_width\": 3, \"num_tiles_height\": 2},
      {\"op\": \"merge\"}
    ],
    \"aws\": {\"region\": \"…\", \"access_key\": \"…\", \"secret_key\": \"…\", \"s3_bucket_name\": \"…\"},
    \"disable_network\": false
  }

Operations: resize, thumbnail, sketch, normalize, charcoal, level, tile, merge.

The source image is the last path segment of image_url, looked up in
--source-dir. The job is read from --job, else $IMGPIPE_PAYLOAD, else stdin.

Run 'imgpipe gen-config' to generate a documented imgpipe.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Directory holding source images
    #[arg(long, default_value = ".", global = true)]
    source_dir: PathBuf,

    /// Output directory (overrides output_dir from the config)
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Config file (default: ./imgpipe.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log progress details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one job
    Run {
        /// Job JSON file
        #[arg(long)]
        job: Option<PathBuf>,
    },
    /// Validate a job and show its steps without running it
    Check {
        /// Job JSON file
        #[arg(long)]
        job: Option<PathBuf>,
    },
    /// Run several job files in parallel, each into its own output subdirectory
    Batch {
        /// Job JSON files
        #[arg(required = true)]
        jobs: Vec<PathBuf>,
    },
    /// Print a stock imgpipe.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run { job } => {
            let (config, output_dir) = settings(cli.config.as_deref(), cli.output_dir.as_deref())?;
            let payload = read_job(job.as_deref())?;
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_pipeline_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let result = pipeline::run_job(&payload, &cli.source_dir, &output_dir, &config, Some(tx));
            printer.join().map_err(|_| "output thread panicked")?;
            output::print_job_summary(&result?, &output_dir);
        }
        Command::Check { job } => {
            let payload = read_job(job.as_deref())?;
            let source = cli.source_dir.join(payload.source_filename());
            output::print_check_output(&payload, &source);
            if !source.is_file() {
                return Err(format!("source image not found: {}", source.display()).into());
            }
            println!("==> Job is valid");
        }
        Command::Batch { jobs } => {
            let (config, output_dir) = settings(cli.config.as_deref(), cli.output_dir.as_deref())?;
            init_thread_pool(&config.processing);
            let outcomes: Vec<(String, Result<JobReport, String>)> = jobs
                .par_iter()
                .map(|path| {
                    let name = job_name(path);
                    let outcome =
                        run_batch_job(path, &cli.source_dir, &output_dir.join(&name), &config);
                    (name, outcome)
                })
                .collect();

            let mut failed = 0;
            for (name, outcome) in &outcomes {
                println!(
                    "{}",
                    output::format_batch_line(name, outcome.as_ref().map_err(String::as_str))
                );
                if outcome.is_err() {
                    failed += 1;
                }
            }
            if failed > 0 {
                return Err(format!("{} of {} jobs failed", failed, outcomes.len()).into());
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Load the run config and resolve the output directory.
///
/// `--config` must name an existing file; without it `./imgpipe.toml` is
/// used when present. `--output-dir` wins over the config's `output_dir`.
fn settings(
    config_path: Option<&Path>,
    output_dir: Option<&Path>,
) -> Result<(RunConfig, PathBuf), config::ConfigError> {
    let config = match config_path {
        Some(path) => config::load_config_file(path)?,
        None => config::load_config(Path::new("."))?,
    };
    let output_dir = output_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&config.output_dir));
    Ok((config, output_dir))
}

/// Base log level: warnings only, or step details with `--verbose`.
///
/// Progress already goes to stdout, so info-level logs are opt-in.
fn log_level(verbose: bool) -> tracing::Level {
    if verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    }
}

/// Install the tracing subscriber on stderr. `RUST_LOG` adds directives on
/// top of [`log_level`].
fn init_tracing(verbose: bool) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(log_level(verbose).into()))
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; user can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

/// Read and validate the job from a file, `$IMGPIPE_PAYLOAD`, or stdin.
fn read_job(file: Option<&Path>) -> Result<JobPayload, job::JobError> {
    let text = job::load_payload_text(
        file,
        std::env::var(job::PAYLOAD_ENV_VAR).ok(),
        std::io::stdin().lock(),
    )?;
    JobPayload::from_json(&text)
}

/// Output subdirectory for a batch job: the job file's stem.
fn job_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "job".to_string())
}

fn run_batch_job(
    path: &Path,
    source_dir: &Path,
    output_dir: &Path,
    config: &RunConfig,
) -> Result<JobReport, String> {
    let text = std::fs::read_to_string(path).map_err(|e| e.to_string())?;
    let payload = JobPayload::from_json(&text).map_err(|e| e.to_string())?;
    pipeline::run_job(&payload, source_dir, output_dir, config, None).map_err(|e| e.to_string())
}
