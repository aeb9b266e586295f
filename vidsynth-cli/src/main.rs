use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};

use vidsynth::broadcast::EventKind;
use vidsynth::db::{default_database_path, Database};
use vidsynth::telemetry::{init_logging, LogFormat, DEFAULT_LOG_FILTER};
use vidsynth::worker::job::DEFAULT_DURATION_SECS;
use vidsynth::{
    load_config, Config, JobQuery, JobStatus, JobStore, StyleProfile, StyleType, VideoRequest,
    WorkerPool,
};

/// Jobs loaded into memory at startup.
const STARTUP_CACHE_LIMIT: u64 = 500;

#[derive(Parser)]
#[command(name = "vidsynth")]
#[command(version, about = "Turn a topic into a narrated explainer video", long_about = None)]
struct Cli {
    /// Path to a config-v1 JSON file. Built-in defaults are used when omitted.
    #[arg(long, short, env = "VIDSYNTH_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log output format: text or json.
    #[arg(long, env = "VIDSYNTH_LOG_FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct TopicArgs {
    /// What the video should explain.
    #[arg(long)]
    topic: String,

    /// Visual style, by display name or slug (e.g. whiteboard, flowchart).
    #[arg(long, default_value = "2D explainer")]
    style: StyleType,

    /// Comma-separated palette, e.g. "#1e88e5,white".
    #[arg(long, default_value = "#1e88e5,#ffffff")]
    colors: String,

    /// LLM provider to start the fallback chain at.
    #[arg(long, default_value = "mistral")]
    provider: String,

    /// Target video length in seconds.
    #[arg(long, default_value_t = DEFAULT_DURATION_SECS)]
    duration: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a job and run it to completion
    Submit {
        #[command(flatten)]
        topic: TopicArgs,

        /// Produce a video without narration.
        #[arg(long)]
        no_voiceover: bool,

        /// Print progress events as they arrive.
        #[arg(long)]
        watch: bool,
    },
    /// Show one job
    Status { job_id: String },
    /// List jobs, newest first
    List {
        /// PENDING, PROCESSING, COMPLETED or FAILED.
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: u64,
        #[arg(long, default_value_t = 0)]
        offset: u64,
    },
    /// Generate a script only, without creating a job
    Script {
        #[command(flatten)]
        topic: TopicArgs,
    },
    /// Copy a completed job's video
    Download {
        job_id: String,
        /// Destination file. Defaults to the video's file name in the current directory.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Show configured providers and job counts
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format, DEFAULT_LOG_FILTER)?;

    let config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::with_defaults(),
    };

    let pool = build_pool(&config)?;

    match cli.command {
        Commands::Submit {
            topic,
            no_voiceover,
            watch,
        } => submit(&pool, topic, no_voiceover, watch).await?,
        Commands::Status { job_id } => print_json(&pool.status(&job_id)?)?,
        Commands::List {
            status,
            limit,
            offset,
        } => {
            let status = match status {
                Some(s) => Some(
                    JobStatus::parse(&s.to_ascii_uppercase())
                        .with_context(|| format!("unknown status '{}'", s))?,
                ),
                None => None,
            };
            let jobs = pool.list(&JobQuery {
                status,
                limit: Some(limit),
                offset: Some(offset),
            })?;
            print_json(&jobs)?;
        }
        Commands::Script { topic } => {
            let style = StyleProfile::new(topic.style, &topic.colors);
            let script = pool
                .generate_script(&topic.topic, style, topic.duration, &topic.provider)
                .await?;
            print_json(&script)?;
        }
        Commands::Download { job_id, output } => download(&pool, &job_id, output).await?,
        Commands::Health => print_json(&pool.health()?)?,
    }

    Ok(())
}

fn build_pool(config: &Config) -> Result<WorkerPool> {
    let db_path = config
        .database_file()
        .or_else(default_database_path)
        .context("no database path configured and no home directory found")?;
    let db = Database::open(&db_path)
        .with_context(|| format!("opening job database at {}", db_path.display()))?;

    let registry = Arc::new(JobStore::with_database(db));
    let interrupted = registry.fail_interrupted()?;
    if interrupted > 0 {
        warn!("{} job(s) were interrupted by the last shutdown", interrupted);
    }
    let loaded = registry.load_from_database(STARTUP_CACHE_LIMIT)?;
    info!("Loaded {} job(s) from {}", loaded, db_path.display());

    Ok(WorkerPool::from_config(config, registry)?)
}

async fn submit(pool: &WorkerPool, args: TopicArgs, no_voiceover: bool, watch: bool) -> Result<()> {
    let mut request = VideoRequest::new(&args.topic, StyleProfile::new(args.style, &args.colors))
        .with_provider(&args.provider)
        .with_duration(args.duration);
    if no_voiceover {
        request = request.without_voiceover();
    }

    let job = pool.submit(request)?;
    eprintln!("Job {} accepted", job.id);

    let printer = if watch {
        let (connection_id, mut rx) = pool.watch(&job.id);
        let printer = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event.kind {
                    EventKind::Error => eprintln!(
                        "[{:>3}%] {} failed: {}",
                        event.progress,
                        event.stage,
                        event.error.as_deref().unwrap_or(&event.message)
                    ),
                    _ => eprintln!("[{:>3}%] {}: {}", event.progress, event.stage, event.message),
                }
            }
        });
        Some((connection_id, printer))
    } else {
        None
    };

    let job = pool.wait(&job.id).await?;

    if let Some((connection_id, printer)) = printer {
        pool.disconnect(&connection_id);
        if let Err(e) = printer.await {
            warn!("Progress printer stopped abnormally: {}", e);
        }
    }

    print_json(&job)?;
    if job.status == JobStatus::Failed {
        bail!(
            "job {} failed: {}",
            job.id,
            job.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}

async fn download(pool: &WorkerPool, job_id: &str, output: Option<PathBuf>) -> Result<()> {
    let source = pool.video_path(job_id)?;
    let target = match output {
        Some(path) => path,
        None => PathBuf::from(
            source
                .file_name()
                .context("video path has no file name")?,
        ),
    };
    copy_file(&source, &target).await?;
    println!("{}", target.display());
    Ok(())
}

async fn copy_file(source: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    tokio::fs::copy(source, target)
        .await
        .with_context(|| format!("copying {} to {}", source.display(), target.display()))?;
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
