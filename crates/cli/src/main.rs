//! Reel CLI
//!
//! Runs highlight-reel jobs end to end and inspects their results.

mod commands;
mod config;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Reel - music-synced highlight reels from raw clips
#[derive(Parser)]
#[command(name = "reel")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build short music-synced highlight reels from clips and a song")]
#[command(long_about = r#"
Reel picks the best moments of up to 20 clips, cuts them to a song window and
renders a vertical video with an optional VHS look.

Examples:
  reel run --song track.mp3 a.mp4 b.mov c.webm
  reel run --song track.mp3 --settings '{"target_length_s": 20, "vibe": "chill"}' *.mp4
  reel status 3f2a9c...
  reel replan 3f2a9c... --seed 42
  reel song track.mp3 --target 15 --snap beat
"#)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Jobs directory (overrides config and REEL_JOBS_DIR)
    #[arg(long, global = true)]
    jobs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a job and run it to completion
    Run {
        /// Song to cut the reel to (.mp3, .m4a, .wav)
        #[arg(short, long)]
        song: PathBuf,

        /// Job settings as a JSON file or inline JSON object
        #[arg(long)]
        settings: Option<String>,

        /// Seed for every random choice in the job
        #[arg(long)]
        seed: Option<u64>,

        /// Clips in order (.mp4, .mov, .webm)
        #[arg(required = true)]
        clips: Vec<PathBuf>,
    },

    /// Show a job's status
    Status {
        job_id: String,
    },

    /// Rebuild a job's EDL from its proxies and tags
    Replan {
        job_id: String,

        /// Use this seed instead of the recorded one
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Pick the song window for a target length
    Song {
        song: PathBuf,

        /// Target length in seconds
        #[arg(short, long, default_value = "15")]
        target: f64,

        /// auto_energy or manual
        #[arg(long)]
        method: Option<String>,

        /// Earliest start in seconds
        #[arg(long, default_value = "0")]
        start: f64,

        /// downbeat, beat or none
        #[arg(long)]
        snap: Option<String>,

        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Set a configuration value (key=value)
        #[arg(long)]
        set: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("reel={log_level},reel_engine={log_level},warn").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = config::Config::load()?;
    let mut engine = config.engine_config();
    if let Some(dir) = cli.jobs_dir {
        engine.jobs_dir = dir;
    }
    tracing::debug!(jobs_dir = %engine.jobs_dir.display(), "Loaded configuration");

    match cli.command {
        Commands::Run {
            song,
            settings,
            seed,
            clips,
        } => {
            commands::run(&engine, song, clips, settings.as_deref(), seed).await?;
        }
        Commands::Status { job_id } => {
            commands::status(&engine, &job_id).await?;
        }
        Commands::Replan { job_id, seed } => {
            commands::replan(&engine, &job_id, seed).await?;
        }
        Commands::Song {
            song,
            target,
            method,
            start,
            snap,
            json,
        } => {
            commands::song(&engine, &song, target, method, start, snap, json).await?;
        }
        Commands::Config { show, set } => match set {
            Some(kv) if !show => commands::set_config(&kv)?,
            _ => commands::show_config(&config, &engine),
        },
    }

    Ok(())
}
