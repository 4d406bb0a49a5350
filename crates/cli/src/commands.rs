//! CLI subcommand handlers

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;
use reel_engine::audio::{detector_from_config, select_from_audio, slice_beats};
use reel_engine::media::ANALYSIS_SAMPLE_RATE;
use reel_engine::{
    BeatDetector, Edl, EngineConfig, FfmpegClient, JobPaths, JobRequest, JobRunner, JobSettings,
    MediaTools, SnapTo, SongMethod, SongRequest,
};

use crate::config::Config;
use crate::output;

/// Settings from a JSON file path or an inline JSON object.
fn load_settings(raw: Option<&str>) -> Result<JobSettings> {
    let Some(raw) = raw else {
        return Ok(JobSettings::default());
    };
    let path = Path::new(raw);
    let json = if path.is_file() {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?
    } else {
        raw.to_string()
    };
    Ok(JobSettings::from_json(&json)?)
}

/// Create a job and run every stage in the foreground
pub async fn run(
    engine: &EngineConfig,
    song: PathBuf,
    clips: Vec<PathBuf>,
    settings: Option<&str>,
    seed: Option<u64>,
) -> Result<()> {
    let mut settings = load_settings(settings)?;
    if seed.is_some() {
        settings.seed = seed;
    }

    let runner = JobRunner::from_config(engine).context("Failed to set up job runner")?;
    let manifest = runner
        .create_job(JobRequest {
            clips,
            song,
            settings,
        })
        .await?;
    output::print_info(&format!(
        "Job {} created with {} clips",
        manifest.job_id.bright_white(),
        manifest.clips.len()
    ));

    match runner.run(&manifest).await {
        Ok(artifacts) => {
            output::print_success("Reel rendered");
            println!("  {} {}", "Final:".dimmed(), artifacts.final_path.display());
            println!("  {} {}", "Preview:".dimmed(), artifacts.preview.display());
            println!("  {} {}", "EDL:".dimmed(), artifacts.edl.display());
            Ok(())
        }
        Err(e) => {
            output::print_error(&format!("Job {} failed: {}", manifest.job_id, e));
            Err(e.into())
        }
    }
}

/// Show a job's status document
pub async fn status(engine: &EngineConfig, job_id: &str) -> Result<()> {
    let path = JobPaths::new(&engine.jobs_dir, job_id).status_path;
    match reel_engine::status::read_status(&path).await? {
        Some(status) => output::print_status(&status),
        None => anyhow::bail!(
            "No status recorded for job {} under {}",
            job_id,
            engine.jobs_dir.display()
        ),
    }
    Ok(())
}

/// Rebuild a job's EDL and compare it with the recorded one
pub async fn replan(engine: &EngineConfig, job_id: &str, seed: Option<u64>) -> Result<()> {
    let runner = JobRunner::from_config(engine)?;
    let edl = runner.replan(job_id, seed).await?;

    output::print_header(&format!("Replanned EDL (seed {})", edl.settings.seed));
    output::print_timeline(&edl.timeline);
    println!();

    let recorded_path = runner.paths(job_id).edl_path;
    match Edl::read(&recorded_path).await {
        Ok(recorded) if recorded.timeline == edl.timeline => {
            output::print_success("Matches the recorded EDL")
        }
        Ok(recorded) if recorded.settings.seed != edl.settings.seed => output::print_info(&format!(
            "Recorded EDL used seed {}",
            recorded.settings.seed
        )),
        Ok(_) => output::print_warning("Differs from the recorded EDL"),
        Err(_) => output::print_info("No recorded EDL to compare against"),
    }
    Ok(())
}

/// Pick a song window without creating a job
pub async fn song(
    engine: &EngineConfig,
    song: &Path,
    target: f64,
    method: Option<String>,
    start: f64,
    snap: Option<String>,
    json: bool,
) -> Result<()> {
    let request = SongRequest {
        target_length_s: target,
        method: method.map(SongMethod::from).unwrap_or_default(),
        min_start_s: start,
        snap_to: snap.map(SnapTo::from).unwrap_or_default(),
    };

    let ffmpeg = FfmpegClient::from_config(engine);
    let audio = ffmpeg
        .decode_mono(song, ANALYSIS_SAMPLE_RATE)
        .await
        .with_context(|| format!("Failed to decode {}", song.display()))?;

    let grid = match detector_from_config(engine).detect(song, &audio).await {
        Ok(grid) => Some(grid),
        Err(e) => {
            output::print_warning(&format!("Beat detection failed: {e}"));
            None
        }
    };
    let segment = select_from_audio(&audio, &request, grid.as_ref());
    let beats = grid.map(|g| slice_beats(&g, segment.start_s, segment.end_s));

    if json {
        let value = serde_json::json!({ "segment": segment, "beats": beats });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        output::print_song(&segment, beats.as_ref());
    }
    Ok(())
}

/// Show current configuration
pub fn show_config(config: &Config, engine: &EngineConfig) {
    output::print_header("Configuration");

    let or_unset = |v: Option<String>| v.unwrap_or_else(|| "not set".to_string());
    println!("  {}", "[paths]".bright_cyan());
    for key in ["jobs_dir", "presets_dir"] {
        println!("    {} = {}", key.dimmed(), or_unset(config.get(&format!("paths.{key}"))));
    }
    println!();
    println!("  {}", "[tools]".bright_cyan());
    for key in ["ffmpeg", "ffprobe", "ntsc_cli", "beats_command"] {
        println!("    {} = {}", key.dimmed(), or_unset(config.get(&format!("tools.{key}"))));
    }
    println!();
    println!("  {}", "[tagging]".bright_cyan());
    for key in ["enabled", "endpoint", "model", "timeout_secs"] {
        println!("    {} = {}", key.dimmed(), or_unset(config.get(&format!("tagging.{key}"))));
    }

    println!();
    println!("  {}", "Effective".bright_cyan());
    println!("    {} = {}", "jobs_dir".dimmed(), engine.jobs_dir.display());
    println!("    {} = {}", "presets_dir".dimmed(), engine.presets_dir.display());
    println!("    {} = {}", "ffmpeg".dimmed(), engine.ffmpeg_path.display());
    println!(
        "    {} = {}",
        "captioning".dimmed(),
        engine.caption_endpoint.as_deref().unwrap_or("heuristics only")
    );

    println!();
    println!("  {} {}", "Config file:".dimmed(), Config::config_path().display());
}

/// Set a configuration value
pub fn set_config(kv: &str) -> Result<()> {
    let Some((key, value)) = kv.split_once('=') else {
        output::print_error("Invalid format. Use: key=value");
        return Ok(());
    };
    let key = key.trim();
    let value = value.trim().trim_matches('"');

    let mut config = Config::load()?;
    match config.set(key, value) {
        Ok(()) => {
            config.save_to(&Config::config_path())?;
            output::print_success(&format!("Set {} = \"{}\"", key, value));
        }
        Err(e) => output::print_error(&format!("Failed to set config: {}", e)),
    }
    Ok(())
}
