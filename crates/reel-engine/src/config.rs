use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Process-wide configuration for the reel engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root under which every job gets its own directory
    pub jobs_dir: PathBuf,
    /// Directory holding the ntsc-rs preset JSON files
    pub presets_dir: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// Explicit ntsc-rs CLI location; discovered when absent
    pub ntsc_cli_path: Option<PathBuf>,
    /// Captioning model-serving endpoint; tagging uses heuristics only when absent
    pub caption_endpoint: Option<String>,
    pub caption_model: String,
    pub caption_token: Option<String>,
    pub caption_timeout_secs: u64,
    /// External beat tracker command line; the energy tracker is used when absent
    pub beats_command: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
        let base = Path::new(&home).join(".reel");

        Self {
            jobs_dir: std::env::var("REEL_JOBS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| base.join("jobs")),
            presets_dir: std::env::var("REEL_PRESETS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| base.join("presets").join("ntsc")),
            ffmpeg_path: std::env::var("FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("ffmpeg")),
            ffprobe_path: std::env::var("FFPROBE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("ffprobe")),
            ntsc_cli_path: std::env::var("NTSC_RS_CLI_PATH").ok().map(PathBuf::from),
            caption_endpoint: std::env::var("REEL_CAPTION_ENDPOINT")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            caption_model: std::env::var("REEL_CAPTION_MODEL")
                .unwrap_or_else(|_| "apple/FastVLM-0.5B".into()),
            caption_token: std::env::var("REEL_CAPTION_TOKEN").ok(),
            caption_timeout_secs: std::env::var("REEL_CAPTION_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            beats_command: std::env::var("REEL_BEATS_COMMAND")
                .ok()
                .filter(|v| !v.trim().is_empty()),
        }
    }
}

impl EngineConfig {
    /// Configuration rooted at `dir`, with tool defaults and no collaborators.
    pub fn rooted_at(dir: &Path) -> Self {
        Self {
            jobs_dir: dir.join("jobs"),
            presets_dir: dir.join("presets"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            ntsc_cli_path: None,
            caption_endpoint: None,
            caption_model: "apple/FastVLM-0.5B".into(),
            caption_token: None,
            caption_timeout_secs: 30,
            beats_command: None,
        }
    }
}
