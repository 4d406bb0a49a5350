//! Configuration management for the reel CLI
//!
//! Handles loading and saving configuration from ~/.reel/config.toml. Values
//! set in the file override the engine's environment defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use reel_engine::EngineConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub tagging: TaggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PathsConfig {
    #[serde(default)]
    pub jobs_dir: Option<PathBuf>,

    #[serde(default)]
    pub presets_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ToolsConfig {
    #[serde(default)]
    pub ffmpeg: Option<PathBuf>,

    #[serde(default)]
    pub ffprobe: Option<PathBuf>,

    #[serde(default)]
    pub ntsc_cli: Option<PathBuf>,

    /// External beat tracker; the song path is appended
    #[serde(default)]
    pub beats_command: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaggingConfig {
    /// Set to false to tag from brightness alone
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: None,
            model: None,
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value
        .parse()
        .with_context(|| format!("{key} expects true or false, got {value:?}"))
}

impl Config {
    /// Get the path to the config file
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".reel")
            .join("config.toml")
    }

    /// Load configuration from file, or return defaults if not found
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Engine configuration: environment defaults overlaid with this file.
    pub fn engine_config(&self) -> EngineConfig {
        self.apply(EngineConfig::default())
    }

    fn apply(&self, mut engine: EngineConfig) -> EngineConfig {
        if let Some(dir) = &self.paths.jobs_dir {
            engine.jobs_dir = dir.clone();
        }
        if let Some(dir) = &self.paths.presets_dir {
            engine.presets_dir = dir.clone();
        }
        if let Some(path) = &self.tools.ffmpeg {
            engine.ffmpeg_path = path.clone();
        }
        if let Some(path) = &self.tools.ffprobe {
            engine.ffprobe_path = path.clone();
        }
        if let Some(path) = &self.tools.ntsc_cli {
            engine.ntsc_cli_path = Some(path.clone());
        }
        if let Some(command) = &self.tools.beats_command {
            engine.beats_command = Some(command.clone());
        }
        if let Some(endpoint) = &self.tagging.endpoint {
            engine.caption_endpoint = Some(endpoint.clone());
        }
        if let Some(model) = &self.tagging.model {
            engine.caption_model = model.clone();
        }
        if let Some(token) = &self.tagging.token {
            engine.caption_token = Some(token.clone());
        }
        engine.caption_timeout_secs = self.tagging.timeout_secs;
        if !self.tagging.enabled {
            engine.caption_endpoint = None;
        }
        engine
    }

    /// Get a configuration value by key path (e.g., "tools.ffmpeg")
    pub fn get(&self, key: &str) -> Option<String> {
        let parts: Vec<&str> = key.split('.').collect();
        let show = |p: &Option<PathBuf>| p.as_ref().map(|p| p.display().to_string());

        match parts.as_slice() {
            ["paths", "jobs_dir"] => show(&self.paths.jobs_dir),
            ["paths", "presets_dir"] => show(&self.paths.presets_dir),
            ["tools", "ffmpeg"] => show(&self.tools.ffmpeg),
            ["tools", "ffprobe"] => show(&self.tools.ffprobe),
            ["tools", "ntsc_cli"] => show(&self.tools.ntsc_cli),
            ["tools", "beats_command"] => self.tools.beats_command.clone(),
            ["tagging", "enabled"] => Some(self.tagging.enabled.to_string()),
            ["tagging", "endpoint"] => self.tagging.endpoint.clone(),
            ["tagging", "model"] => self.tagging.model.clone(),
            ["tagging", "timeout_secs"] => Some(self.tagging.timeout_secs.to_string()),
            _ => None,
        }
    }

    /// Set a configuration value by key path, without saving
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["paths", "jobs_dir"] => self.paths.jobs_dir = Some(value.into()),
            ["paths", "presets_dir"] => self.paths.presets_dir = Some(value.into()),
            ["tools", "ffmpeg"] => self.tools.ffmpeg = Some(value.into()),
            ["tools", "ffprobe"] => self.tools.ffprobe = Some(value.into()),
            ["tools", "ntsc_cli"] => self.tools.ntsc_cli = Some(value.into()),
            ["tools", "beats_command"] => self.tools.beats_command = Some(value.to_string()),
            ["tagging", "enabled"] => self.tagging.enabled = parse_bool(key, value)?,
            ["tagging", "endpoint"] => self.tagging.endpoint = Some(value.to_string()),
            ["tagging", "model"] => self.tagging.model = Some(value.to_string()),
            ["tagging", "token"] => self.tagging.token = Some(value.to_string()),
            ["tagging", "timeout_secs"] => {
                self.tagging.timeout_secs = value
                    .parse()
                    .with_context(|| format!("{key} expects a number of seconds"))?
            }
            _ => anyhow::bail!("Unknown configuration key: {}", key),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert!(config.tagging.enabled);
        assert_eq!(config.tagging.timeout_secs, 30);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[tools]\nffmpeg = \"/opt/ffmpeg/bin/ffmpeg\"\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.tools.ffmpeg, Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg")));
        assert!(config.tagging.enabled);
        assert!(config.paths.jobs_dir.is_none());
    }

    #[test]
    fn test_set_and_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.set("paths.jobs_dir", "/srv/reel/jobs").unwrap();
        config.set("tagging.timeout_secs", "12").unwrap();
        config.set("tagging.enabled", "false").unwrap();
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.get("paths.jobs_dir").as_deref(), Some("/srv/reel/jobs"));
        assert_eq!(loaded.get("tagging.timeout_secs").as_deref(), Some("12"));
        assert_eq!(loaded.get("tagging.enabled").as_deref(), Some("false"));
    }

    #[test]
    fn test_set_rejects_bad_input() {
        let mut config = Config::default();
        assert!(config.set("tagging.enabled", "sometimes").is_err());
        assert!(config.set("tagging.timeout_secs", "soon").is_err());
        assert!(config.set("server.url", "http://localhost").is_err());
    }

    #[test]
    fn test_file_overrides_engine_defaults() {
        let base = EngineConfig::rooted_at(Path::new("/tmp/reel"));
        let mut config = Config::default();
        config.set("paths.jobs_dir", "/data/jobs").unwrap();
        config.set("tagging.endpoint", "http://localhost:8080/caption").unwrap();
        config.set("tools.beats_command", "beat-track --json").unwrap();

        let engine = config.apply(base.clone());
        assert_eq!(engine.jobs_dir, PathBuf::from("/data/jobs"));
        assert_eq!(engine.presets_dir, base.presets_dir);
        assert_eq!(engine.caption_endpoint.as_deref(), Some("http://localhost:8080/caption"));
        assert_eq!(engine.beats_command.as_deref(), Some("beat-track --json"));

        config.set("tagging.enabled", "false").unwrap();
        assert!(config.apply(base).caption_endpoint.is_none());
    }
}
