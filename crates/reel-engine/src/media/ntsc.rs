//! ntsc-rs CLI bridge and preset handling.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use super::ffmpeg::stderr_tail;
use crate::config::EngineConfig;
use crate::error::{ReelError, ReelResult};
use crate::settings::NtscPreset;

const CLI_NAME: &str = "ntsc-rs-cli";
const MAC_APP_CLI: &str = "/Applications/ntsc-rs.app/Contents/MacOS/ntsc-rs-cli";
/// Below this intensity the gentler preset is chosen automatically.
const SEMI_SHARP_BELOW: f64 = 0.45;

/// Presets a dynamic render draws from.
pub const DYNAMIC_POOL: [NtscPreset; 3] = [NtscPreset::Custom, NtscPreset::SemiSharp, NtscPreset::GameTape];

#[derive(Debug, Clone)]
pub struct NtscClient {
    cli_path: Option<PathBuf>,
    presets_dir: PathBuf,
}

impl NtscClient {
    pub fn new(cli_path: Option<PathBuf>, presets_dir: impl Into<PathBuf>) -> Self {
        Self {
            cli_path,
            presets_dir: presets_dir.into(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            Self::discover(config.ntsc_cli_path.as_deref()),
            &config.presets_dir,
        )
    }

    /// Explicit path if it exists, then `PATH`, then the macOS app bundle.
    pub fn discover(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit.filter(|p| p.exists()) {
            return Some(path.to_path_buf());
        }
        if let Ok(path) = which::which(CLI_NAME) {
            return Some(path);
        }
        let mac = PathBuf::from(MAC_APP_CLI);
        mac.exists().then_some(mac)
    }

    pub fn is_available(&self) -> bool {
        self.cli_path.is_some()
    }

    /// Preset file for a fixed preset, whether or not it exists.
    pub fn preset_file(&self, preset: NtscPreset) -> Option<PathBuf> {
        let name = match preset {
            NtscPreset::Custom => "ntsc_custom.json",
            NtscPreset::SemiSharp => "ntsc_semi_sharp.json",
            NtscPreset::GameTape => "ntsc_game_tape.json",
            NtscPreset::Dynamic | NtscPreset::Auto => return None,
        };
        Some(self.presets_dir.join(name))
    }

    /// The requested preset file, or one picked from `intensity` when the
    /// request is automatic or its file is missing.
    pub fn resolve_preset(&self, preset: NtscPreset, intensity: f64) -> ReelResult<PathBuf> {
        if let Some(path) = self.preset_file(preset).filter(|p| p.exists()) {
            return Ok(path);
        }

        let fallback = if intensity < SEMI_SHARP_BELOW {
            NtscPreset::SemiSharp
        } else {
            NtscPreset::GameTape
        };
        match self.preset_file(fallback) {
            Some(path) if path.exists() => Ok(path),
            Some(path) => Err(ReelError::tool(
                "ntsc-rs",
                format!("Missing ntsc-rs preset file: {}", path.display()),
            )),
            None => Err(ReelError::tool("ntsc-rs", "No preset available")),
        }
    }

    /// Existing preset files a dynamic render may use.
    pub fn dynamic_pool(&self) -> Vec<PathBuf> {
        DYNAMIC_POOL
            .iter()
            .filter_map(|p| self.preset_file(*p))
            .filter(|p| p.exists())
            .collect()
    }

    /// Copy `source` to `dest` with its `random_seed` replaced.
    pub async fn write_seeded_preset(source: &Path, dest: &Path, seed: u32) -> ReelResult<()> {
        let raw = tokio::fs::read_to_string(source).await?;
        let mut preset: Value = serde_json::from_str(&raw)?;
        match preset.as_object_mut() {
            Some(map) => {
                map.insert("random_seed".to_string(), Value::from(seed));
            }
            None => {
                return Err(ReelError::tool(
                    "ntsc-rs",
                    format!("Preset {} is not a JSON object", source.display()),
                ))
            }
        }
        tokio::fs::write(dest, serde_json::to_string_pretty(&preset)?).await?;
        Ok(())
    }

    pub async fn run(&self, input: &Path, output: &Path, preset: &Path) -> ReelResult<()> {
        let cli = self.cli_path.as_ref().ok_or_else(|| {
            ReelError::tool(
                "ntsc-rs",
                "ntsc-rs-cli not found. Install ntsc-rs and set NTSC_RS_CLI_PATH or add it to PATH.",
            )
        })?;

        debug!(input = %input.display(), preset = %preset.display(), "Running ntsc-rs");
        let result = Command::new(cli)
            .arg("-i")
            .arg(input)
            .arg("-o")
            .arg(output)
            .arg("-p")
            .arg(preset)
            .arg("-y")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ReelError::tool("ntsc-rs", e.to_string()))?;

        if !result.status.success() {
            return Err(ReelError::tool(
                "ntsc-rs",
                stderr_tail(&result.stderr, result.status.to_string()),
            ));
        }
        Ok(())
    }
}
