//! Per-job settings.
//!
//! Settings arrive as a partial JSON object and are merged field by field over
//! [`JobSettings::default`]. Every job builds its own value, so nothing mutable
//! is shared between jobs.

use serde::{Deserialize, Serialize};

use crate::error::{ReelError, ReelResult};

/// Named style preset controlling cut length and cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Vibe {
    #[default]
    Hype,
    Chill,
    Chaotic,
}

impl Vibe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vibe::Hype => "hype",
            Vibe::Chill => "chill",
            Vibe::Chaotic => "chaotic",
        }
    }

    /// Candidate window length and stride in seconds for the assembler.
    pub fn window(&self) -> (f64, f64) {
        match self {
            Vibe::Hype => (0.9, 0.5),
            Vibe::Chill => (1.4, 0.7),
            Vibe::Chaotic => (0.6, 0.4),
        }
    }

    /// Base segment length used by the fallback generator.
    pub fn base_segment_len(&self) -> f64 {
        match self {
            Vibe::Hype => 0.9,
            Vibe::Chill => 1.4,
            Vibe::Chaotic => 0.6,
        }
    }
}

impl From<String> for Vibe {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "chill" => Vibe::Chill,
            "chaotic" => Vibe::Chaotic,
            _ => Vibe::Hype,
        }
    }
}

impl From<Vibe> for String {
    fn from(value: Vibe) -> Self {
        value.as_str().to_string()
    }
}

/// Which tool applies the analog degradation look.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VhsEngine {
    #[default]
    NtscRs,
    Ffmpeg,
}

impl VhsEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            VhsEngine::NtscRs => "ntsc-rs",
            VhsEngine::Ffmpeg => "ffmpeg",
        }
    }
}

impl From<String> for VhsEngine {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case("ntsc-rs") {
            VhsEngine::NtscRs
        } else {
            VhsEngine::Ffmpeg
        }
    }
}

impl From<VhsEngine> for String {
    fn from(value: VhsEngine) -> Self {
        value.as_str().to_string()
    }
}

/// Preset selection for the VHS tool. `Auto` picks a preset from
/// `vhs_intensity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NtscPreset {
    #[default]
    Custom,
    SemiSharp,
    GameTape,
    Dynamic,
    Auto,
}

impl NtscPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            NtscPreset::Custom => "custom",
            NtscPreset::SemiSharp => "semi-sharp",
            NtscPreset::GameTape => "game-tape",
            NtscPreset::Dynamic => "dynamic",
            NtscPreset::Auto => "auto",
        }
    }
}

impl From<String> for NtscPreset {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "custom" => NtscPreset::Custom,
            "semi-sharp" => NtscPreset::SemiSharp,
            "game-tape" => NtscPreset::GameTape,
            "dynamic" => NtscPreset::Dynamic,
            _ => NtscPreset::Auto,
        }
    }
}

impl From<NtscPreset> for String {
    fn from(value: NtscPreset) -> Self {
        value.as_str().to_string()
    }
}

/// How the song window start is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SongMethod {
    #[default]
    AutoEnergy,
    Manual,
}

impl SongMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SongMethod::AutoEnergy => "auto_energy",
            SongMethod::Manual => "manual",
        }
    }
}

impl From<String> for SongMethod {
    fn from(value: String) -> Self {
        if value.trim().eq_ignore_ascii_case("manual") {
            SongMethod::Manual
        } else {
            SongMethod::AutoEnergy
        }
    }
}

impl From<SongMethod> for String {
    fn from(value: SongMethod) -> Self {
        value.as_str().to_string()
    }
}

/// Beat grid the song window start snaps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SnapTo {
    #[default]
    Downbeat,
    Beat,
    None,
}

impl SnapTo {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapTo::Downbeat => "downbeat",
            SnapTo::Beat => "beat",
            SnapTo::None => "none",
        }
    }
}

impl From<String> for SnapTo {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "downbeat" => SnapTo::Downbeat,
            "beat" => SnapTo::Beat,
            _ => SnapTo::None,
        }
    }
}

impl From<SnapTo> for String {
    fn from(value: SnapTo) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const DEFAULT: Resolution = Resolution {
        width: 1080,
        height: 1920,
    };

    pub fn parse(raw: &str) -> Option<Self> {
        let lower = raw.trim().to_lowercase();
        let (w, h) = lower.split_once('x')?;
        let width: u32 = w.trim().parse().ok()?;
        let height: u32 = h.trim().parse().ok()?;
        if width == 0 || height == 0 {
            return None;
        }
        Some(Resolution { width, height })
    }
}

/// Typed job settings with documented defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    /// Output length in seconds.
    pub target_length_s: f64,
    pub vibe: Vibe,
    /// 0..1, drives the ffmpeg VHS filter and automatic preset choice.
    pub vhs_intensity: f64,
    pub glitch_amount: f64,
    pub grain_amount: f64,
    pub vhs_engine: VhsEngine,
    pub ntsc_preset: NtscPreset,
    /// `WIDTHxHEIGHT` of the final render.
    pub resolution: String,
    pub fps: u32,
    /// Explicit seed; a fresh one is drawn per job when absent.
    pub seed: Option<u64>,
    /// Keep clip audio in proxies and mix it under the music.
    pub include_clip_audio: bool,
    /// Clip ids that must appear at least once in the timeline.
    pub locked_clips: Vec<String>,
    pub song_method: SongMethod,
    /// Manual start offset, and lower bound for the automatic search.
    pub song_start_s: f64,
    pub snap_to: SnapTo,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            target_length_s: 15.0,
            vibe: Vibe::Hype,
            vhs_intensity: 0.7,
            glitch_amount: 0.2,
            grain_amount: 0.5,
            vhs_engine: VhsEngine::NtscRs,
            ntsc_preset: NtscPreset::Custom,
            resolution: "1080x1920".to_string(),
            fps: 30,
            seed: None,
            include_clip_audio: false,
            locked_clips: Vec::new(),
            song_method: SongMethod::AutoEnergy,
            song_start_s: 0.0,
            snap_to: SnapTo::Downbeat,
        }
    }
}

impl JobSettings {
    /// Parse a partial JSON settings object over the defaults.
    pub fn from_json(raw: &str) -> ReelResult<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| ReelError::Validation(format!("Invalid settings JSON: {e}")))?;
        if !value.is_object() {
            return Err(ReelError::Validation(
                "Settings must be a JSON object".to_string(),
            ));
        }
        serde_json::from_value(value)
            .map_err(|e| ReelError::Validation(format!("Invalid settings: {e}")))
    }

    pub fn validate(&self) -> ReelResult<()> {
        if !self.target_length_s.is_finite()
            || self.target_length_s <= 0.0
            || self.target_length_s > 600.0
        {
            return Err(ReelError::Validation(format!(
                "target_length_s must be in (0, 600], got {}",
                self.target_length_s
            )));
        }
        if self.fps == 0 || self.fps > 120 {
            return Err(ReelError::Validation(format!(
                "fps must be in 1..=120, got {}",
                self.fps
            )));
        }
        for (name, value) in [
            ("vhs_intensity", self.vhs_intensity),
            ("glitch_amount", self.glitch_amount),
            ("grain_amount", self.grain_amount),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ReelError::Validation(format!(
                    "{name} must be in [0, 1], got {value}"
                )));
            }
        }
        if !self.song_start_s.is_finite() || self.song_start_s < 0.0 {
            return Err(ReelError::Validation(format!(
                "song_start_s must be >= 0, got {}",
                self.song_start_s
            )));
        }
        Ok(())
    }

    /// Render resolution, falling back to 1080x1920 when unparsable.
    pub fn resolution(&self) -> Resolution {
        Resolution::parse(&self.resolution).unwrap_or(Resolution::DEFAULT)
    }

    /// The explicit seed, or a freshly generated one in `0..1_000_000`.
    pub fn resolve_seed(&self) -> u64 {
        self.seed
            .unwrap_or_else(|| (uuid::Uuid::new_v4().as_u128() % 1_000_000) as u64)
    }
}
