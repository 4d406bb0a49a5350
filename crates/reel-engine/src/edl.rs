//! Edit decision list document.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ReelResult;
use crate::settings::{JobSettings, Vibe};

pub const EDL_VERSION: &str = "0.1";

/// Round to millisecond precision.
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    #[default]
    Cut,
}

/// One cut of the output timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSegment {
    pub clip_id: String,
    #[serde(rename = "in")]
    pub in_s: f64,
    #[serde(rename = "out")]
    pub out_s: f64,
    #[serde(default)]
    pub transition: Transition,
}

impl TimelineSegment {
    pub fn cut(clip_id: impl Into<String>, in_s: f64, out_s: f64) -> Self {
        Self {
            clip_id: clip_id.into(),
            in_s,
            out_s,
            transition: Transition::Cut,
        }
    }

    pub fn duration(&self) -> f64 {
        self.out_s - self.in_s
    }

    pub(crate) fn rounded(mut self) -> Self {
        self.in_s = round3(self.in_s);
        self.out_s = round3(self.out_s);
        self
    }
}

pub fn total_duration(timeline: &[TimelineSegment]) -> f64 {
    timeline.iter().map(TimelineSegment::duration).sum()
}

/// Settings snapshot stored with the EDL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdlSettings {
    pub target_length_s: f64,
    pub resolution: String,
    pub fps: u32,
    pub vibe: Vibe,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectParams {
    pub vhs_intensity: f64,
    pub glitch_amount: f64,
    pub grain_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edl {
    pub version: String,
    pub settings: EdlSettings,
    pub timeline: Vec<TimelineSegment>,
    pub effects: EffectParams,
}

impl Edl {
    pub fn new(settings: &JobSettings, seed: u64, timeline: Vec<TimelineSegment>) -> Self {
        Self {
            version: EDL_VERSION.to_string(),
            settings: EdlSettings {
                target_length_s: settings.target_length_s,
                resolution: settings.resolution.clone(),
                fps: settings.fps,
                vibe: settings.vibe,
                seed,
            },
            timeline: timeline.into_iter().map(TimelineSegment::rounded).collect(),
            effects: EffectParams {
                vhs_intensity: settings.vhs_intensity,
                glitch_amount: settings.glitch_amount,
                grain_amount: settings.grain_amount,
            },
        }
    }

    pub fn total_duration(&self) -> f64 {
        total_duration(&self.timeline)
    }

    pub async fn write(&self, path: &Path) -> ReelResult<()> {
        tokio::fs::write(path, serde_json::to_string_pretty(self)?).await?;
        Ok(())
    }

    pub async fn read(path: &Path) -> ReelResult<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&raw)?)
    }
}
