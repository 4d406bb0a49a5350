//! Media collaborators
//!
//! Transcoding, probing, frame sampling, audio decoding and the final render
//! are delegated to external command-line tools:
//!
//! ```text
//!   ┌──────────────┐   ┌──────────────┐
//!   │ FfmpegClient │   │  NtscClient  │
//!   └──────┬───────┘   └──────┬───────┘
//!          │                  │
//!   ┌──────▼──────────────────▼───────┐
//!   │          FfmpegRenderer         │
//!   └─────────────────────────────────┘
//! ```
//!
//! The pipeline only sees the [`MediaTools`] and [`Renderer`] traits so tests
//! can substitute in-memory fakes.

pub mod ffmpeg;
pub mod ntsc;
pub mod render;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::audio::SongSegment;
use crate::edl::TimelineSegment;
use crate::error::ReelResult;
use crate::settings::JobSettings;

pub use ffmpeg::FfmpegClient;
pub use ntsc::NtscClient;
pub use render::FfmpegRenderer;

/// Proxy geometry every clip is normalized to.
pub const PROXY_WIDTH: u32 = 540;
pub const PROXY_HEIGHT: u32 = 960;
pub const PROXY_FPS: u32 = 30;

/// Sample rate songs are decoded at for analysis.
pub const ANALYSIS_SAMPLE_RATE: u32 = 22_050;

/// An uploaded clip, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipInput {
    pub clip_id: String,
    pub path: PathBuf,
    pub original_name: String,
}

/// A normalized clip with its measured duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyClip {
    pub clip_id: String,
    pub path: PathBuf,
    pub duration_s: f64,
}

impl ProxyClip {
    pub fn new(clip_id: impl Into<String>, path: impl Into<PathBuf>, duration_s: f64) -> Self {
        Self {
            clip_id: clip_id.into(),
            path: path.into(),
            duration_s,
        }
    }
}

/// Decoded mono audio.
#[derive(Debug, Clone, PartialEq)]
pub struct MonoAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl MonoAudio {
    pub fn duration_s(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Operations the preprocess, analyze and edl stages need from the media tool.
#[async_trait]
pub trait MediaTools: Send + Sync {
    /// Normalize `clip` into a proxy at `output`.
    async fn make_proxy(&self, clip: &ClipInput, output: &Path, include_audio: bool)
        -> ReelResult<()>;

    /// Container duration in seconds.
    async fn probe_duration(&self, path: &Path) -> ReelResult<f64>;

    /// Sample one frame per second into `out_dir`, returning the frame paths
    /// in timestamp order.
    async fn extract_frames(&self, proxy: &Path, out_dir: &Path) -> ReelResult<Vec<PathBuf>>;

    async fn decode_mono(&self, song: &Path, sample_rate: u32) -> ReelResult<MonoAudio>;
}

/// Everything the render stage consumes.
#[derive(Debug, Clone)]
pub struct RenderRequest<'a> {
    pub timeline: &'a [TimelineSegment],
    pub proxies: &'a [ProxyClip],
    pub settings: &'a JobSettings,
    pub seed: u64,
    pub song_path: &'a Path,
    pub song: &'a SongSegment,
    pub output_dir: &'a Path,
}

impl RenderRequest<'_> {
    pub fn proxy(&self, clip_id: &str) -> Option<&ProxyClip> {
        self.proxies.iter().find(|p| p.clip_id == clip_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderArtifacts {
    #[serde(rename = "final")]
    pub final_path: PathBuf,
    #[serde(rename = "preview")]
    pub preview_path: PathBuf,
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, request: &RenderRequest<'_>) -> ReelResult<RenderArtifacts>;
}
