//! # Reel Engine
//!
//! Builds short, music-synchronized highlight reels from a handful of raw
//! clips and a song. The engine decides which moments of which clips to use,
//! in what order and for how long ([`assembly`], with [`fallback`] when no
//! content tags are available), and which part of the song plays underneath
//! ([`audio`]). Transcoding, the VHS effect, frame captioning and beat
//! tracking are external collaborators behind traits in [`media`],
//! [`tagging`] and [`audio::beats`].
//!
//! [`pipeline::JobRunner`] drives one job through
//! `preprocess → analyze → edl → render`, persisting a status document at
//! every transition.

pub mod assembly;
pub mod audio;
pub mod config;
pub mod edl;
pub mod error;
pub mod fallback;
pub mod media;
pub mod paths;
pub mod pipeline;
pub mod scoring;
pub mod settings;
pub mod status;
pub mod tagging;
pub mod tags;

#[cfg(test)]
mod pipeline_tests;

pub use assembly::{assemble, generate_candidates, Assembly, CandidateWindow};
pub use audio::{
    select_song_segment, slice_beats, BeatDetector, BeatGrid, BeatSlice, CommandBeatDetector,
    EnergyBeatDetector, SongRequest, SongSegment,
};
pub use config::EngineConfig;
pub use edl::{Edl, TimelineSegment, Transition};
pub use error::{ReelError, ReelResult};
pub use media::{FfmpegClient, FfmpegRenderer, MediaTools, NtscClient, ProxyClip, Renderer};
pub use paths::JobPaths;
pub use pipeline::{AnalyzeOutcome, JobManifest, JobRequest, JobRunner};
pub use scoring::{score_window, WindowFeatures};
pub use settings::{JobSettings, NtscPreset, SnapTo, SongMethod, VhsEngine, Vibe};
pub use status::{Artifacts, JobState, JobStatus, JobStep};
pub use tagging::{Captioner, FrameTagger, HeuristicTagger, HttpCaptioner, NoopCaptioner};
pub use tags::{FrameTag, FrameTagStore, ShotType, TagRecord};
