//! Job progress state machine
//!
//! A job moves `queued → preprocess → analyze → edl → render → done`. Each
//! stage consumes the previous stage's output, so stages run strictly in
//! sequence inside one job while separate jobs run concurrently on their own
//! tokio tasks. Only the analyze stage has a non-fatal failure path: a
//! tagging failure turns into [`AnalyzeOutcome::Degraded`] and the edl stage
//! falls back to the round-robin generator. Every other failure marks the job
//! `error` and is returned to the caller.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::assembly::assemble;
use crate::audio::{
    detector_from_config, select_from_audio, slice_beats, BeatDetector, BeatSlice, SongRequest,
    SongSegment,
};
use crate::config::EngineConfig;
use crate::edl::{Edl, TimelineSegment};
use crate::error::{ReelError, ReelResult};
use crate::fallback;
use crate::media::{
    ClipInput, FfmpegClient, FfmpegRenderer, MediaTools, ProxyClip, RenderRequest, Renderer,
    ANALYSIS_SAMPLE_RATE,
};
use crate::paths::{ensure_job_dirs, JobPaths};
use crate::settings::JobSettings;
use crate::status::{read_status, write_status, Artifacts, JobStatus, JobStep};
use crate::tagging::{FrameTagger, HeuristicTagger};
use crate::tags::{FrameTag, FrameTagStore};

pub const MAX_CLIPS: usize = 20;
pub const CLIP_EXTENSIONS: &[&str] = &["mp4", "mov", "webm"];
pub const SONG_EXTENSIONS: &[&str] = &["mp3", "m4a", "wav"];

/// A request to start a job from files already on disk.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub clips: Vec<PathBuf>,
    pub song: PathBuf,
    pub settings: JobSettings,
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn check_file(path: &Path, kind: &str, allowed: &[&str]) -> ReelResult<()> {
    match extension(path) {
        Some(ext) if allowed.contains(&ext.as_str()) => {}
        _ => {
            return Err(ReelError::Validation(format!(
                "Unsupported {kind} type: {} (expected one of {})",
                path.display(),
                allowed.join(", ")
            )))
        }
    }
    if !path.is_file() {
        return Err(ReelError::Validation(format!(
            "{kind} not found: {}",
            path.display()
        )));
    }
    Ok(())
}

impl JobRequest {
    /// Reject malformed requests before any job state exists.
    pub fn validate(&self) -> ReelResult<()> {
        if self.clips.is_empty() {
            return Err(ReelError::Validation("At least one clip is required".into()));
        }
        if self.clips.len() > MAX_CLIPS {
            return Err(ReelError::Validation(format!(
                "At most {MAX_CLIPS} clips are allowed, got {}",
                self.clips.len()
            )));
        }
        for clip in &self.clips {
            check_file(clip, "clip", CLIP_EXTENSIONS)?;
        }
        check_file(&self.song, "song", SONG_EXTENSIONS)?;
        self.settings.validate()?;

        let ids = clip_ids(self.clips.len());
        if let Some(unknown) = self
            .settings
            .locked_clips
            .iter()
            .find(|locked| !ids.contains(locked))
        {
            return Err(ReelError::Validation(format!(
                "Locked clip {unknown} is not part of the job"
            )));
        }
        Ok(())
    }
}

/// `c1..cN` in input order.
pub fn clip_ids(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("c{i}")).collect()
}

/// The `job.json` manifest written when a job is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobManifest {
    pub job_id: String,
    pub created_at: DateTime<Utc>,
    pub settings: JobSettings,
    pub clips: Vec<ClipInput>,
    pub song: PathBuf,
    pub song_name: String,
}

impl JobManifest {
    pub async fn load(path: &Path) -> ReelResult<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn save(&self, path: &Path) -> ReelResult<()> {
        tokio::fs::write(path, serde_json::to_string_pretty(self)?).await?;
        Ok(())
    }
}

/// Result of the analyze stage.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalyzeOutcome {
    Tagged(FrameTagStore),
    Degraded { reason: String },
}

impl AnalyzeOutcome {
    /// Tags worth scoring; `None` selects the fallback generator.
    pub fn tags(&self) -> Option<&FrameTagStore> {
        match self {
            AnalyzeOutcome::Tagged(store) if !store.is_empty() => Some(store),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineSource {
    Assembled { backfilled: bool },
    Fallback,
}

/// Cut list from tags when there are any, from the fallback generator otherwise.
pub fn plan_timeline(
    proxies: &[ProxyClip],
    outcome: &AnalyzeOutcome,
    settings: &JobSettings,
    seed: u64,
) -> ReelResult<(Vec<TimelineSegment>, TimelineSource)> {
    match outcome.tags() {
        Some(store) => {
            let assembly = assemble(proxies, store, settings, seed)?;
            Ok((
                assembly.timeline,
                TimelineSource::Assembled {
                    backfilled: assembly.backfilled,
                },
            ))
        }
        None => Ok((
            fallback::generate(proxies, settings, seed)?,
            TimelineSource::Fallback,
        )),
    }
}

/// Song window plus its beat map, when beats could be detected.
#[derive(Debug, Clone, PartialEq)]
pub struct SongPlan {
    pub segment: SongSegment,
    pub beats: Option<BeatSlice>,
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> ReelResult<()> {
    tokio::fs::write(path, serde_json::to_string_pretty(value)?).await?;
    Ok(())
}

#[derive(Clone)]
pub struct JobRunner {
    inner: Arc<JobRunnerInner>,
}

struct JobRunnerInner {
    jobs_root: PathBuf,
    media: Arc<dyn MediaTools>,
    renderer: Arc<dyn Renderer>,
    tagger: Arc<dyn FrameTagger>,
    beats: Arc<dyn BeatDetector>,
}

impl JobRunner {
    pub fn new(
        jobs_root: impl Into<PathBuf>,
        media: Arc<dyn MediaTools>,
        renderer: Arc<dyn Renderer>,
        tagger: Arc<dyn FrameTagger>,
        beats: Arc<dyn BeatDetector>,
    ) -> Self {
        Self {
            inner: Arc::new(JobRunnerInner {
                jobs_root: jobs_root.into(),
                media,
                renderer,
                tagger,
                beats,
            }),
        }
    }

    /// Runner backed by ffmpeg, ntsc-rs, the heuristic tagger and the
    /// configured beat detector.
    pub fn from_config(config: &EngineConfig) -> ReelResult<Self> {
        Ok(Self::new(
            &config.jobs_dir,
            Arc::new(FfmpegClient::from_config(config)),
            Arc::new(FfmpegRenderer::from_config(config)),
            Arc::new(HeuristicTagger::from_config(config)?),
            detector_from_config(config),
        ))
    }

    pub fn jobs_root(&self) -> &Path {
        &self.inner.jobs_root
    }

    pub fn paths(&self, job_id: &str) -> JobPaths {
        JobPaths::new(&self.inner.jobs_root, job_id)
    }

    pub async fn status(&self, job_id: &str) -> ReelResult<Option<JobStatus>> {
        read_status(&self.paths(job_id).status_path).await
    }

    /// Validate `request`, lay out the job directory, copy the inputs in and
    /// mark the job queued.
    pub async fn create_job(&self, request: JobRequest) -> ReelResult<JobManifest> {
        request.validate()?;

        let job_id = Uuid::new_v4().simple().to_string();
        let paths = ensure_job_dirs(&self.inner.jobs_root, &job_id).await?;

        let mut clips = Vec::with_capacity(request.clips.len());
        for (clip_id, source) in clip_ids(request.clips.len()).into_iter().zip(&request.clips) {
            let ext = extension(source).unwrap_or_default();
            let dest = paths.input_dir.join(format!("{clip_id}.{ext}"));
            tokio::fs::copy(source, &dest).await?;
            clips.push(ClipInput {
                clip_id,
                path: dest,
                original_name: file_name(source),
            });
        }

        let song_ext = extension(&request.song).unwrap_or_default();
        let song = paths.input_dir.join(format!("song.{song_ext}"));
        tokio::fs::copy(&request.song, &song).await?;

        let manifest = JobManifest {
            job_id: job_id.clone(),
            created_at: Utc::now(),
            settings: request.settings,
            clips,
            song,
            song_name: file_name(&request.song),
        };
        manifest.save(&paths.job_path).await?;
        write_status(&paths.status_path, &JobStatus::queued(&job_id)).await?;

        info!(job_id = %job_id, clips = manifest.clips.len(), "Created job");
        Ok(manifest)
    }

    /// Run the job on its own task.
    pub fn spawn(&self, manifest: JobManifest) -> JoinHandle<ReelResult<Artifacts>> {
        let runner = self.clone();
        tokio::spawn(async move { runner.run(&manifest).await })
    }

    /// Run every stage once, recording the terminal status.
    pub async fn run(&self, manifest: &JobManifest) -> ReelResult<Artifacts> {
        let paths = self.paths(&manifest.job_id);
        match self.run_stages(manifest, &paths).await {
            Ok(artifacts) => {
                let status = JobStatus::complete(&manifest.job_id, artifacts.clone());
                write_status(&paths.status_path, &status).await?;
                info!(job_id = %manifest.job_id, "Job complete");
                Ok(artifacts)
            }
            Err(err) => {
                error!(job_id = %manifest.job_id, error = %err, "Job failed");
                let status = JobStatus::failed(&manifest.job_id, err.to_string());
                if let Err(write_err) = write_status(&paths.status_path, &status).await {
                    warn!(job_id = %manifest.job_id, error = %write_err, "Could not record failure");
                }
                Err(err)
            }
        }
    }

    async fn set_step(&self, paths: &JobPaths, job_id: &str, step: JobStep, message: &str) -> ReelResult<()> {
        info!(job_id, step = step.as_str(), "{message}");
        write_status(&paths.status_path, &JobStatus::running(job_id, step, message)).await
    }

    async fn run_stages(&self, manifest: &JobManifest, paths: &JobPaths) -> ReelResult<Artifacts> {
        let job_id = manifest.job_id.as_str();
        let settings = &manifest.settings;
        let seed = settings.resolve_seed();

        self.set_step(paths, job_id, JobStep::Preprocess, "Creating proxies").await?;
        let proxies = self.preprocess(manifest, paths).await?;

        let outcome = self.analyze_step(job_id, &proxies, paths).await?;

        self.set_step(paths, job_id, JobStep::Edl, "Building edit decision list").await?;
        let (timeline, source) = plan_timeline(&proxies, &outcome, settings, seed)?;
        let edl = Edl::new(settings, seed, timeline);
        edl.write(&paths.edl_path).await?;
        info!(
            job_id,
            seed,
            segments = edl.timeline.len(),
            duration = edl.total_duration(),
            source = ?source,
            "Wrote EDL"
        );
        let song = self.plan_song(&manifest.song, settings, paths).await?;

        self.set_step(paths, job_id, JobStep::Render, "Rendering").await?;
        if edl.timeline.is_empty() {
            return Err(ReelError::EmptyTimeline);
        }
        let request = RenderRequest {
            timeline: &edl.timeline,
            proxies: &proxies,
            settings,
            seed,
            song_path: &manifest.song,
            song: &song.segment,
            output_dir: &paths.output_dir,
        };
        let rendered = self.inner.renderer.render(&request).await?;

        Ok(Artifacts {
            preview: rendered.preview_path,
            final_path: rendered.final_path,
            edl: paths.edl_path.clone(),
        })
    }

    /// Normalize every clip and measure the proxy durations.
    pub async fn preprocess(&self, manifest: &JobManifest, paths: &JobPaths) -> ReelResult<Vec<ProxyClip>> {
        let include_audio = manifest.settings.include_clip_audio;
        let mut proxies = Vec::with_capacity(manifest.clips.len());
        for clip in &manifest.clips {
            let output = paths.proxy_path(&clip.clip_id);
            self.inner.media.make_proxy(clip, &output, include_audio).await?;
            let duration_s = self.inner.media.probe_duration(&output).await?;
            debug!(clip_id = %clip.clip_id, duration_s, "Created proxy");
            proxies.push(ProxyClip::new(&clip.clip_id, output, duration_s));
        }
        Ok(proxies)
    }

    /// The analyze step with its status updates. A degraded outcome is
    /// reported in the status message before the EDL step starts.
    pub async fn analyze_step(
        &self,
        job_id: &str,
        proxies: &[ProxyClip],
        paths: &JobPaths,
    ) -> ReelResult<AnalyzeOutcome> {
        self.set_step(paths, job_id, JobStep::Analyze, "Tagging frames").await?;
        let outcome = self.analyze(proxies, paths).await;
        if let AnalyzeOutcome::Degraded { reason } = &outcome {
            let message = format!("Tagging unavailable, using fallback timeline: {reason}");
            self.set_step(paths, job_id, JobStep::Analyze, &message).await?;
        }
        Ok(outcome)
    }

    /// Tag one frame per second of every proxy. Never fails the job.
    pub async fn analyze(&self, proxies: &[ProxyClip], paths: &JobPaths) -> AnalyzeOutcome {
        match self.tag_clips(proxies, paths).await {
            Ok(store) => {
                debug!(tags = store.len(), "Tagged proxies");
                AnalyzeOutcome::Tagged(store)
            }
            Err(err) => {
                warn!(error = %err, "Tagging failed, degrading to fallback timeline");
                AnalyzeOutcome::Degraded {
                    reason: err.to_string(),
                }
            }
        }
    }

    async fn tag_clips(&self, proxies: &[ProxyClip], paths: &JobPaths) -> ReelResult<FrameTagStore> {
        let mut store = FrameTagStore::new();
        for proxy in proxies.iter().filter(|p| p.duration_s > 0.0) {
            let frames = self
                .inner
                .media
                .extract_frames(&proxy.path, &paths.clip_frames_dir(&proxy.clip_id))
                .await?;
            for (second, frame) in frames.iter().enumerate() {
                let record = self.inner.tagger.tag_frame(frame).await?;
                store.insert(FrameTag::new(&proxy.clip_id, second as u32, record));
            }
        }
        store.save(&paths.tags_path).await?;
        Ok(store)
    }

    /// Pick the song window and persist it with its beat map.
    ///
    /// A song that cannot be decoded is fatal; a beat detector failure only
    /// disables snapping.
    pub async fn plan_song(&self, song: &Path, settings: &JobSettings, paths: &JobPaths) -> ReelResult<SongPlan> {
        let audio = self.inner.media.decode_mono(song, ANALYSIS_SAMPLE_RATE).await?;
        let grid = match self.inner.beats.detect(song, &audio).await {
            Ok(grid) => Some(grid),
            Err(err) => {
                warn!(error = %err, "Beat detection failed, song window will not snap");
                None
            }
        };

        let segment = select_from_audio(&audio, &SongRequest::from_settings(settings), grid.as_ref());
        write_json(&paths.song_segment_path, &segment).await?;

        let beats = grid.map(|g| slice_beats(&g, segment.start_s, segment.end_s));
        if let Some(slice) = &beats {
            write_json(&paths.beats_path, slice).await?;
        }
        debug!(
            start_s = segment.start_s,
            end_s = segment.end_s,
            loop_audio = segment.loop_audio,
            "Selected song segment"
        );
        Ok(SongPlan { segment, beats })
    }

    /// Rebuild the EDL of an existing job from its proxies and tags.
    ///
    /// Uses `seed` when given, else the seed recorded in the job's EDL, else
    /// the settings seed. Nothing is written.
    pub async fn replan(&self, job_id: &str, seed: Option<u64>) -> ReelResult<Edl> {
        let paths = self.paths(job_id);
        let manifest = JobManifest::load(&paths.job_path).await?;

        let recorded = match Edl::read(&paths.edl_path).await {
            Ok(edl) => Some(edl.settings.seed),
            Err(_) => None,
        };
        let seed = seed
            .or(recorded)
            .or(manifest.settings.seed)
            .ok_or_else(|| ReelError::Validation(format!("Job {job_id} has no recorded seed")))?;

        let mut proxies = Vec::new();
        for clip in &manifest.clips {
            let path = paths.proxy_path(&clip.clip_id);
            if !path.exists() {
                return Err(ReelError::MissingProxy(clip.clip_id.clone()));
            }
            let duration_s = self.inner.media.probe_duration(&path).await?;
            proxies.push(ProxyClip::new(&clip.clip_id, path, duration_s));
        }

        let outcome = if paths.tags_path.exists() {
            AnalyzeOutcome::Tagged(FrameTagStore::load(&paths.tags_path).await?)
        } else {
            AnalyzeOutcome::Degraded {
                reason: "no tags recorded".to_string(),
            }
        };

        let (timeline, source) = plan_timeline(&proxies, &outcome, &manifest.settings, seed)?;
        debug!(job_id, seed, source = ?source, "Replanned timeline");
        Ok(Edl::new(&manifest.settings, seed, timeline))
    }
}
