//! Final reel render: cut list to base video, VHS pass, preview.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use super::{FfmpegClient, NtscClient, RenderArtifacts, RenderRequest, Renderer};
use crate::config::EngineConfig;
use crate::edl::round3;
use crate::error::{ReelError, ReelResult};
use crate::settings::{NtscPreset, VhsEngine};

const PREVIEW_WIDTH: u32 = 720;
const PREVIEW_HEIGHT: u32 = 1280;
const DYNAMIC_MIN_S: f64 = 1.6;
const DYNAMIC_MAX_S: f64 = 4.0;
/// Offset added to the job seed for dynamic VHS segmentation.
const DYNAMIC_SEED_OFFSET: u64 = 77;
/// Clip audio level under the music when clip audio is kept.
const CLIP_AUDIO_WEIGHT: f64 = 0.35;

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

fn h264(crf: u32) -> Vec<String> {
    strings(&["-c:v", "libx264", "-preset", "veryfast", "-crf", &crf.to_string()])
}

/// ffmpeg filter chain approximating a worn tape at `intensity` 0..1.
pub fn vhs_filter(intensity: f64) -> String {
    let intensity = intensity.clamp(0.0, 1.0);
    let noise = 6.0 + intensity * 18.0;
    let chroma = 1.0 + intensity * 3.0;
    let contrast = 1.0 + intensity * 0.08;
    let saturation = 1.0 + intensity * 0.2;
    let scan_alpha = 0.05 + intensity * 0.18;

    format!(
        "noise=alls={noise:.0}:allf=t+u,\
         eq=contrast={contrast:.3}:saturation={saturation:.3}:brightness=0.02,\
         chromashift=crh={chroma:.0}:crv={chroma:.0},\
         drawgrid=width=iw:height=3:thickness=1:color=black@{scan_alpha:.3}"
    )
}

/// Random `[start, end)` pieces of 1.6..4.0 s covering `total` seconds.
pub fn dynamic_segments(total: f64, rng: &mut StdRng) -> Vec<(f64, f64)> {
    let mut segments = Vec::new();
    let mut cursor = 0.0;
    while cursor < total - 0.01 {
        let len = rng.gen_range(DYNAMIC_MIN_S..=DYNAMIC_MAX_S);
        let end = total.min(cursor + len);
        segments.push((round3(cursor), round3(end)));
        cursor = end;
    }
    segments
}

/// Arguments for the base render: every segment trimmed from its own proxy
/// input, concatenated, scaled, with the song window underneath.
pub fn base_render_args(request: &RenderRequest<'_>, output: &Path) -> ReelResult<Vec<String>> {
    let timeline = request.timeline;
    if timeline.is_empty() {
        return Err(ReelError::EmptyTimeline);
    }

    let settings = request.settings;
    let resolution = settings.resolution();
    let target = settings.target_length_s;
    let n = timeline.len();

    let mut args = strings(&["-y"]);
    for segment in timeline {
        let proxy = request
            .proxy(&segment.clip_id)
            .ok_or_else(|| ReelError::MissingProxy(segment.clip_id.clone()))?;
        args.push("-i".to_string());
        args.push(proxy.path.to_string_lossy().to_string());
    }

    if request.song.loop_audio {
        args.extend(strings(&["-stream_loop", "-1"]));
    } else {
        args.extend(["-ss".to_string(), format!("{:.3}", request.song.start_s)]);
    }
    args.push("-i".to_string());
    args.push(request.song_path.to_string_lossy().to_string());

    let mut filters = Vec::new();
    for (i, segment) in timeline.iter().enumerate() {
        filters.push(format!(
            "[{i}:v]trim=start={:.3}:end={:.3},setpts=PTS-STARTPTS[v{i}]",
            segment.in_s, segment.out_s
        ));
    }
    let video_inputs: String = (0..n).map(|i| format!("[v{i}]")).collect();
    filters.push(format!("{video_inputs}concat=n={n}:v=1:a=0[vcat]"));
    filters.push(format!(
        "[vcat]fps={},scale={}:{}:flags=lanczos,format=yuv420p[vbase]",
        settings.fps, resolution.width, resolution.height
    ));

    let song_index = n;
    if settings.include_clip_audio {
        filters.push(format!(
            "[{song_index}:a]atrim=0:{target:.3},asetpts=PTS-STARTPTS[music]"
        ));
        for (i, segment) in timeline.iter().enumerate() {
            filters.push(format!(
                "[{i}:a]atrim=start={:.3}:end={:.3},asetpts=PTS-STARTPTS[a{i}]",
                segment.in_s, segment.out_s
            ));
        }
        let audio_inputs: String = (0..n).map(|i| format!("[a{i}]")).collect();
        filters.push(format!("{audio_inputs}concat=n={n}:v=0:a=1[clipaudio]"));
        filters.push(format!(
            "[music][clipaudio]amix=inputs=2:duration=first:weights='1 {CLIP_AUDIO_WEIGHT}'[aout]"
        ));
    } else {
        filters.push(format!(
            "[{song_index}:a]atrim=0:{target:.3},asetpts=PTS-STARTPTS[aout]"
        ));
    }

    args.push("-filter_complex".to_string());
    args.push(filters.join(";"));
    args.extend(strings(&["-map", "[vbase]", "-map", "[aout]"]));
    args.extend(h264(20));
    args.extend(strings(&["-c:a", "aac", "-b:a", "192k", "-movflags", "+faststart", "-shortest"]));
    args.push(output.to_string_lossy().to_string());
    Ok(args)
}

fn mux_args(video: &Path, audio_source: &Path, output: &Path, reencode: bool) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-i".to_string(),
        video.to_string_lossy().to_string(),
        "-i".to_string(),
        audio_source.to_string_lossy().to_string(),
    ];
    args.extend(strings(&["-map", "0:v:0", "-map", "1:a:0"]));
    if reencode {
        args.extend(h264(20));
        args.extend(strings(&["-c:a", "aac", "-b:a", "192k"]));
    } else {
        args.extend(strings(&["-c:v", "copy", "-c:a", "copy"]));
    }
    args.extend(strings(&["-movflags", "+faststart", "-shortest"]));
    args.push(output.to_string_lossy().to_string());
    args
}

fn preview_args(input: &Path, output: &Path) -> Vec<String> {
    let mut args = vec!["-y".to_string(), "-i".to_string(), input.to_string_lossy().to_string()];
    args.extend([
        "-vf".to_string(),
        format!("scale={PREVIEW_WIDTH}:{PREVIEW_HEIGHT}:flags=lanczos"),
    ]);
    args.extend(h264(28));
    args.extend(strings(&["-c:a", "aac", "-b:a", "128k", "-movflags", "+faststart"]));
    args.push(output.to_string_lossy().to_string());
    args
}

/// Renders through ffmpeg, with ntsc-rs for the VHS look when selected.
#[derive(Debug, Clone)]
pub struct FfmpegRenderer {
    ffmpeg: FfmpegClient,
    ntsc: NtscClient,
}

impl FfmpegRenderer {
    pub fn new(ffmpeg: FfmpegClient, ntsc: NtscClient) -> Self {
        Self { ffmpeg, ntsc }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(FfmpegClient::from_config(config), NtscClient::from_config(config))
    }

    async fn render_dynamic_ntsc(
        &self,
        base: &Path,
        output_dir: &Path,
        total: f64,
        seed: u64,
    ) -> ReelResult<PathBuf> {
        let pool = self.ntsc.dynamic_pool();
        if pool.is_empty() {
            return Err(ReelError::tool("ntsc-rs", "No presets available for dynamic mode"));
        }

        let segment_dir = output_dir.join("ntsc_segments");
        tokio::fs::create_dir_all(&segment_dir).await?;

        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(DYNAMIC_SEED_OFFSET));
        let segments = dynamic_segments(total, &mut rng);
        let mut processed = Vec::with_capacity(segments.len());

        for (idx, (start, end)) in segments.iter().enumerate() {
            let n = idx + 1;
            let cut = segment_dir.join(format!("seg_{n:02}.mp4"));
            let mut args = vec![
                "-y".to_string(),
                "-ss".to_string(),
                format!("{start:.3}"),
                "-to".to_string(),
                format!("{end:.3}"),
                "-i".to_string(),
                base.to_string_lossy().to_string(),
            ];
            args.extend(h264(20));
            args.push("-an".to_string());
            args.push(cut.to_string_lossy().to_string());
            self.ffmpeg.run(&args).await?;

            let source = pool
                .choose(&mut rng)
                .ok_or_else(|| ReelError::tool("ntsc-rs", "Empty preset pool"))?;
            let preset = segment_dir.join(format!("preset_{n:02}.json"));
            let preset_seed = rng.gen_range(0..=i32::MAX as u32);
            NtscClient::write_seeded_preset(source, &preset, preset_seed).await?;

            let vhs = segment_dir.join(format!("seg_{n:02}_ntsc.mp4"));
            self.ntsc.run(&cut, &vhs, &preset).await?;
            processed.push(vhs);
        }

        let list = segment_dir.join("concat.txt");
        let content: String = processed
            .iter()
            .map(|p| format!("file '{}'\n", p.to_string_lossy()))
            .collect();
        tokio::fs::write(&list, content).await?;

        let ntsc_path = output_dir.join("ntsc.mp4");
        let mut args = strings(&["-y", "-f", "concat", "-safe", "0", "-i"]);
        args.push(list.to_string_lossy().to_string());
        args.extend(h264(20));
        args.push("-an".to_string());
        args.push(ntsc_path.to_string_lossy().to_string());
        self.ffmpeg.run(&args).await?;

        Ok(ntsc_path)
    }
}

#[async_trait]
impl Renderer for FfmpegRenderer {
    async fn render(&self, request: &RenderRequest<'_>) -> ReelResult<RenderArtifacts> {
        let settings = request.settings;
        let output_dir = request.output_dir;
        tokio::fs::create_dir_all(output_dir).await?;

        let base = output_dir.join("base.mp4");
        self.ffmpeg.run(&base_render_args(request, &base)?).await?;
        info!(segments = request.timeline.len(), "Rendered base video");

        let final_path = output_dir.join("final.mp4");
        match settings.vhs_engine {
            VhsEngine::NtscRs => {
                let ntsc_path = if settings.ntsc_preset == NtscPreset::Dynamic {
                    self.render_dynamic_ntsc(&base, output_dir, settings.target_length_s, request.seed)
                        .await?
                } else {
                    let preset = self
                        .ntsc
                        .resolve_preset(settings.ntsc_preset, settings.vhs_intensity)?;
                    let ntsc_path = output_dir.join("ntsc.mp4");
                    self.ntsc.run(&base, &ntsc_path, &preset).await?;
                    ntsc_path
                };

                if let Err(e) = self.ffmpeg.run(&mux_args(&ntsc_path, &base, &final_path, false)).await {
                    warn!(error = %e, "Stream copy mux failed, re-encoding");
                    self.ffmpeg
                        .run(&mux_args(&ntsc_path, &base, &final_path, true))
                        .await?;
                }
            }
            VhsEngine::Ffmpeg => {
                let mut args = vec![
                    "-y".to_string(),
                    "-i".to_string(),
                    base.to_string_lossy().to_string(),
                    "-vf".to_string(),
                    format!("{},format=yuv420p", vhs_filter(settings.vhs_intensity)),
                ];
                args.extend(h264(20));
                args.extend(strings(&["-c:a", "copy", "-movflags", "+faststart", "-shortest"]));
                args.push(final_path.to_string_lossy().to_string());
                self.ffmpeg.run(&args).await?;
            }
        }

        let preview_path = output_dir.join("preview.mp4");
        self.ffmpeg.run(&preview_args(&final_path, &preview_path)).await?;

        Ok(RenderArtifacts {
            final_path,
            preview_path,
        })
    }
}
