//! FFmpeg wrapper for proxies, probing, frame sampling and audio decoding

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use super::{ClipInput, MediaTools, MonoAudio, PROXY_FPS, PROXY_HEIGHT, PROXY_WIDTH};
use crate::config::EngineConfig;
use crate::error::{ReelError, ReelResult};

/// Width of sampled analysis frames
const FRAME_SAMPLE_WIDTH: u32 = 384;
const STDERR_TAIL_LINES: usize = 12;

/// FFmpeg client for media processing
#[derive(Debug, Clone)]
pub struct FfmpegClient {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
}

impl FfmpegClient {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(&config.ffmpeg_path, &config.ffprobe_path)
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg_path
    }

    /// Run ffmpeg with `args`, failing with the tail of stderr on a non-zero exit.
    pub async fn run(&self, args: &[String]) -> ReelResult<()> {
        debug!(args = %args.join(" "), "Running ffmpeg");
        let output = Command::new(&self.ffmpeg_path)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ReelError::tool("ffmpeg", e.to_string()))?;

        if !output.status.success() {
            return Err(ReelError::tool(
                "ffmpeg",
                stderr_tail(&output.stderr, output.status.to_string()),
            ));
        }
        Ok(())
    }

    /// Mean luma of an image, normalized to 0..1.
    pub async fn mean_brightness(&self, image: &Path) -> ReelResult<f64> {
        if !image.exists() {
            return Err(ReelError::FileNotFound(image.to_path_buf()));
        }

        let output = Command::new(&self.ffmpeg_path)
            .args(["-hide_banner", "-nostats", "-i"])
            .arg(image)
            .args([
                "-vf",
                "signalstats,metadata=mode=print:key=lavfi.signalstats.YAVG",
                "-f",
                "null",
                "-",
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ReelError::tool("ffmpeg", e.to_string()))?;

        if !output.status.success() {
            return Err(ReelError::tool(
                "ffmpeg",
                stderr_tail(&output.stderr, output.status.to_string()),
            ));
        }

        let text = String::from_utf8_lossy(&output.stderr);
        parse_yavg(&text)
            .map(|yavg| (yavg / 255.0).clamp(0.0, 1.0))
            .ok_or_else(|| ReelError::tool("ffmpeg", format!("No luma statistics for {}", image.display())))
    }
}

/// Last lines of a tool's stderr, or `fallback` when it printed nothing.
pub(crate) fn stderr_tail(stderr: &[u8], fallback: String) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.trim().lines().collect();
    if lines.is_empty() {
        return fallback;
    }
    lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n")
}

/// `format.duration` from `ffprobe -of json` output.
fn parse_duration(raw: &[u8]) -> Option<f64> {
    let json: Value = serde_json::from_slice(raw).ok()?;
    match &json["format"]["duration"] {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Mean of every `lavfi.signalstats.YAVG=` value in the metadata log.
fn parse_yavg(text: &str) -> Option<f64> {
    let values: Vec<f64> = text
        .lines()
        .filter_map(|line| line.split_once("lavfi.signalstats.YAVG="))
        .filter_map(|(_, value)| value.trim().parse().ok())
        .collect();
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn proxy_args(input: &Path, output: &Path, include_audio: bool) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-vf".to_string(),
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1",
            w = PROXY_WIDTH,
            h = PROXY_HEIGHT
        ),
        "-r".to_string(),
        PROXY_FPS.to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-crf".to_string(),
        "28".to_string(),
    ];
    if include_audio {
        args.extend(["-c:a", "aac", "-b:a", "128k"].map(String::from));
    } else {
        args.push("-an".to_string());
    }
    args.push(output.to_string_lossy().to_string());
    args
}

fn decode_f32le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[async_trait]
impl MediaTools for FfmpegClient {
    async fn make_proxy(
        &self,
        clip: &ClipInput,
        output: &Path,
        include_audio: bool,
    ) -> ReelResult<()> {
        if !clip.path.exists() {
            return Err(ReelError::FileNotFound(clip.path.clone()));
        }
        self.run(&proxy_args(&clip.path, output, include_audio)).await
    }

    async fn probe_duration(&self, path: &Path) -> ReelResult<f64> {
        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "error", "-show_entries", "format=duration", "-of", "json"])
            .arg(path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ReelError::tool("ffprobe", e.to_string()))?;

        if !output.status.success() {
            return Err(ReelError::tool(
                "ffprobe",
                stderr_tail(&output.stderr, output.status.to_string()),
            ));
        }

        parse_duration(&output.stdout)
            .ok_or_else(|| ReelError::tool("ffprobe", format!("Missing duration for {}", path.display())))
    }

    async fn extract_frames(&self, proxy: &Path, out_dir: &Path) -> ReelResult<Vec<PathBuf>> {
        tokio::fs::create_dir_all(out_dir).await?;
        let pattern = out_dir.join("frame_%05d.jpg");
        let args = vec![
            "-y".to_string(),
            "-i".to_string(),
            proxy.to_string_lossy().to_string(),
            "-vf".to_string(),
            format!("fps=1,scale={FRAME_SAMPLE_WIDTH}:-2"),
            "-q:v".to_string(),
            "3".to_string(),
            pattern.to_string_lossy().to_string(),
        ];
        self.run(&args).await?;

        let mut frames = Vec::new();
        let mut entries = tokio::fs::read_dir(out_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_frame = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("frame_") && n.ends_with(".jpg"))
                .unwrap_or(false);
            if is_frame {
                frames.push(path);
            }
        }
        // zero padded names sort in timestamp order
        frames.sort();
        Ok(frames)
    }

    async fn decode_mono(&self, song: &Path, sample_rate: u32) -> ReelResult<MonoAudio> {
        if !song.exists() {
            return Err(ReelError::FileNotFound(song.to_path_buf()));
        }

        let output = Command::new(&self.ffmpeg_path)
            .args(["-v", "error", "-i"])
            .arg(song)
            .args(["-ac", "1", "-ar", &sample_rate.to_string(), "-f", "f32le", "-"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ReelError::tool("ffmpeg", e.to_string()))?;

        if !output.status.success() {
            return Err(ReelError::tool(
                "ffmpeg",
                stderr_tail(&output.stderr, output.status.to_string()),
            ));
        }

        Ok(MonoAudio {
            samples: decode_f32le(&output.stdout),
            sample_rate,
        })
    }
}
