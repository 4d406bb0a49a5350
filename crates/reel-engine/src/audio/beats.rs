//! Beat detection and the Beat Window Slicer.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use super::envelope::block_energy;
use crate::config::EngineConfig;
use crate::edl::round3;
use crate::error::{ReelError, ReelResult};
use crate::media::MonoAudio;

const ONSET_HOP: usize = 512;
const ONSET_THRESHOLD: f64 = 0.3;
const MIN_BPM: f64 = 70.0;
const MAX_BPM: f64 = 180.0;
const BEATS_PER_BAR: usize = 4;

/// Tempo and beat times of a whole song, in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeatGrid {
    pub tempo: f64,
    #[serde(default)]
    pub beats: Vec<f64>,
    #[serde(default)]
    pub downbeats: Vec<f64>,
}

/// Beat map local to a chosen song window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeatSlice {
    pub tempo: f64,
    pub beats: Vec<f64>,
    pub downbeats: Vec<f64>,
    pub segment_start_s: f64,
    pub segment_end_s: f64,
}

/// Keep the beats inside `[start_s, end_s]` and rebase them onto the window.
pub fn slice_beats(grid: &BeatGrid, start_s: f64, end_s: f64) -> BeatSlice {
    let slice = |times: &[f64]| -> Vec<f64> {
        times
            .iter()
            .filter(|t| (start_s..=end_s).contains(*t))
            .map(|t| round3(t - start_s))
            .collect()
    };

    BeatSlice {
        tempo: grid.tempo,
        beats: slice(&grid.beats),
        downbeats: slice(&grid.downbeats),
        segment_start_s: round3(start_s),
        segment_end_s: round3(end_s),
    }
}

/// Whole-song tempo and beat extraction.
#[async_trait]
pub trait BeatDetector: Send + Sync {
    async fn detect(&self, song: &Path, audio: &MonoAudio) -> ReelResult<BeatGrid>;
}

/// Onset-energy beat tracker working on already decoded audio.
#[derive(Debug, Clone, Default)]
pub struct EnergyBeatDetector;

impl EnergyBeatDetector {
    pub fn new() -> Self {
        Self
    }

    /// Times of local maxima of the normalized positive energy flux.
    fn onsets(audio: &MonoAudio) -> Vec<f64> {
        let energy = block_energy(&audio.samples, ONSET_HOP);
        let mut flux: Vec<f64> = std::iter::once(0.0)
            .chain(energy.windows(2).map(|w| (w[1] - w[0]).max(0.0)))
            .collect();

        let peak = flux.iter().cloned().fold(0.0, f64::max);
        if peak <= 0.0 || flux.len() < 3 {
            return Vec::new();
        }
        flux.iter_mut().for_each(|f| *f /= peak);

        let hop_s = ONSET_HOP as f64 / audio.sample_rate as f64;
        (1..flux.len() - 1)
            .filter(|&i| {
                flux[i] > ONSET_THRESHOLD && flux[i] > flux[i - 1] && flux[i] >= flux[i + 1]
            })
            .map(|i| i as f64 * hop_s)
            .collect()
    }

    /// Median inter-onset interval as BPM, folded into the 70..=180 range.
    fn tempo(onsets: &[f64]) -> Option<f64> {
        let mut intervals: Vec<f64> = onsets
            .windows(2)
            .map(|w| w[1] - w[0])
            .filter(|d| *d > 0.0)
            .collect();
        if intervals.is_empty() {
            return None;
        }
        intervals.sort_by(|a, b| a.total_cmp(b));
        let mid = intervals.len() / 2;
        let median = if intervals.len() % 2 == 0 {
            (intervals[mid - 1] + intervals[mid]) / 2.0
        } else {
            intervals[mid]
        };

        let mut bpm = 60.0 / median;
        while bpm < MIN_BPM {
            bpm *= 2.0;
        }
        while bpm > MAX_BPM {
            bpm /= 2.0;
        }
        Some(bpm)
    }

    pub fn analyze(audio: &MonoAudio) -> BeatGrid {
        if audio.sample_rate == 0 {
            return BeatGrid::default();
        }
        let onsets = Self::onsets(audio);
        let Some(bpm) = Self::tempo(&onsets) else {
            return BeatGrid::default();
        };

        let interval = 60.0 / bpm;
        let duration = audio.duration_s();
        let mut beats = Vec::new();
        let mut t = onsets[0];
        while t < duration {
            beats.push(round3(t));
            t += interval;
        }
        let downbeats = beats.iter().step_by(BEATS_PER_BAR).copied().collect();

        BeatGrid {
            tempo: (bpm * 100.0).round() / 100.0,
            beats,
            downbeats,
        }
    }
}

#[async_trait]
impl BeatDetector for EnergyBeatDetector {
    async fn detect(&self, _song: &Path, audio: &MonoAudio) -> ReelResult<BeatGrid> {
        let grid = Self::analyze(audio);
        debug!(tempo = grid.tempo, beats = grid.beats.len(), "Detected beats from energy");
        Ok(grid)
    }
}

/// Runs an external beat tracker that prints a [`BeatGrid`] as JSON.
#[derive(Debug, Clone)]
pub struct CommandBeatDetector {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandBeatDetector {
    /// Parse a command line such as `beat-track --json`; the song path is
    /// appended as the last argument.
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace();
        let program = PathBuf::from(parts.next()?);
        Some(Self {
            program,
            args: parts.map(str::to_string).collect(),
        })
    }
}

#[async_trait]
impl BeatDetector for CommandBeatDetector {
    async fn detect(&self, song: &Path, _audio: &MonoAudio) -> ReelResult<BeatGrid> {
        let tool = self.program.display().to_string();
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(song)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ReelError::tool(&tool, e.to_string()))?;

        if !output.status.success() {
            return Err(ReelError::tool(
                tool,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let mut grid: BeatGrid = serde_json::from_slice(&output.stdout)?;
        grid.beats.iter_mut().for_each(|t| *t = round3(*t));
        grid.downbeats.iter_mut().for_each(|t| *t = round3(*t));
        Ok(grid)
    }
}

/// The configured external tracker, or the energy tracker when none is set.
pub fn detector_from_config(config: &EngineConfig) -> Arc<dyn BeatDetector> {
    match config
        .beats_command
        .as_deref()
        .and_then(CommandBeatDetector::from_command_line)
    {
        Some(command) => Arc::new(command),
        None => Arc::new(EnergyBeatDetector::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Short clicks every `period` seconds starting at `offset`.
    fn click_track(period: f64, offset: f64, seconds: f64) -> MonoAudio {
        let sample_rate = 22_050;
        let total = (seconds * sample_rate as f64) as usize;
        let mut samples = vec![0.0f32; total];
        let click = (0.02 * sample_rate as f64) as usize;
        let mut t = offset;
        while t < seconds {
            let start = (t * sample_rate as f64) as usize;
            for s in samples.iter_mut().skip(start).take(click) {
                *s = 0.9;
            }
            t += period;
        }
        MonoAudio {
            samples,
            sample_rate,
        }
    }

    #[test]
    fn test_slice_rebases_inclusive_window() {
        let grid = BeatGrid {
            tempo: 128.0,
            beats: vec![9.5, 10.0, 10.4689, 15.0, 20.0, 20.5],
            downbeats: vec![10.0, 20.0, 24.0],
        };
        let slice = slice_beats(&grid, 10.0, 20.0);
        assert_eq!(slice.tempo, 128.0);
        assert_eq!(slice.beats, vec![0.0, 0.469, 5.0, 10.0]);
        assert_eq!(slice.downbeats, vec![0.0, 10.0]);
        assert_eq!((slice.segment_start_s, slice.segment_end_s), (10.0, 20.0));
    }

    #[test]
    fn test_slice_wire_format() {
        let slice = slice_beats(&BeatGrid::default(), 1.23456, 2.0);
        let value = serde_json::to_value(&slice).unwrap();
        assert_eq!(value["segment_start_s"], 1.235);
        assert!(value["beats"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_energy_detector_finds_click_tempo() {
        let audio = click_track(0.5, 0.25, 8.0);
        let grid = EnergyBeatDetector::analyze(&audio);
        assert!((100.0..=140.0).contains(&grid.tempo), "tempo {}", grid.tempo);
        assert!(grid.beats.len() >= 12);
        assert!((grid.beats[0] - 0.25).abs() < 0.05);
        assert_eq!(grid.downbeats[0], grid.beats[0]);
        assert_eq!(grid.downbeats[1], grid.beats[4]);
    }

    #[test]
    fn test_tempo_folds_into_range() {
        // one onset every 2s is 30 BPM, folded twice
        assert_eq!(EnergyBeatDetector::tempo(&[0.0, 2.0, 4.0]), Some(120.0));
        // every 0.2s is 300 BPM
        assert_eq!(EnergyBeatDetector::tempo(&[0.0, 0.2, 0.4, 0.6]), Some(150.0));
        assert_eq!(EnergyBeatDetector::tempo(&[1.0]), None);
    }

    #[test]
    fn test_silence_has_no_beats() {
        let audio = MonoAudio {
            samples: vec![0.0; 22_050],
            sample_rate: 22_050,
        };
        assert_eq!(EnergyBeatDetector::analyze(&audio), BeatGrid::default());
    }

    #[test]
    fn test_command_line_parsing() {
        let detector = CommandBeatDetector::from_command_line("beat-track --json  --sr 22050").unwrap();
        assert_eq!(detector.program, PathBuf::from("beat-track"));
        assert_eq!(detector.args, vec!["--json", "--sr", "22050"]);
        assert!(CommandBeatDetector::from_command_line("   ").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_detector_reads_json() {
        let detector = CommandBeatDetector {
            program: PathBuf::from("sh"),
            args: vec![
                "-c".to_string(),
                r#"echo '{"tempo":96.0,"beats":[0.5,1.1254],"downbeats":[0.5]}'"#.to_string(),
            ],
        };
        let audio = MonoAudio {
            samples: Vec::new(),
            sample_rate: 22_050,
        };
        let grid = detector.detect(Path::new("song.mp3"), &audio).await.unwrap();
        assert_eq!(grid.tempo, 96.0);
        assert_eq!(grid.beats, vec![0.5, 1.125]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_detector_failure_is_tool_error() {
        let detector = CommandBeatDetector {
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), "echo boom >&2; exit 3".to_string()],
        };
        let audio = MonoAudio {
            samples: Vec::new(),
            sample_rate: 22_050,
        };
        let err = detector.detect(Path::new("song.mp3"), &audio).await.unwrap_err();
        assert!(matches!(err, ReelError::ExternalTool { ref message, .. } if message == "boom"));
    }
}
