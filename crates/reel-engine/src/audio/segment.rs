//! Song Segment Selector
//!
//! Chooses which `target_length_s` stretch of the song plays under the reel:
//! either a manual offset or the loudest window of the energy curve, then
//! optionally snapped onto the beat grid.

use serde::{Deserialize, Serialize};

use super::beats::BeatGrid;
use super::envelope::{song_energy, ENERGY_HOP_S};
use crate::edl::round3;
use crate::media::MonoAudio;
use crate::settings::{JobSettings, SnapTo, SongMethod};

/// Songs shorter than the target plus this margin are looped instead of cut.
pub const LOOP_MARGIN_S: f64 = 0.25;
/// Largest distance a start time moves when snapping to the beat grid.
pub const SNAP_WINDOW_S: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongSegment {
    pub start_s: f64,
    pub end_s: f64,
    pub method: SongMethod,
    pub snap: SnapTo,
    /// The song is shorter than the target and is looped at render time.
    pub loop_audio: bool,
}

impl SongSegment {
    pub fn length_s(&self) -> f64 {
        self.end_s - self.start_s
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SongRequest {
    pub target_length_s: f64,
    pub method: SongMethod,
    pub min_start_s: f64,
    pub snap_to: SnapTo,
}

impl SongRequest {
    pub fn from_settings(settings: &JobSettings) -> Self {
        Self {
            target_length_s: settings.target_length_s,
            method: settings.song_method,
            min_start_s: settings.song_start_s,
            snap_to: settings.snap_to,
        }
    }
}

fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    lo.max(hi.min(value))
}

/// Index of the `window`-frame run with the largest energy sum; the lowest
/// index wins a tie.
fn loudest_window(energy: &[f64], window: usize) -> usize {
    if energy.len() <= window {
        return 0;
    }

    let mut sum: f64 = energy[..window].iter().sum();
    let mut best = (0, sum);
    for start in 1..=energy.len() - window {
        sum += energy[start + window - 1] - energy[start - 1];
        if sum > best.1 {
            best = (start, sum);
        }
    }
    best.0
}

/// Closest time to `target` by linear scan; the earlier entry wins a tie.
fn nearest(times: &[f64], target: f64) -> Option<(f64, f64)> {
    let mut best: Option<(f64, f64)> = None;
    for &t in times {
        let diff = (t - target).abs();
        if best.map_or(true, |(_, d)| diff < d) {
            best = Some((t, diff));
        }
    }
    best
}

/// Select the song window from its duration and `ENERGY_HOP_S` energy curve.
pub fn select_song_segment(
    duration_s: f64,
    energy: &[f64],
    request: &SongRequest,
    beats: Option<&BeatGrid>,
) -> SongSegment {
    let target = request.target_length_s;

    if duration_s < target + LOOP_MARGIN_S {
        return SongSegment {
            start_s: 0.0,
            end_s: round3(duration_s.max(target)),
            method: request.method,
            snap: request.snap_to,
            loop_audio: true,
        };
    }

    let mut start_s = match request.method {
        SongMethod::Manual => request.min_start_s,
        SongMethod::AutoEnergy => {
            if energy.is_empty() {
                0.0
            } else {
                let window = ((target / ENERGY_HOP_S).round() as usize).max(1);
                loudest_window(energy, window) as f64 * ENERGY_HOP_S
            }
        }
    };

    let max_start = (duration_s - target).max(0.0);
    start_s = clamp(start_s, request.min_start_s, max_start);

    let grid = match (request.snap_to, beats) {
        (SnapTo::Downbeat, Some(grid)) => Some(grid.downbeats.as_slice()),
        (SnapTo::Beat, Some(grid)) => Some(grid.beats.as_slice()),
        _ => None,
    };
    if let Some((beat, diff)) = grid.and_then(|times| nearest(times, start_s)) {
        if diff <= SNAP_WINDOW_S {
            start_s = clamp(beat, request.min_start_s, max_start);
        }
    }

    SongSegment {
        start_s: round3(start_s),
        end_s: round3(start_s + target),
        method: request.method,
        snap: request.snap_to,
        loop_audio: false,
    }
}

/// [`select_song_segment`] over decoded audio.
pub fn select_from_audio(
    audio: &MonoAudio,
    request: &SongRequest,
    beats: Option<&BeatGrid>,
) -> SongSegment {
    let energy = song_energy(&audio.samples, audio.sample_rate);
    select_song_segment(audio.duration_s(), &energy, request, beats)
}
