//! Timeline Assembler
//!
//! Greedy selector over scored candidate windows. The output starts with a
//! hook segment and then fills the time budget under three rules: a clip may
//! not cover more than a quarter of the target, segments of one clip never
//! overlap, and no shot type appears three times in a row. A backfill pass
//! relaxes the diversity rule when the greedy pass falls short; the other two
//! rules always hold, so a library with too little usable footage yields a
//! timeline shorter than the target.

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use crate::edl::TimelineSegment;
use crate::error::{ReelError, ReelResult};
use crate::media::ProxyClip;
use crate::scoring::{score_window, WindowFeatures};
use crate::settings::{JobSettings, Vibe};
use crate::tags::{FrameTagStore, ShotType};

/// Share of the target one clip may cover during selection.
pub const CLIP_SHARE_CAP: f64 = 0.25;
/// Slack allowed at the edges when testing same-clip overlap.
pub const OVERLAP_MARGIN: f64 = 0.05;

const HOOK_POOL_FRACTION: f64 = 0.10;
const MIN_GREEDY_REMAINING: f64 = 0.5;
const BACKFILL_THRESHOLD: f64 = 0.25;
const MIN_BACKFILL_SEGMENT: f64 = 0.1;
const FILL_TOLERANCE: f64 = 0.01;
const EPS: f64 = 1e-9;

/// A scored excerpt of one clip.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateWindow {
    /// Stable per-build identifier, assigned at generation time.
    pub id: usize,
    pub clip_id: String,
    pub start: f64,
    pub end: f64,
    pub score: f64,
    pub shot_type: ShotType,
    pub people: u8,
}

/// Result of one assembly run.
#[derive(Debug, Clone, PartialEq)]
pub struct Assembly {
    pub timeline: Vec<TimelineSegment>,
    /// The greedy pass fell short and a backfill pass ran without the
    /// diversity rule.
    pub backfilled: bool,
}

/// Slide a `(seg_len, stride)` window over every clip with a positive
/// duration and score each position. A clip shorter than one window yields a
/// single window covering all of it.
pub fn generate_candidates(
    clips: &[ProxyClip],
    store: &FrameTagStore,
    vibe: Vibe,
) -> Vec<CandidateWindow> {
    let (seg_len, stride) = vibe.window();
    let mut candidates = Vec::new();

    for clip in clips {
        let duration = clip.duration_s;
        if !(duration > 0.0) {
            continue;
        }

        let mut spans = Vec::new();
        if duration < seg_len {
            spans.push((0.0, duration));
        } else {
            let mut k = 0usize;
            loop {
                let start = k as f64 * stride;
                if start + seg_len > duration + EPS {
                    break;
                }
                spans.push((start, start + seg_len));
                k += 1;
            }
        }

        for (start, end) in spans {
            let features = WindowFeatures::for_window(store, &clip.clip_id, start, end);
            candidates.push(CandidateWindow {
                id: candidates.len(),
                clip_id: clip.clip_id.clone(),
                start,
                end,
                score: score_window(&features),
                shot_type: features.shot_type,
                people: features.people,
            });
        }
    }

    candidates
}

/// Pick the hook from the top tenth of a score-sorted list: the first window
/// showing people, else the top window.
fn select_hook(sorted: &[CandidateWindow]) -> usize {
    let pool = ((sorted.len() as f64 * HOOK_POOL_FRACTION) as usize).clamp(1, sorted.len());
    sorted[..pool].iter().position(|c| c.people >= 1).unwrap_or(0)
}

#[derive(Debug, Clone)]
struct Pick {
    candidate_id: usize,
    clip_id: String,
    start: f64,
    end: f64,
}

/// Mutable state of one selection run.
struct Selection {
    target: f64,
    cap: f64,
    picks: Vec<Pick>,
    taken: HashSet<usize>,
    used: HashMap<String, f64>,
    recent: Vec<ShotType>,
    filled: f64,
}

impl Selection {
    fn new(target: f64) -> Self {
        Self {
            target,
            cap: target * CLIP_SHARE_CAP,
            picks: Vec::new(),
            taken: HashSet::new(),
            used: HashMap::new(),
            recent: Vec::new(),
            filled: 0.0,
        }
    }

    fn remaining(&self) -> f64 {
        self.target - self.filled
    }

    fn used(&self, clip_id: &str) -> f64 {
        self.used.get(clip_id).copied().unwrap_or(0.0)
    }

    fn overlaps(&self, clip_id: &str, start: f64, end: f64) -> bool {
        self.picks.iter().any(|p| {
            p.clip_id == clip_id
                && start < p.end - OVERLAP_MARGIN
                && end > p.start + OVERLAP_MARGIN
        })
    }

    /// The last two accepted segments share `shot`.
    fn repeats_shot(&self, shot: ShotType) -> bool {
        self.recent.len() >= 2 && self.recent[self.recent.len() - 2..].iter().all(|s| *s == shot)
    }

    fn accept(&mut self, candidate: &CandidateWindow, end: f64) {
        let duration = end - candidate.start;
        self.filled += duration;
        *self.used.entry(candidate.clip_id.clone()).or_insert(0.0) += duration;
        self.recent.push(candidate.shot_type);
        self.taken.insert(candidate.id);
        self.picks.push(Pick {
            candidate_id: candidate.id,
            clip_id: candidate.clip_id.clone(),
            start: candidate.start,
            end,
        });
    }

    /// Fit `candidate` into the remaining budget.
    fn trimmed_end(&self, candidate: &CandidateWindow) -> f64 {
        candidate.end.min(candidate.start + self.remaining())
    }

    fn within_cap(&self, clip_id: &str, duration: f64) -> bool {
        self.used(clip_id) + duration <= self.cap + EPS
    }
}

/// Build the ordered cut list for `clips` from their tags.
///
/// Returns [`ReelError::NoCandidates`] when no clip has a positive duration
/// and [`ReelError::Validation`] when a locked clip id names no clip.
pub fn assemble(
    clips: &[ProxyClip],
    store: &FrameTagStore,
    settings: &JobSettings,
    seed: u64,
) -> ReelResult<Assembly> {
    for locked in &settings.locked_clips {
        if !clips.iter().any(|c| &c.clip_id == locked) {
            return Err(ReelError::Validation(format!(
                "Locked clip {locked} is not part of the job"
            )));
        }
    }

    let mut candidates = generate_candidates(clips, store, settings.vibe);
    if candidates.is_empty() {
        return Err(ReelError::NoCandidates(format!(
            "none of {} clips has a positive duration",
            clips.len()
        )));
    }
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut selection = Selection::new(settings.target_length_s);

    let hook = &candidates[select_hook(&candidates)];
    selection.accept(hook, selection.trimmed_end(hook));
    debug!(clip_id = %hook.clip_id, start = hook.start, score = hook.score, "Selected hook");

    for locked in &settings.locked_clips {
        if selection.used(locked) > 0.0 {
            continue;
        }
        let best = candidates.iter().find(|c| {
            if &c.clip_id != locked || selection.taken.contains(&c.id) {
                return false;
            }
            let end = selection.trimmed_end(c);
            end > c.start
                && selection.within_cap(&c.clip_id, end - c.start)
                && !selection.overlaps(&c.clip_id, c.start, end)
        });
        match best {
            Some(candidate) => {
                let end = selection.trimmed_end(candidate);
                selection.accept(candidate, end);
            }
            None => debug!(clip_id = %locked, "Locked clip has no usable window"),
        }
    }

    for candidate in &candidates {
        if selection.taken.contains(&candidate.id) {
            continue;
        }
        if selection.remaining() < MIN_GREEDY_REMAINING {
            break;
        }
        let end = selection.trimmed_end(candidate);
        if !selection.within_cap(&candidate.clip_id, end - candidate.start) {
            continue;
        }
        if selection.overlaps(&candidate.clip_id, candidate.start, end) {
            continue;
        }
        if selection.repeats_shot(candidate.shot_type) {
            continue;
        }
        selection.accept(candidate, end);
    }

    let mut backfilled = false;
    if selection.remaining() > BACKFILL_THRESHOLD {
        backfilled = true;
        for candidate in &candidates {
            if selection.remaining() <= FILL_TOLERANCE {
                break;
            }
            if selection.taken.contains(&candidate.id) {
                continue;
            }
            let end = selection.trimmed_end(candidate);
            if end - candidate.start < MIN_BACKFILL_SEGMENT {
                continue;
            }
            if !selection.within_cap(&candidate.clip_id, end - candidate.start) {
                continue;
            }
            if selection.overlaps(&candidate.clip_id, candidate.start, end) {
                continue;
            }
            selection.accept(candidate, end);
        }
        debug!(remaining = selection.remaining(), "Backfill pass finished");
    }

    let mut picks = selection.picks;
    let hook = picks.remove(0);
    let mut rng = StdRng::seed_from_u64(seed);
    picks.shuffle(&mut rng);

    debug!(
        segments = picks.len() + 1,
        hook_candidate = hook.candidate_id,
        backfilled,
        "Assembled timeline"
    );

    let timeline = std::iter::once(hook)
        .chain(picks)
        .map(|p| TimelineSegment::cut(p.clip_id, p.start, p.end))
        .collect();

    Ok(Assembly {
        timeline,
        backfilled,
    })
}
