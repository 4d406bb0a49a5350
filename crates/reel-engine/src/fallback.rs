//! Fallback Timeline Generator
//!
//! Seeded round robin over the clips, used when no tag data is available. No
//! scoring, diversity or overlap rules apply here.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::edl::TimelineSegment;
use crate::error::{ReelError, ReelResult};
use crate::media::ProxyClip;
use crate::settings::JobSettings;

const JITTER: f64 = 0.2;
const MIN_SEGMENT: f64 = 0.5;
const MAX_SEGMENT: f64 = 2.0;
const SHORT_CLIP_SLACK: f64 = 0.05;
const FILL_TOLERANCE: f64 = 0.01;
const MAX_ITERATIONS: usize = 500;

/// `max(lo, min(hi, value))`; never panics when `lo > hi`.
fn clamp(value: f64, lo: f64, hi: f64) -> f64 {
    lo.max(hi.min(value))
}

pub fn generate(
    clips: &[ProxyClip],
    settings: &JobSettings,
    seed: u64,
) -> ReelResult<Vec<TimelineSegment>> {
    let usable: Vec<&ProxyClip> = clips.iter().filter(|c| c.duration_s > 0.0).collect();
    if usable.is_empty() {
        return Err(ReelError::NoCandidates(format!(
            "none of {} clips has a positive duration",
            clips.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let base = settings.vibe.base_segment_len();
    let mut remaining = settings.target_length_s;
    let mut timeline = Vec::new();
    let mut iterations = 0;

    while remaining > FILL_TOLERANCE && iterations < MAX_ITERATIONS {
        let clip = usable[iterations % usable.len()];
        iterations += 1;

        let jitter = rng.gen_range(-JITTER..=JITTER);
        let seg_len = clamp(base + jitter, MIN_SEGMENT, MAX_SEGMENT).min(remaining);

        let (start, end) = if clip.duration_s <= seg_len + SHORT_CLIP_SLACK {
            (0.0, clip.duration_s.min(seg_len))
        } else {
            let start = rng.gen_range(0.0..=clip.duration_s - seg_len);
            (start, start + seg_len)
        };

        timeline.push(TimelineSegment::cut(clip.clip_id.clone(), start, end));
        remaining -= end - start;
    }

    debug!(segments = timeline.len(), iterations, remaining, "Generated fallback timeline");
    Ok(timeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edl::total_duration;
    use crate::settings::Vibe;

    fn clips(n: usize, duration: f64) -> Vec<ProxyClip> {
        (1..=n)
            .map(|i| ProxyClip::new(format!("c{i}"), format!("/proxies/c{i}.mp4"), duration))
            .collect()
    }

    #[test]
    fn test_three_untagged_clips_fill_target() {
        let clips = clips(3, 5.0);
        let mut settings = JobSettings::default();
        settings.target_length_s = 15.0;

        let timeline = generate(&clips, &settings, 42).unwrap();
        assert!((total_duration(&timeline) - 15.0).abs() <= 0.01);

        let order: Vec<&str> = timeline.iter().map(|s| s.clip_id.as_str()).collect();
        for (i, id) in order.iter().enumerate() {
            assert_eq!(*id, ["c1", "c2", "c3"][i % 3]);
        }
        for seg in &timeline {
            assert!(seg.in_s >= 0.0 && seg.out_s <= 5.0 && seg.out_s > seg.in_s);
        }
    }

    #[test]
    fn test_segment_lengths_follow_vibe() {
        let mut settings = JobSettings::default();
        settings.target_length_s = 30.0;
        settings.vibe = Vibe::Chill;
        let timeline = generate(&clips(2, 20.0), &settings, 9).unwrap();
        // all but the last segment are full jittered lengths
        for seg in &timeline[..timeline.len() - 1] {
            let len = seg.duration();
            assert!((1.2 - 1e-9..=1.6 + 1e-9).contains(&len), "len {len}");
        }
    }

    #[test]
    fn test_short_clip_is_taken_whole() {
        let mut settings = JobSettings::default();
        settings.target_length_s = 3.0;
        let timeline = generate(&clips(1, 0.4), &settings, 1).unwrap();
        // the final piece is shorter than the clip and may start anywhere
        let (last, whole) = timeline.split_last().unwrap();
        assert!(whole.iter().all(|s| s.in_s == 0.0 && s.out_s == 0.4));
        assert!(last.out_s <= 0.4 + 1e-9);
        assert!((total_duration(&timeline) - 3.0).abs() <= 0.01);
    }

    #[test]
    fn test_same_seed_same_timeline() {
        let settings = JobSettings::default();
        let a = generate(&clips(4, 8.0), &settings, 77).unwrap();
        let b = generate(&clips(4, 8.0), &settings, 77).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_no_usable_clips() {
        let settings = JobSettings::default();
        assert!(matches!(
            generate(&clips(2, 0.0), &settings, 1),
            Err(ReelError::NoCandidates(_))
        ));
    }

    #[test]
    fn test_clamp_tolerates_inverted_bounds() {
        assert_eq!(clamp(3.0, 0.5, 2.0), 2.0);
        assert_eq!(clamp(0.1, 0.5, 2.0), 0.5);
        assert_eq!(clamp(1.0, 4.0, 2.0), 4.0);
    }
}
