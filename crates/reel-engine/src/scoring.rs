//! Window Scorer
//!
//! Turns the tags that fall inside a candidate window into one desirability
//! score in `[0, 1]`.

use crate::tags::{FrameTag, FrameTagStore, ShotType};

const HIGHLIGHT_WEIGHT: f64 = 0.55;
const ENERGY_WEIGHT: f64 = 0.25;
const QUALITY_WEIGHT: f64 = 0.20;
const PEOPLE_BONUS: f64 = 0.10;

/// Aggregated features of a candidate window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowFeatures {
    /// Mean highlight, 0..10
    pub highlight: f64,
    /// Mean energy, 0..10
    pub energy: f64,
    /// Mean brightness, 0..1
    pub brightness: f64,
    /// Max people count across the window
    pub people: u8,
    pub shot_type: ShotType,
}

impl Default for WindowFeatures {
    /// Used when a clip has no tags at all.
    fn default() -> Self {
        Self {
            highlight: 4.0,
            energy: 4.0,
            brightness: 0.5,
            people: 0,
            shot_type: ShotType::Other,
        }
    }
}

impl WindowFeatures {
    /// Aggregate a non-empty tag slice. Returns `None` for an empty one.
    pub fn aggregate(tags: &[FrameTag]) -> Option<Self> {
        if tags.is_empty() {
            return None;
        }
        let n = tags.len() as f64;
        let highlight = tags.iter().map(|t| t.record.highlight as f64).sum::<f64>() / n;
        let energy = tags.iter().map(|t| t.record.energy as f64).sum::<f64>() / n;
        let brightness = tags.iter().map(|t| t.record.brightness).sum::<f64>() / n;
        let people = tags.iter().map(|t| t.record.people).max().unwrap_or(0);

        Some(Self {
            highlight,
            energy,
            brightness,
            people,
            shot_type: dominant_shot_type(tags),
        })
    }

    /// Features for `[start, end)` of a clip: the tags inside the window, else
    /// the single nearest tag, else the defaults.
    pub fn for_window(store: &FrameTagStore, clip_id: &str, start: f64, end: f64) -> Self {
        let inside = store.window(clip_id, start, end);
        if let Some(features) = Self::aggregate(inside) {
            return features;
        }
        store
            .nearest(clip_id, (start + end) / 2.0)
            .and_then(|tag| Self::aggregate(std::slice::from_ref(tag)))
            .unwrap_or_default()
    }
}

/// Most frequent shot type; among equal counts the one seen first wins.
fn dominant_shot_type(tags: &[FrameTag]) -> ShotType {
    let mut counts: Vec<(ShotType, usize)> = Vec::new();
    for tag in tags {
        match counts.iter_mut().find(|(shot, _)| *shot == tag.record.shot_type) {
            Some((_, count)) => *count += 1,
            None => counts.push((tag.record.shot_type, 1)),
        }
    }

    let mut best = (ShotType::Other, 0);
    for (shot, count) in counts {
        if count > best.1 {
            best = (shot, count);
        }
    }
    best.0
}

/// Score a window. Pure.
pub fn score_window(features: &WindowFeatures) -> f64 {
    let mut quality = 1.0;
    if features.brightness < 0.2 {
        quality -= 0.25;
    }
    if features.brightness < 0.1 {
        quality -= 0.20;
    }
    let people_bonus = if features.people >= 2 { PEOPLE_BONUS } else { 0.0 };

    let score = HIGHLIGHT_WEIGHT * (features.highlight / 10.0)
        + ENERGY_WEIGHT * (features.energy / 10.0)
        + QUALITY_WEIGHT * quality
        + people_bonus;
    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::record;

    fn features(highlight: f64, energy: f64, brightness: f64, people: u8) -> WindowFeatures {
        WindowFeatures {
            highlight,
            energy,
            brightness,
            people,
            shot_type: ShotType::Other,
        }
    }

    #[test]
    fn test_score_formula() {
        let score = score_window(&features(10.0, 6.0, 0.5, 0));
        assert!((score - 0.9).abs() < 1e-9);

        let score = score_window(&features(0.0, 0.0, 0.5, 0));
        assert!((score - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_dark_penalties_compound() {
        let dim = score_window(&features(0.0, 0.0, 0.15, 0));
        assert!((dim - 0.2 * 0.75).abs() < 1e-9);
        let dark = score_window(&features(0.0, 0.0, 0.05, 0));
        assert!((dark - 0.2 * 0.55).abs() < 1e-9);
    }

    #[test]
    fn test_people_bonus_and_clamp() {
        let crowd = score_window(&features(0.0, 0.0, 0.5, 2));
        assert!((crowd - 0.3).abs() < 1e-9);
        let maxed = score_window(&features(10.0, 10.0, 1.0, 5));
        assert_eq!(maxed, 1.0);
    }

    #[test]
    fn test_default_features() {
        let score = score_window(&WindowFeatures::default());
        assert!((score - (0.55 * 0.4 + 0.25 * 0.4 + 0.2)).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_uses_mean_and_max() {
        let tags = vec![
            FrameTag::new("c1", 0, record(8, 2, 1, 0.4, ShotType::Wide)),
            FrameTag::new("c1", 1, record(4, 6, 3, 0.6, ShotType::Selfie)),
        ];
        let agg = WindowFeatures::aggregate(&tags).unwrap();
        assert_eq!(agg.highlight, 6.0);
        assert_eq!(agg.energy, 4.0);
        assert!((agg.brightness - 0.5).abs() < 1e-9);
        assert_eq!(agg.people, 3);
        // one each: first seen wins
        assert_eq!(agg.shot_type, ShotType::Wide);
        assert!(WindowFeatures::aggregate(&[]).is_none());
    }

    #[test]
    fn test_dominant_shot_type_majority() {
        let tags = vec![
            FrameTag::new("c1", 0, record(5, 5, 0, 0.5, ShotType::Pov)),
            FrameTag::new("c1", 1, record(5, 5, 0, 0.5, ShotType::Closeup)),
            FrameTag::new("c1", 2, record(5, 5, 0, 0.5, ShotType::Closeup)),
        ];
        assert_eq!(dominant_shot_type(&tags), ShotType::Closeup);
    }

    #[test]
    fn test_window_falls_back_to_nearest_then_defaults() {
        let mut store = FrameTagStore::new();
        store.insert(FrameTag::new("c1", 3, record(9, 9, 2, 0.5, ShotType::Selfie)));

        let near = WindowFeatures::for_window(&store, "c1", 0.5, 1.4);
        assert_eq!(near.highlight, 9.0);
        assert_eq!(near.shot_type, ShotType::Selfie);

        let none = WindowFeatures::for_window(&store, "c2", 0.0, 0.9);
        assert_eq!(none, WindowFeatures::default());
    }
}
