//! Frame Tag Store
//!
//! Per-second content tags for every clip, as produced by the tagging
//! collaborator. Records are immutable once stored and are read by the
//! window scorer through [`FrameTagStore::window`] and
//! [`FrameTagStore::nearest`].

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ReelResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShotType {
    Selfie,
    Closeup,
    Wide,
    Pov,
    #[default]
    #[serde(other)]
    Other,
}

/// What the tagging collaborator returns for one sampled frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRecord {
    #[serde(default)]
    pub scene: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub shot_type: ShotType,
    /// 0..=10
    pub energy: u8,
    /// 0..=10
    pub highlight: u8,
    /// 0..=5
    pub people: u8,
    /// 0..1
    pub brightness: f64,
    #[serde(default)]
    pub ai_used: bool,
}

/// A tag record pinned to a clip and an integer second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameTag {
    pub clip_id: String,
    pub timestamp: u32,
    #[serde(flatten)]
    pub record: TagRecord,
}

impl FrameTag {
    pub fn new(clip_id: impl Into<String>, timestamp: u32, record: TagRecord) -> Self {
        Self {
            clip_id: clip_id.into(),
            timestamp,
            record,
        }
    }
}

/// Tags grouped by clip, each list sorted by timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FrameTagStore {
    clips: BTreeMap<String, Vec<FrameTag>>,
}

// Loaded lists go through `insert` so lookups can rely on timestamp order.
impl<'de> Deserialize<'de> for FrameTagStore {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let clips = BTreeMap::<String, Vec<FrameTag>>::deserialize(deserializer)?;
        let mut store = Self::new();
        store.extend(clips.into_values().flatten());
        Ok(store)
    }
}

impl FrameTagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tag. A second tag for the same clip and timestamp replaces the
    /// first.
    pub fn insert(&mut self, tag: FrameTag) {
        let list = self.clips.entry(tag.clip_id.clone()).or_default();
        match list.binary_search_by_key(&tag.timestamp, |t| t.timestamp) {
            Ok(idx) => list[idx] = tag,
            Err(idx) => list.insert(idx, tag),
        }
    }

    pub fn extend<I: IntoIterator<Item = FrameTag>>(&mut self, tags: I) {
        for tag in tags {
            self.insert(tag);
        }
    }

    /// True when no clip has a single tag.
    pub fn is_empty(&self) -> bool {
        self.clips.values().all(|tags| tags.is_empty())
    }

    pub fn len(&self) -> usize {
        self.clips.values().map(Vec::len).sum()
    }

    pub fn clip(&self, clip_id: &str) -> &[FrameTag] {
        self.clips.get(clip_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Tags with `start <= timestamp < end`.
    pub fn window(&self, clip_id: &str, start: f64, end: f64) -> &[FrameTag] {
        let tags = self.clip(clip_id);
        let lo = tags.partition_point(|t| (t.timestamp as f64) < start);
        let hi = tags.partition_point(|t| (t.timestamp as f64) < end);
        if lo >= hi { &[] } else { &tags[lo..hi] }
    }

    /// The tag closest to `time`; the earlier one wins a tie.
    pub fn nearest(&self, clip_id: &str, time: f64) -> Option<&FrameTag> {
        let mut best: Option<&FrameTag> = None;
        for tag in self.clip(clip_id) {
            let diff = (tag.timestamp as f64 - time).abs();
            match best {
                Some(current) if (current.timestamp as f64 - time).abs() <= diff => {}
                _ => best = Some(tag),
            }
        }
        best
    }

    pub async fn load(path: &Path) -> ReelResult<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub async fn save(&self, path: &Path) -> ReelResult<()> {
        tokio::fs::write(path, serde_json::to_string_pretty(self)?).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn record(highlight: u8, energy: u8, people: u8, brightness: f64, shot: ShotType) -> TagRecord {
    TagRecord {
        scene: String::new(),
        tags: Vec::new(),
        shot_type: shot,
        energy,
        highlight,
        people,
        brightness,
        ai_used: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> FrameTagStore {
        let mut store = FrameTagStore::new();
        for ts in [4, 0, 2, 1, 3] {
            store.insert(FrameTag::new("c1", ts, record(ts as u8, 4, 0, 0.5, ShotType::Wide)));
        }
        store
    }

    #[test]
    fn test_insert_keeps_timestamp_order() {
        let store = store();
        let stamps: Vec<u32> = store.clip("c1").iter().map(|t| t.timestamp).collect();
        assert_eq!(stamps, vec![0, 1, 2, 3, 4]);
        assert_eq!(store.len(), 5);
    }

    #[test]
    fn test_window_is_half_open() {
        let store = store();
        let stamps: Vec<u32> = store.window("c1", 1.0, 3.0).iter().map(|t| t.timestamp).collect();
        assert_eq!(stamps, vec![1, 2]);
        assert!(store.window("c1", 1.1, 1.9).is_empty());
        assert!(store.window("missing", 0.0, 10.0).is_empty());
    }

    #[test]
    fn test_nearest_prefers_earlier_on_tie() {
        let store = store();
        assert_eq!(store.nearest("c1", 1.5).unwrap().timestamp, 1);
        assert_eq!(store.nearest("c1", 9.0).unwrap().timestamp, 4);
        assert!(store.nearest("missing", 1.0).is_none());
    }

    #[test]
    fn test_unknown_shot_type_is_other() {
        let tag: FrameTag = serde_json::from_str(
            r#"{"clip_id":"c1","timestamp":3,"scene":"","tags":[],"shot_type":"drone",
                "energy":5,"highlight":6,"people":1,"brightness":0.4,"ai_used":true}"#,
        )
        .unwrap();
        assert_eq!(tag.record.shot_type, ShotType::Other);
        assert_eq!(tag.timestamp, 3);
    }

    #[test]
    fn test_unsorted_file_is_ordered_on_load() {
        let tag = |ts: u32| {
            format!(
                r#"{{"clip_id":"c1","timestamp":{ts},"energy":4,"highlight":{ts},"people":0,"brightness":0.5}}"#
            )
        };
        let raw = format!(r#"{{"c1":[{},{},{},{}]}}"#, tag(3), tag(0), tag(2), tag(1));

        let store: FrameTagStore = serde_json::from_str(&raw).unwrap();
        let stamps: Vec<u32> = store.window("c1", 1.0, 3.0).iter().map(|t| t.timestamp).collect();
        assert_eq!(stamps, vec![1, 2]);
        assert_eq!(store.len(), 4);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags.json");
        let original = store();
        original.save(&path).await.unwrap();
        let loaded = FrameTagStore::load(&path).await.unwrap();
        assert_eq!(loaded, original);
    }
}
