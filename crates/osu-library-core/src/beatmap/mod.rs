//! Beatmap data structures: difficulties, owning sets, BPM summaries.

mod store;

pub mod overrides;

pub use overrides::MapOverrides;
pub use store::{BeatmapStore, OverrideStore};

use serde::{Deserialize, Serialize};

use crate::hash::Md5Hash;

/// Represents a game mode. Only `Osu` entries are kept in the index;
/// other modes are recognized so their records can be skipped cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum GameMode {
    #[default]
    Osu = 0,
    Taiko = 1,
    Catch = 2,
    Mania = 3,
}

impl GameMode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Osu),
            1 => Some(Self::Taiko),
            2 => Some(Self::Catch),
            3 => Some(Self::Mania),
            _ => None,
        }
    }
}

/// Where a difficulty's canonical data lives.
///
/// Native entries store their values directly in `library_maps.db`;
/// imported entries are owned by an external installation and are only
/// patched through the override table, never rewritten at the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BeatmapOrigin {
    #[default]
    Native,
    Imported,
}

/// Min/max/most-common BPM of a difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BpmSummary {
    pub min: i32,
    pub max: i32,
    pub most_common: i32,
}

/// One uninherited timing point, decoded field-by-field from the 17-byte
/// on-disk record (f64 ms-per-beat, f64 offset, u8 uninherited flag).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TimingPoint {
    pub ms_per_beat: f64,
    pub offset: f64,
    pub uninherited: bool,
}

/// Summarize BPM over the uninherited timing points, weighting each BPM
/// by how long it is active. `length_ms` bounds the final point's span.
pub fn bpm_summary(points: &[TimingPoint], length_ms: u32) -> BpmSummary {
    let mut uninherited: Vec<&TimingPoint> = points
        .iter()
        .filter(|p| p.uninherited && p.ms_per_beat > 0.0)
        .collect();
    if uninherited.is_empty() {
        return BpmSummary::default();
    }
    uninherited.sort_by(|a, b| {
        a.offset
            .partial_cmp(&b.offset)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut min = i32::MAX;
    let mut max = i32::MIN;
    let mut durations: std::collections::HashMap<i32, f64> = std::collections::HashMap::new();

    for (i, point) in uninherited.iter().enumerate() {
        let bpm = (60000.0 / point.ms_per_beat).round() as i32;
        min = min.min(bpm);
        max = max.max(bpm);

        let end = match uninherited.get(i + 1) {
            Some(next) => next.offset,
            None => (length_ms as f64).max(point.offset),
        };
        *durations.entry(bpm).or_insert(0.0) += (end - point.offset).max(0.0);
    }

    let most_common = durations
        .into_iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(bpm, _)| bpm)
        .unwrap_or(0);

    BpmSummary {
        min,
        max,
        most_common,
    }
}

/// One playable difficulty. The MD5 hash is the primary key everywhere.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeatmapDifficulty {
    pub md5_hash: Md5Hash,
    pub id: i32,
    pub set_id: i32,

    pub title: String,
    pub title_unicode: String,
    pub artist: String,
    pub artist_unicode: String,
    pub creator: String,
    pub difficulty_name: String,
    pub source: String,
    pub tags: String,

    pub folder_path: String,
    pub file_path: String,
    pub audio_file_name: String,
    pub background_image_file_name: String,
    pub draw_background: bool,

    pub approach_rate: f32,
    pub circle_size: f32,
    pub hp_drain: f32,
    pub overall_difficulty: f32,
    pub slider_multiplier: f64,

    pub num_circles: u16,
    pub num_sliders: u16,
    pub num_spinners: u16,

    pub length_ms: u32,
    pub preview_time: i32,
    pub stack_leniency: f32,
    pub last_modification_time: u64,

    pub local_offset: i16,
    pub online_offset: i16,

    pub bpm: BpmSummary,
    /// Cached nomod star rating; non-positive means "not computed yet".
    pub star_rating: f64,
    /// Cached perceptual loudness; zero means "not computed yet".
    pub loudness: f32,

    pub mode: GameMode,
    pub origin: BeatmapOrigin,
}

impl BeatmapDifficulty {
    pub fn num_objects(&self) -> u32 {
        self.num_circles as u32 + self.num_sliders as u32 + self.num_spinners as u32
    }

    /// Grouping key for sets whose id is missing or invalid.
    pub fn title_artist_key(&self) -> String {
        let mut key = self.title.trim().to_lowercase();
        key.push('|');
        key.push_str(self.artist.trim().to_lowercase().as_str());
        key
    }

    /// Minimal stale-entry check: databases accumulate rows with every
    /// text field empty and a zeroed hash; those are skipped as corrupt.
    pub fn passes_sanity_check(&self) -> bool {
        !(self.artist.is_empty()
            && self.title.is_empty()
            && self.creator.is_empty()
            && self.difficulty_name.is_empty()
            && self.md5_hash.is_empty())
    }
}

/// An ownership aggregate of difficulties sharing a set id (or a
/// synthetic title+artist key when the id is invalid). The set owns its
/// difficulties; dropping the set drops them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeatmapSet {
    pub set_id: i32,
    pub origin: BeatmapOrigin,
    pub difficulties: Vec<BeatmapDifficulty>,
}

impl BeatmapSet {
    pub fn new(set_id: i32, origin: BeatmapOrigin) -> Self {
        Self {
            set_id,
            origin,
            difficulties: Vec::new(),
        }
    }

    pub fn title(&self) -> &str {
        self.difficulties.first().map(|d| d.title.as_str()).unwrap_or("")
    }

    pub fn artist(&self) -> &str {
        self.difficulties
            .first()
            .map(|d| d.artist.as_str())
            .unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tp(offset: f64, ms_per_beat: f64) -> TimingPoint {
        TimingPoint {
            offset,
            ms_per_beat,
            uninherited: true,
        }
    }

    #[test]
    fn test_bpm_summary_single_point() {
        let summary = bpm_summary(&[tp(0.0, 500.0)], 60_000);
        assert_eq!(summary.min, 120);
        assert_eq!(summary.max, 120);
        assert_eq!(summary.most_common, 120);
    }

    #[test]
    fn test_bpm_summary_weighted_by_duration() {
        // 120 BPM for 50s, then 200 BPM for the last 10s.
        let points = [tp(0.0, 500.0), tp(50_000.0, 300.0)];
        let summary = bpm_summary(&points, 60_000);
        assert_eq!(summary.min, 120);
        assert_eq!(summary.max, 200);
        assert_eq!(summary.most_common, 120);
    }

    #[test]
    fn test_bpm_summary_ignores_inherited_points() {
        let mut inherited = tp(0.0, -100.0);
        inherited.uninherited = false;
        assert_eq!(bpm_summary(&[inherited], 1000), BpmSummary::default());
    }

    #[test]
    fn test_sanity_check() {
        let mut diff = BeatmapDifficulty::default();
        assert!(!diff.passes_sanity_check());
        diff.title = "Freedom Dive".to_string();
        assert!(diff.passes_sanity_check());
    }

    #[test]
    fn test_title_artist_key_normalizes() {
        let diff = BeatmapDifficulty {
            title: " Blue Zenith ".to_string(),
            artist: "xi".to_string(),
            ..Default::default()
        };
        assert_eq!(diff.title_artist_key(), "blue zenith|xi");
    }
}
