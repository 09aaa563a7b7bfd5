//! Sparse metadata patches for imported beatmaps.
//!
//! Imported difficulties are owned by an external installation, so local
//! edits (offsets, recalculated stars/loudness) cannot be written back to
//! their source files. They are kept here instead, keyed by hash, and
//! re-applied after every load. Entries persist until superseded; they
//! are never garbage-collected for being redundant.

use serde::{Deserialize, Serialize};

use super::BeatmapDifficulty;

/// Fields that may diverge from an imported beatmap's source values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapOverrides {
    pub local_offset: i16,
    pub online_offset: i16,
    pub star_rating: f32,
    pub loudness: f32,
    pub min_bpm: i32,
    pub max_bpm: i32,
    pub avg_bpm: i32,
    pub draw_background: bool,
    pub background_image_file_name: String,
}

impl MapOverrides {
    /// Capture the overridable fields of a difficulty.
    pub fn from_difficulty(diff: &BeatmapDifficulty) -> Self {
        Self {
            local_offset: diff.local_offset,
            online_offset: diff.online_offset,
            star_rating: diff.star_rating as f32,
            loudness: diff.loudness,
            min_bpm: diff.bpm.min,
            max_bpm: diff.bpm.max,
            avg_bpm: diff.bpm.most_common,
            draw_background: diff.draw_background,
            background_image_file_name: diff.background_image_file_name.clone(),
        }
    }

    /// Patch a freshly loaded difficulty with the stored values.
    pub fn apply_to(&self, diff: &mut BeatmapDifficulty) {
        diff.local_offset = self.local_offset;
        diff.online_offset = self.online_offset;
        diff.star_rating = self.star_rating as f64;
        diff.loudness = self.loudness;
        diff.bpm.min = self.min_bpm;
        diff.bpm.max = self.max_bpm;
        diff.bpm.most_common = self.avg_bpm;
        diff.draw_background = self.draw_background;
        diff.background_image_file_name = self.background_image_file_name.clone();
    }
}
