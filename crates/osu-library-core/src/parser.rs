//! `.osu` file parsing for raw folder loads, using rosu-map.
//!
//! Only the metadata the index needs is extracted; hit objects are
//! counted and the timing points reduced to a BPM summary, then dropped.

use std::fs;
use std::path::Path;
use std::time::SystemTime;

use rosu_map::section::hit_objects::HitObjectKind;

use crate::beatmap::{bpm_summary, BeatmapDifficulty, BeatmapOrigin, GameMode, TimingPoint};
use crate::error::{Error, Result};
use crate::hash::Md5Hash;

/// Parse one `.osu` file into an index entry.
pub fn parse_osu_file(path: &Path) -> Result<BeatmapDifficulty> {
    let content = fs::read(path)?;
    let md5_hash = Md5Hash::of_contents(&content);

    let beatmap =
        rosu_map::from_bytes::<rosu_map::Beatmap>(&content).map_err(|e| Error::BeatmapParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let mode = GameMode::from_u8(beatmap.mode as u8).unwrap_or(GameMode::Osu);

    let mut num_circles = 0u16;
    let mut num_sliders = 0u16;
    let mut num_spinners = 0u16;
    for object in &beatmap.hit_objects {
        match object.kind {
            HitObjectKind::Circle(_) => num_circles = num_circles.saturating_add(1),
            HitObjectKind::Slider(_) | HitObjectKind::Hold(_) => {
                num_sliders = num_sliders.saturating_add(1)
            }
            HitObjectKind::Spinner(_) => num_spinners = num_spinners.saturating_add(1),
        }
    }

    let length_ms = beatmap_length_ms(&beatmap);

    let timing_points: Vec<TimingPoint> = beatmap
        .control_points
        .timing_points
        .iter()
        .map(|tp| TimingPoint {
            ms_per_beat: tp.beat_len,
            offset: tp.time,
            uninherited: true,
        })
        .collect();
    let bpm = bpm_summary(&timing_points, length_ms);

    let last_modification_time = fs::metadata(path)
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let folder_path = path
        .parent()
        .map(|p| format!("{}/", p.display()))
        .unwrap_or_default();

    Ok(BeatmapDifficulty {
        md5_hash,
        id: beatmap.beatmap_id as i32,
        set_id: beatmap.beatmap_set_id as i32,
        title: beatmap.title.clone(),
        title_unicode: beatmap.title_unicode.clone(),
        artist: beatmap.artist.clone(),
        artist_unicode: beatmap.artist_unicode.clone(),
        creator: beatmap.creator.clone(),
        difficulty_name: beatmap.version.clone(),
        source: beatmap.source.clone(),
        tags: beatmap.tags.clone(),
        folder_path,
        file_path: path.display().to_string(),
        audio_file_name: beatmap.audio_file.clone(),
        background_image_file_name: beatmap.background_file.clone(),
        draw_background: true,
        approach_rate: beatmap.approach_rate,
        circle_size: beatmap.circle_size,
        hp_drain: beatmap.hp_drain_rate,
        overall_difficulty: beatmap.overall_difficulty,
        slider_multiplier: beatmap.slider_multiplier,
        num_circles,
        num_sliders,
        num_spinners,
        length_ms,
        preview_time: beatmap.preview_time,
        stack_leniency: beatmap.stack_leniency,
        last_modification_time,
        bpm,
        mode,
        origin: BeatmapOrigin::Native,
        ..Default::default()
    })
}

fn beatmap_length_ms(beatmap: &rosu_map::Beatmap) -> u32 {
    let last = beatmap
        .hit_objects
        .last()
        .map(|h| h.start_time)
        .unwrap_or(0.0);
    last.max(0.0) as u32
}
