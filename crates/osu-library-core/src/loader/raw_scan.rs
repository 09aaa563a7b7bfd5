//! Raw folder scanning: the fallback when no map index file exists, and
//! the incremental refresh path for folders added since the last scan.
//!
//! Folder parsing happens in wall-clock time-boxed slices driven from
//! the host's frame loop, so a large songs folder loads over many frames
//! without ever blocking one.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use walkdir::WalkDir;

use crate::beatmap::{BeatmapOrigin, BeatmapSet, GameMode};
use crate::hash::Md5Hash;
use crate::parser::parse_osu_file;

use super::Database;

/// Work budget for one [`Database::update`] call.
pub const RAW_SCAN_SLICE: Duration = Duration::from_millis(32);

pub(crate) struct RawScanState {
    pub(crate) scheduled: bool,
    pub(crate) pending: Vec<PathBuf>,
    /// Folder names loaded by any previous scan; refreshes only load
    /// folders not in here.
    pub(crate) seen: HashSet<String>,
    pub(crate) first_load: bool,
    pub(crate) found_changes: bool,
    pub(crate) last_new_count: u32,
    loaded_this_scan: u32,
    new_hashes: Vec<Md5Hash>,
}

impl RawScanState {
    pub(crate) fn new() -> Self {
        Self {
            scheduled: false,
            pending: Vec::new(),
            seen: HashSet::new(),
            first_load: true,
            found_changes: true,
            last_new_count: 0,
            loaded_this_scan: 0,
            new_hashes: Vec::new(),
        }
    }
}

/// Enumerate the songs folder and queue every folder not seen before.
/// On the first load that is every folder.
pub(crate) fn schedule(db: &Database) {
    let songs_folder = db.config.songs_folder();
    let mut state = db.raw_scan.lock().expect("raw scan lock poisoned");
    state.loaded_this_scan = 0;
    state.new_hashes.clear();

    let entries = match std::fs::read_dir(&songs_folder) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Cannot scan songs folder {}: {}", songs_folder.display(), e);
            state.scheduled = false;
            state.found_changes = false;
            return;
        }
    };

    let pending: Vec<PathBuf> = {
        let seen = &state.seen;
        entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .filter(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                !seen.contains(&name)
            })
            .map(|e| e.path())
            .collect()
    };
    state.pending = pending;

    state.found_changes = state.first_load || !state.pending.is_empty();
    state.scheduled = !state.pending.is_empty();
    if !state.scheduled {
        state.last_new_count = 0;
        state.first_load = false;
    }
    tracing::info!(
        "Raw scan scheduled: {} folder(s) to load from {}",
        state.pending.len(),
        songs_folder.display()
    );
}

/// Process queued folders until the slice budget runs out. Each folder
/// is loaded whole, so cancellation or an exhausted budget never leaves
/// a partially inserted set.
pub(crate) fn update_slice(db: &Database, budget: Duration) {
    let mut state = db.raw_scan.lock().expect("raw scan lock poisoned");
    if !state.scheduled {
        return;
    }

    let start = Instant::now();
    loop {
        if start.elapsed() >= budget {
            return;
        }
        if db.loading.is_cancelled() {
            state.pending.clear();
            state.scheduled = false;
            return;
        }

        let Some(folder) = state.pending.pop() else {
            finish_scan(db, &mut state);
            return;
        };

        let folder_name = folder
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        state.seen.insert(folder_name);

        match load_raw_set(&folder) {
            Some(set) => {
                for diff in &set.difficulties {
                    state.new_hashes.push(diff.md5_hash);
                }
                db.beatmaps.insert_set(set);
                state.loaded_this_scan += 1;
            }
            None => {
                tracing::debug!("No valid difficulties in {}", folder.display());
            }
        }
    }
}

fn finish_scan(db: &Database, state: &mut RawScanState) {
    state.scheduled = false;
    state.last_new_count = state.loaded_this_scan;
    state.found_changes = state.loaded_this_scan > 0;
    state.first_load = false;

    tracing::info!("Raw scan finished: {} new beatmap set(s)", state.last_new_count);

    // Everything parsed from bare .osu files needs stars and loudness.
    let hashes = std::mem::take(&mut state.new_hashes);
    if hashes.is_empty() {
        return;
    }
    let notifier = db.recalc.lock().expect("recalc lock poisoned").clone();
    if let Some(notifier) = notifier {
        notifier.stars_needed(hashes.clone());
        notifier.loudness_needed(hashes);
    }
}

/// Parse one beatmap folder directly from its `.osu` files. Returns
/// `None` when no difficulty survives parsing.
pub(crate) fn load_raw_set(folder: &Path) -> Option<BeatmapSet> {
    let mut difficulties = Vec::new();
    for entry in WalkDir::new(folder)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_osu = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("osu"))
            .unwrap_or(false);
        if !is_osu {
            continue;
        }
        match parse_osu_file(path) {
            Ok(diff) if diff.mode == GameMode::Osu => difficulties.push(diff),
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Failed to parse {}: {}", path.display(), e);
            }
        }
    }

    if difficulties.is_empty() {
        return None;
    }

    let set_id = difficulties
        .iter()
        .map(|d| d.set_id)
        .find(|&id| id > 0)
        .unwrap_or(-1);
    let mut set = BeatmapSet::new(set_id, BeatmapOrigin::Native);
    set.difficulties = difficulties;
    Some(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_osu_file(dir: &Path, name: &str, title: &str, set_id: i32) {
        let content = format!(
            "osu file format v14\n\n[General]\nAudioFilename: a.mp3\nMode: 0\n\n\
             [Metadata]\nTitle:{}\nArtist:artist\nCreator:mapper\nVersion:{}\n\
             BeatmapID:1\nBeatmapSetID:{}\n\n\
             [Difficulty]\nHPDrainRate:5\nCircleSize:4\nOverallDifficulty:7\nApproachRate:9\n\
             SliderMultiplier:1.4\nSliderTickRate:1\n\n\
             [TimingPoints]\n0,400,4,2,0,60,1,0\n\n\
             [HitObjects]\n256,192,1000,1,0,0:0:0:0:\n",
            title, name, set_id
        );
        std::fs::write(dir.join(format!("{}.osu", name)), content).unwrap();
    }

    #[test]
    fn test_load_raw_set_collects_difficulties() {
        let dir = tempfile::tempdir().unwrap();
        write_osu_file(dir.path(), "easy", "Song", 777);
        write_osu_file(dir.path(), "hard", "Song", 777);
        std::fs::write(dir.path().join("readme.txt"), "not a map").unwrap();

        let set = load_raw_set(dir.path()).unwrap();
        assert_eq!(set.set_id, 777);
        assert_eq!(set.difficulties.len(), 2);
        assert_eq!(set.origin, BeatmapOrigin::Native);
    }

    #[test]
    fn test_load_raw_set_empty_folder() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_raw_set(dir.path()).is_none());
    }
}
