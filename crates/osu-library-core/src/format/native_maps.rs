//! Reader/writer for `library_maps.db`, this client's own map index.
//!
//! The format is append-only across versions: a u32 version, a u32 set
//! count, then per set an id, a diff count and the per-diff field
//! sequence. Version gates:
//!
//! - `< 20240812`: each diff carries an inline timing-point block
//!   (replaced by the precomputed BPM summary, skipped on read)
//! - `>= 20240703`: draw-background byte
//! - `>= 20240812`: loudness and the trailing override table
//! - `>= 20251009`: cached background filename (diffs and overrides)

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;

use crate::beatmap::{
    BeatmapDifficulty, BeatmapOrigin, BeatmapSet, BpmSummary, GameMode, MapOverrides,
};
use crate::error::Result;
use crate::format::codec::{BinaryReader, BinaryWriter};
use crate::format::LoadMonitor;
use crate::hash::Md5Hash;

pub const NATIVE_MAPS_VERSION: u32 = 20251009;

/// Versions below this still carried inline timing points.
pub const VERSION_TIMING_BLOCK_REMOVED: u32 = 20240812;
/// Draw-background byte added.
pub const VERSION_DRAW_BACKGROUND: u32 = 20240703;
/// Loudness field and override table added.
pub const VERSION_LOUDNESS_AND_OVERRIDES: u32 = 20240812;
/// Cached background filename added.
pub const VERSION_BACKGROUND_FILENAME: u32 = 20251009;

/// On-disk size of one legacy inline timing-point record
/// (f64 ms-per-beat + f64 offset + u8 uninherited).
const TIMING_POINT_RECORD_SIZE: u64 = 17;

/// Parsed contents of a native maps file.
#[derive(Debug, Default)]
pub struct NativeMapsFile {
    pub version: u32,
    pub sets: Vec<BeatmapSet>,
    pub overrides: HashMap<Md5Hash, MapOverrides>,
}

/// Read the whole file. `maps_dir` is where set folders live; each diff
/// gets its folder/file paths derived from its set id.
pub fn read<R: Read>(
    reader: &mut BinaryReader<R>,
    maps_dir: &Path,
    monitor: &mut dyn LoadMonitor,
) -> Result<NativeMapsFile> {
    let version = reader.read_u32()?;
    if version > NATIVE_MAPS_VERSION {
        // A newer build wrote fields this reader has no gates for;
        // parsing would misalign immediately.
        return Err(crate::error::Error::VersionTooNew {
            path: std::path::PathBuf::from(super::FILE_NATIVE_MAPS),
            found: version,
            supported: NATIVE_MAPS_VERSION,
        });
    }
    let nb_sets = reader.read_u32()?;

    let mut out = NativeMapsFile {
        version,
        ..Default::default()
    };

    for _ in 0..nb_sets {
        if monitor.is_cancelled() {
            return Ok(out);
        }

        let set_id = reader.read_i32()?;
        let nb_diffs = reader.read_u16()?;
        let folder = maps_dir.join(set_id.to_string());
        let folder_path = format!("{}/", folder.display());

        let mut set = BeatmapSet::new(set_id, BeatmapOrigin::Native);
        for _ in 0..nb_diffs {
            if monitor.is_cancelled() {
                return Ok(out);
            }
            let diff = read_difficulty(reader, version, set_id, &folder_path)?;
            set.difficulties.push(diff);
            monitor.record_position(reader.position());
        }

        // Sets that lost their id can't be mapped back to a folder;
        // they are rebuilt from disk on the next raw scan instead.
        if set.difficulties.is_empty() || set_id == -1 {
            continue;
        }
        out.sets.push(set);
    }

    if version >= VERSION_LOUDNESS_AND_OVERRIDES {
        let nb_overrides = reader.read_u32()?;
        for _ in 0..nb_overrides {
            let hash = reader.read_hash()?;
            let mut over = MapOverrides {
                local_offset: reader.read_i16()?,
                online_offset: reader.read_i16()?,
                star_rating: reader.read_f32()?,
                loudness: reader.read_f32()?,
                min_bpm: reader.read_i32()?,
                max_bpm: reader.read_i32()?,
                avg_bpm: reader.read_i32()?,
                draw_background: reader.read_u8()? != 0,
                ..Default::default()
            };
            if version >= VERSION_BACKGROUND_FILENAME {
                over.background_image_file_name = reader.read_string_or_default()?;
            }
            out.overrides.insert(hash, over);
        }
    }

    Ok(out)
}

fn read_difficulty<R: Read>(
    reader: &mut BinaryReader<R>,
    version: u32,
    set_id: i32,
    folder_path: &str,
) -> Result<BeatmapDifficulty> {
    let osu_file_name = reader.read_string_or_default()?;

    let mut diff = BeatmapDifficulty {
        set_id,
        folder_path: folder_path.to_string(),
        file_path: format!("{}{}", folder_path, osu_file_name),
        mode: GameMode::Osu,
        origin: BeatmapOrigin::Native,
        draw_background: true,
        ..Default::default()
    };

    diff.id = reader.read_i32()?;
    diff.title = reader.read_string_or_default()?;
    diff.audio_file_name = reader.read_string_or_default()?;
    diff.length_ms = reader.read_i32()?.max(0) as u32;
    diff.stack_leniency = reader.read_f32()?;
    diff.artist = reader.read_string_or_default()?;
    diff.creator = reader.read_string_or_default()?;
    diff.difficulty_name = reader.read_string_or_default()?;
    diff.source = reader.read_string_or_default()?;
    diff.tags = reader.read_string_or_default()?;
    diff.md5_hash = reader.read_hash()?;
    diff.approach_rate = reader.read_f32()?;
    diff.circle_size = reader.read_f32()?;
    diff.hp_drain = reader.read_f32()?;
    diff.overall_difficulty = reader.read_f32()?;
    diff.slider_multiplier = reader.read_f64()?;
    diff.preview_time = reader.read_i32()?;
    diff.last_modification_time = reader.read_u64()?;
    diff.local_offset = reader.read_i16()?;
    diff.online_offset = reader.read_i16()?;
    diff.num_circles = reader.read_u16()?;
    diff.num_sliders = reader.read_u16()?;
    diff.num_spinners = reader.read_u16()?;
    diff.star_rating = reader.read_f64()?;
    diff.bpm = BpmSummary {
        min: reader.read_i32()?,
        max: reader.read_i32()?,
        most_common: reader.read_i32()?,
    };

    if version < VERSION_TIMING_BLOCK_REMOVED {
        let nb_timing_points = reader.read_u32()?;
        reader.skip_bytes(TIMING_POINT_RECORD_SIZE * nb_timing_points as u64)?;
    }
    if version >= VERSION_DRAW_BACKGROUND {
        diff.draw_background = reader.read_u8()? != 0;
    }
    if version >= VERSION_LOUDNESS_AND_OVERRIDES {
        diff.loudness = reader.read_f32()?;
    }
    if version >= VERSION_BACKGROUND_FILENAME {
        diff.background_image_file_name = reader.read_string_or_default()?;
    }

    Ok(diff)
}

/// Write the current-version format.
pub fn write<W: Write>(
    writer: &mut BinaryWriter<W>,
    sets: &[BeatmapSet],
    overrides: &HashMap<Md5Hash, MapOverrides>,
) -> Result<()> {
    writer.write_u32(NATIVE_MAPS_VERSION)?;

    let saveable: Vec<&BeatmapSet> = sets
        .iter()
        .filter(|s| !s.difficulties.is_empty() && s.set_id != -1)
        .collect();
    writer.write_u32(saveable.len() as u32)?;

    for set in saveable {
        writer.write_i32(set.set_id)?;
        writer.write_u16(set.difficulties.len() as u16)?;
        for diff in &set.difficulties {
            write_difficulty(writer, diff)?;
        }
    }

    writer.write_u32(overrides.len() as u32)?;
    for (hash, over) in overrides {
        writer.write_hash(hash)?;
        writer.write_i16(over.local_offset)?;
        writer.write_i16(over.online_offset)?;
        writer.write_f32(over.star_rating)?;
        writer.write_f32(over.loudness)?;
        writer.write_i32(over.min_bpm)?;
        writer.write_i32(over.max_bpm)?;
        writer.write_i32(over.avg_bpm)?;
        writer.write_u8(over.draw_background as u8)?;
        writer.write_string(&over.background_image_file_name)?;
    }

    writer.flush()
}

fn write_difficulty<W: Write>(writer: &mut BinaryWriter<W>, diff: &BeatmapDifficulty) -> Result<()> {
    let osu_file_name = diff
        .file_path
        .rsplit('/')
        .next()
        .unwrap_or(diff.file_path.as_str());
    writer.write_string(osu_file_name)?;
    writer.write_i32(diff.id)?;
    writer.write_string(&diff.title)?;
    writer.write_string(&diff.audio_file_name)?;
    writer.write_i32(diff.length_ms as i32)?;
    writer.write_f32(diff.stack_leniency)?;
    writer.write_string(&diff.artist)?;
    writer.write_string(&diff.creator)?;
    writer.write_string(&diff.difficulty_name)?;
    writer.write_string(&diff.source)?;
    writer.write_string(&diff.tags)?;
    writer.write_hash(&diff.md5_hash)?;
    writer.write_f32(diff.approach_rate)?;
    writer.write_f32(diff.circle_size)?;
    writer.write_f32(diff.hp_drain)?;
    writer.write_f32(diff.overall_difficulty)?;
    writer.write_f64(diff.slider_multiplier)?;
    writer.write_i32(diff.preview_time)?;
    writer.write_u64(diff.last_modification_time)?;
    writer.write_i16(diff.local_offset)?;
    writer.write_i16(diff.online_offset)?;
    writer.write_u16(diff.num_circles)?;
    writer.write_u16(diff.num_sliders)?;
    writer.write_u16(diff.num_spinners)?;
    writer.write_f64(diff.star_rating)?;
    writer.write_i32(diff.bpm.min)?;
    writer.write_i32(diff.bpm.max)?;
    writer.write_i32(diff.bpm.most_common)?;
    writer.write_u8(diff.draw_background as u8)?;
    writer.write_f32(diff.loudness)?;
    writer.write_string(&diff.background_image_file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::NullMonitor;
    use std::io::Cursor;

    fn sample_diff(n: u8, set_id: i32) -> BeatmapDifficulty {
        let mut hash_str = String::new();
        for _ in 0..32 {
            hash_str.push(char::from_digit((n % 10) as u32, 10).unwrap());
        }
        BeatmapDifficulty {
            md5_hash: Md5Hash::from_hex_str(&hash_str).unwrap(),
            id: 1000 + n as i32,
            set_id,
            title: "Tower of Heaven".to_string(),
            title_unicode: String::new(),
            artist: "Feint".to_string(),
            artist_unicode: String::new(),
            creator: "someone".to_string(),
            difficulty_name: format!("Extra {}", n),
            source: "".to_string(),
            tags: "stream tech".to_string(),
            folder_path: format!("maps/{}/", set_id),
            file_path: format!("maps/{}/map{}.osu", set_id, n),
            audio_file_name: "audio.mp3".to_string(),
            background_image_file_name: "bg.png".to_string(),
            draw_background: true,
            approach_rate: 9.2,
            circle_size: 4.0,
            hp_drain: 5.5,
            overall_difficulty: 8.7,
            slider_multiplier: 1.8,
            num_circles: 600,
            num_sliders: 300,
            num_spinners: 2,
            length_ms: 215_000,
            preview_time: 40_000,
            stack_leniency: 0.7,
            last_modification_time: 1_700_000_000,
            local_offset: -8,
            online_offset: 3,
            bpm: BpmSummary {
                min: 175,
                max: 175,
                most_common: 175,
            },
            star_rating: 6.12,
            loudness: -6.4,
            mode: GameMode::Osu,
            origin: BeatmapOrigin::Native,
        }
    }

    #[test]
    fn test_roundtrip_current_version() {
        let mut set = BeatmapSet::new(93523, BeatmapOrigin::Native);
        set.difficulties.push(sample_diff(1, 93523));
        set.difficulties.push(sample_diff(2, 93523));

        let mut overrides = HashMap::new();
        overrides.insert(
            sample_diff(7, 1).md5_hash,
            MapOverrides {
                local_offset: -20,
                star_rating: 5.4,
                background_image_file_name: "other.png".to_string(),
                ..Default::default()
            },
        );

        let mut writer = BinaryWriter::new(Vec::new());
        write(&mut writer, std::slice::from_ref(&set), &overrides).unwrap();

        let mut reader = BinaryReader::new(Cursor::new(writer.into_inner()));
        let file = read(&mut reader, Path::new("maps"), &mut NullMonitor).unwrap();

        assert_eq!(file.version, NATIVE_MAPS_VERSION);
        assert_eq!(file.sets.len(), 1);
        assert_eq!(file.sets[0].difficulties, set.difficulties);
        assert_eq!(file.overrides, overrides);
    }

    #[test]
    fn test_invalid_set_id_dropped() {
        let mut orphan = BeatmapSet::new(-1, BeatmapOrigin::Native);
        orphan.difficulties.push(sample_diff(1, -1));
        let mut writer = BinaryWriter::new(Vec::new());
        write(&mut writer, std::slice::from_ref(&orphan), &HashMap::new()).unwrap();

        let mut reader = BinaryReader::new(Cursor::new(writer.into_inner()));
        let file = read(&mut reader, Path::new("maps"), &mut NullMonitor).unwrap();
        assert!(file.sets.is_empty());
    }

    #[test]
    fn test_old_version_with_timing_block() {
        // Hand-build a pre-20240703 file: timing block present, no
        // draw-background/loudness/background-filename/overrides.
        let diff = sample_diff(3, 42);
        let mut w = BinaryWriter::new(Vec::new());
        w.write_u32(20240101).unwrap();
        w.write_u32(1).unwrap();
        w.write_i32(42).unwrap();
        w.write_u16(1).unwrap();

        w.write_string("map3.osu").unwrap();
        w.write_i32(diff.id).unwrap();
        w.write_string(&diff.title).unwrap();
        w.write_string(&diff.audio_file_name).unwrap();
        w.write_i32(diff.length_ms as i32).unwrap();
        w.write_f32(diff.stack_leniency).unwrap();
        w.write_string(&diff.artist).unwrap();
        w.write_string(&diff.creator).unwrap();
        w.write_string(&diff.difficulty_name).unwrap();
        w.write_string(&diff.source).unwrap();
        w.write_string(&diff.tags).unwrap();
        w.write_hash(&diff.md5_hash).unwrap();
        w.write_f32(diff.approach_rate).unwrap();
        w.write_f32(diff.circle_size).unwrap();
        w.write_f32(diff.hp_drain).unwrap();
        w.write_f32(diff.overall_difficulty).unwrap();
        w.write_f64(diff.slider_multiplier).unwrap();
        w.write_i32(diff.preview_time).unwrap();
        w.write_u64(diff.last_modification_time).unwrap();
        w.write_i16(diff.local_offset).unwrap();
        w.write_i16(diff.online_offset).unwrap();
        w.write_u16(diff.num_circles).unwrap();
        w.write_u16(diff.num_sliders).unwrap();
        w.write_u16(diff.num_spinners).unwrap();
        w.write_f64(diff.star_rating).unwrap();
        w.write_i32(diff.bpm.min).unwrap();
        w.write_i32(diff.bpm.max).unwrap();
        w.write_i32(diff.bpm.most_common).unwrap();

        // two inline timing points
        w.write_u32(2).unwrap();
        for _ in 0..2 {
            w.write_f64(500.0).unwrap();
            w.write_f64(0.0).unwrap();
            w.write_u8(1).unwrap();
        }

        let mut reader = BinaryReader::new(Cursor::new(w.into_inner()));
        let file = read(&mut reader, Path::new("maps"), &mut NullMonitor).unwrap();
        assert_eq!(file.sets.len(), 1);
        let loaded = &file.sets[0].difficulties[0];
        assert_eq!(loaded.md5_hash, diff.md5_hash);
        // Fields behind newer gates fall back to their defaults.
        assert!(loaded.draw_background);
        assert_eq!(loaded.loudness, 0.0);
        assert!(loaded.background_image_file_name.is_empty());
        assert!(file.overrides.is_empty());
    }
}
