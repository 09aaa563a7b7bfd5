//! Reader for osu!stable's `osu!.db` map index.
//!
//! The format accumulated version-gated layout changes over a decade;
//! every branch below is load-bearing and must match the wire format of
//! the version being read:
//!
//! - `>= 20160408 && < 20191106`: a per-entry byte size prefix. This
//!   field was added in 20160408 and removed again in 20191106; it is
//!   widely mis-documented as still present.
//! - `< 20140609`: AR/CS/HP/OD are single bytes, a trailing u16 follows
//!   the visual-override flags, and there are no star-rating arrays.
//! - `>= 20140609`: four per-mode star-rating arrays; each entry is a
//!   0x08 byte, a u32 mod mask, a 0x0c byte and the star value.
//! - `>= 20250108`: star values shrank from f64 to f32.
//!
//! Timing points are 17-byte packed records decoded field-by-field, never
//! reinterpreted from the raw buffer.

use std::collections::HashMap;
use std::io::Read;

use crate::beatmap::{
    bpm_summary, BeatmapDifficulty, BeatmapOrigin, GameMode, MapOverrides, TimingPoint,
};
use crate::error::Result;
use crate::format::codec::BinaryReader;
use crate::format::LoadMonitor;
use crate::hash::Md5Hash;

/// Byte AR/CS/HP/OD and the trailing unknown u16 end here; star-rating
/// arrays begin here.
pub const VERSION_FLOAT_DIFFICULTY: u32 = 20140609;
/// Entry-size prefix added.
pub const VERSION_ENTRY_SIZE_ADDED: u32 = 20160408;
/// Entry-size prefix removed.
pub const VERSION_ENTRY_SIZE_REMOVED: u32 = 20191106;
/// Star values stored as f32 instead of f64.
pub const VERSION_F32_STARS: u32 = 20250108;

#[derive(Debug, Clone, Default)]
pub struct StableMapsHeader {
    pub version: u32,
    pub folder_count: u32,
    pub player_name: String,
    pub num_beatmaps: u32,
}

/// One accepted entry plus its recalculation needs.
#[derive(Debug, Clone)]
pub struct StableEntry {
    pub diff: BeatmapDifficulty,
    pub needs_star_recalc: bool,
    pub needs_loudness_recalc: bool,
}

/// Counts for the load report.
#[derive(Debug, Default, Clone, Copy)]
pub struct StableMapsStats {
    pub parsed: u32,
    pub skipped: u32,
}

pub fn read_header<R: Read>(reader: &mut BinaryReader<R>) -> Result<StableMapsHeader> {
    let version = reader.read_u32()?;
    let folder_count = reader.read_u32()?;
    reader.read_u8()?; // account unlocked
    reader.read_u64()?; // unlock date
    let player_name = reader.read_string_or_default()?;
    let num_beatmaps = reader.read_u32()?;
    Ok(StableMapsHeader {
        version,
        folder_count,
        player_name,
        num_beatmaps,
    })
}

/// Read every map entry, feeding accepted ones to `sink` as they finish
/// parsing. Cancellation leaves the prefix already handed to the sink
/// intact and discards nothing else.
pub fn read_entries<R: Read>(
    reader: &mut BinaryReader<R>,
    header: &StableMapsHeader,
    songs_folder: &str,
    overrides: &HashMap<Md5Hash, MapOverrides>,
    monitor: &mut dyn LoadMonitor,
    sink: &mut dyn FnMut(StableEntry),
) -> Result<StableMapsStats> {
    let mut stats = StableMapsStats::default();
    for i in 0..header.num_beatmaps {
        if monitor.is_cancelled() {
            break;
        }
        tracing::trace!("Reading stable map entry {}/{}", i + 1, header.num_beatmaps);
        match read_entry(reader, header.version, songs_folder, overrides)? {
            Some(entry) => {
                stats.parsed += 1;
                sink(entry);
            }
            None => stats.skipped += 1,
        }
        monitor.record_position(reader.position());
    }
    Ok(stats)
}

fn trim(s: String) -> String {
    s.trim().to_string()
}

fn read_star_rating_array<R: Read>(
    reader: &mut BinaryReader<R>,
    version: u32,
) -> Result<Option<f64>> {
    let count = reader.read_u32()?;
    let mut nomod = None;
    for _ in 0..count {
        reader.read_u8()?; // 0x08 type tag
        let mods = reader.read_u32()?;
        reader.read_u8()?; // 0x0c type tag
        let sr = if version >= VERSION_F32_STARS {
            reader.read_f32()? as f64
        } else {
            reader.read_f64()?
        };
        if mods == 0 {
            nomod = Some(sr);
        }
    }
    Ok(nomod)
}

fn read_entry<R: Read>(
    reader: &mut BinaryReader<R>,
    version: u32,
    songs_folder: &str,
    overrides: &HashMap<Md5Hash, MapOverrides>,
) -> Result<Option<StableEntry>> {
    if (VERSION_ENTRY_SIZE_ADDED..VERSION_ENTRY_SIZE_REMOVED).contains(&version) {
        reader.read_u32()?; // entry size in bytes
    }

    let artist = trim(reader.read_string_or_default()?);
    let artist_unicode = reader.read_string_or_default()?;
    let title = trim(reader.read_string_or_default()?);
    let title_unicode = reader.read_string_or_default()?;
    let creator = trim(reader.read_string_or_default()?);
    let difficulty_name = trim(reader.read_string_or_default()?);
    let audio_file_name = reader.read_string_or_default()?;

    let hash_str = reader.read_string_or_default()?;
    let md5_hash = Md5Hash::from_hex_str(&hash_str).unwrap_or_default();
    let override_entry = overrides.get(&md5_hash);

    let osu_file_name = reader.read_string_or_default()?;
    reader.read_u8()?; // ranked status
    let num_circles = reader.read_u16()?;
    let num_sliders = reader.read_u16()?;
    let num_spinners = reader.read_u16()?;
    let last_modification_time = reader.read_u64()?;

    let (ar, cs, hp, od) = if version < VERSION_FLOAT_DIFFICULTY {
        (
            reader.read_u8()? as f32,
            reader.read_u8()? as f32,
            reader.read_u8()? as f32,
            reader.read_u8()? as f32,
        )
    } else {
        (
            reader.read_f32()?,
            reader.read_f32()?,
            reader.read_f32()?,
            reader.read_f32()?,
        )
    };

    let slider_multiplier = reader.read_f64()?;

    let mut nomod_star_rating = 0.0f64;
    if version >= VERSION_FLOAT_DIFFICULTY {
        if let Some(sr) = read_star_rating_array(reader, version)? {
            nomod_star_rating = sr;
        }
        read_star_rating_array(reader, version)?; // taiko
        read_star_rating_array(reader, version)?; // catch
        read_star_rating_array(reader, version)?; // mania
    }

    reader.read_u32()?; // drain time, seconds
    let duration = reader.read_i32()?.max(0) as u32; // milliseconds
    let preview_time = reader.read_i32()?;

    let nb_timing_points = reader.read_u32()?;
    let bpm = if let Some(over) = override_entry {
        reader.skip_bytes(17 * nb_timing_points as u64)?;
        crate::beatmap::BpmSummary {
            min: over.min_bpm,
            max: over.max_bpm,
            most_common: over.avg_bpm,
        }
    } else {
        let mut points = Vec::with_capacity(nb_timing_points as usize);
        for _ in 0..nb_timing_points {
            points.push(TimingPoint {
                ms_per_beat: reader.read_f64()?,
                offset: reader.read_f64()?,
                uninherited: reader.read_u8()? != 0,
            });
        }
        bpm_summary(&points, duration)
    };

    // NOT unsigned as commonly documented; -1 happens in the wild.
    let id = reader.read_i32()?;
    let mut set_id = reader.read_i32()?;
    reader.read_u32()?; // thread id

    reader.read_u8()?; // standard grade
    reader.read_u8()?; // taiko grade
    reader.read_u8()?; // catch grade
    reader.read_u8()?; // mania grade

    let local_offset = reader.read_i16()?;
    let stack_leniency = reader.read_f32()?;
    let mode = reader.read_u8()?;

    let source = trim(reader.read_string_or_default()?);
    let tags = trim(reader.read_string_or_default()?);

    let online_offset = reader.read_i16()?;
    reader.skip_string()?; // song title font
    reader.read_u8()?; // unplayed
    reader.read_u64()?; // last time played
    reader.read_u8()?; // is osz2

    // Some entries keep spaces around the folder name, which breaks
    // path lookups downstream.
    let mut path = trim(reader.read_string_or_default()?);

    reader.read_u64()?; // last online check

    reader.read_u8()?; // ignore beatmap sounds
    reader.read_u8()?; // ignore beatmap skin
    reader.read_u8()?; // disable storyboard
    reader.read_u8()?; // disable video
    reader.read_u8()?; // visual override

    if version < VERSION_FLOAT_DIFFICULTY {
        reader.read_u16()?; // unknown
    }

    reader.read_u32()?; // last edit time
    reader.read_u8()?; // mania scroll speed

    // Stable stores nested paths with backslashes.
    if !cfg!(windows) {
        path = path.replace('\\', "/");
    }

    // Fallback for entries that never got a set id: the folder name of a
    // downloaded set starts with its numeric id.
    if set_id < 1 && !path.is_empty() {
        if let Some(first_dir) = path.split('\\').next() {
            if let Some(lead) = first_dir.split(' ').next() {
                set_id = lead.parse::<i32>().unwrap_or(-1);
                if set_id == 0 {
                    set_id = -1;
                }
            }
        }
    }

    // Stale/corrupt rows: every identifying field empty. Checking the
    // .osu file on disk would be correct but far too slow here.
    if artist.is_empty()
        && title.is_empty()
        && creator.is_empty()
        && difficulty_name.is_empty()
        && md5_hash.is_empty()
    {
        return Ok(None);
    }
    if GameMode::from_u8(mode) != Some(GameMode::Osu) {
        return Ok(None);
    }

    let folder_path = format!("{}{}/", songs_folder, path);
    let file_path = format!("{}{}", folder_path, osu_file_name);

    let mut diff = BeatmapDifficulty {
        md5_hash,
        id,
        set_id,
        title,
        title_unicode,
        artist,
        artist_unicode,
        creator,
        difficulty_name,
        source,
        tags,
        folder_path,
        file_path,
        audio_file_name,
        draw_background: true,
        approach_rate: ar,
        circle_size: cs,
        hp_drain: hp,
        overall_difficulty: od,
        slider_multiplier,
        num_circles,
        num_sliders,
        num_spinners,
        length_ms: duration,
        preview_time,
        stack_leniency,
        last_modification_time,
        local_offset,
        online_offset,
        bpm,
        star_rating: nomod_star_rating,
        mode: GameMode::Osu,
        origin: BeatmapOrigin::Imported,
        ..Default::default()
    };

    let mut needs_star_recalc = false;
    let mut needs_loudness_recalc = true;
    if let Some(over) = override_entry {
        over.apply_to(&mut diff);
        needs_loudness_recalc = over.loudness == 0.0;
    } else if nomod_star_rating <= 0.0 {
        diff.star_rating = -nomod_star_rating;
        needs_star_recalc = true;
    }

    Ok(Some(StableEntry {
        diff,
        needs_star_recalc,
        needs_loudness_recalc,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::codec::BinaryWriter;
    use crate::format::NullMonitor;
    use std::io::Cursor;

    const HASH: &str = "deadbeefdeadbeefdeadbeefdeadbeef";

    fn write_header(w: &mut BinaryWriter<Vec<u8>>, version: u32, num_beatmaps: u32) {
        w.write_u32(version).unwrap();
        w.write_u32(10).unwrap(); // folder count
        w.write_u8(1).unwrap();
        w.write_u64(0).unwrap();
        w.write_string("peppy").unwrap();
        w.write_u32(num_beatmaps).unwrap();
    }

    struct EntrySpec {
        version: u32,
        hash: &'static str,
        artist: &'static str,
        mode: u8,
        set_id: i32,
        path: &'static str,
        stars: f64,
    }

    impl Default for EntrySpec {
        fn default() -> Self {
            Self {
                version: 20240101,
                hash: HASH,
                artist: "DragonForce",
                mode: 0,
                set_id: 10880,
                path: "10880 DragonForce - Revolution Deathsquad",
                stars: 6.93,
            }
        }
    }

    fn write_entry(w: &mut BinaryWriter<Vec<u8>>, spec: &EntrySpec) {
        let version = spec.version;
        if (VERSION_ENTRY_SIZE_ADDED..VERSION_ENTRY_SIZE_REMOVED).contains(&version) {
            w.write_u32(0).unwrap(); // size prefix (value unused)
        }
        w.write_string(spec.artist).unwrap();
        w.write_string("").unwrap(); // artist unicode
        w.write_string("Revolution Deathsquad").unwrap();
        w.write_string("").unwrap();
        w.write_string("Shulin").unwrap();
        w.write_string("Legend").unwrap();
        w.write_string("audio.mp3").unwrap();
        w.write_string(spec.hash).unwrap();
        w.write_string("map.osu").unwrap();
        w.write_u8(4).unwrap(); // ranked
        w.write_u16(800).unwrap();
        w.write_u16(400).unwrap();
        w.write_u16(3).unwrap();
        w.write_u64(1_600_000_000).unwrap();
        if version < VERSION_FLOAT_DIFFICULTY {
            w.write_u8(9).unwrap();
            w.write_u8(4).unwrap();
            w.write_u8(6).unwrap();
            w.write_u8(8).unwrap();
        } else {
            w.write_f32(9.3).unwrap();
            w.write_f32(4.2).unwrap();
            w.write_f32(6.0).unwrap();
            w.write_f32(8.5).unwrap();
        }
        w.write_f64(1.9).unwrap();
        if version >= VERSION_FLOAT_DIFFICULTY {
            // standard array with one nomod entry
            w.write_u32(1).unwrap();
            w.write_u8(0x08).unwrap();
            w.write_u32(0).unwrap();
            w.write_u8(0x0c).unwrap();
            if version >= VERSION_F32_STARS {
                w.write_f32(spec.stars as f32).unwrap();
            } else {
                w.write_f64(spec.stars).unwrap();
            }
            // empty taiko/catch/mania arrays
            w.write_u32(0).unwrap();
            w.write_u32(0).unwrap();
            w.write_u32(0).unwrap();
        }
        w.write_u32(420).unwrap(); // drain
        w.write_i32(421_000).unwrap(); // duration
        w.write_i32(35_000).unwrap(); // preview
        w.write_u32(1).unwrap(); // timing points
        w.write_f64(300.0).unwrap();
        w.write_f64(0.0).unwrap();
        w.write_u8(1).unwrap();
        w.write_i32(112_233).unwrap(); // id
        w.write_i32(spec.set_id).unwrap();
        w.write_u32(0).unwrap(); // thread
        w.write_u8(0).unwrap();
        w.write_u8(0).unwrap();
        w.write_u8(0).unwrap();
        w.write_u8(0).unwrap();
        w.write_i16(0).unwrap(); // local offset
        w.write_f32(0.7).unwrap();
        w.write_u8(spec.mode).unwrap();
        w.write_string("").unwrap(); // source
        w.write_string("dragonforce marathon").unwrap();
        w.write_i16(0).unwrap(); // online offset
        w.write_string("").unwrap(); // font
        w.write_u8(0).unwrap();
        w.write_u64(0).unwrap();
        w.write_u8(0).unwrap();
        w.write_string(spec.path).unwrap();
        w.write_u64(0).unwrap();
        for _ in 0..5 {
            w.write_u8(0).unwrap();
        }
        if version < VERSION_FLOAT_DIFFICULTY {
            w.write_u16(0).unwrap();
        }
        w.write_u32(0).unwrap();
        w.write_u8(0).unwrap();
    }

    fn read_all(bytes: Vec<u8>) -> (Vec<StableEntry>, StableMapsStats) {
        let mut reader = BinaryReader::new(Cursor::new(bytes));
        let header = read_header(&mut reader).unwrap();
        let mut entries = Vec::new();
        let stats = read_entries(
            &mut reader,
            &header,
            "Songs/",
            &HashMap::new(),
            &mut NullMonitor,
            &mut |e| entries.push(e),
        )
        .unwrap();
        (entries, stats)
    }

    #[test]
    fn test_modern_entry_parses() {
        let mut w = BinaryWriter::new(Vec::new());
        write_header(&mut w, 20240101, 1);
        write_entry(&mut w, &EntrySpec::default());
        let (entries, stats) = read_all(w.into_inner());
        assert_eq!(stats.parsed, 1);
        let diff = &entries[0].diff;
        assert_eq!(diff.artist, "DragonForce");
        assert_eq!(diff.star_rating, 6.93);
        assert_eq!(diff.bpm.most_common, 200);
        assert_eq!(diff.origin, BeatmapOrigin::Imported);
        assert!(diff.file_path.starts_with("Songs/10880 "));
        assert!(!entries[0].needs_star_recalc);
    }

    #[test]
    fn test_entry_size_prefix_window() {
        // 20180101 sits inside the added..removed window.
        let mut w = BinaryWriter::new(Vec::new());
        write_header(&mut w, 20180101, 1);
        write_entry(
            &mut w,
            &EntrySpec {
                version: 20180101,
                ..Default::default()
            },
        );
        let (entries, _) = read_all(w.into_inner());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].diff.title, "Revolution Deathsquad");
    }

    #[test]
    fn test_f32_star_gate() {
        let mut w = BinaryWriter::new(Vec::new());
        write_header(&mut w, 20250601, 1);
        write_entry(
            &mut w,
            &EntrySpec {
                version: 20250601,
                ..Default::default()
            },
        );
        let (entries, _) = read_all(w.into_inner());
        assert!((entries[0].diff.star_rating - 6.93).abs() < 1e-4);
    }

    #[test]
    fn test_byte_difficulty_gate() {
        let mut w = BinaryWriter::new(Vec::new());
        write_header(&mut w, 20140101, 1);
        write_entry(
            &mut w,
            &EntrySpec {
                version: 20140101,
                ..Default::default()
            },
        );
        let (entries, _) = read_all(w.into_inner());
        let diff = &entries[0].diff;
        assert_eq!(diff.approach_rate, 9.0);
        assert_eq!(diff.circle_size, 4.0);
        // No star array in this era: queued for recalculation.
        assert!(entries[0].needs_star_recalc);
    }

    #[test]
    fn test_non_standard_mode_skipped() {
        let mut w = BinaryWriter::new(Vec::new());
        write_header(&mut w, 20240101, 1);
        write_entry(
            &mut w,
            &EntrySpec {
                mode: 3,
                ..Default::default()
            },
        );
        let (entries, stats) = read_all(w.into_inner());
        assert!(entries.is_empty());
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn test_set_id_recovered_from_path() {
        let mut w = BinaryWriter::new(Vec::new());
        write_header(&mut w, 20240101, 1);
        write_entry(
            &mut w,
            &EntrySpec {
                set_id: -1,
                path: "39804 xi - FREEDOM DiVE",
                ..Default::default()
            },
        );
        let (entries, _) = read_all(w.into_inner());
        assert_eq!(entries[0].diff.set_id, 39804);
    }

    #[test]
    fn test_override_replaces_timing_and_metadata() {
        let mut overrides = HashMap::new();
        overrides.insert(
            Md5Hash::from_hex_str(HASH).unwrap(),
            MapOverrides {
                local_offset: -30,
                star_rating: 7.5,
                loudness: -4.0,
                min_bpm: 90,
                max_bpm: 180,
                avg_bpm: 180,
                draw_background: false,
                ..Default::default()
            },
        );

        let mut w = BinaryWriter::new(Vec::new());
        write_header(&mut w, 20240101, 1);
        write_entry(&mut w, &EntrySpec::default());

        let mut reader = BinaryReader::new(Cursor::new(w.into_inner()));
        let header = read_header(&mut reader).unwrap();
        let mut entries = Vec::new();
        read_entries(
            &mut reader,
            &header,
            "Songs/",
            &overrides,
            &mut NullMonitor,
            &mut |e| entries.push(e),
        )
        .unwrap();

        let diff = &entries[0].diff;
        assert_eq!(diff.local_offset, -30);
        assert_eq!(diff.star_rating, 7.5);
        assert_eq!(diff.bpm.most_common, 180);
        assert!(!diff.draw_background);
        assert!(!entries[0].needs_loudness_recalc);
    }
}
