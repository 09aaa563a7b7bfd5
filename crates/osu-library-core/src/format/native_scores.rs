//! Reader/writer for `library_scores.db`, this client's own score format.
//!
//! Layout: 5-byte magic `OSLIB`, u32 version, u32 beatmap count, u32
//! total score count, then per beatmap a hash record, a u32 count and
//! that many fixed-sequence score records.

use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::format::codec::{BinaryReader, BinaryWriter};
use crate::format::LoadMonitor;
use crate::score::{FinishedScore, Grade, Mods};

pub const NATIVE_SCORES_MAGIC: &[u8; 5] = b"OSLIB";
pub const NATIVE_SCORES_VERSION: u32 = 20240725;

/// Parsed contents of a native scores file.
#[derive(Debug, Default)]
pub struct NativeScoresFile {
    pub version: u32,
    pub scores: Vec<FinishedScore>,
    /// Count the header declared; a mismatch with `scores.len()` is
    /// logged by the caller but not fatal.
    pub declared_count: u32,
}

/// Read the magic and version. Callers decide how to treat the version
/// (too new: skip the source; older: back the file up before rewriting).
pub fn read_header<R: Read>(reader: &mut BinaryReader<R>) -> Result<u32> {
    let mut magic = [0u8; 5];
    reader.read_bytes(&mut magic)?;
    if &magic != NATIVE_SCORES_MAGIC {
        return Err(Error::BadMagic {
            path: std::path::PathBuf::from(super::FILE_NATIVE_SCORES),
        });
    }
    reader.read_u32()
}

/// Read every score group after the header.
pub fn read_scores<R: Read>(
    reader: &mut BinaryReader<R>,
    version: u32,
    monitor: &mut dyn LoadMonitor,
) -> Result<NativeScoresFile> {
    let nb_beatmaps = reader.read_u32()?;
    let declared_count = reader.read_u32()?;

    let mut out = NativeScoresFile {
        version,
        declared_count,
        scores: Vec::with_capacity(declared_count as usize),
    };

    for _ in 0..nb_beatmaps {
        if monitor.is_cancelled() {
            return Ok(out);
        }
        let beatmap_hash = reader.read_hash()?;
        let nb_beatmap_scores = reader.read_u32()?;
        for _ in 0..nb_beatmap_scores {
            let mut score = read_score_record(reader)?;
            score.beatmap_hash = beatmap_hash;
            out.scores.push(score);
        }
        monitor.record_position(reader.position());
    }

    Ok(out)
}

fn read_score_record<R: Read>(reader: &mut BinaryReader<R>) -> Result<FinishedScore> {
    let mods = Mods {
        flags: reader.read_u64()?,
        speed: reader.read_f32()?,
        ar_override: reader.read_f32()?,
        cs_override: reader.read_f32()?,
        hp_override: reader.read_f32()?,
        od_override: reader.read_f32()?,
    };

    Ok(FinishedScore {
        beatmap_hash: Default::default(),
        mods,
        score: reader.read_u64()?,
        spinner_bonus: reader.read_u64()?,
        unix_timestamp: reader.read_u64()?,
        player_id: reader.read_u32()?,
        player_name: reader.read_string_or_default()?,
        grade: Grade::from_u8(reader.read_u8()?),
        client: reader.read_string_or_default()?,
        server: reader.read_string_or_default()?,
        online_score_id: reader.read_u64()?,
        legacy_replay_timestamp: reader.read_u64()?,
        num_300s: reader.read_u16()?,
        num_100s: reader.read_u16()?,
        num_50s: reader.read_u16()?,
        num_gekis: reader.read_u16()?,
        num_katus: reader.read_u16()?,
        num_misses: reader.read_u16()?,
        combo_max: reader.read_u16()?,
        pp_algorithm_version: reader.read_u32()?,
        pp: reader.read_f32()?,
        total_stars: reader.read_f32()?,
        aim_stars: reader.read_f32()?,
        speed_stars: reader.read_f32()?,
        num_slider_breaks: reader.read_u16()?,
        unstable_rate: reader.read_f32()?,
        hit_error_avg_min: reader.read_f32()?,
        hit_error_avg_max: reader.read_f32()?,
        max_possible_combo: reader.read_u32()?,
        num_hit_objects: reader.read_u32()?,
        num_circles: reader.read_u32()?,
        play_duration_ms: reader.read_u32()?,
    })
}

/// Write the current-version format from `(hash, scores)` groups.
/// Empty groups are dropped, so a written file never contains them.
pub fn write_scores<'a, W, I>(writer: &mut BinaryWriter<W>, groups: I) -> Result<()>
where
    W: Write,
    I: Iterator<Item = (&'a crate::hash::Md5Hash, &'a [FinishedScore])> + Clone,
{
    writer.write_bytes(NATIVE_SCORES_MAGIC)?;
    writer.write_u32(NATIVE_SCORES_VERSION)?;

    let mut nb_beatmaps = 0u32;
    let mut nb_scores = 0u32;
    for (_, list) in groups.clone() {
        if !list.is_empty() {
            nb_beatmaps += 1;
            nb_scores += list.len() as u32;
        }
    }
    writer.write_u32(nb_beatmaps)?;
    writer.write_u32(nb_scores)?;

    for (hash, list) in groups {
        if list.is_empty() {
            continue;
        }
        writer.write_hash(hash)?;
        writer.write_u32(list.len() as u32)?;
        for score in list {
            write_score_record(writer, score)?;
        }
    }
    writer.flush()
}

fn write_score_record<W: Write>(writer: &mut BinaryWriter<W>, score: &FinishedScore) -> Result<()> {
    writer.write_u64(score.mods.flags)?;
    writer.write_f32(score.mods.speed)?;
    writer.write_f32(score.mods.ar_override)?;
    writer.write_f32(score.mods.cs_override)?;
    writer.write_f32(score.mods.hp_override)?;
    writer.write_f32(score.mods.od_override)?;

    writer.write_u64(score.score)?;
    writer.write_u64(score.spinner_bonus)?;
    writer.write_u64(score.unix_timestamp)?;
    writer.write_u32(score.player_id)?;
    writer.write_string(&score.player_name)?;
    writer.write_u8(score.grade as u8)?;
    writer.write_string(&score.client)?;
    writer.write_string(&score.server)?;
    writer.write_u64(score.online_score_id)?;
    writer.write_u64(score.legacy_replay_timestamp)?;

    writer.write_u16(score.num_300s)?;
    writer.write_u16(score.num_100s)?;
    writer.write_u16(score.num_50s)?;
    writer.write_u16(score.num_gekis)?;
    writer.write_u16(score.num_katus)?;
    writer.write_u16(score.num_misses)?;
    writer.write_u16(score.combo_max)?;

    writer.write_u32(score.pp_algorithm_version)?;
    writer.write_f32(score.pp)?;
    writer.write_f32(score.total_stars)?;
    writer.write_f32(score.aim_stars)?;
    writer.write_f32(score.speed_stars)?;

    writer.write_u16(score.num_slider_breaks)?;
    writer.write_f32(score.unstable_rate)?;
    writer.write_f32(score.hit_error_avg_min)?;
    writer.write_f32(score.hit_error_avg_max)?;
    writer.write_u32(score.max_possible_combo)?;
    writer.write_u32(score.num_hit_objects)?;
    writer.write_u32(score.num_circles)?;
    writer.write_u32(score.play_duration_ms)
}
