//! Importer for osu!stable's `scores.db`.
//!
//! Timestamps are .NET ticks (100ns since 0001-01-01); the two epoch
//! constants below convert to unix seconds and to the tick convention
//! replay files are named by. The online score id changed width twice:
//! u64 from score version 20131110, i32 from 20121008, absent before.

use std::io::Read;

use crate::error::{Error, Result};
use crate::format::codec::BinaryReader;
use crate::format::LoadMonitor;
use crate::hash::Md5Hash;
use crate::score::{mod_flags, FinishedScore, Mods};

/// .NET ticks at 1970-01-01 (unix epoch).
const TICKS_AT_UNIX_EPOCH: u64 = 621_355_968_000_000_000;
/// Offset between database ticks and the replay-file naming convention.
const TICKS_REPLAY_NAME_OFFSET: u64 = 504_911_232_000_000_000;
const TICKS_PER_SECOND: u64 = 10_000_000;

/// Score version that widened the online id to u64.
const SCORE_VERSION_ID_U64: u32 = 20131110;
/// Score version that introduced the (then 32-bit) online id.
const SCORE_VERSION_ID_I32: u32 = 20121008;

/// Result of reading a stable scores file.
#[derive(Debug, Default)]
pub struct StableScoresFile {
    pub version: u32,
    pub scores: Vec<FinishedScore>,
    /// Records dropped by the mode/online-id acceptance rule or by the
    /// short-hash sanity check.
    pub skipped: u32,
}

pub fn read<R: Read>(
    reader: &mut BinaryReader<R>,
    monitor: &mut dyn LoadMonitor,
) -> Result<StableScoresFile> {
    let version = reader.read_u32()?;
    let nb_beatmaps = reader.read_u32()?;

    let mut out = StableScoresFile {
        version,
        ..Default::default()
    };

    for b in 0..nb_beatmaps {
        if monitor.is_cancelled() {
            return Ok(out);
        }

        let hash_str = reader.read_string_or_default()?;
        if hash_str.len() < 32 {
            // Stale entry. Skip the group; if the stream is misaligned
            // the next hash read hits the oversized case and stops.
            tracing::warn!("Invalid score group {} with hash length {}", b, hash_str.len());
            out.skipped += 1;
            continue;
        }
        if hash_str.len() > 32 {
            // Cannot happen in a well-formed file; the stream is
            // misaligned or corrupt. Abandon the rest of this file.
            return Err(Error::CorruptRecord {
                reason: format!("score group hash has length {}", hash_str.len()),
            });
        }
        let beatmap_hash = Md5Hash::from_hex_str(&hash_str).ok_or(Error::CorruptRecord {
            reason: "score group hash is not ASCII".to_string(),
        })?;

        let nb_scores = reader.read_u32()?;
        for _ in 0..nb_scores {
            match read_score_record(reader, beatmap_hash)? {
                Some(score) => out.scores.push(score),
                None => out.skipped += 1,
            }
        }
        monitor.record_position(reader.position());
    }

    Ok(out)
}

fn read_score_record<R: Read>(
    reader: &mut BinaryReader<R>,
    beatmap_hash: Md5Hash,
) -> Result<Option<FinishedScore>> {
    let gamemode = reader.read_u8()?;
    let score_version = reader.read_u32()?;

    let mut sc = FinishedScore {
        beatmap_hash,
        client: format!("peppy-{}", score_version),
        server: "ppy.sh".to_string(),
        ..Default::default()
    };

    reader.skip_string()?; // beatmap hash again
    sc.player_name = reader.read_string_or_default()?;
    reader.skip_string()?; // replay hash

    sc.num_300s = reader.read_u16()?;
    sc.num_100s = reader.read_u16()?;
    sc.num_50s = reader.read_u16()?;
    sc.num_gekis = reader.read_u16()?;
    sc.num_katus = reader.read_u16()?;
    sc.num_misses = reader.read_u16()?;

    // Documented as unsigned but observed negative in the wild.
    let score = reader.read_i32()?;
    sc.score = score.max(0) as u64;

    sc.combo_max = reader.read_u16()?;
    reader.read_u8()?; // perfect flag, derived from combo instead
    sc.mods = Mods::from_legacy(reader.read_u32()?);

    reader.skip_string()?; // hp graph

    let full_ticks = reader.read_u64()?;
    sc.unix_timestamp = full_ticks.saturating_sub(TICKS_AT_UNIX_EPOCH) / TICKS_PER_SECOND;
    sc.legacy_replay_timestamp = full_ticks.saturating_sub(TICKS_REPLAY_NAME_OFFSET);

    // Always -1 in modern files, but skip it properly just in case.
    let old_replay_size = reader.read_i32()?;
    if old_replay_size > 0 {
        reader.skip_bytes(old_replay_size as u64)?;
    }

    sc.online_score_id = if score_version >= SCORE_VERSION_ID_U64 {
        reader.read_u64()?
    } else if score_version >= SCORE_VERSION_ID_I32 {
        reader.read_i32()? as u64
    } else {
        0
    };

    if sc.mods.has(mod_flags::TARGET) {
        reader.read_f64()?; // total accuracy
    }

    // Only ranked standard-mode plays; everything else has no local use.
    if gamemode != 0 || sc.online_score_id == 0 {
        return Ok(None);
    }

    sc.grade = sc.calculate_grade();
    Ok(Some(sc))
}
