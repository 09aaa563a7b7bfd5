//! Importer for the predecessor engine's `scores.db`.
//!
//! Several versions of this format exist (see
//! [`super::LEGACY_ENGINE_SCORE_VERSIONS`]), but only 20240412 saved
//! replays alongside the database. Scores from the replay-less versions
//! would immediately lose any reconciliation against sources that do
//! have replays, so those files are reported and skipped whole.

use std::io::Read;

use crate::error::Result;
use crate::format::codec::BinaryReader;
use crate::format::LoadMonitor;
use crate::score::{mod_flags, FinishedScore, Mods};

/// The only legacy version whose scores are worth importing.
pub const LEGACY_REPLAY_VERSION: u32 = 20240412;

/// Stamp used for the cached PP values these files carry.
const LEGACY_PP_ALGORITHM_VERSION: u32 = 20220902;

/// Result of reading a legacy-engine scores file.
#[derive(Debug, Default)]
pub struct LegacyScoresFile {
    pub version: u32,
    pub scores: Vec<FinishedScore>,
    /// Set when the file's version carries no replays and was skipped.
    pub skipped_unsupported: bool,
}

pub fn read<R: Read>(
    reader: &mut BinaryReader<R>,
    monitor: &mut dyn LoadMonitor,
) -> Result<LegacyScoresFile> {
    let version = reader.read_u32()?;
    let nb_beatmaps = reader.read_u32()?;

    let mut out = LegacyScoresFile {
        version,
        ..Default::default()
    };

    if version != LEGACY_REPLAY_VERSION {
        tracing::info!(
            "Legacy scores.db version {} has no replays, skipping import",
            version
        );
        out.skipped_unsupported = true;
        return Ok(out);
    }

    let client = format!("legacy-{}", version);

    for _ in 0..nb_beatmaps {
        if monitor.is_cancelled() {
            return Ok(out);
        }
        let beatmap_hash = reader.read_hash()?;
        let nb_scores = reader.read_u32()?;

        for _ in 0..nb_scores {
            reader.read_u8()?; // gamemode, always 0
            reader.read_u32()?; // per-score format version

            let mut sc = FinishedScore {
                beatmap_hash,
                client: client.clone(),
                pp_algorithm_version: LEGACY_PP_ALGORITHM_VERSION,
                ..Default::default()
            };
            sc.unix_timestamp = reader.read_u64()?;
            sc.player_name = reader.read_string_or_default()?;
            sc.num_300s = reader.read_u16()?;
            sc.num_100s = reader.read_u16()?;
            sc.num_50s = reader.read_u16()?;
            sc.num_gekis = reader.read_u16()?;
            sc.num_katus = reader.read_u16()?;
            sc.num_misses = reader.read_u16()?;
            sc.score = reader.read_u64()?;
            sc.combo_max = reader.read_u16()?;
            sc.mods = Mods::from_legacy(reader.read_u32()?);
            sc.num_slider_breaks = reader.read_u16()?;
            sc.pp = reader.read_f32()?;
            sc.unstable_rate = reader.read_f32()?;
            sc.hit_error_avg_min = reader.read_f32()?;
            sc.hit_error_avg_max = reader.read_f32()?;
            sc.total_stars = reader.read_f32()?;
            sc.aim_stars = reader.read_f32()?;
            sc.speed_stars = reader.read_f32()?;
            sc.mods.speed = reader.read_f32()?;
            sc.mods.cs_override = reader.read_f32()?;
            sc.mods.ar_override = reader.read_f32()?;
            sc.mods.od_override = reader.read_f32()?;
            sc.mods.hp_override = reader.read_f32()?;
            sc.max_possible_combo = reader.read_u32()?;
            sc.num_hit_objects = reader.read_u32()?;
            sc.num_circles = reader.read_u32()?;
            sc.online_score_id = reader.read_u32()? as u64;
            sc.server = reader.read_string_or_default()?;

            let experimental_mods = reader.read_string_or_default()?;
            sc.mods.flags |= parse_experimental_mods(&experimental_mods);

            sc.grade = sc.calculate_grade();
            out.scores.push(sc);
        }
        monitor.record_position(reader.position());
    }

    Ok(out)
}

/// The legacy engine persisted experimental mods as a `;`-separated list
/// of console variable names. Unknown names are ignored.
fn parse_experimental_mods(list: &str) -> u64 {
    let mut flags = 0u64;
    for name in list.split(';') {
        flags |= match name {
            "osu_mod_wobble" | "osu_mod_wobble2" => mod_flags::WOBBLE,
            "osu_mod_arwobble" => mod_flags::AR_WOBBLE,
            "osu_mod_timewarp" => mod_flags::TIMEWARP,
            "osu_mod_artimewarp" => mod_flags::AR_TIMEWARP,
            "osu_mod_minimize" => mod_flags::MINIMIZE,
            "osu_mod_jigsaw1" | "osu_mod_jigsaw2" => mod_flags::JIGSAW,
            "osu_mod_fullalternate" => mod_flags::FULL_ALTERNATE,
            "osu_mod_reverse_sliders" => mod_flags::REVERSE_SLIDERS,
            "osu_mod_strict_tracking" => mod_flags::STRICT_TRACKING,
            "osu_playfield_mirror_horizontal" => mod_flags::MIRROR_HORIZONTAL,
            "osu_playfield_mirror_vertical" => mod_flags::MIRROR_VERTICAL,
            _ => 0,
        };
    }
    flags
}
