//! Finished-score data model shared by every score source.

mod sorting;
pub mod stats;
mod store;

pub use sorting::ScoreSortMethod;
pub use store::ScoreStore;

use serde::{Deserialize, Serialize};

use crate::hash::Md5Hash;

/// Mod flag bits. The low 32 bits match the classic client encoding so
/// legacy score files convert without remapping; engine-specific mods
/// live above bit 32.
pub mod mod_flags {
    pub const NO_FAIL: u64 = 1;
    pub const EASY: u64 = 1 << 1;
    pub const TOUCH_DEVICE: u64 = 1 << 2;
    pub const HIDDEN: u64 = 1 << 3;
    pub const HARD_ROCK: u64 = 1 << 4;
    pub const SUDDEN_DEATH: u64 = 1 << 5;
    pub const DOUBLE_TIME: u64 = 1 << 6;
    pub const RELAX: u64 = 1 << 7;
    pub const HALF_TIME: u64 = 1 << 8;
    pub const NIGHTCORE: u64 = 1 << 9;
    pub const FLASHLIGHT: u64 = 1 << 10;
    pub const AUTOPLAY: u64 = 1 << 11;
    pub const SPUN_OUT: u64 = 1 << 12;
    pub const AUTOPILOT: u64 = 1 << 13;
    pub const PERFECT: u64 = 1 << 14;
    pub const TARGET: u64 = 1 << 23;
    pub const SCORE_V2: u64 = 1 << 29;

    // Engine-specific experimental mods, persisted only by this client.
    pub const WOBBLE: u64 = 1 << 40;
    pub const AR_WOBBLE: u64 = 1 << 41;
    pub const TIMEWARP: u64 = 1 << 42;
    pub const AR_TIMEWARP: u64 = 1 << 43;
    pub const MINIMIZE: u64 = 1 << 44;
    pub const JIGSAW: u64 = 1 << 45;
    pub const FULL_ALTERNATE: u64 = 1 << 46;
    pub const REVERSE_SLIDERS: u64 = 1 << 47;
    pub const STRICT_TRACKING: u64 = 1 << 48;
    pub const MIRROR_HORIZONTAL: u64 = 1 << 49;
    pub const MIRROR_VERTICAL: u64 = 1 << 50;
}

/// Mods active during a play, plus the difficulty overrides the engine
/// allows on top of the flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mods {
    pub flags: u64,
    /// Speed multiplier (1.0 = unmodified; DT/NC and HT set this too).
    pub speed: f32,
    pub ar_override: f32,
    pub cs_override: f32,
    pub hp_override: f32,
    pub od_override: f32,
}

impl Default for Mods {
    fn default() -> Self {
        Self {
            flags: 0,
            speed: 1.0,
            ar_override: -1.0,
            cs_override: -1.0,
            hp_override: -1.0,
            od_override: -1.0,
        }
    }
}

impl Mods {
    /// Convert a classic 32-bit mod bitmask. The bit positions are shared,
    /// so only the speed multiplier needs deriving.
    pub fn from_legacy(legacy: u32) -> Self {
        let flags = legacy as u64;
        let speed = if flags & (mod_flags::DOUBLE_TIME | mod_flags::NIGHTCORE) != 0 {
            1.5
        } else if flags & mod_flags::HALF_TIME != 0 {
            0.75
        } else {
            1.0
        };
        Self {
            flags,
            speed,
            ..Default::default()
        }
    }

    pub fn has(&self, flag: u64) -> bool {
        self.flags & flag != 0
    }
}

/// Grade achieved on a finished play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Grade {
    /// SS with Hidden/Flashlight
    XH = 0,
    /// S with Hidden/Flashlight
    SH = 1,
    X = 2,
    S = 3,
    A = 4,
    B = 5,
    C = 6,
    D = 7,
    F = 8,
    #[default]
    N = 9,
}

impl Grade {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Grade::XH,
            1 => Grade::SH,
            2 => Grade::X,
            3 => Grade::S,
            4 => Grade::A,
            5 => Grade::B,
            6 => Grade::C,
            7 => Grade::D,
            8 => Grade::F,
            _ => Grade::N,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Grade::XH | Grade::X => "SS",
            Grade::SH | Grade::S => "S",
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
            Grade::N => "-",
        }
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One completed play. Identity is `(beatmap_hash, unix_timestamp,
/// player_id)`; the timestamp is the practical dedup key per beatmap.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FinishedScore {
    pub beatmap_hash: Md5Hash,
    pub unix_timestamp: u64,
    pub player_id: u32,
    pub player_name: String,

    pub score: u64,
    pub spinner_bonus: u64,
    pub combo_max: u16,
    pub max_possible_combo: u32,

    pub num_300s: u16,
    pub num_100s: u16,
    pub num_50s: u16,
    pub num_gekis: u16,
    pub num_katus: u16,
    pub num_misses: u16,
    pub num_slider_breaks: u16,

    pub mods: Mods,
    pub grade: Grade,

    /// Stamp of the PP algorithm that produced the cached values below;
    /// a mismatch with the current algorithm marks them stale.
    pub pp_algorithm_version: u32,
    pub pp: f32,
    pub total_stars: f32,
    pub aim_stars: f32,
    pub speed_stars: f32,

    pub unstable_rate: f32,
    pub hit_error_avg_min: f32,
    pub hit_error_avg_max: f32,

    pub num_hit_objects: u32,
    pub num_circles: u32,
    pub play_duration_ms: u32,

    /// Originating client build, e.g. `peppy-20240101` for stable imports.
    pub client: String,
    pub server: String,
    pub online_score_id: u64,
    /// Replay timestamp in stable's on-disk convention; zero when the
    /// score did not come from stable.
    pub legacy_replay_timestamp: u64,
}

impl FinishedScore {
    /// Hit accuracy in [0, 1].
    pub fn accuracy(&self) -> f32 {
        let total =
            self.num_300s as u32 + self.num_100s as u32 + self.num_50s as u32 + self.num_misses as u32;
        if total == 0 {
            return 0.0;
        }
        let points = self.num_300s as u32 * 300 + self.num_100s as u32 * 100 + self.num_50s as u32 * 50;
        points as f32 / (total * 300) as f32
    }

    /// Whether an input replay for this score is plausibly obtainable.
    ///
    /// Stable scores carry a replay timestamp when the replay was kept;
    /// scores produced by this client or its direct predecessor always
    /// write a replay file next to the database.
    pub fn has_possible_replay(&self) -> bool {
        if self.legacy_replay_timestamp > 0 {
            return true;
        }
        !self.client.starts_with("peppy-")
    }

    pub fn is_perfect(&self) -> bool {
        self.max_possible_combo > 0 && self.combo_max as u32 >= self.max_possible_combo
    }

    /// Whether the cached PP value was computed by an older algorithm.
    pub fn is_pp_stale(&self, current_algorithm_version: u32) -> bool {
        self.pp_algorithm_version < current_algorithm_version
    }

    /// Derive the grade from judgement counts and mods, for sources that
    /// do not persist one.
    pub fn calculate_grade(&self) -> Grade {
        let total =
            self.num_300s as u32 + self.num_100s as u32 + self.num_50s as u32 + self.num_misses as u32;
        if total == 0 {
            return Grade::N;
        }
        let hidden = self.mods.has(mod_flags::HIDDEN) || self.mods.has(mod_flags::FLASHLIGHT);
        let ratio_300 = self.num_300s as f32 / total as f32;
        let ratio_50 = self.num_50s as f32 / total as f32;

        if self.num_300s as u32 == total {
            return if hidden { Grade::XH } else { Grade::X };
        }
        if ratio_300 > 0.9 && ratio_50 <= 0.01 && self.num_misses == 0 {
            return if hidden { Grade::SH } else { Grade::S };
        }
        if (ratio_300 > 0.8 && self.num_misses == 0) || ratio_300 > 0.9 {
            return Grade::A;
        }
        if (ratio_300 > 0.7 && self.num_misses == 0) || ratio_300 > 0.8 {
            return Grade::B;
        }
        if ratio_300 > 0.6 {
            return Grade::C;
        }
        Grade::D
    }

    /// Local-time display of the play date.
    pub fn date_string(&self) -> String {
        chrono::DateTime::<chrono::Utc>::from_timestamp(self.unix_timestamp as i64, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score_with_counts(n300: u16, n100: u16, n50: u16, miss: u16) -> FinishedScore {
        FinishedScore {
            num_300s: n300,
            num_100s: n100,
            num_50s: n50,
            num_misses: miss,
            ..Default::default()
        }
    }

    #[test]
    fn test_accuracy_full_combo_of_300s() {
        let s = score_with_counts(100, 0, 0, 0);
        assert!((s.accuracy() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_accuracy_no_hits() {
        assert_eq!(score_with_counts(0, 0, 0, 0).accuracy(), 0.0);
    }

    #[test]
    fn test_grade_ss_and_hidden_variant() {
        let mut s = score_with_counts(50, 0, 0, 0);
        assert_eq!(s.calculate_grade(), Grade::X);
        s.mods.flags |= mod_flags::HIDDEN;
        assert_eq!(s.calculate_grade(), Grade::XH);
    }

    #[test]
    fn test_grade_s_requires_no_misses() {
        let s = score_with_counts(95, 5, 0, 0);
        assert_eq!(s.calculate_grade(), Grade::S);
        let s = score_with_counts(95, 4, 0, 1);
        assert_eq!(s.calculate_grade(), Grade::A);
    }

    #[test]
    fn test_from_legacy_speed_multipliers() {
        assert_eq!(Mods::from_legacy(mod_flags::DOUBLE_TIME as u32).speed, 1.5);
        assert_eq!(Mods::from_legacy(mod_flags::HALF_TIME as u32).speed, 0.75);
        assert_eq!(Mods::from_legacy(mod_flags::HIDDEN as u32).speed, 1.0);
    }

    #[test]
    fn test_replay_availability_by_provenance() {
        let mut s = FinishedScore {
            client: "peppy-20240101".to_string(),
            ..Default::default()
        };
        assert!(!s.has_possible_replay());
        s.legacy_replay_timestamp = 1;
        assert!(s.has_possible_replay());

        let native = FinishedScore {
            client: "osu-library-0.1.0".to_string(),
            ..Default::default()
        };
        assert!(native.has_possible_replay());
    }
}
