//! Score sorting comparators.
//!
//! Every method is a total order with the same deterministic tie-break
//! chain after its primary metric: raw score, then timestamp, then player
//! id, then play duration - all descending (misses is the one ascending
//! primary). Remaining ties compare equal and keep their stable order.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::FinishedScore;

/// The configured comparator for per-beatmap score lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScoreSortMethod {
    Accuracy,
    Combo,
    Date,
    Misses,
    #[default]
    Score,
    Pp,
}

impl ScoreSortMethod {
    pub const ALL: [ScoreSortMethod; 6] = [
        ScoreSortMethod::Accuracy,
        ScoreSortMethod::Combo,
        ScoreSortMethod::Date,
        ScoreSortMethod::Misses,
        ScoreSortMethod::Score,
        ScoreSortMethod::Pp,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ScoreSortMethod::Accuracy => "By accuracy",
            ScoreSortMethod::Combo => "By combo",
            ScoreSortMethod::Date => "By date",
            ScoreSortMethod::Misses => "By misses",
            ScoreSortMethod::Score => "By score",
            ScoreSortMethod::Pp => "By pp",
        }
    }

    /// Compare two scores under this method; `Less` sorts first.
    pub fn compare(&self, a: &FinishedScore, b: &FinishedScore) -> Ordering {
        let primary = match self {
            ScoreSortMethod::Accuracy => descending_f32(a.accuracy(), b.accuracy()),
            ScoreSortMethod::Combo => b.combo_max.cmp(&a.combo_max),
            ScoreSortMethod::Date => b.unix_timestamp.cmp(&a.unix_timestamp),
            ScoreSortMethod::Misses => a.num_misses.cmp(&b.num_misses),
            ScoreSortMethod::Score => b.score.cmp(&a.score),
            ScoreSortMethod::Pp => {
                // Unset PP caches are negative; clamp so they sort below
                // every computed value rather than interleaving.
                descending_f32(a.pp.max(0.0), b.pp.max(0.0))
            }
        };
        primary.then_with(|| tie_break(a, b))
    }
}

impl std::fmt::Display for ScoreSortMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn descending_f32(a: f32, b: f32) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

fn tie_break(a: &FinishedScore, b: &FinishedScore) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| b.unix_timestamp.cmp(&a.unix_timestamp))
        .then_with(|| b.player_id.cmp(&a.player_id))
        .then_with(|| b.play_duration_ms.cmp(&a.play_duration_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(value: u64, ts: u64) -> FinishedScore {
        FinishedScore {
            score: value,
            unix_timestamp: ts,
            ..Default::default()
        }
    }

    #[test]
    fn test_score_descending() {
        let a = score(1000, 1);
        let b = score(500, 2);
        assert_eq!(ScoreSortMethod::Score.compare(&a, &b), Ordering::Less);
        assert_eq!(ScoreSortMethod::Score.compare(&b, &a), Ordering::Greater);
    }

    #[test]
    fn test_misses_ascending() {
        let mut a = score(100, 1);
        a.num_misses = 0;
        let mut b = score(100, 1);
        b.num_misses = 3;
        assert_eq!(ScoreSortMethod::Misses.compare(&a, &b), Ordering::Less);
    }

    #[test]
    fn test_tie_break_falls_through_to_timestamp() {
        let a = score(100, 10);
        let b = score(100, 20);
        // Same score: the newer play sorts first.
        assert_eq!(ScoreSortMethod::Score.compare(&b, &a), Ordering::Less);
    }

    #[test]
    fn test_full_tie_is_equal() {
        let a = score(100, 10);
        let b = score(100, 10);
        assert_eq!(ScoreSortMethod::Score.compare(&a, &b), Ordering::Equal);
    }

    #[test]
    fn test_sort_invariant_no_inversions() {
        let mut scores = vec![score(10, 5), score(30, 1), score(20, 9), score(30, 4)];
        for method in ScoreSortMethod::ALL {
            scores.sort_by(|a, b| method.compare(a, b));
            for pair in scores.windows(2) {
                assert_ne!(
                    method.compare(&pair[0], &pair[1]),
                    Ordering::Greater,
                    "inversion under {}",
                    method.name()
                );
            }
        }
    }

    #[test]
    fn test_pp_unset_sorts_last() {
        let mut fresh = score(0, 1);
        fresh.pp = -1.0;
        let mut computed = score(0, 1);
        computed.pp = 12.5;
        assert_eq!(ScoreSortMethod::Pp.compare(&computed, &fresh), Ordering::Less);
    }
}
