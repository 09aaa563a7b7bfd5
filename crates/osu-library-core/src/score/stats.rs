//! Player statistics derived from the score index.
//!
//! PP and accuracy are weighted 0.95^n over the player's best score per
//! beatmap, plus the standard bonus-PP term; the level curve follows the
//! classic total-score table.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::{mod_flags, FinishedScore, ScoreStore};

/// Aggregated profile numbers for one player name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub name: String,
    pub pp: f32,
    pub accuracy: f32,
    pub num_scores_with_pp: usize,
    pub level: u32,
    pub percent_to_next_level: f32,
    pub total_score: u64,
}

/// The best score per beatmap for one player, sorted by PP ascending.
#[derive(Debug, Clone, Default)]
pub struct PlayerPpScores {
    pub scores: Vec<FinishedScore>,
    pub total_score: u64,
}

/// Weight of the i-th best score (0 = best).
pub fn weight_for_index(i: usize) -> f32 {
    0.95f32.powi(i as i32)
}

/// Bonus PP for having set `num_scores` ranked scores.
pub fn bonus_pp_for_num_scores(num_scores: usize) -> f32 {
    ((417.0 - 1.0 / 3.0) * (1.0 - 0.995f64.powf(1000.0f64.min(num_scores as f64)))) as f32
}

/// Total score required to reach `level`.
pub fn required_score_for_level(level: u32) -> u64 {
    if level <= 100 {
        if level > 1 {
            let l = level as f64;
            return (5000.0 / 3.0 * (4.0 * l.powi(3) - 3.0 * l.powi(2) - l)
                + (1.25 * 1.8f64.powf(l - 60.0)).floor())
            .floor() as u64;
        }
        return 1;
    }
    26_931_190_829u64 + 100_000_000_000u64 * (level as u64 - 100)
}

/// Level reached with `score` total score, capped at `max_level`.
pub fn level_for_score(score: u64, max_level: u32) -> u32 {
    let mut i = 0;
    loop {
        if max_level > 0 && i >= max_level {
            return i;
        }
        if score < required_score_for_level(i) {
            return i.saturating_sub(1);
        }
        i += 1;
    }
}

/// All player names present in the index, plus the configured local name.
pub fn player_names(store: &ScoreStore, local_name: &str) -> Vec<String> {
    let mut names = HashSet::new();
    store.visit(|_, list| {
        for score in list {
            if !score.player_name.is_empty() {
                names.insert(score.player_name.clone());
            }
        }
    });
    if !local_name.is_empty() {
        names.insert(local_name.to_string());
    }
    let mut names: Vec<String> = names.into_iter().collect();
    names.sort();
    names
}

/// Collect the highest-PP score per beatmap for `player_name`.
///
/// Relax/autopilot plays are excluded unless `include_relax` is set,
/// matching the profile-stats convention.
pub fn player_pp_scores(store: &ScoreStore, player_name: &str, include_relax: bool) -> PlayerPpScores {
    let mut best: Vec<FinishedScore> = Vec::new();
    let mut total_score: u64 = 0;

    store.visit(|_, list| {
        let mut top: Option<&FinishedScore> = None;
        for score in list {
            if score.player_name != player_name {
                continue;
            }
            let uses_rx = score.mods.has(mod_flags::RELAX) || score.mods.has(mod_flags::AUTOPILOT);
            if uses_rx && !include_relax {
                continue;
            }
            total_score += score.score;
            if top.map(|t| score.pp > t.pp).unwrap_or(true) {
                top = Some(score);
            }
        }
        if let Some(t) = top {
            best.push(t.clone());
        }
    });

    best.sort_by(|a, b| a.pp.partial_cmp(&b.pp).unwrap_or(std::cmp::Ordering::Equal));
    PlayerPpScores {
        scores: best,
        total_score,
    }
}

/// Compute the full profile numbers for one player.
pub fn calculate_player_stats(
    store: &ScoreStore,
    player_name: &str,
    include_relax: bool,
) -> PlayerStats {
    let ps = player_pp_scores(store, player_name, include_relax);

    // Scores are sorted ascending, so the weight index counts down.
    let mut pp = 0.0f32;
    let mut acc = 0.0f32;
    for (i, score) in ps.scores.iter().enumerate() {
        let weight = weight_for_index(ps.scores.len() - 1 - i);
        pp += score.pp.max(0.0) * weight;
        acc += score.accuracy() * weight;
    }
    pp += bonus_pp_for_num_scores(ps.scores.len());

    if !ps.scores.is_empty() {
        acc /= 20.0 * (1.0 - weight_for_index(ps.scores.len()));
    }

    let level = level_for_score(ps.total_score, 120);
    let current = required_score_for_level(level);
    let next = required_score_for_level(level + 1);
    let percent_to_next_level = if next > current {
        ((ps.total_score.saturating_sub(current)) as f64 / (next - current) as f64) as f32
    } else {
        0.0
    };

    PlayerStats {
        name: player_name.to_string(),
        pp,
        accuracy: acc,
        num_scores_with_pp: ps.scores.len(),
        level,
        percent_to_next_level,
        total_score: ps.total_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Md5Hash;

    fn hash(n: u8) -> Md5Hash {
        let mut s = String::new();
        for _ in 0..32 {
            s.push(char::from_digit((n % 10) as u32, 10).unwrap());
        }
        Md5Hash::from_hex_str(&s).unwrap()
    }

    fn score(map: u8, ts: u64, player: &str, pp: f32, value: u64) -> FinishedScore {
        FinishedScore {
            beatmap_hash: hash(map),
            unix_timestamp: ts,
            player_name: player.to_string(),
            pp,
            score: value,
            num_300s: 100,
            ..Default::default()
        }
    }

    #[test]
    fn test_weight_decays() {
        assert_eq!(weight_for_index(0), 1.0);
        assert!(weight_for_index(1) < 1.0);
        assert!(weight_for_index(10) < weight_for_index(5));
    }

    #[test]
    fn test_level_curve_monotonic() {
        assert_eq!(required_score_for_level(1), 1);
        assert!(required_score_for_level(50) < required_score_for_level(51));
        assert!(required_score_for_level(101) > required_score_for_level(100));
        assert_eq!(level_for_score(0, 120), 0);
        assert!(level_for_score(30_000_000, 120) > 1);
    }

    #[test]
    fn test_best_score_per_beatmap() {
        let store = ScoreStore::new();
        store.add_score_raw(score(1, 1, "alice", 50.0, 1000));
        store.add_score_raw(score(1, 2, "alice", 80.0, 900));
        store.add_score_raw(score(2, 3, "alice", 20.0, 500));
        store.add_score_raw(score(2, 4, "bob", 90.0, 700));

        let ps = player_pp_scores(&store, "alice", false);
        assert_eq!(ps.scores.len(), 2);
        // Ascending by pp, only alice's best per map.
        assert_eq!(ps.scores[0].pp, 20.0);
        assert_eq!(ps.scores[1].pp, 80.0);
        assert_eq!(ps.total_score, 1000 + 900 + 500);
    }

    #[test]
    fn test_relax_excluded_by_default() {
        let store = ScoreStore::new();
        let mut s = score(1, 1, "alice", 50.0, 1000);
        s.mods.flags |= mod_flags::RELAX;
        store.add_score_raw(s);
        assert!(player_pp_scores(&store, "alice", false).scores.is_empty());
        assert_eq!(player_pp_scores(&store, "alice", true).scores.len(), 1);
    }

    #[test]
    fn test_player_names_include_local_user() {
        let store = ScoreStore::new();
        store.add_score_raw(score(1, 1, "alice", 1.0, 1));
        let names = player_names(&store, "guest");
        assert_eq!(names, vec!["alice".to_string(), "guest".to_string()]);
    }

    #[test]
    fn test_stats_weighting() {
        let store = ScoreStore::new();
        store.add_score_raw(score(1, 1, "alice", 100.0, 100));
        store.add_score_raw(score(2, 2, "alice", 50.0, 100));
        let stats = calculate_player_stats(&store, "alice", false);
        // 100 * 0.95^0 + 50 * 0.95^1 + bonus
        let expected = 100.0 + 50.0 * 0.95 + bonus_pp_for_num_scores(2);
        assert!((stats.pp - expected).abs() < 0.01);
        assert_eq!(stats.num_scores_with_pp, 2);
    }
}
