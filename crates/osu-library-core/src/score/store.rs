//! The score index: beatmap hash to the ordered list of finished scores.
//!
//! Every mutation happens under the writer lock for the full
//! read-modify-write of the per-hash list, and every loader funnels
//! through [`ScoreStore::add_score_raw`] so duplicate and regression
//! handling is identical regardless of import order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::RwLock;

use crate::hash::Md5Hash;

use super::{FinishedScore, ScoreSortMethod};

/// Reader/writer-locked index of finished scores, keyed by beatmap hash.
pub struct ScoreStore {
    scores: RwLock<HashMap<Md5Hash, Vec<FinishedScore>>>,
    sort_method: RwLock<ScoreSortMethod>,
    changed: AtomicBool,
}

impl Default for ScoreStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreStore {
    pub fn new() -> Self {
        Self {
            scores: RwLock::new(HashMap::new()),
            sort_method: RwLock::new(ScoreSortMethod::default()),
            changed: AtomicBool::new(true),
        }
    }

    /// Merge one score into the index. Returns whether the store changed.
    ///
    /// Reconciliation rules, in order:
    /// 1. no record for `(beatmap_hash, unix_timestamp)`: append;
    /// 2. the new record has no replay-availability: reject, so import
    ///    passes that know less cannot clobber a replayable record;
    /// 3. the existing record has replay-availability: reject - a
    ///    replayable record is never downgraded, even by a more
    ///    authoritative source;
    /// 4. otherwise overwrite in place.
    ///
    /// When neither record has replay-availability, rules 2 and 3 mean no
    /// overwrite ever occurs; that asymmetry is long-standing observed
    /// behavior and must not change silently.
    pub fn add_score_raw(&self, score: FinishedScore) -> bool {
        let method = *self.sort_method.read().expect("sort method lock poisoned");
        let mut scores = self.scores.write().expect("score lock poisoned");
        let list = scores.entry(score.beatmap_hash).or_default();

        let changed = match list
            .iter_mut()
            .find(|other| other.unix_timestamp == score.unix_timestamp)
        {
            None => {
                list.push(score);
                true
            }
            Some(existing) => {
                if !score.has_possible_replay() || existing.has_possible_replay() {
                    false
                } else {
                    *existing = score;
                    true
                }
            }
        };

        if changed {
            list.sort_by(|a, b| method.compare(a, b));
            self.changed.store(true, AtomicOrdering::Release);
        }
        changed
    }

    /// Add a score from live gameplay and return its index in the freshly
    /// sorted per-beatmap list, if it survived reconciliation.
    pub fn add_score(&self, score: FinishedScore) -> Option<usize> {
        let hash = score.beatmap_hash;
        let timestamp = score.unix_timestamp;
        if !self.add_score_raw(score) {
            return None;
        }
        let scores = self.scores.read().expect("score lock poisoned");
        scores
            .get(&hash)?
            .iter()
            .position(|s| s.unix_timestamp == timestamp)
    }

    /// Delete the score with the given timestamp. Returns whether a
    /// record was removed.
    pub fn delete_score(&self, beatmap_hash: &Md5Hash, unix_timestamp: u64) -> bool {
        let mut scores = self.scores.write().expect("score lock poisoned");
        let Some(list) = scores.get_mut(beatmap_hash) else {
            return false;
        };
        let before = list.len();
        list.retain(|s| s.unix_timestamp != unix_timestamp);
        let removed = list.len() != before;
        if removed {
            self.changed.store(true, AtomicOrdering::Release);
        }
        removed
    }

    /// Switch the active comparator and re-sort every list under it.
    pub fn set_sort_method(&self, method: ScoreSortMethod) {
        *self.sort_method.write().expect("sort method lock poisoned") = method;
        let mut scores = self.scores.write().expect("score lock poisoned");
        for list in scores.values_mut() {
            list.sort_by(|a, b| method.compare(a, b));
        }
    }

    pub fn sort_method(&self) -> ScoreSortMethod {
        *self.sort_method.read().expect("sort method lock poisoned")
    }

    /// Snapshot of one beatmap's scores, sorted under the active
    /// comparator.
    pub fn scores_for(&self, beatmap_hash: &Md5Hash) -> Vec<FinishedScore> {
        self.scores
            .read()
            .expect("score lock poisoned")
            .get(beatmap_hash)
            .cloned()
            .unwrap_or_default()
    }

    /// Visit every non-empty score list under the reader lock.
    pub fn visit<F: FnMut(&Md5Hash, &[FinishedScore])>(&self, mut f: F) {
        let scores = self.scores.read().expect("score lock poisoned");
        for (hash, list) in scores.iter() {
            if !list.is_empty() {
                f(hash, list);
            }
        }
    }

    /// Update scores in place (PP recalculation results). The callback
    /// runs under the writer lock; lists are re-sorted afterwards.
    pub fn update_scores<F: FnMut(&mut FinishedScore)>(&self, beatmap_hash: &Md5Hash, mut f: F) {
        let method = *self.sort_method.read().expect("sort method lock poisoned");
        let mut scores = self.scores.write().expect("score lock poisoned");
        if let Some(list) = scores.get_mut(beatmap_hash) {
            for score in list.iter_mut() {
                f(score);
            }
            list.sort_by(|a, b| method.compare(a, b));
            self.changed.store(true, AtomicOrdering::Release);
        }
    }

    /// Cloned `(hash, scores)` groups for persistence. Empty lists are
    /// dropped so the written file never contains them.
    pub fn snapshot_groups(&self) -> Vec<(Md5Hash, Vec<FinishedScore>)> {
        self.scores
            .read()
            .expect("score lock poisoned")
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(hash, list)| (*hash, list.clone()))
            .collect()
    }

    pub fn beatmap_count(&self) -> usize {
        self.scores
            .read()
            .expect("score lock poisoned")
            .values()
            .filter(|l| !l.is_empty())
            .count()
    }

    pub fn score_count(&self) -> usize {
        self.scores
            .read()
            .expect("score lock poisoned")
            .values()
            .map(Vec::len)
            .sum()
    }

    /// Whether scores changed since the last call (stats cache
    /// invalidation).
    pub fn take_changed(&self) -> bool {
        self.changed.swap(false, AtomicOrdering::AcqRel)
    }

    pub fn clear(&self) {
        self.scores.write().expect("score lock poisoned").clear();
        self.changed.store(true, AtomicOrdering::Release);
    }
}
