//! The beatmap index: hash to difficulty, set id to owning set.
//!
//! Ownership is arena-style: the store owns all sets, each set owns its
//! difficulties, and lookups hand out `(set, diff)` index pairs or cloned
//! snapshots - never raw references across the lock boundary. The whole
//! index sits behind one reader/writer lock, independent of the score
//! lock so map reloads cannot block score queries.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use crate::hash::Md5Hash;

use super::{BeatmapDifficulty, BeatmapOrigin, BeatmapSet, MapOverrides};

#[derive(Default)]
struct BeatmapIndex {
    sets: Vec<BeatmapSet>,
    /// diff hash -> (set index, diff index)
    by_hash: HashMap<Md5Hash, (usize, usize)>,
    /// positive set id -> set index
    by_set_id: HashMap<i32, usize>,
    /// synthetic grouping key -> set index, for invalid set ids
    by_title_artist: HashMap<String, usize>,
}

/// Reader/writer-locked beatmap index.
pub struct BeatmapStore {
    inner: RwLock<BeatmapIndex>,
}

impl Default for BeatmapStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BeatmapStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BeatmapIndex::default()),
        }
    }

    /// Insert one fully parsed difficulty, grouping it into its set.
    ///
    /// Difficulties with a positive set id aggregate by id; others fall
    /// back to the normalized title+artist key. Returns false when the
    /// hash is already present (the unique-hash invariant) so partial
    /// re-imports cannot duplicate entries.
    pub fn insert_difficulty(&self, diff: BeatmapDifficulty) -> bool {
        let mut index = self.inner.write().expect("beatmap lock poisoned");
        if index.by_hash.contains_key(&diff.md5_hash) {
            return false;
        }

        let set_idx = if diff.set_id > 0 {
            match index.by_set_id.get(&diff.set_id).copied() {
                Some(idx) => idx,
                None => {
                    let idx = index.sets.len();
                    index.sets.push(BeatmapSet::new(diff.set_id, diff.origin));
                    index.by_set_id.insert(diff.set_id, idx);
                    idx
                }
            }
        } else {
            let key = diff.title_artist_key();
            match index.by_title_artist.get(&key).copied() {
                Some(idx) => idx,
                None => {
                    let idx = index.sets.len();
                    index.sets.push(BeatmapSet::new(diff.set_id, diff.origin));
                    index.by_title_artist.insert(key, idx);
                    idx
                }
            }
        };

        let hash = diff.md5_hash;
        let diff_idx = index.sets[set_idx].difficulties.len();
        index.sets[set_idx].difficulties.push(diff);
        index.by_hash.insert(hash, (set_idx, diff_idx));
        true
    }

    /// Insert a whole set at once (raw folder loads, downloads).
    /// Returns how many of its difficulties were new.
    pub fn insert_set(&self, set: BeatmapSet) -> usize {
        let mut added = 0;
        for diff in set.difficulties {
            if self.insert_difficulty(diff) {
                added += 1;
            }
        }
        added
    }

    pub fn contains_hash(&self, hash: &Md5Hash) -> bool {
        self.inner
            .read()
            .expect("beatmap lock poisoned")
            .by_hash
            .contains_key(hash)
    }

    /// Snapshot of one difficulty by hash.
    pub fn get_difficulty(&self, hash: &Md5Hash) -> Option<BeatmapDifficulty> {
        let index = self.inner.read().expect("beatmap lock poisoned");
        let &(set_idx, diff_idx) = index.by_hash.get(hash)?;
        Some(index.sets[set_idx].difficulties[diff_idx].clone())
    }

    /// Snapshot of one difficulty by online map id (linear scan).
    pub fn get_difficulty_by_id(&self, map_id: i32) -> Option<BeatmapDifficulty> {
        let index = self.inner.read().expect("beatmap lock poisoned");
        index
            .sets
            .iter()
            .flat_map(|s| s.difficulties.iter())
            .find(|d| d.id == map_id)
            .cloned()
    }

    /// Snapshot of one set by its online set id.
    pub fn get_set(&self, set_id: i32) -> Option<BeatmapSet> {
        let index = self.inner.read().expect("beatmap lock poisoned");
        let &idx = index.by_set_id.get(&set_id)?;
        Some(index.sets[idx].clone())
    }

    /// Visit every set under the reader lock.
    pub fn visit_sets<F: FnMut(&BeatmapSet)>(&self, mut f: F) {
        let index = self.inner.read().expect("beatmap lock poisoned");
        for set in &index.sets {
            f(set);
        }
    }

    /// Mutate one difficulty in place (recalculation results). Returns
    /// whether the hash was present.
    pub fn update_difficulty<F: FnOnce(&mut BeatmapDifficulty)>(
        &self,
        hash: &Md5Hash,
        f: F,
    ) -> bool {
        let mut index = self.inner.write().expect("beatmap lock poisoned");
        let Some((set_idx, diff_idx)) = index.by_hash.get(hash).copied() else {
            return false;
        };
        f(&mut index.sets[set_idx].difficulties[diff_idx]);
        true
    }

    /// Difficulties that still need star/loudness recalculation.
    pub fn pending_recalc(&self) -> (Vec<Md5Hash>, Vec<Md5Hash>) {
        let index = self.inner.read().expect("beatmap lock poisoned");
        let mut stars = Vec::new();
        let mut loudness = Vec::new();
        for diff in index.sets.iter().flat_map(|s| s.difficulties.iter()) {
            if diff.star_rating <= 0.0 {
                stars.push(diff.md5_hash);
            }
            if diff.loudness == 0.0 {
                loudness.push(diff.md5_hash);
            }
        }
        (stars, loudness)
    }

    pub fn set_count(&self) -> usize {
        self.inner.read().expect("beatmap lock poisoned").sets.len()
    }

    pub fn difficulty_count(&self) -> usize {
        self.inner
            .read()
            .expect("beatmap lock poisoned")
            .by_hash
            .len()
    }

    /// Drop every set (start of a reload). Sets own their difficulties,
    /// so this destroys the whole arena in one step.
    pub fn clear(&self) {
        let mut index = self.inner.write().expect("beatmap lock poisoned");
        *index = BeatmapIndex::default();
    }

    /// Snapshot of the native-origin sets, for persistence.
    pub fn native_sets(&self) -> Vec<BeatmapSet> {
        let index = self.inner.read().expect("beatmap lock poisoned");
        index
            .sets
            .iter()
            .filter(|s| s.origin == BeatmapOrigin::Native)
            .cloned()
            .collect()
    }
}

/// The override table, behind its own lock: it is touched during map
/// load and from recalculation completion callbacks, which must not
/// contend with either big index.
pub struct OverrideStore {
    inner: Mutex<HashMap<Md5Hash, MapOverrides>>,
}

impl Default for OverrideStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OverrideStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, hash: &Md5Hash) -> Option<MapOverrides> {
        self.inner
            .lock()
            .expect("override lock poisoned")
            .get(hash)
            .cloned()
    }

    pub fn upsert(&self, hash: Md5Hash, overrides: MapOverrides) {
        self.inner
            .lock()
            .expect("override lock poisoned")
            .insert(hash, overrides);
    }

    pub fn extend(&self, entries: HashMap<Md5Hash, MapOverrides>) {
        self.inner
            .lock()
            .expect("override lock poisoned")
            .extend(entries);
    }

    pub fn snapshot(&self) -> HashMap<Md5Hash, MapOverrides> {
        self.inner.lock().expect("override lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("override lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(n: u8) -> Md5Hash {
        let mut s = String::new();
        for _ in 0..32 {
            s.push(char::from_digit((n % 10) as u32, 10).unwrap());
        }
        Md5Hash::from_hex_str(&s).unwrap()
    }

    fn diff(n: u8, set_id: i32, title: &str) -> BeatmapDifficulty {
        BeatmapDifficulty {
            md5_hash: hash(n),
            set_id,
            title: title.to_string(),
            artist: "artist".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_grouping_by_positive_set_id() {
        let store = BeatmapStore::new();
        assert!(store.insert_difficulty(diff(1, 42, "a")));
        assert!(store.insert_difficulty(diff(2, 42, "a")));
        assert_eq!(store.set_count(), 1);
        assert_eq!(store.get_set(42).unwrap().difficulties.len(), 2);
    }

    #[test]
    fn test_grouping_falls_back_to_title_artist() {
        let store = BeatmapStore::new();
        store.insert_difficulty(diff(1, -1, "same song"));
        store.insert_difficulty(diff(2, -1, "same song"));
        store.insert_difficulty(diff(3, -1, "other song"));
        assert_eq!(store.set_count(), 2);
    }

    #[test]
    fn test_duplicate_hash_rejected() {
        let store = BeatmapStore::new();
        assert!(store.insert_difficulty(diff(1, 42, "a")));
        assert!(!store.insert_difficulty(diff(1, 42, "a")));
        assert_eq!(store.difficulty_count(), 1);
    }

    #[test]
    fn test_lookup_by_hash_and_id() {
        let store = BeatmapStore::new();
        let mut d = diff(1, 42, "a");
        d.id = 777;
        store.insert_difficulty(d);
        assert!(store.get_difficulty(&hash(1)).is_some());
        assert_eq!(store.get_difficulty_by_id(777).unwrap().set_id, 42);
        assert!(store.get_difficulty_by_id(778).is_none());
    }

    #[test]
    fn test_update_difficulty() {
        let store = BeatmapStore::new();
        store.insert_difficulty(diff(1, 42, "a"));
        assert!(store.update_difficulty(&hash(1), |d| d.star_rating = 5.5));
        assert_eq!(store.get_difficulty(&hash(1)).unwrap().star_rating, 5.5);
    }

    #[test]
    fn test_pending_recalc_queues() {
        let store = BeatmapStore::new();
        let mut done = diff(1, 42, "a");
        done.star_rating = 4.0;
        done.loudness = -5.0;
        store.insert_difficulty(done);
        store.insert_difficulty(diff(2, 42, "a"));
        let (stars, loudness) = store.pending_recalc();
        assert_eq!(stars, vec![hash(2)]);
        assert_eq!(loudness, vec![hash(2)]);
    }

    #[test]
    fn test_override_store_roundtrip() {
        let overrides = OverrideStore::new();
        assert!(overrides.get(&hash(1)).is_none());
        overrides.upsert(
            hash(1),
            MapOverrides {
                local_offset: -5,
                ..Default::default()
            },
        );
        assert_eq!(overrides.get(&hash(1)).unwrap().local_offset, -5);
        assert_eq!(overrides.len(), 1);
    }
}
