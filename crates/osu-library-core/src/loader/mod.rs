//! The database engine and its asynchronous loading pipeline.
//!
//! One background thread drives a linear phase machine (discovery, three
//! score sources, two map sources, collections, external drops); the
//! hosting frame loop calls [`Database::update`] to drive the raw-scan
//! fallback in time-boxed slices and polls [`Database::progress`].
//! Cancellation is cooperative: checked at every phase transition and per
//! record inside the heavy loops, so a cancelled load always leaves fully
//! formed records and nothing half-built.

mod raw_scan;

pub use raw_scan::RAW_SCAN_SLICE;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use serde::Serialize;

use crate::beatmap::{BeatmapOrigin, BeatmapSet, BeatmapStore, MapOverrides, OverrideStore};
use crate::config::{DatabaseConfig, STABLE_MAPS_VERSION_CAP};
use crate::error::Result;
use crate::format::collections::{self, Collection};
use crate::format::{
    self, legacy_scores, native_maps, native_scores, stable_maps, stable_scores, DatabaseKind,
    LoadMonitor,
};
use crate::hash::Md5Hash;
use crate::recalc::RecalcNotifier;
use crate::score::stats::{self, PlayerStats};
use crate::score::ScoreStore;

/// Process-wide progress/cancellation contract for one load run.
///
/// Progress is a fraction in [0, 1]: zero before the first byte, clamped
/// to [0.01, 0.99] while in flight, and exactly 1.0 once the pipeline
/// completes or is cancelled. It never decreases within a run.
pub struct LoadingState {
    /// f32 bits; an AtomicU32 is the portable atomic float.
    progress: AtomicU32,
    interrupted: AtomicBool,
}

impl Default for LoadingState {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadingState {
    pub fn new() -> Self {
        Self {
            progress: AtomicU32::new(0f32.to_bits()),
            interrupted: AtomicBool::new(false),
        }
    }

    fn reset(&self) {
        self.progress.store(0f32.to_bits(), Ordering::Release);
        self.interrupted.store(false, Ordering::Release);
    }

    pub fn progress(&self) -> f32 {
        f32::from_bits(self.progress.load(Ordering::Acquire))
    }

    pub fn is_loading(&self) -> bool {
        let p = self.progress();
        p > 0.0 && p < 1.0
    }

    pub fn is_finished(&self) -> bool {
        self.progress() >= 1.0
    }

    pub fn is_cancelled(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// Cooperative stop: in-flight work observes the flag at the next
    /// checkpoint. Progress is forced to 1.0 so pollers treat the load
    /// as finished immediately.
    pub fn cancel(&self) {
        self.interrupted.store(true, Ordering::Release);
        self.progress.store(1f32.to_bits(), Ordering::Release);
    }

    /// Monotonic within a run: a lower value than the current one is
    /// dropped. Only the loader thread stores, so load-compare-store
    /// needs no CAS loop.
    fn set_progress(&self, value: f32) {
        let current = f32::from_bits(self.progress.load(Ordering::Acquire));
        if value > current {
            self.progress.store(value.to_bits(), Ordering::Release);
        }
    }

    fn force_finished(&self) {
        self.progress.store(1f32.to_bits(), Ordering::Release);
    }
}

/// Phases of the loading pipeline, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Idle,
    DiscoveringFiles,
    LoadingNativeScores,
    LoadingLegacyEngineScores,
    LoadingStableScores,
    LoadingMaps,
    LoadingCollections,
    ImportingExternalDrops,
    Done,
}

/// How a pipeline run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Completed,
    Cancelled,
}

/// Per-source import/skip counts, available once loading finishes.
#[derive(Debug, Default, Clone, Serialize)]
pub struct LoadReport {
    pub native_scores: u32,
    pub legacy_scores: u32,
    pub stable_scores: u32,
    pub scores_skipped: u32,
    pub native_maps: u32,
    pub stable_maps: u32,
    pub maps_skipped: u32,
    pub overrides: u32,
    pub collections: u32,
    pub external_sources: u32,
    /// Non-fatal conditions (unknown versions, unreadable sources).
    pub notices: Vec<String>,
}

#[derive(Debug, Clone)]
struct Candidate {
    kind: DatabaseKind,
    path: PathBuf,
    size: u64,
}

#[derive(Default)]
struct PipelineCtx {
    candidates: Vec<Candidate>,
    external: Vec<Candidate>,
    total_bytes: u64,
    bytes_done: u64,
    report: LoadReport,
    stars_to_calc: Vec<Md5Hash>,
    loudness_to_calc: Vec<Md5Hash>,
}

/// Byte-based progress for one file being read.
struct PipelineMonitor<'a> {
    loading: &'a LoadingState,
    base_bytes: u64,
    total_bytes: u64,
}

impl LoadMonitor for PipelineMonitor<'_> {
    fn is_cancelled(&self) -> bool {
        self.loading.is_cancelled()
    }

    fn record_position(&mut self, pos: u64) {
        if self.total_bytes == 0 {
            return;
        }
        let fraction = (self.base_bytes + pos) as f32 / self.total_bytes as f32;
        self.loading.set_progress(fraction.clamp(0.01, 0.99));
    }
}

/// The beatmap/score database engine.
///
/// One instance owns every index; callers receive it by reference (or
/// `Arc`) - there is deliberately no global.
pub struct Database {
    config: DatabaseConfig,
    scores: ScoreStore,
    beatmaps: BeatmapStore,
    overrides: OverrideStore,
    collections: Mutex<Vec<Collection>>,
    loading: LoadingState,
    loader: Mutex<Option<JoinHandle<LoadOutcome>>>,
    report: Mutex<LoadReport>,
    import_queue: Mutex<Vec<PathBuf>>,
    recalc: Mutex<Option<Arc<dyn RecalcNotifier>>>,
    raw_scan: Mutex<raw_scan::RawScanState>,
    prev_stats: Mutex<PlayerStats>,
    native_maps_loaded: AtomicBool,
    scores_loaded: AtomicBool,
}

impl Database {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            scores: ScoreStore::new(),
            beatmaps: BeatmapStore::new(),
            overrides: OverrideStore::new(),
            collections: Mutex::new(Vec::new()),
            loading: LoadingState::new(),
            loader: Mutex::new(None),
            report: Mutex::new(LoadReport::default()),
            import_queue: Mutex::new(Vec::new()),
            recalc: Mutex::new(None),
            raw_scan: Mutex::new(raw_scan::RawScanState::new()),
            prev_stats: Mutex::new(PlayerStats::default()),
            native_maps_loaded: AtomicBool::new(false),
            scores_loaded: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn scores(&self) -> &ScoreStore {
        &self.scores
    }

    pub fn beatmaps(&self) -> &BeatmapStore {
        &self.beatmaps
    }

    pub fn overrides(&self) -> &OverrideStore {
        &self.overrides
    }

    pub fn collections(&self) -> Vec<Collection> {
        self.collections.lock().expect("collections lock poisoned").clone()
    }

    pub fn progress(&self) -> f32 {
        self.loading.progress()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.is_loading()
    }

    pub fn is_finished(&self) -> bool {
        self.loading.is_finished()
    }

    pub fn load_report(&self) -> LoadReport {
        self.report.lock().expect("report lock poisoned").clone()
    }

    pub fn set_recalc_notifier(&self, notifier: Arc<dyn RecalcNotifier>) {
        *self.recalc.lock().expect("recalc lock poisoned") = Some(notifier);
    }

    /// Queue an externally dropped database file; it is imported during
    /// the next load's final phase.
    pub fn queue_import(&self, path: PathBuf) {
        self.import_queue
            .lock()
            .expect("import queue lock poisoned")
            .push(path);
    }

    /// Reset state and run the pipeline on a background thread. A call
    /// while a load is already running is ignored.
    pub fn load(self: &Arc<Self>) {
        let mut loader = self.loader.lock().expect("loader lock poisoned");
        if let Some(handle) = loader.take() {
            if !handle.is_finished() {
                tracing::warn!("Database load requested while one is already running");
                *loader = Some(handle);
                return;
            }
            let _ = handle.join();
        }

        if let Some(notifier) = self.recalc.lock().expect("recalc lock poisoned").as_ref() {
            notifier.abort();
        }

        self.loading.reset();
        *self.report.lock().expect("report lock poisoned") = LoadReport::default();

        let db = Arc::clone(self);
        *loader = Some(std::thread::spawn(move || run_pipeline(&db)));
    }

    /// Request a cooperative stop and mark the load finished for
    /// pollers. In-flight work stops at its next checkpoint.
    pub fn cancel(&self) {
        self.loading.cancel();
    }

    /// Block until the background phase exits. Used on shutdown; there
    /// is deliberately no timeout.
    pub fn join_loader(&self) -> Option<LoadOutcome> {
        let handle = self.loader.lock().expect("loader lock poisoned").take()?;
        if handle.thread().id() == std::thread::current().id() {
            return None;
        }
        handle.join().ok()
    }

    /// Drive frame-paced work: the raw-scan fallback, in wall-clock
    /// time-boxed slices. Never blocks on I/O longer than the slice.
    pub fn update(&self) {
        raw_scan::update_slice(self, RAW_SCAN_SLICE);
    }

    /// Whether a raw scan still has folders queued for `update()`.
    pub fn raw_scan_pending(&self) -> bool {
        self.raw_scan
            .lock()
            .expect("raw scan lock poisoned")
            .scheduled
    }

    /// Whether the last raw scan found new or changed folders.
    pub fn raw_found_changes(&self) -> bool {
        self.raw_scan
            .lock()
            .expect("raw scan lock poisoned")
            .found_changes
    }

    /// Count of sets added by the most recent raw scan.
    pub fn raw_new_set_count(&self) -> u32 {
        self.raw_scan
            .lock()
            .expect("raw scan lock poisoned")
            .last_new_count
    }

    /// Look up one difficulty; `None` while a load is still running.
    pub fn beatmap_difficulty(&self, hash: &Md5Hash) -> Option<crate::beatmap::BeatmapDifficulty> {
        if self.is_loading() {
            return None;
        }
        self.beatmaps.get_difficulty(hash)
    }

    /// Load one beatmap folder outside the pipeline (e.g. a finished
    /// download) and insert it. The set id override covers maps whose
    /// `.osu` files never carried ids.
    pub fn add_beatmap_set(
        &self,
        folder: &Path,
        set_id_override: Option<i32>,
    ) -> Option<BeatmapSet> {
        let mut set = raw_scan::load_raw_set(folder)?;
        if let Some(set_id) = set_id_override {
            set.set_id = set_id;
            for diff in &mut set.difficulties {
                diff.set_id = set_id;
            }
        }
        self.beatmaps.insert_set(set.clone());
        Some(set)
    }

    /// Report a computed star rating back. Imported maps additionally
    /// get an override entry so the value survives the next load.
    pub fn apply_star_rating(&self, hash: &Md5Hash, stars: f64) {
        self.beatmaps.update_difficulty(hash, |diff| {
            diff.star_rating = stars;
        });
        self.upsert_override_if_imported(hash);
    }

    /// Report a computed loudness value back.
    pub fn apply_loudness(&self, hash: &Md5Hash, loudness: f32) {
        self.beatmaps.update_difficulty(hash, |diff| {
            diff.loudness = loudness;
        });
        self.upsert_override_if_imported(hash);
    }

    fn upsert_override_if_imported(&self, hash: &Md5Hash) {
        let Some(diff) = self.beatmaps.get_difficulty(hash) else {
            return;
        };
        if diff.origin == BeatmapOrigin::Imported {
            self.overrides.upsert(*hash, MapOverrides::from_difficulty(&diff));
        }
    }

    /// Player stats, cached until the score set changes.
    pub fn calculate_player_stats(&self, player_name: &str) -> PlayerStats {
        let mut prev = self.prev_stats.lock().expect("stats lock poisoned");
        let changed = self.scores.take_changed();
        if !changed && prev.name == player_name {
            return prev.clone();
        }
        let computed = stats::calculate_player_stats(&self.scores, player_name, false);
        *prev = computed.clone();
        computed
    }

    pub fn player_names(&self) -> Vec<String> {
        stats::player_names(&self.scores, &self.config.player_name)
    }

    /// Persist maps, scores and collections in the native formats.
    pub fn save(&self) -> Result<()> {
        self.save_maps()?;
        self.save_scores()?;
        self.save_collections()
    }

    fn save_maps(&self) -> Result<()> {
        if !self.native_maps_loaded.load(Ordering::Acquire) {
            tracing::warn!("Not saving maps, they were never fully loaded");
            return Ok(());
        }
        std::fs::create_dir_all(&self.config.data_dir)?;
        let path = self.config.native_maps_path();
        let file = std::fs::File::create(&path)?;
        let mut writer = format::codec::BinaryWriter::new(std::io::BufWriter::new(file));
        let sets = self.beatmaps.native_sets();
        let overrides = self.overrides.snapshot();
        native_maps::write(&mut writer, &sets, &overrides)?;
        tracing::info!(
            "Saved {} native sets and {} overrides to {}",
            sets.len(),
            overrides.len(),
            path.display()
        );
        Ok(())
    }

    fn save_scores(&self) -> Result<()> {
        if !self.scores_loaded.load(Ordering::Acquire) {
            tracing::warn!("Not saving scores, they were never fully loaded");
            return Ok(());
        }
        std::fs::create_dir_all(&self.config.data_dir)?;
        let path = self.config.native_scores_path();
        let file = std::fs::File::create(&path)?;
        let mut writer = format::codec::BinaryWriter::new(std::io::BufWriter::new(file));
        let groups = self.scores.snapshot_groups();
        native_scores::write_scores(
            &mut writer,
            groups.iter().map(|(hash, list)| (hash, list.as_slice())),
        )?;
        tracing::info!("Saved scores for {} beatmaps to {}", groups.len(), path.display());
        Ok(())
    }

    fn save_collections(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config.data_dir)?;
        let path = self.config.native_collections_path();
        let file = std::fs::File::create(&path)?;
        let mut writer = format::codec::BinaryWriter::new(std::io::BufWriter::new(file));
        let collections = self.collections();
        collections::write_collections(&mut writer, &collections)?;
        Ok(())
    }

    // ---- pipeline phases (background thread only) ----

    fn discover(&self, ctx: &mut PipelineCtx) {
        let mut paths = vec![
            self.config.native_scores_path(),
            self.config.legacy_scores_path(),
            self.config.native_maps_path(),
            self.config.native_collections_path(),
            self.config.legacy_collections_path(),
        ];
        if self.config.database_enabled {
            paths.push(self.config.stable_scores_path());
            paths.push(self.config.stable_maps_path());
            paths.push(self.config.stable_collections_path());
        }

        for path in paths {
            if let Some(candidate) = classify_candidate(&path) {
                ctx.total_bytes += candidate.size;
                ctx.candidates.push(candidate);
            }
        }

        // Copy the drop queue so new entries during the load cannot race;
        // they are picked up by the next load.
        let queued: Vec<PathBuf> = std::mem::take(
            &mut *self.import_queue.lock().expect("import queue lock poisoned"),
        );
        for path in queued {
            match classify_candidate(&path) {
                Some(candidate) => {
                    ctx.total_bytes += candidate.size;
                    ctx.external.push(candidate);
                }
                None => {
                    ctx.report
                        .notices
                        .push(format!("Could not identify {}", path.display()));
                }
            }
        }

        // No map index anywhere: fall back to scanning the songs folder
        // directly, paced from update().
        let have_maps = ctx
            .candidates
            .iter()
            .any(|c| matches!(c.kind, DatabaseKind::NativeMaps | DatabaseKind::StableMaps));
        if !have_maps {
            raw_scan::schedule(self);
        }

        tracing::debug!(
            "Discovered {} database files ({} bytes), {} external",
            ctx.candidates.len(),
            ctx.total_bytes,
            ctx.external.len()
        );
    }

    fn run_kind_phase(&self, ctx: &mut PipelineCtx, kinds: &[DatabaseKind]) {
        let candidates: Vec<Candidate> = ctx
            .candidates
            .iter()
            .filter(|c| kinds.contains(&c.kind))
            .cloned()
            .collect();
        for candidate in candidates {
            if self.loading.is_cancelled() {
                return;
            }
            self.import_file(&candidate, ctx);
        }
    }

    /// Read one identified database file into the stores. Phase-level
    /// failures are absorbed here: a broken source behaves as if empty
    /// and never aborts sibling sources.
    fn import_file(&self, candidate: &Candidate, ctx: &mut PipelineCtx) {
        let result = match candidate.kind {
            DatabaseKind::NativeScores => self.import_native_scores(candidate, ctx),
            DatabaseKind::LegacyEngineScores => self.import_legacy_scores(candidate, ctx),
            DatabaseKind::StableScores => self.import_stable_scores(candidate, ctx),
            DatabaseKind::NativeMaps => self.import_native_maps(candidate, ctx),
            DatabaseKind::StableMaps => self.import_stable_maps(candidate, ctx),
            DatabaseKind::NativeCollections | DatabaseKind::LegacyCollections => {
                self.import_collections(candidate, ctx, false)
            }
            DatabaseKind::StableCollections => self.import_collections(candidate, ctx, true),
        };
        if let Err(e) = result {
            tracing::warn!("Failed to read {}: {}", candidate.path.display(), e);
            ctx.report
                .notices
                .push(format!("{}: {}", candidate.path.display(), e));
        }
        ctx.bytes_done += candidate.size;
        self.monitor_for(ctx, ctx.bytes_done).record_position(0);
    }

    fn monitor_for<'a>(&'a self, ctx: &PipelineCtx, base_bytes: u64) -> PipelineMonitor<'a> {
        PipelineMonitor {
            loading: &self.loading,
            base_bytes,
            total_bytes: ctx.total_bytes,
        }
    }

    fn import_native_scores(&self, candidate: &Candidate, ctx: &mut PipelineCtx) -> Result<()> {
        let Some(mut reader) = format::open_database_file(&candidate.path)? else {
            return Ok(());
        };
        let version = native_scores::read_header(&mut reader)?;
        if version > native_scores::NATIVE_SCORES_VERSION {
            ctx.report.notices.push(format!(
                "{} version {} is newer than this build supports",
                candidate.path.display(),
                version
            ));
            return Ok(());
        }
        if version < native_scores::NATIVE_SCORES_VERSION {
            format::backup_before_upgrade(&candidate.path, version)?;
        }

        let mut monitor = self.monitor_for(ctx, ctx.bytes_done);
        let file = native_scores::read_scores(&mut reader, version, &mut monitor)?;
        let total = file.scores.len();
        for score in file.scores {
            if self.scores.add_score_raw(score) {
                ctx.report.native_scores += 1;
            }
        }
        if total as u32 != file.declared_count {
            tracing::warn!(
                "Inconsistency in {}: expected {} scores, found {}",
                candidate.path.display(),
                file.declared_count,
                total
            );
        }
        Ok(())
    }

    fn import_legacy_scores(&self, candidate: &Candidate, ctx: &mut PipelineCtx) -> Result<()> {
        let Some(mut reader) = format::open_database_file(&candidate.path)? else {
            return Ok(());
        };
        let mut monitor = self.monitor_for(ctx, ctx.bytes_done);
        let file = legacy_scores::read(&mut reader, &mut monitor)?;
        if file.skipped_unsupported {
            ctx.report.notices.push(format!(
                "{} version {} has no replays, not imported",
                candidate.path.display(),
                file.version
            ));
            return Ok(());
        }
        for score in file.scores {
            if self.scores.add_score_raw(score) {
                ctx.report.legacy_scores += 1;
            } else {
                ctx.report.scores_skipped += 1;
            }
        }
        Ok(())
    }

    fn import_stable_scores(&self, candidate: &Candidate, ctx: &mut PipelineCtx) -> Result<()> {
        let Some(mut reader) = format::open_database_file(&candidate.path)? else {
            return Ok(());
        };
        let mut monitor = self.monitor_for(ctx, ctx.bytes_done);
        let file = stable_scores::read(&mut reader, &mut monitor)?;
        ctx.report.scores_skipped += file.skipped;
        for score in file.scores {
            if self.scores.add_score_raw(score) {
                ctx.report.stable_scores += 1;
            } else {
                ctx.report.scores_skipped += 1;
            }
        }
        Ok(())
    }

    fn import_native_maps(&self, candidate: &Candidate, ctx: &mut PipelineCtx) -> Result<()> {
        let Some(mut reader) = format::open_database_file(&candidate.path)? else {
            return Ok(());
        };
        let mut monitor = self.monitor_for(ctx, ctx.bytes_done);
        let maps_dir = self.config.maps_dir();
        let file = match native_maps::read(&mut reader, &maps_dir, &mut monitor) {
            Ok(file) => file,
            Err(crate::error::Error::VersionTooNew { found, .. }) => {
                ctx.report.notices.push(format!(
                    "{} version {} is newer than this build supports",
                    candidate.path.display(),
                    found
                ));
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if file.version < native_maps::NATIVE_MAPS_VERSION {
            format::backup_before_upgrade(&candidate.path, file.version)?;
        }

        for set in file.sets {
            if self.loading.is_cancelled() {
                return Ok(());
            }
            for diff in &set.difficulties {
                if diff.star_rating <= 0.0 {
                    ctx.stars_to_calc.push(diff.md5_hash);
                }
                if diff.loudness == 0.0 {
                    ctx.loudness_to_calc.push(diff.md5_hash);
                }
            }
            ctx.report.native_maps += set.difficulties.len() as u32;
            self.beatmaps.insert_set(set);
        }
        ctx.report.overrides += file.overrides.len() as u32;
        self.overrides.extend(file.overrides);
        Ok(())
    }

    fn import_stable_maps(&self, candidate: &Candidate, ctx: &mut PipelineCtx) -> Result<()> {
        let Some(mut reader) = format::open_database_file(&candidate.path)? else {
            return Ok(());
        };
        let header = stable_maps::read_header(&mut reader)?;
        tracing::info!(
            "{}: version {}, {} folders, {} beatmaps",
            candidate.path.display(),
            header.version,
            header.folder_count,
            header.num_beatmaps
        );
        if header.version > STABLE_MAPS_VERSION_CAP && !self.config.ignore_version_cap {
            ctx.report.notices.push(format!(
                "osu!.db version {} unknown, stable maps will not be loaded",
                header.version
            ));
            return Ok(());
        }

        let songs_folder = format!("{}/", self.config.songs_folder().display());
        let overrides_snapshot = self.overrides.snapshot();
        let mut monitor = self.monitor_for(ctx, ctx.bytes_done);

        let mut stars_to_calc = Vec::new();
        let mut loudness_to_calc = Vec::new();
        let mut inserted = 0u32;
        let stats = stable_maps::read_entries(
            &mut reader,
            &header,
            &songs_folder,
            &overrides_snapshot,
            &mut monitor,
            &mut |entry| {
                if entry.needs_star_recalc {
                    stars_to_calc.push(entry.diff.md5_hash);
                }
                if entry.needs_loudness_recalc {
                    loudness_to_calc.push(entry.diff.md5_hash);
                }
                if self.beatmaps.insert_difficulty(entry.diff) {
                    inserted += 1;
                }
            },
        )?;

        ctx.stars_to_calc.extend(stars_to_calc);
        ctx.loudness_to_calc.extend(loudness_to_calc);
        ctx.report.stable_maps += inserted;
        ctx.report.maps_skipped += stats.skipped;
        Ok(())
    }

    fn import_collections(
        &self,
        candidate: &Candidate,
        ctx: &mut PipelineCtx,
        stable: bool,
    ) -> Result<()> {
        let Some(mut reader) = format::open_database_file(&candidate.path)? else {
            return Ok(());
        };
        let incoming = if stable {
            collections::read_stable_collections(&mut reader)?
        } else {
            collections::read_collections(&mut reader)?
        };
        let mut dest = self.collections.lock().expect("collections lock poisoned");
        collections::merge_collections(&mut dest, incoming);
        ctx.report.collections = dest.len() as u32;
        Ok(())
    }

    fn import_external_drops(&self, ctx: &mut PipelineCtx) {
        let drops = std::mem::take(&mut ctx.external);
        for candidate in drops {
            if self.loading.is_cancelled() {
                return;
            }
            tracing::info!(
                "Importing external database {} ({:?})",
                candidate.path.display(),
                candidate.kind
            );
            self.import_file(&candidate, ctx);
            ctx.report.external_sources += 1;
        }
    }

    fn finish_load(&self, ctx: &mut PipelineCtx) {
        *self.report.lock().expect("report lock poisoned") = std::mem::take(&mut ctx.report);

        // Hand the recalculation batches to the external services. The
        // queued lists are plain copies; this core does not touch them
        // again.
        let notifier = self.recalc.lock().expect("recalc lock poisoned").clone();
        if let Some(notifier) = notifier {
            if !ctx.stars_to_calc.is_empty() {
                notifier.stars_needed(std::mem::take(&mut ctx.stars_to_calc));
            }
            if !ctx.loudness_to_calc.is_empty() {
                notifier.loudness_needed(std::mem::take(&mut ctx.loudness_to_calc));
            }
        }

        self.loading.force_finished();
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.cancel();
        if let Some(notifier) = self.recalc.lock().ok().and_then(|mut g| g.take()) {
            notifier.abort();
        }
        let _ = self.join_loader();
    }
}

fn classify_candidate(path: &Path) -> Option<Candidate> {
    let metadata = std::fs::metadata(path).ok()?;
    if metadata.len() == 0 {
        return None;
    }
    let kind = format::sniff_database(path)?;
    Some(Candidate {
        kind,
        path: path.to_path_buf(),
        size: metadata.len(),
    })
}

fn run_pipeline(db: &Database) -> LoadOutcome {
    let started = std::time::Instant::now();
    let mut ctx = PipelineCtx::default();
    let mut phase = LoadPhase::DiscoveringFiles;

    loop {
        if db.loading.is_cancelled() {
            tracing::info!("Database load cancelled during {:?}", phase);
            *db.report.lock().expect("report lock poisoned") = std::mem::take(&mut ctx.report);
            return LoadOutcome::Cancelled;
        }
        phase = match phase {
            LoadPhase::Idle | LoadPhase::DiscoveringFiles => {
                db.discover(&mut ctx);
                LoadPhase::LoadingNativeScores
            }
            LoadPhase::LoadingNativeScores => {
                db.run_kind_phase(&mut ctx, &[DatabaseKind::NativeScores]);
                LoadPhase::LoadingLegacyEngineScores
            }
            LoadPhase::LoadingLegacyEngineScores => {
                db.run_kind_phase(&mut ctx, &[DatabaseKind::LegacyEngineScores]);
                LoadPhase::LoadingStableScores
            }
            LoadPhase::LoadingStableScores => {
                db.run_kind_phase(&mut ctx, &[DatabaseKind::StableScores]);
                db.scores_loaded.store(true, Ordering::Release);
                LoadPhase::LoadingMaps
            }
            LoadPhase::LoadingMaps => {
                db.run_kind_phase(
                    &mut ctx,
                    &[DatabaseKind::NativeMaps, DatabaseKind::StableMaps],
                );
                db.native_maps_loaded.store(true, Ordering::Release);
                LoadPhase::LoadingCollections
            }
            LoadPhase::LoadingCollections => {
                db.run_kind_phase(
                    &mut ctx,
                    &[
                        DatabaseKind::NativeCollections,
                        DatabaseKind::LegacyCollections,
                        DatabaseKind::StableCollections,
                    ],
                );
                LoadPhase::ImportingExternalDrops
            }
            LoadPhase::ImportingExternalDrops => {
                db.import_external_drops(&mut ctx);
                LoadPhase::Done
            }
            LoadPhase::Done => break,
        };
    }

    db.finish_load(&mut ctx);
    tracing::info!(
        "Database load completed in {:.2}s ({} maps, {} scores)",
        started.elapsed().as_secs_f64(),
        db.beatmaps.difficulty_count(),
        db.scores.score_count()
    );
    LoadOutcome::Completed
}
