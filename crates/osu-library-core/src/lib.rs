//! # osu-library-core
//!
//! Core beatmap/score database engine: discovers, identifies, parses,
//! merges, persists and incrementally updates a local library of
//! beatmaps and play records spread across the native format and the
//! legacy/third-party formats it stays compatible with.
//!
//! ## Modules
//!
//! - [`beatmap`] - difficulty/set data structures, the hash-keyed index
//!   and the override table
//! - [`config`] - the read-only configuration surface
//! - [`error`] - error types and Result alias
//! - [`format`] - file identification, codec primitives and the
//!   per-format readers/writers
//! - [`hash`] - the fixed 32-character digest record used as primary key
//! - [`loader`] - the [`Database`] engine and its async loading pipeline
//! - [`parser`] - `.osu` parsing for raw folder loads
//! - [`recalc`] - the boundary to external star/loudness services
//! - [`score`] - finished-score model, sorting and the score index
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use osu_library_core::{Database, DatabaseConfig};
//!
//! let config = DatabaseConfig {
//!     osu_folder: "/games/osu".into(),
//!     ..Default::default()
//! };
//! let db = Arc::new(Database::new(config));
//! db.load();
//! while !db.is_finished() {
//!     db.update(); // drives raw-scan slices, never blocks a frame
//! }
//! println!("{} beatmaps loaded", db.beatmaps().difficulty_count());
//! ```

// Module declarations
pub mod beatmap;
pub mod config;
pub mod error;
pub mod format;
pub mod hash;
pub mod loader;
pub mod parser;
pub mod recalc;
pub mod score;

// Re-export key types for convenience

// Error types
pub use error::{Error, Result};

// Primary key
pub use hash::Md5Hash;

// Beatmap types
pub use beatmap::{
    BeatmapDifficulty, BeatmapOrigin, BeatmapSet, BeatmapStore, BpmSummary, GameMode,
    MapOverrides, OverrideStore, TimingPoint,
};

// Score types
pub use score::{
    stats::PlayerStats, FinishedScore, Grade, Mods, ScoreSortMethod, ScoreStore,
};

// Configuration
pub use config::{DatabaseConfig, STABLE_MAPS_VERSION_CAP};

// Format identification
pub use format::{sniff_database, DatabaseKind};

// Collections
pub use format::collections::Collection;

// Engine
pub use loader::{Database, LoadOutcome, LoadPhase, LoadReport, LoadingState};

// Recalculation boundary
pub use recalc::{NullRecalcNotifier, RecalcNotifier};
