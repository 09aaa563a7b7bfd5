//! Read-only configuration surface consumed by the database engine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Hard upper cap on the stable `osu!.db` version this reader claims to
/// understand. Newer files are skipped (non-fatally) unless
/// [`DatabaseConfig::ignore_version_cap`] is set.
pub const STABLE_MAPS_VERSION_CAP: u32 = 20250401;

/// Configuration handed to [`crate::Database`]. The engine never writes
/// any of these values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Root of the external (stable) installation to import from.
    pub osu_folder: PathBuf,
    /// Songs folder, relative to `osu_folder` unless absolute.
    pub songs_subfolder: String,
    /// Where this client's own database files live.
    pub data_dir: PathBuf,
    /// Whether to read the external installation's databases at all.
    pub database_enabled: bool,
    /// Read stable map files even past [`STABLE_MAPS_VERSION_CAP`].
    pub ignore_version_cap: bool,
    /// Local player name, used for stats and the user switcher.
    pub player_name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            osu_folder: PathBuf::new(),
            songs_subfolder: "Songs".to_string(),
            data_dir: PathBuf::from("."),
            database_enabled: true,
            ignore_version_cap: false,
            player_name: "Guest".to_string(),
        }
    }
}

impl DatabaseConfig {
    /// Resolve the songs folder: an absolute subfolder setting wins,
    /// otherwise it nests under the osu folder.
    pub fn songs_folder(&self) -> PathBuf {
        let sub = Path::new(&self.songs_subfolder);
        if sub.is_absolute() {
            sub.to_path_buf()
        } else {
            self.osu_folder.join(sub)
        }
    }

    /// Where set folders for native (downloaded) maps live.
    pub fn maps_dir(&self) -> PathBuf {
        self.data_dir.join("maps")
    }

    pub fn native_scores_path(&self) -> PathBuf {
        self.data_dir.join(crate::format::FILE_NATIVE_SCORES)
    }

    pub fn native_maps_path(&self) -> PathBuf {
        self.data_dir.join(crate::format::FILE_NATIVE_MAPS)
    }

    pub fn native_collections_path(&self) -> PathBuf {
        self.data_dir.join(crate::format::FILE_NATIVE_COLLECTIONS)
    }

    pub fn legacy_scores_path(&self) -> PathBuf {
        self.data_dir.join(crate::format::FILE_AMBIGUOUS_SCORES)
    }

    pub fn legacy_collections_path(&self) -> PathBuf {
        self.data_dir.join(crate::format::FILE_LEGACY_COLLECTIONS)
    }

    pub fn stable_maps_path(&self) -> PathBuf {
        self.osu_folder.join(crate::format::FILE_STABLE_MAPS)
    }

    pub fn stable_scores_path(&self) -> PathBuf {
        self.osu_folder.join(crate::format::FILE_AMBIGUOUS_SCORES)
    }

    pub fn stable_collections_path(&self) -> PathBuf {
        self.osu_folder.join(crate::format::FILE_STABLE_COLLECTIONS)
    }
}
