//! Database file formats: identification, codec primitives, and the
//! per-format readers/writers.
//!
//! - [`codec`] - little-endian primitives shared by every format
//! - [`native_maps`] / [`native_scores`] - this client's own durable storage
//! - [`legacy_scores`] - the predecessor engine's `scores.db`
//! - [`stable_maps`] / [`stable_scores`] - osu!stable's `osu!.db`/`scores.db`
//! - [`collections`] - native, legacy and stable collection files

pub mod codec;
pub mod collections;
pub mod legacy_scores;
pub mod native_maps;
pub mod native_scores;
pub mod stable_maps;
pub mod stable_scores;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::format::codec::BinaryReader;

/// File names recognized by the sniffer.
pub const FILE_NATIVE_SCORES: &str = "library_scores.db";
pub const FILE_NATIVE_MAPS: &str = "library_maps.db";
pub const FILE_NATIVE_COLLECTIONS: &str = "library_collections.db";
pub const FILE_LEGACY_COLLECTIONS: &str = "collections.db";
pub const FILE_STABLE_MAPS: &str = "osu!.db";
pub const FILE_STABLE_COLLECTIONS: &str = "collection.db";
/// Shared by the legacy engine and osu!stable; disambiguated by content.
pub const FILE_AMBIGUOUS_SCORES: &str = "scores.db";

/// Every `scores.db` version the legacy engine ever shipped. Seeing one of
/// these in the leading version field settles the format immediately.
pub const LEGACY_ENGINE_SCORE_VERSIONS: [u32; 5] =
    [20210103, 20210106, 20210108, 20210110, 20240412];

/// The classified kind of a database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseKind {
    NativeScores,
    LegacyEngineScores,
    LegacyCollections,
    NativeCollections,
    NativeMaps,
    StableScores,
    StableCollections,
    StableMaps,
}

/// Classify a database file, or `None` when it cannot be identified.
///
/// Collection and map files have unambiguous names. A score file may
/// hold any of three layouts regardless of its name: the native format
/// announces itself with a 5-byte magic; the legacy engine's layout is
/// settled by its known version constants; the remaining ambiguity
/// (legacy at an unknown version vs. osu!stable) is settled by probing
/// the first score record - the legacy engine stores a 64-bit unix
/// timestamp there, whose high 32 bits stay zero until 2106, while
/// stable stores a hash string whose 0x0b marker and length prefix make
/// those bytes non-zero.
pub fn sniff_database(path: &Path) -> Option<DatabaseKind> {
    let file_name = path.file_name()?.to_str()?;
    match file_name {
        FILE_NATIVE_SCORES => Some(DatabaseKind::NativeScores),
        FILE_NATIVE_MAPS => Some(DatabaseKind::NativeMaps),
        FILE_NATIVE_COLLECTIONS => Some(DatabaseKind::NativeCollections),
        FILE_LEGACY_COLLECTIONS => Some(DatabaseKind::LegacyCollections),
        FILE_STABLE_MAPS => Some(DatabaseKind::StableMaps),
        FILE_STABLE_COLLECTIONS => Some(DatabaseKind::StableCollections),
        FILE_AMBIGUOUS_SCORES => match sniff_scores_file(path) {
            Ok(kind) => kind,
            Err(e) => {
                tracing::debug!("Could not sniff {}: {}", path.display(), e);
                None
            }
        },
        _ => None,
    }
}

fn sniff_scores_file(path: &Path) -> crate::error::Result<Option<DatabaseKind>> {
    // The native format carries a magic prefix, so a misnamed native
    // file is still identified before the version heuristics run.
    {
        let mut file = File::open(path)?;
        let mut magic = [0u8; 5];
        use std::io::Read;
        if file.read_exact(&mut magic).is_ok() && &magic == native_scores::NATIVE_SCORES_MAGIC {
            return Ok(Some(DatabaseKind::NativeScores));
        }
    }

    let file = File::open(path)?;
    let mut reader = BinaryReader::new(BufReader::new(file));

    let version = reader.read_u32()?;
    let nb_beatmaps = reader.read_u32()?;

    if LEGACY_ENGINE_SCORE_VERSIONS.contains(&version) {
        return Ok(Some(DatabaseKind::LegacyEngineScores));
    }
    if nb_beatmaps == 0 {
        // No record to probe; treat as absent/invalid.
        return Ok(None);
    }

    // First beatmap group: hash string, then the score count.
    reader.skip_string()?;
    let nb_scores = reader.read_u32()?;
    if nb_scores == 0 {
        return Ok(None);
    }

    // First score record: both layouts start with a gamemode byte and a
    // u32 score version. What follows differs: the legacy engine stores
    // a u64 unix timestamp (high half zero until 2106), stable stores the
    // beatmap hash string (marker + non-zero length + hex characters).
    reader.read_u8()?;
    reader.read_u32()?;
    let probe = reader.read_u64()?;
    if probe >> 32 == 0 {
        Ok(Some(DatabaseKind::LegacyEngineScores))
    } else {
        Ok(Some(DatabaseKind::StableScores))
    }
}

/// Progress/cancellation hooks threaded through the per-format loaders.
///
/// The orchestrator implements this with byte-based progress math; tests
/// and one-shot tools use [`NullMonitor`].
pub trait LoadMonitor {
    fn is_cancelled(&self) -> bool {
        false
    }

    /// Called with the reader's absolute byte position after each record.
    fn record_position(&mut self, _pos: u64) {}
}

/// A monitor that never cancels and ignores progress.
pub struct NullMonitor;

impl LoadMonitor for NullMonitor {}

/// Open a candidate database file for reading.
///
/// Returns `Ok(None)` when the file is missing or zero-length; both mean
/// "skip this phase", never an error.
pub fn open_database_file(path: &Path) -> std::io::Result<Option<BinaryReader<BufReader<File>>>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    if file.metadata()?.len() == 0 {
        return Ok(None);
    }
    Ok(Some(BinaryReader::new(BufReader::new(file))))
}

/// Copy a database file to `<name>.<version>` next to itself before an
/// in-place upgrade to a newer schema overwrites it.
pub fn backup_before_upgrade(path: &Path, old_version: u32) -> std::io::Result<()> {
    let mut backup_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    backup_name.push_str(&format!(".{}", old_version));
    let backup_path = path.with_file_name(backup_name);
    if backup_path.exists() {
        // An earlier run already preserved this version.
        return Ok(());
    }
    std::fs::copy(path, &backup_path)?;
    tracing::info!(
        "Backed up {} (version {}) to {}",
        path.display(),
        old_version,
        backup_path.display()
    );
    Ok(())
}
