//! Error types for osu-library-core

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for database operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse beatmap file {path}: {message}")]
    BeatmapParse { path: PathBuf, message: String },

    #[error("Unexpected string marker byte 0x{marker:02x} at offset {offset}")]
    BadStringMarker { marker: u8, offset: u64 },

    #[error("Invalid UTF-8 in length-prefixed string at offset {offset}")]
    BadStringEncoding { offset: u64 },

    #[error("Corrupt record: {reason}")]
    CorruptRecord { reason: String },

    #[error("Database file {path} declares version {found}, reader supports up to {supported}")]
    VersionTooNew {
        path: PathBuf,
        found: u32,
        supported: u32,
    },

    #[error("Bad magic bytes in {path}")]
    BadMagic { path: PathBuf },
}

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, Error>;
