//! Collection files: named lists of beatmap hashes.
//!
//! The native `library_collections.db` and the predecessor engine's
//! `collections.db` share one layout (u32 version, u32 count, then per
//! collection a name and its hash records). osu!stable's `collection.db`
//! differs only in that hashes are free-form strings, so entries that are
//! not 32 characters are dropped instead of failing the file.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::format::codec::{BinaryReader, BinaryWriter};
use crate::hash::Md5Hash;

pub const NATIVE_COLLECTIONS_VERSION: u32 = 20240001;

/// A named list of beatmap hashes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    pub hashes: Vec<Md5Hash>,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hashes: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

/// Read the native/legacy shared layout.
pub fn read_collections<R: Read>(reader: &mut BinaryReader<R>) -> Result<Vec<Collection>> {
    let _version = reader.read_u32()?;
    let count = reader.read_u32()?;
    let mut collections = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = reader.read_string_or_default()?;
        let nb_hashes = reader.read_u32()?;
        let mut collection = Collection::new(name);
        collection.hashes.reserve(nb_hashes as usize);
        for _ in 0..nb_hashes {
            collection.hashes.push(reader.read_hash()?);
        }
        collections.push(collection);
    }
    Ok(collections)
}

/// Read osu!stable's `collection.db`. Malformed hash strings are skipped
/// per record; the rest of the file still loads.
pub fn read_stable_collections<R: Read>(reader: &mut BinaryReader<R>) -> Result<Vec<Collection>> {
    let _version = reader.read_u32()?;
    let count = reader.read_u32()?;
    let mut collections = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name = reader
            .read_string()?
            .unwrap_or_else(|| "Unnamed Collection".to_string());
        let nb_hashes = reader.read_u32()?;
        let mut collection = Collection::new(name);
        for _ in 0..nb_hashes {
            let hash_str = reader.read_string_or_default()?;
            match Md5Hash::from_hex_str(&hash_str) {
                Some(hash) => collection.hashes.push(hash),
                None => {
                    tracing::debug!(
                        "Dropping malformed hash (length {}) from collection '{}'",
                        hash_str.len(),
                        collection.name
                    );
                }
            }
        }
        collections.push(collection);
    }
    Ok(collections)
}

/// Write the native layout at the current version.
pub fn write_collections<W: Write>(
    writer: &mut BinaryWriter<W>,
    collections: &[Collection],
) -> Result<()> {
    writer.write_u32(NATIVE_COLLECTIONS_VERSION)?;
    writer.write_u32(collections.len() as u32)?;
    for collection in collections {
        writer.write_string(&collection.name)?;
        writer.write_u32(collection.hashes.len() as u32)?;
        for hash in &collection.hashes {
            writer.write_hash(hash)?;
        }
    }
    writer.flush()
}

/// Merge collections by name, deduplicating hashes. Returns how many
/// hashes were newly added to `dest`.
pub fn merge_collections(dest: &mut Vec<Collection>, src: Vec<Collection>) -> usize {
    let mut added = 0;
    for incoming in src {
        match dest.iter_mut().find(|c| c.name == incoming.name) {
            Some(existing) => {
                for hash in incoming.hashes {
                    if !existing.hashes.contains(&hash) {
                        existing.hashes.push(hash);
                        added += 1;
                    }
                }
            }
            None => {
                added += incoming.hashes.len();
                dest.push(incoming);
            }
        }
    }
    added
}
