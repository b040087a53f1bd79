//! Image builder
//!
//! Serializes a set of directories and files into the binary image layout:
//! path hashes computed, hash table sorted, sort table indexed, records
//! emitted with their payloads. This is build tooling: images are baked
//! once and mounted read-only; nothing here runs on the read path.

use crate::error::{FsError, Result};
use crate::format::{
    CompressionKind, FileFlags, ObjectKind, DEFLATE_METHOD, DIR_PREFIX_LEN, FILE_PREFIX_LEN,
    HASH_ENTRY_LEN, HEADER_LEN, MAGIC, SORT_ENTRY_LEN, VERSION_MAJOR, VERSION_MINOR,
};
use crate::lookup::path_hash;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::io::Write;

/// Window parameter recorded in the DEFLATE codec sub-header.
const DEFLATE_WINDOW_LOG2: u8 = 15;

enum Payload {
    Dir,
    File {
        data: Vec<u8>,
        compress: bool,
        flags: FileFlags,
    },
}

struct Entry {
    path: String,
    payload: Payload,
}

/// Builds image byte vectors for [`crate::Volume::mount_buffer`] or for
/// writing out to a flash partition.
///
/// The stable object index of each entry is its insertion order.
#[derive(Default)]
pub struct ImageBuilder {
    entries: Vec<Entry>,
}

impl ImageBuilder {
    pub fn new() -> ImageBuilder {
        ImageBuilder::default()
    }

    fn push(&mut self, path: &str, payload: Payload) -> &mut ImageBuilder {
        self.entries.push(Entry {
            path: path.trim_start_matches('/').to_string(),
            payload,
        });
        self
    }

    pub fn add_dir(&mut self, path: &str) -> &mut ImageBuilder {
        self.push(path, Payload::Dir)
    }

    /// Add a file stored uncompressed, readable in place.
    pub fn add_file(&mut self, path: &str, data: &[u8]) -> &mut ImageBuilder {
        self.add_file_with_flags(path, data, FileFlags::empty())
    }

    pub fn add_file_with_flags(
        &mut self,
        path: &str,
        data: &[u8],
        flags: FileFlags,
    ) -> &mut ImageBuilder {
        self.push(
            path,
            Payload::File {
                data: data.to_vec(),
                compress: false,
                flags,
            },
        )
    }

    /// Add a file stored as a DEFLATE stream, decoded incrementally at
    /// read time.
    pub fn add_deflate_file(&mut self, path: &str, data: &[u8]) -> &mut ImageBuilder {
        self.push(
            path,
            Payload::File {
                data: data.to_vec(),
                compress: true,
                flags: FileFlags::empty(),
            },
        )
    }

    /// Serialize the added entries into an image.
    pub fn build(&self) -> Result<Vec<u8>> {
        let num_objects = u16::try_from(self.entries.len())
            .map_err(|_| FsError::TooManyObjects(self.entries.len()))?;

        // Hash table order: ascending by (hash, path). The sort table keeps
        // insertion order, which is the stable object index.
        let mut order: Vec<(u32, usize)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (path_hash(&entry.path), index))
            .collect();
        order.sort_by(|a, b| (a.0, &self.entries[a.1].path).cmp(&(b.0, &self.entries[b.1].path)));

        let tables_len =
            num_objects as usize * HASH_ENTRY_LEN + num_objects as usize * SORT_ENTRY_LEN;
        let mut hashtable = Vec::with_capacity(num_objects as usize * HASH_ENTRY_LEN);
        let mut sorttable = vec![0u8; num_objects as usize * SORT_ENTRY_LEN];
        let mut records = Vec::new();

        for &(hash, index) in &order {
            let entry = &self.entries[index];
            let offset = HEADER_LEN + tables_len + records.len();
            let offset = u32::try_from(offset).map_err(|_| FsError::ObjectTooLarge(offset))?;

            hashtable.extend_from_slice(&hash.to_le_bytes());
            hashtable.extend_from_slice(&offset.to_le_bytes());
            sorttable[index * SORT_ENTRY_LEN..(index + 1) * SORT_ENTRY_LEN]
                .copy_from_slice(&offset.to_le_bytes());

            encode_record(&mut records, entry, index as u16)?;
        }

        let mut image = Vec::with_capacity(HEADER_LEN + tables_len + records.len());
        image.extend_from_slice(&MAGIC.to_le_bytes());
        image.push(VERSION_MAJOR);
        image.push(VERSION_MINOR);
        image.extend_from_slice(&(HEADER_LEN as u32).to_le_bytes());
        image.extend_from_slice(&num_objects.to_le_bytes());
        image.extend_from_slice(&hashtable);
        image.extend_from_slice(&sorttable);
        image.extend_from_slice(&records);
        Ok(image)
    }
}

fn encode_record(out: &mut Vec<u8>, entry: &Entry, index: u16) -> Result<()> {
    match &entry.payload {
        Payload::Dir => {
            out.push(ObjectKind::Directory as u8);
            out.extend_from_slice(&index.to_le_bytes());
            out.extend_from_slice(&DIR_PREFIX_LEN.to_le_bytes());
            out.extend_from_slice(entry.path.as_bytes());
            out.push(0);
        }
        Payload::File {
            data,
            compress,
            flags,
        } => {
            let file_len =
                u32::try_from(data.len()).map_err(|_| FsError::ObjectTooLarge(data.len()))?;
            let (compression, payload) = if *compress {
                let mut payload = vec![DEFLATE_METHOD, DEFLATE_WINDOW_LOG2];
                payload.extend_from_slice(&deflate(data)?);
                (CompressionKind::Deflate, payload)
            } else {
                (CompressionKind::None, data.clone())
            };
            let data_len =
                u32::try_from(payload.len()).map_err(|_| FsError::ObjectTooLarge(payload.len()))?;

            out.push(ObjectKind::File as u8);
            out.extend_from_slice(&index.to_le_bytes());
            out.extend_from_slice(&FILE_PREFIX_LEN.to_le_bytes());
            out.extend_from_slice(&flags.bits().to_le_bytes());
            out.push(compression as u8);
            out.extend_from_slice(&data_len.to_le_bytes());
            out.extend_from_slice(&file_len.to_le_bytes());
            out.extend_from_slice(entry.path.as_bytes());
            out.push(0);
            out.extend_from_slice(&payload);
        }
    }
    Ok(())
}

fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
