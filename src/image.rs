//! Image access layer
//!
//! [`Image`] owns the raw image bytes, validates the header once at
//! construction and precomputes the table offsets. Everything above this
//! layer reads the image exclusively through its bounds-checked accessors.

use crate::error::{FsError, Result};
use crate::format::{self, Header, ObjectHeader, HASH_ENTRY_LEN, SORT_ENTRY_LEN};
use memmap2::Mmap;
use std::path::Path;

/// Where the image bytes come from.
pub enum ImageSource {
    /// An explicit in-memory buffer supplied by the caller.
    Buffer(Vec<u8>),
    /// A read-only mapping of an image file.
    Mapped(Mmap),
}

impl ImageSource {
    fn bytes(&self) -> &[u8] {
        match self {
            ImageSource::Buffer(bytes) => bytes,
            ImageSource::Mapped(map) => map,
        }
    }
}

/// A validated, immutable image. The buffer never changes or relocates for
/// the lifetime of this value; dropping it releases the mapping or buffer.
pub(crate) struct Image {
    source: ImageSource,
    header: Header,
    hashtable: usize,
    sorttable: usize,
}

impl Image {
    pub fn new(source: ImageSource) -> Result<Self> {
        let bytes = source.bytes();
        let header = Header::parse(bytes)?;
        let hashtable = header.header_len as usize;
        let sorttable = hashtable + header.num_objects as usize * HASH_ENTRY_LEN;
        let tables_end = sorttable + header.num_objects as usize * SORT_ENTRY_LEN;
        if tables_end > bytes.len() {
            return Err(FsError::Truncated {
                what: "object tables",
                offset: tables_end,
            });
        }
        Ok(Image {
            source,
            header,
            hashtable,
            sorttable,
        })
    }

    /// Map an image file read-only.
    pub fn map_file(path: &Path) -> Result<ImageSource> {
        let file = std::fs::File::open(path)?;
        // Safety: the mapping is read-only and the backing image file is
        // treated as immutable for the lifetime of the volume.
        let map = unsafe { Mmap::map(&file)? };
        Ok(ImageSource::Mapped(map))
    }

    pub fn bytes(&self) -> &[u8] {
        self.source.bytes()
    }

    pub fn num_objects(&self) -> u16 {
        self.header.num_objects
    }

    /// Bounds-checked window into the image.
    pub fn slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.bytes()
            .get(offset..offset + len)
            .ok_or(FsError::Truncated {
                what: "image window",
                offset,
            })
    }

    /// Hash table entry `i`: `(hash, record offset)`.
    pub fn hash_entry(&self, i: usize) -> Result<(u32, u32)> {
        let offset = self.hashtable + i * HASH_ENTRY_LEN;
        let hash = format::read_u32(self.bytes(), offset)?;
        let record = format::read_u32(self.bytes(), offset + 4)?;
        Ok((hash, record))
    }

    /// Record offset for a stable object index, or `None` when the index is
    /// out of range.
    pub fn record_offset_by_index(&self, index: u16) -> Option<usize> {
        if index >= self.header.num_objects {
            return None;
        }
        let offset = self.sorttable + index as usize * SORT_ENTRY_LEN;
        format::read_u32(self.bytes(), offset)
            .ok()
            .map(|record| record as usize)
    }

    /// Parse the object record at a byte offset.
    pub fn object_at(&self, offset: usize) -> Result<ObjectHeader> {
        ObjectHeader::parse(self.bytes(), offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{MAGIC, VERSION_MAJOR};

    fn bare_header(num_objects: u16) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC.to_le_bytes());
        bytes.push(VERSION_MAJOR);
        bytes.push(0);
        bytes.extend_from_slice(&12u32.to_le_bytes());
        bytes.extend_from_slice(&num_objects.to_le_bytes());
        bytes
    }

    #[test]
    fn test_empty_image_mounts() {
        let image = Image::new(ImageSource::Buffer(bare_header(0))).unwrap();
        assert_eq!(image.num_objects(), 0);
    }

    #[test]
    fn test_rejects_truncated_tables() {
        // Header claims 5 objects but no table bytes follow.
        let result = Image::new(ImageSource::Buffer(bare_header(5)));
        assert!(matches!(result, Err(FsError::Truncated { .. })));
    }

    #[test]
    fn test_slice_bounds() {
        let image = Image::new(ImageSource::Buffer(bare_header(0))).unwrap();
        assert!(image.slice(0, 12).is_ok());
        assert!(matches!(
            image.slice(8, 8),
            Err(FsError::Truncated { .. })
        ));
    }

    #[test]
    fn test_record_offset_by_index_out_of_range() {
        let image = Image::new(ImageSource::Buffer(bare_header(0))).unwrap();
        assert_eq!(image.record_offset_by_index(0), None);
    }
}
