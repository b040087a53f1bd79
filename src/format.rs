//! On-image binary schema
//!
//! An image is a passive byte buffer: a fixed header, a hash table sorted
//! ascending by path hash, a sort table indexed by stable object index, and
//! variable-length object records reachable only through those tables. All
//! multi-byte fields are little-endian. Records carry their own prefix
//! length, so a reader can skip from the record start to the path string and
//! from there to the payload without any further table of contents.
//!
//! Every accessor here is bounds-checked; a short or self-inconsistent image
//! surfaces as an error, never as an out-of-range read.

use crate::error::{FsError, Result};
use bitflags::bitflags;

/// Magic number at offset 0 of every image: `"BAKE"`.
pub const MAGIC: u32 = u32::from_le_bytes(*b"BAKE");

/// Format major version. Images with a different major version are rejected;
/// minor version differences are tolerated.
pub const VERSION_MAJOR: u8 = 1;

/// Format minor version emitted by [`crate::builder::ImageBuilder`].
pub const VERSION_MINOR: u8 = 0;

/// Byte length of the fixed image header.
pub const HEADER_LEN: usize = 12;

/// Byte length of one hash table entry: `{ hash: u32, offset: u32 }`.
pub const HASH_ENTRY_LEN: usize = 8;

/// Byte length of one sort table entry: `{ offset: u32 }`.
pub const SORT_ENTRY_LEN: usize = 4;

/// Fixed-field prefix length of a directory record.
pub const DIR_PREFIX_LEN: u16 = 5;

/// Fixed-field prefix length of a file record.
pub const FILE_PREFIX_LEN: u16 = 16;

/// Byte length of the codec sub-header preceding a DEFLATE payload.
pub const DEFLATE_SUBHEADER_LEN: usize = 2;

/// Method byte stored in the DEFLATE codec sub-header.
pub const DEFLATE_METHOD: u8 = 8;

pub(crate) fn read_u8(image: &[u8], offset: usize) -> Result<u8> {
    image.get(offset).copied().ok_or(FsError::Truncated {
        what: "u8 field",
        offset,
    })
}

pub(crate) fn read_u16(image: &[u8], offset: usize) -> Result<u16> {
    let bytes = image.get(offset..offset + 2).ok_or(FsError::Truncated {
        what: "u16 field",
        offset,
    })?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

pub(crate) fn read_u32(image: &[u8], offset: usize) -> Result<u32> {
    let bytes = image.get(offset..offset + 4).ok_or(FsError::Truncated {
        what: "u32 field",
        offset,
    })?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Fixed image header at offset 0.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub magic: u32,
    pub version_major: u8,
    pub version_minor: u8,
    /// Byte offset where the hash table begins.
    pub header_len: u32,
    pub num_objects: u16,
}

impl Header {
    /// Parse and validate the header at the start of `image`.
    pub fn parse(image: &[u8]) -> Result<Self> {
        let header = Header {
            magic: read_u32(image, 0)?,
            version_major: read_u8(image, 4)?,
            version_minor: read_u8(image, 5)?,
            header_len: read_u32(image, 6)?,
            num_objects: read_u16(image, 10)?,
        };
        header.validate()?;
        Ok(header)
    }

    /// Validate the magic and major version.
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(FsError::InvalidMagic);
        }
        if self.version_major != VERSION_MAJOR {
            return Err(FsError::UnsupportedVersion {
                major: self.version_major,
                minor: self.version_minor,
            });
        }
        Ok(())
    }
}

/// Object kind stored in a record's first byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    File = 0,
    Directory = 1,
}

impl ObjectKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ObjectKind::File),
            1 => Some(ObjectKind::Directory),
            _ => None,
        }
    }
}

/// How a file's payload is stored.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    /// Payload bytes are the file content, readable in place.
    None = 0,
    /// Payload is a raw DEFLATE stream behind a 2-byte codec sub-header,
    /// decoded incrementally at read time.
    Deflate = 1,
}

impl CompressionKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionKind::None),
            1 => Some(CompressionKind::Deflate),
            _ => None,
        }
    }
}

bitflags! {
    /// Storage flags recorded on file records by the image builder.
    ///
    /// The core stores and reports these; acting on them is left to outer
    /// layers (an HTTP handler uses [`FileFlags::GZIP`] to set
    /// `Content-Encoding` instead of decoding).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FileFlags: u16 {
        /// Content was pre-gzipped by the builder and is served as-is.
        const GZIP = 1 << 0;
        /// Hint that the object is worth caching upstream.
        const CACHE = 1 << 1;
    }
}

/// Common fixed prefix of every object record.
#[derive(Debug, Clone, Copy)]
pub struct ObjectHeader {
    pub kind: ObjectKind,
    /// Stable object index, the key into the sort table.
    pub index: u16,
    /// Byte length of the whole fixed-field prefix; the path string starts
    /// at `offset + prefix_len`.
    pub prefix_len: u16,
    /// Absolute byte offset of this record in the image.
    pub offset: usize,
}

impl ObjectHeader {
    pub fn parse(image: &[u8], offset: usize) -> Result<Self> {
        let kind = read_u8(image, offset)?;
        let kind = ObjectKind::from_u8(kind).ok_or(FsError::InvalidRecord(offset))?;
        Ok(ObjectHeader {
            kind,
            index: read_u16(image, offset + 1)?,
            prefix_len: read_u16(image, offset + 3)?,
            offset,
        })
    }

    /// The record's NUL-terminated path string, without the terminator.
    pub fn path_bytes<'a>(&self, image: &'a [u8]) -> Result<&'a [u8]> {
        let start = self.offset + self.prefix_len as usize;
        let tail = image.get(start..).ok_or(FsError::Truncated {
            what: "path string",
            offset: start,
        })?;
        let nul = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or(FsError::Truncated {
                what: "path string",
                offset: start,
            })?;
        Ok(&tail[..nul])
    }
}

/// Fixed fields of a `FILE` record, plus the resolved payload offset.
#[derive(Debug, Clone, Copy)]
pub struct FileRecord {
    pub index: u16,
    pub flags: FileFlags,
    pub compression: CompressionKind,
    /// Stored payload length, including any codec sub-header.
    pub data_len: u32,
    /// Logical (uncompressed) file length.
    pub file_len: u32,
    /// Absolute byte offset of the payload, just past the path terminator.
    pub payload: usize,
}

impl FileRecord {
    pub fn parse(image: &[u8], object: &ObjectHeader) -> Result<Self> {
        if object.kind != ObjectKind::File || object.prefix_len < FILE_PREFIX_LEN {
            return Err(FsError::InvalidRecord(object.offset));
        }
        let flags = FileFlags::from_bits_retain(read_u16(image, object.offset + 5)?);
        let compression = read_u8(image, object.offset + 7)?;
        let compression = CompressionKind::from_u8(compression)
            .ok_or(FsError::UnsupportedCompression(compression))?;
        let data_len = read_u32(image, object.offset + 8)?;
        let file_len = read_u32(image, object.offset + 12)?;
        if compression == CompressionKind::None && data_len != file_len {
            return Err(FsError::InvalidRecord(object.offset));
        }
        let path = object.path_bytes(image)?;
        let payload = object.offset + object.prefix_len as usize + path.len() + 1;
        if payload + data_len as usize > image.len() {
            return Err(FsError::Truncated {
                what: "file payload",
                offset: payload,
            });
        }
        Ok(FileRecord {
            index: object.index,
            flags,
            compression,
            data_len,
            file_len,
            payload,
        })
    }
}

/// DEFLATE codec sub-header stored immediately before the coded payload.
#[derive(Debug, Clone, Copy)]
pub struct DeflateParams {
    /// Base-2 log of the encoder's window size.
    pub window_log2: u8,
}

impl DeflateParams {
    pub fn parse(image: &[u8], offset: usize) -> Result<Self> {
        let method = read_u8(image, offset)?;
        let window_log2 = read_u8(image, offset + 1)?;
        if method != DEFLATE_METHOD {
            return Err(FsError::Decode(format!("unknown codec method {method}")));
        }
        Ok(DeflateParams { window_log2 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(magic: u32, major: u8, minor: u8, len: u32, num: u16) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&magic.to_le_bytes());
        bytes.push(major);
        bytes.push(minor);
        bytes.extend_from_slice(&len.to_le_bytes());
        bytes.extend_from_slice(&num.to_le_bytes());
        bytes
    }

    #[test]
    fn test_header_parse() {
        let bytes = header_bytes(MAGIC, VERSION_MAJOR, VERSION_MINOR, 12, 3);
        let header = Header::parse(&bytes).unwrap();
        assert_eq!(header.magic, MAGIC);
        assert_eq!(header.version_major, VERSION_MAJOR);
        assert_eq!(header.header_len, 12);
        assert_eq!(header.num_objects, 3);
    }

    #[test]
    fn test_header_rejects_bad_magic() {
        let bytes = header_bytes(0xDEADBEEF, VERSION_MAJOR, 0, 12, 0);
        assert!(matches!(
            Header::parse(&bytes),
            Err(FsError::InvalidMagic)
        ));
    }

    #[test]
    fn test_header_rejects_major_version() {
        let bytes = header_bytes(MAGIC, VERSION_MAJOR + 1, 0, 12, 0);
        assert!(matches!(
            Header::parse(&bytes),
            Err(FsError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_header_tolerates_minor_version() {
        let bytes = header_bytes(MAGIC, VERSION_MAJOR, VERSION_MINOR + 7, 12, 0);
        assert!(Header::parse(&bytes).is_ok());
    }

    #[test]
    fn test_header_truncated() {
        let bytes = header_bytes(MAGIC, VERSION_MAJOR, 0, 12, 0);
        assert!(matches!(
            Header::parse(&bytes[..6]),
            Err(FsError::Truncated { .. })
        ));
    }

    #[test]
    fn test_kind_conversions() {
        assert_eq!(ObjectKind::from_u8(0), Some(ObjectKind::File));
        assert_eq!(ObjectKind::from_u8(1), Some(ObjectKind::Directory));
        assert_eq!(ObjectKind::from_u8(2), None);
        assert_eq!(CompressionKind::from_u8(0), Some(CompressionKind::None));
        assert_eq!(CompressionKind::from_u8(1), Some(CompressionKind::Deflate));
        assert_eq!(CompressionKind::from_u8(99), None);
    }

    #[test]
    fn test_object_header_and_path() {
        // Directory record: kind, index, prefix_len, then "www\0"
        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&7u16.to_le_bytes());
        bytes.extend_from_slice(&DIR_PREFIX_LEN.to_le_bytes());
        bytes.extend_from_slice(b"www\0");

        let object = ObjectHeader::parse(&bytes, 0).unwrap();
        assert_eq!(object.kind, ObjectKind::Directory);
        assert_eq!(object.index, 7);
        assert_eq!(object.path_bytes(&bytes).unwrap(), b"www");
    }

    #[test]
    fn test_object_header_rejects_unknown_kind() {
        let bytes = [9u8, 0, 0, 5, 0];
        assert!(matches!(
            ObjectHeader::parse(&bytes, 0),
            Err(FsError::InvalidRecord(0))
        ));
    }

    #[test]
    fn test_path_missing_terminator() {
        let mut bytes = vec![1u8];
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&DIR_PREFIX_LEN.to_le_bytes());
        bytes.extend_from_slice(b"www"); // no NUL

        let object = ObjectHeader::parse(&bytes, 0).unwrap();
        assert!(matches!(
            object.path_bytes(&bytes),
            Err(FsError::Truncated { .. })
        ));
    }

    fn file_record_bytes(compression: u8, data_len: u32, file_len: u32) -> Vec<u8> {
        let mut bytes = vec![0u8]; // kind = FILE
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(&FILE_PREFIX_LEN.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes()); // flags
        bytes.push(compression);
        bytes.extend_from_slice(&data_len.to_le_bytes());
        bytes.extend_from_slice(&file_len.to_le_bytes());
        bytes.extend_from_slice(b"f\0");
        bytes.resize(bytes.len() + data_len as usize, 0xAA);
        bytes
    }

    #[test]
    fn test_file_record_parse() {
        let bytes = file_record_bytes(0, 4, 4);
        let object = ObjectHeader::parse(&bytes, 0).unwrap();
        let record = FileRecord::parse(&bytes, &object).unwrap();
        assert_eq!(record.compression, CompressionKind::None);
        assert_eq!(record.data_len, 4);
        assert_eq!(record.file_len, 4);
        assert_eq!(record.payload, FILE_PREFIX_LEN as usize + 2);
    }

    #[test]
    fn test_file_record_rejects_unknown_compression() {
        let bytes = file_record_bytes(9, 4, 4);
        let object = ObjectHeader::parse(&bytes, 0).unwrap();
        assert!(matches!(
            FileRecord::parse(&bytes, &object),
            Err(FsError::UnsupportedCompression(9))
        ));
    }

    #[test]
    fn test_file_record_rejects_direct_length_mismatch() {
        let bytes = file_record_bytes(0, 4, 9);
        let object = ObjectHeader::parse(&bytes, 0).unwrap();
        assert!(matches!(
            FileRecord::parse(&bytes, &object),
            Err(FsError::InvalidRecord(0))
        ));
    }

    #[test]
    fn test_file_record_payload_out_of_bounds() {
        let mut bytes = file_record_bytes(0, 4, 4);
        bytes.truncate(bytes.len() - 2); // chop payload short
        let object = ObjectHeader::parse(&bytes, 0).unwrap();
        assert!(matches!(
            FileRecord::parse(&bytes, &object),
            Err(FsError::Truncated { .. })
        ));
    }

    #[test]
    fn test_deflate_params_rejects_unknown_method() {
        let bytes = [3u8, 15];
        assert!(matches!(
            DeflateParams::parse(&bytes, 0),
            Err(FsError::Decode(_))
        ));
        let bytes = [DEFLATE_METHOD, 15];
        assert_eq!(DeflateParams::parse(&bytes, 0).unwrap().window_log2, 15);
    }
}
