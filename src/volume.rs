//! Mounted volumes
//!
//! A [`Volume`] is one mounted image: it owns the underlying buffer or
//! mapping and is immutable after mount, so it can be shared freely across
//! threads. File handles borrow the volume and are torn down before it.

use crate::error::{FsError, Result};
use crate::file::File;
use crate::format::{CompressionKind, FileFlags, FileRecord, ObjectKind};
use crate::image::{Image, ImageSource};
use crate::lookup;
use std::path::Path;

/// Object metadata copied out of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub kind: ObjectKind,
    /// Stable object index; feed it back to [`Volume::path_by_index`].
    pub index: u16,
    pub flags: FileFlags,
    pub compression: CompressionKind,
    /// Logical (uncompressed) size in bytes; 0 for directories.
    pub size: u32,
}

/// A mounted read-only filesystem image.
pub struct Volume {
    image: Image,
}

impl Volume {
    /// Mount an image from an explicit source. Fails without producing an
    /// instance when the source cannot be read or the header is not a
    /// supported image.
    pub fn mount(source: ImageSource) -> Result<Volume> {
        let image = Image::new(source)?;
        tracing::debug!("mounted image with {} objects", image.num_objects());
        Ok(Volume { image })
    }

    /// Map an image file read-only and mount it.
    pub fn mount_file<P: AsRef<Path>>(path: P) -> Result<Volume> {
        Volume::mount(Image::map_file(path.as_ref())?)
    }

    /// Mount an image held in an owned buffer.
    pub fn mount_buffer(bytes: Vec<u8>) -> Result<Volume> {
        Volume::mount(ImageSource::Buffer(bytes))
    }

    /// Number of objects (files and directories) in the image.
    pub fn len(&self) -> usize {
        self.image.num_objects() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Canonical path of the object with the given stable index, or `None`
    /// when the index is out of range or the stored path is not UTF-8.
    pub fn path_by_index(&self, index: u16) -> Option<&str> {
        let offset = self.image.record_offset_by_index(index)?;
        let object = self.image.object_at(offset).ok()?;
        let path = object.path_bytes(self.image.bytes()).ok()?;
        std::str::from_utf8(path).ok()
    }

    /// Look up a path and copy out its metadata. A missing path reports
    /// [`FsError::NotFound`]; directories and files both stat.
    pub fn stat(&self, path: &str) -> Result<Stat> {
        let object = lookup::resolve(&self.image, path)?.ok_or(FsError::NotFound)?;
        match object.kind {
            ObjectKind::Directory => Ok(Stat {
                kind: ObjectKind::Directory,
                index: object.index,
                flags: FileFlags::empty(),
                compression: CompressionKind::None,
                size: 0,
            }),
            ObjectKind::File => {
                let record = FileRecord::parse(self.image.bytes(), &object)?;
                Ok(Stat {
                    kind: ObjectKind::File,
                    index: record.index,
                    flags: record.flags,
                    compression: record.compression,
                    size: record.file_len,
                })
            }
        }
    }

    /// Open a file for reading. Fails with [`FsError::NotFound`] for a
    /// missing path, [`FsError::NotAFile`] for a directory, and
    /// [`FsError::UnsupportedCompression`] for a compression kind this
    /// build does not handle.
    pub fn open(&self, path: &str) -> Result<File<'_>> {
        let object = lookup::resolve(&self.image, path)?.ok_or(FsError::NotFound)?;
        if object.kind != ObjectKind::File {
            return Err(FsError::NotAFile);
        }
        let record = FileRecord::parse(self.image.bytes(), &object)?;
        Ok(File::new(self, record))
    }

    pub(crate) fn image(&self) -> &Image {
        &self.image
    }
}
