//! File handles
//!
//! A [`File`] is the per-open state for one file record: the logical read
//! position, the raw payload cursor and, for compressed files, a lazily
//! created decoder. Handles are not shareable; every operation takes
//! `&mut self`, so one handle serves one consumer at a time while the
//! underlying volume stays freely shared.

use crate::decode::{DeflateDecoder, StreamDecoder};
use crate::error::{FsError, Result};
use crate::format::{CompressionKind, DeflateParams, FileRecord, ObjectKind, DEFLATE_SUBHEADER_LEN};
use crate::image::Image;
use crate::volume::{Stat, Volume};
use std::io::{self, SeekFrom};

/// Raw bytes handed to the decoder per feed step. Tuning constant; any
/// value >= 1 behaves identically, it only changes call granularity.
const FEED_CHUNK: usize = 16;

/// Read state of one open file.
enum Mode {
    /// Uncompressed payload: raw and logical offsets coincide 1:1, so reads
    /// copy straight out of the image and seeks are O(1).
    Direct { start: usize, cursor: usize },
    /// DEFLATE payload, decoded incrementally. The decoder and raw window
    /// are created on first read, once the codec sub-header is parsed.
    Streaming(Option<StreamState>),
}

struct StreamState {
    decoder: Box<dyn StreamDecoder>,
    /// Absolute offset of the coded bytes, just past the codec sub-header.
    start: usize,
    /// Length of the coded bytes.
    len: usize,
    cursor: usize,
}

impl StreamState {
    fn new(image: &Image, record: &FileRecord) -> Result<StreamState> {
        let params = DeflateParams::parse(image.bytes(), record.payload)?;
        let len = (record.data_len as usize)
            .checked_sub(DEFLATE_SUBHEADER_LEN)
            .ok_or(FsError::Truncated {
                what: "codec sub-header",
                offset: record.payload,
            })?;
        let start = record.payload + DEFLATE_SUBHEADER_LEN;
        Ok(StreamState {
            decoder: Box::new(DeflateDecoder::new(&params)),
            start,
            len,
            cursor: start,
        })
    }

    /// Alternate feeding coded bytes and draining decoded bytes until the
    /// caller's buffer is satisfied or the raw input runs dry.
    fn read(&mut self, image: &Image, buf: &mut [u8], pos: &mut u64, file_len: u32) -> Result<usize> {
        let mut decoded = 0;
        while decoded < buf.len() {
            let remain = self.len - (self.cursor - self.start);
            if remain > 0 {
                let chunk = remain.min(FEED_CHUNK);
                let input = image.slice(self.cursor, chunk)?;
                let accepted = self.decoder.sink(input)?;
                self.cursor += accepted;
            }
            let produced = self.decoder.poll(&mut buf[decoded..])?;
            *pos += produced as u64;
            decoded += produced;
            if remain == 0 {
                if *pos == u64::from(file_len) {
                    self.decoder.finish()?;
                }
                return Ok(decoded);
            }
        }
        Ok(decoded)
    }
}

/// An open file. Borrowing the [`Volume`] ties every handle's lifetime to
/// the instance it came from.
pub struct File<'v> {
    volume: &'v Volume,
    record: FileRecord,
    pos: u64,
    mode: Mode,
}

impl<'v> File<'v> {
    pub(crate) fn new(volume: &'v Volume, record: FileRecord) -> File<'v> {
        let mode = match record.compression {
            CompressionKind::None => Mode::Direct {
                start: record.payload,
                cursor: record.payload,
            },
            CompressionKind::Deflate => Mode::Streaming(None),
        };
        File {
            volume,
            record,
            pos: 0,
            mode,
        }
    }

    /// Metadata of the open file, available without any read having
    /// occurred.
    pub fn stat(&self) -> Stat {
        Stat {
            kind: ObjectKind::File,
            index: self.record.index,
            flags: self.record.flags,
            compression: self.record.compression,
            size: self.record.file_len,
        }
    }

    /// Current logical read position: bytes delivered to the caller so far.
    pub fn tell(&self) -> u64 {
        self.pos
    }

    /// Read up to `buf.len()` bytes into `buf`, returning the count
    /// actually read. Returns `Ok(0)` once the end of the file is reached;
    /// exhausting the file is never an error. Near the end of a compressed
    /// file the count may be less than requested.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let image = self.volume.image();
        let file_len = self.record.file_len;
        match &mut self.mode {
            Mode::Direct { start, cursor } => {
                let remaining = (*start + file_len as usize) - *cursor;
                let len = buf.len().min(remaining);
                buf[..len].copy_from_slice(image.slice(*cursor, len)?);
                *cursor += len;
                self.pos += len as u64;
                Ok(len)
            }
            Mode::Streaming(slot) => {
                if self.pos >= u64::from(file_len) {
                    return Ok(0);
                }
                if let Some(state) = slot {
                    state.read(image, buf, &mut self.pos, file_len)
                } else {
                    tracing::trace!("first read, creating streaming decoder");
                    let mut state = StreamState::new(image, &self.record)?;
                    let n = state.read(image, buf, &mut self.pos, file_len)?;
                    *slot = Some(state);
                    Ok(n)
                }
            }
        }
    }

    /// Reposition the logical read cursor and return the new position.
    ///
    /// The target is clamped into `[0, file_len]`; a positive offset from
    /// [`SeekFrom::End`] is an error. For uncompressed files this is O(1).
    /// For compressed files a forward seek decodes and discards up to the
    /// target, and a backward seek resets the decoder and replays from the
    /// start of the stream, an O(target) operation that is the accepted cost of
    /// streaming decompression. Seeking exactly to the end of the file
    /// never decodes.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let file_len = u64::from(self.record.file_len);
        let target = match pos {
            SeekFrom::Start(offset) => offset.min(file_len),
            SeekFrom::Current(delta) => {
                if delta >= 0 {
                    self.pos.saturating_add(delta as u64).min(file_len)
                } else {
                    self.pos.saturating_sub(delta.unsigned_abs())
                }
            }
            SeekFrom::End(delta) => {
                if delta > 0 {
                    return Err(FsError::InvalidSeek);
                }
                file_len.saturating_sub(delta.unsigned_abs())
            }
        };

        if let Mode::Direct { start, cursor } = &mut self.mode {
            *cursor = *start + target as usize;
            self.pos = target;
            return Ok(target);
        }

        if target < self.pos {
            if let Mode::Streaming(Some(state)) = &mut self.mode {
                tracing::trace!("backward seek to {}, resetting decoder", target);
                state.decoder.reset();
                state.cursor = state.start;
            }
            self.pos = 0;
        }

        if target == file_len {
            // No further bytes are needed, skip decoding entirely.
            if let Mode::Streaming(Some(state)) = &mut self.mode {
                state.cursor = state.start + state.len;
            }
            self.pos = file_len;
            return Ok(target);
        }

        // Decode and discard up to the target, capped at the remaining
        // distance so the cursor lands exactly on it.
        let mut scratch = [0u8; FEED_CHUNK];
        while self.pos < target {
            let want = ((target - self.pos) as usize).min(scratch.len());
            if self.read(&mut scratch[..want])? == 0 {
                return Err(FsError::Decode(
                    "compressed stream ended before the declared length".into(),
                ));
            }
        }
        Ok(self.pos)
    }

    /// Borrow the payload window directly for zero-copy consumption,
    /// bypassing the read/seek interface. Only uncompressed files have a
    /// contiguous byte window, so this returns `None` for any compressed
    /// file.
    pub fn raw_bytes(&self) -> Option<&'v [u8]> {
        match self.mode {
            Mode::Direct { start, .. } => self
                .volume
                .image()
                .slice(start, self.record.file_len as usize)
                .ok(),
            Mode::Streaming(_) => None,
        }
    }
}

impl io::Read for File<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        File::read(self, buf).map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

impl io::Seek for File<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        File::seek(self, pos).map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ImageBuilder;
    use crate::volume::Volume;

    fn volume() -> Volume {
        let bytes = ImageBuilder::new()
            .add_file("plain.txt", b"0123456789")
            .add_deflate_file("packed.txt", &b"abcdef".repeat(100))
            .build()
            .unwrap();
        Volume::mount_buffer(bytes).unwrap()
    }

    #[test]
    fn test_direct_read_and_tell() {
        let volume = volume();
        let mut file = volume.open("plain.txt").unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(file.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"0123");
        assert_eq!(file.tell(), 4);
        assert_eq!(file.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"4567");
    }

    #[test]
    fn test_direct_seek_is_exact() {
        let volume = volume();
        let mut file = volume.open("plain.txt").unwrap();
        assert_eq!(file.seek(SeekFrom::Start(7)).unwrap(), 7);
        assert_eq!(file.tell(), 7);
        let mut buf = [0u8; 8];
        assert_eq!(file.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"789");
    }

    #[test]
    fn test_seek_clamps_and_rejects() {
        let volume = volume();
        let mut file = volume.open("plain.txt").unwrap();
        // Past-the-end targets clamp to the file length.
        assert_eq!(file.seek(SeekFrom::Start(1000)).unwrap(), 10);
        // Backward past the start clamps to 0.
        assert_eq!(file.seek(SeekFrom::Current(-1000)).unwrap(), 0);
        // A positive end-relative offset is an error, with no effect.
        assert!(matches!(
            file.seek(SeekFrom::End(1)),
            Err(FsError::InvalidSeek)
        ));
        assert_eq!(file.tell(), 0);
        assert_eq!(file.seek(SeekFrom::End(-3)).unwrap(), 7);
    }

    #[test]
    fn test_empty_read_buffer() {
        let volume = volume();
        let mut file = volume.open("packed.txt").unwrap();
        assert_eq!(file.read(&mut []).unwrap(), 0);
        assert_eq!(file.tell(), 0);
    }

    #[test]
    fn test_io_trait_impls() {
        use std::io::{Read, Seek};
        let volume = volume();
        let mut file = volume.open("plain.txt").unwrap();
        let mut content = String::new();
        file.read_to_string(&mut content).unwrap();
        assert_eq!(content, "0123456789");
        file.rewind().unwrap();
        assert_eq!(file.tell(), 0);
    }
}
