//! Streaming decompression seam
//!
//! File handles drive a decoder through a narrow incremental contract: feed
//! coded bytes in with `sink`, drain decoded bytes out with `poll`, confirm
//! the end marker with `finish`, and rewind to the initial state with
//! `reset` (backward seeks replay the stream from the start). The codec's
//! bit-level logic stays behind this trait.

use crate::error::{FsError, Result};
use crate::format::DeflateParams;
use flate2::{Decompress, FlushDecompress, Status};

/// Raw input accepted by [`StreamDecoder::sink`] but not yet consumed by
/// the inner decompressor is staged in a buffer of this size.
const STAGING_CAP: usize = 64;

/// An incremental decompressor owned by a single file handle.
///
/// All methods are synchronous and bounded by the bytes made available in
/// the call; implementations hold no global state.
pub trait StreamDecoder {
    /// Offer raw coded bytes; returns how many were accepted.
    fn sink(&mut self, input: &[u8]) -> Result<usize>;

    /// Decode previously sunk bytes into `output`; returns the byte count
    /// produced, which may be 0 when more input is needed.
    fn poll(&mut self, output: &mut [u8]) -> Result<usize>;

    /// Called once the raw input is exhausted and every logical byte has
    /// been produced; fails if the stream never reached its end marker.
    fn finish(&mut self) -> Result<()>;

    /// Return to the initial state, ready to decode from the stream start.
    fn reset(&mut self);
}

/// Raw-DEFLATE decoder over `flate2`'s resumable inflate state machine.
pub struct DeflateDecoder {
    inner: Decompress,
    staging: Vec<u8>,
    ended: bool,
}

impl DeflateDecoder {
    pub fn new(params: &DeflateParams) -> Self {
        tracing::trace!("deflate decoder, encoder window 2^{}", params.window_log2);
        DeflateDecoder {
            inner: Decompress::new(false),
            staging: Vec::with_capacity(STAGING_CAP),
            ended: false,
        }
    }
}

impl StreamDecoder for DeflateDecoder {
    fn sink(&mut self, input: &[u8]) -> Result<usize> {
        let take = input.len().min(STAGING_CAP - self.staging.len());
        self.staging.extend_from_slice(&input[..take]);
        Ok(take)
    }

    fn poll(&mut self, output: &mut [u8]) -> Result<usize> {
        if output.is_empty() || self.ended {
            return Ok(0);
        }
        let in_before = self.inner.total_in();
        let out_before = self.inner.total_out();
        let status = self
            .inner
            .decompress(&self.staging, output, FlushDecompress::None)
            .map_err(|e| FsError::Decode(e.to_string()))?;
        let consumed = (self.inner.total_in() - in_before) as usize;
        let produced = (self.inner.total_out() - out_before) as usize;
        self.staging.drain(..consumed);
        if status == Status::StreamEnd {
            self.ended = true;
        }
        Ok(produced)
    }

    fn finish(&mut self) -> Result<()> {
        if self.ended {
            return Ok(());
        }
        let mut scratch = [0u8; 16];
        let in_before = self.inner.total_in();
        let out_before = self.inner.total_out();
        let status = self
            .inner
            .decompress(&self.staging, &mut scratch, FlushDecompress::Finish)
            .map_err(|e| FsError::Decode(e.to_string()))?;
        let consumed = (self.inner.total_in() - in_before) as usize;
        self.staging.drain(..consumed);
        if self.inner.total_out() > out_before {
            return Err(FsError::Decode(
                "decoder produced bytes past the declared length".into(),
            ));
        }
        match status {
            Status::StreamEnd => {
                self.ended = true;
                Ok(())
            }
            _ => Err(FsError::Decode("missing end-of-stream marker".into())),
        }
    }

    fn reset(&mut self) {
        self.inner.reset(false);
        self.staging.clear();
        self.ended = false;
    }
}
