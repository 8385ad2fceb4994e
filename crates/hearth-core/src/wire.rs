//! Wire contract for cross-process event transport.
//!
//! Records are bincode 2 (serde mode, standard config). The encoding is
//! self-framing: a decoder consumes exactly one record per call without any
//! length prefix or delimiter added here, so a pipe carries bare concatenated
//! records.
//!
//! ```text
//! producer ── PipeHandler ──► [rec][rec][rec]... ──► EventReader ── consumer
//! ```

use std::io::{BufRead, Read, Write};

use thiserror::Error;

use crate::config::TransportConfig;
use crate::events::Event;

/// Upper bound on one encoded record unless configured otherwise (1 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Hard ceiling for `max_frame_bytes` (64 MiB).
///
/// Decoding runs under a bincode byte limit of this size, so a length prefix
/// claiming more than the ceiling is rejected before anything is allocated.
pub const FRAME_BYTES_CEILING: usize = 64 * 1024 * 1024;

fn decode_config() -> impl bincode::config::Config {
    bincode::config::standard().with_limit::<FRAME_BYTES_CEILING>()
}

/// Errors raised while encoding or decoding records.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("failed to encode event: {0}")]
    Encode(String),

    #[error("encoded event is {size} bytes, exceeding the {limit} byte frame limit")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("failed to decode event: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encoder/decoder for single event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireCodec {
    max_frame_bytes: usize,
}

impl Default for WireCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl From<&TransportConfig> for WireCodec {
    fn from(config: &TransportConfig) -> Self {
        Self::new(config.max_frame_bytes)
    }
}

impl WireCodec {
    /// Codec limited to `max_frame_bytes` per record, capped at
    /// [`FRAME_BYTES_CEILING`].
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            max_frame_bytes: max_frame_bytes.min(FRAME_BYTES_CEILING),
        }
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// Encode one event into a complete record.
    ///
    /// Nothing is produced on failure, so callers never emit a partial record.
    pub fn encode(&self, event: &Event) -> Result<Vec<u8>, WireError> {
        let bytes = bincode::serde::encode_to_vec(event, bincode::config::standard())
            .map_err(|e| WireError::Encode(e.to_string()))?;

        if bytes.len() > self.max_frame_bytes {
            return Err(WireError::FrameTooLarge {
                size: bytes.len(),
                limit: self.max_frame_bytes,
            });
        }
        Ok(bytes)
    }

    /// Encode `event` and write it with a single `write_all`.
    pub fn write_to<W: Write + ?Sized>(
        &self,
        event: &Event,
        writer: &mut W,
    ) -> Result<usize, WireError> {
        let bytes = self.encode(event)?;
        writer.write_all(&bytes)?;
        Ok(bytes.len())
    }

    /// Decode the first record in `bytes`, returning it and the bytes consumed.
    pub fn decode(&self, bytes: &[u8]) -> Result<(Event, usize), WireError> {
        let frame = &bytes[..bytes.len().min(self.max_frame_bytes)];
        bincode::serde::decode_from_slice(frame, decode_config())
            .map_err(|e| WireError::Decode(e.to_string()))
    }
}

/// Decodes a stream of concatenated records.
///
/// Yields `None` at a clean end of stream; a record cut off mid-way is an
/// error rather than a silent stop.
pub struct EventReader<R> {
    inner: R,
    codec: WireCodec,
}

impl<R: BufRead> EventReader<R> {
    pub fn new(inner: R, codec: WireCodec) -> Self {
        Self { inner, codec }
    }

    pub fn next_event(&mut self) -> Result<Option<Event>, WireError> {
        if self.inner.fill_buf()?.is_empty() {
            return Ok(None);
        }

        let mut frame = (&mut self.inner).take(self.codec.max_frame_bytes as u64);
        let event = bincode::serde::decode_from_std_read(&mut frame, decode_config())
            .map_err(|e| WireError::Decode(e.to_string()))?;
        Ok(Some(event))
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: BufRead> Iterator for EventReader<R> {
    type Item = Result<Event, WireError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_event().transpose()
    }
}
