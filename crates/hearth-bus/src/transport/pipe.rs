use std::io::Write;

use hearth_core::{Event, WireCodec};
use parking_lot::Mutex;
use tracing::{debug, error};

use super::{TransportCounts, TransportStats};
use crate::handler::{Handler, HandlerResult};

/// Writes one encoded record per event to a byte-stream endpoint.
///
/// The event is fully encoded before anything is written, so an encoding
/// failure writes zero bytes. Writes are blocking and flushed per record.
pub struct PipeHandler<W> {
    name: String,
    writer: Mutex<W>,
    codec: WireCodec,
    stats: TransportStats,
}

impl<W: Write + Send> PipeHandler<W> {
    pub fn new(writer: W) -> Self {
        Self {
            name: "transport:pipe".to_string(),
            writer: Mutex::new(writer),
            codec: WireCodec::default(),
            stats: TransportStats::default(),
        }
    }

    pub fn with_codec(mut self, codec: WireCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn stats(&self) -> TransportCounts {
        self.stats.snapshot()
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> Handler for PipeHandler<W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, event: &Event) -> HandlerResult {
        let bytes = match self.codec.encode(event) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!(handler = %self.name, event = %event.kind_name(), error = %err, "Failed to send event");
                self.stats.record_encode_error();
                self.stats.record_failed();
                return Ok(());
            }
        };

        let mut writer = self.writer.lock();
        match writer.write_all(&bytes).and_then(|()| writer.flush()) {
            Ok(()) => {
                debug!(handler = %self.name, event = %event.kind_name(), bytes = bytes.len(), "Sent event");
                self.stats.record_delivered();
            }
            Err(err) => {
                error!(handler = %self.name, event = %event.kind_name(), error = %err, "Failed to write event to pipe");
                self.stats.record_failed();
            }
        }
        Ok(())
    }
}
