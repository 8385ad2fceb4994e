use std::sync::mpsc;

use hearth_core::{Event, WireCodec};
use thiserror::Error;
use tracing::{debug, error};

use super::{TransportCounts, TransportStats};
use crate::handler::{Handler, HandlerResult};

/// The consumer end of the queue has gone away.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("event queue is closed")]
pub struct QueueClosed;

/// Producer side of a concurrent FIFO that carries events between threads.
pub trait EventQueue: Send + Sync {
    fn put(&self, event: Event) -> Result<(), QueueClosed>;
}

impl EventQueue for flume::Sender<Event> {
    fn put(&self, event: Event) -> Result<(), QueueClosed> {
        self.send(event).map_err(|_| QueueClosed)
    }
}

impl EventQueue for mpsc::Sender<Event> {
    fn put(&self, event: Event) -> Result<(), QueueClosed> {
        self.send(event).map_err(|_| QueueClosed)
    }
}

impl EventQueue for mpsc::SyncSender<Event> {
    fn put(&self, event: Event) -> Result<(), QueueClosed> {
        self.send(event).map_err(|_| QueueClosed)
    }
}

impl EventQueue for tokio::sync::mpsc::UnboundedSender<Event> {
    fn put(&self, event: Event) -> Result<(), QueueClosed> {
        self.send(event).map_err(|_| QueueClosed)
    }
}

/// Build a flume channel, bounded when `capacity` is given.
///
/// A bounded queue blocks the producer while it is full.
pub fn event_queue(capacity: Option<usize>) -> (flume::Sender<Event>, flume::Receiver<Event>) {
    match capacity {
        Some(cap) => flume::bounded(cap),
        None => flume::unbounded(),
    }
}

/// Puts every event on a queue.
///
/// The event object itself crosses the queue, metadata context included.
/// Before the put the event is run through the wire codec. An event that
/// would not survive a pipe is logged but still enqueued.
pub struct QueueHandler<Q> {
    name: String,
    queue: Q,
    codec: WireCodec,
    stats: TransportStats,
}

impl<Q: EventQueue> QueueHandler<Q> {
    pub fn new(queue: Q) -> Self {
        Self {
            name: "transport:queue".to_string(),
            queue,
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
}

impl<Q: EventQueue> Handler for QueueHandler<Q> {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, event: &Event) -> HandlerResult {
        if let Err(err) = self.codec.encode(event) {
            error!(handler = %self.name, event = %event.kind_name(), error = %err, "Event is not encodable");
            self.stats.record_encode_error();
        }

        match self.queue.put(event.clone()) {
            Ok(()) => {
                debug!(handler = %self.name, event = %event.kind_name(), "Queued event");
                self.stats.record_delivered();
            }
            Err(err) => {
                error!(handler = %self.name, event = %event.kind_name(), error = %err, "Failed to queue event");
                self.stats.record_failed();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::{LogLevel, LogRecord, MetadataStore, TaskInfo};

    fn events(n: u32) -> Vec<Event> {
        (0..n)
            .map(|i| Event::task_started(TaskInfo::new("pkg", format!("task{}", i), i)))
            .collect()
    }

    #[test]
    fn test_fifo_order_flume() {
        let (tx, rx) = event_queue(None);
        let handler = QueueHandler::new(tx);
        let sent = events(5);
        for event in &sent {
            handler.handle(event).unwrap();
        }
        let received: Vec<Event> = rx.try_iter().collect();
        assert_eq!(received, sent);
        assert_eq!(handler.stats().delivered, 5);
    }

    #[test]
    fn test_std_channel_queue() {
        let (tx, rx) = mpsc::channel();
        let handler = QueueHandler::new(tx);
        let event = Event::task_failed(TaskInfo::new("a", "b", 2));
        handler.handle(&event).unwrap();
        assert_eq!(rx.recv().unwrap(), event);
    }

    #[test]
    fn test_context_crosses_queue() {
        let (tx, rx) = event_queue(Some(4));
        let handler = QueueHandler::new(tx);
        let metadata = MetadataStore::new().with_var("A", ["1"]).into_shared();
        let event = Event::task_started(TaskInfo::new("p", "t", 1)).with_context(metadata.clone());

        handler.handle(&event).unwrap();
        assert!(rx.recv().unwrap().context_is(&metadata));
    }

    #[test]
    fn test_unencodable_event_is_still_queued() {
        let (tx, rx) = event_queue(None);
        let handler = QueueHandler::new(tx).with_codec(WireCodec::new(8));
        let event = Event::log(LogRecord::new(LogLevel::Warn, "does not fit in eight bytes"));

        handler.handle(&event).unwrap();

        assert_eq!(rx.try_recv().unwrap(), event);
        let stats = handler.stats();
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.encode_errors, 1);
    }

    #[test]
    fn test_closed_queue_is_logged_not_raised() {
        let (tx, rx) = event_queue(None);
        drop(rx);
        let handler = QueueHandler::new(tx);
        assert!(handler.handle(&events(1)[0]).is_ok());
        assert_eq!(handler.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_tokio_consumer_receives_in_order() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let handler = QueueHandler::new(tx);
        let sent = events(3);

        let producer = {
            let sent = sent.clone();
            std::thread::spawn(move || {
                for event in &sent {
                    handler.handle(event).unwrap();
                }
            })
        };

        let mut received = Vec::new();
        while received.len() < sent.len() {
            match rx.recv().await {
                Some(event) => received.push(event),
                None => break,
            }
        }
        producer.join().unwrap();
        assert_eq!(received, sent);
    }
}
