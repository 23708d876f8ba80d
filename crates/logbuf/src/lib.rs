//! Bounded in-memory log capture.
//!
//! [`LogBuffer`] keeps the most recent tracing events in a ring so the admin
//! `/api/v1/logs` endpoint can serve them without touching disk. Attach it
//! to the subscriber stack with [`LogBuffer::layer`].

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Default ring capacity.
pub const DEFAULT_CAPACITY: usize = 1000;

/// One captured log event.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    /// Capture time.
    pub time: DateTime<Utc>,
    /// Level label (`INFO`, `WARN`, ...).
    pub level: String,
    /// Module path that emitted the event.
    pub target: String,
    /// Formatted message including structured fields.
    pub message: String,
}

/// Shared handle to the ring buffer.
#[derive(Clone)]
pub struct LogBuffer {
    inner: Arc<Mutex<Ring>>,
}

struct Ring {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl LogBuffer {
    /// Create a buffer holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Ring {
                entries: VecDeque::with_capacity(capacity.max(1)),
                capacity: capacity.max(1),
            })),
        }
    }

    /// A tracing layer that writes into this buffer.
    pub fn layer(&self) -> BufferLayer {
        BufferLayer {
            buffer: self.clone(),
        }
    }

    /// The most recent `n` entries, oldest first.
    pub fn last(&self, n: usize) -> Vec<LogEntry> {
        let ring = self.inner.lock();
        let take = n.min(ring.entries.len());
        ring.entries
            .iter()
            .skip(ring.entries.len() - take)
            .cloned()
            .collect()
    }

    fn push(&self, entry: LogEntry) {
        let mut ring = self.inner.lock();
        if ring.entries.len() == ring.capacity {
            ring.entries.pop_front();
        }
        ring.entries.push_back(entry);
    }
}

/// The tracing layer half of a [`LogBuffer`].
pub struct BufferLayer {
    buffer: LogBuffer,
}

impl<S: Subscriber> Layer<S> for BufferLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        self.buffer.push(LogEntry {
            time: Utc::now(),
            level: event.metadata().level().to_string(),
            target: event.metadata().target().to_string(),
            message: visitor.into_message(),
        });
    }
}

/// Collects the `message` field plus any structured fields into one line.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn into_message(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }

    fn push_field(&mut self, name: &str, value: impl fmt::Display) {
        use fmt::Write;
        let _ = write!(self.fields, " {name}={value}");
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_field(field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.push_field(field.name(), format_args!("{value:?}"));
        }
    }
}
