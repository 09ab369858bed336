//! Event types for the shelf event system
//!
//! Job lifecycle and export write notifications are broadcast over an
//! [`EventBus`] so status pollers, log sinks and tests can observe a job
//! without being wired into the executor call chain.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Shelf event types
///
/// Serialized with an internal `type` tag so events can be forwarded as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ShelfEvent {
    /// A job began (fresh start or resume)
    JobStarted {
        job_id: String,
        /// Export file the job reads
        library_path: String,
        /// True when continuing from a stored checkpoint
        resumed: bool,
        timestamp: DateTime<Utc>,
    },

    /// Batched progress within a phase
    JobProgress {
        job_id: String,
        current: usize,
        total: usize,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Log line emitted through the job reporter
    JobLog {
        job_id: String,
        level: String,
        message: String,
        detail: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Terminal job outcome
    JobFinished {
        job_id: String,
        /// `completed`, `canceled` or `failed`
        state: String,
        summary: String,
        timestamp: DateTime<Utc>,
    },

    /// Export file rewritten by write-back
    LibraryWritten {
        library_path: String,
        updated_count: usize,
        backup_path: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl ShelfEvent {
    /// Event type name (matches the serialized `type` tag)
    pub fn event_type(&self) -> &str {
        match self {
            ShelfEvent::JobStarted { .. } => "JobStarted",
            ShelfEvent::JobProgress { .. } => "JobProgress",
            ShelfEvent::JobLog { .. } => "JobLog",
            ShelfEvent::JobFinished { .. } => "JobFinished",
            ShelfEvent::LibraryWritten { .. } => "LibraryWritten",
        }
    }

    /// Job id carried by job-scoped events
    pub fn job_id(&self) -> Option<&str> {
        match self {
            ShelfEvent::JobStarted { job_id, .. }
            | ShelfEvent::JobProgress { job_id, .. }
            | ShelfEvent::JobLog { job_id, .. }
            | ShelfEvent::JobFinished { job_id, .. } => Some(job_id),
            ShelfEvent::LibraryWritten { .. } => None,
        }
    }
}

/// Broadcast bus for [`ShelfEvent`]s
///
/// Thin wrapper over a tokio broadcast channel. Slow subscribers lose the
/// oldest events once `capacity` is exceeded.
pub struct EventBus {
    tx: broadcast::Sender<ShelfEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use shelf_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<ShelfEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ShelfEvent,
    ) -> Result<usize, broadcast::error::SendError<ShelfEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ShelfEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}
