//! Event types for the WFSH event system
//!
//! Provides shared event definitions and EventBus for the WFSH services.

mod flowsheet_types;
mod live;

pub use flowsheet_types::{ChannelStatus, MutationKind, SequenceChangeTrigger};
pub use live::LiveUpdate;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::model::{Entry, EntryId, QueueItem, ShowId};

/// WFSH console event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission to
/// connected renderers. All console-originated notifications use this central
/// enum for type safety and exhaustive matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FlowsheetEvent {
    /// The ordered sequence changed
    ///
    /// Triggers:
    /// - SSE: Renderers re-request or patch their entry list
    /// - Diagnostics: Change audit trail
    SequenceChanged {
        /// Show whose sequence changed (None for cross-show rebuilds)
        show_id: Option<ShowId>,
        /// Why the sequence changed
        trigger: SequenceChangeTrigger,
        /// When the change was applied
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Full flowsheet state (sent after each applied mutation)
    ///
    /// Triggers:
    /// - SSE: Renderers replace their entry and queue lists
    FlowsheetStateUpdate {
        /// Update timestamp
        timestamp: chrono::DateTime<chrono::Utc>,
        /// Entries in ascending play_order
        entries: Vec<Entry>,
        /// Local queue in presentation order
        queue: Vec<QueueItem>,
    },

    /// An optimistic entry was confirmed by the backend
    ///
    /// Triggers:
    /// - SSE: Renderers swap the provisional id for the authoritative one
    EntryConfirmed {
        /// Correlation id of the originating intent
        correlation_id: Uuid,
        /// Provisional id the entry carried while pending
        provisional_id: EntryId,
        /// Backend-assigned id
        entry_id: EntryId,
        /// When confirmation was applied
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A local mutation failed and was rolled back
    ///
    /// Triggers:
    /// - SSE: Renderers surface the failure to the DJ
    MutationFailed {
        /// Correlation id of the failed intent
        correlation_id: Uuid,
        /// Kind of backend mutation that failed
        operation: MutationKind,
        /// Machine-readable backend error code, when one was returned
        code: Option<String>,
        /// Human-readable failure description
        message: String,
        /// When the rollback was applied
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Live update channel connectivity changed
    ///
    /// Triggers:
    /// - SSE: Renderers show the degraded / resyncing indicator
    ChannelStatusChanged {
        /// New channel status
        status: ChannelStatus,
        /// Reconnection attempts since the channel was lost
        retry_count: u32,
        /// When status changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A history page was fetched and merged
    ///
    /// Triggers:
    /// - SSE: Renderers extend their scrollback
    PageLoaded {
        /// Page number that was merged
        page: u32,
        /// Entries actually added (duplicates skipped)
        added: usize,
        /// When the merge completed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Full resynchronization with the backend started
    ResyncStarted {
        /// When resync started
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Full resynchronization with the backend completed
    ///
    /// Triggers:
    /// - SSE: Renderers replace local state wholesale
    ResyncCompleted {
        /// Entries in the rebuilt sequence
        entries: usize,
        /// Pending optimistic operations replayed after the rebuild
        pending_replayed: usize,
        /// When resync completed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Initial state sent on SSE connection
    InitialState {
        /// When initial state was sent
        timestamp: chrono::DateTime<chrono::Utc>,
        /// Entries in ascending play_order
        entries: Vec<Entry>,
        /// Local queue in presentation order
        queue: Vec<QueueItem>,
        /// Current live update channel status
        channel: ChannelStatus,
    },
}

impl FlowsheetEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            FlowsheetEvent::SequenceChanged { .. } => "SequenceChanged",
            FlowsheetEvent::FlowsheetStateUpdate { .. } => "FlowsheetStateUpdate",
            FlowsheetEvent::EntryConfirmed { .. } => "EntryConfirmed",
            FlowsheetEvent::MutationFailed { .. } => "MutationFailed",
            FlowsheetEvent::ChannelStatusChanged { .. } => "ChannelStatusChanged",
            FlowsheetEvent::PageLoaded { .. } => "PageLoaded",
            FlowsheetEvent::ResyncStarted { .. } => "ResyncStarted",
            FlowsheetEvent::ResyncCompleted { .. } => "ResyncCompleted",
            FlowsheetEvent::InitialState { .. } => "InitialState",
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for console-wide events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use wfsh_common::events::{EventBus, FlowsheetEvent, SequenceChangeTrigger};
/// use std::sync::Arc;
///
/// let event_bus = Arc::new(EventBus::new(1000));
///
/// // Subscribe to events
/// let mut rx = event_bus.subscribe();
///
/// // Emit an event
/// event_bus.emit(FlowsheetEvent::SequenceChanged {
///     show_id: Some(7),
///     trigger: SequenceChangeTrigger::LocalAdd,
///     timestamp: chrono::Utc::now(),
/// }).ok();
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<FlowsheetEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Capacity bounds how many events a slow subscriber may lag before it
    /// starts receiving `Lagged` errors; 1000 is comfortable for desktop use,
    /// tests use 10-100.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Returns a receiver that will receive all events emitted after
    /// subscription. Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<FlowsheetEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: FlowsheetEvent,
    ) -> Result<usize, broadcast::error::SendError<FlowsheetEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    ///
    /// Used for notifications where it's acceptable if no renderer is
    /// currently connected.
    pub fn emit_lossy(&self, event: FlowsheetEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    ///
    /// Useful for debugging and monitoring
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
