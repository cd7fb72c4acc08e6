//! SSE broadcaster for real-time renderer updates
//!
//! Each connecting renderer receives an `InitialState` keyframe built from
//! the engine snapshot, then the live event stream from the bus.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};
use wfsh_common::events::{EventBus, FlowsheetEvent};

use crate::flowsheet::FlowsheetEngine;

/// SSE broadcaster managing renderer connections
#[derive(Clone)]
pub struct SseBroadcaster {
    event_bus: Arc<EventBus>,
    engine: Arc<FlowsheetEngine>,
}

impl SseBroadcaster {
    pub fn new(event_bus: Arc<EventBus>, engine: Arc<FlowsheetEngine>) -> Self {
        Self { event_bus, engine }
    }

    /// Get current number of connected renderers
    pub fn client_count(&self) -> usize {
        self.event_bus.subscriber_count()
    }

    /// Create an Axum SSE response for a new renderer connection
    ///
    /// The subscription is taken before the snapshot; a mutation landing in
    /// between then appears in both the keyframe and the replayed event,
    /// which is harmless because state updates carry full state.
    pub async fn handle_sse_connection(
        &self,
    ) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
        let mut rx = self.event_bus.subscribe();
        let snapshot = self.engine.snapshot().await;

        info!(
            "New SSE renderer connected, total clients: {}",
            self.client_count()
        );

        let initial = FlowsheetEvent::InitialState {
            timestamp: chrono::Utc::now(),
            entries: snapshot.entries,
            queue: snapshot.queue,
            channel: snapshot.channel,
        };

        let stream = async_stream::stream! {
            if let Some(event) = to_sse_event(&initial) {
                yield Ok(event);
            }

            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Some(event) = to_sse_event(&event) {
                            yield Ok(event);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // The next full-state update lets the renderer
                        // recover whatever it missed.
                        warn!("SSE renderer lagged, skipped {} events", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        Sse::new(stream).keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(30))
                .text("keep-alive"),
        )
    }
}

/// Convert a bus event to an axum SSE event named by its type tag.
fn to_sse_event(event: &FlowsheetEvent) -> Option<Event> {
    Event::default().event(event.event_type()).json_data(event).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wfsh_common::events::{ChannelStatus, MutationKind, SequenceChangeTrigger};

    #[test]
    fn bus_events_convert_to_sse_frames() {
        let events = vec![
            FlowsheetEvent::SequenceChanged {
                show_id: Some(7),
                trigger: SequenceChangeTrigger::LocalAdd,
                timestamp: chrono::Utc::now(),
            },
            FlowsheetEvent::MutationFailed {
                correlation_id: uuid::Uuid::new_v4(),
                operation: MutationKind::Create,
                code: None,
                message: "backend unavailable".to_string(),
                timestamp: chrono::Utc::now(),
            },
            FlowsheetEvent::InitialState {
                timestamp: chrono::Utc::now(),
                entries: Vec::new(),
                queue: Vec::new(),
                channel: ChannelStatus::Degraded,
            },
        ];

        for event in events {
            assert!(to_sse_event(&event).is_some(), "{}", event.event_type());
        }
    }
}
