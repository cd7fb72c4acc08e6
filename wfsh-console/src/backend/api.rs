//! Backend service traits
//!
//! Abstract interfaces over the backend flowsheet API and the show-control
//! service. The HTTP implementations live in `backend::http`; engine tests
//! substitute scripted in-memory doubles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use wfsh_common::model::{EntryFieldUpdate, EntryId, RawEntry, ShowId};

use crate::error::Result;

/// Backend flowsheet REST API.
///
/// All mutations return the authoritative record as the backend stored it;
/// the server-assigned `play_order` wins over whatever the console proposed.
#[async_trait]
pub trait FlowsheetApi: Send + Sync {
    /// Fetch one history page. Page 0 is the live tail (highest play_order);
    /// higher pages walk back in time.
    async fn fetch_page(
        &self,
        show_id: Option<ShowId>,
        page: u32,
        limit: u32,
    ) -> Result<Vec<RawEntry>>;

    /// Create an entry. `entry.id` is ignored by the backend; the returned
    /// record carries the assigned id and final position.
    async fn create_entry(&self, entry: RawEntry) -> Result<RawEntry>;

    /// Update a single field on an entry.
    async fn update_entry(&self, id: EntryId, update: EntryFieldUpdate) -> Result<RawEntry>;

    /// Delete an entry. Deleting an already-deleted entry is an error the
    /// engine treats as confirmation.
    async fn delete_entry(&self, id: EntryId) -> Result<()>;

    /// Move an entry to a new play_order position.
    async fn reorder_entry(&self, id: EntryId, new_play_order: i64) -> Result<RawEntry>;
}

/// Read-only show-control surface: who is on air right now.
#[async_trait]
pub trait ShowControl: Send + Sync {
    async fn current_show(&self) -> Result<OnAirStatus>;
}

/// Current on-air status from show control.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OnAirStatus {
    /// Whether a show is currently live
    pub live: bool,
    /// Current show id when live
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_id: Option<ShowId>,
    /// Current DJ name when live
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dj_name: Option<String>,
}
