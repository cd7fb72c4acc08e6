//! Local song queue item
//!
//! The queue is the DJ's holding pen: songs staged before air time. Items
//! live only in console memory (never persisted, never sent to the backend)
//! and are ordered by their position in the queue vector. Promotion to the
//! flowsheet is the only path out other than removal.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A song staged in the local queue.
///
/// Carries the song fields a `SongEntry` will need on promotion, but no
/// `play_order` or `show_id` since those exist only on the flowsheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Client-generated identity, stable for the life of the queue item.
    pub id: Uuid,
    pub track_title: String,
    pub artist_name: String,
    pub album_title: String,
    pub record_label: String,
    pub request_flag: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<super::RotationLevel>,
}

impl QueueItem {
    /// Create a queue item with a fresh client-side id.
    pub fn new(track_title: impl Into<String>, artist_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            track_title: track_title.into(),
            artist_name: artist_name.into(),
            album_title: String::new(),
            record_label: String::new(),
            request_flag: false,
            album_id: None,
            rotation_id: None,
            rotation: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_items_get_distinct_ids() {
        let a = QueueItem::new("Wire Static", "Phase Four");
        let b = QueueItem::new("Wire Static", "Phase Four");
        assert_ne!(a.id, b.id);
        assert_eq!(a.track_title, b.track_title);
    }
}
