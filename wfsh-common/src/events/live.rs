//! Live update channel wire types
//!
//! The backend pushes flowsheet changes over an SSE channel as flat records
//! tagged with the change type. Delivery is at-least-once and may arrive out
//! of order relative to REST responses; consumers must treat application as
//! idempotent.

use serde::{Deserialize, Serialize};

use crate::model::RawEntry;

/// One push from the backend live update channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LiveUpdate {
    Created { entry: RawEntry },
    Updated { entry: RawEntry },
    Deleted { entry: RawEntry },
    Reordered { entry: RawEntry },
}

impl LiveUpdate {
    /// Wire tag for this update.
    pub fn update_type(&self) -> &'static str {
        match self {
            LiveUpdate::Created { .. } => "created",
            LiveUpdate::Updated { .. } => "updated",
            LiveUpdate::Deleted { .. } => "deleted",
            LiveUpdate::Reordered { .. } => "reordered",
        }
    }

    /// The record carried by this update.
    pub fn entry(&self) -> &RawEntry {
        match self {
            LiveUpdate::Created { entry }
            | LiveUpdate::Updated { entry }
            | LiveUpdate::Deleted { entry }
            | LiveUpdate::Reordered { entry } => entry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_wire_form() {
        let json = r#"{
            "type": "created",
            "entry": {
                "id": 41,
                "play_order": 120,
                "show_id": 7,
                "track_title": "Wire Static"
            }
        }"#;

        let update: LiveUpdate = serde_json::from_str(json).unwrap();
        assert_eq!(update.update_type(), "created");
        assert_eq!(update.entry().id, Some(41));
        assert_eq!(update.entry().track_title.as_deref(), Some("Wire Static"));
    }

    #[test]
    fn deleted_needs_only_identity_fields() {
        let json = r#"{"type": "deleted", "entry": {"id": 9, "play_order": 30, "show_id": 7}}"#;
        let update: LiveUpdate = serde_json::from_str(json).unwrap();
        assert_eq!(update.update_type(), "deleted");
        assert_eq!(update.entry().id, Some(9));
    }

    #[test]
    fn unknown_type_tag_is_rejected() {
        let json = r#"{"type": "archived", "entry": {"id": 9}}"#;
        assert!(serde_json::from_str::<LiveUpdate>(json).is_err());
    }
}
