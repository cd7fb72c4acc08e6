//! Backend wire shape and classification into typed entries
//!
//! The backend flowsheet API and the live update channel both deliver flat
//! records where every field is optional. Classification decides the entry
//! variant from the fields present; records that fit no variant are rejected
//! so callers can log and drop them without aborting a batch.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::entry::{
    BreakpointEntry, Entry, MessageEntry, RotationLevel, ShowBlockEntry, SongEntry,
};

/// Flat backend record. Field presence determines the entry variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEntry {
    pub id: Option<i64>,
    pub play_order: Option<i64>,
    pub show_id: Option<i64>,
    pub track_title: Option<String>,
    pub artist_name: Option<String>,
    pub album_title: Option<String>,
    pub record_label: Option<String>,
    pub request_flag: Option<bool>,
    pub album_id: Option<i64>,
    pub rotation_id: Option<i64>,
    pub rotation_level: Option<String>,
    pub message: Option<String>,
    pub day: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub dj_name: Option<String>,
    pub is_start: Option<bool>,
}

impl From<&Entry> for RawEntry {
    /// Flatten a typed entry back to the wire shape the backend accepts.
    fn from(entry: &Entry) -> Self {
        let mut raw = RawEntry {
            id: Some(entry.id()),
            play_order: Some(entry.play_order()),
            show_id: Some(entry.show_id()),
            ..Default::default()
        };
        match entry {
            Entry::Song(s) => {
                raw.track_title = Some(s.track_title.clone());
                raw.artist_name = Some(s.artist_name.clone());
                raw.album_title = Some(s.album_title.clone());
                raw.record_label = Some(s.record_label.clone());
                raw.request_flag = Some(s.request_flag);
                raw.album_id = s.album_id;
                raw.rotation_id = s.rotation_id;
                raw.rotation_level = s.rotation.map(|r| r.code().to_string());
            }
            Entry::Message(m) => {
                raw.message = Some(m.message.clone());
            }
            Entry::Breakpoint(b) => {
                raw.message = Some(b.message.clone());
                raw.day = Some(b.day);
                raw.time = Some(b.time);
            }
            Entry::ShowBlock(s) => {
                raw.dj_name = Some(s.dj_name.clone());
                raw.day = Some(s.day);
                raw.time = Some(s.time);
                raw.is_start = Some(s.is_start);
            }
        }
        raw
    }
}

/// Record could not be mapped to any entry variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassificationError {
    #[error("entry is missing required field '{field}'")]
    MissingField { field: &'static str },

    #[error("entry {id} matches no known shape")]
    UnknownShape { id: i64 },
}

/// Classify a flat backend record into a typed entry.
///
/// Shape rules, checked in order:
/// - `track_title` present: song
/// - `is_start` present: show block
/// - `day` or `time` present: breakpoint (all of message/day/time required)
/// - `message` present: message
///
/// `id`, `play_order`, and `show_id` are required on every record. Song
/// text fields default to empty and `request_flag` to false when absent;
/// an unrecognized rotation code degrades to no rotation with a warning.
pub fn classify(raw: RawEntry) -> Result<Entry, ClassificationError> {
    let id = require(raw.id, "id")?;
    let play_order = require(raw.play_order, "play_order")?;
    let show_id = require(raw.show_id, "show_id")?;

    if let Some(track_title) = raw.track_title {
        let rotation = raw.rotation_level.as_deref().and_then(|code| {
            let parsed = RotationLevel::from_code(code);
            if parsed.is_none() {
                warn!(entry_id = id, code, "Unrecognized rotation code on song entry");
            }
            parsed
        });

        return Ok(Entry::Song(SongEntry {
            id,
            play_order,
            show_id,
            track_title,
            artist_name: raw.artist_name.unwrap_or_default(),
            album_title: raw.album_title.unwrap_or_default(),
            record_label: raw.record_label.unwrap_or_default(),
            request_flag: raw.request_flag.unwrap_or(false),
            album_id: raw.album_id,
            rotation_id: raw.rotation_id,
            rotation,
        }));
    }

    if let Some(is_start) = raw.is_start {
        return Ok(Entry::ShowBlock(ShowBlockEntry {
            id,
            play_order,
            show_id,
            dj_name: require(raw.dj_name, "dj_name")?,
            day: require(raw.day, "day")?,
            time: require(raw.time, "time")?,
            is_start,
        }));
    }

    if raw.day.is_some() || raw.time.is_some() {
        return Ok(Entry::Breakpoint(BreakpointEntry {
            id,
            play_order,
            show_id,
            message: require(raw.message, "message")?,
            day: require(raw.day, "day")?,
            time: require(raw.time, "time")?,
        }));
    }

    if let Some(message) = raw.message {
        return Ok(Entry::Message(MessageEntry {
            id,
            play_order,
            show_id,
            message,
        }));
    }

    Err(ClassificationError::UnknownShape { id })
}

fn require<T>(value: Option<T>, field: &'static str) -> Result<T, ClassificationError> {
    value.ok_or(ClassificationError::MissingField { field })
}
