//! Typed flowsheet entries and per-variant field editing rules

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Flowsheet entry identifier. Backend-assigned ids are positive;
/// locally created optimistic entries carry negative provisional ids
/// until the backend confirms them.
pub type EntryId = i64;

/// Show identifier assigned by the backend scheduler.
pub type ShowId = i64;

/// Rotation category for songs in active rotation.
///
/// Serialized with the station's single-letter codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RotationLevel {
    #[serde(rename = "H")]
    Heavy,
    #[serde(rename = "M")]
    Medium,
    #[serde(rename = "L")]
    Light,
    #[serde(rename = "S")]
    Singles,
}

impl RotationLevel {
    /// Parse a station rotation code. Unknown codes return `None`.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "H" => Some(RotationLevel::Heavy),
            "M" => Some(RotationLevel::Medium),
            "L" => Some(RotationLevel::Light),
            "S" => Some(RotationLevel::Singles),
            _ => None,
        }
    }

    /// Station code for this rotation level.
    pub fn code(&self) -> &'static str {
        match self {
            RotationLevel::Heavy => "H",
            RotationLevel::Medium => "M",
            RotationLevel::Light => "L",
            RotationLevel::Singles => "S",
        }
    }
}

impl std::fmt::Display for RotationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A played (or about to play) song on the flowsheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongEntry {
    pub id: EntryId,
    pub play_order: i64,
    pub show_id: ShowId,
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
    pub rotation: Option<RotationLevel>,
}

/// Free-form talkset / PSA / announcement marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEntry {
    pub id: EntryId,
    pub play_order: i64,
    pub show_id: ShowId,
    pub message: String,
}

/// Scheduled breakpoint (top-of-hour ID, news block) with its wall-clock slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakpointEntry {
    pub id: EntryId,
    pub play_order: i64,
    pub show_id: ShowId,
    pub message: String,
    pub day: NaiveDate,
    pub time: NaiveTime,
}

/// Show boundary marker. `is_start` distinguishes sign-on from sign-off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowBlockEntry {
    pub id: EntryId,
    pub play_order: i64,
    pub show_id: ShowId,
    pub dj_name: String,
    pub day: NaiveDate,
    pub time: NaiveTime,
    pub is_start: bool,
}

/// A single flowsheet entry.
///
/// Every entry carries `id`, `play_order`, and `show_id`; the remaining
/// fields depend on the variant. Serialized with an internal `kind` tag so
/// renderers can dispatch on entry type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entry {
    Song(SongEntry),
    Message(MessageEntry),
    Breakpoint(BreakpointEntry),
    ShowBlock(ShowBlockEntry),
}

/// Entry variant discriminator, used for dispatch and echo matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum EntryKind {
    Song,
    Message,
    Breakpoint,
    ShowBlock,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Song => "Song",
            EntryKind::Message => "Message",
            EntryKind::Breakpoint => "Breakpoint",
            EntryKind::ShowBlock => "ShowBlock",
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single-field edit request, validated per entry variant.
///
/// Songs accept the five song fields; messages and breakpoints accept
/// `message`; show blocks accept nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum EntryFieldUpdate {
    TrackTitle(String),
    ArtistName(String),
    AlbumTitle(String),
    RecordLabel(String),
    RequestFlag(bool),
    Message(String),
}

impl EntryFieldUpdate {
    /// Wire name of the field being updated.
    pub fn field_name(&self) -> &'static str {
        match self {
            EntryFieldUpdate::TrackTitle(_) => "track_title",
            EntryFieldUpdate::ArtistName(_) => "artist_name",
            EntryFieldUpdate::AlbumTitle(_) => "album_title",
            EntryFieldUpdate::RecordLabel(_) => "record_label",
            EntryFieldUpdate::RequestFlag(_) => "request_flag",
            EntryFieldUpdate::Message(_) => "message",
        }
    }
}

/// Rejected field update: the field is not defined for the entry variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("field '{field}' is not editable on a {entry} entry")]
pub struct FieldUpdateError {
    pub entry: &'static str,
    pub field: &'static str,
}

impl Entry {
    pub fn id(&self) -> EntryId {
        match self {
            Entry::Song(e) => e.id,
            Entry::Message(e) => e.id,
            Entry::Breakpoint(e) => e.id,
            Entry::ShowBlock(e) => e.id,
        }
    }

    pub fn play_order(&self) -> i64 {
        match self {
            Entry::Song(e) => e.play_order,
            Entry::Message(e) => e.play_order,
            Entry::Breakpoint(e) => e.play_order,
            Entry::ShowBlock(e) => e.play_order,
        }
    }

    pub fn show_id(&self) -> ShowId {
        match self {
            Entry::Song(e) => e.show_id,
            Entry::Message(e) => e.show_id,
            Entry::Breakpoint(e) => e.show_id,
            Entry::ShowBlock(e) => e.show_id,
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            Entry::Song(_) => EntryKind::Song,
            Entry::Message(_) => EntryKind::Message,
            Entry::Breakpoint(_) => EntryKind::Breakpoint,
            Entry::ShowBlock(_) => EntryKind::ShowBlock,
        }
    }

    /// Primary display text, used for logging and natural-key matching.
    pub fn headline(&self) -> &str {
        match self {
            Entry::Song(e) => &e.track_title,
            Entry::Message(e) => &e.message,
            Entry::Breakpoint(e) => &e.message,
            Entry::ShowBlock(e) => &e.dj_name,
        }
    }

    pub fn set_id(&mut self, id: EntryId) {
        match self {
            Entry::Song(e) => e.id = id,
            Entry::Message(e) => e.id = id,
            Entry::Breakpoint(e) => e.id = id,
            Entry::ShowBlock(e) => e.id = id,
        }
    }

    pub fn set_play_order(&mut self, play_order: i64) {
        match self {
            Entry::Song(e) => e.play_order = play_order,
            Entry::Message(e) => e.play_order = play_order,
            Entry::Breakpoint(e) => e.play_order = play_order,
            Entry::ShowBlock(e) => e.play_order = play_order,
        }
    }

    /// Whether this entry still carries a provisional (locally assigned) id.
    pub fn is_provisional(&self) -> bool {
        self.id() < 0
    }

    /// Apply a single-field update, returning the prior value so callers
    /// can undo the edit if the backend rejects it.
    ///
    /// Fields not defined for the variant are rejected; `play_order`,
    /// `id`, and `show_id` are never editable through this path.
    pub fn apply_field(
        &mut self,
        update: &EntryFieldUpdate,
    ) -> std::result::Result<EntryFieldUpdate, FieldUpdateError> {
        use EntryFieldUpdate::*;

        match (&mut *self, update) {
            (Entry::Song(e), TrackTitle(v)) => Ok(TrackTitle(std::mem::replace(
                &mut e.track_title,
                v.clone(),
            ))),
            (Entry::Song(e), ArtistName(v)) => Ok(ArtistName(std::mem::replace(
                &mut e.artist_name,
                v.clone(),
            ))),
            (Entry::Song(e), AlbumTitle(v)) => Ok(AlbumTitle(std::mem::replace(
                &mut e.album_title,
                v.clone(),
            ))),
            (Entry::Song(e), RecordLabel(v)) => Ok(RecordLabel(std::mem::replace(
                &mut e.record_label,
                v.clone(),
            ))),
            (Entry::Song(e), RequestFlag(v)) => {
                let prior = e.request_flag;
                e.request_flag = *v;
                Ok(RequestFlag(prior))
            }
            (Entry::Message(e), Message(v)) => {
                Ok(Message(std::mem::replace(&mut e.message, v.clone())))
            }
            (Entry::Breakpoint(e), Message(v)) => {
                Ok(Message(std::mem::replace(&mut e.message, v.clone())))
            }
            _ => Err(FieldUpdateError {
                entry: self.kind().as_str(),
                field: update.field_name(),
            }),
        }
    }
}
