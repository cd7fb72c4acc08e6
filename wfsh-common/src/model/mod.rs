//! Flowsheet entry model
//!
//! Provides the typed entry representation shared by all WFSH services:
//! - `Entry` and its four variants (song, message, breakpoint, show block)
//! - `RawEntry` wire shape and classification into typed entries
//! - `QueueItem` for the local (never persisted) song queue

mod entry;
mod queue;
mod raw;

pub use entry::{
    BreakpointEntry, Entry, EntryFieldUpdate, EntryId, EntryKind, FieldUpdateError, MessageEntry,
    RotationLevel, ShowBlockEntry, ShowId, SongEntry,
};
pub use queue::QueueItem;
pub use raw::{classify, ClassificationError, RawEntry};
