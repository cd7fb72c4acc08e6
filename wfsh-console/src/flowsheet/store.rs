//! Ordered sequence store
//!
//! Canonical in-memory flowsheet state: one vector of entries in ascending
//! `play_order` plus the local song queue. The store is synchronous; the
//! reconciliation engine owns it behind a single async lock and is its only
//! writer.
//!
//! Ordering discipline is gap numbering: entries are spaced `ORDER_SPACING`
//! apart, interior inserts take the neighbor midpoint, and when a gap is
//! exhausted the whole sequence is locally resequenced to even spacing and
//! the placement retried. Local positions are projections; backend-assigned
//! positions reassert on confirmation and resync.
//!
//! Invariants maintained here:
//! - `play_order` strictly ascending, entry ids unique
//! - the tail of the vector is the "top" of the on-air view (next to play)
//! - entries never move between shows; show blocks never move at all
//! - field updates never change an entry's position

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use wfsh_common::model::{Entry, EntryFieldUpdate, EntryId, QueueItem, ShowId, SongEntry};

use crate::error::{Error, Result};

/// Nominal gap between adjacent play_order values.
pub const ORDER_SPACING: i64 = 10;

/// Where a moved entry should land, relative to the ascending sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveTarget {
    /// Highest play_order (next to play)
    Top,
    /// Immediately earlier than the given entry
    Before(EntryId),
    /// Immediately later than the given entry
    After(EntryId),
}

/// Result of a queue promotion: the inserted entry plus what rollback needs
/// to restore the queue exactly.
#[derive(Debug, Clone)]
pub struct Promotion {
    pub entry: Entry,
    pub queue_index: usize,
    pub item: QueueItem,
}

/// The flowsheet sequence plus the local song queue.
#[derive(Debug, Default)]
pub struct SequenceStore {
    /// Ascending play_order; last element is the top of the on-air view
    entries: Vec<Entry>,
    /// Local-only holding pen, index order is presentation order
    queue: Vec<QueueItem>,
}

impl SequenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================
    // Reads
    // ========================================

    /// Entries in ascending play_order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Local queue in presentation order.
    pub fn queue(&self) -> &[QueueItem] {
        &self.queue
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.index_of(id).is_some()
    }

    pub fn get(&self, id: EntryId) -> Option<&Entry> {
        self.index_of(id).map(|idx| &self.entries[idx])
    }

    /// Consistency check used by tests: strictly ascending play_order and
    /// unique entry ids.
    pub fn is_consistent(&self) -> bool {
        let ascending = self
            .entries
            .windows(2)
            .all(|w| w[0].play_order() < w[1].play_order());
        let mut ids: Vec<EntryId> = self.entries.iter().map(|e| e.id()).collect();
        ids.sort_unstable();
        ids.dedup();
        ascending && ids.len() == self.entries.len()
    }

    fn index_of(&self, id: EntryId) -> Option<usize> {
        self.entries.iter().position(|e| e.id() == id)
    }

    // ========================================
    // Local insertion
    // ========================================

    /// Insert at the top of the sequence (highest play_order).
    ///
    /// Returns the assigned play_order.
    pub fn insert_top(&mut self, mut entry: Entry) -> Result<i64> {
        self.reject_duplicate(entry.id())?;
        let play_order = self.next_top_order();
        entry.set_play_order(play_order);
        self.entries.push(entry);
        Ok(play_order)
    }

    /// Insert directly after an existing entry in the broadcast sequence.
    ///
    /// The anchor must exist and belong to the same show. Returns the
    /// assigned play_order.
    pub fn insert_after(&mut self, mut entry: Entry, after_id: EntryId) -> Result<i64> {
        self.reject_duplicate(entry.id())?;
        let idx = self
            .index_of(after_id)
            .ok_or_else(|| Error::OrderingConflict(format!("anchor entry {after_id} is not in the sequence")))?;
        if self.entries[idx].show_id() != entry.show_id() {
            return Err(Error::OrderingConflict(format!(
                "entry for show {} cannot be placed inside show {}",
                entry.show_id(),
                self.entries[idx].show_id()
            )));
        }

        let play_order = match self.slot_above(idx) {
            Some(po) => po,
            None => {
                self.resequence();
                self.slot_above(idx)
                    .ok_or_else(|| Error::Internal("no slot available after resequencing".to_string()))?
            }
        };
        entry.set_play_order(play_order);
        self.entries.insert(idx + 1, entry);
        Ok(play_order)
    }

    /// Insert preserving ascending order at the entry's own play_order.
    ///
    /// Used for authoritative records whose position the backend has already
    /// decided. The caller must have ruled out a duplicate id.
    fn insert_sorted(&mut self, entry: Entry) {
        let pos = self
            .entries
            .partition_point(|e| e.play_order() <= entry.play_order());
        self.entries.insert(pos, entry);
    }

    /// Insert at the entry's own play_order, renumbering if that position is
    /// already taken. A backend-assigned position can collide with a local
    /// optimistic one; the sequence stays strictly ascending and the entry
    /// lands directly after the occupant.
    fn insert_resolving_ties(&mut self, entry: Entry) {
        let collides = self
            .entries
            .iter()
            .any(|e| e.play_order() == entry.play_order());
        self.insert_sorted(entry);
        if collides {
            self.resequence();
        }
    }

    // ========================================
    // Removal
    // ========================================

    /// Remove an entry. Absent ids are a quiet no-op so that remote deletes
    /// and local deletes racing each other converge.
    pub fn remove(&mut self, id: EntryId) -> Option<Entry> {
        self.index_of(id).map(|idx| self.entries.remove(idx))
    }

    // ========================================
    // Movement
    // ========================================

    /// Move an entry to a new position, renumbering via the gap strategy.
    ///
    /// Returns the entry's new play_order (what the backend reorder call
    /// should request). Missing ids, cross-show targets, and show blocks are
    /// ordering conflicts.
    pub fn move_entry(&mut self, id: EntryId, target: MoveTarget) -> Result<i64> {
        let from = self
            .index_of(id)
            .ok_or_else(|| Error::OrderingConflict(format!("entry {id} is not in the sequence")))?;
        if matches!(self.entries[from], Entry::ShowBlock(_)) {
            return Err(Error::OrderingConflict(format!(
                "show block {id} cannot be moved"
            )));
        }

        let show_id = self.entries[from].show_id();
        match target {
            MoveTarget::Before(t) | MoveTarget::After(t) => {
                if t == id {
                    return Ok(self.entries[from].play_order());
                }
                let ti = self.index_of(t).ok_or_else(|| {
                    Error::OrderingConflict(format!("target entry {t} is not in the sequence"))
                })?;
                if self.entries[ti].show_id() != show_id {
                    return Err(Error::OrderingConflict(format!(
                        "entry {id} cannot move into show {}",
                        self.entries[ti].show_id()
                    )));
                }
            }
            MoveTarget::Top => {
                if let Some(last) = self.entries.last() {
                    if last.id() != id && last.show_id() != show_id {
                        return Err(Error::OrderingConflict(format!(
                            "entry {id} cannot move above show {}",
                            last.show_id()
                        )));
                    }
                }
            }
        }

        let entry = self.entries.remove(from);
        self.place(entry, target)
    }

    fn place(&mut self, mut entry: Entry, target: MoveTarget) -> Result<i64> {
        let (idx, play_order) = match self.slot_for(target)? {
            Some(slot) => slot,
            None => {
                self.resequence();
                self.slot_for(target)?
                    .ok_or_else(|| Error::Internal("no slot available after resequencing".to_string()))?
            }
        };
        entry.set_play_order(play_order);
        self.entries.insert(idx, entry);
        Ok(play_order)
    }

    fn slot_for(&self, target: MoveTarget) -> Result<Option<(usize, i64)>> {
        Ok(match target {
            MoveTarget::Top => Some((self.entries.len(), self.next_top_order())),
            MoveTarget::After(t) => {
                let ti = self.index_of(t).ok_or_else(|| {
                    Error::OrderingConflict(format!("target entry {t} is not in the sequence"))
                })?;
                self.slot_above(ti).map(|po| (ti + 1, po))
            }
            MoveTarget::Before(t) => {
                let ti = self.index_of(t).ok_or_else(|| {
                    Error::OrderingConflict(format!("target entry {t} is not in the sequence"))
                })?;
                self.slot_below(ti).map(|po| (ti, po))
            }
        })
    }

    fn next_top_order(&self) -> i64 {
        self.entries
            .last()
            .map(|e| e.play_order() + ORDER_SPACING)
            .unwrap_or(ORDER_SPACING)
    }

    /// Midpoint slot between `idx` and its successor, or `None` when the
    /// gap is exhausted.
    fn slot_above(&self, idx: usize) -> Option<i64> {
        let lo = self.entries[idx].play_order();
        match self.entries.get(idx + 1) {
            None => Some(lo + ORDER_SPACING),
            Some(next) => {
                let hi = next.play_order();
                if hi - lo >= 2 {
                    Some(lo + (hi - lo) / 2)
                } else {
                    None
                }
            }
        }
    }

    /// Midpoint slot between `idx` and its predecessor, or `None` when the
    /// gap is exhausted.
    fn slot_below(&self, idx: usize) -> Option<i64> {
        let hi = self.entries[idx].play_order();
        if idx == 0 {
            return Some(hi - ORDER_SPACING);
        }
        let lo = self.entries[idx - 1].play_order();
        if hi - lo >= 2 {
            Some(lo + (hi - lo) / 2)
        } else {
            None
        }
    }

    /// Renumber the whole sequence to even `ORDER_SPACING` gaps, preserving
    /// order. Local positions diverge from the backend's until the next
    /// confirmation or resync reasserts them.
    fn resequence(&mut self) {
        for (idx, entry) in self.entries.iter_mut().enumerate() {
            entry.set_play_order((idx as i64 + 1) * ORDER_SPACING);
        }
    }

    // ========================================
    // Field updates
    // ========================================

    /// Apply a single-field update, returning the prior value for rollback.
    /// Position fields are untouchable through this path.
    pub fn update_field(
        &mut self,
        id: EntryId,
        update: &EntryFieldUpdate,
    ) -> Result<EntryFieldUpdate> {
        let idx = self
            .index_of(id)
            .ok_or_else(|| Error::NotFound(format!("entry {id}")))?;
        Ok(self.entries[idx].apply_field(update)?)
    }

    // ========================================
    // Reconciliation support
    // ========================================

    /// Swap an optimistic entry for the authoritative backend record.
    ///
    /// The authoritative position wins: the confirmed entry is re-inserted
    /// at the backend-assigned play_order. If a remote push already landed
    /// the authoritative record, the provisional copy is simply dropped; the
    /// store never holds both.
    pub fn replace(&mut self, provisional_id: EntryId, authoritative: Entry) -> Result<Entry> {
        let idx = self
            .index_of(provisional_id)
            .ok_or_else(|| Error::NotFound(format!("provisional entry {provisional_id}")))?;
        self.entries.remove(idx);

        if let Some(existing) = self.get(authoritative.id()) {
            return Ok(existing.clone());
        }
        let id = authoritative.id();
        self.insert_resolving_ties(authoritative);
        // Refreshed copy; tie renumbering may have shifted the position
        self.get(id)
            .cloned()
            .ok_or_else(|| Error::Internal(format!("entry {id} vanished during insert")))
    }

    /// Apply an authoritative record from the backend (remote push or
    /// confirmed reorder). Any existing copy is removed first, so applying
    /// the same record twice is idempotent.
    ///
    /// Returns true when the record was new to the store.
    pub fn upsert_remote(&mut self, entry: Entry) -> bool {
        let existed = if let Some(idx) = self.index_of(entry.id()) {
            self.entries.remove(idx);
            true
        } else {
            false
        };
        self.insert_resolving_ties(entry);
        !existed
    }

    /// Put an entry back at a prior play_order (move rollback).
    pub fn restore_position(&mut self, id: EntryId, play_order: i64) -> Result<()> {
        let idx = self
            .index_of(id)
            .ok_or_else(|| Error::NotFound(format!("entry {id}")))?;
        let mut entry = self.entries.remove(idx);
        entry.set_play_order(play_order);
        self.insert_resolving_ties(entry);
        Ok(())
    }

    /// Merge a page of history: entries already present are skipped, the
    /// rest land at their backend-assigned positions.
    ///
    /// Returns the number of entries actually added.
    pub fn merge_historical(&mut self, batch: Vec<Entry>) -> usize {
        let mut added = 0;
        for entry in batch {
            if !self.contains(entry.id()) {
                self.insert_resolving_ties(entry);
                added += 1;
            }
        }
        added
    }

    /// Drop all entries and reload from an authoritative snapshot.
    ///
    /// The snapshot may span several page fetches: an id seen twice keeps
    /// its last record (the fresher fetch), and colliding positions are
    /// renumbered.
    pub fn reload(&mut self, entries: Vec<Entry>) {
        let mut fresh: Vec<Entry> = Vec::with_capacity(entries.len());
        for entry in entries {
            match fresh.iter().position(|e| e.id() == entry.id()) {
                Some(idx) => fresh[idx] = entry,
                None => fresh.push(entry),
            }
        }
        fresh.sort_by_key(|e| e.play_order());
        self.entries = fresh;

        let collides = self
            .entries
            .windows(2)
            .any(|w| w[0].play_order() == w[1].play_order());
        if collides {
            self.resequence();
        }
    }

    // ========================================
    // Local queue
    // ========================================

    pub fn queue_push(&mut self, item: QueueItem) {
        self.queue.push(item);
    }

    /// Reinsert a queue item at a prior index (promotion rollback).
    pub fn queue_insert(&mut self, index: usize, item: QueueItem) {
        let index = index.min(self.queue.len());
        self.queue.insert(index, item);
    }

    pub fn queue_remove(&mut self, id: Uuid) -> Option<QueueItem> {
        self.queue
            .iter()
            .position(|q| q.id == id)
            .map(|idx| self.queue.remove(idx))
    }

    /// Move a queue item from one index to another.
    pub fn queue_reorder(&mut self, from: usize, to: usize) -> Result<()> {
        if from >= self.queue.len() || to >= self.queue.len() {
            return Err(Error::InvalidState(format!(
                "queue reorder {from} -> {to} out of bounds (len {})",
                self.queue.len()
            )));
        }
        let item = self.queue.remove(from);
        self.queue.insert(to, item);
        Ok(())
    }

    /// Promote a queued song onto the top of the flowsheet.
    ///
    /// This is the only path from the queue to the sequence. The queue item
    /// is consumed; its song fields are copied verbatim and only identity
    /// and position are assigned. The returned `Promotion` carries what a
    /// rollback needs to restore the queue exactly.
    pub fn promote_from_queue(
        &mut self,
        queue_item_id: Uuid,
        show_id: ShowId,
        provisional_id: EntryId,
    ) -> Result<Promotion> {
        self.reject_duplicate(provisional_id)?;
        let pos = self
            .queue
            .iter()
            .position(|q| q.id == queue_item_id)
            .ok_or_else(|| Error::NotFound(format!("queue item {queue_item_id}")))?;
        let item = self.queue.remove(pos);

        let mut entry = Entry::Song(SongEntry {
            id: provisional_id,
            play_order: 0,
            show_id,
            track_title: item.track_title.clone(),
            artist_name: item.artist_name.clone(),
            album_title: item.album_title.clone(),
            record_label: item.record_label.clone(),
            request_flag: item.request_flag,
            album_id: item.album_id,
            rotation_id: item.rotation_id,
            rotation: item.rotation,
        });
        let play_order = self.insert_top(entry.clone())?;
        entry.set_play_order(play_order);
        Ok(Promotion {
            entry,
            queue_index: pos,
            item,
        })
    }

    fn reject_duplicate(&self, id: EntryId) -> Result<()> {
        if self.contains(id) {
            return Err(Error::OrderingConflict(format!(
                "duplicate entry id {id}"
            )));
        }
        Ok(())
    }
}
