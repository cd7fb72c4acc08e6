//! Reconciliation engine
//!
//! **Responsibilities:**
//! - Sole mutation gateway: every flowsheet change flows through an intent
//!   method here, never directly into the store
//! - Optimistic application with correlation-id tracking and exact rollback
//! - Backend settlement (confirm or roll back) with per-entry version
//!   counters so a superseded response never overwrites newer local state
//! - Remote push application with echo suppression
//! - Degraded mode and full resynchronization when the live channel drops
//!
//! Intents settle inline: the optimistic state is visible to SSE subscribers
//! and snapshots the moment it is applied, and the returned `Result` carries
//! the settled outcome. Concurrent intents interleave at the backend awaits;
//! the version counters serialize their effects.

use std::future::Future;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use wfsh_common::events::{
    ChannelStatus, EventBus, FlowsheetEvent, LiveUpdate, MutationKind, SequenceChangeTrigger,
};
use wfsh_common::model::{
    classify, BreakpointEntry, Entry, EntryFieldUpdate, EntryId, MessageEntry, QueueItem, RawEntry,
    RotationLevel, ShowId, SongEntry,
};

use crate::backend::FlowsheetApi;
use crate::config::Config;
use crate::error::{Error, Result};

use super::pagination::PageWindow;
use super::pending::{NaturalKey, PendingLedger, PendingOp, Rollback};
use super::store::{MoveTarget, SequenceStore};

/// Song fields for an add-song or queue-song intent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSong {
    pub track_title: String,
    #[serde(default)]
    pub artist_name: String,
    #[serde(default)]
    pub album_title: String,
    #[serde(default)]
    pub record_label: String,
    #[serde(default)]
    pub request_flag: bool,
    #[serde(default)]
    pub album_id: Option<i64>,
    #[serde(default)]
    pub rotation_id: Option<i64>,
    #[serde(default)]
    pub rotation: Option<RotationLevel>,
}

/// Point-in-time view of engine state for snapshots and SSE initial state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowsheetSnapshot {
    pub entries: Vec<Entry>,
    pub queue: Vec<QueueItem>,
    pub pagination: PageWindow,
    pub channel: ChannelStatus,
    pub pending_ops: usize,
}

/// Live update channel state tracked by the engine.
#[derive(Debug, Clone, Copy)]
struct ChannelState {
    status: ChannelStatus,
    retry_count: u32,
}

impl Default for ChannelState {
    // Degraded until the live channel task completes its first resync
    fn default() -> Self {
        Self {
            status: ChannelStatus::Degraded,
            retry_count: 0,
        }
    }
}

/// How a remote push was absorbed.
enum PushOutcome {
    /// Echo of a pending create; the provisional entry was confirmed.
    Confirmed {
        correlation_id: Uuid,
        provisional_id: EntryId,
        entry: Entry,
    },
    /// Authoritative state applied to the store.
    Applied { show_id: ShowId },
    /// Echo of a pending local operation; REST settlement will resolve it.
    Suppressed,
    /// Record already present verbatim; nothing to do.
    Unchanged,
}

/// Flowsheet reconciliation engine.
///
/// Shared as `Arc<FlowsheetEngine>` between the HTTP surface and the live
/// channel task. Lock order where two are held together: `store` before
/// `ledger`; `window` and `channel` are only ever held alone.
pub struct FlowsheetEngine {
    /// Backend flowsheet REST client
    backend: Arc<dyn FlowsheetApi>,

    /// Console-wide event bus (SSE renderers subscribe here)
    event_bus: Arc<EventBus>,

    /// Ordered sequence plus local queue
    store: RwLock<SequenceStore>,

    /// In-flight operations and per-entry version counters
    ledger: Mutex<PendingLedger>,

    /// Loaded-history window
    window: RwLock<PageWindow>,

    /// Live update channel status
    channel: RwLock<ChannelState>,

    /// Descending counter for provisional (negative) entry ids
    provisional_seq: AtomicI64,

    /// Backend request timeout
    request_timeout: Duration,

    /// Rows per history page fetch
    page_limit: u32,
}

impl FlowsheetEngine {
    pub fn new(config: &Config, backend: Arc<dyn FlowsheetApi>, event_bus: Arc<EventBus>) -> Self {
        Self {
            backend,
            event_bus,
            store: RwLock::new(SequenceStore::new()),
            ledger: Mutex::new(PendingLedger::new()),
            window: RwLock::new(PageWindow::new(config.page_limit)),
            channel: RwLock::new(ChannelState::default()),
            provisional_seq: AtomicI64::new(-1),
            request_timeout: config.request_timeout(),
            page_limit: config.page_limit,
        }
    }

    // ========================================
    // Reads
    // ========================================

    /// Point-in-time state for snapshots and SSE initial frames.
    pub async fn snapshot(&self) -> FlowsheetSnapshot {
        let (entries, queue) = {
            let store = self.store.read().await;
            (store.entries().to_vec(), store.queue().to_vec())
        };
        FlowsheetSnapshot {
            entries,
            queue,
            pagination: *self.window.read().await,
            channel: self.channel.read().await.status,
            pending_ops: self.ledger.lock().await.len(),
        }
    }

    pub async fn channel_status(&self) -> ChannelStatus {
        self.channel.read().await.status
    }

    // ========================================
    // Local intents: insertion
    // ========================================

    /// Add a song at the top of the flowsheet.
    pub async fn add_song(&self, show_id: ShowId, song: NewSong) -> Result<Entry> {
        info!(show_id, track_title = %song.track_title, "Add song intent");
        let correlation_id = Uuid::new_v4();
        let mut entry = Entry::Song(SongEntry {
            id: self.next_provisional_id(),
            play_order: 0,
            show_id,
            track_title: song.track_title,
            artist_name: song.artist_name,
            album_title: song.album_title,
            record_label: song.record_label,
            request_flag: song.request_flag,
            album_id: song.album_id,
            rotation_id: song.rotation_id,
            rotation: song.rotation,
        });

        self.stage_insert(correlation_id, &mut entry).await?;
        self.notify(Some(show_id), SequenceChangeTrigger::LocalAdd)
            .await;
        self.settle_create(correlation_id, &entry).await
    }

    /// Add a free-form message (talkset, PSA) at the top of the flowsheet.
    pub async fn add_message(&self, show_id: ShowId, message: String) -> Result<Entry> {
        info!(show_id, "Add message intent");
        let correlation_id = Uuid::new_v4();
        let mut entry = Entry::Message(MessageEntry {
            id: self.next_provisional_id(),
            play_order: 0,
            show_id,
            message,
        });

        self.stage_insert(correlation_id, &mut entry).await?;
        self.notify(Some(show_id), SequenceChangeTrigger::LocalAdd)
            .await;
        self.settle_create(correlation_id, &entry).await
    }

    /// Add a scheduled breakpoint at the top of the flowsheet.
    pub async fn add_breakpoint(
        &self,
        show_id: ShowId,
        message: String,
        day: NaiveDate,
        time: NaiveTime,
    ) -> Result<Entry> {
        info!(show_id, %day, %time, "Add breakpoint intent");
        let correlation_id = Uuid::new_v4();
        let mut entry = Entry::Breakpoint(BreakpointEntry {
            id: self.next_provisional_id(),
            play_order: 0,
            show_id,
            message,
            day,
            time,
        });

        self.stage_insert(correlation_id, &mut entry).await?;
        self.notify(Some(show_id), SequenceChangeTrigger::LocalAdd)
            .await;
        self.settle_create(correlation_id, &entry).await
    }

    /// Promote a queued song onto the top of the flowsheet.
    ///
    /// The queue item is consumed exactly once; if the backend rejects the
    /// create, the item returns to its former queue position.
    pub async fn promote(&self, queue_item_id: Uuid, show_id: ShowId) -> Result<Entry> {
        info!(%queue_item_id, show_id, "Promote queue item intent");
        let correlation_id = Uuid::new_v4();
        let provisional_id = self.next_provisional_id();

        let promotion = {
            let mut store = self.store.write().await;
            let mut ledger = self.ledger.lock().await;
            let promotion = store.promote_from_queue(queue_item_id, show_id, provisional_id)?;
            let version = ledger.next_version(provisional_id);
            ledger.record(PendingOp {
                correlation_id,
                kind: MutationKind::Create,
                entry_id: provisional_id,
                version,
                rollback: Rollback::RemoveInserted {
                    entry_id: provisional_id,
                    requeue: Some((promotion.queue_index, promotion.item.clone())),
                },
                natural_key: Some(NaturalKey::of(&promotion.entry)),
                submitted_at: Utc::now(),
            });
            promotion
        };

        self.notify(Some(show_id), SequenceChangeTrigger::QueuePromotion)
            .await;
        self.settle_create(correlation_id, &promotion.entry).await
    }

    // ========================================
    // Local intents: removal, movement, editing
    // ========================================

    /// Remove an entry from the flowsheet. An id that is already absent is a
    /// quiet no-op: local and remote deletes racing each other converge.
    pub async fn remove_entry(&self, id: EntryId) -> Result<()> {
        info!(entry_id = id, "Remove entry intent");
        reject_provisional(id)?;
        let correlation_id = Uuid::new_v4();

        let removed = {
            let mut store = self.store.write().await;
            let mut ledger = self.ledger.lock().await;
            if matches!(store.get(id), Some(Entry::ShowBlock(_))) {
                return Err(Error::InvalidState(format!(
                    "show block {id} cannot be removed"
                )));
            }
            let Some(entry) = store.remove(id) else {
                debug!(entry_id = id, "Remove of absent entry ignored");
                return Ok(());
            };
            let version = ledger.next_version(id);
            ledger.record(PendingOp {
                correlation_id,
                kind: MutationKind::Delete,
                entry_id: id,
                version,
                rollback: Rollback::Reinsert {
                    entry: entry.clone(),
                },
                natural_key: None,
                submitted_at: Utc::now(),
            });
            entry
        };
        self.notify(Some(removed.show_id()), SequenceChangeTrigger::LocalRemove)
            .await;

        let outcome = match self.with_timeout(self.backend.delete_entry(id)).await {
            // The backend had already deleted it; the race resolved the way
            // this intent wanted, so the delete is confirmed, not failed.
            Err(Error::BackendRequest {
                status: Some(404), ..
            }) => {
                debug!(entry_id = id, "Entry was already gone from the backend");
                Ok(())
            }
            other => other,
        };
        match outcome {
            Ok(()) => {
                let mut ledger = self.ledger.lock().await;
                if ledger.take(correlation_id).is_none() {
                    debug!(%correlation_id, "Delete was already settled");
                }
                Ok(())
            }
            Err(err) => Err(self.fail_pending(correlation_id, err).await),
        }
    }

    /// Move an entry, renumbering locally and asking the backend to adopt
    /// the new position. The backend's canonical position wins on confirm.
    pub async fn move_entry(&self, id: EntryId, target: MoveTarget) -> Result<Entry> {
        info!(entry_id = id, ?target, "Move entry intent");
        reject_provisional(id)?;
        let correlation_id = Uuid::new_v4();

        let (new_play_order, show_id) = {
            let mut store = self.store.write().await;
            let mut ledger = self.ledger.lock().await;
            let prior_play_order = store
                .get(id)
                .map(|e| e.play_order())
                .ok_or_else(|| Error::OrderingConflict(format!("entry {id} is not in the sequence")))?;
            let new_play_order = store.move_entry(id, target)?;
            let version = ledger.next_version(id);
            ledger.record(PendingOp {
                correlation_id,
                kind: MutationKind::Reorder,
                entry_id: id,
                version,
                rollback: Rollback::RevertMove {
                    entry_id: id,
                    prior_play_order,
                },
                natural_key: None,
                submitted_at: Utc::now(),
            });
            (new_play_order, store.get(id).map(|e| e.show_id()))
        };
        self.notify(show_id, SequenceChangeTrigger::LocalMove).await;

        let outcome = self
            .with_timeout(self.backend.reorder_entry(id, new_play_order))
            .await
            .and_then(|raw| classify(raw).map_err(Error::from));
        match outcome {
            Ok(authoritative) => self.confirm_entry_state(correlation_id, authoritative).await,
            Err(err) => Err(self.fail_pending(correlation_id, err).await),
        }
    }

    /// Edit one field of an entry. Fields undefined for the entry's variant
    /// are rejected before anything is sent to the backend.
    pub async fn update_entry_field(&self, id: EntryId, update: EntryFieldUpdate) -> Result<Entry> {
        info!(entry_id = id, field = update.field_name(), "Update field intent");
        reject_provisional(id)?;
        let correlation_id = Uuid::new_v4();

        let show_id = {
            let mut store = self.store.write().await;
            let mut ledger = self.ledger.lock().await;
            let prior = store.update_field(id, &update)?;
            let version = ledger.next_version(id);
            ledger.record(PendingOp {
                correlation_id,
                kind: MutationKind::Update,
                entry_id: id,
                version,
                rollback: Rollback::RevertField {
                    entry_id: id,
                    prior,
                },
                natural_key: None,
                submitted_at: Utc::now(),
            });
            store.get(id).map(|e| e.show_id())
        };
        self.notify(show_id, SequenceChangeTrigger::LocalEdit).await;

        let outcome = self
            .with_timeout(self.backend.update_entry(id, update))
            .await
            .and_then(|raw| classify(raw).map_err(Error::from));
        match outcome {
            Ok(authoritative) => self.confirm_entry_state(correlation_id, authoritative).await,
            Err(err) => Err(self.fail_pending(correlation_id, err).await),
        }
    }

    // ========================================
    // Local intents: queue
    // ========================================

    /// Stage a song in the local queue. Queue state never touches the
    /// backend.
    pub async fn queue_add(&self, song: NewSong) -> QueueItem {
        let mut item = QueueItem::new(song.track_title, song.artist_name);
        item.album_title = song.album_title;
        item.record_label = song.record_label;
        item.request_flag = song.request_flag;
        item.album_id = song.album_id;
        item.rotation_id = song.rotation_id;
        item.rotation = song.rotation;
        info!(queue_item_id = %item.id, track_title = %item.track_title, "Queue song");

        self.store.write().await.queue_push(item.clone());
        self.notify_queue().await;
        item
    }

    pub async fn queue_remove(&self, id: Uuid) -> Option<QueueItem> {
        let removed = self.store.write().await.queue_remove(id);
        if removed.is_some() {
            info!(queue_item_id = %id, "Removed queue item");
            self.notify_queue().await;
        }
        removed
    }

    pub async fn queue_reorder(&self, from: usize, to: usize) -> Result<()> {
        self.store.write().await.queue_reorder(from, to)?;
        self.notify_queue().await;
        Ok(())
    }

    // ========================================
    // Pagination
    // ========================================

    /// Fetch and merge the next page of flowsheet history.
    ///
    /// Returns `Ok(None)` when a fetch is already in flight (duplicate
    /// triggers are no-ops), `Ok(Some(page))` when a page was merged.
    pub async fn load_more(&self) -> Result<Option<u32>> {
        let Some(page) = self.window.write().await.begin_load_more() else {
            debug!("Load-more ignored; a page fetch is already in flight");
            return Ok(None);
        };
        info!(page, "Loading flowsheet history page");

        let outcome = self
            .with_timeout(self.backend.fetch_page(None, page, self.page_limit))
            .await;
        let batch = match outcome {
            Ok(batch) => batch,
            Err(err) => {
                self.window.write().await.abort();
                warn!(page, "History page fetch failed: {err}");
                return Err(err);
            }
        };

        let mut entries = Vec::with_capacity(batch.len());
        for raw in batch {
            match classify(raw) {
                Ok(entry) => entries.push(entry),
                Err(err) => warn!(page, "Dropping unclassifiable record: {err}"),
            }
        }

        let added = self.store.write().await.merge_historical(entries);
        self.window.write().await.complete(page);

        self.event_bus.emit_lossy(FlowsheetEvent::PageLoaded {
            page,
            added,
            timestamp: Utc::now(),
        });
        if added > 0 {
            self.notify(None, SequenceChangeTrigger::PageMerge).await;
        }
        info!(page, added, "History page merged");
        Ok(Some(page))
    }

    // ========================================
    // Remote pushes
    // ========================================

    /// Absorb one push from the live update channel.
    ///
    /// Pushes are dropped unless the channel is Live: during a resync the
    /// refetch supersedes anything in flight, and in degraded mode remote
    /// reconciliation is paused entirely.
    pub async fn apply_live_update(&self, update: LiveUpdate) {
        let status = self.channel.read().await.status;
        if status != ChannelStatus::Live {
            debug!(%status, update_type = update.update_type(), "Dropping live update");
            return;
        }

        match update {
            LiveUpdate::Deleted { entry } => {
                let Some(id) = entry.id else {
                    warn!("Dropping deleted push without an id");
                    return;
                };
                let removed = {
                    let mut store = self.store.write().await;
                    let ledger = self.ledger.lock().await;
                    if ledger.has_pending_for(id) {
                        debug!(entry_id = id, "Suppressing deleted push for a pending operation");
                        return;
                    }
                    store.remove(id)
                };
                if let Some(removed) = removed {
                    info!(entry_id = id, "Remote delete applied");
                    self.notify(Some(removed.show_id()), SequenceChangeTrigger::RemotePush)
                        .await;
                }
            }
            LiveUpdate::Created { entry } => self.apply_remote_entry(entry, true).await,
            LiveUpdate::Updated { entry } | LiveUpdate::Reordered { entry } => {
                self.apply_remote_entry(entry, false).await
            }
        }
    }

    async fn apply_remote_entry(&self, raw: RawEntry, is_create: bool) {
        let classified = match classify(raw) {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Dropping unclassifiable live update: {err}");
                return;
            }
        };

        let outcome = {
            let mut store = self.store.write().await;
            let mut ledger = self.ledger.lock().await;
            handle_remote_entry(&mut store, &mut ledger, classified, is_create)
        };

        match outcome {
            PushOutcome::Confirmed {
                correlation_id,
                provisional_id,
                entry,
            } => {
                info!(%correlation_id, provisional_id, entry_id = entry.id(),
                    "Live echo confirmed a pending create");
                self.event_bus.emit_lossy(FlowsheetEvent::EntryConfirmed {
                    correlation_id,
                    provisional_id,
                    entry_id: entry.id(),
                    timestamp: Utc::now(),
                });
                self.notify(Some(entry.show_id()), SequenceChangeTrigger::RemotePush)
                    .await;
            }
            PushOutcome::Applied { show_id } => {
                self.notify(Some(show_id), SequenceChangeTrigger::RemotePush)
                    .await;
            }
            PushOutcome::Suppressed => {
                debug!("Suppressed live echo of a pending operation");
            }
            PushOutcome::Unchanged => {}
        }
    }

    // ========================================
    // Channel status and resynchronization
    // ========================================

    /// Record live channel loss. Local intents keep working; remote
    /// reconciliation pauses until a resync completes.
    pub async fn channel_degraded(&self, retry_count: u32) {
        warn!(retry_count, "Live update channel lost; entering degraded mode");
        self.set_channel(ChannelStatus::Degraded, retry_count).await;
    }

    /// Rebuild confirmed state from the backend, preserving still-pending
    /// optimistic operations, then return the channel to Live.
    pub async fn resync(&self) -> Result<()> {
        info!("Resynchronizing flowsheet state");
        self.set_channel(ChannelStatus::Resyncing, 0).await;
        self.event_bus.emit_lossy(FlowsheetEvent::ResyncStarted {
            timestamp: Utc::now(),
        });

        let pages = self.window.read().await.resync_pages();
        let mut raws: Vec<RawEntry> = Vec::new();
        for page in pages {
            match self
                .with_timeout(self.backend.fetch_page(None, page, self.page_limit))
                .await
            {
                Ok(batch) => raws.extend(batch),
                Err(err) => {
                    warn!(page, "Resync fetch failed: {err}");
                    self.set_channel(ChannelStatus::Degraded, 0).await;
                    return Err(err);
                }
            }
        }

        let mut entries = Vec::with_capacity(raws.len());
        for raw in raws {
            match classify(raw) {
                Ok(entry) => entries.push(entry),
                Err(err) => warn!("Dropping unclassifiable record during resync: {err}"),
            }
        }
        let total = entries.len();

        let pending_replayed = {
            let mut store = self.store.write().await;
            let ledger = self.ledger.lock().await;

            // Carry still-pending optimistic state across the rebuild:
            // pending deletes are re-removed, everything else is re-upserted
            // at its optimistic position.
            let mut removals = Vec::new();
            let mut overlays = Vec::new();
            for op in ledger.ops() {
                match &op.rollback {
                    Rollback::Reinsert { .. } => removals.push(op.entry_id),
                    _ => {
                        if let Some(entry) = store.get(op.entry_id) {
                            overlays.push(entry.clone());
                        }
                    }
                }
            }

            store.reload(entries);
            let replayed = removals.len() + overlays.len();
            for entry in overlays {
                store.upsert_remote(entry);
            }
            for id in removals {
                store.remove(id);
            }
            replayed
        };

        self.set_channel(ChannelStatus::Live, 0).await;
        self.event_bus.emit_lossy(FlowsheetEvent::ResyncCompleted {
            entries: total,
            pending_replayed,
            timestamp: Utc::now(),
        });
        self.notify(None, SequenceChangeTrigger::Resync).await;
        info!(entries = total, pending_replayed, "Resync complete");
        Ok(())
    }

    // ========================================
    // Internal: optimistic staging and settlement
    // ========================================

    fn next_provisional_id(&self) -> EntryId {
        self.provisional_seq.fetch_sub(1, Ordering::Relaxed)
    }

    /// Insert an optimistic entry at the top and record the pending create.
    async fn stage_insert(&self, correlation_id: Uuid, entry: &mut Entry) -> Result<()> {
        let mut store = self.store.write().await;
        let mut ledger = self.ledger.lock().await;
        let play_order = store.insert_top(entry.clone())?;
        entry.set_play_order(play_order);
        let version = ledger.next_version(entry.id());
        ledger.record(PendingOp {
            correlation_id,
            kind: MutationKind::Create,
            entry_id: entry.id(),
            version,
            rollback: Rollback::RemoveInserted {
                entry_id: entry.id(),
                requeue: None,
            },
            natural_key: Some(NaturalKey::of(entry)),
            submitted_at: Utc::now(),
        });
        Ok(())
    }

    async fn settle_create(&self, correlation_id: Uuid, entry: &Entry) -> Result<Entry> {
        let payload = RawEntry::from(entry);
        let outcome = self
            .with_timeout(self.backend.create_entry(payload))
            .await
            .and_then(|raw| classify(raw).map_err(Error::from));
        match outcome {
            Ok(authoritative) => self.confirm_create(correlation_id, authoritative).await,
            Err(err) => Err(self.fail_pending(correlation_id, err).await),
        }
    }

    /// Swap a confirmed create's provisional record for the authoritative
    /// one and re-point any stacked pending state onto the real id.
    async fn confirm_create(&self, correlation_id: Uuid, authoritative: Entry) -> Result<Entry> {
        let (provisional_id, confirmed) = {
            let mut store = self.store.write().await;
            let mut ledger = self.ledger.lock().await;
            let Some(op) = ledger.take(correlation_id) else {
                debug!(%correlation_id, "Create was already confirmed via the live channel");
                return Ok(store
                    .get(authoritative.id())
                    .cloned()
                    .unwrap_or(authoritative));
            };
            let provisional_id = op.entry_id;
            let confirmed = apply_confirmation(&mut store, &mut ledger, provisional_id, authoritative);
            (provisional_id, confirmed)
        };

        self.event_bus.emit_lossy(FlowsheetEvent::EntryConfirmed {
            correlation_id,
            provisional_id,
            entry_id: confirmed.id(),
            timestamp: Utc::now(),
        });
        self.notify(Some(confirmed.show_id()), SequenceChangeTrigger::RemotePush)
            .await;
        Ok(confirmed)
    }

    /// Apply the authoritative record a successful update or reorder
    /// returned, unless a newer local operation has superseded it.
    async fn confirm_entry_state(&self, correlation_id: Uuid, authoritative: Entry) -> Result<Entry> {
        let applied = {
            let mut store = self.store.write().await;
            let mut ledger = self.ledger.lock().await;
            let Some(op) = ledger.take(correlation_id) else {
                debug!(%correlation_id, "Confirmation for an operation that already settled");
                return Ok(authoritative);
            };
            if !ledger.is_current(op.entry_id, op.version) {
                debug!(%correlation_id, entry_id = op.entry_id,
                    "Superseded confirmation; authoritative state not applied");
                return Ok(authoritative);
            }
            if store.get(authoritative.id()) == Some(&authoritative) {
                false
            } else {
                store.upsert_remote(authoritative.clone());
                true
            }
        };

        if applied {
            self.notify(Some(authoritative.show_id()), SequenceChangeTrigger::RemotePush)
                .await;
        }
        Ok(authoritative)
    }

    /// Roll back a failed operation (unless superseded) and surface the
    /// failure. Returns the error for the caller to propagate.
    async fn fail_pending(&self, correlation_id: Uuid, err: Error) -> Error {
        let (kind, rolled_back) = {
            let mut store = self.store.write().await;
            let mut ledger = self.ledger.lock().await;
            let Some(op) = ledger.take(correlation_id) else {
                debug!(%correlation_id, "Failure for an operation that already settled");
                return err;
            };
            if ledger.is_current(op.entry_id, op.version) {
                let show_id = apply_rollback(&mut store, op.rollback);
                (op.kind, Some(show_id))
            } else {
                debug!(%correlation_id, entry_id = op.entry_id,
                    "Superseded operation failed; rollback skipped");
                (op.kind, None)
            }
        };

        let code = match &err {
            Error::BackendRequest { code, .. } => Some(code.clone()),
            _ => None,
        };
        warn!(%correlation_id, operation = %kind, "Mutation failed: {err}");
        self.event_bus.emit_lossy(FlowsheetEvent::MutationFailed {
            correlation_id,
            operation: kind,
            code,
            message: err.to_string(),
            timestamp: Utc::now(),
        });
        if let Some(show_id) = rolled_back {
            self.notify(show_id, SequenceChangeTrigger::Rollback).await;
        }
        err
    }

    async fn with_timeout<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.request_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(Error::backend_timeout()),
        }
    }

    // ========================================
    // Internal: event emission
    // ========================================

    /// Emit SequenceChanged plus a full state update. Every sequence
    /// mutation must emit both so renderers never act on a stale list.
    async fn notify(&self, show_id: Option<ShowId>, trigger: SequenceChangeTrigger) {
        let (entries, queue) = {
            let store = self.store.read().await;
            (store.entries().to_vec(), store.queue().to_vec())
        };
        self.event_bus.emit_lossy(FlowsheetEvent::SequenceChanged {
            show_id,
            trigger,
            timestamp: Utc::now(),
        });
        self.event_bus.emit_lossy(FlowsheetEvent::FlowsheetStateUpdate {
            timestamp: Utc::now(),
            entries,
            queue,
        });
    }

    /// Queue-only changes ship the state update without a sequence event.
    async fn notify_queue(&self) {
        let (entries, queue) = {
            let store = self.store.read().await;
            (store.entries().to_vec(), store.queue().to_vec())
        };
        self.event_bus.emit_lossy(FlowsheetEvent::FlowsheetStateUpdate {
            timestamp: Utc::now(),
            entries,
            queue,
        });
    }

    async fn set_channel(&self, status: ChannelStatus, retry_count: u32) {
        {
            let mut channel = self.channel.write().await;
            channel.status = status;
            channel.retry_count = retry_count;
        }
        self.event_bus.emit_lossy(FlowsheetEvent::ChannelStatusChanged {
            status,
            retry_count,
            timestamp: Utc::now(),
        });
    }
}

/// Mutations are only accepted for backend-confirmed entries; a provisional
/// row settles within the request timeout or rolls back.
fn reject_provisional(id: EntryId) -> Result<()> {
    if id < 0 {
        return Err(Error::InvalidState(format!(
            "entry {id} is awaiting backend confirmation"
        )));
    }
    Ok(())
}

/// Replace a provisional record with its authoritative form. If the
/// provisional record is already gone the authoritative state is applied
/// directly; the store never holds both.
fn apply_confirmation(
    store: &mut SequenceStore,
    ledger: &mut PendingLedger,
    provisional_id: EntryId,
    authoritative: Entry,
) -> Entry {
    let confirmed = match store.replace(provisional_id, authoritative.clone()) {
        Ok(entry) => entry,
        Err(_) => {
            warn!(
                provisional_id,
                "Provisional record missing at confirmation; applying authoritative state directly"
            );
            store.upsert_remote(authoritative.clone());
            authoritative
        }
    };
    ledger.adopt_id(provisional_id, confirmed.id());
    confirmed
}

fn handle_remote_entry(
    store: &mut SequenceStore,
    ledger: &mut PendingLedger,
    classified: Entry,
    is_create: bool,
) -> PushOutcome {
    if is_create {
        if let Some(correlation_id) = ledger.match_create_echo(&NaturalKey::of(&classified)) {
            if let Some(op) = ledger.take(correlation_id) {
                let provisional_id = op.entry_id;
                let entry = apply_confirmation(store, ledger, provisional_id, classified);
                return PushOutcome::Confirmed {
                    correlation_id,
                    provisional_id,
                    entry,
                };
            }
        }
    }
    if ledger.has_pending_for(classified.id()) {
        return PushOutcome::Suppressed;
    }
    if store.get(classified.id()) == Some(&classified) {
        return PushOutcome::Unchanged;
    }
    let show_id = classified.show_id();
    store.upsert_remote(classified);
    PushOutcome::Applied { show_id }
}

fn apply_rollback(store: &mut SequenceStore, rollback: Rollback) -> Option<ShowId> {
    match rollback {
        Rollback::RemoveInserted { entry_id, requeue } => {
            let removed = store.remove(entry_id);
            if removed.is_none() {
                warn!(entry_id, "Optimistic entry already gone at rollback");
            }
            if let Some((index, item)) = requeue {
                store.queue_insert(index, item);
            }
            removed.map(|e| e.show_id())
        }
        Rollback::Reinsert { entry } => {
            let show_id = entry.show_id();
            store.upsert_remote(entry);
            Some(show_id)
        }
        Rollback::RevertField { entry_id, prior } => {
            let show_id = store.get(entry_id).map(|e| e.show_id());
            if let Err(err) = store.update_field(entry_id, &prior) {
                warn!(entry_id, "Field rollback could not be applied: {err}");
            }
            show_id
        }
        Rollback::RevertMove {
            entry_id,
            prior_play_order,
        } => {
            let show_id = store.get(entry_id).map(|e| e.show_id());
            if let Err(err) = store.restore_position(entry_id, prior_play_order) {
                warn!(entry_id, "Position rollback could not be applied: {err}");
            }
            show_id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Backend double that assigns sequential ids and otherwise echoes the
    /// submitted record back.
    struct EchoApi {
        next_id: AtomicI64,
        delete_calls: AtomicUsize,
    }

    impl EchoApi {
        fn new() -> Self {
            Self {
                next_id: AtomicI64::new(101),
                delete_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FlowsheetApi for EchoApi {
        async fn fetch_page(
            &self,
            _show_id: Option<ShowId>,
            _page: u32,
            _limit: u32,
        ) -> Result<Vec<RawEntry>> {
            Ok(Vec::new())
        }

        async fn create_entry(&self, mut entry: RawEntry) -> Result<RawEntry> {
            entry.id = Some(self.next_id.fetch_add(1, Ordering::SeqCst));
            Ok(entry)
        }

        async fn update_entry(&self, _id: EntryId, _update: EntryFieldUpdate) -> Result<RawEntry> {
            Err(Error::backend(500, "unscripted", "update not scripted"))
        }

        async fn delete_entry(&self, _id: EntryId) -> Result<()> {
            self.delete_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn reorder_entry(&self, _id: EntryId, _new_play_order: i64) -> Result<RawEntry> {
            Err(Error::backend(500, "unscripted", "reorder not scripted"))
        }
    }

    fn engine_with(api: Arc<EchoApi>) -> (FlowsheetEngine, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new(100));
        let engine = FlowsheetEngine::new(&Config::default(), api, bus.clone());
        (engine, bus)
    }

    fn drain_event_types(rx: &mut tokio::sync::broadcast::Receiver<FlowsheetEvent>) -> Vec<String> {
        let mut types = Vec::new();
        while let Ok(event) = rx.try_recv() {
            types.push(event.event_type().to_string());
        }
        types
    }

    #[tokio::test]
    async fn add_song_settles_with_authoritative_id() {
        let api = Arc::new(EchoApi::new());
        let (engine, bus) = engine_with(api);
        let mut rx = bus.subscribe();

        let entry = engine
            .add_song(
                7,
                NewSong {
                    track_title: "Wire Static".to_string(),
                    artist_name: "Phase Four".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(entry.id(), 101);
        assert!(!entry.is_provisional());

        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.entries[0].id(), 101);
        assert_eq!(snapshot.pending_ops, 0);

        let types = drain_event_types(&mut rx);
        assert!(types.contains(&"SequenceChanged".to_string()));
        assert!(types.contains(&"EntryConfirmed".to_string()));
    }

    #[tokio::test]
    async fn second_add_lands_above_the_first() {
        let api = Arc::new(EchoApi::new());
        let (engine, _bus) = engine_with(api);

        engine
            .add_song(
                7,
                NewSong {
                    track_title: "First".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        engine
            .add_message(7, "Mic break".to_string())
            .await
            .unwrap();

        let snapshot = engine.snapshot().await;
        assert_eq!(snapshot.entries.len(), 2);
        // Top of the sequence is the last (highest play_order) element
        assert_eq!(snapshot.entries[1].headline(), "Mic break");
        assert!(snapshot.entries[0].play_order() < snapshot.entries[1].play_order());
    }

    #[tokio::test]
    async fn promote_moves_item_from_queue_to_sequence() {
        let api = Arc::new(EchoApi::new());
        let (engine, _bus) = engine_with(api);

        let item = engine
            .queue_add(NewSong {
                track_title: "Wire Static".to_string(),
                artist_name: "Phase Four".to_string(),
                ..Default::default()
            })
            .await;
        assert_eq!(engine.snapshot().await.queue.len(), 1);

        let entry = engine.promote(item.id, 7).await.unwrap();
        assert_eq!(entry.headline(), "Wire Static");
        assert!(!entry.is_provisional());

        let snapshot = engine.snapshot().await;
        assert!(snapshot.queue.is_empty());
        assert_eq!(snapshot.entries.len(), 1);

        // The item was consumed; promoting it again fails
        assert!(engine.promote(item.id, 7).await.is_err());
    }

    #[tokio::test]
    async fn remove_of_absent_entry_is_quiet_noop() {
        let api = Arc::new(EchoApi::new());
        let (engine, _bus) = engine_with(api.clone());

        engine.remove_entry(404).await.unwrap();
        assert_eq!(api.delete_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn breakpoint_add_then_remove_restores_store() {
        let api = Arc::new(EchoApi::new());
        let (engine, _bus) = engine_with(api);

        engine
            .add_song(
                7,
                NewSong {
                    track_title: "Anchor".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let baseline = engine.snapshot().await.entries;

        let breakpoint = engine
            .add_breakpoint(
                7,
                "Top of hour ID".to_string(),
                NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
                NaiveTime::from_hms_opt(3, 0, 0).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(engine.snapshot().await.entries.len(), 2);

        engine.remove_entry(breakpoint.id()).await.unwrap();
        assert_eq!(engine.snapshot().await.entries, baseline);
    }

    #[tokio::test]
    async fn show_blocks_arrive_remotely_and_resist_removal() {
        let api = Arc::new(EchoApi::new());
        let (engine, _bus) = engine_with(api);

        // First resync brings the channel Live so pushes are applied
        engine.resync().await.unwrap();
        assert_eq!(engine.channel_status().await, ChannelStatus::Live);

        engine
            .apply_live_update(LiveUpdate::Created {
                entry: RawEntry {
                    id: Some(50),
                    play_order: Some(10),
                    show_id: Some(7),
                    dj_name: Some("DJ Overnight".to_string()),
                    day: Some(NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()),
                    time: Some(NaiveTime::from_hms_opt(2, 0, 0).unwrap()),
                    is_start: Some(true),
                    ..Default::default()
                },
            })
            .await;
        assert_eq!(engine.snapshot().await.entries.len(), 1);

        let err = engine.remove_entry(50).await.unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[tokio::test]
    async fn duplicate_remote_push_changes_nothing() {
        let api = Arc::new(EchoApi::new());
        let (engine, bus) = engine_with(api);
        engine.resync().await.unwrap();

        let push = LiveUpdate::Created {
            entry: RawEntry {
                id: Some(60),
                play_order: Some(10),
                show_id: Some(7),
                track_title: Some("Wire Static".to_string()),
                ..Default::default()
            },
        };

        engine.apply_live_update(push.clone()).await;
        let mut rx = bus.subscribe();
        engine.apply_live_update(push).await;

        assert_eq!(engine.snapshot().await.entries.len(), 1);
        // Second application emitted nothing
        assert!(drain_event_types(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn update_field_on_missing_entry_is_not_found() {
        let api = Arc::new(EchoApi::new());
        let (engine, _bus) = engine_with(api);

        let err = engine
            .update_entry_field(77, EntryFieldUpdate::TrackTitle("x".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn resync_brings_channel_live() {
        let api = Arc::new(EchoApi::new());
        let (engine, bus) = engine_with(api);
        let mut rx = bus.subscribe();

        assert_eq!(engine.channel_status().await, ChannelStatus::Degraded);
        engine.resync().await.unwrap();
        assert_eq!(engine.channel_status().await, ChannelStatus::Live);

        let types = drain_event_types(&mut rx);
        assert!(types.contains(&"ResyncStarted".to_string()));
        assert!(types.contains(&"ResyncCompleted".to_string()));
        assert!(types.contains(&"ChannelStatusChanged".to_string()));
    }

    #[tokio::test]
    async fn queue_reorder_out_of_bounds_is_rejected() {
        let api = Arc::new(EchoApi::new());
        let (engine, _bus) = engine_with(api);

        engine
            .queue_add(NewSong {
                track_title: "Only".to_string(),
                ..Default::default()
            })
            .await;
        assert!(engine.queue_reorder(0, 5).await.is_err());
    }
}
