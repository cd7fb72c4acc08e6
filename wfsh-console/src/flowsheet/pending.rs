//! Pending-operation ledger
//!
//! Every local mutation is applied optimistically and recorded here under a
//! fresh correlation id until the backend answers. The ledger carries three
//! things the engine needs at response time:
//!
//! - the rollback record that restores the exact prior state on failure
//! - a per-entry version counter so a stale response (one superseded by a
//!   newer local operation on the same entry) is discarded instead of
//!   clobbering newer optimistic state
//! - a natural key for pending creates, so a live-channel echo of our own
//!   create is recognized as confirmation rather than applied as a second
//!   insert

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use wfsh_common::events::MutationKind;
use wfsh_common::model::{Entry, EntryFieldUpdate, EntryId, EntryKind, QueueItem, ShowId};

/// What must be undone if the backend rejects the operation.
#[derive(Debug, Clone)]
pub enum Rollback {
    /// Remove the optimistic entry; for promotions, also put the consumed
    /// queue item back where it was.
    RemoveInserted {
        entry_id: EntryId,
        requeue: Option<(usize, QueueItem)>,
    },
    /// Re-insert an entry the user deleted.
    Reinsert { entry: Entry },
    /// Undo a field edit.
    RevertField {
        entry_id: EntryId,
        prior: EntryFieldUpdate,
    },
    /// Move the entry back to its prior position.
    RevertMove {
        entry_id: EntryId,
        prior_play_order: i64,
    },
}

/// Identity fallback for matching a remote echo against a pending create
/// when the backend-assigned id is not yet known locally.
///
/// `play_order` holds the locally proposed position; the backend may keep
/// it or renumber, so matching treats it as a preference, not a requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NaturalKey {
    pub show_id: ShowId,
    pub kind: EntryKind,
    pub play_order: i64,
    pub headline: String,
}

impl NaturalKey {
    pub fn of(entry: &Entry) -> Self {
        Self {
            show_id: entry.show_id(),
            kind: entry.kind(),
            play_order: entry.play_order(),
            headline: entry.headline().to_string(),
        }
    }

    /// Same logical entry regardless of where the backend placed it.
    fn same_identity(&self, other: &Self) -> bool {
        self.show_id == other.show_id
            && self.kind == other.kind
            && self.headline == other.headline
    }
}

/// A mutation awaiting backend confirmation.
#[derive(Debug, Clone)]
pub struct PendingOp {
    pub correlation_id: Uuid,
    pub kind: MutationKind,
    /// Entry the operation targets (provisional id for creates).
    pub entry_id: EntryId,
    /// Entry version at submission; stale when a newer local op exists.
    pub version: u64,
    pub rollback: Rollback,
    /// Set for creates only.
    pub natural_key: Option<NaturalKey>,
    pub submitted_at: DateTime<Utc>,
}

/// In-flight operations plus per-entry version counters.
#[derive(Debug, Default)]
pub struct PendingLedger {
    /// Submission order preserved for resync replay.
    ops: Vec<PendingOp>,
    versions: HashMap<EntryId, u64>,
}

impl PendingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Bump and return the version counter for an entry. Called once per
    /// submitted operation, before recording it.
    pub fn next_version(&mut self, entry_id: EntryId) -> u64 {
        let counter = self.versions.entry(entry_id).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Whether `version` is still the newest issued for the entry.
    pub fn is_current(&self, entry_id: EntryId, version: u64) -> bool {
        self.versions.get(&entry_id).copied() == Some(version)
    }

    pub fn record(&mut self, op: PendingOp) {
        self.ops.push(op);
    }

    /// Pending operations in submission order.
    pub fn ops(&self) -> &[PendingOp] {
        &self.ops
    }

    /// Remove and return the pending op for a correlation id.
    pub fn take(&mut self, correlation_id: Uuid) -> Option<PendingOp> {
        self.ops
            .iter()
            .position(|op| op.correlation_id == correlation_id)
            .map(|idx| self.ops.remove(idx))
    }

    pub fn get(&self, correlation_id: Uuid) -> Option<&PendingOp> {
        self.ops
            .iter()
            .find(|op| op.correlation_id == correlation_id)
    }

    /// Whether any operation is still pending for the entry.
    pub fn has_pending_for(&self, entry_id: EntryId) -> bool {
        self.ops.iter().any(|op| op.entry_id == entry_id)
    }

    /// Correlation id of the oldest pending create matching a remote echo's
    /// natural key, if any. An exact match (backend kept the proposed
    /// position) wins over an identity-only match (backend renumbered).
    pub fn match_create_echo(&self, key: &NaturalKey) -> Option<Uuid> {
        self.ops
            .iter()
            .find(|op| op.natural_key.as_ref() == Some(key))
            .or_else(|| {
                self.ops.iter().find(|op| {
                    op.natural_key
                        .as_ref()
                        .is_some_and(|k| k.same_identity(key))
                })
            })
            .map(|op| op.correlation_id)
    }

    /// Re-point pending state from a provisional id to the backend-assigned
    /// one after a create confirms. Later operations the user stacked on the
    /// optimistic entry keep their place in line.
    pub fn adopt_id(&mut self, provisional: EntryId, authoritative: EntryId) {
        if provisional == authoritative {
            return;
        }
        for op in &mut self.ops {
            if op.entry_id == provisional {
                op.entry_id = authoritative;
            }
            match &mut op.rollback {
                Rollback::RemoveInserted { entry_id, .. }
                | Rollback::RevertField { entry_id, .. }
                | Rollback::RevertMove { entry_id, .. } => {
                    if *entry_id == provisional {
                        *entry_id = authoritative;
                    }
                }
                Rollback::Reinsert { .. } => {}
            }
        }
        if let Some(counter) = self.versions.remove(&provisional) {
            // Keep the higher counter if the real id was already tracked
            let slot = self.versions.entry(authoritative).or_insert(0);
            *slot = (*slot).max(counter);
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_op(correlation_id: Uuid, entry_id: EntryId, version: u64, key: NaturalKey) -> PendingOp {
        PendingOp {
            correlation_id,
            kind: MutationKind::Create,
            entry_id,
            version,
            rollback: Rollback::RemoveInserted {
                entry_id,
                requeue: None,
            },
            natural_key: Some(key),
            submitted_at: Utc::now(),
        }
    }

    fn key(show_id: ShowId, play_order: i64, headline: &str) -> NaturalKey {
        NaturalKey {
            show_id,
            kind: EntryKind::Song,
            play_order,
            headline: headline.to_string(),
        }
    }

    #[test]
    fn versions_increase_per_entry() {
        let mut ledger = PendingLedger::new();
        let v1 = ledger.next_version(5);
        let v2 = ledger.next_version(5);
        let other = ledger.next_version(6);

        assert_eq!(v1, 1);
        assert_eq!(v2, 2);
        assert_eq!(other, 1);

        assert!(!ledger.is_current(5, v1));
        assert!(ledger.is_current(5, v2));
        assert!(ledger.is_current(6, other));
    }

    #[test]
    fn take_removes_only_the_matching_op() {
        let mut ledger = PendingLedger::new();
        let cid_a = Uuid::new_v4();
        let cid_b = Uuid::new_v4();
        let v = ledger.next_version(-1);
        ledger.record(create_op(cid_a, -1, v, key(7, 40, "a")));
        let v = ledger.next_version(-2);
        ledger.record(create_op(cid_b, -2, v, key(7, 50, "b")));

        let taken = ledger.take(cid_a).unwrap();
        assert_eq!(taken.entry_id, -1);
        assert_eq!(ledger.len(), 1);
        assert!(ledger.take(cid_a).is_none());
        assert!(ledger.has_pending_for(-2));
    }

    #[test]
    fn echo_matching_finds_pending_create() {
        let mut ledger = PendingLedger::new();
        let cid = Uuid::new_v4();
        let v = ledger.next_version(-1);
        ledger.record(create_op(cid, -1, v, key(7, 40, "Wire Static")));

        assert_eq!(
            ledger.match_create_echo(&key(7, 40, "Wire Static")),
            Some(cid)
        );
        assert_eq!(ledger.match_create_echo(&key(7, 40, "Other Song")), None);
        assert_eq!(ledger.match_create_echo(&key(8, 40, "Wire Static")), None);
    }

    #[test]
    fn echo_matching_survives_backend_renumber() {
        let mut ledger = PendingLedger::new();
        let cid = Uuid::new_v4();
        let v = ledger.next_version(-1);
        ledger.record(create_op(cid, -1, v, key(7, 40, "Wire Static")));

        // Backend assigned a different play_order than the one proposed
        assert_eq!(
            ledger.match_create_echo(&key(7, 45, "Wire Static")),
            Some(cid)
        );
    }

    #[test]
    fn echo_matching_prefers_exact_position() {
        let mut ledger = PendingLedger::new();
        let cid_a = Uuid::new_v4();
        let cid_b = Uuid::new_v4();
        let v = ledger.next_version(-1);
        ledger.record(create_op(cid_a, -1, v, key(7, 40, "Wire Static")));
        let v = ledger.next_version(-2);
        ledger.record(create_op(cid_b, -2, v, key(7, 50, "Wire Static")));

        // Two pending creates share an identity; the one whose proposed
        // position matches the echo wins even though it was recorded later.
        assert_eq!(
            ledger.match_create_echo(&key(7, 50, "Wire Static")),
            Some(cid_b)
        );
    }

    #[test]
    fn adopt_id_repoints_ops_and_versions() {
        let mut ledger = PendingLedger::new();
        let cid = Uuid::new_v4();
        let v = ledger.next_version(-1);
        ledger.record(PendingOp {
            correlation_id: cid,
            kind: MutationKind::Update,
            entry_id: -1,
            version: v,
            rollback: Rollback::RevertField {
                entry_id: -1,
                prior: EntryFieldUpdate::TrackTitle("old".to_string()),
            },
            natural_key: None,
            submitted_at: Utc::now(),
        });

        ledger.adopt_id(-1, 41);

        let op = ledger.get(cid).unwrap();
        assert_eq!(op.entry_id, 41);
        match &op.rollback {
            Rollback::RevertField { entry_id, .. } => assert_eq!(*entry_id, 41),
            _ => panic!("unexpected rollback kind"),
        }
        assert!(ledger.is_current(41, v));
        assert!(!ledger.is_current(-1, v));
    }

    #[test]
    fn ops_keep_submission_order() {
        let mut ledger = PendingLedger::new();
        assert!(ledger.is_empty());

        let cids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for (i, cid) in cids.iter().enumerate() {
            let id = -(i as i64 + 1);
            let v = ledger.next_version(id);
            let po = (i as i64 + 1) * 10;
            ledger.record(create_op(*cid, id, v, key(7, po, &format!("song {i}"))));
        }

        let listed: Vec<Uuid> = ledger.ops().iter().map(|op| op.correlation_id).collect();
        assert_eq!(listed, cids);
    }
}
