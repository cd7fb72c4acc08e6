//! Flowsheet change and channel status type definitions
//!
//! Supporting types for sequence change notifications and live channel state.

use serde::{Deserialize, Serialize};

/// Why the flowsheet sequence changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum SequenceChangeTrigger {
    LocalAdd,
    LocalRemove,
    LocalMove,
    LocalEdit,
    QueuePromotion,
    RemotePush,
    Rollback,
    PageMerge,
    Resync,
}

impl std::fmt::Display for SequenceChangeTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SequenceChangeTrigger::LocalAdd => write!(f, "LocalAdd"),
            SequenceChangeTrigger::LocalRemove => write!(f, "LocalRemove"),
            SequenceChangeTrigger::LocalMove => write!(f, "LocalMove"),
            SequenceChangeTrigger::LocalEdit => write!(f, "LocalEdit"),
            SequenceChangeTrigger::QueuePromotion => write!(f, "QueuePromotion"),
            SequenceChangeTrigger::RemotePush => write!(f, "RemotePush"),
            SequenceChangeTrigger::Rollback => write!(f, "Rollback"),
            SequenceChangeTrigger::PageMerge => write!(f, "PageMerge"),
            SequenceChangeTrigger::Resync => write!(f, "Resync"),
        }
    }
}

/// Kind of backend mutation a local intent maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
    Reorder,
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationKind::Create => write!(f, "Create"),
            MutationKind::Update => write!(f, "Update"),
            MutationKind::Delete => write!(f, "Delete"),
            MutationKind::Reorder => write!(f, "Reorder"),
        }
    }
}

/// Live update channel connectivity state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ChannelStatus {
    /// Connected and applying remote pushes
    Live,
    /// Channel lost; serving local state, remote reconciliation paused
    Degraded,
    /// Reconnected; rebuilding state from the backend
    Resyncing,
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelStatus::Live => write!(f, "Live"),
            ChannelStatus::Degraded => write!(f, "Degraded"),
            ChannelStatus::Resyncing => write!(f, "Resyncing"),
        }
    }
}
