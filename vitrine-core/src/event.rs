//! Lifecycle events and propagation tasks.
//!
//! The record store reports every committed mutation as a [`LifecycleEvent`].
//! Each event maps onto exactly one [`PropagationTask`] for the index.

use crate::record::RecordId;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A committed lifecycle transition of a catalog record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "event", content = "id", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Created(RecordId),
    Updated(RecordId),
    SoftDeleted(RecordId),
    Restored(RecordId),
    HardDeleted(RecordId),
}

impl LifecycleEvent {
    pub fn record_id(&self) -> RecordId {
        match *self {
            LifecycleEvent::Created(id)
            | LifecycleEvent::Updated(id)
            | LifecycleEvent::SoftDeleted(id)
            | LifecycleEvent::Restored(id)
            | LifecycleEvent::HardDeleted(id) => id,
        }
    }

    /// The index work this event requires.
    pub fn propagation_task(&self) -> PropagationTask {
        match *self {
            LifecycleEvent::Created(id)
            | LifecycleEvent::Updated(id)
            | LifecycleEvent::Restored(id) => PropagationTask::Upsert(id),
            LifecycleEvent::SoftDeleted(id) | LifecycleEvent::HardDeleted(id) => {
                PropagationTask::Delete(id)
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::Created(_) => "created",
            LifecycleEvent::Updated(_) => "updated",
            LifecycleEvent::SoftDeleted(_) => "soft_deleted",
            LifecycleEvent::Restored(_) => "restored",
            LifecycleEvent::HardDeleted(_) => "hard_deleted",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.record_id())
    }
}

/// Unit of asynchronous index work. Carries an id, never a snapshot: the
/// synchronizer re-reads the record when it executes the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "op", content = "id", rename_all = "snake_case")]
pub enum PropagationTask {
    Upsert(RecordId),
    Delete(RecordId),
}

impl PropagationTask {
    pub fn record_id(&self) -> RecordId {
        match *self {
            PropagationTask::Upsert(id) | PropagationTask::Delete(id) => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PropagationTask::Upsert(_) => "upsert",
            PropagationTask::Delete(_) => "delete",
        }
    }

    /// Inverse of [`kind`](Self::kind). Returns `None` for an unknown kind.
    pub fn from_kind(kind: &str, id: RecordId) -> Option<Self> {
        match kind {
            "upsert" => Some(PropagationTask::Upsert(id)),
            "delete" => Some(PropagationTask::Delete(id)),
            _ => None,
        }
    }
}

impl fmt::Display for PropagationTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind(), self.record_id())
    }
}

/// Receipt returned by a successful enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(transparent)]
pub struct TaskHandle(Uuid);

impl TaskHandle {
    /// Create a fresh, time-ordered handle.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Rebuild a handle read back from storage.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for TaskHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
