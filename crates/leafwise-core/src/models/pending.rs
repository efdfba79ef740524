//! Pending (optimistically applied, not yet confirmed) mutations

use std::fmt;

use serde::{Deserialize, Serialize};

use super::entity::{Entity, EntityId, Payload};

/// Local sequence number of a pending operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpId(pub u64);

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// What a consumer asks the controller to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRequest {
    Create(Payload),
    Update { id: EntityId, changes: Payload },
    Delete(EntityId),
}

impl MutationRequest {
    pub const fn kind(&self) -> MutationKind {
        match self {
            Self::Create(_) => MutationKind::Create,
            Self::Update { .. } => MutationKind::Update,
            Self::Delete(_) => MutationKind::Delete,
        }
    }

    /// Target id for update/delete requests
    pub const fn target(&self) -> Option<&EntityId> {
        match self {
            Self::Create(_) => None,
            Self::Update { id, .. } | Self::Delete(id) => Some(id),
        }
    }
}

/// Bookkeeping for one optimistic mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOperation {
    pub op_id: OpId,
    pub kind: MutationKind,
    /// Temporary id for creates, real id otherwise
    pub target_id: EntityId,
    /// Entity as it looked before this op was applied
    pub snapshot_before: Option<Entity>,
    /// Create payload or update patch; empty for deletes
    pub payload: Payload,
    /// Submitting user; stamped as owner on optimistic creates
    pub owner_id: Option<String>,
    /// Submission time (Unix ms)
    pub submitted_at: i64,
    /// The gateway call has been issued
    pub attempted: bool,
    /// How many times the consumer re-issued this mutation
    pub retries: u32,
}

impl PendingOperation {
    /// Apply this op's effect on top of `current`.
    ///
    /// Updates and deletes of an entity that no longer exists are no-ops.
    pub(crate) fn replay(&self, current: Option<Entity>) -> Option<Entity> {
        match self.kind {
            MutationKind::Create => Some(current.unwrap_or_else(|| Entity {
                id: self.target_id.clone(),
                owner_id: self.owner_id.clone(),
                payload: self.payload.clone(),
                created_at: self.submitted_at,
                updated_at: None,
                deleted: false,
            })),
            MutationKind::Update => current.map(|mut entity| {
                if !entity.deleted {
                    entity.merge(&self.payload);
                    entity.updated_at = Some(self.submitted_at);
                }
                entity
            }),
            MutationKind::Delete => current.map(|mut entity| {
                entity.deleted = true;
                entity
            }),
        }
    }

    /// Rebuild the consumer request this op was created from.
    pub fn to_request(&self) -> MutationRequest {
        match self.kind {
            MutationKind::Create => MutationRequest::Create(self.payload.clone()),
            MutationKind::Update => MutationRequest::Update {
                id: self.target_id.clone(),
                changes: self.payload.clone(),
            },
            MutationKind::Delete => MutationRequest::Delete(self.target_id.clone()),
        }
    }
}
