//! Remote collection gateways: the only boundary between a collection
//! cache and the backend. Gateways map one call to one backend request and
//! never retry.

mod memory;
mod rest;

pub use memory::{CallPhase, GatewayCall, GatewayOp, InMemoryGateway};
pub use rest::{RestConfig, SupabaseTableGateway};

use async_trait::async_trait;

use crate::models::{Entity, EntityId, Payload};
use crate::Result;

/// Optional ordering and filter parameters for `list`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Restrict to entities owned by this user
    pub owner_id: Option<String>,
    /// Restrict to children of a parent: `(field, parent id)`
    pub parent: Option<(String, EntityId)>,
    /// Newest first when true (the default order of every screen)
    pub newest_first: bool,
    pub limit: Option<usize>,
}

impl ListQuery {
    pub fn newest_first() -> Self {
        Self {
            newest_first: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn owned_by(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    #[must_use]
    pub fn children_of(mut self, field: impl Into<String>, parent: EntityId) -> Self {
        self.parent = Some((field.into(), parent));
        self
    }

    /// Whether `entity` satisfies the owner and parent restrictions
    pub fn admits(&self, entity: &Entity) -> bool {
        let owner_ok = self
            .owner_id
            .as_deref()
            .is_none_or(|owner| entity.owner_id.as_deref() == Some(owner));
        let parent_ok = self.parent.as_ref().is_none_or(|(field, parent)| {
            entity
                .payload
                .get(field)
                .and_then(EntityId::from_json)
                .is_some_and(|id| &id == parent)
        });
        owner_ok && parent_ok
    }
}

/// Caller identity attached to mutations so the backend can scope them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
}

impl Actor {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// List/create/update/delete against the backend for one entity kind.
///
/// Failures: `Transport` on network failure, `Auth` for an invalid or
/// expired session, `Schema` for undecodable responses, `Validation` for
/// rejected input, `NotFound` for unknown ids.
#[async_trait]
pub trait CollectionGateway: Send + Sync {
    async fn list(&self, query: &ListQuery) -> Result<Vec<Entity>>;

    /// Create an entity; the backend assigns the final id.
    async fn create(&self, actor: &Actor, payload: &Payload) -> Result<Entity>;

    /// Apply a partial update. `Ok(None)` means accepted without a
    /// representation of the result.
    async fn update(&self, actor: &Actor, id: &EntityId, changes: &Payload)
        -> Result<Option<Entity>>;

    async fn delete(&self, actor: &Actor, id: &EntityId) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn admits_checks_owner_and_parent() {
        let comment = Entity::new(
            1,
            json!({"post_id": 7, "content": "hi"})
                .as_object()
                .cloned()
                .unwrap_or_default(),
            0,
        )
        .with_owner("U1");

        assert!(ListQuery::newest_first().admits(&comment));
        assert!(ListQuery::newest_first().owned_by("U1").admits(&comment));
        assert!(!ListQuery::newest_first().owned_by("U2").admits(&comment));
        assert!(ListQuery::newest_first()
            .children_of("post_id", EntityId::from(7))
            .admits(&comment));
        assert!(!ListQuery::newest_first()
            .children_of("post_id", EntityId::from(8))
            .admits(&comment));
    }
}
