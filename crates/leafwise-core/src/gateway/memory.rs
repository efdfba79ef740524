//! In-process gateway. Serves built-in reference data and stands in for
//! the backend in tests, with failure injection, latency, and a call log.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{Actor, CollectionGateway, ListQuery};
use crate::error::FailureKind;
use crate::models::{Entity, EntityId, Payload};
use crate::policy::newest_first;
use crate::util::{lock, unix_millis_now};
use crate::{Error, Result};

/// Gateway operation, used to target injected failures and latency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    List,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Started,
    Finished,
}

/// One entry of the call log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCall {
    pub op: GatewayOp,
    pub target: Option<EntityId>,
    pub phase: CallPhase,
}

#[derive(Default)]
pub struct InMemoryGateway {
    entities: Mutex<BTreeMap<EntityId, Entity>>,
    next_id: AtomicI64,
    failures: Mutex<HashMap<GatewayOp, VecDeque<FailureKind>>>,
    latency: Mutex<HashMap<GatewayOp, Duration>>,
    response_lag: Mutex<HashMap<GatewayOp, Duration>>,
    calls: Mutex<Vec<GatewayCall>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway pre-populated with `entities`. New ids continue after the
    /// largest numeric id present.
    pub fn seeded(entities: impl IntoIterator<Item = Entity>) -> Self {
        let gateway = Self::new();
        for entity in entities {
            gateway.insert(entity);
        }
        gateway
    }

    /// Put an entity directly into the backing store (no call logged).
    pub fn insert(&self, entity: Entity) {
        if let Ok(numeric) = entity.id.as_str().parse::<i64>() {
            self.next_id.fetch_max(numeric, Ordering::SeqCst);
        }
        lock(&self.entities).insert(entity.id.clone(), entity);
    }

    /// Remove an entity behind the cache's back (simulates another client).
    pub fn remove(&self, id: &EntityId) -> Option<Entity> {
        lock(&self.entities).remove(id)
    }

    pub fn get(&self, id: &EntityId) -> Option<Entity> {
        lock(&self.entities).get(id).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.entities).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make the next call of `op` fail with `kind`.
    pub fn fail_next(&self, op: GatewayOp, kind: FailureKind) {
        lock(&self.failures).entry(op).or_default().push_back(kind);
    }

    /// Delay every call of `op` by `delay` before it touches the store.
    pub fn set_latency(&self, op: GatewayOp, delay: Duration) {
        lock(&self.latency).insert(op, delay);
    }

    /// Delay every answer of `op` by `delay` after it has touched the
    /// store, so a list can return a snapshot older than its arrival.
    pub fn set_response_lag(&self, op: GatewayOp, delay: Duration) {
        lock(&self.response_lag).insert(op, delay);
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        lock(&self.calls).clone()
    }

    /// Number of calls started for `op`
    pub fn started(&self, op: GatewayOp) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| call.op == op && call.phase == CallPhase::Started)
            .count()
    }

    fn record(&self, op: GatewayOp, target: Option<&EntityId>, phase: CallPhase) {
        lock(&self.calls).push(GatewayCall {
            op,
            target: target.cloned(),
            phase,
        });
    }

    async fn begin(&self, op: GatewayOp, target: Option<&EntityId>) -> Result<()> {
        self.record(op, target, CallPhase::Started);
        let delay = lock(&self.latency).get(&op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let injected = lock(&self.failures)
            .get_mut(&op)
            .and_then(VecDeque::pop_front);
        match injected {
            Some(kind) => {
                self.record(op, target, CallPhase::Finished);
                Err(Error::from_kind(kind, format!("injected {op:?} failure")))
            }
            None => Ok(()),
        }
    }

    async fn finish<T>(
        &self,
        op: GatewayOp,
        target: Option<&EntityId>,
        result: Result<T>,
    ) -> Result<T> {
        let lag = lock(&self.response_lag).get(&op).copied();
        if let Some(lag) = lag {
            tokio::time::sleep(lag).await;
        }
        self.record(op, target, CallPhase::Finished);
        result
    }

    fn owned_entity(&self, actor: &Actor, id: &EntityId) -> Result<Entity> {
        lock(&self.entities)
            .get(id)
            .filter(|entity| entity.is_owned_by(&actor.user_id))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no entity {id} owned by {}", actor.user_id)))
    }
}

#[async_trait]
impl CollectionGateway for InMemoryGateway {
    async fn list(&self, query: &ListQuery) -> Result<Vec<Entity>> {
        self.begin(GatewayOp::List, None).await?;
        let mut entities = lock(&self.entities)
            .values()
            .filter(|entity| query.admits(entity))
            .cloned()
            .collect::<Vec<_>>();
        if query.newest_first {
            entities.sort_by(newest_first);
        }
        if let Some(limit) = query.limit {
            entities.truncate(limit);
        }
        self.finish(GatewayOp::List, None, Ok(entities)).await
    }

    async fn create(&self, actor: &Actor, payload: &Payload) -> Result<Entity> {
        self.begin(GatewayOp::Create, None).await?;
        let id = EntityId::from(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let entity = Entity::new(id.clone(), payload.clone(), unix_millis_now())
            .with_owner(actor.user_id.clone());
        lock(&self.entities).insert(id.clone(), entity.clone());
        self.finish(GatewayOp::Create, Some(&id), Ok(entity)).await
    }

    async fn update(
        &self,
        actor: &Actor,
        id: &EntityId,
        changes: &Payload,
    ) -> Result<Option<Entity>> {
        self.begin(GatewayOp::Update, Some(id)).await?;
        let result = self.owned_entity(actor, id).map(|mut entity| {
            entity.merge(changes);
            entity.updated_at = Some(unix_millis_now());
            lock(&self.entities).insert(id.clone(), entity.clone());
            Some(entity)
        });
        self.finish(GatewayOp::Update, Some(id), result).await
    }

    async fn delete(&self, actor: &Actor, id: &EntityId) -> Result<()> {
        self.begin(GatewayOp::Delete, Some(id)).await?;
        let result = self.owned_entity(actor, id).map(|_| {
            lock(&self.entities).remove(id);
        });
        self.finish(GatewayOp::Delete, Some(id), result).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn payload(title: &str) -> Payload {
        json!({"title": title, "content": "body"})
            .as_object()
            .cloned()
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn create_issues_ids_after_seeded_maximum() {
        let gateway = InMemoryGateway::seeded([Entity::new(41, payload("seed"), 0)]);
        let created = gateway.create(&Actor::new("U1"), &payload("new")).await.unwrap();
        assert_eq!(created.id, EntityId::from(42));
        assert_eq!(created.owner_id.as_deref(), Some("U1"));
        assert_eq!(gateway.len(), 2);
    }

    #[tokio::test]
    async fn update_of_foreign_entity_is_not_found() {
        let gateway = InMemoryGateway::seeded([Entity::new(1, payload("theirs"), 0).with_owner("U2")]);
        let error = gateway
            .update(&Actor::new("U1"), &EntityId::from(1), &payload("mine"))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn injected_failure_applies_once() {
        let gateway = InMemoryGateway::new();
        gateway.fail_next(GatewayOp::List, FailureKind::Transport);
        assert!(matches!(
            gateway.list(&ListQuery::newest_first()).await,
            Err(Error::Transport(_))
        ));
        assert!(gateway.list(&ListQuery::newest_first()).await.is_ok());
        assert_eq!(gateway.started(GatewayOp::List), 2);
    }

    #[tokio::test]
    async fn list_filters_by_owner_and_orders_newest_first() {
        let gateway = InMemoryGateway::seeded([
            Entity::new(1, payload("a"), 100).with_owner("U1"),
            Entity::new(2, payload("b"), 300).with_owner("U2"),
            Entity::new(3, payload("c"), 200).with_owner("U1"),
        ]);
        let listed = gateway
            .list(&ListQuery::newest_first().owned_by("U1"))
            .await
            .unwrap();
        let ids = listed.into_iter().map(|entity| entity.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![EntityId::from(3), EntityId::from(1)]);
    }

    #[tokio::test]
    async fn lagged_list_answers_with_the_snapshot_it_read() {
        let gateway = std::sync::Arc::new(InMemoryGateway::seeded([Entity::new(1, payload("a"), 0)]));
        gateway.set_response_lag(GatewayOp::List, Duration::from_millis(50));

        let listing = {
            let gateway = std::sync::Arc::clone(&gateway);
            tokio::spawn(async move { gateway.list(&ListQuery::newest_first()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        gateway.remove(&EntityId::from(1));

        let listed = listing.await.unwrap().unwrap();
        assert_eq!(listed.len(), 1);
        assert!(gateway.is_empty());
    }
}
