//! In-memory state of one collection. Never performs I/O.
//!
//! The cache keeps the last confirmed server snapshot separately from the
//! queue of pending operations. `items` is always the confirmed snapshot
//! with every pending op replayed on top, in submission order, so a
//! refresh never loses optimistic state and a rollback never disturbs the
//! effects of other ops stacked on the same entity.
//!
//! Every confirm and evict bumps a settle counter. A list response is
//! tagged with the counter value seen when the list was requested, and
//! whatever settled after that mark is laid back over the fresh snapshot,
//! since the server answered before knowing about it.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use crate::models::{CollectionPolicy, Entity, EntityId, MutationKind, OpId, PendingOperation};
use crate::policy::{materialize, FilterState};

/// A temporary id replaced by the server-issued one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdRemap {
    pub from: EntityId,
    pub to: EntityId,
}

#[derive(Debug, Clone, Default)]
pub struct CollectionCache {
    confirmed: BTreeMap<EntityId, Entity>,
    items: BTreeMap<EntityId, Entity>,
    pending: Vec<PendingOperation>,
    aliases: HashMap<EntityId, EntityId>,
    /// Entities settled since the last applied snapshot: `None` = gone
    settled: HashMap<EntityId, (u64, Option<Entity>)>,
    settle_seq: u64,
    snapshot_mark: u64,
    last_synced_at: Option<i64>,
    next_op: u64,
}

impl CollectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current known state, including optimistic effects and tombstones
    pub fn items(&self) -> impl Iterator<Item = &Entity> {
        self.items.values()
    }

    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.items.get(&self.resolve(id))
    }

    pub fn len(&self) -> usize {
        self.items.values().filter(|entity| !entity.deleted).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending_ops(&self) -> &[PendingOperation] {
        &self.pending
    }

    pub fn pending_op(&self, op_id: OpId) -> Option<&PendingOperation> {
        self.pending.iter().find(|op| op.op_id == op_id)
    }

    pub const fn last_synced_at(&self) -> Option<i64> {
        self.last_synced_at
    }

    /// Filtered, ordered view of the current items
    pub fn view(&self, filter: &FilterState, policy: &CollectionPolicy) -> Vec<Entity> {
        materialize(self.items.values(), filter, policy)
    }

    /// Follow temp → final aliases recorded by confirmed creates.
    pub fn resolve(&self, id: &EntityId) -> EntityId {
        let mut current = id.clone();
        while let Some(next) = self.aliases.get(&current) {
            current = next.clone();
        }
        current
    }

    /// Allocate the next local op id.
    pub fn next_op_id(&mut self) -> OpId {
        self.next_op += 1;
        OpId(self.next_op)
    }

    /// Settle counter to record when a list request is sent
    pub const fn settle_mark(&self) -> u64 {
        self.settle_seq
    }

    /// Replace the confirmed snapshot wholesale with a list that reflects
    /// every settle so far. Pending ops are re-applied on top.
    pub fn replace_all(&mut self, entities: Vec<Entity>, synced_at: i64) {
        let mark = self.settle_seq;
        self.replace_snapshot(entities, synced_at, mark);
    }

    /// Replace the confirmed snapshot with a list requested at `mark`.
    ///
    /// Entities confirmed or evicted after `mark` keep their settled state.
    /// Returns `false`, leaving the cache untouched, when a snapshot
    /// requested later than `mark` has already been applied.
    pub fn replace_snapshot(&mut self, entities: Vec<Entity>, synced_at: i64, mark: u64) -> bool {
        if mark < self.snapshot_mark {
            return false;
        }
        let mut confirmed = entities
            .into_iter()
            .map(|entity| (entity.id.clone(), entity))
            .collect::<BTreeMap<_, _>>();

        self.settled.retain(|_, (seq, _)| *seq > mark);
        for (id, (_, entity)) in &self.settled {
            match entity {
                Some(entity) => {
                    confirmed.insert(id.clone(), entity.clone());
                }
                None => {
                    confirmed.remove(id);
                }
            }
        }

        self.confirmed = confirmed;
        self.snapshot_mark = mark;
        self.last_synced_at = Some(synced_at);
        self.rebuild();
        true
    }

    /// Record a pending op and apply its effect immediately.
    pub fn apply_optimistic(&mut self, mut op: PendingOperation) -> OpId {
        op.target_id = self.resolve(&op.target_id);
        op.snapshot_before = self.items.get(&op.target_id).cloned();
        let op_id = op.op_id;
        self.pending.push(op);
        self.rebuild();
        op_id
    }

    /// Flag that the gateway call for `op_id` has been issued.
    pub fn mark_attempted(&mut self, op_id: OpId) {
        if let Some(op) = self.pending.iter_mut().find(|op| op.op_id == op_id) {
            op.attempted = true;
        }
    }

    /// Settle `op_id` as accepted by the backend.
    ///
    /// For creates, the temporary id is remapped to `final_entity.id` across
    /// the collection and the remap is returned so callers can propagate it
    /// to collections that reference this one.
    pub fn confirm(&mut self, op_id: OpId, final_entity: Option<Entity>) -> Option<IdRemap> {
        let index = self.pending.iter().position(|op| op.op_id == op_id)?;
        let op = self.pending.remove(index);

        let remap = match (op.kind, final_entity) {
            (MutationKind::Create, Some(entity)) => {
                let remap = (entity.id != op.target_id).then(|| IdRemap {
                    from: op.target_id.clone(),
                    to: entity.id.clone(),
                });
                if let Some(remap) = &remap {
                    self.aliases.insert(remap.from.clone(), remap.to.clone());
                    for pending in &mut self.pending {
                        if pending.target_id == remap.from {
                            pending.target_id = remap.to.clone();
                        }
                    }
                }
                self.settle(entity.id.clone(), Some(entity));
                remap
            }
            (MutationKind::Update, Some(entity)) => {
                self.settle(entity.id.clone(), Some(entity));
                None
            }
            (MutationKind::Update, None) => {
                // No representation returned: keep the optimistic result.
                if let Some(entity) = op.replay(self.confirmed.get(&op.target_id).cloned()) {
                    self.settle(entity.id.clone(), Some(entity));
                }
                None
            }
            (MutationKind::Create, None) => {
                if let Some(entity) = op.replay(None) {
                    self.settle(entity.id.clone(), Some(entity));
                }
                None
            }
            (MutationKind::Delete, _) => {
                self.settle(op.target_id.clone(), None);
                None
            }
        };

        self.rebuild();
        remap
    }

    /// Undo `op_id`: its effect disappears and the entity returns to the
    /// state implied by the confirmed snapshot and the remaining ops.
    pub fn rollback(&mut self, op_id: OpId) -> Option<PendingOperation> {
        let index = self.pending.iter().position(|op| op.op_id == op_id)?;
        let op = self.pending.remove(index);
        self.rebuild();
        Some(op)
    }

    /// Drop an entity the backend no longer knows about.
    pub fn evict(&mut self, id: &EntityId) -> bool {
        let id = self.resolve(id);
        let removed = self.confirmed.contains_key(&id);
        self.settle(id, None);
        self.rebuild();
        removed
    }

    /// Rewrite a payload reference from one id to another, in both the
    /// confirmed snapshot and pending payloads.
    pub fn rewrite_reference(&mut self, field: &str, from: &EntityId, to: &EntityId) -> usize {
        let mut rewritten = 0;
        let references = |value: Option<&Value>| {
            value
                .and_then(EntityId::from_json)
                .is_some_and(|id| &id == from)
        };

        for entity in self.confirmed.values_mut() {
            if references(entity.payload.get(field)) {
                entity.payload.insert(field.to_string(), to.to_json());
                rewritten += 1;
            }
        }
        for op in &mut self.pending {
            if references(op.payload.get(field)) {
                op.payload.insert(field.to_string(), to.to_json());
                rewritten += 1;
            }
        }

        self.rebuild();
        rewritten
    }

    /// Write a server-acknowledged state into the confirmed snapshot and
    /// remember it for lists that were already in flight.
    fn settle(&mut self, id: EntityId, entity: Option<Entity>) {
        self.settle_seq += 1;
        match &entity {
            Some(entity) => {
                self.confirmed.insert(id.clone(), entity.clone());
            }
            None => {
                self.confirmed.remove(&id);
            }
        }
        self.settled.insert(id, (self.settle_seq, entity));
    }

    fn rebuild(&mut self) {
        let mut items = self.confirmed.clone();
        for op in &self.pending {
            let current = items.remove(&op.target_id);
            if let Some(entity) = op.replay(current) {
                items.insert(op.target_id.clone(), entity);
            }
        }
        self.items = items;
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::models::{CollectionKind, Payload};

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap_or_default()
    }

    fn post(id: i64, title: &str, created_at: i64) -> Entity {
        Entity::new(id, payload(json!({"title": title, "content": "body"})), created_at)
            .with_owner("U1")
    }

    fn op(cache: &mut CollectionCache, kind: MutationKind, target: EntityId, value: Value) -> PendingOperation {
        PendingOperation {
            op_id: cache.next_op_id(),
            kind,
            target_id: target,
            snapshot_before: None,
            payload: payload(value),
            owner_id: Some("U1".to_string()),
            submitted_at: 10_000,
            attempted: false,
            retries: 0,
        }
    }

    fn titles(cache: &CollectionCache) -> Vec<String> {
        cache
            .view(&FilterState::default(), &CollectionKind::Posts.policy())
            .iter()
            .map(|entity| entity.text("title").unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn optimistic_create_is_visible_and_pending() {
        let mut cache = CollectionCache::new();
        cache.replace_all(vec![post(1, "Old", 100)], 1);
        let temp = EntityId::temporary();
        let create = op(&mut cache, MutationKind::Create, temp.clone(), json!({"title": "New", "content": "x"}));
        cache.apply_optimistic(create);

        assert_eq!(titles(&cache), vec!["New", "Old"]);
        assert_eq!(cache.pending_ops().len(), 1);
        assert!(cache.get(&temp).is_some());
    }

    #[test]
    fn confirm_create_remaps_temporary_id() {
        let mut cache = CollectionCache::new();
        let temp = EntityId::temporary();
        let create = op(&mut cache, MutationKind::Create, temp.clone(), json!({"title": "New", "content": "x"}));
        let op_id = cache.apply_optimistic(create);

        let remap = cache.confirm(op_id, Some(post(42, "New", 10_000))).unwrap();
        assert_eq!(remap, IdRemap { from: temp.clone(), to: EntityId::from(42) });
        assert!(cache.pending_ops().is_empty());
        assert_eq!(cache.resolve(&temp), EntityId::from(42));
        assert_eq!(cache.get(&temp).map(|entity| entity.id.clone()), Some(EntityId::from(42)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn confirm_retargets_later_ops_on_the_temp_id() {
        let mut cache = CollectionCache::new();
        let temp = EntityId::temporary();
        let create = op(&mut cache, MutationKind::Create, temp.clone(), json!({"title": "New", "content": "x"}));
        let create_id = cache.apply_optimistic(create);
        let update = op(&mut cache, MutationKind::Update, temp.clone(), json!({"title": "Newer"}));
        let update_id = cache.apply_optimistic(update);

        cache.confirm(create_id, Some(post(42, "New", 10_000)));
        assert_eq!(cache.pending_op(update_id).unwrap().target_id, EntityId::from(42));
        assert_eq!(titles(&cache), vec!["Newer"]);
    }

    #[test]
    fn rollback_update_restores_previous_view() {
        let mut cache = CollectionCache::new();
        cache.replace_all(vec![post(1, "Original", 100)], 1);
        let before = titles(&cache);

        let update = op(&mut cache, MutationKind::Update, EntityId::from(1), json!({"title": "Edited"}));
        let op_id = cache.apply_optimistic(update);
        assert_eq!(titles(&cache), vec!["Edited"]);
        assert_eq!(
            cache.pending_op(op_id).and_then(|op| op.snapshot_before.clone()),
            Some(post(1, "Original", 100))
        );

        cache.rollback(op_id);
        assert_eq!(titles(&cache), before);
        assert!(cache.pending_ops().is_empty());
    }

    #[test]
    fn rollback_of_one_stacked_op_keeps_the_other() {
        let mut cache = CollectionCache::new();
        cache.replace_all(vec![post(5, "Original", 100)], 1);
        let update = op(&mut cache, MutationKind::Update, EntityId::from(5), json!({"title": "Edited"}));
        let update_id = cache.apply_optimistic(update);
        let delete = op(&mut cache, MutationKind::Delete, EntityId::from(5), json!({}));
        cache.apply_optimistic(delete);
        assert!(titles(&cache).is_empty());

        cache.rollback(update_id);
        assert!(titles(&cache).is_empty(), "pending delete still hides the post");
        assert!(cache.get(&EntityId::from(5)).is_some_and(|entity| entity.deleted));
    }

    #[test]
    fn delete_tombstones_until_confirmed() {
        let mut cache = CollectionCache::new();
        cache.replace_all(vec![post(1, "Doomed", 100)], 1);
        let delete = op(&mut cache, MutationKind::Delete, EntityId::from(1), json!({}));
        let op_id = cache.apply_optimistic(delete);

        assert!(cache.get(&EntityId::from(1)).is_some_and(|entity| entity.deleted));
        assert!(cache.is_empty());

        cache.confirm(op_id, None);
        assert!(cache.get(&EntityId::from(1)).is_none());
    }

    #[test]
    fn replace_all_preserves_pending_create() {
        let mut cache = CollectionCache::new();
        let temp = EntityId::temporary();
        let create = op(&mut cache, MutationKind::Create, temp.clone(), json!({"title": "Mine", "content": "x"}));
        cache.apply_optimistic(create);

        cache.replace_all(vec![post(1, "Server", 100)], 2);
        assert_eq!(titles(&cache), vec!["Mine", "Server"]);
        assert_eq!(cache.last_synced_at(), Some(2));
    }

    #[test]
    fn evict_removes_confirmed_entity() {
        let mut cache = CollectionCache::new();
        cache.replace_all(vec![post(1, "Gone", 100), post(2, "Kept", 50)], 1);
        assert!(cache.evict(&EntityId::from(1)));
        assert_eq!(titles(&cache), vec!["Kept"]);
        assert!(!cache.evict(&EntityId::from(1)));
    }

    #[test]
    fn older_snapshot_keeps_mutations_settled_after_it_was_requested() {
        let mut cache = CollectionCache::new();
        cache.replace_all(vec![post(1, "Doomed", 100), post(2, "Original", 50)], 1);
        let mark = cache.settle_mark();

        let temp = EntityId::temporary();
        let create = op(&mut cache, MutationKind::Create, temp, json!({"title": "Mine", "content": "x"}));
        let create_id = cache.apply_optimistic(create);
        cache.confirm(create_id, Some(post(3, "Mine", 300)));
        let update = op(&mut cache, MutationKind::Update, EntityId::from(2), json!({"title": "Edited"}));
        let update_id = cache.apply_optimistic(update);
        cache.confirm(update_id, None);
        let delete = op(&mut cache, MutationKind::Delete, EntityId::from(1), json!({}));
        let delete_id = cache.apply_optimistic(delete);
        cache.confirm(delete_id, None);

        let applied = cache.replace_snapshot(
            vec![post(1, "Doomed", 100), post(2, "Original", 50)],
            2,
            mark,
        );
        assert!(applied);
        assert_eq!(titles(&cache), vec!["Mine", "Edited"]);
        assert_eq!(cache.last_synced_at(), Some(2));
    }

    #[test]
    fn snapshot_requested_after_a_settle_replaces_it() {
        let mut cache = CollectionCache::new();
        cache.replace_all(vec![post(1, "Old", 100)], 1);
        let update = op(&mut cache, MutationKind::Update, EntityId::from(1), json!({"title": "Mine"}));
        let update_id = cache.apply_optimistic(update);
        cache.confirm(update_id, None);

        let mark = cache.settle_mark();
        assert!(cache.replace_snapshot(vec![post(1, "Theirs", 100)], 2, mark));
        assert_eq!(titles(&cache), vec!["Theirs"]);
    }

    #[test]
    fn superseded_snapshot_is_rejected() {
        let mut cache = CollectionCache::new();
        let early = cache.settle_mark();
        let create = op(&mut cache, MutationKind::Create, EntityId::temporary(), json!({"title": "New", "content": "x"}));
        let create_id = cache.apply_optimistic(create);
        cache.confirm(create_id, Some(post(1, "New", 100)));

        assert!(cache.replace_snapshot(vec![post(1, "New", 100)], 2, cache.settle_mark()));
        assert!(!cache.replace_snapshot(Vec::new(), 3, early));
        assert_eq!(titles(&cache), vec!["New"]);
        assert_eq!(cache.last_synced_at(), Some(2));
    }

    #[test]
    fn rewrite_reference_updates_confirmed_and_pending_payloads() {
        let mut cache = CollectionCache::new();
        let temp = EntityId::temporary();
        cache.replace_all(
            vec![Entity::new(1, payload(json!({"post_id": temp.to_json(), "content": "a"})), 1)],
            1,
        );
        let create = op(
            &mut cache,
            MutationKind::Create,
            EntityId::temporary(),
            json!({"post_id": temp.to_json(), "content": "b"}),
        );
        cache.apply_optimistic(create);

        let rewritten = cache.rewrite_reference("post_id", &temp, &EntityId::from(42));
        assert_eq!(rewritten, 2);
        assert!(cache.items().all(|entity| entity.payload["post_id"] == json!(42)));
    }
}
