//! Sync controller: refresh, optimistic mutation, and reconciliation for
//! one collection.
//!
//! The controller owns its [`CollectionCache`] behind a short-lived lock.
//! Every cache transition (optimistic apply, confirm, rollback, refresh
//! replace) happens in one critical section, so readers never observe a
//! half-applied mutation, and no lock is held across a gateway call.
//!
//! Mutations on the same target id are chained in submission order; each
//! waits for its predecessor's gateway call to settle before issuing its
//! own. Mutations on different ids run concurrently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio::sync::{broadcast, oneshot};

use crate::auth::IdentityProvider;
use crate::cache::{CollectionCache, IdRemap};
use crate::error::FailureReason;
use crate::gateway::{Actor, CollectionGateway, ListQuery};
use crate::models::{
    CollectionKey, CollectionPolicy, Entity, EntityId, MutationKind, MutationRequest, OpId,
    Payload, PendingOperation,
};
use crate::policy::FilterState;
use crate::state::SyncState;
use crate::util::{lock, unix_millis_now};
use crate::{Error, Result};

const EVENT_CAPACITY: usize = 64;

/// Called with the controller's key whenever a create's temporary id is
/// replaced by the server-issued one.
pub type RemapHook = Arc<dyn Fn(&CollectionKey, &IdRemap) + Send + Sync>;

/// Notification broadcast to presentation layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Refreshed {
        key: CollectionKey,
        count: usize,
    },
    RefreshFailed {
        key: CollectionKey,
        reason: FailureReason,
    },
    MutationConfirmed {
        key: CollectionKey,
        op_id: OpId,
        kind: MutationKind,
        id: EntityId,
    },
    MutationFailed(MutationFailure),
    IdRemapped {
        key: CollectionKey,
        remap: IdRemap,
    },
    SessionExpired {
        key: CollectionKey,
    },
}

/// A rolled-back mutation, with enough context to re-issue it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationFailure {
    pub key: CollectionKey,
    pub op_id: OpId,
    pub kind: MutationKind,
    pub target_id: EntityId,
    pub request: MutationRequest,
    pub retries: u32,
    pub reason: FailureReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The snapshot replaced the confirmed state
    Applied { count: usize },
    /// The controller was detached while the list was in flight
    Discarded,
    /// A list requested later had already been applied
    Superseded,
}

/// Completion handle of one submitted mutation. Dropping it does not
/// cancel the mutation.
#[derive(Debug)]
pub struct MutationHandle {
    op_id: OpId,
    target_id: EntityId,
    receiver: oneshot::Receiver<Result<Option<Entity>>>,
}

impl MutationHandle {
    pub const fn op_id(&self) -> OpId {
        self.op_id
    }

    /// Id the optimistic effect was applied under (temporary for creates)
    pub const fn target_id(&self) -> &EntityId {
        &self.target_id
    }

    /// Wait for confirmation or rollback. Resolves to the confirmed entity,
    /// or `None` for deletes.
    pub async fn settled(self) -> Result<Option<Entity>> {
        self.receiver.await.map_err(|_| {
            Error::Runtime(format!("{} ended before settling", self.op_id))
        })?
    }
}

struct Lane {
    ticket: u64,
    done: oneshot::Receiver<()>,
}

struct Inner {
    key: Mutex<CollectionKey>,
    policy: CollectionPolicy,
    gateway: Arc<dyn CollectionGateway>,
    identity: Arc<dyn IdentityProvider>,
    cache: Mutex<CollectionCache>,
    lanes: Mutex<HashMap<EntityId, Lane>>,
    generation: AtomicU64,
    refreshing: AtomicUsize,
    session_expired: AtomicBool,
    remap_hook: Mutex<Option<RemapHook>>,
    events: broadcast::Sender<SyncEvent>,
}

/// Decrements the in-flight refresh counter, even if the refresh future
/// is dropped mid-flight.
struct RefreshGuard<'a>(&'a AtomicUsize);

impl<'a> RefreshGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct SyncController {
    inner: Arc<Inner>,
}

impl SyncController {
    pub fn new(
        key: CollectionKey,
        gateway: Arc<dyn CollectionGateway>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                policy: key.policy(),
                key: Mutex::new(key),
                gateway,
                identity,
                cache: Mutex::new(CollectionCache::new()),
                lanes: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
                refreshing: AtomicUsize::new(0),
                session_expired: AtomicBool::new(false),
                remap_hook: Mutex::new(None),
                events,
            }),
        }
    }

    pub fn key(&self) -> CollectionKey {
        self.inner.key()
    }

    pub fn policy(&self) -> CollectionPolicy {
        self.inner.policy
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    pub fn status(&self) -> SyncState {
        if self.inner.session_expired.load(Ordering::SeqCst) {
            return SyncState::SessionExpired;
        }
        let syncing = self.inner.refreshing.load(Ordering::SeqCst) > 0;
        let mutating = !lock(&self.inner.cache).pending_ops().is_empty();
        SyncState::from_activity(syncing, mutating)
    }

    /// Filtered, ordered view of the current items
    pub fn view(&self, filter: &FilterState) -> Vec<Entity> {
        lock(&self.inner.cache).view(filter, &self.inner.policy)
    }

    /// Every live item, unfiltered and in no particular order
    pub fn entities(&self) -> Vec<Entity> {
        lock(&self.inner.cache)
            .items()
            .filter(|entity| !entity.deleted)
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &EntityId) -> Option<Entity> {
        lock(&self.inner.cache)
            .get(id)
            .filter(|entity| !entity.deleted)
            .cloned()
    }

    pub fn pending_ops(&self) -> Vec<PendingOperation> {
        lock(&self.inner.cache).pending_ops().to_vec()
    }

    pub fn last_synced_at(&self) -> Option<i64> {
        lock(&self.inner.cache).last_synced_at()
    }

    /// Fetch the full collection and replace the confirmed snapshot.
    ///
    /// On failure the previous items stay untouched and `RefreshFailed` is
    /// broadcast. A response arriving after [`detach`](Self::detach) is
    /// discarded. Mutations that settle while the list is in flight keep
    /// their confirmed state when the response lands.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let inner = &self.inner;
        inner.ensure_session()?;
        let key = inner.key();
        let query = match inner.list_query(&key) {
            Ok(query) => query,
            Err(error) => {
                tracing::warn!(collection = %key, "refresh refused: {}", error);
                inner.emit(SyncEvent::RefreshFailed {
                    key,
                    reason: FailureReason::from(&error),
                });
                return Err(error);
            }
        };
        let generation = inner.generation.load(Ordering::SeqCst);
        let mark = lock(&inner.cache).settle_mark();

        tracing::debug!(collection = %key, "refresh started");
        let result = {
            let _guard = RefreshGuard::enter(&inner.refreshing);
            inner.gateway.list(&query).await
        };

        if inner.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(collection = %key, "refresh discarded after detach");
            return Ok(RefreshOutcome::Discarded);
        }

        match result {
            Ok(entities) => {
                let count = entities.len();
                if !lock(&inner.cache).replace_snapshot(entities, unix_millis_now(), mark) {
                    tracing::debug!(collection = %key, "refresh superseded by a newer list");
                    return Ok(RefreshOutcome::Superseded);
                }
                tracing::info!(collection = %key, count, "refresh applied");
                inner.emit(SyncEvent::Refreshed { key, count });
                Ok(RefreshOutcome::Applied { count })
            }
            Err(error) => {
                tracing::warn!(collection = %key, "refresh failed: {}", error);
                if error.is_session_fatal() {
                    inner.expire_session(&key);
                }
                inner.emit(SyncEvent::RefreshFailed {
                    key,
                    reason: FailureReason::from(&error),
                });
                Err(error)
            }
        }
    }

    /// Apply a mutation optimistically and dispatch it to the gateway.
    ///
    /// The effect is visible in [`view`](Self::view) when this returns.
    /// Local rejections (read-only collection, ownership, validation,
    /// expired session) return an error without touching the gateway.
    /// Must be called from within a tokio runtime.
    pub fn mutate(&self, request: MutationRequest) -> Result<MutationHandle> {
        self.submit(request, 0)
    }

    /// Re-issue a failed mutation with its retry count incremented.
    pub fn retry(&self, failure: &MutationFailure) -> Result<MutationHandle> {
        self.submit(failure.request.clone(), failure.retries.saturating_add(1))
    }

    /// Withdraw a mutation whose gateway call has not been issued yet.
    ///
    /// The optimistic effect is rolled back, `MutationFailed` is broadcast
    /// with a cancelled reason, and the handle resolves to
    /// [`Error::Cancelled`]. Once the call is on its way this fails with
    /// `Validation` and the mutation settles normally.
    pub fn cancel(&self, op_id: OpId) -> Result<()> {
        let inner = &self.inner;
        let key = inner.key();
        let op = {
            let mut cache = lock(&inner.cache);
            let attempted = cache
                .pending_op(op_id)
                .map(|op| op.attempted)
                .ok_or_else(|| Error::NotFound(format!("{op_id} is not pending")))?;
            if attempted {
                return Err(Error::Validation(format!("{op_id} was already sent")));
            }
            cache
                .rollback(op_id)
                .ok_or_else(|| Error::NotFound(format!("{op_id} is not pending")))?
        };

        tracing::info!(collection = %key, %op_id, kind = %op.kind, target = %op.target_id, "mutation cancelled");
        let error = Error::Cancelled(format!("{op_id} withdrawn before it was sent"));
        inner.emit(SyncEvent::MutationFailed(MutationFailure {
            key,
            op_id,
            kind: op.kind,
            target_id: op.target_id.clone(),
            request: op.to_request(),
            retries: op.retries,
            reason: FailureReason::from(&error),
        }));
        Ok(())
    }

    /// Cancel in-flight refreshes; their responses will be discarded.
    /// In-flight mutations still run to completion and reconcile.
    pub fn detach(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Clear the session-expired flag after the user re-authenticated.
    pub fn resume_session(&self) {
        self.inner.session_expired.store(false, Ordering::SeqCst);
    }

    pub fn set_remap_hook(&self, hook: RemapHook) {
        *lock(&self.inner.remap_hook) = Some(hook);
    }

    /// Point this controller at a new key (a parent id was remapped).
    pub(crate) fn rekey(&self, key: CollectionKey) {
        *lock(&self.inner.key) = key;
    }

    /// Rewrite payload references from one id to another.
    pub fn rewrite_reference(&self, field: &str, from: &EntityId, to: &EntityId) -> usize {
        lock(&self.inner.cache).rewrite_reference(field, from, to)
    }

    fn submit(&self, request: MutationRequest, retries: u32) -> Result<MutationHandle> {
        let inner = &self.inner;
        inner.ensure_session()?;
        if inner.policy.read_only {
            return Err(Error::Forbidden(format!(
                "{} cannot be modified",
                inner.policy.kind
            )));
        }
        let user = inner
            .identity
            .current_user()
            .ok_or_else(|| Error::Auth("sign in required".to_string()))?;
        let runtime = Handle::try_current().map_err(|error| Error::Runtime(error.to_string()))?;
        let key = inner.key();

        let (op_id, target_id, previous, done) = {
            let mut cache = lock(&inner.cache);
            let (kind, target_id, payload) = inner.prepare(&cache, &key, request, &user.id)?;
            let op_id = cache.next_op_id();
            let op_id = cache.apply_optimistic(PendingOperation {
                op_id,
                kind,
                target_id,
                snapshot_before: None,
                payload,
                owner_id: Some(user.id.clone()),
                submitted_at: unix_millis_now(),
                attempted: false,
                retries,
            });
            let target_id = cache
                .pending_op(op_id)
                .map(|op| op.target_id.clone())
                .ok_or_else(|| Error::Runtime(format!("{op_id} was not queued")))?;

            let (done_tx, done_rx) = oneshot::channel();
            let previous = lock(&inner.lanes)
                .insert(
                    target_id.clone(),
                    Lane {
                        ticket: op_id.0,
                        done: done_rx,
                    },
                )
                .map(|lane| lane.done);
            (op_id, target_id, previous, done_tx)
        };

        tracing::debug!(collection = %key, %op_id, target = %target_id, "mutation queued");

        let (reply, receiver) = oneshot::channel();
        let task_inner = Arc::clone(inner);
        runtime.spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            let outcome = task_inner.dispatch(op_id).await;
            task_inner.release_lane(op_id);
            let _ = done.send(());
            let _ = reply.send(outcome);
        });

        Ok(MutationHandle {
            op_id,
            target_id,
            receiver,
        })
    }
}

impl Inner {
    fn key(&self) -> CollectionKey {
        lock(&self.key).clone()
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn ensure_session(&self) -> Result<()> {
        if self.session_expired.load(Ordering::SeqCst) {
            return Err(Error::Auth("session expired; sign in again".to_string()));
        }
        Ok(())
    }

    fn expire_session(&self, key: &CollectionKey) {
        if !self.session_expired.swap(true, Ordering::SeqCst) {
            tracing::warn!(collection = %key, "session expired");
            self.emit(SyncEvent::SessionExpired { key: key.clone() });
        }
    }

    fn list_query(&self, key: &CollectionKey) -> Result<ListQuery> {
        let mut query = ListQuery::newest_first();
        if self.policy.owner_scoped {
            let user = self
                .identity
                .current_user()
                .ok_or_else(|| Error::Auth("sign in required".to_string()))?;
            query = query.owned_by(user.id);
        }
        if let (Some(field), Some(parent)) = (self.policy.parent_field, &key.parent) {
            query = query.children_of(field, parent.clone());
        }
        Ok(query)
    }

    /// Validate a request against local state and turn it into the
    /// pieces of a pending op.
    fn prepare(
        &self,
        cache: &CollectionCache,
        key: &CollectionKey,
        request: MutationRequest,
        user_id: &str,
    ) -> Result<(MutationKind, EntityId, Payload)> {
        match request {
            MutationRequest::Create(mut payload) => {
                if let Some(field) = self.policy.parent_field {
                    if !payload.contains_key(field) {
                        if let Some(parent) = &key.parent {
                            payload.insert(field.to_string(), parent.to_json());
                        }
                    }
                    let parent = payload.get(field).and_then(EntityId::from_json);
                    if parent.as_ref().is_some_and(EntityId::is_temporary) {
                        return Err(Error::Validation(format!(
                            "{field} refers to an entity that is not saved yet"
                        )));
                    }
                }
                self.policy.validate_create(&payload)?;
                Ok((MutationKind::Create, EntityId::temporary(), payload))
            }
            MutationRequest::Update { id, changes } => {
                self.policy.validate_update(&changes)?;
                let target = owned_target(cache, &id, user_id)?;
                Ok((MutationKind::Update, target, changes))
            }
            MutationRequest::Delete(id) => {
                let target = owned_target(cache, &id, user_id)?;
                Ok((MutationKind::Delete, target, Payload::new()))
            }
        }
    }

    async fn dispatch(&self, op_id: OpId) -> Result<Option<Entity>> {
        let key = self.key();
        let op = {
            let mut cache = lock(&self.cache);
            cache.mark_attempted(op_id);
            cache.pending_op(op_id).cloned()
        }
        .ok_or_else(|| Error::Cancelled(format!("{op_id} withdrawn before it was sent")))?;

        let result = if let Err(error) = self.ensure_session() {
            Err(error)
        } else if op.kind != MutationKind::Create && op.target_id.is_temporary() {
            Err(Error::NotFound(format!(
                "{} was never created on the server",
                op.target_id
            )))
        } else {
            self.call_gateway(&op).await
        };

        match result {
            Ok(entity) => Ok(self.confirm(&key, &op, entity)),
            Err(error) => {
                self.fail(&key, &op, &error);
                Err(error)
            }
        }
    }

    async fn call_gateway(&self, op: &PendingOperation) -> Result<Option<Entity>> {
        let actor = Actor::new(op.owner_id.clone().unwrap_or_default());
        tracing::debug!(op_id = %op.op_id, kind = %op.kind, target = %op.target_id, "dispatching mutation");
        match op.kind {
            MutationKind::Create => self.gateway.create(&actor, &op.payload).await.map(Some),
            MutationKind::Update => {
                self.gateway
                    .update(&actor, &op.target_id, &op.payload)
                    .await
            }
            MutationKind::Delete => self
                .gateway
                .delete(&actor, &op.target_id)
                .await
                .map(|()| None),
        }
    }

    fn confirm(
        &self,
        key: &CollectionKey,
        op: &PendingOperation,
        entity: Option<Entity>,
    ) -> Option<Entity> {
        let (remap, confirmed) = {
            let mut cache = lock(&self.cache);
            let remap = cache.confirm(op.op_id, entity);
            if let Some(remap) = &remap {
                // Ops retargeted to the final id keep waiting on this lane.
                let mut lanes = lock(&self.lanes);
                if let Some(lane) = lanes.remove(&remap.from) {
                    lanes.insert(remap.to.clone(), lane);
                }
            }
            let confirmed = match op.kind {
                MutationKind::Delete => None,
                _ => cache
                    .get(&op.target_id)
                    .filter(|entity| !entity.deleted)
                    .cloned(),
            };
            (remap, confirmed)
        };

        let final_id = remap
            .as_ref()
            .map_or_else(|| op.target_id.clone(), |remap| remap.to.clone());
        tracing::info!(collection = %key, op_id = %op.op_id, kind = %op.kind, id = %final_id, "mutation confirmed");
        self.emit(SyncEvent::MutationConfirmed {
            key: key.clone(),
            op_id: op.op_id,
            kind: op.kind,
            id: final_id,
        });

        if let Some(remap) = remap {
            let hook = lock(&self.remap_hook).clone();
            if let Some(hook) = hook {
                hook(key, &remap);
            }
            self.emit(SyncEvent::IdRemapped {
                key: key.clone(),
                remap,
            });
        }

        confirmed
    }

    fn fail(&self, key: &CollectionKey, op: &PendingOperation, error: &Error) {
        {
            let mut cache = lock(&self.cache);
            cache.rollback(op.op_id);
            if matches!(error, Error::NotFound(_)) && op.kind != MutationKind::Create {
                cache.evict(&op.target_id);
            }
        }
        tracing::warn!(collection = %key, op_id = %op.op_id, kind = %op.kind, target = %op.target_id, "mutation rolled back: {}", error);

        if error.is_session_fatal() {
            self.expire_session(key);
        }
        self.emit(SyncEvent::MutationFailed(MutationFailure {
            key: key.clone(),
            op_id: op.op_id,
            kind: op.kind,
            target_id: op.target_id.clone(),
            request: op.to_request(),
            retries: op.retries,
            reason: FailureReason::from(error),
        }));
    }

    fn release_lane(&self, op_id: OpId) {
        lock(&self.lanes).retain(|_, lane| lane.ticket != op_id.0);
    }
}

/// Resolve `id` to a live local entity the user may mutate.
fn owned_target(cache: &CollectionCache, id: &EntityId, user_id: &str) -> Result<EntityId> {
    let entity = cache
        .get(id)
        .filter(|entity| !entity.deleted)
        .ok_or_else(|| Error::NotFound(format!("no entity {id} in this collection")))?;
    if !entity.is_owned_by(user_id) {
        return Err(Error::Forbidden(format!(
            "{id} belongs to another user"
        )));
    }
    Ok(entity.id.clone())
}
