//! One sync controller per collection key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use crate::auth::IdentityProvider;
use crate::cache::IdRemap;
use crate::controller::SyncController;
use crate::gateway::CollectionGateway;
use crate::models::{CollectionKey, CollectionKind};
use crate::util::lock;
use crate::Result;

/// Builds the gateway backing a newly opened collection.
pub type GatewayFactory =
    Arc<dyn Fn(&CollectionKey) -> Result<Arc<dyn CollectionGateway>> + Send + Sync>;

struct RegistryInner {
    identity: Arc<dyn IdentityProvider>,
    factory: GatewayFactory,
    controllers: Mutex<HashMap<CollectionKey, SyncController>>,
}

/// Owns the controllers of every open collection.
///
/// A controller is created on first [`open`](Self::open) and destroyed by
/// [`evict`](Self::evict). When a post's temporary id is confirmed, the
/// comments opened under that id are re-keyed and their `post_id`
/// references rewritten.
#[derive(Clone)]
pub struct SyncRegistry {
    inner: Arc<RegistryInner>,
}

impl SyncRegistry {
    pub fn new(identity: Arc<dyn IdentityProvider>, factory: GatewayFactory) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                identity,
                factory,
                controllers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The controller for `key`, creating it on first use.
    pub fn open(&self, key: &CollectionKey) -> Result<SyncController> {
        let mut controllers = lock(&self.inner.controllers);
        if let Some(controller) = controllers.get(key) {
            return Ok(controller.clone());
        }

        let gateway = (self.inner.factory)(key)?;
        let controller = SyncController::new(key.clone(), gateway, Arc::clone(&self.inner.identity));
        let registry = Arc::downgrade(&self.inner);
        controller.set_remap_hook(Arc::new(move |source: &CollectionKey, remap: &IdRemap| {
            if let Some(inner) = Weak::upgrade(&registry) {
                propagate_remap(&inner, source, remap);
            }
        }));
        tracing::debug!(collection = %key, "collection opened");
        controllers.insert(key.clone(), controller.clone());
        Ok(controller)
    }

    pub fn get(&self, key: &CollectionKey) -> Option<SyncController> {
        lock(&self.inner.controllers).get(key).cloned()
    }

    /// Destroy the controller for `key`. In-flight refreshes are discarded;
    /// in-flight mutations still settle.
    pub fn evict(&self, key: &CollectionKey) -> bool {
        let removed = lock(&self.inner.controllers).remove(key);
        if let Some(controller) = &removed {
            controller.detach();
            tracing::debug!(collection = %key, "collection evicted");
        }
        removed.is_some()
    }

    pub fn keys(&self) -> Vec<CollectionKey> {
        let mut keys = lock(&self.inner.controllers)
            .keys()
            .cloned()
            .collect::<Vec<_>>();
        keys.sort();
        keys
    }

    /// Clear the session-expired state of every controller.
    pub fn resume_session(&self) {
        for controller in lock(&self.inner.controllers).values() {
            controller.resume_session();
        }
    }
}

fn propagate_remap(inner: &RegistryInner, source: &CollectionKey, remap: &IdRemap) {
    if source.kind != CollectionKind::Posts {
        return;
    }
    let Some(field) = CollectionKind::Comments.policy().parent_field else {
        return;
    };

    let mut controllers = lock(&inner.controllers);
    let stale = CollectionKey::comments_of(remap.from.clone());
    if let Some(controller) = controllers.remove(&stale) {
        let renamed = CollectionKey::comments_of(remap.to.clone());
        controller.rekey(renamed.clone());
        tracing::debug!(from = %stale, to = %renamed, "collection re-keyed");
        controllers.entry(renamed).or_insert(controller);
    }

    for (key, controller) in &*controllers {
        if key.kind == CollectionKind::Comments {
            let rewritten = controller.rewrite_reference(field, &remap.from, &remap.to);
            if rewritten > 0 {
                tracing::debug!(collection = %key, rewritten, "references remapped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::auth::{AuthSession, AuthUser, SessionHandle};
    use crate::gateway::InMemoryGateway;
    use crate::models::{EntityId, MutationRequest, Payload};
    use crate::policy::FilterState;

    fn identity() -> Arc<dyn IdentityProvider> {
        Arc::new(SessionHandle::with_session(AuthSession {
            access_token: "token".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: i64::MAX,
            user: AuthUser {
                id: "U1".to_string(),
                email: None,
            },
        }))
    }

    fn registry() -> SyncRegistry {
        let gateways: Arc<Mutex<HashMap<CollectionKind, Arc<InMemoryGateway>>>> = Arc::default();
        SyncRegistry::new(
            identity(),
            Arc::new(move |key: &CollectionKey| -> Result<Arc<dyn CollectionGateway>> {
                let gateway = lock(&gateways)
                    .entry(key.kind)
                    .or_insert_with(|| Arc::new(InMemoryGateway::new()))
                    .clone();
                Ok(gateway as Arc<dyn CollectionGateway>)
            }),
        )
    }

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn open_reuses_controller_until_evicted() {
        let registry = registry();
        let key = CollectionKey::new(CollectionKind::Posts);
        let first = registry.open(&key).unwrap();
        first
            .mutate(MutationRequest::Create(payload(json!({"title": "t", "content": "c"}))))
            .unwrap();

        assert_eq!(registry.open(&key).unwrap().view(&FilterState::default()).len(), 1);
        assert!(registry.evict(&key));
        assert!(registry.get(&key).is_none());
        assert!(registry.open(&key).unwrap().view(&FilterState::default()).is_empty());
    }

    #[tokio::test]
    async fn confirmed_post_rekeys_its_comment_collection() {
        let registry = registry();
        let posts = registry.open(&CollectionKey::new(CollectionKind::Posts)).unwrap();
        let handle = posts
            .mutate(MutationRequest::Create(payload(json!({"title": "t", "content": "c"}))))
            .unwrap();
        let temp = handle.target_id().clone();
        let comments = registry.open(&CollectionKey::comments_of(temp.clone())).unwrap();

        let created = handle.settled().await.unwrap().unwrap();
        assert!(registry.get(&CollectionKey::comments_of(temp)).is_none());
        assert!(registry.get(&CollectionKey::comments_of(created.id.clone())).is_some());
        assert_eq!(created.id, EntityId::from(1));
        assert_eq!(comments.key(), CollectionKey::comments_of(created.id));
    }
}
