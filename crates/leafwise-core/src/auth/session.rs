//! The identity capability consumed by gateways and sync controllers.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use super::{AuthSession, AuthUser};
use crate::util::lock;
use crate::Result;

/// Read-only view of who is signed in.
///
/// Controllers only read the current user id to scope queries and check
/// ownership; they never manage the session lifecycle.
pub trait IdentityProvider: Send + Sync {
    fn current_user(&self) -> Option<AuthUser>;

    /// Bearer token for backend requests, if signed in
    fn access_token(&self) -> Option<String>;
}

/// Shared, observable slot holding the active session.
///
/// Cloning shares the slot. `subscribe` is the session-change hook:
/// dropping the receiver unsubscribes.
#[derive(Clone)]
pub struct SessionHandle {
    sender: Arc<watch::Sender<Option<AuthSession>>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_session(session: AuthSession) -> Self {
        let handle = Self::new();
        handle.set(Some(session));
        handle
    }

    pub fn set(&self, session: Option<AuthSession>) {
        self.sender.send_replace(session);
    }

    pub fn clear(&self) {
        self.set(None);
    }

    pub fn session(&self) -> Option<AuthSession> {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<AuthSession>> {
        self.sender.subscribe()
    }
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityProvider for SessionHandle {
    fn current_user(&self) -> Option<AuthUser> {
        self.sender
            .borrow()
            .as_ref()
            .map(|session| session.user.clone())
    }

    fn access_token(&self) -> Option<String> {
        self.sender
            .borrow()
            .as_ref()
            .map(|session| session.access_token.clone())
    }
}

/// Where a signed-in session survives between runs.
pub trait SessionVault: Send + Sync + 'static {
    fn load(&self) -> Result<Option<AuthSession>>;
    fn store(&self, session: &AuthSession) -> Result<()>;
    fn erase(&self) -> Result<()>;
}

/// Vault that lives as long as the process. Clones share the slot.
#[derive(Clone, Default)]
pub struct MemoryVault {
    slot: Arc<Mutex<Option<AuthSession>>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionVault for MemoryVault {
    fn load(&self) -> Result<Option<AuthSession>> {
        Ok(lock(&self.slot).clone())
    }

    fn store(&self, session: &AuthSession) -> Result<()> {
        *lock(&self.slot) = Some(session.clone());
        Ok(())
    }

    fn erase(&self) -> Result<()> {
        *lock(&self.slot) = None;
        Ok(())
    }
}
