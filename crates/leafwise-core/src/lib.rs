//! leafwise-core - Core library for Leafwise
//!
//! Synchronized, optimistically mutated collections (forum posts, comments,
//! scan history, disease library) on top of a remote backend, plus the
//! identity, classification, and advice clients the Leafwise front ends
//! share.
//!
//! Data flows one way: a [`SyncController`] fetches through a
//! [`CollectionGateway`] into its [`CollectionCache`], and consumers read
//! the filtered, ordered view produced by [`policy::materialize`].
//! Mutations are applied to the cache first and reconciled when the
//! gateway answers.

pub mod auth;
pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod gateway;
mod http;
pub mod inference;
pub mod library;
pub mod models;
pub mod policy;
pub mod registry;
pub mod state;
pub mod util;

pub use cache::{CollectionCache, IdRemap};
pub use config::ClientConfig;
pub use controller::{
    MutationFailure, MutationHandle, RefreshOutcome, SyncController, SyncEvent,
};
pub use error::{Error, FailureKind, FailureReason, Result};
pub use gateway::{CollectionGateway, InMemoryGateway, ListQuery, SupabaseTableGateway};
pub use models::{
    CollectionKey, CollectionKind, Entity, EntityId, MutationKind, MutationRequest, OpId, Payload,
};
pub use policy::FilterState;
pub use registry::SyncRegistry;
pub use state::SyncState;
