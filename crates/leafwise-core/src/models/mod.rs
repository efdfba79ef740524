//! Data models for Leafwise

mod entity;
mod kind;
mod pending;
mod records;

pub use entity::{Entity, EntityId, Payload};
pub use kind::{CollectionKey, CollectionKind, CollectionPolicy, OWNER_FIELD};
pub use pending::{MutationKind, MutationRequest, OpId, PendingOperation};
pub use records::{
    typed, Comment, Disease, NewComment, NewPost, NewScan, Post, PostChanges, Scan,
    DEFAULT_POST_CATEGORY, POST_CATEGORIES,
};
