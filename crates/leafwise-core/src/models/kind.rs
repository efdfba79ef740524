//! Collection kinds and the per-kind policy that drives filtering,
//! validation, and wire mapping.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entity::{EntityId, Payload};
use crate::{Error, Result};

/// Wire field holding the owning user's id
pub const OWNER_FIELD: &str = "user_id";

/// The entity kinds the app synchronizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Posts,
    Comments,
    Scans,
    Diseases,
}

impl CollectionKind {
    pub const ALL: [Self; 4] = [Self::Posts, Self::Comments, Self::Scans, Self::Diseases];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Posts => "posts",
            Self::Comments => "comments",
            Self::Scans => "scans",
            Self::Diseases => "diseases",
        }
    }

    pub const fn policy(self) -> CollectionPolicy {
        match self {
            Self::Posts => CollectionPolicy {
                kind: self,
                table: "posts",
                created_field: "created_at",
                category_field: Some("category"),
                search_fields: &["title", "content"],
                required_fields: &["title", "content"],
                owner_scoped: false,
                parent_field: None,
                read_only: false,
            },
            Self::Comments => CollectionPolicy {
                kind: self,
                table: "comments",
                created_field: "created_at",
                category_field: None,
                search_fields: &["content"],
                required_fields: &["content"],
                owner_scoped: false,
                parent_field: Some("post_id"),
                read_only: false,
            },
            Self::Scans => CollectionPolicy {
                kind: self,
                table: "scans",
                created_field: "scan_date",
                category_field: Some("diagnosis"),
                search_fields: &["diagnosis", "image_uri"],
                required_fields: &["image_uri", "diagnosis"],
                owner_scoped: true,
                parent_field: None,
                read_only: false,
            },
            Self::Diseases => CollectionPolicy {
                kind: self,
                table: "diseases",
                created_field: "created_at",
                category_field: Some("plant_type"),
                search_fields: &["name", "symptoms"],
                required_fields: &["name", "plant_type"],
                owner_scoped: false,
                parent_field: None,
                read_only: true,
            },
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Validation(format!("unknown collection kind '{s}'")))
    }
}

/// Static description of how one collection kind behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionPolicy {
    pub kind: CollectionKind,
    /// Backend table name
    pub table: &'static str,
    /// Wire field carrying the creation timestamp
    pub created_field: &'static str,
    /// Payload field matched against `FilterState::category`
    pub category_field: Option<&'static str>,
    /// Payload fields matched against `FilterState::search`
    pub search_fields: &'static [&'static str],
    /// Payload fields that must be non-blank on create
    pub required_fields: &'static [&'static str],
    /// List only the current user's entities
    pub owner_scoped: bool,
    /// Payload field referencing the parent entity (comments → post)
    pub parent_field: Option<&'static str>,
    /// Reference data that cannot be mutated from the client
    pub read_only: bool,
}

impl CollectionPolicy {
    /// Check a create payload for blank required fields.
    pub fn validate_create(&self, payload: &Payload) -> Result<()> {
        for field in self.required_fields {
            let present = match payload.get(*field) {
                Some(Value::String(text)) => !text.trim().is_empty(),
                Some(Value::Null) | None => false,
                Some(_) => true,
            };
            if !present {
                return Err(Error::Validation(format!("{field} is required")));
            }
        }
        Ok(())
    }

    /// Check an update patch: required fields may be omitted but not blanked.
    pub fn validate_update(&self, changes: &Payload) -> Result<()> {
        if changes.is_empty() {
            return Err(Error::Validation("no changes given".to_string()));
        }
        for field in self.required_fields {
            if let Some(value) = changes.get(*field) {
                let blank = match value {
                    Value::String(text) => text.trim().is_empty(),
                    Value::Null => true,
                    _ => false,
                };
                if blank {
                    return Err(Error::Validation(format!("{field} must not be empty")));
                }
            }
        }
        Ok(())
    }
}

/// Identifies one collection instance: its kind plus, for nested data,
/// the parent entity id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionKey {
    pub kind: CollectionKind,
    pub parent: Option<EntityId>,
}

impl CollectionKey {
    pub const fn new(kind: CollectionKind) -> Self {
        Self { kind, parent: None }
    }

    pub fn nested(kind: CollectionKind, parent: impl Into<EntityId>) -> Self {
        Self {
            kind,
            parent: Some(parent.into()),
        }
    }

    /// Comments belonging to one post
    pub fn comments_of(post_id: impl Into<EntityId>) -> Self {
        Self::nested(CollectionKind::Comments, post_id)
    }

    pub const fn policy(&self) -> CollectionPolicy {
        self.kind.policy()
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parent {
            Some(parent) => write!(f, "{}-of-{}", self.kind, parent),
            None => write!(f, "{}", self.kind),
        }
    }
}
