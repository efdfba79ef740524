//! Entity model shared by every synchronized collection

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

const TEMPORARY_PREFIX: &str = "tmp-";

/// Entity-specific fields, keyed by wire name.
pub type Payload = Map<String, Value>;

/// Opaque identifier of an entity within one collection.
///
/// Server ids are whatever the backend issues. Temporary ids are minted
/// locally for optimistic creates and replaced on confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Wrap a server-issued identifier
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Mint a temporary local id (UUID v7, time-sortable)
    #[must_use]
    pub fn temporary() -> Self {
        Self(format!("{TEMPORARY_PREFIX}{}", Uuid::now_v7()))
    }

    /// Whether this id was minted locally and awaits remote confirmation
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMPORARY_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read an id out of a JSON value; numbers are rendered as strings.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(text) if !text.trim().is_empty() => Some(Self(text.trim().to_string())),
            Value::Number(number) => Some(Self(number.to_string())),
            _ => None,
        }
    }

    /// JSON form of this id, numeric when the id is an integer.
    pub fn to_json(&self) -> Value {
        self.0
            .parse::<i64>()
            .map_or_else(|_| Value::String(self.0.clone()), Value::from)
    }
}

impl Ord for EntityId {
    /// Integers compare numerically, everything else lexically.
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0.parse::<i64>(), other.0.parse::<i64>()) {
            (Ok(left), Ok(right)) => left.cmp(&right),
            (Ok(_), Err(_)) => Ordering::Less,
            (Err(_), Ok(_)) => Ordering::Greater,
            (Err(_), Err(_)) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for EntityId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(crate::Error::Validation("id must not be empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl From<i64> for EntityId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One record within a synchronized collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique within its collection
    pub id: EntityId,
    /// Owning user, absent for shared reference data
    pub owner_id: Option<String>,
    /// Kind-specific fields
    pub payload: Payload,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last update timestamp (Unix ms)
    pub updated_at: Option<i64>,
    /// Tombstone left by an optimistic delete
    #[serde(default)]
    pub deleted: bool,
}

impl Entity {
    pub fn new(id: impl Into<EntityId>, payload: Payload, created_at: i64) -> Self {
        Self {
            id: id.into(),
            owner_id: None,
            payload,
            created_at,
            updated_at: None,
            deleted: false,
        }
    }

    #[must_use]
    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    /// String field from the payload, if present and textual
    pub fn text(&self, field: &str) -> Option<&str> {
        self.payload.get(field).and_then(Value::as_str)
    }

    /// Whether `user_id` may mutate this entity
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id.as_deref().is_none_or(|owner| owner == user_id)
    }

    /// Shallow-merge `changes` into the payload
    pub fn merge(&mut self, changes: &Payload) {
        for (key, value) in changes {
            self.payload.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn temporary_ids_are_unique_and_flagged() {
        let first = EntityId::temporary();
        let second = EntityId::temporary();
        assert_ne!(first, second);
        assert!(first.is_temporary());
        assert!(!EntityId::from(7).is_temporary());
    }

    #[test]
    fn numeric_ids_compare_numerically() {
        assert!(EntityId::from(10) > EntityId::from(9));
        assert!(EntityId::from("b") > EntityId::from("a"));
        assert!(EntityId::from("abc") > EntityId::from(999));
    }

    #[test]
    fn from_json_accepts_numbers_and_strings() {
        assert_eq!(EntityId::from_json(&json!(42)), Some(EntityId::from(42)));
        assert_eq!(
            EntityId::from_json(&json!("a1b2")),
            Some(EntityId::from("a1b2"))
        );
        assert_eq!(EntityId::from_json(&json!(null)), None);
        assert_eq!(EntityId::from_json(&json!("  ")), None);
    }

    #[test]
    fn to_json_keeps_integers_numeric() {
        assert_eq!(EntityId::from(5).to_json(), json!(5));
        assert_eq!(EntityId::from("uuid-ish").to_json(), json!("uuid-ish"));
    }

    #[test]
    fn parse_rejects_blank_ids() {
        assert!("  ".parse::<EntityId>().is_err());
        assert_eq!(" 12 ".parse::<EntityId>().unwrap(), EntityId::from(12));
    }

    #[test]
    fn merge_overwrites_only_given_fields() {
        let mut entity = Entity::new(1, payload(json!({"title": "Old", "content": "Body"})), 0);
        entity.merge(&payload(json!({"title": "New"})));
        assert_eq!(entity.text("title"), Some("New"));
        assert_eq!(entity.text("content"), Some("Body"));
    }

    #[test]
    fn ownerless_entities_are_open_to_everyone() {
        let shared = Entity::new(1, Payload::new(), 0);
        assert!(shared.is_owned_by("anyone"));
        let owned = shared.with_owner("U1");
        assert!(owned.is_owned_by("U1"));
        assert!(!owned.is_owned_by("U2"));
    }
}
