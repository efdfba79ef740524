//! Typed views over entities of each collection kind, plus payload builders.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entity::{Entity, EntityId, Payload};
use crate::{Error, Result};

/// Forum post categories offered when writing a post
pub const POST_CATEGORIES: [&str; 3] = ["Plant Diseases", "Farming Tips", "General Queries"];

/// Category assigned when a post is created without one
pub const DEFAULT_POST_CATEGORY: &str = "Plant Diseases";

fn required_text(entity: &Entity, field: &str) -> Result<String> {
    entity.text(field).map(str::to_string).ok_or_else(|| {
        Error::Schema(format!(
            "entity {} is missing text field '{field}'",
            entity.id
        ))
    })
}

fn optional_text(entity: &Entity, field: &str) -> Option<String> {
    entity
        .text(field)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn insert_text(payload: &mut Payload, field: &str, value: &str) {
    payload.insert(field.to_string(), Value::String(value.trim().to_string()));
}

/// A community forum post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: EntityId,
    pub owner_id: Option<String>,
    pub title: String,
    pub content: String,
    pub category: String,
    pub created_at: i64,
    pub pending: bool,
}

impl TryFrom<&Entity> for Post {
    type Error = Error;

    fn try_from(entity: &Entity) -> Result<Self> {
        Ok(Self {
            id: entity.id.clone(),
            owner_id: entity.owner_id.clone(),
            title: required_text(entity, "title")?,
            content: required_text(entity, "content")?,
            category: optional_text(entity, "category")
                .unwrap_or_else(|| DEFAULT_POST_CATEGORY.to_string()),
            created_at: entity.created_at,
            pending: entity.id.is_temporary(),
        })
    }
}

/// Fields for a new post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub category: Option<String>,
}

impl NewPost {
    pub fn into_payload(self) -> Payload {
        let mut payload = Payload::new();
        insert_text(&mut payload, "title", &self.title);
        insert_text(&mut payload, "content", &self.content);
        insert_text(
            &mut payload,
            "category",
            self.category.as_deref().unwrap_or(DEFAULT_POST_CATEGORY),
        );
        payload
    }
}

/// Partial edit of a post; `None` fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
}

impl PostChanges {
    pub fn into_payload(self) -> Payload {
        let mut payload = Payload::new();
        for (field, value) in [
            ("title", self.title),
            ("content", self.content),
            ("category", self.category),
        ] {
            if let Some(value) = value {
                insert_text(&mut payload, field, &value);
            }
        }
        payload
    }
}

/// A comment on a forum post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: EntityId,
    pub post_id: EntityId,
    pub owner_id: Option<String>,
    pub content: String,
    pub created_at: i64,
    pub pending: bool,
}

impl TryFrom<&Entity> for Comment {
    type Error = Error;

    fn try_from(entity: &Entity) -> Result<Self> {
        let post_id = entity
            .payload
            .get("post_id")
            .and_then(EntityId::from_json)
            .ok_or_else(|| Error::Schema(format!("comment {} has no post_id", entity.id)))?;
        Ok(Self {
            id: entity.id.clone(),
            post_id,
            owner_id: entity.owner_id.clone(),
            content: required_text(entity, "content")?,
            created_at: entity.created_at,
            pending: entity.id.is_temporary(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub post_id: EntityId,
    pub content: String,
}

impl NewComment {
    pub fn into_payload(self) -> Payload {
        let mut payload = Payload::new();
        payload.insert("post_id".to_string(), self.post_id.to_json());
        insert_text(&mut payload, "content", &self.content);
        payload
    }
}

/// A recorded disease scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scan {
    pub id: EntityId,
    pub owner_id: Option<String>,
    pub image_uri: String,
    pub diagnosis: Option<String>,
    pub scanned_at: i64,
    pub pending: bool,
}

impl TryFrom<&Entity> for Scan {
    type Error = Error;

    fn try_from(entity: &Entity) -> Result<Self> {
        Ok(Self {
            id: entity.id.clone(),
            owner_id: entity.owner_id.clone(),
            image_uri: required_text(entity, "image_uri")?,
            diagnosis: optional_text(entity, "diagnosis"),
            scanned_at: entity.created_at,
            pending: entity.id.is_temporary(),
        })
    }
}

/// A scan to record. The diagnosis must come from the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScan {
    pub image_uri: String,
    pub diagnosis: String,
}

impl NewScan {
    pub fn into_payload(self) -> Payload {
        let mut payload = Payload::new();
        insert_text(&mut payload, "image_uri", &self.image_uri);
        insert_text(&mut payload, "diagnosis", &self.diagnosis);
        payload
    }
}

/// A disease library entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disease {
    pub id: EntityId,
    pub name: String,
    pub plant_type: String,
    pub symptoms: String,
}

impl TryFrom<&Entity> for Disease {
    type Error = Error;

    fn try_from(entity: &Entity) -> Result<Self> {
        Ok(Self {
            id: entity.id.clone(),
            name: required_text(entity, "name")?,
            plant_type: required_text(entity, "plant_type")?,
            symptoms: optional_text(entity, "symptoms").unwrap_or_default(),
        })
    }
}

/// Convert a materialized view into typed records, skipping nothing:
/// the first malformed entity fails the whole conversion.
pub fn typed<'a, T>(entities: impl IntoIterator<Item = &'a Entity>) -> Result<Vec<T>>
where
    T: TryFrom<&'a Entity, Error = Error>,
{
    entities.into_iter().map(T::try_from).collect()
}
