//! Supabase PostgREST gateway: one table per collection kind.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use super::{Actor, CollectionGateway, ListQuery};
use crate::auth::IdentityProvider;
use crate::http::status_error;
use crate::models::{CollectionPolicy, Entity, EntityId, Payload, OWNER_FIELD};
use crate::util::{is_http_url, normalize_text_option};
use crate::{Error, Result};

const NAIVE_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Project URL and anon key of a Supabase backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestConfig {
    base_url: String,
    anon_key: String,
}

impl RestConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Result<Self> {
        let base_url = normalize_text_option(Some(url.into()))
            .ok_or_else(|| Error::Config("Supabase URL must not be empty".to_string()))?;
        if !is_http_url(&base_url) {
            return Err(Error::Config(
                "Supabase URL must include http:// or https://".to_string(),
            ));
        }
        let anon_key = normalize_text_option(Some(anon_key.into()))
            .ok_or_else(|| Error::Config("Supabase anon key must not be empty".to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }
}

#[derive(Clone)]
pub struct SupabaseTableGateway {
    config: RestConfig,
    policy: CollectionPolicy,
    client: Client,
    identity: Arc<dyn IdentityProvider>,
}

impl SupabaseTableGateway {
    pub fn new(
        config: RestConfig,
        policy: CollectionPolicy,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|error| Error::Transport(error.to_string()))?;
        Ok(Self {
            config,
            policy,
            client,
            identity,
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.config.base_url, self.policy.table)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .identity
            .access_token()
            .unwrap_or_else(|| self.config.anon_key.clone());
        request
            .header("apikey", &self.config.anon_key)
            .bearer_auth(bearer)
            .header("Accept", "application/json")
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|error| Error::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let body = response
            .text()
            .await
            .map_err(|error| Error::Transport(error.to_string()))?;
        if body.trim().is_empty() {
            return Ok(Value::Array(Vec::new()));
        }
        serde_json::from_str(&body).map_err(|error| Error::Schema(error.to_string()))
    }

    fn decode_rows(&self, value: Value) -> Result<Vec<Entity>> {
        match value {
            Value::Array(rows) => rows
                .into_iter()
                .map(|row| decode_record(&self.policy, row))
                .collect(),
            other => Ok(vec![decode_record(&self.policy, other)?]),
        }
    }
}

#[async_trait]
impl CollectionGateway for SupabaseTableGateway {
    async fn list(&self, query: &ListQuery) -> Result<Vec<Entity>> {
        let params = list_params(&self.policy, query);
        tracing::debug!(table = self.policy.table, ?params, "listing rows");
        let body = self
            .send(self.client.get(self.table_url()).query(&params))
            .await?;
        self.decode_rows(body)
    }

    async fn create(&self, actor: &Actor, payload: &Payload) -> Result<Entity> {
        let row = encode_create(&self.policy, actor, payload);
        let body = self
            .send(
                self.client
                    .post(self.table_url())
                    .header("Prefer", "return=representation")
                    .json(&row),
            )
            .await?;
        self.decode_rows(body)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Schema(format!("{} insert returned no row", self.policy.table)))
    }

    async fn update(
        &self,
        actor: &Actor,
        id: &EntityId,
        changes: &Payload,
    ) -> Result<Option<Entity>> {
        let body = self
            .send(
                self.client
                    .patch(self.table_url())
                    .query(&scoped_params(actor, id))
                    .header("Prefer", "return=representation")
                    .json(changes),
            )
            .await?;
        let updated = self.decode_rows(body)?.into_iter().next().ok_or_else(|| {
            Error::NotFound(format!("{} {id} is not editable by this user", self.policy.kind))
        })?;
        Ok(Some(updated))
    }

    async fn delete(&self, actor: &Actor, id: &EntityId) -> Result<()> {
        let body = self
            .send(
                self.client
                    .delete(self.table_url())
                    .query(&scoped_params(actor, id))
                    .header("Prefer", "return=representation"),
            )
            .await?;
        if self.decode_rows(body)?.is_empty() {
            return Err(Error::NotFound(format!(
                "{} {id} is not deletable by this user",
                self.policy.kind
            )));
        }
        Ok(())
    }
}

/// PostgREST query parameters for a list call.
pub(crate) fn list_params(policy: &CollectionPolicy, query: &ListQuery) -> Vec<(String, String)> {
    let direction = if query.newest_first { "desc" } else { "asc" };
    let mut params = vec![
        ("select".to_string(), "*".to_string()),
        (
            "order".to_string(),
            format!("{}.{direction}", policy.created_field),
        ),
    ];
    if let Some(owner) = &query.owner_id {
        params.push((OWNER_FIELD.to_string(), format!("eq.{owner}")));
    }
    if let Some((field, parent)) = &query.parent {
        params.push((field.clone(), format!("eq.{parent}")));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

fn scoped_params(actor: &Actor, id: &EntityId) -> [(&'static str, String); 2] {
    [
        ("id", format!("eq.{id}")),
        (OWNER_FIELD, format!("eq.{}", actor.user_id)),
    ]
}

/// Insert body: the payload plus the owner and, for kinds whose creation
/// time lives in a custom column, a client-side timestamp.
pub(crate) fn encode_create(policy: &CollectionPolicy, actor: &Actor, payload: &Payload) -> Payload {
    let mut row = payload.clone();
    row.insert(OWNER_FIELD.to_string(), Value::String(actor.user_id.clone()));
    if policy.created_field != "created_at" && !row.contains_key(policy.created_field) {
        row.insert(
            policy.created_field.to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
    }
    row
}

/// Decode one row into an entity. Bookkeeping columns are lifted out of
/// the payload; everything else stays as-is.
pub(crate) fn decode_record(policy: &CollectionPolicy, row: Value) -> Result<Entity> {
    let Value::Object(mut payload) = row else {
        return Err(Error::Schema(format!(
            "{} row is not an object",
            policy.table
        )));
    };

    let id = payload
        .remove("id")
        .as_ref()
        .and_then(EntityId::from_json)
        .ok_or_else(|| Error::Schema(format!("{} row has no id", policy.table)))?;
    let owner_id = payload
        .remove(OWNER_FIELD)
        .and_then(|value| value.as_str().map(str::to_string));
    let created_at = payload
        .remove(policy.created_field)
        .as_ref()
        .and_then(parse_timestamp)
        .ok_or_else(|| {
            Error::Schema(format!(
                "{} row {id} has no readable {}",
                policy.table, policy.created_field
            ))
        })?;
    let updated_at = payload
        .remove("updated_at")
        .as_ref()
        .and_then(parse_timestamp);

    Ok(Entity {
        id,
        owner_id,
        payload,
        created_at,
        updated_at,
        deleted: false,
    })
}

/// Parse a timestamp column into Unix milliseconds.
pub(crate) fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => {
            let text = text.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
                return Some(parsed.timestamp_millis());
            }
            NAIVE_TIMESTAMP_FORMATS.iter().find_map(|format| {
                NaiveDateTime::parse_from_str(text, format)
                    .ok()
                    .map(|parsed| parsed.and_utc().timestamp_millis())
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::models::CollectionKind;

    #[test]
    fn rest_config_rejects_invalid_values() {
        assert!(RestConfig::new("", "key").is_err());
        assert!(RestConfig::new("demo.supabase.co", "key").is_err());
        assert!(RestConfig::new("https://demo.supabase.co", "  ").is_err());
        let config = RestConfig::new("https://demo.supabase.co/", "key").unwrap();
        assert_eq!(config.base_url(), "https://demo.supabase.co");
    }

    #[test]
    fn list_params_order_and_scope() {
        let policy = CollectionKind::Scans.policy();
        let params = list_params(&policy, &ListQuery::newest_first().owned_by("U1"));
        assert_eq!(
            params,
            vec![
                ("select".to_string(), "*".to_string()),
                ("order".to_string(), "scan_date.desc".to_string()),
                ("user_id".to_string(), "eq.U1".to_string()),
            ]
        );
    }

    #[test]
    fn list_params_for_comments_filter_by_post() {
        let policy = CollectionKind::Comments.policy();
        let query = ListQuery::newest_first().children_of("post_id", EntityId::from(7));
        let params = list_params(&policy, &query);
        assert!(params.contains(&("post_id".to_string(), "eq.7".to_string())));
        assert!(params.contains(&("order".to_string(), "created_at.desc".to_string())));
    }

    #[test]
    fn decode_record_lifts_bookkeeping_columns() {
        let entity = decode_record(
            &CollectionKind::Posts.policy(),
            json!({
                "id": 12,
                "user_id": "U1",
                "title": "Yellow leaves",
                "content": "On my tomatoes",
                "category": "Plant Diseases",
                "created_at": "2024-05-01T10:00:00+00:00"
            }),
        )
        .unwrap();

        assert_eq!(entity.id, EntityId::from(12));
        assert_eq!(entity.owner_id.as_deref(), Some("U1"));
        assert_eq!(entity.created_at, 1_714_557_600_000);
        assert_eq!(entity.text("title"), Some("Yellow leaves"));
        assert!(!entity.payload.contains_key("id"));
        assert!(!entity.payload.contains_key("created_at"));
    }

    #[test]
    fn decode_record_rejects_rows_without_id() {
        let error = decode_record(
            &CollectionKind::Posts.policy(),
            json!({"title": "x", "created_at": "2024-05-01T10:00:00Z"}),
        )
        .unwrap_err();
        assert!(matches!(error, Error::Schema(_)));
    }

    #[test]
    fn parse_timestamp_accepts_naive_and_numeric_values() {
        assert_eq!(
            parse_timestamp(&json!("2024-05-01T10:00:00.500")),
            Some(1_714_557_600_500)
        );
        assert_eq!(
            parse_timestamp(&json!("2024-05-01 10:00:00")),
            Some(1_714_557_600_000)
        );
        assert_eq!(parse_timestamp(&json!(42)), Some(42));
        assert_eq!(parse_timestamp(&json!("yesterday")), None);
    }

    #[test]
    fn encode_create_stamps_owner_and_scan_date() {
        let payload = json!({"image_uri": "file://leaf.jpg", "diagnosis": "Rust"})
            .as_object()
            .cloned()
            .unwrap_or_default();
        let row = encode_create(&CollectionKind::Scans.policy(), &Actor::new("U1"), &payload);
        assert_eq!(row["user_id"], json!("U1"));
        assert!(row.get("scan_date").and_then(parse_timestamp).is_some());

        let post = encode_create(&CollectionKind::Posts.policy(), &Actor::new("U1"), &payload);
        assert!(!post.contains_key("created_at"));
    }
}
