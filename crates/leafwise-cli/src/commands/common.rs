use std::sync::Arc;

use chrono::Utc;
use leafwise_core::auth::{AuthUser, IdentityProvider, SessionHandle};
use leafwise_core::models::{Comment, Post, Scan};
use leafwise_core::registry::GatewayFactory;
use leafwise_core::{
    ClientConfig, CollectionGateway, CollectionKey, Entity, EntityId, FilterState,
    MutationHandle, SupabaseTableGateway, SyncController, SyncRegistry,
};

use crate::auth::profile_identity;
use crate::cli::ListArgs;
use crate::config_profiles::ProfileFile;
use crate::error::CliError;

const PENDING_LABEL: &str = "pending";

/// Profile name plus its configuration, with environment values taking precedence.
pub fn resolve_client_config(
    global_profile: Option<&str>,
) -> Result<(String, ClientConfig), CliError> {
    let profiles = ProfileFile::locate()?.read()?;
    let profile_name = profiles.resolve_profile_name(global_profile);
    let profile = profiles.profile(&profile_name).cloned().unwrap_or_default();
    let config = ClientConfig::from_env().or(profile);
    config.validate()?;
    Ok((profile_name, config))
}

/// Resolved configuration plus the restored session of one profile
pub struct AppContext {
    pub profile_name: String,
    pub config: ClientConfig,
    identity: SessionHandle,
}

impl AppContext {
    pub async fn load(global_profile: Option<&str>) -> Result<Self, CliError> {
        let (profile_name, config) = resolve_client_config(global_profile)?;
        let identity = match profile_identity(&profile_name, &config)? {
            Some(identity) => {
                identity.restore().await?;
                identity.session_handle()
            }
            None => SessionHandle::new(),
        };

        Ok(Self {
            profile_name,
            config,
            identity,
        })
    }

    pub fn identity(&self) -> Arc<dyn IdentityProvider> {
        Arc::new(self.identity.clone())
    }

    pub fn require_user(&self) -> Result<AuthUser, CliError> {
        self.identity.current_user().ok_or(CliError::NotSignedIn)
    }

    /// Registry whose collections are backed by the profile's Supabase tables.
    pub fn registry(&self) -> Result<SyncRegistry, CliError> {
        let rest = self
            .config
            .rest_config()?
            .ok_or(CliError::BackendNotConfigured)?;
        tracing::debug!(profile = %self.profile_name, backend = rest.base_url(), "opening collections");
        let identity = self.identity();
        let gateway_identity = Arc::clone(&identity);
        let factory: GatewayFactory = Arc::new(
            move |key: &CollectionKey| -> leafwise_core::Result<Arc<dyn CollectionGateway>> {
                let gateway = SupabaseTableGateway::new(
                    rest.clone(),
                    key.policy(),
                    Arc::clone(&gateway_identity),
                )?;
                Ok(Arc::new(gateway))
            },
        );
        Ok(SyncRegistry::new(identity, factory))
    }
}

/// Open `key` and load its first snapshot.
pub async fn open_collection(
    registry: &SyncRegistry,
    key: &CollectionKey,
) -> Result<SyncController, CliError> {
    let controller = registry.open(key)?;
    controller.refresh().await?;
    Ok(controller)
}

/// Wait for a mutation to reach the backend.
pub async fn settle(handle: MutationHandle) -> Result<Option<Entity>, CliError> {
    let op_id = handle.op_id();
    match handle.settled().await {
        Ok(entity) => Ok(entity),
        Err(error) => {
            tracing::debug!(?op_id, kind = %error.kind(), "mutation rolled back");
            Err(error.into())
        }
    }
}

impl ListArgs {
    pub fn filter_state(&self) -> FilterState {
        FilterState::search(self.search.trim()).with_category(self.category.trim())
    }
}

pub fn parse_id(raw: &str) -> Result<EntityId, CliError> {
    Ok(raw.parse::<EntityId>()?)
}

pub fn display_id(id: &EntityId) -> String {
    if id.is_temporary() {
        PENDING_LABEL.to_string()
    } else {
        id.to_string()
    }
}

pub fn ownership_marker(owner_id: Option<&str>, viewer: Option<&AuthUser>) -> &'static str {
    match (owner_id, viewer) {
        (Some(owner), Some(user)) if owner == user.id => "*",
        _ => " ",
    }
}

pub fn format_post_lines(posts: &[Post], viewer: Option<&AuthUser>) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    posts
        .iter()
        .map(|post| {
            let id = display_id(&post.id);
            let mine = ownership_marker(post.owner_id.as_deref(), viewer);
            let title = preview(&post.title, 40);
            let category = &post.category;
            let relative_time = format_relative_time(post.created_at, now_ms);
            format!("{mine}{id:<8}  {title:<40}  {category:<16}  {relative_time}")
        })
        .collect()
}

pub fn format_comment_lines(comments: &[Comment], viewer: Option<&AuthUser>) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    comments
        .iter()
        .map(|comment| {
            let id = display_id(&comment.id);
            let mine = ownership_marker(comment.owner_id.as_deref(), viewer);
            let content = preview(&comment.content, 60);
            let relative_time = format_relative_time(comment.created_at, now_ms);
            format!("{mine}{id:<8}  {content:<60}  {relative_time}")
        })
        .collect()
}

pub fn format_scan_lines(scans: &[Scan]) -> Vec<String> {
    scans
        .iter()
        .map(|scan| {
            let id = display_id(&scan.id);
            let diagnosis = scan.diagnosis.as_deref().unwrap_or("(no diagnosis)");
            let scanned_at = format_timestamp(scan.scanned_at);
            let image = preview(&scan.image_uri, 40);
            format!("{id:<8}  {scanned_at}  {diagnosis:<24}  {image}")
        })
        .collect()
}

/// First line of `text`, whitespace collapsed and cut at `max_chars`.
pub fn preview(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

/// Joined words, or `None` when only whitespace remains.
pub fn join_text(parts: &[String]) -> Option<String> {
    let joined = parts.join(" ");
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
