//! Email/password identity against Supabase GoTrue.
//!
//! [`SupabaseIdentity`] owns the session lifecycle. Every flow ends in one
//! of two ways: the session is adopted (written to the vault, then
//! published on the [`SessionHandle`] that gateways and controllers read),
//! or it is forgotten by both.

mod session;

pub use session::{IdentityProvider, MemoryVault, SessionHandle, SessionVault};

use std::fmt;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::gateway::RestConfig;
use crate::http::{send_json, status_error};
use crate::util::unix_timestamp_now;
use crate::{Error, Result};

/// Sessions this close to expiry count as expired (seconds)
const EXPIRY_MARGIN: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds
    pub expires_at: i64,
    pub user: AuthUser,
}

impl AuthSession {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        unix_timestamp_now().saturating_add(EXPIRY_MARGIN) >= self.expires_at
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AuthSession {{ user: {:?}, expires_at: {}, tokens: <hidden> }}",
            self.user, self.expires_at
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    SignedIn(AuthSession),
    /// The project requires email confirmation before the first sign-in
    ConfirmationRequired,
}

/// One call to the GoTrue token endpoints
enum Grant<'a> {
    SignUp { email: &'a str, password: &'a str },
    Password { email: &'a str, password: &'a str },
    Refresh { token: &'a str },
}

impl Grant<'_> {
    const fn label(&self) -> &'static str {
        match self {
            Self::SignUp { .. } => "sign-up",
            Self::Password { .. } => "sign-in",
            Self::Refresh { .. } => "refresh",
        }
    }

    fn check(&self) -> Result<()> {
        match self {
            Self::SignUp { email, password } | Self::Password { email, password } => {
                if email.trim().is_empty() {
                    return Err(Error::Validation("email is required".to_string()));
                }
                if password.trim().is_empty() {
                    return Err(Error::Validation("password is required".to_string()));
                }
                Ok(())
            }
            Self::Refresh { token } if token.trim().is_empty() => {
                Err(Error::Auth("no refresh token to renew the session with".to_string()))
            }
            Self::Refresh { .. } => Ok(()),
        }
    }

    fn path_and_grant_type(&self) -> (&'static str, Option<&'static str>) {
        match self {
            Self::SignUp { .. } => ("signup", None),
            Self::Password { .. } => ("token", Some("password")),
            Self::Refresh { .. } => ("token", Some("refresh_token")),
        }
    }

    fn body(&self) -> Value {
        match self {
            Self::SignUp { email, password } | Self::Password { email, password } => {
                json!({ "email": email.trim(), "password": password })
            }
            Self::Refresh { token } => json!({ "refresh_token": token }),
        }
    }
}

/// Email/password identity for one Supabase project.
///
/// Implements [`IdentityProvider`] by reading its own [`SessionHandle`],
/// so it can be handed to gateways directly.
#[derive(Clone)]
pub struct SupabaseIdentity<V: SessionVault> {
    auth_url: String,
    anon_key: String,
    client: Client,
    vault: V,
    handle: SessionHandle,
}

impl<V: SessionVault> SupabaseIdentity<V> {
    pub fn new(backend: &RestConfig, vault: V) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|error| Error::Transport(error.to_string()))?;
        Ok(Self {
            auth_url: format!("{}/auth/v1", backend.base_url()),
            anon_key: backend.anon_key().to_string(),
            client,
            vault,
            handle: SessionHandle::new(),
        })
    }

    pub fn session_handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn session(&self) -> Option<AuthSession> {
        self.handle.session()
    }

    /// Bring back the vault's session, renewing it if it is about to
    /// expire. A session that cannot be renewed is forgotten.
    pub async fn restore(&self) -> Result<Option<AuthSession>> {
        let Some(stored) = self.vault.load()? else {
            return Ok(None);
        };
        if !stored.is_expired() {
            self.handle.set(Some(stored.clone()));
            return Ok(Some(stored));
        }

        match self.refresh(&stored.refresh_token).await {
            Ok(session) => Ok(Some(session)),
            Err(error) => {
                tracing::warn!(user = %stored.user.id, "dropping stored session: {}", error);
                self.forget()?;
                Ok(None)
            }
        }
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome> {
        match self.grant(Grant::SignUp { email, password }).await? {
            Some(session) => self.adopt(session).map(SignUpOutcome::SignedIn),
            None => Ok(SignUpOutcome::ConfirmationRequired),
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession> {
        let grant = Grant::Password { email, password };
        let session = self.grant_session(grant).await?;
        self.adopt(session)
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthSession> {
        let session = self
            .grant_session(Grant::Refresh {
                token: refresh_token,
            })
            .await?;
        self.adopt(session)
    }

    /// Revoke the active (or stored) session and forget it locally. A token
    /// the server already considers invalid still signs out.
    pub async fn sign_out(&self) -> Result<()> {
        let session = match self.handle.session() {
            Some(session) => Some(session),
            None => self.vault.load()?,
        };
        if let Some(session) = session {
            let response = self
                .client
                .post(format!("{}/logout", self.auth_url))
                .header("apikey", &self.anon_key)
                .bearer_auth(&session.access_token)
                .send()
                .await
                .map_err(|error| Error::Transport(error.to_string()))?;
            let status = response.status();
            if !status.is_success() && status != StatusCode::UNAUTHORIZED {
                let body = response.text().await.unwrap_or_default();
                return Err(status_error(status, &body));
            }
            tracing::info!(user = %session.user.id, "signed out");
        }
        self.forget()
    }

    async fn grant(&self, grant: Grant<'_>) -> Result<Option<AuthSession>> {
        grant.check()?;
        let (path, grant_type) = grant.path_and_grant_type();
        let mut request = self
            .client
            .post(format!("{}/{path}", self.auth_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
            .json(&grant.body());
        if let Some(grant_type) = grant_type {
            request = request.query(&[("grant_type", grant_type)]);
        }

        tracing::debug!(flow = grant.label(), "auth request");
        send_json::<GrantReply>(request).await?.into_session()
    }

    async fn grant_session(&self, grant: Grant<'_>) -> Result<AuthSession> {
        let label = grant.label();
        self.grant(grant)
            .await?
            .ok_or_else(|| Error::Schema(format!("{label} answered without a session")))
    }

    fn adopt(&self, session: AuthSession) -> Result<AuthSession> {
        self.vault.store(&session)?;
        self.handle.set(Some(session.clone()));
        tracing::info!(user = %session.user.id, "session active");
        Ok(session)
    }

    fn forget(&self) -> Result<()> {
        self.vault.erase()?;
        self.handle.clear();
        Ok(())
    }
}

impl<V: SessionVault> IdentityProvider for SupabaseIdentity<V> {
    fn current_user(&self) -> Option<AuthUser> {
        self.handle.current_user()
    }

    fn access_token(&self) -> Option<String> {
        self.handle.access_token()
    }
}

/// Token fields GoTrue returns either at the top level or under `session`
#[derive(Debug, Default, Deserialize)]
struct TokenFields {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
    expires_in: Option<i64>,
    user: Option<GoTrueUser>,
}

impl TokenFields {
    fn or(self, fallback: Self) -> Self {
        Self {
            access_token: self.access_token.or(fallback.access_token),
            refresh_token: self.refresh_token.or(fallback.refresh_token),
            expires_at: self.expires_at.or(fallback.expires_at),
            expires_in: self.expires_in.or(fallback.expires_in),
            user: self.user.or(fallback.user),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GrantReply {
    #[serde(flatten)]
    top: TokenFields,
    #[serde(default)]
    session: Option<TokenFields>,
}

impl GrantReply {
    /// `Ok(None)` when the reply carries no tokens at all (sign-up awaiting
    /// email confirmation).
    fn into_session(self) -> Result<Option<AuthSession>> {
        let fields = match self.session {
            Some(nested) => nested.or(self.top),
            None => self.top,
        };
        if fields.access_token.is_none() && fields.refresh_token.is_none() {
            return Ok(None);
        }

        let expires_at = fields.expires_at.or_else(|| {
            fields
                .expires_in
                .map(|seconds| unix_timestamp_now().saturating_add(seconds))
        });
        match (fields.access_token, fields.refresh_token, expires_at, fields.user) {
            (Some(access_token), Some(refresh_token), Some(expires_at), Some(user)) => {
                Ok(Some(AuthSession {
                    access_token,
                    refresh_token,
                    expires_at,
                    user: AuthUser {
                        id: user.id,
                        email: user.email,
                    },
                }))
            }
            _ => Err(Error::Schema(
                "auth reply has tokens but is missing session fields".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoTrueUser {
    id: String,
    email: Option<String>,
}
