//! Client configuration for Leafwise front ends.
//!
//! Endpoints and keys here are public values safe to ship with a client.
//! Secrets never belong in this struct.

use serde::{Deserialize, Serialize};

use crate::gateway::RestConfig;
use crate::inference::InferenceClient;
use crate::util::{is_http_url, normalize_text_option};
use crate::{Error, Result};

pub const SUPABASE_URL_ENV: &str = "SUPABASE_URL";
pub const SUPABASE_ANON_KEY_ENV: &str = "SUPABASE_ANON_KEY";
pub const PREDICT_URL_ENV: &str = "LEAFWISE_PREDICT_URL";
pub const CHAT_URL_ENV: &str = "LEAFWISE_CHAT_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default)]
    pub supabase_url: Option<String>,
    #[serde(default)]
    pub supabase_anon_key: Option<String>,
    #[serde(default)]
    pub predict_url: Option<String>,
    #[serde(default)]
    pub chat_url: Option<String>,
}

impl ClientConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`, one call per variable name.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            supabase_url: normalize_text_option(lookup(SUPABASE_URL_ENV)),
            supabase_anon_key: normalize_text_option(lookup(SUPABASE_ANON_KEY_ENV)),
            predict_url: normalize_text_option(lookup(PREDICT_URL_ENV)),
            chat_url: normalize_text_option(lookup(CHAT_URL_ENV)),
        }
    }

    /// Fill fields missing here from `fallback`.
    #[must_use]
    pub fn or(self, fallback: Self) -> Self {
        Self {
            supabase_url: normalize_text_option(self.supabase_url).or(fallback.supabase_url),
            supabase_anon_key: normalize_text_option(self.supabase_anon_key)
                .or(fallback.supabase_anon_key),
            predict_url: normalize_text_option(self.predict_url).or(fallback.predict_url),
            chat_url: normalize_text_option(self.chat_url).or(fallback.chat_url),
        }
    }

    /// Every present endpoint must be an http(s) URL, and the Supabase URL
    /// and anon key come together or not at all.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("supabase_url", &self.supabase_url),
            ("predict_url", &self.predict_url),
            ("chat_url", &self.chat_url),
        ] {
            if let Some(url) = normalize_text_option(value.clone()) {
                if !is_http_url(&url) {
                    return Err(Error::Config(format!(
                        "{field} must include http:// or https://"
                    )));
                }
            }
        }
        self.supabase_pair().map(drop)
    }

    /// Backend settings, or `None` when Supabase is not configured.
    pub fn rest_config(&self) -> Result<Option<RestConfig>> {
        self.validate()?;
        self.supabase_pair()?
            .map(|(url, anon_key)| RestConfig::new(url, anon_key))
            .transpose()
    }

    /// Same settings with every value trimmed and blanks dropped.
    #[must_use]
    pub fn normalized(self) -> Self {
        self.or(Self::default())
    }

    fn supabase_pair(&self) -> Result<Option<(String, String)>> {
        match (
            normalize_text_option(self.supabase_url.clone()),
            normalize_text_option(self.supabase_anon_key.clone()),
        ) {
            (None, None) => Ok(None),
            (Some(url), Some(anon_key)) => Ok(Some((url, anon_key))),
            _ => Err(Error::Config(
                "supabase_url and supabase_anon_key must be set together".to_string(),
            )),
        }
    }

    pub fn inference_client(&self) -> Result<InferenceClient> {
        InferenceClient::new(self.predict_url.clone(), self.chat_url.clone())
    }
}
