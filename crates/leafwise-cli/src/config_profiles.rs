//! Named endpoint profiles saved between runs.
//!
//! A profile is a [`ClientConfig`]; the file maps profile names to them and
//! remembers which one is active.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};

use leafwise_core::ClientConfig;
use serde::{Deserialize, Serialize};

use crate::error::CliError;

pub const PROFILE_ENV: &str = "LEAFWISE_PROFILE";
const DEFAULT_PROFILE: &str = "default";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfilesConfig {
    #[serde(default = "format_version")]
    pub version: u32,
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub profiles: BTreeMap<String, ClientConfig>,
}

const fn format_version() -> u32 {
    FORMAT_VERSION
}

impl Default for CliProfilesConfig {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            active_profile: None,
            profiles: BTreeMap::new(),
        }
    }
}

fn profile_name(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

impl CliProfilesConfig {
    /// Explicit name, then `LEAFWISE_PROFILE`, then the active profile, then `default`.
    pub fn resolve_profile_name(&self, explicit: Option<&str>) -> String {
        self.resolve_profile_name_with(explicit, std::env::var(PROFILE_ENV).ok().as_deref())
    }

    fn resolve_profile_name_with(&self, explicit: Option<&str>, from_env: Option<&str>) -> String {
        [explicit, from_env, self.active_profile.as_deref()]
            .into_iter()
            .find_map(profile_name)
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
    }

    pub fn profile(&self, name: &str) -> Option<&ClientConfig> {
        self.profiles.get(name)
    }

    /// Store `config` under `name`, optionally making it the active profile.
    pub fn put_profile(&mut self, name: &str, config: ClientConfig, activate: bool) {
        self.profiles.insert(name.to_string(), config.normalized());
        if activate {
            self.active_profile = Some(name.to_string());
        }
    }

    fn normalized(mut self) -> Self {
        self.active_profile = profile_name(self.active_profile.as_deref());
        self.profiles = self
            .profiles
            .into_iter()
            .map(|(name, config)| (name, config.normalized()))
            .collect();
        self
    }
}

/// The JSON file holding every profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileFile {
    path: PathBuf,
}

impl ProfileFile {
    /// `<config dir>/leafwise/cli-config.json`
    pub fn locate() -> Result<Self, CliError> {
        dirs::config_dir()
            .map(|dir| Self::at(dir.join("leafwise").join("cli-config.json")))
            .ok_or_else(|| CliError::Config("no configuration directory on this system".to_string()))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file reads as an empty set of profiles.
    pub fn read(&self) -> Result<CliProfilesConfig, CliError> {
        if !self.path.exists() {
            return Ok(CliProfilesConfig::default());
        }
        let raw = std::fs::read_to_string(&self.path).map_err(|error| self.failure("read", error))?;
        let config = serde_json::from_str::<CliProfilesConfig>(&raw)
            .map_err(|error| self.failure("parse", error))?;
        Ok(config.normalized())
    }

    pub fn write(&self, config: &CliProfilesConfig) -> Result<(), CliError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| self.failure("create the folder of", error))?;
        }
        let raw = serde_json::to_string_pretty(&config.clone().normalized())?;
        std::fs::write(&self.path, raw).map_err(|error| self.failure("write", error))
    }

    fn failure(&self, action: &str, error: impl Display) -> CliError {
        CliError::Config(format!("could not {action} {}: {error}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn scratch_file(label: &str) -> ProfileFile {
        ProfileFile::at(std::env::temp_dir().join(format!(
            "leafwise-{label}-{}.json",
            nanos_suffix()
        )))
    }

    fn nanos_suffix() -> u128 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_nanos())
    }

    #[test]
    fn saved_profiles_come_back_trimmed() {
        let file = scratch_file("roundtrip");
        let mut config = CliProfilesConfig::default();
        config.put_profile(
            "field",
            ClientConfig {
                supabase_url: Some(" https://project.supabase.co ".to_string()),
                supabase_anon_key: Some(" anon-key ".to_string()),
                predict_url: Some(" http://127.0.0.1:8000/predict ".to_string()),
                chat_url: Some("  ".to_string()),
            },
            true,
        );

        file.write(&config).unwrap();
        let loaded = file.read().unwrap();
        let profile = loaded.profile("field").unwrap();
        assert_eq!(loaded.active_profile.as_deref(), Some("field"));
        assert_eq!(profile.supabase_url.as_deref(), Some("https://project.supabase.co"));
        assert_eq!(profile.supabase_anon_key.as_deref(), Some("anon-key"));
        assert_eq!(profile.predict_url.as_deref(), Some("http://127.0.0.1:8000/predict"));
        assert_eq!(profile.chat_url, None);

        let _ = std::fs::remove_file(file.path());
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let loaded = scratch_file("missing").read().unwrap();
        assert_eq!(loaded, CliProfilesConfig::default());
    }

    #[test]
    fn unreadable_file_names_its_path() {
        let file = scratch_file("garbage");
        std::fs::write(file.path(), "{ not json").unwrap();
        let message = file.read().unwrap_err().to_string();
        assert!(message.contains("could not parse"));
        assert!(message.contains(&file.path().display().to_string()));
        let _ = std::fs::remove_file(file.path());
    }

    #[test]
    fn put_profile_without_activation_keeps_the_active_one() {
        let mut config = CliProfilesConfig::default();
        config.put_profile("home", ClientConfig::default(), true);
        config.put_profile("field", ClientConfig::default(), false);
        assert_eq!(config.active_profile.as_deref(), Some("home"));
        assert_eq!(config.profiles.len(), 2);
    }

    #[test]
    fn resolve_profile_name_prefers_explicit_then_env_then_active() {
        let config = CliProfilesConfig {
            active_profile: Some("work".to_string()),
            ..CliProfilesConfig::default()
        };
        assert_eq!(config.resolve_profile_name_with(Some("mobile"), Some("env")), "mobile");
        assert_eq!(config.resolve_profile_name_with(None, Some("env")), "env");
        assert_eq!(config.resolve_profile_name_with(Some(" "), Some(" ")), "work");
        assert_eq!(
            CliProfilesConfig::default().resolve_profile_name_with(None, None),
            "default"
        );
    }
}
