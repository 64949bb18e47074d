//! Persistent CLI profile configuration.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use commune_core::config::ClientConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const CONFIG_FILE_NAME: &str = "cli-config.json";
const PROFILE_ENV_VAR: &str = "COMMUNE_PROFILE";
const DEFAULT_PROFILE_NAME: &str = "default";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfilesConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub profiles: BTreeMap<String, CliProfile>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfile {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub turso_database_url: Option<String>,
    #[serde(default)]
    pub turso_auth_token: Option<String>,
    #[serde(default)]
    pub offline_mode_default: bool,
}

const fn default_config_version() -> u32 {
    1
}

#[derive(Debug, Error)]
pub enum ProfilesError {
    #[error("Failed to resolve CLI config directory")]
    NoConfigDir,
    #[error("Failed to read config at {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("Failed to parse config at {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Failed to write config at {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub fn default_config_path() -> Result<PathBuf, ProfilesError> {
    dirs::config_dir()
        .map(|dir| dir.join("commune").join(CONFIG_FILE_NAME))
        .ok_or(ProfilesError::NoConfigDir)
}

pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    commune_core::util::normalize_text_option(value)
}

pub fn normalize_profile_name(value: Option<&str>) -> Option<String> {
    normalize_text_option(value.map(str::to_string))
}

impl CliProfilesConfig {
    pub fn load() -> Result<Self, ProfilesError> {
        Self::load_from_path(&default_config_path()?)
    }

    /// Read the config at `path`; a missing file yields the empty config.
    pub fn load_from_path(path: &Path) -> Result<Self, ProfilesError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(source) if source.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ProfilesError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let mut config =
            serde_json::from_str::<Self>(&raw).map_err(|source| ProfilesError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.normalize();
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, ProfilesError> {
        let path = default_config_path()?;
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), ProfilesError> {
        let write_error = |source| ProfilesError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)?;
        std::fs::write(path, serialized).map_err(write_error)
    }

    /// `explicit`, then `COMMUNE_PROFILE`, then the active profile, then `default`.
    pub fn resolve_profile_name(&self, explicit: Option<&str>) -> String {
        normalize_profile_name(explicit)
            .or_else(|| normalize_profile_name(std::env::var(PROFILE_ENV_VAR).ok().as_deref()))
            .or_else(|| normalize_profile_name(self.active_profile.as_deref()))
            .unwrap_or_else(|| DEFAULT_PROFILE_NAME.to_string())
    }

    pub fn profile(&self, name: &str) -> Option<&CliProfile> {
        self.profiles.get(name)
    }

    pub fn profile_mut_or_default(&mut self, name: &str) -> &mut CliProfile {
        self.profiles.entry(name.to_string()).or_default()
    }

    fn normalize(&mut self) {
        self.active_profile = normalize_profile_name(self.active_profile.as_deref());
        for profile in self.profiles.values_mut() {
            profile.normalize();
        }
    }
}

impl CliProfile {
    /// Client configuration for this profile, acting as `user_override` when given.
    pub fn client_config(&self, user_override: Option<&str>) -> Option<ClientConfig> {
        let user_id = normalize_profile_name(user_override)
            .or_else(|| normalize_text_option(self.user_id.clone()))?;
        Some(ClientConfig {
            user_id,
            turso_database_url: normalize_text_option(self.turso_database_url.clone()),
            turso_auth_token: normalize_text_option(self.turso_auth_token.clone()),
            sync_interval_secs: None,
            offline_mode_default: self.offline_mode_default,
        })
    }

    fn normalize(&mut self) {
        self.user_id = normalize_text_option(self.user_id.clone());
        self.turso_database_url = normalize_text_option(self.turso_database_url.clone());
        self.turso_auth_token = normalize_text_option(self.turso_auth_token.clone());
    }
}
