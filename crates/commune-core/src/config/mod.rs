//! Client configuration.
//!
//! `ClientConfig` names the signed-in user and, optionally, the Turso database
//! that acts as the shared document backend.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::db::SyncConfig;
use crate::error::{Error, Result};
use crate::util::normalize_text_option;

const REMOTE_URL_SCHEMES: &[&str] = &["libsql://", "https://", "http://", "wss://", "ws://"];

/// Per-user client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub user_id: String,
    #[serde(default)]
    pub turso_database_url: Option<String>,
    #[serde(default)]
    pub turso_auth_token: Option<String>,
    /// Replica sync interval; `None` keeps the default, `Some(0)` disables it
    #[serde(default)]
    pub sync_interval_secs: Option<u64>,
    /// Offline mode used until the user changes it
    #[serde(default)]
    pub offline_mode_default: bool,
}

impl ClientConfig {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    /// Check required fields and the remote URL shape.
    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(Error::InvalidInput("user_id is required".to_string()));
        }

        match (
            normalize_text_option(self.turso_database_url.clone()),
            normalize_text_option(self.turso_auth_token.clone()),
        ) {
            (None, None) => Ok(()),
            (Some(url), Some(_)) if is_remote_database_url(&url) => Ok(()),
            (Some(url), Some(_)) => Err(Error::InvalidInput(format!(
                "turso_database_url '{url}' must start with libsql://, https:// or wss://"
            ))),
            _ => Err(Error::InvalidInput(
                "turso_database_url and turso_auth_token must be set together".to_string(),
            )),
        }
    }

    /// Remote replica settings, when both URL and token are present.
    pub fn sync_config(&self) -> Option<SyncConfig> {
        let url = normalize_text_option(self.turso_database_url.clone())?;
        let token = normalize_text_option(self.turso_auth_token.clone())?;
        let config = SyncConfig::new(url, token);

        Some(match self.sync_interval_secs {
            None => config,
            Some(0) => config.without_auto_sync(),
            Some(secs) => config.with_sync_interval(Duration::from_secs(secs)),
        })
    }
}

fn is_remote_database_url(value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    REMOTE_URL_SCHEMES
        .iter()
        .any(|scheme| lower.starts_with(scheme) && lower.len() > scheme.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let config: ClientConfig = serde_json::from_str(r#"{"user_id": "alice"}"#).unwrap();
        config.validate().unwrap();
        assert_eq!(config.user_id, "alice");
        assert!(!config.offline_mode_default);
        assert!(config.sync_config().is_none());
    }

    #[test]
    fn rejects_unknown_fields() {
        let parsed =
            serde_json::from_str::<ClientConfig>(r#"{"user_id": "alice", "supabase_url": "x"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn rejects_half_configured_remote() {
        let config = ClientConfig {
            turso_database_url: Some("libsql://chat.turso.io".to_string()),
            ..ClientConfig::new("alice")
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_database_url() {
        let config = ClientConfig {
            turso_database_url: Some("chat.turso.io".to_string()),
            turso_auth_token: Some("token".to_string()),
            ..ClientConfig::new("alice")
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn sync_interval_controls_replica_config() {
        let mut config = ClientConfig {
            turso_database_url: Some(" libsql://chat.turso.io ".to_string()),
            turso_auth_token: Some("token".to_string()),
            ..ClientConfig::new("alice")
        };
        config.validate().unwrap();

        let sync = config.sync_config().unwrap();
        assert_eq!(sync.url, "libsql://chat.turso.io");
        assert_eq!(sync.sync_interval, Some(Duration::from_secs(60)));

        config.sync_interval_secs = Some(0);
        assert_eq!(config.sync_config().unwrap().sync_interval, None);

        config.sync_interval_secs = Some(5);
        assert_eq!(
            config.sync_config().unwrap().sync_interval,
            Some(Duration::from_secs(5))
        );
    }
}
