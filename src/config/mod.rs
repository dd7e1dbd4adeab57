//! Configuration and credential storage

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::auth::StoredToken;

const DEFAULT_STORE_URL: &str = "https://store.herald.dev/v1";
const DEFAULT_WATCH_URL: &str = "wss://store.herald.dev/v1/watch";
const DEFAULT_PUSH_ENDPOINT: &str = "https://push.herald.dev/v1/messages:send";
const DEFAULT_INBOX_URL: &str = "wss://push.herald.dev/v1/inbox";

/// Application configuration
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Document store base URL (REST)
    pub store_url: Option<String>,
    /// Store watch endpoint (WebSocket)
    pub watch_url: Option<String>,
    /// Push gateway send endpoint
    pub push_endpoint: Option<String>,
    /// Device push inbox endpoint (WebSocket)
    pub inbox_url: Option<String>,
    /// Path to the push service credential asset
    pub credential_path: Option<String>,
    /// Authenticated user id
    pub uid: Option<String>,
    /// Authenticated user email
    pub email: Option<String>,
    /// Stored session bearer token
    pub session_token: Option<StoredToken>,
    /// This installation's push-delivery token
    pub device_token: Option<String>,
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "herald", "herald-cli")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).context("Failed to create config directory")?;

        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;

        // Set restrictive permissions on config file (contains tokens)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            fs::set_permissions(&path, perms).context("Failed to set config permissions")?;
        }

        Ok(())
    }

    pub fn store_url(&self) -> String {
        self.store_url
            .clone()
            .unwrap_or_else(|| DEFAULT_STORE_URL.to_string())
    }

    pub fn watch_url(&self) -> String {
        self.watch_url
            .clone()
            .unwrap_or_else(|| DEFAULT_WATCH_URL.to_string())
    }

    pub fn push_endpoint(&self) -> String {
        self.push_endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_PUSH_ENDPOINT.to_string())
    }

    pub fn inbox_url(&self) -> String {
        self.inbox_url
            .clone()
            .unwrap_or_else(|| DEFAULT_INBOX_URL.to_string())
    }

    /// Path to the push service credential asset, defaulting to
    /// `credential.json` next to the config file.
    pub fn credential_path(&self) -> PathBuf {
        match self.credential_path {
            Some(ref p) => PathBuf::from(p),
            None => Self::config_dir()
                .map(|d| d.join("credential.json"))
                .unwrap_or_else(|_| PathBuf::from("credential.json")),
        }
    }

    pub fn uid(&self) -> Option<String> {
        self.uid.clone()
    }

    pub fn email(&self) -> Option<String> {
        self.email.clone()
    }

    pub fn get_session_token(&self) -> Option<StoredToken> {
        self.session_token.clone()
    }

    pub fn set_session(&mut self, uid: &str, email: &str, token: &str, expires_in: Option<u64>) {
        self.uid = Some(uid.to_string());
        self.email = Some(email.to_string());
        self.session_token = Some(StoredToken::new(token.to_string(), expires_in));
    }

    pub fn clear_session(&mut self) {
        self.uid = None;
        self.email = None;
        self.session_token = None;
    }

    pub fn get_device_token(&self) -> Option<String> {
        self.device_token.clone()
    }

    pub fn set_device_token(&mut self, token: String) {
        self.device_token = Some(token);
    }

    /// The installation's push token, generated on first use. The caller
    /// saves the config afterwards.
    pub fn ensure_device_token(&mut self) -> String {
        if let Some(ref token) = self.device_token {
            if !token.is_empty() {
                return token.clone();
            }
        }
        let token = uuid::Uuid::new_v4().to_string();
        self.device_token = Some(token.clone());
        token
    }
}
