//! Bridge configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use rosterlink_community::ChatSettings;

use crate::NodeError;

/// Configuration for a rosterlink bridge.
///
/// Can be loaded from a TOML file via [`BridgeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests). Tokens are redacted from the
/// `Debug` output.
#[derive(Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Base URL of the media server, e.g. `http://localhost:8096`.
    #[serde(default = "default_media_server_url")]
    pub media_server_url: String,

    /// Media server API key.
    #[serde(default)]
    pub media_server_token: String,

    /// Chat platform REST API base.
    #[serde(default = "default_chat_api_url")]
    pub chat_api_url: String,

    /// Chat bot token.
    #[serde(default)]
    pub chat_token: String,

    /// Community id. Looked up from the claim channel when absent.
    #[serde(default)]
    pub guild_id: Option<u64>,

    /// Role that marks a member as verified.
    #[serde(default)]
    pub verified_role_id: u64,

    /// Channel where members post the account name they claim.
    #[serde(default)]
    pub claim_channel_id: u64,

    /// JSON file holding the verification mapping.
    #[serde(default = "default_mapping_file")]
    pub mapping_file: PathBuf,

    /// Seconds between reconciliation cycles.
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,

    /// Deadline for every call to the media server or chat API.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Members requested per roster page (at most 1000).
    #[serde(default = "default_roster_page_size")]
    pub roster_page_size: usize,

    /// Roster size beyond which a fetch is treated as possibly truncated.
    #[serde(default = "default_max_roster_size")]
    pub max_roster_size: usize,

    /// Seconds between claim channel polls.
    #[serde(default = "default_claim_poll_interval_secs")]
    pub claim_poll_interval_secs: u64,

    /// Whether to serve `/metrics` and `/health`.
    #[serde(default)]
    pub enable_status_server: bool,

    #[serde(default = "default_status_port")]
    pub status_port: u16,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_media_server_url() -> String {
    "http://localhost:8096".to_string()
}

fn default_chat_api_url() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_mapping_file() -> PathBuf {
    PathBuf::from("./known_users.json")
}

fn default_reconcile_interval_secs() -> u64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_roster_page_size() -> usize {
    1000
}

fn default_max_roster_size() -> usize {
    10_000
}

fn default_claim_poll_interval_secs() -> u64 {
    2
}

fn default_status_port() -> u16 {
    7080
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl BridgeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(format!("{path}: {e}")))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Reject configurations the bridge cannot run with.
    pub fn validate(&self) -> Result<(), NodeError> {
        let fail = |msg: &str| Err(NodeError::Config(msg.to_string()));

        if self.media_server_token.is_empty() {
            return fail("media_server_token is required");
        }
        if self.chat_token.is_empty() {
            return fail("chat_token is required");
        }
        if self.verified_role_id == 0 {
            return fail("verified_role_id is required");
        }
        if self.claim_channel_id == 0 {
            return fail("claim_channel_id is required");
        }
        for (key, url) in [
            ("media_server_url", &self.media_server_url),
            ("chat_api_url", &self.chat_api_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(NodeError::Config(format!("{key} must be an http(s) URL")));
            }
        }
        if self.reconcile_interval_secs == 0 || self.claim_poll_interval_secs == 0 {
            return fail("intervals must be at least one second");
        }
        if self.request_timeout_secs == 0 {
            return fail("request_timeout_secs must be at least one second");
        }
        if !(1..=1000).contains(&self.roster_page_size) {
            return fail("roster_page_size must be between 1 and 1000");
        }
        if self.max_roster_size < self.roster_page_size {
            return fail("max_roster_size must be at least roster_page_size");
        }
        Ok(())
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Deadline for a whole roster fetch: one request timeout for every
    /// page the size cap allows, plus the final short page.
    pub fn roster_timeout(&self) -> Duration {
        let pages = self.max_roster_size.div_ceil(self.roster_page_size.max(1)) + 1;
        self.request_timeout() * u32::try_from(pages).unwrap_or(u32::MAX)
    }

    pub fn claim_poll_interval(&self) -> Duration {
        Duration::from_secs(self.claim_poll_interval_secs)
    }

    pub fn chat_settings(&self) -> ChatSettings {
        ChatSettings {
            api_url: self.chat_api_url.clone(),
            token: self.chat_token.clone(),
            guild_id: self.guild_id,
            verified_role_id: self.verified_role_id,
            claim_channel_id: self.claim_channel_id,
            roster_page_size: self.roster_page_size,
            max_roster_size: self.max_roster_size,
            timeout: self.request_timeout(),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            media_server_url: default_media_server_url(),
            media_server_token: String::new(),
            chat_api_url: default_chat_api_url(),
            chat_token: String::new(),
            guild_id: None,
            verified_role_id: 0,
            claim_channel_id: 0,
            mapping_file: default_mapping_file(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            roster_page_size: default_roster_page_size(),
            max_roster_size: default_max_roster_size(),
            claim_poll_interval_secs: default_claim_poll_interval_secs(),
            enable_status_server: false,
            status_port: default_status_port(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("media_server_url", &self.media_server_url)
            .field("media_server_token", &redact(&self.media_server_token))
            .field("chat_api_url", &self.chat_api_url)
            .field("chat_token", &redact(&self.chat_token))
            .field("guild_id", &self.guild_id)
            .field("verified_role_id", &self.verified_role_id)
            .field("claim_channel_id", &self.claim_channel_id)
            .field("mapping_file", &self.mapping_file)
            .field("reconcile_interval_secs", &self.reconcile_interval_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("roster_page_size", &self.roster_page_size)
            .field("max_roster_size", &self.max_roster_size)
            .field("claim_poll_interval_secs", &self.claim_poll_interval_secs)
            .field("enable_status_server", &self.enable_status_server)
            .field("status_port", &self.status_port)
            .field("log_format", &self.log_format)
            .field("log_level", &self.log_level)
            .finish()
    }
}
