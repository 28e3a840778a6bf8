use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration loaded from `~/.socially/config.toml`.
///
/// **Security**: the Firebase API key is never stored here. The config only
/// names the environment variable it is read from (see
/// [`FirebaseConfig::api_key`]).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub firebase: FirebaseConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub toasts: ToastConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load config from `~/.socially/config.toml`, falling back to defaults
    /// when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml(&text)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let cfg: Config = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic validation for settings that are not expressible via types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chat.validate()?;
        self.toasts.validate()?;
        if self.backend.kind == BackendKind::Firebase {
            self.firebase.validate()?;
        }
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        config_dir().join("config.toml")
    }
}

/// `~/.socially`, or `./.socially` when no home directory is known.
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".socially")
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

fn default_app_name() -> String {
    "socially".into()
}
fn default_log_level() -> String {
    "info".into()
}

/// Which identity provider and message store back the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Everything local: any credentials are accepted, messages live in
    /// key-value storage.
    #[default]
    Demo,
    /// Firebase Identity Toolkit + Firestore.
    Firebase,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirebaseConfig {
    #[serde(default)]
    pub project_id: String,
    /// Name of the environment variable holding the web API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_identity_url")]
    pub identity_base_url: String,
    #[serde(default = "default_token_url")]
    pub token_base_url: String,
    #[serde(default = "default_firestore_url")]
    pub firestore_base_url: String,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for FirebaseConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            api_key_env: default_api_key_env(),
            identity_base_url: default_identity_url(),
            token_base_url: default_token_url(),
            firestore_base_url: default_firestore_url(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl FirebaseConfig {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project_id.trim().is_empty() {
            return Err(ConfigError::Validation(
                "firebase.project_id must be set when backend.kind = \"firebase\"".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "firebase.poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_api_key_env() -> String {
    "SOCIALLY_FIREBASE_API_KEY".into()
}
fn default_identity_url() -> String {
    "https://identitytoolkit.googleapis.com".into()
}
fn default_token_url() -> String {
    "https://securetoken.googleapis.com".into()
}
fn default_firestore_url() -> String {
    "https://firestore.googleapis.com".into()
}
fn default_poll_interval_ms() -> u64 {
    2_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Size of the visible window: only the newest N messages are kept.
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
    /// Outgoing bodies are cut to this many characters.
    #[serde(default = "default_max_body_chars")]
    pub max_body_chars: usize,
    /// Length of the message preview shown in notification toasts.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
    #[serde(default = "default_conversation")]
    pub default_conversation: String,
    /// Show outgoing messages as pending before the store round-trips them.
    #[serde(default = "default_true")]
    pub optimistic_append: bool,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            max_body_chars: default_max_body_chars(),
            preview_chars: default_preview_chars(),
            default_conversation: default_conversation(),
            optimistic_append: true,
        }
    }
}

impl ChatConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_messages == 0 {
            return Err(ConfigError::Validation(
                "chat.max_messages must be greater than zero".to_string(),
            ));
        }
        if self.max_body_chars == 0 {
            return Err(ConfigError::Validation(
                "chat.max_body_chars must be greater than zero".to_string(),
            ));
        }
        if self.default_conversation.trim().is_empty() {
            return Err(ConfigError::Validation(
                "chat.default_conversation must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_max_messages() -> usize {
    1_000
}
fn default_max_body_chars() -> usize {
    4_000
}
fn default_preview_chars() -> usize {
    60
}
fn default_conversation() -> String {
    "global".into()
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToastConfig {
    #[serde(default = "default_max_visible")]
    pub max_visible: usize,
    #[serde(default = "default_info_ms")]
    pub info_ms: u64,
    #[serde(default = "default_success_ms")]
    pub success_ms: u64,
    #[serde(default = "default_warning_ms")]
    pub warning_ms: u64,
}

impl Default for ToastConfig {
    fn default() -> Self {
        Self {
            max_visible: default_max_visible(),
            info_ms: default_info_ms(),
            success_ms: default_success_ms(),
            warning_ms: default_warning_ms(),
        }
    }
}

impl ToastConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_visible == 0 {
            return Err(ConfigError::Validation(
                "toasts.max_visible must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_max_visible() -> usize {
    10
}
fn default_info_ms() -> u64 {
    3_000
}
fn default_success_ms() -> u64 {
    2_200
}
fn default_warning_ms() -> u64 {
    3_000
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// JSON file backing the native key-value store.
    /// Defaults to `~/.socially/storage.json`.
    #[serde(default)]
    pub path: Option<String>,
}

impl StorageConfig {
    pub fn resolved_path(&self) -> PathBuf {
        match &self.path {
            Some(p) => PathBuf::from(p),
            None => config_dir().join("storage.json"),
        }
    }
}
