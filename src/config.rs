//! Configuration types for the companion core.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BuddyConfig {
    /// Identity / profile / avatar backend settings.
    pub backend: BackendConfig,
    /// Chat turn-taking settings.
    pub conversation: ConversationConfig,
    /// Speech output timing model.
    pub speech: SpeechConfig,
    /// Voice capture settings.
    pub voice: VoiceConfig,
    /// Diagnostic logging.
    pub logging: LoggingConfig,
}

/// Which backend implementation the host should use.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Process-local stores. Nothing survives a restart.
    #[default]
    Memory,
    /// Remote edge-function API over HTTPS.
    Http,
}

/// Backend connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub mode: BackendMode,
    /// Project base URL, e.g. `https://<project>.supabase.co`.
    pub base_url: String,
    /// Public anonymous key sent with unauthenticated calls.
    pub anon_key: String,
    /// Path prefix of the profile/avatar functions under `base_url`.
    pub functions_path: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            mode: BackendMode::Memory,
            base_url: String::new(),
            anon_key: String::new(),
            functions_path: "functions/v1/make-server-c520032d".to_owned(),
            timeout_secs: 15,
        }
    }
}

/// Conversation turn-taking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Pause between the user's turn and the companion reply.
    pub thinking_delay_ms: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            thinking_delay_ms: 1000,
        }
    }
}

/// Linear speaking-duration model: `chars * ms_per_char + base_ms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub ms_per_char: u64,
    pub base_ms: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            ms_per_char: 60,
            base_ms: 1000,
        }
    }
}

/// Voice capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Locale used when a language name has no mapping.
    pub default_locale: String,
    /// Whether the host runs inside a secure transport context.
    pub secure_context: bool,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            default_locale: "en-US".to_owned(),
            secure_context: true,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}

impl BuddyConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::BuddyError::Config(e.to_string()))
    }

    /// Load configuration from `path`, or defaults when the file is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_or_default(path: &std::path::Path) -> crate::error::Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::BuddyError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/buddy/config.toml`.
    pub fn default_config_path() -> PathBuf {
        match dirs::config_dir() {
            Some(dir) => dir.join("buddy").join("config.toml"),
            None => PathBuf::from("/tmp/buddy-config/config.toml"),
        }
    }
}
