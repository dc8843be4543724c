//! Configuration types for the conversation backend.
//!
//! Configuration is loaded once at startup into an [`AppConfig`] and shared
//! read-only (behind an `Arc`) by every session.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ChatError, Result};

/// Emotion label used when nothing else can be resolved.
pub const FALLBACK_EMOTION: &str = "Neutral";

/// Label preferred as default when the configured default is not allowed.
const PREFERRED_DEFAULT_EMOTION: &str = "Happy";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Character persona settings.
    pub persona: PersonaConfig,
    /// Allowed emotion labels and classification strategy.
    pub emotions: EmotionConfig,
    /// Conversation memory limits.
    pub memory: MemoryConfig,
    /// Text generation backend.
    pub llm: LlmConfig,
    /// Text delivery strategy.
    pub delivery: DeliveryConfig,
    /// WebSocket server settings.
    pub server: ServerConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
    /// Speech synthesis backend. `None` disables audio entirely.
    pub tts: Option<TtsConfig>,
}

/// Character persona configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// Static instruction text establishing the character and tone.
    pub prompt: String,
    /// Optional file whose contents replace `prompt` at load time.
    pub prompt_file: Option<PathBuf>,
}

/// Where the per-turn emotion label comes from.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionSource {
    /// A separate generation call after the reply completes.
    #[default]
    Classifier,
    /// The model prefixes its reply with a `[Label]` tag, stripped from the text.
    InlineTag,
}

/// Emotion label configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionConfig {
    /// Ordered set of valid labels. May be empty.
    pub allowed: Vec<String>,
    /// Label used when classification yields nothing usable.
    pub default: String,
    /// Classification strategy.
    pub source: EmotionSource,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            allowed: Vec::new(),
            default: PREFERRED_DEFAULT_EMOTION.to_owned(),
            source: EmotionSource::default(),
        }
    }
}

impl EmotionConfig {
    /// Trim labels and drop blanks and duplicates, preserving first-seen order.
    pub fn normalize(&mut self) {
        let mut seen: Vec<String> = Vec::with_capacity(self.allowed.len());
        for label in &self.allowed {
            let label = label.trim();
            if !label.is_empty() && !seen.iter().any(|s| s == label) {
                seen.push(label.to_owned());
            }
        }
        self.allowed = seen;
        self.default = self.resolve_default();
    }

    /// Resolve the effective default label.
    ///
    /// The configured default wins if it is allowed; otherwise `Happy` if
    /// allowed, otherwise the first allowed label. With no allowed labels the
    /// configured default is kept (or [`FALLBACK_EMOTION`] when blank).
    pub fn resolve_default(&self) -> String {
        let configured = self.default.trim();
        if self.allowed.is_empty() {
            return if configured.is_empty() {
                FALLBACK_EMOTION.to_owned()
            } else {
                configured.to_owned()
            };
        }
        if self.allowed.iter().any(|a| a == configured) {
            return configured.to_owned();
        }
        if self.allowed.iter().any(|a| a == PREFERRED_DEFAULT_EMOTION) {
            return PREFERRED_DEFAULT_EMOTION.to_owned();
        }
        self.allowed[0].clone()
    }

    /// Whether `label` is one of the allowed labels (exact match).
    pub fn is_allowed(&self, label: &str) -> bool {
        self.allowed.iter().any(|a| a == label)
    }
}

/// Conversation memory limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Maximum retained user+assistant pairs.
    pub max_turns: usize,
    /// Maximum retained characters across all turns.
    pub max_chars: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_turns: 8,
            max_chars: 4_000,
        }
    }
}

/// Which text generation backend to use.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// Ollama `/api/generate` with newline-delimited JSON streaming.
    #[default]
    Ollama,
}

/// Text generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Which backend protocol to speak.
    pub backend: LlmBackend,
    /// Base URL of the backend server.
    pub api_url: String,
    /// Model name to request.
    pub model: String,
    /// Upper bound in seconds for the emotion classification call.
    pub classify_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: LlmBackend::default(),
            // Ollama default endpoint.
            api_url: "http://127.0.0.1:11434".to_owned(),
            model: "qwen2.5".to_owned(),
            classify_timeout_secs: 30,
        }
    }
}

/// Encoded audio container returned by the synthesis backend.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// MPEG-1 Layer III.
    #[default]
    Mp3,
    /// RIFF/WAVE PCM.
    Wav,
}

impl AudioFormat {
    /// Wire name of the format.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
        }
    }
}

/// Text-to-speech configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Full URL of the speech endpoint.
    pub url: String,
    /// Model name sent with each request.
    pub model: String,
    /// Voice name (e.g. "af_heart").
    pub voice: String,
    /// Speech speed multiplier (0.25–4.0).
    pub speed: f32,
    /// Language code understood by the backend (e.g. "a" for American English).
    pub lang_code: String,
    /// Requested audio container.
    pub format: AudioFormat,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8880/v1/audio/speech".to_owned(),
            model: "kokoro".to_owned(),
            voice: "af_heart".to_owned(),
            speed: 1.0,
            lang_code: "a".to_owned(),
            format: AudioFormat::default(),
            timeout_secs: 30,
        }
    }
}

/// How reply text reaches the client.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// One `chunk` event per cleaned fragment as it arrives.
    #[default]
    Incremental,
    /// A single `chunk` with the full text, sent after the audio.
    Synchronized,
}

/// Text delivery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Delivery strategy.
    pub mode: DeliveryMode,
    /// Drop characters outside printable ASCII (emoji, pictographs, other scripts).
    pub strip_non_ascii: bool,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            mode: DeliveryMode::default(),
            strip_non_ascii: true,
        }
    }
}

/// WebSocket server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port (0 = auto-assign).
    pub port: u16,
    /// Route the WebSocket endpoint is served on.
    pub ws_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8000,
            ws_path: "/ws".to_owned(),
        }
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for daily-rotated log files. Stderr only when `None`.
    pub directory: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| ChatError::Config(e.to_string()))
    }

    /// Load, resolve and validate a configuration file.
    ///
    /// This is the startup entry point: the persona file (if any) is read,
    /// emotion labels are normalised and the result is validated.
    ///
    /// # Errors
    ///
    /// Returns an error if reading, parsing, or validation fails.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.prepare()?;
        Ok(config)
    }

    /// Resolve derived fields and validate. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the persona file cannot be read or validation fails.
    pub fn prepare(&mut self) -> Result<()> {
        if let Some(path) = &self.persona.prompt_file {
            self.persona.prompt = std::fs::read_to_string(path).map_err(|e| {
                ChatError::Config(format!(
                    "cannot read persona file {}: {e}",
                    path.display()
                ))
            })?;
        }
        self.emotions.normalize();
        self.validate()
    }

    /// Check field-level constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Config`] describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        if self.llm.model.trim().is_empty() {
            return Err(ChatError::Config("llm.model must not be empty".into()));
        }
        url::Url::parse(&self.llm.api_url)
            .map_err(|e| ChatError::Config(format!("llm.api_url is not a valid URL: {e}")))?;
        let ws_path = &self.server.ws_path;
        if !ws_path.starts_with('/') {
            return Err(ChatError::Config(format!(
                "server.ws_path must start with '/': {ws_path}"
            )));
        }
        if ws_path == "/health" || ws_path.contains([':', '*', '{', '}']) {
            return Err(ChatError::Config(format!(
                "server.ws_path must be a plain path other than /health: {ws_path}"
            )));
        }
        if let Some(tts) = &self.tts {
            url::Url::parse(&tts.url)
                .map_err(|e| ChatError::Config(format!("tts.url is not a valid URL: {e}")))?;
            if !(0.25..=4.0).contains(&tts.speed) {
                return Err(ChatError::Config(format!(
                    "tts.speed must be within 0.25..=4.0, got {}",
                    tts.speed
                )));
            }
        }
        Ok(())
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| ChatError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/vtalk/config.toml`.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("vtalk")
            .join("config.toml")
    }
}
