//! Configuration loaded from `.env`, an optional TOML file and `CALLSIM__*` env vars.
//!
//! | Key | Env | Default |
//! |-----|-----|---------|
//! | backend.base_url | CALLSIM__BACKEND__BASE_URL | http://localhost:5001/api |
//! | backend.request_timeout_secs | CALLSIM__BACKEND__REQUEST_TIMEOUT_SECS | 30 |
//! | backend.customer_id | CALLSIM__BACKEND__CUSTOMER_ID | test-customer |
//! | session.autoplay_greeting | CALLSIM__SESSION__AUTOPLAY_GREETING | true |
//! | dialogue.max_clarifications | CALLSIM__DIALOGUE__MAX_CLARIFICATIONS | unset (no cap) |
//! | audio.sample_rate | CALLSIM__AUDIO__SAMPLE_RATE | 16000 |
//! | audio.channels | CALLSIM__AUDIO__CHANNELS | 1 |

use crate::dialogue::DialogueConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:5001/api";

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_customer_id() -> String {
    "test-customer".to_string()
}

fn default_true() -> bool {
    true
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_channels() -> u16 {
    1
}

/// Where the backend lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Applied to every HTTP request so a hung service surfaces as a transport failure.
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Customer the simulated call is placed for.
    #[serde(default = "default_customer_id")]
    pub customer_id: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_timeout_secs(),
            customer_id: default_customer_id(),
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Controller behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Play the greeting as soon as the call starts. When false the session stops at
    /// `GreetingReady` until `play_greeting` is called.
    #[serde(default = "default_true")]
    pub autoplay_greeting: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            autoplay_greeting: true,
        }
    }
}

/// Microphone format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSettings {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_channels")]
    pub channels: u16,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSimConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub dialogue: DialogueConfig,
    #[serde(default)]
    pub audio: AudioSettings,
}

impl CallSimConfig {
    /// Load `.env`, then `CALLSIM_CONFIG` (default `config/callsim`, any extension the
    /// `config` crate understands) if present, then `CALLSIM__*` env vars.
    pub fn load() -> Result<Self, config::ConfigError> {
        let _ = dotenvy::dotenv();
        let config_path =
            std::env::var("CALLSIM_CONFIG").unwrap_or_else(|_| "config/callsim".to_string());
        Self::load_from(&config_path)
    }

    /// Same as [`CallSimConfig::load`] with an explicit file path and no `.env`.
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .set_default("backend.base_url", DEFAULT_BASE_URL)?
            .set_default("backend.request_timeout_secs", 30_i64)?
            .set_default("session.autoplay_greeting", true)?;

        let path = Path::new(config_path);
        let with_toml = path.with_extension("toml");
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else if with_toml.exists() {
            builder.add_source(config::File::from(with_toml))
        } else {
            builder
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix("CALLSIM")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        built.try_deserialize()
    }
}
