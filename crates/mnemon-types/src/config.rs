//! Global configuration types for Mnemon.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls
//! model defaults, chaining behavior, and provider settings.

use serde::{Deserialize, Serialize};

use crate::agent::ModelConfig;

/// Top-level configuration for the Mnemon server.
///
/// Loaded from `~/.mnemon/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Model configuration used for agents created without an override.
    #[serde(default)]
    pub default_model: ModelConfig,

    /// Whether agents chain steps on heartbeat requests.
    #[serde(default = "default_chaining")]
    pub chaining: bool,

    /// Hard cap on chained steps per incoming request. `None` means
    /// unbounded.
    #[serde(default)]
    pub max_chaining_steps: Option<u64>,

    /// Provider endpoint settings.
    #[serde(default)]
    pub provider: ProviderConfig,
}

fn default_chaining() -> bool {
    true
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            default_model: ModelConfig::default(),
            chaining: default_chaining(),
            max_chaining_steps: None,
            provider: ProviderConfig::default(),
        }
    }
}

/// Provider endpoint settings.
///
/// The API key itself never lives in `config.toml`; only the name of the
/// environment variable that holds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL override; `None` uses the provider's public endpoint.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Environment variable to read the API key from.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key_env: default_api_key_env(),
        }
    }
}
