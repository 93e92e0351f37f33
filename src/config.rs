//! Configuration for providers, routing and the HTTP boundary

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use log::debug;
use serde::{Deserialize, Serialize};
use crate::error::ConfigError;
use crate::failover::RoutingPolicy;

pub const DEFAULT_OPENAI_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_YANDEX_BASE: &str
  = "https://llm.api.cloud.yandex.net/foundationModels/v1";

/// Provider configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig
{   /// API key, `None` when not configured
    pub api_key: Option<String>
  , /// API base URL
    pub api_base: String
  , /// Default text model
    pub model: String
  , /// Default max tokens for text generation
    pub max_tokens: u32
  , /// Request timeout in seconds
    pub timeout_secs: u64
}

impl ProviderConfig
{   pub fn timeout(&self) -> Duration
    {   Duration::from_secs(self.timeout_secs)
    }
}

/// OpenAI (primary) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig
{   pub provider: ProviderConfig
  , /// Model used for image generation
    pub image_model: String
}

/// Yandex GPT (secondary) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YandexConfig
{   pub provider: ProviderConfig
  , /// Cloud folder the model lives in
    pub folder_id: Option<String>
  , /// Explicit model URI, overrides `gpt://{folder}/{model}`
    pub model_uri: Option<String>
}

impl YandexConfig
{   /// Both the API key and folder id are present
    pub fn credentials_configured(&self) -> bool
    {   self.provider.api_key.is_some() && self.folder_id.is_some()
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig
{   pub host: String
  , pub port: u16
  , /// Path segment under `/api/`
    pub api_version: String
}

/// Full process configuration
#[derive(Debug, Clone)]
pub struct Settings
{   pub openai: OpenAiConfig
  , pub yandex: YandexConfig
  , pub policy: RoutingPolicy
  , pub server: ServerConfig
  , pub log_level: String
}

impl Settings
{   /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError>
    {   Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
      F: Fn(&str) -> Option<String>
    {   debug!("Loading settings");
        let env = Lookup(&lookup);
        let timeout_secs = env.parse("PROVIDER_TIMEOUT_SECS", 60u64)?;

        let openai = OpenAiConfig
        {   provider: ProviderConfig
            {   api_key: env.optional("OPENAI_API_KEY")
              , api_base: env.string(
                  "OPENAI_BASE_URL", DEFAULT_OPENAI_BASE
                )
              , model: env.string("OPENAI_MODEL", "gpt-4")
              , max_tokens: env.parse("OPENAI_MAX_TOKENS", 2000u32)?
              , timeout_secs
            }
          , image_model: env.string("OPENAI_IMAGE_MODEL", "dall-e-2")
        };

        let yandex = YandexConfig
        {   provider: ProviderConfig
            {   api_key: env.optional("YANDEX_GPT_API_KEY")
              , api_base: env.string(
                  "YANDEX_GPT_BASE_URL", DEFAULT_YANDEX_BASE
                )
              , model: env.string("YANDEX_GPT_MODEL", "yandexgpt-lite")
              , max_tokens: env.parse("YANDEX_GPT_MAX_TOKENS", 2000u32)?
              , timeout_secs
            }
          , folder_id: env.optional("YANDEX_GPT_FOLDER_ID")
          , model_uri: env.optional("YANDEX_GPT_URI")
        };

        let policy = policy_from(&env)?;

        let server = ServerConfig
        {   host: env.string("HOST", "0.0.0.0")
          , port: env.parse("PORT", 8000u16)?
          , api_version: env.string("API_VERSION", "v1")
        };

        Ok(Settings
        {   openai
          , yandex
          , policy
          , server
          , log_level: env.string("LOG_LEVEL", "info")
        })
    }
}

/// Read the routing policy keys from `path` as it is on disk now
///
/// Values in the file win over the process environment, which
/// still holds whatever was loaded at startup. Keys the file does
/// not set fall through to the process environment.
pub fn policy_from_env_file(path: &Path) -> Result<RoutingPolicy, ConfigError>
{   let lookup = env_file_lookup(path)?;
    policy_from(&Lookup(&lookup))
}

impl Settings
{   /// Load with `path` layered over the process environment
    pub fn from_env_file(path: &Path) -> Result<Self, ConfigError>
    {   Self::from_lookup(env_file_lookup(path)?)
    }
}

fn env_file_lookup(path: &Path)
  -> Result<impl Fn(&str) -> Option<String>, ConfigError>
{   let mut file = HashMap::new();
    if path.exists()
    {   for item in dotenvy::from_path_iter(path)?
        {   let (key, value) = item?;
            file.insert(key, value);
        }
        debug!("Read {} keys from {:?}", file.len(), path);
    }
    Ok(move |key: &str| {
      file.get(key)
        .cloned()
        .or_else(|| std::env::var(key).ok())
    })
}

fn policy_from(env: &Lookup<'_>) -> Result<RoutingPolicy, ConfigError>
{   RoutingPolicy::new(
      env.flag("ENABLE_AB_TESTING", false)?
    , env.parse("YANDEX_GPT_RATIO", 0.0f64)?
    , env.flag("ENABLE_YANDEX_GPT", false)?
    , env.flag("FALLBACK_TO_OPENAI", true)?
    )
}

struct Lookup<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Lookup<'_>
{   /// Present and non-blank value
    fn optional(&self, key: &str) -> Option<String>
    {   (self.0)(key)
          .map(|v| v.trim().to_string())
          .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String
    {   self.optional(key)
          .unwrap_or_else(|| default.to_string())
    }

    fn parse<T: std::str::FromStr>(
      &self
    , key: &str
    , default: T
    ) -> Result<T, ConfigError>
    {   match self.optional(key)
        {   Some(value) => value.parse().map_err(|_| {
              ConfigError::InvalidValue
              {   key: key.to_string()
                , value
              }
            })
          , None => Ok(default)
        }
    }

    fn flag(&self, key: &str, default: bool)
      -> Result<bool, ConfigError>
    {   match self.optional(key)
        {   Some(value) => parse_flag(&value).ok_or(
              ConfigError::InvalidValue
              {   key: key.to_string()
                , value
              }
            )
          , None => Ok(default)
        }
    }
}

/// Lenient boolean parsing for env values
pub fn parse_flag(value: &str) -> Option<bool>
{   match value.trim().to_ascii_lowercase().as_str()
    {   "true" | "1" | "yes" | "on" => Some(true)
      , "false" | "0" | "no" | "off" => Some(false)
      , _ => None
    }
}
