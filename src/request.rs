//! Unified request and response types

use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_IMAGE_SIZE: &str = "1024x1024";

/// Optional generation parameters
///
/// Every field is independently defaulted by the adapter that
/// serves the call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions
{   /// Max tokens to generate
    pub max_tokens: Option<u32>
  , /// Temperature for sampling
    pub temperature: Option<f32>
  , /// Image size such as `1024x1024`
    pub size: Option<String>
}

impl GenerationOptions
{   pub fn with_max_tokens(mut self, max_tokens: u32) -> Self
    {   self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self
    {   self.temperature = Some(temperature);
        self
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self
    {   self.size = Some(size.into());
        self
    }
}

/// An empty prompt was supplied
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("prompt must not be empty")]
pub struct EmptyPrompt;

/// Immutable generation request
#[derive(Debug, Clone)]
pub struct GenerationRequest
{   prompt: String
  , options: GenerationOptions
  , deadline: Option<Instant>
}

impl GenerationRequest
{   pub fn new(
      prompt: impl Into<String>
    , options: GenerationOptions
    ) -> Result<Self, EmptyPrompt>
    {   let prompt = prompt.into();
        if prompt.trim().is_empty()
        {   return Err(EmptyPrompt);
        }
        Ok(GenerationRequest
        {   prompt
          , options
          , deadline: None
        })
    }

    /// Bound every outbound attempt by the caller's deadline
    pub fn with_deadline(mut self, deadline: Instant) -> Self
    {   self.deadline = Some(deadline);
        self
    }

    pub fn prompt(&self) -> &str
    {   &self.prompt
    }

    pub fn options(&self) -> &GenerationOptions
    {   &self.options
    }

    pub fn deadline(&self) -> Option<Instant>
    {   self.deadline
    }

    /// Time left until the deadline, capped at `limit`
    pub fn time_budget(&self, limit: Duration) -> Duration
    {   match self.deadline
        {   Some(deadline) => {
              deadline
                .saturating_duration_since(Instant::now())
                .min(limit)
            }
          , None => limit
        }
    }
}

/// What a provider produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum GeneratedContent
{   Text(String)
  , ImageUrl(String)
}

impl GeneratedContent
{   pub fn as_str(&self) -> &str
    {   match self
        {   GeneratedContent::Text(s) | GeneratedContent::ImageUrl(s) => s
        }
    }
}

/// Normalized adapter output, before the dispatcher annotates it
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderOutput
{   pub content: GeneratedContent
  , pub model: String
  , pub tokens_used: Option<u64>
}

/// Result handed back to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult
{   /// Generated text or image URL
    pub content: GeneratedContent
  , /// Provider that generated it
    pub provider: String
  , /// Model that generated it
    pub model: String
  , /// Wall-clock duration of the serving attempt
    pub duration: Duration
  , /// Tokens used, when reported
    pub tokens_used: Option<u64>
  , /// A fallback hop served this call
    pub fallback_used: bool
  , /// Provider tried first when `fallback_used` is set
    pub original_provider: Option<String>
}

impl GenerationResult
{   pub fn from_output(
      provider: impl Into<String>
    , output: ProviderOutput
    , duration: Duration
    ) -> Self
    {   GenerationResult
        {   content: output.content
          , provider: provider.into()
          , model: output.model
          , duration
          , tokens_used: output.tokens_used
          , fallback_used: false
          , original_provider: None
        }
    }

    pub(crate) fn mark_fallback(mut self, original: impl Into<String>)
      -> Self
    {   self.fallback_used = true;
        self.original_provider = Some(original.into());
        self
    }
}

// ===== HTTP bodies =====

fn default_max_tokens() -> Option<u32>
{   Some(2000)
}

fn default_temperature() -> Option<f32>
{   Some(DEFAULT_TEMPERATURE)
}

fn default_size() -> Option<String>
{   Some(DEFAULT_IMAGE_SIZE.to_string())
}

/// Body of `POST /generate/text`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextGenerationRequest
{   pub prompt: String
  , #[serde(default = "default_max_tokens")]
    pub max_tokens: Option<u32>
  , #[serde(default = "default_temperature")]
    pub temperature: Option<f32>
}

impl TextGenerationRequest
{   pub fn options(&self) -> GenerationOptions
    {   GenerationOptions
        {   max_tokens: self.max_tokens
          , temperature: self.temperature
          , size: None
        }
    }
}

/// Body of `POST /generate/image`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGenerationRequest
{   pub prompt: String
  , #[serde(default = "default_size")]
    pub size: Option<String>
}

impl ImageGenerationRequest
{   pub fn options(&self) -> GenerationOptions
    {   GenerationOptions
        {   size: self.size.clone()
          , ..GenerationOptions::default()
        }
    }
}

/// Response body for both generation endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse
{   pub result: String
  , pub provider: String
  , pub model: String
  , /// Seconds
    pub generation_time: f64
  , pub tokens_used: Option<u64>
  , pub fallback_used: bool
  , pub original_provider: Option<String>
}

impl From<GenerationResult> for GenerationResponse
{   fn from(r: GenerationResult) -> Self
    {   GenerationResponse
        {   generation_time: r.duration.as_secs_f64()
          , result: match r.content
            {   GeneratedContent::Text(s) | GeneratedContent::ImageUrl(s) => s
            }
          , provider: r.provider
          , model: r.model
          , tokens_used: r.tokens_used
          , fallback_used: r.fallback_used
          , original_provider: r.original_provider
        }
    }
}

/// Error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse
{   pub detail: String
}
