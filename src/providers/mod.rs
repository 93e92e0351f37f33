//! LLM provider adapters
//!
//! Each adapter owns its vendor's request/response shape, auth
//! header and default parameters. None of them know about routing,
//! fallback or the other provider.

pub mod openai;
pub mod yandex;

use async_trait::async_trait;
use log::{error, trace};
use crate::error::Error;
use crate::request::{GenerationRequest, ProviderOutput};

// Re-export for convenience
pub use openai::OpenAiProvider;
pub use yandex::YandexGptProvider;

/// Adapter contract the dispatcher calls through
#[async_trait]
pub trait GenerationProvider: Send + Sync
{   /// Stable provider name used in results and telemetry labels
    fn name(&self) -> &str;

    /// Default text model, labels attempts that fail
    fn text_model(&self) -> &str;

    /// Default image model
    fn image_model(&self) -> &str
    {   self.text_model()
    }

    /// Credentials and identifiers are present
    fn is_configured(&self) -> bool;

    /// Whether `generate_image` is implemented
    fn supports_images(&self) -> bool
    {   false
    }

    async fn generate_text(&self, request: &GenerationRequest)
      -> Result<ProviderOutput, Error>;

    async fn generate_image(&self, _request: &GenerationRequest)
      -> Result<ProviderOutput, Error>
    {   Err(Error::not_supported(self.name(), "image generation"))
    }
}

/// Shared client builder with the configured timeout
pub(crate) fn http_client(
  timeout: std::time::Duration
) -> reqwest::Client
{   reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .unwrap_or_else(|e| {
        error!("Falling back to default HTTP client: {}", e);
        reqwest::Client::new()
      })
}

/// Map a reqwest send/read failure into a transport error
pub(crate) fn transport_error(provider: &str, e: reqwest::Error) -> Error
{   if e.is_timeout()
    {   error!("{} request timed out: {}", provider, e);
        Error::transport(provider, format!("request timed out: {}", e))
    } else
    {   error!("{} HTTP error: {}", provider, e);
        Error::transport(provider, e.to_string())
    }
}

/// Read the body of a response, turning non-2xx into a status error
pub(crate) async fn read_body(
  provider: &str
, response: reqwest::Response
) -> Result<String, Error>
{   let status = response.status();
    trace!("{} response status: {}", provider, status);

    if !status.is_success()
    {   let error_text = response.text().await
          .unwrap_or_else(|_|
            "Unknown error".to_string()
          );
        error!("{} API error {}: {}", provider, status, error_text);
        return Err(Error::status(provider, status.as_u16(), error_text));
    }

    response.text().await
      .map_err(|e| transport_error(provider, e))
}

/// Decode a 2xx body, a shape mismatch is a malformed response
pub(crate) fn decode<T: serde::de::DeserializeOwned>(
  provider: &str
, body: &str
) -> Result<T, Error>
{   serde_json::from_str(body).map_err(|e| {
      error!("{} parse error: {}", provider, e);
      Error::malformed(provider, e.to_string())
    })
}
