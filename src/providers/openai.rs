use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use log::{debug, trace, error};
use crate::config::OpenAiConfig;
use crate::error::Error;
use crate::request::
{   GenerationRequest
  , GeneratedContent
  , ProviderOutput
  , DEFAULT_IMAGE_SIZE
  , DEFAULT_TEMPERATURE
};

pub const PROVIDER_NAME: &str = "openai";

// ===== Message Types =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage
{   pub role: String
  , pub content: Option<String>
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAiChatRequest
{   pub model: String
  , pub messages: Vec<ChatMessage>
  , pub max_tokens: u32
  , pub temperature: f32
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiChatResponse
{   pub choices: Vec<Choice>
  , #[serde(default)]
    pub usage: Option<Usage>
  , #[serde(default)]
    pub model: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice
{   pub message: ChatMessage
  , pub finish_reason: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
pub struct Usage
{   pub total_tokens: u64
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAiImageRequest
{   pub model: String
  , pub prompt: String
  , pub n: u32
  , pub size: String
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiImageResponse
{   pub data: Vec<ImageData>
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageData
{   pub url: Option<String>
}

// ===== OpenAI Adapter =====

/// Primary provider: OpenAI chat completions and images
pub struct OpenAiProvider
{   config: OpenAiConfig
  , http_client: reqwest::Client
}

impl OpenAiProvider
{   pub fn new(config: OpenAiConfig) -> Self
    {   debug!("Creating OpenAiProvider for model {}", config.provider.model);
        let http_client
          = super::http_client(config.provider.timeout());
        OpenAiProvider
        {   config
          , http_client
        }
    }

    fn api_key(&self) -> Result<&str, Error>
    {   self.config.provider.api_key.as_deref()
          .ok_or_else(|| {
            error!("No OpenAI API key configured");
            Error::configuration(PROVIDER_NAME, "OPENAI_API_KEY is not set")
          })
    }

    fn endpoint(&self, path: &str) -> String
    {   format!(
          "{}/{}",
          self.config.provider.api_base.trim_end_matches('/'),
          path
        )
    }

    async fn post<T: Serialize + std::fmt::Debug>(
      &self
    , path: &str
    , api_key: &str
    , payload: &T
    ) -> Result<String, Error>
    {   trace!("OpenAI request to {}: {:?}", path, payload);

        let response = self.http_client
          .post(self.endpoint(path))
          .header("Authorization", format!("Bearer {}", api_key))
          .header("Content-Type", "application/json")
          .json(payload)
          .send()
          .await
          .map_err(|e| super::transport_error(PROVIDER_NAME, e))?;

        super::read_body(PROVIDER_NAME, response).await
    }
}

#[async_trait]
impl super::GenerationProvider for OpenAiProvider
{   fn name(&self) -> &str
    {   PROVIDER_NAME
    }

    fn text_model(&self) -> &str
    {   &self.config.provider.model
    }

    fn image_model(&self) -> &str
    {   &self.config.image_model
    }

    fn is_configured(&self) -> bool
    {   self.config.provider.api_key.is_some()
    }

    fn supports_images(&self) -> bool
    {   true
    }

    async fn generate_text(&self, request: &GenerationRequest)
      -> Result<ProviderOutput, Error>
    {   let api_key = self.api_key()?;
        let options = request.options();
        let model = self.config.provider.model.clone();
        debug!("OpenAI generate_text with model {}", model);

        let payload = OpenAiChatRequest
        {   model: model.clone()
          , messages: vec![
              ChatMessage
              {   role: "user".to_string()
                , content: Some(request.prompt().to_string())
              }
            ]
          , max_tokens: options.max_tokens
              .unwrap_or(self.config.provider.max_tokens)
          , temperature: options.temperature
              .unwrap_or(DEFAULT_TEMPERATURE)
        };

        let body = self.post("chat/completions", api_key, &payload).await?;
        let chat: OpenAiChatResponse
          = super::decode(PROVIDER_NAME, &body)?;

        let text = chat.choices.first()
          .and_then(|c| c.message.content.clone())
          .ok_or_else(|| {
            error!("No message content in OpenAI response");
            Error::malformed(
              PROVIDER_NAME, "response contained no message content"
            )
          })?;

        Ok(ProviderOutput
        {   content: GeneratedContent::Text(text)
          , model
          , tokens_used: chat.usage.map(|u| u.total_tokens)
        })
    }

    async fn generate_image(&self, request: &GenerationRequest)
      -> Result<ProviderOutput, Error>
    {   let api_key = self.api_key()?;
        let model = self.config.image_model.clone();
        debug!("OpenAI generate_image with model {}", model);

        let payload = OpenAiImageRequest
        {   model: model.clone()
          , prompt: request.prompt().to_string()
          , n: 1
          , size: request.options().size.clone()
              .unwrap_or_else(|| DEFAULT_IMAGE_SIZE.to_string())
        };

        let body = self.post("images/generations", api_key, &payload).await?;
        let images: OpenAiImageResponse
          = super::decode(PROVIDER_NAME, &body)?;

        let url = images.data.first()
          .and_then(|d| d.url.clone())
          .ok_or_else(|| {
            error!("No image URL in OpenAI response");
            Error::malformed(PROVIDER_NAME, "response contained no image url")
          })?;

        Ok(ProviderOutput
        {   content: GeneratedContent::ImageUrl(url)
          , model
          , tokens_used: None
        })
    }
}
