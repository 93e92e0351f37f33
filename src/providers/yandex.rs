use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use log::{debug, trace, error, warn};
use crate::config::YandexConfig;
use crate::error::Error;
use crate::request::
{   GenerationRequest
  , GeneratedContent
  , ProviderOutput
  , DEFAULT_TEMPERATURE
};

pub const PROVIDER_NAME: &str = "yandex";

// ===== Message Types =====

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YandexMessage
{   pub role: String
  , pub text: String
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionOptions
{   pub stream: bool
  , pub temperature: f32
  , /// Sent as a string, as the API expects
    pub max_tokens: String
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YandexCompletionRequest
{   pub model_uri: String
  , pub completion_options: CompletionOptions
  , pub messages: Vec<YandexMessage>
}

#[derive(Debug, Clone, Deserialize)]
pub struct YandexCompletionResponse
{   pub result: CompletionResult
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionResult
{   pub alternatives: Vec<Alternative>
  , #[serde(default)]
    pub usage: Option<YandexUsage>
  , #[serde(default)]
    pub model_version: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
pub struct Alternative
{   pub message: YandexMessage
  , #[serde(default)]
    pub status: Option<String>
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YandexUsage
{   /// The API reports counts as strings, older builds as numbers
    #[serde(default)]
    pub total_tokens: Option<serde_json::Value>
}

impl YandexUsage
{   pub fn total(&self) -> Option<u64>
    {   match self.total_tokens.as_ref()?
        {   serde_json::Value::Number(n) => n.as_u64()
          , serde_json::Value::String(s) => s.parse().ok()
          , _ => None
        }
    }
}

// ===== Yandex GPT Adapter =====

/// Secondary provider: Yandex GPT foundation models
pub struct YandexGptProvider
{   config: YandexConfig
  , http_client: reqwest::Client
}

impl YandexGptProvider
{   pub fn new(config: YandexConfig) -> Self
    {   debug!("Creating YandexGptProvider for model {}", config.provider.model);
        if !config.credentials_configured()
        {   warn!("Yandex GPT credentials are not configured");
        }
        let http_client
          = super::http_client(config.provider.timeout());
        YandexGptProvider
        {   config
          , http_client
        }
    }

    /// `YANDEX_GPT_URI` when set, else `gpt://{folder}/{model}`
    pub fn model_uri(&self, folder_id: &str) -> String
    {   self.config.model_uri.clone()
          .unwrap_or_else(|| {
            format!("gpt://{}/{}", folder_id, self.config.provider.model)
          })
    }

    fn credentials(&self) -> Result<(&str, &str), Error>
    {   match (
          self.config.provider.api_key.as_deref()
        , self.config.folder_id.as_deref()
        )
        {   (Some(key), Some(folder)) => Ok((key, folder))
          , (None, _) => {
              error!("No Yandex GPT API key configured");
              Err(Error::configuration(
                PROVIDER_NAME, "YANDEX_GPT_API_KEY is not set"
              ))
            }
          , (_, None) => {
              error!("No Yandex GPT folder id configured");
              Err(Error::configuration(
                PROVIDER_NAME, "YANDEX_GPT_FOLDER_ID is not set"
              ))
            }
        }
    }
}

#[async_trait]
impl super::GenerationProvider for YandexGptProvider
{   fn name(&self) -> &str
    {   PROVIDER_NAME
    }

    fn text_model(&self) -> &str
    {   &self.config.provider.model
    }

    fn is_configured(&self) -> bool
    {   self.config.credentials_configured()
    }

    async fn generate_text(&self, request: &GenerationRequest)
      -> Result<ProviderOutput, Error>
    {   let (api_key, folder_id) = self.credentials()?;
        let options = request.options();
        debug!("Yandex GPT generate_text with model {}", self.config.provider.model);

        let payload = YandexCompletionRequest
        {   model_uri: self.model_uri(folder_id)
          , completion_options: CompletionOptions
            {   stream: false
              , temperature: options.temperature
                  .unwrap_or(DEFAULT_TEMPERATURE)
              , max_tokens: options.max_tokens
                  .unwrap_or(self.config.provider.max_tokens)
                  .to_string()
            }
          , messages: vec![
              YandexMessage
              {   role: "user".to_string()
                , text: request.prompt().to_string()
              }
            ]
        };

        trace!("Yandex GPT request: {:?}", payload);

        let response = self.http_client
          .post(format!(
            "{}/completion",
            self.config.provider.api_base.trim_end_matches('/')
          ))
          .header("Authorization", format!("Api-Key {}", api_key))
          .header("Content-Type", "application/json")
          .json(&payload)
          .send()
          .await
          .map_err(|e| super::transport_error(PROVIDER_NAME, e))?;

        let body = super::read_body(PROVIDER_NAME, response).await?;
        let completion: YandexCompletionResponse
          = super::decode(PROVIDER_NAME, &body)?;

        let text = completion.result.alternatives.first()
          .map(|a| a.message.text.clone())
          .ok_or_else(|| {
            error!("No alternatives in Yandex GPT response");
            Error::malformed(PROVIDER_NAME, "response contained no alternatives")
          })?;

        Ok(ProviderOutput
        {   content: GeneratedContent::Text(text)
          , model: self.config.provider.model.clone()
          , tokens_used: completion.result.usage
              .as_ref()
              .and_then(YandexUsage::total)
        })
    }
}
