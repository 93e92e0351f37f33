#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use splitgen::
{   Dispatcher
  , Error
  , GeneratedContent
  , GenerationProvider
  , GenerationRequest
  , ProviderOutput
  , RoutingPolicy
  , Telemetry
};

pub const PRIMARY: &str = "primary";
pub const SECONDARY: &str = "secondary";
pub const PRIMARY_MODEL: &str = "primary-model";
pub const SECONDARY_MODEL: &str = "secondary-model";

/// Provider whose behaviour is fixed up front
pub struct ScriptedProvider
{   name: &'static str
  , model: &'static str
  , failure: Option<Error>
  , images: bool
  , delay: Option<Duration>
  , calls: AtomicUsize
}

impl ScriptedProvider
{   pub fn ok(name: &'static str, model: &'static str) -> Self
    {   ScriptedProvider
        {   name
          , model
          , failure: None
          , images: false
          , delay: None
          , calls: AtomicUsize::new(0)
        }
    }

    pub fn failing(name: &'static str, model: &'static str, failure: Error)
      -> Self
    {   ScriptedProvider
        {   failure: Some(failure)
          , ..ScriptedProvider::ok(name, model)
        }
    }

    pub fn with_images(mut self) -> Self
    {   self.images = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self
    {   self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize
    {   self.calls.load(Ordering::SeqCst)
    }

    async fn respond(&self, content: GeneratedContent)
      -> Result<ProviderOutput, Error>
    {   self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay
        {   tokio::time::sleep(delay).await;
        }
        match &self.failure
        {   Some(e) => Err(e.clone())
          , None => Ok(ProviderOutput
            {   content
              , model: self.model.to_string()
              , tokens_used: Some(7)
            })
        }
    }
}

#[async_trait]
impl GenerationProvider for ScriptedProvider
{   fn name(&self) -> &str
    {   self.name
    }

    fn text_model(&self) -> &str
    {   self.model
    }

    fn is_configured(&self) -> bool
    {   true
    }

    fn supports_images(&self) -> bool
    {   self.images
    }

    async fn generate_text(&self, request: &GenerationRequest)
      -> Result<ProviderOutput, Error>
    {   self.respond(GeneratedContent::Text(
          format!("{} says: {}", self.name, request.prompt())
        )).await
    }

    async fn generate_image(&self, request: &GenerationRequest)
      -> Result<ProviderOutput, Error>
    {   if !self.images
        {   self.calls.fetch_add(1, Ordering::SeqCst);
            return Err(Error::not_supported(self.name, "image generation"));
        }
        self.respond(GeneratedContent::ImageUrl(
          format!("https://img.example/{}", request.prompt().len())
        )).await
    }
}

pub struct Harness
{   pub primary: Arc<ScriptedProvider>
  , pub secondary: Arc<ScriptedProvider>
  , pub telemetry: Arc<Telemetry>
  , pub dispatcher: Arc<Dispatcher>
}

impl Harness
{   pub fn new(
      primary: ScriptedProvider
    , secondary: ScriptedProvider
    , policy: RoutingPolicy
    ) -> Self
    {   let primary = Arc::new(primary);
        let secondary = Arc::new(secondary);
        let telemetry = Arc::new(Telemetry::new().unwrap());
        let dispatcher = Arc::new(Dispatcher::new(
          primary.clone()
        , secondary.clone()
        , policy
        , telemetry.clone()
        ));
        Harness
        {   primary
          , secondary
          , telemetry
          , dispatcher
        }
    }
}

pub fn policy(
  ab: bool
, ratio: f64
, secondary: bool
, fallback: bool
) -> RoutingPolicy
{   RoutingPolicy::new(ab, ratio, secondary, fallback).unwrap()
}

pub fn request(prompt: &str) -> GenerationRequest
{   GenerationRequest::new(prompt, Default::default()).unwrap()
}
