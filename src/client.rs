use std::sync::Arc;
use std::time::Duration;
use arc_swap::ArcSwap;
use log::{debug, error, info, warn};
use tokio::time::Instant;
use crate::error::Error;
use crate::failover::{Attempt, Route, RoutingPolicy};
use crate::providers::GenerationProvider;
use crate::request::{GenerationRequest, GenerationResult};
use crate::telemetry::TelemetrySink;

/// Upper bound for a single outbound attempt when none is configured
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation
{   Text
  , Image
}

/// Chooses a provider per call, applies the fallback hop and
/// reports every decision and outcome to telemetry
///
/// Built once at startup and shared behind an `Arc`. The only
/// mutable state is the policy slot, swapped atomically on reload.
pub struct Dispatcher
{   primary: Arc<dyn GenerationProvider>
  , secondary: Arc<dyn GenerationProvider>
  , policy: ArcSwap<RoutingPolicy>
  , telemetry: Arc<dyn TelemetrySink>
  , attempt_timeout: Duration
}

impl Dispatcher
{   pub fn new(
      primary: Arc<dyn GenerationProvider>
    , secondary: Arc<dyn GenerationProvider>
    , policy: RoutingPolicy
    , telemetry: Arc<dyn TelemetrySink>
    ) -> Self
    {   debug!(
          "Creating Dispatcher: primary={} secondary={}",
          primary.name(), secondary.name()
        );
        Dispatcher
        {   primary
          , secondary
          , policy: ArcSwap::from_pointee(policy)
          , telemetry
          , attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT
        }
    }

    /// Bound each outbound attempt
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self
    {   self.attempt_timeout = timeout;
        self
    }

    /// Current policy snapshot
    pub fn policy(&self) -> Arc<RoutingPolicy>
    {   self.policy.load_full()
    }

    /// Swap in a new policy, in-flight calls keep their snapshot
    pub fn reload_policy(&self, policy: RoutingPolicy)
    {   info!(
          "Routing policy reloaded: ab_testing={} ratio={} secondary={} fallback={}",
          policy.ab_testing_enabled(),
          policy.secondary_ratio(),
          policy.secondary_enabled(),
          policy.fallback_enabled()
        );
        self.policy.store(Arc::new(policy));
    }

    pub fn primary(&self) -> &dyn GenerationProvider
    {   self.primary.as_ref()
    }

    pub fn secondary(&self) -> &dyn GenerationProvider
    {   self.secondary.as_ref()
    }

    fn provider_for(&self, route: Route) -> &dyn GenerationProvider
    {   match route
        {   Route::Primary => self.primary.as_ref()
          , Route::Secondary => self.secondary.as_ref()
        }
    }

    /// Generate text through the routed provider, hopping to the
    /// primary once if a secondary attempt fails and fallback is on
    pub async fn generate_text(&self, request: &GenerationRequest)
      -> Result<GenerationResult, Error>
    {   let policy = self.policy();
        let decision = {
          let mut rng = rand::thread_rng();
          policy.choose(&mut rng)
        };
        let chosen = self.provider_for(decision.route);

        if decision.sampled
        {   info!("A/B routing selected {}", chosen.name());
            self.telemetry.record_route(chosen.name());
        } else
        {   debug!("Static routing selected {}", chosen.name());
        }

        match self.attempt(chosen, Operation::Text, request).await
        {   Attempt::Success(result) => Ok(result)
          , Attempt::Retryable(e)
              if policy.allows_fallback_from(decision.route) => {
              warn!(
                "{} failed ({}), falling back to {}",
                chosen.name(), e, self.primary.name()
              );
              match self.attempt(self.primary.as_ref(), Operation::Text, request).await
              {   Attempt::Success(result) => {
                    Ok(result.mark_fallback(chosen.name()))
                  }
                , Attempt::Retryable(fallback_err)
                | Attempt::Terminal(fallback_err) => {
                    error!("Fallback also failed: {}", fallback_err);
                    Err(fallback_err)
                  }
              }
            }
          , other => other.into_result()
        }
    }

    /// Generate an image through the first provider that supports
    /// it; no A/B split and no fallback
    pub async fn generate_image(&self, request: &GenerationRequest)
      -> Result<GenerationResult, Error>
    {   let provider = [self.primary.as_ref(), self.secondary.as_ref()]
          .into_iter()
          .find(|p| p.supports_images());

        match provider
        {   Some(provider) => {
              debug!("Image generation routed to {}", provider.name());
              self.attempt(provider, Operation::Image, request)
                .await
                .into_result()
            }
          , None => {
              error!("No provider implements image generation");
              Err(Error::not_supported(
                self.primary.name(), "image generation"
              ))
            }
        }
    }

    /// One bounded call against one provider, with telemetry
    async fn attempt(
      &self
    , provider: &dyn GenerationProvider
    , operation: Operation
    , request: &GenerationRequest
    ) -> Attempt
    {   let budget = request.time_budget(self.attempt_timeout);
        let started = Instant::now();

        let outcome = if budget.is_zero()
        {   Err(Error::transport(provider.name(), "request deadline elapsed"))
        } else
        {   let call = async {
              match operation
              {   Operation::Text => provider.generate_text(request).await
                , Operation::Image => provider.generate_image(request).await
              }
            };
            match tokio::time::timeout(budget, call).await
            {   Ok(outcome) => outcome
              , Err(_) => Err(Error::transport(
                  provider.name()
                , format!("timed out after {:?}", budget)
                ))
            }
        };
        let duration = started.elapsed();

        let model = match &outcome
        {   Ok(output) => output.model.as_str()
          , Err(_) => match operation
            {   Operation::Text => provider.text_model()
              , Operation::Image => provider.image_model()
            }
        };
        self.telemetry.record_attempt(provider.name(), model, duration);

        match outcome
        {   Ok(output) => {
              info!(
                "{} generation finished in {:.2}s",
                provider.name(), duration.as_secs_f64()
              );
              Attempt::Success(
                GenerationResult::from_output(provider.name(), output, duration)
              )
            }
          , Err(e) => {
              error!("{} generation failed: {}", provider.name(), e);
              self.telemetry.record_error(provider.name(), e.kind());
              Attempt::classify(Err(e))
            }
        }
    }
}
