//! Routing policy and fallback classification

use log::{debug, error};
use rand::Rng;
use serde::Serialize;
use crate::error::{ConfigError, Error};
use crate::request::GenerationResult;

/// Which of the two providers serves a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route
{   /// Incumbent provider
    Primary
  , /// Migration target
    Secondary
}

/// Validated routing configuration snapshot
///
/// The ratio is checked once at construction, so every live
/// policy has `secondary_ratio` within [0.0, 1.0].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingPolicy
{   ab_testing_enabled: bool
  , secondary_ratio: f64
  , secondary_enabled: bool
  , fallback_enabled: bool
}

impl RoutingPolicy
{   pub fn new(
      ab_testing_enabled: bool
    , secondary_ratio: f64
    , secondary_enabled: bool
    , fallback_enabled: bool
    ) -> Result<Self, ConfigError>
    {   if !(0.0..=1.0).contains(&secondary_ratio)
        {   error!(
              "Rejecting routing policy: secondary ratio {} out of range",
              secondary_ratio
            );
            return Err(ConfigError::InvalidRatio(secondary_ratio));
        }
        Ok(RoutingPolicy
        {   ab_testing_enabled
          , secondary_ratio
          , secondary_enabled
          , fallback_enabled
        })
    }

    /// Primary only, fallback on
    pub fn primary_only() -> Self
    {   RoutingPolicy
        {   ab_testing_enabled: false
          , secondary_ratio: 0.0
          , secondary_enabled: false
          , fallback_enabled: true
        }
    }

    pub fn ab_testing_enabled(&self) -> bool
    {   self.ab_testing_enabled
    }

    pub fn secondary_ratio(&self) -> f64
    {   self.secondary_ratio
    }

    pub fn secondary_enabled(&self) -> bool
    {   self.secondary_enabled
    }

    pub fn fallback_enabled(&self) -> bool
    {   self.fallback_enabled
    }

    /// Pick a route for one text generation call
    ///
    /// Without A/B testing the choice is static and `rng` is not
    /// touched. With A/B testing one uniform draw in [0, 1) is
    /// taken and compared against the ratio.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> RouteDecision
    {   if !self.ab_testing_enabled
        {   let route = if self.secondary_enabled
            {   Route::Secondary
            } else
            {   Route::Primary
            };
            return RouteDecision
            {   route
              , sampled: false
            };
        }

        let draw: f64 = rng.gen();
        let route = if draw < self.secondary_ratio
        {   Route::Secondary
        } else
        {   Route::Primary
        };
        debug!(
          "A/B draw {:.4} against ratio {} -> {:?}",
          draw, self.secondary_ratio, route
        );
        RouteDecision
        {   route
          , sampled: true
        }
    }

    /// Whether a failure on `route` may hop to the primary
    pub fn allows_fallback_from(&self, route: Route) -> bool
    {   route == Route::Secondary && self.fallback_enabled
    }
}

impl Default for RoutingPolicy
{   fn default() -> Self
    {   RoutingPolicy::primary_only()
    }
}

/// Outcome of a routing decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteDecision
{   pub route: Route
  , /// A random draw was taken (A/B mode)
    pub sampled: bool
}

/// Outcome of one provider attempt
#[derive(Debug)]
pub enum Attempt
{   Success(GenerationResult)
  , /// Failure a fallback hop may follow
    Retryable(Error)
  , /// Failure that must surface as is
    Terminal(Error)
}

impl Attempt
{   pub fn classify(result: Result<GenerationResult, Error>) -> Self
    {   match result
        {   Ok(result) => Attempt::Success(result)
          , Err(e) if e.is_retryable() => Attempt::Retryable(e)
          , Err(e) => Attempt::Terminal(e)
        }
    }

    pub fn into_result(self) -> Result<GenerationResult, Error>
    {   match self
        {   Attempt::Success(result) => Ok(result)
          , Attempt::Retryable(e) | Attempt::Terminal(e) => Err(e)
        }
    }
}
