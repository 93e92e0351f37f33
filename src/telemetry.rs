//! Generation telemetry backed by a Prometheus registry

use std::time::Duration;
use log::{debug, error};
use prometheus::
{   Histogram
  , HistogramOpts
  , HistogramVec
  , IntCounterVec
  , Opts
  , Registry
  , TextEncoder
};
use crate::error::FailureKind;

const NAMESPACE: &str = "splitgen";

const GENERATION_BUCKETS: &[f64]
  = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0];

/// Where the dispatcher reports attempts, failures and A/B choices
///
/// Implementations must tolerate concurrent calls from any number of
/// in-flight requests.
pub trait TelemetrySink: Send + Sync
{   /// One provider attempt finished, successfully or not
    fn record_attempt(&self, provider: &str, model: &str, duration: Duration);

    /// One provider attempt failed
    fn record_error(&self, provider: &str, kind: FailureKind);

    /// An A/B draw picked `provider`
    fn record_route(&self, provider: &str);
}

/// Prometheus metrics for one process
///
/// Counters live in a private registry so separate instances never
/// share state.
#[derive(Clone)]
pub struct Telemetry
{   registry: Registry
  , generations: IntCounterVec
  , generation_duration: HistogramVec
  , generation_errors: IntCounterVec
  , ab_test_requests: IntCounterVec
  , http_requests: IntCounterVec
  , http_duration: Histogram
}

impl Telemetry
{   pub fn new() -> Result<Self, prometheus::Error>
    {   debug!("Registering telemetry metrics");
        let registry = Registry::new();

        let generations = IntCounterVec::new(
          Opts::new("ai_generations_total", "AI generation attempts")
            .namespace(NAMESPACE)
        , &["provider", "model"]
        )?;
        let generation_duration = HistogramVec::new(
          HistogramOpts::new(
            "ai_generation_duration_seconds"
          , "AI generation attempt duration"
          )
            .namespace(NAMESPACE)
            .buckets(GENERATION_BUCKETS.to_vec())
        , &["provider", "model"]
        )?;
        let generation_errors = IntCounterVec::new(
          Opts::new("ai_generation_errors_total", "AI generation errors")
            .namespace(NAMESPACE)
        , &["provider", "error_type"]
        )?;
        let ab_test_requests = IntCounterVec::new(
          Opts::new("ab_test_requests_total", "A/B routing decisions")
            .namespace(NAMESPACE)
        , &["provider"]
        )?;
        let http_requests = IntCounterVec::new(
          Opts::new("requests_total", "HTTP requests")
            .namespace(NAMESPACE)
        , &["method", "endpoint", "status"]
        )?;
        let http_duration = Histogram::with_opts(
          HistogramOpts::new("request_duration_seconds", "HTTP request duration")
            .namespace(NAMESPACE)
        )?;

        registry.register(Box::new(generations.clone()))?;
        registry.register(Box::new(generation_duration.clone()))?;
        registry.register(Box::new(generation_errors.clone()))?;
        registry.register(Box::new(ab_test_requests.clone()))?;
        registry.register(Box::new(http_requests.clone()))?;
        registry.register(Box::new(http_duration.clone()))?;

        Ok(Telemetry
        {   registry
          , generations
          , generation_duration
          , generation_errors
          , ab_test_requests
          , http_requests
          , http_duration
        })
    }

    /// One served HTTP request
    pub fn record_http(
      &self
    , method: &str
    , endpoint: &str
    , status: u16
    , duration: Duration
    )
    {   let status = status.to_string();
        self.http_requests
          .with_label_values(&[method, endpoint, status.as_str()])
          .inc();
        self.http_duration.observe(duration.as_secs_f64());
    }

    /// Attempts recorded for `(provider, model)`
    pub fn generations(&self, provider: &str, model: &str) -> u64
    {   self.generations
          .with_label_values(&[provider, model])
          .get()
    }

    /// Duration observations recorded for `(provider, model)`
    pub fn duration_samples(&self, provider: &str, model: &str) -> u64
    {   self.generation_duration
          .with_label_values(&[provider, model])
          .get_sample_count()
    }

    /// Failures recorded for `(provider, kind)`
    pub fn errors(&self, provider: &str, kind: FailureKind) -> u64
    {   self.generation_errors
          .with_label_values(&[provider, kind.as_str()])
          .get()
    }

    /// A/B decisions that picked `provider`
    pub fn routes(&self, provider: &str) -> u64
    {   self.ab_test_requests
          .with_label_values(&[provider])
          .get()
    }

    /// Served requests for `(method, endpoint, status)`
    pub fn http_requests(&self, method: &str, endpoint: &str, status: u16)
      -> u64
    {   let status = status.to_string();
        self.http_requests
          .with_label_values(&[method, endpoint, status.as_str()])
          .get()
    }

    /// Text exposition format for the scrape endpoint
    pub fn render(&self) -> String
    {   TextEncoder::new()
          .encode_to_string(&self.registry.gather())
          .unwrap_or_else(|e| {
            error!("Failed to encode metrics: {}", e);
            String::new()
          })
    }
}

impl TelemetrySink for Telemetry
{   fn record_attempt(&self, provider: &str, model: &str, duration: Duration)
    {   self.generations
          .with_label_values(&[provider, model])
          .inc();
        self.generation_duration
          .with_label_values(&[provider, model])
          .observe(duration.as_secs_f64());
    }

    fn record_error(&self, provider: &str, kind: FailureKind)
    {   self.generation_errors
          .with_label_values(&[provider, kind.as_str()])
          .inc();
    }

    fn record_route(&self, provider: &str)
    {   self.ab_test_requests
          .with_label_values(&[provider])
          .inc();
    }
}

#[cfg(test)]
mod tests
{   use super::*;

    #[test]
    fn counters_are_isolated_per_instance()
    {   let a = Telemetry::new().unwrap();
        let b = Telemetry::new().unwrap();
        a.record_route("yandex");
        assert_eq!(a.routes("yandex"), 1);
        assert_eq!(b.routes("yandex"), 0);
    }

    #[test]
    fn render_contains_recorded_series()
    {   let t = Telemetry::new().unwrap();
        t.record_attempt("openai", "gpt-4", Duration::from_millis(120));
        t.record_error("yandex", FailureKind::TransportError);
        t.record_http("GET", "/metrics", 200, Duration::from_millis(1));
        let text = t.render();
        assert!(text.contains("splitgen_ai_generations_total"));
        assert!(text.contains("provider=\"openai\""));
        assert!(text.contains("error_type=\"transport_error\""));
        assert!(text.contains("splitgen_requests_total"));
    }

    #[test]
    fn concurrent_increments_are_not_lost()
    {   let t = Telemetry::new().unwrap();
        std::thread::scope(|s| {
          for _ in 0..8
          {   s.spawn(|| {
                for _ in 0..1_000
                {   t.record_attempt("openai", "gpt-4", Duration::ZERO);
                }
              });
          }
        });
        assert_eq!(t.generations("openai", "gpt-4"), 8_000);
        assert_eq!(t.duration_samples("openai", "gpt-4"), 8_000);
    }
}
