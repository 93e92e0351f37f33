pub mod error;
pub mod config;
pub mod providers;
pub mod request;
pub mod failover;
pub mod telemetry;
pub mod client;
pub mod migration;
pub mod server;

/*

splitgen serves one "generate text/image" capability from two
interchangeable LLM providers while traffic migrates from the
incumbent (primary) to the migration target (secondary).

splitgen/
├── src/
│   ├── lib.rs          # Re-exports, wiring helpers
│   ├── error.rs        # Provider failure taxonomy, config errors
│   ├── config.rs       # Env driven settings
│   ├── request.rs      # Request/result types, HTTP bodies
│   ├── failover.rs     # Routing policy, attempt classification
│   ├── providers/      # Adapters: openai (primary), yandex (secondary)
│   ├── telemetry.rs    # Prometheus backed telemetry sink
│   ├── client.rs       # Dispatcher: routing + fallback hop
│   ├── migration.rs    # Migration stages, .env editing
│   ├── server.rs       # actix-web boundary
│   ├── main.rs         # splitgen server
│   └── bin/migration.rs  # splitgen-migrate CLI
└── tests/

*/

use std::sync::Arc;

pub use client::Dispatcher;
pub use error::{ConfigError, Error, FailureKind};
pub use failover::{Attempt, Route, RouteDecision, RoutingPolicy};
pub use providers::{GenerationProvider, OpenAiProvider, YandexGptProvider};
pub use request::
{   GeneratedContent
  , GenerationOptions
  , GenerationRequest
  , GenerationResult
  , ProviderOutput
};
pub use telemetry::{Telemetry, TelemetrySink};

/// Build the dispatcher once at startup from loaded settings
pub fn build_dispatcher(
  settings: &config::Settings
, telemetry: Arc<dyn TelemetrySink>
) -> Dispatcher
{   let primary = Arc::new(OpenAiProvider::new(settings.openai.clone()));
    let secondary = Arc::new(YandexGptProvider::new(settings.yandex.clone()));
    Dispatcher::new(primary, secondary, settings.policy.clone(), telemetry)
      .with_attempt_timeout(settings.openai.provider.timeout())
}
