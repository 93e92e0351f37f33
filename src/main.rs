use std::sync::Arc;
use log::{error, info};
use splitgen::config::Settings;
use splitgen::server::{self, AppState};
use splitgen::Telemetry;

#[tokio::main]
async fn main() -> std::io::Result<()>
{   let _ = dotenvy::dotenv();

    let settings = match Settings::from_env()
    {   Ok(settings) => settings
      , Err(e) => {
          env_logger::init();
          error!("Invalid configuration: {}", e);
          std::process::exit(1);
        }
    };

    env_logger::Builder::from_env(
      env_logger::Env::default()
        .default_filter_or(settings.log_level.as_str())
    ).init();

    let telemetry = match Telemetry::new()
    {   Ok(telemetry) => Arc::new(telemetry)
      , Err(e) => {
          error!("Failed to register metrics: {}", e);
          std::process::exit(1);
        }
    };

    let dispatcher = Arc::new(
      splitgen::build_dispatcher(&settings, telemetry.clone())
    );

    let policy = dispatcher.policy();
    info!("splitgen starting");
    info!(
      "A/B testing: {}",
      if policy.ab_testing_enabled() { "enabled" } else { "disabled" }
    );
    info!("Secondary ratio: {}", policy.secondary_ratio());
    info!(
      "Fallback to primary: {}",
      if policy.fallback_enabled() { "enabled" } else { "disabled" }
    );

    let state = AppState::new(dispatcher, telemetry);
    let result = server::run(&settings, state).await;
    info!("splitgen stopped");
    result
}
