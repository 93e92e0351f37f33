//! HTTP boundary: generation, health, metrics and policy reload

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::middleware::{from_fn, Next};
use actix_web::{web, App, HttpResponse, HttpServer};
use log::{debug, error, info, warn};
use serde::Serialize;
use crate::client::Dispatcher;
use crate::config::{self, Settings};
use crate::error::ConfigError;
use crate::failover::RoutingPolicy;
use crate::migration::MigrationStage;
use crate::request::
{   ErrorResponse
  , GenerationOptions
  , GenerationRequest
  , GenerationResponse
  , ImageGenerationRequest
  , TextGenerationRequest
};
use crate::telemetry::Telemetry;

/// Env file the server and `splitgen-migrate` share by default
pub const DEFAULT_ENV_FILE: &str = ".env";

/// `endpoint` label for requests no route matched
pub const UNMATCHED_ENDPOINT: &str = "unmatched";

/// Re-reads the routing policy for `POST /admin/reload`
pub type PolicySource
  = Arc<dyn Fn() -> Result<RoutingPolicy, ConfigError> + Send + Sync>;

/// Shared handler state
#[derive(Clone)]
pub struct AppState
{   pub dispatcher: Arc<Dispatcher>
  , pub telemetry: Arc<Telemetry>
  , pub policy_source: PolicySource
}

impl AppState
{   pub fn new(
      dispatcher: Arc<Dispatcher>
    , telemetry: Arc<Telemetry>
    ) -> Self
    {   AppState
        {   dispatcher
          , telemetry
          , policy_source: env_file_source(DEFAULT_ENV_FILE)
        }
    }

    /// Reload from `env_file` instead of `.env`
    pub fn with_env_file(self, env_file: impl Into<PathBuf>) -> Self
    {   self.with_policy_source(env_file_source(env_file))
    }

    pub fn with_policy_source(mut self, source: PolicySource) -> Self
    {   self.policy_source = source;
        self
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse
{   pub status: &'static str
  , pub timestamp: f64
  , pub version: &'static str
  , pub config: HealthConfig
  , pub migration_status: MigrationStatus
}

#[derive(Debug, Serialize)]
pub struct HealthConfig
{   pub primary_provider: String
  , pub primary_model: String
  , pub secondary_provider: String
  , pub secondary_model: String
}

#[derive(Debug, Serialize)]
pub struct MigrationStatus
{   pub ab_testing_enabled: bool
  , pub secondary_ratio: f64
  , pub secondary_enabled: bool
  , pub fallback_enabled: bool
  , pub secondary_credentials_configured: bool
  , pub stage: MigrationStage
}

impl MigrationStatus
{   fn of(policy: &RoutingPolicy, credentials: bool) -> Self
    {   MigrationStatus
        {   ab_testing_enabled: policy.ab_testing_enabled()
          , secondary_ratio: policy.secondary_ratio()
          , secondary_enabled: policy.secondary_enabled()
          , fallback_enabled: policy.fallback_enabled()
          , secondary_credentials_configured: credentials
          , stage: MigrationStage::of(policy)
        }
    }
}

fn env_file_source(env_file: impl Into<PathBuf>) -> PolicySource
{   let env_file = env_file.into();
    Arc::new(move || config::policy_from_env_file(&env_file))
}

/// Count and time every request, labelled by the matched route
/// pattern so arbitrary paths cannot grow the label set
pub async fn track_requests(
  req: ServiceRequest
, next: Next<impl MessageBody>
) -> Result<ServiceResponse<impl MessageBody>, actix_web::Error>
{   let telemetry = req.app_data::<web::Data<AppState>>()
      .map(|state| state.telemetry.clone());
    let method = req.method().to_string();
    let started = Instant::now();

    let res = next.call(req).await?;

    if let Some(telemetry) = telemetry
    {   let endpoint = res.request()
          .match_pattern()
          .unwrap_or_else(|| UNMATCHED_ENDPOINT.to_string());
        telemetry.record_http(
          &method, &endpoint, res.status().as_u16(), started.elapsed()
        );
    }
    Ok(res)
}

/// Register every route; `api_version` becomes `/api/{version}`
pub fn configure(api_version: &str) -> impl FnOnce(&mut web::ServiceConfig) + '_
{   move |cfg: &mut web::ServiceConfig| {
      cfg.route("/", web::get().to(root))
        .route("/metrics", web::get().to(metrics))
        .service(
          web::scope(&format!("/api/{}", api_version))
            .route("/generate/text", web::post().to(generate_text))
            .route("/generate/image", web::post().to(generate_image))
            .route("/health", web::get().to(health))
            .route("/admin/reload", web::post().to(reload_policy))
        );
    }
}

fn bad_request(detail: impl ToString) -> HttpResponse
{   HttpResponse::BadRequest().json(ErrorResponse
    {   detail: detail.to_string()
    })
}

fn server_error(detail: impl ToString) -> HttpResponse
{   HttpResponse::InternalServerError().json(ErrorResponse
    {   detail: detail.to_string()
    })
}

fn build_request(prompt: &str, options: GenerationOptions)
  -> Result<GenerationRequest, HttpResponse>
{   GenerationRequest::new(prompt, options).map_err(bad_request)
}

async fn generate_text(
  state: web::Data<AppState>
, body: web::Json<TextGenerationRequest>
) -> HttpResponse
{   debug!("POST generate/text");
    let request = match build_request(&body.prompt, body.options())
    {   Ok(request) => request
      , Err(response) => return response
    };

    match state.dispatcher.generate_text(&request).await
    {   Ok(result) => {
          HttpResponse::Ok().json(GenerationResponse::from(result))
        }
      , Err(e) => {
          error!("Text generation failed: {}", e);
          server_error(e)
        }
    }
}

async fn generate_image(
  state: web::Data<AppState>
, body: web::Json<ImageGenerationRequest>
) -> HttpResponse
{   debug!("POST generate/image");
    let request = match build_request(&body.prompt, body.options())
    {   Ok(request) => request
      , Err(response) => return response
    };

    match state.dispatcher.generate_image(&request).await
    {   Ok(result) => {
          HttpResponse::Ok().json(GenerationResponse::from(result))
        }
      , Err(e) => {
          error!("Image generation failed: {}", e);
          server_error(e)
        }
    }
}

async fn health(state: web::Data<AppState>) -> HttpResponse
{   let dispatcher = &state.dispatcher;
    let policy = dispatcher.policy();
    let timestamp = SystemTime::now()
      .duration_since(UNIX_EPOCH)
      .map(|d| d.as_secs_f64())
      .unwrap_or_default();

    HttpResponse::Ok().json(HealthResponse
    {   status: "healthy"
      , timestamp
      , version: env!("CARGO_PKG_VERSION")
      , config: HealthConfig
        {   primary_provider: dispatcher.primary().name().to_string()
          , primary_model: dispatcher.primary().text_model().to_string()
          , secondary_provider: dispatcher.secondary().name().to_string()
          , secondary_model: dispatcher.secondary().text_model().to_string()
        }
      , migration_status: MigrationStatus::of(
          &policy
        , dispatcher.secondary().is_configured()
        )
    })
}

async fn reload_policy(state: web::Data<AppState>) -> HttpResponse
{   match (state.policy_source)()
    {   Ok(policy) => {
          state.dispatcher.reload_policy(policy);
          let policy = state.dispatcher.policy();
          HttpResponse::Ok().json(MigrationStatus::of(
            &policy
          , state.dispatcher.secondary().is_configured()
          ))
        }
      , Err(e) => {
          warn!("Policy reload rejected, keeping current policy: {}", e);
          bad_request(e)
        }
    }
}

async fn metrics(state: web::Data<AppState>) -> HttpResponse
{   HttpResponse::Ok()
      .content_type("text/plain; version=0.0.4")
      .body(state.telemetry.render())
}

async fn root(state: web::Data<AppState>) -> HttpResponse
{   HttpResponse::Ok().json(serde_json::json!({
      "message": "splitgen generation gateway",
      "status": "running",
      "migration": format!(
        "{} -> {}",
        state.dispatcher.primary().name(),
        state.dispatcher.secondary().name()
      ),
    }))
}

/// Bind and run until shutdown
pub async fn run(settings: &Settings, state: AppState) -> std::io::Result<()>
{   let api_version = settings.server.api_version.clone();
    let bind = (settings.server.host.clone(), settings.server.port);
    info!("Listening on {}:{}", bind.0, bind.1);

    HttpServer::new(move || {
      App::new()
        .app_data(web::Data::new(state.clone()))
        .wrap(from_fn(track_requests))
        .configure(configure(&api_version))
    })
    .bind(bind)?
    .run()
    .await
}
