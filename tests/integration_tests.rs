mod common;

use std::path::PathBuf;
use std::sync::Arc;
use actix_web::middleware::from_fn;
use actix_web::{test, web, App};
use serde_json::{json, Value};
use common::*;
use splitgen::config::Settings;
use splitgen::migration::{MigrationController, MigrationStage};
use splitgen::server::{configure, track_requests, AppState};
use splitgen::{ConfigError, Error, RoutingPolicy, Telemetry};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn state(h: &Harness) -> AppState
{   AppState::new(h.dispatcher.clone(), h.telemetry.clone())
}

fn temp_env_file(name: &str, content: &str) -> PathBuf
{   let path = std::env::temp_dir().join(format!(
      "splitgen-{}-{}.env", name, std::process::id()
    ));
    std::fs::write(&path, content).unwrap();
    path
}

macro_rules! app
{   ($state:expr) => {
      test::init_service(
        App::new()
          .app_data(web::Data::new($state))
          .wrap(from_fn(track_requests))
          .configure(configure("v1"))
      ).await
    };
}

#[actix_web::test]
async fn text_endpoint_reports_fallback()
{   let h = Harness::new(
      ScriptedProvider::ok(PRIMARY, PRIMARY_MODEL)
    , ScriptedProvider::failing(
        SECONDARY, SECONDARY_MODEL, Error::transport(SECONDARY, "reset")
      )
    , policy(false, 0.0, true, true)
    );
    let app = app!(state(&h));

    let req = test::TestRequest::post()
      .uri("/api/v1/generate/text")
      .set_json(json!({ "prompt": "hello", "max_tokens": 100, "temperature": 0.5 }))
      .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["result"], "primary says: hello");
    assert_eq!(body["provider"], PRIMARY);
    assert_eq!(body["model"], PRIMARY_MODEL);
    assert_eq!(body["fallback_used"], true);
    assert_eq!(body["original_provider"], SECONDARY);
    assert_eq!(body["tokens_used"], 7);
    assert!(body["generation_time"].is_number());
}

#[actix_web::test]
async fn provider_failure_is_a_server_error_with_cause()
{   let h = Harness::new(
      ScriptedProvider::failing(
        PRIMARY, PRIMARY_MODEL, Error::configuration(PRIMARY, "OPENAI_API_KEY is not set")
      )
    , ScriptedProvider::ok(SECONDARY, SECONDARY_MODEL)
    , policy(false, 0.0, false, true)
    );
    let app = app!(state(&h));

    let req = test::TestRequest::post()
      .uri("/api/v1/generate/text")
      .set_json(json!({ "prompt": "hello" }))
      .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 500);

    let body: Value = test::read_body_json(resp).await;
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.contains("OPENAI_API_KEY is not set"), "{}", detail);
}

#[actix_web::test]
async fn empty_prompt_is_rejected()
{   let h = Harness::new(
      ScriptedProvider::ok(PRIMARY, PRIMARY_MODEL)
    , ScriptedProvider::ok(SECONDARY, SECONDARY_MODEL)
    , policy(false, 0.0, false, true)
    );
    let app = app!(state(&h));

    let req = test::TestRequest::post()
      .uri("/api/v1/generate/text")
      .set_json(json!({ "prompt": "   " }))
      .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);
    assert_eq!(h.primary.calls(), 0);
}

#[actix_web::test]
async fn image_endpoint_uses_the_image_provider()
{   let h = Harness::new(
      ScriptedProvider::ok(PRIMARY, PRIMARY_MODEL).with_images()
    , ScriptedProvider::ok(SECONDARY, SECONDARY_MODEL)
    , policy(true, 1.0, true, true)
    );
    let app = app!(state(&h));

    let req = test::TestRequest::post()
      .uri("/api/v1/generate/image")
      .set_json(json!({ "prompt": "a lighthouse" }))
      .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["provider"], PRIMARY);
    assert_eq!(body["fallback_used"], false);
    assert!(body["result"].as_str().unwrap().starts_with("https://"));
}

#[actix_web::test]
async fn health_reports_migration_status()
{   let h = Harness::new(
      ScriptedProvider::ok(PRIMARY, PRIMARY_MODEL)
    , ScriptedProvider::ok(SECONDARY, SECONDARY_MODEL)
    , policy(true, 0.5, true, true)
    );
    let app = app!(state(&h));

    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].is_number());
    assert!(body["version"].is_string());
    assert_eq!(body["config"]["secondary_model"], SECONDARY_MODEL);
    let status = &body["migration_status"];
    assert_eq!(status["ab_testing_enabled"], true);
    assert_eq!(status["secondary_ratio"], 0.5);
    assert_eq!(status["secondary_enabled"], true);
    assert_eq!(status["fallback_enabled"], true);
    assert_eq!(status["secondary_credentials_configured"], true);
    assert_eq!(status["stage"], "ab_split50");
    assert_eq!(h.primary.calls() + h.secondary.calls(), 0);
}

#[actix_web::test]
async fn metrics_endpoint_exposes_generation_counters()
{   let h = Harness::new(
      ScriptedProvider::ok(PRIMARY, PRIMARY_MODEL)
    , ScriptedProvider::ok(SECONDARY, SECONDARY_MODEL)
    , policy(true, 1.0, true, true)
    );
    let app = app!(state(&h));

    let req = test::TestRequest::post()
      .uri("/api/v1/generate/text")
      .set_json(json!({ "prompt": "hello" }))
      .to_request();
    assert!(test::call_service(&app, req).await.status().is_success());

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let body = test::call_and_read_body(&app, req).await;
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("splitgen_ai_generations_total"));
    assert!(text.contains("splitgen_ab_test_requests_total{provider=\"secondary\"} 1"));
}

#[actix_web::test]
async fn reload_swaps_policy_and_rejects_bad_ratio()
{   let h = Harness::new(
      ScriptedProvider::ok(PRIMARY, PRIMARY_MODEL)
    , ScriptedProvider::ok(SECONDARY, SECONDARY_MODEL)
    , policy(false, 0.0, false, true)
    );
    let good = state(&h).with_policy_source(Arc::new(|| {
      Ok::<_, ConfigError>(policy(true, 0.75, true, true))
    }));
    let app = app!(good);

    let req = test::TestRequest::post().uri("/api/v1/admin/reload").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["stage"], "ab_split75");
    assert_eq!(h.dispatcher.policy().secondary_ratio(), 0.75);

    let bad = state(&h).with_policy_source(Arc::new(|| {
      Err::<RoutingPolicy, _>(ConfigError::InvalidRatio(2.0))
    }));
    let app = app!(bad);
    let req = test::TestRequest::post().uri("/api/v1/admin/reload").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 400);
    assert_eq!(h.dispatcher.policy().secondary_ratio(), 0.75);
}

#[actix_web::test]
async fn reload_reads_the_env_file_as_edited_after_startup()
{   let env_file = temp_env_file(
      "reload"
    , "ENABLE_AB_TESTING=false\nYANDEX_GPT_RATIO=0.0\nENABLE_YANDEX_GPT=false\nFALLBACK_TO_OPENAI=true\n"
    );
    // startup puts the file into the process environment
    dotenvy::from_path_override(&env_file).unwrap();

    let controller = MigrationController::new(env_file.clone());
    controller.apply(MigrationStage::AbSplit50).unwrap();

    let h = Harness::new(
      ScriptedProvider::ok(PRIMARY, PRIMARY_MODEL)
    , ScriptedProvider::ok(SECONDARY, SECONDARY_MODEL)
    , policy(false, 0.0, false, true)
    );
    let app = app!(state(&h).with_env_file(env_file.clone()));

    let req = test::TestRequest::post().uri("/api/v1/admin/reload").to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    let _ = std::fs::remove_file(controller.backup_file());
    let _ = std::fs::remove_file(&env_file);

    assert_eq!(body["stage"], "ab_split50");
    let current = h.dispatcher.policy();
    assert!(current.ab_testing_enabled());
    assert!(current.secondary_enabled());
    assert_eq!(current.secondary_ratio(), 0.5);
}

#[actix_web::test]
async fn unknown_paths_share_one_request_series()
{   let h = Harness::new(
      ScriptedProvider::ok(PRIMARY, PRIMARY_MODEL)
    , ScriptedProvider::ok(SECONDARY, SECONDARY_MODEL)
    , policy(false, 0.0, false, true)
    );
    let app = app!(state(&h));

    for uri in ["/a1", "/a2"]
    {   let req = test::TestRequest::get().uri(uri).to_request();
        assert_eq!(test::call_service(&app, req).await.status().as_u16(), 404);
    }
    let req = test::TestRequest::get().uri("/api/v1/health").to_request();
    assert!(test::call_service(&app, req).await.status().is_success());

    let text = h.telemetry.render();
    assert!(!text.contains("endpoint=\"/a1\""));
    assert!(!text.contains("endpoint=\"/a2\""));
    let unmatched = text
      .lines()
      .filter(|l| l.starts_with("splitgen_requests_total{"))
      .filter(|l| l.contains("endpoint=\"unmatched\""))
      .count();
    assert_eq!(unmatched, 1);
    assert_eq!(h.telemetry.http_requests("GET", "unmatched", 404), 2);
    assert_eq!(h.telemetry.http_requests("GET", "/api/v1/health", 200), 1);
}

#[actix_web::test]
async fn real_adapters_fall_back_end_to_end()
{   let openai = MockServer::start().await;
    let yandex = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path("/completion"))
      .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
      .expect(1)
      .mount(&yandex)
      .await;
    Mock::given(method("POST"))
      .and(path("/chat/completions"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{ "message": { "role": "assistant", "content": "from openai" } }],
        "usage": { "total_tokens": 9 }
      })))
      .expect(1)
      .mount(&openai)
      .await;

    let openai_uri = openai.uri();
    let yandex_uri = yandex.uri();
    let settings = Settings::from_lookup(|key| match key
    {   "OPENAI_API_KEY" => Some("sk".to_string())
      , "OPENAI_BASE_URL" => Some(openai_uri.clone())
      , "YANDEX_GPT_API_KEY" => Some("yk".to_string())
      , "YANDEX_GPT_FOLDER_ID" => Some("folder".to_string())
      , "YANDEX_GPT_BASE_URL" => Some(yandex_uri.clone())
      , "ENABLE_YANDEX_GPT" => Some("true".to_string())
      , "PROVIDER_TIMEOUT_SECS" => Some("5".to_string())
      , _ => None
    }).unwrap();

    let telemetry = Arc::new(Telemetry::new().unwrap());
    let dispatcher = Arc::new(
      splitgen::build_dispatcher(&settings, telemetry.clone())
    );
    let app = app!(AppState::new(dispatcher, telemetry.clone()));

    let req = test::TestRequest::post()
      .uri("/api/v1/generate/text")
      .set_json(json!({ "prompt": "hello" }))
      .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["result"], "from openai");
    assert_eq!(body["provider"], "openai");
    assert_eq!(body["model"], "gpt-4");
    assert_eq!(body["fallback_used"], true);
    assert_eq!(body["original_provider"], "yandex");
    assert_eq!(telemetry.generations("openai", "gpt-4"), 1);
    assert_eq!(
      telemetry.errors("yandex", splitgen::FailureKind::NonSuccessStatus)
    , 1
    );
}
