// Integration tests for the demo HTTP endpoints
// Drives the actix app in-process over the memory store

use std::sync::Arc;
use std::time::Duration;

use actix_web::{App, http::StatusCode, test, web};
use keylock_core::{CallerContext, KeyPolicy, LockConfig, LockCoordinator, LockRequest, MemoryLockStore};
use keylock_server::api;
use keylock_server::model::{AppState, Configuration, DemoConfig};

fn app_state() -> Arc<AppState> {
    let lock_config = LockConfig {
        namespace: "demo".to_string(),
        retry_interval_ms: 2,
        memory_sweep_interval_ms: 0,
        ..Default::default()
    };
    let coordinator =
        LockCoordinator::new(Arc::new(MemoryLockStore::new()), &lock_config).unwrap();
    let demo = DemoConfig {
        workers: 3,
        hold: Duration::from_millis(2),
        lock_ttl: Duration::from_secs(10),
        max_retries: 1000,
    };
    Arc::new(AppState::new(
        Configuration::default(),
        Arc::new(coordinator),
        demo,
    ))
}

#[actix_web::test]
async fn test_get_lock_reports_no_overlap() {
    let state = app_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(state.clone()))
            .service(api::distribute_lock_routes()),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/distributelock/getlock?workers=5")
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["workers"], 5);
    assert_eq!(body["data"]["acquired"], 5);
    assert_eq!(body["data"]["reacquired"], 5);
    assert_eq!(body["data"]["overlaps"], 0);
    assert_eq!(state.coordinator.held_entries(), 0);
}

#[actix_web::test]
async fn test_get_lock_uses_configured_workers() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(app_state()))
            .service(api::distribute_lock_routes()),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/distributelock/getlock")
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["data"]["workers"], 3);
}

#[actix_web::test]
async fn test_guarded_endpoint_reenters() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(app_state()))
            .service(api::test_routes()),
    )
    .await;

    let req = test::TestRequest::get().uri("/test/sku-42/bcd").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(body["code"], 0);
    assert_eq!(body["data"]["key"], "demo:lockKey:sku-42");
    assert_eq!(body["data"]["innerDepth"], 2);
}

#[actix_web::test]
async fn test_guarded_endpoint_conflict_when_held() {
    let state = app_state();
    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(state.clone()))
            .service(api::test_routes()),
    )
    .await;

    let request = LockRequest::new("lockKey")
        .with_policy(KeyPolicy::All)
        .with_arg("num", "sku-42");
    let handle = state
        .coordinator
        .acquire(&CallerContext::new(), &request)
        .await
        .unwrap();

    let req = test::TestRequest::get().uri("/test/sku-42/bcd").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    state.coordinator.release(handle).await.unwrap();
    let req = test::TestRequest::get().uri("/test/sku-42/bcd").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

#[actix_web::test]
async fn test_echo_endpoints() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(app_state()))
            .service(api::test_routes()),
    )
    .await;

    let req = test::TestRequest::get().uri("/test/hello/efg").to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(body, "ok");

    let req = test::TestRequest::get().uri("/test/efg?abc=hello").to_request();
    let body = test::call_and_read_body(&app, req).await;
    assert_eq!(body, "ok");

    let req = test::TestRequest::get().uri("/test/efg").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn test_guarded_endpoint_rejects_separator_in_path() {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::from(app_state()))
            .service(api::test_routes()),
    )
    .await;

    let req = test::TestRequest::get().uri("/test/sku:42/bcd").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
