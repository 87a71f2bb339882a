//! Integration tests for backend selection and the initialize flow.

mod common;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{
    device_path, standard_client, subscription, vendor_client, vendor_permission, FakePushManager,
    FakeRuntime, FakeVendor, AUTH_A, DOMAIN,
};
use pushbridge::backend::BackendKind;
use pushbridge::client::InitState;
use pushbridge::platform::PermissionState;
use pushbridge::{AuthTokenStore, InitOutcome, PushClient, PushError, ReportOutcome, SegmentSet};

/// Server key "BAECAw" decodes to these bytes.
const SERVER_KEY: [u8; 4] = [4, 1, 2, 3];

async fn mount_server_key(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/webpush/key"))
        .respond_with(ResponseTemplate::new(200).set_body_string("BAECAw\n"))
        .mount(server)
        .await;
}

async fn mount_mint_never(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(device_path(&AUTH_A, "authentication-tokens")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id_token": "tok" })))
        .expect(0)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_standard_grant_activates_without_minting() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let manager = FakePushManager::new(PermissionState::Granted, subscription(&AUTH_A));
    let client = standard_client(&server, &dir, &manager);

    mount_server_key(&server).await;
    mount_mint_never(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/devices/webpush"))
        .and(body_json(json!({
            "endpoint": "https://push.example.com/send/abc",
            "p256dh": "BAoUHg==",
            "auth": "AQIDBAUG",
            "domain": DOMAIN
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(client.backend_kind(), Some(BackendKind::Standard));
    assert_eq!(client.initialize().await.unwrap(), InitOutcome::Granted);
    assert_eq!(client.state(), InitState::Done(InitOutcome::Granted));
    assert_eq!(
        manager.subscribed_with.lock().unwrap().as_deref(),
        Some(&SERVER_KEY[..])
    );
    assert_eq!(
        *manager.registered_workers.lock().unwrap(),
        vec!["rf-serviceworker.js".to_string()]
    );
    assert_eq!(client.tokens().get_cached_token().await.unwrap(), None);
}

#[tokio::test]
async fn test_prefetch_mints_after_activation() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let manager = FakePushManager::new(PermissionState::Granted, subscription(&AUTH_A));
    let runtime = FakeRuntime {
        manager: Some(manager),
        vendor: None,
    };
    let config = pushbridge::Config {
        prefetch_token: true,
        ..common::config(&server, &dir)
    };
    let client = PushClient::with_token_store(config, &runtime, AuthTokenStore::memory()).unwrap();

    mount_server_key(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/devices/webpush"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(device_path(&AUTH_A, "authentication-tokens")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id_token": "early" })))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(client.initialize().await.unwrap(), InitOutcome::Granted);
    assert_eq!(client.tokens().get_cached_token().await.unwrap().as_deref(), Some("early"));
}

#[tokio::test]
async fn test_activation_rejected_is_reported_and_mints_nothing() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let manager = FakePushManager::new(PermissionState::Granted, subscription(&AUTH_A));
    let client = standard_client(&server, &dir, &manager);

    mount_server_key(&server).await;
    mount_mint_never(&server).await;
    Mock::given(method("POST"))
        .and(path("/v1/devices/webpush"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({ "code": 2, "message": "bad key" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(client.initialize().await.unwrap(), InitOutcome::ActivationFailed);
    assert_eq!(client.tokens().get_cached_token().await.unwrap(), None);
}

#[tokio::test]
async fn test_standard_denied_stops_before_subscribing() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let manager = FakePushManager::new(PermissionState::Denied, subscription(&AUTH_A));
    let client = standard_client(&server, &dir, &manager);

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    assert_eq!(client.initialize().await.unwrap(), InitOutcome::Denied);
    assert!(manager.subscribed_with.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_standard_dismissed_prompt() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let manager = FakePushManager::new(PermissionState::Undetermined, subscription(&AUTH_A));
    let client = standard_client(&server, &dir, &manager);

    assert_eq!(client.initialize().await.unwrap(), InitOutcome::Dismissed);
}

#[tokio::test]
async fn test_bad_server_key_is_an_error() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let manager = FakePushManager::new(PermissionState::Granted, subscription(&AUTH_A));
    let client = standard_client(&server, &dir, &manager);

    Mock::given(method("GET"))
        .and(path("/v1/webpush/key"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client.initialize().await.unwrap_err();
    assert!(matches!(err, PushError::BackendRejected { status: 503, .. }));
    assert_eq!(client.state(), InitState::Failed);
}

#[tokio::test]
async fn test_vendor_prompts_once_then_resolves_device_id() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let vendor = FakeVendor::new(
        vendor_permission(PermissionState::Undetermined, None),
        vendor_permission(PermissionState::Granted, Some("APNSTOKEN")),
    );
    let client = vendor_client(&server, &dir, &vendor);

    Mock::given(method("GET"))
        .and(path("/v1/safari/devices/APNSTOKEN/deviceID/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "device_id": "dev-9" })))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(client.backend_kind(), Some(BackendKind::Vendor));
    assert_eq!(client.initialize().await.unwrap(), InitOutcome::Granted);
    assert_eq!(vendor.prompt_count(), 1);
}

#[tokio::test]
async fn test_vendor_already_granted_skips_prompt() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let granted = vendor_permission(PermissionState::Granted, Some("TOK"));
    let vendor = FakeVendor::new(granted.clone(), granted);
    let client = vendor_client(&server, &dir, &vendor);

    Mock::given(method("GET"))
        .and(path("/v1/safari/devices/TOK/deviceID/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "device_id": 12345 })))
        .mount(&server)
        .await;

    assert_eq!(client.initialize().await.unwrap(), InitOutcome::Granted);
    assert_eq!(vendor.prompt_count(), 0);
}

#[tokio::test]
async fn test_vendor_missing_device_id_fails_activation() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let granted = vendor_permission(PermissionState::Granted, Some("TOK"));
    let vendor = FakeVendor::new(granted.clone(), granted);
    let client = vendor_client(&server, &dir, &vendor);

    Mock::given(method("GET"))
        .and(path("/v1/safari/devices/TOK/deviceID/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "device_id": null })))
        .mount(&server)
        .await;

    assert_eq!(client.initialize().await.unwrap(), InitOutcome::ActivationFailed);
}

#[tokio::test]
async fn test_vendor_denied() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let vendor = FakeVendor::new(
        vendor_permission(PermissionState::Undetermined, None),
        vendor_permission(PermissionState::Denied, None),
    );
    let client = vendor_client(&server, &dir, &vendor);

    assert_eq!(client.initialize().await.unwrap(), InitOutcome::Denied);
    assert_eq!(vendor.prompt_count(), 1);
}

#[tokio::test]
async fn test_vendor_segments_use_device_id_identity() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let granted = vendor_permission(PermissionState::Granted, Some("TOK"));
    let vendor = FakeVendor::new(granted.clone(), granted);
    let client = vendor_client(&server, &dir, &vendor);

    Mock::given(method("GET"))
        .and(path("/v1/safari/devices/TOK/deviceID/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "device_id": "dev-9" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/devices/dev-9/authentication-tokens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id_token": "vtok" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/devices/dev-9/segments"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let segments: SegmentSet = [("plan", "pro")].into_iter().collect();
    assert!(client.update_segments(&segments).await.unwrap());
}

#[tokio::test]
async fn test_no_push_mechanism_is_unsupported() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let client = PushClient::with_token_store(
        common::config(&server, &dir),
        &FakeRuntime::default(),
        AuthTokenStore::memory(),
    )
    .unwrap();

    assert_eq!(client.backend_kind(), None);
    assert_eq!(client.initialize().await.unwrap(), InitOutcome::Unsupported);
    assert_eq!(
        client.report_pending_event().await.unwrap(),
        ReportOutcome::NothingPending
    );
    let segments: SegmentSet = [("plan", "pro")].into_iter().collect();
    assert!(matches!(
        client.update_segments(&segments).await.unwrap_err(),
        PushError::SegmentUpdateFailed
    ));
    assert!(!client.unsubscribe().await.unwrap());
}

#[tokio::test]
async fn test_standard_preferred_when_both_available() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let granted = vendor_permission(PermissionState::Granted, Some("TOK"));
    let runtime = FakeRuntime {
        manager: Some(FakePushManager::subscribed(subscription(&AUTH_A))),
        vendor: Some(FakeVendor::new(granted.clone(), granted)),
    };
    let client = PushClient::with_token_store(
        common::config(&server, &dir),
        &runtime,
        AuthTokenStore::memory(),
    )
    .unwrap();

    assert_eq!(client.backend_kind(), Some(BackendKind::Standard));
}

#[tokio::test]
async fn test_unsubscribe_drops_subscription_and_token() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let manager = FakePushManager::subscribed(subscription(&AUTH_A));
    let client = standard_client(&server, &dir, &manager);
    client.tokens().set_token("tok").await.unwrap();

    assert!(client.unsubscribe().await.unwrap());
    assert_eq!(client.tokens().get_cached_token().await.unwrap(), None);
    assert!(!client.unsubscribe().await.unwrap());
}
