//! Integration tests for ApiClient.
//!
//! Uses wiremock for HTTP mocking. Tests cover bearer auth, status mapping,
//! fixed-delay retries, timeouts and the 401 → renew → retry path.

use std::sync::Arc;
use std::time::Duration;

use famcoin_client::error::{MSG_NO_CONNECTION, MSG_TIMEOUT};
use famcoin_client::types::LoginRequest;
use famcoin_client::{
    ApiClient, ClientConfig, ClientError, CredentialStore, Credentials, MemoryCredentialStore,
    CLIENT_USER_AGENT,
};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(mock_server: &MockServer) -> ClientConfig {
    ClientConfig::default()
        .with_url(mock_server.uri())
        .with_retry_delay(Duration::from_millis(10))
}

fn client_with(
    config: ClientConfig,
    access: &str,
    refresh: &str,
) -> (ApiClient, Arc<MemoryCredentialStore>) {
    let store = Arc::new(MemoryCredentialStore::with_credentials(Credentials::new(
        access, refresh,
    )));
    let client = ApiClient::with_store(config, store.clone()).expect("failed to create client");
    (client, store)
}

fn wallet_json(balance: i64) -> serde_json::Value {
    json!({
        "id": "w-1",
        "childId": "c-1",
        "balance": balance,
        "totalEarned": balance,
        "totalSpent": 0
    })
}

#[tokio::test]
async fn test_attaches_bearer_and_user_agent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/wallet"))
        .and(query_param("childId", "c-1"))
        .and(header("authorization", "Bearer access-1"))
        .and(header("user-agent", CLIENT_USER_AGENT))
        .respond_with(ResponseTemplate::new(200).set_body_json(wallet_json(120)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (client, _) = client_with(test_config(&mock_server), "access-1", "refresh-1");
    let wallet = client.wallet(Some("c-1")).await.expect("fetch failed");

    assert_eq!(wallet.balance, 120);
}

#[tokio::test]
async fn test_login_persists_credentials_and_user() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({"email": "ana@example.com", "password": "pw"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "a-1",
            "refreshToken": "r-1",
            "user": {"id": "p-1", "name": "Ana", "role": "PARENT"}
        })))
        .mount(&mock_server)
        .await;

    let store = Arc::new(MemoryCredentialStore::new());
    let client = ApiClient::with_store(test_config(&mock_server), store.clone()).unwrap();

    client
        .login(&LoginRequest {
            email: "ana@example.com".to_string(),
            password: "pw".to_string(),
        })
        .await
        .expect("login failed");

    assert_eq!(
        store.credentials().await.unwrap(),
        Some(Credentials::new("a-1", "r-1"))
    );
    assert_eq!(store.user().await.unwrap().map(|u| u.name), Some("Ana".to_string()));
}

#[tokio::test]
async fn test_renews_on_401_and_retries_once() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/wallet"))
        .and(header("authorization", "Bearer expired"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .and(body_json(json!({"refreshToken": "refresh-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "fresh",
            "refreshToken": "refresh-2"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/wallet"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(wallet_json(40)))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (client, store) = client_with(test_config(&mock_server), "expired", "refresh-1");
    let wallet = client.wallet(None).await.expect("renewal should be transparent");

    assert_eq!(wallet.balance, 40);
    assert_eq!(
        store.credentials().await.unwrap(),
        Some(Credentials::new("fresh", "refresh-2"))
    );
}

#[tokio::test]
async fn test_concurrent_401s_share_one_renewal() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(header("authorization", "Bearer expired"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "fresh",
            "refreshToken": "refresh-2"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/notifications/unread-count"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(3)))
        .expect(2)
        .mount(&mock_server)
        .await;

    let (client, _) = client_with(test_config(&mock_server), "expired", "refresh-1");
    let (a, b) = tokio::join!(client.unread_count(), client.unread_count());

    assert_eq!(a.unwrap(), 3);
    assert_eq!(b.unwrap(), 3);
}

#[tokio::test]
async fn test_failed_renewal_clears_credentials_and_returns_renewal_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/wallet"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"message": "Refresh token expired"})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let (client, store) = client_with(test_config(&mock_server), "expired", "refresh-1");
    let err = client.wallet(None).await.unwrap_err();

    assert_eq!(
        err,
        ClientError::Unauthorized {
            message: "Refresh token expired".to_string()
        }
    );
    assert!(store.credentials().await.unwrap().is_none());
    assert!(!client.session().is_authenticated().await.unwrap());
}

#[tokio::test]
async fn test_missing_refresh_credential_returns_original_401() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/wallet"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"message": "Token expired"})))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let (client, store) = client_with(test_config(&mock_server), "expired", "");
    let err = client.wallet(None).await.unwrap_err();

    assert_eq!(
        err,
        ClientError::Unauthorized {
            message: "Token expired".to_string()
        }
    );
    assert!(err.is_auth_failure());
    assert!(store.credentials().await.unwrap().is_none());
}

#[tokio::test]
async fn test_read_retries_transient_failures() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/notifications"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/notifications"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (client, _) = client_with(test_config(&mock_server), "a", "r");
    let notifications = client.notifications().await.expect("third attempt succeeds");

    assert!(notifications.is_empty());
}

#[tokio::test]
async fn test_write_retries_at_most_once() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/tasks/a-1/approve"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&mock_server)
        .await;

    let (client, _) = client_with(test_config(&mock_server), "a", "r");
    let err = client.approve_task("a-1").await.unwrap_err();

    assert_eq!(
        err,
        ClientError::Api {
            status: 500,
            message: None
        }
    );
}

#[tokio::test]
async fn test_client_error_is_not_retried_and_message_is_verbatim() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/tasks/a-1/reject"))
        .and(body_json(json!({"rejectionReason": "bed not made"})))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"message": "Task is not completed"})),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let (client, _) = client_with(test_config(&mock_server), "a", "r");
    let err = client.reject_task("a-1", "bed not made").await.unwrap_err();

    assert_eq!(err.user_message(), "Task is not completed");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_timeout_maps_to_fixed_message() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/users/children"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&mock_server)
        .await;

    let config = test_config(&mock_server)
        .with_timeout(Duration::from_millis(50))
        .with_retries(0, 0);
    let (client, _) = client_with(config, "a", "r");
    let err = client.list_children().await.unwrap_err();

    assert_eq!(err, ClientError::Timeout);
    assert_eq!(err.user_message(), MSG_TIMEOUT);
}

#[tokio::test]
async fn test_stalled_body_maps_to_timeout() {
    // headers arrive at once, the body never completes
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = [0_u8; 4096];
        let _ = socket.read(&mut buf).await;
        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 64\r\n\r\n[",
            )
            .await
            .unwrap();
        socket.flush().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let config = ClientConfig::default()
        .with_url(format!("http://{addr}"))
        .with_timeout(Duration::from_millis(200))
        .with_retries(0, 0);
    let (client, _) = client_with(config, "a", "r");
    let err = client.notifications().await.unwrap_err();

    assert_eq!(err, ClientError::Timeout);
    assert_eq!(err.user_message(), MSG_TIMEOUT);
    server.abort();
}

#[tokio::test]
async fn test_unreachable_server_maps_to_no_connection() {
    let config = ClientConfig::default()
        .with_url("http://127.0.0.1:1")
        .with_retries(0, 0);
    let (client, _) = client_with(config, "a", "r");
    let err = client.notifications().await.unwrap_err();

    assert!(matches!(err, ClientError::Network { .. }), "got {err:?}");
    assert_eq!(err.user_message(), MSG_NO_CONNECTION);
}

#[tokio::test]
async fn test_undecodable_body_is_invalid_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/gamification"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&mock_server)
        .await;

    let (client, _) = client_with(test_config(&mock_server), "a", "r");
    let err = client.gamification(None).await.unwrap_err();

    assert!(matches!(err, ClientError::InvalidResponse { .. }));
}
