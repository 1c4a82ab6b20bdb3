//! Wire-level tests for the upstream client against a mock server

use chrono::Utc;
use mockito::{Matcher, Server};
use serde_json::json;

use flowgate::config::TimeoutSettings;
use flowgate::domain::session::{ProcessSecret, Session};
use flowgate::upstream::{ApiKey, FlowTransport, FlowUrl, SessionContext, UpstreamClient, UpstreamError};
use flowgate::ConversationKey;

fn timeouts() -> TimeoutSettings {
    TimeoutSettings {
        connect: 5.0,
        read: 30.0,
    }
}

fn context() -> SessionContext {
    let session = Session::create(&ProcessSecret::generate(), Utc::now());
    SessionContext::new(&session, ConversationKey::Chat)
}

fn flow_url(server: &Server, path: &str) -> FlowUrl {
    FlowUrl::try_new(format!("{}{path}", server.url())).unwrap()
}

#[tokio::test]
async fn test_post_carries_body_and_session_headers() {
    let mut server = Server::new_async().await;
    let ctx = context();

    let mock = server
        .mock("POST", "/run/chat")
        .match_header("content-type", Matcher::Regex("application/json".to_string()))
        .match_header("x-session-id", ctx.session_id.to_string().as_str())
        .match_header("x-user-id", ctx.user_id.to_string().as_str())
        .match_header("x-session-token", ctx.session_token.to_string().as_str())
        .match_header("x-client-id", ctx.session_id.to_string().as_str())
        .match_header("x-conversation-id", ctx.session_id.to_string().as_str())
        .match_header("x-request-id", Matcher::Any)
        .match_header("x-timestamp", Matcher::Any)
        .match_header("x-page-context", "chat")
        .match_body(Matcher::PartialJson(json!({
            "input_value": "hello there",
            "output_type": "chat",
            "input_type": "chat",
            "session_id": ctx.session_id,
            "session_metadata": {"conversation_key": "chat"},
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({"outputs": [{"outputs": [{"messages": [{"message": "hi"}]}]}]}).to_string(),
        )
        .create_async()
        .await;

    let client = UpstreamClient::new(&timeouts(), None).unwrap();
    let envelope = client
        .call(&flow_url(&server, "/run/chat"), "hello there", &ctx)
        .await
        .unwrap();

    assert_eq!(
        envelope["outputs"][0]["outputs"][0]["messages"][0]["message"],
        "hi"
    );
    mock.assert_async().await;
}

#[tokio::test]
async fn test_api_key_sent_as_both_headers() {
    let mut server = Server::new_async().await;
    let ctx = context();

    let mock = server
        .mock("POST", "/run/chat")
        .match_header("x-api-key", "secret-key")
        .match_header("authorization", "Bearer secret-key")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"outputs": []}).to_string())
        .create_async()
        .await;

    let api_key = ApiKey::try_new("secret-key".to_string()).unwrap();
    let client = UpstreamClient::new(&timeouts(), Some(api_key)).unwrap();
    client
        .call(&flow_url(&server, "/run/chat"), "hello", &ctx)
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_redirect_triggers_single_retry_with_redirects_enabled() {
    let mut server = Server::new_async().await;
    let ctx = context();

    // The first attempt has redirects disabled and sees the 307; the retry
    // hits the same URL and follows the redirect to /final.
    let redirect = server
        .mock("POST", "/run/chat")
        .with_status(307)
        .with_header("location", &format!("{}/final", server.url()))
        .expect(2)
        .create_async()
        .await;
    let target = server
        .mock("POST", "/final")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({"outputs": [{"outputs": [{"messages": [{"message": "moved"}]}]}]}).to_string(),
        )
        .create_async()
        .await;

    let client = UpstreamClient::new(&timeouts(), None).unwrap();
    let envelope = client
        .call(&flow_url(&server, "/run/chat"), "hello", &ctx)
        .await
        .unwrap();

    assert_eq!(
        envelope["outputs"][0]["outputs"][0]["messages"][0]["message"],
        "moved"
    );
    redirect.assert_async().await;
    target.assert_async().await;
}

#[tokio::test]
async fn test_non_success_status_is_http_error() {
    let mut server = Server::new_async().await;
    let ctx = context();

    server
        .mock("POST", "/run/chat")
        .with_status(500)
        .with_body("upstream exploded")
        .create_async()
        .await;

    let client = UpstreamClient::new(&timeouts(), None).unwrap();
    let err = client
        .call(&flow_url(&server, "/run/chat"), "hello", &ctx)
        .await
        .unwrap_err();

    match &err {
        UpstreamError::Http { status, .. } => assert_eq!(*status, 500),
        other => panic!("expected http error, got {other:?}"),
    }
    assert_eq!(
        err.user_message(),
        "An error occurred. Please try again later."
    );
}

#[tokio::test]
async fn test_malformed_json_is_decode_error() {
    let mut server = Server::new_async().await;
    let ctx = context();

    server
        .mock("POST", "/run/chat")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("definitely not json {")
        .create_async()
        .await;

    let client = UpstreamClient::new(&timeouts(), None).unwrap();
    let err = client
        .call(&flow_url(&server, "/run/chat"), "hello", &ctx)
        .await
        .unwrap_err();

    assert!(matches!(err, UpstreamError::Decode { .. }));
    assert_eq!(
        err.user_message(),
        "Invalid response from server. Please try again."
    );
}

#[tokio::test]
async fn test_unreachable_endpoint_is_network_error() {
    let ctx = context();
    // Nothing listens on port 9 locally; the connection is refused
    let endpoint = FlowUrl::try_new("http://127.0.0.1:9/run/chat".to_string()).unwrap();

    let client = UpstreamClient::new(&timeouts(), None).unwrap();
    let err = client.call(&endpoint, "hello", &ctx).await.unwrap_err();

    assert!(matches!(
        err,
        UpstreamError::Network { .. } | UpstreamError::Timeout { .. }
    ));
}
