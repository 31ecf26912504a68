//! The HTTP conduit against a mock review server.

use std::error::Error as _;
use std::time::Duration;

use arcland::review::{Conduit, ConduitError, HttpConduit};
use serde_json::{Value, json};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn call(server: &MockServer, token: Option<&str>) -> Result<Value, ConduitError> {
    let uri = server.uri();
    let token = token.map(str::to_owned);
    tokio::task::spawn_blocking(move || {
        HttpConduit::new(&uri, token, Duration::from_secs(5))
            .unwrap()
            .call("user.whoami", json!({}))
    })
    .await
    .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn result_member_is_returned() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/user.whoami"))
        .and(body_string_contains("output=json"))
        .and(body_string_contains("api-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": { "phid": "PHID-USER-me", "userName": "me" },
            "error_code": null,
            "error_info": null,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = call(&server, Some("api-secret")).await.unwrap();
    assert_eq!(result["userName"], "me");
}

#[tokio::test(flavor = "multi_thread")]
async fn non_json_body_keeps_decoder_cause() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/user.whoami"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = call(&server, None).await.unwrap_err();
    assert!(matches!(err, ConduitError::InvalidBody { .. }), "{err:?}");
    assert_eq!(err.method(), "user.whoami");
    assert!(err.source().is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn error_status_is_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/user.whoami"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = call(&server, None).await.unwrap_err();
    assert!(matches!(err, ConduitError::Transport { .. }), "{err:?}");
}
