//! Submit-queue client and queue-routed lands against a mock queue server.
//!
//! The blocking client runs on `spawn_blocking` threads while the mock
//! server is served by the multi-threaded runtime.

mod common;

use std::time::Duration;

use arcland::config::ArcConfig;
use arcland::prompt::Decision;
use arcland::strategy::StrategyFlags;
use arcland::submit_queue::{SubmitQueueClient, SubmitQueueError, SubmitRequest};
use arcland::testing::{RecordingEvents, RecordingReporter, ScriptedPrompter};
use arcland::{LandError, LandOptions, LandOutcome, LandWorkflow};
use common::{Fixture, REVISION, review_server};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request() -> SubmitRequest {
    SubmitRequest {
        revision_id: 12,
        diff_id: 120,
        remote: "origin".to_owned(),
        source_ref: "feature".to_owned(),
        target_ref: "master".to_owned(),
        diff_ref: "refs/tags/sq-land/diff/120".to_owned(),
        base_ref: "refs/tags/sq-land/base/120".to_owned(),
        shadow: false,
    }
}

async fn submit(server: &MockServer, token: Option<&str>) -> Result<String, SubmitQueueError> {
    let uri = server.uri();
    let token = token.map(str::to_owned);
    tokio::task::spawn_blocking(move || {
        SubmitQueueClient::new(&uri, token, Duration::from_secs(5))
            .unwrap()
            .submit(&request())
    })
    .await
    .unwrap()
}

async fn respond(server: &MockServer, status: u16, body: &str) {
    Mock::given(method("POST"))
        .and(path("/merge_requests"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

// ===========================================================================
// Client
// ===========================================================================

#[tokio::test(flavor = "multi_thread")]
async fn accepted_request_returns_tracking_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/merge_requests"))
        .and(body_partial_json(json!({
            "revision_id": 12,
            "diff_id": 120,
            "target_ref": "master",
            "base_ref": "refs/tags/sq-land/base/120",
            "shadow": false,
        })))
        .respond_with(
            ResponseTemplate::new(202).set_body_json(json!({ "url": "https://sq/requests/1" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let url = submit(&server, None).await.unwrap();
    assert_eq!(url, "https://sq/requests/1");
}

#[tokio::test(flavor = "multi_thread")]
async fn resubmitting_returns_the_same_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/merge_requests"))
        .respond_with(
            ResponseTemplate::new(202).set_body_json(json!({ "url": "https://sq/requests/7" })),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/merge_requests"))
        .respond_with(ResponseTemplate::new(409).set_body_string(
            r#"{"id":7,"url":"https://sq/requests/7"}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    let first = submit(&server, None).await.unwrap();
    let second = submit(&server, None).await.unwrap();
    assert_eq!(first, "https://sq/requests/7");
    assert_eq!(second, first);
}

#[tokio::test(flavor = "multi_thread")]
async fn server_error_is_reported_with_body() {
    let server = MockServer::start().await;
    respond(&server, 500, "queue is down").await;

    let err = submit(&server, None).await.unwrap_err();
    assert!(
        matches!(&err, SubmitQueueError::Status { status: 500, body } if body == "queue is down"),
        "{err:?}"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn shield_prefix_is_stripped() {
    let server = MockServer::start().await;
    respond(&server, 200, r#"for(;;);{"url":"https://sq/requests/3"}"#).await;

    assert_eq!(submit(&server, None).await.unwrap(), "https://sq/requests/3");
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_body_is_invalid_json() {
    let server = MockServer::start().await;
    respond(&server, 200, "for(;;);<html>").await;

    let err = submit(&server, None).await.unwrap_err();
    assert!(matches!(err, SubmitQueueError::InvalidJson { .. }), "{err:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn review_token_is_sent_as_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/merge_requests"))
        .and(header("authorization", "Bearer api-secret"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "url": "u" })))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(submit(&server, Some("api-secret")).await.unwrap(), "u");
}

// ===========================================================================
// Routed lands
// ===========================================================================

fn queue_config(uri: String, shadow: bool) -> ArcConfig {
    let mut config = ArcConfig::default();
    config.submit_queue.enable = true;
    config.submit_queue.uri = Some(uri);
    config.submit_queue.shadow = shadow;
    config
}

struct RoutedLand {
    result: Result<LandOutcome, LandError>,
    methods: Vec<String>,
    on_branch: String,
    remote_moved: bool,
    feature_kept: bool,
}

async fn routed_land(
    config: ArcConfig,
    options: LandOptions,
    answers: Vec<Decision>,
    conduit_setup: fn(&arcland::testing::FakeConduit),
) -> RoutedLand {
    tokio::task::spawn_blocking(move || {
        let fx = Fixture::new();
        fx.feature("feature");
        let before = fx.remote_rev("master");
        let conduit = review_server();
        conduit_setup(&conduit);

        let repo = fx.repo();
        let reporter = RecordingReporter::default();
        let result = LandWorkflow::new(repo.as_ref(), &conduit, &config, &reporter).run(
            &options,
            &mut ScriptedPrompter::new(answers),
            &mut RecordingEvents::default(),
        );
        RoutedLand {
            result,
            methods: conduit.methods(),
            on_branch: fx.current_branch(),
            remote_moved: fx.remote_rev("master") != before,
            feature_kept: fx.has_branch("feature"),
        }
    })
    .await
    .unwrap()
}

fn no_setup(_: &arcland::testing::FakeConduit) {}

#[tokio::test(flavor = "multi_thread")]
async fn queue_land_hands_off_without_pushing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/merge_requests"))
        .and(body_partial_json(json!({
            "revision_id": REVISION,
            "source_ref": "feature",
            "target_ref": "master",
            "shadow": false,
        })))
        .respond_with(
            ResponseTemplate::new(202).set_body_json(json!({ "url": "https://sq/requests/12" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let land = routed_land(
        queue_config(server.uri(), false),
        LandOptions::default(),
        vec![],
        no_setup,
    )
    .await;

    assert_eq!(
        land.result.unwrap(),
        LandOutcome::Queued {
            url: "https://sq/requests/12".to_owned()
        }
    );
    assert!(!land.remote_moved);
    assert!(land.feature_kept);
    assert_eq!(land.on_branch, "feature");
    assert!(!land.methods.contains(&"differential.close".to_owned()));
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_queue_request_returns_to_source() {
    let server = MockServer::start().await;
    respond(&server, 500, "queue is down").await;

    let land = routed_land(
        queue_config(server.uri(), false),
        LandOptions::default(),
        vec![],
        no_setup,
    )
    .await;

    let err = land.result.unwrap_err();
    assert!(err.to_string().contains("HTTP 500"), "{err}");
    assert_eq!(land.on_branch, "feature");
    assert!(!land.remote_moved);
    assert!(land.feature_kept);
}

#[tokio::test(flavor = "multi_thread")]
async fn queue_rejects_delete_remote() {
    let server = MockServer::start().await;
    respond(&server, 202, r#"{"url":"u"}"#).await;

    let options = LandOptions {
        strategy: StrategyFlags {
            delete_remote: true,
            ..StrategyFlags::default()
        },
        ..LandOptions::default()
    };
    let land = routed_land(queue_config(server.uri(), false), options, vec![], no_setup).await;

    let err = land.result.unwrap_err();
    assert!(err.is_usage());
    assert_eq!(
        err.to_string(),
        "Flag --delete-remote is not supported when landing through the submit queue."
    );
    assert!(!land.remote_moved);
    assert_eq!(land.on_branch, "feature");
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn shadow_request_accompanies_local_land() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/merge_requests"))
        .and(body_partial_json(json!({ "shadow": true })))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "url": "u" })))
        .expect(1)
        .mount(&server)
        .await;

    let land = routed_land(
        queue_config(server.uri(), true),
        LandOptions::default(),
        vec![],
        no_setup,
    )
    .await;

    assert!(land.result.unwrap().was_pushed());
    assert!(land.remote_moved);
    assert!(!land.feature_kept);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_shadow_request_does_not_block_land() {
    let server = MockServer::start().await;
    respond(&server, 500, "shadow down").await;

    let land = routed_land(
        queue_config(server.uri(), true),
        LandOptions::default(),
        vec![],
        no_setup,
    )
    .await;

    assert!(land.result.unwrap().was_pushed());
    assert!(land.remote_moved);
}

#[tokio::test(flavor = "multi_thread")]
async fn tbr_files_task_and_lands_locally() {
    let server = MockServer::start().await;
    respond(&server, 202, r#"{"url":"u"}"#).await;

    let mut config = queue_config(server.uri(), false);
    config.submit_queue.tags = vec!["infra".to_owned()];
    let options = LandOptions {
        tbr: true,
        ..LandOptions::default()
    };
    let land = routed_land(
        config,
        options,
        vec![Decision::Choice("prod is on fire".to_owned())],
        |conduit| {
            conduit.respond("project.query", json!({ "data": { "PHID-PROJ-1": {} } }));
            conduit.respond(
                "maniphest.createtask",
                json!({ "objectName": "T3", "uri": "https://review.example.com/T3" }),
            );
        },
    )
    .await;

    assert!(land.result.unwrap().was_pushed());
    assert!(land.remote_moved);
    assert!(land.methods.contains(&"maniphest.createtask".to_owned()));
    assert!(land.methods.contains(&"differential.close".to_owned()));
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn unmatched_path_filter_lands_locally() {
    let server = MockServer::start().await;
    respond(&server, 202, r#"{"url":"u"}"#).await;

    let mut config = queue_config(server.uri(), false);
    config.submit_queue.regex = Some("^services/".to_owned());
    let land = routed_land(config, LandOptions::default(), vec![], |conduit| {
        conduit.respond(
            "differential.querydiffs",
            json!({ "120": { "changes": [ { "currentPath": "widget.rs", "oldPath": null } ] } }),
        );
    })
    .await;

    assert!(land.result.unwrap().was_pushed());
    assert!(server.received_requests().await.unwrap_or_default().is_empty());
}
