//! HTTP tests for the focus API client against a mock server.

use std::time::Duration;

use chrono::{DateTime, Utc};
use focusmode_core::integrations::{RewardSink, StatisticsSink};
use focusmode_core::session::{finalize, FinalizeRequest, SessionId, SubmissionStatus};
use focusmode_core::{ApiClient, SubmissionError};
use mockito::Matcher;
use serde_json::json;

fn client(server: &mockito::ServerGuard) -> ApiClient {
    ApiClient::new(&server.url(), Some("test-token".into()), Duration::from_secs(5)).unwrap()
}

fn occurred_at() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-03-01T09:00:40Z")
        .unwrap()
        .with_timezone(&Utc)
}

#[tokio::test]
async fn submits_points_with_bearer_token() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/User/xp")
        .match_header("authorization", "Bearer test-token")
        .match_body(Matcher::Json(json!({ "xp": 2000 })))
        .with_status(200)
        .create_async()
        .await;

    client(&server).submit_points(2000).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn submits_daily_statistics() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/Statistics/daily")
        .match_body(Matcher::PartialJson(json!({
            "id": 0,
            "userId": "",
            "totalFocusTime": 40,
        })))
        .with_status(201)
        .create_async()
        .await;

    client(&server)
        .submit_focus_session(40, occurred_at())
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn non_success_status_is_rejected() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/User/xp")
        .with_status(401)
        .with_body("token expired")
        .create_async()
        .await;

    let err = client(&server).submit_points(50).await.unwrap_err();
    assert_eq!(
        err,
        SubmissionError::Rejected {
            endpoint: "api/User/xp".into(),
            status: 401,
            body: "token expired".into(),
        }
    );
}

#[tokio::test]
async fn finalize_runs_both_calls_even_when_points_fail() {
    let mut server = mockito::Server::new_async().await;
    let xp = server
        .mock("POST", "/api/User/xp")
        .with_status(500)
        .create_async()
        .await;
    let daily = server
        .mock("POST", "/api/Statistics/daily")
        .with_status(200)
        .create_async()
        .await;

    let api = client(&server);
    let request = FinalizeRequest {
        session_id: SessionId::new(),
        points: 2000,
        elapsed_seconds: 40,
        occurred_at: occurred_at(),
    };
    let report = finalize(&request, &api, &api).await;

    xp.assert_async().await;
    daily.assert_async().await;
    assert!(report.points.is_failed());
    assert_eq!(report.session, SubmissionStatus::Submitted);
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let api = ApiClient::new("http://127.0.0.1:9", Some("t".into()), Duration::from_secs(1)).unwrap();
    let err = api.submit_points(50).await.unwrap_err();
    assert!(matches!(err, SubmissionError::Transport { .. }));
}
