//! Row API tests: select, patch-with-count, insert, and the status-code to
//! error-kind mapping

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use pocketsync_core::ports::remote_store::{Filter, IRemoteStore, RemoteError, Row};

use crate::common::setup;

fn row(pairs: &[(&str, serde_json::Value)]) -> Row {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

#[tokio::test]
async fn test_select_one_returns_first_row() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/profiles"))
        .and(query_param("user_id", "eq.user-1"))
        .and(query_param("limit", "1"))
        .and(header("apikey", "test-key"))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"user_id": "user-1", "bio": "hello", "updated_at": "2026-02-01T12:00:00Z"}
        ])))
        .mount(&server)
        .await;

    let found = client
        .select_one("profiles", &Filter::eq("user_id", "user-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.get("bio"), Some(&json!("hello")));
}

#[tokio::test]
async fn test_select_one_empty_result_is_none() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let found = client
        .select_one("profiles", &Filter::eq("user_id", "missing"))
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn test_update_counts_patched_rows() {
    let (server, client) = setup().await;
    let patch = row(&[("bio", json!("new"))]);

    Mock::given(method("PATCH"))
        .and(path("/profiles"))
        .and(query_param("user_id", "eq.user-1"))
        .and(header("Prefer", "return=representation"))
        .and(body_json(json!({"bio": "new"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"user_id": "user-1", "bio": "new"}
        ])))
        .mount(&server)
        .await;

    let affected = client
        .update("profiles", &Filter::eq("user_id", "user-1"), &patch)
        .await
        .unwrap();
    assert_eq!(affected, 1);
}

#[tokio::test]
async fn test_update_missing_row_affects_zero() {
    let (server, client) = setup().await;

    Mock::given(method("PATCH"))
        .and(path("/profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let affected = client
        .update(
            "profiles",
            &Filter::eq("user_id", "nobody"),
            &row(&[("bio", json!("x"))]),
        )
        .await
        .unwrap();
    assert_eq!(affected, 0);
}

#[tokio::test]
async fn test_insert_posts_row() {
    let (server, client) = setup().await;
    let new_row = row(&[("user_id", json!("user-1")), ("bio", json!("hi"))]);

    Mock::given(method("POST"))
        .and(path("/profiles"))
        .and(body_json(json!({"user_id": "user-1", "bio": "hi"})))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    client.insert("profiles", &new_row).await.unwrap();
}

#[tokio::test]
async fn test_conflict_maps_to_unique_violation() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/profiles"))
        .respond_with(ResponseTemplate::new(409).set_body_string("duplicate key"))
        .mount(&server)
        .await;

    let err = client
        .insert("profiles", &row(&[("user_id", json!("user-1"))]))
        .await
        .unwrap_err();
    assert!(err.is_unique_violation());
}

#[tokio::test]
async fn test_validation_failure_maps_to_rejected() {
    let (server, client) = setup().await;

    Mock::given(method("PATCH"))
        .and(path("/profiles"))
        .respond_with(ResponseTemplate::new(422).set_body_string("bio too long"))
        .mount(&server)
        .await;

    let err = client
        .update(
            "profiles",
            &Filter::eq("user_id", "user-1"),
            &row(&[("bio", json!("x"))]),
        )
        .await
        .unwrap_err();
    match err {
        RemoteError::Rejected { status, message } => {
            assert_eq!(status, 422);
            assert_eq!(message, "bio too long");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn test_server_errors_and_rate_limits_are_transient() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/profiles"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/profiles"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let select_err = client
        .select_one("profiles", &Filter::eq("user_id", "user-1"))
        .await
        .unwrap_err();
    assert!(select_err.is_transient());

    let update_err = client
        .update(
            "profiles",
            &Filter::eq("user_id", "user-1"),
            &row(&[("bio", json!("x"))]),
        )
        .await
        .unwrap_err();
    assert!(update_err.is_transient());
}

#[tokio::test]
async fn test_unreachable_server_is_transient() {
    // Nothing listens on this port
    let client =
        pocketsync_remote::HttpRemoteStore::with_base_url("http://127.0.0.1:1", None);

    let err = client
        .select_one("profiles", &Filter::eq("user_id", "user-1"))
        .await
        .unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_malformed_body_is_invalid_response() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/profiles"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json at all"))
        .mount(&server)
        .await;

    let err = client
        .select_one("profiles", &Filter::eq("user_id", "user-1"))
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::InvalidResponse(_)));
}
