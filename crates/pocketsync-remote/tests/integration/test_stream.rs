//! Change stream tests: NDJSON framing and channel lifecycle

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use pocketsync_core::ports::remote_store::{Filter, IRemoteStore};

use crate::common::setup;

#[tokio::test]
async fn test_stream_delivers_rows_then_closes() {
    let (server, client) = setup().await;

    let body = concat!(
        r#"{"user_id": "user-1", "bio": "first"}"#,
        "\n",
        r#"{"user_id": "user-1", "bio": "second"}"#,
        "\n",
    );
    Mock::given(method("GET"))
        .and(path("/profiles/stream"))
        .and(query_param("user_id", "eq.user-1"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .mount(&server)
        .await;

    let mut rows = client
        .subscribe("profiles", &Filter::eq("user_id", "user-1"))
        .await
        .unwrap();

    let first = rows.recv().await.unwrap();
    assert_eq!(first.get("bio"), Some(&json!("first")));
    let second = rows.recv().await.unwrap();
    assert_eq!(second.get("bio"), Some(&json!("second")));

    // Body exhausted: the channel closes
    assert!(rows.recv().await.is_none());
}

#[tokio::test]
async fn test_stream_skips_blank_and_broken_lines() {
    let (server, client) = setup().await;

    let body = concat!(
        "\n",
        "{broken json\n",
        r#"{"user_id": "user-1", "bio": "good"}"#,
        "\n",
    );
    Mock::given(method("GET"))
        .and(path("/profiles/stream"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .mount(&server)
        .await;

    let mut rows = client
        .subscribe("profiles", &Filter::eq("user_id", "user-1"))
        .await
        .unwrap();

    let row = rows.recv().await.unwrap();
    assert_eq!(row.get("bio"), Some(&json!("good")));
    assert!(rows.recv().await.is_none());
}

#[tokio::test]
async fn test_stream_handles_final_row_without_newline() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/profiles/stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(r#"{"user_id": "user-1", "bio": "tail"}"#, "application/x-ndjson"),
        )
        .mount(&server)
        .await;

    let mut rows = client
        .subscribe("profiles", &Filter::eq("user_id", "user-1"))
        .await
        .unwrap();

    let row = rows.recv().await.unwrap();
    assert_eq!(row.get("bio"), Some(&json!("tail")));
    assert!(rows.recv().await.is_none());
}

#[tokio::test]
async fn test_stream_rejected_at_open_is_an_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/profiles/stream"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
        .mount(&server)
        .await;

    let err = client
        .subscribe("profiles", &Filter::eq("user_id", "user-1"))
        .await
        .unwrap_err();
    assert!(err.is_permanent_rejection());
}
