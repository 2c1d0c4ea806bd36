//! Blob upload tests

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

use pocketsync_core::ports::remote_store::IRemoteStore;

use crate::common::setup;

#[tokio::test]
async fn test_upload_posts_bytes_and_returns_reference() {
    let (server, client) = setup().await;
    let payload = vec![0xff, 0xd8, 0xff, 0xe0];

    Mock::given(method("POST"))
        .and(path("/storage/profile-photos/user-1/abc_avatar.jpg"))
        .and(header("Content-Type", "application/octet-stream"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let reference = client
        .upload_blob("profile-photos", "user-1/abc_avatar.jpg", &payload)
        .await
        .unwrap();
    assert_eq!(reference, "profile-photos/user-1/abc_avatar.jpg");
}

#[tokio::test]
async fn test_upload_server_error_is_transient() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/storage/profile-photos/user-1/avatar.jpg"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = client
        .upload_blob("profile-photos", "user-1/avatar.jpg", &[1, 2, 3])
        .await
        .unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_upload_authorization_failure_is_rejected() {
    let (server, client) = setup().await;

    Mock::given(method("POST"))
        .and(path("/storage/profile-photos/user-1/avatar.jpg"))
        .respond_with(ResponseTemplate::new(403).set_body_string("bucket policy"))
        .mount(&server)
        .await;

    let err = client
        .upload_blob("profile-photos", "user-1/avatar.jpg", &[1])
        .await
        .unwrap_err();
    assert!(err.is_permanent_rejection());
}
