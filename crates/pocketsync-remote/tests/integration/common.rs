//! Shared setup for the adapter integration tests

use pocketsync_remote::HttpRemoteStore;
use wiremock::MockServer;

/// Starts a mock server and a client pointed at it, with an API key so the
/// auth headers are exercised
pub async fn setup() -> (MockServer, HttpRemoteStore) {
    let server = MockServer::start().await;
    let client = HttpRemoteStore::with_base_url(server.uri(), Some("test-key".to_string()));
    (server, client)
}
