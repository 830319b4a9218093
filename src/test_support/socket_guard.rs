use std::net::TcpListener;

use wiremock::MockServer;

const REQUIRE_SOCKET_TESTS_ENV: &str = "ASSET_FETCH_REQUIRE_SOCKET_TESTS";

/// Starts a mock server, or returns `None` when no localhost socket can be
/// bound and `ASSET_FETCH_REQUIRE_SOCKET_TESTS` is not set.
pub(crate) async fn start_mock_server_or_skip() -> Option<MockServer> {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return Some(MockServer::start().await);
    }

    let required = std::env::var(REQUIRE_SOCKET_TESTS_ENV)
        .is_ok_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"));
    assert!(
        !required,
        "[socket-bound-test] cannot bind localhost socket and {REQUIRE_SOCKET_TESTS_ENV} is set"
    );
    eprintln!("[socket-bound-test] cannot bind localhost socket; skipping wiremock-based test");
    None
}
