//! HTTP plumbing shared by the bundled vendor clients

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, Response, StatusCode};

/// User agent sent to vendor APIs
pub(crate) const USER_AGENT: &str = concat!("certkeeper/", env!("CARGO_PKG_VERSION"));

/// Build a vendor HTTP client with a per-request timeout
pub(crate) fn build_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
}

/// Parse `Retry-After` given in seconds
///
/// HTTP-date values are ignored; callers fall back to their own backoff.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Status plus a bounded excerpt of the body, for error messages
pub(crate) async fn describe_failure(response: Response) -> (StatusCode, String) {
    const MAX_BODY: usize = 512;

    let status = response.status();
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_BODY {
        let mut cut = MAX_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }
    (status, body)
}
