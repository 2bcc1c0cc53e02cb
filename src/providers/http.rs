//! Shared HTTP plumbing for the bundled collaborators.

use std::time::Duration;

use reqwest::Response;
use tokio_util::sync::CancellationToken;

use crate::{BifrostError, Result};

/// Map a non-success response to a typed error, consuming the body for the message.
pub(crate) async fn check_status(response: Response, model: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status.as_u16() {
        401 | 403 => Err(BifrostError::AuthenticationFailed),
        404 => Err(BifrostError::ModelNotFound(model.to_string())),
        429 => {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            Err(BifrostError::RateLimited { retry_after })
        }
        code => {
            let body = response.text().await.unwrap_or_default();
            let message = if body.is_empty() {
                status.to_string()
            } else {
                body
            };
            Err(BifrostError::Api {
                status: code,
                message,
            })
        }
    }
}

/// Race `call` against `cancel`. Losing the race drops the request future,
/// which closes its connection.
pub(crate) async fn cancellable<T>(
    cancel: &CancellationToken,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(BifrostError::Cancelled),
        result = call => result,
    }
}

/// Trim a trailing slash so paths can be appended with `format!`.
pub(crate) fn normalize_base_url(url: impl Into<String>) -> String {
    let mut url = url.into();
    while url.ends_with('/') {
        url.pop();
    }
    url
}
