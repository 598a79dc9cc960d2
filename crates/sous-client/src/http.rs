//! Mapping of reqwest failures and HTTP statuses onto [`AppError`].

use reqwest::StatusCode;
use sous_core::AppError;

/// Transport failure: timeouts and connection problems are transient.
pub(crate) fn send_error(upstream: &str, err: reqwest::Error) -> AppError {
    if err.is_timeout() {
        AppError::UpstreamUnavailable(format!("{upstream} request timed out"))
    } else if err.is_connect() {
        AppError::UpstreamUnavailable(format!("{upstream} connection failed: {err}"))
    } else {
        AppError::UpstreamUnavailable(format!("{upstream} request failed: {err}"))
    }
}

/// Non-success status. 429 and 5xx are transient, everything else is a
/// definitive refusal. Callers that give 404 its own meaning check it first.
pub(crate) fn status_error(upstream: &str, status: StatusCode, message: String) -> AppError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        AppError::UpstreamUnavailable(format!(
            "{upstream} returned HTTP {}: {message}",
            status.as_u16()
        ))
    } else {
        AppError::UpstreamRejected {
            status: status.as_u16(),
            message,
        }
    }
}

/// Short, single-line excerpt of an error body.
pub(crate) fn excerpt(body: &str) -> String {
    let line = body.split_whitespace().collect::<Vec<_>>().join(" ");
    match line.char_indices().nth(200) {
        Some((idx, _)) => format!("{}…", &line[..idx]),
        None => line,
    }
}
