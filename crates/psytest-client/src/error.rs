//! Classification of HTTP failures into endpoint errors.

use psytest_core::error::EndpointError;

/// Map a transport-level failure.
pub fn from_transport(err: &reqwest::Error, timeout_secs: u64) -> EndpointError {
    if err.is_timeout() {
        EndpointError::Timeout(timeout_secs)
    } else {
        EndpointError::NetworkError(err.to_string())
    }
}

/// Map a non-success HTTP status. `token` names the session in messages.
pub fn from_status(status: u16, token: &str, body: String) -> EndpointError {
    match status {
        404 => EndpointError::UnknownToken(token.to_string()),
        409 | 410 => EndpointError::SessionClosed(if body.is_empty() {
            format!("HTTP {status}")
        } else {
            body
        }),
        _ => EndpointError::ApiError {
            status,
            message: body,
        },
    }
}
