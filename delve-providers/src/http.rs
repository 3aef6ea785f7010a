//! Status-code and transport classification shared by the HTTP adapters

use delve_core::{DelveError, ErrorContext};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;

/// Map a non-success response to the error taxonomy
pub(crate) fn classify_status(
    provider: &str,
    operation: &str,
    status: StatusCode,
    retry_after_ms: Option<u64>,
    body: &str,
) -> DelveError {
    let context = ErrorContext::new(provider)
        .with_operation(operation)
        .with_metadata("status", status.as_str());
    let message = summarize_body(status, body);

    match status {
        StatusCode::TOO_MANY_REQUESTS => DelveError::RateLimit {
            message,
            retry_after_ms,
            context: context.with_suggestion("Lower executor.max_concurrent or wait for quota"),
        },
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DelveError::Authentication {
            message,
            context: context.with_suggestion("Check the API key for this endpoint"),
        },
        StatusCode::NOT_FOUND => DelveError::NotFound {
            resource: message,
            context: context.with_suggestion("Verify the endpoint base URL"),
        },
        _ => DelveError::Upstream {
            message,
            status: Some(status.as_u16()),
            provider: Some(provider.to_string()),
            context,
        },
    }
}

/// Map a reqwest transport failure
pub(crate) fn transport_error(
    provider: &str,
    operation: &str,
    timeout_ms: u64,
    error: reqwest::Error,
) -> DelveError {
    if error.is_timeout() {
        return DelveError::Timeout {
            operation: format!("{}.{}", provider, operation),
            duration_ms: timeout_ms,
            context: ErrorContext::new(provider).with_operation(operation),
        };
    }

    if error.is_decode() {
        return DelveError::Upstream {
            message: format!("Malformed response body: {}", error),
            status: error.status().map(|s| s.as_u16()),
            provider: Some(provider.to_string()),
            context: ErrorContext::new(provider).with_operation(operation),
        };
    }

    DelveError::Network {
        message: error.to_string(),
        source: Some(Box::new(error)),
        context: ErrorContext::new(provider)
            .with_operation(operation)
            .with_suggestion("Check network connectivity and the endpoint URL"),
    }
}

/// `Retry-After` in delta-seconds; HTTP-date values are ignored
pub(crate) fn retry_after_ms(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| (secs * 1000.0) as u64)
}

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn summarize_body(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return status.to_string();
    }
    let snippet: String = body.chars().take(300).collect();
    format!("{}: {}", status, snippet)
}
