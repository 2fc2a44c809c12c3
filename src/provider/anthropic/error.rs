//! Maps Messages API error responses onto the crate error taxonomy.

use serde::Deserialize;

use crate::error::LlmError;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Converts a non-2xx response into an [`LlmError`].
///
/// Caller mistakes (bad request, auth, unknown model, unprocessable input)
/// become [`LlmError::Validation`] and are never retried. Everything else
/// (rate limits, overload, server faults) becomes [`LlmError::Internal`]
/// with the status code embedded so the retry classifier can recognize the
/// transient ones.
pub(crate) fn parse_messages_error(status: u16, body: &str) -> LlmError {
    let detail = match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            error: Some(detail),
        }) => {
            let kind = detail.kind.unwrap_or_else(|| "error".to_string());
            let message = detail.message.unwrap_or_default();
            format!("{kind}: {message}")
        }
        // Gateways in front of the API sometimes answer with plain text.
        _ => body.trim().to_string(),
    };
    let message = format!("status {status}: {detail}");

    match status {
        400 | 401 | 403 | 404 | 422 => LlmError::validation(message),
        _ => LlmError::internal(message),
    }
}
