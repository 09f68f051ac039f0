//! Error types for the delivery and grant surfaces.
//!
//! Every variant maps to one terminal state of the request state
//! machine.  Both enums implement [`axum::response::IntoResponse`] so
//! handlers can simply return `Err(DeliveryError::NotFound)`.
//!
//! Client-facing bodies are deliberately generic: a rejected token
//! never reveals which verification step failed, and upstream storage
//! detail is logged server-side only.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Terminal failure states of the delivery worker.
///
/// The state machine per request is
/// `TOKEN_CHECK {missing -> 400, invalid -> 403, bad payload -> 400}
///  -> BUCKET_RESOLVE {unknown -> 500}
///  -> OBJECT_FETCH {miss -> 404, error -> 500}`.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// No `token` query parameter was supplied.
    #[error("Missing access token.")]
    MissingToken,

    /// Signature, issuer, audience, or time-window verification failed.
    /// One message for all of them; the cause is logged, not returned.
    #[error("Invalid or expired access token.")]
    InvalidToken,

    /// The token verified but its claim set is unusable (empty bucket
    /// or key).
    #[error("Invalid token payload.")]
    InvalidPayload,

    /// The token names a bucket with no configured binding.  This is an
    /// operator error, not a client error, and must stay distinct from
    /// `NotFound`.
    #[error("Server configuration error: bucket not configured.")]
    UnknownBucket { bucket: String },

    /// The bucket is configured but no object lives at the key.  A
    /// valid token pointing at a deleted object lands here.
    #[error("Object not found.")]
    NotFound,

    /// The storage backend failed.  Full detail is logged server-side.
    #[error("Error fetching object.")]
    Upstream(#[from] anyhow::Error),
}

impl DeliveryError {
    /// Short machine-readable code, used for logs and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            DeliveryError::MissingToken => "MissingToken",
            DeliveryError::InvalidToken => "InvalidToken",
            DeliveryError::InvalidPayload => "InvalidPayload",
            DeliveryError::UnknownBucket { .. } => "UnknownBucket",
            DeliveryError::NotFound => "NotFound",
            DeliveryError::Upstream(_) => "Upstream",
        }
    }

    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            DeliveryError::MissingToken => StatusCode::BAD_REQUEST,
            DeliveryError::InvalidToken => StatusCode::FORBIDDEN,
            DeliveryError::InvalidPayload => StatusCode::BAD_REQUEST,
            DeliveryError::UnknownBucket { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            DeliveryError::NotFound => StatusCode::NOT_FOUND,
            DeliveryError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for DeliveryError {
    fn into_response(self) -> Response {
        let request_id = generate_request_id();
        let status = self.status_code();
        let date = httpdate::fmt_http_date(std::time::SystemTime::now());

        (
            status,
            [
                ("content-type", "text/plain; charset=utf-8".to_string()),
                ("x-request-id", request_id),
                ("date", date),
                ("server", "Tollgate".to_string()),
            ],
            self.to_string(),
        )
            .into_response()
    }
}

/// Failure states of the grant (token issuance) surface.
#[derive(Debug, Error)]
pub enum GrantError {
    /// The request body failed validation (missing bucket/key, bad
    /// subject, out-of-range values caught by garde).
    #[error("{message}")]
    Validation { message: String },

    /// The access policy refused to bind this subject to the requested
    /// object.
    #[error("Access denied.")]
    AccessDenied,

    /// Token signing failed.  Detail is logged server-side.
    #[error("Internal server error.")]
    Signing(#[from] anyhow::Error),
}

impl GrantError {
    /// Short machine-readable code, used for logs and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            GrantError::Validation { .. } => "Validation",
            GrantError::AccessDenied => "AccessDenied",
            GrantError::Signing(_) => "Signing",
        }
    }

    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GrantError::Validation { .. } => StatusCode::BAD_REQUEST,
            GrantError::AccessDenied => StatusCode::FORBIDDEN,
            GrantError::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GrantError {
    fn into_response(self) -> Response {
        let request_id = generate_request_id();
        let status = self.status_code();
        let date = httpdate::fmt_http_date(std::time::SystemTime::now());
        let body = serde_json::json!({ "error": self.to_string() }).to_string();

        (
            status,
            [
                ("content-type", "application/json".to_string()),
                // Token grants (and their failures) must never be cached.
                ("cache-control", "no-store".to_string()),
                ("x-request-id", request_id),
                ("date", date),
                ("server", "Tollgate".to_string()),
            ],
            body,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_format() {
        let id = generate_request_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(id, id.to_uppercase());
    }

    #[test]
    fn test_delivery_status_codes() {
        assert_eq!(
            DeliveryError::MissingToken.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            DeliveryError::InvalidToken.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            DeliveryError::UnknownBucket {
                bucket: "x".to_string()
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(DeliveryError::NotFound.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(DeliveryError::MissingToken.code(), "MissingToken");
        assert_eq!(DeliveryError::NotFound.code(), "NotFound");
        assert_eq!(GrantError::AccessDenied.code(), "AccessDenied");
    }

    #[test]
    fn test_invalid_token_message_is_generic() {
        // All verification failures collapse into one message; nothing
        // about the failing check leaks into the body.
        assert_eq!(
            DeliveryError::InvalidToken.to_string(),
            "Invalid or expired access token."
        );
    }

    #[test]
    fn test_unknown_bucket_is_not_not_found() {
        let unknown = DeliveryError::UnknownBucket {
            bucket: "nope".to_string(),
        };
        assert_ne!(unknown.status_code(), DeliveryError::NotFound.status_code());
    }
}
