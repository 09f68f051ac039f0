//! Token issuance handlers.
//!
//! These run on the internal grant service only, behind the trusted
//! application backend.  The backend has already authenticated the end
//! user and forwards their identity as `subject`; the issuer's access
//! policy then decides whether that subject may be bound to the
//! requested object.

use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use garde::Validate;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

use crate::errors::GrantError;
use crate::metrics::TOKENS_ISSUED_TOTAL;
use crate::AppState;

/// Request body for `POST /grant`.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct GrantRequest {
    /// Authenticated caller identity, forwarded by the trusted backend.
    #[garde(length(min = 1, max = 128))]
    pub subject: String,

    /// Logical bucket name.
    #[garde(length(min = 1, max = 64))]
    pub bucket: String,

    /// Object key within the bucket.
    #[garde(length(min = 1, max = 1024))]
    pub key: String,

    /// Requested token lifetime in seconds; clamped to configured
    /// bounds.
    #[garde(skip)]
    pub expires_in: Option<u64>,
}

/// Response body for `POST /grant`.
#[derive(Debug, Serialize, ToSchema)]
pub struct GrantResponse {
    /// Compact signed token.
    pub token: String,
    /// Effective lifetime in seconds.
    pub expires_in: u64,
}

/// Request body for `POST /grant/batch`.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct GrantBatchRequest {
    /// Authenticated caller identity, forwarded by the trusted backend.
    #[garde(length(min = 1, max = 128))]
    pub subject: String,

    /// Logical bucket name, shared by every key in the batch.
    #[garde(length(min = 1, max = 64))]
    pub bucket: String,

    /// Object keys to mint tokens for.  Empty entries are skipped.
    #[garde(length(min = 1, max = 256))]
    pub keys: Vec<String>,

    /// Requested token lifetime in seconds; clamped to configured
    /// bounds.
    #[garde(skip)]
    pub expires_in: Option<u64>,
}

/// One minted token in a batch response.
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchToken {
    /// The object key this token is bound to.
    pub key: String,
    /// Compact signed token.
    pub token: String,
    /// Effective lifetime in seconds.
    pub expires_in: u64,
}

/// Response body for `POST /grant/batch`.
#[derive(Debug, Serialize, ToSchema)]
pub struct GrantBatchResponse {
    /// Minted tokens, in input order, empty keys skipped.
    pub tokens: Vec<BatchToken>,
}

/// `POST /grant` -- mint one access token.
#[utoipa::path(
    post,
    path = "/grant",
    tag = "Grant",
    operation_id = "GrantToken",
    request_body = GrantRequest,
    responses(
        (status = 200, description = "Token minted", body = GrantResponse),
        (status = 400, description = "Validation failure"),
        (status = 403, description = "Access policy denied the binding"),
        (status = 500, description = "Signing failure")
    )
)]
pub async fn grant_token(
    state: Arc<AppState>,
    request: GrantRequest,
) -> Result<Response, GrantError> {
    request.validate().map_err(|e| GrantError::Validation {
        message: format!("Invalid grant request: {e}"),
    })?;

    let issuer = state.issuer.as_ref().ok_or_else(|| {
        GrantError::Signing(anyhow::anyhow!("grant surface started without an issuer"))
    })?;

    let issued = issuer.issue(
        &request.subject,
        &request.bucket,
        &request.key,
        request.expires_in,
    )?;

    counter!(TOKENS_ISSUED_TOTAL, "bucket" => request.bucket.to_uppercase()).increment(1);
    info!(
        subject = %request.subject,
        bucket = %request.bucket,
        key = %request.key,
        jti = %issued.jti,
        expires_in = issued.expires_in,
        "token granted"
    );

    Ok(no_store_json(&GrantResponse {
        token: issued.token,
        expires_in: issued.expires_in,
    }))
}

/// `POST /grant/batch` -- mint tokens for several keys at once.
///
/// Any policy denial fails the whole batch; partially granted batches
/// would make the caller's error handling ambiguous.
#[utoipa::path(
    post,
    path = "/grant/batch",
    tag = "Grant",
    operation_id = "GrantTokenBatch",
    request_body = GrantBatchRequest,
    responses(
        (status = 200, description = "Tokens minted", body = GrantBatchResponse),
        (status = 400, description = "Validation failure"),
        (status = 403, description = "Access policy denied a binding"),
        (status = 500, description = "Signing failure")
    )
)]
pub async fn grant_token_batch(
    state: Arc<AppState>,
    request: GrantBatchRequest,
) -> Result<Response, GrantError> {
    request.validate().map_err(|e| GrantError::Validation {
        message: format!("Invalid grant request: {e}"),
    })?;

    let issuer = state.issuer.as_ref().ok_or_else(|| {
        GrantError::Signing(anyhow::anyhow!("grant surface started without an issuer"))
    })?;

    let mut tokens = Vec::with_capacity(request.keys.len());
    for key in &request.keys {
        if key.is_empty() {
            continue;
        }
        let issued = issuer.issue(&request.subject, &request.bucket, key, request.expires_in)?;
        counter!(TOKENS_ISSUED_TOTAL, "bucket" => request.bucket.to_uppercase()).increment(1);
        tokens.push(BatchToken {
            key: key.clone(),
            token: issued.token,
            expires_in: issued.expires_in,
        });
    }

    info!(
        subject = %request.subject,
        bucket = %request.bucket,
        count = tokens.len(),
        "token batch granted"
    );

    Ok(no_store_json(&GrantBatchResponse { tokens }))
}

/// Serialize a JSON response with `Cache-Control: no-store`.
///
/// Tokens grant access by possession; an intermediary cache holding
/// one is a leak.
fn no_store_json<T: Serialize>(body: &T) -> Response {
    let mut response = (
        StatusCode::OK,
        [("content-type", "application/json")],
        serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string()),
    )
        .into_response();
    response
        .headers_mut()
        .insert("cache-control", HeaderValue::from_static("no-store"));
    response
}
