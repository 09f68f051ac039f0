//! Token-verified object delivery handler.
//!
//! The whole delivery protocol lives here: verify the token, resolve
//! the bucket, fetch the object, stream it back.  Each request walks a
//! fixed state machine with five terminal states:
//!
//! `TOKEN_CHECK {missing -> 400, invalid -> 403}
//!  -> BUCKET_RESOLVE {unknown -> 500}
//!  -> OBJECT_FETCH {miss -> 404, error -> 500, hit -> 200 stream}`
//!
//! No retries happen here; a client that sees a failure re-requests
//! with a fresh token.

use axum::body::Body;
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::errors::DeliveryError;
use crate::metrics::{BYTES_SENT_TOTAL, DELIVERIES_TOTAL, TOKEN_REJECTIONS_TOTAL};
use crate::AppState;

/// `GET /` and `HEAD /` -- verify the token and stream the object.
///
/// `include_body` is false for HEAD: same verification, same headers,
/// no bytes.
#[utoipa::path(
    get,
    path = "/",
    tag = "Delivery",
    operation_id = "DeliverObject",
    params(
        ("token" = String, Query, description = "Signed access token"),
    ),
    responses(
        (status = 200, description = "Object bytes, streamed"),
        (status = 400, description = "Missing token or unusable token payload"),
        (status = 403, description = "Invalid or expired token"),
        (status = 404, description = "Object not found"),
        (status = 500, description = "Bucket not configured or storage failure")
    )
)]
pub async fn deliver_object(
    state: Arc<AppState>,
    token: Option<&str>,
    include_body: bool,
) -> Result<Response, DeliveryError> {
    // TOKEN_CHECK: presence.
    let token = match token {
        Some(t) if !t.is_empty() => t,
        _ => {
            counter!(TOKEN_REJECTIONS_TOTAL, "reason" => "missing").increment(1);
            return Err(DeliveryError::MissingToken);
        }
    };

    // TOKEN_CHECK: signature, issuer, audience, time window.  The
    // cause is logged here and nowhere else; the client sees one
    // generic rejection regardless of which check failed.
    let claims = match state.verifier.verify(token) {
        Ok(claims) => claims,
        Err(e) => {
            warn!(error = %e, "token rejected");
            counter!(TOKEN_REJECTIONS_TOTAL, "reason" => "invalid").increment(1);
            return Err(DeliveryError::InvalidToken);
        }
    };

    // A verified token with an empty bucket or key is a payload
    // problem, not a signature problem.
    if claims.bucket.is_empty() || claims.key.is_empty() {
        counter!(TOKEN_REJECTIONS_TOTAL, "reason" => "payload").increment(1);
        return Err(DeliveryError::InvalidPayload);
    }

    // BUCKET_RESOLVE: unknown bucket means the deployment is missing a
    // binding.  Operator error -- alertable, and distinct from 404.
    let Some(binding) = state.buckets.resolve(&claims.bucket) else {
        error!(bucket = %claims.bucket, "no storage binding configured for bucket");
        counter!(DELIVERIES_TOTAL, "bucket" => claims.bucket.to_uppercase(), "outcome" => "unknown_bucket")
            .increment(1);
        return Err(DeliveryError::UnknownBucket {
            bucket: claims.bucket,
        });
    };

    debug!(
        bucket = %binding.name,
        key = %claims.key,
        jti = claims.jti.as_deref().unwrap_or("-"),
        "token accepted"
    );

    // OBJECT_FETCH.
    let object = match binding.storage.get(&claims.key).await {
        Ok(Some(object)) => object,
        Ok(None) => {
            counter!(DELIVERIES_TOTAL, "bucket" => binding.name.clone(), "outcome" => "not_found")
                .increment(1);
            return Err(DeliveryError::NotFound);
        }
        Err(e) => {
            error!(bucket = %binding.name, key = %claims.key, error = %e, "storage fetch failed");
            counter!(DELIVERIES_TOTAL, "bucket" => binding.name.clone(), "outcome" => "upstream_error")
                .increment(1);
            return Err(DeliveryError::Upstream(e));
        }
    };

    counter!(DELIVERIES_TOTAL, "bucket" => binding.name.clone(), "outcome" => "delivered")
        .increment(1);
    if let Some(size) = object.size {
        counter!(BYTES_SENT_TOTAL, "bucket" => binding.name.clone()).increment(size);
    }

    // Stream the body; dropping the response (client disconnect)
    // drops the storage read with it.
    let body = if include_body {
        Body::from_stream(object.body)
    } else {
        Body::empty()
    };

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    let hdrs = response.headers_mut();

    hdrs.insert(
        "content-type",
        HeaderValue::from_str(&object.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    hdrs.insert(
        "cache-control",
        HeaderValue::from_str(&binding.cache_control)
            .unwrap_or_else(|_| HeaderValue::from_static("private, no-store")),
    );
    if !object.etag.is_empty() {
        if let Ok(val) = HeaderValue::from_str(&format!("\"{}\"", object.etag)) {
            hdrs.insert("etag", val);
        }
    }
    if let Some(size) = object.size {
        hdrs.insert(
            "content-length",
            HeaderValue::from_str(&size.to_string()).unwrap(),
        );
    }

    Ok(response)
}
