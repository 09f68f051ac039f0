//! Tollgate library -- token-gated object delivery.
//!
//! This crate provides the core components of a secure, time-boxed
//! object-delivery system: a trusted issuance service mints short-lived
//! signed tokens binding one caller to one (bucket, key) pair, and a
//! public delivery worker verifies those tokens and streams the object
//! from pluggable storage backends.

use crate::buckets::BucketMap;
use crate::config::Config;
use crate::token::{TokenIssuer, TokenVerifier};

pub mod buckets;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod policy;
pub mod server;
pub mod storage;
pub mod token;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Logical bucket dispatch table.
    pub buckets: BucketMap,
    /// Stateless token verifier (delivery surface).
    pub verifier: TokenVerifier,
    /// Token issuer (grant surface only; `None` on the delivery worker,
    /// which must not be able to mint).
    pub issuer: Option<TokenIssuer>,
}
