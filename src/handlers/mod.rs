//! HTTP request handlers.
//!
//! `deliver` serves the public delivery worker; `grant` serves the
//! internal issuance surface.

pub mod deliver;
pub mod grant;
