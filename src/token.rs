//! Signed access tokens: claims, issuance, verification.
//!
//! Tokens are HS256 JWTs binding the holder to exactly one
//! (bucket, key) pair.  The signing secret is a hex-encoded string
//! shared out-of-band between the grant service and the delivery
//! worker; it is decoded to raw bytes before any cryptographic use so
//! both sides agree on one canonical encoding.
//!
//! Verification is stateless.  The security guarantee rests entirely on
//! secret confidentiality and short expiry; tokens are intentionally
//! reusable within their validity window and there is no revocation.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::errors::GrantError;
use crate::policy::AccessPolicy;

/// The signed claim set carried by every access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Logical bucket name.  Defaulted on decode so a structurally
    /// valid token with a missing field is rejected as a payload error
    /// (400) rather than a signature error.
    #[serde(default)]
    pub bucket: String,

    /// Object key within the bucket.  Opaque to this layer; ownership
    /// was checked by the issuer's policy before signing.
    #[serde(default)]
    pub key: String,

    /// Issuer constant.
    pub iss: String,

    /// Audience constant.
    pub aud: String,

    /// Issued-at, seconds since epoch.
    pub iat: i64,

    /// Expiry, seconds since epoch.
    pub exp: i64,

    /// Unique token ID for log correlation.  The verifier never
    /// requires it; tokens stay reusable within their window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

/// Errors constructing a signer or verifier from configuration.
#[derive(Debug, Error)]
pub enum SecretError {
    /// No secret configured (empty `auth.jwt_secret` and no
    /// `JWT_SECRET` env var).
    #[error("signing secret is not configured")]
    Missing,

    /// The configured secret is not valid hex.
    #[error("signing secret is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Decode the hex-encoded shared secret into raw key bytes.
fn decode_secret(jwt_secret: &str) -> Result<Vec<u8>, SecretError> {
    if jwt_secret.is_empty() {
        return Err(SecretError::Missing);
    }
    Ok(hex::decode(jwt_secret)?)
}

/// A token successfully minted by the issuer.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Compact JWT string.
    pub token: String,

    /// Effective lifetime in seconds (after clamping).
    pub expires_in: u64,

    /// The `jti` claim, for log correlation.
    pub jti: String,
}

// -- Issuer ------------------------------------------------------------------

/// Mints signed access tokens for authorized (subject, bucket, key)
/// bindings.
///
/// Construction requires an [`AccessPolicy`]; issuance without an
/// ownership check is not expressible.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    issuer: String,
    audience: String,
    default_expiry: u64,
    min_expiry: u64,
    max_expiry: u64,
    policy: Arc<dyn AccessPolicy>,
}

impl TokenIssuer {
    /// Build an issuer from config.  Fails fast if the secret is
    /// missing or not hex -- a misconfigured issuer must not start.
    pub fn new(auth: &AuthConfig, policy: Arc<dyn AccessPolicy>) -> Result<Self, SecretError> {
        let secret = decode_secret(&auth.jwt_secret)?;
        // Inverted bounds collapse to the smaller value rather than
        // panicking in clamp below.
        let min_expiry = auth.min_expiry_secs.min(auth.max_expiry_secs);
        Ok(Self {
            encoding_key: EncodingKey::from_secret(&secret),
            issuer: auth.issuer.clone(),
            audience: auth.audience.clone(),
            default_expiry: auth.default_expiry_secs,
            min_expiry,
            max_expiry: auth.max_expiry_secs,
            policy,
        })
    }

    /// Mint a token binding `subject` to one object.
    ///
    /// `expires_in` is clamped into the configured bounds; absent, the
    /// configured default applies.
    ///
    /// # Errors
    ///
    /// Returns `GrantError::Validation` for an empty bucket or key,
    /// `GrantError::AccessDenied` if the policy refuses the binding,
    /// and `GrantError::Signing` if encoding fails.
    pub fn issue(
        &self,
        subject: &str,
        bucket: &str,
        key: &str,
        expires_in: Option<u64>,
    ) -> Result<IssuedToken, GrantError> {
        if bucket.is_empty() || key.is_empty() {
            return Err(GrantError::Validation {
                message: "Missing 'bucket' or 'key' in request.".to_string(),
            });
        }

        if !self.policy.authorize(subject, bucket, key) {
            warn!(subject, bucket, key, "access policy denied token grant");
            return Err(GrantError::AccessDenied);
        }

        let expires_in = expires_in
            .unwrap_or(self.default_expiry)
            .clamp(self.min_expiry, self.max_expiry);

        let now = Utc::now().timestamp();
        let jti = Uuid::new_v4().to_string();
        let claims = Claims {
            bucket: bucket.to_string(),
            key: key.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now,
            exp: now + expires_in as i64,
            jti: Some(jti.clone()),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| GrantError::Signing(anyhow::anyhow!("JWT encoding failed: {e}")))?;

        Ok(IssuedToken {
            token,
            expires_in,
            jti,
        })
    }
}

// -- Verifier ----------------------------------------------------------------

/// Why a token was rejected.  Logged server-side; clients only ever see
/// the one generic rejection.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// Signature, issuer, audience, expiry, or structural failure.
    #[error("token verification failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// `iat` lies further in the future than the clock tolerance.
    #[error("token issued in the future beyond clock tolerance")]
    IssuedInFuture,
}

/// Verifies inbound tokens at the delivery edge.
///
/// Checks, in order: signature, issuer, audience, and the time window
/// `[iat - tolerance, exp + tolerance]`.  No storage or database lookup
/// occurs here.
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
    clock_tolerance: i64,
}

impl TokenVerifier {
    /// Build a verifier from config.  Fails fast on a missing or
    /// non-hex secret.
    pub fn new(auth: &AuthConfig) -> Result<Self, SecretError> {
        let secret = decode_secret(&auth.jwt_secret)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&auth.issuer]);
        validation.set_audience(&[&auth.audience]);
        validation.leeway = auth.clock_tolerance_secs;

        Ok(Self {
            decoding_key: DecodingKey::from_secret(&secret),
            validation,
            clock_tolerance: auth.clock_tolerance_secs as i64,
        })
    }

    /// Verify a compact token string and return its claims.
    ///
    /// `jsonwebtoken` applies the leeway to `exp`/`nbf` but does not
    /// validate `iat` at all, so the future-`iat` half of the window is
    /// checked explicitly here.
    pub fn verify(&self, token: &str) -> Result<Claims, VerifyError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        let claims = data.claims;

        let now = Utc::now().timestamp();
        if claims.iat > now + self.clock_tolerance {
            return Err(VerifyError::IssuedInFuture);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PrefixOwnershipPolicy;

    /// Policy that approves everything; issuance-mechanics tests only.
    struct AllowAll;

    impl AccessPolicy for AllowAll {
        fn authorize(&self, _subject: &str, _bucket: &str, _key: &str) -> bool {
            true
        }
    }

    const SECRET_HEX: &str = "6a77745f7365637265745f666f725f746573747321";

    fn test_auth_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: SECRET_HEX.to_string(),
            ..AuthConfig::default()
        }
    }

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(&test_auth_config(), Arc::new(AllowAll)).unwrap()
    }

    fn verifier() -> TokenVerifier {
        TokenVerifier::new(&test_auth_config()).unwrap()
    }

    /// Sign arbitrary claims with the test secret, bypassing the issuer.
    fn sign_raw(claims: &Claims) -> String {
        let secret = hex::decode(SECRET_HEX).unwrap();
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(&secret),
        )
        .unwrap()
    }

    fn base_claims() -> Claims {
        let now = Utc::now().timestamp();
        Claims {
            bucket: "datasets".to_string(),
            key: "u1/s1/file.jpg".to_string(),
            iss: "urn:tollgate:issuer".to_string(),
            aud: "urn:tollgate:audience".to_string(),
            iat: now,
            exp: now + 300,
            jti: None,
        }
    }

    // -- secret handling --

    #[test]
    fn test_missing_secret_is_config_error() {
        let auth = AuthConfig::default();
        assert!(matches!(
            TokenIssuer::new(&auth, Arc::new(AllowAll)),
            Err(SecretError::Missing)
        ));
        assert!(matches!(TokenVerifier::new(&auth), Err(SecretError::Missing)));
    }

    #[test]
    fn test_non_hex_secret_is_config_error() {
        let auth = AuthConfig {
            jwt_secret: "not-hex!".to_string(),
            ..AuthConfig::default()
        };
        assert!(matches!(
            TokenVerifier::new(&auth),
            Err(SecretError::InvalidHex(_))
        ));
    }

    // -- round trip --

    #[test]
    fn test_issue_then_verify_round_trip() {
        let issued = issuer()
            .issue("u1", "datasets", "u1/s1/file.jpg", Some(300))
            .unwrap();
        assert_eq!(issued.expires_in, 300);

        let claims = verifier().verify(&issued.token).unwrap();
        assert_eq!(claims.bucket, "datasets");
        assert_eq!(claims.key, "u1/s1/file.jpg");
        assert_eq!(claims.iss, "urn:tollgate:issuer");
        assert_eq!(claims.aud, "urn:tollgate:audience");
        assert_eq!(claims.jti.as_deref(), Some(issued.jti.as_str()));
        assert_eq!(claims.exp - claims.iat, 300);
    }

    #[test]
    fn test_expiry_clamped_to_bounds() {
        let iss = issuer();
        // Above max (3600) clamps down.
        let issued = iss
            .issue("u1", "datasets", "u1/f", Some(86_400))
            .unwrap();
        assert_eq!(issued.expires_in, 3600);
        // Below min (30) clamps up.
        let issued = iss.issue("u1", "datasets", "u1/f", Some(1)).unwrap();
        assert_eq!(issued.expires_in, 30);
        // Absent uses the default.
        let issued = iss.issue("u1", "datasets", "u1/f", None).unwrap();
        assert_eq!(issued.expires_in, 300);
    }

    #[test]
    fn test_empty_bucket_or_key_rejected() {
        let iss = issuer();
        assert!(matches!(
            iss.issue("u1", "", "u1/f", None),
            Err(GrantError::Validation { .. })
        ));
        assert!(matches!(
            iss.issue("u1", "datasets", "", None),
            Err(GrantError::Validation { .. })
        ));
    }

    #[test]
    fn test_policy_denial_is_access_denied() {
        let iss =
            TokenIssuer::new(&test_auth_config(), Arc::new(PrefixOwnershipPolicy)).unwrap();
        // u1 may not mint for u2's subtree.
        assert!(matches!(
            iss.issue("u1", "datasets", "u2/s1/file.jpg", None),
            Err(GrantError::AccessDenied)
        ));
        // But may mint for its own.
        assert!(iss.issue("u1", "datasets", "u1/s1/file.jpg", None).is_ok());
    }

    // -- expiry and clock tolerance --

    #[test]
    fn test_expired_token_rejected() {
        let now = Utc::now().timestamp();
        let mut claims = base_claims();
        // Expired 301 seconds ago: outside the 60s leeway.
        claims.iat = now - 601;
        claims.exp = now - 301;
        let token = sign_raw(&claims);
        assert!(matches!(
            verifier().verify(&token),
            Err(VerifyError::Jwt(_))
        ));
    }

    #[test]
    fn test_recently_expired_within_leeway_accepted() {
        let now = Utc::now().timestamp();
        let mut claims = base_claims();
        claims.iat = now - 330;
        claims.exp = now - 30;
        let token = sign_raw(&claims);
        assert!(verifier().verify(&token).is_ok());
    }

    #[test]
    fn test_future_iat_within_tolerance_accepted() {
        let now = Utc::now().timestamp();
        let mut claims = base_claims();
        claims.iat = now + 30;
        claims.exp = now + 330;
        let token = sign_raw(&claims);
        assert!(verifier().verify(&token).is_ok());
    }

    #[test]
    fn test_future_iat_beyond_tolerance_rejected() {
        let now = Utc::now().timestamp();
        let mut claims = base_claims();
        claims.iat = now + 120;
        claims.exp = now + 420;
        let token = sign_raw(&claims);
        assert!(matches!(
            verifier().verify(&token),
            Err(VerifyError::IssuedInFuture)
        ));
    }

    // -- tamper and binding --

    #[test]
    fn test_tampered_token_rejected() {
        let issued = issuer()
            .issue("u1", "datasets", "u1/s1/file.jpg", Some(300))
            .unwrap();
        let verifier = verifier();

        // Flip one character in each segment of the compact form.
        let token = issued.token;
        for segment in 0..3 {
            let mut parts: Vec<String> =
                token.split('.').map(|s| s.to_string()).collect();
            let mut chars: Vec<char> = parts[segment].chars().collect();
            chars[0] = if chars[0] == 'A' { 'B' } else { 'A' };
            parts[segment] = chars.into_iter().collect();
            let tampered = parts.join(".");
            assert!(
                verifier.verify(&tampered).is_err(),
                "tampered segment {segment} was accepted"
            );
        }
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let mut claims = base_claims();
        claims.iss = "urn:other:issuer".to_string();
        let token = sign_raw(&claims);
        assert!(verifier().verify(&token).is_err());
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let mut claims = base_claims();
        claims.aud = "urn:other:audience".to_string();
        let token = sign_raw(&claims);
        assert!(verifier().verify(&token).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let other = AuthConfig {
            jwt_secret: "00112233445566778899aabbccddeeff".to_string(),
            ..AuthConfig::default()
        };
        let foreign_issuer = TokenIssuer::new(&other, Arc::new(AllowAll)).unwrap();
        let issued = foreign_issuer
            .issue("u1", "datasets", "u1/f", None)
            .unwrap();
        assert!(verifier().verify(&issued.token).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        assert!(verifier().verify("not.a.jwt").is_err());
        assert!(verifier().verify("").is_err());
    }
}
