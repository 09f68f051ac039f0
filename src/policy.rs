//! Caller authorization for token issuance.
//!
//! The issuer refuses to sign a token unless an [`AccessPolicy`] has
//! approved the (subject, bucket, key) binding.  The policy is a
//! required constructor argument of the issuer, so no call site can
//! skip the check.

/// Decides whether a subject may be granted access to one object.
///
/// `subject` is the already-authenticated caller identity forwarded by
/// the trusted application backend; this layer performs authorization
/// only, never authentication.
pub trait AccessPolicy: Send + Sync + 'static {
    /// Return true if `subject` may receive a token for `key` in
    /// `bucket`.
    fn authorize(&self, subject: &str, bucket: &str, key: &str) -> bool;
}

/// Grants access to keys living under the subject's own prefix.
///
/// Object keys are laid out as `{subject}/{...}`, so ownership is
/// established by the first path segment.  A subject can only mint
/// tokens for its own subtree, in any bucket.
#[derive(Debug, Default)]
pub struct PrefixOwnershipPolicy;

impl AccessPolicy for PrefixOwnershipPolicy {
    fn authorize(&self, subject: &str, _bucket: &str, key: &str) -> bool {
        if subject.is_empty() || subject.contains('/') {
            return false;
        }
        match key.split_once('/') {
            Some((first, rest)) => first == subject && !rest.is_empty(),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_prefix_allowed() {
        let policy = PrefixOwnershipPolicy;
        assert!(policy.authorize("u1", "datasets", "u1/s1/file.jpg"));
        assert!(policy.authorize("u1", "images", "u1/avatar.png"));
    }

    #[test]
    fn test_foreign_prefix_denied() {
        let policy = PrefixOwnershipPolicy;
        assert!(!policy.authorize("u1", "datasets", "u2/s1/file.jpg"));
    }

    #[test]
    fn test_prefix_must_be_exact_segment() {
        let policy = PrefixOwnershipPolicy;
        // "u12/..." must not match subject "u1".
        assert!(!policy.authorize("u1", "datasets", "u12/file.jpg"));
    }

    #[test]
    fn test_degenerate_keys_denied() {
        let policy = PrefixOwnershipPolicy;
        assert!(!policy.authorize("u1", "datasets", "u1"));
        assert!(!policy.authorize("u1", "datasets", "u1/"));
        assert!(!policy.authorize("u1", "datasets", ""));
    }

    #[test]
    fn test_degenerate_subjects_denied() {
        let policy = PrefixOwnershipPolicy;
        assert!(!policy.authorize("", "datasets", "u1/file.jpg"));
        assert!(!policy.authorize("u1/s1", "datasets", "u1/s1/file.jpg"));
    }
}
