//! Deterministic bucketing of subjects.
//!
//! A subject is mapped into `[0, 1)` by hashing it together with a namespace
//! (a test id, a content version id). The same pair always lands in the same
//! place, independent of what else has been hashed, so no per-subject
//! assignment table is needed.

use sha2::{Digest, Sha256};

/// Hashes `(namespace, subject)` into the unit interval `[0, 1)`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn unit_interval(namespace: &str, subject: &str) -> f64 {
    let mut hasher = Sha256::new();
    hasher.update(namespace.as_bytes());
    hasher.update([0x1f]);
    hasher.update(subject.as_bytes());
    let digest = hasher.finalize();

    let mut prefix = [0_u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    // Keep 53 bits so the quotient is exact in an f64 and strictly below 1.
    let bits = u64::from_be_bytes(prefix) >> 11;
    bits as f64 / (1_u64 << 53) as f64
}

/// Hashes `(namespace, subject)` into a percentage bucket `0..100`.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn percent_bucket(namespace: &str, subject: &str) -> u8 {
    (unit_interval(namespace, subject) * 100.0).floor() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_interval_is_deterministic() {
        let a = unit_interval("test-1", "player-42");
        let b = unit_interval("test-1", "player-42");

        assert!((a - b).abs() < f64::EPSILON);
        assert!((0.0..1.0).contains(&a));
    }

    #[test]
    fn test_namespace_changes_bucket() {
        let hits = (0..200)
            .filter(|i| {
                let subject = format!("player-{i}");
                (unit_interval("test-a", &subject) - unit_interval("test-b", &subject)).abs()
                    > f64::EPSILON
            })
            .count();

        assert!(hits > 190);
    }

    #[test]
    fn test_percent_bucket_is_roughly_uniform() {
        let below_half = (0..10_000)
            .filter(|i| percent_bucket("rollout", &format!("p{i}")) < 50)
            .count();

        assert!((4_500..5_500).contains(&below_half), "got {below_half}");
    }
}
