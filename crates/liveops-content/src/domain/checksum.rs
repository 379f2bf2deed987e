//! Manifest checksums.

use sha2::{Digest, Sha256};

/// Lower-case hex SHA-256 of the manifest's canonical JSON encoding.
///
/// `serde_json` objects keep their keys sorted, so two manifests with the
/// same content hash the same regardless of how they were built.
#[must_use]
pub fn manifest_checksum(manifest: &serde_json::Value) -> String {
    let canonical = manifest.to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
