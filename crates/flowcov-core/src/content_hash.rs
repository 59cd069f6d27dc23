//! Content fingerprints for test-script files.
//!
//! The batch run cache is keyed by the SHA-256 of a script's raw bytes,
//! so any byte-level edit invalidates the cache on the next run. Hashing
//! reads the file as-is (no newline normalization) and is independent of
//! modification time, so fingerprints agree across platforms and checkouts.
//!
//! Known limitation: only the top-level script file is hashed. Scripts
//! pulled in via `runFlow` includes do not contribute to the fingerprint,
//! so editing a shared sub-script does not invalidate cached runs of its
//! parents. Force a full run after editing an included file.

use std::path::Path;

use sha2::{Digest, Sha256};

use flowcov_error::FlowcovResult;

/// Hash a file's raw bytes to a lowercase hex SHA-256 string.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be read. Batch callers treat
/// this as a hard failure for the affected scenario rather than a silent
/// cache miss.
pub fn hash_file(path: &Path) -> FlowcovResult<String> {
    let bytes = std::fs::read(path)?;
    Ok(hash_bytes(&bytes))
}

/// Hash a byte slice to a lowercase hex SHA-256 string.
#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_known_vector_empty_input() {
        assert_eq!(
            hash_bytes(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_file_hash_matches_byte_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.yaml");
        std::fs::write(&path, b"appId: demo\n---\n- launchApp\n").unwrap();
        assert_eq!(
            hash_file(&path).unwrap(),
            hash_bytes(b"appId: demo\n---\n- launchApp\n")
        );
    }

    #[test]
    fn test_single_byte_change_changes_hash() {
        assert_ne!(hash_bytes(b"tapOn: start"), hash_bytes(b"tapOn: starT"));
    }

    #[test]
    fn test_unreadable_file_is_an_error() {
        let missing = Path::new("/nonexistent/flowcov/flow.yaml");
        assert!(hash_file(missing).is_err());
    }

    proptest! {
        #[test]
        fn prop_hex_output_shape(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let hex = hash_bytes(&bytes);
            prop_assert_eq!(hex.len(), 64);
            prop_assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }

        #[test]
        fn prop_deterministic(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            prop_assert_eq!(hash_bytes(&bytes), hash_bytes(&bytes));
        }
    }
}
