// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Content-digest hashing used by the Spec Cache to detect an on-disk
//! workflow definition changing underneath a cached parse (§4.3).

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest of raw file bytes.
pub fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_changes_with_content() {
        let a = content_digest(b"hello");
        let b = content_digest(b"hello world");
        assert_ne!(a, b);
        assert_eq!(a, content_digest(b"hello"));
    }
}
