//! SHA-256 hashing for blocks and transactions.

use ember_types::Hash;
use sha2::{Digest, Sha256};

/// Compute the SHA-256 digest of arbitrary data.
pub fn sha256(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    Hash::new(output)
}

/// Hash multiple byte slices in sequence (avoids concatenation allocation).
pub fn sha256_multi(parts: &[&[u8]]) -> Hash {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    Hash::new(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // NIST test vector for "abc".
        let h = sha256(b"abc");
        assert_eq!(
            h.to_string(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn deterministic() {
        assert_eq!(sha256(b"ember"), sha256(b"ember"));
        assert_ne!(sha256(b"ember"), sha256(b"embers"));
    }

    #[test]
    fn multi_equivalent_to_concatenation() {
        assert_eq!(sha256(b"helloworld"), sha256_multi(&[b"hello", b"world"]));
    }

    #[test]
    fn empty_input_is_not_zero() {
        assert!(!sha256(b"").is_zero());
    }
}
