//! secp256k1 key generation and the DER/base64 address codec.
//!
//! An address is the base64 of the SPKI DER encoding of a public key.
//! The historical raw (non-DER) encoding some old wallets produced is not
//! accepted; decoding rejects anything that is not a well-formed SPKI
//! document.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use k256::ecdsa::{SigningKey, VerifyingKey};
use k256::pkcs8::{DecodePublicKey, EncodePublicKey};
use rand::rngs::OsRng;

use ember_types::Address;

use crate::error::CryptoError;

/// A secp256k1 signing/verifying key pair.
#[derive(Clone)]
pub struct Keypair {
    signing: SigningKey,
    verifying: VerifyingKey,
}

impl Keypair {
    /// Generate a fresh key pair from the OS random source.
    pub fn generate() -> Self {
        let signing = SigningKey::random(&mut OsRng);
        let verifying = VerifyingKey::from(&signing);
        Self { signing, verifying }
    }

    /// Rebuild a key pair from a raw 32-byte secret scalar.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let signing =
            SigningKey::from_slice(bytes).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let verifying = VerifyingKey::from(&signing);
        Ok(Self { signing, verifying })
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying
    }

    /// The wallet address for this key pair.
    pub fn address(&self) -> Address {
        encode_address(&self.verifying)
    }
}

/// Encode a verifying key as a wallet address (base64 over SPKI DER).
pub fn encode_address(key: &VerifyingKey) -> Address {
    let der = key
        .to_public_key_der()
        .expect("secp256k1 public keys always encode to DER");
    Address::new(BASE64.encode(der.as_bytes()))
}

/// Decode a wallet address back into a verifying key.
pub fn decode_address(address: &Address) -> Result<VerifyingKey, CryptoError> {
    let der = BASE64
        .decode(address.as_str())
        .map_err(|e| CryptoError::InvalidKey(format!("address is not base64: {e}")))?;
    VerifyingKey::from_public_key_der(&der)
        .map_err(|e| CryptoError::InvalidKey(format!("address is not DER SPKI: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_roundtrip() {
        let kp = Keypair::generate();
        let addr = kp.address();
        let decoded = decode_address(&addr).unwrap();
        assert_eq!(&decoded, kp.verifying_key());
    }

    #[test]
    fn distinct_keypairs_have_distinct_addresses() {
        let a = Keypair::generate();
        let b = Keypair::generate();
        assert_ne!(a.address(), b.address());
    }

    #[test]
    fn deterministic_from_secret() {
        let kp1 = Keypair::from_secret_bytes(&[7u8; 32]).unwrap();
        let kp2 = Keypair::from_secret_bytes(&[7u8; 32]).unwrap();
        assert_eq!(kp1.address(), kp2.address());
    }

    #[test]
    fn rejects_non_der_address() {
        // Valid base64, but not an SPKI document.
        let raw = Address::new(BASE64.encode(b"not a der key"));
        assert!(decode_address(&raw).is_err());
    }

    #[test]
    fn rejects_non_base64_address() {
        assert!(decode_address(&Address::new("%%%not-base64%%%")).is_err());
    }
}
