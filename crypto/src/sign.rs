//! ECDSA signing and verification over secp256k1.
//!
//! Signatures travel as base64 over their DER encoding. The signed message
//! is hashed with SHA-256 inside the ECDSA primitive, so callers pass the
//! raw message bytes (for transactions, the ASCII hex of the transaction
//! hash).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::Signature;

use ember_types::Address;

use crate::error::CryptoError;
use crate::keys::{decode_address, Keypair};

/// Sign a message, returning the base64-encoded DER signature.
pub fn sign_message(message: &[u8], keypair: &Keypair) -> String {
    let signature: Signature = keypair.signing_key().sign(message);
    BASE64.encode(signature.to_der().as_bytes())
}

/// Verify a base64/DER signature against a message and the signer's address.
///
/// Returns `false` for any malformed address, malformed signature, or
/// signature mismatch; callers treat all three the same way.
pub fn verify_signature(message: &[u8], signature_b64: &str, address: &Address) -> bool {
    let Ok(verifying) = decode_address(address) else {
        return false;
    };
    let Ok(der) = BASE64.decode(signature_b64) else {
        return false;
    };
    let Ok(signature) = Signature::from_der(&der) else {
        return false;
    };
    verifying.verify(message, &signature).is_ok()
}

/// Strict variant used where a diagnostic matters more than a boolean.
pub fn check_signature(
    message: &[u8],
    signature_b64: &str,
    address: &Address,
) -> Result<(), CryptoError> {
    let verifying = decode_address(address)?;
    let der = BASE64
        .decode(signature_b64)
        .map_err(|e| CryptoError::InvalidSignature(format!("not base64: {e}")))?;
    let signature = Signature::from_der(&der)
        .map_err(|e| CryptoError::InvalidSignature(format!("not DER: {e}")))?;
    verifying
        .verify(message, &signature)
        .map_err(|_| CryptoError::SignatureMismatch)
}
