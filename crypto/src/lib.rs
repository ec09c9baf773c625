//! Cryptographic primitives: SHA-256 hashing and secp256k1 ECDSA over
//! DER-encoded keys.

mod error;
mod hash;
mod keys;
mod sign;

pub use error::CryptoError;
pub use hash::{sha256, sha256_multi};
pub use keys::{decode_address, encode_address, Keypair};
pub use sign::{check_signature, sign_message, verify_signature};
