//! The block and chain model: hashing, linkage, and the validation rules
//! every accepted mutation must satisfy.

mod block;
mod chain;
mod error;

pub use block::{Block, BlockData};
pub use chain::Blockchain;
pub use error::ChainError;
