use thiserror::Error;

#[derive(Debug, Error)]
pub enum TypeError {
    #[error("invalid hash: {0}")]
    InvalidHash(String),
}
