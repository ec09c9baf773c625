use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("failed to bind HTTP listener: {0}")]
    Bind(String),

    #[error("HTTP server error: {0}")]
    Serve(String),
}
