use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to bind {0}")]
    Bind(String),

    #[error("chain error: {0}")]
    Chain(#[from] ember_ledger::ChainError),

    #[error("network error: {0}")]
    Network(#[from] ember_network::NetworkError),

    #[error("RPC server error: {0}")]
    Rpc(#[from] ember_rpc::RpcError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
