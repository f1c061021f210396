//! Error types for the XBridge engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, XBridgeError>;

#[derive(Error, Debug)]
pub enum XBridgeError {
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Insufficient funds on {currency}: need {needed}, have {available}")]
    InsufficientFunds {
        currency: String,
        needed: u64,
        available: u64,
    },

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Snapshot persistence failed: {0}")]
    PersistenceFailure(String),

    #[error("Chain RPC error: {0}")]
    Rpc(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl XBridgeError {
    /// Transient errors may be retried; everything else fails closed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            XBridgeError::Rpc(_)
                | XBridgeError::SigningFailed(_)
                | XBridgeError::PersistenceFailure(_)
        )
    }
}
