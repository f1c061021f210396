//! Chain RPC adapter boundary
//!
//! Each chain's node is reachable through an external adapter implementing
//! [`ChainRpc`]; the wire protocol behind it (JSON-RPC, command pipe, ...)
//! is not the engine's concern. Transient failures are retried with bounded
//! exponential backoff inside the connector layer.

use crate::error::{Result, XBridgeError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::warn;

/// A spendable output of the local wallet on one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    pub amount: u64,
    pub address: String,
}

/// Node-side operations the wallet connectors are built on.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    async fn block_count(&self) -> Result<u64>;

    /// Median time of recent blocks, unix seconds; the chain-side clock all
    /// lock times are computed against.
    async fn median_time(&self) -> Result<u64>;

    async fn list_unspent(&self) -> Result<Vec<Utxo>>;

    /// Broadcast a raw transaction, returning its txid.
    async fn send_raw_transaction(&self, raw: &str) -> Result<String>;

    /// Confirmation count for a txid; `None` when unknown to the chain.
    async fn confirmations(&self, txid: &str) -> Result<Option<u32>>;

    /// Raw form of a transaction by id; `None` when unknown.
    async fn raw_transaction(&self, txid: &str) -> Result<Option<String>>;
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub timeout: Duration,
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(6_000),
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            jitter_ms: 250,
        }
    }
}

/// Run an RPC call with per-attempt timeout and exponential backoff.
///
/// Only transient errors are retried; protocol-level failures propagate on
/// the first attempt.
pub async fn retry_rpc<T, F, Fut>(label: &'static str, config: &RetryConfig, mut action: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let attempts = config.max_retries.saturating_add(1);
    for attempt in 0..attempts {
        let outcome = timeout(config.timeout, action()).await;
        match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => {
                if !err.is_transient() || attempt + 1 >= attempts {
                    return Err(err);
                }
                warn!(attempt = attempt + 1, error = %err, "RPC error on {label}; retrying");
            }
            Err(_) => {
                if attempt + 1 >= attempts {
                    return Err(XBridgeError::Rpc(format!("timeout calling {}", label)));
                }
                warn!(attempt = attempt + 1, "RPC timeout on {label}; retrying");
            }
        }

        let backoff = config
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt as u32));
        let capped = std::cmp::min(backoff, config.max_delay);
        let jitter = if config.jitter_ms == 0 {
            Duration::from_millis(0)
        } else {
            use rand::Rng;
            Duration::from_millis(rand::thread_rng().gen_range(0..=config.jitter_ms))
        };
        sleep(capped + jitter).await;
    }

    Err(XBridgeError::Rpc(format!("retries exhausted for {}", label)))
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_config(max_retries: usize) -> RetryConfig {
        RetryConfig {
            timeout: Duration::from_millis(50),
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            jitter_ms: 0,
        }
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let result = retry_rpc("test", &fast_config(2), move || {
            let calls = calls_clone.clone();
            async move {
                let current = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if current < 3 {
                    Err(XBridgeError::Rpc("connection refused".to_string()))
                } else {
                    Ok(42u64)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let result: Result<u64> = retry_rpc("fatal", &fast_config(3), move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(XBridgeError::ProtocolViolation("bad state".to_string()))
            }
        })
        .await;
        assert!(matches!(result, Err(XBridgeError::ProtocolViolation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn times_out_and_exhausts_retries() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let config = RetryConfig {
            timeout: Duration::from_millis(5),
            ..fast_config(1)
        };
        let result: Result<()> = retry_rpc("slow", &config, move || {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_millis(20)).await;
                Ok(())
            }
        })
        .await;
        assert!(matches!(result, Err(XBridgeError::Rpc(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
