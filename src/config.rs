use crate::error::XBridgeError;
use crate::exchange::ExchangeConfig;
use crate::wallet::ChainParams;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server host (default: 0.0.0.0)
    pub host: String,

    /// HTTP server port (default: 3000)
    pub port: u16,

    /// Archive database URL (default: sqlite://xbridge.db)
    pub database_url: String,

    /// Log level (default: info)
    pub log_level: String,

    /// CORS allowed origins (comma-separated)
    pub cors_origins: Vec<String>,

    /// Order book snapshot file (default: orders.dat)
    pub snapshot_path: String,

    /// Debounce interval for snapshot writes (default: 30)
    pub save_interval_secs: u64,

    /// Coordinator tick cadence (default: 60)
    pub tick_interval_secs: u64,

    /// Terminal-order retention before archival (default: 900)
    pub retention_secs: u64,

    /// Required gap between taker and maker lock times. No default; the
    /// engine refuses to start without it.
    pub safety_margin_secs: u64,

    /// Counter-order amount tolerance in basis points (default: 0)
    pub amount_tolerance_bps: u64,

    /// Bounded retries for transient signing failures (default: 3)
    pub sign_retry_limit: u32,

    /// Chains configuration (JSON array)
    pub chains: Vec<ChainParams>,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, XBridgeError> {
        dotenvy::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|e| XBridgeError::Other(anyhow::anyhow!("Invalid PORT: {}", e)))?;

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://xbridge.db".to_string());

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let snapshot_path = env::var("SNAPSHOT_PATH").unwrap_or_else(|_| "orders.dat".to_string());

        let save_interval_secs = env::var("SAVE_INTERVAL_SECS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .map_err(|e| XBridgeError::Other(anyhow::anyhow!("Invalid SAVE_INTERVAL_SECS: {}", e)))?;

        let tick_interval_secs = env::var("TICK_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".to_string())
            .parse()
            .map_err(|e| XBridgeError::Other(anyhow::anyhow!("Invalid TICK_INTERVAL_SECS: {}", e)))?;

        let retention_secs = env::var("RETENTION_SECS")
            .unwrap_or_else(|_| "900".to_string())
            .parse()
            .map_err(|e| XBridgeError::Other(anyhow::anyhow!("Invalid RETENTION_SECS: {}", e)))?;

        // the lock-time safety margin is deliberately not defaulted
        let safety_margin_secs = env::var("SAFETY_MARGIN_SECS")
            .map_err(|_| {
                XBridgeError::Other(anyhow::anyhow!(
                    "SAFETY_MARGIN_SECS environment variable is required"
                ))
            })?
            .parse()
            .map_err(|e| {
                XBridgeError::Other(anyhow::anyhow!("Invalid SAFETY_MARGIN_SECS: {}", e))
            })?;

        let amount_tolerance_bps = env::var("AMOUNT_TOLERANCE_BPS")
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .map_err(|e| {
                XBridgeError::Other(anyhow::anyhow!("Invalid AMOUNT_TOLERANCE_BPS: {}", e))
            })?;

        let sign_retry_limit = env::var("SIGN_RETRY_LIMIT")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .map_err(|e| XBridgeError::Other(anyhow::anyhow!("Invalid SIGN_RETRY_LIMIT: {}", e)))?;

        // Parse chains from JSON array
        let chains_json = env::var("CHAINS").map_err(|_| {
            XBridgeError::Other(anyhow::anyhow!("CHAINS environment variable is required"))
        })?;

        let chains: Vec<ChainParams> = serde_json::from_str(&chains_json)
            .map_err(|e| XBridgeError::Other(anyhow::anyhow!("Invalid CHAINS JSON: {}", e)))?;

        if chains.is_empty() {
            return Err(XBridgeError::Other(anyhow::anyhow!(
                "At least one chain must be configured"
            )));
        }
        for chain in &chains {
            if chain.block_time_secs == 0 {
                return Err(XBridgeError::Other(anyhow::anyhow!(
                    "Chain {} has a zero block time",
                    chain.symbol
                )));
            }
        }

        Ok(Config {
            host,
            port,
            database_url,
            log_level,
            cors_origins,
            snapshot_path,
            save_interval_secs,
            tick_interval_secs,
            retention_secs,
            safety_margin_secs,
            amount_tolerance_bps,
            sign_retry_limit,
            chains,
        })
    }

    /// Get server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Coordinator configuration derived from the service settings.
    pub fn exchange_config(&self) -> ExchangeConfig {
        let mut config = ExchangeConfig::new(self.safety_margin_secs);
        config.amount_tolerance_bps = self.amount_tolerance_bps;
        config.sign_retry_limit = self.sign_retry_limit;
        config.tick_interval = Duration::from_secs(self.tick_interval_secs);
        config.retention = Duration::from_secs(self.retention_secs);
        config
    }
}
