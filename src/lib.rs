//! # XBridge
//!
//! A cross-chain atomic trading engine: two parties, each controlling funds
//! on a different blockchain, exchange value without a trusted intermediary
//! using hash/time-locked contracts.
//!
//! ## Overview
//!
//! Orders are announced over a transport seam, matched FIFO by the
//! [`Exchange`] coordinator, and each matched pair is driven through the
//! swap protocol by a [`session::SwapSession`]: the maker locks funds under
//! an HTLC on their chain, the taker mirrors it with a strictly shorter
//! lock time, the taker's claim reveals the secret, and the maker redeems
//! with it. The open-order book is snapshotted to disk with a debounced
//! write policy; terminal orders age into a SQLite archive.
//!
//! Per-chain transaction construction and signing live behind the
//! [`wallet::WalletConnector`] capability set, with the node RPC boundary
//! abstracted by [`rpc::ChainRpc`].
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use xbridge::{Exchange, ExchangeConfig, LocalTransport, OrderStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(OrderStore::new("orders.dat"));
//!     let transport = Arc::new(LocalTransport::default());
//!     let exchange = Arc::new(Exchange::new(
//!         ExchangeConfig::new(900), // lock-time safety margin, seconds
//!         store.clone(),
//!         transport,
//!     ));
//!
//!     // register one WalletConnector per tradeable chain here, then:
//!     exchange.restore(store.read()?).await;
//!     exchange.run().await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod exchange;
pub mod order;
pub mod rpc;
pub mod session;
pub mod store;
pub mod transport;
pub mod types;
pub mod wallet;

pub use api::AppState;
pub use config::Config;
pub use db::Database;
pub use error::{Result, XBridgeError};
pub use exchange::{Exchange, ExchangeConfig};
pub use order::{FailureReason, Order, OrderId, OrderState};
pub use session::{SessionConfig, SwapSession};
pub use store::OrderStore;
pub use transport::{LocalTransport, Transport};
pub use types::{Asset, CurrencyPair};
pub use wallet::{BchWalletConnector, BtcWalletConnector, WalletConnector};
