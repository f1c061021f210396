//! End-to-end swap flows driven through the exchange coordinator

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use xbridge::crypto::{sha256, BtcCryptoProvider};
use xbridge::error::Result;
use xbridge::rpc::{ChainRpc, Utxo};
use xbridge::wallet::{encode_address, BtcWalletConnector, ChainParams};
use xbridge::{
    Exchange, ExchangeConfig, LocalTransport, OrderState, OrderStore, XBridgeError,
};

const MEDIAN: u64 = 1_700_000_000;

#[derive(Default)]
struct ChainState {
    median_time: u64,
    unspent: Vec<Utxo>,
    broadcast: Vec<(String, String)>,
    confirmations: HashMap<String, u32>,
}

/// In-memory chain double standing in for a node RPC adapter.
struct TestChain {
    state: Mutex<ChainState>,
}

impl TestChain {
    fn new(median_time: u64, unspent: Vec<Utxo>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ChainState {
                median_time,
                unspent,
                ..ChainState::default()
            }),
        })
    }

    fn set_median_time(&self, median_time: u64) {
        self.state.lock().unwrap().median_time = median_time;
    }

    fn confirm_all(&self, confirmations: u32) {
        let mut state = self.state.lock().unwrap();
        let txids: Vec<String> = state.broadcast.iter().map(|(t, _)| t.clone()).collect();
        for txid in txids {
            state.confirmations.insert(txid, confirmations);
        }
    }
}

#[async_trait]
impl ChainRpc for TestChain {
    async fn block_count(&self) -> Result<u64> {
        Ok(1_000)
    }

    async fn median_time(&self) -> Result<u64> {
        Ok(self.state.lock().unwrap().median_time)
    }

    async fn list_unspent(&self) -> Result<Vec<Utxo>> {
        Ok(self.state.lock().unwrap().unspent.clone())
    }

    async fn send_raw_transaction(&self, raw: &str) -> Result<String> {
        let bytes =
            hex::decode(raw).map_err(|e| XBridgeError::Rpc(format!("bad raw tx: {}", e)))?;
        let txid = hex::encode(sha256(&sha256(&bytes)));
        let mut state = self.state.lock().unwrap();
        state.broadcast.push((txid.clone(), raw.to_string()));
        state.confirmations.entry(txid.clone()).or_insert(0);
        Ok(txid)
    }

    async fn confirmations(&self, txid: &str) -> Result<Option<u32>> {
        Ok(self.state.lock().unwrap().confirmations.get(txid).copied())
    }

    async fn raw_transaction(&self, txid: &str) -> Result<Option<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .broadcast
            .iter()
            .find(|(t, _)| t == txid)
            .map(|(_, raw)| raw.clone()))
    }
}

fn wallet_funds() -> Vec<Utxo> {
    vec![Utxo {
        txid: "aa".repeat(32),
        vout: 0,
        amount: 600_000_000,
        address: encode_address(0x3c, &[1u8; 20]),
    }]
}

/// Chain A carries the maker deposit with a 48h window; chain B carries the
/// taker deposit with a 24h window.
fn chain_a_params() -> ChainParams {
    let mut params = ChainParams::new("ACOIN", 6, 600);
    params.maker_lock_target_secs = 48 * 3600;
    params
}

fn chain_b_params() -> ChainParams {
    let mut params = ChainParams::new("BCOIN", 6, 600);
    // block time 600 puts this chain on the slow-taker window
    params.slow_taker_lock_target_secs = 24 * 3600;
    params
}

struct Setup {
    exchange: Arc<Exchange>,
    chain_a: Arc<TestChain>,
    chain_b: Arc<TestChain>,
    store: Arc<OrderStore>,
}

async fn setup() -> Setup {
    let suffix: u64 = rand::random();
    let path = std::env::temp_dir().join(format!("xbridge-flow-{:016x}.dat", suffix));
    let store = Arc::new(OrderStore::with_interval(path, Duration::from_secs(0)));

    let chain_a = TestChain::new(MEDIAN, wallet_funds());
    let chain_b = TestChain::new(MEDIAN, wallet_funds());

    let mut config = ExchangeConfig::new(3_600);
    config.tick_interval = Duration::from_millis(10);

    let exchange = Arc::new(Exchange::new(
        config,
        store.clone(),
        Arc::new(LocalTransport::default()),
    ));
    exchange
        .register_connector(Arc::new(BtcWalletConnector::new(
            chain_a_params(),
            BtcCryptoProvider::new(),
            chain_a.clone(),
        )))
        .await
        .unwrap();
    exchange
        .register_connector(Arc::new(BtcWalletConnector::new(
            chain_b_params(),
            BtcCryptoProvider::new(),
            chain_b.clone(),
        )))
        .await
        .unwrap();

    Setup {
        exchange,
        chain_a,
        chain_b,
        store,
    }
}

#[tokio::test]
async fn matched_orders_swap_to_completion() {
    let s = setup().await;

    // 10 A for 5 B, against its mirror image
    let maker_order = s
        .exchange
        .submit_order(vec![1u8; 32], "ACOIN", 10_000_000, "BCOIN", 5_000_000)
        .await
        .unwrap();
    assert_eq!(maker_order.state, OrderState::Created);

    let matched = s
        .exchange
        .submit_order(vec![2u8; 32], "BCOIN", 5_000_000, "ACOIN", 10_000_000)
        .await
        .unwrap();
    assert_eq!(matched.id, maker_order.id);
    assert_eq!(matched.state, OrderState::Accepted);

    // maker leg locks on chain A
    s.exchange.tick().await;
    let order = s.exchange.get_order(maker_order.id).await.unwrap();
    assert_eq!(order.state, OrderState::Initialized);
    assert_eq!(order.maker_lock_time, MEDIAN + 48 * 3600);
    assert!(order.maker_deposit_txid.is_some());

    // taker leg locks on chain B once the maker deposit confirms
    s.chain_a.confirm_all(1);
    s.exchange.tick().await;
    let order = s.exchange.get_order(maker_order.id).await.unwrap();
    assert_eq!(order.state, OrderState::ExchangeInitialized);
    assert_eq!(order.taker_lock_time, MEDIAN + 24 * 3600);
    assert!(order.taker_deposit_txid.is_some());

    // taker claims the maker deposit, revealing the secret
    s.chain_b.confirm_all(1);
    s.exchange.tick().await;
    let order = s.exchange.get_order(maker_order.id).await.unwrap();
    assert_eq!(order.state, OrderState::Exchanged);
    assert!(order.taker_claim_txid.is_some());

    // maker redeems the taker deposit with the observed secret
    s.exchange.tick().await;
    let order = s.exchange.get_order(maker_order.id).await.unwrap();
    assert_eq!(order.state, OrderState::Finished);
    assert!(order.maker_claim_txid.is_some());
    assert_eq!(order.reason, None);

    // the snapshot on disk reflects the finished swap
    let persisted = s.store.read().unwrap();
    assert_eq!(
        persisted.get(&maker_order.id).map(|o| o.state),
        Some(OrderState::Finished)
    );

    let _ = std::fs::remove_file(s.store.path());
}

#[tokio::test]
async fn stalled_taker_leg_rolls_back_the_maker_deposit() {
    let s = setup().await;

    let maker_order = s
        .exchange
        .submit_order(vec![1u8; 32], "ACOIN", 10_000_000, "BCOIN", 5_000_000)
        .await
        .unwrap();
    let matched = s
        .exchange
        .submit_order(vec![2u8; 32], "BCOIN", 5_000_000, "ACOIN", 10_000_000)
        .await
        .unwrap();
    assert_eq!(matched.id, maker_order.id);

    s.exchange.tick().await;
    assert_eq!(
        s.exchange.get_order(maker_order.id).await.unwrap().state,
        OrderState::Initialized
    );

    // chain B's clock has drifted so far that the taker window would end
    // inside the safety margin; the session refuses to fund the taker leg
    s.chain_b.set_median_time(MEDIAN + 24 * 3600);
    s.chain_a.confirm_all(1);
    s.exchange.tick().await;
    let order = s.exchange.get_order(maker_order.id).await.unwrap();
    assert_eq!(order.state, OrderState::Initialized);
    assert!(order.taker_deposit_txid.is_none());

    // once the maker lock time expires the deposit is reclaimed
    s.chain_a.set_median_time(MEDIAN + 48 * 3600);
    s.exchange.tick().await;
    let order = s.exchange.get_order(maker_order.id).await.unwrap();
    assert_eq!(order.state, OrderState::RolledBack);
    assert!(order.maker_refund_txid.is_some());
    assert!(order.taker_deposit_txid.is_none());
    assert!(order.reason.is_some());

    let _ = std::fs::remove_file(s.store.path());
}
