//! Exchange coordinator
//!
//! Owns the live session set, admits and matches orders, runs the periodic
//! tick and relays announcements over the transport seam. Map-level locks
//! are held only to insert/remove/look up; chain RPC always happens outside
//! them, inside the sessions.

use crate::db::{Database, OrderRecord};
use crate::error::{Result, XBridgeError};
use crate::order::{FailureReason, Order, OrderId, OrderMap, OrderState};
use crate::session::{SessionConfig, SessionEvent, SessionEventKind, SwapSession};
use crate::store::OrderStore;
use crate::transport::{Transport, TransportMessage, TransportPayload};
use crate::types::Asset;
use crate::wallet::{WalletConnector, WalletKeys};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// Required gap between taker and maker lock times.
    pub safety_margin_secs: u64,
    /// Allowed relative mismatch between counter-order amounts, basis points.
    pub amount_tolerance_bps: u64,
    pub sign_retry_limit: u32,
    pub tick_interval: Duration,
    /// How long terminal orders stay in the active book before archival.
    pub retention: Duration,
}

impl ExchangeConfig {
    /// The safety margin has no sensible default; it is an explicit input.
    pub fn new(safety_margin_secs: u64) -> Self {
        Self {
            safety_margin_secs,
            amount_tolerance_bps: 0,
            sign_retry_limit: 3,
            tick_interval: Duration::from_secs(60),
            retention: Duration::from_secs(900),
        }
    }
}

pub struct Exchange {
    config: ExchangeConfig,
    assets: RwLock<HashMap<String, Arc<Asset>>>,
    connectors: RwLock<HashMap<String, Arc<dyn WalletConnector>>>,
    /// Unmatched orders plus retained terminal ones.
    book: RwLock<OrderMap>,
    /// Live sessions, keyed by both the maker and the taker order id.
    sessions: RwLock<HashMap<OrderId, Arc<SwapSession>>>,
    store: Arc<OrderStore>,
    archive: Option<Database>,
    transport: Arc<dyn Transport>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: Mutex<mpsc::UnboundedReceiver<SessionEvent>>,
}

impl Exchange {
    pub fn new(config: ExchangeConfig, store: Arc<OrderStore>, transport: Arc<dyn Transport>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            assets: RwLock::new(HashMap::new()),
            connectors: RwLock::new(HashMap::new()),
            book: RwLock::new(OrderMap::new()),
            sessions: RwLock::new(HashMap::new()),
            store,
            archive: None,
            transport,
            events_tx,
            events_rx: Mutex::new(events_rx),
        }
    }

    /// Attach the terminal-order archive.
    pub fn with_archive(mut self, archive: Database) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    /// Make a currency tradeable without a wallet connector yet; orders in
    /// it are admitted but cannot match into a session.
    pub async fn register_asset(&self, asset: Asset) {
        let symbol = asset.symbol().to_string();
        self.assets.write().await.insert(symbol, Arc::new(asset));
    }

    /// Register the wallet connector (and its asset) for one chain.
    pub async fn register_connector(&self, connector: Arc<dyn WalletConnector>) -> Result<()> {
        let params = connector.params();
        let asset = Asset::new(&params.symbol, params.precision)?;
        let symbol = asset.symbol().to_string();
        self.assets
            .write()
            .await
            .insert(symbol.clone(), Arc::new(asset));
        self.connectors.write().await.insert(symbol.clone(), connector);
        info!(chain = %symbol, "wallet connector registered");
        Ok(())
    }

    pub async fn asset(&self, symbol: &str) -> Option<Arc<Asset>> {
        self.assets.read().await.get(&symbol.to_uppercase()).cloned()
    }

    pub async fn assets(&self) -> Vec<Arc<Asset>> {
        self.assets.read().await.values().cloned().collect()
    }

    /// Announce a new order for the given trade.
    pub async fn submit_order(
        &self,
        maker_pubkey: Vec<u8>,
        from_symbol: &str,
        from_amount: u64,
        to_symbol: &str,
        to_amount: u64,
    ) -> Result<Order> {
        let order = Order::new(maker_pubkey, from_symbol, from_amount, to_symbol, to_amount);
        self.admit(order, true).await
    }

    /// Admit an order into the book, matching it against the first eligible
    /// counter-order by arrival time.
    async fn admit(&self, order: Order, announce: bool) -> Result<Order> {
        self.validate_order(&order).await?;

        if let Some(existing) = self.get_order(order.id).await {
            // replay of a known order (e.g. our own announcement echoed back)
            return Ok(existing);
        }

        match self.take_counter_order(&order).await {
            Some(counter) => match self.spawn_session(counter.clone(), order.clone()).await {
                Ok(session) => {
                    let snapshot = session.snapshot().await;
                    let _ = self
                        .transport
                        .publish(TransportPayload::OrderUpdate(snapshot.clone()))
                        .await;
                    Ok(snapshot)
                }
                Err(err) => {
                    // put the counter-order back for the next taker
                    self.book.write().await.insert(counter.id, counter);
                    Err(err)
                }
            },
            None => {
                self.book.write().await.insert(order.id, order.clone());
                if announce {
                    if let Err(err) = self
                        .transport
                        .publish(TransportPayload::OrderAnnouncement(order.clone()))
                        .await
                    {
                        warn!(order = %order.id, error = %err, "order announcement failed");
                    }
                }
                Ok(order)
            }
        }
    }

    /// Basic admission checks; rejected orders never reach the session map.
    async fn validate_order(&self, order: &Order) -> Result<()> {
        if order.state != OrderState::Created {
            return Err(XBridgeError::InvalidOrder(format!(
                "order {} announced in state {}",
                order.id, order.state
            )));
        }
        if order.from_amount == 0 || order.to_amount == 0 {
            return Err(XBridgeError::InvalidOrder(format!(
                "order {} has a zero amount",
                order.id
            )));
        }
        if order.from_symbol == order.to_symbol {
            return Err(XBridgeError::InvalidOrder(format!(
                "order {} quotes {} against itself",
                order.id, order.from_symbol
            )));
        }
        let assets = self.assets.read().await;
        for symbol in [&order.from_symbol, &order.to_symbol] {
            if !assets.contains_key(symbol) {
                return Err(XBridgeError::InvalidOrder(format!(
                    "order {} quotes unknown asset {}",
                    order.id, symbol
                )));
            }
        }
        Ok(())
    }

    fn amounts_compatible(&self, a: u64, b: u64) -> bool {
        let diff = a.abs_diff(b) as u128;
        diff * 10_000 <= self.config.amount_tolerance_bps as u128 * a.max(b) as u128
    }

    fn compatible(&self, counter: &Order, order: &Order) -> bool {
        counter.from_symbol == order.to_symbol
            && counter.to_symbol == order.from_symbol
            && self.amounts_compatible(counter.from_amount, order.to_amount)
            && self.amounts_compatible(counter.to_amount, order.from_amount)
    }

    /// Remove and return the first compatible counter-order (FIFO).
    async fn take_counter_order(&self, order: &Order) -> Option<Order> {
        let mut book = self.book.write().await;
        let id = book
            .values()
            .filter(|c| c.state == OrderState::Created && self.compatible(c, order))
            .min_by_key(|c| c.created_at)
            .map(|c| c.id)?;
        book.remove(&id)
    }

    async fn spawn_session(&self, maker_order: Order, taker_order: Order) -> Result<Arc<SwapSession>> {
        let (source, dest) = {
            let connectors = self.connectors.read().await;
            (
                connectors.get(&maker_order.from_symbol).cloned(),
                connectors.get(&maker_order.to_symbol).cloned(),
            )
        };
        let source =
            source.ok_or_else(|| XBridgeError::UnsupportedCurrency(maker_order.from_symbol.clone()))?;
        let dest =
            dest.ok_or_else(|| XBridgeError::UnsupportedCurrency(maker_order.to_symbol.clone()))?;

        // session-scoped swap keys; the deposit scripts commit to these
        let maker_keys = WalletKeys::generate(source.provider());
        let taker_keys = WalletKeys::generate(dest.provider());
        let taker_pubkey = taker_keys.pubkey.clone();

        let mut order = maker_order;
        order.maker_pubkey = maker_keys.pubkey.clone();

        let session = Arc::new(SwapSession::new(
            order,
            source,
            dest,
            maker_keys,
            taker_keys,
            SessionConfig {
                safety_margin_secs: self.config.safety_margin_secs,
                sign_retry_limit: self.config.sign_retry_limit,
            },
            self.events_tx.clone(),
        ));
        session.accept(taker_pubkey).await?;

        let mut sessions = self.sessions.write().await;
        sessions.insert(session.order_id(), session.clone());
        // the taker's order id resolves to the same swap
        sessions.insert(taker_order.id, session.clone());
        info!(
            maker = %session.order_id(),
            taker = %taker_order.id,
            "orders matched, swap session started"
        );
        Ok(session)
    }

    /// Withdraw an order; only possible before any funds are locked.
    pub async fn cancel_order(&self, id: OrderId) -> Result<Order> {
        if self.sessions.read().await.contains_key(&id) {
            return Err(XBridgeError::ProtocolViolation(format!(
                "order {}: cancellation is not available once a swap is in progress",
                id
            )));
        }

        let snapshot = {
            let mut book = self.book.write().await;
            let order = book
                .get_mut(&id)
                .ok_or_else(|| XBridgeError::OrderNotFound(id.to_string()))?;
            order.transition(OrderState::Cancelled, Some(FailureReason::UserRequested))?;
            order.clone()
        };

        info!(order = %id, "order cancelled");
        let _ = self
            .transport
            .publish(TransportPayload::OrderUpdate(snapshot.clone()))
            .await;
        Ok(snapshot)
    }

    pub async fn get_order(&self, id: OrderId) -> Option<Order> {
        let session = self.sessions.read().await.get(&id).cloned();
        if let Some(session) = session {
            return Some(session.snapshot().await);
        }
        self.book.read().await.get(&id).cloned()
    }

    /// The current open-order map: book plus live session snapshots.
    pub async fn orders_snapshot(&self) -> OrderMap {
        let mut map = self.book.read().await.clone();
        let sessions = self.unique_sessions().await;
        for session in sessions {
            let order = session.snapshot().await;
            map.insert(order.id, order);
        }
        map
    }

    pub async fn list_orders(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.orders_snapshot().await.into_values().collect();
        orders.sort_by_key(|o| o.created_at);
        orders
    }

    /// Re-seed the book from a snapshot at startup.
    pub async fn restore(&self, orders: OrderMap) {
        if orders.is_empty() {
            return;
        }
        info!(orders = orders.len(), "restoring order book snapshot");
        self.book.write().await.extend(orders);
    }

    async fn unique_sessions(&self) -> Vec<Arc<SwapSession>> {
        let sessions = self.sessions.read().await;
        let mut unique: HashMap<OrderId, Arc<SwapSession>> = HashMap::new();
        for session in sessions.values() {
            unique.entry(session.order_id()).or_insert_with(|| session.clone());
        }
        unique.into_values().collect()
    }

    /// One scheduler beat: advance sessions, retire terminal ones, relay
    /// events, archive expired orders and run the debounced snapshot write.
    pub async fn tick(&self) {
        let sessions = self.unique_sessions().await;
        for session in &sessions {
            match session.advance().await {
                Ok(Some(state)) => {
                    debug!(order = %session.order_id(), state = %state, "session advanced")
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(order = %session.order_id(), error = %err, "session advance failed")
                }
            }
        }

        // retire terminal sessions into the book
        for session in &sessions {
            let order = session.snapshot().await;
            if order.is_terminal() {
                self.book.write().await.insert(order.id, order);
                self.sessions
                    .write()
                    .await
                    .retain(|_, s| !Arc::ptr_eq(s, session));
            }
        }

        self.relay_events().await;
        self.archive_expired().await;
        self.persist(false).await;
    }

    async fn relay_events(&self) {
        let mut rx = self.events_rx.lock().await;
        while let Ok(event) = rx.try_recv() {
            match event.kind {
                SessionEventKind::StateChanged { .. } => {
                    if let Some(order) = self.get_order(event.order_id).await {
                        if let Err(err) = self
                            .transport
                            .publish(TransportPayload::OrderUpdate(order))
                            .await
                        {
                            warn!(order = %event.order_id, error = %err, "order update relay failed");
                        }
                    }
                }
                SessionEventKind::SecretRevealed => {
                    debug!(order = %event.order_id, "secret revealed on chain");
                }
                SessionEventKind::PartialPrepared { raw } => {
                    if let Err(err) = self
                        .transport
                        .send(
                            &event.order_id.to_string(),
                            TransportPayload::PartialTransaction {
                                order_id: event.order_id,
                                raw,
                            },
                        )
                        .await
                    {
                        warn!(order = %event.order_id, error = %err, "partial transaction relay failed");
                    }
                }
            }
        }
    }

    /// Move terminal orders older than the retention window into the
    /// archive and drop them from the active book.
    async fn archive_expired(&self) {
        let retention = chrono::Duration::from_std(self.config.retention)
            .unwrap_or_else(|_| chrono::Duration::seconds(900));
        let cutoff = Utc::now() - retention;

        let expired: Vec<Order> = self
            .book
            .read()
            .await
            .values()
            .filter(|o| o.is_terminal() && o.updated_at <= cutoff)
            .cloned()
            .collect();

        for order in expired {
            if let Some(archive) = &self.archive {
                if let Err(err) = archive.archive_order(&OrderRecord::from(&order)).await {
                    // keep the order in the book and retry next tick
                    warn!(order = %order.id, error = %err, "archive write failed");
                    continue;
                }
            }
            self.book.write().await.remove(&order.id);
            debug!(order = %order.id, "terminal order archived");
        }
    }

    /// Debounced snapshot write; failures leave in-memory state
    /// authoritative and are retried on the next tick.
    pub async fn persist(&self, force: bool) {
        let snapshot = self.orders_snapshot().await;
        match self.store.write(&snapshot, force) {
            Ok(true) => debug!(orders = snapshot.len(), "order book snapshot written"),
            Ok(false) => {}
            Err(err) => warn!(error = %err, "order book write failed; retrying next tick"),
        }
    }

    /// Drive the coordinator: periodic ticks plus inbound transport
    /// messages, until the transport closes.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let mut inbound = self.transport.subscribe();
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("exchange coordinator running");

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick().await,
                message = inbound.recv() => match message {
                    Ok(message) => self.handle_message(message).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "transport receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("transport closed; coordinator stopping");
                        self.persist(true).await;
                        return Ok(());
                    }
                },
            }
        }
    }

    async fn handle_message(&self, message: TransportMessage) {
        match message.payload {
            TransportPayload::OrderAnnouncement(order) => {
                let id = order.id;
                if let Err(err) = self.admit(order, false).await {
                    warn!(order = %id, error = %err, "inbound order rejected");
                }
            }
            TransportPayload::OrderUpdate(_) => {}
            TransportPayload::PartialTransaction { order_id, raw } => {
                debug!(order = %order_id, bytes = raw.len() / 2, "partial transaction received");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::BtcCryptoProvider;
    use crate::rpc::mock::MockChainRpc;
    use crate::rpc::Utxo;
    use crate::transport::LocalTransport;
    use crate::wallet::{encode_address, BtcWalletConnector, ChainParams};

    const MEDIAN: u64 = 1_700_000_000;

    struct Harness {
        exchange: Arc<Exchange>,
        source_rpc: Arc<MockChainRpc>,
        dest_rpc: Arc<MockChainRpc>,
        store: Arc<OrderStore>,
    }

    fn funded() -> Vec<Utxo> {
        vec![Utxo {
            txid: "aa".repeat(32),
            vout: 0,
            amount: 600_000_000,
            address: encode_address(0x3c, &[1u8; 20]),
        }]
    }

    fn temp_store() -> Arc<OrderStore> {
        use rand::Rng;
        let suffix: u64 = rand::thread_rng().gen();
        let path = std::env::temp_dir().join(format!("xbridge-exchange-{:016x}.dat", suffix));
        Arc::new(OrderStore::with_interval(path, Duration::from_secs(0)))
    }

    async fn harness_with(config: ExchangeConfig, archive: Option<Database>) -> Harness {
        let store = temp_store();
        let transport = Arc::new(LocalTransport::default());
        let source_rpc = Arc::new(MockChainRpc::new(MEDIAN, funded()));
        let dest_rpc = Arc::new(MockChainRpc::new(MEDIAN, funded()));

        let mut exchange = Exchange::new(config, store.clone(), transport);
        if let Some(archive) = archive {
            exchange = exchange.with_archive(archive);
        }
        let exchange = Arc::new(exchange);
        exchange
            .register_connector(Arc::new(BtcWalletConnector::new(
                ChainParams::new("LTC", 8, 150),
                BtcCryptoProvider::new(),
                source_rpc.clone(),
            )))
            .await
            .unwrap();
        exchange
            .register_connector(Arc::new(BtcWalletConnector::new(
                ChainParams::new("DOGE", 8, 60),
                BtcCryptoProvider::new(),
                dest_rpc.clone(),
            )))
            .await
            .unwrap();

        Harness {
            exchange,
            source_rpc,
            dest_rpc,
            store,
        }
    }

    async fn harness() -> Harness {
        harness_with(ExchangeConfig::new(900), None).await
    }

    fn cleanup(h: &Harness) {
        let _ = std::fs::remove_file(h.store.path());
    }

    #[tokio::test]
    async fn zero_amount_is_rejected_at_admission() {
        let h = harness().await;
        let err = h
            .exchange
            .submit_order(vec![1u8; 32], "LTC", 0, "DOGE", 5_000_000)
            .await
            .unwrap_err();
        assert!(matches!(err, XBridgeError::InvalidOrder(_)));
        assert!(h.exchange.list_orders().await.is_empty());
        cleanup(&h);
    }

    #[tokio::test]
    async fn unknown_asset_and_self_quote_are_rejected() {
        let h = harness().await;
        let err = h
            .exchange
            .submit_order(vec![1u8; 32], "BTC", 1_000, "DOGE", 5_000)
            .await
            .unwrap_err();
        assert!(matches!(err, XBridgeError::InvalidOrder(_)));

        let err = h
            .exchange
            .submit_order(vec![1u8; 32], "LTC", 1_000, "LTC", 5_000)
            .await
            .unwrap_err();
        assert!(matches!(err, XBridgeError::InvalidOrder(_)));
        cleanup(&h);
    }

    #[tokio::test]
    async fn first_eligible_counter_order_wins() {
        let h = harness().await;
        let o1 = h
            .exchange
            .submit_order(vec![1u8; 32], "LTC", 10_000_000, "DOGE", 5_000_000)
            .await
            .unwrap();
        assert_eq!(o1.state, OrderState::Created);
        tokio::time::sleep(Duration::from_millis(5)).await;

        let o2 = h
            .exchange
            .submit_order(vec![2u8; 32], "LTC", 10_000_000, "DOGE", 5_000_000)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let matched = h
            .exchange
            .submit_order(vec![3u8; 32], "DOGE", 5_000_000, "LTC", 10_000_000)
            .await
            .unwrap();
        // the earliest compatible order is taken
        assert_eq!(matched.id, o1.id);
        assert_eq!(matched.state, OrderState::Accepted);
        assert!(matched.secret_hash.is_some());
        assert!(!matched.taker_pubkey.is_empty());

        // the later twin stays open
        let open = h.exchange.get_order(o2.id).await.unwrap();
        assert_eq!(open.state, OrderState::Created);
        cleanup(&h);
    }

    #[tokio::test]
    async fn amounts_match_within_tolerance_only() {
        let mut config = ExchangeConfig::new(900);
        config.amount_tolerance_bps = 100; // 1%
        let h = harness_with(config, None).await;

        let o1 = h
            .exchange
            .submit_order(vec![1u8; 32], "LTC", 10_000_000, "DOGE", 5_000_000)
            .await
            .unwrap();

        // 2% off: stays open
        let unmatched = h
            .exchange
            .submit_order(vec![2u8; 32], "DOGE", 4_900_000, "LTC", 10_000_000)
            .await
            .unwrap();
        assert_eq!(unmatched.state, OrderState::Created);

        // 0.5% off: matches the original order
        let matched = h
            .exchange
            .submit_order(vec![3u8; 32], "DOGE", 4_975_000, "LTC", 10_000_000)
            .await
            .unwrap();
        assert_eq!(matched.id, o1.id);
        assert_eq!(matched.state, OrderState::Accepted);
        cleanup(&h);
    }

    #[tokio::test]
    async fn cancel_only_works_on_open_orders() {
        let h = harness().await;
        let order = h
            .exchange
            .submit_order(vec![1u8; 32], "LTC", 10_000_000, "DOGE", 5_000_000)
            .await
            .unwrap();

        let cancelled = h.exchange.cancel_order(order.id).await.unwrap();
        assert_eq!(cancelled.state, OrderState::Cancelled);
        assert_eq!(cancelled.reason, Some(FailureReason::UserRequested));

        let err = h.exchange.cancel_order(OrderId::random()).await.unwrap_err();
        assert!(matches!(err, XBridgeError::OrderNotFound(_)));

        // matched orders are past the point of cancellation
        let o1 = h
            .exchange
            .submit_order(vec![1u8; 32], "LTC", 10_000_000, "DOGE", 5_000_000)
            .await
            .unwrap();
        let matched = h
            .exchange
            .submit_order(vec![2u8; 32], "DOGE", 5_000_000, "LTC", 10_000_000)
            .await
            .unwrap();
        assert_eq!(matched.id, o1.id);
        let err = h.exchange.cancel_order(o1.id).await.unwrap_err();
        assert!(matches!(err, XBridgeError::ProtocolViolation(_)));
        cleanup(&h);
    }

    #[tokio::test]
    async fn ticks_drive_a_matched_swap_to_finished() {
        let h = harness().await;
        let o1 = h
            .exchange
            .submit_order(vec![1u8; 32], "LTC", 10_000_000, "DOGE", 5_000_000)
            .await
            .unwrap();
        let matched = h
            .exchange
            .submit_order(vec![2u8; 32], "DOGE", 5_000_000, "LTC", 10_000_000)
            .await
            .unwrap();
        assert_eq!(matched.id, o1.id);

        h.exchange.tick().await;
        assert_eq!(
            h.exchange.get_order(o1.id).await.unwrap().state,
            OrderState::Initialized
        );

        h.source_rpc.confirm_all(1);
        h.exchange.tick().await;
        assert_eq!(
            h.exchange.get_order(o1.id).await.unwrap().state,
            OrderState::ExchangeInitialized
        );

        h.dest_rpc.confirm_all(1);
        h.exchange.tick().await;
        assert_eq!(
            h.exchange.get_order(o1.id).await.unwrap().state,
            OrderState::Exchanged
        );

        h.exchange.tick().await;
        let order = h.exchange.get_order(o1.id).await.unwrap();
        assert_eq!(order.state, OrderState::Finished);
        assert!(order.maker_deposit_txid.is_some());
        assert!(order.taker_deposit_txid.is_some());
        assert!(order.taker_claim_txid.is_some());
        assert!(order.maker_claim_txid.is_some());

        // the debounced write path persisted the book
        let persisted = h.store.read().unwrap();
        assert_eq!(
            persisted.get(&o1.id).map(|o| o.state),
            Some(OrderState::Finished)
        );
        cleanup(&h);
    }

    #[tokio::test]
    async fn terminal_orders_age_into_the_archive() {
        let mut config = ExchangeConfig::new(900);
        config.retention = Duration::from_secs(0);
        let archive = Database::new("sqlite::memory:").await.unwrap();
        archive.migrate().await.unwrap();
        let h = harness_with(config, Some(archive.clone())).await;

        let order = h
            .exchange
            .submit_order(vec![1u8; 32], "LTC", 10_000_000, "DOGE", 5_000_000)
            .await
            .unwrap();
        h.exchange.cancel_order(order.id).await.unwrap();

        h.exchange.tick().await;
        assert!(h.exchange.get_order(order.id).await.is_none());

        let archived = archive
            .get_order(&order.id.to_string())
            .await
            .unwrap()
            .expect("order should be archived");
        assert_eq!(archived.state, "cancelled");
        cleanup(&h);
    }

    #[tokio::test]
    async fn restore_reseeds_the_book() {
        let h = harness().await;
        let order = Order::new(vec![1u8; 32], "LTC", 10_000_000, "DOGE", 5_000_000);
        let mut orders = OrderMap::new();
        orders.insert(order.id, order.clone());

        h.exchange.restore(orders).await;
        assert_eq!(
            h.exchange.get_order(order.id).await.unwrap().state,
            OrderState::Created
        );
        cleanup(&h);
    }
}
