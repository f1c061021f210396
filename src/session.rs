//! Swap session: drives one order through the atomic swap protocol
//!
//! Each session owns its order record, holds a connector for either chain
//! and advances the state machine under a per-order lock. Chain RPC is
//! never issued while any coordinator-level lock is held; the coordinator
//! only polls `advance` on its tick.

use crate::crypto::generate_secret;
use crate::error::{Result, XBridgeError};
use crate::order::{FailureReason, Order, OrderId, OrderState, Role};
use crate::rpc::Utxo;
use crate::wallet::{BuiltTransaction, TxOutput, WalletConnector, WalletKeys};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Required gap between the taker and maker lock times; the maker must
    /// always be able to observe the secret reveal and claim before the
    /// taker could fall back to a refund.
    pub safety_margin_secs: u64,
    /// Bounded retries for transient signing failures.
    pub sign_retry_limit: u32,
}

impl SessionConfig {
    pub fn new(safety_margin_secs: u64) -> Self {
        Self {
            safety_margin_secs,
            sign_retry_limit: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub order_id: OrderId,
    pub kind: SessionEventKind,
}

#[derive(Debug, Clone)]
pub enum SessionEventKind {
    StateChanged {
        state: OrderState,
        reason: Option<FailureReason>,
    },
    SecretRevealed,
    PartialPrepared {
        raw: String,
    },
}

struct SessionInner {
    order: Order,
    secret: Option<[u8; 32]>,
    maker_redeem_script: Vec<u8>,
    taker_redeem_script: Vec<u8>,
    /// Fatal condition recorded while funds are locked; stops progression
    /// until the lock-time refund becomes possible.
    halted: Option<FailureReason>,
}

pub struct SwapSession {
    id: OrderId,
    config: SessionConfig,
    /// Chain carrying the maker deposit (the order's from-currency).
    source: Arc<dyn WalletConnector>,
    /// Chain carrying the taker deposit (the order's to-currency).
    dest: Arc<dyn WalletConnector>,
    maker_keys: WalletKeys,
    taker_keys: WalletKeys,
    inner: Mutex<SessionInner>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SwapSession {
    pub fn new(
        order: Order,
        source: Arc<dyn WalletConnector>,
        dest: Arc<dyn WalletConnector>,
        maker_keys: WalletKeys,
        taker_keys: WalletKeys,
        config: SessionConfig,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            id: order.id,
            config,
            source,
            dest,
            maker_keys,
            taker_keys,
            inner: Mutex::new(SessionInner {
                order,
                secret: None,
                maker_redeem_script: Vec::new(),
                taker_redeem_script: Vec::new(),
                halted: None,
            }),
            events,
        }
    }

    pub fn order_id(&self) -> OrderId {
        self.id
    }

    pub async fn state(&self) -> OrderState {
        self.inner.lock().await.order.state
    }

    pub async fn snapshot(&self) -> Order {
        self.inner.lock().await.order.clone()
    }

    fn emit(&self, kind: SessionEventKind) {
        let _ = self.events.send(SessionEvent {
            order_id: self.id,
            kind,
        });
    }

    fn transition(
        &self,
        inner: &mut SessionInner,
        next: OrderState,
        reason: Option<FailureReason>,
    ) -> Result<()> {
        inner.order.transition(next, reason)?;
        info!(order = %self.id, state = %next, "order state changed");
        self.emit(SessionEventKind::StateChanged {
            state: next,
            reason,
        });
        Ok(())
    }

    fn with_sign_retries<T>(&self, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 0u32;
        loop {
            match op() {
                Err(XBridgeError::SigningFailed(e)) if attempt + 1 < self.config.sign_retry_limit => {
                    attempt += 1;
                    warn!(order = %self.id, attempt, "signing failed ({e}); retrying");
                }
                other => return other,
            }
        }
    }

    fn expect_state(&self, inner: &SessionInner, expected: OrderState, op: &str) -> Result<()> {
        if inner.order.state != expected {
            return Err(XBridgeError::ProtocolViolation(format!(
                "order {}: {} not allowed in state {}",
                self.id, op, inner.order.state
            )));
        }
        Ok(())
    }

    /// Bind the counterparty and commit to a fresh secret. Created -> Accepted.
    pub async fn accept(&self, taker_pubkey: Vec<u8>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.expect_state(&inner, OrderState::Created, "accept")?;
        if taker_pubkey.is_empty() {
            return Err(XBridgeError::InvalidOrder(
                "taker public key is empty".to_string(),
            ));
        }
        let (secret, secret_hash) = generate_secret();
        inner.secret = Some(secret);
        inner.order.taker_pubkey = taker_pubkey;
        inner.order.secret_hash = Some(secret_hash);
        self.transition(&mut inner, OrderState::Accepted, None)
    }

    /// Broadcast the maker deposit. Accepted -> Initialized; aborts to
    /// Cancelled while no funds are locked.
    pub async fn initialize(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.expect_state(&inner, OrderState::Accepted, "initialize")?;
        let secret_hash = inner
            .order
            .secret_hash
            .ok_or_else(|| XBridgeError::ProtocolViolation(format!("order {}: no secret hash", self.id)))?;

        match self.fund_maker_deposit(&mut inner, &secret_hash).await {
            Ok(()) => self.transition(&mut inner, OrderState::Initialized, None),
            Err(err @ XBridgeError::InsufficientFunds { .. }) => {
                self.transition(
                    &mut inner,
                    OrderState::Cancelled,
                    Some(FailureReason::InsufficientFunds),
                )?;
                Err(err)
            }
            Err(err @ XBridgeError::SigningFailed(_)) => {
                self.transition(
                    &mut inner,
                    OrderState::Cancelled,
                    Some(FailureReason::SigningFailed),
                )?;
                Err(err)
            }
            // transient chain errors leave the order Accepted for the next tick
            Err(err) => Err(err),
        }
    }

    async fn fund_maker_deposit(
        &self,
        inner: &mut SessionInner,
        secret_hash: &[u8; 32],
    ) -> Result<()> {
        let lock_time = self.source.lock_time(Role::Maker).await?;
        let script = self.source.redeem_script(
            &self.maker_keys.pubkey,
            &inner.order.taker_pubkey,
            secret_hash,
            lock_time,
        );
        let amount = inner.order.from_amount;
        let unspent = self.source.get_unspent().await?;
        let fee_bound = self.source.min_tx_fee(unspent.len() as u64, 2);
        let (inputs, _) = self.source.select_inputs(&unspent, amount.saturating_add(fee_bound))?;
        let change_address = self.source.to_address(&self.maker_keys.pubkey);

        let built = self.with_sign_retries(|| {
            self.source.create_payment_transaction(
                &inputs,
                amount,
                &script,
                &change_address,
                &self.maker_keys,
            )
        })?;
        let txid = self.source.broadcast(&built.raw).await?;
        info!(order = %self.id, txid = %txid, chain = self.source.currency(), "maker deposit broadcast");

        inner.order.maker_lock_time = lock_time;
        inner.order.maker_deposit_txid = Some(txid);
        inner.maker_redeem_script = script;
        Ok(())
    }

    /// Broadcast the taker deposit under the same secret hash.
    /// Initialized -> ExchangeInitialized.
    ///
    /// Refused with `ProtocolViolation` unless
    /// `taker_lock_time + safety_margin <= maker_lock_time`.
    pub async fn exchange_initialize(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.expect_state(&inner, OrderState::Initialized, "exchange_initialize")?;
        if let Some(reason) = inner.halted {
            return Err(XBridgeError::ProtocolViolation(format!(
                "order {}: session halted ({})",
                self.id, reason
            )));
        }
        let secret_hash = inner
            .order
            .secret_hash
            .ok_or_else(|| XBridgeError::ProtocolViolation(format!("order {}: no secret hash", self.id)))?;

        let taker_lock_time = self.dest.lock_time(Role::Taker).await?;
        let maker_lock_time = inner.order.maker_lock_time;
        if taker_lock_time.saturating_add(self.config.safety_margin_secs) > maker_lock_time {
            inner.halted = Some(FailureReason::ProtocolViolation);
            return Err(XBridgeError::ProtocolViolation(format!(
                "order {}: taker lock time {} + margin {} exceeds maker lock time {}",
                self.id, taker_lock_time, self.config.safety_margin_secs, maker_lock_time
            )));
        }

        match self
            .fund_taker_deposit(&mut inner, &secret_hash, taker_lock_time)
            .await
        {
            Ok(()) => self.transition(&mut inner, OrderState::ExchangeInitialized, None),
            Err(err @ XBridgeError::InsufficientFunds { .. }) => {
                // maker funds are already committed; only the lock-time
                // refund remains
                inner.halted = Some(FailureReason::InsufficientFunds);
                Err(err)
            }
            Err(err @ XBridgeError::SigningFailed(_)) => {
                inner.halted = Some(FailureReason::SigningFailed);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    async fn fund_taker_deposit(
        &self,
        inner: &mut SessionInner,
        secret_hash: &[u8; 32],
        lock_time: u64,
    ) -> Result<()> {
        let script = self.dest.redeem_script(
            &self.taker_keys.pubkey,
            &self.maker_keys.pubkey,
            secret_hash,
            lock_time,
        );
        let amount = inner.order.to_amount;
        let unspent = self.dest.get_unspent().await?;
        let fee_bound = self.dest.min_tx_fee(unspent.len() as u64, 2);
        let (inputs, _) = self.dest.select_inputs(&unspent, amount.saturating_add(fee_bound))?;
        let change_address = self.dest.to_address(&self.taker_keys.pubkey);

        let built = self.with_sign_retries(|| {
            self.dest.create_payment_transaction(
                &inputs,
                amount,
                &script,
                &change_address,
                &self.taker_keys,
            )
        })?;
        let txid = self.dest.broadcast(&built.raw).await?;
        info!(order = %self.id, txid = %txid, chain = self.dest.currency(), "taker deposit broadcast");

        inner.order.taker_lock_time = lock_time;
        inner.order.taker_deposit_txid = Some(txid);
        inner.taker_redeem_script = script;
        Ok(())
    }

    /// Taker spends the maker deposit, revealing the secret on-chain.
    /// ExchangeInitialized -> Exchanged.
    pub async fn claim_maker_deposit(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.expect_state(&inner, OrderState::ExchangeInitialized, "claim_maker_deposit")?;
        let secret = inner
            .secret
            .ok_or_else(|| XBridgeError::ProtocolViolation(format!("order {}: secret unknown", self.id)))?;
        let deposit_txid = inner
            .order
            .maker_deposit_txid
            .clone()
            .ok_or_else(|| XBridgeError::ProtocolViolation(format!("order {}: no maker deposit", self.id)))?;
        let amount = inner.order.from_amount;
        let script = inner.maker_redeem_script.clone();
        let to_address = self.source.to_address(&self.taker_keys.pubkey);

        let built = self.with_sign_retries(|| {
            self.source.create_claim_transaction(
                &deposit_txid,
                0,
                amount,
                &script,
                &secret,
                &to_address,
                &self.taker_keys,
            )
        })?;
        let txid = self.source.broadcast(&built.raw).await?;
        info!(order = %self.id, txid = %txid, "maker deposit claimed, secret revealed");

        inner.order.taker_claim_txid = Some(txid);
        self.transition(&mut inner, OrderState::Exchanged, None)?;
        self.emit(SessionEventKind::SecretRevealed);
        Ok(())
    }

    /// Maker observes the revealed secret on the source chain and spends
    /// the taker deposit with it. Exchanged -> Finished.
    pub async fn claim_taker_deposit(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.expect_state(&inner, OrderState::Exchanged, "claim_taker_deposit")?;
        let secret_hash = inner
            .order
            .secret_hash
            .ok_or_else(|| XBridgeError::ProtocolViolation(format!("order {}: no secret hash", self.id)))?;
        let claim_txid = inner
            .order
            .taker_claim_txid
            .clone()
            .ok_or_else(|| XBridgeError::ProtocolViolation(format!("order {}: no taker claim", self.id)))?;
        let secret = self
            .source
            .extract_secret(&claim_txid, &secret_hash)
            .await?
            .ok_or_else(|| {
                XBridgeError::Rpc(format!(
                    "order {}: revealed secret not yet visible in {}",
                    self.id, claim_txid
                ))
            })?;

        let deposit_txid = inner
            .order
            .taker_deposit_txid
            .clone()
            .ok_or_else(|| XBridgeError::ProtocolViolation(format!("order {}: no taker deposit", self.id)))?;
        let amount = inner.order.to_amount;
        let script = inner.taker_redeem_script.clone();
        let to_address = self.dest.to_address(&self.maker_keys.pubkey);

        let built = self.with_sign_retries(|| {
            self.dest.create_claim_transaction(
                &deposit_txid,
                0,
                amount,
                &script,
                &secret,
                &to_address,
                &self.maker_keys,
            )
        })?;
        let txid = self.dest.broadcast(&built.raw).await?;
        info!(order = %self.id, txid = %txid, "taker deposit claimed");

        inner.order.maker_claim_txid = Some(txid);
        self.transition(&mut inner, OrderState::Finished, None)
    }

    /// Withdraw before any funds are locked. Created/Accepted -> Cancelled.
    pub async fn cancel(&self, reason: FailureReason) -> Result<()> {
        let mut inner = self.inner.lock().await;
        self.transition(&mut inner, OrderState::Cancelled, Some(reason))
    }

    /// Reclaim locked deposits through the lock-time branch.
    /// Initialized/ExchangeInitialized -> RolledBack.
    pub async fn roll_back(&self, reason: FailureReason) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if !matches!(
            inner.order.state,
            OrderState::Initialized | OrderState::ExchangeInitialized
        ) {
            return Err(XBridgeError::ProtocolViolation(format!(
                "order {}: roll_back not allowed in state {}",
                self.id, inner.order.state
            )));
        }

        let deposit_txid = inner
            .order
            .maker_deposit_txid
            .clone()
            .ok_or_else(|| XBridgeError::ProtocolViolation(format!("order {}: no maker deposit", self.id)))?;
        let amount = inner.order.from_amount;
        let lock_time = inner.order.maker_lock_time;
        let script = inner.maker_redeem_script.clone();
        let refund_address = self.source.to_address(&self.maker_keys.pubkey);

        let built = self.with_sign_retries(|| {
            self.source.create_refund_transaction(
                &deposit_txid,
                0,
                amount,
                &script,
                lock_time,
                &refund_address,
                &self.maker_keys,
            )
        })?;
        let txid = self.source.broadcast(&built.raw).await?;
        info!(order = %self.id, txid = %txid, "maker deposit refunded");
        inner.order.maker_refund_txid = Some(txid);

        if let Some(taker_deposit) = inner.order.taker_deposit_txid.clone() {
            let amount = inner.order.to_amount;
            let lock_time = inner.order.taker_lock_time;
            let script = inner.taker_redeem_script.clone();
            let refund_address = self.dest.to_address(&self.taker_keys.pubkey);
            let built = self.with_sign_retries(|| {
                self.dest.create_refund_transaction(
                    &taker_deposit,
                    0,
                    amount,
                    &script,
                    lock_time,
                    &refund_address,
                    &self.taker_keys,
                )
            })?;
            let txid = self.dest.broadcast(&built.raw).await?;
            info!(order = %self.id, txid = %txid, "taker deposit refunded");
            inner.order.taker_refund_txid = Some(txid);
        }

        self.transition(&mut inner, OrderState::RolledBack, Some(reason))
    }

    /// Build a funding transaction that needs signatures from both parties.
    /// The unsigned form is forwarded to the counterparty and never
    /// broadcast here.
    pub async fn prepare_partial(
        &self,
        inputs: &[Utxo],
        outputs: &[TxOutput],
    ) -> Result<BuiltTransaction> {
        let built = self.source.create_partial_transaction(inputs, outputs)?;
        self.emit(SessionEventKind::PartialPrepared {
            raw: built.raw.clone(),
        });
        Ok(built)
    }

    /// One poll-driven step: check confirmations and lock-time expiry, then
    /// advance the machine. Returns the state entered, if any.
    pub async fn advance(&self) -> Result<Option<OrderState>> {
        match self.state().await {
            OrderState::Accepted => {
                self.initialize().await?;
                Ok(Some(OrderState::Initialized))
            }
            OrderState::Initialized => {
                let (maker_lock_time, deposit_txid, halted) = {
                    let inner = self.inner.lock().await;
                    (
                        inner.order.maker_lock_time,
                        inner.order.maker_deposit_txid.clone(),
                        inner.halted,
                    )
                };
                let now = self.source.median_time().await?;
                if now >= maker_lock_time {
                    let reason = halted.unwrap_or(FailureReason::DepositTimeout);
                    self.roll_back(reason).await?;
                    return Ok(Some(OrderState::RolledBack));
                }
                if halted.is_some() {
                    return Ok(None);
                }
                let deposit_txid = match deposit_txid {
                    Some(txid) => txid,
                    None => return Ok(None),
                };
                let confirmations = self
                    .source
                    .confirmations(&deposit_txid)
                    .await?
                    .unwrap_or(0);
                if confirmations >= self.source.params().required_confirmations {
                    self.exchange_initialize().await?;
                    Ok(Some(OrderState::ExchangeInitialized))
                } else {
                    Ok(None)
                }
            }
            OrderState::ExchangeInitialized => {
                let (taker_lock_time, deposit_txid) = {
                    let inner = self.inner.lock().await;
                    (
                        inner.order.taker_lock_time,
                        inner.order.taker_deposit_txid.clone(),
                    )
                };
                let now = self.dest.median_time().await?;
                if now >= taker_lock_time {
                    self.roll_back(FailureReason::DepositTimeout).await?;
                    return Ok(Some(OrderState::RolledBack));
                }
                let deposit_txid = match deposit_txid {
                    Some(txid) => txid,
                    None => return Ok(None),
                };
                let confirmations = self.dest.confirmations(&deposit_txid).await?.unwrap_or(0);
                if confirmations >= self.dest.params().required_confirmations {
                    self.claim_maker_deposit().await?;
                    Ok(Some(OrderState::Exchanged))
                } else {
                    Ok(None)
                }
            }
            OrderState::Exchanged => {
                self.claim_taker_deposit().await?;
                Ok(Some(OrderState::Finished))
            }
            _ => Ok(None),
        }
    }
}
