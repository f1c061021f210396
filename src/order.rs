//! Order records and the swap state machine graph

use crate::error::{Result, XBridgeError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// 256-bit order identifier, rendered as hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderId([u8; 32]);

impl OrderId {
    pub fn random() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OrderId({})", hex::encode(self.0))
    }
}

impl FromStr for OrderId {
    type Err = XBridgeError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| XBridgeError::InvalidOrder(format!("bad order id '{}': {}", s, e)))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| XBridgeError::InvalidOrder(format!("order id '{}' is not 32 bytes", s)))?;
        Ok(Self(bytes))
    }
}

impl Serialize for OrderId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for OrderId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Side of the swap a party plays; the maker announced the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Maker,
    Taker,
}

/// Protocol states of one order, initial through terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Created,
    Accepted,
    Initialized,
    ExchangeInitialized,
    Exchanged,
    Finished,
    RolledBack,
    Cancelled,
}

impl OrderState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderState::Finished | OrderState::RolledBack | OrderState::Cancelled
        )
    }

    /// The directed transition graph of the swap protocol.
    ///
    /// Cancelled is reachable from Created (withdrawal) and from Accepted
    /// (abort before any funds are locked); once a deposit is broadcast the
    /// only exits are completion or a lock-time refund.
    pub fn can_transition(self, next: OrderState) -> bool {
        use OrderState::*;
        matches!(
            (self, next),
            (Created, Accepted)
                | (Created, Cancelled)
                | (Accepted, Initialized)
                | (Accepted, Cancelled)
                | (Initialized, ExchangeInitialized)
                | (Initialized, RolledBack)
                | (ExchangeInitialized, Exchanged)
                | (ExchangeInitialized, RolledBack)
                | (Exchanged, Finished)
        )
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderState::Created => "created",
            OrderState::Accepted => "accepted",
            OrderState::Initialized => "initialized",
            OrderState::ExchangeInitialized => "exchange_initialized",
            OrderState::Exchanged => "exchanged",
            OrderState::Finished => "finished",
            OrderState::RolledBack => "rolled_back",
            OrderState::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for OrderState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "created" => Ok(OrderState::Created),
            "accepted" => Ok(OrderState::Accepted),
            "initialized" => Ok(OrderState::Initialized),
            "exchange_initialized" => Ok(OrderState::ExchangeInitialized),
            "exchanged" => Ok(OrderState::Exchanged),
            "finished" => Ok(OrderState::Finished),
            "rolled_back" => Ok(OrderState::RolledBack),
            "cancelled" => Ok(OrderState::Cancelled),
            _ => Err(format!("Invalid order state: {}", s)),
        }
    }
}

/// Cause attached to every failure-terminal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    UserRequested,
    InsufficientFunds,
    SigningFailed,
    DepositTimeout,
    ProtocolViolation,
    BadCounterparty,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::UserRequested => "user_requested",
            FailureReason::InsufficientFunds => "insufficient_funds",
            FailureReason::SigningFailed => "signing_failed",
            FailureReason::DepositTimeout => "deposit_timeout",
            FailureReason::ProtocolViolation => "protocol_violation",
            FailureReason::BadCounterparty => "bad_counterparty",
        };
        write!(f, "{}", s)
    }
}

pub type OrderMap = HashMap<OrderId, Order>;

/// The durable record of one swap: negotiated terms and protocol progress.
///
/// Mutated only by the owning swap session; the coordinator and store see
/// cloned snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    #[serde(with = "hex_bytes")]
    pub maker_pubkey: Vec<u8>,
    /// Empty until a counter-order is matched.
    #[serde(with = "hex_bytes")]
    pub taker_pubkey: Vec<u8>,
    pub from_symbol: String,
    pub to_symbol: String,
    pub from_amount: u64,
    pub to_amount: u64,
    pub state: OrderState,
    pub reason: Option<FailureReason>,
    #[serde(with = "hex_hash_opt")]
    pub secret_hash: Option<[u8; 32]>,
    /// CHECKLOCKTIMEVERIFY value for the maker deposit, unix seconds.
    pub maker_lock_time: u64,
    /// CHECKLOCKTIMEVERIFY value for the taker deposit, unix seconds.
    pub taker_lock_time: u64,
    pub maker_deposit_txid: Option<String>,
    pub taker_deposit_txid: Option<String>,
    /// Taker's spend of the maker deposit; reveals the secret.
    pub taker_claim_txid: Option<String>,
    /// Maker's spend of the taker deposit using the revealed secret.
    pub maker_claim_txid: Option<String>,
    pub maker_refund_txid: Option<String>,
    pub taker_refund_txid: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        maker_pubkey: Vec<u8>,
        from_symbol: &str,
        from_amount: u64,
        to_symbol: &str,
        to_amount: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::random(),
            maker_pubkey,
            taker_pubkey: Vec::new(),
            from_symbol: from_symbol.to_uppercase(),
            to_symbol: to_symbol.to_uppercase(),
            from_amount,
            to_amount,
            state: OrderState::Created,
            reason: None,
            secret_hash: None,
            maker_lock_time: 0,
            taker_lock_time: 0,
            maker_deposit_txid: None,
            taker_deposit_txid: None,
            taker_claim_txid: None,
            maker_claim_txid: None,
            maker_refund_txid: None,
            taker_refund_txid: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Advance the state machine. Undefined transitions fail with
    /// `ProtocolViolation` and leave the record untouched; failure-terminal
    /// states must carry a reason.
    pub fn transition(&mut self, next: OrderState, reason: Option<FailureReason>) -> Result<()> {
        if !self.state.can_transition(next) {
            return Err(XBridgeError::ProtocolViolation(format!(
                "order {}: transition {} -> {} is not allowed",
                self.id, self.state, next
            )));
        }
        if matches!(next, OrderState::Cancelled | OrderState::RolledBack) && reason.is_none() {
            return Err(XBridgeError::ProtocolViolation(format!(
                "order {}: terminal state {} requires a reason",
                self.id, next
            )));
        }
        self.state = next;
        if reason.is_some() {
            self.reason = reason;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// Hex helpers for byte fields in the snapshot encoding.

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let hex_str = String::deserialize(deserializer)?;
        hex::decode(&hex_str).map_err(serde::de::Error::custom)
    }
}

mod hex_hash_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(hash: &Option<[u8; 32]>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match hash {
            Some(h) => serializer.serialize_str(&hex::encode(h)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<[u8; 32]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt: Option<String> = Option::deserialize(deserializer)?;
        opt.map(|s| {
            let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
            bytes
                .try_into()
                .map_err(|_| serde::de::Error::custom("secret hash is not 32 bytes"))
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_order() -> Order {
        Order::new(vec![2u8; 32], "LTC", 10_000_000, "DOGE", 5_000_000)
    }

    #[test]
    fn order_id_hex_round_trip() {
        let id = OrderId::random();
        let parsed: OrderId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("zz".parse::<OrderId>().is_err());
        assert!("deadbeef".parse::<OrderId>().is_err());
    }

    #[test]
    fn happy_path_transitions() {
        let mut order = test_order();
        order.transition(OrderState::Accepted, None).unwrap();
        order.transition(OrderState::Initialized, None).unwrap();
        order
            .transition(OrderState::ExchangeInitialized, None)
            .unwrap();
        order.transition(OrderState::Exchanged, None).unwrap();
        order.transition(OrderState::Finished, None).unwrap();
        assert!(order.is_terminal());
        assert_eq!(order.reason, None);
    }

    #[test]
    fn undefined_transition_is_violation_and_leaves_order_unchanged() {
        let mut order = test_order();
        let before = order.clone();
        let err = order.transition(OrderState::Exchanged, None).unwrap_err();
        assert!(matches!(err, XBridgeError::ProtocolViolation(_)));
        assert_eq!(order, before);

        order.transition(OrderState::Accepted, None).unwrap();
        order.transition(OrderState::Initialized, None).unwrap();
        let before = order.clone();
        let err = order
            .transition(OrderState::Cancelled, Some(FailureReason::UserRequested))
            .unwrap_err();
        assert!(matches!(err, XBridgeError::ProtocolViolation(_)));
        assert_eq!(order, before);
    }

    #[test]
    fn failure_terminal_requires_reason() {
        let mut order = test_order();
        let err = order.transition(OrderState::Cancelled, None).unwrap_err();
        assert!(matches!(err, XBridgeError::ProtocolViolation(_)));
        assert_eq!(order.state, OrderState::Created);

        order
            .transition(OrderState::Cancelled, Some(FailureReason::UserRequested))
            .unwrap();
        assert_eq!(order.reason, Some(FailureReason::UserRequested));
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for terminal in [
            OrderState::Finished,
            OrderState::RolledBack,
            OrderState::Cancelled,
        ] {
            for next in [
                OrderState::Created,
                OrderState::Accepted,
                OrderState::Initialized,
                OrderState::ExchangeInitialized,
                OrderState::Exchanged,
                OrderState::Finished,
                OrderState::RolledBack,
                OrderState::Cancelled,
            ] {
                assert!(!terminal.can_transition(next));
            }
        }
    }

    #[test]
    fn state_string_round_trip() {
        for state in [
            OrderState::Created,
            OrderState::Accepted,
            OrderState::Initialized,
            OrderState::ExchangeInitialized,
            OrderState::Exchanged,
            OrderState::Finished,
            OrderState::RolledBack,
            OrderState::Cancelled,
        ] {
            assert_eq!(state.to_string().parse::<OrderState>().unwrap(), state);
        }
        assert!("bogus".parse::<OrderState>().is_err());
    }

    #[test]
    fn order_serde_round_trip() {
        let mut order = test_order();
        order.secret_hash = Some([7u8; 32]);
        order.maker_deposit_txid = Some("ab".repeat(32));
        let json = serde_json::to_string(&order).unwrap();
        let back: Order = serde_json::from_str(&json).unwrap();
        assert_eq!(order, back);
    }
}
