//! Wallet connectors: per-chain transaction construction and signing
//!
//! The capability set every chain family must provide lives on the
//! [`WalletConnector`] trait; shared UTXO logic is implemented as default
//! methods, chain quirks as overrides in variant connectors. Connectors are
//! stateless with respect to any single order.

use crate::crypto::{hash160, sha256, CryptoProvider};
use crate::error::{Result, XBridgeError};
use crate::order::Role;
use crate::rpc::{retry_rpc, ChainRpc, RetryConfig, Utxo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;
pub const SIGHASH_ALL: u8 = 0x01;
/// Fork-id chains commit to this flag in the signature hash.
pub const SIGHASH_FORKID: u8 = 0x41;

/// Script opcodes used by the swap contract.
pub mod opcodes {
    pub const OP_FALSE: u8 = 0x00;
    pub const OP_PUSHDATA1: u8 = 0x4c;
    pub const OP_TRUE: u8 = 0x51;
    pub const OP_IF: u8 = 0x63;
    pub const OP_ELSE: u8 = 0x67;
    pub const OP_ENDIF: u8 = 0x68;
    pub const OP_DROP: u8 = 0x75;
    pub const OP_DUP: u8 = 0x76;
    pub const OP_SIZE: u8 = 0x82;
    pub const OP_EQUAL: u8 = 0x87;
    pub const OP_EQUALVERIFY: u8 = 0x88;
    pub const OP_SHA256: u8 = 0xa8;
    pub const OP_HASH160: u8 = 0xa9;
    pub const OP_CHECKSIG: u8 = 0xac;
    pub const OP_CHECKSIGVERIFY: u8 = 0xad;
    pub const OP_CHECKLOCKTIMEVERIFY: u8 = 0xb1;
}

use opcodes::*;

#[derive(Debug, Default)]
pub struct ScriptBuilder(Vec<u8>);

impl ScriptBuilder {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push_opcode(mut self, op: u8) -> Self {
        self.0.push(op);
        self
    }

    pub fn push_data(mut self, data: &[u8]) -> Self {
        if data.len() < OP_PUSHDATA1 as usize {
            self.0.push(data.len() as u8);
        } else {
            self.0.push(OP_PUSHDATA1);
            self.0.push(data.len() as u8);
        }
        self.0.extend_from_slice(data);
        self
    }

    /// Minimal little-endian number push, script-number encoded.
    pub fn push_int(self, value: u64) -> Self {
        if value == 0 {
            return self.push_data(&[]);
        }
        let mut bytes = value.to_le_bytes().to_vec();
        while bytes.len() > 1 && bytes[bytes.len() - 1] == 0 {
            bytes.pop();
        }
        // keep the sign bit clear
        if bytes[bytes.len() - 1] & 0x80 != 0 {
            bytes.push(0);
        }
        self.push_data(&bytes)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

/// Data pushes of a script, in order. Non-push opcodes are skipped.
pub fn script_pushes(script: &[u8]) -> Vec<Vec<u8>> {
    let mut pushes = Vec::new();
    let mut i = 0usize;
    while i < script.len() {
        let op = script[i];
        i += 1;
        let len = if op == OP_FALSE {
            pushes.push(Vec::new());
            continue;
        } else if (1..OP_PUSHDATA1).contains(&op) {
            op as usize
        } else if op == OP_PUSHDATA1 {
            if i >= script.len() {
                break;
            }
            let l = script[i] as usize;
            i += 1;
            l
        } else {
            continue;
        };
        if i + len > script.len() {
            break;
        }
        pushes.push(script[i..i + len].to_vec());
        i += len;
    }
    pushes
}

/// The hash/time-locked deposit contract.
///
/// Spendable by the owner's signature after `lock_time`, or by the
/// counterparty's signature plus the 32-byte preimage of `secret_hash`.
pub fn htlc_redeem_script(
    owner_pubkey: &[u8],
    counterparty_pubkey: &[u8],
    secret_hash: &[u8; 32],
    lock_time: u64,
) -> Vec<u8> {
    ScriptBuilder::new()
        .push_opcode(OP_IF)
        .push_int(lock_time)
        .push_opcode(OP_CHECKLOCKTIMEVERIFY)
        .push_opcode(OP_DROP)
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_data(&hash160(owner_pubkey))
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIG)
        .push_opcode(OP_ELSE)
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_data(&hash160(counterparty_pubkey))
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIGVERIFY)
        .push_opcode(OP_SIZE)
        .push_int(32)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_SHA256)
        .push_data(secret_hash)
        .push_opcode(OP_EQUAL)
        .push_opcode(OP_ENDIF)
        .into_bytes()
}

pub fn p2pkh_script(key_id: &[u8; 20]) -> Vec<u8> {
    ScriptBuilder::new()
        .push_opcode(OP_DUP)
        .push_opcode(OP_HASH160)
        .push_data(key_id)
        .push_opcode(OP_EQUALVERIFY)
        .push_opcode(OP_CHECKSIG)
        .into_bytes()
}

pub fn p2sh_script(script_id: &[u8; 20]) -> Vec<u8> {
    ScriptBuilder::new()
        .push_opcode(OP_HASH160)
        .push_data(script_id)
        .push_opcode(OP_EQUAL)
        .into_bytes()
}

/// Version byte plus HASH160 payload, hex encoded.
pub fn encode_address(prefix: u8, payload: &[u8; 20]) -> String {
    let mut bytes = Vec::with_capacity(21);
    bytes.push(prefix);
    bytes.extend_from_slice(payload);
    hex::encode(bytes)
}

pub fn decode_address(address: &str) -> Result<(u8, [u8; 20])> {
    let bytes = hex::decode(address)
        .map_err(|e| XBridgeError::InvalidAddress(format!("'{}': {}", address, e)))?;
    if bytes.len() != 21 {
        return Err(XBridgeError::InvalidAddress(format!(
            "'{}' is {} bytes, expected 21",
            address,
            bytes.len()
        )));
    }
    let payload: [u8; 20] = bytes[1..]
        .try_into()
        .map_err(|_| XBridgeError::InvalidAddress(address.to_string()))?;
    Ok((bytes[0], payload))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    pub txid: String,
    pub vout: u32,
    #[serde(with = "hex_bytes")]
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub amount: u64,
    #[serde(with = "hex_bytes")]
    pub script_pubkey: Vec<u8>,
}

/// Chain-neutral transaction model; the real wire encoding of each chain
/// lives behind its RPC adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub lock_time: u64,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
}

impl Transaction {
    pub fn raw(&self) -> Result<String> {
        Ok(hex::encode(serde_json::to_vec(self)?))
    }

    pub fn from_raw(raw: &str) -> Result<Self> {
        let bytes = hex::decode(raw)
            .map_err(|e| XBridgeError::Rpc(format!("undecodable raw transaction: {}", e)))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn txid(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(hex::encode(sha256(&sha256(&bytes))))
    }

    /// Digest signed for one input, with `script` standing in as the
    /// spent output's script.
    pub fn signature_hash(&self, index: usize, script: &[u8], sighash_type: u8) -> Result<[u8; 32]> {
        let mut stripped = self.clone();
        for (i, input) in stripped.inputs.iter_mut().enumerate() {
            input.script_sig = if i == index { script.to_vec() } else { Vec::new() };
        }
        let mut bytes = serde_json::to_vec(&stripped)?;
        bytes.extend_from_slice(&(index as u32).to_le_bytes());
        bytes.push(sighash_type);
        Ok(sha256(&sha256(&bytes)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltTransaction {
    pub txid: String,
    pub raw: String,
}

fn finish(tx: Transaction) -> Result<BuiltTransaction> {
    Ok(BuiltTransaction {
        txid: tx.txid()?,
        raw: tx.raw()?,
    })
}

/// Recipient of a transaction output in address form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: String,
    pub amount: u64,
}

/// A session-scoped signing key pair.
#[derive(Debug, Clone)]
pub struct WalletKeys {
    pub pubkey: Vec<u8>,
    pub privkey: Vec<u8>,
}

impl WalletKeys {
    pub fn generate(provider: &dyn CryptoProvider) -> Self {
        let (pubkey, privkey) = provider.make_keypair();
        Self { pubkey, privkey }
    }
}

/// Per-chain wallet parameters, read from configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainParams {
    pub symbol: String,
    pub name: String,
    pub precision: u8,
    pub block_time_secs: u64,
    #[serde(default = "defaults::address_prefix")]
    pub address_prefix: u8,
    #[serde(default = "defaults::script_prefix")]
    pub script_prefix: u8,
    #[serde(default = "defaults::tx_version")]
    pub tx_version: u32,
    #[serde(default = "defaults::required_confirmations")]
    pub required_confirmations: u32,
    #[serde(default = "defaults::min_lock_blocks")]
    pub min_lock_blocks: u64,
    #[serde(default = "defaults::maker_lock_target_secs")]
    pub maker_lock_target_secs: u64,
    #[serde(default = "defaults::taker_lock_target_secs")]
    pub taker_lock_target_secs: u64,
    #[serde(default = "defaults::slow_taker_lock_target_secs")]
    pub slow_taker_lock_target_secs: u64,
    #[serde(default = "defaults::slow_block_time_secs")]
    pub slow_block_time_secs: u64,
    #[serde(default = "defaults::fee_per_byte")]
    pub fee_per_byte: u64,
    #[serde(default)]
    pub dust_amount: u64,
}

mod defaults {
    pub fn address_prefix() -> u8 {
        0x3c
    }
    pub fn script_prefix() -> u8 {
        0x1a
    }
    pub fn tx_version() -> u32 {
        1
    }
    pub fn required_confirmations() -> u32 {
        1
    }
    pub fn min_lock_blocks() -> u64 {
        6
    }
    pub fn maker_lock_target_secs() -> u64 {
        2 * 60 * 60
    }
    pub fn taker_lock_target_secs() -> u64 {
        30 * 60
    }
    pub fn slow_taker_lock_target_secs() -> u64 {
        60 * 60
    }
    pub fn slow_block_time_secs() -> u64 {
        600
    }
    pub fn fee_per_byte() -> u64 {
        200
    }
}

impl ChainParams {
    pub fn new(symbol: &str, precision: u8, block_time_secs: u64) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            name: symbol.to_uppercase(),
            precision,
            block_time_secs,
            address_prefix: defaults::address_prefix(),
            script_prefix: defaults::script_prefix(),
            tx_version: defaults::tx_version(),
            required_confirmations: defaults::required_confirmations(),
            min_lock_blocks: defaults::min_lock_blocks(),
            maker_lock_target_secs: defaults::maker_lock_target_secs(),
            taker_lock_target_secs: defaults::taker_lock_target_secs(),
            slow_taker_lock_target_secs: defaults::slow_taker_lock_target_secs(),
            slow_block_time_secs: defaults::slow_block_time_secs(),
            fee_per_byte: defaults::fee_per_byte(),
            dust_amount: 0,
        }
    }
}

/// Capability set of one chain family.
///
/// Default methods carry the shared UTXO logic; variants override only
/// their quirks (see [`BchWalletConnector`]).
#[async_trait]
pub trait WalletConnector: Send + Sync {
    fn params(&self) -> &ChainParams;
    fn provider(&self) -> &dyn CryptoProvider;
    fn rpc(&self) -> &dyn ChainRpc;
    fn retry(&self) -> &RetryConfig;

    /// Signature-hash type byte committed to by script digests.
    fn sighash_type(&self) -> u8 {
        SIGHASH_ALL
    }

    fn currency(&self) -> &str {
        &self.params().symbol
    }

    fn to_address(&self, pubkey: &[u8]) -> String {
        encode_address(self.params().address_prefix, &hash160(pubkey))
    }

    fn script_address(&self, script: &[u8]) -> String {
        encode_address(self.params().script_prefix, &hash160(script))
    }

    fn is_valid_address(&self, address: &str) -> bool {
        match decode_address(address) {
            Ok((prefix, _)) => {
                prefix == self.params().address_prefix || prefix == self.params().script_prefix
            }
            Err(_) => false,
        }
    }

    fn is_dust_amount(&self, amount: u64) -> bool {
        amount < self.params().dust_amount
    }

    fn min_tx_fee(&self, input_count: u64, output_count: u64) -> u64 {
        self.params().fee_per_byte * (input_count * 148 + output_count * 34 + 10)
    }

    /// Output script for an address on this chain.
    fn output_script(&self, address: &str) -> Result<Vec<u8>> {
        let (prefix, payload) = decode_address(address)?;
        let params = self.params();
        if prefix == params.script_prefix {
            Ok(p2sh_script(&payload))
        } else if prefix == params.address_prefix {
            Ok(p2pkh_script(&payload))
        } else {
            Err(XBridgeError::InvalidAddress(format!(
                "prefix {:#04x} is not valid on {}",
                prefix, params.symbol
            )))
        }
    }

    /// Greedy largest-first coin selection covering `target`.
    fn select_inputs(&self, unspent: &[Utxo], target: u64) -> Result<(Vec<Utxo>, u64)> {
        let mut available = unspent.to_vec();
        available.sort_by(|a, b| b.amount.cmp(&a.amount));

        let mut selected = Vec::new();
        let mut total = 0u64;
        for utxo in available {
            if total >= target {
                break;
            }
            total += utxo.amount;
            selected.push(utxo);
        }

        if total < target {
            return Err(XBridgeError::InsufficientFunds {
                currency: self.params().symbol.clone(),
                needed: target,
                available: total,
            });
        }
        Ok((selected, total))
    }

    /// Deposit contract for this chain.
    fn redeem_script(
        &self,
        owner_pubkey: &[u8],
        counterparty_pubkey: &[u8],
        secret_hash: &[u8; 32],
        lock_time: u64,
    ) -> Vec<u8> {
        htlc_redeem_script(owner_pubkey, counterparty_pubkey, secret_hash, lock_time)
    }

    /// CHECKLOCKTIMEVERIFY value for a deposit by `role`, derived from the
    /// chain's median time and block-time estimate. Slow chains get a longer
    /// taker window.
    async fn lock_time(&self, role: Role) -> Result<u64> {
        let median = self.median_time().await?;
        let params = self.params();
        let target = match role {
            Role::Maker => params.maker_lock_target_secs,
            Role::Taker => {
                if params.block_time_secs >= params.slow_block_time_secs {
                    params.slow_taker_lock_target_secs
                } else {
                    params.taker_lock_target_secs
                }
            }
        };
        let blocks = std::cmp::max(target / params.block_time_secs, params.min_lock_blocks);
        Ok(median + blocks * params.block_time_secs)
    }

    async fn median_time(&self) -> Result<u64> {
        retry_rpc("median_time", self.retry(), || self.rpc().median_time()).await
    }

    async fn get_unspent(&self) -> Result<Vec<Utxo>> {
        retry_rpc("list_unspent", self.retry(), || self.rpc().list_unspent()).await
    }

    async fn confirmations(&self, txid: &str) -> Result<Option<u32>> {
        retry_rpc("confirmations", self.retry(), || self.rpc().confirmations(txid)).await
    }

    async fn broadcast(&self, raw: &str) -> Result<String> {
        retry_rpc("send_raw_transaction", self.retry(), || {
            self.rpc().send_raw_transaction(raw)
        })
        .await
    }

    /// Funding transaction locking `amount` under `redeem_script`.
    ///
    /// Output 0 is the deposit; change above dust returns to
    /// `change_address`.
    fn create_payment_transaction(
        &self,
        inputs: &[Utxo],
        amount: u64,
        redeem_script: &[u8],
        change_address: &str,
        keys: &WalletKeys,
    ) -> Result<BuiltTransaction> {
        let total: u64 = inputs.iter().map(|u| u.amount).sum();
        let fee = self.min_tx_fee(inputs.len() as u64, 2);
        if total < amount.saturating_add(fee) {
            return Err(XBridgeError::InsufficientFunds {
                currency: self.params().symbol.clone(),
                needed: amount + fee,
                available: total,
            });
        }

        let mut outputs = vec![TxOut {
            amount,
            script_pubkey: p2sh_script(&hash160(redeem_script)),
        }];
        let change = total - amount - fee;
        if change > 0 && !self.is_dust_amount(change) {
            outputs.push(TxOut {
                amount: change,
                script_pubkey: self.output_script(change_address)?,
            });
        }

        let mut tx = Transaction {
            version: self.params().tx_version,
            lock_time: 0,
            inputs: inputs
                .iter()
                .map(|u| TxIn {
                    txid: u.txid.clone(),
                    vout: u.vout,
                    script_sig: Vec::new(),
                    sequence: SEQUENCE_FINAL,
                })
                .collect(),
            outputs,
        };
        self.sign_wallet_inputs(&mut tx, keys)?;
        finish(tx)
    }

    /// Timeout reclaim of an own deposit through the lock-time branch.
    ///
    /// Valid on-chain only once `lock_time` has passed; the session enforces
    /// that, not the connector.
    fn create_refund_transaction(
        &self,
        deposit_txid: &str,
        deposit_vout: u32,
        deposit_amount: u64,
        redeem_script: &[u8],
        lock_time: u64,
        refund_address: &str,
        keys: &WalletKeys,
    ) -> Result<BuiltTransaction> {
        let fee = self.min_tx_fee(1, 1);
        if deposit_amount <= fee {
            return Err(XBridgeError::InsufficientFunds {
                currency: self.params().symbol.clone(),
                needed: fee + 1,
                available: deposit_amount,
            });
        }

        let mut tx = Transaction {
            version: self.params().tx_version,
            lock_time,
            inputs: vec![TxIn {
                txid: deposit_txid.to_string(),
                vout: deposit_vout,
                script_sig: Vec::new(),
                // lock_time only binds with a non-final sequence
                sequence: SEQUENCE_FINAL - 1,
            }],
            outputs: vec![TxOut {
                amount: deposit_amount - fee,
                script_pubkey: self.output_script(refund_address)?,
            }],
        };

        let digest = tx.signature_hash(0, redeem_script, self.sighash_type())?;
        let signature = self.provider().sign(&keys.privkey, &digest)?;
        tx.inputs[0].script_sig = ScriptBuilder::new()
            .push_data(&signature)
            .push_data(&keys.pubkey)
            .push_opcode(OP_TRUE)
            .push_data(redeem_script)
            .into_bytes();
        finish(tx)
    }

    /// Spend of the counterparty's deposit through the secret branch; the
    /// 32-byte secret becomes visible on-chain.
    fn create_claim_transaction(
        &self,
        deposit_txid: &str,
        deposit_vout: u32,
        deposit_amount: u64,
        redeem_script: &[u8],
        secret: &[u8; 32],
        to_address: &str,
        keys: &WalletKeys,
    ) -> Result<BuiltTransaction> {
        let fee = self.min_tx_fee(1, 1);
        if deposit_amount <= fee {
            return Err(XBridgeError::InsufficientFunds {
                currency: self.params().symbol.clone(),
                needed: fee + 1,
                available: deposit_amount,
            });
        }

        let mut tx = Transaction {
            version: self.params().tx_version,
            lock_time: 0,
            inputs: vec![TxIn {
                txid: deposit_txid.to_string(),
                vout: deposit_vout,
                script_sig: Vec::new(),
                sequence: SEQUENCE_FINAL,
            }],
            outputs: vec![TxOut {
                amount: deposit_amount - fee,
                script_pubkey: self.output_script(to_address)?,
            }],
        };

        let digest = tx.signature_hash(0, redeem_script, self.sighash_type())?;
        let signature = self.provider().sign(&keys.privkey, &digest)?;
        tx.inputs[0].script_sig = ScriptBuilder::new()
            .push_data(&signature)
            .push_data(&keys.pubkey)
            .push_data(secret)
            .push_opcode(OP_FALSE)
            .push_data(redeem_script)
            .into_bytes();
        finish(tx)
    }

    /// Unsigned transaction for cooperative completion by the counterparty.
    /// The builder forwards it and never broadcasts.
    fn create_partial_transaction(
        &self,
        inputs: &[Utxo],
        outputs: &[TxOutput],
    ) -> Result<BuiltTransaction> {
        let tx = Transaction {
            version: self.params().tx_version,
            lock_time: 0,
            inputs: inputs
                .iter()
                .map(|u| TxIn {
                    txid: u.txid.clone(),
                    vout: u.vout,
                    script_sig: Vec::new(),
                    sequence: SEQUENCE_FINAL,
                })
                .collect(),
            outputs: outputs
                .iter()
                .map(|o| {
                    Ok(TxOut {
                        amount: o.amount,
                        script_pubkey: self.output_script(&o.address)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?,
        };
        finish(tx)
    }

    /// Complete a partially signed transaction by signing the remaining
    /// inputs with the wallet key.
    fn sign_transaction(&self, raw: &str, keys: &WalletKeys) -> Result<BuiltTransaction> {
        let mut tx = Transaction::from_raw(raw)?;
        self.sign_wallet_inputs(&mut tx, keys)?;
        finish(tx)
    }

    /// Sign every unsigned input as a plain wallet spend.
    fn sign_wallet_inputs(&self, tx: &mut Transaction, keys: &WalletKeys) -> Result<()> {
        let spend_script = p2pkh_script(&hash160(&keys.pubkey));
        for index in 0..tx.inputs.len() {
            if !tx.inputs[index].script_sig.is_empty() {
                continue;
            }
            let digest = tx.signature_hash(index, &spend_script, self.sighash_type())?;
            let signature = self.provider().sign(&keys.privkey, &digest)?;
            tx.inputs[index].script_sig = ScriptBuilder::new()
                .push_data(&signature)
                .push_data(&keys.pubkey)
                .into_bytes();
        }
        Ok(())
    }

    /// Scan a claim transaction for the preimage of `secret_hash`.
    async fn extract_secret(&self, claim_txid: &str, secret_hash: &[u8; 32]) -> Result<Option<[u8; 32]>> {
        let raw = retry_rpc("raw_transaction", self.retry(), || {
            self.rpc().raw_transaction(claim_txid)
        })
        .await?;
        let raw = match raw {
            Some(raw) => raw,
            None => return Ok(None),
        };
        let tx = Transaction::from_raw(&raw)?;
        for input in &tx.inputs {
            for push in script_pushes(&input.script_sig) {
                if push.len() == 32 {
                    let candidate: [u8; 32] = push.as_slice().try_into().map_err(|_| {
                        XBridgeError::Rpc("script push size changed mid-scan".to_string())
                    })?;
                    if sha256(&candidate) == *secret_hash {
                        return Ok(Some(candidate));
                    }
                }
            }
        }
        Ok(None)
    }
}

/// Generic UTXO/BTC-family connector, parameterised by signature scheme.
pub struct BtcWalletConnector<P: CryptoProvider> {
    params: ChainParams,
    provider: P,
    rpc: Arc<dyn ChainRpc>,
    retry: RetryConfig,
}

impl<P: CryptoProvider> BtcWalletConnector<P> {
    pub fn new(params: ChainParams, provider: P, rpc: Arc<dyn ChainRpc>) -> Self {
        Self {
            params,
            provider,
            rpc,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl<P: CryptoProvider> WalletConnector for BtcWalletConnector<P> {
    fn params(&self) -> &ChainParams {
        &self.params
    }

    fn provider(&self) -> &dyn CryptoProvider {
        &self.provider
    }

    fn rpc(&self) -> &dyn ChainRpc {
        self.rpc.as_ref()
    }

    fn retry(&self) -> &RetryConfig {
        &self.retry
    }
}

/// Fork-id chain family (BCH-style): identical transaction construction,
/// but the signature hash commits to the fork id.
pub struct BchWalletConnector<P: CryptoProvider>(BtcWalletConnector<P>);

impl<P: CryptoProvider> BchWalletConnector<P> {
    pub fn new(params: ChainParams, provider: P, rpc: Arc<dyn ChainRpc>) -> Self {
        Self(BtcWalletConnector::new(params, provider, rpc))
    }
}

#[async_trait]
impl<P: CryptoProvider> WalletConnector for BchWalletConnector<P> {
    fn params(&self) -> &ChainParams {
        self.0.params()
    }

    fn provider(&self) -> &dyn CryptoProvider {
        self.0.provider()
    }

    fn rpc(&self) -> &dyn ChainRpc {
        self.0.rpc()
    }

    fn retry(&self) -> &RetryConfig {
        self.0.retry()
    }

    fn sighash_type(&self) -> u8 {
        SIGHASH_FORKID
    }
}

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
