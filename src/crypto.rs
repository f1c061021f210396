//! Signature primitives behind the wallet connectors
//!
//! Wrapper around schnorr_fun isolating each chain family's signature
//! scheme from transaction construction and session logic.

use crate::error::{Result, XBridgeError};
use ripemd::Ripemd160;
use schnorr_fun::{
    fun::{marker::*, KeyPair, Point, Scalar},
    Message, Schnorr, Signature,
};
use secp256kfun::nonce;
use sha2::{Digest, Sha256};

pub const SECRET_SIZE: usize = 32;
pub const PUBKEY_SIZE: usize = 32;
pub const SIGNATURE_SIZE: usize = 64;

/// SHA-256 of arbitrary bytes.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// RIPEMD-160 of SHA-256, used for key and script ids.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let mut hasher = Ripemd160::new();
    hasher.update(sha256(data));
    hasher.finalize().into()
}

/// Random 32-byte swap secret and its SHA-256 commitment.
pub fn generate_secret() -> ([u8; SECRET_SIZE], [u8; 32]) {
    use rand::RngCore;
    let mut secret = [0u8; SECRET_SIZE];
    rand::thread_rng().fill_bytes(&mut secret);
    let hash = sha256(&secret);
    (secret, hash)
}

/// The signing primitive a chain family needs to authorize transactions.
///
/// Connectors are injected with a provider so sighash conventions stay out
/// of both transaction building and session logic.
pub trait CryptoProvider: Send + Sync {
    /// Fresh (pubkey, privkey) pair.
    fn make_keypair(&self) -> (Vec<u8>, Vec<u8>);

    /// Public key for a private key.
    fn pubkey(&self, privkey: &[u8]) -> Result<Vec<u8>>;

    /// Sign a 32-byte script digest.
    fn sign(&self, privkey: &[u8], digest: &[u8; 32]) -> Result<Vec<u8>>;

    /// Verify a signature over a 32-byte script digest.
    fn verify(&self, pubkey: &[u8], digest: &[u8; 32], signature: &[u8]) -> bool;
}

/// BIP340 Schnorr over secp256k1, the scheme of the UTXO chain family.
pub struct BtcCryptoProvider {
    schnorr: Schnorr<Sha256, nonce::Deterministic<Sha256>>,
}

impl BtcCryptoProvider {
    pub fn new() -> Self {
        Self {
            schnorr: Schnorr::<Sha256, _>::default(),
        }
    }

    fn scalar_from_privkey(privkey: &[u8]) -> Result<Scalar> {
        let bytes: [u8; 32] = privkey
            .try_into()
            .map_err(|_| XBridgeError::SigningFailed("private key is not 32 bytes".to_string()))?;
        Scalar::from_bytes(bytes)
            .and_then(|s| s.non_zero())
            .ok_or_else(|| XBridgeError::SigningFailed("private key out of range".to_string()))
    }
}

impl Default for BtcCryptoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CryptoProvider for BtcCryptoProvider {
    fn make_keypair(&self) -> (Vec<u8>, Vec<u8>) {
        let secret = Scalar::random(&mut rand::thread_rng());
        let keypair = KeyPair::<EvenY>::new_xonly(secret.clone());
        let pubkey = keypair.public_key().to_xonly_bytes().to_vec();
        (pubkey, secret.to_bytes().to_vec())
    }

    fn pubkey(&self, privkey: &[u8]) -> Result<Vec<u8>> {
        let secret = Self::scalar_from_privkey(privkey)?;
        let keypair = KeyPair::<EvenY>::new_xonly(secret);
        Ok(keypair.public_key().to_xonly_bytes().to_vec())
    }

    fn sign(&self, privkey: &[u8], digest: &[u8; 32]) -> Result<Vec<u8>> {
        let secret = Self::scalar_from_privkey(privkey)?;
        let keypair = KeyPair::<EvenY>::new_xonly(secret);
        let message = Message::<Public>::plain("xbridge", &digest[..]);
        let signature = self.schnorr.sign(&keypair, message);
        Ok(signature.to_bytes().to_vec())
    }

    fn verify(&self, pubkey: &[u8], digest: &[u8; 32], signature: &[u8]) -> bool {
        let pubkey_bytes: [u8; 32] = match pubkey.try_into() {
            Ok(b) => b,
            Err(_) => return false,
        };
        let sig_bytes: [u8; 64] = match signature.try_into() {
            Ok(b) => b,
            Err(_) => return false,
        };
        let (public_key, signature) = match (
            Point::<EvenY>::from_xonly_bytes(pubkey_bytes),
            Signature::from_bytes(sig_bytes),
        ) {
            (Some(p), Some(s)) => (p, s),
            _ => return false,
        };
        let message = Message::<Public>::plain("xbridge", &digest[..]);
        self.schnorr.verify(&public_key, message, &signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let provider = BtcCryptoProvider::new();
        let (pubkey, privkey) = provider.make_keypair();
        assert_eq!(pubkey.len(), PUBKEY_SIZE);

        let digest = sha256(b"spend the deposit");
        let signature = provider.sign(&privkey, &digest).unwrap();
        assert_eq!(signature.len(), SIGNATURE_SIZE);
        assert!(provider.verify(&pubkey, &digest, &signature));

        let other = sha256(b"different digest");
        assert!(!provider.verify(&pubkey, &other, &signature));

        let (other_pubkey, _) = provider.make_keypair();
        assert!(!provider.verify(&other_pubkey, &digest, &signature));
    }

    #[test]
    fn pubkey_derivation_matches_keypair() {
        let provider = BtcCryptoProvider::new();
        let (pubkey, privkey) = provider.make_keypair();
        assert_eq!(provider.pubkey(&privkey).unwrap(), pubkey);
    }

    #[test]
    fn deterministic_signatures() {
        let provider = BtcCryptoProvider::new();
        let (_, privkey) = provider.make_keypair();
        let digest = sha256(b"same message");
        let a = provider.sign(&privkey, &digest).unwrap();
        let b = provider.sign(&privkey, &digest).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn secret_commitment() {
        let (secret, hash) = generate_secret();
        assert_eq!(sha256(&secret), hash);
        assert_eq!(hash160(&secret).len(), 20);
    }

    #[test]
    fn rejects_malformed_private_keys() {
        let provider = BtcCryptoProvider::new();
        let digest = sha256(b"x");
        assert!(provider.sign(&[1u8; 16], &digest).is_err());
        assert!(provider.sign(&[0u8; 32], &digest).is_err());
    }
}
