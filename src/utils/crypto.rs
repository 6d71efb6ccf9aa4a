//! Cryptographic primitives and identities.
//!
//! This module provides:
//! - Hashes (SHA256)
//! - Private keys, public keys and compact ECDSA signatures (secp256k1)
//! - Account addresses and collateral asset identifiers
//!
//! Signed hub operations are verified with real secp256k1 ECDSA over a
//! domain-separated SHA256 digest.

use secp256k1::{
    ecdsa::Signature as Secp256k1Signature, Message, PublicKey as Secp256k1PubKey, Secp256k1,
    SecretKey,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{Error, Result};
use crate::utils::constants::{
    ADDRESS_LENGTH, HASH_LENGTH, PUBKEY_LENGTH, SIGNATURE_LENGTH, SIGNING_DOMAIN,
};

// ═══════════════════════════════════════════════════════════════════════════════
// SECP256K1 CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

thread_local! {
    static SECP: Secp256k1<secp256k1::All> = Secp256k1::new();
}

/// Execute a function with the secp256k1 context
fn with_secp<F, R>(f: F) -> R
where
    F: FnOnce(&Secp256k1<secp256k1::All>) -> R,
{
    SECP.with(|secp| f(secp))
}

/// Fixed-size byte identifiers serialize as hex strings
macro_rules! impl_hex_serde {
    ($ty:ident, $len:expr) => {
        impl Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&hex::encode(self.0))
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                let bytes = hex::decode(s.trim_start_matches("0x"))
                    .map_err(serde::de::Error::custom)?;
                if bytes.len() != $len {
                    return Err(serde::de::Error::custom(format!(
                        "expected {} bytes, got {}",
                        $len,
                        bytes.len()
                    )));
                }
                let mut arr = [0u8; $len];
                arr.copy_from_slice(&bytes);
                Ok($ty(arr))
            }
        }
    };
}

fn decode_fixed<const N: usize>(name: &str, s: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(s.trim_start_matches("0x")).map_err(|e| Error::InvalidParameter {
        name: name.into(),
        reason: e.to_string(),
    })?;
    if bytes.len() != N {
        return Err(Error::InvalidParameter {
            name: name.into(),
            reason: format!("expected {} bytes, got {}", N, bytes.len()),
        });
    }
    let mut arr = [0u8; N];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

// ═══════════════════════════════════════════════════════════════════════════════
// HASH
// ═══════════════════════════════════════════════════════════════════════════════

/// A 32-byte cryptographic hash
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hash([u8; HASH_LENGTH]);

impl_hex_serde!(Hash, HASH_LENGTH);

impl Hash {
    /// Create a new hash from bytes
    pub fn new(bytes: [u8; HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Compute SHA256 hash of data
    pub fn sha256(data: &[u8]) -> Self {
        let result = Sha256::digest(data);
        let mut bytes = [0u8; HASH_LENGTH];
        bytes.copy_from_slice(&result);
        Self(bytes)
    }

    /// Get the hash as bytes
    pub fn as_bytes(&self) -> &[u8; HASH_LENGTH] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Create from hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        decode_fixed::<HASH_LENGTH>("hash", s).map(Self)
    }

    /// Zero hash (all zeros)
    pub fn zero() -> Self {
        Self([0u8; HASH_LENGTH])
    }

    /// Check if hash is zero
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LENGTH]
    }

    /// Convert to secp256k1 Message for signing
    pub fn to_message(&self) -> Message {
        Message::from_digest(self.0)
    }
}

impl Default for Hash {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRIVATE KEY
// ═══════════════════════════════════════════════════════════════════════════════

/// Private key length in bytes
pub const PRIVATE_KEY_LENGTH: usize = 32;

/// A secp256k1 private key for signing operations
#[derive(Clone)]
pub struct PrivateKey {
    inner: SecretKey,
}

impl PrivateKey {
    /// Create a new private key from bytes
    pub fn from_bytes(bytes: &[u8; PRIVATE_KEY_LENGTH]) -> Result<Self> {
        let inner = SecretKey::from_slice(bytes).map_err(|e| Error::CryptoError {
            operation: "private_key_from_bytes".into(),
            details: e.to_string(),
        })?;
        Ok(Self { inner })
    }

    /// Generate a new random private key
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let inner = SecretKey::new(&mut rng);
        Self { inner }
    }

    /// Create from hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = decode_fixed::<PRIVATE_KEY_LENGTH>("private_key", s)?;
        Self::from_bytes(&bytes)
    }

    /// Get the corresponding public key
    pub fn public_key(&self) -> PublicKey {
        with_secp(|secp| {
            let pk = Secp256k1PubKey::from_secret_key(secp, &self.inner);
            PublicKey::new(pk.serialize())
        })
    }

    /// Sign a message hash
    pub fn sign(&self, message: &Hash) -> Signature {
        with_secp(|secp| {
            let sig = secp.sign_ecdsa(&message.to_message(), &self.inner);
            Signature::new(sig.serialize_compact())
        })
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PUBLIC KEY
// ═══════════════════════════════════════════════════════════════════════════════

/// A compressed secp256k1 public key (33 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; PUBKEY_LENGTH]);

impl_hex_serde!(PublicKey, PUBKEY_LENGTH);

impl PublicKey {
    /// Create a new public key from bytes (must be valid compressed format)
    pub fn new(bytes: [u8; PUBKEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the public key as bytes
    pub fn as_bytes(&self) -> &[u8; PUBKEY_LENGTH] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Create from hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        decode_fixed::<PUBKEY_LENGTH>("public_key", s).map(Self)
    }

    /// Account address controlled by this key
    pub fn address(&self) -> Address {
        Address::from_public_key(self)
    }

    /// Verify that this is a valid secp256k1 public key
    pub fn is_valid(&self) -> bool {
        Secp256k1PubKey::from_slice(&self.0).is_ok()
    }

    /// Verify a signature against this public key
    pub fn verify(&self, message: &Hash, signature: &Signature) -> bool {
        verify_signature(self, message, signature)
    }

    fn to_secp256k1(self) -> Option<Secp256k1PubKey> {
        Secp256k1PubKey::from_slice(&self.0).ok()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}...)", &self.to_hex()[..16])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIGNATURE
// ═══════════════════════════════════════════════════════════════════════════════

/// A compact ECDSA signature (64 bytes)
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_LENGTH]);

impl_hex_serde!(Signature, SIGNATURE_LENGTH);

impl Signature {
    /// Create a new signature from bytes
    pub fn new(bytes: [u8; SIGNATURE_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the signature as bytes
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LENGTH] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Create from hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        decode_fixed::<SIGNATURE_LENGTH>("signature", s).map(Self)
    }

    fn to_secp256k1(self) -> Option<Secp256k1Signature> {
        Secp256k1Signature::from_compact(&self.0).ok()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", &self.to_hex()[..16])
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ADDRESS
// ═══════════════════════════════════════════════════════════════════════════════

/// A 20-byte account address
///
/// Users are addressed by the truncated hash of their public key; positions
/// get a derived address from their opener and a per-hub nonce.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl_hex_serde!(Address, ADDRESS_LENGTH);

impl Address {
    /// The zero address
    pub const ZERO: Self = Self([0u8; ADDRESS_LENGTH]);

    /// Create an address from raw bytes
    pub const fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Address controlled by a public key
    pub fn from_public_key(key: &PublicKey) -> Self {
        Self::truncate(&Hash::sha256(key.as_bytes()))
    }

    /// Deterministic address derived from a creator and a nonce
    pub fn derive(creator: &Address, nonce: u64) -> Self {
        let mut data = Vec::with_capacity(ADDRESS_LENGTH + 8 + 9);
        data.extend_from_slice(b"position:");
        data.extend_from_slice(&creator.0);
        data.extend_from_slice(&nonce.to_be_bytes());
        Self::truncate(&Hash::sha256(&data))
    }

    /// Address derived from a human-readable label
    pub fn from_label(label: &str) -> Self {
        Self::truncate(&Hash::sha256(label.as_bytes()))
    }

    fn truncate(hash: &Hash) -> Self {
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&hash.as_bytes()[HASH_LENGTH - ADDRESS_LENGTH..]);
        Self(bytes)
    }

    /// Get the address as bytes
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Create from hex string (optional `0x` prefix)
    pub fn from_hex(s: &str) -> Result<Self> {
        decode_fixed::<ADDRESS_LENGTH>("address", s).map(Self)
    }

    /// Short representation for logs
    pub fn short(&self) -> String {
        let hex = self.to_hex();
        format!("0x{}..{}", &hex[..6], &hex[hex.len() - 4..])
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.short())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

/// Custody account of the minting hub (challenger stakes, bids in flight)
pub const HUB_ADDRESS: Address = Address::new([0x11; ADDRESS_LENGTH]);

/// Account of the position roller (flash-minted funds, collateral in transit)
pub const ROLLER_ADDRESS: Address = Address::new([0x22; ADDRESS_LENGTH]);

/// Account holding the unit of account's equity reserve
pub const RESERVE_ADDRESS: Address = Address::new([0x33; ADDRESS_LENGTH]);

// ═══════════════════════════════════════════════════════════════════════════════
// ASSET ID
// ═══════════════════════════════════════════════════════════════════════════════

/// Identifier of a fungible collateral asset
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId([u8; ADDRESS_LENGTH]);

impl_hex_serde!(AssetId, ADDRESS_LENGTH);

impl AssetId {
    /// Create from raw bytes
    pub const fn new(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Asset identifier derived from a ticker symbol
    pub fn from_symbol(symbol: &str) -> Self {
        let hash = Hash::sha256(format!("asset:{}", symbol).as_bytes());
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes.copy_from_slice(&hash.as_bytes()[..ADDRESS_LENGTH]);
        Self(bytes)
    }

    /// Get the identifier as bytes
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetId({}..)", &self.to_hex()[..8])
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIGNATURE VERIFICATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Verify a signature against a message and public key
pub fn verify_signature(pubkey: &PublicKey, message: &Hash, signature: &Signature) -> bool {
    let pk = match pubkey.to_secp256k1() {
        Some(pk) => pk,
        None => return false,
    };

    let sig = match signature.to_secp256k1() {
        Some(sig) => sig,
        None => return false,
    };

    with_secp(|secp| secp.verify_ecdsa(&message.to_message(), &sig, &pk).is_ok())
}

/// Create a message hash for signing with domain separation
pub fn create_message_hash(operation: &str, data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(SIGNING_DOMAIN);
    hasher.update(operation.as_bytes());
    hasher.update(b":");
    hasher.update(data);
    let result = hasher.finalize();
    let mut bytes = [0u8; HASH_LENGTH];
    bytes.copy_from_slice(&result);
    Hash::new(bytes)
}

// ═══════════════════════════════════════════════════════════════════════════════
// KEY PAIR
// ═══════════════════════════════════════════════════════════════════════════════

/// A key pair containing both private and public keys
#[derive(Clone)]
pub struct KeyPair {
    private: PrivateKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::from_private(PrivateKey::generate())
    }

    /// Create from a private key
    pub fn from_private(private: PrivateKey) -> Self {
        let public = private.public_key();
        Self { private, public }
    }

    /// Get the public key
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Address controlled by this key pair
    pub fn address(&self) -> Address {
        self.public.address()
    }

    /// Sign a message hash
    pub fn sign(&self, message: &Hash) -> Signature {
        self.private.sign(message)
    }

    /// Verify a signature
    pub fn verify(&self, message: &Hash, signature: &Signature) -> bool {
        self.public.verify(message, signature)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair {{ public: {:?} }}", self.public)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_sha256() {
        let hash = Hash::sha256(b"hello world");
        let expected =
            Hash::from_hex("b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9")
                .unwrap();
        assert_eq!(hash, expected);
    }

    #[test]
    fn test_key_pair_sign_verify() {
        let keypair = KeyPair::generate();
        let message = Hash::sha256(b"test message");

        let signature = keypair.sign(&message);
        assert!(keypair.verify(&message, &signature));

        let wrong_message = Hash::sha256(b"wrong message");
        assert!(!keypair.verify(&wrong_message, &signature));

        let other = KeyPair::generate();
        assert!(!verify_signature(other.public_key(), &message, &signature));
    }

    #[test]
    fn test_private_key_hex_roundtrip() {
        let key = PrivateKey::from_hex(
            "0101010101010101010101010101010101010101010101010101010101010101",
        )
        .unwrap();
        assert!(key.public_key().is_valid());
        assert!(PrivateKey::from_hex("00").is_err());
    }

    #[test]
    fn test_address_derivation() {
        let keypair = KeyPair::generate();
        assert_eq!(keypair.address(), Address::from_public_key(keypair.public_key()));

        let creator = Address::from_label("alice");
        assert_ne!(Address::derive(&creator, 0), Address::derive(&creator, 1));
        assert_eq!(Address::derive(&creator, 7), Address::derive(&creator, 7));
    }

    #[test]
    fn test_address_serde_hex() {
        let addr = Address::from_label("bob");
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", addr.to_hex()));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
        assert_eq!(Address::from_hex(&addr.to_string()).unwrap(), addr);
    }

    #[test]
    fn test_asset_ids_distinct() {
        assert_ne!(AssetId::from_symbol("WETH"), AssetId::from_symbol("WBTC"));
        assert_eq!(AssetId::from_symbol("WETH"), AssetId::from_symbol("WETH"));
    }

    #[test]
    fn test_message_hash_domain_separation() {
        assert_ne!(create_message_hash("mint", b"x"), create_message_hash("repay", b"x"));
    }
}
