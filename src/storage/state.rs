//! Hub state persistence.
//!
//! Positions, live challenges and deferred payouts are stored one record per
//! key so they can be listed and inspected individually; everything else the
//! hub owns (token and asset ledgers, nonces, counters, clock) is stored as a
//! single metadata record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::auction::challenge::Challenge;
use crate::auction::payouts::PayoutLedger;
use crate::core::collateral::AssetLedger;
use crate::core::position::Position;
use crate::error::Result;
use crate::storage::backend::{make_key, prefixes, StorageBackend, TypedStore};
use crate::utils::crypto::{Address, AssetId, Hash};

/// Current layout version of stored metadata
pub const STATE_VERSION: u32 = 1;

const META_KEY: &[u8] = b"hub";

// ═══════════════════════════════════════════════════════════════════════════════
// STORED RECORDS
// ═══════════════════════════════════════════════════════════════════════════════

/// Hub-wide metadata record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubMeta<U> {
    /// Layout version
    pub version: u32,
    /// Unit-of-account ledger
    pub token: U,
    /// Collateral and native ledger
    pub assets: AssetLedger,
    /// Last used nonce per signer
    pub nonces: BTreeMap<Address, u64>,
    /// Number the next challenge will receive
    pub next_challenge: u64,
    /// Counter for position address derivation
    pub position_nonce: u64,
    /// Last block height
    pub block_height: u64,
    /// Last block timestamp
    pub timestamp: u64,
}

/// One deferred payout entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRecord {
    /// Asset owed
    pub asset: AssetId,
    /// Beneficiary
    pub beneficiary: Address,
    /// Amount owed
    pub amount: u128,
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATE MANAGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Typed access to persisted hub state
pub struct StateManager<B: StorageBackend> {
    store: TypedStore<B>,
}

impl<B: StorageBackend> StateManager<B> {
    /// Create a state manager over a backend
    pub fn new(backend: B) -> Self {
        Self {
            store: TypedStore::new(backend),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // POSITIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Store a position
    pub fn save_position(&self, position: &Position) -> Result<()> {
        let key = make_key(prefixes::POSITION, position.address.as_bytes());
        self.store.set(&key, position)
    }

    /// Load a position by address
    pub fn load_position(&self, address: &Address) -> Result<Option<Position>> {
        self.store
            .get(&make_key(prefixes::POSITION, address.as_bytes()))
    }

    /// Load every stored position
    pub fn load_all_positions(&self) -> Result<Vec<Position>> {
        self.store.load_prefix(prefixes::POSITION)
    }

    /// Number of stored positions
    pub fn count_positions(&self) -> Result<usize> {
        Ok(self.store.list_prefix(prefixes::POSITION)?.len())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CHALLENGES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Replace the stored set of live challenges
    pub fn replace_challenges<'a, I>(&self, challenges: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Challenge>,
    {
        self.store.clear_prefix(prefixes::CHALLENGE)?;
        for challenge in challenges {
            let key = make_key(prefixes::CHALLENGE, &challenge.number.to_be_bytes());
            self.store.set(&key, challenge)?;
        }
        Ok(())
    }

    /// Load live challenges in number order
    pub fn load_challenges(&self) -> Result<Vec<Challenge>> {
        self.store.load_prefix(prefixes::CHALLENGE)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PAYOUTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Replace the stored payout ledger
    pub fn replace_payouts(&self, ledger: &PayoutLedger) -> Result<()> {
        self.store.clear_prefix(prefixes::PAYOUT)?;
        for ((asset, beneficiary), amount) in ledger.iter() {
            let mut id = Vec::with_capacity(40);
            id.extend_from_slice(asset.as_bytes());
            id.extend_from_slice(beneficiary.as_bytes());
            let record = PayoutRecord {
                asset: *asset,
                beneficiary: *beneficiary,
                amount: *amount,
            };
            self.store.set(&make_key(prefixes::PAYOUT, &id), &record)?;
        }
        Ok(())
    }

    /// Rebuild the payout ledger from storage
    pub fn load_payouts(&self) -> Result<PayoutLedger> {
        let records: Vec<PayoutRecord> = self.store.load_prefix(prefixes::PAYOUT)?;
        let mut ledger = PayoutLedger::new();
        for record in records {
            ledger.add(record.asset, record.beneficiary, record.amount)?;
        }
        Ok(ledger)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // METADATA
    // ═══════════════════════════════════════════════════════════════════════════

    /// Store hub metadata
    pub fn save_meta<U: Serialize>(&self, meta: &HubMeta<U>) -> Result<()> {
        self.store.set(&make_key(prefixes::META, META_KEY), meta)
    }

    /// Load hub metadata, if any was stored
    pub fn load_meta<U: serde::de::DeserializeOwned>(&self) -> Result<Option<HubMeta<U>>> {
        self.store.get(&make_key(prefixes::META, META_KEY))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // UTILITIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Hash of all stored position records, in key order
    pub fn compute_state_root(&self) -> Result<Hash> {
        let mut data = Vec::new();
        for key in self.store.list_prefix(prefixes::POSITION)? {
            if let Some(value) = self.store.backend().get(&key)? {
                data.extend_from_slice(&key);
                data.extend_from_slice(&value);
            }
        }
        Ok(Hash::sha256(&data))
    }

    /// Flush pending writes
    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }

    /// Clear all stored data
    pub fn clear(&self) -> Result<()> {
        self.store.clear()
    }

    /// Underlying backend
    pub fn backend(&self) -> &B {
        self.store.backend()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auction::challenge::ChallengeBook;
    use crate::core::collateral::CollateralKind;
    use crate::core::token::StableToken;
    use crate::storage::backend::InMemoryStore;

    fn position(label: &str) -> Position {
        let address = Address::from_label(label);
        Position {
            address,
            owner: Address::from_label("owner"),
            original: address,
            collateral: AssetId::from_symbol("WETH"),
            collateral_kind: CollateralKind::Token,
            collateral_balance: 10,
            minimum_collateral: 1,
            limit: 1_000,
            total_minted: 0,
            principal: 0,
            interest: 0,
            last_accrual: 0,
            price: 100,
            risk_premium_ppm: 0,
            annual_rate_ppm: 0,
            reserve_contribution_ppm: 200_000,
            start: 10,
            cooldown: 10,
            expiration: 100,
            challenge_period: 5,
            challenged_amount: 0,
            challenged_price: 0,
            closed: false,
            native_withdrawal_in_progress: false,
        }
    }

    #[test]
    fn test_position_persistence() {
        let manager = StateManager::new(InMemoryStore::new());
        let p = position("a");
        manager.save_position(&p).unwrap();
        manager.save_position(&position("b")).unwrap();

        assert_eq!(manager.load_position(&p.address).unwrap(), Some(p));
        assert_eq!(manager.count_positions().unwrap(), 2);
        assert_eq!(manager.load_all_positions().unwrap().len(), 2);
    }

    #[test]
    fn test_challenges_are_replaced() {
        let manager = StateManager::new(InMemoryStore::new());
        let mut book = ChallengeBook::new();
        let a = Address::from_label("a");
        book.open(a, a, 1, 0, 1, 1);
        book.open(a, a, 2, 0, 1, 1);
        manager.replace_challenges(book.iter()).unwrap();
        assert_eq!(manager.load_challenges().unwrap().len(), 2);

        book.reduce(0, 1).unwrap();
        manager.replace_challenges(book.iter()).unwrap();
        let loaded = manager.load_challenges().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].number, 1);
    }

    #[test]
    fn test_payouts_roundtrip() {
        let manager = StateManager::new(InMemoryStore::new());
        let mut ledger = PayoutLedger::new();
        let asset = AssetId::from_symbol("WETH");
        ledger.add(asset, Address::from_label("x"), 9).unwrap();
        manager.replace_payouts(&ledger).unwrap();
        assert_eq!(manager.load_payouts().unwrap(), ledger);
    }

    #[test]
    fn test_meta_roundtrip() {
        let manager = StateManager::new(InMemoryStore::new());
        assert!(manager.load_meta::<StableToken>().unwrap().is_none());

        let meta = HubMeta {
            version: STATE_VERSION,
            token: StableToken::new(),
            assets: AssetLedger::new(),
            nonces: BTreeMap::new(),
            next_challenge: 3,
            position_nonce: 2,
            block_height: 7,
            timestamp: 1_000,
        };
        manager.save_meta(&meta).unwrap();
        assert_eq!(manager.load_meta::<StableToken>().unwrap(), Some(meta));
    }

    #[test]
    fn test_state_root_tracks_positions() {
        let manager = StateManager::new(InMemoryStore::new());
        let empty = manager.compute_state_root().unwrap();
        manager.save_position(&position("a")).unwrap();
        assert_ne!(manager.compute_state_root().unwrap(), empty);
    }
}
