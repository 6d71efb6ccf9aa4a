//! Deferred payouts.
//!
//! Collateral owed to an account whose settlement was postponed, either on
//! request or because the direct transfer was rejected, accumulates here
//! until the beneficiary claims it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::utils::crypto::{Address, AssetId};
use crate::utils::math::safe_add;

/// Amounts owed per (asset, beneficiary)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutLedger {
    entries: BTreeMap<(AssetId, Address), u128>,
}

impl PayoutLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Add to a beneficiary's entry
    pub fn add(&mut self, asset: AssetId, beneficiary: Address, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let entry = self.entries.entry((asset, beneficiary)).or_insert(0);
        *entry = safe_add(*entry, amount)?;
        Ok(())
    }

    /// Amount owed to a beneficiary
    pub fn get(&self, asset: &AssetId, beneficiary: &Address) -> u128 {
        self.entries
            .get(&(*asset, *beneficiary))
            .copied()
            .unwrap_or(0)
    }

    /// Clear and return a beneficiary's entry
    pub fn claim(&mut self, asset: &AssetId, beneficiary: &Address) -> u128 {
        self.entries.remove(&(*asset, *beneficiary)).unwrap_or(0)
    }

    /// All entries
    pub fn iter(&self) -> impl Iterator<Item = (&(AssetId, Address), &u128)> {
        self.entries.iter()
    }

    /// Number of open entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is owed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
