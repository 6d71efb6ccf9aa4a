//! Collateral asset ledger.
//!
//! Holds balances of every fungible collateral asset plus the chain's native
//! value. One asset may be designated as the wrapped form of native value; it
//! can be wrapped and unwrapped one to one.
//!
//! Collateral locked in a position is not an account balance here: custody
//! moves it out of the ledger with [`AssetLedger::take`] and back with
//! [`AssetLedger::give`], while the position record keeps the amount.
//!
//! Two kinds of recipient misbehaviour are modelled so settlement paths can be
//! exercised: accounts that reject native value and accounts frozen for a
//! given asset (token transfers to them are rejected).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::utils::crypto::{Address, AssetId};
use crate::utils::math::*;

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERAL KIND
// ═══════════════════════════════════════════════════════════════════════════════

/// Capability tag cached on a position when it is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollateralKind {
    /// Plain fungible token
    Token,
    /// The hub's wrapped native asset, accepts native deposits and withdrawals
    WrappedNative,
}

impl CollateralKind {
    /// Whether native value may stand in for this collateral
    pub fn accepts_native(&self) -> bool {
        matches!(self, CollateralKind::WrappedNative)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ASSET LEDGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Balances of collateral assets and native value
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetLedger {
    /// Token balances by (asset, account)
    balances: BTreeMap<(AssetId, Address), u128>,
    /// Outstanding supply per asset, including amounts in custody
    supplies: BTreeMap<AssetId, u128>,
    /// Native value balances
    native: BTreeMap<Address, u128>,
    /// Accounts that refuse incoming native value
    native_rejecting: BTreeSet<Address>,
    /// Accounts frozen for an asset
    frozen: BTreeSet<(AssetId, Address)>,
    /// Asset that wraps native value
    wrapped_native: Option<AssetId>,
}

impl AssetLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger with `asset` designated as wrapped native value
    pub fn with_wrapped_native(asset: AssetId) -> Self {
        Self {
            wrapped_native: Some(asset),
            ..Self::default()
        }
    }

    /// The wrapped native asset, if any
    pub fn wrapped_native(&self) -> Option<AssetId> {
        self.wrapped_native
    }

    /// Capability of `asset`
    pub fn kind_of(&self, asset: &AssetId) -> CollateralKind {
        if self.wrapped_native.as_ref() == Some(asset) {
            CollateralKind::WrappedNative
        } else {
            CollateralKind::Token
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TOKEN BALANCES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Balance of `account` in `asset`
    pub fn balance_of(&self, asset: &AssetId, account: &Address) -> u128 {
        self.balances.get(&(*asset, *account)).copied().unwrap_or(0)
    }

    /// Outstanding supply of `asset`
    pub fn supply_of(&self, asset: &AssetId) -> u128 {
        self.supplies.get(asset).copied().unwrap_or(0)
    }

    /// Create new units of `asset` for `to`
    pub fn mint(&mut self, asset: &AssetId, to: &Address, amount: u128) -> Result<()> {
        let supply = self.supply_of(asset);
        self.supplies.insert(*asset, safe_add(supply, amount)?);
        self.credit(asset, to, amount)
    }

    /// Move `amount` of `asset` between accounts
    pub fn transfer(
        &mut self,
        asset: &AssetId,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        self.ensure_not_frozen(asset, to)?;
        self.debit(asset, from, amount)?;
        self.credit(asset, to, amount)
    }

    /// Move `amount` of `asset` from `from` into custody
    pub fn take(&mut self, asset: &AssetId, from: &Address, amount: u128) -> Result<()> {
        self.debit(asset, from, amount)
    }

    /// Release `amount` of `asset` from custody to `to`
    pub fn give(&mut self, asset: &AssetId, to: &Address, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        self.ensure_not_frozen(asset, to)?;
        self.credit(asset, to, amount)
    }

    /// Freeze or unfreeze `account` for `asset`
    pub fn set_frozen(&mut self, asset: &AssetId, account: &Address, frozen: bool) {
        if frozen {
            self.frozen.insert((*asset, *account));
        } else {
            self.frozen.remove(&(*asset, *account));
        }
    }

    fn ensure_not_frozen(&self, asset: &AssetId, to: &Address) -> Result<()> {
        if self.frozen.contains(&(*asset, *to)) {
            return Err(Error::TransferRejected(to.to_string()));
        }
        Ok(())
    }

    fn credit(&mut self, asset: &AssetId, to: &Address, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let balance = self.balance_of(asset, to);
        self.balances.insert((*asset, *to), safe_add(balance, amount)?);
        Ok(())
    }

    fn debit(&mut self, asset: &AssetId, from: &Address, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let balance = self.balance_of(asset, from);
        if balance < amount {
            return Err(Error::InsufficientBalance {
                required: amount,
                available: balance,
            });
        }
        if balance == amount {
            self.balances.remove(&(*asset, *from));
        } else {
            self.balances.insert((*asset, *from), balance - amount);
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // NATIVE VALUE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Native balance of `account`
    pub fn native_balance(&self, account: &Address) -> u128 {
        self.native.get(account).copied().unwrap_or(0)
    }

    /// Credit native value out of thin air (genesis allocation)
    pub fn fund_native(&mut self, account: &Address, amount: u128) -> Result<()> {
        let balance = self.native_balance(account);
        self.native.insert(*account, safe_add(balance, amount)?);
        Ok(())
    }

    /// Remove native value from `account`
    pub fn debit_native(&mut self, account: &Address, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let balance = self.native_balance(account);
        if balance < amount {
            return Err(Error::InsufficientBalance {
                required: amount,
                available: balance,
            });
        }
        if balance == amount {
            self.native.remove(account);
        } else {
            self.native.insert(*account, balance - amount);
        }
        Ok(())
    }

    /// Send native value, failing if the recipient rejects it
    pub fn send_native(&mut self, from: &Address, to: &Address, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        if self.native_rejecting.contains(to) {
            return Err(Error::NativeTransferFailed(to.to_string()));
        }
        self.debit_native(from, amount)?;
        self.fund_native(to, amount)
    }

    /// Mark `account` as rejecting (or accepting) native value
    pub fn set_native_rejecting(&mut self, account: &Address, rejecting: bool) {
        if rejecting {
            self.native_rejecting.insert(*account);
        } else {
            self.native_rejecting.remove(account);
        }
    }

    /// Whether `account` accepts native value
    pub fn accepts_native(&self, account: &Address) -> bool {
        !self.native_rejecting.contains(account)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // WRAPPING
    // ═══════════════════════════════════════════════════════════════════════════

    fn wrapped_asset(&self) -> Result<AssetId> {
        self.wrapped_native.ok_or(Error::NativeOnlyForWrappedAsset)
    }

    /// Turn native value held by `account` into the wrapped asset
    pub fn wrap(&mut self, account: &Address, amount: u128) -> Result<()> {
        let asset = self.wrapped_asset()?;
        self.debit_native(account, amount)?;
        self.mint(&asset, account, amount)
    }

    /// Turn wrapped asset held by `account` back into native value
    pub fn unwrap(&mut self, account: &Address, amount: u128) -> Result<()> {
        let asset = self.wrapped_asset()?;
        self.debit(&asset, account, amount)?;
        let supply = self.supply_of(&asset);
        self.supplies.insert(asset, safe_sub(supply, amount)?);
        self.fund_native(account, amount)
    }

    /// Wrap native value held by `account` straight into custody
    pub fn wrap_into_custody(&mut self, account: &Address, amount: u128) -> Result<()> {
        self.wrap(account, amount)?;
        let asset = self.wrapped_asset()?;
        self.take(&asset, account, amount)
    }

    /// Release wrapped collateral from custody to `account` as native value
    pub fn unwrap_from_custody(&mut self, account: &Address, amount: u128) -> Result<()> {
        let asset = self.wrapped_asset()?;
        self.credit(&asset, account, amount)?;
        self.unwrap(account, amount)
    }
}
