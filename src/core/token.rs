//! Unit-of-account token.
//!
//! The minting hub only needs a narrow surface from the stablecoin: balances,
//! plain mint/burn/transfer, and a reserve facility that books a share of every
//! mint as a minter reserve and absorbs profits and losses. That surface is the
//! [`UnitOfAccount`] trait; [`StableToken`] is the in-memory ledger used by the
//! hub and its tests.
//!
//! Reserve accounting follows one rule: the reserve account holds the minter
//! reserve plus equity. Minting with a reserve contribution credits the reserve
//! account and raises the minter reserve by the same amount; repaying with
//! reserve releases it; everything the reserve account holds above the minter
//! reserve is equity, which pays for losses before new tokens are minted.

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::utils::constants::{PPM, TOKEN_DECIMALS};
use crate::utils::crypto::{Address, RESERVE_ADDRESS};
use crate::utils::math::*;

// ═══════════════════════════════════════════════════════════════════════════════
// TOKEN AMOUNT
// ═══════════════════════════════════════════════════════════════════════════════

/// Strongly-typed 18-decimal amount, used for display and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TokenAmount(u128);

impl TokenAmount {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Create from base units
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// Create from whole units
    pub fn from_units(units: u64) -> Self {
        Self(units as u128 * 10u128.pow(TOKEN_DECIMALS))
    }

    /// Raw base units
    pub fn raw(&self) -> u128 {
        self.0
    }

    /// Check if zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Decimal representation with trailing zeros stripped
    pub fn to_string_formatted(&self) -> String {
        match i128::try_from(self.0)
            .ok()
            .and_then(|raw| Decimal::try_from_i128_with_scale(raw, TOKEN_DECIMALS).ok())
        {
            Some(decimal) => decimal.normalize().to_string(),
            None => format!("{}e-{}", self.0, TOKEN_DECIMALS),
        }
    }

    /// Saturating subtraction
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_string_formatted())
    }
}

impl From<u128> for TokenAmount {
    fn from(raw: u128) -> Self {
        Self(raw)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// UNIT OF ACCOUNT INTERFACE
// ═══════════════════════════════════════════════════════════════════════════════

/// Operations the minting hub needs from the stablecoin ledger.
///
/// Zero amounts are accepted and leave the ledger unchanged.
pub trait UnitOfAccount: Clone + fmt::Debug + Default + Serialize + DeserializeOwned {
    /// Balance of an account
    fn balance_of(&self, account: &Address) -> u128;

    /// Total supply
    fn total_supply(&self) -> u128;

    /// Reserve currently owed back to minters on repayment
    fn minter_reserve(&self) -> u128;

    /// Reserve holdings above the minter reserve
    fn equity(&self) -> u128;

    /// Move tokens between accounts
    fn transfer(&mut self, from: &Address, to: &Address, amount: u128) -> Result<()>;

    /// Create tokens
    fn mint(&mut self, to: &Address, amount: u128) -> Result<()>;

    /// Destroy tokens held by `from`
    fn burn_from(&mut self, from: &Address, amount: u128) -> Result<()>;

    /// Mint `amount`, crediting `to` with the part not set aside as reserve.
    ///
    /// Returns the amount credited to `to`.
    fn mint_with_reserve(&mut self, to: &Address, amount: u128, reserve_ppm: u32)
        -> Result<u128>;

    /// Retire `target_total_burn` of debt, taking the assigned reserve from the
    /// reserve account and the rest from `payer`. Returns what `payer` paid.
    fn burn_from_with_reserve(
        &mut self,
        payer: &Address,
        target_total_burn: u128,
        reserve_ppm: u32,
    ) -> Result<u128>;

    /// Retire debt by paying `net` from `payer`, topped up from the reserve.
    /// Returns the gross amount of debt retired.
    fn burn_with_reserve(&mut self, payer: &Address, net: u128, reserve_ppm: u32) -> Result<u128>;

    /// Burn `amount` from `payer`, releasing the matching minter reserve into equity
    fn burn_without_reserve(&mut self, payer: &Address, amount: u128, reserve_ppm: u32)
        -> Result<()>;

    /// Move `amount` from `source` into the reserve as profit
    fn collect_profits(&mut self, source: &Address, amount: u128) -> Result<()>;

    /// Pay `amount` to `to` out of the reserve account's whole balance,
    /// minter reserve included, minting whatever the balance cannot cover
    fn cover_loss(&mut self, to: &Address, amount: u128) -> Result<()>;

    /// Reserve assigned to `minted` at `reserve_ppm`, scaled down when the
    /// reserve account holds less than the minter reserve
    fn assigned_reserve(&self, minted: u128, reserve_ppm: u32) -> u128;
}

// ═══════════════════════════════════════════════════════════════════════════════
// STABLE TOKEN
// ═══════════════════════════════════════════════════════════════════════════════

/// In-memory stablecoin ledger with a reserve facility
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StableToken {
    /// Token symbol
    pub symbol: String,
    /// Total supply
    total_supply: u128,
    /// Balances by account
    balances: BTreeMap<Address, u128>,
    /// Minter reserve scaled by one million
    minter_reserve_e6: u128,
    /// Account holding reserve and equity
    reserve: Address,
}

impl Default for StableToken {
    fn default() -> Self {
        Self::new()
    }
}

impl StableToken {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self {
            symbol: "USDX".to_string(),
            total_supply: 0,
            balances: BTreeMap::new(),
            minter_reserve_e6: 0,
            reserve: RESERVE_ADDRESS,
        }
    }

    /// Account holding reserve and equity
    pub fn reserve_account(&self) -> Address {
        self.reserve
    }

    /// Verify supply invariant (total_supply == sum of all balances)
    pub fn verify_supply_invariant(&self) -> bool {
        let sum = self
            .balances
            .values()
            .try_fold(0u128, |acc, b| acc.checked_add(*b));
        sum == Some(self.total_supply)
    }

    fn credit(&mut self, to: &Address, amount: u128) -> Result<()> {
        let balance = self.balance_of(to);
        self.balances.insert(*to, safe_add(balance, amount)?);
        Ok(())
    }

    fn debit(&mut self, from: &Address, amount: u128) -> Result<()> {
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(Error::InsufficientBalance {
                required: amount,
                available: balance,
            });
        }
        let remaining = balance - amount;
        if remaining == 0 {
            self.balances.remove(from);
        } else {
            self.balances.insert(*from, remaining);
        }
        Ok(())
    }

    fn release_minter_reserve(&mut self, amount: u128, reserve_ppm: u32) -> Result<()> {
        let reduction = safe_mul(amount, reserve_ppm as u128)?;
        self.minter_reserve_e6 = self.minter_reserve_e6.saturating_sub(reduction);
        Ok(())
    }

    /// Reserve ratio actually backed by the reserve account
    fn effective_reserve_ppm(&self, reserve_ppm: u32) -> Result<u32> {
        let minter_reserve = self.minter_reserve();
        let held = self.balance_of(&self.reserve);
        if minter_reserve == 0 || held >= minter_reserve {
            return Ok(reserve_ppm);
        }
        let scaled = mul_div(reserve_ppm as u128, held, minter_reserve)?;
        u32::try_from(scaled).map_err(|_| Error::Overflow {
            operation: "effective reserve ppm".into(),
        })
    }
}

impl UnitOfAccount for StableToken {
    fn balance_of(&self, account: &Address) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn total_supply(&self) -> u128 {
        self.total_supply
    }

    fn minter_reserve(&self) -> u128 {
        self.minter_reserve_e6 / PPM
    }

    fn equity(&self) -> u128 {
        self.balance_of(&self.reserve)
            .saturating_sub(self.minter_reserve())
    }

    fn transfer(&mut self, from: &Address, to: &Address, amount: u128) -> Result<()> {
        if amount == 0 || from == to {
            return Ok(());
        }
        self.debit(from, amount)?;
        self.credit(to, amount)
    }

    fn mint(&mut self, to: &Address, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        self.total_supply = safe_add(self.total_supply, amount)?;
        self.credit(to, amount)
    }

    fn burn_from(&mut self, from: &Address, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        self.debit(from, amount)?;
        self.total_supply = safe_sub(self.total_supply, amount)?;
        Ok(())
    }

    fn mint_with_reserve(
        &mut self,
        to: &Address,
        amount: u128,
        reserve_ppm: u32,
    ) -> Result<u128> {
        let usable = net_of_ppm(amount, reserve_ppm)?;
        let reserve_share = amount - usable;
        self.mint(to, usable)?;
        let reserve = self.reserve;
        self.mint(&reserve, reserve_share)?;
        self.minter_reserve_e6 = safe_add(
            self.minter_reserve_e6,
            safe_mul(amount, reserve_ppm as u128)?,
        )?;
        Ok(usable)
    }

    fn burn_from_with_reserve(
        &mut self,
        payer: &Address,
        target_total_burn: u128,
        reserve_ppm: u32,
    ) -> Result<u128> {
        let assigned = self.assigned_reserve(target_total_burn, reserve_ppm);
        let paid = safe_sub(target_total_burn, assigned)?;
        self.burn_from(payer, paid)?;
        let reserve = self.reserve;
        self.burn_from(&reserve, assigned)?;
        self.release_minter_reserve(target_total_burn, reserve_ppm)?;
        Ok(paid)
    }

    fn burn_with_reserve(&mut self, payer: &Address, net: u128, reserve_ppm: u32) -> Result<u128> {
        if net == 0 {
            return Ok(0);
        }
        let effective = self.effective_reserve_ppm(reserve_ppm)? as u128;
        if effective >= PPM {
            return Err(Error::InvalidParameter {
                name: "reserve_ppm".into(),
                reason: "fully reserved debt has no net repayment".into(),
            });
        }
        let freed = mul_div(net, PPM, PPM - effective)?;
        let reserve = self.reserve;
        self.transfer(payer, &reserve, net)?;
        self.burn_from(&reserve, freed)?;
        self.release_minter_reserve(freed, reserve_ppm)?;
        Ok(freed)
    }

    fn burn_without_reserve(
        &mut self,
        payer: &Address,
        amount: u128,
        reserve_ppm: u32,
    ) -> Result<()> {
        self.burn_from(payer, amount)?;
        self.release_minter_reserve(amount, reserve_ppm)
    }

    fn collect_profits(&mut self, source: &Address, amount: u128) -> Result<()> {
        let reserve = self.reserve;
        self.transfer(source, &reserve, amount)
    }

    fn cover_loss(&mut self, to: &Address, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let reserve = self.reserve;
        let available = self.balance_of(&reserve);
        if available >= amount {
            self.transfer(&reserve, to, amount)
        } else {
            self.transfer(&reserve, to, available)?;
            self.mint(to, amount - available)
        }
    }

    fn assigned_reserve(&self, minted: u128, reserve_ppm: u32) -> u128 {
        let theoretical = ppm_of(minted, reserve_ppm).unwrap_or(0);
        let minter_reserve = self.minter_reserve();
        let held = self.balance_of(&self.reserve);
        if held < minter_reserve && minter_reserve > 0 {
            mul_div(theoretical, held, minter_reserve).unwrap_or(0)
        } else {
            theoretical
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::ONE;

    fn alice() -> Address {
        Address::from_label("alice")
    }

    fn bob() -> Address {
        Address::from_label("bob")
    }

    #[test]
    fn test_token_amount_display() {
        assert_eq!(TokenAmount::from_units(1_500).to_string(), "1500");
        assert_eq!(TokenAmount::from_raw(ONE / 4).to_string(), "0.25");
        assert_eq!(TokenAmount::ZERO.to_string(), "0");
    }

    #[test]
    fn test_mint_burn_transfer() {
        let mut token = StableToken::new();
        token.mint(&alice(), 1000).unwrap();
        token.transfer(&alice(), &bob(), 400).unwrap();
        assert_eq!(token.balance_of(&alice()), 600);
        assert_eq!(token.balance_of(&bob()), 400);

        token.burn_from(&bob(), 100).unwrap();
        assert_eq!(token.total_supply(), 900);
        assert!(token.verify_supply_invariant());

        let result = token.transfer(&bob(), &alice(), 1000);
        assert!(matches!(result, Err(Error::InsufficientBalance { .. })));
    }

    #[test]
    fn test_mint_with_reserve_books_reserve() {
        let mut token = StableToken::new();
        let usable = token.mint_with_reserve(&alice(), 1_000 * ONE, 200_000).unwrap();

        assert_eq!(usable, 800 * ONE);
        assert_eq!(token.balance_of(&alice()), 800 * ONE);
        assert_eq!(token.balance_of(&RESERVE_ADDRESS), 200 * ONE);
        assert_eq!(token.minter_reserve(), 200 * ONE);
        assert_eq!(token.equity(), 0);
    }

    #[test]
    fn test_burn_from_with_reserve_charges_net() {
        let mut token = StableToken::new();
        token.mint_with_reserve(&alice(), 1_000 * ONE, 200_000).unwrap();

        let paid = token.burn_from_with_reserve(&alice(), 1_000 * ONE, 200_000).unwrap();
        assert_eq!(paid, 800 * ONE);
        assert_eq!(token.total_supply(), 0);
        assert_eq!(token.minter_reserve(), 0);
        assert!(token.verify_supply_invariant());
    }

    #[test]
    fn test_burn_with_reserve_partial() {
        let mut token = StableToken::new();
        token.mint_with_reserve(&alice(), 1_000 * ONE, 200_000).unwrap();

        let freed = token.burn_with_reserve(&alice(), 400 * ONE, 200_000).unwrap();
        assert_eq!(freed, 500 * ONE);
        assert_eq!(token.balance_of(&alice()), 400 * ONE);
        assert_eq!(token.minter_reserve(), 100 * ONE);
        assert_eq!(token.balance_of(&RESERVE_ADDRESS), 100 * ONE);
        assert!(token.verify_supply_invariant());
    }

    #[test]
    fn test_burn_without_reserve_turns_reserve_into_equity() {
        let mut token = StableToken::new();
        token.mint_with_reserve(&alice(), 1_000 * ONE, 200_000).unwrap();
        token.mint(&bob(), 1_000 * ONE).unwrap();

        token.burn_without_reserve(&bob(), 1_000 * ONE, 200_000).unwrap();
        assert_eq!(token.minter_reserve(), 0);
        assert_eq!(token.equity(), 200 * ONE);
    }

    #[test]
    fn test_cover_loss_uses_equity_then_mints() {
        let mut token = StableToken::new();
        token.mint(&alice(), 50).unwrap();
        token.collect_profits(&alice(), 50).unwrap();
        assert_eq!(token.equity(), 50);

        token.cover_loss(&bob(), 80).unwrap();
        assert_eq!(token.balance_of(&bob()), 80);
        assert_eq!(token.equity(), 0);
        assert_eq!(token.total_supply(), 80);
    }

    #[test]
    fn test_assigned_reserve_scales_when_depleted() {
        let mut token = StableToken::new();
        token.mint_with_reserve(&alice(), 1_000, 200_000).unwrap();
        assert_eq!(token.assigned_reserve(1_000, 200_000), 200);

        // Half of the reserve holdings leave
        token.cover_loss(&bob(), 100).unwrap();
        assert_eq!(token.assigned_reserve(1_000, 200_000), 100);
    }
}
