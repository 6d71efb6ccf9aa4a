//! Collateralized debt positions.
//!
//! A position locks one collateral asset and carries debt in the unit of
//! account. Debt is split into principal (minted, reserve-backed) and interest
//! accrued at a fixed annual rate. Positions cloned from one another form a
//! family rooted at the original; the family shares one minting limit, and the
//! original tracks the family-wide minted total.
//!
//! This module holds the per-position state and the checks that only need
//! the position itself. Operations that move tokens or touch other positions
//! live on the hub.

use serde::{Deserialize, Serialize};

use crate::core::collateral::CollateralKind;
use crate::core::token::TokenAmount;
use crate::error::{Error, Result};
use crate::utils::constants::PRICE_SCALE;
use crate::utils::crypto::{Address, AssetId};
use crate::utils::math::*;

// ═══════════════════════════════════════════════════════════════════════════════
// POSITION STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle state derived from a position's fields and the clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionState {
    /// Before `start`: no minting, collateral freely adjustable
    Initializing,
    /// Minting allowed within headroom, subject to cooldown
    Active,
    /// Collateral is under at least one live challenge
    Challenged,
    /// Past expiration: only wind-down and expired purchases
    Expired,
    /// Terminal
    Closed,
}

impl PositionState {
    /// Whether the state permits new debt
    pub fn can_mint(&self) -> bool {
        matches!(self, PositionState::Active)
    }
}

impl std::fmt::Display for PositionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionState::Initializing => write!(f, "Initializing"),
            PositionState::Active => write!(f, "Active"),
            PositionState::Challenged => write!(f, "Challenged"),
            PositionState::Expired => write!(f, "Expired"),
            PositionState::Closed => write!(f, "Closed"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// POSITION
// ═══════════════════════════════════════════════════════════════════════════════

/// A collateralized debt position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Position identity
    pub address: Address,
    /// Current owner
    pub owner: Address,
    /// Root of the clone family (equal to `address` for originals)
    pub original: Address,
    /// Collateral asset
    pub collateral: AssetId,
    /// Capability of the collateral asset, fixed at creation
    pub collateral_kind: CollateralKind,
    /// Collateral held in custody for this position
    pub collateral_balance: u128,
    /// Below this balance the position closes
    pub minimum_collateral: u128,
    /// Minting limit of the whole family
    pub limit: u128,
    /// Principal minted by the whole family (maintained on the original)
    pub total_minted: u128,
    /// Outstanding principal
    pub principal: u128,
    /// Accrued, unpaid interest
    pub interest: u128,
    /// Timestamp interest was last accrued
    pub last_accrual: u64,
    /// Liquidation price, scaled by `PRICE_SCALE`
    pub price: u128,
    /// Risk premium on top of the lead rate
    pub risk_premium_ppm: u32,
    /// Annual interest rate fixed at creation
    pub annual_rate_ppm: u32,
    /// Share of each mint set aside as reserve
    pub reserve_contribution_ppm: u32,
    /// End of the initialization period
    pub start: u64,
    /// Minting and withdrawals are restricted until this time
    pub cooldown: u64,
    /// Expiration timestamp
    pub expiration: u64,
    /// Length of each challenge phase
    pub challenge_period: u64,
    /// Collateral under live challenges
    pub challenged_amount: u128,
    /// Liquidation price recorded by the first concurrent challenge
    pub challenged_price: u128,
    /// Terminal flag
    pub closed: bool,
    /// Set while collateral leaves as native value
    pub native_withdrawal_in_progress: bool,
}

impl Position {
    /// Lifecycle state at `now`
    pub fn state(&self, now: u64) -> PositionState {
        if self.closed {
            PositionState::Closed
        } else if self.challenged_amount > 0 {
            PositionState::Challenged
        } else if now >= self.expiration {
            PositionState::Expired
        } else if now < self.start {
            PositionState::Initializing
        } else {
            PositionState::Active
        }
    }

    /// Whether this position is the root of its family
    pub fn is_original(&self) -> bool {
        self.original == self.address
    }

    /// Principal plus accrued interest
    pub fn debt(&self) -> Result<u128> {
        safe_add(self.principal, self.interest)
    }

    /// Whether the cooldown is running (covers the initialization period)
    pub fn is_hot(&self, now: u64) -> bool {
        now <= self.cooldown
    }

    /// Whether a cooldown armed after initialization is running
    pub fn in_cooldown_after_start(&self, now: u64) -> bool {
        self.cooldown > self.start && now <= self.cooldown
    }

    /// Whether the position has expired
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expiration
    }

    /// Collateral that counts towards solvency; dust below the minimum counts as zero
    pub fn relevant_collateral(&self) -> u128 {
        if self.collateral_balance < self.minimum_collateral {
            0
        } else {
            self.collateral_balance
        }
    }

    /// Collateral not covered by live challenges
    pub fn free_collateral(&self) -> u128 {
        self.collateral_balance.saturating_sub(self.challenged_amount)
    }

    /// Interest that would accrue between the last accrual and `now`
    pub fn pending_interest(&self, now: u64) -> Result<u128> {
        let elapsed = now.saturating_sub(self.last_accrual);
        accrued_interest(self.principal, self.annual_rate_ppm, elapsed)
    }

    /// Book interest accrued up to `now`; returns the newly accrued amount
    pub fn accrue_interest(&mut self, now: u64) -> Result<u128> {
        let accrued = self.pending_interest(now)?;
        if accrued > 0 {
            self.interest = safe_add(self.interest, accrued)?;
        }
        if now > self.last_accrual {
            self.last_accrual = now;
        }
        Ok(accrued)
    }

    /// Headroom an original leaves for its clones: the limit minus what the
    /// family minted and minus what the original could still mint itself
    pub fn available_for_clones(&self) -> Result<u128> {
        let potential = collateral_value(self.collateral_balance, self.price)?;
        let unused_potential = potential.saturating_sub(self.principal);
        let reserved = safe_add(self.total_minted, unused_potential)?;
        Ok(self.limit.saturating_sub(reserved))
    }

    /// Fail unless new debt may be minted at `now`
    pub fn ensure_mintable(&self, now: u64) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        if self.challenged_amount > 0 {
            return Err(Error::Challenged);
        }
        if self.is_expired(now) {
            return Err(Error::Expired {
                expiration: self.expiration,
            });
        }
        if self.is_hot(now) {
            return Err(Error::Hot {
                until: self.cooldown,
            });
        }
        Ok(())
    }

    /// Fail unless the position is alive, unchallenged and cooled down
    pub fn ensure_cloneable(&self, now: u64) -> Result<()> {
        self.ensure_mintable(now)
    }

    /// Fail if `collateral` at the liquidation price does not cover the debt
    pub fn check_solvency_with(&self, collateral: u128) -> Result<()> {
        let relevant = if collateral < self.minimum_collateral {
            0
        } else {
            collateral
        };
        let debt = self.debt()?;
        if !product_gte(relevant, self.price, debt, PRICE_SCALE) {
            return Err(Error::InsufficientCollateral {
                required: collateral_for_debt(debt, self.price).unwrap_or(u128::MAX),
                available: relevant,
            });
        }
        Ok(())
    }

    /// Fail if the current collateral does not cover the debt
    pub fn check_solvency(&self) -> Result<()> {
        self.check_solvency_with(self.collateral_balance)
    }

    /// Whether collateral covers principal at the liquidation price
    pub fn is_solvent(&self) -> bool {
        product_gte(
            self.collateral_balance,
            self.price,
            self.principal,
            PRICE_SCALE,
        )
    }

    /// Push the cooldown out to at least `now + period`
    pub fn restrict_minting(&mut self, now: u64, period: u64) {
        let until = now.saturating_add(period);
        if until > self.cooldown {
            self.cooldown = until;
        }
    }

    /// Close the position if its collateral fell below the minimum
    pub fn close_if_dust(&mut self) -> bool {
        if !self.closed && self.collateral_balance < self.minimum_collateral {
            self.closed = true;
            return true;
        }
        false
    }

    /// Remove `amount` of collateral from custody bookkeeping
    pub fn remove_collateral(&mut self, amount: u128) -> Result<()> {
        if amount > self.collateral_balance {
            return Err(Error::InsufficientCollateral {
                required: amount,
                available: self.collateral_balance,
            });
        }
        self.collateral_balance -= amount;
        Ok(())
    }

    /// Add collateral to custody bookkeeping
    pub fn add_collateral(&mut self, amount: u128) -> Result<()> {
        self.collateral_balance = safe_add(self.collateral_balance, amount)?;
        Ok(())
    }

    /// Reduce interest and principal, keeping interest from outliving principal
    pub fn reduce_debt(&mut self, principal: u128, interest: u128) -> Result<()> {
        self.interest = safe_sub(self.interest, interest)?;
        self.principal = safe_sub(self.principal, principal)?;
        if self.principal == 0 && self.interest > 0 {
            return Err(Error::Internal(format!(
                "position {} left with interest {} and no principal",
                self.address, self.interest
            )));
        }
        Ok(())
    }

    /// Short summary for logs
    pub fn summary(&self, now: u64) -> String {
        format!(
            "{} [{}] collateral {} principal {} interest {} price {}",
            self.address.short(),
            self.state(now),
            TokenAmount::from(self.collateral_balance),
            TokenAmount::from(self.principal),
            TokenAmount::from(self.interest),
            TokenAmount::from(self.price)
        )
    }
}
