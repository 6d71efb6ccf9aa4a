//! Position creation.
//!
//! The factory builds position records; it holds no state and moves no funds.
//! Fees, custody and the family minting total are the hub's business.

use serde::{Deserialize, Serialize};

use crate::core::collateral::CollateralKind;
use crate::core::position::Position;
use crate::error::{Error, Result};
use crate::utils::crypto::{Address, AssetId};
use crate::utils::math::safe_add_time;

// ═══════════════════════════════════════════════════════════════════════════════
// PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Parameters of a new original position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenPositionParams {
    /// Collateral asset
    pub collateral: AssetId,
    /// Balance below which the position closes
    pub minimum_collateral: u128,
    /// Collateral deposited at opening
    pub initial_collateral: u128,
    /// Minting limit shared with all future clones
    pub limit: u128,
    /// Initialization period in seconds
    pub init_period: u64,
    /// Lifetime after initialization in seconds
    pub duration: u64,
    /// Length of each challenge phase in seconds
    pub challenge_period: u64,
    /// Risk premium added to the lead rate
    pub risk_premium_ppm: u32,
    /// Liquidation price scaled by `PRICE_SCALE`
    pub liquidation_price: u128,
    /// Share of each mint booked as reserve
    pub reserve_contribution_ppm: u32,
}

/// Parameters of a clone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClonePositionParams {
    /// Owner of the new position
    pub owner: Address,
    /// Position to clone
    pub parent: Address,
    /// Collateral deposited into the clone
    pub initial_collateral: u128,
    /// Amount minted to the owner right away
    pub initial_mint: u128,
    /// Expiration of the clone
    pub expiration: u64,
    /// Liquidation price; the parent's price when absent
    pub liquidation_price: Option<u128>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// FACTORY
// ═══════════════════════════════════════════════════════════════════════════════

/// Stateless builder of position records
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionFactory;

impl PositionFactory {
    /// Build an original position opened at `now`
    pub fn create(
        address: Address,
        owner: Address,
        params: &OpenPositionParams,
        kind: CollateralKind,
        annual_rate_ppm: u32,
        now: u64,
    ) -> Result<Position> {
        let start = safe_add_time(now, params.init_period)?;
        let expiration = safe_add_time(start, params.duration)?;

        Ok(Position {
            address,
            owner,
            original: address,
            collateral: params.collateral,
            collateral_kind: kind,
            collateral_balance: params.initial_collateral,
            minimum_collateral: params.minimum_collateral,
            limit: params.limit,
            total_minted: 0,
            principal: 0,
            interest: 0,
            last_accrual: now,
            price: params.liquidation_price,
            risk_premium_ppm: params.risk_premium_ppm,
            annual_rate_ppm,
            reserve_contribution_ppm: params.reserve_contribution_ppm,
            start,
            cooldown: start,
            expiration,
            challenge_period: params.challenge_period,
            challenged_amount: 0,
            challenged_price: 0,
            closed: false,
            native_withdrawal_in_progress: false,
        })
    }

    /// Build a clone of `parent` owned by `owner`.
    ///
    /// The clone starts empty of debt at the parent's price; the caller mints
    /// and reprices it afterwards.
    pub fn clone_position(
        parent: &Position,
        address: Address,
        owner: Address,
        initial_collateral: u128,
        expiration: u64,
        annual_rate_ppm: u32,
        now: u64,
    ) -> Result<Position> {
        if initial_collateral < parent.minimum_collateral {
            return Err(Error::InsufficientCollateral {
                required: parent.minimum_collateral,
                available: initial_collateral,
            });
        }

        Ok(Position {
            address,
            owner,
            original: parent.original,
            collateral: parent.collateral,
            collateral_kind: parent.collateral_kind,
            collateral_balance: initial_collateral,
            minimum_collateral: parent.minimum_collateral,
            limit: parent.limit,
            total_minted: 0,
            principal: 0,
            interest: 0,
            last_accrual: now,
            price: parent.price,
            risk_premium_ppm: parent.risk_premium_ppm,
            annual_rate_ppm,
            reserve_contribution_ppm: parent.reserve_contribution_ppm,
            start: parent.start,
            cooldown: parent.cooldown,
            expiration,
            challenge_period: parent.challenge_period,
            challenged_amount: 0,
            challenged_price: 0,
            closed: false,
            native_withdrawal_in_progress: false,
        })
    }
}
