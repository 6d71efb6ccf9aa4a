//! Auction price curves.
//!
//! Two curves exist. During a challenge's liquidation phase the price decays
//! from the challenge price to zero over one phase. After a position expires,
//! its collateral is offered at a multiple of the liquidation price that falls
//! to the liquidation price over one challenge period and to zero over a
//! second one.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils::constants::{DEFAULT_DECAY_EXPONENT, MAX_DECAY_EXPONENT};
use crate::utils::math::{mul_div, safe_add_time, safe_mul, safe_sub};

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION PHASE DECAY
// ═══════════════════════════════════════════════════════════════════════════════

/// Polynomial decay `price * (time_left / phase)^exponent`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceDecay {
    exponent: u32,
}

impl Default for PriceDecay {
    fn default() -> Self {
        Self {
            exponent: DEFAULT_DECAY_EXPONENT,
        }
    }
}

impl PriceDecay {
    /// Linear decay
    pub fn linear() -> Self {
        Self::default()
    }

    /// Decay with the given exponent (1 to 3)
    pub fn new(exponent: u32) -> Result<Self> {
        if exponent == 0 || exponent > MAX_DECAY_EXPONENT {
            return Err(Error::InvalidParameter {
                name: "decay_exponent".into(),
                reason: format!("{} outside 1..={}", exponent, MAX_DECAY_EXPONENT),
            });
        }
        Ok(Self { exponent })
    }

    /// Curve exponent
    pub fn exponent(&self) -> u32 {
        self.exponent
    }

    /// Price at `now` for a phase that began at `phase_start`
    pub fn price_at(&self, start_price: u128, phase_start: u64, phase: u64, now: u64) -> Result<u128> {
        if now <= phase_start {
            return Ok(start_price);
        }
        let end = safe_add_time(phase_start, phase)?;
        if now >= end {
            return Ok(0);
        }
        let time_left = (end - now) as u128;
        let mut price = start_price;
        for _ in 0..self.exponent {
            price = mul_div(price, time_left, phase as u128)?;
        }
        Ok(price)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPIRED COLLATERAL
// ═══════════════════════════════════════════════════════════════════════════════

/// Price per unit of an expired position's collateral at `now`
pub fn expired_purchase_price(
    liquidation_price: u128,
    expiration: u64,
    challenge_period: u64,
    factor: u128,
    now: u64,
) -> Result<u128> {
    let high = safe_mul(factor, liquidation_price)?;
    if now <= expiration {
        return Ok(high);
    }

    let first_end = safe_add_time(expiration, challenge_period)?;
    if now < first_end {
        let time_left = (first_end - now) as u128;
        let excess = safe_sub(high, liquidation_price)?;
        let premium = mul_div(excess, time_left, challenge_period as u128)?;
        return Ok(liquidation_price + premium);
    }

    let second_end = safe_add_time(first_end, challenge_period)?;
    if now < second_end {
        let time_left = (second_end - now) as u128;
        return mul_div(liquidation_price, time_left, challenge_period as u128);
    }

    Ok(0)
}
