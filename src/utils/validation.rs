//! Input validation for position parameters.
//!
//! These checks run before any state is touched, so a rejected request
//! leaves the hub unchanged.

use crate::core::config::HubConfig;
use crate::core::factory::OpenPositionParams;
use crate::error::{Error, Result};
use crate::utils::constants::*;
use crate::utils::math::{mul_div, product_gte};

// ═══════════════════════════════════════════════════════════════════════════════
// AMOUNT VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate that an amount is non-zero
pub fn validate_non_zero(amount: u128) -> Result<()> {
    if amount == 0 {
        return Err(Error::ZeroAmount);
    }
    Ok(())
}

/// Validate that a ppm value does not exceed one million
pub fn validate_ppm(value: u32, name: &str) -> Result<()> {
    if value as u128 > PPM {
        return Err(Error::InvalidParameter {
            name: name.into(),
            reason: format!("{} ppm exceeds {}", value, PPM),
        });
    }
    Ok(())
}

/// Validate that a period meets its configured minimum
pub fn validate_period(value: u64, minimum: u64, name: &str) -> Result<()> {
    if value < minimum {
        return Err(Error::InvalidParameter {
            name: name.into(),
            reason: format!("{}s below minimum {}s", value, minimum),
        });
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// POSITION VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Validate the parameters of a new original position
pub fn validate_open_params(params: &OpenPositionParams, config: &HubConfig) -> Result<()> {
    validate_ppm(params.risk_premium_ppm, "risk_premium_ppm")?;
    validate_ppm(params.reserve_contribution_ppm, "reserve_contribution_ppm")?;

    if params.reserve_contribution_ppm < config.challenger_reward_ppm {
        return Err(Error::InvalidParameter {
            name: "reserve_contribution_ppm".into(),
            reason: format!(
                "{} ppm below challenger reward {} ppm",
                params.reserve_contribution_ppm, config.challenger_reward_ppm
            ),
        });
    }

    if config.lead_rate_ppm as u128 + params.risk_premium_ppm as u128 > u32::MAX as u128 {
        return Err(Error::Overflow {
            operation: "annual rate".into(),
        });
    }

    validate_period(
        params.challenge_period,
        config.min_challenge_period,
        "challenge_period",
    )?;
    validate_period(params.init_period, config.min_init_period, "init_period")?;
    validate_non_zero(params.duration as u128).map_err(|_| Error::InvalidParameter {
        name: "duration".into(),
        reason: "must be positive".into(),
    })?;

    if params.initial_collateral < params.minimum_collateral {
        return Err(Error::InsufficientCollateral {
            required: params.minimum_collateral,
            available: params.initial_collateral,
        });
    }

    // The minimum collateral has to be worth something at the liquidation price
    if !product_gte(
        params.minimum_collateral,
        params.liquidation_price,
        config.min_collateral_value,
        PRICE_SCALE,
    ) {
        return Err(Error::InvalidParameter {
            name: "minimum_collateral".into(),
            reason: "value at liquidation price below minimum collateral value".into(),
        });
    }

    // price * initial <= limit * scale
    if !product_gte(
        params.limit,
        PRICE_SCALE,
        params.initial_collateral,
        params.liquidation_price,
    ) {
        return Err(Error::PriceTooHigh {
            price: params.liquidation_price,
            max: mul_div(params.limit, PRICE_SCALE, params.initial_collateral)?,
        });
    }

    Ok(())
}
