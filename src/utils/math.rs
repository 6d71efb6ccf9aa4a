//! Checked arithmetic and fixed-point helpers.
//!
//! Amounts are `u128` in 18-decimal base units and prices are scaled by
//! [`PRICE_SCALE`]. The product of a collateral amount and a price can
//! exceed `u128`, so every `a * b / c` goes through a 256-bit intermediate.

use alloy_primitives::U256;

use crate::error::{Error, Result};
use crate::utils::constants::{PPM, PRICE_SCALE, SECONDS_PER_YEAR};

// ═══════════════════════════════════════════════════════════════════════════════
// SAFE ARITHMETIC OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Safe addition with overflow check
pub fn safe_add(a: u128, b: u128) -> Result<u128> {
    a.checked_add(b).ok_or(Error::Overflow {
        operation: format!("{} + {}", a, b),
    })
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u128, b: u128) -> Result<u128> {
    a.checked_sub(b).ok_or(Error::Underflow {
        operation: format!("{} - {}", a, b),
    })
}

/// Safe multiplication with overflow check
pub fn safe_mul(a: u128, b: u128) -> Result<u128> {
    a.checked_mul(b).ok_or(Error::Overflow {
        operation: format!("{} * {}", a, b),
    })
}

/// Safe timestamp addition
pub fn safe_add_time(a: u64, b: u64) -> Result<u64> {
    a.checked_add(b).ok_or(Error::Overflow {
        operation: format!("{} + {} (time)", a, b),
    })
}

fn divisor_check(c: u128) -> Result<()> {
    if c == 0 {
        return Err(Error::InvalidParameter {
            name: "divisor".into(),
            reason: "division by zero".into(),
        });
    }
    Ok(())
}

fn narrow(value: U256, operation: impl FnOnce() -> String) -> Result<u128> {
    u128::try_from(value).map_err(|_| Error::Overflow {
        operation: operation(),
    })
}

/// Computes `(a * b) / c` rounding down, with a 256-bit intermediate
pub fn mul_div(a: u128, b: u128, c: u128) -> Result<u128> {
    divisor_check(c)?;
    let result = U256::from(a) * U256::from(b) / U256::from(c);
    narrow(result, || format!("({} * {}) / {}", a, b, c))
}

/// Computes `(a * b) / c` rounding up, with a 256-bit intermediate
pub fn mul_div_up(a: u128, b: u128, c: u128) -> Result<u128> {
    divisor_check(c)?;
    let numerator = U256::from(a) * U256::from(b);
    let divisor = U256::from(c);
    let mut result = numerator / divisor;
    if numerator % divisor != U256::ZERO {
        result += U256::from(1u8);
    }
    narrow(result, || format!("ceil(({} * {}) / {})", a, b, c))
}

/// Returns true when `a * b >= c * d`, compared without overflow
pub fn product_gte(a: u128, b: u128, c: u128, d: u128) -> bool {
    U256::from(a) * U256::from(b) >= U256::from(c) * U256::from(d)
}

// ═══════════════════════════════════════════════════════════════════════════════
// VALUE CALCULATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Value of `collateral` at `price`, rounded down
pub fn collateral_value(collateral: u128, price: u128) -> Result<u128> {
    mul_div(collateral, price, PRICE_SCALE)
}

/// Collateral needed so that `collateral * price >= debt * PRICE_SCALE`
pub fn collateral_for_debt(debt: u128, price: u128) -> Result<u128> {
    if price == 0 {
        return Err(Error::InvalidParameter {
            name: "price".into(),
            reason: "cannot be zero".into(),
        });
    }
    mul_div_up(debt, PRICE_SCALE, price)
}

/// Share of `amount` given in parts per million, rounded down
pub fn ppm_of(amount: u128, ppm: u32) -> Result<u128> {
    mul_div(amount, ppm as u128, PPM)
}

/// Amount left after removing a `ppm` share
pub fn net_of_ppm(amount: u128, ppm: u32) -> Result<u128> {
    safe_sub(amount, ppm_of(amount, ppm)?)
}

/// Smallest gross amount whose net after a `ppm` share is at least `net`
pub fn gross_for_net(net: u128, ppm: u32) -> Result<u128> {
    let ppm = ppm as u128;
    if ppm >= PPM {
        return Err(Error::InvalidParameter {
            name: "ppm".into(),
            reason: "share must be below 100%".into(),
        });
    }
    mul_div_up(net, PPM, PPM - ppm)
}

/// Interest owed on `principal` after `elapsed` seconds at an annual `rate_ppm`
pub fn accrued_interest(principal: u128, rate_ppm: u32, elapsed: u64) -> Result<u128> {
    if principal == 0 || rate_ppm == 0 || elapsed == 0 {
        return Ok(0);
    }
    let numerator = U256::from(principal) * U256::from(rate_ppm) * U256::from(elapsed);
    let denominator = U256::from(PPM) * U256::from(SECONDS_PER_YEAR);
    narrow(numerator / denominator, || {
        format!("interest({}, {}, {})", principal, rate_ppm, elapsed)
    })
}
