//! Protocol constants and magic numbers.
//!
//! All protocol-wide constants are defined here for easy auditing and modification.
//! Values that governance may tune at deployment are mirrored as defaults in
//! [`HubConfig`](crate::core::config::HubConfig).

// ═══════════════════════════════════════════════════════════════════════════════
// UNIT OF ACCOUNT
// ═══════════════════════════════════════════════════════════════════════════════

/// Decimals of the unit of account and of collateral amounts
pub const TOKEN_DECIMALS: u32 = 18;

/// One whole unit (10^18 base units)
pub const ONE: u128 = 1_000_000_000_000_000_000;

/// Scale of liquidation prices: `collateral * price / PRICE_SCALE` is a value in base units
pub const PRICE_SCALE: u128 = ONE;

/// Parts-per-million divisor (1_000_000 = 100%)
pub const PPM: u128 = 1_000_000;

// ═══════════════════════════════════════════════════════════════════════════════
// FEES AND REWARDS
// ═══════════════════════════════════════════════════════════════════════════════

/// One-time fee charged when a new original position is opened (1000 units)
pub const OPENING_FEE: u128 = 1_000 * ONE;

/// Share of a liquidation offer paid to the challenger - 2%
pub const CHALLENGER_REWARD_PPM: u32 = 20_000;

/// Multiple of the liquidation price charged right after expiration
pub const EXPIRED_PRICE_FACTOR: u128 = 10;

/// Minimum value of a position's minimum collateral at its own price (5000 units)
pub const MIN_COLLATERAL_VALUE: u128 = 5_000 * ONE;

/// Clones may raise the liquidation price to at most this multiple of the parent's
pub const MAX_CLONE_PRICE_FACTOR: u128 = 2;

// ═══════════════════════════════════════════════════════════════════════════════
// TIME CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// One day in seconds
pub const DAY: u64 = 86_400;

/// Seconds per year used for interest accrual
pub const SECONDS_PER_YEAR: u64 = 365 * DAY;

/// Minimum initialization period of a new position - 3 days
pub const MIN_INIT_PERIOD: u64 = 3 * DAY;

/// Minimum challenge period - 1 day
pub const MIN_CHALLENGE_PERIOD: u64 = DAY;

/// Cooldown armed by a liquidation price increase - 3 days
pub const PRICE_INCREASE_COOLDOWN: u64 = 3 * DAY;

/// Minting restriction after an averted or successful challenge - 1 day
pub const CHALLENGE_COOLDOWN: u64 = DAY;

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE DECAY
// ═══════════════════════════════════════════════════════════════════════════════

/// Default exponent of the phase-2 price curve (linear)
pub const DEFAULT_DECAY_EXPONENT: u32 = 1;

/// Largest supported phase-2 decay exponent
pub const MAX_DECAY_EXPONENT: u32 = 3;

// ═══════════════════════════════════════════════════════════════════════════════
// CRYPTOGRAPHIC CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Compressed public key length in bytes
pub const PUBKEY_LENGTH: usize = 33;

/// Compact signature length in bytes
pub const SIGNATURE_LENGTH: usize = 64;

/// Hash length in bytes
pub const HASH_LENGTH: usize = 32;

/// Account address length in bytes
pub const ADDRESS_LENGTH: usize = 20;

/// Domain tag mixed into every signed message
pub const SIGNING_DOMAIN: &[u8] = b"MintingHub:";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_relationships() {
        assert!(OPENING_FEE < MIN_COLLATERAL_VALUE);
        assert!((CHALLENGER_REWARD_PPM as u128) < PPM);
    }

    #[test]
    fn test_time_relationships() {
        assert!(MIN_INIT_PERIOD >= MIN_CHALLENGE_PERIOD);
        assert_eq!(PRICE_INCREASE_COOLDOWN, MIN_INIT_PERIOD);
        assert!(CHALLENGE_COOLDOWN <= PRICE_INCREASE_COOLDOWN);
    }
}
