//! Challenge auction building blocks.
//!
//! - Challenge records and the book of live challenges
//! - Price curves for the liquidation phase and expired collateral
//! - Deferred payout ledger

pub mod challenge;
pub mod payouts;
pub mod pricing;

pub use challenge::*;
pub use payouts::*;
pub use pricing::*;
