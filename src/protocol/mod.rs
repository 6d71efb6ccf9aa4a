//! Protocol module - the minting hub and its operations.
//!
//! This module provides the hub that owns all positions and orchestrates
//! every operation atomically:
//! - Position lifecycle (open, mint, repay, adjust, clone)
//! - Challenge auctions and expired collateral sales
//! - Debt rollover between positions
//! - Signed operation dispatch and emitted events

pub mod events;
pub mod liquidation;
pub mod minting_hub;
pub mod operations;
pub mod roller;

pub use events::*;
pub use minting_hub::*;
pub use operations::*;
pub use roller::*;
