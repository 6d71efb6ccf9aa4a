//! # MintingHub
//!
//! Collateralized debt engine for a decentralized stablecoin. Anyone may open
//! a position by locking collateral and proposing a liquidation price; the
//! price is enforced socially through challenges instead of an oracle.
//!
//! ## Architecture
//!
//! The crate consists of several modules:
//!
//! - **Core**: Configuration, positions, the position factory and the
//!   unit-of-account and collateral ledgers
//! - **Auction**: Challenge records, price decay curves and deferred payouts
//! - **Protocol**: The minting hub, liquidation, the position roller and
//!   signed operations
//! - **Storage**: Pluggable persistence of hub state
//!
//! ## Example
//!
//! ```rust,ignore
//! use mintinghub::prelude::*;
//!
//! let mut hub = MintingHub::in_memory(HubConfig::default())?;
//! hub.begin_block(1, now)?;
//!
//! // Open a position and mint against it once initialized
//! let position = hub.open_position(Call::new(owner), params)?;
//! let usable = hub.mint(Call::new(owner), position, owner, amount)?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    unused_lifetimes,
    unused_qualifications
)]

pub mod auction;
pub mod core;
pub mod error;
pub mod protocol;
pub mod storage;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::auction::{
        challenge::{BidOutcome, Challenge, ChallengePhase, Settlement},
        payouts::PayoutLedger,
        pricing::PriceDecay,
    };
    pub use crate::core::{
        collateral::{AssetLedger, CollateralKind},
        config::HubConfig,
        factory::{ClonePositionParams, OpenPositionParams, PositionFactory},
        position::{Position, PositionState},
        token::{StableToken, TokenAmount, UnitOfAccount},
    };
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::protocol::{
        events::{EventLog, HubEvent},
        minting_hub::{Call, MintingHub},
        operations::{HubOperation, OperationOutcome, SignedOperation},
        roller::{PositionRoller, RollParams},
    };
    pub use crate::storage::{FileStore, InMemoryStore, StorageBackend};
    pub use crate::utils::crypto::{Address, AssetId, Hash, KeyPair, PublicKey, Signature};
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol name
pub const PROTOCOL_NAME: &str = "MintingHub";
