//! Core modules of the minting hub.
//!
//! This module contains the fundamental building blocks:
//! - Configuration and protocol parameters
//! - Position records and their factory
//! - Unit-of-account token with reserve facility
//! - Collateral asset ledger

pub mod collateral;
pub mod config;
pub mod factory;
pub mod position;
pub mod token;

pub use collateral::*;
pub use config::*;
pub use factory::*;
pub use position::*;
pub use token::*;
