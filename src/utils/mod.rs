//! Utility modules for the minting hub.
//!
//! This module contains shared utilities used across the protocol:
//! - Cryptographic primitives and addresses
//! - Fixed-point arithmetic
//! - Validation helpers
//! - Tracing setup
//! - Constants

pub mod constants;
pub mod crypto;
pub mod logging;
pub mod math;
pub mod validation;

pub use constants::*;
pub use crypto::*;
pub use logging::*;
pub use math::*;
pub use validation::*;
