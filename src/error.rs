//! Error types for the minting hub.
//!
//! Every failure aborts the whole transaction that raised it. Errors are
//! grouped by [`ErrorKind`] so callers can tell a bad argument from a
//! position in the wrong state or an undercollateralized request.

use thiserror::Error;

/// Result type alias for minting hub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Caller supplied an argument the protocol rejects
    Parameter,
    /// Position or challenge is in a state that forbids the operation
    State,
    /// Operation would break a collateral or balance requirement
    Solvency,
    /// Moving value to or from an account failed
    Transfer,
    /// Caller is not allowed to perform the operation
    Authorization,
    /// Arithmetic, storage or encoding failure
    Internal,
}

/// Main error type for the minting hub
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════════════
    // Parameter Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Requested liquidation price is above what the position may carry
    #[error("Price {price} too high, maximum {max}")]
    PriceTooHigh {
        /// Requested price
        price: u128,
        /// Highest acceptable price
        max: u128,
    },

    /// Attached native value does not match the expected amount
    #[error("Attached value {got} does not match expected {expected}")]
    ValueMismatch {
        /// Expected value
        expected: u128,
        /// Value attached to the call
        got: u128,
    },

    /// Native value sent for a collateral that is not the wrappable asset
    #[error("Native value only accepted for the wrapped native asset")]
    NativeOnlyForWrappedAsset,

    /// Live price is below the caller's minimum
    #[error("Unexpected price: live {live}, minimum {minimum}")]
    UnexpectedPrice {
        /// Current liquidation price
        live: u128,
        /// Minimum the caller accepted
        minimum: u128,
    },

    /// Challenge size below the required minimum
    #[error("Challenge size {size} below minimum {minimum}")]
    ChallengeTooSmall {
        /// Requested size
        size: u128,
        /// Minimum size
        minimum: u128,
    },

    /// Expiration outside the allowed window
    #[error("Invalid expiration {expiration}: must be after {now} and at most {max}")]
    InvalidExpiration {
        /// Requested expiration
        expiration: u64,
        /// Current time
        now: u64,
        /// Latest allowed expiration
        max: u64,
    },

    /// Purchase would leave an unsellable remainder
    #[error("Purchase would leave dust worth {value}, minimum {minimum}")]
    LeaveNoDust {
        /// Value of the remaining collateral
        value: u128,
        /// Smallest remainder worth keeping
        minimum: u128,
    },

    /// Invalid input parameter
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Amount is zero
    #[error("Amount cannot be zero")]
    ZeroAmount,

    // ═══════════════════════════════════════════════════════════════════
    // State Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Position is in a cooldown window
    #[error("Position is hot until {until}")]
    Hot {
        /// End of the cooldown
        until: u64,
    },

    /// Position has collateral under challenge
    #[error("Position is challenged")]
    Challenged,

    /// Position has not expired yet
    #[error("Position is alive until {expiration}")]
    Alive {
        /// Expiration timestamp
        expiration: u64,
    },

    /// Position has expired
    #[error("Position expired at {expiration}")]
    Expired {
        /// Expiration timestamp
        expiration: u64,
    },

    /// Position is closed
    #[error("Position is closed")]
    Closed,

    /// Position cannot serve as a clone parent right now
    #[error("Position cannot be cloned: {0}")]
    NotCloneable(String),

    /// Position not found
    #[error("Position not found: {0}")]
    PositionNotFound(String),

    /// Challenge not found
    #[error("Challenge not found: {0}")]
    ChallengeNotFound(u64),

    /// Bid placed in the same second the challenge started
    #[error("Challenge {0} cannot be averted in its first second")]
    AvertTooEarly(u64),

    // ═══════════════════════════════════════════════════════════════════
    // Solvency Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Mint exceeds the available minting headroom
    #[error("Limit exceeded: requested {requested}, available {available}")]
    LimitExceeded {
        /// Requested amount
        requested: u128,
        /// Available amount
        available: u128,
    },

    /// Collateral no longer covers the debt at the liquidation price
    #[error("Insufficient collateral: required {required}, available {available}")]
    InsufficientCollateral {
        /// Required collateral amount
        required: u128,
        /// Available collateral amount
        available: u128,
    },

    /// Account balance too low
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Required amount
        required: u128,
        /// Available amount
        available: u128,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Transfer Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Recipient rejected a native value transfer
    #[error("Native transfer to {0} failed")]
    NativeTransferFailed(String),

    /// Recipient rejected a token transfer
    #[error("Transfer to {0} rejected")]
    TransferRejected(String),

    // ═══════════════════════════════════════════════════════════════════
    // Authorization Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Not authorized to perform this action
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Invalid signature
    #[error("Invalid signature")]
    InvalidSignature,

    /// Nonce already used or out of order
    #[error("Invalid nonce: expected greater than {last}, got {got}")]
    InvalidNonce {
        /// Last accepted nonce
        last: u64,
        /// Submitted nonce
        got: u64,
    },

    /// Cryptographic operation failed
    #[error("Crypto error in {operation}: {details}")]
    CryptoError {
        /// Operation that failed
        operation: String,
        /// Error details
        details: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Internal Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Overflow in calculation
    #[error("Arithmetic overflow in {operation}")]
    Overflow {
        /// Operation that overflowed
        operation: String,
    },

    /// Underflow in calculation
    #[error("Arithmetic underflow in {operation}")]
    Underflow {
        /// Operation that underflowed
        operation: String,
    },

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Internal error (should not happen in production)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the broad category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::PriceTooHigh { .. }
            | Error::ValueMismatch { .. }
            | Error::NativeOnlyForWrappedAsset
            | Error::UnexpectedPrice { .. }
            | Error::ChallengeTooSmall { .. }
            | Error::InvalidExpiration { .. }
            | Error::LeaveNoDust { .. }
            | Error::InvalidParameter { .. }
            | Error::ZeroAmount => ErrorKind::Parameter,

            Error::Hot { .. }
            | Error::Challenged
            | Error::Alive { .. }
            | Error::Expired { .. }
            | Error::Closed
            | Error::NotCloneable(_)
            | Error::PositionNotFound(_)
            | Error::ChallengeNotFound(_)
            | Error::AvertTooEarly(_) => ErrorKind::State,

            Error::LimitExceeded { .. }
            | Error::InsufficientCollateral { .. }
            | Error::InsufficientBalance { .. } => ErrorKind::Solvency,

            Error::NativeTransferFailed(_) | Error::TransferRejected(_) => ErrorKind::Transfer,

            Error::Unauthorized(_)
            | Error::InvalidSignature
            | Error::InvalidNonce { .. }
            | Error::CryptoError { .. } => ErrorKind::Authorization,

            Error::Overflow { .. }
            | Error::Underflow { .. }
            | Error::Serialization(_)
            | Error::Deserialization(_)
            | Error::Storage(_)
            | Error::Config(_)
            | Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if this is a critical error requiring immediate attention
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Error::Internal(_) | Error::Overflow { .. } | Error::Underflow { .. }
        )
    }

    /// Returns the error code for external systems
    pub fn code(&self) -> u32 {
        match self {
            // Parameter errors: 1xxx
            Error::PriceTooHigh { .. } => 1001,
            Error::ValueMismatch { .. } => 1002,
            Error::NativeOnlyForWrappedAsset => 1003,
            Error::UnexpectedPrice { .. } => 1004,
            Error::ChallengeTooSmall { .. } => 1005,
            Error::InvalidExpiration { .. } => 1006,
            Error::LeaveNoDust { .. } => 1007,
            Error::InvalidParameter { .. } => 1008,
            Error::ZeroAmount => 1009,

            // State errors: 2xxx
            Error::Hot { .. } => 2001,
            Error::Challenged => 2002,
            Error::Alive { .. } => 2003,
            Error::Expired { .. } => 2004,
            Error::Closed => 2005,
            Error::NotCloneable(_) => 2006,
            Error::PositionNotFound(_) => 2007,
            Error::ChallengeNotFound(_) => 2008,
            Error::AvertTooEarly(_) => 2009,

            // Solvency errors: 3xxx
            Error::LimitExceeded { .. } => 3001,
            Error::InsufficientCollateral { .. } => 3002,
            Error::InsufficientBalance { .. } => 3003,

            // Transfer errors: 4xxx
            Error::NativeTransferFailed(_) => 4001,
            Error::TransferRejected(_) => 4002,

            // Authorization errors: 5xxx
            Error::Unauthorized(_) => 5001,
            Error::InvalidSignature => 5002,
            Error::InvalidNonce { .. } => 5003,
            Error::CryptoError { .. } => 5004,

            // Internal errors: 9xxx
            Error::Overflow { .. } => 9001,
            Error::Underflow { .. } => 9002,
            Error::Serialization(_) => 9003,
            Error::Deserialization(_) => 9004,
            Error::Storage(_) => 9005,
            Error::Config(_) => 9006,
            Error::Internal(_) => 9007,
        }
    }
}
