//! Signed hub operations.
//!
//! Operations represent discrete actions submitted to the hub by an account.
//! Each one carries the signer's public key, a strictly increasing nonce for
//! replay protection and a signature over all of it. [`MintingHub::submit`]
//! verifies the envelope and dispatches to the matching hub method.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auction::challenge::BidOutcome;
use crate::core::factory::{ClonePositionParams, OpenPositionParams};
use crate::core::token::UnitOfAccount;
use crate::error::{Error, Result};
use crate::protocol::minting_hub::{Call, MintingHub};
use crate::protocol::roller::RollParams;
use crate::storage::backend::StorageBackend;
use crate::utils::crypto::{
    create_message_hash, verify_signature, Address, AssetId, Hash, KeyPair, PublicKey, Signature,
};

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATION TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Trait for authenticated hub operations
pub trait Operation: Sized + Send + Sync {
    /// The result type of this operation
    type Result;

    /// Get the operation type name
    fn operation_type(&self) -> &'static str;

    /// Get the signer of this operation
    fn signer(&self) -> &PublicKey;

    /// Get the signature
    fn signature(&self) -> &Signature;

    /// Get the nonce for replay protection
    fn nonce(&self) -> u64;
}

// ═══════════════════════════════════════════════════════════════════════════════
// HUB OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Every action an account can submit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum HubOperation {
    OpenPosition(OpenPositionParams),
    ClonePosition(ClonePositionParams),
    Mint {
        position: Address,
        target: Address,
        amount: u128,
    },
    Repay {
        position: Address,
        amount: u128,
    },
    RepayFull {
        position: Address,
    },
    AddCollateral {
        position: Address,
        amount: u128,
    },
    DepositNative {
        position: Address,
    },
    WithdrawCollateral {
        position: Address,
        target: Address,
        amount: u128,
        as_native: bool,
    },
    AdjustPrice {
        position: Address,
        price: u128,
    },
    Adjust {
        position: Address,
        principal: u128,
        collateral: u128,
        price: u128,
    },
    TransferOwnership {
        position: Address,
        new_owner: Address,
    },
    Challenge {
        position: Address,
        size: u128,
        min_price: u128,
    },
    Bid {
        number: u64,
        size: u128,
        postpone: bool,
        as_native: bool,
    },
    BuyExpiredCollateral {
        position: Address,
        up_to: u128,
        as_native: bool,
    },
    ReturnPostponedCollateral {
        asset: AssetId,
        target: Address,
        as_native: bool,
    },
    Roll {
        params: RollParams,
        native: bool,
    },
    RollFully {
        source: Address,
        target: Address,
        expiration: Option<u64>,
        native: bool,
    },
}

impl HubOperation {
    /// Operation name, also used as the signing domain
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenPosition(_) => "OpenPosition",
            Self::ClonePosition(_) => "ClonePosition",
            Self::Mint { .. } => "Mint",
            Self::Repay { .. } => "Repay",
            Self::RepayFull { .. } => "RepayFull",
            Self::AddCollateral { .. } => "AddCollateral",
            Self::DepositNative { .. } => "DepositNative",
            Self::WithdrawCollateral { .. } => "WithdrawCollateral",
            Self::AdjustPrice { .. } => "AdjustPrice",
            Self::Adjust { .. } => "Adjust",
            Self::TransferOwnership { .. } => "TransferOwnership",
            Self::Challenge { .. } => "Challenge",
            Self::Bid { .. } => "Bid",
            Self::BuyExpiredCollateral { .. } => "BuyExpiredCollateral",
            Self::ReturnPostponedCollateral { .. } => "ReturnPostponedCollateral",
            Self::Roll { .. } => "Roll",
            Self::RollFully { .. } => "RollFully",
        }
    }
}

/// Result of a dispatched operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationOutcome {
    /// A position was created or debt was rolled into one
    Position(Address),
    /// Amount credited, spent or transferred
    Amount(u128),
    /// A challenge was opened
    Challenge(u64),
    /// A bid was executed
    Bid(BidOutcome),
    /// Operation completed with nothing to report
    Done,
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIGNED ENVELOPE
// ═══════════════════════════════════════════════════════════════════════════════

/// Operation signed by its submitter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedOperation {
    /// The action
    pub operation: HubOperation,
    /// Signer public key
    pub signer: PublicKey,
    /// Nonce for replay protection
    pub nonce: u64,
    /// Native value attached
    pub value: u128,
    /// Signature over the other fields
    pub signature: Signature,
}

impl SignedOperation {
    /// Sign `operation` with `keypair`
    pub fn sign(operation: HubOperation, nonce: u64, value: u128, keypair: &KeyPair) -> Result<Self> {
        let signer = *keypair.public_key();
        let message = Self::message_hash(&operation, &signer, nonce, value)?;
        Ok(Self {
            operation,
            signer,
            nonce,
            value,
            signature: keypair.sign(&message),
        })
    }

    fn message_hash(operation: &HubOperation, signer: &PublicKey, nonce: u64, value: u128) -> Result<Hash> {
        let data = bincode::serialize(&(operation, signer, nonce, value))
            .map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(create_message_hash(operation.name(), &data))
    }

    /// Check the signature against the signer's key
    pub fn verify(&self) -> Result<()> {
        let message = Self::message_hash(&self.operation, &self.signer, self.nonce, self.value)?;
        if !verify_signature(&self.signer, &message, &self.signature) {
            return Err(Error::InvalidSignature);
        }
        Ok(())
    }

    /// Account the operation acts for
    pub fn caller(&self) -> Address {
        self.signer.address()
    }
}

impl Operation for SignedOperation {
    type Result = OperationOutcome;

    fn operation_type(&self) -> &'static str {
        self.operation.name()
    }

    fn signer(&self) -> &PublicKey {
        &self.signer
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn nonce(&self) -> u64 {
        self.nonce
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DISPATCH
// ═══════════════════════════════════════════════════════════════════════════════

impl<B: StorageBackend, U: UnitOfAccount> MintingHub<B, U> {
    /// Verify and execute a signed operation.
    ///
    /// The nonce is consumed once the envelope checks out, even if the
    /// operation itself then fails.
    pub fn submit(&mut self, signed: SignedOperation) -> Result<OperationOutcome> {
        signed.verify()?;
        let caller = signed.caller();
        let last = self.nonce_of(&caller);
        if signed.nonce <= last {
            return Err(Error::InvalidNonce {
                last,
                got: signed.nonce,
            });
        }
        self.state.nonces.insert(caller, signed.nonce);

        debug!(
            operation = signed.operation_type(),
            caller = %caller,
            nonce = signed.nonce,
            "dispatching operation"
        );
        let call = Call::with_value(caller, signed.value);
        self.dispatch(call, signed.operation)
    }

    fn dispatch(&mut self, call: Call, operation: HubOperation) -> Result<OperationOutcome> {
        use OperationOutcome::*;

        match operation {
            HubOperation::OpenPosition(params) => self.open_position(call, params).map(Position),
            HubOperation::ClonePosition(params) => self.clone_position(call, params).map(Position),
            HubOperation::Mint {
                position,
                target,
                amount,
            } => self.mint(call, position, target, amount).map(Amount),
            HubOperation::Repay { position, amount } => {
                self.repay(call, position, amount).map(Amount)
            }
            HubOperation::RepayFull { position } => self.repay_full(call, position).map(Amount),
            HubOperation::AddCollateral { position, amount } => {
                self.add_collateral(call, position, amount).map(|_| Done)
            }
            HubOperation::DepositNative { position } => {
                self.deposit_native(call, position).map(|_| Done)
            }
            HubOperation::WithdrawCollateral {
                position,
                target,
                amount,
                as_native,
            } => {
                let result = if as_native {
                    self.withdraw_collateral_as_native(call, position, target, amount)
                } else {
                    self.withdraw_collateral(call, position, target, amount)
                };
                result.map(|_| Done)
            }
            HubOperation::AdjustPrice { position, price } => {
                self.adjust_price(call, position, price).map(|_| Done)
            }
            HubOperation::Adjust {
                position,
                principal,
                collateral,
                price,
            } => self
                .adjust(call, position, principal, collateral, price)
                .map(|_| Done),
            HubOperation::TransferOwnership {
                position,
                new_owner,
            } => self
                .transfer_ownership(call, position, new_owner)
                .map(|_| Done),
            HubOperation::Challenge {
                position,
                size,
                min_price,
            } => self.challenge(call, position, size, min_price).map(Challenge),
            HubOperation::Bid {
                number,
                size,
                postpone,
                as_native,
            } => self.bid(call, number, size, postpone, as_native).map(Bid),
            HubOperation::BuyExpiredCollateral {
                position,
                up_to,
                as_native,
            } => self
                .buy_expired_collateral(call, position, up_to, as_native)
                .map(Amount),
            HubOperation::ReturnPostponedCollateral {
                asset,
                target,
                as_native,
            } => self
                .return_postponed_collateral(call, asset, target, as_native)
                .map(Amount),
            HubOperation::Roll { params, native } => {
                let mut roller = self.roller();
                let result = if native {
                    roller.roll_native(call, params)
                } else {
                    roller.roll(call, params)
                };
                result.map(Position)
            }
            HubOperation::RollFully {
                source,
                target,
                expiration,
                native,
            } => {
                let mut roller = self.roller();
                let result = match (expiration, native) {
                    (None, false) => roller.roll_fully(call, source, target),
                    (None, true) => roller.roll_fully_native(call, source, target),
                    (Some(exp), false) => roller.roll_fully_with_expiration(call, source, target, exp),
                    (Some(exp), true) => {
                        roller.roll_fully_native_with_expiration(call, source, target, exp)
                    }
                };
                result.map(Position)
            }
        }
    }
}
