//! Hub events for state change notifications.
//!
//! Every successful operation appends events to the hub's log; the log is
//! drained at the end of each block. Events of a rolled-back operation are
//! discarded together with its other effects.

use serde::{Deserialize, Serialize};

use crate::utils::crypto::{Address, AssetId, Hash};

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// All hub event types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HubEvent {
    // Position events
    /// Original position opened
    PositionOpened {
        /// New position
        position: Address,
        /// Owner
        owner: Address,
        /// Collateral asset
        collateral: AssetId,
        /// Initial collateral
        collateral_amount: u128,
        /// Liquidation price
        price: u128,
        /// Opening fee charged
        fee: u128,
    },
    /// Position cloned from a parent
    PositionCloned {
        /// New position
        position: Address,
        /// Parent position
        parent: Address,
        /// Owner
        owner: Address,
        /// Initial collateral
        collateral_amount: u128,
        /// Initial mint
        minted: u128,
    },
    /// Debt minted
    Minted {
        /// Position
        position: Address,
        /// Recipient of the usable amount
        target: Address,
        /// Gross principal added
        amount: u128,
        /// Amount credited to the target
        usable: u128,
    },
    /// Debt repaid
    Repaid {
        /// Position
        position: Address,
        /// Payer
        payer: Address,
        /// Interest collected
        interest: u128,
        /// Principal retired
        principal: u128,
    },
    /// Collateral added
    CollateralAdded {
        /// Position
        position: Address,
        /// Amount
        amount: u128,
        /// Whether it arrived as native value
        native: bool,
    },
    /// Collateral withdrawn
    CollateralWithdrawn {
        /// Position
        position: Address,
        /// Recipient
        target: Address,
        /// Amount
        amount: u128,
        /// Whether it left as native value
        native: bool,
    },
    /// Liquidation price changed
    PriceAdjusted {
        /// Position
        position: Address,
        /// Previous price
        old_price: u128,
        /// New price
        new_price: u128,
        /// Cooldown after the change
        cooldown: u64,
    },
    /// Owner changed
    OwnershipTransferred {
        /// Position
        position: Address,
        /// Previous owner
        from: Address,
        /// New owner
        to: Address,
    },
    /// Position closed
    PositionClosed {
        /// Position
        position: Address,
    },

    // Challenge events
    /// Challenge started
    ChallengeStarted {
        /// Challenge number
        number: u64,
        /// Position
        position: Address,
        /// Challenger
        challenger: Address,
        /// Staked size
        size: u128,
    },
    /// Challenge (partly) averted
    ChallengeAverted {
        /// Challenge number
        number: u64,
        /// Position
        position: Address,
        /// Bidder
        bidder: Address,
        /// Size averted
        size: u128,
    },
    /// Challenge (partly) succeeded
    ChallengeSucceeded {
        /// Challenge number
        number: u64,
        /// Position
        position: Address,
        /// Bidder
        bidder: Address,
        /// Collateral sold
        collateral_sold: u128,
        /// Offer paid by the bidder
        offer: u128,
        /// Principal retired
        repaid_principal: u128,
        /// Reserve shortfall covered
        covered_loss: u128,
    },
    /// Expired collateral sold
    ExpiredCollateralSold {
        /// Position
        position: Address,
        /// Buyer
        buyer: Address,
        /// Collateral sold
        amount: u128,
        /// Price per unit
        price: u128,
    },
    /// Payout booked for later
    PayoutPostponed {
        /// Asset
        asset: AssetId,
        /// Beneficiary
        beneficiary: Address,
        /// Amount
        amount: u128,
    },
    /// Postponed payout claimed
    PayoutClaimed {
        /// Asset
        asset: AssetId,
        /// Beneficiary
        beneficiary: Address,
        /// Recipient
        target: Address,
        /// Amount
        amount: u128,
    },

    // Roller events
    /// Debt rolled into another position
    Rolled {
        /// Source position
        source: Address,
        /// Target position (may be a fresh clone)
        target: Address,
        /// Flash-minted repayment
        repay: u128,
        /// Collateral withdrawn from the source
        collateral_withdrawn: u128,
        /// Principal minted on the target
        mint: u128,
        /// Collateral deposited into the target
        collateral_deposited: u128,
    },
}

impl HubEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PositionOpened { .. } => "PositionOpened",
            Self::PositionCloned { .. } => "PositionCloned",
            Self::Minted { .. } => "Minted",
            Self::Repaid { .. } => "Repaid",
            Self::CollateralAdded { .. } => "CollateralAdded",
            Self::CollateralWithdrawn { .. } => "CollateralWithdrawn",
            Self::PriceAdjusted { .. } => "PriceAdjusted",
            Self::OwnershipTransferred { .. } => "OwnershipTransferred",
            Self::PositionClosed { .. } => "PositionClosed",
            Self::ChallengeStarted { .. } => "ChallengeStarted",
            Self::ChallengeAverted { .. } => "ChallengeAverted",
            Self::ChallengeSucceeded { .. } => "ChallengeSucceeded",
            Self::ExpiredCollateralSold { .. } => "ExpiredCollateralSold",
            Self::PayoutPostponed { .. } => "PayoutPostponed",
            Self::PayoutClaimed { .. } => "PayoutClaimed",
            Self::Rolled { .. } => "Rolled",
        }
    }

    /// Position the event concerns, if any
    pub fn position(&self) -> Option<Address> {
        match self {
            Self::PositionOpened { position, .. }
            | Self::PositionCloned { position, .. }
            | Self::Minted { position, .. }
            | Self::Repaid { position, .. }
            | Self::CollateralAdded { position, .. }
            | Self::CollateralWithdrawn { position, .. }
            | Self::PriceAdjusted { position, .. }
            | Self::OwnershipTransferred { position, .. }
            | Self::PositionClosed { position }
            | Self::ChallengeStarted { position, .. }
            | Self::ChallengeAverted { position, .. }
            | Self::ChallengeSucceeded { position, .. }
            | Self::ExpiredCollateralSold { position, .. } => Some(*position),
            Self::Rolled { source, .. } => Some(*source),
            Self::PayoutPostponed { .. } | Self::PayoutClaimed { .. } => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT LOG
// ═══════════════════════════════════════════════════════════════════════════════

/// Event stamped with the block it was emitted in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Block height
    pub block_height: u64,
    /// Block timestamp
    pub timestamp: u64,
    /// The event
    pub event: HubEvent,
}

impl EventRecord {
    /// Compute event hash
    pub fn hash(&self) -> Hash {
        let data = bincode::serialize(self).unwrap_or_default();
        Hash::sha256(&data)
    }
}

/// Ordered collection of emitted events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<EventRecord>,
}

impl EventLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event
    pub fn push(&mut self, block_height: u64, timestamp: u64, event: HubEvent) {
        self.events.push(EventRecord {
            block_height,
            timestamp,
            event,
        });
    }

    /// All events in emission order
    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    /// Get events of a specific type
    pub fn filter_by_type(&self, event_type: &str) -> Vec<&EventRecord> {
        self.events
            .iter()
            .filter(|r| r.event.event_type() == event_type)
            .collect()
    }

    /// Get events concerning a position
    pub fn for_position(&self, position: &Address) -> Vec<&EventRecord> {
        self.events
            .iter()
            .filter(|r| r.event.position().as_ref() == Some(position))
            .collect()
    }

    /// Get the number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Take all events, leaving the log empty
    pub fn drain(&mut self) -> EventLog {
        std::mem::take(self)
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Hash chain over all events; zero for an empty log
    pub fn digest(&self) -> Hash {
        self.events.iter().fold(Hash::zero(), |acc, record| {
            let mut data = Vec::with_capacity(64);
            data.extend_from_slice(acc.as_bytes());
            data.extend_from_slice(record.hash().as_bytes());
            Hash::sha256(&data)
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
