//! Challenges and their settlement records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::utils::crypto::Address;
use crate::utils::math::safe_add_time;

// ═══════════════════════════════════════════════════════════════════════════════
// CHALLENGE
// ═══════════════════════════════════════════════════════════════════════════════

/// Auction phase of a challenge at a given time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChallengePhase {
    /// Fixed-price window in which the challenge can be averted
    Aversion,
    /// Decaying-price window in which the collateral is sold
    Liquidation,
}

/// A stake-backed claim against a position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Monotonic challenge number
    pub number: u64,
    /// Challenged position
    pub position: Address,
    /// Account that staked the collateral
    pub challenger: Address,
    /// Remaining challenged collateral
    pub size: u128,
    /// Timestamp the challenge started
    pub start: u64,
    /// Position's liquidation price when the challenge started
    pub price: u128,
    /// Length of each phase
    pub phase: u64,
}

impl Challenge {
    /// End of the aversion phase
    pub fn aversion_end(&self) -> Result<u64> {
        safe_add_time(self.start, self.phase)
    }

    /// End of the liquidation phase, when the price reaches zero
    pub fn liquidation_end(&self) -> Result<u64> {
        safe_add_time(self.aversion_end()?, self.phase)
    }

    /// Phase at `now`
    pub fn phase_at(&self, now: u64) -> Result<ChallengePhase> {
        if now <= self.aversion_end()? {
            Ok(ChallengePhase::Aversion)
        } else {
            Ok(ChallengePhase::Liquidation)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHALLENGE BOOK
// ═══════════════════════════════════════════════════════════════════════════════

/// Active challenges keyed by number
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeBook {
    challenges: BTreeMap<u64, Challenge>,
    next_number: u64,
}

impl ChallengeBook {
    /// Create an empty book
    pub fn new() -> Self {
        Self::default()
    }

    /// Book a new challenge and return its number
    pub fn open(
        &mut self,
        position: Address,
        challenger: Address,
        size: u128,
        start: u64,
        price: u128,
        phase: u64,
    ) -> u64 {
        let number = self.next_number;
        self.next_number += 1;
        self.challenges.insert(
            number,
            Challenge {
                number,
                position,
                challenger,
                size,
                start,
                price,
                phase,
            },
        );
        number
    }

    /// Look up a live challenge
    pub fn get(&self, number: u64) -> Result<&Challenge> {
        self.challenges
            .get(&number)
            .ok_or(Error::ChallengeNotFound(number))
    }

    /// Reduce a challenge's size, removing it once fully resolved
    pub fn reduce(&mut self, number: u64, amount: u128) -> Result<()> {
        let challenge = self
            .challenges
            .get_mut(&number)
            .ok_or(Error::ChallengeNotFound(number))?;
        challenge.size = challenge.size.checked_sub(amount).ok_or(Error::Underflow {
            operation: format!("challenge {} size", number),
        })?;
        if challenge.size == 0 {
            self.challenges.remove(&number);
        }
        Ok(())
    }

    /// Live challenges against `position`
    pub fn for_position(&self, position: &Address) -> Vec<&Challenge> {
        self.challenges
            .values()
            .filter(|c| &c.position == position)
            .collect()
    }

    /// All live challenges in number order
    pub fn iter(&self) -> impl Iterator<Item = &Challenge> {
        self.challenges.values()
    }

    /// Number the next challenge will receive
    pub fn next_number(&self) -> u64 {
        self.next_number
    }

    /// Number of live challenges
    pub fn len(&self) -> usize {
        self.challenges.len()
    }

    /// Check if no challenge is live
    pub fn is_empty(&self) -> bool {
        self.challenges.is_empty()
    }

    /// Rebuild a book from stored challenges
    pub fn from_parts(challenges: Vec<Challenge>, next_number: u64) -> Self {
        Self {
            challenges: challenges.into_iter().map(|c| (c.number, c)).collect(),
            next_number,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BID OUTCOMES
// ═══════════════════════════════════════════════════════════════════════════════

/// Money flows of one liquidation-phase bid
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// Collateral sold to the bidder
    pub collateral_sold: u128,
    /// Decayed price per unit
    pub price: u128,
    /// Paid by the bidder
    pub offer: u128,
    /// Paid to the challenger out of the offer
    pub challenger_reward: u128,
    /// Principal retired
    pub repaid_principal: u128,
    /// Interest collected as profit
    pub repaid_interest: u128,
    /// Paid to the position owner
    pub owner_surplus: u128,
    /// Paid by the reserve to fill a shortfall
    pub covered_loss: u128,
    /// Stake returned to the challenger (or booked for later)
    pub stake_returned: u128,
    /// Whether the stake went to the payout ledger
    pub stake_postponed: bool,
}

impl Settlement {
    /// Check that money in equals money out
    pub fn is_balanced(&self) -> bool {
        let inflow = self.offer.checked_add(self.covered_loss);
        let outflow = self
            .challenger_reward
            .checked_add(self.repaid_principal)
            .and_then(|v| v.checked_add(self.repaid_interest))
            .and_then(|v| v.checked_add(self.owner_surplus));
        inflow.is_some() && inflow == outflow
    }
}

/// Result of a bid in either phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BidOutcome {
    /// The challenge was (partly) averted
    Averted {
        /// Collateral size averted
        size: u128,
        /// Paid by the bidder to the challenger
        paid: u128,
    },
    /// Collateral was (partly) liquidated
    Liquidated(Settlement),
}
