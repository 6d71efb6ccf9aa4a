//! Challenges, auctions and forced sales of expired positions.
//!
//! A challenger stakes collateral against a position at its liquidation
//! price. During the aversion phase anyone may buy the stake at that price,
//! which proves the price is sound. Afterwards the position's collateral is
//! auctioned at a decaying price and the proceeds retire its debt.

use tracing::{debug, info};

use crate::auction::challenge::{BidOutcome, Challenge, ChallengePhase, Settlement};
use crate::auction::pricing::expired_purchase_price;
use crate::core::token::UnitOfAccount;
use crate::error::{Error, Result};
use crate::protocol::events::HubEvent;
use crate::protocol::minting_hub::{Call, MintingHub};
use crate::storage::backend::StorageBackend;
use crate::utils::constants::PRICE_SCALE;
use crate::utils::crypto::{Address, AssetId, HUB_ADDRESS};
use crate::utils::math::*;
use crate::utils::validation::validate_non_zero;

/// What the position gives up to a successful challenge
struct Release {
    owner: Address,
    asset: AssetId,
    collateral: u128,
    principal: u128,
    interest: u128,
    reserve_ppm: u32,
}

impl<B: StorageBackend, U: UnitOfAccount> MintingHub<B, U> {
    // ═══════════════════════════════════════════════════════════════════════════
    // CHALLENGES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Stake `size` collateral against a position; returns the challenge number
    pub fn challenge(&mut self, call: Call, position: Address, size: u128, min_price: u128) -> Result<u64> {
        self.atomically("challenge", |hub| {
            hub.challenge_inner(&call, &position, size, min_price)
        })
    }

    fn challenge_inner(&mut self, call: &Call, address: &Address, size: u128, min_price: u128) -> Result<u64> {
        let now = self.now();
        let (asset, price, phase) = {
            let position = self.position(address)?;
            if position.closed {
                return Err(Error::Closed);
            }
            if position.is_expired(now) {
                return Err(Error::Expired {
                    expiration: position.expiration,
                });
            }
            validate_non_zero(size)?;
            if position.challenged_amount >= position.collateral_balance {
                return Err(Error::Challenged);
            }
            if size > position.collateral_balance {
                return Err(Error::InsufficientCollateral {
                    required: size,
                    available: position.collateral_balance,
                });
            }
            let minimum = position.minimum_collateral.min(position.collateral_balance);
            if size < minimum {
                return Err(Error::ChallengeTooSmall { size, minimum });
            }
            if position.price < min_price {
                return Err(Error::UnexpectedPrice {
                    live: position.price,
                    minimum: min_price,
                });
            }
            (position.collateral, position.price, position.challenge_period)
        };

        self.pull_collateral(call, &asset, size)?;
        let number = self
            .state
            .challenges
            .open(*address, call.caller, size, now, price, phase);

        let position = self.position_mut(address)?;
        if position.challenged_amount == 0 {
            position.challenged_price = price;
        }
        position.challenged_amount = safe_add(position.challenged_amount, size)?;

        self.emit(HubEvent::ChallengeStarted {
            number,
            position: *address,
            challenger: call.caller,
            size,
        });
        info!(number, position = %address, challenger = %call.caller, size, "challenge started");
        Ok(number)
    }

    /// Current price of a challenge: the liquidation price while it can be
    /// averted, then the decaying auction price
    pub fn price(&self, number: u64) -> Result<u128> {
        let challenge = self.state.challenges.get(number)?;
        match challenge.phase_at(self.now())? {
            ChallengePhase::Aversion => Ok(challenge.price),
            ChallengePhase::Liquidation => self.decay.price_at(
                challenge.price,
                challenge.aversion_end()?,
                challenge.phase,
                self.now(),
            ),
        }
    }

    /// Bid on a challenge; averts it in phase 1 and buys collateral in phase 2.
    ///
    /// `postpone` books the returned stake in the payout ledger instead of
    /// transferring it. `as_native` delivers bought collateral as native value.
    pub fn bid(
        &mut self,
        call: Call,
        number: u64,
        size: u128,
        postpone: bool,
        as_native: bool,
    ) -> Result<BidOutcome> {
        call.ensure_no_value()?;
        self.atomically("bid", |hub| {
            validate_non_zero(size)?;
            let challenge = hub.state.challenges.get(number)?.clone();
            let size = size.min(challenge.size);
            match challenge.phase_at(hub.now())? {
                ChallengePhase::Aversion => hub.avert(&call.caller, &challenge, size, as_native),
                ChallengePhase::Liquidation => hub
                    .liquidate(&call.caller, &challenge, size, postpone, as_native)
                    .map(BidOutcome::Liquidated),
            }
        })
    }

    fn avert(&mut self, bidder: &Address, challenge: &Challenge, size: u128, as_native: bool) -> Result<BidOutcome> {
        let now = self.now();
        if now == challenge.start {
            return Err(Error::AvertTooEarly(challenge.number));
        }

        let paid = if *bidder == challenge.challenger {
            0
        } else {
            let paid = mul_div(size, challenge.price, PRICE_SCALE)?;
            self.state
                .token
                .transfer(bidder, &challenge.challenger, paid)?;
            paid
        };

        let cooldown = self.config.challenge_cooldown;
        let asset = {
            let position = self.position_mut(&challenge.position)?;
            position.challenged_amount = position.challenged_amount.saturating_sub(size);
            if position.challenged_amount == 0 {
                position.challenged_price = 0;
            }
            position.restrict_minting(now, cooldown);
            position.collateral
        };
        self.state.challenges.reduce(challenge.number, size)?;
        self.push_collateral(&asset, bidder, size, as_native)?;

        self.emit(HubEvent::ChallengeAverted {
            number: challenge.number,
            position: challenge.position,
            bidder: *bidder,
            size,
        });
        info!(number = challenge.number, size, paid, "challenge averted");
        Ok(BidOutcome::Averted { size, paid })
    }

    fn liquidate(
        &mut self,
        bidder: &Address,
        challenge: &Challenge,
        size: u128,
        postpone: bool,
        as_native: bool,
    ) -> Result<Settlement> {
        let now = self.now();
        let price = self.decay.price_at(
            challenge.price,
            challenge.aversion_end()?,
            challenge.phase,
            now,
        )?;

        let release = self.release_challenged_collateral(&challenge.position, size)?;
        self.state.challenges.reduce(challenge.number, size)?;

        // The stake is refunded in full even when the position had less left
        let stake_postponed =
            self.return_stake(&release.asset, &challenge.challenger, size, postpone)?;

        let offer = mul_div(price, release.collateral, PRICE_SCALE)?;
        self.state.token.transfer(bidder, &HUB_ADDRESS, offer)?;
        let reward = ppm_of(offer, self.config.challenger_reward_ppm)?;
        self.state
            .token
            .transfer(&HUB_ADDRESS, &challenge.challenger, reward)?;

        let funds = offer - reward;
        let repaid_interest = funds.min(release.interest);
        self.state.token.collect_profits(&HUB_ADDRESS, repaid_interest)?;
        let funds = funds - repaid_interest;

        let (owner_surplus, covered_loss) = if funds >= release.principal {
            (funds - release.principal, 0)
        } else {
            (0, release.principal - funds)
        };
        if covered_loss > 0 {
            self.state.token.cover_loss(&HUB_ADDRESS, covered_loss)?;
        }
        self.state
            .token
            .burn_without_reserve(&HUB_ADDRESS, release.principal, release.reserve_ppm)?;
        self.state
            .token
            .transfer(&HUB_ADDRESS, &release.owner, owner_surplus)?;

        self.push_collateral(&release.asset, bidder, release.collateral, as_native)?;

        let settlement = Settlement {
            collateral_sold: release.collateral,
            price,
            offer,
            challenger_reward: reward,
            repaid_principal: release.principal,
            repaid_interest,
            owner_surplus,
            covered_loss,
            stake_returned: size,
            stake_postponed,
        };

        self.emit(HubEvent::ChallengeSucceeded {
            number: challenge.number,
            position: challenge.position,
            bidder: *bidder,
            collateral_sold: release.collateral,
            offer,
            repaid_principal: release.principal,
            covered_loss,
        });
        info!(
            number = challenge.number,
            sold = release.collateral,
            offer,
            covered_loss,
            "challenge succeeded"
        );
        Ok(settlement)
    }

    /// Take the collateral and the matching share of debt out of a challenged position
    fn release_challenged_collateral(&mut self, address: &Address, size: u128) -> Result<Release> {
        let now = self.now();
        let cooldown = self.config.challenge_cooldown;

        let position = self.position_mut(address)?;
        position.accrue_interest(now)?;
        position.challenged_amount = position.challenged_amount.saturating_sub(size);

        let balance = position.collateral_balance;
        let mut sold = size.min(balance);
        let leftover = balance - sold;
        if leftover > 0 && leftover < position.minimum_collateral {
            sold = balance;
        }

        let (principal, interest) = if sold == balance {
            (position.principal, position.interest)
        } else {
            (
                mul_div(position.principal, sold, balance)?,
                mul_div(position.interest, sold, balance)?,
            )
        };

        position.reduce_debt(principal, interest)?;
        position.restrict_minting(now, cooldown);
        position.remove_collateral(sold)?;
        let closed_now = position.close_if_dust();
        if position.challenged_amount == 0 {
            position.challenged_price = 0;
        }

        let release = Release {
            owner: position.owner,
            asset: position.collateral,
            collateral: sold,
            principal,
            interest,
            reserve_ppm: position.reserve_contribution_ppm,
        };
        let original = position.original;

        self.sub_family_minted(&original, principal)?;
        if closed_now {
            self.emit(HubEvent::PositionClosed { position: *address });
        }
        Ok(release)
    }

    /// Send a challenger's stake back, falling back to the payout ledger when
    /// asked to or when the recipient refuses it. Returns whether it was booked.
    fn return_stake(&mut self, asset: &AssetId, challenger: &Address, amount: u128, postpone: bool) -> Result<bool> {
        if !postpone {
            match self.state.assets.give(asset, challenger, amount) {
                Ok(()) => return Ok(false),
                Err(Error::TransferRejected(_)) => {
                    debug!(challenger = %challenger, amount, "stake transfer rejected, postponing");
                }
                Err(e) => return Err(e),
            }
        }
        self.state.payouts.add(*asset, *challenger, amount)?;
        self.emit(HubEvent::PayoutPostponed {
            asset: *asset,
            beneficiary: *challenger,
            amount,
        });
        Ok(true)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DEFERRED PAYOUTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Claim the caller's postponed collateral; returns the amount sent
    pub fn return_postponed_collateral(
        &mut self,
        call: Call,
        asset: AssetId,
        target: Address,
        as_native: bool,
    ) -> Result<u128> {
        call.ensure_no_value()?;
        self.atomically("return_postponed_collateral", |hub| {
            let amount = hub.state.payouts.claim(&asset, &call.caller);
            hub.push_collateral(&asset, &target, amount, as_native)?;
            if amount > 0 {
                hub.emit(HubEvent::PayoutClaimed {
                    asset,
                    beneficiary: call.caller,
                    target,
                    amount,
                });
            }
            Ok(amount)
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXPIRED POSITIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Current price per unit of an expired position's collateral
    pub fn expired_price(&self, address: &Address) -> Result<u128> {
        let position = self.position(address)?;
        expired_purchase_price(
            position.price,
            position.expiration,
            position.challenge_period,
            self.config.expired_price_factor,
            self.now(),
        )
    }

    /// Buy up to `up_to` collateral of an expired position; returns the amount bought
    pub fn buy_expired_collateral(
        &mut self,
        call: Call,
        position: Address,
        up_to: u128,
        as_native: bool,
    ) -> Result<u128> {
        call.ensure_no_value()?;
        self.atomically("buy_expired_collateral", |hub| {
            hub.buy_expired_inner(&call.caller, &position, up_to, as_native)
        })
    }

    fn buy_expired_inner(&mut self, buyer: &Address, address: &Address, up_to: u128, as_native: bool) -> Result<u128> {
        let now = self.now();
        {
            let position = self.position(address)?;
            if position.closed && position.collateral_balance == 0 {
                return Err(Error::Closed);
            }
            if !position.is_expired(now) {
                return Err(Error::Alive {
                    expiration: position.expiration,
                });
            }
            if position.challenged_amount > 0 {
                return Err(Error::Challenged);
            }
        }
        let price = self.expired_price(address)?;
        let opening_fee = self.config.opening_fee;

        let (balance, minimum_collateral, principal, interest, reserve_ppm, owner, asset, original) = {
            let position = self.position_mut(address)?;
            position.accrue_interest(now)?;
            (
                position.collateral_balance,
                position.minimum_collateral,
                position.principal,
                position.interest,
                position.reserve_contribution_ppm,
                position.owner,
                position.collateral,
                position.original,
            )
        };

        let amount = up_to.min(balance);
        validate_non_zero(amount)?;
        let remaining = balance - amount;
        if remaining > 0 {
            // The remainder must stay sellable: worth the opening fee and not below the minimum
            let value = mul_div(remaining, price, PRICE_SCALE)?;
            if value < opening_fee || remaining < minimum_collateral {
                let minimum = opening_fee.max(mul_div(minimum_collateral, price, PRICE_SCALE)?);
                return Err(Error::LeaveNoDust { value, minimum });
            }
        }

        let cost = mul_div(amount, price, PRICE_SCALE)?;
        self.state.token.transfer(buyer, &HUB_ADDRESS, cost)?;

        let interest_paid = cost.min(interest);
        self.state.token.collect_profits(&HUB_ADDRESS, interest_paid)?;
        let funds = cost - interest_paid;
        let principal_paid = funds.min(principal);
        self.state
            .token
            .burn_without_reserve(&HUB_ADDRESS, principal_paid, reserve_ppm)?;
        self.state
            .token
            .transfer(&HUB_ADDRESS, &owner, funds - principal_paid)?;

        let (principal_retired, interest_retired) = if remaining == 0 && principal > principal_paid {
            let loss = principal - principal_paid;
            self.state.token.cover_loss(&HUB_ADDRESS, loss)?;
            self.state
                .token
                .burn_without_reserve(&HUB_ADDRESS, loss, reserve_ppm)?;
            info!(position = %address, loss, "reserve covered expired shortfall");
            // Unpaid interest is forgiven together with the shortfall
            (principal, interest)
        } else {
            (principal_paid, interest_paid)
        };

        let closed_now = {
            let position = self.position_mut(address)?;
            position.reduce_debt(principal_retired, interest_retired)?;
            position.remove_collateral(amount)?;
            position.close_if_dust()
        };
        self.sub_family_minted(&original, principal_retired)?;
        self.push_collateral(&asset, buyer, amount, as_native)?;

        self.emit(HubEvent::ExpiredCollateralSold {
            position: *address,
            buyer: *buyer,
            amount,
            price,
        });
        if closed_now {
            self.emit(HubEvent::PositionClosed { position: *address });
        }
        info!(position = %address, buyer = %buyer, amount, price, "expired collateral sold");
        Ok(amount)
    }
}
