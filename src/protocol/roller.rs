//! Position roller.
//!
//! Moves debt and collateral from a maturing position into another one of the
//! same collateral in a single transaction. The roller flash-mints the
//! repayment, settles the source, re-opens the debt on the target (cloning it
//! when the caller does not own it or wants a different expiration) and
//! finally burns the flash amount from the caller.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::collateral::CollateralKind;
use crate::core::factory::ClonePositionParams;
use crate::core::token::UnitOfAccount;
use crate::error::{Error, Result};
use crate::protocol::events::HubEvent;
use crate::protocol::minting_hub::{Call, MintingHub};
use crate::storage::backend::StorageBackend;
use crate::utils::constants::PRICE_SCALE;
use crate::utils::crypto::{Address, ROLLER_ADDRESS};
use crate::utils::math::{gross_for_net, mul_div, mul_div_up};

/// Amounts of one roll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollParams {
    /// Position being rolled out of
    pub source: Address,
    /// Flash-minted repayment for the source
    pub repay: u128,
    /// Collateral withdrawn from the source
    pub collateral_withdraw: u128,
    /// Position being rolled into
    pub target: Address,
    /// Principal minted on the target
    pub mint: u128,
    /// Collateral deposited into the target
    pub collateral_deposit: u128,
    /// Expiration wanted for the target
    pub expiration: u64,
}

/// Roller bound to a hub
pub struct PositionRoller<'a, B: StorageBackend, U: UnitOfAccount> {
    hub: &'a mut MintingHub<B, U>,
}

impl<B: StorageBackend, U: UnitOfAccount> MintingHub<B, U> {
    /// Roller operating on this hub
    pub fn roller(&mut self) -> PositionRoller<'_, B, U> {
        PositionRoller { hub: self }
    }

    /// Amounts that move all of `source` into `target`
    pub fn full_roll_params(&mut self, source: &Address, target: &Address, expiration: u64) -> Result<RollParams> {
        let now = self.now();
        let (principal, interest, reserve_ppm, balance) = {
            let position = self.position_mut(source)?;
            position.accrue_interest(now)?;
            (
                position.principal,
                position.interest,
                position.reserve_contribution_ppm,
                position.collateral_balance,
            )
        };
        let assigned = self.state.token.assigned_reserve(principal, reserve_ppm);
        let repay = principal.saturating_sub(assigned) + interest;

        let target_position = self.position(target)?;
        let mut mint = gross_for_net(repay, target_position.reserve_contribution_ppm)?;
        let required = mul_div_up(mint, PRICE_SCALE, target_position.price)?;
        let deposit = if required > balance {
            mint = mul_div(balance, target_position.price, PRICE_SCALE)?;
            balance
        } else {
            required.max(target_position.minimum_collateral).min(balance)
        };

        Ok(RollParams {
            source: *source,
            repay,
            collateral_withdraw: balance,
            target: *target,
            mint,
            collateral_deposit: deposit,
            expiration,
        })
    }

    fn roll_inner(&mut self, call: &Call, params: &RollParams, native: bool) -> Result<Address> {
        let caller = call.caller;
        let source = self.position(&params.source)?.clone();
        let target = self.position(&params.target)?.clone();
        if source.owner != caller {
            return Err(Error::Unauthorized(format!(
                "{} does not own {}",
                caller, source.address
            )));
        }
        if source.collateral != target.collateral {
            return Err(Error::InvalidParameter {
                name: "target".into(),
                reason: "collateral differs from source".into(),
            });
        }
        if native {
            if source.collateral_kind != CollateralKind::WrappedNative {
                return Err(Error::NativeOnlyForWrappedAsset);
            }
            self.state
                .assets
                .send_native(&caller, &ROLLER_ADDRESS, call.value)?;
        } else {
            call.ensure_no_value()?;
        }

        // Flash-mint the repayment and settle the source
        self.state.token.mint(&ROLLER_ADDRESS, params.repay)?;
        self.repay_inner(&ROLLER_ADDRESS, &params.source, params.repay)?;

        let collateral_holder = if native { ROLLER_ADDRESS } else { caller };
        if params.collateral_withdraw > 0 {
            self.withdraw_inner(
                &ROLLER_ADDRESS,
                &params.source,
                &collateral_holder,
                params.collateral_withdraw,
                native,
            )?;
        }

        let deposit_call = if native {
            Call::with_value(ROLLER_ADDRESS, params.collateral_deposit)
        } else {
            Call::new(caller)
        };

        let mut rolled_into = params.target;
        if params.mint > 0 {
            if target.owner != caller || target.expiration != params.expiration {
                rolled_into = self.clone_inner(
                    &deposit_call,
                    &ClonePositionParams {
                        owner: caller,
                        parent: params.target,
                        initial_collateral: params.collateral_deposit,
                        initial_mint: params.mint,
                        expiration: params.expiration,
                        liquidation_price: None,
                    },
                )?;
            } else {
                if params.collateral_deposit > 0 {
                    self.add_collateral_inner(&deposit_call, &params.target, params.collateral_deposit)?;
                }
                self.mint_inner(&ROLLER_ADDRESS, &params.target, &caller, params.mint)?;
            }
        }

        // Whatever the source did not consume belongs to the caller
        let leftover = self.state.token.balance_of(&ROLLER_ADDRESS);
        self.state.token.transfer(&ROLLER_ADDRESS, &caller, leftover)?;
        if native {
            let residual = self.state.assets.native_balance(&ROLLER_ADDRESS);
            self.state
                .assets
                .send_native(&ROLLER_ADDRESS, &caller, residual)?;
        }
        self.state.token.burn_from(&caller, params.repay)?;

        self.emit(HubEvent::Rolled {
            source: params.source,
            target: rolled_into,
            repay: params.repay,
            collateral_withdrawn: params.collateral_withdraw,
            mint: params.mint,
            collateral_deposited: params.collateral_deposit,
        });
        info!(
            source = %params.source,
            target = %rolled_into,
            repay = params.repay,
            mint = params.mint,
            native,
            "position rolled"
        );
        Ok(rolled_into)
    }

    fn roll_fully_inner(&mut self, call: &Call, source: &Address, target: &Address, expiration: Option<u64>, native: bool) -> Result<Address> {
        let expiration = match expiration {
            Some(expiration) => expiration,
            None => self.position(target)?.expiration,
        };
        let params = self.full_roll_params(source, target, expiration)?;
        self.roll_inner(call, &params, native)
    }
}

impl<'a, B: StorageBackend, U: UnitOfAccount> PositionRoller<'a, B, U> {
    /// Roll with explicit amounts; returns the position the debt ended up in
    pub fn roll(&mut self, call: Call, params: RollParams) -> Result<Address> {
        self.hub
            .atomically("roll", |hub| hub.roll_inner(&call, &params, false))
    }

    /// Roll with explicit amounts, moving collateral as native value.
    ///
    /// Attached value tops up the deposit; any native residual is returned.
    pub fn roll_native(&mut self, call: Call, params: RollParams) -> Result<Address> {
        self.hub
            .atomically("roll_native", |hub| hub.roll_inner(&call, &params, true))
    }

    /// Roll all debt and collateral of `source` into `target` at its expiration
    pub fn roll_fully(&mut self, call: Call, source: Address, target: Address) -> Result<Address> {
        self.hub.atomically("roll_fully", |hub| {
            hub.roll_fully_inner(&call, &source, &target, None, false)
        })
    }

    /// Roll everything into `target`, cloning it if `expiration` differs
    pub fn roll_fully_with_expiration(
        &mut self,
        call: Call,
        source: Address,
        target: Address,
        expiration: u64,
    ) -> Result<Address> {
        self.hub.atomically("roll_fully_with_expiration", |hub| {
            hub.roll_fully_inner(&call, &source, &target, Some(expiration), false)
        })
    }

    /// Native variant of [`roll_fully`](Self::roll_fully)
    pub fn roll_fully_native(&mut self, call: Call, source: Address, target: Address) -> Result<Address> {
        self.hub.atomically("roll_fully_native", |hub| {
            hub.roll_fully_inner(&call, &source, &target, None, true)
        })
    }

    /// Native variant of [`roll_fully_with_expiration`](Self::roll_fully_with_expiration)
    pub fn roll_fully_native_with_expiration(
        &mut self,
        call: Call,
        source: Address,
        target: Address,
        expiration: u64,
    ) -> Result<Address> {
        self.hub
            .atomically("roll_fully_native_with_expiration", |hub| {
                hub.roll_fully_inner(&call, &source, &target, Some(expiration), true)
            })
    }
}
