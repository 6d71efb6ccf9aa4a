//! Minting hub - the coordinator of all positions.
//!
//! The hub owns every position, the live challenges, the deferred payouts and
//! the ledgers it settles against. It is a single sequential state machine:
//! each public operation runs as one transaction that either applies in full
//! or leaves the state exactly as it found it.
//!
//! Position operations live in this file; the challenge protocol and expired
//! sales are in `liquidation.rs`, rolling in `roller.rs`.

use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::auction::challenge::ChallengeBook;
use crate::auction::payouts::PayoutLedger;
use crate::auction::pricing::PriceDecay;
use crate::core::collateral::{AssetLedger, CollateralKind};
use crate::core::config::HubConfig;
use crate::core::factory::{ClonePositionParams, OpenPositionParams, PositionFactory};
use crate::core::position::Position;
use crate::core::token::{StableToken, UnitOfAccount};
use crate::error::{Error, Result};
use crate::protocol::events::{EventLog, HubEvent};
use crate::storage::backend::{InMemoryStore, StorageBackend};
use crate::storage::state::{HubMeta, StateManager, STATE_VERSION};
use crate::utils::constants::PRICE_SCALE;
use crate::utils::crypto::{Address, AssetId, HUB_ADDRESS, ROLLER_ADDRESS};
use crate::utils::math::*;
use crate::utils::validation::{validate_non_zero, validate_open_params};

// ═══════════════════════════════════════════════════════════════════════════════
// CALL CONTEXT
// ═══════════════════════════════════════════════════════════════════════════════

/// Caller of an operation and the native value attached to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Call {
    /// Account invoking the operation
    pub caller: Address,
    /// Native value sent along
    pub value: u128,
}

impl Call {
    /// Call without attached value
    pub fn new(caller: Address) -> Self {
        Self { caller, value: 0 }
    }

    /// Call with attached native value
    pub fn with_value(caller: Address, value: u128) -> Self {
        Self { caller, value }
    }

    /// Fail if value is attached to a non-payable operation
    pub fn ensure_no_value(&self) -> Result<()> {
        if self.value != 0 {
            return Err(Error::ValueMismatch {
                expected: 0,
                got: self.value,
            });
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HUB STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything a transaction may change; snapshotted for rollback
#[derive(Debug, Clone)]
pub struct HubState<U> {
    /// Positions by address
    pub positions: BTreeMap<Address, Position>,
    /// Live challenges
    pub challenges: ChallengeBook,
    /// Deferred payouts
    pub payouts: PayoutLedger,
    /// Unit-of-account ledger
    pub token: U,
    /// Collateral and native ledger
    pub assets: AssetLedger,
    /// Last used nonce per signer
    pub nonces: BTreeMap<Address, u64>,
    /// Counter for position address derivation
    pub position_nonce: u64,
    /// Current block height
    pub block_height: u64,
    /// Current block timestamp
    pub timestamp: u64,
    /// Events emitted in the current block
    pub events: EventLog,
}

impl<U: UnitOfAccount> HubState<U> {
    fn new(token: U, assets: AssetLedger) -> Self {
        Self {
            positions: BTreeMap::new(),
            challenges: ChallengeBook::new(),
            payouts: PayoutLedger::new(),
            token,
            assets,
            nonces: BTreeMap::new(),
            position_nonce: 0,
            block_height: 0,
            timestamp: 0,
            events: EventLog::new(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MINTING HUB
// ═══════════════════════════════════════════════════════════════════════════════

/// Coordinator of positions, challenges and payouts
pub struct MintingHub<B: StorageBackend = InMemoryStore, U: UnitOfAccount = StableToken> {
    pub(crate) config: HubConfig,
    pub(crate) decay: PriceDecay,
    pub(crate) state: HubState<U>,
    state_manager: StateManager<B>,
}

impl MintingHub<InMemoryStore, StableToken> {
    /// Hub backed by in-memory storage
    pub fn in_memory(config: HubConfig) -> Result<Self> {
        Self::new(config, InMemoryStore::new())
    }
}

impl<B: StorageBackend> MintingHub<B, StableToken> {
    /// Fresh hub with an empty stablecoin ledger
    pub fn new(config: HubConfig, backend: B) -> Result<Self> {
        Self::with_token(config, backend, StableToken::new())
    }
}

impl<B: StorageBackend, U: UnitOfAccount> MintingHub<B, U> {
    /// Fresh hub settling against `token`
    pub fn with_token(config: HubConfig, backend: B, token: U) -> Result<Self> {
        config.validate()?;
        let decay = PriceDecay::new(config.decay_exponent)?;
        let assets = match config.wrapped_native {
            Some(asset) => AssetLedger::with_wrapped_native(asset),
            None => AssetLedger::new(),
        };

        Ok(Self {
            config,
            decay,
            state: HubState::new(token, assets),
            state_manager: StateManager::new(backend),
        })
    }

    /// Reload a hub from storage; starts fresh if nothing was persisted
    pub fn restore(config: HubConfig, backend: B) -> Result<Self> {
        let mut hub = Self::with_token(config, backend, U::default())?;

        let meta: HubMeta<U> = match hub.state_manager.load_meta()? {
            Some(meta) => meta,
            None => return Ok(hub),
        };
        if meta.version != STATE_VERSION {
            return Err(Error::Storage(format!(
                "unsupported state version {}",
                meta.version
            )));
        }

        let positions = hub.state_manager.load_all_positions()?;
        let challenges = hub.state_manager.load_challenges()?;
        let payouts = hub.state_manager.load_payouts()?;

        hub.state.positions = positions.into_iter().map(|p| (p.address, p)).collect();
        hub.state.challenges = ChallengeBook::from_parts(challenges, meta.next_challenge);
        hub.state.payouts = payouts;
        hub.state.token = meta.token;
        hub.state.assets = meta.assets;
        hub.state.nonces = meta.nonces;
        hub.state.position_nonce = meta.position_nonce;
        hub.state.block_height = meta.block_height;
        hub.state.timestamp = meta.timestamp;

        info!(
            positions = hub.state.positions.len(),
            challenges = hub.state.challenges.len(),
            height = hub.state.block_height,
            "hub state restored"
        );
        Ok(hub)
    }

    /// Write the full hub state to storage and flush
    pub fn persist(&self) -> Result<()> {
        for position in self.state.positions.values() {
            self.state_manager.save_position(position)?;
        }
        self.state_manager
            .replace_challenges(self.state.challenges.iter())?;
        self.state_manager.replace_payouts(&self.state.payouts)?;
        self.state_manager.save_meta(&HubMeta {
            version: STATE_VERSION,
            token: self.state.token.clone(),
            assets: self.state.assets.clone(),
            nonces: self.state.nonces.clone(),
            next_challenge: self.state.challenges.next_number(),
            position_nonce: self.state.position_nonce,
            block_height: self.state.block_height,
            timestamp: self.state.timestamp,
        })?;
        self.state_manager.flush()?;

        debug!(height = self.state.block_height, "hub state persisted");
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BLOCK PROCESSING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Begin a new block; the clock never runs backwards
    pub fn begin_block(&mut self, height: u64, timestamp: u64) -> Result<()> {
        if timestamp < self.state.timestamp {
            return Err(Error::InvalidParameter {
                name: "timestamp".into(),
                reason: format!(
                    "{} earlier than current block time {}",
                    timestamp, self.state.timestamp
                ),
            });
        }
        self.state.block_height = height;
        self.state.timestamp = timestamp;
        Ok(())
    }

    /// End the current block, returning the events it emitted
    pub fn end_block(&mut self) -> EventLog {
        self.state.events.drain()
    }

    /// Run `f` as one transaction: on error every change is rolled back
    pub(crate) fn atomically<T, F>(&mut self, operation: &str, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        let snapshot = self.state.clone();
        match f(self) {
            Ok(value) => Ok(value),
            Err(e) => {
                self.state = snapshot;
                warn!(operation, code = e.code(), error = %e, "transaction reverted");
                Err(e)
            }
        }
    }

    pub(crate) fn emit(&mut self, event: HubEvent) {
        let (height, timestamp) = (self.state.block_height, self.state.timestamp);
        self.state.events.push(height, timestamp, event);
    }

    pub(crate) fn now(&self) -> u64 {
        self.state.timestamp
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Hub configuration
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Current block timestamp
    pub fn timestamp(&self) -> u64 {
        self.state.timestamp
    }

    /// Current block height
    pub fn block_height(&self) -> u64 {
        self.state.block_height
    }

    /// Look up a position
    pub fn position(&self, address: &Address) -> Result<&Position> {
        self.state
            .positions
            .get(address)
            .ok_or_else(|| Error::PositionNotFound(address.to_string()))
    }

    /// All positions in address order
    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.state.positions.values()
    }

    /// Live challenges
    pub fn challenges(&self) -> &ChallengeBook {
        &self.state.challenges
    }

    /// Unit-of-account ledger
    pub fn token(&self) -> &U {
        &self.state.token
    }

    /// Mutable unit-of-account ledger, for funding accounts outside the hub
    pub fn token_mut(&mut self) -> &mut U {
        &mut self.state.token
    }

    /// Collateral and native ledger
    pub fn assets(&self) -> &AssetLedger {
        &self.state.assets
    }

    /// Mutable collateral ledger, for funding accounts outside the hub
    pub fn assets_mut(&mut self) -> &mut AssetLedger {
        &mut self.state.assets
    }

    /// Amount owed to `beneficiary` in the deferred-payout ledger
    pub fn pending_payout(&self, asset: &AssetId, beneficiary: &Address) -> u128 {
        self.state.payouts.get(asset, beneficiary)
    }

    /// Events emitted so far in the current block
    pub fn events(&self) -> &EventLog {
        &self.state.events
    }

    /// Last nonce used by a signer
    pub fn nonce_of(&self, signer: &Address) -> u64 {
        self.state.nonces.get(signer).copied().unwrap_or(0)
    }

    /// Principal a position may still mint within its family limit
    pub fn available_for_minting(&self, address: &Address) -> Result<u128> {
        let position = self.position(address)?;
        if position.is_original() {
            Ok(position.limit.saturating_sub(position.total_minted))
        } else {
            self.position(&position.original)?.available_for_clones()
        }
    }

    /// Debt of a position including interest accrued up to now
    pub fn current_debt(&self, address: &Address) -> Result<u128> {
        let position = self.position(address)?;
        safe_add(position.debt()?, position.pending_interest(self.now())?)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INTERNAL HELPERS
    // ═══════════════════════════════════════════════════════════════════════════

    pub(crate) fn position_mut(&mut self, address: &Address) -> Result<&mut Position> {
        self.state
            .positions
            .get_mut(address)
            .ok_or_else(|| Error::PositionNotFound(address.to_string()))
    }

    fn ensure_owner(position: &Position, caller: &Address) -> Result<()> {
        if position.owner != *caller {
            return Err(Error::Unauthorized(format!(
                "{} does not own {}",
                caller, position.address
            )));
        }
        Ok(())
    }

    fn ensure_owner_or_roller(position: &Position, caller: &Address) -> Result<()> {
        if *caller == ROLLER_ADDRESS {
            return Ok(());
        }
        Self::ensure_owner(position, caller)
    }

    fn next_position_address(&mut self, creator: &Address) -> Address {
        let address = Address::derive(creator, self.state.position_nonce);
        self.state.position_nonce += 1;
        address
    }

    fn annual_rate(&self, risk_premium_ppm: u32) -> Result<u32> {
        self.config
            .lead_rate_ppm
            .checked_add(risk_premium_ppm)
            .ok_or(Error::Overflow {
                operation: "annual rate".into(),
            })
    }

    fn add_family_minted(&mut self, original: &Address, amount: u128) -> Result<()> {
        let root = self.position_mut(original)?;
        root.total_minted = safe_add(root.total_minted, amount)?;
        Ok(())
    }

    pub(crate) fn sub_family_minted(&mut self, original: &Address, amount: u128) -> Result<()> {
        let root = self.position_mut(original)?;
        root.total_minted = root.total_minted.saturating_sub(amount);
        Ok(())
    }

    /// Move collateral from the caller into hub custody, wrapping attached value
    pub(crate) fn pull_collateral(&mut self, call: &Call, asset: &AssetId, amount: u128) -> Result<()> {
        if call.value == 0 {
            return self.state.assets.take(asset, &call.caller, amount);
        }
        if self.state.assets.kind_of(asset) != CollateralKind::WrappedNative {
            return Err(Error::NativeOnlyForWrappedAsset);
        }
        if call.value != amount {
            return Err(Error::ValueMismatch {
                expected: amount,
                got: call.value,
            });
        }
        self.state.assets.wrap_into_custody(&call.caller, amount)
    }

    /// Release collateral from hub custody, optionally unwrapped
    pub(crate) fn push_collateral(
        &mut self,
        asset: &AssetId,
        to: &Address,
        amount: u128,
        as_native: bool,
    ) -> Result<()> {
        if !as_native {
            return self.state.assets.give(asset, to, amount);
        }
        if self.state.assets.kind_of(asset) != CollateralKind::WrappedNative {
            return Err(Error::NativeOnlyForWrappedAsset);
        }
        self.state.assets.unwrap_from_custody(&HUB_ADDRESS, amount)?;
        self.state.assets.send_native(&HUB_ADDRESS, to, amount)
    }

    /// Receive hook for native value arriving at a position's address
    fn on_native_received(&mut self, address: &Address, amount: u128) -> Result<()> {
        let position = self.position(address)?;
        if !position.collateral_kind.accepts_native() {
            return Err(Error::NativeOnlyForWrappedAsset);
        }
        if position.native_withdrawal_in_progress {
            // Value is on its way out; leave it unwrapped
            return Ok(());
        }
        if position.closed {
            return Err(Error::Closed);
        }
        self.state.assets.wrap_into_custody(address, amount)?;
        self.position_mut(address)?.add_collateral(amount)?;
        self.emit(HubEvent::CollateralAdded {
            position: *address,
            amount,
            native: true,
        });
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // OPENING AND CLONING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Open an original position; returns its address
    pub fn open_position(&mut self, call: Call, params: OpenPositionParams) -> Result<Address> {
        self.atomically("open_position", |hub| hub.open_position_inner(&call, &params))
    }

    fn open_position_inner(&mut self, call: &Call, params: &OpenPositionParams) -> Result<Address> {
        validate_open_params(params, &self.config)?;
        let kind = self.state.assets.kind_of(&params.collateral);
        let annual_rate = self.annual_rate(params.risk_premium_ppm)?;
        let now = self.now();

        let fee = self.config.opening_fee;
        self.state.token.collect_profits(&call.caller, fee)?;
        self.pull_collateral(call, &params.collateral, params.initial_collateral)?;

        let address = self.next_position_address(&call.caller);
        let position =
            PositionFactory::create(address, call.caller, params, kind, annual_rate, now)?;
        self.state.positions.insert(address, position);

        self.emit(HubEvent::PositionOpened {
            position: address,
            owner: call.caller,
            collateral: params.collateral,
            collateral_amount: params.initial_collateral,
            price: params.liquidation_price,
            fee,
        });
        info!(position = %address, owner = %call.caller, "position opened");
        Ok(address)
    }

    /// Clone a position; returns the clone's address
    pub fn clone_position(&mut self, call: Call, params: ClonePositionParams) -> Result<Address> {
        self.atomically("clone_position", |hub| hub.clone_inner(&call, &params))
    }

    pub(crate) fn clone_inner(&mut self, call: &Call, params: &ClonePositionParams) -> Result<Address> {
        let now = self.now();
        let parent = self.position(&params.parent)?.clone();
        parent.ensure_cloneable(now)?;

        let original_expiration = self.position(&parent.original)?.expiration;
        if params.expiration <= now || params.expiration > original_expiration {
            return Err(Error::InvalidExpiration {
                expiration: params.expiration,
                now,
                max: original_expiration,
            });
        }

        let new_price = params.liquidation_price.unwrap_or(parent.price);
        let max_price = safe_mul(parent.price, self.config.max_clone_price_factor)?;
        if new_price > max_price {
            return Err(Error::PriceTooHigh {
                price: new_price,
                max: max_price,
            });
        }
        if new_price == 0 {
            return Err(Error::InvalidParameter {
                name: "liquidation_price".into(),
                reason: "must be positive".into(),
            });
        }

        let annual_rate = self.annual_rate(parent.risk_premium_ppm)?;
        let address = self.next_position_address(&call.caller);
        let clone = PositionFactory::clone_position(
            &parent,
            address,
            params.owner,
            params.initial_collateral,
            params.expiration,
            annual_rate,
            now,
        )?;
        self.pull_collateral(call, &parent.collateral, params.initial_collateral)?;
        self.state.positions.insert(address, clone);

        // Mint at the parent's price, then reprice
        if params.initial_mint > 0 {
            self.mint_inner(&params.owner, &address, &params.owner, params.initial_mint)?;
        }
        if new_price != parent.price {
            let cooldown = self.config.price_increase_cooldown;
            let position = self.position_mut(&address)?;
            if new_price > position.price {
                position.restrict_minting(now, cooldown);
            }
            position.price = new_price;
            position.check_solvency()?;
        }

        self.emit(HubEvent::PositionCloned {
            position: address,
            parent: params.parent,
            owner: params.owner,
            collateral_amount: params.initial_collateral,
            minted: params.initial_mint,
        });
        info!(position = %address, parent = %params.parent, "position cloned");
        Ok(address)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // MINTING AND REPAYMENT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Mint `amount` of principal; `target` receives the part not reserved
    pub fn mint(&mut self, call: Call, position: Address, target: Address, amount: u128) -> Result<u128> {
        call.ensure_no_value()?;
        self.atomically("mint", |hub| hub.mint_inner(&call.caller, &position, &target, amount))
    }

    pub(crate) fn mint_inner(
        &mut self,
        caller: &Address,
        address: &Address,
        target: &Address,
        amount: u128,
    ) -> Result<u128> {
        validate_non_zero(amount)?;
        let now = self.now();
        let (original, reserve_ppm) = {
            let position = self.position(address)?;
            Self::ensure_owner_or_roller(position, caller)?;
            position.ensure_mintable(now)?;
            (position.original, position.reserve_contribution_ppm)
        };

        let available = self.available_for_minting(address)?;
        if amount > available {
            return Err(Error::LimitExceeded {
                requested: amount,
                available,
            });
        }

        {
            let position = self.position_mut(address)?;
            position.accrue_interest(now)?;
            position.principal = safe_add(position.principal, amount)?;
            position.check_solvency()?;
        }
        self.add_family_minted(&original, amount)?;

        let usable = self
            .state
            .token
            .mint_with_reserve(target, amount, reserve_ppm)?;

        self.emit(HubEvent::Minted {
            position: *address,
            target: *target,
            amount,
            usable,
        });
        debug!(position = %self.position(address)?.summary(now), amount, usable, "minted");
        Ok(usable)
    }

    /// Repay up to `amount`: interest first, then principal. Returns the amount spent.
    pub fn repay(&mut self, call: Call, position: Address, amount: u128) -> Result<u128> {
        call.ensure_no_value()?;
        self.atomically("repay", |hub| hub.repay_inner(&call.caller, &position, amount))
    }

    /// Repay all debt of a position. Returns the amount spent.
    pub fn repay_full(&mut self, call: Call, position: Address) -> Result<u128> {
        call.ensure_no_value()?;
        self.atomically("repay_full", |hub| {
            hub.repay_inner(&call.caller, &position, u128::MAX)
        })
    }

    pub(crate) fn repay_inner(&mut self, payer: &Address, address: &Address, amount: u128) -> Result<u128> {
        let now = self.now();
        let (interest, principal, reserve_ppm, original) = {
            let position = self.position_mut(address)?;
            position.accrue_interest(now)?;
            (
                position.interest,
                position.principal,
                position.reserve_contribution_ppm,
                position.original,
            )
        };

        let interest_paid = amount.min(interest);
        self.state.token.collect_profits(payer, interest_paid)?;
        let remaining = amount - interest_paid;

        let (principal_retired, principal_paid) = if remaining == 0 || principal == 0 {
            (0, 0)
        } else {
            let assigned = self.state.token.assigned_reserve(principal, reserve_ppm);
            let net_full = principal.saturating_sub(assigned);
            if remaining >= net_full {
                let paid = self
                    .state
                    .token
                    .burn_from_with_reserve(payer, principal, reserve_ppm)?;
                (principal, paid)
            } else {
                let freed = self
                    .state
                    .token
                    .burn_with_reserve(payer, remaining, reserve_ppm)?;
                (freed.min(principal), remaining)
            }
        };

        self.position_mut(address)?
            .reduce_debt(principal_retired, interest_paid)?;
        self.sub_family_minted(&original, principal_retired)?;

        if interest_paid > 0 || principal_retired > 0 {
            self.emit(HubEvent::Repaid {
                position: *address,
                payer: *payer,
                interest: interest_paid,
                principal: principal_retired,
            });
        }
        debug!(position = %address, interest_paid, principal_retired, "repaid");
        safe_add(interest_paid, principal_paid)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // COLLATERAL
    // ═══════════════════════════════════════════════════════════════════════════

    /// Add collateral; attached value is wrapped for the wrappable asset
    pub fn add_collateral(&mut self, call: Call, position: Address, amount: u128) -> Result<()> {
        self.atomically("add_collateral", |hub| {
            hub.add_collateral_inner(&call, &position, amount)
        })
    }

    pub(crate) fn add_collateral_inner(&mut self, call: &Call, address: &Address, amount: u128) -> Result<()> {
        validate_non_zero(amount)?;
        let asset = {
            let position = self.position(address)?;
            if position.closed {
                return Err(Error::Closed);
            }
            position.collateral
        };
        self.pull_collateral(call, &asset, amount)?;
        self.position_mut(address)?.add_collateral(amount)?;
        self.emit(HubEvent::CollateralAdded {
            position: *address,
            amount,
            native: call.value > 0,
        });
        Ok(())
    }

    /// Send native value straight to a position's address
    pub fn deposit_native(&mut self, call: Call, position: Address) -> Result<()> {
        self.atomically("deposit_native", |hub| {
            validate_non_zero(call.value)?;
            hub.position(&position)?;
            hub.state
                .assets
                .send_native(&call.caller, &position, call.value)?;
            hub.on_native_received(&position, call.value)
        })
    }

    /// Withdraw collateral to `target`
    pub fn withdraw_collateral(
        &mut self,
        call: Call,
        position: Address,
        target: Address,
        amount: u128,
    ) -> Result<()> {
        call.ensure_no_value()?;
        self.atomically("withdraw_collateral", |hub| {
            hub.withdraw_inner(&call.caller, &position, &target, amount, false)
        })
    }

    /// Withdraw wrappable collateral to `target` as native value
    pub fn withdraw_collateral_as_native(
        &mut self,
        call: Call,
        position: Address,
        target: Address,
        amount: u128,
    ) -> Result<()> {
        call.ensure_no_value()?;
        self.atomically("withdraw_collateral_as_native", |hub| {
            hub.withdraw_inner(&call.caller, &position, &target, amount, true)
        })
    }

    pub(crate) fn withdraw_inner(
        &mut self,
        caller: &Address,
        address: &Address,
        target: &Address,
        amount: u128,
        as_native: bool,
    ) -> Result<()> {
        validate_non_zero(amount)?;
        let now = self.now();

        let (asset, closed_now) = {
            let position = self.position_mut(address)?;
            Self::ensure_owner_or_roller(position, caller)?;
            if position.challenged_amount > 0 {
                return Err(Error::Challenged);
            }
            if position.in_cooldown_after_start(now) {
                return Err(Error::Hot {
                    until: position.cooldown,
                });
            }
            if as_native && !position.collateral_kind.accepts_native() {
                return Err(Error::NativeOnlyForWrappedAsset);
            }
            position.accrue_interest(now)?;
            position.remove_collateral(amount)?;
            let closed_now = position.close_if_dust();
            position.check_solvency()?;
            (position.collateral, closed_now)
        };

        if as_native {
            self.position_mut(address)?.native_withdrawal_in_progress = true;
            self.state.assets.unwrap_from_custody(address, amount)?;
            self.on_native_received(address, amount)?;
            self.state.assets.send_native(address, target, amount)?;
            self.position_mut(address)?.native_withdrawal_in_progress = false;
        } else {
            self.state.assets.give(&asset, target, amount)?;
        }

        self.emit(HubEvent::CollateralWithdrawn {
            position: *address,
            target: *target,
            amount,
            native: as_native,
        });
        if closed_now {
            self.emit(HubEvent::PositionClosed { position: *address });
            info!(position = %address, "position closed");
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ADJUSTMENTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Change the liquidation price
    pub fn adjust_price(&mut self, call: Call, position: Address, new_price: u128) -> Result<()> {
        call.ensure_no_value()?;
        self.atomically("adjust_price", |hub| {
            Self::ensure_owner(hub.position(&position)?, &call.caller)?;
            hub.adjust_price_inner(&position, new_price)
        })
    }

    fn adjust_price_inner(&mut self, address: &Address, new_price: u128) -> Result<()> {
        if new_price == 0 {
            return Err(Error::InvalidParameter {
                name: "new_price".into(),
                reason: "must be positive".into(),
            });
        }
        let now = self.now();
        let cooldown_period = self.config.price_increase_cooldown;
        let available = self.available_for_minting(address)?;

        let position = self.position_mut(address)?;
        if position.closed {
            return Err(Error::Closed);
        }
        if position.challenged_amount > 0 {
            return Err(Error::Challenged);
        }
        if position.is_expired(now) {
            return Err(Error::Expired {
                expiration: position.expiration,
            });
        }
        if position.in_cooldown_after_start(now) {
            return Err(Error::Hot {
                until: position.cooldown,
            });
        }
        position.accrue_interest(now)?;

        let old_price = position.price;
        if new_price > old_price {
            let bound = safe_add(position.principal, available)?;
            if !product_gte(bound, PRICE_SCALE, position.collateral_balance, new_price) {
                let max = if position.collateral_balance == 0 {
                    u128::MAX
                } else {
                    mul_div(bound, PRICE_SCALE, position.collateral_balance)?
                };
                return Err(Error::PriceTooHigh {
                    price: new_price,
                    max,
                });
            }
            position.restrict_minting(now, cooldown_period);
        }
        position.price = new_price;
        position.check_solvency()?;
        let cooldown = position.cooldown;

        self.emit(HubEvent::PriceAdjusted {
            position: *address,
            old_price,
            new_price,
            cooldown,
        });
        Ok(())
    }

    /// Move a position to the given principal, collateral and price in one go.
    ///
    /// Order: deposit, repay, reprice, mint, withdraw. Repaying below the
    /// current principal also settles all accrued interest.
    pub fn adjust(
        &mut self,
        call: Call,
        position: Address,
        new_principal: u128,
        new_collateral: u128,
        new_price: u128,
    ) -> Result<()> {
        self.atomically("adjust", |hub| {
            let caller = call.caller;
            let current = hub.position(&position)?.clone();
            Self::ensure_owner(&current, &caller)?;

            if new_collateral > current.collateral_balance {
                hub.add_collateral_inner(&call, &position, new_collateral - current.collateral_balance)?;
            } else {
                call.ensure_no_value()?;
            }

            if new_principal < current.principal {
                let now = hub.now();
                let interest = {
                    let p = hub.position_mut(&position)?;
                    p.accrue_interest(now)?;
                    p.interest
                };
                let reduction = current.principal - new_principal;
                hub.state.token.collect_profits(&caller, interest)?;
                hub.state.token.burn_from_with_reserve(
                    &caller,
                    reduction,
                    current.reserve_contribution_ppm,
                )?;
                hub.position_mut(&position)?.reduce_debt(reduction, interest)?;
                hub.sub_family_minted(&current.original, reduction)?;
                hub.emit(HubEvent::Repaid {
                    position,
                    payer: caller,
                    interest,
                    principal: reduction,
                });
            }

            if new_price != hub.position(&position)?.price {
                hub.adjust_price_inner(&position, new_price)?;
            }

            if new_principal > current.principal {
                hub.mint_inner(&caller, &position, &caller, new_principal - current.principal)?;
            }

            let balance = hub.position(&position)?.collateral_balance;
            if new_collateral < balance {
                hub.withdraw_inner(&caller, &position, &caller, balance - new_collateral, false)?;
            }
            Ok(())
        })
    }

    /// Hand a position to a new owner
    pub fn transfer_ownership(&mut self, call: Call, position: Address, new_owner: Address) -> Result<()> {
        call.ensure_no_value()?;
        self.atomically("transfer_ownership", |hub| {
            let p = hub.position_mut(&position)?;
            Self::ensure_owner(p, &call.caller)?;
            let from = p.owner;
            p.owner = new_owner;
            hub.emit(HubEvent::OwnershipTransferred {
                position,
                from,
                to: new_owner,
            });
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::{DAY, ONE};

    fn weth() -> AssetId {
        AssetId::from_symbol("WETH")
    }

    fn owner() -> Address {
        Address::from_label("owner")
    }

    fn params() -> OpenPositionParams {
        OpenPositionParams {
            collateral: weth(),
            minimum_collateral: 5 * ONE,
            initial_collateral: 10 * ONE,
            limit: 100_000 * ONE,
            init_period: 3 * DAY,
            duration: 180 * DAY,
            challenge_period: 2 * DAY,
            risk_premium_ppm: 0,
            liquidation_price: 2_000 * ONE,
            reserve_contribution_ppm: 200_000,
        }
    }

    fn funded_hub() -> MintingHub {
        let mut hub = MintingHub::in_memory(HubConfig::with_wrapped_native(weth())).unwrap();
        hub.begin_block(1, 1_000).unwrap();
        hub.token_mut().mint(&owner(), 10_000 * ONE).unwrap();
        hub.assets_mut().mint(&weth(), &owner(), 100 * ONE).unwrap();
        hub
    }

    fn open(hub: &mut MintingHub) -> Address {
        hub.open_position(Call::new(owner()), params()).unwrap()
    }

    #[test]
    fn test_open_charges_fee_and_takes_collateral() {
        let mut hub = funded_hub();
        let address = open(&mut hub);

        assert_eq!(hub.token().balance_of(&owner()), 9_000 * ONE);
        assert_eq!(hub.token().equity(), 1_000 * ONE);
        assert_eq!(hub.assets().balance_of(&weth(), &owner()), 90 * ONE);

        let position = hub.position(&address).unwrap();
        assert_eq!(position.owner, owner());
        assert_eq!(position.start, 1_000 + 3 * DAY);
        assert_eq!(position.collateral_kind, CollateralKind::WrappedNative);
        assert_eq!(hub.end_block().filter_by_type("PositionOpened").len(), 1);
    }

    #[test]
    fn test_failed_open_rolls_back() {
        let mut hub = funded_hub();
        let mut p = params();
        p.initial_collateral = 1_000 * ONE;
        p.limit = 10_000_000 * ONE;

        // Fee is collected before the collateral transfer fails
        let result = hub.open_position(Call::new(owner()), p);
        assert!(matches!(result, Err(Error::InsufficientBalance { .. })));
        assert_eq!(hub.token().balance_of(&owner()), 10_000 * ONE);
        assert_eq!(hub.positions().count(), 0);
        assert!(hub.events().is_empty());
    }

    #[test]
    fn test_open_with_native_value() {
        let mut hub = funded_hub();
        hub.assets_mut().fund_native(&owner(), 10 * ONE).unwrap();

        let wrong = hub.open_position(Call::with_value(owner(), 9 * ONE), params());
        assert!(matches!(wrong, Err(Error::ValueMismatch { .. })));

        hub.open_position(Call::with_value(owner(), 10 * ONE), params())
            .unwrap();
        assert_eq!(hub.assets().native_balance(&owner()), 0);
        assert_eq!(hub.assets().balance_of(&weth(), &owner()), 100 * ONE);
    }

    #[test]
    fn test_mint_lifecycle() {
        let mut hub = funded_hub();
        let address = open(&mut hub);

        let hot = hub.mint(Call::new(owner()), address, owner(), 1_000 * ONE);
        assert!(matches!(hot, Err(Error::Hot { .. })));

        hub.begin_block(2, 1_000 + 3 * DAY + 1).unwrap();
        let usable = hub.mint(Call::new(owner()), address, owner(), 1_000 * ONE).unwrap();
        assert_eq!(usable, 800 * ONE);

        let position = hub.position(&address).unwrap();
        assert_eq!(position.principal, 1_000 * ONE);
        assert_eq!(position.total_minted, 1_000 * ONE);

        let stranger = hub.mint(Call::new(Address::from_label("x")), address, owner(), ONE);
        assert!(matches!(stranger, Err(Error::Unauthorized(_))));

        let insolvent = hub.mint(Call::new(owner()), address, owner(), 20_000 * ONE);
        assert!(matches!(insolvent, Err(Error::InsufficientCollateral { .. })));
    }

    #[test]
    fn test_repay_full_clears_debt() {
        let mut hub = funded_hub();
        let address = open(&mut hub);
        hub.begin_block(2, 1_000 + 3 * DAY + 1).unwrap();
        hub.mint(Call::new(owner()), address, owner(), 1_000 * ONE).unwrap();

        let spent = hub.repay_full(Call::new(owner()), address).unwrap();
        assert_eq!(spent, 800 * ONE);
        let position = hub.position(&address).unwrap();
        assert_eq!((position.principal, position.interest), (0, 0));
        assert_eq!(position.total_minted, 0);
        assert_eq!(hub.token().minter_reserve(), 0);
    }

    #[test]
    fn test_withdraw_to_dust_closes() {
        let mut hub = funded_hub();
        let address = open(&mut hub);

        hub.withdraw_collateral(Call::new(owner()), address, owner(), 6 * ONE)
            .unwrap();
        let position = hub.position(&address).unwrap();
        assert!(position.closed);

        let log = hub.end_block();
        assert_eq!(log.filter_by_type("PositionClosed").len(), 1);

        hub.begin_block(2, 1_000 + 3 * DAY + 1).unwrap();
        let closed = hub.mint(Call::new(owner()), address, owner(), ONE);
        assert_eq!(closed, Err(Error::Closed));
    }

    #[test]
    fn test_withdraw_as_native() {
        let mut hub = funded_hub();
        let address = open(&mut hub);
        let target = Address::from_label("target");

        hub.withdraw_collateral_as_native(Call::new(owner()), address, target, 2 * ONE)
            .unwrap();
        assert_eq!(hub.assets().native_balance(&target), 2 * ONE);
        assert!(!hub.position(&address).unwrap().native_withdrawal_in_progress);

        hub.assets_mut().set_native_rejecting(&target, true);
        let rejected =
            hub.withdraw_collateral_as_native(Call::new(owner()), address, target, ONE);
        assert!(matches!(rejected, Err(Error::NativeTransferFailed(_))));
        assert_eq!(hub.position(&address).unwrap().collateral_balance, 8 * ONE);
    }

    #[test]
    fn test_deposit_native_wraps() {
        let mut hub = funded_hub();
        let address = open(&mut hub);
        hub.assets_mut().fund_native(&owner(), 5 * ONE).unwrap();

        hub.deposit_native(Call::with_value(owner(), 5 * ONE), address)
            .unwrap();
        assert_eq!(hub.position(&address).unwrap().collateral_balance, 15 * ONE);
        assert_eq!(hub.assets().native_balance(&address), 0);
    }

    #[test]
    fn test_deposit_native_rejected_for_plain_token() {
        let mut hub = funded_hub();
        let wbtc = AssetId::from_symbol("WBTC");
        hub.assets_mut().mint(&wbtc, &owner(), 10 * ONE).unwrap();
        hub.assets_mut().fund_native(&owner(), 5 * ONE).unwrap();
        let mut p = params();
        p.collateral = wbtc;
        let address = hub.open_position(Call::new(owner()), p).unwrap();
        assert_eq!(
            hub.position(&address).unwrap().collateral_kind,
            CollateralKind::Token
        );

        let result = hub.deposit_native(Call::with_value(owner(), 5 * ONE), address);
        assert_eq!(result, Err(Error::NativeOnlyForWrappedAsset));
        assert_eq!(hub.assets().native_balance(&owner()), 5 * ONE);
        assert_eq!(hub.assets().native_balance(&address), 0);
        assert_eq!(hub.position(&address).unwrap().collateral_balance, 10 * ONE);
    }

    #[test]
    fn test_price_increase_arms_cooldown() {
        let mut hub = funded_hub();
        let address = open(&mut hub);
        hub.begin_block(2, 1_000 + 3 * DAY + 1).unwrap();

        hub.adjust_price(Call::new(owner()), address, 2_500 * ONE).unwrap();
        let position = hub.position(&address).unwrap();
        assert_eq!(position.cooldown, 1_000 + 6 * DAY + 1);

        let hot = hub.mint(Call::new(owner()), address, owner(), ONE);
        assert!(matches!(hot, Err(Error::Hot { .. })));
        let hot = hub.withdraw_collateral(Call::new(owner()), address, owner(), ONE);
        assert!(matches!(hot, Err(Error::Hot { .. })));

        // 10 * 20_000 > limit 100_000
        hub.begin_block(3, 1_000 + 7 * DAY).unwrap();
        let too_high = hub.adjust_price(Call::new(owner()), address, 20_000 * ONE);
        assert!(matches!(too_high, Err(Error::PriceTooHigh { .. })));
    }

    #[test]
    fn test_adjust_combines_steps() {
        let mut hub = funded_hub();
        let address = open(&mut hub);
        hub.begin_block(2, 1_000 + 3 * DAY + 1).unwrap();

        hub.adjust(Call::new(owner()), address, 5_000 * ONE, 12 * ONE, 2_000 * ONE)
            .unwrap();
        let position = hub.position(&address).unwrap();
        assert_eq!(position.principal, 5_000 * ONE);
        assert_eq!(position.collateral_balance, 12 * ONE);

        hub.adjust(Call::new(owner()), address, 1_000 * ONE, 8 * ONE, 1_500 * ONE)
            .unwrap();
        let position = hub.position(&address).unwrap();
        assert_eq!(position.principal, 1_000 * ONE);
        assert_eq!(position.collateral_balance, 8 * ONE);
        assert_eq!(position.price, 1_500 * ONE);
    }

    #[test]
    fn test_transfer_ownership() {
        let mut hub = funded_hub();
        let address = open(&mut hub);
        let heir = Address::from_label("heir");

        hub.transfer_ownership(Call::new(owner()), address, heir).unwrap();
        assert_eq!(hub.position(&address).unwrap().owner, heir);
        assert!(hub
            .transfer_ownership(Call::new(owner()), address, owner())
            .is_err());
    }

    #[test]
    fn test_clone_checks() {
        let mut hub = funded_hub();
        let parent = open(&mut hub);
        let cloner = Address::from_label("cloner");
        hub.assets_mut().mint(&weth(), &cloner, 20 * ONE).unwrap();

        let clone_params = |price: Option<u128>, expiration: u64| ClonePositionParams {
            owner: cloner,
            parent,
            initial_collateral: 10 * ONE,
            initial_mint: 1_000 * ONE,
            expiration,
            liquidation_price: price,
        };

        // Parent still initializing
        let hot = hub.clone_position(Call::new(cloner), clone_params(None, 100 * DAY));
        assert!(matches!(hot, Err(Error::Hot { .. })));

        hub.begin_block(2, 1_000 + 3 * DAY + 1).unwrap();
        let expiration = hub.position(&parent).unwrap().expiration;
        let too_late = hub.clone_position(Call::new(cloner), clone_params(None, expiration + 1));
        assert!(matches!(too_late, Err(Error::InvalidExpiration { .. })));

        let too_high =
            hub.clone_position(Call::new(cloner), clone_params(Some(4_001 * ONE), expiration));
        assert!(matches!(too_high, Err(Error::PriceTooHigh { .. })));

        let clone = hub
            .clone_position(Call::new(cloner), clone_params(Some(3_000 * ONE), expiration))
            .unwrap();
        let position = hub.position(&clone).unwrap();
        assert_eq!(position.original, parent);
        assert_eq!(position.principal, 1_000 * ONE);
        assert_eq!(position.price, 3_000 * ONE);
        assert!(position.in_cooldown_after_start(hub.timestamp()));
        assert_eq!(hub.token().balance_of(&cloner), 800 * ONE);
        assert_eq!(hub.position(&parent).unwrap().total_minted, 1_000 * ONE);
    }

    #[test]
    fn test_persist_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let config = HubConfig::with_wrapped_native(weth());
        let address;
        {
            let store = crate::storage::FileStore::new(dir.path()).unwrap();
            let mut hub = MintingHub::new(config.clone(), store).unwrap();
            hub.begin_block(1, 1_000).unwrap();
            hub.token_mut().mint(&owner(), 10_000 * ONE).unwrap();
            hub.assets_mut().mint(&weth(), &owner(), 100 * ONE).unwrap();
            address = hub.open_position(Call::new(owner()), params()).unwrap();
            hub.persist().unwrap();
        }

        let store = crate::storage::FileStore::new(dir.path()).unwrap();
        let hub: MintingHub<_, StableToken> = MintingHub::restore(config, store).unwrap();
        assert_eq!(hub.timestamp(), 1_000);
        assert_eq!(hub.position(&address).unwrap().collateral_balance, 10 * ONE);
        assert_eq!(hub.token().balance_of(&owner()), 9_000 * ONE);
        assert_eq!(hub.assets().balance_of(&weth(), &owner()), 90 * ONE);
    }
}
