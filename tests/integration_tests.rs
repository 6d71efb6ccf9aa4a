//! Integration tests for the minting hub.
//!
//! These tests drive complete position lifecycles through the public API:
//! minting and repayment with interest, challenges in both phases, forced
//! sales of expired positions, rolling, signed submission and persistence.

use mintinghub::prelude::*;
use mintinghub::utils::constants::{DAY, ONE, SECONDS_PER_YEAR};
use mintinghub::utils::crypto::ROLLER_ADDRESS;
use mintinghub::utils::math::gross_for_net;
use proptest::prelude::*;

// ═══════════════════════════════════════════════════════════════════════════════
// TEST HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

const T0: u64 = 1_000;

fn weth() -> AssetId {
    AssetId::from_symbol("WETH")
}

fn alice() -> Address {
    Address::from_label("alice")
}

fn bob() -> Address {
    Address::from_label("bob")
}

fn carol() -> Address {
    Address::from_label("carol")
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

fn hub_with(config: HubConfig) -> MintingHub {
    mintinghub::utils::init_test_tracing();
    let mut hub = MintingHub::in_memory(config).unwrap();
    hub.begin_block(1, T0).unwrap();
    for account in [alice(), bob(), carol()] {
        hub.token_mut().mint(&account, 50_000 * ONE).unwrap();
        hub.assets_mut().mint(&weth(), &account, 100 * ONE).unwrap();
        hub.assets_mut().fund_native(&account, 20 * ONE).unwrap();
    }
    hub
}

fn setup() -> MintingHub {
    hub_with(HubConfig::with_wrapped_native(weth()))
}

fn advance_to<B: StorageBackend>(hub: &mut MintingHub<B>, timestamp: u64) {
    let height = hub.block_height() + 1;
    hub.begin_block(height, timestamp).unwrap();
}

/// Open a position for alice and mint `minted` right after initialization
fn minted_position(hub: &mut MintingHub, p: OpenPositionParams, minted: u128) -> Address {
    let position = hub.open_position(Call::new(alice()), p).unwrap();
    let start = hub.position(&position).unwrap().start;
    advance_to(hub, start + 1);
    if minted > 0 {
        hub.mint(Call::new(alice()), position, alice(), minted)
            .unwrap();
    }
    position
}

// ═══════════════════════════════════════════════════════════════════════════════
// MINTING LIFECYCLE
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_mint_accrue_and_repay() {
    let mut hub = hub_with(HubConfig::with_wrapped_native(weth()).with_lead_rate(20_000));
    let mut p = params();
    p.risk_premium_ppm = 80_000;
    p.duration = 400 * DAY;
    let position = minted_position(&mut hub, p, 1_000 * ONE);
    assert_eq!(hub.position(&position).unwrap().annual_rate_ppm, 100_000);
    assert_eq!(hub.token().balance_of(&alice()), 49_800 * ONE);

    let minted_at = hub.timestamp();
    advance_to(&mut hub, minted_at + SECONDS_PER_YEAR);
    assert_eq!(hub.current_debt(&position).unwrap(), 1_100 * ONE);

    // Interest is paid before principal
    let spent = hub.repay(Call::new(alice()), position, 50 * ONE).unwrap();
    assert_eq!(spent, 50 * ONE);
    let state = hub.position(&position).unwrap();
    assert_eq!((state.principal, state.interest), (1_000 * ONE, 50 * ONE));

    let spent = hub.repay_full(Call::new(alice()), position).unwrap();
    assert_eq!(spent, 850 * ONE);
    let state = hub.position(&position).unwrap();
    assert_eq!((state.principal, state.interest), (0, 0));
    assert_eq!(state.total_minted, 0);

    // Opening fee plus a year of interest
    assert_eq!(hub.token().equity(), 1_100 * ONE);
    assert_eq!(hub.token().minter_reserve(), 0);

    let log = hub.end_block();
    assert_eq!(log.filter_by_type("Repaid").len(), 2);
}

#[test]
fn test_mint_up_to_limit_after_init_period() {
    let mut hub = setup();
    hub.assets_mut().mint(&weth(), &alice(), 10 * ONE).unwrap();
    let p = OpenPositionParams {
        collateral: weth(),
        minimum_collateral: 10 * ONE,
        initial_collateral: 110 * ONE,
        limit: 550_000 * ONE,
        init_period: 3 * DAY,
        duration: 180 * DAY,
        challenge_period: 2 * DAY,
        risk_premium_ppm: 0,
        liquidation_price: 5_000 * ONE,
        reserve_contribution_ppm: 200_000,
    };
    let position = hub.open_position(Call::new(alice()), p).unwrap();

    let state = hub.position(&position).unwrap();
    assert_eq!(state.collateral_balance, 110 * ONE);
    assert_eq!(state.minimum_collateral, 10 * ONE);
    assert_eq!(state.price, 5_000 * ONE);
    assert_eq!(state.limit, 550_000 * ONE);
    assert_eq!(state.start, T0 + 3 * DAY);
    assert_eq!(state.expiration, T0 + 183 * DAY);

    advance_to(&mut hub, T0 + 3 * DAY - 1);
    let early = hub.mint(Call::new(alice()), position, alice(), ONE);
    assert!(matches!(early, Err(Error::Hot { .. })));

    advance_to(&mut hub, T0 + 3 * DAY + 1);
    let over = hub.mint(Call::new(alice()), position, alice(), 550_000 * ONE + 1);
    assert!(matches!(over, Err(Error::LimitExceeded { .. })));

    let usable = hub
        .mint(Call::new(alice()), position, alice(), 550_000 * ONE)
        .unwrap();
    assert_eq!(usable, 440_000 * ONE);
    assert_eq!(hub.available_for_minting(&position).unwrap(), 0);
    assert!(hub.position(&position).unwrap().is_solvent());

    let more = hub.mint(Call::new(alice()), position, alice(), 1);
    assert!(matches!(more, Err(Error::LimitExceeded { .. })));
    assert_eq!(hub.position(&position).unwrap().principal, 550_000 * ONE);
}

#[test]
fn test_clone_family_shares_limit() {
    let mut hub = setup();
    let mut p = params();
    p.limit = 30_000 * ONE;
    let original = minted_position(&mut hub, p, 5_000 * ONE);

    // 30_000 limit - 5_000 minted - 15_000 unused potential of the original
    let clone = hub
        .clone_position(
            Call::new(bob()),
            ClonePositionParams {
                owner: bob(),
                parent: original,
                initial_collateral: 10 * ONE,
                initial_mint: 10_000 * ONE,
                expiration: hub.position(&original).unwrap().expiration,
                liquidation_price: None,
            },
        )
        .unwrap();
    assert_eq!(hub.position(&original).unwrap().total_minted, 15_000 * ONE);
    assert_eq!(hub.available_for_minting(&clone).unwrap(), 0);

    let over = hub.mint(Call::new(bob()), clone, bob(), ONE);
    assert!(matches!(over, Err(Error::LimitExceeded { .. })));

    // Repaying the clone frees headroom for the family
    hub.repay_full(Call::new(bob()), clone).unwrap();
    assert_eq!(hub.position(&original).unwrap().total_minted, 5_000 * ONE);
    assert_eq!(hub.available_for_minting(&clone).unwrap(), 10_000 * ONE);
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHALLENGES
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_challenge_averted() {
    let mut hub = setup();
    let position = hub.open_position(Call::new(alice()), params()).unwrap();

    let too_expensive = hub.challenge(Call::new(bob()), position, 10 * ONE, 2_001 * ONE);
    assert!(matches!(too_expensive, Err(Error::UnexpectedPrice { .. })));
    let too_small = hub.challenge(Call::new(bob()), position, 4 * ONE, 0);
    assert!(matches!(too_small, Err(Error::ChallengeTooSmall { .. })));

    // Challenging during initialization denies a proposal
    let number = hub
        .challenge(Call::new(bob()), position, 10 * ONE, 2_000 * ONE)
        .unwrap();
    assert_eq!(hub.position(&position).unwrap().challenged_amount, 10 * ONE);
    assert_eq!(hub.assets().balance_of(&weth(), &bob()), 90 * ONE);

    let early = hub.bid(Call::new(carol()), number, 4 * ONE, false, false);
    assert_eq!(early, Err(Error::AvertTooEarly(number)));

    advance_to(&mut hub, T0 + 10);
    let outcome = hub
        .bid(Call::new(carol()), number, 4 * ONE, false, false)
        .unwrap();
    assert_eq!(
        outcome,
        BidOutcome::Averted {
            size: 4 * ONE,
            paid: 8_000 * ONE
        }
    );
    assert_eq!(hub.token().balance_of(&bob()), 58_000 * ONE);
    assert_eq!(hub.assets().balance_of(&weth(), &carol()), 104 * ONE);
    assert_eq!(hub.challenges().get(number).unwrap().size, 6 * ONE);
    assert_eq!(hub.position(&position).unwrap().challenged_amount, 6 * ONE);

    // The challenger buying back their own stake pays nothing
    let outcome = hub
        .bid(Call::new(bob()), number, 100 * ONE, false, false)
        .unwrap();
    assert_eq!(
        outcome,
        BidOutcome::Averted {
            size: 6 * ONE,
            paid: 0
        }
    );
    assert!(hub.challenges().is_empty());
    assert_eq!(hub.assets().balance_of(&weth(), &bob()), 96 * ONE);

    let state = hub.position(&position).unwrap();
    assert_eq!(state.challenged_amount, 0);
    assert_eq!(state.collateral_balance, 10 * ONE);
    assert!(!state.closed);
}

#[test]
fn test_challenge_liquidated_with_shortfall() {
    let mut hub = setup();
    let position = minted_position(&mut hub, params(), 10_000 * ONE);
    let t1 = hub.timestamp();

    let number = hub.challenge(Call::new(bob()), position, 10 * ONE, 0).unwrap();
    let blocked = hub.withdraw_collateral(Call::new(alice()), position, alice(), ONE);
    assert_eq!(blocked, Err(Error::Challenged));

    advance_to(&mut hub, t1 + 2 * DAY);
    assert_eq!(hub.price(number).unwrap(), 2_000 * ONE);
    advance_to(&mut hub, t1 + 3 * DAY);
    assert_eq!(hub.price(number).unwrap(), 1_000 * ONE);

    let outcome = hub
        .bid(Call::new(carol()), number, 10 * ONE, false, false)
        .unwrap();
    let BidOutcome::Liquidated(settlement) = outcome else {
        panic!("expected a liquidation");
    };
    assert_eq!(settlement.collateral_sold, 10 * ONE);
    assert_eq!(settlement.offer, 10_000 * ONE);
    assert_eq!(settlement.challenger_reward, 200 * ONE);
    assert_eq!(settlement.repaid_principal, 10_000 * ONE);
    assert_eq!(settlement.covered_loss, 200 * ONE);
    assert_eq!(settlement.owner_surplus, 0);
    assert!(settlement.is_balanced());

    let state = hub.position(&position).unwrap();
    assert!(state.closed);
    assert_eq!(state.principal, 0);
    assert_eq!(state.total_minted, 0);
    assert_eq!(state.challenged_amount, 0);

    assert_eq!(hub.assets().balance_of(&weth(), &bob()), 100 * ONE);
    assert_eq!(hub.token().balance_of(&bob()), 50_200 * ONE);
    assert_eq!(hub.assets().balance_of(&weth(), &carol()), 110 * ONE);
    assert_eq!(hub.token().minter_reserve(), 0);
    assert!(hub.challenges().is_empty());
}

#[test]
fn test_challenge_surplus_and_postponed_stake() {
    let mut hub = setup();
    let position = minted_position(&mut hub, params(), 10_000 * ONE);
    let t1 = hub.timestamp();
    let number = hub.challenge(Call::new(bob()), position, 10 * ONE, 0).unwrap();

    advance_to(&mut hub, t1 + 2 * DAY + 1);
    let price = hub.price(number).unwrap();
    assert!(price < 2_000 * ONE);

    hub.assets_mut().set_frozen(&weth(), &bob(), true);
    let alice_before = hub.token().balance_of(&alice());
    let outcome = hub
        .bid(Call::new(carol()), number, 10 * ONE, false, false)
        .unwrap();
    let BidOutcome::Liquidated(settlement) = outcome else {
        panic!("expected a liquidation");
    };
    assert!(settlement.is_balanced());
    assert_eq!(settlement.covered_loss, 0);
    assert!(settlement.stake_postponed);
    assert_eq!(
        hub.token().balance_of(&alice()) - alice_before,
        settlement.owner_surplus
    );
    assert_eq!(
        settlement.owner_surplus,
        settlement.offer - settlement.challenger_reward - 10_000 * ONE
    );

    // Frozen stake waits in the payout ledger
    assert_eq!(hub.pending_payout(&weth(), &bob()), 10 * ONE);
    let rejected =
        hub.return_postponed_collateral(Call::new(bob()), weth(), bob(), false);
    assert!(matches!(rejected, Err(Error::TransferRejected(_))));
    assert_eq!(hub.pending_payout(&weth(), &bob()), 10 * ONE);

    hub.assets_mut().set_frozen(&weth(), &bob(), false);
    let claimed = hub
        .return_postponed_collateral(Call::new(bob()), weth(), bob(), false)
        .unwrap();
    assert_eq!(claimed, 10 * ONE);
    assert_eq!(hub.pending_payout(&weth(), &bob()), 0);
    assert_eq!(hub.assets().balance_of(&weth(), &bob()), 100 * ONE);
}

#[test]
fn test_partial_liquidation_and_dust_rule() {
    let mut hub = setup();
    let position = minted_position(&mut hub, params(), 10_000 * ONE);
    let t1 = hub.timestamp();

    let number = hub.challenge(Call::new(bob()), position, 10 * ONE, 0).unwrap();
    advance_to(&mut hub, t1 + 3 * DAY);

    let BidOutcome::Liquidated(first) = hub
        .bid(Call::new(carol()), number, 4 * ONE, false, false)
        .unwrap()
    else {
        panic!("expected a liquidation");
    };
    assert_eq!(first.collateral_sold, 4 * ONE);
    assert_eq!(first.repaid_principal, 4_000 * ONE);
    assert!(first.is_balanced());

    let state = hub.position(&position).unwrap();
    assert_eq!(state.collateral_balance, 6 * ONE);
    assert_eq!(state.principal, 6_000 * ONE);
    assert_eq!(state.challenged_amount, 6 * ONE);
    assert!(!state.closed);

    let mut other = setup();
    let position = minted_position(&mut other, params(), 10_000 * ONE);
    let t1 = other.timestamp();
    let number = other.challenge(Call::new(bob()), position, 6 * ONE, 0).unwrap();
    advance_to(&mut other, t1 + 3 * DAY);

    // Selling 6 would leave 4 below the minimum of 5: everything goes
    let BidOutcome::Liquidated(settlement) = other
        .bid(Call::new(carol()), number, 6 * ONE, false, false)
        .unwrap()
    else {
        panic!("expected a liquidation");
    };
    assert_eq!(settlement.collateral_sold, 10 * ONE);
    assert_eq!(settlement.stake_returned, 6 * ONE);
    assert_eq!(settlement.repaid_principal, 10_000 * ONE);
    assert!(other.position(&position).unwrap().closed);
    assert_eq!(other.assets().balance_of(&weth(), &carol()), 110 * ONE);
}

#[test]
fn test_liquidation_delivers_native() {
    let mut hub = setup();
    let position = minted_position(&mut hub, params(), 10_000 * ONE);
    let t1 = hub.timestamp();

    // The challenger stakes native value, wrapped on the way in
    let number = hub
        .challenge(Call::with_value(bob(), 10 * ONE), position, 10 * ONE, 0)
        .unwrap();
    assert_eq!(hub.assets().native_balance(&bob()), 10 * ONE);

    advance_to(&mut hub, t1 + 3 * DAY);
    hub.bid(Call::new(carol()), number, 10 * ONE, false, true)
        .unwrap();
    assert_eq!(hub.assets().native_balance(&carol()), 30 * ONE);
    assert_eq!(hub.assets().balance_of(&weth(), &bob()), 110 * ONE);
}

#[test]
fn test_native_stake_requires_wrapped_collateral() {
    let mut hub = setup();
    let wbtc = AssetId::from_symbol("WBTC");
    hub.assets_mut().mint(&wbtc, &alice(), 10 * ONE).unwrap();
    let mut p = params();
    p.collateral = wbtc;
    let position = minted_position(&mut hub, p, 10_000 * ONE);

    let result = hub.challenge(Call::with_value(bob(), 10 * ONE), position, 10 * ONE, 0);
    assert_eq!(result, Err(Error::NativeOnlyForWrappedAsset));
    assert_eq!(hub.assets().native_balance(&bob()), 20 * ONE);
    assert!(hub.challenges().is_empty());
    assert_eq!(hub.position(&position).unwrap().challenged_amount, 0);
}

#[test]
fn test_postponed_native_claim_to_rejecting_recipient() {
    let mut hub = setup();
    let position = minted_position(&mut hub, params(), 10_000 * ONE);
    let t1 = hub.timestamp();
    let number = hub.challenge(Call::new(bob()), position, 10 * ONE, 0).unwrap();

    advance_to(&mut hub, t1 + 3 * DAY);
    let BidOutcome::Liquidated(settlement) = hub
        .bid(Call::new(carol()), number, 10 * ONE, true, false)
        .unwrap()
    else {
        panic!("expected a liquidation");
    };
    assert!(settlement.stake_postponed);
    assert_eq!(hub.pending_payout(&weth(), &bob()), 10 * ONE);

    let vault = Address::from_label("vault");
    hub.assets_mut().set_native_rejecting(&vault, true);
    let rejected = hub.return_postponed_collateral(Call::new(bob()), weth(), vault, true);
    assert!(matches!(rejected, Err(Error::NativeTransferFailed(_))));
    assert_eq!(hub.pending_payout(&weth(), &bob()), 10 * ONE);
    assert_eq!(hub.assets().native_balance(&vault), 0);

    let claimed = hub
        .return_postponed_collateral(Call::new(bob()), weth(), bob(), true)
        .unwrap();
    assert_eq!(claimed, 10 * ONE);
    assert_eq!(hub.pending_payout(&weth(), &bob()), 0);
    assert_eq!(hub.assets().native_balance(&bob()), 30 * ONE);
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPIRED POSITIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_buy_expired_collateral() {
    let mut hub = setup();
    let mut p = params();
    p.duration = 30 * DAY;
    let position = minted_position(&mut hub, p, 10_000 * ONE);
    let expiration = hub.position(&position).unwrap().expiration;

    advance_to(&mut hub, expiration - 1);
    let alive = hub.buy_expired_collateral(Call::new(carol()), position, ONE, false);
    assert_eq!(alive, Err(Error::Alive { expiration }));

    advance_to(&mut hub, expiration);
    assert_eq!(hub.expired_price(&position).unwrap(), 20_000 * ONE);

    advance_to(&mut hub, expiration + 2 * DAY);
    assert_eq!(hub.expired_price(&position).unwrap(), 2_000 * ONE);

    let dust = hub.buy_expired_collateral(Call::new(carol()), position, 99 * ONE / 10, false);
    assert!(matches!(dust, Err(Error::LeaveNoDust { .. })));

    let bought = hub
        .buy_expired_collateral(Call::new(carol()), position, 4 * ONE, false)
        .unwrap();
    assert_eq!(bought, 4 * ONE);
    let state = hub.position(&position).unwrap();
    assert_eq!(state.principal, 2_000 * ONE);
    assert_eq!(state.collateral_balance, 6 * ONE);

    // Three quarters into the second period the price is a quarter
    advance_to(&mut hub, expiration + 2 * DAY + 36 * 3_600);
    assert_eq!(hub.expired_price(&position).unwrap(), 500 * ONE);

    let alice_before = hub.token().balance_of(&alice());
    let bought = hub
        .buy_expired_collateral(Call::new(carol()), position, 100 * ONE, false)
        .unwrap();
    assert_eq!(bought, 6 * ONE);
    assert_eq!(hub.token().balance_of(&alice()) - alice_before, 1_000 * ONE);

    let state = hub.position(&position).unwrap();
    assert!(state.closed);
    assert_eq!(state.principal, 0);
    assert_eq!(hub.assets().balance_of(&weth(), &carol()), 110 * ONE);
}

#[test]
fn test_expired_shortfall_covered_by_reserve() {
    let mut hub = setup();
    let mut p = params();
    p.duration = 30 * DAY;
    let position = minted_position(&mut hub, p, 10_000 * ONE);
    let expiration = hub.position(&position).unwrap().expiration;

    advance_to(&mut hub, expiration + 2 * DAY + 36 * 3_600);
    let supply_before = hub.token().total_supply();
    hub.buy_expired_collateral(Call::new(carol()), position, 10 * ONE, false)
        .unwrap();

    let state = hub.position(&position).unwrap();
    assert!(state.closed);
    assert_eq!((state.principal, state.interest), (0, 0));
    assert_eq!(state.total_minted, 0);
    assert_eq!(hub.token().minter_reserve(), 0);
    assert!(hub.token().verify_supply_invariant());
    // 10_000 principal retired, 5_000 of it paid by the buyer
    assert!(hub.token().total_supply() < supply_before);
}

#[test]
fn test_expired_sale_never_strands_debt() {
    let mut hub = setup();
    let mut p = params();
    p.duration = 30 * DAY;
    let position = minted_position(&mut hub, p, 10_000 * ONE);
    let expiration = hub.position(&position).unwrap().expiration;

    advance_to(&mut hub, expiration + 2 * DAY + 36 * 3_600);
    assert_eq!(hub.expired_price(&position).unwrap(), 500 * ONE);

    // Six of ten would leave four, below the minimum of five
    let stranded = hub.buy_expired_collateral(Call::new(carol()), position, 6 * ONE, false);
    assert!(matches!(stranded, Err(Error::LeaveNoDust { .. })));
    let state = hub.position(&position).unwrap();
    assert!(!state.closed);
    assert_eq!(state.collateral_balance, 10 * ONE);
    assert_eq!(state.principal, 10_000 * ONE);

    hub.buy_expired_collateral(Call::new(carol()), position, 5 * ONE, false)
        .unwrap();
    let state = hub.position(&position).unwrap();
    assert!(!state.closed);
    assert_eq!(state.collateral_balance, 5 * ONE);
    assert_eq!(state.principal, 7_500 * ONE);

    // The last sale retires the rest of the debt through the reserve
    hub.buy_expired_collateral(Call::new(carol()), position, 5 * ONE, false)
        .unwrap();
    let state = hub.position(&position).unwrap();
    assert!(state.closed);
    assert_eq!(state.collateral_balance, 0);
    assert_eq!((state.principal, state.interest), (0, 0));
    assert_eq!(state.total_minted, 0);
    assert!(hub.token().verify_supply_invariant());

    let empty = hub.buy_expired_collateral(Call::new(carol()), position, ONE, false);
    assert_eq!(empty, Err(Error::Closed));
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROLLING
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_roll_with_interest_into_new_expiration() {
    let mut hub = setup();
    let mut source_params = params();
    source_params.risk_premium_ppm = 100_000;
    source_params.duration = 30 * DAY;
    let source = hub.open_position(Call::new(alice()), source_params).unwrap();
    let target = minted_position(&mut hub, params(), 0);
    hub.mint(Call::new(alice()), source, alice(), 1_000 * ONE)
        .unwrap();

    let later = hub.timestamp() + 10 * DAY;
    advance_to(&mut hub, later);
    let interest = hub.current_debt(&source).unwrap() - 1_000 * ONE;
    assert!(interest > 0);

    let before = hub.token().balance_of(&alice());
    let expiration = hub.position(&target).unwrap().expiration - DAY;
    let rolled = hub
        .roller()
        .roll_fully_with_expiration(Call::new(alice()), source, target, expiration)
        .unwrap();
    assert_ne!(rolled, target);

    let clone = hub.position(&rolled).unwrap();
    assert_eq!(clone.owner, alice());
    assert_eq!(clone.original, target);
    assert_eq!(clone.expiration, expiration);
    assert_eq!(
        clone.principal,
        gross_for_net(800 * ONE + interest, 200_000).unwrap()
    );

    let source_state = hub.position(&source).unwrap();
    assert!(source_state.closed);
    assert_eq!((source_state.principal, source_state.interest), (0, 0));

    let after = hub.token().balance_of(&alice());
    assert!(after >= before && after - before <= 2);
    assert_eq!(hub.token().balance_of(&ROLLER_ADDRESS), 0);
    assert_eq!(hub.end_block().filter_by_type("Rolled").len(), 1);
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIGNED SUBMISSION AND PERSISTENCE
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_signed_lifecycle() {
    let keypair = KeyPair::generate();
    let owner = keypair.address();
    let mut hub = setup();
    hub.token_mut().mint(&owner, 2_000 * ONE).unwrap();
    hub.assets_mut().fund_native(&owner, 10 * ONE).unwrap();

    let open = SignedOperation::sign(HubOperation::OpenPosition(params()), 1, 10 * ONE, &keypair)
        .unwrap();
    let OperationOutcome::Position(position) = hub.submit(open).unwrap() else {
        panic!("expected a position");
    };
    assert_eq!(hub.position(&position).unwrap().collateral_balance, 10 * ONE);

    let start = hub.position(&position).unwrap().start;
    advance_to(&mut hub, start + 1);
    let mint = SignedOperation::sign(
        HubOperation::Mint {
            position,
            target: owner,
            amount: 1_000 * ONE,
        },
        2,
        0,
        &keypair,
    )
    .unwrap();
    assert_eq!(
        hub.submit(mint).unwrap(),
        OperationOutcome::Amount(800 * ONE)
    );
}

#[test]
fn test_persist_and_restore_live_challenge() {
    let dir = tempfile::tempdir().unwrap();
    let config = HubConfig::with_wrapped_native(weth());
    let (position, number);
    {
        let store = FileStore::new(dir.path()).unwrap();
        let mut hub = MintingHub::new(config.clone(), store).unwrap();
        hub.begin_block(1, T0).unwrap();
        hub.token_mut().mint(&alice(), 50_000 * ONE).unwrap();
        for account in [alice(), bob()] {
            hub.assets_mut().mint(&weth(), &account, 100 * ONE).unwrap();
        }
        position = hub.open_position(Call::new(alice()), params()).unwrap();
        number = hub
            .challenge(Call::new(bob()), position, 10 * ONE, 0)
            .unwrap();
        hub.persist().unwrap();
    }

    let store = FileStore::new(dir.path()).unwrap();
    let mut hub: MintingHub<FileStore> = MintingHub::restore(config, store).unwrap();
    assert_eq!(hub.challenges().get(number).unwrap().size, 10 * ONE);
    assert_eq!(hub.position(&position).unwrap().challenged_amount, 10 * ONE);

    advance_to(&mut hub, T0 + 1);
    let next = hub.challenge(Call::new(alice()), position, 10 * ONE, 0);
    assert_eq!(next, Err(Error::Challenged));
    hub.bid(Call::new(bob()), number, 10 * ONE, false, false)
        .unwrap();
    assert!(hub.challenges().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROPERTIES
// ═══════════════════════════════════════════════════════════════════════════════

/// Open, unexpired positions cover their principal; closed ones owe nothing
fn solvency_holds(hub: &MintingHub) -> bool {
    let now = hub.timestamp();
    hub.positions().all(|p| {
        if p.closed {
            p.principal == 0 && p.interest == 0
        } else {
            p.is_expired(now) || p.is_solvent()
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_solvency_across_mixed_operations(
        minted in 1u128..=15_000,
        clone_price in 500u128..=2_000,
        clone_share in 0u128..=100,
        bid in 1u128..=10,
        withdraw in 0u128..=5,
        expired_buy in 1u128..=10,
    ) {
        let mut hub = setup();
        let original = minted_position(&mut hub, params(), minted * ONE);
        let expiration = hub.position(&original).unwrap().expiration;
        prop_assert!(solvency_holds(&hub));

        // Clone at a lower price, minting part of what the new price allows
        let clone = hub
            .clone_position(
                Call::new(bob()),
                ClonePositionParams {
                    owner: bob(),
                    parent: original,
                    initial_collateral: 10 * ONE,
                    initial_mint: clone_price * 10 * clone_share / 100 * ONE,
                    expiration,
                    liquidation_price: Some(clone_price * ONE),
                },
            )
            .unwrap();
        prop_assert!(solvency_holds(&hub));

        let t1 = hub.timestamp();
        let number = hub.challenge(Call::new(carol()), original, 10 * ONE, 0).unwrap();
        advance_to(&mut hub, t1 + 3 * DAY);
        hub.bid(Call::new(bob()), number, bid * ONE, false, false).unwrap();
        prop_assert!(solvency_holds(&hub));

        let _ = hub.withdraw_collateral(Call::new(alice()), original, alice(), withdraw * ONE);
        prop_assert!(solvency_holds(&hub));

        advance_to(&mut hub, expiration + 2 * DAY + 36 * 3_600);
        let _ = hub.buy_expired_collateral(Call::new(carol()), clone, expired_buy * ONE, false);
        let _ = hub.buy_expired_collateral(Call::new(carol()), original, expired_buy * ONE, false);
        prop_assert!(solvency_holds(&hub));
    }

    #[test]
    fn prop_mint_repay_keeps_ledgers_consistent(
        minted in 1u128..=20_000,
        partial in 0u128..=20_000,
    ) {
        let mut hub = setup();
        let position = minted_position(&mut hub, params(), minted * ONE);
        if partial > 0 {
            hub.repay(Call::new(alice()), position, partial * ONE).unwrap();
        }
        hub.repay_full(Call::new(alice()), position).unwrap();

        let state = hub.position(&position).unwrap();
        prop_assert_eq!(state.principal, 0);
        prop_assert_eq!(state.total_minted, 0);
        prop_assert_eq!(hub.token().minter_reserve(), 0);
        prop_assert!(hub.token().verify_supply_invariant());
    }

    #[test]
    fn prop_failed_withdrawal_changes_nothing(
        minted in 1u128..=20_000,
        withdraw in 1u128..=10,
    ) {
        let mut hub = setup();
        let position = minted_position(&mut hub, params(), minted * ONE);
        let before = hub.position(&position).unwrap().clone();
        let token_before = hub.token().clone();
        let assets_before = hub.assets().clone();
        let events_before = hub.events().len();

        if hub
            .withdraw_collateral(Call::new(alice()), position, alice(), withdraw * ONE)
            .is_err()
        {
            prop_assert_eq!(hub.position(&position).unwrap(), &before);
            prop_assert_eq!(hub.token(), &token_before);
            prop_assert_eq!(hub.assets(), &assets_before);
            prop_assert_eq!(hub.events().len(), events_before);
        } else {
            prop_assert!(hub.position(&position).unwrap().check_solvency().is_ok());
        }
    }

    #[test]
    fn prop_phase_two_bids_balance(
        minted in 1u128..=20_000,
        size in 5u128..=10,
        offset in 1u64..(2 * DAY),
    ) {
        let mut hub = setup();
        let position = minted_position(&mut hub, params(), minted * ONE);
        let t1 = hub.timestamp();
        let number = hub.challenge(Call::new(bob()), position, size * ONE, 0).unwrap();

        advance_to(&mut hub, t1 + 2 * DAY + offset);
        let outcome = hub.bid(Call::new(carol()), number, 10 * ONE, false, false).unwrap();
        let BidOutcome::Liquidated(settlement) = outcome else {
            panic!("expected a liquidation");
        };
        prop_assert!(settlement.is_balanced());
        prop_assert!(settlement.owner_surplus == 0 || settlement.covered_loss == 0);
        prop_assert_eq!(settlement.stake_returned, size * ONE);
        prop_assert!(hub.token().verify_supply_invariant());

        let state = hub.position(&position).unwrap();
        prop_assert_eq!(state.challenged_amount, 0);
        prop_assert!(state.check_solvency().is_ok() || state.closed);
    }

    #[test]
    fn prop_family_never_exceeds_limit(
        mints in proptest::collection::vec((any::<bool>(), 1u128..=15_000), 1..8),
    ) {
        let mut hub = setup();
        let mut p = params();
        p.limit = 40_000 * ONE;
        let original = minted_position(&mut hub, p, 0);
        let clone = hub
            .clone_position(
                Call::new(bob()),
                ClonePositionParams {
                    owner: bob(),
                    parent: original,
                    initial_collateral: 20 * ONE,
                    initial_mint: 0,
                    expiration: hub.position(&original).unwrap().expiration,
                    liquidation_price: None,
                },
            )
            .unwrap();

        for (on_clone, amount) in mints {
            let (who, target) = if on_clone { (bob(), clone) } else { (alice(), original) };
            let _ = hub.mint(Call::new(who), target, who, amount * ONE);
            let root = hub.position(&original).unwrap();
            prop_assert!(root.total_minted <= root.limit);
        }
    }
}
