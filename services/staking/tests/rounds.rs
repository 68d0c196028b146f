//! Round lifecycle: lending pooled capital, settlement and overlap

mod common;

use common::{coins, Fixture};
use liquid_staking::{LoanOutcome, LoanPhase, LoanRequest, Op, ParticipationState, LOAN_CODE};
use messaging_actors::TxOutcome;
use types::{Address, Coins, RoundId, Tokens};

fn validator(name: &str) -> Address {
    Address::external(name)
}

fn open_round(validators: &[&str]) -> Op {
    Op::OpenRound {
        loans: validators
            .iter()
            .map(|name| LoanRequest {
                validator: validator(name),
                max_stake: Coins::whole(100),
            })
            .collect(),
    }
}

/// Alice holds 10 tokens, Bob has 10 coins pending, round 0 lends 20
async fn lending_round() -> (Fixture, Address, Address) {
    let fx = Fixture::new().await;
    let alice = fx.staker("alice").await;
    let bob = fx.staker("bob").await;
    fx.deposit_and_stake(alice, 10).await;
    fx.deposit(bob, 10).await;
    fx.send(fx.driver(), open_round(&["validator-1"]), "1").await;
    (fx, alice, bob)
}

#[test_log::test(tokio::test)]
async fn test_open_round_lends_backing_and_staking() {
    let (fx, _, _) = lending_round().await;

    let treasury = fx.protocol.treasury_state().await.unwrap();
    assert_eq!(treasury.next_round, RoundId::new(1));
    assert_eq!(treasury.totals.total_staking, Coins::ZERO);
    assert_eq!(treasury.totals.total_validators_stake, Coins::whole(20));
    assert_eq!(treasury.totals.total_coins, Coins::whole(10));
    assert_eq!(treasury.balance, Coins::whole(10));

    let participation = &treasury.participations[&RoundId::FIRST];
    assert_eq!(participation.state, ParticipationState::Lending);
    assert_eq!(participation.requested, Coins::whole(100));
    assert_eq!(participation.accepted, Coins::whole(20));
    assert_eq!(participation.swept_staking, Coins::whole(10));
    assert_eq!(participation.loans.len(), 1);
    assert_eq!(treasury.swept_staking(), Coins::whole(10));

    let loan = fx
        .protocol
        .loan_state(RoundId::FIRST, validator("validator-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loan.phase, LoanPhase::Active);
    assert_eq!(loan.stake, Coins::whole(20));
    assert_eq!(loan.balance, coins("20.098"));
    assert!(participation.loans.contains_key(&loan.address));

    fx.assert_balanced().await;
}

#[test_log::test(tokio::test)]
async fn test_staking_is_locked_while_round_lends() {
    let (fx, _, bob) = lending_round().await;

    fx.comment(bob, "m", "0.05").await;

    let locked: Vec<_> = fx
        .journal_for("stake_coins")
        .into_iter()
        .filter(|r| r.is_aborted())
        .collect();
    assert_eq!(locked.len(), 1);
    assert_eq!(locked[0].abort_category(), Some("round_locked"));
    assert_eq!(locked[0].src, fx.protocol.wallet_address(bob).unwrap());

    let wallet = fx.protocol.wallet_state(bob).await.unwrap().unwrap();
    assert_eq!(wallet.tokens, Tokens::ZERO);
    assert_eq!(wallet.staking[&RoundId::FIRST].pending, Coins::whole(10));
    assert_eq!(wallet.staking[&RoundId::FIRST].minting, Coins::ZERO);
}

#[test_log::test(tokio::test)]
async fn test_profit_raises_rate_and_pays_governance() {
    let (fx, _, bob) = lending_round().await;
    let loan = fx
        .protocol
        .loan_address(RoundId::FIRST, validator("validator-1"))
        .unwrap();

    fx.send_to(
        fx.elector(),
        loan,
        Op::RoundOutcome {
            outcome: LoanOutcome::Profit(Coins::whole(2)),
        },
        "2.1",
    )
    .await;

    let treasury = fx.protocol.treasury_state().await.unwrap();
    assert!(treasury.participations.is_empty());
    assert_eq!(treasury.totals.total_coins, coins("11.8"));
    assert_eq!(treasury.totals.total_staking, Coins::whole(10));
    assert_eq!(treasury.totals.total_validators_stake, Coins::ZERO);
    assert_eq!(treasury.rounds_imbalance, 128);
    assert!(!fx.protocol.system().contains(&loan));
    assert!(fx
        .protocol
        .loan_state(RoundId::FIRST, validator("validator-1"))
        .await
        .unwrap()
        .is_none());

    let governor = fx.protocol.receipts(fx.governor()).await.unwrap();
    let share = governor.iter().find(|r| r.op == "top_up").unwrap();
    assert_eq!(share.value, coins("0.2"));

    // Bob's coins now mint at the improved rate
    fx.comment(bob, "m", "0.05").await;
    let wallet = fx.protocol.wallet_state(bob).await.unwrap().unwrap();
    assert_eq!(wallet.tokens, Tokens::from_nano(8_474_576_271));
    assert!(wallet.staking.is_empty());

    fx.assert_balanced().await;
}

#[test_log::test(tokio::test)]
async fn test_loss_reduces_backing_and_pays_elector() {
    let (fx, _, _) = lending_round().await;
    let loan = fx
        .protocol
        .loan_address(RoundId::FIRST, validator("validator-1"))
        .unwrap();

    fx.send_to(
        fx.elector(),
        loan,
        Op::RoundOutcome {
            outcome: LoanOutcome::Loss(Coins::whole(1)),
        },
        "0.1",
    )
    .await;

    let treasury = fx.protocol.treasury_state().await.unwrap();
    assert_eq!(treasury.totals.total_coins, Coins::whole(9));
    assert_eq!(treasury.totals.total_staking, Coins::whole(10));
    assert!(treasury.participations.is_empty());

    let elector = fx.protocol.receipts(fx.elector()).await.unwrap();
    let penalty = elector.iter().find(|r| r.op == "top_up").unwrap();
    assert_eq!(penalty.value, Coins::whole(1));
}

#[test_log::test(tokio::test)]
async fn test_close_round_recovers_stake_after_hold() {
    let (fx, _, _) = lending_round().await;

    fx.send(fx.driver(), Op::CloseRound { round: RoundId::FIRST }, "1")
        .await;
    let early = fx.journal_for("close_round");
    assert_eq!(early[0].abort_category(), Some("round_too_early"));
    let treasury = fx.protocol.treasury_state().await.unwrap();
    assert_eq!(
        treasury.participations[&RoundId::FIRST].state,
        ParticipationState::Lending
    );

    fx.protocol.clock().advance(7_200);
    fx.send(fx.driver(), Op::CloseRound { round: RoundId::FIRST }, "1")
        .await;

    let treasury = fx.protocol.treasury_state().await.unwrap();
    assert!(treasury.participations.is_empty());
    assert_eq!(treasury.totals.total_coins, Coins::whole(10));
    assert_eq!(treasury.totals.total_staking, Coins::whole(10));
    assert_eq!(treasury.totals.total_validators_stake, Coins::ZERO);
    assert_eq!(fx.journal_for("recover_stake").len(), 1);
    assert!(fx
        .protocol
        .loan_state(RoundId::FIRST, validator("validator-1"))
        .await
        .unwrap()
        .is_none());

    fx.assert_balanced().await;
}

#[test_log::test(tokio::test)]
async fn test_overlapping_round_gets_imbalance_share() {
    let (fx, _, _) = lending_round().await;
    let carol = fx.staker("carol").await;

    fx.send(fx.driver(), open_round(&["validator-2"]), "1").await;
    let early = fx.journal_for("open_round");
    assert_eq!(early[1].abort_category(), Some("round_too_early"));

    fx.protocol.clock().advance(3_600);
    fx.deposit(carol, 10).await;
    fx.send(fx.driver(), open_round(&["validator-2"]), "1").await;

    let treasury = fx.protocol.treasury_state().await.unwrap();
    assert_eq!(treasury.next_round, RoundId::new(2));
    assert_eq!(treasury.rounds_imbalance, 112);
    let second = &treasury.participations[&RoundId::new(1)];
    assert_eq!(second.accepted, Coins::from_nano(5_019_607_843));
    assert_eq!(second.swept_staking, Coins::from_nano(5_019_607_843));
    assert_eq!(
        treasury.totals.total_staking,
        Coins::from_nano(4_980_392_157)
    );

    // First round finishing while the second lends rebalances towards it
    let first_loan = fx
        .protocol
        .loan_address(RoundId::FIRST, validator("validator-1"))
        .unwrap();
    fx.send_to(
        fx.elector(),
        first_loan,
        Op::RoundOutcome {
            outcome: LoanOutcome::NEUTRAL,
        },
        "0.1",
    )
    .await;

    let treasury = fx.protocol.treasury_state().await.unwrap();
    assert_eq!(treasury.rounds_imbalance, 128);
    assert_eq!(treasury.participations.len(), 1);
    fx.assert_balanced().await;
}

#[test_log::test(tokio::test)]
async fn test_only_driver_opens_rounds() {
    let fx = Fixture::new().await;
    let alice = fx.staker("alice").await;
    fx.deposit_and_stake(alice, 10).await;

    fx.send(alice, open_round(&["validator-1"]), "1").await;

    let attempts = fx.journal_for("open_round");
    assert_eq!(attempts[0].abort_category(), Some("unauthorized"));
    let treasury = fx.protocol.treasury_state().await.unwrap();
    assert!(treasury.participations.is_empty());
    assert_eq!(treasury.next_round, RoundId::FIRST);
}

#[test_log::test(tokio::test)]
async fn test_open_round_without_capital_is_rejected() {
    let fx = Fixture::new().await;

    fx.send(fx.driver(), open_round(&["validator-1"]), "1").await;

    let attempts = fx.journal_for("open_round");
    assert_eq!(attempts[0].abort_category(), Some("nothing_to_lend"));
    fx.assert_balanced().await;
}

#[test_log::test(tokio::test)]
async fn test_driver_stakes_pledges_left_by_completed_round() {
    let fx = Fixture::new().await;
    let alice = fx.staker("alice").await;
    fx.deposit(alice, 10).await;
    fx.send(fx.driver(), open_round(&["validator-1"]), "1").await;

    let pledge = Op::StakePledge {
        owner: alice,
        round: RoundId::FIRST,
    };
    fx.send(fx.driver(), pledge.clone(), "0.05").await;
    let attempts = fx.journal_for("stake_pledge");
    assert_eq!(attempts[0].abort_category(), Some("round_locked"));

    let loan = fx
        .protocol
        .loan_address(RoundId::FIRST, validator("validator-1"))
        .unwrap();
    fx.send_to(
        fx.elector(),
        loan,
        Op::RoundOutcome {
            outcome: LoanOutcome::NEUTRAL,
        },
        "0.1",
    )
    .await;
    let treasury = fx.protocol.treasury_state().await.unwrap();
    assert!(treasury.participations.is_empty());
    assert_eq!(treasury.totals.total_staking, Coins::whole(10));

    // Alice never comes back; the driver mints for her
    fx.send(fx.driver(), pledge, "0.05").await;

    let treasury = fx.protocol.treasury_state().await.unwrap();
    let wallet = fx.protocol.wallet_state(alice).await.unwrap().unwrap();
    assert!(wallet
        .staking
        .keys()
        .all(|round| treasury.participations.contains_key(round)));
    assert!(wallet.staking.is_empty());
    assert_eq!(wallet.tokens, Tokens::whole(10));
    assert_eq!(treasury.totals.total_tokens, Tokens::whole(10));
    assert_eq!(treasury.totals.total_coins, Coins::whole(10));
    assert_eq!(treasury.totals.total_staking, Coins::ZERO);

    let driver = fx.protocol.receipts(fx.driver()).await.unwrap();
    let last = driver.last().unwrap();
    assert_eq!(last.op, "gas_excess");
    assert!(!last.bounced);

    fx.assert_balanced().await;
}

#[test_log::test(tokio::test)]
async fn test_only_driver_stakes_pledges() {
    let fx = Fixture::new().await;
    let alice = fx.staker("alice").await;
    let mallory = fx.staker("mallory").await;
    fx.deposit(alice, 10).await;

    fx.send(
        mallory,
        Op::StakePledge {
            owner: alice,
            round: RoundId::FIRST,
        },
        "0.05",
    )
    .await;

    let attempts = fx.journal_for("stake_pledge");
    assert_eq!(attempts[0].abort_category(), Some("unauthorized"));
    let wallet = fx.protocol.wallet_state(alice).await.unwrap().unwrap();
    assert_eq!(wallet.staking[&RoundId::FIRST].pending, Coins::whole(10));
    assert_eq!(wallet.tokens, Tokens::ZERO);
}

#[test_log::test(tokio::test)]
async fn test_withdraw_waits_for_lent_capital() {
    let (fx, alice, _) = lending_round().await;

    fx.comment(alice, "w", "0.05").await;
    fx.comment(alice, "b", "0.05").await;

    let burns = fx.journal_for("burn_tokens");
    assert_eq!(burns[0].abort_category(), Some("insufficient_liquidity"));
    let wallet = fx.protocol.wallet_state(alice).await.unwrap().unwrap();
    assert_eq!(wallet.unstaking, Tokens::whole(10));
    assert_eq!(wallet.tokens, Tokens::ZERO);
    let treasury = fx.protocol.treasury_state().await.unwrap();
    assert_eq!(treasury.totals.total_tokens, Tokens::whole(10));
    assert_eq!(treasury.totals.total_unstaking, Tokens::whole(10));
    fx.assert_balanced().await;

    let loan = fx
        .protocol
        .loan_address(RoundId::FIRST, validator("validator-1"))
        .unwrap();
    fx.send_to(
        fx.elector(),
        loan,
        Op::RoundOutcome {
            outcome: LoanOutcome::NEUTRAL,
        },
        "0.1",
    )
    .await;
    fx.comment(alice, "b", "0.05").await;

    let receipts = fx.protocol.receipts(alice).await.unwrap();
    let paid = receipts
        .iter()
        .find(|r| r.op == "withdrawal_notification")
        .unwrap();
    assert_eq!(paid.value, Coins::whole(10));
    let wallet = fx.protocol.wallet_state(alice).await.unwrap().unwrap();
    assert_eq!(wallet.unstaking, Tokens::ZERO);
    let treasury = fx.protocol.treasury_state().await.unwrap();
    assert_eq!(treasury.totals.total_tokens, Tokens::ZERO);
    assert_eq!(treasury.totals.total_unstaking, Tokens::ZERO);
    assert_eq!(treasury.totals.total_coins, Coins::ZERO);
    fx.assert_balanced().await;
}

#[test_log::test(tokio::test)]
async fn test_refused_loan_returns_capital_to_pool() {
    let fx = Fixture::new().await;
    let alice = fx.staker("alice").await;
    let bob = fx.staker("bob").await;
    fx.deposit_and_stake(alice, 10).await;
    fx.deposit(bob, 10).await;
    fx.fail_deployments(*LOAN_CODE);

    fx.send(fx.driver(), open_round(&["validator-1"]), "1").await;

    let funding = fx.journal_for("provide_loan");
    assert_eq!(funding[0].outcome, TxOutcome::Undeliverable);
    assert!(funding[1].bounced);
    assert!(funding[1].is_committed());

    let treasury = fx.protocol.treasury_state().await.unwrap();
    assert!(treasury.participations.is_empty());
    assert_eq!(treasury.next_round, RoundId::new(1));
    assert_eq!(treasury.rounds_imbalance, 128);
    assert_eq!(treasury.totals.total_validators_stake, Coins::ZERO);
    assert_eq!(treasury.totals.total_staking, Coins::whole(10));
    assert_eq!(treasury.totals.total_coins, Coins::whole(10));
    assert!(treasury.balance > coins("29.9"));

    fx.assert_balanced().await;
}

#[test_log::test(tokio::test)]
async fn test_pool_without_backing_refuses_to_mint() {
    let (fx, _, bob) = lending_round().await;
    let loan = fx
        .protocol
        .loan_address(RoundId::FIRST, validator("validator-1"))
        .unwrap();

    fx.send_to(
        fx.elector(),
        loan,
        Op::RoundOutcome {
            outcome: LoanOutcome::Loss(Coins::whole(20)),
        },
        "0.1",
    )
    .await;
    let treasury = fx.protocol.treasury_state().await.unwrap();
    assert_eq!(treasury.totals.total_coins, Coins::ZERO);
    assert_eq!(treasury.totals.total_tokens, Tokens::whole(10));

    fx.comment(bob, "m", "0.05").await;

    let stakes = fx.journal_for("stake_coins");
    let refused = stakes.iter().find(|r| r.is_aborted()).unwrap();
    assert_eq!(refused.abort_category(), Some("insolvent"));
    let wallet = fx.protocol.wallet_state(bob).await.unwrap().unwrap();
    assert_eq!(wallet.tokens, Tokens::ZERO);
    assert_eq!(
        wallet.staking[&RoundId::FIRST],
        liquid_staking::StakingEntry {
            pending: Coins::whole(10),
            minting: Coins::ZERO,
        }
    );
    let treasury = fx.protocol.treasury_state().await.unwrap();
    assert_eq!(treasury.totals.total_tokens, Tokens::whole(10));
    fx.assert_balanced().await;
}
