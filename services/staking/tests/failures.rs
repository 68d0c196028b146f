//! Rejected operations undo their partial effects and return the value

mod common;

use async_trait::async_trait;
use common::{coins, FactoryResult, Fixture};
use liquid_staking::{
    LoanOutcome, LoanRequest, Op, StakingEntry, Wallet, WalletInit, WalletRequest, WALLET_CODE,
};
use messaging_actors::{ActorBehavior, ActorError, Envelope, TransportError, TxContext, TxOutcome};
use proptest::prelude::*;
use staking_config::StakingConfig;
use std::sync::Arc;
use types::{Address, Coins, RoundId, Tokens};

/// Wallet that turns every mint away, so the Treasury has to reverse it
#[derive(Debug, Clone)]
struct MintRefusingWallet(Wallet);

#[async_trait]
impl ActorBehavior<Op> for MintRefusingWallet {
    async fn handle(
        &mut self,
        ctx: &mut TxContext<Op>,
        envelope: &Envelope<Op>,
    ) -> Result<(), ActorError> {
        if !envelope.bounced && matches!(envelope.body, Op::MintTokens { .. }) {
            return Err(ActorError::rejected("mint_refused", "wallet refuses mints"));
        }
        self.0.handle(ctx, envelope).await
    }
}

#[test_log::test(tokio::test)]
async fn test_deposit_without_coins_above_fee_bounces() {
    let fx = Fixture::new().await;
    let alice = fx.staker("alice").await;

    fx.comment(alice, "d", "0.05").await;

    let treasury = fx.protocol.treasury_state().await.unwrap();
    assert_eq!(treasury.totals.total_staking, Coins::ZERO);
    assert_eq!(treasury.balance, Coins::whole(10));
    assert!(fx.protocol.wallet_state(alice).await.unwrap().is_none());

    let receipts = fx.protocol.receipts(alice).await.unwrap();
    assert_eq!(receipts.len(), 1);
    assert!(receipts[0].bounced);
    assert!(receipts[0].value < coins("0.05"));

    let attempts = fx.journal_for("comment");
    assert_eq!(attempts[0].abort_category(), Some("insufficient_value"));
    fx.assert_balanced().await;
}

#[test_log::test(tokio::test)]
async fn test_unknown_comment_is_rejected() {
    let fx = Fixture::new().await;
    let alice = fx.staker("alice").await;

    fx.comment(alice, "stake please", "1").await;

    let attempts = fx.journal_for("comment");
    assert_eq!(attempts[0].abort_category(), Some("unknown_comment"));
    let receipts = fx.protocol.receipts(alice).await.unwrap();
    assert!(receipts[0].bounced);
}

#[test_log::test(tokio::test)]
async fn test_request_without_wallet_refunds_staker() {
    let fx = Fixture::new().await;
    let alice = fx.staker("alice").await;

    fx.comment(alice, "m", "0.05").await;

    let requests = fx.journal_for("wallet_request");
    assert_eq!(requests[0].outcome, TxOutcome::Undeliverable);
    assert!(requests[1].bounced);
    assert!(requests[1].is_committed());

    let receipts = fx.protocol.receipts(alice).await.unwrap();
    assert_eq!(receipts.last().unwrap().op, "gas_excess");
    assert!(fx.protocol.wallet_state(alice).await.unwrap().is_none());
    fx.assert_balanced().await;
}

#[test_log::test(tokio::test)]
async fn test_withdraw_with_nothing_unstaking_refunds() {
    let fx = Fixture::new().await;
    let alice = fx.staker("alice").await;
    fx.deposit_and_stake(alice, 10).await;

    fx.comment(alice, "b", "0.05").await;

    assert!(fx.journal_for("burn_tokens").is_empty());
    let wallet = fx.protocol.wallet_state(alice).await.unwrap().unwrap();
    assert_eq!(wallet.tokens, Tokens::whole(10));
    let treasury = fx.protocol.treasury_state().await.unwrap();
    assert_eq!(treasury.totals.total_coins, Coins::whole(10));
}

#[test_log::test(tokio::test)]
async fn test_unstake_more_than_held_changes_nothing() {
    let fx = Fixture::new().await;
    let alice = fx.staker("alice").await;
    fx.deposit_and_stake(alice, 10).await;

    fx.send(
        alice,
        Op::UnstakeTokens {
            tokens: Tokens::whole(11),
        },
        "0.05",
    )
    .await;

    let aborted = fx.protocol.system().journal().aborted();
    assert_eq!(
        aborted.last().unwrap().abort_category(),
        Some("insufficient_tokens")
    );
    let wallet = fx.protocol.wallet_state(alice).await.unwrap().unwrap();
    assert_eq!(wallet.tokens, Tokens::whole(10));
    assert_eq!(wallet.unstaking, Tokens::ZERO);
    let treasury = fx.protocol.treasury_state().await.unwrap();
    assert_eq!(treasury.totals.total_unstaking, Tokens::ZERO);
    fx.assert_balanced().await;
}

#[test_log::test(tokio::test)]
async fn test_fee_below_schedule_is_rejected() {
    let fx = Fixture::new().await;
    let alice = fx.staker("alice").await;
    fx.deposit_and_stake(alice, 10).await;

    fx.comment(alice, "w", "0.01").await;

    let wallet = fx.protocol.wallet_state(alice).await.unwrap().unwrap();
    assert_eq!(wallet.unstaking, Tokens::ZERO);
    let aborted = fx.protocol.system().journal().aborted();
    assert_eq!(
        aborted.last().unwrap().abort_category(),
        Some("insufficient_value")
    );
}

#[test_log::test(tokio::test)]
async fn test_wallet_only_accepts_its_treasury() {
    let fx = Fixture::new().await;
    let alice = fx.staker("alice").await;
    fx.deposit_and_stake(alice, 10).await;
    let wallet = fx.protocol.wallet_address(alice).unwrap();

    fx.send_to(
        alice,
        wallet,
        Op::MintTokens {
            round: RoundId::FIRST,
            coins: Coins::whole(100),
            tokens: Tokens::whole(100),
            refund_to: alice,
        },
        "1",
    )
    .await;
    fx.send_to(
        alice,
        wallet,
        Op::WalletRequest {
            owner: alice,
            request: WalletRequest::StakeFirstCoins,
        },
        "1",
    )
    .await;

    let state = fx.protocol.wallet_state(alice).await.unwrap().unwrap();
    assert_eq!(state.tokens, Tokens::whole(10));
    let rejected: Vec<_> = fx
        .protocol
        .system()
        .journal()
        .aborted()
        .into_iter()
        .filter(|r| r.dest == wallet)
        .collect();
    assert_eq!(rejected.len(), 2);
    assert!(rejected
        .iter()
        .all(|r| r.abort_category() == Some("unauthorized")));
}

#[test_log::test(tokio::test)]
async fn test_forged_wallet_messages_reach_no_tokens() {
    let fx = Fixture::new().await;
    let alice = fx.staker("alice").await;
    let mallory = fx.staker("mallory").await;
    fx.deposit_and_stake(alice, 10).await;

    fx.send(
        mallory,
        Op::BurnTokens {
            owner: alice,
            tokens: Tokens::whole(10),
        },
        "1",
    )
    .await;

    let treasury = fx.protocol.treasury_state().await.unwrap();
    assert_eq!(treasury.totals.total_tokens, Tokens::whole(10));
    let attempts = fx.journal_for("burn_tokens");
    assert_eq!(attempts[0].abort_category(), Some("unauthorized"));
}

#[test_log::test(tokio::test)]
async fn test_deposit_returned_when_wallet_cannot_deploy() {
    let fx = Fixture::new().await;
    let alice = fx.staker("alice").await;
    fx.fail_deployments(*WALLET_CODE);

    fx.deposit(alice, 10).await;

    let saves = fx.journal_for("save_coins");
    assert_eq!(saves[0].outcome, TxOutcome::Undeliverable);
    assert!(saves[1].bounced);
    assert!(saves[1].is_committed());
    assert!(fx.protocol.wallet_state(alice).await.unwrap().is_none());

    let treasury = fx.protocol.treasury_state().await.unwrap();
    assert_eq!(treasury.totals.total_staking, Coins::ZERO);
    assert!(treasury.balance >= Coins::whole(10));
    assert!(treasury.balance < coins("10.01"));

    let receipts = fx.protocol.receipts(alice).await.unwrap();
    let returned = receipts.iter().find(|r| r.op == "deposit_returned").unwrap();
    assert_eq!(returned.value, Coins::whole(10));
    assert_eq!(receipts.last().unwrap().op, "gas_excess");
    fx.assert_balanced().await;
}

#[test_log::test(tokio::test)]
async fn test_refused_mint_returns_coins_to_pending() {
    let fx = Fixture::new().await;
    let alice = fx.staker("alice").await;
    let storage = fx.protocol.fees().wallet_storage;
    fx.protocol.system().register_code(
        *WALLET_CODE,
        Arc::new(move |data: &[u8]| -> FactoryResult {
            let init: WalletInit = bincode::deserialize(data).map_err(TransportError::from)?;
            Ok(Box::new(MintRefusingWallet(Wallet::new(init, storage))))
        }),
    );
    fx.deposit(alice, 10).await;

    fx.comment(alice, "m", "0.05").await;

    let mints = fx.journal_for("mint_tokens");
    assert_eq!(mints[0].abort_category(), Some("mint_refused"));
    assert!(mints[1].bounced);
    assert!(mints[1].is_committed());
    let reverted = fx.journal_for("mint_reverted");
    assert_eq!(reverted.len(), 1);
    assert!(reverted[0].is_committed());

    let treasury = fx.protocol.treasury_state().await.unwrap();
    assert_eq!(treasury.totals.total_tokens, Tokens::ZERO);
    assert_eq!(treasury.totals.total_coins, Coins::ZERO);
    assert_eq!(treasury.totals.total_staking, Coins::whole(10));

    let wallet = fx.protocol.wallet_address(alice).unwrap();
    let (staking, tokens) = fx
        .protocol
        .system()
        .inspect(wallet, |w: &MintRefusingWallet, _| {
            (w.0.staking().clone(), w.0.tokens())
        })
        .await
        .unwrap();
    assert_eq!(tokens, Tokens::ZERO);
    assert_eq!(
        staking[&RoundId::FIRST],
        StakingEntry {
            pending: Coins::whole(10),
            minting: Coins::ZERO,
        }
    );

    let receipts = fx.protocol.receipts(alice).await.unwrap();
    assert_eq!(receipts.last().unwrap().op, "gas_excess");
    fx.assert_balanced().await;
}

#[test_log::test(tokio::test)]
async fn test_lowest_valid_fees_never_strand_minting() {
    let mut config = StakingConfig::default();
    config.fees.stake_coins_fee = coins("0.01");
    config.fees.stake_first_coins_fee = coins("0.015");
    config.validate().unwrap();
    let fx = Fixture::with_config(config).await;
    let alice = fx.staker("alice").await;
    fx.deposit(alice, 10).await;

    // Whatever the Treasury accepts at this fee, nothing is left in flight
    fx.comment(alice, "m", "0.015").await;
    let wallet = fx.protocol.wallet_state(alice).await.unwrap().unwrap();
    let treasury = fx.protocol.treasury_state().await.unwrap();
    assert!(wallet.staking.values().all(|entry| entry.minting.is_zero()));
    assert_eq!(wallet.tokens, treasury.totals.total_tokens);
    assert_eq!(wallet.staking_total(), treasury.totals.total_staking);

    fx.comment(alice, "m", "0.05").await;
    let wallet = fx.protocol.wallet_state(alice).await.unwrap().unwrap();
    assert!(wallet.staking.is_empty());
    assert_eq!(wallet.tokens, Tokens::whole(10));
    let treasury = fx.protocol.treasury_state().await.unwrap();
    assert_eq!(treasury.totals.total_tokens, Tokens::whole(10));
    fx.assert_balanced().await;
}

#[test_log::test(tokio::test)]
async fn test_stake_below_chain_cost_is_refused_up_front() {
    let fx = Fixture::new().await;
    let alice = fx.staker("alice").await;
    fx.deposit(alice, 10).await;

    fx.comment(alice, "m", "0.004").await;

    let attempts = fx.journal_for("comment");
    let refused = attempts.iter().find(|r| r.is_aborted()).unwrap();
    assert_eq!(refused.abort_category(), Some("insufficient_value"));
    let wallet = fx.protocol.wallet_state(alice).await.unwrap().unwrap();
    assert_eq!(
        wallet.staking[&RoundId::FIRST],
        StakingEntry {
            pending: Coins::whole(10),
            minting: Coins::ZERO,
        }
    );
    assert_eq!(fx.journal_for("stake_coins").len(), 0);
}

#[derive(Debug, Clone)]
enum Action {
    Deposit(u8, u64),
    Stake(u8),
    UnstakeAll(u8),
    Withdraw(u8),
    OpenRound,
    Settle { profit: bool, amount: u64 },
    Advance,
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0u8..3, 1u64..50).prop_map(|(s, amount)| Action::Deposit(s, amount)),
        (0u8..3).prop_map(Action::Stake),
        (0u8..3).prop_map(Action::UnstakeAll),
        (0u8..3).prop_map(Action::Withdraw),
        Just(Action::OpenRound),
        (any::<bool>(), 0u64..5).prop_map(|(profit, amount)| Action::Settle { profit, amount }),
        Just(Action::Advance),
    ]
}

/// Report an outcome for the first outstanding loan of the oldest round.
/// A loss is capped by the backing and the loan's stake. Returns whether a
/// loss was reported.
async fn settle_first_loan(fx: &Fixture, profit: bool, amount: u64) -> bool {
    let treasury = fx.protocol.treasury_state().await.unwrap();
    let Some((loan, entry)) = treasury
        .participations
        .values()
        .find_map(|p| p.loans.iter().next().map(|(a, e)| (*a, *e)))
    else {
        return false;
    };
    let (outcome, value) = if profit {
        let profit = Coins::whole(amount);
        (LoanOutcome::Profit(profit), profit.checked_add(coins("0.1")).unwrap())
    } else {
        let loss = Coins::whole(amount)
            .min(treasury.totals.total_coins)
            .min(entry.stake);
        (LoanOutcome::Loss(loss), coins("0.1"))
    };
    fx.protocol
        .send_to(fx.elector(), loan, Op::RoundOutcome { outcome }, value)
        .await
        .unwrap();
    fx.protocol.settle().await.unwrap();
    !profit
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_value_is_conserved_and_tokens_are_backed(actions in prop::collection::vec(action(), 1..16)) {
        tokio_test::block_on(async {
            let fx = Fixture::new().await;
            let mut stakers = Vec::new();
            for name in ["alice", "bob", "carol"] {
                stakers.push(fx.staker(name).await);
            }
            let open = Op::OpenRound {
                loans: vec![LoanRequest {
                    validator: Address::external("validator-1"),
                    max_stake: Coins::whole(50),
                }],
            };

            let mut any_loss = false;
            let mut last = fx.protocol.treasury_state().await.unwrap().totals;
            for action in &actions {
                let mut loss = false;
                match *action {
                    Action::Deposit(s, amount) => fx.deposit(stakers[s as usize], amount).await,
                    Action::Stake(s) => fx.comment(stakers[s as usize], "m", "0.05").await,
                    Action::UnstakeAll(s) => fx.comment(stakers[s as usize], "w", "0.05").await,
                    Action::Withdraw(s) => fx.comment(stakers[s as usize], "b", "0.05").await,
                    Action::OpenRound => fx.send(fx.driver(), open.clone(), "1").await,
                    Action::Settle { profit, amount } => {
                        loss = settle_first_loan(&fx, profit, amount).await;
                    }
                    Action::Advance => {
                        fx.protocol.clock().advance(3_600);
                    }
                }
                any_loss |= loss;

                // Minting and burning round in the pool's favour
                let totals = fx.protocol.treasury_state().await.unwrap().totals;
                if !loss && !last.total_tokens.is_zero() {
                    assert!(
                        totals.total_coins.nano() * last.total_tokens.nano()
                            >= last.total_coins.nano() * totals.total_tokens.nano(),
                        "rate fell after {:?}: {:?} -> {:?}",
                        action,
                        last,
                        totals
                    );
                }
                last = totals;
            }

            let treasury = fx.protocol.treasury_state().await.unwrap();
            let wallets = fx.protocol.wallet_states(&stakers).await.unwrap();
            let held: Tokens = wallets
                .iter()
                .flatten()
                .map(|w| w.tokens.saturating_add(w.unstaking))
                .sum();
            let pending: Coins = wallets.iter().flatten().map(|w| w.staking_total()).sum();
            let totals = treasury.totals;

            assert_eq!(held, totals.total_tokens);
            assert_eq!(pending, totals.total_staking.saturating_add(treasury.swept_staking()));
            assert!(wallets
                .iter()
                .flatten()
                .all(|w| w.staking.values().all(|entry| entry.minting.is_zero())));
            let owed = totals
                .total_coins
                .saturating_add(totals.total_staking)
                .saturating_add(treasury.swept_staking());
            assert!(treasury.balance.saturating_add(totals.total_validators_stake) >= owed);
            if !any_loss {
                assert!(totals.total_coins.nano() >= totals.total_tokens.nano());
            }
            fx.assert_balanced().await;
        });
    }
}
