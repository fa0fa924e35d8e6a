//! Property-based tests for the claim state machine.
//!
//! Every ordering of two webhooks for one token is replayed against an
//! in-memory row that applies the same conditional update the database
//! does. Exactly one terminal state results and funds are never applied
//! twice or left locked without a `BANK_TIMEOUT`.

use proptest::prelude::*;
use rampart_shared::types::UserId;
use uuid::Uuid;

use super::claim::{ClaimFrom, ClaimRejection, TransactionSnapshot, evaluate};
use super::types::{BANK_TIMEOUT, RampKind, TxnStatus, WebhookStatus, is_bank_timeout};
use super::webhook::WebhookPayload;
use crate::balance::BalanceSnapshot;

const AMOUNT: i64 = 50_000;

fn user() -> UserId {
    UserId::from_uuid(Uuid::from_u128(42))
}

fn arb_kind() -> impl Strategy<Value = RampKind> {
    prop_oneof![Just(RampKind::Onramp), Just(RampKind::Offramp)]
}

/// `None` means success, otherwise a failure with that reason.
fn arb_delivery() -> impl Strategy<Value = Option<&'static str>> {
    prop_oneof![
        Just(None),
        Just(Some(BANK_TIMEOUT)),
        Just(Some("USER_DECLINED")),
        Just(Some("INSUFFICIENT_BANK_FUNDS")),
    ]
}

fn webhook(kind: RampKind, delivery: Option<&'static str>) -> WebhookPayload {
    WebhookPayload {
        kind,
        token: "tok".to_string(),
        user_identifier: user(),
        amount: AMOUNT,
        status: if delivery.is_some() {
            WebhookStatus::Failure
        } else {
            WebhookStatus::Success
        },
        failure_reason_code: delivery.map(str::to_string),
        failure_reason_message: None,
        linked_bank_account_id: None,
    }
}

/// In-memory transaction plus balances after initiation.
struct World {
    txn: TransactionSnapshot,
    balance: BalanceSnapshot,
    linked: BalanceSnapshot,
    ledger_postings: usize,
}

impl World {
    fn new(kind: RampKind) -> Self {
        let (balance, linked) = match kind {
            RampKind::Onramp => (BalanceSnapshot::new(0, 0), BalanceSnapshot::new(AMOUNT, AMOUNT)),
            RampKind::Offramp => (BalanceSnapshot::new(AMOUNT, AMOUNT), BalanceSnapshot::new(0, 0)),
        };
        Self {
            txn: TransactionSnapshot {
                token: "tok".to_string(),
                kind,
                user_id: user(),
                amount: AMOUNT,
                status: TxnStatus::Processing,
                failure_reason_code: None,
                linked_bank_account_id: Some(1),
            },
            balance,
            linked,
            ledger_postings: 0,
        }
    }

    /// Evaluate against a snapshot taken at `seen`, then run the conditional
    /// update against the current row.
    fn deliver(
        &mut self,
        seen: &TransactionSnapshot,
        payload: &WebhookPayload,
    ) -> Result<(), ClaimRejection> {
        let plan = evaluate(Some(seen), payload)?;

        let matches = match plan.from {
            ClaimFrom::Processing => self.txn.status == TxnStatus::Processing,
            ClaimFrom::ProcessingOrTimedOut => {
                self.txn.status == TxnStatus::Processing
                    || (self.txn.status == TxnStatus::Failure
                        && is_bank_timeout(self.txn.failure_reason_code.as_deref()))
            }
        };
        if !matches {
            return Err(ClaimRejection::AlreadyProcessed);
        }

        self.txn.status = plan.to;
        self.txn.failure_reason_code = plan.failure_reason_code.clone();
        if let Some(op) = plan.effects.balance {
            self.balance = self.balance.apply(op).expect("balance op must be valid");
        }
        if let Some(op) = plan.effects.linked_account {
            self.linked = self.linked.apply(op).expect("linked op must be valid");
        }
        if plan.effects.ledger.is_some() {
            self.ledger_postings += 1;
        }
        Ok(())
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// N identical deliveries racing from the same snapshot: one winner.
    #[test]
    fn prop_duplicate_deliveries_apply_once(
        kind in arb_kind(),
        delivery in arb_delivery(),
        copies in 2usize..8,
    ) {
        let mut world = World::new(kind);
        let seen = world.txn.clone();
        let payload = webhook(kind, delivery);

        let wins = (0..copies)
            .filter(|_| world.deliver(&seen, &payload).is_ok())
            .count();

        prop_assert_eq!(wins, 1);
        prop_assert!(world.ledger_postings <= 1);
        prop_assert!(world.balance.is_valid() && world.linked.is_valid());
    }

    /// Two different deliveries in either order, with the second either
    /// racing (stale snapshot) or arriving after the first committed.
    #[test]
    fn prop_out_of_order_deliveries_reach_one_terminal_state(
        kind in arb_kind(),
        first in arb_delivery(),
        second in arb_delivery(),
        racing in any::<bool>(),
    ) {
        let mut world = World::new(kind);
        let initial = world.txn.clone();

        let first_result = world.deliver(&initial, &webhook(kind, first));
        prop_assert!(first_result.is_ok());

        let seen = if racing { initial } else { world.txn.clone() };
        let second_result = world.deliver(&seen, &webhook(kind, second));

        let override_allowed = first == Some(BANK_TIMEOUT) && second.is_none();
        if override_allowed {
            prop_assert!(second_result.is_ok());
            prop_assert_eq!(world.txn.status, TxnStatus::Success);
        } else {
            prop_assert_eq!(second_result, Err(ClaimRejection::AlreadyProcessed));
        }

        prop_assert!(world.ledger_postings <= 1);
        let locked_total = world.balance.locked + world.linked.locked;
        match (world.txn.status, world.txn.failure_reason_code.as_deref()) {
            (TxnStatus::Failure, Some(BANK_TIMEOUT)) => prop_assert_eq!(locked_total, AMOUNT),
            _ => prop_assert_eq!(locked_total, 0),
        }
        if world.txn.status == TxnStatus::Success {
            prop_assert_eq!(world.ledger_postings, 1);
        }
    }

    /// A settled on-ramp credits exactly the amount; a failed one credits nothing.
    #[test]
    fn prop_onramp_credit_matches_outcome(delivery in arb_delivery()) {
        let mut world = World::new(RampKind::Onramp);
        let seen = world.txn.clone();
        world.deliver(&seen, &webhook(RampKind::Onramp, delivery)).unwrap();

        let expected = if delivery.is_none() { AMOUNT } else { 0 };
        prop_assert_eq!(world.balance.amount, expected);
    }
}
