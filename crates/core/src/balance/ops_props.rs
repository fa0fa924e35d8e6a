//! Property-based tests for balance operations and lock ordering.

use proptest::prelude::*;

use super::lock_order::{LockKey, LockTable, lock_order};
use super::ops::{BalanceOp, BalanceSnapshot};

/// Strategy for valid rows (`0 <= locked <= amount`).
fn valid_snapshot() -> impl Strategy<Value = BalanceSnapshot> {
    (0i64..1_000_000_000).prop_flat_map(|amount| {
        (Just(amount), 0..=amount).prop_map(|(amount, locked)| BalanceSnapshot::new(amount, locked))
    })
}

fn op_strategy() -> impl Strategy<Value = BalanceOp> {
    (1i64..1_000_000_000, 0u8..5).prop_map(|(n, kind)| match kind {
        0 => BalanceOp::Reserve(n),
        1 => BalanceOp::Release(n),
        2 => BalanceOp::SettleLocked(n),
        3 => BalanceOp::Credit(n),
        _ => BalanceOp::Debit(n),
    })
}

fn lock_key_strategy() -> impl Strategy<Value = LockKey> {
    (1i64..50, any::<bool>()).prop_map(|(id, linked)| LockKey {
        id,
        table: if linked {
            LockTable::LinkedAccount
        } else {
            LockTable::Balance
        },
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Accepted operations never produce an invalid row.
    #[test]
    fn prop_apply_preserves_row_invariant(
        snapshot in valid_snapshot(),
        ops in prop::collection::vec(op_strategy(), 1..20),
    ) {
        let mut current = snapshot;
        for op in ops {
            if let Ok(next) = current.apply(op) {
                prop_assert!(next.is_valid(), "{:?} + {:?} = {:?}", current, op, next);
                current = next;
            }
        }
    }

    /// Reserve followed by release of the same amount is a no-op.
    #[test]
    fn prop_reserve_release_roundtrip(snapshot in valid_snapshot(), n in 1i64..1_000_000) {
        if let Ok(reserved) = snapshot.apply(BalanceOp::Reserve(n)) {
            prop_assert_eq!(reserved.apply(BalanceOp::Release(n)), Ok(snapshot));
        }
    }

    /// Lock order does not depend on input order.
    #[test]
    fn prop_lock_order_is_canonical(keys in prop::collection::vec(lock_key_strategy(), 0..10)) {
        let mut reversed = keys.clone();
        reversed.reverse();
        let ordered = lock_order(keys);
        prop_assert_eq!(&ordered, &lock_order(reversed));
        prop_assert!(ordered.windows(2).all(|w| w[0] < w[1]));
    }
}
