//! Property-based tests for ledger validation and replay comparison.
//!
//! Random entry sets: balanced constructions always pass, any perturbation
//! of a single amount is rejected before persistence.

use proptest::prelude::*;
use rampart_shared::types::{Currency, LedgerAccountId};
use uuid::Uuid;

use super::error::LedgerError;
use super::posting::{entries_match, normalize};
use super::types::{Direction, LedgerEntryInput};
use super::validation::validate_entries;

/// Strategy to generate a valid positive amount in minor units.
fn positive_amount() -> impl Strategy<Value = i64> {
    1i64..1_000_000_000i64
}

fn currency_strategy() -> impl Strategy<Value = Currency> {
    prop_oneof![
        Just(Currency::Inr),
        Just(Currency::Usd),
        Just(Currency::Eur),
        Just(Currency::Idr),
    ]
}

fn account_strategy() -> impl Strategy<Value = LedgerAccountId> {
    any::<u128>().prop_map(|n| LedgerAccountId::from_uuid(Uuid::from_u128(n)))
}

/// A balanced set: each generated amount becomes one debit and is split
/// into one or two credits in the same currency.
fn balanced_entries() -> impl Strategy<Value = Vec<LedgerEntryInput>> {
    prop::collection::vec(
        (
            positive_amount(),
            currency_strategy(),
            account_strategy(),
            account_strategy(),
            any::<bool>(),
        ),
        1..6,
    )
    .prop_map(|legs| {
        let mut entries = Vec::new();
        for (amount, currency, from, to, split) in legs {
            entries.push(LedgerEntryInput::debit(from, amount, currency));
            if split && amount > 1 {
                let first = amount / 2;
                entries.push(LedgerEntryInput::credit(to, first, currency));
                entries.push(LedgerEntryInput::credit(to, amount - first, currency));
            } else {
                entries.push(LedgerEntryInput::credit(to, amount, currency));
            }
        }
        entries
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Any balanced construction passes validation.
    #[test]
    fn prop_balanced_entries_accepted(entries in balanced_entries()) {
        prop_assert!(validate_entries(&entries).is_ok());
    }

    /// Bumping one amount makes its currency unbalanced.
    #[test]
    fn prop_perturbed_amount_rejected(
        mut entries in balanced_entries(),
        index in any::<prop::sample::Index>(),
        bump in 1i64..1_000,
    ) {
        let i = index.index(entries.len());
        entries[i].amount += bump;

        let result = validate_entries(&entries);
        prop_assert!(
            matches!(result, Err(LedgerError::UnbalancedLedgerTransaction { .. })),
            "perturbed posting should be rejected, got: {:?}",
            result
        );
    }

    /// A non-positive amount anywhere is rejected.
    #[test]
    fn prop_non_positive_amount_rejected(
        mut entries in balanced_entries(),
        index in any::<prop::sample::Index>(),
        bad in -1_000i64..=0,
    ) {
        let i = index.index(entries.len());
        entries[i].amount = bad;

        prop_assert_eq!(validate_entries(&entries), Err(LedgerError::NonPositiveAmount(bad)));
    }

    /// All-debit sets never pass.
    #[test]
    fn prop_single_sided_rejected(
        amounts in prop::collection::vec(positive_amount(), 2..5),
        account in account_strategy(),
    ) {
        let entries: Vec<_> = amounts
            .into_iter()
            .map(|amount| LedgerEntryInput::debit(account, amount, Currency::Inr))
            .collect();
        prop_assert!(validate_entries(&entries).is_err());
    }

    /// Normalisation is order independent.
    #[test]
    fn prop_normalize_is_permutation_invariant(entries in balanced_entries()) {
        let mut reversed = entries.clone();
        reversed.reverse();
        prop_assert_eq!(normalize(&entries), normalize(&reversed));
        prop_assert!(entries_match(&entries, &reversed));
    }

    /// Flipping a direction is detected as a different posting.
    #[test]
    fn prop_direction_flip_detected(
        entries in balanced_entries(),
        index in any::<prop::sample::Index>(),
    ) {
        let mut flipped = entries.clone();
        let i = index.index(flipped.len());
        flipped[i].direction = match flipped[i].direction {
            Direction::Debit => Direction::Credit,
            Direction::Credit => Direction::Debit,
        };
        prop_assert!(!entries_match(&entries, &flipped));
    }
}
