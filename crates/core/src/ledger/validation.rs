//! Business rule validation for ledger postings.

use std::collections::BTreeMap;

use rampart_shared::types::Currency;

use super::error::LedgerError;
use super::types::{Direction, LedgerEntryInput};

/// Validates that a set of ledger entries may be posted.
///
/// Rules, checked in order:
/// 1. at least 2 entries
/// 2. every amount strictly positive
/// 3. per currency, total debits equal total credits
///
/// Totals are accumulated in `i128` so no combination of `i64` amounts
/// can overflow.
///
/// # Errors
///
/// Returns the first rule violated.
pub fn validate_entries(entries: &[LedgerEntryInput]) -> Result<(), LedgerError> {
    if entries.len() < 2 {
        return Err(LedgerError::InsufficientEntries);
    }

    let mut totals: BTreeMap<Currency, (i128, i128)> = BTreeMap::new();

    for entry in entries {
        if entry.amount <= 0 {
            return Err(LedgerError::NonPositiveAmount(entry.amount));
        }

        let slot = totals.entry(entry.currency).or_insert((0, 0));
        match entry.direction {
            Direction::Debit => slot.0 += i128::from(entry.amount),
            Direction::Credit => slot.1 += i128::from(entry.amount),
        }
    }

    for (currency, (debit, credit)) in totals {
        if debit != credit {
            return Err(LedgerError::UnbalancedLedgerTransaction {
                currency,
                debit,
                credit,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rampart_shared::types::LedgerAccountId;

    fn debit(amount: i64, currency: Currency) -> LedgerEntryInput {
        LedgerEntryInput::debit(LedgerAccountId::new(), amount, currency)
    }

    fn credit(amount: i64, currency: Currency) -> LedgerEntryInput {
        LedgerEntryInput::credit(LedgerAccountId::new(), amount, currency)
    }

    #[test]
    fn test_balanced_entries() {
        let entries = vec![debit(50_000, Currency::Inr), credit(50_000, Currency::Inr)];
        assert!(validate_entries(&entries).is_ok());
    }

    #[test]
    fn test_unbalanced_entries() {
        let entries = vec![debit(10_000, Currency::Inr), credit(5_000, Currency::Inr)];
        assert_eq!(
            validate_entries(&entries),
            Err(LedgerError::UnbalancedLedgerTransaction {
                currency: Currency::Inr,
                debit: 10_000,
                credit: 5_000,
            })
        );
    }

    #[test]
    fn test_each_currency_must_balance_independently() {
        // Totals match overall but not per currency.
        let entries = vec![
            debit(100, Currency::Inr),
            credit(100, Currency::Usd),
            debit(100, Currency::Usd),
            credit(100, Currency::Inr),
        ];
        assert!(validate_entries(&entries).is_ok());

        let entries = vec![debit(100, Currency::Inr), credit(100, Currency::Usd)];
        assert!(matches!(
            validate_entries(&entries),
            Err(LedgerError::UnbalancedLedgerTransaction { .. })
        ));
    }

    #[test]
    fn test_too_few_entries() {
        assert_eq!(validate_entries(&[]), Err(LedgerError::InsufficientEntries));
        assert_eq!(
            validate_entries(&[debit(1, Currency::Inr)]),
            Err(LedgerError::InsufficientEntries)
        );
    }

    #[test]
    fn test_zero_amount_rejected() {
        let entries = vec![debit(0, Currency::Inr), credit(0, Currency::Inr)];
        assert_eq!(validate_entries(&entries), Err(LedgerError::NonPositiveAmount(0)));
    }

    #[test]
    fn test_single_sided_rejected() {
        let entries = vec![debit(100, Currency::Inr), debit(100, Currency::Inr)];
        assert!(matches!(
            validate_entries(&entries),
            Err(LedgerError::UnbalancedLedgerTransaction { credit: 0, .. })
        ));
    }

    #[test]
    fn test_large_amounts_do_not_overflow() {
        let entries = vec![
            debit(i64::MAX, Currency::Inr),
            debit(i64::MAX, Currency::Inr),
            credit(i64::MAX, Currency::Inr),
            credit(i64::MAX, Currency::Inr),
        ];
        assert!(validate_entries(&entries).is_ok());
    }
}
