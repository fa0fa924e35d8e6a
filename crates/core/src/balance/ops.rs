//! Balance operations and their invariants.

use serde::{Deserialize, Serialize};

use super::error::BalanceError;

/// The `(amount, locked)` pair of a balance or linked bank account row.
///
/// Valid rows satisfy `0 <= locked <= amount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    /// Total funds.
    pub amount: i64,
    /// Funds reserved for pending settlements.
    pub locked: i64,
}

/// A single mutation of a locked row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceOp {
    /// Reserve available funds: `locked += n`.
    Reserve(i64),
    /// Return reserved funds: `locked -= n`.
    Release(i64),
    /// Spend reserved funds: `amount -= n`, `locked -= n`.
    SettleLocked(i64),
    /// Add funds: `amount += n`.
    Credit(i64),
    /// Spend available funds: `amount -= n`.
    Debit(i64),
}

impl BalanceOp {
    /// Amount the operation moves.
    #[must_use]
    pub const fn amount(&self) -> i64 {
        match *self {
            Self::Reserve(n)
            | Self::Release(n)
            | Self::SettleLocked(n)
            | Self::Credit(n)
            | Self::Debit(n) => n,
        }
    }

    /// Signed `(amount, locked)` deltas to apply in SQL.
    #[must_use]
    pub const fn delta(&self) -> (i64, i64) {
        match *self {
            Self::Reserve(n) => (0, n),
            Self::Release(n) => (0, -n),
            Self::SettleLocked(n) => (-n, -n),
            Self::Credit(n) => (n, 0),
            Self::Debit(n) => (-n, 0),
        }
    }
}

impl BalanceSnapshot {
    /// Creates a snapshot.
    #[must_use]
    pub const fn new(amount: i64, locked: i64) -> Self {
        Self { amount, locked }
    }

    /// Funds available to spend.
    #[must_use]
    pub const fn available(&self) -> i64 {
        self.amount.saturating_sub(self.locked)
    }

    /// Returns the row after `op`, or why `op` is not allowed.
    ///
    /// # Errors
    ///
    /// - `NonPositiveAmount` for a zero or negative operation
    /// - `InsufficientFunds` when `Reserve`/`Debit` exceed available funds
    /// - `InsufficientLocked` when `Release`/`SettleLocked` exceed locked funds
    /// - `Overflow` when a credit does not fit in `i64`
    pub fn apply(self, op: BalanceOp) -> Result<Self, BalanceError> {
        let n = op.amount();
        if n <= 0 {
            return Err(BalanceError::NonPositiveAmount(n));
        }

        match op {
            BalanceOp::Reserve(_) | BalanceOp::Debit(_) if self.available() < n => {
                return Err(BalanceError::InsufficientFunds {
                    available: self.available(),
                    requested: n,
                });
            }
            BalanceOp::Release(_) | BalanceOp::SettleLocked(_) if self.locked < n => {
                return Err(BalanceError::InsufficientLocked {
                    locked: self.locked,
                    requested: n,
                });
            }
            _ => {}
        }

        let (d_amount, d_locked) = op.delta();
        let amount = self
            .amount
            .checked_add(d_amount)
            .ok_or(BalanceError::Overflow)?;
        let locked = self
            .locked
            .checked_add(d_locked)
            .ok_or(BalanceError::Overflow)?;

        Ok(Self { amount, locked })
    }

    /// Returns true if `0 <= locked <= amount`.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.locked >= 0 && self.locked <= self.amount
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(BalanceSnapshot::new(100, 0), BalanceOp::Reserve(40), BalanceSnapshot::new(100, 40))]
    #[case(BalanceSnapshot::new(100, 40), BalanceOp::Release(40), BalanceSnapshot::new(100, 0))]
    #[case(BalanceSnapshot::new(100, 40), BalanceOp::SettleLocked(40), BalanceSnapshot::new(60, 0))]
    #[case(BalanceSnapshot::new(0, 0), BalanceOp::Credit(50_000), BalanceSnapshot::new(50_000, 0))]
    #[case(BalanceSnapshot::new(100, 40), BalanceOp::Debit(60), BalanceSnapshot::new(40, 40))]
    fn test_apply(
        #[case] before: BalanceSnapshot,
        #[case] op: BalanceOp,
        #[case] after: BalanceSnapshot,
    ) {
        assert_eq!(before.apply(op), Ok(after));
    }

    #[test]
    fn test_reserve_respects_available() {
        let snapshot = BalanceSnapshot::new(100, 70);
        assert_eq!(
            snapshot.apply(BalanceOp::Reserve(31)),
            Err(BalanceError::InsufficientFunds {
                available: 30,
                requested: 31
            })
        );
        assert_eq!(
            snapshot.apply(BalanceOp::Debit(31)),
            Err(BalanceError::InsufficientFunds {
                available: 30,
                requested: 31
            })
        );
    }

    #[test]
    fn test_release_beyond_locked_is_rejected() {
        let snapshot = BalanceSnapshot::new(100, 10);
        assert_eq!(
            snapshot.apply(BalanceOp::Release(11)),
            Err(BalanceError::InsufficientLocked {
                locked: 10,
                requested: 11
            })
        );
        assert!(snapshot.apply(BalanceOp::SettleLocked(11)).is_err());
    }

    #[test]
    fn test_non_positive_rejected() {
        let snapshot = BalanceSnapshot::new(100, 10);
        assert_eq!(
            snapshot.apply(BalanceOp::Credit(0)),
            Err(BalanceError::NonPositiveAmount(0))
        );
        assert_eq!(
            snapshot.apply(BalanceOp::Reserve(-5)),
            Err(BalanceError::NonPositiveAmount(-5))
        );
    }

    #[test]
    fn test_credit_overflow() {
        let snapshot = BalanceSnapshot::new(i64::MAX, 0);
        assert_eq!(snapshot.apply(BalanceOp::Credit(1)), Err(BalanceError::Overflow));
    }
}
