//! # Debt Settlement
//!
//! A debt is opened at checkout for any order that is not yet paid and is
//! worked down by payments until it reaches zero.

use chrono::{DateTime, Duration, Utc};

use crate::money::Money;
use crate::types::{Debt, PaymentStatus};

/// Default payment term for new debts.
pub const DEFAULT_DEBT_TERM_DAYS: i64 = 30;

/// Whether an order in this payment state gets a debt at checkout.
pub fn requires_debt(payment_status: PaymentStatus) -> bool {
    payment_status != PaymentStatus::Paid
}

pub fn due_date(opened_at: DateTime<Utc>, term_days: i64) -> DateTime<Utc> {
    opened_at + Duration::days(term_days)
}

/// Result of applying a payment to a debt balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub remaining: Money,
    pub is_settled: bool,
}

/// Reduces `remaining` by `amount`, floored at zero.
///
/// Non-positive amounts leave the balance untouched so the remaining
/// amount can only go down.
pub fn settle(remaining: Money, amount: Money) -> Settlement {
    let remaining = if amount.is_positive() {
        (remaining - amount).floor_zero()
    } else {
        remaining
    };
    Settlement {
        remaining,
        is_settled: remaining <= Money::zero(),
    }
}

/// A debt takes payments only while open and only positive ones.
pub fn accepts_payment(debt: &Debt, amount: Money) -> bool {
    amount.is_positive() && !debt.is_settled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settle_floors_at_zero() {
        let s = settle(Money::from_units(200), Money::from_units(250));
        assert_eq!(s.remaining, Money::zero());
        assert!(s.is_settled);
    }

    #[test]
    fn test_settle_partial() {
        let s = settle(Money::from_units(200), Money::from_units(50));
        assert_eq!(s.remaining, Money::from_units(150));
        assert!(!s.is_settled);
    }

    #[test]
    fn test_settle_is_monotonic() {
        let mut remaining = Money::from_units(100);
        for amount in [30, -10, 0, 50, 40, 5] {
            let next = settle(remaining, Money::from_units(amount)).remaining;
            assert!(next <= remaining);
            remaining = next;
        }
        assert_eq!(remaining, Money::zero());
    }

    #[test]
    fn test_zero_debt_is_settled() {
        assert!(settle(Money::zero(), Money::zero()).is_settled);
    }

    #[test]
    fn test_due_date_term() {
        let opened = Utc::now();
        assert_eq!(
            due_date(opened, DEFAULT_DEBT_TERM_DAYS) - opened,
            Duration::days(30)
        );
    }

    #[test]
    fn test_requires_debt() {
        assert!(requires_debt(PaymentStatus::Pending));
        assert!(requires_debt(PaymentStatus::Partial));
        assert!(!requires_debt(PaymentStatus::Paid));
    }
}
