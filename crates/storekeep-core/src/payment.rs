//! # Payment Rules
//!
//! Payment status is never set by a caller. It is recomputed from the
//! order's payments every time a payment row is written.
//!
//! ```text
//! Σ payments (signed)          total
//!        │                       │
//!        └──────────┬────────────┘
//!                   ▼
//!     paid <= 0          → pending
//!     0 < paid < total   → partial
//!     paid >= total      → paid ──► order pending? → confirmed
//! ```

use crate::money::Money;
use crate::types::{OrderStatus, Payment, PaymentStatus};

/// Derives the payment status from the amount paid and the order total.
pub fn derive_payment_status(amount_paid: Money, total: Money) -> PaymentStatus {
    if amount_paid <= Money::zero() {
        PaymentStatus::Pending
    } else if amount_paid < total {
        PaymentStatus::Partial
    } else {
        PaymentStatus::Paid
    }
}

/// Σ signed payment amounts. Refunds count negative.
pub fn amount_paid(payments: &[Payment]) -> Money {
    payments.iter().map(Payment::amount).sum()
}

/// `total - amount_paid`. Not clamped: overpayment yields a negative due.
pub fn amount_due(total: Money, amount_paid: Money) -> Money {
    total - amount_paid
}

/// Order status after a payment write.
///
/// The only automatic transition in the lifecycle: a fully paid order
/// still pending becomes confirmed.
pub fn status_after_payment(current: OrderStatus, payment_status: PaymentStatus) -> OrderStatus {
    if payment_status == PaymentStatus::Paid && current == OrderStatus::Pending {
        OrderStatus::Confirmed
    } else {
        current
    }
}

/// What is left to hand back on `original` after earlier refunds of it.
///
/// `already_refunded` is the positive sum of those refunds.
pub fn refundable(original: Money, already_refunded: Money) -> Money {
    (original - already_refunded).floor_zero()
}

/// Ledger description for a payment posted against an order.
pub fn payment_memo(order_number: &str) -> String {
    format!("Payment for order #{}", order_number)
}

/// Ledger description for money handed back against an order.
pub fn refund_memo(order_number: &str) -> String {
    format!("Refund for order #{}", order_number)
}

/// Reference stored on a refund payment row.
pub fn refund_reference(original: Option<&str>) -> String {
    format!("Refund for {}", original.unwrap_or("payment"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_thresholds() {
        let total = Money::from_units(100);

        assert_eq!(
            derive_payment_status(Money::zero(), total),
            PaymentStatus::Pending
        );
        assert_eq!(
            derive_payment_status(Money::from_units(50), total),
            PaymentStatus::Partial
        );
        assert_eq!(
            derive_payment_status(Money::from_units(100), total),
            PaymentStatus::Paid
        );
        assert_eq!(
            derive_payment_status(Money::from_units(150), total),
            PaymentStatus::Paid
        );
    }

    #[test]
    fn test_net_zero_after_refund_is_pending() {
        assert_eq!(
            derive_payment_status(Money::from_cents(-1), Money::from_units(100)),
            PaymentStatus::Pending
        );
    }

    #[test]
    fn test_auto_confirm_only_from_pending() {
        assert_eq!(
            status_after_payment(OrderStatus::Pending, PaymentStatus::Paid),
            OrderStatus::Confirmed
        );
        assert_eq!(
            status_after_payment(OrderStatus::Pending, PaymentStatus::Partial),
            OrderStatus::Pending
        );
        assert_eq!(
            status_after_payment(OrderStatus::Shipped, PaymentStatus::Paid),
            OrderStatus::Shipped
        );
    }

    #[test]
    fn test_refundable_shrinks_with_each_refund() {
        let original = Money::from_units(100);
        assert_eq!(refundable(original, Money::zero()), original);
        assert_eq!(refundable(original, Money::from_units(60)), Money::from_units(40));
        assert_eq!(refundable(original, Money::from_units(100)), Money::zero());
        assert_eq!(refundable(original, Money::from_units(120)), Money::zero());
    }

    #[test]
    fn test_amount_due_not_clamped() {
        assert_eq!(
            amount_due(Money::from_units(10), Money::from_units(12)).cents(),
            -200
        );
    }

    #[test]
    fn test_memos() {
        assert_eq!(payment_memo("ABC123"), "Payment for order #ABC123");
        assert_eq!(refund_reference(Some("TX-9")), "Refund for TX-9");
        assert_eq!(refund_reference(None), "Refund for payment");
    }
}
