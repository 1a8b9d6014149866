//! # Return Rules
//!
//! ```text
//! pending ──approve──► approved ──process──► processed
//!    │                              (stock +qty, balance −refund)
//!    └────reject────► rejected
//! ```

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{ProductReturn, ReturnStatus};

/// Fails unless `ret` is currently in `expected`.
pub fn ensure_status(ret: &ProductReturn, expected: ReturnStatus) -> CoreResult<()> {
    if ret.status != expected {
        return Err(CoreError::InvalidReturnState {
            return_id: ret.id.clone(),
            current: ret.status,
            expected,
        });
    }
    Ok(())
}

/// Units still returnable for one product of an order.
///
/// `already_returned` counts every return that was not rejected.
pub fn returnable_quantity(ordered: i64, already_returned: i64) -> i64 {
    (ordered - already_returned).max(0)
}

/// Refund when none is given on approval: the ordered unit price per unit.
pub fn default_refund(unit_price: Money, quantity: i64) -> Money {
    unit_price.multiply_quantity(quantity)
}

pub fn refund_memo(order_number: &str) -> String {
    format!("Refund for return on order #{}", order_number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ReturnReason;
    use chrono::Utc;

    fn ret(status: ReturnStatus) -> ProductReturn {
        ProductReturn {
            id: "r1".to_string(),
            order_id: "o1".to_string(),
            product_id: "p1".to_string(),
            quantity: 1,
            reason: ReturnReason::Defective,
            notes: None,
            status,
            refund_amount_cents: None,
            created_by: None,
            processed_by: None,
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    #[test]
    fn test_ensure_status() {
        assert!(ensure_status(&ret(ReturnStatus::Pending), ReturnStatus::Pending).is_ok());
        let err = ensure_status(&ret(ReturnStatus::Rejected), ReturnStatus::Approved).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidReturnState {
                current: ReturnStatus::Rejected,
                expected: ReturnStatus::Approved,
                ..
            }
        ));
    }

    #[test]
    fn test_returnable_quantity() {
        assert_eq!(returnable_quantity(3, 1), 2);
        assert_eq!(returnable_quantity(3, 5), 0);
    }

    #[test]
    fn test_default_refund() {
        assert_eq!(default_refund(Money::from_units(10), 2), Money::from_units(20));
    }
}
