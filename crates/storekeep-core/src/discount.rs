//! # Discount Evaluation
//!
//! Decides whether a discount code applies to an order subtotal and how much
//! it takes off. The order engine only consumes the result.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::error::CoreError;
use crate::money::Money;
use crate::types::{Discount, DiscountKind};

/// Why a discount cannot be applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscountRejection {
    #[error("discount is inactive")]
    Inactive,

    #[error("discount is not valid before {0}")]
    NotStarted(DateTime<Utc>),

    #[error("discount expired at {0}")]
    Expired(DateTime<Utc>),

    #[error("order subtotal must be at least {0}")]
    BelowMinimum(Money),

    #[error("usage limit of {0} reached")]
    UsageLimitReached(i64),
}

impl DiscountRejection {
    pub fn into_core(self, code: &str) -> CoreError {
        CoreError::DiscountRejected {
            code: code.to_string(),
            reason: self.to_string(),
        }
    }
}

/// Returns the amount `discount` takes off `subtotal` at `now`.
///
/// The amount is capped by `max_discount` and by the subtotal itself, so a
/// discounted total never drops below tax.
pub fn evaluate(
    discount: &Discount,
    subtotal: Money,
    now: DateTime<Utc>,
) -> Result<Money, DiscountRejection> {
    if !discount.is_active {
        return Err(DiscountRejection::Inactive);
    }
    if now < discount.starts_at {
        return Err(DiscountRejection::NotStarted(discount.starts_at));
    }
    if now > discount.ends_at {
        return Err(DiscountRejection::Expired(discount.ends_at));
    }
    if let Some(min) = discount.min_order_cents.map(Money::from_cents) {
        if subtotal < min {
            return Err(DiscountRejection::BelowMinimum(min));
        }
    }
    if let Some(limit) = discount.usage_limit {
        if discount.times_used >= limit {
            return Err(DiscountRejection::UsageLimitReached(limit));
        }
    }

    let mut amount = match discount.kind {
        DiscountKind::Percentage => subtotal.percentage(discount.value),
        DiscountKind::Fixed => Money::from_cents(discount.value),
    };
    if let Some(cap) = discount.max_discount_cents.map(Money::from_cents) {
        amount = amount.min(cap);
    }
    Ok(amount.min(subtotal).floor_zero())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn discount(kind: DiscountKind, value: i64) -> Discount {
        let now = Utc::now();
        Discount {
            id: "d1".to_string(),
            code: "SAVE".to_string(),
            name: "Save".to_string(),
            description: None,
            kind,
            value,
            min_order_cents: None,
            max_discount_cents: None,
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(1),
            is_active: true,
            usage_limit: None,
            times_used: 0,
            created_at: now,
        }
    }

    #[test]
    fn test_percentage_discount() {
        let d = discount(DiscountKind::Percentage, 1000);
        assert_eq!(
            evaluate(&d, Money::from_units(35), Utc::now()),
            Ok(Money::from_cents(350))
        );
    }

    #[test]
    fn test_fixed_discount_capped_by_subtotal() {
        let d = discount(DiscountKind::Fixed, 5_000);
        assert_eq!(
            evaluate(&d, Money::from_units(35), Utc::now()),
            Ok(Money::from_units(35))
        );
    }

    #[test]
    fn test_max_discount_cap() {
        let mut d = discount(DiscountKind::Percentage, 5000);
        d.max_discount_cents = Some(1_000);
        assert_eq!(
            evaluate(&d, Money::from_units(100), Utc::now()),
            Ok(Money::from_units(10))
        );
    }

    #[test]
    fn test_rejections() {
        let now = Utc::now();

        let mut d = discount(DiscountKind::Fixed, 100);
        d.is_active = false;
        assert_eq!(
            evaluate(&d, Money::from_units(10), now),
            Err(DiscountRejection::Inactive)
        );

        let mut d = discount(DiscountKind::Fixed, 100);
        d.min_order_cents = Some(5_000);
        assert_eq!(
            evaluate(&d, Money::from_units(10), now),
            Err(DiscountRejection::BelowMinimum(Money::from_units(50)))
        );

        let mut d = discount(DiscountKind::Fixed, 100);
        d.usage_limit = Some(2);
        d.times_used = 2;
        assert_eq!(
            evaluate(&d, Money::from_units(10), now),
            Err(DiscountRejection::UsageLimitReached(2))
        );

        let d = discount(DiscountKind::Fixed, 100);
        assert!(matches!(
            evaluate(&d, Money::from_units(10), now + Duration::days(2)),
            Err(DiscountRejection::Expired(_))
        ));
    }

    #[test]
    fn test_rejection_into_core_error() {
        let err = DiscountRejection::Inactive.into_core("SAVE");
        assert_eq!(err.to_string(), "Discount SAVE rejected: discount is inactive");
    }
}
