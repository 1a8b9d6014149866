//! # Validation Module
//!
//! Input checks that run before any write.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: THIS MODULE       field rules, ValidationError                │
//! │  Layer 2: repositories      domain rules, CoreError                     │
//! │  Layer 3: SQLite            CHECK / UNIQUE / FK constraints, triggers   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ```rust
//! use storekeep_core::validation::{validate_sku, validate_quantity};
//!
//! assert!(validate_sku("TEA-250").is_ok());
//! assert!(validate_quantity(0).is_err());
//! ```

use crate::error::ValidationError;
use crate::types::{NewCustomer, NewDiscount, NewProduct};
use crate::{DiscountKind, MAX_ITEM_QUANTITY};

pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_SKU_LEN: usize = 50;
const MAX_NAME_LEN: usize = 200;
const MAX_CODE_LEN: usize = 50;
const MAX_LOCATION_LEN: usize = 100;

fn required(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }
    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// SKU: 1-50 characters of ASCII letters, digits, `-` or `_`.
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    required("sku", sku, MAX_SKU_LEN)?;
    if !sku
        .trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "only letters, digits, hyphens and underscores allowed".to_string(),
        });
    }
    Ok(())
}

pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    required(field, name, MAX_NAME_LEN)
}

/// Discount codes are matched case-sensitively; whitespace is not allowed.
pub fn validate_discount_code(code: &str) -> ValidationResult<()> {
    required("code", code, MAX_CODE_LEN)?;
    if code.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: "must not contain whitespace".to_string(),
        });
    }
    Ok(())
}

pub fn validate_location(location: &str) -> ValidationResult<()> {
    if location.chars().count() > MAX_LOCATION_LEN {
        return Err(ValidationError::TooLong {
            field: "location".to_string(),
            max: MAX_LOCATION_LEN,
        });
    }
    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Line quantity for carts, orders and returns: 1..=MAX_ITEM_QUANTITY.
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity < 1 || quantity > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }
    Ok(())
}

pub fn validate_non_negative(field: &str, value: i64) -> ValidationResult<()> {
    if value < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }
    Ok(())
}

pub fn validate_positive(field: &str, value: i64) -> ValidationResult<()> {
    if value <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Input Records
// =============================================================================

pub fn validate_new_product(input: &NewProduct) -> ValidationResult<()> {
    validate_sku(&input.sku)?;
    validate_name("name", &input.name)?;
    validate_non_negative("price", input.price_cents)?;
    validate_non_negative("cost", input.cost_cents)?;
    if let Some(level) = input.min_stock_level {
        validate_non_negative("min_stock_level", level)?;
    }
    Ok(())
}

pub fn validate_new_customer(input: &NewCustomer) -> ValidationResult<()> {
    validate_name("name", &input.name)?;
    if let Some(limit) = input.credit_limit_cents {
        validate_non_negative("credit_limit", limit)?;
    }
    Ok(())
}

pub fn validate_new_discount(input: &NewDiscount) -> ValidationResult<()> {
    validate_discount_code(&input.code)?;
    validate_name("name", &input.name)?;
    validate_positive("value", input.value)?;
    if input.kind == DiscountKind::Percentage && input.value > 10_000 {
        return Err(ValidationError::OutOfRange {
            field: "value".to_string(),
            min: 1,
            max: 10_000,
        });
    }
    if input.ends_at <= input.starts_at {
        return Err(ValidationError::InvalidFormat {
            field: "ends_at".to_string(),
            reason: "must be after starts_at".to_string(),
        });
    }
    if let Some(limit) = input.usage_limit {
        validate_positive("usage_limit", limit)?;
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("TEA-250").is_ok());
        assert!(validate_sku("tea_250").is_ok());
        assert!(matches!(
            validate_sku("  "),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            validate_sku("TEA 250"),
            Err(ValidationError::InvalidFormat { .. })
        ));
        assert!(matches!(
            validate_sku(&"A".repeat(51)),
            Err(ValidationError::TooLong { max: 50, .. })
        ));
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_ITEM_QUANTITY).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-3).is_err());
        assert!(validate_quantity(MAX_ITEM_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_new_product() {
        let mut input = NewProduct {
            sku: "TEA-250".to_string(),
            name: "Green Tea".to_string(),
            price_cents: 1000,
            ..Default::default()
        };
        assert!(validate_new_product(&input).is_ok());

        input.min_stock_level = Some(-1);
        assert!(matches!(
            validate_new_product(&input),
            Err(ValidationError::MustNotBeNegative { .. })
        ));
    }

    #[test]
    fn test_validate_new_discount_window() {
        let now = Utc::now();
        let input = NewDiscount {
            code: "SAVE10".to_string(),
            name: "Ten off".to_string(),
            description: None,
            kind: DiscountKind::Percentage,
            value: 1000,
            min_order_cents: None,
            max_discount_cents: None,
            starts_at: now,
            ends_at: now - Duration::days(1),
            usage_limit: None,
        };
        assert!(matches!(
            validate_new_discount(&input),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }
}
