//! # Stock Rules
//!
//! Quantity arithmetic and low-stock alert wording for the inventory
//! ledger.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// What happened to stock when an order line was recorded.
///
/// Shortfalls are reported instead of silently skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StockOutcome {
    Decremented { old: i64, new: i64 },
    Insufficient { available: i64, requested: i64 },
    /// The order is not in a state that takes stock.
    NotRequired,
}

impl StockOutcome {
    pub fn is_insufficient(&self) -> bool {
        matches!(self, StockOutcome::Insufficient { .. })
    }
}

pub fn is_low_stock(quantity: i64, min_stock_level: i64) -> bool {
    quantity <= min_stock_level
}

/// Applies a relative adjustment, flooring at zero.
pub fn adjusted_quantity(current: i64, delta: i64) -> i64 {
    (current + delta).max(0)
}

/// Reason recorded on the history row when an order consumes stock.
pub fn sale_reason(order_number: &str) -> String {
    format!("Sold in order #{}", order_number)
}

/// Payload for a low-stock notification and its email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockAlert {
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub min_stock_level: i64,
}

impl LowStockAlert {
    /// Returns an alert when `quantity` is at or below the threshold.
    pub fn check(
        product_id: &str,
        product_name: &str,
        quantity: i64,
        min_stock_level: i64,
    ) -> Option<Self> {
        is_low_stock(quantity, min_stock_level).then(|| LowStockAlert {
            product_id: product_id.to_string(),
            product_name: product_name.to_string(),
            quantity,
            min_stock_level,
        })
    }

    pub fn title(&self) -> String {
        format!("Low Stock Alert: {}", self.product_name)
    }

    pub fn message(&self) -> String {
        format!(
            "Only {} left in stock. Minimum is {}.",
            self.quantity, self.min_stock_level
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_inclusive() {
        assert!(is_low_stock(5, 5));
        assert!(is_low_stock(0, 5));
        assert!(!is_low_stock(6, 5));
    }

    #[test]
    fn test_adjusted_quantity_floors() {
        assert_eq!(adjusted_quantity(3, -10), 0);
        assert_eq!(adjusted_quantity(3, 4), 7);
    }

    #[test]
    fn test_alert_wording() {
        let alert = LowStockAlert::check("p1", "Green Tea", 2, 5).unwrap();
        assert_eq!(alert.title(), "Low Stock Alert: Green Tea");
        assert_eq!(alert.message(), "Only 2 left in stock. Minimum is 5.");
        assert!(LowStockAlert::check("p1", "Green Tea", 9, 5).is_none());
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(StockOutcome::Insufficient {
            available: 1,
            requested: 4,
        })
        .unwrap();
        assert_eq!(json["outcome"], "insufficient");
        assert_eq!(json["requested"], 4);
    }
}
