//! # Receipt Projection
//!
//! Read-only view of an order for printing or sending to the customer.
//! Building a receipt never writes anything.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::payment::{amount_due, amount_paid};
use crate::types::{Order, Payment};

/// One printed line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReceiptLine {
    pub product: String,
    pub quantity: i64,
    pub price: Money,
    pub subtotal: Money,
}

impl ReceiptLine {
    pub fn new(product: impl Into<String>, quantity: i64, price: Money) -> Self {
        ReceiptLine {
            product: product.into(),
            quantity,
            price,
            subtotal: price.multiply_quantity(quantity),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Receipt {
    pub order_number: String,
    #[ts(as = "String")]
    pub date: DateTime<Utc>,
    pub customer: String,
    pub items: Vec<ReceiptLine>,
    pub subtotal: Money,
    pub tax: Money,
    pub discount: Money,
    /// Always `subtotal + tax - discount`.
    pub total: Money,
    pub amount_paid: Money,
    pub amount_due: Money,
}

impl Receipt {
    pub fn build(
        order: &Order,
        customer: impl Into<String>,
        items: Vec<ReceiptLine>,
        payments: &[Payment],
    ) -> Self {
        let total = order.subtotal() + order.tax() - order.discount();
        let paid = amount_paid(payments);
        Receipt {
            order_number: order.order_number.clone(),
            date: order.created_at,
            customer: customer.into(),
            items,
            subtotal: order.subtotal(),
            tax: order.tax(),
            discount: order.discount(),
            total,
            amount_paid: paid,
            amount_due: amount_due(total, paid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderStatus, PaymentMethod, PaymentStatus};

    fn order() -> Order {
        let now = Utc::now();
        Order {
            id: "o1".to_string(),
            order_number: "0123456789ABCDEF0123".to_string(),
            customer_id: "c1".to_string(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Partial,
            subtotal_cents: 3500,
            tax_cents: 200,
            discount_cents: 350,
            total_cents: 3350,
            discount_code: Some("SAVE10".to_string()),
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn payment(cents: i64) -> Payment {
        Payment {
            id: format!("p{}", cents),
            order_id: "o1".to_string(),
            amount_cents: cents,
            method: PaymentMethod::Cash,
            reference: None,
            refund_of: None,
            processed_by: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_receipt_totals() {
        let lines = vec![
            ReceiptLine::new("Tea", 3, Money::from_units(10)),
            ReceiptLine::new("Sugar", 1, Money::from_units(5)),
        ];
        let receipt = Receipt::build(&order(), "Amina", lines, &[payment(1000), payment(-200)]);

        assert_eq!(receipt.items[0].subtotal, Money::from_units(30));
        assert_eq!(receipt.total, receipt.subtotal + receipt.tax - receipt.discount);
        assert_eq!(receipt.total.cents(), 3350);
        assert_eq!(receipt.amount_paid.cents(), 800);
        assert_eq!(receipt.amount_due.cents(), 2550);
    }
}
