//! # Error Types
//!
//! Domain error types for storekeep-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  storekeep-core errors (this file)                                      │
//! │  ├── CoreError        - Domain rule violations                          │
//! │  └── ValidationError  - Input validation failures                       │
//! │                                                                         │
//! │  storekeep-db errors (separate crate)                                   │
//! │  ├── DbError          - Database failures, wraps CoreError              │
//! │  └── ConfigError      - Config file / environment problems              │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Declined operations (empty checkout, non-positive payment, settled debt)
//! are not errors. They come back as `Ok(None)` from the repositories.

use thiserror::Error;

use crate::types::{OrderStatus, ReturnStatus};

// =============================================================================
// Core Error
// =============================================================================

/// Domain rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A stock level below zero was requested.
    #[error("Invalid quantity {quantity}: stock cannot be negative")]
    InvalidQuantity { quantity: i64 },

    /// Not enough stock to cover a requested decrement.
    ///
    /// Only raised by callers that require the stock; order-item
    /// fulfilment reports shortfalls through `StockOutcome` instead.
    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    /// Order status change not permitted by the status machine.
    #[error("Order {order_number} cannot move from {from:?} to {to:?}")]
    InvalidStatusTransition {
        order_number: String,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// Mutation attempted on a cart that has already been checked out.
    #[error("Cart {0} is no longer active")]
    CartInactive(String),

    /// Discount code exists but cannot be applied to this order.
    #[error("Discount {code} rejected: {reason}")]
    DiscountRejected { code: String, reason: String },

    /// Return is not in the state the operation requires.
    #[error("Return {return_id} is {current:?}, expected {expected:?}")]
    InvalidReturnState {
        return_id: String,
        current: ReturnStatus,
        expected: ReturnStatus,
    },

    /// More units returned than were ordered.
    #[error("Cannot return {requested} of {sku}: only {returnable} returnable")]
    ReturnQuantityExceeded {
        sku: String,
        returnable: i64,
        requested: i64,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors, raised before any write happens.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    #[error("{field} cannot be negative")]
    MustNotBeNegative { field: String },

    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
