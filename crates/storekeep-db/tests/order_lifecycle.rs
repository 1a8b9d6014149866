//! End-to-end order lifecycle against the public `storekeep_db` API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use storekeep_core::{
    Customer, InventoryAction, Money, NewCustomer, NewProduct, OrderStatus, PaymentMethod,
    PaymentStatus, Product, StockOutcome, TransactionKind,
};
use storekeep_db::{AlertEmail, AlertError, Database, DbConfig, Mailer};
use tempfile::TempDir;

async fn memory_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

async fn product(db: &Database, sku: &str, price_cents: i64, stock: i64, min: i64) -> Product {
    let product = db
        .products()
        .create(&NewProduct {
            sku: sku.to_string(),
            name: format!("Product {}", sku),
            price_cents,
            min_stock_level: Some(min),
            ..NewProduct::default()
        })
        .await
        .unwrap();
    db.inventory()
        .set_quantity(&product.id, stock, "Opening stock", InventoryAction::Restock, None)
        .await
        .unwrap();
    product
}

async fn customer(db: &Database, name: &str) -> Customer {
    db.customers()
        .create(&NewCustomer {
            name: name.to_string(),
            ..NewCustomer::default()
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_credit_order_paid_in_full() {
    let db = memory_db().await;
    let buyer = customer(&db, "Amina Njeri").await;
    let radio = product(&db, "RADIO-01", 20_000, 10, 2).await;

    let cart = db.carts().active_cart(&buyer.id).await.unwrap();
    db.carts().add_item(&cart.id, &radio.id, 1).await.unwrap();
    let checkout = db.carts().checkout(&cart.id, Some("till-1")).await.unwrap().unwrap();

    let order = checkout.order;
    assert_eq!(order.total(), Money::from_units(200));
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Pending);

    let debt = checkout.debt.unwrap();
    assert_eq!(debt.initial_amount(), Money::from_units(200));
    assert_eq!(debt.remaining_amount(), Money::from_units(200));
    assert!(!debt.is_settled);
    let term = debt.due_date - debt.created_at;
    assert_eq!(term.num_days(), 30);

    let before = db.customers().get(&buyer.id).await.unwrap().unwrap();
    assert_eq!(before.balance(), Money::zero());
    assert_eq!(before.credit_limit(), Money::from_units(1_000));

    // checkout alone leaves the shelf untouched
    assert_eq!(db.inventory().get(&radio.id).await.unwrap().unwrap().quantity, 10);

    let outcome = db
        .orders()
        .add_payment(&order.id, Money::from_units(200), PaymentMethod::Cash, None, Some("till-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.stock.len(), 1);
    assert_eq!(outcome.stock[0].item.product_id, radio.id);
    assert_eq!(outcome.stock[0].stock, StockOutcome::Decremented { old: 10, new: 9 });

    let paid = db.orders().get(&order.id).await.unwrap().unwrap();
    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    assert_eq!(paid.status, OrderStatus::Confirmed);
    assert_eq!(db.inventory().get(&radio.id).await.unwrap().unwrap().quantity, 9);

    let debt = db.debts().get(&debt.id).await.unwrap().unwrap();
    assert_eq!(debt.remaining_amount(), Money::zero());
    assert!(debt.is_settled);

    let after = db.customers().get(&buyer.id).await.unwrap().unwrap();
    assert_eq!(after.balance(), Money::from_units(-200));

    let ledger = db.customers().transactions(&buyer.id).await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].kind, TransactionKind::Payment);
    assert_eq!(ledger[0].amount(), Money::from_units(-200));
    assert_eq!(ledger[0].old_balance_cents, 0);
    assert_eq!(ledger[0].new_balance_cents, -20_000);
}

#[tokio::test]
async fn test_checkout_totals_mixed_cart() {
    let db = memory_db().await;
    let buyer = customer(&db, "Brian Otieno").await;
    let soap = product(&db, "SOAP-01", 1_000, 20, 2).await;
    let matches = product(&db, "MATCH-01", 500, 20, 2).await;

    let cart = db.carts().active_cart(&buyer.id).await.unwrap();
    db.carts().add_item(&cart.id, &soap.id, 3).await.unwrap();
    db.carts().add_item(&cart.id, &matches.id, 1).await.unwrap();
    assert_eq!(db.carts().total(&cart.id).await.unwrap(), Money::from_units(35));

    let checkout = db.carts().checkout(&cart.id, None).await.unwrap().unwrap();
    assert_eq!(checkout.order.subtotal(), Money::from_units(35));
    assert_eq!(checkout.order.total(), Money::from_units(35));
    assert_eq!(checkout.items.len(), 2);

    // the cart is spent; the customer gets a fresh one
    let next = db.carts().active_cart(&buyer.id).await.unwrap();
    assert_ne!(next.id, cart.id);
    assert!(db.carts().checkout(&cart.id, None).await.unwrap().is_none());

    let json = serde_json::to_value(&checkout).unwrap();
    assert_eq!(json["order"]["total_cents"], 3_500);
    assert_eq!(json["debt"]["remaining_amount_cents"], 3_500);
}

#[tokio::test]
async fn test_partial_payments_and_refund() {
    let db = memory_db().await;
    let buyer = customer(&db, "Chen Wei").await;
    let kettle = product(&db, "KETTLE-01", 8_000, 5, 1).await;

    let cart = db.carts().active_cart(&buyer.id).await.unwrap();
    db.carts().add_item(&cart.id, &kettle.id, 1).await.unwrap();
    let order = db.carts().checkout(&cart.id, None).await.unwrap().unwrap().order;

    let first = db
        .orders()
        .add_payment(&order.id, Money::from_units(30), PaymentMethod::Card, Some("AUTH-1"), None)
        .await
        .unwrap()
        .unwrap()
        .payment;
    let partial = db.orders().get(&order.id).await.unwrap().unwrap();
    assert_eq!(partial.payment_status, PaymentStatus::Partial);
    assert_eq!(partial.status, OrderStatus::Pending);

    let debt = db.debts().get_for_order(&order.id).await.unwrap().unwrap();
    assert_eq!(debt.remaining_amount(), Money::from_units(50));

    db.orders()
        .refund_payment(&first.id, Money::from_units(10), None)
        .await
        .unwrap()
        .unwrap();

    // refunds credit the balance but leave the debt alone
    let debt = db.debts().get_for_order(&order.id).await.unwrap().unwrap();
    assert_eq!(debt.remaining_amount(), Money::from_units(50));
    let balance = db.customers().get(&buyer.id).await.unwrap().unwrap().balance();
    assert_eq!(balance, Money::from_units(-20));

    let payments = db.orders().payments(&order.id).await.unwrap();
    let net: Money = payments.iter().map(|p| p.amount()).sum();
    assert_eq!(net, Money::from_units(20));

    // only $20 of the first payment is left to hand back
    assert!(db
        .orders()
        .refund_payment(&first.id, Money::from_units(25), None)
        .await
        .unwrap()
        .is_none());

    // a partly paid order has not taken stock
    assert_eq!(db.inventory().get(&kettle.id).await.unwrap().unwrap().quantity, 5);
}

#[tokio::test]
async fn test_return_restocks_and_credits() {
    let db = memory_db().await;
    let buyer = customer(&db, "Amina Njeri").await;
    let lamp = product(&db, "LAMP-01", 2_500, 10, 1).await;

    let cart = db.carts().active_cart(&buyer.id).await.unwrap();
    db.carts().add_item(&cart.id, &lamp.id, 2).await.unwrap();
    let order = db.carts().checkout(&cart.id, None).await.unwrap().unwrap().order;
    db.orders()
        .add_payment(&order.id, Money::from_units(50), PaymentMethod::Cash, None, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(db.inventory().get(&lamp.id).await.unwrap().unwrap().quantity, 8);

    let request = db
        .returns()
        .create(
            &order.id,
            &lamp.id,
            1,
            storekeep_core::ReturnReason::Defective,
            Some("flickers"),
            None,
        )
        .await
        .unwrap();
    db.returns().approve(&request.id, None, Some("manager")).await.unwrap();
    db.returns().process(&request.id, Some("manager")).await.unwrap();

    let stock = db.inventory().get(&lamp.id).await.unwrap().unwrap();
    assert_eq!(stock.quantity, 9);

    let balance = db.customers().get(&buyer.id).await.unwrap().unwrap().balance();
    assert_eq!(balance, Money::from_units(-75));
}

#[tokio::test]
async fn test_concurrent_sales_never_oversell() {
    let dir = TempDir::new().unwrap();
    let config = DbConfig::new(dir.path().join("store.db")).max_connections(5);
    let db = Database::new(config).await.unwrap();

    let stocked = product(&db, "RICE-5KG", 1_200, 20, 0).await;
    let filler = product(&db, "SUGAR-1KG", 300, 100, 0).await;

    let mut orders = Vec::new();
    for n in 0..10 {
        let buyer = customer(&db, &format!("Customer {}", n)).await;
        let cart = db.carts().active_cart(&buyer.id).await.unwrap();
        db.carts().add_item(&cart.id, &filler.id, 1).await.unwrap();
        let order = db.carts().checkout(&cart.id, None).await.unwrap().unwrap().order;
        db.orders()
            .update_status(&order.id, OrderStatus::Confirmed, None)
            .await
            .unwrap();
        orders.push(order.id);
    }

    let mut handles = Vec::new();
    for order_id in orders {
        let db = db.clone();
        let product_id = stocked.id.clone();
        handles.push(tokio::spawn(async move {
            db.orders()
                .add_item(&order_id, &product_id, 3, None)
                .await
                .unwrap()
                .stock
        }));
    }

    let mut sold = 0;
    let mut short = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StockOutcome::Decremented { old, new } => {
                assert_eq!(old - new, 3);
                sold += 1;
            }
            StockOutcome::Insufficient { requested, .. } => {
                assert_eq!(requested, 3);
                short += 1;
            }
            StockOutcome::NotRequired => panic!("confirmed orders take stock"),
        }
    }
    assert_eq!(sold, 6);
    assert_eq!(short, 4);

    let inventory = db.inventory().get(&stocked.id).await.unwrap().unwrap();
    assert_eq!(inventory.quantity, 2);

    // every history row chains onto the one before it
    let mut history = db.inventory().history(&stocked.id).await.unwrap();
    history.reverse();
    assert_eq!(history.len(), 7);
    for pair in history.windows(2) {
        assert_eq!(pair[0].new_quantity, pair[1].old_quantity);
    }

    db.close().await;
}

#[tokio::test]
async fn test_concurrent_balance_entries_chain() {
    let dir = TempDir::new().unwrap();
    let db = Database::new(DbConfig::new(dir.path().join("store.db")))
        .await
        .unwrap();
    let buyer = customer(&db, "Chen Wei").await;

    let mut handles = Vec::new();
    for n in 0..10 {
        let db = db.clone();
        let customer_id = buyer.id.clone();
        handles.push(tokio::spawn(async move {
            db.customers()
                .apply(
                    &customer_id,
                    Money::from_units(10),
                    &format!("Adjustment {}", n),
                    TransactionKind::Adjustment,
                    None,
                    None,
                )
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let customer = db.customers().get(&buyer.id).await.unwrap().unwrap();
    assert_eq!(customer.balance(), Money::from_units(100));

    let ledger = db.customers().transactions(&buyer.id).await.unwrap();
    assert_eq!(ledger.len(), 10);
    let mut balances: Vec<(i64, i64)> = ledger
        .iter()
        .map(|t| (t.old_balance_cents, t.new_balance_cents))
        .collect();
    balances.sort();
    for (i, (old, new)) in balances.iter().enumerate() {
        assert_eq!(*old, i as i64 * 1_000);
        assert_eq!(*new, old + 1_000);
    }

    db.close().await;
}

#[tokio::test]
async fn test_low_stock_list_same_with_and_without_cache() {
    let cached = memory_db().await;
    let uncached = Database::new(DbConfig::in_memory().cache(false, Duration::ZERO))
        .await
        .unwrap();

    for db in [&cached, &uncached] {
        let tea = product(db, "TEA-01", 500, 3, 5).await;
        product(db, "COFFEE-01", 900, 40, 5).await;

        let low = db.inventory().get_low_stock().await.unwrap();
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].id, tea.id);

        db.inventory()
            .adjust(&tea.id, 10, "Delivery", InventoryAction::Restock, None)
            .await
            .unwrap();
        assert!(db.inventory().get_low_stock().await.unwrap().is_empty());
    }

    assert!(cached.low_stock_cache().is_enabled());
    assert!(!uncached.low_stock_cache().is_enabled());
}

#[derive(Default)]
struct Outbox(Mutex<Vec<AlertEmail>>);

impl Mailer for Outbox {
    fn send(&self, email: &AlertEmail) -> Result<(), AlertError> {
        self.0.lock().unwrap().push(email.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_low_stock_email_sent_after_sale() {
    let outbox = Arc::new(Outbox::default());
    let config = DbConfig::in_memory().alert_recipients(vec!["stock@example.com".to_string()]);
    let db = Database::with_mailer(config, outbox.clone())
        .await
        .unwrap();

    let flour = product(&db, "FLOUR-2KG", 400, 12, 5).await;
    let buyer = customer(&db, "Brian Otieno").await;
    assert!(outbox.0.lock().unwrap().is_empty());

    let cart = db.carts().active_cart(&buyer.id).await.unwrap();
    db.carts().add_item(&cart.id, &flour.id, 8).await.unwrap();
    let order = db.carts().checkout(&cart.id, None).await.unwrap().unwrap().order;
    assert!(outbox.0.lock().unwrap().is_empty());

    let outcome = db
        .orders()
        .add_payment(&order.id, Money::from_units(32), PaymentMethod::Mpesa, Some("QX7"), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.stock[0].stock, StockOutcome::Decremented { old: 12, new: 4 });

    let deadline = Utc::now() + chrono::Duration::seconds(5);
    while outbox.0.lock().unwrap().is_empty() && Utc::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let sent = outbox.0.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, vec!["stock@example.com".to_string()]);
    assert!(sent[0].subject.contains("Product FLOUR-2KG"));

    let unread = db.notifications().count_unread().await.unwrap();
    assert_eq!(unread, 1);
}
