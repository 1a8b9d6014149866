//! Discount codes. Applying a code to an order lives in the order engine;
//! this repository manages the codes themselves.

use chrono::Utc;
use sqlx::SqlitePool;
use storekeep_core::discount::{evaluate, DiscountRejection};
use storekeep_core::validation::validate_new_discount;
use storekeep_core::{generate_id, Discount, Money, NewDiscount};
use tracing::info;

use crate::error::{DbError, DbResult};

pub(crate) const DISCOUNT_COLUMNS: &str = "id, code, name, description, kind, value, \
     min_order_cents, max_discount_cents, starts_at, ends_at, is_active, usage_limit, \
     times_used, created_at";

#[derive(Debug, Clone)]
pub struct DiscountRepository {
    pool: SqlitePool,
}

impl DiscountRepository {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        DiscountRepository { pool }
    }

    pub async fn create(&self, input: &NewDiscount) -> DbResult<Discount> {
        validate_new_discount(input)?;
        let code = input.code.trim();

        let sql = format!(
            r#"
            INSERT INTO discounts (
                id, code, name, description, kind, value, min_order_cents,
                max_discount_cents, starts_at, ends_at, is_active, usage_limit,
                times_used, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1, ?11, 0, ?12)
            RETURNING {}
            "#,
            DISCOUNT_COLUMNS
        );
        let discount = sqlx::query_as::<_, Discount>(&sql)
            .bind(generate_id())
            .bind(code)
            .bind(input.name.trim())
            .bind(input.description.as_deref())
            .bind(input.kind)
            .bind(input.value)
            .bind(input.min_order_cents)
            .bind(input.max_discount_cents)
            .bind(input.starts_at)
            .bind(input.ends_at)
            .bind(input.usage_limit)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match DbError::from(e) {
                DbError::UniqueViolation { .. } => DbError::duplicate("code", code),
                other => other,
            })?;

        info!(code = %discount.code, kind = ?discount.kind, value = discount.value, "Discount created");
        Ok(discount)
    }

    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Discount>> {
        let sql = format!("SELECT {} FROM discounts WHERE code = ?1", DISCOUNT_COLUMNS);
        let discount = sqlx::query_as::<_, Discount>(&sql)
            .bind(code.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(discount)
    }

    pub async fn deactivate(&self, code: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE discounts SET is_active = 0 WHERE code = ?1")
            .bind(code.trim())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Discount", code));
        }
        info!(code = %code, "Discount deactivated");
        Ok(())
    }

    /// What the code would take off `subtotal` right now. Writes nothing.
    pub async fn preview(
        &self,
        code: &str,
        subtotal: Money,
    ) -> DbResult<Result<Money, DiscountRejection>> {
        let discount = self
            .get_by_code(code)
            .await?
            .ok_or_else(|| DbError::not_found("Discount", code))?;
        Ok(evaluate(&discount, subtotal, Utc::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_db, test_discount};
    use storekeep_core::DiscountKind;

    #[tokio::test]
    async fn test_create_and_duplicate() {
        let db = test_db().await;
        let discount = test_discount(&db, "SAVE10", DiscountKind::Percentage, 1_000, None).await;
        assert_eq!(discount.times_used, 0);
        assert!(discount.is_active);

        let mut input = NewDiscount {
            code: "SAVE10".to_string(),
            name: "Again".to_string(),
            description: None,
            kind: DiscountKind::Fixed,
            value: 100,
            min_order_cents: None,
            max_discount_cents: None,
            starts_at: discount.starts_at,
            ends_at: discount.ends_at,
            usage_limit: None,
        };
        let err = db.discounts().create(&input).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { ref field, .. } if field == "code"));

        input.code = "BAD CODE".to_string();
        assert!(matches!(
            db.discounts().create(&input).await,
            Err(DbError::Domain(_))
        ));
    }

    #[tokio::test]
    async fn test_preview_and_deactivate() {
        let db = test_db().await;
        test_discount(&db, "FIVE", DiscountKind::Fixed, 500, None).await;

        let preview = db.discounts().preview("FIVE", Money::from_units(20)).await.unwrap();
        assert_eq!(preview, Ok(Money::from_units(5)));

        db.discounts().deactivate("FIVE").await.unwrap();
        let preview = db.discounts().preview("FIVE", Money::from_units(20)).await.unwrap();
        assert_eq!(preview, Err(DiscountRejection::Inactive));

        assert!(db.discounts().deactivate("NOPE").await.unwrap_err().is_not_found());
    }
}
