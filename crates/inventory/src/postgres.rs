use std::collections::BTreeMap;

use async_trait::async_trait;
use common::{HarvestId, ItemId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    ConsumptionOutcome, InventoryError, InventoryItem, InventoryStats, InventoryStore,
    Requirement, Result,
};

const ITEM_COLUMNS: &str = "id, name, stock, unit, category, updated_at";
const NAME_INDEX: &str = "idx_inventory_items_name";
/// SQLSTATE raised when a `BIGINT` computation overflows.
const NUMERIC_OUT_OF_RANGE: &str = "22003";

/// PostgreSQL-backed inventory store.
#[derive(Clone)]
pub struct PostgresInventoryStore {
    pool: PgPool,
}

impl PostgresInventoryStore {
    /// Creates a new PostgreSQL inventory store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_item(row: &PgRow) -> Result<InventoryItem> {
        Ok(InventoryItem {
            id: ItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            stock: row.try_get("stock")?,
            unit: row.try_get("unit")?,
            category: row.try_get("category")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn map_unique_name(e: sqlx::Error, name: &str) -> InventoryError {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.constraint() == Some(NAME_INDEX)
        {
            return InventoryError::DuplicateName(name.to_string());
        }
        InventoryError::Database(e)
    }

    fn map_out_of_range(e: sqlx::Error, context: impl FnOnce() -> String) -> InventoryError {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.code().as_deref() == Some(NUMERIC_OUT_OF_RANGE)
        {
            return InventoryError::StockOutOfRange(context());
        }
        InventoryError::Database(e)
    }
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    async fn insert(&self, item: &InventoryItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_items (id, name, stock, unit, category, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(&item.name)
        .bind(item.stock)
        .bind(&item.unit)
        .bind(&item.category)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::map_unique_name(e, &item.name))?;
        Ok(())
    }

    async fn get(&self, id: ItemId) -> Result<Option<InventoryItem>> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_item).transpose()
    }

    async fn list(&self) -> Result<Vec<InventoryItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items ORDER BY name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_item).collect()
    }

    async fn list_by_category(&self, category: &str) -> Result<Vec<InventoryItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items WHERE category = $1 ORDER BY name ASC"
        ))
        .bind(category)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_item).collect()
    }

    async fn low_stock(&self, limit: i64) -> Result<Vec<InventoryItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM inventory_items WHERE stock <= $1 ORDER BY stock ASC, name ASC"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_item).collect()
    }

    async fn update(&self, item: &InventoryItem) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_items
            SET name = $2, stock = $3, unit = $4, category = $5, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(&item.name)
        .bind(item.stock)
        .bind(&item.unit)
        .bind(&item.category)
        .execute(&self.pool)
        .await
        .map_err(|e| Self::map_unique_name(e, &item.name))?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_stock(&self, id: ItemId, stock: i64) -> Result<Option<InventoryItem>> {
        let row = sqlx::query(&format!(
            "UPDATE inventory_items SET stock = $2, updated_at = NOW() WHERE id = $1 RETURNING {ITEM_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(stock)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_item).transpose()
    }

    async fn adjust_stock(&self, id: ItemId, delta: i64) -> Result<Option<InventoryItem>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE inventory_items SET stock = stock + $2, updated_at = NOW()
            WHERE id = $1 AND stock + $2 >= 0
            RETURNING {ITEM_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(delta)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_item(&row).map(Some),
            None if self.get(id).await?.is_some() => {
                Err(InventoryError::InsufficientStock { id, delta })
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: ItemId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM inventory_items WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn stats(&self, low_stock_limit: i64) -> Result<InventoryStats> {
        let totals = sqlx::query(
            r#"
            SELECT COUNT(*) AS total_items,
                   COALESCE(SUM(stock), 0)::BIGINT AS total_stock,
                   COUNT(*) FILTER (WHERE stock <= $1) AS low_stock_items
            FROM inventory_items
            "#,
        )
        .bind(low_stock_limit)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Self::map_out_of_range(e, || "total stock".to_string()))?;

        let categories = sqlx::query(
            r#"
            SELECT category, COUNT(*) AS items
            FROM inventory_items
            WHERE category IS NOT NULL AND category <> ''
            GROUP BY category
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut items_per_category: BTreeMap<String, usize> = BTreeMap::new();
        for row in &categories {
            let category: String = row.try_get("category")?;
            let items: i64 = row.try_get("items")?;
            items_per_category.insert(category, items as usize);
        }

        let total_items: i64 = totals.try_get("total_items")?;
        let low_stock_items: i64 = totals.try_get("low_stock_items")?;
        Ok(InventoryStats {
            total_items: total_items as usize,
            total_stock: totals.try_get("total_stock")?,
            low_stock_items: low_stock_items as usize,
            items_per_category,
        })
    }

    async fn consume_for_harvest(
        &self,
        harvest_id: HarvestId,
        requirements: &[Requirement],
    ) -> Result<ConsumptionOutcome> {
        let mut tx = self.pool.begin().await?;

        let recorded = sqlx::query(
            "INSERT INTO processed_harvests (harvest_id) VALUES ($1) ON CONFLICT DO NOTHING",
        )
        .bind(harvest_id.as_uuid())
        .execute(&mut *tx)
        .await?;

        if recorded.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(ConsumptionOutcome::AlreadyProcessed);
        }

        let mut applied = Vec::new();
        let mut missing = Vec::new();
        for requirement in requirements {
            let result = sqlx::query(
                r#"
                UPDATE inventory_items
                SET stock = stock - $1, updated_at = NOW()
                WHERE LOWER(name) = LOWER($2)
                "#,
            )
            .bind(requirement.quantity)
            .bind(&requirement.item_name)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Self::map_out_of_range(e, || {
                    format!(
                        "consuming {} of '{}'",
                        requirement.quantity, requirement.item_name
                    )
                })
            })?;

            if result.rows_affected() == 0 {
                missing.push(requirement.item_name.clone());
            } else {
                applied.push(requirement.clone());
            }
        }

        tx.commit().await?;
        Ok(ConsumptionOutcome::Applied { applied, missing })
    }
}
