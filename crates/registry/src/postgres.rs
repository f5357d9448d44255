use async_trait::async_trait;
use common::{FarmerId, HarvestId, InvoiceId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{Farmer, Harvest, HarvestState, HarvestStore, Result};

/// PostgreSQL-backed harvest store.
#[derive(Clone)]
pub struct PostgresHarvestStore {
    pool: PgPool,
}

const HARVEST_COLUMNS: &str = "id, farmer_id, product, quantity, state, created_at, invoice_id";
const FARMER_COLUMNS: &str = "id, name, farm, location, email, registered_at";

impl PostgresHarvestStore {
    /// Creates a new PostgreSQL harvest store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_farmer(row: &PgRow) -> Result<Farmer> {
        Ok(Farmer {
            id: FarmerId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            farm: row.try_get("farm")?,
            location: row.try_get("location")?,
            email: row.try_get("email")?,
            registered_at: row.try_get("registered_at")?,
        })
    }

    fn row_to_harvest(row: &PgRow) -> Result<Harvest> {
        let state: String = row.try_get("state")?;
        let invoice_id: Option<Uuid> = row.try_get("invoice_id")?;

        Ok(Harvest {
            id: HarvestId::from_uuid(row.try_get::<Uuid, _>("id")?),
            farmer_id: FarmerId::from_uuid(row.try_get::<Uuid, _>("farmer_id")?),
            product: row.try_get("product")?,
            quantity: row.try_get("quantity")?,
            state: state.parse()?,
            created_at: row.try_get("created_at")?,
            invoice_id: invoice_id.map(InvoiceId::from_uuid),
        })
    }
}

#[async_trait]
impl HarvestStore for PostgresHarvestStore {
    async fn insert_farmer(&self, farmer: &Farmer) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO farmers (id, name, farm, location, email, registered_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(farmer.id.as_uuid())
        .bind(&farmer.name)
        .bind(&farmer.farm)
        .bind(&farmer.location)
        .bind(&farmer.email)
        .bind(farmer.registered_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_farmer(&self, id: FarmerId) -> Result<Option<Farmer>> {
        let row = sqlx::query(&format!(
            "SELECT {FARMER_COLUMNS} FROM farmers WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_farmer).transpose()
    }

    async fn list_farmers(&self) -> Result<Vec<Farmer>> {
        let rows = sqlx::query(&format!(
            "SELECT {FARMER_COLUMNS} FROM farmers ORDER BY registered_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_farmer).collect()
    }

    async fn update_farmer(&self, farmer: &Farmer) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE farmers SET name = $2, farm = $3, location = $4, email = $5
            WHERE id = $1
            "#,
        )
        .bind(farmer.id.as_uuid())
        .bind(&farmer.name)
        .bind(&farmer.farm)
        .bind(&farmer.location)
        .bind(&farmer.email)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_farmer(&self, id: FarmerId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM farmers WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_harvest(&self, harvest: &Harvest) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO harvests (id, farmer_id, product, quantity, state, created_at, invoice_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(harvest.id.as_uuid())
        .bind(harvest.farmer_id.as_uuid())
        .bind(&harvest.product)
        .bind(harvest.quantity)
        .bind(harvest.state.as_str())
        .bind(harvest.created_at)
        .bind(harvest.invoice_id.map(|id| id.as_uuid()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_harvest(&self, id: HarvestId) -> Result<Option<Harvest>> {
        let row = sqlx::query(&format!(
            "SELECT {HARVEST_COLUMNS} FROM harvests WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_harvest).transpose()
    }

    async fn list_harvests(&self) -> Result<Vec<Harvest>> {
        let rows = sqlx::query(&format!(
            "SELECT {HARVEST_COLUMNS} FROM harvests ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_harvest).collect()
    }

    async fn list_harvests_by_farmer(&self, farmer_id: FarmerId) -> Result<Vec<Harvest>> {
        let rows = sqlx::query(&format!(
            "SELECT {HARVEST_COLUMNS} FROM harvests WHERE farmer_id = $1 ORDER BY created_at DESC"
        ))
        .bind(farmer_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_harvest).collect()
    }

    async fn update_harvest(
        &self,
        harvest: &Harvest,
        expected_state: HarvestState,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE harvests SET product = $2, quantity = $3, state = $4
            WHERE id = $1 AND state = $5
            "#,
        )
        .bind(harvest.id.as_uuid())
        .bind(&harvest.product)
        .bind(harvest.quantity)
        .bind(harvest.state.as_str())
        .bind(expected_state.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_registered_harvest(&self, id: HarvestId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM harvests WHERE id = $1 AND state = $2")
            .bind(id.as_uuid())
            .bind(HarvestState::Registered.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_invoice(&self, id: HarvestId, invoice_id: InvoiceId) -> Result<bool> {
        let result = sqlx::query("UPDATE harvests SET invoice_id = $2 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(invoice_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
