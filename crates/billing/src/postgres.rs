use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{FarmerId, HarvestId, InvoiceId, LineItemId};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    BillingError, BillingStats, Invoice, InvoiceLineItem, InvoiceState, InvoiceStore, Result,
};

const INVOICE_COLUMNS: &str = "id, harvest_id, farmer_id, farmer_name, product, quantity, \
     unit_price, subtotal, tax_rate, tax_amount, total, state, created_at, paid_at, notes";
const LINE_ITEM_COLUMNS: &str = "id, invoice_id, description, quantity, unit_price, subtotal, unit";
const HARVEST_UNIQUE: &str = "invoices_harvest_id_key";

/// PostgreSQL-backed invoice store.
#[derive(Clone)]
pub struct PostgresInvoiceStore {
    pool: PgPool,
}

impl PostgresInvoiceStore {
    /// Creates a new PostgreSQL invoice store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_invoice(row: &PgRow) -> Result<Invoice> {
        let state: String = row.try_get("state")?;

        Ok(Invoice {
            id: InvoiceId::from_uuid(row.try_get::<Uuid, _>("id")?),
            harvest_id: HarvestId::from_uuid(row.try_get::<Uuid, _>("harvest_id")?),
            farmer_id: FarmerId::from_uuid(row.try_get::<Uuid, _>("farmer_id")?),
            farmer_name: row.try_get("farmer_name")?,
            product: row.try_get("product")?,
            quantity: row.try_get("quantity")?,
            unit_price: row.try_get("unit_price")?,
            subtotal: row.try_get("subtotal")?,
            tax_rate: row.try_get("tax_rate")?,
            tax_amount: row.try_get("tax_amount")?,
            total: row.try_get("total")?,
            state: state.parse()?,
            created_at: row.try_get("created_at")?,
            paid_at: row.try_get("paid_at")?,
            notes: row.try_get("notes")?,
            line_items: Vec::new(),
        })
    }

    fn row_to_line_item(row: &PgRow) -> Result<InvoiceLineItem> {
        Ok(InvoiceLineItem {
            id: LineItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
            invoice_id: InvoiceId::from_uuid(row.try_get::<Uuid, _>("invoice_id")?),
            description: row.try_get("description")?,
            quantity: row.try_get("quantity")?,
            unit_price: row.try_get("unit_price")?,
            subtotal: row.try_get("subtotal")?,
            unit: row.try_get("unit")?,
        })
    }

    /// Maps invoice rows and attaches their line items.
    async fn load(&self, rows: Vec<PgRow>) -> Result<Vec<Invoice>> {
        let mut invoices = rows
            .iter()
            .map(Self::row_to_invoice)
            .collect::<Result<Vec<_>>>()?;
        if invoices.is_empty() {
            return Ok(invoices);
        }

        let ids: Vec<Uuid> = invoices.iter().map(|i| i.id.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {LINE_ITEM_COLUMNS} FROM invoice_line_items WHERE invoice_id = ANY($1) ORDER BY description"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_invoice: HashMap<InvoiceId, Vec<InvoiceLineItem>> = HashMap::new();
        for row in &rows {
            let item = Self::row_to_line_item(row)?;
            by_invoice.entry(item.invoice_id).or_default().push(item);
        }
        for invoice in &mut invoices {
            invoice.line_items = by_invoice.remove(&invoice.id).unwrap_or_default();
        }
        Ok(invoices)
    }

    async fn load_one(&self, row: Option<PgRow>) -> Result<Option<Invoice>> {
        match row {
            Some(row) => Ok(self.load(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl InvoiceStore for PostgresInvoiceStore {
    async fn insert(&self, invoice: &Invoice) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO invoices (id, harvest_id, farmer_id, farmer_name, product, quantity,
                                  unit_price, subtotal, tax_rate, tax_amount, total, state,
                                  created_at, paid_at, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(invoice.id.as_uuid())
        .bind(invoice.harvest_id.as_uuid())
        .bind(invoice.farmer_id.as_uuid())
        .bind(&invoice.farmer_name)
        .bind(&invoice.product)
        .bind(invoice.quantity)
        .bind(invoice.unit_price)
        .bind(invoice.subtotal)
        .bind(invoice.tax_rate)
        .bind(invoice.tax_amount)
        .bind(invoice.total)
        .bind(invoice.state.as_str())
        .bind(invoice.created_at)
        .bind(invoice.paid_at)
        .bind(&invoice.notes)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some(HARVEST_UNIQUE)
            {
                return BillingError::DuplicateInvoice(invoice.harvest_id);
            }
            BillingError::Database(e)
        })?;

        for item in &invoice.line_items {
            sqlx::query(
                r#"
                INSERT INTO invoice_line_items (id, invoice_id, description, quantity,
                                                unit_price, subtotal, unit)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(item.invoice_id.as_uuid())
            .bind(&item.description)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.subtotal)
            .bind(&item.unit)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: InvoiceId) -> Result<Option<Invoice>> {
        let row = sqlx::query(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        self.load_one(row).await
    }

    async fn get_by_harvest(&self, harvest_id: HarvestId) -> Result<Option<Invoice>> {
        let row = sqlx::query(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE harvest_id = $1"
        ))
        .bind(harvest_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        self.load_one(row).await
    }

    async fn list(&self) -> Result<Vec<Invoice>> {
        let rows = sqlx::query(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        self.load(rows).await
    }

    async fn list_by_farmer(&self, farmer_id: FarmerId) -> Result<Vec<Invoice>> {
        let rows = sqlx::query(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE farmer_id = $1 ORDER BY created_at DESC"
        ))
        .bind(farmer_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        self.load(rows).await
    }

    async fn update_state(
        &self,
        invoice: &Invoice,
        expected_state: InvoiceState,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET state = $3, paid_at = $4, notes = $5
            WHERE id = $1 AND state = $2
            "#,
        )
        .bind(invoice.id.as_uuid())
        .bind(expected_state.as_str())
        .bind(invoice.state.as_str())
        .bind(invoice.paid_at)
        .bind(&invoice.notes)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_pending(&self, id: InvoiceId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM invoices WHERE id = $1 AND state = $2")
            .bind(id.as_uuid())
            .bind(InvoiceState::Pending.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn stats(&self, month_start: DateTime<Utc>) -> Result<BillingStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total_invoices,
                   COUNT(*) FILTER (WHERE state = 'PENDING') AS pending,
                   COUNT(*) FILTER (WHERE state = 'PAID') AS paid,
                   COUNT(*) FILTER (WHERE state = 'VOIDED') AS voided,
                   COALESCE(SUM(total) FILTER (WHERE state = 'PAID'), 0) AS total_paid,
                   COALESCE(SUM(total) FILTER (WHERE state = 'PAID' AND paid_at >= $1), 0)
                       AS paid_this_month
            FROM invoices
            "#,
        )
        .bind(month_start)
        .fetch_one(&self.pool)
        .await?;

        let count = |column: &str| -> Result<usize> {
            let n: i64 = row.try_get(column)?;
            Ok(n as usize)
        };

        Ok(BillingStats {
            total_invoices: count("total_invoices")?,
            pending: count("pending")?,
            paid: count("paid")?,
            voided: count("voided")?,
            total_paid: row.try_get("total_paid")?,
            paid_this_month: row.try_get("paid_this_month")?,
        })
    }
}
