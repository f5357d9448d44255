use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    BusError, DeadLetter, Delivery, DeliveryTag, EventBus, EventEnvelope, EventId, LEASE_EXPIRED,
    NackOutcome, Result, RetryPolicy,
};

/// PostgreSQL-backed event bus.
///
/// Messages live in `bus_messages`, one row per (queue, message). Workers
/// lease rows with `FOR UPDATE SKIP LOCKED`, so any number of processes can
/// drain the same queue.
#[derive(Clone)]
pub struct PostgresEventBus {
    pool: PgPool,
    policy: RetryPolicy,
}

impl PostgresEventBus {
    /// Creates a new PostgreSQL event bus with the default retry policy.
    pub fn new(pool: PgPool) -> Self {
        Self::with_policy(pool, RetryPolicy::default())
    }

    /// Creates a new PostgreSQL event bus with the given retry policy.
    pub fn with_policy(pool: PgPool, policy: RetryPolicy) -> Self {
        Self { pool, policy }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn ensure_queue(&self, queue: &str) -> Result<()> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM bus_queues WHERE name = $1)")
                .bind(queue)
                .fetch_one(&self.pool)
                .await?;

        if exists {
            Ok(())
        } else {
            Err(BusError::UnknownQueue(queue.to_string()))
        }
    }

    fn row_to_envelope(row: &PgRow) -> Result<EventEnvelope> {
        let metadata_json: serde_json::Value = row.try_get("metadata")?;
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_value(metadata_json)?;
        let schema_version: i32 = row.try_get("schema_version")?;

        Ok(EventEnvelope {
            event_id: EventId::from_uuid(row.try_get::<Uuid, _>("event_id")?),
            event_type: row.try_get("event_type")?,
            schema_version: u16::try_from(schema_version)
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            occurred_at: row.try_get("occurred_at")?,
            payload: row.try_get("payload")?,
            metadata,
        })
    }

    /// Dead-letters messages whose last allowed lease ran out unsettled.
    async fn dead_letter_expired(&self, queue: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE bus_messages
            SET status = 'dead', last_error = $3, dead_lettered_at = NOW(),
                lease_token = NULL, leased_until = NULL
            WHERE queue = $1
              AND status = 'leased'
              AND leased_until <= NOW()
              AND deliveries >= $2
            "#,
        )
        .bind(queue)
        .bind(self.max_attempts())
        .bind(LEASE_EXPIRED)
        .execute(&self.pool)
        .await?;

        let expired = result.rows_affected();
        if expired > 0 {
            tracing::error!(
                queue,
                count = expired,
                "leases expired on last attempt, messages dead-lettered"
            );
            metrics::counter!("bus_messages_dead_lettered_total").increment(expired);
        }
        Ok(())
    }

    fn max_attempts(&self) -> i32 {
        i32::try_from(self.policy.max_attempts).unwrap_or(i32::MAX)
    }

    fn deliveries(row: &PgRow) -> Result<u32> {
        let deliveries: i32 = row.try_get("deliveries")?;
        Ok(u32::try_from(deliveries).map_err(|e| sqlx::Error::Decode(Box::new(e)))?)
    }
}

#[async_trait]
impl EventBus for PostgresEventBus {
    async fn bind(&self, queue: &str, event_types: &[&str]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO bus_queues (name) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(queue)
            .execute(&mut *tx)
            .await?;

        for event_type in event_types {
            sqlx::query(
                "INSERT INTO bus_bindings (queue, event_type) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(queue)
            .bind(event_type)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn publish(&self, envelope: EventEnvelope) -> Result<usize> {
        let metadata_json = serde_json::to_value(&envelope.metadata)?;

        let result = sqlx::query(
            r#"
            INSERT INTO bus_messages
                (queue, event_id, event_type, schema_version, occurred_at, payload, metadata)
            SELECT b.queue, $1, $2, $3, $4, $5, $6
            FROM bus_bindings b
            WHERE b.event_type = $2
            "#,
        )
        .bind(envelope.event_id.as_uuid())
        .bind(&envelope.event_type)
        .bind(i32::from(envelope.schema_version))
        .bind(envelope.occurred_at)
        .bind(&envelope.payload)
        .bind(metadata_json)
        .execute(&self.pool)
        .await?;

        let routed = result.rows_affected() as usize;
        if routed == 0 {
            tracing::warn!(
                event_type = %envelope.event_type,
                event_id = %envelope.event_id,
                "no queue bound for event type, message dropped"
            );
        }
        metrics::counter!("bus_messages_published_total").increment(1);

        Ok(routed)
    }

    async fn receive(&self, queue: &str) -> Result<Option<Delivery>> {
        self.dead_letter_expired(queue).await?;

        let row = sqlx::query(
            r#"
            UPDATE bus_messages
            SET status = 'leased',
                deliveries = deliveries + 1,
                leased_until = NOW() + make_interval(secs => $2),
                lease_token = nextval('bus_lease_tokens')
            WHERE id = (
                SELECT id FROM bus_messages
                WHERE queue = $1
                  AND (
                    (status = 'ready' AND available_at <= NOW())
                    OR (status = 'leased' AND leased_until <= NOW() AND deliveries < $3)
                  )
                ORDER BY available_at ASC, id ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING lease_token, deliveries, event_id, event_type, schema_version,
                      occurred_at, payload, metadata
            "#,
        )
        .bind(queue)
        .bind(self.policy.visibility_timeout.as_secs_f64())
        .bind(self.max_attempts())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            self.ensure_queue(queue).await?;
            return Ok(None);
        };

        Ok(Some(Delivery {
            tag: DeliveryTag::new(row.try_get("lease_token")?),
            queue: queue.to_string(),
            attempt: Self::deliveries(&row)?,
            envelope: Self::row_to_envelope(&row)?,
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let result = sqlx::query(
            "DELETE FROM bus_messages WHERE queue = $1 AND lease_token = $2 AND status = 'leased'",
        )
        .bind(&delivery.queue)
        .bind(delivery.tag.as_i64())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            self.ensure_queue(&delivery.queue).await?;
            return Err(BusError::UnknownDelivery {
                queue: delivery.queue.clone(),
                tag: delivery.tag,
            });
        }

        metrics::counter!("bus_messages_acked_total").increment(1);
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, reason: &str) -> Result<NackOutcome> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT deliveries FROM bus_messages
            WHERE queue = $1 AND lease_token = $2 AND status = 'leased'
            FOR UPDATE
            "#,
        )
        .bind(&delivery.queue)
        .bind(delivery.tag.as_i64())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            self.ensure_queue(&delivery.queue).await?;
            return Err(BusError::UnknownDelivery {
                queue: delivery.queue.clone(),
                tag: delivery.tag,
            });
        };
        let deliveries = Self::deliveries(&row)?;

        let outcome = if self.policy.is_exhausted(deliveries) {
            sqlx::query(
                r#"
                UPDATE bus_messages
                SET status = 'dead', last_error = $3, dead_lettered_at = NOW(),
                    lease_token = NULL, leased_until = NULL
                WHERE queue = $1 AND lease_token = $2
                "#,
            )
            .bind(&delivery.queue)
            .bind(delivery.tag.as_i64())
            .bind(reason)
            .execute(&mut *tx)
            .await?;
            metrics::counter!("bus_messages_dead_lettered_total").increment(1);
            NackOutcome::DeadLettered
        } else {
            let delay = self.policy.backoff_for(deliveries);
            sqlx::query(
                r#"
                UPDATE bus_messages
                SET status = 'ready', last_error = $3,
                    available_at = NOW() + make_interval(secs => $4),
                    lease_token = NULL, leased_until = NULL
                WHERE queue = $1 AND lease_token = $2
                "#,
            )
            .bind(&delivery.queue)
            .bind(delivery.tag.as_i64())
            .bind(reason)
            .bind(delay.as_secs_f64())
            .execute(&mut *tx)
            .await?;
            metrics::counter!("bus_messages_redelivered_total").increment(1);
            NackOutcome::Requeued { delay }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    async fn dead_letters(&self, queue: &str) -> Result<Vec<DeadLetter>> {
        self.ensure_queue(queue).await?;

        let rows = sqlx::query(
            r#"
            SELECT deliveries, event_id, event_type, schema_version, occurred_at, payload,
                   metadata, last_error, dead_lettered_at
            FROM bus_messages
            WHERE queue = $1 AND status = 'dead'
            ORDER BY dead_lettered_at ASC, id ASC
            "#,
        )
        .bind(queue)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let last_error: Option<String> = row.try_get("last_error")?;
                let dead_lettered_at: Option<DateTime<Utc>> = row.try_get("dead_lettered_at")?;
                Ok(DeadLetter {
                    queue: queue.to_string(),
                    envelope: Self::row_to_envelope(row)?,
                    attempts: Self::deliveries(row)?,
                    last_error: last_error.unwrap_or_default(),
                    dead_lettered_at: dead_lettered_at.unwrap_or_else(Utc::now),
                })
            })
            .collect()
    }

    async fn pending_count(&self, queue: &str) -> Result<usize> {
        self.ensure_queue(queue).await?;

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM bus_messages WHERE queue = $1 AND status IN ('ready', 'leased')",
        )
        .bind(queue)
        .fetch_one(&self.pool)
        .await?;

        Ok(count as usize)
    }
}
