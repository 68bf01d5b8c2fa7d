use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, OutboxMessageId, PaymentId, SagaId};
use domain::{CreditEntry, CreditHistory, Money, Payment, PaymentStatus};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    OutboxMessage, OutboxStatus, PublishableQuery, Result, StoreError,
    store::{
        CreditEntryRepository, CreditHistoryRepository, OutboxRepository, PaymentRepository,
        PaymentStore, UnitOfWork,
    },
};

/// Name of the unique index over (type, saga_id, payment_status).
const OUTBOX_SAGA_KEY: &str = "order_outbox_saga_key";

const OUTBOX_COLUMNS: &str = "id, saga_id, type, created_at, processed_at, payload, \
     outbox_status, payment_status, attempts, version";

/// PostgreSQL-backed payment store implementation.
#[derive(Clone)]
pub struct PostgresPaymentStore {
    pool: PgPool,
}

impl PostgresPaymentStore {
    /// Creates a new PostgreSQL payment store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        Ok(Self::new(PgPool::connect(database_url).await?))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for PostgresPaymentStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }
}

/// Unit of work backed by a database transaction.
///
/// Dropping it without committing rolls the transaction back.
pub struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

fn parse_column<T: std::str::FromStr>(column: &'static str, value: String) -> Result<T> {
    value
        .parse()
        .map_err(|_| StoreError::InvalidColumn { column, value })
}

fn row_to_payment(row: PgRow) -> Result<Payment> {
    Ok(Payment::from_parts(
        PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
        OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
        Money::new(row.try_get::<Decimal, _>("price")?),
        row.try_get("created_at")?,
        parse_column("status", row.try_get("status")?)?,
    ))
}

fn row_to_credit_entry(row: PgRow) -> Result<CreditEntry> {
    Ok(CreditEntry::from_parts(
        row.try_get("id")?,
        CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
        Money::new(row.try_get::<Decimal, _>("total_credit_amount")?),
    ))
}

fn row_to_credit_history(row: PgRow) -> Result<CreditHistory> {
    Ok(CreditHistory {
        id: row.try_get("id")?,
        customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
        amount: Money::new(row.try_get::<Decimal, _>("amount")?),
        transaction_type: parse_column("type", row.try_get("type")?)?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_outbox(row: PgRow) -> Result<OutboxMessage> {
    Ok(OutboxMessage {
        id: OutboxMessageId::from_uuid(row.try_get::<Uuid, _>("id")?),
        saga_id: SagaId::from_uuid(row.try_get::<Uuid, _>("saga_id")?),
        saga_type: row.try_get("type")?,
        created_at: row.try_get("created_at")?,
        processed_at: row.try_get("processed_at")?,
        payload: row.try_get("payload")?,
        outbox_status: parse_column("outbox_status", row.try_get("outbox_status")?)?,
        payment_status: parse_column("payment_status", row.try_get("payment_status")?)?,
        attempts: row.try_get("attempts")?,
        version: row.try_get("version")?,
    })
}

#[async_trait]
impl PaymentRepository for PostgresUnitOfWork {
    async fn save_payment(&mut self, payment: &Payment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, customer_id, order_id, price, created_at, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET price = EXCLUDED.price, status = EXCLUDED.status
            "#,
        )
        .bind(payment.id().as_uuid())
        .bind(payment.customer_id().as_uuid())
        .bind(payment.order_id().as_uuid())
        .bind(payment.price().amount())
        .bind(payment.created_at())
        .bind(payment.status().as_str())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn find_payment_by_order_id(&mut self, order_id: OrderId) -> Result<Option<Payment>> {
        let row = sqlx::query(
            r#"
            SELECT id, customer_id, order_id, price, created_at, status
            FROM payments
            WHERE order_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_payment).transpose()
    }
}

#[async_trait]
impl CreditEntryRepository for PostgresUnitOfWork {
    async fn save_credit_entry(&mut self, entry: &CreditEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO credit_entry (id, customer_id, total_credit_amount)
            VALUES ($1, $2, $3)
            ON CONFLICT (customer_id) DO UPDATE SET total_credit_amount = EXCLUDED.total_credit_amount
            "#,
        )
        .bind(entry.id)
        .bind(entry.customer_id.as_uuid())
        .bind(entry.total_credit_amount().amount())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn find_credit_entry_by_customer_id(
        &mut self,
        customer_id: CustomerId,
    ) -> Result<Option<CreditEntry>> {
        let row = sqlx::query(
            r#"
            SELECT id, customer_id, total_credit_amount
            FROM credit_entry
            WHERE customer_id = $1
            FOR UPDATE
            "#,
        )
        .bind(customer_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_credit_entry).transpose()
    }
}

#[async_trait]
impl CreditHistoryRepository for PostgresUnitOfWork {
    async fn save_credit_history(&mut self, history: &CreditHistory) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO credit_history (id, customer_id, amount, type, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(history.id)
        .bind(history.customer_id.as_uuid())
        .bind(history.amount.amount())
        .bind(history.transaction_type.as_str())
        .bind(history.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn find_credit_history_by_customer_id(
        &mut self,
        customer_id: CustomerId,
    ) -> Result<Option<Vec<CreditHistory>>> {
        let rows = sqlx::query(
            r#"
            SELECT id, customer_id, amount, type, created_at
            FROM credit_history
            WHERE customer_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(customer_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }
        rows.into_iter()
            .map(row_to_credit_history)
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }
}

#[async_trait]
impl OutboxRepository for PostgresUnitOfWork {
    async fn lock_saga(&mut self, saga_type: &str, saga_id: SagaId) -> Result<()> {
        // Released automatically at commit or rollback.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(format!("{saga_type}:{saga_id}"))
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn find_outbox_by_saga_id_and_type(
        &mut self,
        saga_type: &str,
        saga_id: SagaId,
        payment_statuses: &[PaymentStatus],
    ) -> Result<Option<OutboxMessage>> {
        let statuses: Vec<String> = payment_statuses
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        let row = sqlx::query(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM order_outbox \
             WHERE type = $1 AND saga_id = $2 AND payment_status = ANY($3) \
             ORDER BY created_at ASC LIMIT 1"
        ))
        .bind(saga_type)
        .bind(saga_id.as_uuid())
        .bind(statuses)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_outbox).transpose()
    }

    async fn find_outbox_by_outbox_status(
        &mut self,
        saga_type: &str,
        outbox_status: OutboxStatus,
    ) -> Result<Vec<OutboxMessage>> {
        let rows = sqlx::query(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM order_outbox \
             WHERE type = $1 AND outbox_status = $2 \
             ORDER BY created_at ASC"
        ))
        .bind(saga_type)
        .bind(outbox_status.as_str())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_outbox).collect()
    }

    async fn find_publishable_outbox(
        &mut self,
        query: &PublishableQuery,
    ) -> Result<Vec<OutboxMessage>> {
        let rows = sqlx::query(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM order_outbox \
             WHERE type = $1 AND attempts < $2 \
               AND ((outbox_status = 'STARTED' AND (processed_at IS NULL OR processed_at < $3)) \
                    OR outbox_status = 'FAILED') \
             ORDER BY created_at ASC \
             LIMIT $4"
        ))
        .bind(&query.saga_type)
        .bind(query.max_attempts)
        .bind(query.stale_before)
        .bind(query.limit as i64)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_outbox).collect()
    }

    async fn save_outbox_message(&mut self, message: &OutboxMessage) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO order_outbox ({OUTBOX_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(message.id.as_uuid())
        .bind(message.saga_id.as_uuid())
        .bind(&message.saga_type)
        .bind(message.created_at)
        .bind(message.processed_at)
        .bind(&message.payload)
        .bind(message.outbox_status.as_str())
        .bind(message.payment_status.as_str())
        .bind(message.attempts)
        .bind(message.version)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some(OUTBOX_SAGA_KEY)
            {
                tracing::debug!(
                    saga_id = %message.saga_id,
                    payment_status = %message.payment_status,
                    "outbox key already taken"
                );
                return StoreError::DuplicateOutboxMessage {
                    saga_type: message.saga_type.clone(),
                    saga_id: message.saga_id,
                    payment_status: message.payment_status,
                };
            }
            StoreError::Database(e)
        })?;
        Ok(())
    }

    async fn claim_outbox_message(
        &mut self,
        id: OutboxMessageId,
        expected_version: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<OutboxMessage>> {
        let row = sqlx::query(&format!(
            "UPDATE order_outbox \
             SET outbox_status = 'STARTED', processed_at = $3, \
                 attempts = attempts + 1, version = version + 1 \
             WHERE id = $1 AND version = $2 AND outbox_status IN ('STARTED', 'FAILED') \
             RETURNING {OUTBOX_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(expected_version)
        .bind(now)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_outbox).transpose()
    }

    async fn update_outbox_status(
        &mut self,
        id: OutboxMessageId,
        expected_version: i32,
        from: OutboxStatus,
        to: OutboxStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE order_outbox
            SET outbox_status = $4, version = version + 1
            WHERE id = $1 AND version = $2 AND outbox_status = $3 AND outbox_status <> 'COMPLETED'
            "#,
        )
        .bind(id.as_uuid())
        .bind(expected_version)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_outbox_older_than(
        &mut self,
        saga_type: &str,
        older_than: DateTime<Utc>,
        max_attempts: i32,
        limit: usize,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM order_outbox
            WHERE id IN (
                SELECT id FROM order_outbox
                WHERE type = $1
                  AND created_at < $2
                  AND (outbox_status = 'COMPLETED'
                       OR (outbox_status = 'FAILED' AND attempts >= $3))
                ORDER BY created_at ASC
                LIMIT $4
            )
            "#,
        )
        .bind(saga_type)
        .bind(older_than)
        .bind(max_attempts)
        .bind(limit as i64)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
