//! SQLite archive of terminal orders
//!
//! The active book lives in the snapshot file; orders leaving it after the
//! retention window are preserved here for history queries and metrics.

use crate::error::XBridgeError;
use crate::order::{Order, OrderState};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, Row};
use std::str::FromStr;

/// Database connection pool
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, XBridgeError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| XBridgeError::Database(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| XBridgeError::Database(e.to_string()))?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), XBridgeError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| XBridgeError::Database(format!("Migration failed: {}", e)))?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// Order archive repository
impl Database {
    /// Insert or refresh an archived order.
    pub async fn archive_order(&self, record: &OrderRecord) -> Result<(), XBridgeError> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO orders (
                id, maker_pubkey, taker_pubkey, from_currency, from_amount,
                to_currency, to_amount, state, reason, secret_hash,
                maker_lock_time, taker_lock_time,
                maker_deposit_txid, taker_deposit_txid,
                taker_claim_txid, maker_claim_txid,
                maker_refund_txid, taker_refund_txid,
                created_at, updated_at, archived_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.maker_pubkey)
        .bind(&record.taker_pubkey)
        .bind(&record.from_currency)
        .bind(record.from_amount)
        .bind(&record.to_currency)
        .bind(record.to_amount)
        .bind(&record.state)
        .bind(&record.reason)
        .bind(&record.secret_hash)
        .bind(record.maker_lock_time)
        .bind(record.taker_lock_time)
        .bind(&record.maker_deposit_txid)
        .bind(&record.taker_deposit_txid)
        .bind(&record.taker_claim_txid)
        .bind(&record.maker_claim_txid)
        .bind(&record.maker_refund_txid)
        .bind(&record.taker_refund_txid)
        .bind(&record.created_at)
        .bind(&record.updated_at)
        .bind(&record.archived_at)
        .execute(&self.pool)
        .await
        .map_err(|e| XBridgeError::Database(e.to_string()))?;

        Ok(())
    }

    pub async fn get_order(&self, id: &str) -> Result<Option<OrderRecord>, XBridgeError> {
        let result = sqlx::query_as::<_, OrderRecord>(
            r#"
            SELECT id, maker_pubkey, taker_pubkey, from_currency, from_amount,
                   to_currency, to_amount, state, reason, secret_hash,
                   maker_lock_time, taker_lock_time,
                   maker_deposit_txid, taker_deposit_txid,
                   taker_claim_txid, maker_claim_txid,
                   maker_refund_txid, taker_refund_txid,
                   created_at, updated_at, archived_at
            FROM orders
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| XBridgeError::Database(e.to_string()))?;

        Ok(result)
    }

    /// List archived orders, newest first, optionally filtered by state.
    pub async fn list_orders(
        &self,
        state: Option<OrderState>,
        limit: i64,
    ) -> Result<Vec<OrderRecord>, XBridgeError> {
        let query = if let Some(state) = state {
            sqlx::query_as::<_, OrderRecord>(
                r#"
                SELECT id, maker_pubkey, taker_pubkey, from_currency, from_amount,
                       to_currency, to_amount, state, reason, secret_hash,
                       maker_lock_time, taker_lock_time,
                       maker_deposit_txid, taker_deposit_txid,
                       taker_claim_txid, maker_claim_txid,
                       maker_refund_txid, taker_refund_txid,
                       created_at, updated_at, archived_at
                FROM orders
                WHERE state = ?
                ORDER BY created_at DESC
                LIMIT ?
                "#,
            )
            .bind(state.to_string())
            .bind(limit)
        } else {
            sqlx::query_as::<_, OrderRecord>(
                r#"
                SELECT id, maker_pubkey, taker_pubkey, from_currency, from_amount,
                       to_currency, to_amount, state, reason, secret_hash,
                       maker_lock_time, taker_lock_time,
                       maker_deposit_txid, taker_deposit_txid,
                       taker_claim_txid, maker_claim_txid,
                       maker_refund_txid, taker_refund_txid,
                       created_at, updated_at, archived_at
                FROM orders
                ORDER BY created_at DESC
                LIMIT ?
                "#,
            )
            .bind(limit)
        };

        let orders = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| XBridgeError::Database(e.to_string()))?;

        Ok(orders)
    }

    /// Counts and volume by state, for the metrics surface.
    pub async fn stats(&self) -> Result<ArchiveStats, XBridgeError> {
        let rows = sqlx::query(
            r#"
            SELECT state, COUNT(*) AS orders, COALESCE(SUM(from_amount), 0) AS volume
            FROM orders
            GROUP BY state
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| XBridgeError::Database(e.to_string()))?;

        let mut stats = ArchiveStats::default();
        for row in rows {
            let state: String = row
                .try_get("state")
                .map_err(|e| XBridgeError::Database(e.to_string()))?;
            let orders: i64 = row
                .try_get("orders")
                .map_err(|e| XBridgeError::Database(e.to_string()))?;
            let volume: i64 = row
                .try_get("volume")
                .map_err(|e| XBridgeError::Database(e.to_string()))?;

            stats.total += orders as u64;
            match state.as_str() {
                "finished" => {
                    stats.finished = orders as u64;
                    stats.finished_volume = volume as u64;
                }
                "rolled_back" => stats.rolled_back = orders as u64,
                "cancelled" => stats.cancelled = orders as u64,
                _ => {}
            }
        }
        Ok(stats)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArchiveStats {
    pub total: u64,
    pub finished: u64,
    pub rolled_back: u64,
    pub cancelled: u64,
    pub finished_volume: u64,
}

// Database models
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: String,
    pub maker_pubkey: String,
    pub taker_pubkey: String,
    pub from_currency: String,
    pub from_amount: i64,
    pub to_currency: String,
    pub to_amount: i64,
    pub state: String,
    pub reason: Option<String>,
    pub secret_hash: Option<String>,
    pub maker_lock_time: i64,
    pub taker_lock_time: i64,
    pub maker_deposit_txid: Option<String>,
    pub taker_deposit_txid: Option<String>,
    pub taker_claim_txid: Option<String>,
    pub maker_claim_txid: Option<String>,
    pub maker_refund_txid: Option<String>,
    pub taker_refund_txid: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub archived_at: String,
}

impl From<&Order> for OrderRecord {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.to_string(),
            maker_pubkey: hex::encode(&order.maker_pubkey),
            taker_pubkey: hex::encode(&order.taker_pubkey),
            from_currency: order.from_symbol.clone(),
            from_amount: order.from_amount as i64,
            to_currency: order.to_symbol.clone(),
            to_amount: order.to_amount as i64,
            state: order.state.to_string(),
            reason: order.reason.map(|r| r.to_string()),
            secret_hash: order.secret_hash.map(hex::encode),
            maker_lock_time: order.maker_lock_time as i64,
            taker_lock_time: order.taker_lock_time as i64,
            maker_deposit_txid: order.maker_deposit_txid.clone(),
            taker_deposit_txid: order.taker_deposit_txid.clone(),
            taker_claim_txid: order.taker_claim_txid.clone(),
            maker_claim_txid: order.maker_claim_txid.clone(),
            maker_refund_txid: order.maker_refund_txid.clone(),
            taker_refund_txid: order.taker_refund_txid.clone(),
            created_at: order.created_at.to_rfc3339(),
            updated_at: order.updated_at.to_rfc3339(),
            archived_at: Utc::now().to_rfc3339(),
        }
    }
}

// Manual FromRow implementation for OrderRecord
impl FromRow<'_, sqlx::sqlite::SqliteRow> for OrderRecord {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Self> {
        Ok(OrderRecord {
            id: row.try_get("id")?,
            maker_pubkey: row.try_get("maker_pubkey")?,
            taker_pubkey: row.try_get("taker_pubkey")?,
            from_currency: row.try_get("from_currency")?,
            from_amount: row.try_get("from_amount")?,
            to_currency: row.try_get("to_currency")?,
            to_amount: row.try_get("to_amount")?,
            state: row.try_get("state")?,
            reason: row.try_get("reason")?,
            secret_hash: row.try_get("secret_hash")?,
            maker_lock_time: row.try_get("maker_lock_time")?,
            taker_lock_time: row.try_get("taker_lock_time")?,
            maker_deposit_txid: row.try_get("maker_deposit_txid")?,
            taker_deposit_txid: row.try_get("taker_deposit_txid")?,
            taker_claim_txid: row.try_get("taker_claim_txid")?,
            maker_claim_txid: row.try_get("maker_claim_txid")?,
            maker_refund_txid: row.try_get("maker_refund_txid")?,
            taker_refund_txid: row.try_get("taker_refund_txid")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            archived_at: row.try_get("archived_at")?,
        })
    }
}
