//! SQLite-backed order store.
//!
//! Orders live in a single table keyed by order id. A JSON seed file can
//! populate an empty database on first start.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

use super::{OrderRecord, OrderStore};
use crate::core::config::AppPaths;
use crate::core::errors::ApiError;

pub struct SqliteOrderStore {
    pool: SqlitePool,
    #[allow(dead_code)]
    db_path: PathBuf,
}

impl SqliteOrderStore {
    pub async fn new(paths: &AppPaths) -> Result<Self, ApiError> {
        Self::with_path(paths.orders_db_path.clone()).await
    }

    pub async fn with_path(db_path: PathBuf) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(ApiError::internal)?;

        let store = Self { pool, db_path };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), ApiError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS orders (
                order_id TEXT PRIMARY KEY,
                customer_id TEXT NOT NULL,
                customer_name TEXT NOT NULL,
                customer_email TEXT NOT NULL,
                product_name TEXT NOT NULL,
                product_sku TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                price REAL NOT NULL,
                order_date TEXT NOT NULL,
                status TEXT NOT NULL,
                shipping_address TEXT NOT NULL,
                tracking_number TEXT,
                return_eligible INTEGER NOT NULL DEFAULT 0,
                warranty_status TEXT NOT NULL DEFAULT '',
                notes TEXT
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_orders_customer ON orders(customer_id)")
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(())
    }

    /// Inserts seed records when the table is empty. A missing or unreadable
    /// seed file leaves the store empty rather than failing startup.
    pub async fn seed_from_file(&self, seed_path: &Path) -> Result<usize, ApiError> {
        if self.count().await? > 0 || !seed_path.exists() {
            return Ok(0);
        }

        let raw = match std::fs::read_to_string(seed_path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("could not read order seed {}: {}", seed_path.display(), err);
                return Ok(0);
            }
        };
        let records: Vec<OrderRecord> = match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(err) => {
                warn!("invalid order seed {}: {}", seed_path.display(), err);
                return Ok(0);
            }
        };

        for record in &records {
            self.insert(record).await?;
        }
        info!("seeded {} orders from {}", records.len(), seed_path.display());
        Ok(records.len())
    }

    fn row_to_order(row: &sqlx::sqlite::SqliteRow) -> OrderRecord {
        OrderRecord {
            order_id: row.get("order_id"),
            customer_id: row.get("customer_id"),
            customer_name: row.get("customer_name"),
            customer_email: row.get("customer_email"),
            product_name: row.get("product_name"),
            product_sku: row.get("product_sku"),
            quantity: row.get("quantity"),
            price: row.get("price"),
            order_date: row.get("order_date"),
            status: row.get("status"),
            shipping_address: row.get("shipping_address"),
            tracking_number: row.get("tracking_number"),
            return_eligible: row.get("return_eligible"),
            warranty_status: row.get("warranty_status"),
            notes: row.get("notes"),
        }
    }

    fn normalize_id(order_id: &str) -> String {
        order_id.trim().to_uppercase()
    }
}

#[async_trait]
impl OrderStore for SqliteOrderStore {
    async fn get_by_id(&self, order_id: &str) -> Result<Option<OrderRecord>, ApiError> {
        let normalized = Self::normalize_id(order_id);
        if normalized.is_empty() {
            return Ok(None);
        }

        let row = sqlx::query("SELECT * FROM orders WHERE UPPER(order_id) = ?1")
            .bind(&normalized)
            .fetch_optional(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(row.as_ref().map(Self::row_to_order))
    }

    async fn get_by_customer(&self, customer_id: &str) -> Result<Vec<OrderRecord>, ApiError> {
        let rows = sqlx::query("SELECT * FROM orders WHERE customer_id = ?1 ORDER BY rowid")
            .bind(customer_id.trim())
            .fetch_all(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(rows.iter().map(Self::row_to_order).collect())
    }

    async fn update_status(&self, order_id: &str, status: &str) -> Result<bool, ApiError> {
        let result = sqlx::query("UPDATE orders SET status = ?2 WHERE UPPER(order_id) = ?1")
            .bind(Self::normalize_id(order_id))
            .bind(status)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert(&self, order: &OrderRecord) -> Result<(), ApiError> {
        sqlx::query(
            "INSERT OR REPLACE INTO orders (
                order_id, customer_id, customer_name, customer_email,
                product_name, product_sku, quantity, price,
                order_date, status, shipping_address, tracking_number,
                return_eligible, warranty_status, notes
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        )
        .bind(&order.order_id)
        .bind(&order.customer_id)
        .bind(&order.customer_name)
        .bind(&order.customer_email)
        .bind(&order.product_name)
        .bind(&order.product_sku)
        .bind(order.quantity)
        .bind(order.price)
        .bind(&order.order_date)
        .bind(&order.status)
        .bind(&order.shipping_address)
        .bind(&order.tracking_number)
        .bind(order.return_eligible)
        .bind(&order.warranty_status)
        .bind(&order.notes)
        .execute(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        Ok(())
    }

    async fn count(&self) -> Result<u64, ApiError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM orders")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        let n: i64 = row.get("n");
        Ok(n as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::sample_order;

    async fn test_store() -> SqliteOrderStore {
        let tmp = std::env::temp_dir().join(format!(
            "policydesk-orders-test-{}.db",
            uuid::Uuid::new_v4()
        ));
        SqliteOrderStore::with_path(tmp).await.unwrap()
    }

    #[tokio::test]
    async fn insert_and_lookup_normalizes_id() {
        let store = test_store().await;
        store.insert(&sample_order("ORD001", "CUST100")).await.unwrap();

        let found = store.get_by_id("  ord001 ").await.unwrap().unwrap();
        assert_eq!(found.order_id, "ORD001");
        assert_eq!(found.product_name, "GeForce RTX 4070 Graphics Card");
        assert!(found.return_eligible);

        assert!(store.get_by_id("ORD999").await.unwrap().is_none());
        assert!(store.get_by_id("   ").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn customer_orders_keep_insertion_order() {
        let store = test_store().await;
        store.insert(&sample_order("ORD001", "CUST100")).await.unwrap();
        store.insert(&sample_order("ORD002", "CUST100")).await.unwrap();
        store.insert(&sample_order("ORD003", "CUST200")).await.unwrap();

        let orders = store.get_by_customer("CUST100").await.unwrap();
        let ids: Vec<&str> = orders.iter().map(|o| o.order_id.as_str()).collect();
        assert_eq!(ids, vec!["ORD001", "ORD002"]);
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn update_status_reports_missing_orders() {
        let store = test_store().await;
        store.insert(&sample_order("ORD001", "CUST100")).await.unwrap();

        assert!(store.update_status("ord001", "delivered").await.unwrap());
        let updated = store.get_by_id("ORD001").await.unwrap().unwrap();
        assert_eq!(updated.status, "delivered");

        assert!(!store.update_status("ORD999", "delivered").await.unwrap());
    }

    #[tokio::test]
    async fn seeds_only_an_empty_store() {
        let store = test_store().await;
        let seed_path = std::env::temp_dir().join(format!(
            "policydesk-seed-test-{}.json",
            uuid::Uuid::new_v4()
        ));
        let records = vec![sample_order("ORD001", "CUST100"), sample_order("ORD002", "CUST100")];
        std::fs::write(&seed_path, serde_json::to_string(&records).unwrap()).unwrap();

        assert_eq!(store.seed_from_file(&seed_path).await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 2);

        assert_eq!(store.seed_from_file(&seed_path).await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 2);

        std::fs::remove_file(&seed_path).ok();
    }

    #[tokio::test]
    async fn invalid_seed_file_is_ignored() {
        let store = test_store().await;
        let seed_path = std::env::temp_dir().join(format!(
            "policydesk-badseed-test-{}.json",
            uuid::Uuid::new_v4()
        ));
        std::fs::write(&seed_path, "not json").unwrap();

        assert_eq!(store.seed_from_file(&seed_path).await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 0);

        std::fs::remove_file(&seed_path).ok();
    }
}
