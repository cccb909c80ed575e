//! Local product catalog.
//!
//! SQLite-backed read/write store for previously discovered products.
//! Search is best-effort: a failed query logs and returns an empty list so
//! the external fallback chain still runs. Writes are advisory; callers on
//! the resolution path catch and log failures instead of propagating them.

use log::warn;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::error::ResolveError;
use crate::model::{Product, Source};

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    brand TEXT,
    barcode TEXT,
    calories_per_100g REAL NOT NULL DEFAULT 0,
    protein_per_100g REAL NOT NULL DEFAULT 0,
    fats_per_100g REAL NOT NULL DEFAULT 0,
    carbs_per_100g REAL NOT NULL DEFAULT 0,
    source TEXT NOT NULL,
    source_id TEXT,
    image_url TEXT,
    usage_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)"#,
    "CREATE INDEX IF NOT EXISTS idx_products_name ON products(name)",
    "CREATE INDEX IF NOT EXISTS idx_products_natural_key ON products(source, source_id)",
    "CREATE INDEX IF NOT EXISTS idx_products_barcode ON products(barcode)",
];

async fn create_schema(pool: &SqlitePool) -> Result<(), ResolveError> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

const PRODUCT_COLUMNS: &str = "id, name, brand, barcode, calories_per_100g, protein_per_100g, \
     fats_per_100g, carbs_per_100g, source, source_id, image_url";

/// Client for the persistent product catalog.
#[derive(Clone)]
pub struct LocalStore {
    pool: SqlitePool,
}

impl LocalStore {
    /// Connect to the catalog and create the schema if missing.
    pub async fn connect(database_url: &str) -> Result<Self, ResolveError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        create_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory catalog. A single connection is pinned open because each
    /// `:memory:` connection is its own database.
    pub async fn in_memory() -> Result<Self, ResolveError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        create_schema(&pool).await?;
        Ok(Self { pool })
    }

    /// Case-insensitive substring search over name and brand, most-used
    /// first, then most recent. Never fails: errors are logged and an empty
    /// list is returned so external lookups still get their chance.
    pub async fn search(&self, query: &str, limit: u32) -> Vec<Product> {
        let pattern = format!("%{}%", query.trim());
        let sql = format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE name LIKE ?1 COLLATE NOCASE OR brand LIKE ?1 COLLATE NOCASE \
             ORDER BY usage_count DESC, created_at DESC, id DESC LIMIT ?2"
        );
        match sqlx::query_as::<_, Product>(&sql)
            .bind(&pattern)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
        {
            Ok(products) => products,
            Err(e) => {
                warn!("local search failed for {query:?}: {e}");
                Vec::new()
            }
        }
    }

    /// Row id for a `(source, source_id)` natural key, if present.
    pub async fn find_by_natural_key(
        &self,
        source: Source,
        source_id: &str,
    ) -> Result<Option<i64>, ResolveError> {
        let id = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM products WHERE source = ?1 AND source_id = ?2 LIMIT 1",
        )
        .bind(source)
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    /// Row id for a barcode, if present.
    pub async fn find_by_barcode(&self, barcode: &str) -> Result<Option<i64>, ResolveError> {
        let id = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM products WHERE barcode = ?1 LIMIT 1",
        )
        .bind(barcode)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    /// Full row for a barcode; the barcode resolution flow returns this
    /// directly without touching the network.
    pub async fn get_by_barcode(&self, barcode: &str) -> Result<Option<Product>, ResolveError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE barcode = ?1 LIMIT 1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(barcode)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    /// Insert a product and return its new row id.
    pub async fn insert(&self, product: &Product) -> Result<i64, ResolveError> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO products (name, brand, barcode, calories_per_100g, protein_per_100g, \
             fats_per_100g, carbs_per_100g, source, source_id, image_url) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) RETURNING id",
        )
        .bind(&product.name)
        .bind(&product.brand)
        .bind(&product.barcode)
        .bind(product.calories_per_100g)
        .bind(product.protein_per_100g)
        .bind(product.fats_per_100g)
        .bind(product.carbs_per_100g)
        .bind(product.source)
        .bind(&product.source_id)
        .bind(&product.image_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Bump the usage counter for one row.
    pub async fn increment_usage(&self, id: i64) -> Result<(), ResolveError> {
        sqlx::query("UPDATE products SET usage_count = usage_count + 1 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Persist a freshly discovered product unless its natural key (or
    /// barcode) already exists; an existing row gets a usage bump instead of
    /// a duplicate. Check-then-insert, not an atomic upsert; the race between
    /// two identical concurrent write-backs is accepted.
    pub async fn save_if_new(&self, product: &Product) -> Result<i64, ResolveError> {
        let existing = match (&product.source_id, &product.barcode) {
            (Some(source_id), _) => {
                self.find_by_natural_key(product.source, source_id).await?
            }
            (None, Some(barcode)) => self.find_by_barcode(barcode).await?,
            (None, None) => None,
        };

        if let Some(id) = existing {
            self.increment_usage(id).await?;
            return Ok(id);
        }

        self.insert(product).await
    }

    /// Current usage counter for one row.
    #[cfg(test)]
    pub(crate) async fn usage_count(&self, id: i64) -> Result<i64, ResolveError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT usage_count FROM products WHERE id = ?1")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }
}
