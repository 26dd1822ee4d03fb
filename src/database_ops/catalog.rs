//! Catalog persistence: libraries, items and content descriptors.
//!
//! Reads go straight to the pool. Anything that touches more than one row on
//! behalf of a single item goes through [`CatalogTx`], which rolls back when
//! dropped without [`CatalogTx::commit`].
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqliteConnection, Transaction};
use thiserror::Error;
use tracing::{debug, instrument};

use super::db::Db;
use crate::scoring::{DiscountInfo, LibraryStats, Scores};

/// Upper bound of the storefront star scale.
pub const MAX_RATING: f64 = 5.0;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("database: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("library {0} not found")]
    LibraryNotFound(i64),
    #[error("item {0} not found")]
    ItemNotFound(i64),
    #[error("item {external_id} rejected: {reason}")]
    Invalid { external_id: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Library {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub total_results: i64,
    pub rating_mean: f64,
    pub rating_stdev: f64,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Library {
    /// Statistics as persisted by the last completed sync.
    pub fn stats(&self) -> LibraryStats {
        LibraryStats {
            mean: self.rating_mean,
            stdev: self.rating_stdev,
        }
    }
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Item {
    pub id: i64,
    pub library_id: i64,
    pub external_id: String,
    pub name: String,
    pub detail_url: String,
    pub thumb_url: Option<String>,
    pub thumb_store_ref: Option<String>,
    pub age_rating: i64,
    pub price: i64,
    pub base_price: i64,
    pub base_discount: i64,
    pub plus_price: i64,
    pub plus_discount: i64,
    pub rating: f64,
    pub rating_count: i64,
    pub weighted_rating: f64,
    pub base_value_score: i64,
    pub plus_value_score: i64,
    pub last_updated: DateTime<Utc>,
}

impl Item {
    pub fn discounts(&self) -> DiscountInfo {
        DiscountInfo {
            base_rate: self.base_discount,
            plus_rate: self.plus_discount,
            base_price: self.base_price,
            plus_price: self.plus_price,
        }
    }

    pub fn set_pricing(&mut self, price: i64, discounts: &DiscountInfo) {
        self.price = price;
        self.base_price = discounts.base_price;
        self.base_discount = discounts.base_rate;
        self.plus_price = discounts.plus_price;
        self.plus_discount = discounts.plus_rate;
    }

    pub fn set_scores(&mut self, scores: &Scores) {
        self.weighted_rating = scores.weighted_rating;
        self.base_value_score = scores.base_value_score;
        self.plus_value_score = scores.plus_value_score;
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let negative = [
            ("price", self.price),
            ("base_price", self.base_price),
            ("plus_price", self.plus_price),
        ]
        .into_iter()
        .find(|(_, v)| *v < 0);
        if let Some((field, value)) = negative {
            return Err(CatalogError::Invalid {
                external_id: self.external_id.clone(),
                reason: format!("{field} is negative ({value})"),
            });
        }
        if !self.rating.is_finite() || !self.weighted_rating.is_finite() {
            return Err(CatalogError::Invalid {
                external_id: self.external_id.clone(),
                reason: "rating is not a finite number".into(),
            });
        }
        if !(self.rating > 0.0 && self.rating <= MAX_RATING) {
            return Err(CatalogError::Invalid {
                external_id: self.external_id.clone(),
                reason: format!("rating {} outside (0, {MAX_RATING}]", self.rating),
            });
        }
        Ok(())
    }
}

/// Identity fields of an item seen for the first time.
#[derive(Debug, Clone)]
pub struct NewItem<'a> {
    pub external_id: &'a str,
    pub name: &'a str,
    pub detail_url: &'a str,
    pub thumb_url: Option<&'a str>,
    pub thumb_store_ref: Option<&'a str>,
    pub age_rating: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct ContentDescriptor {
    pub id: i64,
    pub name: String,
    pub description: String,
}

// ---------------------------------------------------------------------------
// Connection-level operations shared by the pool and transaction paths
// ---------------------------------------------------------------------------

async fn find_item_in(
    conn: &mut SqliteConnection,
    library_id: i64,
    external_id: &str,
) -> Result<Option<Item>, CatalogError> {
    let item = sqlx::query_as::<_, Item>(
        "SELECT * FROM items WHERE library_id = ? AND external_id = ?",
    )
    .bind(library_id)
    .bind(external_id)
    .fetch_optional(conn)
    .await?;
    Ok(item)
}

async fn save_item_in(conn: &mut SqliteConnection, item: &mut Item) -> Result<(), CatalogError> {
    item.validate()?;
    let now = Utc::now();
    let res = sqlx::query(
        "UPDATE items SET
            age_rating = ?, price = ?, base_price = ?, base_discount = ?,
            plus_price = ?, plus_discount = ?, rating = ?, rating_count = ?,
            weighted_rating = ?, base_value_score = ?, plus_value_score = ?,
            last_updated = ?
         WHERE id = ?",
    )
    .bind(item.age_rating)
    .bind(item.price)
    .bind(item.base_price)
    .bind(item.base_discount)
    .bind(item.plus_price)
    .bind(item.plus_discount)
    .bind(item.rating)
    .bind(item.rating_count)
    .bind(item.weighted_rating)
    .bind(item.base_value_score)
    .bind(item.plus_value_score)
    .bind(now)
    .bind(item.id)
    .execute(conn)
    .await?;
    if res.rows_affected() == 0 {
        return Err(CatalogError::ItemNotFound(item.id));
    }
    item.last_updated = now;
    Ok(())
}

// ---------------------------------------------------------------------------
// Pool-backed repository
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Catalog {
    db: Db,
}

impl Catalog {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Seed a library. Statistics start at the configured defaults.
    #[instrument(skip(self, stats))]
    pub async fn create_library(
        &self,
        name: &str,
        url: &str,
        stats: LibraryStats,
    ) -> Result<Library, CatalogError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO libraries (name, url, rating_mean, rating_stdev) VALUES (?, ?, ?, ?)
             RETURNING id",
        )
        .bind(name)
        .bind(url)
        .bind(stats.mean)
        .bind(stats.stdev)
        .fetch_one(&self.db.pool)
        .await?;
        self.find_library(id)
            .await?
            .ok_or(CatalogError::LibraryNotFound(id))
    }

    pub async fn find_library(&self, id: i64) -> Result<Option<Library>, CatalogError> {
        let lib = sqlx::query_as::<_, Library>("SELECT * FROM libraries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db.pool)
            .await?;
        Ok(lib)
    }

    pub async fn find_library_by_name(&self, name: &str) -> Result<Option<Library>, CatalogError> {
        let lib = sqlx::query_as::<_, Library>("SELECT * FROM libraries WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.db.pool)
            .await?;
        Ok(lib)
    }

    pub async fn find_item(
        &self,
        library_id: i64,
        external_id: &str,
    ) -> Result<Option<Item>, CatalogError> {
        let mut conn = self.db.pool.acquire().await?;
        find_item_in(&mut conn, library_id, external_id).await
    }

    pub async fn list_items(&self, library_id: i64) -> Result<Vec<Item>, CatalogError> {
        let items = sqlx::query_as::<_, Item>("SELECT * FROM items WHERE library_id = ? ORDER BY id")
            .bind(library_id)
            .fetch_all(&self.db.pool)
            .await?;
        Ok(items)
    }

    /// Highest base-tier value first.
    pub async fn top_items(&self, library_id: i64, limit: i64) -> Result<Vec<Item>, CatalogError> {
        let items = sqlx::query_as::<_, Item>(
            "SELECT * FROM items WHERE library_id = ?
             ORDER BY base_value_score DESC, id LIMIT ?",
        )
        .bind(library_id)
        .bind(limit)
        .fetch_all(&self.db.pool)
        .await?;
        Ok(items)
    }

    pub async fn list_all_ratings(&self, library_id: i64) -> Result<Vec<f64>, CatalogError> {
        let ratings = sqlx::query_scalar::<_, f64>("SELECT rating FROM items WHERE library_id = ?")
            .bind(library_id)
            .fetch_all(&self.db.pool)
            .await?;
        Ok(ratings)
    }

    pub async fn item_descriptors(&self, item_id: i64) -> Result<Vec<ContentDescriptor>, CatalogError> {
        let rows = sqlx::query_as::<_, ContentDescriptor>(
            "SELECT cd.id, cd.name, cd.description
             FROM content_descriptors cd
             JOIN item_descriptors link ON link.descriptor_id = cd.id
             WHERE link.item_id = ?
             ORDER BY cd.name, cd.description",
        )
        .bind(item_id)
        .fetch_all(&self.db.pool)
        .await?;
        Ok(rows)
    }

    /// Persist every mutable field and refresh `last_updated`.
    pub async fn save_item(&self, item: &mut Item) -> Result<(), CatalogError> {
        let mut conn = self.db.pool.acquire().await?;
        save_item_in(&mut conn, item).await
    }

    pub async fn update_thumbnail_ref(
        &self,
        item_id: i64,
        thumb_store_ref: &str,
    ) -> Result<(), CatalogError> {
        let res = sqlx::query("UPDATE items SET thumb_store_ref = ? WHERE id = ?")
            .bind(thumb_store_ref)
            .bind(item_id)
            .execute(&self.db.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(CatalogError::ItemNotFound(item_id));
        }
        Ok(())
    }

    #[instrument(skip(self, stats))]
    pub async fn save_library_statistics(
        &self,
        library_id: i64,
        stats: LibraryStats,
        synced_at: DateTime<Utc>,
        total_results: Option<i64>,
    ) -> Result<(), CatalogError> {
        let res = sqlx::query(
            "UPDATE libraries SET rating_mean = ?, rating_stdev = ?, last_updated = ?,
                total_results = COALESCE(?, total_results)
             WHERE id = ?",
        )
        .bind(stats.mean)
        .bind(stats.stdev)
        .bind(synced_at)
        .bind(total_results)
        .bind(library_id)
        .execute(&self.db.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(CatalogError::LibraryNotFound(library_id));
        }
        debug!(library_id, mean = stats.mean, stdev = stats.stdev, "library statistics saved");
        Ok(())
    }

    pub async fn begin(&self) -> Result<CatalogTx<'static>, CatalogError> {
        Ok(CatalogTx {
            tx: self.db.pool.begin().await?,
        })
    }
}

// ---------------------------------------------------------------------------
// Transactional unit of work
// ---------------------------------------------------------------------------

pub struct CatalogTx<'c> {
    tx: Transaction<'c, Sqlite>,
}

impl CatalogTx<'_> {
    /// Insert the identity fields only; prices, ratings and scores start at zero
    /// and must be filled in by `save_item` before the transaction commits.
    pub async fn create_skeleton_item(
        &mut self,
        library_id: i64,
        new: &NewItem<'_>,
    ) -> Result<Item, CatalogError> {
        let item = sqlx::query_as::<_, Item>(
            "INSERT INTO items
                (library_id, external_id, name, detail_url, thumb_url, thumb_store_ref,
                 age_rating, last_updated)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             RETURNING *",
        )
        .bind(library_id)
        .bind(new.external_id)
        .bind(new.name)
        .bind(new.detail_url)
        .bind(new.thumb_url)
        .bind(new.thumb_store_ref)
        .bind(new.age_rating)
        .bind(Utc::now())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(item)
    }

    pub async fn save_item(&mut self, item: &mut Item) -> Result<(), CatalogError> {
        save_item_in(&mut self.tx, item).await
    }

    pub async fn get_or_create_descriptor(
        &mut self,
        name: &str,
        description: &str,
    ) -> Result<ContentDescriptor, CatalogError> {
        sqlx::query(
            "INSERT INTO content_descriptors (name, description) VALUES (?, ?)
             ON CONFLICT (name, description) DO NOTHING",
        )
        .bind(name)
        .bind(description)
        .execute(&mut *self.tx)
        .await?;
        let row = sqlx::query_as::<_, ContentDescriptor>(
            "SELECT id, name, description FROM content_descriptors WHERE name = ? AND description = ?",
        )
        .bind(name)
        .bind(description)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row)
    }

    pub async fn get_or_create_item_descriptor_link(
        &mut self,
        item_id: i64,
        descriptor_id: i64,
    ) -> Result<(), CatalogError> {
        sqlx::query(
            "INSERT INTO item_descriptors (item_id, descriptor_id) VALUES (?, ?)
             ON CONFLICT (item_id, descriptor_id) DO NOTHING",
        )
        .bind(item_id)
        .bind(descriptor_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn commit(self) -> Result<(), CatalogError> {
        self.tx.commit().await?;
        Ok(())
    }
}
