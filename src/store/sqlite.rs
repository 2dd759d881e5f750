use crate::error::StoreError;
use crate::models::{Category, Listing, NormalizedListing, Source};
use crate::store::{ListingStore, UpsertResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

const SCHEMA: &str = include_str!("../../sql/schema.sql");

const SOURCE_COLUMNS: &str = "id, name, category, base_url, is_active, last_scraped_at, created_at";

const LISTING_COLUMNS: &str = "id, external_id, category, source_id, title, description, price, \
     location, images, url, year, mileage, fuel_type, car_category, rooms, area, property_type, \
     is_active, created_at, updated_at, scraped_at";

/// SQLite-backed store sharing one connection across tasks
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        debug!("Database schema applied");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Task("connection lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

/// Constraint failures are integrity violations, everything else stays a
/// database error
fn classify(err: rusqlite::Error) -> StoreError {
    match err.sqlite_error_code() {
        Some(ErrorCode::ConstraintViolation) => StoreError::Integrity(err.to_string()),
        _ => StoreError::Database(err),
    }
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn parse_optional_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|value| {
        value
            .parse::<T>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
    })
    .transpose()
}

fn read_source(row: &Row<'_>) -> rusqlite::Result<Source> {
    Ok(Source {
        id: parse_column(row, 0)?,
        name: row.get(1)?,
        category: parse_column(row, 2)?,
        base_url: row.get(3)?,
        is_active: row.get(4)?,
        last_scraped_at: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn read_listing(row: &Row<'_>) -> rusqlite::Result<Listing> {
    let images_json: String = row.get(8)?;
    let images = serde_json::from_str(&images_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(e)))?;

    Ok(Listing {
        id: parse_column(row, 0)?,
        external_id: row.get(1)?,
        category: parse_column(row, 2)?,
        source_id: parse_column(row, 3)?,
        title: row.get(4)?,
        description: row.get(5)?,
        price: parse_optional_column(row, 6)?,
        location: row.get(7)?,
        images,
        url: row.get(9)?,
        year: row.get(10)?,
        mileage: row.get(11)?,
        fuel_type: parse_optional_column(row, 12)?,
        car_category: row.get(13)?,
        rooms: row.get(14)?,
        area: parse_optional_column(row, 15)?,
        property_type: parse_optional_column(row, 16)?,
        is_active: row.get(17)?,
        created_at: row.get(18)?,
        updated_at: row.get(19)?,
        scraped_at: row.get(20)?,
    })
}

fn upsert_in(
    conn: &mut Connection,
    source_id: Uuid,
    record: &NormalizedListing,
) -> Result<UpsertResult, StoreError> {
    let now = Utc::now();
    let source_key = source_id.to_string();

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let existing: Option<(String, Option<String>)> = tx
        .query_row(
            "SELECT source_id, price FROM listings WHERE external_id = ?1",
            params![record.external_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    if let Some((owner, _)) = &existing {
        if *owner != source_key {
            return Err(StoreError::Integrity(format!(
                "external id '{}' already belongs to source {}",
                record.external_id, owner
            )));
        }
    }
    let created = existing.is_none();
    let previous_price = existing
        .and_then(|(_, price)| price)
        .and_then(|price| Decimal::from_str(&price).ok());

    let images = serde_json::to_string(&record.images)
        .map_err(|e| StoreError::Corrupt(format!("images not serializable: {e}")))?;

    let sql = format!(
        r#"
        INSERT INTO listings (
            id, external_id, category, source_id,
            title, description, price, location, images, url,
            year, mileage, fuel_type, car_category,
            rooms, area, property_type,
            is_active, created_at, updated_at, scraped_at
        ) VALUES (
            ?1, ?2, ?3, ?4,
            ?5, ?6, ?7, ?8, ?9, ?10,
            ?11, ?12, ?13, ?14,
            ?15, ?16, ?17,
            1, ?18, ?18, ?18
        )
        ON CONFLICT(external_id) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            price = excluded.price,
            location = excluded.location,
            images = excluded.images,
            url = excluded.url,
            year = excluded.year,
            mileage = excluded.mileage,
            fuel_type = excluded.fuel_type,
            car_category = excluded.car_category,
            rooms = excluded.rooms,
            area = excluded.area,
            property_type = excluded.property_type,
            is_active = 1,
            updated_at = excluded.updated_at,
            scraped_at = excluded.scraped_at
        WHERE listings.source_id = excluded.source_id
        RETURNING {LISTING_COLUMNS}
        "#
    );

    let listing = tx
        .query_row(
            &sql,
            params![
                Uuid::new_v4().to_string(),
                record.external_id,
                record.category.as_str(),
                source_key,
                record.title,
                record.description,
                record.price.map(|p| p.to_string()),
                record.location,
                images,
                record.url,
                record.year,
                record.mileage,
                record.fuel_type.map(|f| f.as_str()),
                record.car_category,
                record.rooms,
                record.area.map(|a| a.to_string()),
                record.property_type.map(|p| p.as_str()),
                now,
            ],
            read_listing,
        )
        .optional()
        .map_err(classify)?
        .ok_or_else(|| {
            StoreError::Integrity(format!(
                "external id '{}' is owned by another source",
                record.external_id
            ))
        })?;

    tx.commit()?;

    Ok(UpsertResult {
        listing,
        created,
        previous_price,
    })
}

#[async_trait]
impl ListingStore for SqliteStore {
    async fn resolve_or_create_source(
        &self,
        name: &str,
        category: Category,
        base_url: &str,
    ) -> Result<Source, StoreError> {
        let name = name.to_string();
        let base_url = base_url.to_string();

        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                "INSERT INTO sources (id, name, category, base_url, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5)
                 ON CONFLICT(name) DO NOTHING",
                params![
                    Uuid::new_v4().to_string(),
                    name,
                    category.as_str(),
                    base_url,
                    Utc::now()
                ],
            )
            .map_err(classify)?;
            let source = tx.query_row(
                &format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE name = ?1"),
                params![name],
                read_source,
            )?;
            tx.commit()?;
            Ok(source)
        })
        .await
    }

    async fn upsert_listing(
        &self,
        source_id: Uuid,
        record: &NormalizedListing,
    ) -> Result<UpsertResult, StoreError> {
        let record = record.clone();
        self.with_conn(move |conn| upsert_in(conn, source_id, &record))
            .await
    }

    async fn mark_source_scraped(&self, source_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE sources SET last_scraped_at = ?1 WHERE id = ?2",
                params![at, source_id.to_string()],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_source(&self, id: Uuid) -> Result<Option<Source>, StoreError> {
        self.with_conn(move |conn| {
            let source = conn
                .query_row(
                    &format!("SELECT {SOURCE_COLUMNS} FROM sources WHERE id = ?1"),
                    params![id.to_string()],
                    read_source,
                )
                .optional()?;
            Ok(source)
        })
        .await
    }

    async fn get_listing(&self, external_id: &str) -> Result<Option<Listing>, StoreError> {
        let external_id = external_id.to_string();
        self.with_conn(move |conn| {
            let listing = conn
                .query_row(
                    &format!("SELECT {LISTING_COLUMNS} FROM listings WHERE external_id = ?1"),
                    params![external_id],
                    read_listing,
                )
                .optional()?;
            Ok(listing)
        })
        .await
    }

    async fn count_listings(&self, source_id: Uuid) -> Result<usize, StoreError> {
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM listings WHERE source_id = ?1",
                params![source_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FuelType;

    fn record(external_id: &str, price: Option<&str>) -> NormalizedListing {
        NormalizedListing {
            external_id: external_id.to_string(),
            category: Category::Car,
            url: format!("https://www.ss.com/msg/lv/transport/cars/bmw/x5/{external_id}.html"),
            title: "BMW X5".to_string(),
            description: "Diesel, automatic".to_string(),
            location: "Rīga".to_string(),
            price: price.map(|p| Decimal::from_str(p).unwrap()),
            images: vec!["https://i.ss.com/1.jpg".to_string()],
            year: Some(2015),
            mileage: Some(185_000),
            fuel_type: Some(FuelType::Diesel),
            car_category: Some("BMW".to_string()),
            rooms: None,
            area: None,
            property_type: None,
        }
    }

    async fn store_with_source() -> (SqliteStore, Source) {
        let store = SqliteStore::open_in_memory().unwrap();
        let source = store
            .resolve_or_create_source("ss.com cars/bmw", Category::Car, "https://www.ss.com")
            .await
            .unwrap();
        (store, source)
    }

    #[tokio::test]
    async fn source_resolution_is_idempotent() {
        let (store, first) = store_with_source().await;
        let second = store
            .resolve_or_create_source("ss.com cars/bmw", Category::Car, "https://www.ss.com")
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert!(first.is_active);
        assert!(first.last_scraped_at.is_none());
    }

    #[tokio::test]
    async fn second_upsert_updates_the_same_row() {
        let (store, source) = store_with_source().await;

        let first = store
            .upsert_listing(source.id, &record("bdkxm", Some("15000.00")))
            .await
            .unwrap();
        let second = store
            .upsert_listing(source.id, &record("bdkxm", Some("14500.00")))
            .await
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.listing.id, second.listing.id);
        assert_eq!(second.previous_price, Some(Decimal::from_str("15000.00").unwrap()));
        assert_eq!(second.listing.price, Some(Decimal::from_str("14500").unwrap()));
        assert!(second.listing.scraped_at >= first.listing.scraped_at);
        assert_eq!(second.listing.created_at, first.listing.created_at);
        assert_eq!(store.count_listings(source.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn upsert_reactivates_listing() {
        let (store, source) = store_with_source().await;
        store.upsert_listing(source.id, &record("abc", None)).await.unwrap();
        store
            .with_conn(|conn| {
                conn.execute("UPDATE listings SET is_active = 0 WHERE external_id = 'abc'", [])?;
                Ok(())
            })
            .await
            .unwrap();

        let result = store.upsert_listing(source.id, &record("abc", None)).await.unwrap();

        assert!(result.listing.is_active);
    }

    #[tokio::test]
    async fn round_trips_typed_fields() {
        let (store, source) = store_with_source().await;
        store
            .upsert_listing(source.id, &record("bdkxm", Some("15000.00")))
            .await
            .unwrap();

        let listing = store.get_listing("bdkxm").await.unwrap().unwrap();

        assert_eq!(listing.source_id, source.id);
        assert_eq!(listing.fuel_type, Some(FuelType::Diesel));
        assert_eq!(listing.images, vec!["https://i.ss.com/1.jpg"]);
        assert_eq!(listing.price.map(|p| p.to_string()).as_deref(), Some("15000.00"));
        assert!(store.get_listing("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn foreign_source_cannot_take_over_an_external_id() {
        let (store, source) = store_with_source().await;
        let other = store
            .resolve_or_create_source("other", Category::Car, "https://other.example")
            .await
            .unwrap();
        store.upsert_listing(source.id, &record("bdkxm", None)).await.unwrap();

        let err = store
            .upsert_listing(other.id, &record("bdkxm", None))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Integrity(_)));
        assert_eq!(store.count_listings(other.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn negative_price_violates_schema() {
        let (store, source) = store_with_source().await;

        let err = store
            .upsert_listing(source.id, &record("neg", Some("-5")))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Integrity(_)));
    }

    #[tokio::test]
    async fn marks_source_scraped_and_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listings.sqlite3");
        let at = Utc::now();

        let source_id = {
            let store = SqliteStore::open(&path).unwrap();
            let source = store
                .resolve_or_create_source("ss.com flats/riga", Category::RealEstate, "https://www.ss.com")
                .await
                .unwrap();
            store.mark_source_scraped(source.id, at).await.unwrap();
            source.id
        };

        let reopened = SqliteStore::open(&path).unwrap();
        let source = reopened.get_source(source_id).await.unwrap().unwrap();
        assert_eq!(source.category, Category::RealEstate);
        assert_eq!(source.last_scraped_at, Some(at));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_upserts_of_one_external_id_create_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listings.sqlite3");
        let first = SqliteStore::open(&path).unwrap();
        let source = first
            .resolve_or_create_source("ss.com cars/bmw", Category::Car, "https://www.ss.com")
            .await
            .unwrap();
        let mut stores = vec![first];
        for _ in 0..3 {
            stores.push(SqliteStore::open(&path).unwrap());
        }

        let mut upserts = tokio::task::JoinSet::new();
        for i in 0..16 {
            let store = stores[i % stores.len()].clone();
            let source_id = source.id;
            upserts.spawn(async move {
                store
                    .upsert_listing(source_id, &record("bdkxm", Some("15000.00")))
                    .await
            });
        }

        let mut created = 0;
        while let Some(joined) = upserts.join_next().await {
            if joined.unwrap().unwrap().created {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(stores[0].count_listings(source.id).await.unwrap(), 1);
    }
}
