// Postgres document store. A "collection" is a table of JSONB documents in
// the database named on the command line.

use std::str::FromStr;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::error::CrawlError;
use crate::traits::DocumentStore;
use crate::types::ActivityItem;

static COLLECTION_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("valid regex"));

/// Reject anything that is not a plain Postgres identifier. The name is
/// interpolated into SQL, so this is the only guard against injection.
pub fn validate_collection(name: &str) -> Result<(), CrawlError> {
    if COLLECTION_NAME.is_match(name) {
        Ok(())
    } else {
        Err(CrawlError::InvalidCollection(name.to_string()))
    }
}

pub struct PgDocumentStore {
    pool: PgPool,
    collection: String,
    insert_sql: String,
    run_id: Uuid,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool, collection: &str, run_id: Uuid) -> Result<Self, CrawlError> {
        validate_collection(collection)?;
        Ok(Self {
            pool,
            collection: collection.to_string(),
            insert_sql: format!(
                r#"INSERT INTO "{collection}" (run_id, follower_id, document) VALUES ($1, $2, $3)"#
            ),
            run_id,
        })
    }

    /// Connect to `database` on the server named by `database_url`.
    pub async fn connect(
        database_url: &str,
        database: &str,
        collection: &str,
        run_id: Uuid,
        max_connections: u32,
    ) -> Result<Self> {
        validate_collection(collection)?;
        let options = PgConnectOptions::from_str(database_url)
            .context("DATABASE_URL is not a valid Postgres URL")?
            .database(database);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to database {database}"))?;

        info!(database, collection, "Connected to document store");
        Ok(Self::new(pool, collection, run_id)?)
    }

    /// Create the collection table if it does not exist yet.
    pub async fn ensure_collection(&self) -> Result<()> {
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{table}" (
                id          BIGSERIAL PRIMARY KEY,
                run_id      UUID NOT NULL,
                follower_id BIGINT NOT NULL,
                document    JSONB NOT NULL,
                inserted_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
            table = self.collection
        );
        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to create collection {}", self.collection))?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn insert(&self, item: &ActivityItem) -> Result<()> {
        let follower_id =
            i64::try_from(item.follower.0).context("Follower id does not fit in BIGINT")?;

        sqlx::query(&self.insert_sql)
            .bind(self.run_id)
            .bind(follower_id)
            .bind(&item.document)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Insert into {} failed", self.collection))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FollowerId;

    #[test]
    fn plain_identifiers_are_accepted() {
        for name in ["tweets", "follower_tweets_2024", "_staging", "T"] {
            assert!(validate_collection(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn unsafe_identifiers_are_rejected() {
        let too_long = "x".repeat(64);
        for name in [
            "",
            "1tweets",
            "tweets; DROP TABLE users",
            "tw\"eets",
            "my-tweets",
            "schema.table",
            too_long.as_str(),
        ] {
            assert!(
                matches!(validate_collection(name), Err(CrawlError::InvalidCollection(_))),
                "{name}"
            );
        }
    }

    /// Requires a Postgres instance. Set DATABASE_TEST_URL or this test is skipped.
    #[tokio::test]
    async fn inserts_documents_into_collection() {
        let Ok(url) = std::env::var("DATABASE_TEST_URL") else {
            eprintln!("DATABASE_TEST_URL not set, skipping");
            return;
        };
        let pool = PgPool::connect(&url).await.unwrap();
        let run_id = Uuid::new_v4();
        let table = format!("crawl_test_{}", run_id.simple());
        let store = PgDocumentStore::new(pool.clone(), &table, run_id).unwrap();
        store.ensure_collection().await.unwrap();

        let doc = serde_json::json!({"id": 1, "text": "hello"});
        store
            .insert(&ActivityItem {
                follower: FollowerId(101),
                document: doc.clone(),
            })
            .await
            .unwrap();

        let (follower_id, stored): (i64, serde_json::Value) = sqlx::query_as(&format!(
            r#"SELECT follower_id, document FROM "{table}" WHERE run_id = $1"#
        ))
        .bind(run_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(follower_id, 101);
        assert_eq!(stored, doc);

        sqlx::query(&format!(r#"DROP TABLE "{table}""#))
            .execute(&pool)
            .await
            .unwrap();
    }
}
