use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use shared::error::BackendError;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use tracing::debug;
use uuid::Uuid;

pub mod backend;
mod credentials;
pub mod live;
pub mod query;

pub use backend::{CredentialProvider, Document, DocumentStore, Fields};
pub use credentials::{SqliteCredentialProvider, DEFAULT_HASH_COST, MIN_HASH_COST};
pub use live::{spawn_feed, ChangeHub, Disposer, FeedStream, LiveFeed};
pub use query::{Direction, Query};

/// Server-assigned timestamp fields, stored as microseconds since the epoch.
pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";
const ID_FIELD: &str = "id";

/// Local document store and credential backend on SQLite.
#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
    hub: ChangeHub,
    clock: Arc<ServerClock>,
    hash_cost: u32,
}

/// Strictly increasing microsecond clock, so two writes never share a
/// `createdAt`.
#[derive(Default)]
struct ServerClock {
    last: Mutex<i64>,
}

impl ServerClock {
    fn now_micros(&self) -> i64 {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let next = Utc::now().timestamp_micros().max(*last + 1);
        *last = next;
        next
    }
}

pub(crate) fn transport(err: sqlx::Error) -> BackendError {
    BackendError::transport(err.to_string())
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid database url '{database_url}'"))?
            .create_if_missing(true);
        // Every connection to `:memory:` is its own database, so pin one.
        let pool_options = if is_in_memory(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(Option::<Duration>::None)
                .max_lifetime(Option::<Duration>::None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(connect_options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            pool,
            hub: ChangeHub::new(),
            clock: Arc::new(ServerClock::default()),
            hash_cost: DEFAULT_HASH_COST,
        })
    }

    /// bcrypt work factor for providers handed out by [`Storage::credentials`].
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub fn hub(&self) -> &ChangeHub {
        &self.hub
    }

    pub fn credentials(&self) -> SqliteCredentialProvider {
        SqliteCredentialProvider::new(self.pool.clone(), self.hash_cost)
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Closes the pool; every later operation fails with a transport error.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn stamp_created(&self, fields: &mut Fields) {
        let now = Value::from(self.clock.now_micros());
        if fields.get(CREATED_AT).map_or(true, Value::is_null) {
            fields.insert(CREATED_AT.to_string(), now.clone());
        }
        fields.insert(UPDATED_AT.to_string(), now);
    }

    async fn load_body(&self, collection: &str, id: &str) -> Result<Option<Fields>, BackendError> {
        let row = sqlx::query("SELECT body FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(transport)?;
        row.map(|r| parse_body(collection, id, &r.get::<String, _>(0)))
            .transpose()
    }

    async fn load_collection(&self, collection: &str) -> Result<Vec<Document>, BackendError> {
        let rows = sqlx::query("SELECT id, body FROM documents WHERE collection = ?")
            .bind(collection)
            .fetch_all(&self.pool)
            .await
            .map_err(transport)?;
        rows.into_iter()
            .map(|r| {
                let id = r.get::<String, _>(0);
                let fields = parse_body(collection, &id, &r.get::<String, _>(1))?;
                Ok(Document { id, fields })
            })
            .collect()
    }

    async fn write_body(&self, collection: &str, id: &str, fields: Fields) -> Result<(), BackendError> {
        let body = serde_json::to_string(&Value::Object(fields))?;
        sqlx::query(
            "INSERT INTO documents (collection, id, body) VALUES (?, ?, ?)
             ON CONFLICT(collection, id) DO UPDATE SET body = excluded.body",
        )
        .bind(collection)
        .bind(id)
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(transport)?;
        Ok(())
    }
}

fn parse_body(collection: &str, id: &str, raw: &str) -> Result<Fields, BackendError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(BackendError::malformed(format!(
            "document {collection}/{id} is not an object"
        ))),
        Err(err) => Err(BackendError::malformed(format!(
            "document {collection}/{id} is unreadable: {err}"
        ))),
    }
}

fn touches_id(path: &str) -> bool {
    path.split('.').next() == Some(ID_FIELD)
}

/// Writes `value` at a dotted path, creating intermediate objects.
fn set_path(fields: &mut Fields, path: &str, value: Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let Some(last) = segments.pop() else {
        return;
    };
    let mut current = fields;
    for segment in segments {
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Fields::new()));
        if !slot.is_object() {
            *slot = Value::Object(Fields::new());
        }
        let Value::Object(next) = slot else {
            return;
        };
        current = next;
    }
    current.insert(last.to_string(), value);
}

#[async_trait]
impl DocumentStore for Storage {
    async fn create(&self, collection: &str, mut fields: Fields) -> Result<String, BackendError> {
        let id = Uuid::new_v4().simple().to_string();
        fields.remove(ID_FIELD);
        self.stamp_created(&mut fields);
        self.write_body(collection, &id, fields).await?;
        debug!(collection, %id, "document created");
        self.hub.notify(collection);
        Ok(id)
    }

    async fn put(&self, collection: &str, id: &str, mut fields: Fields) -> Result<(), BackendError> {
        if id.trim().is_empty() {
            return Err(BackendError::rejected("document id must not be empty"));
        }
        fields.remove(ID_FIELD);
        self.stamp_created(&mut fields);
        self.write_body(collection, id, fields).await?;
        debug!(collection, id, "document stored");
        self.hub.notify(collection);
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Document, BackendError> {
        match self.load_body(collection, id).await? {
            Some(fields) => Ok(Document {
                id: id.to_string(),
                fields,
            }),
            None => Err(BackendError::not_found(format!(
                "document {collection}/{id} not found"
            ))),
        }
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> Result<(), BackendError> {
        if fields.keys().any(|k| touches_id(k)) {
            return Err(BackendError::rejected("document id is immutable"));
        }

        // Take the write lock before reading so concurrent patches queue on
        // the busy timeout instead of failing the lock upgrade.
        let mut tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(transport)?;
        let row = sqlx::query("SELECT body FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(transport)?;
        let Some(row) = row else {
            return Err(BackendError::not_found(format!(
                "document {collection}/{id} not found"
            )));
        };

        let mut body = parse_body(collection, id, &row.get::<String, _>(0))?;
        let touched: Vec<String> = fields.keys().cloned().collect();
        for (path, value) in fields {
            set_path(&mut body, &path, value);
        }
        body.insert(UPDATED_AT.to_string(), Value::from(self.clock.now_micros()));

        sqlx::query("UPDATE documents SET body = ? WHERE collection = ? AND id = ?")
            .bind(serde_json::to_string(&Value::Object(body))?)
            .bind(collection)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(transport)?;
        tx.commit().await.map_err(transport)?;

        debug!(collection, id, fields = ?touched, "document updated");
        self.hub.notify(collection);
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, BackendError> {
        let documents = self.load_collection(&query.collection).await?;
        Ok(query.apply(documents))
    }

    fn watch_document(&self, collection: &str, id: &str) -> LiveFeed<Option<Document>> {
        let store = self.clone();
        let target = (collection.to_string(), id.to_string());
        spawn_feed(&self.hub, collection, move || {
            let store = store.clone();
            let (collection, id) = target.clone();
            async move {
                let body = store.load_body(&collection, &id).await?;
                Ok(body.map(|fields| Document { id, fields }))
            }
        })
    }

    fn watch_query(&self, query: Query) -> LiveFeed<Vec<Document>> {
        let store = self.clone();
        let collection = query.collection.clone();
        spawn_feed(&self.hub, &collection, move || {
            let store = store.clone();
            let query = query.clone();
            async move { store.query(&query).await }
        })
    }
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_in_memory(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
