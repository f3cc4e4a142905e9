//! The two seams between the client and its managed backend.

use async_trait::async_trait;
use serde_json::{Map, Value};
use shared::{domain::UserId, error::BackendError};

use crate::{live::LiveFeed, query::Query};

pub type Fields = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Issues a credential and signs it in.
    async fn create_account(&self, email: &str, secret: &str) -> Result<UserId, BackendError>;
    async fn verify(&self, email: &str, secret: &str) -> Result<UserId, BackendError>;
    /// Drops the local session only.
    fn invalidate(&self);
    fn current_id(&self) -> Option<UserId>;
    async fn delete_account(&self, id: &UserId) -> Result<(), BackendError>;
    async fn request_password_reset(&self, email: &str) -> Result<(), BackendError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persists `fields` under a freshly generated id and returns it.
    async fn create(&self, collection: &str, fields: Fields) -> Result<String, BackendError>;
    /// Creates (or fully replaces) the document at a caller-chosen id.
    async fn put(&self, collection: &str, id: &str, fields: Fields) -> Result<(), BackendError>;
    async fn get(&self, collection: &str, id: &str) -> Result<Document, BackendError>;
    /// Patches the named fields (dotted paths allowed) and leaves the rest.
    async fn update(&self, collection: &str, id: &str, fields: Fields)
        -> Result<(), BackendError>;
    async fn query(&self, query: &Query) -> Result<Vec<Document>, BackendError>;
    /// Emits `Some(doc)` while the document exists and `None` otherwise.
    fn watch_document(&self, collection: &str, id: &str) -> LiveFeed<Option<Document>>;
    fn watch_query(&self, query: Query) -> LiveFeed<Vec<Document>>;
}
