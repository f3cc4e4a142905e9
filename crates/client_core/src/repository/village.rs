use std::sync::Arc;

use serde_json::Value;
use shared::{
    domain::VillageId,
    error::BackendError,
    records::{Village, VILLAGES},
    Resource,
};
use storage::{Direction, DocumentStore, Fields, Query};
use tracing::{info, warn};

use super::{from_document, from_documents, name_missing, patch, to_fields, LiveResource};

const NOT_FOUND: &str = "Village not found";

#[derive(Clone)]
pub struct VillageRepository {
    store: Arc<dyn DocumentStore>,
}

impl VillageRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn active_by_name() -> Query {
        Query::collection(VILLAGES)
            .where_eq("isActive", true)
            .order_by("name", Direction::Ascending)
    }

    pub async fn create(&self, village: &Village) -> Resource<VillageId> {
        let result = async {
            let id = self.store.create(VILLAGES, to_fields(village)?).await?;
            Ok::<_, BackendError>(VillageId(id))
        }
        .await;
        match &result {
            Ok(id) => info!(village_id = %id, name = %village.name, "village created"),
            Err(err) => warn!(error = %err, "village create failed"),
        }
        Resource::from_result_or(result, "Failed to create village")
    }

    pub async fn update(&self, id: &VillageId, fields: Fields) -> Resource<()> {
        let result = self
            .store
            .update(VILLAGES, id.as_str(), fields)
            .await
            .map_err(|err| name_missing(err, NOT_FOUND));
        Resource::from_result_or(result, "Failed to update village")
    }

    pub async fn get(&self, id: &VillageId) -> Resource<Village> {
        let result = match self.store.get(VILLAGES, id.as_str()).await {
            Ok(doc) => from_document(doc),
            Err(err) => Err(name_missing(err, NOT_FOUND)),
        };
        Resource::from_result_or(result, "Failed to fetch village")
    }

    /// Active villages, name ascending.
    pub async fn list_active(&self) -> Resource<Vec<Village>> {
        let result = match self.store.query(&Self::active_by_name()).await {
            Ok(docs) => from_documents(docs),
            Err(err) => Err(err),
        };
        Resource::from_result_or(result, "Failed to fetch villages")
    }

    pub fn watch_active(&self) -> LiveResource<Vec<Village>> {
        let feed = self.store.watch_query(Self::active_by_name());
        LiveResource::from_feed(feed, "Error observing villages", from_documents)
    }

    pub fn watch(&self, id: &VillageId) -> LiveResource<Village> {
        let feed = self.store.watch_document(VILLAGES, id.as_str());
        LiveResource::from_feed(feed, "Error observing village", |doc| match doc {
            Some(doc) => from_document(doc),
            None => Err(BackendError::not_found(NOT_FOUND)),
        })
    }

    /// Active villages whose name starts with `prefix`, name ascending.
    pub async fn search(&self, prefix: &str) -> Resource<Vec<Village>> {
        let query = Self::active_by_name().starts_with(prefix);
        let result = match self.store.query(&query).await {
            Ok(docs) => from_documents(docs),
            Err(err) => Err(err),
        };
        Resource::from_result_or(result, "Failed to search villages")
    }

    /// Soft delete: the document stays readable by id but leaves active listings.
    pub async fn delete(&self, id: &VillageId) -> Resource<()> {
        let result = self
            .store
            .update(VILLAGES, id.as_str(), patch([("isActive", Value::Bool(false))]))
            .await
            .map_err(|err| name_missing(err, NOT_FOUND));
        if result.is_ok() {
            info!(village_id = %id, "village deactivated");
        }
        Resource::from_result_or(result, "Failed to delete village")
    }

    pub async fn update_population(&self, id: &VillageId, population: i64) -> Resource<()> {
        let result = self
            .store
            .update(
                VILLAGES,
                id.as_str(),
                patch([("population", Value::from(population))]),
            )
            .await
            .map_err(|err| name_missing(err, NOT_FOUND));
        Resource::from_result_or(result, "Failed to update population")
    }
}
