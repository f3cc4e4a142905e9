use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use shared::{
    domain::{HelpRequestId, HelpStatus, VillageId},
    error::BackendError,
    records::{HelpRequest, HELP_REQUESTS},
    Resource,
};
use storage::{Direction, DocumentStore, Query};
use tracing::{info, warn};

use super::{from_document, from_documents, name_missing, patch, to_fields, LiveResource};

const NOT_FOUND: &str = "Help request not found";

#[derive(Clone)]
pub struct HelpRepository {
    store: Arc<dyn DocumentStore>,
}

impl HelpRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn newest_first(village_id: &VillageId) -> Query {
        Query::collection(HELP_REQUESTS)
            .where_eq("villageId", village_id.as_str())
            .order_by("createdAt", Direction::Descending)
    }

    pub async fn create(&self, request: &HelpRequest) -> Resource<HelpRequestId> {
        let result = async {
            let id = self.store.create(HELP_REQUESTS, to_fields(request)?).await?;
            Ok::<_, BackendError>(HelpRequestId(id))
        }
        .await;
        match &result {
            Ok(id) => info!(
                request_id = %id,
                village_id = %request.village_id,
                category = %request.category,
                "help request submitted"
            ),
            Err(err) => warn!(error = %err, "help request submit failed"),
        }
        Resource::from_result_or(result, "Failed to create help request")
    }

    pub async fn get(&self, id: &HelpRequestId) -> Resource<HelpRequest> {
        let result = match self.store.get(HELP_REQUESTS, id.as_str()).await {
            Ok(doc) => from_document(doc),
            Err(err) => Err(name_missing(err, NOT_FOUND)),
        };
        Resource::from_result_or(result, "Failed to fetch help request")
    }

    pub async fn list_by_village(&self, village_id: &VillageId) -> Resource<Vec<HelpRequest>> {
        let result = match self.store.query(&Self::newest_first(village_id)).await {
            Ok(docs) => from_documents(docs),
            Err(err) => Err(err),
        };
        Resource::from_result_or(result, "Failed to fetch help requests")
    }

    pub fn watch_by_village(&self, village_id: &VillageId) -> LiveResource<Vec<HelpRequest>> {
        let feed = self.store.watch_query(Self::newest_first(village_id));
        LiveResource::from_feed(feed, "Error observing requests", from_documents)
    }

    /// Moves a request to `status`. Resolving stamps `resolvedAt`; notes are
    /// only written when given.
    pub async fn update_status(
        &self,
        id: &HelpRequestId,
        status: HelpStatus,
        admin_notes: Option<String>,
    ) -> Resource<()> {
        let mut fields = patch([("status", Value::from(status.as_code()))]);
        if let Some(notes) = admin_notes {
            fields.insert("adminNotes".to_string(), Value::String(notes));
        }
        if status == HelpStatus::Resolved {
            fields.insert(
                "resolvedAt".to_string(),
                Value::from(Utc::now().timestamp_micros()),
            );
        }

        let result = self
            .store
            .update(HELP_REQUESTS, id.as_str(), fields)
            .await
            .map_err(|err| name_missing(err, NOT_FOUND));
        if result.is_ok() {
            info!(request_id = %id, %status, "help request status changed");
        }
        Resource::from_result_or(result, "Failed to update help request")
    }
}
