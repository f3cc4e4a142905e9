use std::sync::Arc;

use serde_json::Value;
use shared::{
    domain::{SuggestionId, UserId, VillageId},
    error::BackendError,
    records::{Suggestion, SUGGESTIONS},
    Resource,
};
use storage::{Direction, DocumentStore, Query};
use tracing::{debug, info, warn};

use super::{from_document, from_documents, name_missing, patch, to_fields, LiveResource};

const NOT_FOUND: &str = "Suggestion not found";

#[derive(Clone)]
pub struct SuggestionRepository {
    store: Arc<dyn DocumentStore>,
}

impl SuggestionRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn newest_first(village_id: &VillageId) -> Query {
        Query::collection(SUGGESTIONS)
            .where_eq("villageId", village_id.as_str())
            .order_by("createdAt", Direction::Descending)
    }

    async fn fetch(&self, id: &SuggestionId) -> Result<Suggestion, BackendError> {
        let doc = self
            .store
            .get(SUGGESTIONS, id.as_str())
            .await
            .map_err(|err| name_missing(err, NOT_FOUND))?;
        from_document(doc)
    }

    /// New suggestions always start without votes.
    pub async fn create(&self, suggestion: &Suggestion) -> Resource<SuggestionId> {
        let fresh = Suggestion {
            upvotes: 0,
            upvoted_by: Vec::new(),
            ..suggestion.clone()
        };
        let result = async {
            let id = self.store.create(SUGGESTIONS, to_fields(&fresh)?).await?;
            Ok::<_, BackendError>(SuggestionId(id))
        }
        .await;
        match &result {
            Ok(id) => info!(suggestion_id = %id, village_id = %fresh.village_id, "suggestion submitted"),
            Err(err) => warn!(error = %err, "suggestion submit failed"),
        }
        Resource::from_result_or(result, "Failed to create suggestion")
    }

    pub async fn get(&self, id: &SuggestionId) -> Resource<Suggestion> {
        Resource::from_result_or(self.fetch(id).await, "Failed to fetch suggestion")
    }

    pub async fn list_by_village(&self, village_id: &VillageId) -> Resource<Vec<Suggestion>> {
        let result = match self.store.query(&Self::newest_first(village_id)).await {
            Ok(docs) => from_documents(docs),
            Err(err) => Err(err),
        };
        Resource::from_result_or(result, "Failed to fetch suggestions")
    }

    pub fn watch_by_village(&self, village_id: &VillageId) -> LiveResource<Vec<Suggestion>> {
        let feed = self.store.watch_query(Self::newest_first(village_id));
        LiveResource::from_feed(feed, "Error observing suggestions", from_documents)
    }

    /// Adds or withdraws `user_id`'s vote; `Success(true)` means the user now
    /// upvotes the suggestion. Count and voter list are written together.
    pub async fn toggle_upvote(&self, id: &SuggestionId, user_id: &UserId) -> Resource<bool> {
        let result = async {
            let mut suggestion = self.fetch(id).await?;
            let upvoted = suggestion.toggle_upvote(user_id);
            let voters = serde_json::to_value(&suggestion.upvoted_by)?;
            self.store
                .update(
                    SUGGESTIONS,
                    id.as_str(),
                    patch([
                        ("upvotes", Value::from(suggestion.upvotes)),
                        ("upvotedBy", voters),
                    ]),
                )
                .await
                .map_err(|err| name_missing(err, NOT_FOUND))?;
            debug!(suggestion_id = %id, %user_id, upvoted, votes = suggestion.upvotes, "upvote toggled");
            Ok::<_, BackendError>(upvoted)
        }
        .await;
        Resource::from_result_or(result, "Failed to update vote")
    }

    /// Records an admin response and marks the suggestion reviewed.
    pub async fn respond(
        &self,
        id: &SuggestionId,
        response: &str,
        implemented: bool,
    ) -> Resource<()> {
        let result = self
            .store
            .update(
                SUGGESTIONS,
                id.as_str(),
                patch([
                    ("adminResponse", Value::from(response)),
                    ("isReviewed", Value::Bool(true)),
                    ("isImplemented", Value::Bool(implemented)),
                ]),
            )
            .await
            .map_err(|err| name_missing(err, NOT_FOUND));
        if result.is_ok() {
            info!(suggestion_id = %id, implemented, "suggestion reviewed");
        }
        Resource::from_result_or(result, "Failed to respond to suggestion")
    }
}
