use std::{
    future::Future,
    sync::{Mutex, PoisonError},
};

use shared::{
    domain::{SuggestionId, VillageId},
    records::Suggestion,
    Resource,
};
use tokio::sync::watch;

use super::{apply_live, Observation, StateCell};
use crate::{repository::SuggestionRepository, session::Session};

const SIGNED_OUT: &str = "No user logged in";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuggestionState {
    pub is_loading: bool,
    pub suggestions: Vec<Suggestion>,
    pub error: Option<String>,
}

pub struct SuggestionController {
    suggestions: SuggestionRepository,
    session: Session,
    state: StateCell<SuggestionState>,
    village: Mutex<Option<VillageId>>,
    observation: Mutex<Option<Observation<SuggestionState>>>,
}

impl SuggestionController {
    pub fn new(suggestions: SuggestionRepository, session: Session) -> Self {
        Self {
            suggestions,
            session,
            state: StateCell::new(SuggestionState::default()),
            village: Mutex::new(None),
            observation: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SuggestionState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<SuggestionState> {
        self.state.subscribe()
    }

    pub fn load_suggestions(&self, village_id: &VillageId) {
        self.stop_observing();
        *self.village.lock().unwrap_or_else(PoisonError::into_inner) = Some(village_id.clone());
        let observation =
            self.state
                .observe(self.suggestions.watch_by_village(village_id), |s, item| {
                    apply_live(&mut s.is_loading, &mut s.error, item, |suggestions| {
                        s.suggestions = suggestions
                    })
                });
        *self.observation.lock().unwrap_or_else(PoisonError::into_inner) = Some(observation);
    }

    pub fn stop_observing(&self) {
        let previous = self
            .observation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(previous);
    }

    async fn refresh(&self) {
        let observing = self
            .observation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        let village = self
            .village
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let (false, Some(village)) = (observing, village) else {
            return;
        };
        match self.suggestions.list_by_village(&village).await {
            Resource::Success(suggestions) => self.state.replace(SuggestionState {
                suggestions,
                ..SuggestionState::default()
            }),
            Resource::Error(message) => self.settle_error(message),
            Resource::Loading => {}
        }
    }

    fn settle_error(&self, message: String) {
        self.state.merge(|s| {
            s.is_loading = false;
            s.error = Some(message);
        });
    }

    /// Runs a mutation with the usual loading/error bookkeeping and refreshes
    /// the list when it succeeds.
    async fn mutate<T>(&self, pending: impl Future<Output = Resource<T>>) -> Resource<T> {
        self.state.merge(|s| {
            s.is_loading = true;
            s.error = None;
        });
        let result = pending.await;
        match &result {
            Resource::Success(_) => {
                self.state.merge(|s| s.is_loading = false);
                self.refresh().await;
            }
            Resource::Error(message) => self.settle_error(message.clone()),
            Resource::Loading => {}
        }
        result
    }

    /// Submits a suggestion as the signed-in user.
    pub async fn create_suggestion(&self, draft: Suggestion) -> Resource<SuggestionId> {
        let Some(user) = self.session.user() else {
            self.settle_error(SIGNED_OUT.to_string());
            return Resource::error(SIGNED_OUT);
        };
        let suggestion = Suggestion {
            user_id: user.id,
            user_name: user.name,
            ..draft
        };
        self.mutate(self.suggestions.create(&suggestion)).await
    }

    /// Toggles the signed-in user's vote.
    pub async fn upvote(&self, id: &SuggestionId) -> Resource<bool> {
        let Some(user_id) = self.session.user_id() else {
            self.settle_error(SIGNED_OUT.to_string());
            return Resource::error(SIGNED_OUT);
        };
        self.mutate(self.suggestions.toggle_upvote(id, &user_id)).await
    }

    pub async fn respond(
        &self,
        id: &SuggestionId,
        response: &str,
        implemented: bool,
    ) -> Resource<()> {
        self.mutate(self.suggestions.respond(id, response, implemented))
            .await
    }

    pub fn clear_error(&self) {
        self.state.merge(|s| s.error = None);
    }
}
