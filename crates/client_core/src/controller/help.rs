use std::sync::{Mutex, PoisonError};

use shared::{
    domain::{HelpRequestId, HelpStatus, VillageId},
    records::HelpRequest,
    Resource,
};
use tokio::sync::watch;

use super::{apply_live, Observation, StateCell};
use crate::{repository::HelpRepository, session::Session};

const SIGNED_OUT: &str = "No user logged in";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HelpState {
    pub is_loading: bool,
    pub requests: Vec<HelpRequest>,
    pub error: Option<String>,
}

pub struct HelpController {
    help: HelpRepository,
    session: Session,
    state: StateCell<HelpState>,
    village: Mutex<Option<VillageId>>,
    observation: Mutex<Option<Observation<HelpState>>>,
}

impl HelpController {
    pub fn new(help: HelpRepository, session: Session) -> Self {
        Self {
            help,
            session,
            state: StateCell::new(HelpState::default()),
            village: Mutex::new(None),
            observation: Mutex::new(None),
        }
    }

    pub fn state(&self) -> HelpState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<HelpState> {
        self.state.subscribe()
    }

    fn is_observing(&self) -> bool {
        self.observation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn fail(&self, message: String) {
        self.state.merge(|s| {
            s.is_loading = false;
            s.error = Some(message);
        });
    }

    /// Follows a village's requests live, newest first. Starting a new
    /// observation ends the previous one.
    pub fn load_help_requests(&self, village_id: &VillageId) {
        self.stop_observing();
        *self.village.lock().unwrap_or_else(PoisonError::into_inner) = Some(village_id.clone());
        let observation = self
            .state
            .observe(self.help.watch_by_village(village_id), |s, item| {
                apply_live(&mut s.is_loading, &mut s.error, item, |requests| {
                    s.requests = requests
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

    /// Re-reads the list once when no live observation keeps it current.
    async fn refresh(&self) {
        if self.is_observing() {
            return;
        }
        let village = self
            .village
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(village) = village else {
            return;
        };
        match self.help.list_by_village(&village).await {
            Resource::Success(requests) => self.state.replace(HelpState {
                requests,
                ..HelpState::default()
            }),
            Resource::Error(message) => self.fail(message),
            Resource::Loading => {}
        }
    }

    /// Submits a request on behalf of the signed-in user, whose id, name and
    /// phone replace whatever the draft carried.
    pub async fn create_help_request(&self, draft: HelpRequest) -> Resource<HelpRequestId> {
        let Some(user) = self.session.user() else {
            self.fail(SIGNED_OUT.to_string());
            return Resource::error(SIGNED_OUT);
        };
        self.state.merge(|s| s.is_loading = true);

        let request = HelpRequest {
            user_id: user.id,
            user_name: user.name,
            user_phone: user.phone,
            ..draft
        };
        let result = self.help.create(&request).await;
        match &result {
            Resource::Success(_) => {
                self.state.merge(|s| s.is_loading = false);
                self.refresh().await;
            }
            Resource::Error(message) => self.fail(message.clone()),
            Resource::Loading => {}
        }
        result
    }

    pub async fn update_status(
        &self,
        id: &HelpRequestId,
        status: HelpStatus,
        admin_notes: Option<String>,
    ) -> Resource<()> {
        self.state.merge(|s| {
            s.is_loading = true;
            s.error = None;
        });
        let result = self.help.update_status(id, status, admin_notes).await;
        match &result {
            Resource::Success(()) => {
                self.state.merge(|s| s.is_loading = false);
                self.refresh().await;
            }
            Resource::Error(message) => self.fail(message.clone()),
            Resource::Loading => {}
        }
        result
    }

    pub fn clear_error(&self) {
        self.state.merge(|s| s.error = None);
    }
}
