use std::sync::{Mutex, PoisonError};

use shared::{domain::VillageId, records::Village, Resource};
use storage::Fields;
use tokio::sync::watch;

use super::{apply_live, Observation, StateCell};
use crate::repository::VillageRepository;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VillageState {
    pub is_loading: bool,
    pub villages: Vec<Village>,
    pub selected_village: Option<Village>,
    pub error: Option<String>,
}

impl VillageState {
    fn listed(result: Resource<Vec<Village>>) -> Self {
        match result {
            Resource::Success(villages) => Self {
                villages,
                ..Self::default()
            },
            Resource::Error(message) => Self {
                error: Some(message),
                ..Self::default()
            },
            Resource::Loading => Self {
                is_loading: true,
                ..Self::default()
            },
        }
    }
}

pub struct VillageController {
    villages: VillageRepository,
    state: StateCell<VillageState>,
    observation: Mutex<Option<Observation<VillageState>>>,
}

impl VillageController {
    pub fn new(villages: VillageRepository) -> Self {
        Self {
            villages,
            state: StateCell::new(VillageState::default()),
            observation: Mutex::new(None),
        }
    }

    pub fn state(&self) -> VillageState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<VillageState> {
        self.state.subscribe()
    }

    fn begin(&self) {
        self.state.merge(|s| {
            s.is_loading = true;
            s.error = None;
        });
    }

    /// Records a mutation's outcome; returns whether it succeeded.
    fn finish<T>(&self, result: &Resource<T>) -> bool {
        match result {
            Resource::Success(_) => {
                self.state.merge(|s| s.is_loading = false);
                true
            }
            Resource::Error(message) => {
                let message = message.clone();
                self.state.merge(|s| {
                    s.is_loading = false;
                    s.error = Some(message);
                });
                false
            }
            Resource::Loading => false,
        }
    }

    pub async fn load_villages(&self) {
        self.begin();
        let result = self.villages.list_active().await;
        self.state.replace(VillageState::listed(result));
    }

    /// Follows the active village list live, replacing any earlier observation.
    pub fn observe_villages(&self) {
        self.stop_observing();
        let observation = self.state.observe(self.villages.watch_active(), |s, item| {
            apply_live(&mut s.is_loading, &mut s.error, item, |villages| {
                s.villages = villages
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

    pub async fn load_village(&self, id: &VillageId) {
        self.begin();
        match self.villages.get(id).await {
            Resource::Success(village) => self.state.merge(|s| {
                s.is_loading = false;
                s.selected_village = Some(village);
            }),
            other => {
                self.finish(&other);
            }
        }
    }

    pub async fn create_village(&self, village: &Village) -> Resource<VillageId> {
        self.begin();
        let result = self.villages.create(village).await;
        if self.finish(&result) {
            self.load_villages().await;
        }
        result
    }

    pub async fn update_village(&self, id: &VillageId, fields: Fields) -> Resource<()> {
        self.begin();
        let result = self.villages.update(id, fields).await;
        if self.finish(&result) {
            self.load_villages().await;
        }
        result
    }

    pub async fn delete_village(&self, id: &VillageId) -> Resource<()> {
        self.begin();
        let result = self.villages.delete(id).await;
        if self.finish(&result) {
            self.load_villages().await;
        }
        result
    }

    pub async fn update_population(&self, id: &VillageId, population: i64) -> Resource<()> {
        self.begin();
        let result = self.villages.update_population(id, population).await;
        if self.finish(&result) {
            self.load_villages().await;
        }
        result
    }

    pub async fn search_villages(&self, prefix: &str) {
        self.begin();
        let result = self.villages.search(prefix).await;
        self.state.replace(VillageState::listed(result));
    }

    pub fn clear_error(&self) {
        self.state.merge(|s| s.error = None);
    }
}
