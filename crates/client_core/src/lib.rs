use std::sync::Arc;

use anyhow::Result;
use storage::{CredentialProvider, DocumentStore, Storage};
use tracing::info;

pub mod controller;
pub mod repository;
pub mod session;

pub use controller::{
    AuthController, AuthState, HelpController, HelpState, SuggestionController, SuggestionState,
    VillageController, VillageState,
};
pub use repository::{
    HelpRepository, IdentityRepository, LiveResource, ProfileUpdate, Registration,
    SuggestionRepository, VillageRepository,
};
pub use session::Session;

/// One signed-in client: a session plus a controller per vertical, all
/// sharing the same backend.
pub struct VillageClient {
    pub session: Session,
    pub auth: AuthController,
    pub villages: VillageController,
    pub help: HelpController,
    pub suggestions: SuggestionController,
}

impl VillageClient {
    /// Opens the SQLite backend at `database_url` and wires a client to it.
    pub async fn open(database_url: &str) -> Result<Self> {
        let storage = Storage::new(database_url).await?;
        info!(database_url, "backend ready");
        let credentials = Arc::new(storage.credentials());
        Ok(Self::new_with_dependencies(credentials, Arc::new(storage)))
    }

    pub fn new_with_dependencies(
        credentials: Arc<dyn CredentialProvider>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        let session = Session::new();
        Self {
            auth: AuthController::new(
                IdentityRepository::new(credentials, Arc::clone(&store)),
                session.clone(),
            ),
            villages: VillageController::new(VillageRepository::new(Arc::clone(&store))),
            help: HelpController::new(HelpRepository::new(Arc::clone(&store)), session.clone()),
            suggestions: SuggestionController::new(
                SuggestionRepository::new(store),
                session.clone(),
            ),
            session,
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
