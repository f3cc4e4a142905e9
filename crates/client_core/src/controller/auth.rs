use shared::{records::User, Resource};
use tokio::sync::watch;

use super::StateCell;
use crate::{
    repository::{IdentityRepository, ProfileUpdate, Registration},
    session::Session,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub is_loading: bool,
    pub user: Option<User>,
    pub error: Option<String>,
    pub is_authenticated: bool,
}

impl AuthState {
    fn signed_in(user: User) -> Self {
        Self {
            user: Some(user),
            is_authenticated: true,
            ..Self::default()
        }
    }

    fn failed(message: String) -> Self {
        Self {
            error: Some(message),
            ..Self::default()
        }
    }
}

pub struct AuthController {
    identity: IdentityRepository,
    session: Session,
    state: StateCell<AuthState>,
}

impl AuthController {
    pub fn new(identity: IdentityRepository, session: Session) -> Self {
        Self {
            identity,
            session,
            state: StateCell::new(AuthState::default()),
        }
    }

    pub fn state(&self) -> AuthState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    fn settle(&self, result: Resource<User>) {
        match result {
            Resource::Success(user) => {
                self.session.set(user.clone());
                self.state.replace(AuthState::signed_in(user));
            }
            Resource::Error(message) => {
                self.session.clear();
                self.state.replace(AuthState::failed(message));
            }
            Resource::Loading => self.state.merge(|s| s.is_loading = true),
        }
    }

    fn begin(&self) {
        self.state.merge(|s| {
            s.is_loading = true;
            s.error = None;
        });
    }

    /// Picks up a session the credential provider still holds. Does nothing
    /// when nobody is signed in.
    pub async fn restore(&self) {
        if !self.identity.is_logged_in() {
            return;
        }
        self.begin();
        let result = self.identity.current_profile().await;
        self.settle(result);
    }

    pub async fn register(&self, registration: Registration) {
        self.begin();
        let result = self.identity.register(registration).await;
        self.settle(result);
    }

    pub async fn login(&self, email: &str, password: &str) {
        self.begin();
        let result = self.identity.login(email, password).await;
        self.settle(result);
    }

    pub fn logout(&self) {
        self.identity.logout();
        self.session.clear();
        self.state.replace(AuthState::default());
    }

    /// On success the profile is fetched again so state shows the stored values.
    pub async fn update_profile(&self, update: ProfileUpdate) {
        self.begin();
        match self.identity.update_profile(update).await {
            Resource::Success(()) => {
                let refreshed = self.identity.current_profile().await;
                self.settle(refreshed);
            }
            Resource::Error(message) => self.state.merge(|s| {
                s.is_loading = false;
                s.error = Some(message);
            }),
            Resource::Loading => {}
        }
    }

    /// Leaves controller state untouched; the outcome is returned to the caller.
    pub async fn request_password_reset(&self, email: &str) -> Resource<()> {
        self.identity.request_password_reset(email).await
    }

    pub fn clear_error(&self) {
        self.state.merge(|s| s.error = None);
    }
}
