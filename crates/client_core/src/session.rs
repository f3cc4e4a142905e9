use std::sync::{Arc, PoisonError, RwLock};

use shared::{domain::UserId, records::User};

/// The signed-in user, shared by every controller of one client.
#[derive(Clone, Default)]
pub struct Session {
    user: Arc<RwLock<Option<User>>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, user: User) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = Some(user);
    }

    pub fn clear(&self) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn user(&self) -> Option<User> {
        self.user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|user| user.id.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id().is_some()
    }
}
