use std::sync::Arc;

use serde_json::Value;
use shared::{
    domain::{UserId, UserRole, VillageId},
    error::BackendError,
    records::{User, USERS},
    Resource,
};
use storage::{CredentialProvider, DocumentStore, Fields};
use tracing::{error, info, warn};

use super::{from_document, name_missing, to_fields, LiveResource};

const PROFILE_MISSING: &str = "User data not found";
const SIGNED_OUT: &str = "No user logged in";
const DEACTIVATED: &str = "Account is deactivated";

/// Everything needed to open an account and write its profile.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub name: String,
    pub phone: String,
    pub role: UserRole,
    /// Empty for super admins.
    pub village_id: VillageId,
}

/// Profile fields a signed-in user may change. `None` leaves a field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub profile_photo_url: Option<String>,
}

impl ProfileUpdate {
    fn into_fields(self) -> Fields {
        [
            ("name", self.name),
            ("phone", self.phone),
            ("profilePhotoUrl", self.profile_photo_url),
        ]
        .into_iter()
        .filter_map(|(field, value)| value.map(|v| (field.to_string(), Value::String(v))))
        .collect()
    }
}

#[derive(Clone)]
pub struct IdentityRepository {
    credentials: Arc<dyn CredentialProvider>,
    store: Arc<dyn DocumentStore>,
}

impl IdentityRepository {
    pub fn new(credentials: Arc<dyn CredentialProvider>, store: Arc<dyn DocumentStore>) -> Self {
        Self { credentials, store }
    }

    async fn fetch_profile(&self, id: &UserId) -> Result<User, BackendError> {
        let doc = self
            .store
            .get(USERS, id.as_str())
            .await
            .map_err(|err| name_missing(err, PROFILE_MISSING))?;
        from_document(doc)
    }

    /// Issues a credential, then writes the profile under the credential's id.
    ///
    /// If the profile write fails the credential is deleted again, so a
    /// failed registration never leaves an account without a profile.
    pub async fn register(&self, registration: Registration) -> Resource<User> {
        Resource::from_result_or(self.try_register(registration).await, "Registration failed")
    }

    async fn try_register(&self, registration: Registration) -> Result<User, BackendError> {
        let Registration {
            email,
            password,
            name,
            phone,
            role,
            village_id,
        } = registration;

        let id = self.credentials.create_account(&email, &password).await?;
        let profile = User {
            id: id.clone(),
            email: email.trim().to_string(),
            phone,
            name,
            role,
            village_id,
            ..User::default()
        };

        let written = match to_fields(&profile) {
            Ok(fields) => self.store.put(USERS, id.as_str(), fields).await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            warn!(user_id = %id, error = %err, "profile write failed, removing credential");
            self.credentials.invalidate();
            return Err(match self.credentials.delete_account(&id).await {
                Ok(()) => BackendError::PartialFailure(format!(
                    "Registration failed: profile could not be saved ({err})"
                )),
                Err(cleanup) => {
                    error!(user_id = %id, error = %cleanup, "orphaned credential left behind");
                    BackendError::PartialFailure(format!(
                        "Registration failed: profile could not be saved ({err}) and account {id} could not be removed ({cleanup})"
                    ))
                }
            });
        }

        info!(user_id = %id, role = %profile.role, "user registered");
        match self.fetch_profile(&id).await {
            Ok(stored) => Ok(stored),
            Err(err) => {
                warn!(user_id = %id, error = %err, "could not re-read new profile");
                Ok(profile)
            }
        }
    }

    /// Verifies the credential and loads the profile. Deactivated accounts
    /// are refused and signed out again.
    pub async fn login(&self, email: &str, password: &str) -> Resource<User> {
        let result = async {
            let id = self.credentials.verify(email, password).await?;
            let user = match self.fetch_profile(&id).await {
                Ok(user) => user,
                Err(err) => {
                    self.credentials.invalidate();
                    return Err(err);
                }
            };
            if !user.is_active {
                warn!(user_id = %id, "login refused for deactivated account");
                self.credentials.invalidate();
                return Err(BackendError::rejected(DEACTIVATED));
            }
            info!(user_id = %id, "user logged in");
            Ok::<_, BackendError>(user)
        }
        .await;
        Resource::from_result_or(result, "Login failed")
    }

    pub fn logout(&self) {
        if let Some(id) = self.credentials.current_id() {
            info!(user_id = %id, "user logged out");
        }
        self.credentials.invalidate();
    }

    pub fn is_logged_in(&self) -> bool {
        self.credentials.current_id().is_some()
    }

    /// Reads any profile by id. Deactivated users are still returned.
    pub async fn get(&self, id: &UserId) -> Resource<User> {
        Resource::from_result_or(self.fetch_profile(id).await, "Failed to fetch user data")
    }

    pub async fn current_profile(&self) -> Resource<User> {
        let Some(id) = self.credentials.current_id() else {
            return Resource::error(SIGNED_OUT);
        };
        Resource::from_result_or(self.fetch_profile(&id).await, "Failed to fetch user data")
    }

    pub fn watch_current(&self) -> LiveResource<User> {
        let Some(id) = self.credentials.current_id() else {
            return LiveResource::rejected(SIGNED_OUT);
        };
        let feed = self.store.watch_document(USERS, id.as_str());
        LiveResource::from_feed(feed, "Error observing user", |doc| match doc {
            Some(doc) => from_document(doc),
            None => Err(BackendError::not_found(PROFILE_MISSING)),
        })
    }

    /// Patches the signed-in user's profile. An update naming no field
    /// succeeds without touching the store.
    pub async fn update_profile(&self, update: ProfileUpdate) -> Resource<()> {
        let Some(id) = self.credentials.current_id() else {
            return Resource::error(SIGNED_OUT);
        };
        let fields = update.into_fields();
        if fields.is_empty() {
            return Resource::Success(());
        }
        let result = self
            .store
            .update(USERS, id.as_str(), fields)
            .await
            .map_err(|err| name_missing(err, PROFILE_MISSING));
        Resource::from_result_or(result, "Failed to update profile")
    }

    pub async fn request_password_reset(&self, email: &str) -> Resource<()> {
        Resource::from_result_or(
            self.credentials.request_password_reset(email).await,
            "Failed to send reset email",
        )
    }
}
