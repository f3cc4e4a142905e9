use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use shared::{domain::UserId, error::BackendError};
use sqlx::{Pool, Row, Sqlite};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{backend::CredentialProvider, transport};

const MIN_SECRET_LEN: usize = 6;

/// bcrypt work factor used for stored secrets.
pub const DEFAULT_HASH_COST: u32 = bcrypt::DEFAULT_COST;
/// Cheapest work factor bcrypt accepts. Meant for tests.
pub const MIN_HASH_COST: u32 = 4; // bcrypt::MIN_COST is private in bcrypt 0.15

/// Email/secret credentials kept in the `accounts` table, with the signed-in
/// account held in memory.
#[derive(Clone)]
pub struct SqliteCredentialProvider {
    pool: Pool<Sqlite>,
    hash_cost: u32,
    session: Arc<RwLock<Option<UserId>>>,
}

impl SqliteCredentialProvider {
    pub fn new(pool: Pool<Sqlite>, hash_cost: u32) -> Self {
        Self {
            pool,
            hash_cost,
            session: Arc::new(RwLock::new(None)),
        }
    }

    fn set_session(&self, id: Option<UserId>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = id;
    }
}

fn normalize_email(email: &str) -> Result<String, BackendError> {
    let email = email.trim().to_ascii_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    };
    if valid {
        Ok(email)
    } else {
        Err(BackendError::rejected("the email address is badly formatted"))
    }
}

async fn hash_secret(secret: &str, cost: u32) -> Result<String, BackendError> {
    let secret = secret.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(secret, cost))
        .await
        .map_err(|err| BackendError::transport(format!("password hashing aborted: {err}")))?
        .map_err(|err| BackendError::transport(format!("failed to hash password: {err}")))
}

async fn verify_secret(secret: &str, stored: String) -> Result<bool, BackendError> {
    let secret = secret.to_string();
    tokio::task::spawn_blocking(move || bcrypt::verify(secret, &stored))
        .await
        .map_err(|err| BackendError::transport(format!("password check aborted: {err}")))?
        .map_err(|err| BackendError::malformed(format!("stored password hash is unreadable: {err}")))
}

#[async_trait]
impl CredentialProvider for SqliteCredentialProvider {
    async fn create_account(&self, email: &str, secret: &str) -> Result<UserId, BackendError> {
        let email = normalize_email(email)?;
        if secret.chars().count() < MIN_SECRET_LEN {
            return Err(BackendError::rejected(format!(
                "password must be at least {MIN_SECRET_LEN} characters"
            )));
        }

        let uid = Uuid::new_v4().simple().to_string();
        let secret_hash = hash_secret(secret, self.hash_cost).await?;
        let inserted =
            sqlx::query("INSERT INTO accounts (uid, email, secret_hash) VALUES (?, ?, ?)")
                .bind(&uid)
                .bind(&email)
                .bind(secret_hash)
                .execute(&self.pool)
                .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(BackendError::rejected(
                    "the email address is already in use by another account",
                ));
            }
            Err(err) => return Err(transport(err)),
        }

        let id = UserId(uid);
        info!(user_id = %id, "account created");
        self.set_session(Some(id.clone()));
        Ok(id)
    }

    async fn verify(&self, email: &str, secret: &str) -> Result<UserId, BackendError> {
        let email = normalize_email(email)?;
        let row = sqlx::query("SELECT uid, secret_hash FROM accounts WHERE email = ?")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await
            .map_err(transport)?;

        let Some(row) = row else {
            return Err(BackendError::rejected("invalid email or password"));
        };
        if !verify_secret(secret, row.get::<String, _>(1)).await? {
            warn!("credential verification failed");
            return Err(BackendError::rejected("invalid email or password"));
        }

        let id = UserId(row.get::<String, _>(0));
        self.set_session(Some(id.clone()));
        Ok(id)
    }

    fn invalidate(&self) {
        self.set_session(None);
    }

    fn current_id(&self) -> Option<UserId> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn delete_account(&self, id: &UserId) -> Result<(), BackendError> {
        let deleted = sqlx::query("DELETE FROM accounts WHERE uid = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(transport)?;
        if deleted.rows_affected() == 0 {
            return Err(BackendError::not_found(format!("account {id} not found")));
        }
        if self.current_id().as_ref() == Some(id) {
            self.set_session(None);
        }
        info!(user_id = %id, "account deleted");
        Ok(())
    }

    async fn request_password_reset(&self, email: &str) -> Result<(), BackendError> {
        let email = normalize_email(email)?;
        let uid: Option<String> = sqlx::query_scalar("SELECT uid FROM accounts WHERE email = ?")
            .bind(&email)
            .fetch_optional(&self.pool)
            .await
            .map_err(transport)?;
        let Some(uid) = uid else {
            return Err(BackendError::not_found(
                "there is no account registered for this email",
            ));
        };

        sqlx::query("INSERT INTO password_reset_requests (request_id, uid, email) VALUES (?, ?, ?)")
            .bind(Uuid::new_v4().simple().to_string())
            .bind(&uid)
            .bind(&email)
            .execute(&self.pool)
            .await
            .map_err(transport)?;
        info!(user_id = %uid, "password reset requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_emails() {
        assert!(normalize_email("no-at-sign").is_err());
        assert!(normalize_email("a@b").is_err());
        assert!(normalize_email("@village.org").is_err());
        assert_eq!(
            normalize_email("  Admin@Village.ORG ").expect("email"),
            "admin@village.org"
        );
    }

    #[tokio::test]
    async fn stored_hash_is_salted_bcrypt() {
        let first = hash_secret("secret-1", MIN_HASH_COST).await.expect("hash");
        let second = hash_secret("secret-1", MIN_HASH_COST).await.expect("hash");
        assert!(first.starts_with("$2"));
        assert_ne!(first, second);
        assert!(!first.contains("secret-1"));

        assert!(verify_secret("secret-1", first.clone()).await.expect("verify"));
        assert!(!verify_secret("secret-2", first).await.expect("verify"));
    }

    #[tokio::test]
    async fn garbled_hash_is_malformed() {
        let err = verify_secret("secret-1", "not-a-hash".to_string())
            .await
            .expect_err("garbled");
        assert_eq!(err.code(), shared::error::ErrorCode::Malformed);
    }
}
