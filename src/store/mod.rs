//! User records.
//!
//! The dashboard only needs to look users up by email and to create them;
//! everything else about persistence sits behind [`UserStore`].
use crate::auth::password::{PasswordError, hash_password, verify_password};
use async_trait::async_trait;
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const MIN_PASSWORD_LEN: usize = 6;

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("Please enter a valid email")]
    InvalidEmail,
    #[error("Password must be at least {MIN_PASSWORD_LEN} characters")]
    PasswordTooShort,
    #[error("User already exists")]
    Duplicate,
    #[error(transparent)]
    Password(#[from] PasswordError),
}

impl StoreError {
    /// Whether the caller sent bad input, as opposed to a store failure.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StoreError::Missing(_) | StoreError::InvalidEmail | StoreError::PasswordTooShort
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
}

/// Checked in place of a stored hash when the email is unknown.
static PLACEHOLDER_HASH: Lazy<String> =
    Lazy::new(|| hash_password("lookout-placeholder").expect("hashing a fixed password"));

fn hash_to_check(user: Option<&User>) -> &str {
    user.map_or(PLACEHOLDER_HASH.as_str(), |u| u.password_hash.as_str())
}

/// Compares `candidate` with the user's password hash on the blocking pool.
///
/// An unknown user (`None`) is still checked against a placeholder hash, so
/// both kinds of failed login cost one Argon2 verify. Returns the user only
/// when the password matches.
pub async fn authenticate(user: Option<User>, candidate: String) -> Result<Option<User>, StoreError> {
    tokio::task::spawn_blocking(move || -> Result<Option<User>, StoreError> {
        let matches = verify_password(&candidate, hash_to_check(user.as_ref()))?;
        Ok(user.filter(|_| matches))
    })
    .await
    .map_err(|e| PasswordError::Hash(e.to_string()))?
}

/// Registration input, also used for seed users in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn create(&self, user: NewUser) -> Result<User, StoreError>;
}

/// Users kept in process memory, keyed by normalized email.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    /// Creates every seed user, skipping ones that already exist.
    pub async fn seed(&self, users: &[NewUser]) -> Result<usize, StoreError> {
        let mut created = 0;
        for user in users {
            match self.create(user.clone()).await {
                Ok(_) => created += 1,
                Err(StoreError::Duplicate) => {}
                Err(e) => return Err(e),
            }
        }
        info!("Seeded {} users", created);
        Ok(created)
    }
}

fn validate(user: &NewUser) -> Result<(String, String), StoreError> {
    let name = user.name.trim();
    if name.is_empty() {
        return Err(StoreError::Missing("Name"));
    }
    let email = normalize_email(&user.email);
    if email.is_empty() {
        return Err(StoreError::Missing("Email"));
    }
    if !EMAIL.is_match(&email) {
        return Err(StoreError::InvalidEmail);
    }
    if user.password.is_empty() {
        return Err(StoreError::Missing("Password"));
    }
    if user.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(StoreError::PasswordTooShort);
    }
    Ok((name.to_owned(), email))
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = normalize_email(email);
        Ok(self.users.read().await.get(&email).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let (name, email) = validate(&user)?;
        if self.users.read().await.contains_key(&email) {
            return Err(StoreError::Duplicate);
        }

        let password = user.password;
        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| PasswordError::Hash(e.to_string()))??;

        let mut users = self.users.write().await;
        if users.contains_key(&email) {
            return Err(StoreError::Duplicate);
        }
        let record = User {
            id: Uuid::new_v4().to_string(),
            name,
            email: email.clone(),
            password_hash,
        };
        users.insert(email, record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str, password: &str) -> NewUser {
        NewUser {
            name: "Ana".into(),
            email: email.into(),
            password: password.into(),
        }
    }

    #[tokio::test]
    async fn create_and_find_case_insensitively() {
        let store = MemoryUserStore::new();
        let user = store.create(new_user(" Ana@Example.COM ", "secret1")).await.unwrap();
        assert_eq!(user.email, "ana@example.com");
        assert_ne!(user.password_hash, "secret1");

        let found = store.find_by_email("ANA@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert!(store.find_by_email("bob@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn authenticate_checks_the_stored_hash() {
        let store = MemoryUserStore::new();
        let user = store.create(new_user("ana@example.com", "secret1")).await.unwrap();

        let found = authenticate(Some(user.clone()), "secret1".into()).await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(user.id.clone()));
        assert!(authenticate(Some(user), "secret2".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_user_is_checked_against_placeholder() {
        let hash = hash_to_check(None);
        assert!(hash.starts_with("$argon2id$"));
        assert!(!verify_password("secret1", hash).unwrap());

        // Any candidate, including the placeholder's own password, fails without a user.
        assert!(authenticate(None, "secret1".into()).await.unwrap().is_none());
        assert!(authenticate(None, "lookout-placeholder".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_stored_hash_is_a_store_failure() {
        let user = User {
            id: "1".into(),
            name: "A".into(),
            email: "a@b.co".into(),
            password_hash: "plaintext".into(),
        };
        assert_eq!(hash_to_check(Some(&user)), "plaintext");

        let err = authenticate(Some(user), "plaintext".into()).await.unwrap_err();
        assert!(matches!(err, StoreError::Password(PasswordError::Malformed(_))));
        assert!(!err.is_validation());
    }

    #[tokio::test]
    async fn creation_rules() {
        let store = MemoryUserStore::new();
        assert!(matches!(
            store.create(new_user("not-an-email", "secret1")).await,
            Err(StoreError::InvalidEmail)
        ));
        assert!(matches!(
            store.create(new_user("a@b.co", "short")).await,
            Err(StoreError::PasswordTooShort)
        ));
        assert!(matches!(
            store.create(new_user("", "secret1")).await,
            Err(StoreError::Missing("Email"))
        ));

        store.create(new_user("a@b.co", "secret1")).await.unwrap();
        let duplicate = store.create(new_user("A@B.CO", "secret1")).await;
        assert!(matches!(duplicate, Err(StoreError::Duplicate)));
        assert!(!StoreError::Duplicate.is_validation());
    }

    #[tokio::test]
    async fn seeding_skips_existing_users() {
        let store = MemoryUserStore::new();
        let seeds = vec![new_user("a@b.co", "secret1"), new_user("c@d.co", "secret2")];
        assert_eq!(store.seed(&seeds).await.unwrap(), 2);
        assert_eq!(store.seed(&seeds).await.unwrap(), 0);
        assert_eq!(store.len().await, 2);
    }

    #[test]
    fn user_serialization_hides_hash() {
        let user = User {
            id: "1".into(),
            name: "A".into(),
            email: "a@b.co".into(),
            password_hash: "$argon2id$...".into(),
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
    }
}
