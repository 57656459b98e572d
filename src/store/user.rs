use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{Error, Result};

/// Lowest bcrypt work factor, keeping hashing fast in tests.
#[cfg(test)]
pub(crate) const TEST_COST: u32 = 4;

/// Stored credentials for one account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    /// Unique login name.
    pub username: String,
    /// Salted bcrypt hash of the password.
    pub hashed_password: String,
    /// Role label checked by the access policy.
    pub role: String,
}

impl User {
    /// Creates a user, hashing `password` with the default bcrypt cost.
    pub fn new(username: &str, password: &str, role: &str) -> Result<Self> {
        Self::with_cost(username, password, role, bcrypt::DEFAULT_COST)
    }

    /// Creates a user, hashing `password` with the given bcrypt cost.
    pub fn with_cost(username: &str, password: &str, role: &str, cost: u32) -> Result<Self> {
        let hashed_password = bcrypt::hash(password, cost)
            .map_err(|e| Error::Internal(format!("cannot hash password: {e}")))?;

        Ok(Self {
            username: username.to_string(),
            hashed_password,
            role: role.to_string(),
        })
    }

    /// Checks `password` against the stored hash.
    pub fn is_correct_password(&self, password: &str) -> bool {
        bcrypt::verify(password, &self.hashed_password).unwrap_or(false)
    }
}

/// Storage for user accounts.
#[tonic::async_trait]
pub trait UserStore: Send + Sync {
    /// Saves a new user. Existing usernames are never overwritten.
    async fn save(&self, user: &User) -> Result<()>;

    /// Returns a copy of the user named `username`.
    async fn find(&self, username: &str) -> Option<User>;
}

/// User store kept in memory.
#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    users: Arc<RwLock<HashMap<String, User>>>,
}

impl InMemoryUserStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[tonic::async_trait]
impl UserStore for InMemoryUserStore {
    async fn save(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().await;

        if users.contains_key(&user.username) {
            return Err(Error::AlreadyExists(format!("user '{}'", user.username)));
        }

        users.insert(user.username.clone(), user.clone());
        Ok(())
    }

    async fn find(&self, username: &str) -> Option<User> {
        self.users.read().await.get(username).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_check_uses_hash() {
        let user = User::with_cost("alice", "secret", "admin", TEST_COST).unwrap();

        assert_ne!(user.hashed_password, "secret");
        assert!(user.is_correct_password("secret"));
        assert!(!user.is_correct_password("Secret"));
    }

    #[test]
    fn same_password_hashes_differently() {
        let a = User::with_cost("a", "secret", "user", TEST_COST).unwrap();
        let b = User::with_cost("b", "secret", "user", TEST_COST).unwrap();

        assert_ne!(a.hashed_password, b.hashed_password);
    }

    #[tokio::test]
    async fn save_rejects_existing_username() {
        let store = InMemoryUserStore::new();
        let user = User::with_cost("alice", "secret", "admin", TEST_COST).unwrap();
        let other = User::with_cost("alice", "other", "user", TEST_COST).unwrap();

        store.save(&user).await.unwrap();
        let err = store.save(&other).await.unwrap_err();

        assert!(matches!(err, Error::AlreadyExists(_)));
        assert_eq!(store.find("alice").await.unwrap(), user);
    }

    #[tokio::test]
    async fn find_unknown_user_is_none() {
        let store = InMemoryUserStore::new();
        assert!(store.find("nobody").await.is_none());
    }
}
