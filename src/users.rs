#![forbid(unsafe_code)]

// In-memory account store. Accounts share the process lifetime with the
// rest of the broker state; there is no persistence layer.

use std::collections::HashMap;
use std::sync::RwLock as StdRwLock;
use uuid::Uuid;

pub const ROLE_USER: &str = "user";

/// A registered account.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub password_hash: String,
    pub role: String,
}

/// Account registry keyed by unique account name.
pub struct UserStore {
    users: StdRwLock<HashMap<String, User>>,
}

impl UserStore {
    pub fn new() -> Self {
        Self {
            users: StdRwLock::new(HashMap::new()),
        }
    }

    /// Registers a new account. Returns `None` if the name is taken.
    pub fn register(&self, name: &str, password_hash: &str) -> Option<User> {
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        if users.contains_key(name) {
            return None;
        }

        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            password_hash: password_hash.to_string(),
            role: ROLE_USER.to_string(),
        };
        users.insert(name.to_string(), user.clone());
        Some(user)
    }

    /// Looks up an account by name.
    pub fn get(&self, name: &str) -> Option<User> {
        let users = self.users.read().unwrap_or_else(|e| e.into_inner());
        users.get(name).cloned()
    }
}

impl Default for UserStore {
    fn default() -> Self {
        Self::new()
    }
}
