use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub role: Role,
    pub api_key: String,
}

/// In-memory user registry, keyed both by id and by api key so auth
/// lookups and ownership checks are both O(1).
pub struct UserStore {
    by_id: RwLock<HashMap<UserId, User>>,
    by_name: RwLock<HashMap<String, UserId>>,
    by_api_key: RwLock<HashMap<String, UserId>>,
}

impl UserStore {
    pub fn new() -> Self {
        Self {
            by_id: RwLock::new(HashMap::new()),
            by_name: RwLock::new(HashMap::new()),
            by_api_key: RwLock::new(HashMap::new()),
        }
    }

    /// Registration is idempotent by name: registering the same name
    /// twice returns the existing user rather than minting a new one.
    pub fn register(&self, name: String, role: Role) -> User {
        if let Some(id) = self.by_name.read().unwrap().get(&name) {
            return self.by_id.read().unwrap()[id].clone();
        }
        let user = User {
            id: Uuid::new_v4(),
            name: name.clone(),
            role,
            api_key: Uuid::new_v4().to_string(),
        };
        self.by_id.write().unwrap().insert(user.id, user.clone());
        self.by_name.write().unwrap().insert(name, user.id);
        self.by_api_key
            .write()
            .unwrap()
            .insert(user.api_key.clone(), user.id);
        user
    }

    pub fn get(&self, id: UserId) -> Option<User> {
        self.by_id.read().unwrap().get(&id).cloned()
    }

    pub fn get_by_api_key(&self, api_key: &str) -> Option<User> {
        let id = *self.by_api_key.read().unwrap().get(api_key)?;
        self.by_id.read().unwrap().get(&id).cloned()
    }

    pub fn remove(&self, id: UserId) -> Option<User> {
        let user = self.by_id.write().unwrap().remove(&id)?;
        self.by_name.write().unwrap().remove(&user.name);
        self.by_api_key.write().unwrap().remove(&user.api_key);
        Some(user)
    }
}

impl Default for UserStore {
    fn default() -> Self {
        Self::new()
    }
}
