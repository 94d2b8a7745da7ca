use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Password,
    Google,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    /// bcrypt hash; absent for Google accounts.
    pub password_hash: Option<String>,
    pub provider: AuthProvider,
    pub created_at: DateTime<Utc>,
}

/// What the API returns about an account. Never includes the hash.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PublicUser {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub provider: AuthProvider,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        PublicUser {
            user_id: u.user_id.clone(),
            email: u.email.clone(),
            display_name: u.display_name.clone(),
            provider: u.provider,
        }
    }
}
