use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    StatusChange,
    Assign,
    Comment,
    Login,
    Logout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Task,
    TeamMember,
    Notification,
    Settings,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditActivity {
    pub activity_id: String,
    pub action: AuditAction,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub actor_id: String,
    pub actor_email: String,
    #[serde(default)]
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditActivity {
    pub fn new(
        action: AuditAction,
        entity_type: EntityType,
        entity_id: &str,
        actor_id: &str,
        actor_email: &str,
        details: impl Into<String>,
    ) -> Self {
        AuditActivity {
            activity_id: Uuid::new_v4().to_string(),
            action,
            entity_type,
            entity_id: entity_id.to_string(),
            actor_id: actor_id.to_string(),
            actor_email: actor_email.to_string(),
            details: details.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<String>,
    pub action: Option<AuditAction>,
    pub limit: Option<i64>,
}

impl AuditQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, 200)
    }
}
