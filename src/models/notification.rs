use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::i18n;
use crate::models::settings::UserSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TaskAssigned,
    TaskUpdated,
    TaskCompleted,
    CommentAdded,
    DueSoon,
    System,
}

impl NotificationKind {
    pub fn message_key(self) -> &'static str {
        match self {
            NotificationKind::TaskAssigned => "notification.task_assigned",
            NotificationKind::TaskUpdated => "notification.task_updated",
            NotificationKind::TaskCompleted => "notification.task_completed",
            NotificationKind::CommentAdded => "notification.comment_added",
            NotificationKind::DueSoon => "notification.due_soon",
            NotificationKind::System => "notification.system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub notification_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    #[serde(default)]
    pub read: bool,
    pub recipient_id: String,
    pub created_at: DateTime<Utc>,
    pub related_task_id: Option<String>,
    pub related_user_id: Option<String>,
}

/// Who and what a notification is about, before it is localized.
#[derive(Debug, Clone)]
pub struct NotificationDraft {
    pub recipient_id: String,
    pub kind: NotificationKind,
    pub args: Vec<(String, String)>,
    pub related_task_id: Option<String>,
    pub related_user_id: Option<String>,
}

impl NotificationDraft {
    pub fn new(recipient_id: &str, kind: NotificationKind) -> Self {
        NotificationDraft {
            recipient_id: recipient_id.to_string(),
            kind,
            args: Vec::new(),
            related_task_id: None,
            related_user_id: None,
        }
    }

    pub fn arg(mut self, name: &str, value: &str) -> Self {
        self.args.push((name.to_string(), value.to_string()));
        self
    }

    pub fn task(mut self, task_id: &str) -> Self {
        self.related_task_id = Some(task_id.to_string());
        self
    }

    pub fn from_user(mut self, user_id: &str) -> Self {
        self.related_user_id = Some(user_id.to_string());
        self
    }

    /// Renders the draft in the recipient's language. `None` when the
    /// recipient turned this kind off, or when they triggered it themselves.
    pub fn render(self, settings: &UserSettings, now: DateTime<Utc>) -> Option<Notification> {
        if self.related_user_id.as_deref() == Some(self.recipient_id.as_str())
            && self.kind != NotificationKind::System
        {
            return None;
        }
        if !settings.notifications.allows(self.kind) {
            return None;
        }
        let args: Vec<(&str, &str)> = self
            .args
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        Some(Notification {
            notification_id: Uuid::new_v4().to_string(),
            kind: self.kind,
            message: i18n::format(settings.language, self.kind.message_key(), &args),
            read: false,
            recipient_id: self.recipient_id,
            created_at: now,
            related_task_id: self.related_task_id,
            related_user_id: self.related_user_id,
        })
    }
}

/// Free-text notifications are always of the `system` kind.
#[derive(Debug, Deserialize)]
pub struct CreateNotificationRequest {
    pub recipient_id: String,
    pub message: String,
    pub related_task_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationQuery {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<i64>,
}

impl NotificationQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, 200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::Language;

    fn settings(lang: Language) -> UserSettings {
        let mut s = UserSettings::defaults_for("bob", Utc::now());
        s.language = lang;
        s
    }

    #[test]
    fn renders_in_recipient_language() {
        let n = NotificationDraft::new("bob", NotificationKind::TaskAssigned)
            .arg("title", "Deploy")
            .task("t1")
            .from_user("ana")
            .render(&settings(Language::En), Utc::now())
            .unwrap();
        assert_eq!(n.message, "You were assigned to \"Deploy\"");
        assert_eq!(n.related_task_id.as_deref(), Some("t1"));
        assert!(!n.read);
    }

    #[test]
    fn self_triggered_notifications_are_dropped() {
        let n = NotificationDraft::new("bob", NotificationKind::CommentAdded)
            .from_user("bob")
            .render(&settings(Language::PtBr), Utc::now());
        assert!(n.is_none());
    }

    #[test]
    fn disabled_toggle_drops_notification() {
        let mut s = settings(Language::PtBr);
        s.notifications.comments = false;
        let n = NotificationDraft::new("bob", NotificationKind::CommentAdded)
            .from_user("ana")
            .render(&s, Utc::now());
        assert!(n.is_none());
    }

    #[test]
    fn kind_serializes_as_type_field() {
        let n = NotificationDraft::new("bob", NotificationKind::System)
            .arg("message", "Maintenance tonight")
            .render(&settings(Language::Es), Utc::now())
            .unwrap();
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "system");
        assert_eq!(json["message"], "Maintenance tonight");
    }

    #[test]
    fn query_limit_is_clamped() {
        assert_eq!(NotificationQuery::default().limit(), 50);
        let q = NotificationQuery {
            unread_only: true,
            limit: Some(10_000),
        };
        assert_eq!(q.limit(), 200);
    }
}
