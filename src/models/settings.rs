use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::i18n::Language;
use crate::models::notification::NotificationKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPrefs {
    pub email: bool,
    pub push: bool,
    pub task_assigned: bool,
    pub task_due: bool,
    pub comments: bool,
}

impl Default for NotificationPrefs {
    fn default() -> Self {
        NotificationPrefs {
            email: true,
            push: true,
            task_assigned: true,
            task_due: true,
            comments: true,
        }
    }
}

impl NotificationPrefs {
    /// Whether an in-app notification of `kind` should be delivered.
    /// System messages always go through.
    pub fn allows(&self, kind: NotificationKind) -> bool {
        match kind {
            NotificationKind::TaskAssigned => self.task_assigned,
            NotificationKind::TaskUpdated | NotificationKind::TaskCompleted => self.task_assigned,
            NotificationKind::CommentAdded => self.comments,
            NotificationKind::DueSoon => self.task_due,
            NotificationKind::System => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub user_id: String,
    #[serde(default)]
    pub theme: Theme,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub notifications: NotificationPrefs,
    pub updated_at: DateTime<Utc>,
}

impl UserSettings {
    pub fn defaults_for(user_id: &str, now: DateTime<Utc>) -> Self {
        UserSettings {
            user_id: user_id.to_string(),
            theme: Theme::default(),
            language: Language::default(),
            notifications: NotificationPrefs::default(),
            updated_at: now,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NotificationPrefsPatch {
    pub email: Option<bool>,
    pub push: Option<bool>,
    pub task_assigned: Option<bool>,
    pub task_due: Option<bool>,
    pub comments: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateSettingsRequest {
    pub theme: Option<Theme>,
    pub language: Option<Language>,
    pub notifications: Option<NotificationPrefsPatch>,
}

impl UpdateSettingsRequest {
    pub fn is_empty(&self) -> bool {
        self.theme.is_none() && self.language.is_none() && self.notifications.is_none()
    }

    pub fn apply(&self, settings: &mut UserSettings, now: DateTime<Utc>) {
        if let Some(theme) = self.theme {
            settings.theme = theme;
        }
        if let Some(language) = self.language {
            settings.language = language;
        }
        if let Some(patch) = &self.notifications {
            let prefs = &mut settings.notifications;
            prefs.email = patch.email.unwrap_or(prefs.email);
            prefs.push = patch.push.unwrap_or(prefs.push);
            prefs.task_assigned = patch.task_assigned.unwrap_or(prefs.task_assigned);
            prefs.task_due = patch.task_due.unwrap_or(prefs.task_due);
            prefs.comments = patch.comments.unwrap_or(prefs.comments);
        }
        settings.updated_at = now;
    }
}
