use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use mongodb::bson::{doc, to_bson, Document};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::team_member::AssigneeSummary;
use crate::models::{fold_label, require_text};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Medium, Priority::Low];

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    pub fn label_key(self) -> String {
        format!("priority.{}", self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match fold_label(s).as_str() {
            "high" | "alta" | "urgent" | "urgente" => Ok(Priority::High),
            "medium" | "media" | "normal" => Ok(Priority::Medium),
            "low" | "baixa" | "baja" => Ok(Priority::Low),
            _ => Err(format!("unknown priority: {}", s)),
        }
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored in canonical English form; the UI's Portuguese and Spanish labels
/// are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Canceled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::InProgress,
        TaskStatus::Completed,
        TaskStatus::Canceled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Canceled => "canceled",
        }
    }

    /// Completed and canceled tasks are never overdue.
    pub fn is_closed(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Canceled)
    }

    pub fn label_key(self) -> String {
        format!("status.{}", self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match fold_label(s).as_str() {
            "pending" | "pendente" | "pendiente" | "todo" | "to-do" => Ok(TaskStatus::Pending),
            "in-progress" | "inprogress" | "em-andamento" | "andamento" | "em-progresso"
            | "en-progreso" | "doing" => Ok(TaskStatus::InProgress),
            "completed" | "complete" | "done" | "concluida" | "concluido" | "completada" => {
                Ok(TaskStatus::Completed)
            }
            "canceled" | "cancelled" | "cancelada" | "cancelado" => Ok(TaskStatus::Canceled),
            _ => Err(format!("unknown status: {}", s)),
        }
    }
}

impl<'de> Deserialize<'de> for TaskStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task comment. Replies nest to any depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub comment_id: String,
    pub author_id: String,
    #[serde(default)]
    pub author_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub replies: Vec<Comment>,
}

impl Comment {
    pub fn new(author_id: &str, author_name: &str, text: &str, now: DateTime<Utc>) -> ApiResult<Self> {
        Ok(Comment {
            comment_id: Uuid::new_v4().to_string(),
            author_id: author_id.to_string(),
            author_name: author_name.to_string(),
            text: require_text("text", text)?,
            created_at: now,
            replies: Vec::new(),
        })
    }
}

/// Depth-first search for a comment by id, replies included.
pub fn find_comment_mut<'a>(comments: &'a mut [Comment], comment_id: &str) -> Option<&'a mut Comment> {
    for comment in comments.iter_mut() {
        if comment.comment_id == comment_id {
            return Some(comment);
        }
        if let Some(found) = find_comment_mut(&mut comment.replies, comment_id) {
            return Some(found);
        }
    }
    None
}

pub fn count_comments(comments: &[Comment]) -> usize {
    comments
        .iter()
        .map(|c| 1 + count_comments(&c.replies))
        .sum()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    /// Owner; the user who created the task.
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub status: TaskStatus,
    /// Team member id. Not checked against `membros`.
    pub assignee_id: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_closed() && self.due_date.map_or(false, |due| due < now)
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

/// Task plus what the UI shows next to it. `assignee` is `None` both for
/// unassigned tasks and for ids that no longer match a team member.
#[derive(Debug, Serialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub task: Task,
    pub assignee: Option<AssigneeSummary>,
    pub overdue: bool,
    pub comment_count: usize,
}

impl TaskDetail {
    pub fn new(task: Task, assignee: Option<AssigneeSummary>, now: DateTime<Utc>) -> Self {
        let overdue = task.is_overdue(now);
        let comment_count = count_comments(&task.comments);
        TaskDetail {
            task,
            assignee,
            overdue,
            comment_count,
        }
    }
}

fn check_dates(start: Option<DateTime<Utc>>, due: Option<DateTime<Utc>>) -> ApiResult<()> {
    if let (Some(start), Some(due)) = (start, due) {
        if due < start {
            return Err(ApiError::BadRequest(
                "due_date must not precede start_date".to_string(),
            ));
        }
    }
    Ok(())
}

fn clean_id(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<TaskStatus>,
    pub assignee_id: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
}

impl CreateTaskRequest {
    pub fn into_task(self, owner_id: &str, now: DateTime<Utc>) -> ApiResult<Task> {
        let title = require_text("title", &self.title)?;
        check_dates(self.start_date, self.due_date)?;
        let status = self.status.unwrap_or_default();

        Ok(Task {
            task_id: Uuid::new_v4().to_string(),
            user_id: owner_id.to_string(),
            title,
            description: self.description.unwrap_or_default().trim().to_string(),
            priority: self.priority.unwrap_or_default(),
            status,
            assignee_id: clean_id(self.assignee_id),
            start_date: self.start_date,
            due_date: self.due_date,
            completed_at: (status == TaskStatus::Completed).then_some(now),
            comments: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial update. An empty `assignee_id` unassigns the task.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<TaskStatus>,
    pub assignee_id: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
}

/// The Mongo update plus the transitions other modules react to.
#[derive(Debug)]
pub struct TaskChanges {
    pub update: Document,
    pub fields: Vec<&'static str>,
    pub new_status: Option<TaskStatus>,
    pub new_assignee: Option<String>,
}

impl UpdateTaskRequest {
    pub fn changes(&self, current: &Task, now: DateTime<Utc>) -> ApiResult<TaskChanges> {
        let mut set = Document::new();
        let mut unset = Document::new();
        let mut fields = Vec::new();
        let mut new_status = None;
        let mut new_assignee = None;

        if let Some(title) = &self.title {
            set.insert("title", require_text("title", title)?);
            fields.push("title");
        }
        if let Some(description) = &self.description {
            set.insert("description", description.trim());
            fields.push("description");
        }
        if let Some(priority) = self.priority {
            set.insert("priority", priority.as_str());
            fields.push("priority");
        }
        if let Some(status) = self.status {
            set.insert("status", status.as_str());
            fields.push("status");
            if status != current.status {
                new_status = Some(status);
                if status == TaskStatus::Completed {
                    set.insert("completed_at", to_bson(&now)?);
                } else if current.status == TaskStatus::Completed {
                    unset.insert("completed_at", "");
                }
            }
        }
        if let Some(assignee) = &self.assignee_id {
            let assignee = assignee.trim();
            if assignee.is_empty() {
                unset.insert("assignee_id", "");
            } else {
                set.insert("assignee_id", assignee);
                if current.assignee_id.as_deref() != Some(assignee) {
                    new_assignee = Some(assignee.to_string());
                }
            }
            fields.push("assignee_id");
        }
        if self.start_date.is_some() || self.due_date.is_some() {
            check_dates(
                self.start_date.or(current.start_date),
                self.due_date.or(current.due_date),
            )?;
        }
        if let Some(start) = &self.start_date {
            set.insert("start_date", to_bson(start)?);
            fields.push("start_date");
        }
        if let Some(due) = &self.due_date {
            set.insert("due_date", to_bson(due)?);
            fields.push("due_date");
        }

        if fields.is_empty() {
            return Err(ApiError::BadRequest("No fields to update".to_string()));
        }
        set.insert("updated_at", to_bson(&now)?);

        let mut update = doc! { "$set": set };
        if !unset.is_empty() {
            update.insert("$unset", unset);
        }
        Ok(TaskChanges {
            update,
            fields,
            new_status,
            new_assignee,
        })
    }
}

/// Query-string filters for the task list. `assignee=none` selects
/// unassigned tasks.
#[derive(Debug, Default, Deserialize)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assignee: Option<String>,
    pub q: Option<String>,
    pub overdue: Option<bool>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task, now: DateTime<Utc>) -> bool {
        if self.status.map_or(false, |s| s != task.status) {
            return false;
        }
        if self.priority.map_or(false, |p| p != task.priority) {
            return false;
        }
        match self.assignee.as_deref().map(str::trim) {
            Some("none") => {
                if task.assignee_id.is_some() {
                    return false;
                }
            }
            Some(id) if !id.is_empty() => {
                if task.assignee_id.as_deref() != Some(id) {
                    return false;
                }
            }
            _ => {}
        }
        if let Some(q) = self.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let needle = q.to_lowercase();
            if !task.title.to_lowercase().contains(&needle)
                && !task.description.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if let Some(overdue) = self.overdue {
            if task.is_overdue(now) != overdue {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 15, 12, 0, 0).unwrap()
    }

    fn task(title: &str) -> Task {
        CreateTaskRequest {
            title: title.to_string(),
            description: Some("write the release notes".to_string()),
            priority: None,
            status: None,
            assignee_id: None,
            start_date: None,
            due_date: None,
        }
        .into_task("owner-1", now())
        .unwrap()
    }

    #[test]
    fn status_accepts_localized_labels() {
        assert_eq!("Em andamento".parse::<TaskStatus>().unwrap(), TaskStatus::InProgress);
        assert_eq!("concluída".parse::<TaskStatus>().unwrap(), TaskStatus::Completed);
        assert_eq!("Pendente".parse::<TaskStatus>().unwrap(), TaskStatus::Pending);
        assert_eq!("cancelled".parse::<TaskStatus>().unwrap(), TaskStatus::Canceled);
        assert!("blocked".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn priority_accepts_localized_labels() {
        assert_eq!("Alta".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!("média".parse::<Priority>().unwrap(), Priority::Medium);
        assert_eq!("baixa".parse::<Priority>().unwrap(), Priority::Low);
        assert!("whenever".parse::<Priority>().is_err());
    }

    #[test]
    fn status_serializes_canonically() {
        let parsed: TaskStatus = serde_json::from_str("\"em-andamento\"").unwrap();
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"in-progress\"");
    }

    #[test]
    fn create_rejects_blank_title() {
        let req = CreateTaskRequest {
            title: "   ".to_string(),
            description: None,
            priority: None,
            status: None,
            assignee_id: None,
            start_date: None,
            due_date: None,
        };
        assert!(matches!(req.into_task("u", now()), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn create_rejects_due_before_start() {
        let req = CreateTaskRequest {
            title: "Plan".to_string(),
            description: None,
            priority: Some(Priority::High),
            status: None,
            assignee_id: None,
            start_date: Some(now()),
            due_date: Some(now() - Duration::days(1)),
        };
        assert!(req.into_task("u", now()).is_err());
    }

    #[test]
    fn create_fills_defaults_and_stamps_completion() {
        let t = task("  Release  ");
        assert_eq!(t.title, "Release");
        assert_eq!(t.priority, Priority::Medium);
        assert_eq!(t.status, TaskStatus::Pending);
        assert!(t.completed_at.is_none());

        let done = CreateTaskRequest {
            title: "Done already".to_string(),
            description: None,
            priority: None,
            status: Some(TaskStatus::Completed),
            assignee_id: Some("  ".to_string()),
            start_date: None,
            due_date: None,
        }
        .into_task("u", now())
        .unwrap();
        assert_eq!(done.completed_at, Some(now()));
        assert!(done.assignee_id.is_none());
    }

    #[test]
    fn empty_update_is_rejected() {
        let current = task("x");
        let err = UpdateTaskRequest::default().changes(&current, now()).unwrap_err();
        assert_eq!(err.to_string(), "No fields to update");
    }

    #[test]
    fn update_only_sets_given_fields() {
        let current = task("x");
        let req = UpdateTaskRequest {
            priority: Some(Priority::Low),
            ..Default::default()
        };
        let changes = req.changes(&current, now()).unwrap();
        let set = changes.update.get_document("$set").unwrap();
        assert_eq!(set.get_str("priority").unwrap(), "low");
        assert!(set.contains_key("updated_at"));
        assert!(!set.contains_key("title"));
        assert!(!changes.update.contains_key("$unset"));
        assert_eq!(changes.fields, vec!["priority"]);
    }

    #[test]
    fn completing_stamps_and_reopening_clears_completed_at() {
        let mut current = task("x");
        let req = UpdateTaskRequest {
            status: Some(TaskStatus::Completed),
            ..Default::default()
        };
        let changes = req.changes(&current, now()).unwrap();
        assert_eq!(changes.new_status, Some(TaskStatus::Completed));
        assert!(changes
            .update
            .get_document("$set")
            .unwrap()
            .contains_key("completed_at"));

        current.status = TaskStatus::Completed;
        current.completed_at = Some(now());
        let reopen = UpdateTaskRequest {
            status: Some(TaskStatus::InProgress),
            ..Default::default()
        };
        let changes = reopen.changes(&current, now()).unwrap();
        assert!(changes
            .update
            .get_document("$unset")
            .unwrap()
            .contains_key("completed_at"));
    }

    #[test]
    fn assignment_changes_are_reported_once() {
        let mut current = task("x");
        let req = UpdateTaskRequest {
            assignee_id: Some("member-9".to_string()),
            ..Default::default()
        };
        assert_eq!(
            req.changes(&current, now()).unwrap().new_assignee.as_deref(),
            Some("member-9")
        );

        current.assignee_id = Some("member-9".to_string());
        assert!(req.changes(&current, now()).unwrap().new_assignee.is_none());

        let unassign = UpdateTaskRequest {
            assignee_id: Some(String::new()),
            ..Default::default()
        };
        let changes = unassign.changes(&current, now()).unwrap();
        assert!(changes
            .update
            .get_document("$unset")
            .unwrap()
            .contains_key("assignee_id"));
    }

    #[test]
    fn update_checks_dates_against_stored_values() {
        let mut current = task("x");
        current.start_date = Some(now());
        let req = UpdateTaskRequest {
            due_date: Some(now() - Duration::hours(2)),
            ..Default::default()
        };
        assert!(req.changes(&current, now()).is_err());
    }

    #[test]
    fn filter_hides_non_matching_tasks() {
        let mut a = task("Fix login bug");
        a.priority = Priority::High;
        a.assignee_id = Some("m1".to_string());
        let mut b = task("Write docs");
        b.description = "LOGIN page copy".to_string();
        b.status = TaskStatus::InProgress;

        let by_priority = TaskFilter {
            priority: Some(Priority::High),
            ..Default::default()
        };
        assert!(by_priority.matches(&a, now()));
        assert!(!by_priority.matches(&b, now()));

        let search = TaskFilter {
            q: Some("login".to_string()),
            ..Default::default()
        };
        assert!(search.matches(&a, now()));
        assert!(search.matches(&b, now()));

        let unassigned = TaskFilter {
            assignee: Some("none".to_string()),
            ..Default::default()
        };
        assert!(!unassigned.matches(&a, now()));
        assert!(unassigned.matches(&b, now()));

        let status = TaskFilter {
            status: Some(TaskStatus::InProgress),
            ..Default::default()
        };
        assert!(!status.matches(&a, now()));
        assert!(status.matches(&b, now()));
    }

    #[test]
    fn overdue_ignores_closed_tasks() {
        let mut t = task("x");
        t.due_date = Some(now() - Duration::days(1));
        assert!(t.is_overdue(now()));
        t.status = TaskStatus::Canceled;
        assert!(!t.is_overdue(now()));

        let only_overdue = TaskFilter {
            overdue: Some(true),
            ..Default::default()
        };
        assert!(!only_overdue.matches(&t, now()));
    }

    #[test]
    fn replies_nest_under_any_comment() {
        let mut comments = vec![Comment::new("u1", "Ana", "first", now()).unwrap()];
        let root_id = comments[0].comment_id.clone();

        let reply = Comment::new("u2", "Bia", "reply", now()).unwrap();
        let reply_id = reply.comment_id.clone();
        find_comment_mut(&mut comments, &root_id).unwrap().replies.push(reply);

        let deep = Comment::new("u1", "Ana", "deeper", now()).unwrap();
        find_comment_mut(&mut comments, &reply_id).unwrap().replies.push(deep);

        assert_eq!(comments[0].replies[0].replies[0].text, "deeper");
        assert_eq!(count_comments(&comments), 3);
        assert!(find_comment_mut(&mut comments, "missing").is_none());
    }

    #[test]
    fn blank_comment_is_rejected() {
        assert!(Comment::new("u", "n", "  ", now()).is_err());
    }

    #[test]
    fn legacy_documents_without_optional_fields_still_load() {
        let raw = serde_json::json!({
            "task_id": "t1",
            "user_id": "u1",
            "title": "Old",
            "assignee_id": null,
            "start_date": null,
            "due_date": null,
            "completed_at": null,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        });
        let t: Task = serde_json::from_value(raw).unwrap();
        assert_eq!(t.status, TaskStatus::Pending);
        assert!(t.comments.is_empty());
    }
}
