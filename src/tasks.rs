// src/tasks.rs

use std::collections::HashMap;

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use futures::stream::TryStreamExt;
use log::{debug, error, info, warn};
use mongodb::bson::{doc, to_bson, Document};
use serde::Deserialize;

use crate::app_state::AppState;
use crate::audit;
use crate::auth::{current_user, Claims};
use crate::db::{MongoDB, TASKS};
use crate::error::{ApiError, ApiResult};
use crate::live_feed::{ChangeEvent, ChangeKind};
use crate::models::audit::{AuditAction, AuditActivity, EntityType};
use crate::models::notification::{NotificationDraft, NotificationKind};
use crate::models::task::{
    find_comment_mut, Comment, CreateTaskRequest, Task, TaskDetail, TaskFilter, TaskStatus,
    UpdateTaskRequest,
};
use crate::models::team_member::{AssigneeSummary, TeamMember};
use crate::notifications::notify;
use crate::team_members::{find_member, linked_member_ids};

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub text: String,
}

/// Tasks a user owns, plus tasks assigned to any member linked to them.
fn visibility_filter(user_id: &str, member_ids: &[String]) -> Document {
    if member_ids.is_empty() {
        return doc! { "user_id": user_id };
    }
    doc! {
        "$or": [
            { "user_id": user_id },
            { "assignee_id": { "$in": member_ids.to_vec() } },
        ]
    }
}

fn can_see(task: &Task, user_id: &str, member_ids: &[String]) -> bool {
    task.is_owned_by(user_id)
        || task
            .assignee_id
            .as_ref()
            .map_or(false, |a| member_ids.contains(a))
}

/// Newest first.
fn sort_newest_first(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Every task `user_id` can see, newest first.
pub async fn load_visible_tasks(db: &MongoDB, user_id: &str) -> ApiResult<Vec<Task>> {
    let member_ids = linked_member_ids(db, user_id).await?;
    let mut tasks: Vec<Task> = db
        .tasks()
        .find(visibility_filter(user_id, &member_ids))
        .await?
        .try_collect()
        .await?;
    sort_newest_first(&mut tasks);
    Ok(tasks)
}

pub async fn load_members_by_id(db: &MongoDB) -> ApiResult<HashMap<String, TeamMember>> {
    let members: Vec<TeamMember> = db.members().find(doc! {}).await?.try_collect().await?;
    Ok(members
        .into_iter()
        .map(|m| (m.member_id.clone(), m))
        .collect())
}

/// Loads a task the caller may see. Hidden tasks look like missing ones.
async fn find_visible_task(db: &MongoDB, claims: &Claims, task_id: &str) -> ApiResult<Task> {
    let task = db
        .tasks()
        .find_one(doc! { "task_id": task_id })
        .await?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;
    if task.is_owned_by(&claims.sub) {
        return Ok(task);
    }
    let member_ids = linked_member_ids(db, &claims.sub).await?;
    if can_see(&task, &claims.sub, &member_ids) {
        Ok(task)
    } else {
        Err(ApiError::NotFound("Task not found".to_string()))
    }
}

/// Account behind an assignee id. `None` for unlinked or dangling members.
async fn assignee_user(db: &MongoDB, assignee_id: Option<&str>) -> Option<String> {
    let assignee_id = assignee_id?;
    match find_member(db, assignee_id).await {
        Ok(Some(member)) => member.user_id,
        Ok(None) => {
            debug!("Assignee {} does not match a team member", assignee_id);
            None
        }
        Err(e) => {
            error!("Error resolving assignee {}: {}", assignee_id, e);
            None
        }
    }
}

async fn detail(db: &MongoDB, task: Task) -> TaskDetail {
    let assignee = match task.assignee_id.as_deref() {
        Some(id) => find_member(db, id)
            .await
            .ok()
            .flatten()
            .map(|m| AssigneeSummary::from(&m)),
        None => None,
    };
    TaskDetail::new(task, assignee, Utc::now())
}

fn task_recipients(task: &Task, assignee_user: Option<&str>) -> Vec<String> {
    let mut recipients = vec![task.user_id.clone()];
    if let Some(user_id) = assignee_user {
        recipients.push(user_id.to_string());
    }
    recipients
}

async fn author_name(db: &MongoDB, claims: &Claims) -> String {
    match db.users().find_one(doc! { "user_id": &claims.sub }).await {
        Ok(Some(user)) => user.display_name,
        _ => claims.email.clone(),
    }
}

fn publish_task(data: &AppState, task: &Task, assignee_user: Option<&str>, change: ChangeKind) {
    data.publish(
        task_recipients(task, assignee_user),
        ChangeEvent::new(TASKS, change, &task.task_id, task),
    );
}

/// POST /tasks
pub async fn create_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateTaskRequest>,
) -> ApiResult<HttpResponse> {
    let claims = current_user(&req)?;
    let task = payload.into_inner().into_task(&claims.sub, Utc::now())?;

    data.mongodb.tasks().insert_one(&task).await?;
    info!("Task created: {}", task.task_id);

    audit::record(
        &data.mongodb,
        AuditActivity::new(
            AuditAction::Create,
            EntityType::Task,
            &task.task_id,
            &claims.sub,
            &claims.email,
            format!("title: {}", task.title),
        ),
    )
    .await;

    let assignee = assignee_user(&data.mongodb, task.assignee_id.as_deref()).await;
    if let Some(user_id) = assignee.as_deref() {
        notify(
            &data,
            NotificationDraft::new(user_id, NotificationKind::TaskAssigned)
                .arg("title", &task.title)
                .task(&task.task_id)
                .from_user(&claims.sub),
        )
        .await;
    }
    publish_task(&data, &task, assignee.as_deref(), ChangeKind::Added);

    Ok(HttpResponse::Created().json(detail(&data.mongodb, task).await))
}

/// GET /tasks
pub async fn list_tasks(
    req: HttpRequest,
    data: web::Data<AppState>,
    filter: web::Query<TaskFilter>,
) -> ApiResult<HttpResponse> {
    let claims = current_user(&req)?;
    let now = Utc::now();
    let tasks = load_visible_tasks(&data.mongodb, &claims.sub).await?;
    let members = load_members_by_id(&data.mongodb).await?;

    let details: Vec<TaskDetail> = tasks
        .into_iter()
        .filter(|t| filter.matches(t, now))
        .map(|t| {
            let assignee = t
                .assignee_id
                .as_ref()
                .and_then(|id| members.get(id))
                .map(AssigneeSummary::from);
            TaskDetail::new(t, assignee, now)
        })
        .collect();
    Ok(HttpResponse::Ok().json(details))
}

/// GET /tasks/{task_id}
pub async fn get_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    task_id: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let claims = current_user(&req)?;
    let task = find_visible_task(&data.mongodb, &claims, &task_id).await?;
    Ok(HttpResponse::Ok().json(detail(&data.mongodb, task).await))
}

fn audit_action_for(new_status: Option<TaskStatus>, new_assignee: Option<&str>) -> AuditAction {
    if new_status.is_some() {
        AuditAction::StatusChange
    } else if new_assignee.is_some() {
        AuditAction::Assign
    } else {
        AuditAction::Update
    }
}

/// PUT /tasks/{task_id}
pub async fn update_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    task_id: web::Path<String>,
    payload: web::Json<UpdateTaskRequest>,
) -> ApiResult<HttpResponse> {
    let claims = current_user(&req)?;
    let current = find_visible_task(&data.mongodb, &claims, &task_id).await?;
    let changes = payload.changes(&current, Utc::now())?;

    let tasks = data.mongodb.tasks();
    let filter = doc! { "task_id": &current.task_id };
    let res = tasks.update_one(filter.clone(), changes.update).await?;
    if res.matched_count == 0 {
        return Err(ApiError::NotFound("Task not found".to_string()));
    }
    let task = tasks
        .find_one(filter)
        .await?
        .ok_or_else(|| ApiError::Internal("Task updated but could not be re-fetched".to_string()))?;

    audit::record(
        &data.mongodb,
        AuditActivity::new(
            audit_action_for(changes.new_status, changes.new_assignee.as_deref()),
            EntityType::Task,
            &task.task_id,
            &claims.sub,
            &claims.email,
            format!("fields: {}", changes.fields.join(", ")),
        ),
    )
    .await;

    let assignee = assignee_user(&data.mongodb, task.assignee_id.as_deref()).await;
    if let (Some(_), Some(user_id)) = (&changes.new_assignee, assignee.as_deref()) {
        notify(
            &data,
            NotificationDraft::new(user_id, NotificationKind::TaskAssigned)
                .arg("title", &task.title)
                .task(&task.task_id)
                .from_user(&claims.sub),
        )
        .await;
    }
    if changes.new_status == Some(TaskStatus::Completed) {
        notify(
            &data,
            NotificationDraft::new(&task.user_id, NotificationKind::TaskCompleted)
                .arg("title", &task.title)
                .task(&task.task_id)
                .from_user(&claims.sub),
        )
        .await;
    } else if changes.new_assignee.is_none() {
        if let Some(user_id) = assignee.as_deref() {
            notify(
                &data,
                NotificationDraft::new(user_id, NotificationKind::TaskUpdated)
                    .arg("title", &task.title)
                    .task(&task.task_id)
                    .from_user(&claims.sub),
            )
            .await;
        }
    }

    let mut recipients = task_recipients(&task, assignee.as_deref());
    // A reassignment must also reach the previous assignee's open lists.
    if current.assignee_id != task.assignee_id {
        if let Some(previous) = assignee_user(&data.mongodb, current.assignee_id.as_deref()).await {
            recipients.push(previous);
        }
    }
    data.publish(
        recipients,
        ChangeEvent::new(TASKS, ChangeKind::Modified, &task.task_id, &task),
    );

    Ok(HttpResponse::Ok().json(detail(&data.mongodb, task).await))
}

/// DELETE /tasks/{task_id}
/// Only the owner may delete.
pub async fn delete_task(
    req: HttpRequest,
    data: web::Data<AppState>,
    task_id: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let claims = current_user(&req)?;
    let task = find_visible_task(&data.mongodb, &claims, &task_id).await?;
    if !task.is_owned_by(&claims.sub) {
        warn!("User {} tried to delete task {} they do not own", claims.sub, task.task_id);
        return Err(ApiError::Forbidden("Only the owner can delete a task".to_string()));
    }

    let res = data
        .mongodb
        .tasks()
        .delete_one(doc! { "task_id": &task.task_id })
        .await?;
    if res.deleted_count == 0 {
        return Err(ApiError::NotFound("Task not found or already deleted".to_string()));
    }

    audit::record(
        &data.mongodb,
        AuditActivity::new(
            AuditAction::Delete,
            EntityType::Task,
            &task.task_id,
            &claims.sub,
            &claims.email,
            format!("title: {}", task.title),
        ),
    )
    .await;
    let assignee = assignee_user(&data.mongodb, task.assignee_id.as_deref()).await;
    data.publish(
        task_recipients(&task, assignee.as_deref()),
        ChangeEvent::removed(TASKS, &task.task_id),
    );
    Ok(HttpResponse::NoContent().finish())
}

async fn after_comment(data: &AppState, claims: &Claims, task: &Task, author: &str, now: DateTime<Utc>) {
    audit::record(
        &data.mongodb,
        AuditActivity::new(
            AuditAction::Comment,
            EntityType::Task,
            &task.task_id,
            &claims.sub,
            &claims.email,
            format!("at {}", now.to_rfc3339()),
        ),
    )
    .await;

    let assignee = assignee_user(&data.mongodb, task.assignee_id.as_deref()).await;
    for recipient in task_recipients(task, assignee.as_deref()) {
        notify(
            data,
            NotificationDraft::new(&recipient, NotificationKind::CommentAdded)
                .arg("author", author)
                .arg("title", &task.title)
                .task(&task.task_id)
                .from_user(&claims.sub),
        )
        .await;
    }
    publish_task(data, task, assignee.as_deref(), ChangeKind::Modified);
}

/// POST /tasks/{task_id}/comments
pub async fn add_comment(
    req: HttpRequest,
    data: web::Data<AppState>,
    task_id: web::Path<String>,
    payload: web::Json<CommentRequest>,
) -> ApiResult<HttpResponse> {
    let claims = current_user(&req)?;
    let mut task = find_visible_task(&data.mongodb, &claims, &task_id).await?;
    let now = Utc::now();
    let author = author_name(&data.mongodb, &claims).await;
    let comment = Comment::new(&claims.sub, &author, &payload.text, now)?;

    data.mongodb
        .tasks()
        .update_one(
            doc! { "task_id": &task.task_id },
            doc! {
                "$push": { "comments": to_bson(&comment)? },
                "$set": { "updated_at": to_bson(&now)? },
            },
        )
        .await?;
    task.comments.push(comment.clone());
    task.updated_at = now;

    after_comment(&data, &claims, &task, &author, now).await;
    Ok(HttpResponse::Created().json(comment))
}

/// Matches the task only while `updated_at` is still `seen`.
fn unchanged_since(task_id: &str, seen: &DateTime<Utc>) -> ApiResult<Document> {
    Ok(doc! { "task_id": task_id, "updated_at": to_bson(seen)? })
}

/// POST /tasks/{task_id}/comments/{comment_id}/replies
/// The whole comment tree is rewritten, so the write only lands if the task
/// was not touched since it was read; otherwise 409 and the client retries.
pub async fn reply_to_comment(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>, // (task_id, comment_id)
    payload: web::Json<CommentRequest>,
) -> ApiResult<HttpResponse> {
    let (task_id, comment_id) = path.into_inner();
    let claims = current_user(&req)?;
    let mut task = find_visible_task(&data.mongodb, &claims, &task_id).await?;
    let now = Utc::now();
    let author = author_name(&data.mongodb, &claims).await;
    let reply = Comment::new(&claims.sub, &author, &payload.text, now)?;
    let seen = task.updated_at;

    find_comment_mut(&mut task.comments, &comment_id)
        .ok_or_else(|| ApiError::NotFound("Comment not found".to_string()))?
        .replies
        .push(reply.clone());
    task.updated_at = now;

    let res = data
        .mongodb
        .tasks()
        .update_one(
            unchanged_since(&task.task_id, &seen)?,
            doc! {
                "$set": {
                    "comments": to_bson(&task.comments)?,
                    "updated_at": to_bson(&now)?,
                }
            },
        )
        .await?;
    if res.matched_count == 0 {
        warn!("Task {} changed while replying to comment {}", task.task_id, comment_id);
        return Err(ApiError::Conflict(
            "Task was modified concurrently, reload and try again".to_string(),
        ));
    }

    after_comment(&data, &claims, &task, &author, now).await;
    Ok(HttpResponse::Created().json(reply))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn task(owner: &str, assignee: Option<&str>, created: DateTime<Utc>) -> Task {
        let mut t = CreateTaskRequest {
            title: "T".to_string(),
            description: None,
            priority: None,
            status: None,
            assignee_id: assignee.map(str::to_string),
            start_date: None,
            due_date: None,
        }
        .into_task(owner, created)
        .unwrap();
        t.created_at = created;
        t
    }

    #[test]
    fn visibility_filter_without_linked_members_is_owner_only() {
        assert_eq!(visibility_filter("u1", &[]), doc! { "user_id": "u1" });
    }

    #[test]
    fn visibility_filter_includes_linked_member_assignments() {
        let filter = visibility_filter("u1", &["m1".to_string()]);
        let or = filter.get_array("$or").unwrap();
        assert_eq!(or.len(), 2);
    }

    #[test]
    fn can_see_owned_or_assigned_tasks() {
        let now = Utc::now();
        let ids = vec!["m1".to_string()];
        assert!(can_see(&task("u1", None, now), "u1", &ids));
        assert!(can_see(&task("u2", Some("m1"), now), "u1", &ids));
        assert!(!can_see(&task("u2", Some("m2"), now), "u1", &ids));
        assert!(!can_see(&task("u2", None, now), "u1", &ids));
    }

    #[test]
    fn sorts_newest_first() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut tasks = vec![
            task("u", None, base),
            task("u", None, base + Duration::days(2)),
            task("u", None, base + Duration::days(1)),
        ];
        sort_newest_first(&mut tasks);
        assert_eq!(tasks[0].created_at, base + Duration::days(2));
        assert_eq!(tasks[2].created_at, base);
    }

    #[test]
    fn recipients_are_owner_and_assignee_account() {
        let t = task("owner", Some("m1"), Utc::now());
        assert_eq!(task_recipients(&t, None), vec!["owner".to_string()]);
        assert_eq!(
            task_recipients(&t, Some("acct")),
            vec!["owner".to_string(), "acct".to_string()]
        );
    }

    #[test]
    fn reply_write_is_guarded_by_last_update() {
        let seen = Utc.with_ymd_and_hms(2024, 2, 1, 8, 30, 0).unwrap();
        let filter = unchanged_since("t1", &seen).unwrap();
        assert_eq!(filter.get_str("task_id").unwrap(), "t1");
        assert_eq!(filter.get("updated_at"), Some(&to_bson(&seen).unwrap()));
    }

    #[test]
    fn audit_action_prefers_status_then_assignment() {
        assert_eq!(
            audit_action_for(Some(TaskStatus::Completed), Some("m1")),
            AuditAction::StatusChange
        );
        assert_eq!(audit_action_for(None, Some("m1")), AuditAction::Assign);
        assert_eq!(audit_action_for(None, None), AuditAction::Update);
    }
}
