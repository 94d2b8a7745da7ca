// src/notifications.rs

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use futures::stream::TryStreamExt;
use log::{debug, error, info};
use mongodb::bson::doc;
use serde_json::json;

use crate::app_state::AppState;
use crate::auth::current_user;
use crate::db::NOTIFICATIONS;
use crate::error::{ApiError, ApiResult};
use crate::live_feed::{ChangeEvent, ChangeKind};
use crate::models::notification::{
    CreateNotificationRequest, Notification, NotificationDraft, NotificationKind,
    NotificationQuery,
};
use crate::models::require_text;
use crate::settings;

/// Renders `draft` for its recipient, stores it and pushes it live.
/// Best-effort: returns `None` when suppressed or when the write failed.
pub async fn notify(data: &AppState, draft: NotificationDraft) -> Option<Notification> {
    let recipient = draft.recipient_id.clone();
    let prefs = match settings::load(&data.mongodb, &recipient).await {
        Ok(s) => s,
        Err(e) => {
            error!("Could not load settings of {}: {}", recipient, e);
            return None;
        }
    };
    let Some(notification) = draft.render(&prefs, Utc::now()) else {
        debug!("Notification for {} suppressed", recipient);
        return None;
    };

    if let Err(e) = data.mongodb.notifications().insert_one(&notification).await {
        error!("Error inserting notification for {}: {}", recipient, e);
        return None;
    }
    data.publish(
        vec![recipient],
        ChangeEvent::new(
            NOTIFICATIONS,
            ChangeKind::Added,
            &notification.notification_id,
            &notification,
        ),
    );
    Some(notification)
}

/// GET /notifications
pub async fn list_notifications(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<NotificationQuery>,
) -> ApiResult<HttpResponse> {
    let claims = current_user(&req)?;
    let mut filter = doc! { "recipient_id": &claims.sub };
    if query.unread_only {
        filter.insert("read", false);
    }

    let notifications: Vec<Notification> = data
        .mongodb
        .notifications()
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .limit(query.limit())
        .await?
        .try_collect()
        .await?;
    Ok(HttpResponse::Ok().json(notifications))
}

/// GET /notifications/unread_count
pub async fn unread_count(req: HttpRequest, data: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let claims = current_user(&req)?;
    let count = data
        .mongodb
        .notifications()
        .count_documents(doc! { "recipient_id": &claims.sub, "read": false })
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "unread": count })))
}

/// POST /notifications
/// Sends a free-text system notification to any user.
pub async fn create_notification(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateNotificationRequest>,
) -> ApiResult<HttpResponse> {
    let claims = current_user(&req)?;
    let recipient = require_text("recipient_id", &payload.recipient_id)?;
    let message = require_text("message", &payload.message)?;

    let mut draft = NotificationDraft::new(&recipient, NotificationKind::System)
        .arg("message", &message)
        .from_user(&claims.sub);
    if let Some(task_id) = payload.related_task_id.as_deref() {
        draft = draft.task(task_id);
    }

    match notify(&data, draft).await {
        Some(notification) => Ok(HttpResponse::Created().json(notification)),
        None => Err(ApiError::Internal("Notification was not delivered".to_string())),
    }
}

/// PUT /notifications/{notification_id}/read
pub async fn mark_read(
    req: HttpRequest,
    data: web::Data<AppState>,
    notification_id: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let claims = current_user(&req)?;
    let filter = doc! { "notification_id": notification_id.as_str(), "recipient_id": &claims.sub };
    let res = data
        .mongodb
        .notifications()
        .update_one(filter, doc! { "$set": { "read": true } })
        .await?;
    if res.matched_count == 0 {
        return Err(ApiError::NotFound("Notification not found".to_string()));
    }
    data.publish(
        vec![claims.sub.clone()],
        ChangeEvent::new(
            NOTIFICATIONS,
            ChangeKind::Modified,
            &notification_id,
            &json!({ "read": true }),
        ),
    );
    Ok(HttpResponse::Ok().json(json!({ "read": true })))
}

/// PUT /notifications/read_all
pub async fn mark_all_read(req: HttpRequest, data: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let claims = current_user(&req)?;
    let res = data
        .mongodb
        .notifications()
        .update_many(
            doc! { "recipient_id": &claims.sub, "read": false },
            doc! { "$set": { "read": true } },
        )
        .await?;
    info!("Marked {} notification(s) read for {}", res.modified_count, claims.sub);
    Ok(HttpResponse::Ok().json(json!({ "updated": res.modified_count })))
}

/// DELETE /notifications/{notification_id}
pub async fn delete_notification(
    req: HttpRequest,
    data: web::Data<AppState>,
    notification_id: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let claims = current_user(&req)?;
    let res = data
        .mongodb
        .notifications()
        .delete_one(doc! { "notification_id": notification_id.as_str(), "recipient_id": &claims.sub })
        .await?;
    if res.deleted_count == 0 {
        return Err(ApiError::NotFound("Notification not found".to_string()));
    }
    data.publish(
        vec![claims.sub],
        ChangeEvent::removed(NOTIFICATIONS, &notification_id),
    );
    Ok(HttpResponse::NoContent().finish())
}
