// src/audit.rs

use actix_web::{web, HttpRequest, HttpResponse};
use futures::stream::TryStreamExt;
use log::{debug, error};
use mongodb::bson::{doc, to_bson, Document};

use crate::app_state::AppState;
use crate::auth::current_user;
use crate::db::MongoDB;
use crate::error::ApiResult;
use crate::models::audit::{AuditActivity, AuditQuery};

/// Best-effort audit write: a failure is logged and never reaches the caller.
pub async fn record(db: &MongoDB, activity: AuditActivity) {
    debug!(
        "audit {:?} {:?} {} by {}",
        activity.action, activity.entity_type, activity.entity_id, activity.actor_id
    );
    if let Err(e) = db.audit_logs().insert_one(&activity).await {
        error!("Error writing audit log {}: {}", activity.activity_id, e);
    }
}

/// Only the caller's own actions are ever listed.
fn audit_filter(actor_id: &str, query: &AuditQuery) -> ApiResult<Document> {
    let mut filter = doc! { "actor_id": actor_id };
    if let Some(entity_type) = &query.entity_type {
        filter.insert("entity_type", to_bson(entity_type)?);
    }
    if let Some(entity_id) = query.entity_id.as_deref().filter(|s| !s.is_empty()) {
        filter.insert("entity_id", entity_id);
    }
    if let Some(action) = &query.action {
        filter.insert("action", to_bson(action)?);
    }
    Ok(filter)
}

/// GET /audit
pub async fn list_activities(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<AuditQuery>,
) -> ApiResult<HttpResponse> {
    let claims = current_user(&req)?;
    let filter = audit_filter(&claims.sub, &query)?;

    let activities: Vec<AuditActivity> = data
        .mongodb
        .audit_logs()
        .find(filter)
        .sort(doc! { "timestamp": -1 })
        .limit(query.limit())
        .await?
        .try_collect()
        .await?;
    Ok(HttpResponse::Ok().json(activities))
}
