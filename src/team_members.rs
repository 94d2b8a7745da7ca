// src/team_members.rs

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use futures::stream::TryStreamExt;
use log::{debug, info};
use mongodb::bson::doc;

use crate::app_state::AppState;
use crate::audit;
use crate::auth::{current_user, Claims};
use crate::db::{MongoDB, MEMBERS};
use crate::error::{ApiError, ApiResult};
use crate::live_feed::{ChangeEvent, ChangeKind};
use crate::models::audit::{AuditAction, AuditActivity, EntityType};
use crate::models::team_member::{
    CreateMemberRequest, MemberChanges, TeamMember, TeamMemberView, UpdateMemberRequest,
};

const MEMBER_EMAIL_TAKEN: &str = "A member with this email already exists";

/// Ids of the team members linked to `user_id`'s account.
pub async fn linked_member_ids(db: &MongoDB, user_id: &str) -> ApiResult<Vec<String>> {
    let members: Vec<TeamMember> = db
        .members()
        .find(doc! { "user_id": user_id })
        .await?
        .try_collect()
        .await?;
    Ok(members.into_iter().map(|m| m.member_id).collect())
}

pub async fn find_member(db: &MongoDB, member_id: &str) -> ApiResult<Option<TeamMember>> {
    Ok(db.members().find_one(doc! { "member_id": member_id }).await?)
}

async fn task_count(db: &MongoDB, member_id: &str) -> ApiResult<u64> {
    Ok(db
        .tasks()
        .count_documents(doc! { "assignee_id": member_id })
        .await?)
}

async fn with_task_count(db: &MongoDB, member: TeamMember) -> ApiResult<TeamMemberView> {
    let task_count = task_count(db, &member.member_id).await?;
    Ok(TeamMemberView { member, task_count })
}

fn member_recipients(member: &TeamMember, claims: &Claims) -> Vec<String> {
    let mut recipients = vec![claims.sub.clone(), member.created_by.clone()];
    if let Some(user_id) = &member.user_id {
        recipients.push(user_id.clone());
    }
    recipients
}

/// POST /members
pub async fn create_member(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateMemberRequest>,
) -> ApiResult<HttpResponse> {
    let claims = current_user(&req)?;
    let email = payload.email.trim().to_lowercase();

    let members = data.mongodb.members();
    if members.find_one(doc! { "email": &email }).await?.is_some() {
        return Err(ApiError::Conflict(MEMBER_EMAIL_TAKEN.to_string()));
    }
    let linked_user = data
        .mongodb
        .users()
        .find_one(doc! { "email": &email })
        .await?
        .map(|u| u.user_id);

    let member = payload
        .into_inner()
        .into_member(&claims.sub, linked_user, Utc::now())?;
    members
        .insert_one(&member)
        .await
        .map_err(ApiError::on_duplicate(MEMBER_EMAIL_TAKEN))?;
    info!("Team member created: {}", member.member_id);

    audit::record(
        &data.mongodb,
        AuditActivity::new(
            AuditAction::Create,
            EntityType::TeamMember,
            &member.member_id,
            &claims.sub,
            &claims.email,
            format!("member {}", member.name),
        ),
    )
    .await;
    data.publish(
        member_recipients(&member, &claims),
        ChangeEvent::new(MEMBERS, ChangeKind::Added, &member.member_id, &member),
    );
    Ok(HttpResponse::Created().json(TeamMemberView {
        member,
        task_count: 0,
    }))
}

/// GET /members
pub async fn list_members(req: HttpRequest, data: web::Data<AppState>) -> ApiResult<HttpResponse> {
    current_user(&req)?;
    let members: Vec<TeamMember> = data
        .mongodb
        .members()
        .find(doc! {})
        .sort(doc! { "name": 1 })
        .await?
        .try_collect()
        .await?;

    let mut views = Vec::with_capacity(members.len());
    for member in members {
        views.push(with_task_count(&data.mongodb, member).await?);
    }
    debug!("Listing {} team member(s)", views.len());
    Ok(HttpResponse::Ok().json(views))
}

/// GET /members/{member_id}
pub async fn get_member(
    req: HttpRequest,
    data: web::Data<AppState>,
    member_id: web::Path<String>,
) -> ApiResult<HttpResponse> {
    current_user(&req)?;
    let member = find_member(&data.mongodb, &member_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Member not found".to_string()))?;
    Ok(HttpResponse::Ok().json(with_task_count(&data.mongodb, member).await?))
}

/// New email when the update actually changes it.
fn email_change<'a>(current: &TeamMember, changes: &'a MemberChanges) -> Option<&'a str> {
    changes
        .new_email
        .as_deref()
        .filter(|email| *email != current.email)
}

/// PUT /members/{member_id}
/// An email change re-links the member to the account owning the new address.
pub async fn update_member(
    req: HttpRequest,
    data: web::Data<AppState>,
    member_id: web::Path<String>,
    payload: web::Json<UpdateMemberRequest>,
) -> ApiResult<HttpResponse> {
    let claims = current_user(&req)?;
    let mut changes = payload.changes()?;
    let current = find_member(&data.mongodb, &member_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Member not found".to_string()))?;

    let members = data.mongodb.members();
    if let Some(email) = email_change(&current, &changes).map(str::to_string) {
        let taken = members
            .find_one(doc! { "email": &email, "member_id": { "$ne": &current.member_id } })
            .await?;
        if taken.is_some() {
            return Err(ApiError::Conflict(MEMBER_EMAIL_TAKEN.to_string()));
        }
        let linked_user = data
            .mongodb
            .users()
            .find_one(doc! { "email": &email })
            .await?
            .map(|u| u.user_id);
        changes.link_account(linked_user);
    }
    let fields = changes.fields();

    let filter = doc! { "member_id": &current.member_id };
    let res = members
        .update_one(filter.clone(), changes.into_update())
        .await
        .map_err(ApiError::on_duplicate(MEMBER_EMAIL_TAKEN))?;
    if res.matched_count == 0 {
        return Err(ApiError::NotFound("Member not found".to_string()));
    }

    let member = members
        .find_one(filter)
        .await?
        .ok_or_else(|| ApiError::Internal("Member updated but could not be re-fetched".to_string()))?;

    audit::record(
        &data.mongodb,
        AuditActivity::new(
            AuditAction::Update,
            EntityType::TeamMember,
            &member.member_id,
            &claims.sub,
            &claims.email,
            format!("fields: {}", fields.join(", ")),
        ),
    )
    .await;
    let mut recipients = member_recipients(&member, &claims);
    if current.user_id != member.user_id {
        recipients.extend(current.user_id);
    }
    data.publish(
        recipients,
        ChangeEvent::new(MEMBERS, ChangeKind::Modified, &member.member_id, &member),
    );
    Ok(HttpResponse::Ok().json(with_task_count(&data.mongodb, member).await?))
}

/// DELETE /members/{member_id}
/// Tasks assigned to the member keep the id; readers treat it as dangling.
pub async fn delete_member(
    req: HttpRequest,
    data: web::Data<AppState>,
    member_id: web::Path<String>,
) -> ApiResult<HttpResponse> {
    let claims = current_user(&req)?;
    let member = find_member(&data.mongodb, &member_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Member not found".to_string()))?;

    data.mongodb
        .members()
        .delete_one(doc! { "member_id": &member.member_id })
        .await?;

    audit::record(
        &data.mongodb,
        AuditActivity::new(
            AuditAction::Delete,
            EntityType::TeamMember,
            &member.member_id,
            &claims.sub,
            &claims.email,
            format!("member {}", member.name),
        ),
    )
    .await;
    data.publish(
        member_recipients(&member, &claims),
        ChangeEvent::removed(MEMBERS, &member.member_id),
    );
    Ok(HttpResponse::NoContent().finish())
}
