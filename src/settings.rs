use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::error;
use mongodb::bson::doc;

use crate::app_state::AppState;
use crate::audit;
use crate::auth::current_user;
use crate::db::{MongoDB, SETTINGS};
use crate::error::{ApiError, ApiResult};
use crate::live_feed::{ChangeEvent, ChangeKind};
use crate::models::audit::{AuditAction, AuditActivity, EntityType};
use crate::models::settings::{UpdateSettingsRequest, UserSettings};

/// Stored settings for `user_id`, or the defaults when none were saved yet.
pub async fn load(db: &MongoDB, user_id: &str) -> ApiResult<UserSettings> {
    Ok(db
        .settings()
        .find_one(doc! { "user_id": user_id })
        .await?
        .unwrap_or_else(|| UserSettings::defaults_for(user_id, Utc::now())))
}

async fn save(db: &MongoDB, settings: &UserSettings) -> mongodb::error::Result<()> {
    db.settings()
        .replace_one(doc! { "user_id": &settings.user_id }, settings)
        .upsert(true)
        .await?;
    Ok(())
}

/// Best-effort write used when an account is created.
pub async fn store(db: &MongoDB, settings: &UserSettings) {
    if let Err(e) = save(db, settings).await {
        error!("Error storing settings for {}: {}", settings.user_id, e);
    }
}

/// GET /settings
pub async fn get_settings(req: HttpRequest, data: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let claims = current_user(&req)?;
    let settings = load(&data.mongodb, &claims.sub).await?;
    Ok(HttpResponse::Ok().json(settings))
}

/// PUT /settings
pub async fn update_settings(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<UpdateSettingsRequest>,
) -> ApiResult<HttpResponse> {
    let claims = current_user(&req)?;
    if payload.is_empty() {
        return Err(ApiError::BadRequest("No fields to update".to_string()));
    }

    let mut settings = load(&data.mongodb, &claims.sub).await?;
    payload.apply(&mut settings, Utc::now());
    save(&data.mongodb, &settings).await?;

    audit::record(
        &data.mongodb,
        AuditActivity::new(
            AuditAction::Update,
            EntityType::Settings,
            &claims.sub,
            &claims.sub,
            &claims.email,
            format!(
                "theme={:?} language={}",
                settings.theme,
                settings.language.code()
            ),
        ),
    )
    .await;
    data.publish(
        vec![claims.sub.clone()],
        ChangeEvent::new(SETTINGS, ChangeKind::Modified, &claims.sub, &settings),
    );
    Ok(HttpResponse::Ok().json(settings))
}
