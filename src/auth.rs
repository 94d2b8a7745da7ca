use actix_web::{web, HttpMessage, HttpRequest, HttpResponse};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{info, warn};
use mongodb::bson::doc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::audit;
use crate::error::{ApiError, ApiResult};
use crate::live_feed::DropUser;
use crate::models::audit::{AuditAction, AuditActivity, EntityType};
use crate::models::is_valid_email;
use crate::models::settings::UserSettings;
use crate::models::user::{AuthProvider, PublicUser, User};
use crate::settings;

const MIN_PASSWORD_LEN: usize = 6;
const EMAIL_TAKEN: &str = "Email already registered";
const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    pub exp: usize,
}

#[derive(Deserialize)]
pub struct SignupInfo {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginInfo {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct GoogleLoginInfo {
    pub id_token: String,
}

/// Subset of Google's tokeninfo response we rely on.
#[derive(Debug, Deserialize)]
pub struct GoogleTokenInfo {
    pub aud: String,
    pub email: String,
    /// Google sends `"true"` as a string; accept a bool too.
    #[serde(default)]
    pub email_verified: serde_json::Value,
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: PublicUser,
}

// JWT Creation
pub fn create_jwt(user_id: &str, email: &str, secret: &str, ttl_hours: i64) -> ApiResult<String> {
    let expiration = Utc::now() + Duration::hours(ttl_hours);
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        exp: expiration.timestamp() as usize,
    };
    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?)
}

// JWT Validation
pub fn validate_jwt(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Claims the middleware stored for this request, or 401.
pub fn current_user(req: &HttpRequest) -> ApiResult<Claims> {
    req.extensions()
        .get::<Claims>()
        .cloned()
        .ok_or_else(ApiError::unauthorized)
}

fn check_google_token(info: &GoogleTokenInfo, client_id: &str) -> ApiResult<()> {
    if info.aud != client_id {
        return Err(ApiError::Unauthorized("Token was issued for another client".to_string()));
    }
    let verified = match &info.email_verified {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::String(s) => s == "true",
        _ => false,
    };
    if !verified {
        return Err(ApiError::Unauthorized("Google email is not verified".to_string()));
    }
    Ok(())
}

fn display_name_or_email(name: Option<&str>, email: &str) -> String {
    name.map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| email.split('@').next().unwrap_or(email).to_string())
}

fn session_response(data: &AppState, user: &User) -> ApiResult<HttpResponse> {
    let token = create_jwt(
        &user.user_id,
        &user.email,
        &data.config.jwt_secret,
        data.config.jwt_ttl_hours,
    )?;
    Ok(HttpResponse::Ok().json(AuthResponse {
        token,
        user: PublicUser::from(user),
    }))
}

async fn create_account(data: &AppState, user: &User) -> ApiResult<()> {
    data.mongodb
        .users()
        .insert_one(user)
        .await
        .map_err(ApiError::on_duplicate(EMAIL_TAKEN))?;
    settings::store(
        &data.mongodb,
        &UserSettings::defaults_for(&user.user_id, user.created_at),
    )
    .await;
    audit::record(
        &data.mongodb,
        AuditActivity::new(
            AuditAction::Create,
            EntityType::User,
            &user.user_id,
            &user.user_id,
            &user.email,
            format!("signup via {:?}", user.provider),
        ),
    )
    .await;
    Ok(())
}

/// POST /auth/signup
pub async fn signup(
    data: web::Data<AppState>,
    signup_info: web::Json<SignupInfo>,
) -> ApiResult<HttpResponse> {
    let email = signup_info.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(ApiError::BadRequest("Invalid email".to_string()));
    }
    if signup_info.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "Password must have at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let users = data.mongodb.users();
    if users.find_one(doc! { "email": &email }).await?.is_some() {
        return Err(ApiError::Conflict(EMAIL_TAKEN.to_string()));
    }

    let new_user = User {
        user_id: Uuid::new_v4().to_string(),
        display_name: display_name_or_email(signup_info.display_name.as_deref(), &email),
        email,
        password_hash: Some(hash(&signup_info.password, DEFAULT_COST)?),
        provider: AuthProvider::Password,
        created_at: Utc::now(),
    };
    create_account(&data, &new_user).await?;
    info!("User created: {}", new_user.user_id);
    session_response(&data, &new_user)
}

/// POST /auth/login
pub async fn login(
    data: web::Data<AppState>,
    login_info: web::Json<LoginInfo>,
) -> ApiResult<HttpResponse> {
    let email = login_info.email.trim().to_lowercase();
    let user = data
        .mongodb
        .users()
        .find_one(doc! { "email": &email })
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid credentials".to_string()))?;

    let password_ok = user
        .password_hash
        .as_deref()
        .map(|h| verify(&login_info.password, h).unwrap_or(false))
        .unwrap_or(false);
    if !password_ok {
        warn!("Failed login for {}", email);
        return Err(ApiError::Unauthorized("Invalid credentials".to_string()));
    }

    audit::record(
        &data.mongodb,
        AuditActivity::new(
            AuditAction::Login,
            EntityType::User,
            &user.user_id,
            &user.user_id,
            &user.email,
            "password",
        ),
    )
    .await;
    session_response(&data, &user)
}

/// POST /auth/google
/// Exchanges a Google ID token for a session, creating the account on first
/// sign-in.
pub async fn google_login(
    data: web::Data<AppState>,
    payload: web::Json<GoogleLoginInfo>,
) -> ApiResult<HttpResponse> {
    let client_id = data
        .config
        .google_client_id
        .as_deref()
        .ok_or_else(|| ApiError::NotFound("Google sign-in is not enabled".to_string()))?;

    let resp = data
        .http_client
        .get(GOOGLE_TOKENINFO_URL)
        .query(&[("id_token", payload.id_token.as_str())])
        .send()
        .await?;
    if !resp.status().is_success() {
        return Err(ApiError::Unauthorized("Invalid Google token".to_string()));
    }
    let info: GoogleTokenInfo = resp.json().await?;
    check_google_token(&info, client_id)?;

    let email = info.email.trim().to_lowercase();
    let user = match data.mongodb.users().find_one(doc! { "email": &email }).await? {
        Some(existing) => existing,
        None => {
            let new_user = User {
                user_id: Uuid::new_v4().to_string(),
                display_name: display_name_or_email(info.name.as_deref(), &email),
                email,
                password_hash: None,
                provider: AuthProvider::Google,
                created_at: Utc::now(),
            };
            match create_account(&data, &new_user).await {
                Ok(()) => new_user,
                // A concurrent first sign-in stored the account first.
                Err(ApiError::Conflict(_)) => data
                    .mongodb
                    .users()
                    .find_one(doc! { "email": &new_user.email })
                    .await?
                    .ok_or_else(|| ApiError::Internal("Account vanished during sign-in".to_string()))?,
                Err(e) => return Err(e),
            }
        }
    };

    audit::record(
        &data.mongodb,
        AuditActivity::new(
            AuditAction::Login,
            EntityType::User,
            &user.user_id,
            &user.user_id,
            &user.email,
            "google",
        ),
    )
    .await;
    session_response(&data, &user)
}

/// POST /auth/logout
/// Tokens are stateless; logging out closes the user's live sessions.
pub async fn logout(req: HttpRequest, data: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let claims = current_user(&req)?;
    let dropped = data
        .live_feed
        .send(DropUser {
            user_id: claims.sub.clone(),
        })
        .await
        .unwrap_or(0);
    audit::record(
        &data.mongodb,
        AuditActivity::new(
            AuditAction::Logout,
            EntityType::User,
            &claims.sub,
            &claims.sub,
            &claims.email,
            format!("closed {} live session(s)", dropped),
        ),
    )
    .await;
    Ok(HttpResponse::NoContent().finish())
}

/// GET /auth/me
pub async fn me(req: HttpRequest, data: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let claims = current_user(&req)?;
    match data.mongodb.users().find_one(doc! { "user_id": &claims.sub }).await? {
        Some(user) => Ok(HttpResponse::Ok().json(PublicUser::from(&user))),
        None => Err(ApiError::NotFound("User not found".to_string())),
    }
}
