// src/main.rs

mod app_state;
mod audit;
mod auth;
mod config;
mod db;
mod error;
mod i18n;
mod live_feed;
mod models;
mod notifications;
mod reports;
mod settings;
mod tasks;
mod team_members;
mod ws_session;

use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix::Actor;
use actix_cors::Cors;
use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http,
    middleware::Logger,
    web, App, Error, HttpMessage, HttpResponse, HttpServer, ResponseError,
};
use env_logger::Env;
use futures::future::{ok, Ready};
use log::{error, info};
use serde_json::json;

use crate::app_state::AppState;
use crate::auth::validate_jwt;
use crate::config::Config;
use crate::db::MongoDB;
use crate::error::ApiError;
use crate::live_feed::LiveFeed;

/// Validates `Authorization: Bearer <jwt>` and stores the `Claims` in the
/// request extensions. Requests without the header pass through; handlers
/// that need a user answer 401 themselves.
#[derive(Clone)]
pub struct Authentication {
    secret: Rc<String>,
}

impl Authentication {
    pub fn new(secret: &str) -> Self {
        Authentication {
            secret: Rc::new(secret.to_string()),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Authentication
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = AuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddleware {
            service,
            secret: self.secret.clone(),
        })
    }
}

pub struct AuthMiddleware<S> {
    service: S,
    secret: Rc<String>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let token = req
            .headers()
            .get(http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string());

        if let Some(token) = token {
            match validate_jwt(&token, &self.secret) {
                Ok(claims) => {
                    req.extensions_mut().insert(claims);
                }
                Err(e) => {
                    let (req_parts, _payload) = req.into_parts();
                    let resp = ApiError::Unauthorized(format!("Invalid token: {}", e)).error_response();
                    let srv_resp = ServiceResponse::new(req_parts, resp);
                    return Box::pin(async move { Ok(srv_resp) });
                }
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res.map_into_boxed_body())
        })
    }
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

/// Body and query errors come back in the same JSON shape as handler errors.
fn extractor_config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _| ApiError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _| ApiError::BadRequest(err.to_string()).into()),
    );
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .service(
            web::scope("/auth")
                .route("/signup", web::post().to(auth::signup))
                .route("/login", web::post().to(auth::login))
                .route("/google", web::post().to(auth::google_login))
                .route("/logout", web::post().to(auth::logout))
                .route("/me", web::get().to(auth::me)),
        )
        // TASKS
        .service(
            web::scope("/tasks")
                .route("", web::post().to(tasks::create_task))
                .route("", web::get().to(tasks::list_tasks))
                .route("/{task_id}", web::get().to(tasks::get_task))
                .route("/{task_id}", web::put().to(tasks::update_task))
                .route("/{task_id}", web::delete().to(tasks::delete_task))
                .route("/{task_id}/comments", web::post().to(tasks::add_comment))
                .route(
                    "/{task_id}/comments/{comment_id}/replies",
                    web::post().to(tasks::reply_to_comment),
                ),
        )
        // TEAM MEMBERS
        .service(
            web::scope("/members")
                .route("", web::post().to(team_members::create_member))
                .route("", web::get().to(team_members::list_members))
                .route("/{member_id}", web::get().to(team_members::get_member))
                .route("/{member_id}", web::put().to(team_members::update_member))
                .route("/{member_id}", web::delete().to(team_members::delete_member)),
        )
        // NOTIFICATIONS
        .service(
            web::scope("/notifications")
                .route("", web::get().to(notifications::list_notifications))
                .route("", web::post().to(notifications::create_notification))
                .route("/unread_count", web::get().to(notifications::unread_count))
                .route("/read_all", web::put().to(notifications::mark_all_read))
                .route("/{notification_id}/read", web::put().to(notifications::mark_read))
                .route(
                    "/{notification_id}",
                    web::delete().to(notifications::delete_notification),
                ),
        )
        .service(
            web::resource("/settings")
                .route(web::get().to(settings::get_settings))
                .route(web::put().to(settings::update_settings)),
        )
        .route("/audit", web::get().to(audit::list_activities))
        .route("/reports/summary", web::get().to(reports::get_summary))
        // WEBSOCKET route for real-time
        .service(web::resource("/ws").route(web::get().to(ws_session::ws_index)));
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    let mongodb = match MongoDB::init(&config.mongo_uri, &config.database_name).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Could not set up MongoDB client: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = mongodb.ensure_indexes().await {
        error!("Could not create indexes: {}", e);
        std::process::exit(1);
    }
    let live_feed = LiveFeed::new().start();
    let http_client = reqwest::Client::new();

    info!("Server running at http://{}", config.bind_addr);
    info!("Allowed CORS Origin: {}", config.frontend_origin);
    if config.google_client_id.is_none() {
        info!("GOOGLE_CLIENT_ID not set, Google sign-in disabled");
    }

    let bind_addr = config.bind_addr.clone();
    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&config.frontend_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                http::header::CONTENT_TYPE,
                http::header::ACCEPT,
                http::header::AUTHORIZATION,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Authentication::new(&config.jwt_secret))
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(web::Data::new(AppState {
                mongodb: mongodb.clone(),
                live_feed: live_feed.clone(),
                config: config.clone(),
                http_client: http_client.clone(),
            }))
            .configure(extractor_config)
            .configure(routes)
    })
    .bind(bind_addr)?
    .run()
    .await
}
