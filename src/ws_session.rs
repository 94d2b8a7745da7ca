use std::time::{Duration, Instant};

use actix::prelude::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use log::{debug, warn};
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::{current_user, validate_jwt};
use crate::error::ApiError;
use crate::live_feed::{FeedMessage, LiveFeed, Subscribe, Unsubscribe};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// One browser tab listening for changes to its user's data.
pub struct WsSession {
    pub id: Uuid,
    pub user_id: String,
    pub hb: Instant,
    pub feed: Addr<LiveFeed>,
}

impl WsSession {
    pub fn new(user_id: String, feed: Addr<LiveFeed>) -> Self {
        WsSession {
            id: Uuid::new_v4(),
            user_id,
            hb: Instant::now(),
            feed,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                warn!("Live session {} missed heartbeats, disconnecting", act.id);
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);
        self.feed.do_send(Subscribe {
            user_id: self.user_id.clone(),
            session_id: self.id,
            addr: ctx.address().recipient(),
        });
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        self.feed.do_send(Unsubscribe {
            user_id: self.user_id.clone(),
            session_id: self.id,
        });
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                // The feed is server-to-client only; text frames just count
                // as liveness.
                self.hb = Instant::now();
                debug!("Ignoring client text on live session {}: {}", self.id, text);
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                warn!("Live session {} protocol error: {}", self.id, e);
                ctx.stop();
            }
            _ => {}
        }
    }
}

impl Handler<FeedMessage> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: FeedMessage, ctx: &mut Self::Context) {
        match msg {
            FeedMessage::Change(event) => match serde_json::to_string(&event) {
                Ok(json) => ctx.text(json),
                Err(e) => warn!("Could not encode change event: {}", e),
            },
            FeedMessage::Close => {
                ctx.close(Some(ws::CloseCode::Normal.into()));
                ctx.stop();
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// GET /ws
/// Browsers cannot set headers on WebSocket upgrades, so the token may come
/// in the query string instead of the Authorization header.
pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
    query: web::Query<WsQuery>,
) -> Result<HttpResponse, Error> {
    let user_id = match current_user(&req) {
        Ok(claims) => claims.sub,
        Err(_) => {
            let token = query.token.as_deref().ok_or_else(ApiError::unauthorized)?;
            validate_jwt(token, &data.config.jwt_secret)
                .map_err(|e| ApiError::Unauthorized(format!("Invalid token: {}", e)))?
                .sub
        }
    };
    ws::start(WsSession::new(user_id, data.live_feed.clone()), &req, stream)
}
