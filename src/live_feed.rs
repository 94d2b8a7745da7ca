// src/live_feed.rs

use std::collections::HashMap;

use actix::prelude::*;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

/// One document change, pushed to every live session of the recipients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub collection: String,
    pub change: ChangeKind,
    pub id: String,
    pub data: serde_json::Value,
}

impl ChangeEvent {
    pub fn new<T: Serialize>(collection: &str, change: ChangeKind, id: &str, data: &T) -> Self {
        ChangeEvent {
            collection: collection.to_string(),
            change,
            id: id.to_string(),
            data: serde_json::to_value(data).unwrap_or(serde_json::Value::Null),
        }
    }

    pub fn removed(collection: &str, id: &str) -> Self {
        ChangeEvent {
            collection: collection.to_string(),
            change: ChangeKind::Removed,
            id: id.to_string(),
            data: serde_json::Value::Null,
        }
    }
}

/// What a session receives from the feed.
#[derive(Message, Debug, Clone, PartialEq)]
#[rtype(result = "()")]
pub enum FeedMessage {
    Change(ChangeEvent),
    /// The user logged out; the session must close.
    Close,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Subscribe {
    pub user_id: String,
    pub session_id: Uuid,
    pub addr: Recipient<FeedMessage>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Unsubscribe {
    pub user_id: String,
    pub session_id: Uuid,
}

/// Closes and forgets every session of a user.
#[derive(Message)]
#[rtype(result = "usize")]
pub struct DropUser {
    pub user_id: String,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Publish {
    pub recipients: Vec<String>,
    pub event: ChangeEvent,
}

#[derive(Message)]
#[rtype(result = "usize")]
pub struct SessionCount {
    pub user_id: String,
}

#[derive(Default)]
pub struct LiveFeed {
    sessions: HashMap<String, HashMap<Uuid, Recipient<FeedMessage>>>,
}

impl LiveFeed {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Actor for LiveFeed {
    type Context = Context<Self>;
}

impl Handler<Subscribe> for LiveFeed {
    type Result = ();

    fn handle(&mut self, msg: Subscribe, _: &mut Context<Self>) {
        info!("User {} subscribed (session {})", msg.user_id, msg.session_id);
        self.sessions
            .entry(msg.user_id)
            .or_default()
            .insert(msg.session_id, msg.addr);
    }
}

impl Handler<Unsubscribe> for LiveFeed {
    type Result = ();

    fn handle(&mut self, msg: Unsubscribe, _: &mut Context<Self>) {
        info!("User {} unsubscribed (session {})", msg.user_id, msg.session_id);
        if let Some(user_sessions) = self.sessions.get_mut(&msg.user_id) {
            user_sessions.remove(&msg.session_id);
            if user_sessions.is_empty() {
                self.sessions.remove(&msg.user_id);
            }
        }
    }
}

impl Handler<DropUser> for LiveFeed {
    type Result = usize;

    fn handle(&mut self, msg: DropUser, _: &mut Context<Self>) -> usize {
        match self.sessions.remove(&msg.user_id) {
            Some(user_sessions) => {
                for addr in user_sessions.values() {
                    addr.do_send(FeedMessage::Close);
                }
                info!("Dropped {} live session(s) of {}", user_sessions.len(), msg.user_id);
                user_sessions.len()
            }
            None => 0,
        }
    }
}

impl Handler<Publish> for LiveFeed {
    type Result = ();

    fn handle(&mut self, msg: Publish, _: &mut Context<Self>) {
        let mut recipients = msg.recipients;
        recipients.sort();
        recipients.dedup();
        for user_id in &recipients {
            if let Some(user_sessions) = self.sessions.get(user_id) {
                for addr in user_sessions.values() {
                    addr.do_send(FeedMessage::Change(msg.event.clone()));
                }
            }
        }
        debug!(
            "Published {} {} change for {:?}",
            msg.event.collection, msg.event.id, recipients
        );
    }
}

impl Handler<SessionCount> for LiveFeed {
    type Result = usize;

    fn handle(&mut self, msg: SessionCount, _: &mut Context<Self>) -> usize {
        self.sessions.get(&msg.user_id).map_or(0, HashMap::len)
    }
}
