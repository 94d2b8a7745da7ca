use std::sync::Arc;

use actix::Addr;
use log::debug;

use crate::config::Config;
use crate::db::MongoDB;
use crate::live_feed::{ChangeEvent, LiveFeed, Publish};

#[derive(Clone)]
pub struct AppState {
    pub mongodb: Arc<MongoDB>,
    pub live_feed: Addr<LiveFeed>,
    pub config: Config,
    pub http_client: reqwest::Client,
}

impl AppState {
    /// Pushes a change to every live session of `recipients`. Fire and forget.
    pub fn publish(&self, recipients: Vec<String>, event: ChangeEvent) {
        if recipients.is_empty() {
            return;
        }
        debug!("Queueing {} change for {} recipient(s)", event.collection, recipients.len());
        self.live_feed.do_send(Publish { recipients, event });
    }
}
