use log::info;
use mongodb::bson::doc;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, Database, IndexModel};

use crate::models::{
    audit::AuditActivity, notification::Notification, settings::UserSettings, task::Task,
    team_member::TeamMember, user::User,
};

pub const TASKS: &str = "tarefas";
pub const MEMBERS: &str = "membros";
pub const AUDIT_LOGS: &str = "auditLogs";
pub const SETTINGS: &str = "configuracoes";
pub const NOTIFICATIONS: &str = "notificacoes";
pub const USERS: &str = "usuarios";

/// Server error code for a unique index violation.
const DUPLICATE_KEY: i32 = 11000;

/// `{ email: 1 }`, unique. Accounts and team members both key on it.
fn unique_email_index() -> IndexModel {
    IndexModel::builder()
        .keys(doc! { "email": 1 })
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

/// Whether a write failed on a unique index.
pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY
    )
}

pub struct MongoDB {
    pub client: Client,
    pub db: Database,
}

impl MongoDB {
    /// Parses the URI and builds the client. The driver connects lazily, so
    /// no round trip happens here.
    pub async fn init(uri: &str, db_name: &str) -> mongodb::error::Result<Self> {
        let mut client_options = ClientOptions::parse(uri).await?;
        client_options.app_name = Some("codeflow-tasks".to_string());
        let client = Client::with_options(client_options)?;
        let db = client.database(db_name);
        Ok(MongoDB { client, db })
    }

    /// Creates the unique email indexes on `usuarios` and `membros`.
    /// Needs a reachable server; fails if duplicates are already stored.
    pub async fn ensure_indexes(&self) -> mongodb::error::Result<()> {
        self.users().create_index(unique_email_index()).await?;
        self.members().create_index(unique_email_index()).await?;
        info!("Unique email indexes are in place");
        Ok(())
    }

    pub fn tasks(&self) -> Collection<Task> {
        self.db.collection(TASKS)
    }

    pub fn members(&self) -> Collection<TeamMember> {
        self.db.collection(MEMBERS)
    }

    pub fn audit_logs(&self) -> Collection<AuditActivity> {
        self.db.collection(AUDIT_LOGS)
    }

    pub fn settings(&self) -> Collection<UserSettings> {
        self.db.collection(SETTINGS)
    }

    pub fn notifications(&self) -> Collection<Notification> {
        self.db.collection(NOTIFICATIONS)
    }

    pub fn users(&self) -> Collection<User> {
        self.db.collection(USERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_index_is_unique() {
        let index = unique_email_index();
        assert_eq!(index.keys, doc! { "email": 1 });
        assert_eq!(index.options.and_then(|o| o.unique), Some(true));
    }

    #[actix_web::test]
    async fn init_does_not_contact_the_server() {
        let db = MongoDB::init("mongodb://127.0.0.1:1", "codeflow_test").await.unwrap();
        assert_eq!(db.db.name(), "codeflow_test");
    }
}
