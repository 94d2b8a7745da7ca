use std::str::FromStr;

use chrono::{DateTime, Utc};
use mongodb::bson::{to_bson, Document};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{fold_label, is_valid_email, require_text};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Seniority {
    Intern,
    #[default]
    Junior,
    Mid,
    Senior,
    Lead,
}

impl Seniority {
    pub fn as_str(self) -> &'static str {
        match self {
            Seniority::Intern => "intern",
            Seniority::Junior => "junior",
            Seniority::Mid => "mid",
            Seniority::Senior => "senior",
            Seniority::Lead => "lead",
        }
    }
}

impl FromStr for Seniority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match fold_label(s).as_str() {
            "intern" | "estagiario" | "estagiaria" | "trainee" => Ok(Seniority::Intern),
            "junior" | "jr" => Ok(Seniority::Junior),
            "mid" | "pleno" | "mid-level" | "semi-senior" => Ok(Seniority::Mid),
            "senior" | "sr" => Ok(Seniority::Senior),
            "lead" | "lider" | "tech-lead" | "principal" => Ok(Seniority::Lead),
            _ => Err(format!("unknown level: {}", s)),
        }
    }
}

impl<'de> Deserialize<'de> for Seniority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamMember {
    pub member_id: String,
    pub name: String,
    #[serde(default)]
    pub role: String,
    pub email: String,
    #[serde(default)]
    pub bio: String,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub level: Seniority,
    pub joined_at: DateTime<Utc>,
    /// Account linked through the member's email, if one existed when the
    /// member was created. Notifications go to this user.
    pub user_id: Option<String>,
    pub created_by: String,
}

/// A member as listed: `task_count` is computed on every read.
#[derive(Debug, Serialize)]
pub struct TeamMemberView {
    #[serde(flatten)]
    pub member: TeamMember,
    pub task_count: u64,
}

/// The slice of a member embedded in a task detail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssigneeSummary {
    pub member_id: String,
    pub name: String,
    pub role: String,
    pub avatar_url: Option<String>,
}

impl From<&TeamMember> for AssigneeSummary {
    fn from(m: &TeamMember) -> Self {
        AssigneeSummary {
            member_id: m.member_id.clone(),
            name: m.name.clone(),
            role: m.role.clone(),
            avatar_url: m.avatar_url.clone(),
        }
    }
}

fn clean_skills(skills: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for skill in skills {
        let skill = skill.trim().to_string();
        if !skill.is_empty() && !out.iter().any(|s| s.eq_ignore_ascii_case(&skill)) {
            out.push(skill);
        }
    }
    out
}

fn check_email(email: &str) -> ApiResult<String> {
    let email = email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(ApiError::BadRequest(format!("Invalid email: {}", email)));
    }
    Ok(email)
}

#[derive(Debug, Deserialize)]
pub struct CreateMemberRequest {
    pub name: String,
    pub role: Option<String>,
    pub email: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    pub level: Option<Seniority>,
    pub joined_at: Option<DateTime<Utc>>,
}

impl CreateMemberRequest {
    pub fn into_member(
        self,
        created_by: &str,
        linked_user: Option<String>,
        now: DateTime<Utc>,
    ) -> ApiResult<TeamMember> {
        Ok(TeamMember {
            member_id: Uuid::new_v4().to_string(),
            name: require_text("name", &self.name)?,
            role: self.role.unwrap_or_default().trim().to_string(),
            email: check_email(&self.email)?,
            bio: self.bio.unwrap_or_default().trim().to_string(),
            avatar_url: self.avatar_url.filter(|u| !u.trim().is_empty()),
            skills: clean_skills(self.skills),
            level: self.level.unwrap_or_default(),
            joined_at: self.joined_at.unwrap_or(now),
            user_id: linked_user,
            created_by: created_by.to_string(),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateMemberRequest {
    pub name: Option<String>,
    pub role: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub skills: Option<Vec<String>>,
    pub level: Option<Seniority>,
    pub joined_at: Option<DateTime<Utc>>,
}

/// `$set`/`$unset` pairs for a member update.
#[derive(Debug, Default)]
pub struct MemberChanges {
    pub set: Document,
    pub unset: Document,
    /// Normalized address when the request carries an email.
    pub new_email: Option<String>,
}

impl MemberChanges {
    /// Links the member to the account behind its new email, or unlinks it.
    pub fn link_account(&mut self, user_id: Option<String>) {
        match user_id {
            Some(id) => {
                self.set.insert("user_id", id);
            }
            None => {
                self.unset.insert("user_id", "");
            }
        }
    }

    pub fn fields(&self) -> Vec<String> {
        self.set.keys().chain(self.unset.keys()).cloned().collect()
    }

    pub fn into_update(self) -> Document {
        let mut update = Document::new();
        if !self.set.is_empty() {
            update.insert("$set", self.set);
        }
        if !self.unset.is_empty() {
            update.insert("$unset", self.unset);
        }
        update
    }
}

impl UpdateMemberRequest {
    /// Errors when nothing was sent. A blank avatar clears the field.
    pub fn changes(&self) -> ApiResult<MemberChanges> {
        let mut changes = MemberChanges::default();
        let set = &mut changes.set;
        if let Some(name) = &self.name {
            set.insert("name", require_text("name", name)?);
        }
        if let Some(role) = &self.role {
            set.insert("role", role.trim());
        }
        if let Some(email) = &self.email {
            let email = check_email(email)?;
            set.insert("email", email.as_str());
            changes.new_email = Some(email);
        }
        if let Some(bio) = &self.bio {
            set.insert("bio", bio.trim());
        }
        match self.avatar_url.as_deref().map(str::trim) {
            Some("") => {
                changes.unset.insert("avatar_url", "");
            }
            Some(url) => {
                set.insert("avatar_url", url);
            }
            None => {}
        }
        if let Some(skills) = &self.skills {
            set.insert("skills", clean_skills(skills.clone()));
        }
        if let Some(level) = self.level {
            set.insert("level", level.as_str());
        }
        if let Some(joined) = &self.joined_at {
            set.insert("joined_at", to_bson(joined)?);
        }
        if changes.set.is_empty() && changes.unset.is_empty() {
            return Err(ApiError::BadRequest("No fields to update".to_string()));
        }
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request() -> CreateMemberRequest {
        CreateMemberRequest {
            name: " Carla Souza ".to_string(),
            role: Some("Backend".to_string()),
            email: "Carla@CodeFlow.io".to_string(),
            bio: None,
            avatar_url: Some("".to_string()),
            skills: vec!["Rust".into(), " rust ".into(), "".into(), "Mongo".into()],
            level: Some("pleno".parse().unwrap()),
            joined_at: None,
        }
    }

    #[test]
    fn create_normalizes_fields() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let m = request().into_member("admin", None, now).unwrap();
        assert_eq!(m.name, "Carla Souza");
        assert_eq!(m.email, "carla@codeflow.io");
        assert_eq!(m.skills, vec!["Rust".to_string(), "Mongo".to_string()]);
        assert_eq!(m.level, Seniority::Mid);
        assert!(m.avatar_url.is_none());
        assert_eq!(m.joined_at, now);
    }

    #[test]
    fn create_rejects_bad_email() {
        let mut req = request();
        req.email = "carla".to_string();
        assert!(req.into_member("admin", None, Utc::now()).is_err());
    }

    #[test]
    fn update_requires_some_field() {
        assert!(UpdateMemberRequest::default().changes().is_err());
        let changes = UpdateMemberRequest {
            level: Some(Seniority::Lead),
            ..Default::default()
        }
        .changes()
        .unwrap();
        assert_eq!(changes.set.get_str("level").unwrap(), "lead");
        assert_eq!(changes.set.len(), 1);
        assert!(changes.new_email.is_none());
    }

    #[test]
    fn email_change_relinks_account() {
        let mut changes = UpdateMemberRequest {
            email: Some(" New@X.io ".to_string()),
            ..Default::default()
        }
        .changes()
        .unwrap();
        assert_eq!(changes.new_email.as_deref(), Some("new@x.io"));

        changes.link_account(Some("u-new".to_string()));
        let update = changes.into_update();
        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_str("email").unwrap(), "new@x.io");
        assert_eq!(set.get_str("user_id").unwrap(), "u-new");
        assert!(update.get("$unset").is_none());
    }

    #[test]
    fn email_without_account_unlinks() {
        let mut changes = UpdateMemberRequest {
            email: Some("nobody@x.io".to_string()),
            ..Default::default()
        }
        .changes()
        .unwrap();
        changes.link_account(None);
        assert_eq!(changes.fields(), vec!["email".to_string(), "user_id".to_string()]);
        let update = changes.into_update();
        assert!(update.get_document("$unset").unwrap().contains_key("user_id"));
        assert!(!update.get_document("$set").unwrap().contains_key("user_id"));
    }

    #[test]
    fn blank_avatar_is_unset() {
        let changes = UpdateMemberRequest {
            avatar_url: Some("  ".to_string()),
            ..Default::default()
        }
        .changes()
        .unwrap();
        assert!(changes.set.is_empty());
        assert!(changes.unset.contains_key("avatar_url"));
        let update = changes.into_update();
        assert!(update.get("$set").is_none());
    }

    #[test]
    fn level_labels_parse() {
        assert_eq!("Estagiário".parse::<Seniority>().unwrap(), Seniority::Intern);
        assert_eq!("Sênior".parse::<Seniority>().unwrap(), Seniority::Senior);
        assert_eq!("Tech Lead".parse::<Seniority>().unwrap(), Seniority::Lead);
    }

    #[test]
    fn view_flattens_member() {
        let m = request().into_member("admin", None, Utc::now()).unwrap();
        let json = serde_json::to_value(TeamMemberView {
            member: m,
            task_count: 4,
        })
        .unwrap();
        assert_eq!(json["name"], "Carla Souza");
        assert_eq!(json["task_count"], 4);
    }
}
