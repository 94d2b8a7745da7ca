// src/reports.rs

use std::collections::HashMap;

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::auth::current_user;
use crate::error::ApiResult;
use crate::i18n::{self, Language};
use crate::models::task::{Priority, Task, TaskStatus};
use crate::models::team_member::TeamMember;
use crate::settings;
use crate::tasks::{load_members_by_id, load_visible_tasks};

const DEFAULT_WEEKS: u32 = 8;
const MAX_WEEKS: u32 = 52;

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub weeks: Option<u32>,
}

impl ReportQuery {
    pub fn weeks(&self) -> u32 {
        self.weeks.unwrap_or(DEFAULT_WEEKS).clamp(1, MAX_WEEKS)
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct LabeledCount {
    pub key: String,
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct WeekBucket {
    /// Monday of the week.
    pub week_start: NaiveDate,
    pub created: usize,
    pub completed: usize,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct AssigneeLoad {
    /// `None` for the unassigned bucket.
    pub assignee_id: Option<String>,
    /// `None` when the id no longer matches a team member.
    pub name: Option<String>,
    pub open: usize,
    pub completed: usize,
}

#[derive(Debug, Serialize)]
pub struct ReportSummary {
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub by_status: Vec<LabeledCount>,
    pub by_priority: Vec<LabeledCount>,
    pub weekly: Vec<WeekBucket>,
    /// Percentage of non-canceled tasks that are completed, one decimal.
    pub completion_rate: f64,
    pub overdue: usize,
    pub workload: Vec<AssigneeLoad>,
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

fn completion_time(task: &Task) -> Option<DateTime<Utc>> {
    (task.status == TaskStatus::Completed).then(|| task.completed_at.unwrap_or(task.updated_at))
}

fn weekly_buckets(tasks: &[Task], now: DateTime<Utc>, weeks: u32) -> Vec<WeekBucket> {
    let current = week_start(now.date_naive());
    let mut buckets: Vec<WeekBucket> = (0..weeks)
        .rev()
        .map(|i| WeekBucket {
            week_start: current - Duration::weeks(i64::from(i)),
            created: 0,
            completed: 0,
        })
        .collect();
    let index: HashMap<NaiveDate, usize> = buckets
        .iter()
        .enumerate()
        .map(|(i, b)| (b.week_start, i))
        .collect();

    for task in tasks {
        if let Some(&i) = index.get(&week_start(task.created_at.date_naive())) {
            buckets[i].created += 1;
        }
        if let Some(done) = completion_time(task) {
            if let Some(&i) = index.get(&week_start(done.date_naive())) {
                buckets[i].completed += 1;
            }
        }
    }
    buckets
}

fn workload(tasks: &[Task], members: &HashMap<String, TeamMember>, lang: Language) -> Vec<AssigneeLoad> {
    let mut loads: HashMap<Option<String>, AssigneeLoad> = HashMap::new();
    for task in tasks.iter().filter(|t| t.status != TaskStatus::Canceled) {
        let entry = loads.entry(task.assignee_id.clone()).or_insert_with(|| {
            let name = match &task.assignee_id {
                None => Some(i18n::translate(lang, "report.unassigned")),
                Some(id) => members.get(id).map(|m| m.name.clone()),
            };
            AssigneeLoad {
                assignee_id: task.assignee_id.clone(),
                name,
                open: 0,
                completed: 0,
            }
        });
        if task.status == TaskStatus::Completed {
            entry.completed += 1;
        } else {
            entry.open += 1;
        }
    }

    let mut loads: Vec<AssigneeLoad> = loads.into_values().collect();
    loads.sort_by(|a, b| {
        b.open
            .cmp(&a.open)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.assignee_id.cmp(&b.assignee_id))
    });
    loads
}

pub fn compute_summary(
    tasks: &[Task],
    members: &HashMap<String, TeamMember>,
    lang: Language,
    now: DateTime<Utc>,
    weeks: u32,
) -> ReportSummary {
    let by_status = TaskStatus::ALL
        .iter()
        .map(|s| LabeledCount {
            key: s.as_str().to_string(),
            label: i18n::translate(lang, &s.label_key()),
            count: tasks.iter().filter(|t| t.status == *s).count(),
        })
        .collect();
    let by_priority = Priority::ALL
        .iter()
        .map(|p| LabeledCount {
            key: p.as_str().to_string(),
            label: i18n::translate(lang, &p.label_key()),
            count: tasks.iter().filter(|t| t.priority == *p).count(),
        })
        .collect();

    let active = tasks.iter().filter(|t| t.status != TaskStatus::Canceled).count();
    let completed = tasks.iter().filter(|t| t.status == TaskStatus::Completed).count();
    let completion_rate = if active > 0 {
        (completed as f64 / active as f64 * 1000.0).round() / 10.0
    } else {
        0.0
    };

    ReportSummary {
        generated_at: now,
        total: tasks.len(),
        by_status,
        by_priority,
        weekly: weekly_buckets(tasks, now, weeks),
        completion_rate,
        overdue: tasks.iter().filter(|t| t.is_overdue(now)).count(),
        workload: workload(tasks, members, lang),
    }
}

/// GET /reports/summary
pub async fn get_summary(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<ReportQuery>,
) -> ApiResult<HttpResponse> {
    let claims = current_user(&req)?;
    let tasks = load_visible_tasks(&data.mongodb, &claims.sub).await?;
    let members = load_members_by_id(&data.mongodb).await?;
    let lang = settings::load(&data.mongodb, &claims.sub).await?.language;

    let summary = compute_summary(&tasks, &members, lang, Utc::now(), query.weeks());
    Ok(HttpResponse::Ok().json(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::CreateTaskRequest;
    use crate::models::team_member::Seniority;
    use chrono::TimeZone;

    // Wednesday.
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 15, 12, 0, 0).unwrap()
    }

    fn task(
        created: DateTime<Utc>,
        status: TaskStatus,
        priority: Priority,
        assignee: Option<&str>,
    ) -> Task {
        let mut t = CreateTaskRequest {
            title: "t".into(),
            description: None,
            priority: Some(priority),
            status: Some(status),
            assignee_id: assignee.map(str::to_string),
            start_date: None,
            due_date: None,
        }
        .into_task("owner", created)
        .unwrap();
        t.updated_at = created;
        t
    }

    fn member(id: &str, name: &str) -> TeamMember {
        TeamMember {
            member_id: id.into(),
            name: name.into(),
            role: String::new(),
            email: format!("{}@x.io", id),
            bio: String::new(),
            avatar_url: None,
            skills: vec![],
            level: Seniority::Mid,
            joined_at: now(),
            user_id: None,
            created_by: "owner".into(),
        }
    }

    #[test]
    fn weeks_start_on_monday() {
        let wed = NaiveDate::from_ymd_opt(2024, 5, 15).unwrap();
        assert_eq!(week_start(wed), NaiveDate::from_ymd_opt(2024, 5, 13).unwrap());
        let mon = NaiveDate::from_ymd_opt(2024, 5, 13).unwrap();
        assert_eq!(week_start(mon), mon);
        let sun = NaiveDate::from_ymd_opt(2024, 5, 19).unwrap();
        assert_eq!(week_start(sun), mon);
    }

    #[test]
    fn weekly_buckets_are_oldest_first_and_count_creation_and_completion() {
        let tasks = vec![
            task(now(), TaskStatus::Pending, Priority::High, None),
            task(now() - Duration::days(7), TaskStatus::Completed, Priority::Low, None),
            // Outside a three-week window.
            task(now() - Duration::days(60), TaskStatus::Pending, Priority::Low, None),
        ];
        let buckets = weekly_buckets(&tasks, now(), 3);
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0].week_start, NaiveDate::from_ymd_opt(2024, 4, 29).unwrap());
        assert_eq!(buckets[2].week_start, NaiveDate::from_ymd_opt(2024, 5, 13).unwrap());
        assert_eq!((buckets[2].created, buckets[2].completed), (1, 0));
        // The completed task was created and finished a week ago.
        assert_eq!((buckets[1].created, buckets[1].completed), (1, 1));
        assert_eq!((buckets[0].created, buckets[0].completed), (0, 0));
    }

    #[test]
    fn summary_counts_and_rates() {
        let mut overdue = task(now(), TaskStatus::InProgress, Priority::High, Some("m1"));
        overdue.due_date = Some(now() - Duration::days(1));
        let tasks = vec![
            overdue,
            task(now(), TaskStatus::Completed, Priority::High, Some("m1")),
            task(now(), TaskStatus::Completed, Priority::Medium, None),
            task(now(), TaskStatus::Canceled, Priority::Low, Some("gone")),
        ];
        let members: HashMap<String, TeamMember> =
            [("m1".to_string(), member("m1", "Lia"))].into_iter().collect();

        let s = compute_summary(&tasks, &members, Language::En, now(), 4);
        assert_eq!(s.total, 4);
        assert_eq!(s.overdue, 1);
        // 2 completed out of 3 non-canceled.
        assert_eq!(s.completion_rate, 66.7);

        let completed = s.by_status.iter().find(|c| c.key == "completed").unwrap();
        assert_eq!((completed.count, completed.label.as_str()), (2, "Completed"));
        let high = s.by_priority.iter().find(|c| c.key == "high").unwrap();
        assert_eq!(high.count, 2);
        assert_eq!(s.weekly.len(), 4);
    }

    #[test]
    fn workload_groups_assignees_and_flags_dangling_ids() {
        let tasks = vec![
            task(now(), TaskStatus::Pending, Priority::High, Some("m1")),
            task(now(), TaskStatus::Completed, Priority::High, Some("m1")),
            task(now(), TaskStatus::Pending, Priority::High, Some("gone")),
            task(now(), TaskStatus::Pending, Priority::High, None),
            task(now(), TaskStatus::Pending, Priority::High, None),
            task(now(), TaskStatus::Canceled, Priority::High, None),
        ];
        let members: HashMap<String, TeamMember> =
            [("m1".to_string(), member("m1", "Lia"))].into_iter().collect();

        let loads = workload(&tasks, &members, Language::PtBr);
        assert_eq!(loads.len(), 3);
        assert_eq!(loads[0].assignee_id, None);
        assert_eq!(loads[0].name.as_deref(), Some("Sem responsável"));
        assert_eq!(loads[0].open, 2);

        let lia = loads.iter().find(|l| l.assignee_id.as_deref() == Some("m1")).unwrap();
        assert_eq!((lia.open, lia.completed), (1, 1));
        assert_eq!(lia.name.as_deref(), Some("Lia"));

        let dangling = loads.iter().find(|l| l.assignee_id.as_deref() == Some("gone")).unwrap();
        assert!(dangling.name.is_none());
    }

    #[test]
    fn empty_task_list_has_zero_rate() {
        let s = compute_summary(&[], &HashMap::new(), Language::Es, now(), 2);
        assert_eq!(s.total, 0);
        assert_eq!(s.completion_rate, 0.0);
        assert!(s.workload.is_empty());
    }

    #[test]
    fn weeks_query_is_clamped() {
        assert_eq!(ReportQuery::default().weeks(), 8);
        assert_eq!(ReportQuery { weeks: Some(0) }.weeks(), 1);
        assert_eq!(ReportQuery { weeks: Some(500) }.weeks(), 52);
    }
}
