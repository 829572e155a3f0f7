use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};
use clap::ValueEnum;
use serde::Serialize;
use uuid::Uuid;

use crate::error::MalformedRecord;

/// Variant order is urgency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, ValueEnum)]
pub enum ActionPriority {
    Critical,
    High,
    Medium,
    Low,
}

impl ActionPriority {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "Critical" => Some(Self::Critical),
            "High" => Some(Self::High),
            "Medium" => Some(Self::Medium),
            "Low" => Some(Self::Low),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "Critical",
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
pub enum ActionStatus {
    Open,
    #[serde(rename = "In Progress")]
    InProgress,
    Blocked,
    Completed,
    Cancelled,
}

impl ActionStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "Open" => Some(Self::Open),
            "In Progress" => Some(Self::InProgress),
            "Blocked" => Some(Self::Blocked),
            "Completed" => Some(Self::Completed),
            "Cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::InProgress => "In Progress",
            Self::Blocked => "Blocked",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn is_closed(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// An action joined with its project, as read from the database.
#[derive(Debug, Clone)]
pub struct ActionRow {
    pub id: Uuid,
    pub project_name: Option<String>,
    pub client_name: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub priority: String,
    pub status: String,
    pub due_date: Option<NaiveDate>,
    pub evidence_link: Option<String>,
    pub source_type: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionItem {
    pub id: Uuid,
    pub project_name: Option<String>,
    pub client_name: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub priority: ActionPriority,
    pub status: ActionStatus,
    pub due_date: Option<NaiveDate>,
    pub evidence_link: Option<String>,
    pub source_type: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ActionRow> for ActionItem {
    type Error = MalformedRecord;

    fn try_from(row: ActionRow) -> Result<Self, Self::Error> {
        let priority =
            ActionPriority::parse(&row.priority).ok_or_else(|| MalformedRecord::UnrecognizedValue {
                id: row.id,
                field: "priority",
                value: row.priority.clone(),
            })?;
        let status =
            ActionStatus::parse(&row.status).ok_or_else(|| MalformedRecord::UnrecognizedValue {
                id: row.id,
                field: "status",
                value: row.status.clone(),
            })?;

        Ok(ActionItem {
            id: row.id,
            project_name: row.project_name,
            client_name: row.client_name,
            title: row.title,
            description: row.description,
            owner: row.owner,
            priority,
            status,
            due_date: row.due_date,
            evidence_link: row.evidence_link.filter(|link| !link.trim().is_empty()),
            source_type: row.source_type,
            completed_at: row.completed_at,
            created_at: row.created_at,
        })
    }
}

impl ActionItem {
    pub fn aging_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_days().max(0)
    }

    /// Past its due date and still open. Due today is not overdue.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_closed()
            && self
                .due_date
                .is_some_and(|due_date| due_date < now.date_naive())
    }

    /// Shown in the blocker drill-down: critical priority or blocked status.
    pub fn is_blocker(&self) -> bool {
        self.priority == ActionPriority::Critical || self.status == ActionStatus::Blocked
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ActionFilter {
    pub priority: Option<ActionPriority>,
    pub include_closed: bool,
    pub blockers_only: bool,
}

/// Most urgent first; within a priority, earliest due date first with undated
/// actions last, then oldest first.
pub fn queue<'a>(items: &'a [ActionItem], filter: &ActionFilter) -> Vec<&'a ActionItem> {
    let mut selected: Vec<&ActionItem> = items
        .iter()
        .filter(|item| filter.include_closed || !item.status.is_closed())
        .filter(|item| filter.priority.map_or(true, |priority| item.priority == priority))
        .filter(|item| !filter.blockers_only || item.is_blocker())
        .collect();

    selected.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| due_order(a.due_date, b.due_date))
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
    selected
}

fn due_order(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Column values written when an action moves to `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub status: ActionStatus,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Completing stamps `completed_at`; any other status clears it, so reopening
/// an action forgets its earlier completion.
pub fn status_change(status: ActionStatus, now: DateTime<Utc>) -> StatusChange {
    StatusChange {
        status,
        completed_at: (status == ActionStatus::Completed).then_some(now),
    }
}

pub fn format_line(item: &ActionItem, now: DateTime<Utc>) -> String {
    let mut line = format!(
        "- [{}] {} ({}) {}, owner {}",
        item.priority.as_str(),
        item.title,
        item.project_name.as_deref().unwrap_or("No project"),
        item.status.as_str(),
        item.owner.as_deref().unwrap_or("unassigned")
    );
    match item.due_date {
        Some(due_date) if item.is_overdue(now) => {
            line.push_str(&format!(", OVERDUE since {due_date}"));
        }
        Some(due_date) => line.push_str(&format!(", due {due_date}")),
        None => {}
    }
    line.push_str(&format!(", open {} day(s)", item.aging_days(now)));
    line
}

pub fn write_csv<W: std::io::Write>(writer: W, items: &[&ActionItem]) -> anyhow::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record([
        "Title",
        "Description",
        "Project",
        "Owner",
        "Priority",
        "Status",
        "Due Date",
        "Source",
        "Created At",
    ])?;

    for item in items {
        csv_writer.write_record([
            item.title.clone(),
            item.description.clone().unwrap_or_default(),
            item.project_name.clone().unwrap_or_default(),
            item.owner.clone().unwrap_or_default(),
            item.priority.as_str().to_string(),
            item.status.as_str().to_string(),
            item.due_date.map(|d| d.to_string()).unwrap_or_default(),
            item.source_type.clone().unwrap_or_default(),
            item.created_at.format("%Y-%m-%d %H:%M").to_string(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    fn row(title: &str, priority: &str, status: &str) -> ActionRow {
        ActionRow {
            id: Uuid::new_v4(),
            project_name: Some("Student Success Platform".to_string()),
            client_name: Some("Northfield University".to_string()),
            title: title.to_string(),
            description: None,
            owner: Some("Dana Ortiz".to_string()),
            priority: priority.to_string(),
            status: status.to_string(),
            due_date: None,
            evidence_link: None,
            source_type: Some("chat".to_string()),
            completed_at: None,
            created_at: now() - Duration::days(3),
        }
    }

    fn item(title: &str, priority: ActionPriority, status: ActionStatus) -> ActionItem {
        ActionItem::try_from(row(title, priority.as_str(), status.as_str())).unwrap()
    }

    #[test]
    fn rows_parse_priority_and_status_labels() {
        let parsed = ActionItem::try_from(row("Send SOW", "High", "In Progress")).unwrap();
        assert_eq!(parsed.priority, ActionPriority::High);
        assert_eq!(parsed.status, ActionStatus::InProgress);
    }

    #[test]
    fn unknown_priority_is_malformed() {
        let err = ActionItem::try_from(row("Send SOW", "Urgent", "Open")).unwrap_err();
        assert!(matches!(
            err,
            MalformedRecord::UnrecognizedValue {
                field: "priority",
                ..
            }
        ));
    }

    #[test]
    fn completing_stamps_and_reopening_clears_completion() {
        let done = status_change(ActionStatus::Completed, now());
        assert_eq!(done.completed_at, Some(now()));
        let reopened = status_change(ActionStatus::Open, now());
        assert_eq!(reopened.completed_at, None);
        assert_eq!(status_change(ActionStatus::Cancelled, now()).completed_at, None);
    }

    #[test]
    fn queue_orders_by_priority_then_due_date() {
        let mut undated = item("undated critical", ActionPriority::Critical, ActionStatus::Open);
        undated.created_at = now() - Duration::days(10);
        let mut late = item("late critical", ActionPriority::Critical, ActionStatus::Open);
        late.due_date = NaiveDate::from_ymd_opt(2026, 10, 30);
        let mut soon = item("soon critical", ActionPriority::Critical, ActionStatus::Blocked);
        soon.due_date = NaiveDate::from_ymd_opt(2026, 10, 20);
        let items = vec![
            item("low", ActionPriority::Low, ActionStatus::Open),
            undated,
            item("done", ActionPriority::Critical, ActionStatus::Completed),
            late,
            item("medium", ActionPriority::Medium, ActionStatus::InProgress),
            soon,
        ];

        let titles: Vec<_> = queue(&items, &ActionFilter::default())
            .iter()
            .map(|a| a.title.as_str())
            .collect();
        assert_eq!(
            titles,
            vec!["soon critical", "late critical", "undated critical", "medium", "low"]
        );
    }

    #[test]
    fn queue_filters_by_priority_and_closed_state() {
        let items = vec![
            item("open high", ActionPriority::High, ActionStatus::Open),
            item("done high", ActionPriority::High, ActionStatus::Completed),
            item("open low", ActionPriority::Low, ActionStatus::Open),
        ];
        let filter = ActionFilter {
            priority: Some(ActionPriority::High),
            include_closed: true,
            ..ActionFilter::default()
        };
        let titles: Vec<_> = queue(&items, &filter).iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["open high", "done high"]);
    }

    #[test]
    fn blocker_drill_down_keeps_critical_or_blocked_actions() {
        let items = vec![
            item("critical", ActionPriority::Critical, ActionStatus::Open),
            item("blocked", ActionPriority::Low, ActionStatus::Blocked),
            item("routine", ActionPriority::Medium, ActionStatus::Open),
        ];
        let filter = ActionFilter {
            blockers_only: true,
            ..ActionFilter::default()
        };
        assert_eq!(queue(&items, &filter).len(), 2);
    }

    #[test]
    fn overdue_requires_open_status_and_past_due_date() {
        let mut action = item("follow up", ActionPriority::High, ActionStatus::Open);
        action.due_date = NaiveDate::from_ymd_opt(2026, 10, 19);
        assert!(!action.is_overdue(now()));
        action.due_date = NaiveDate::from_ymd_opt(2026, 10, 18);
        assert!(action.is_overdue(now()));
        action.status = ActionStatus::Completed;
        assert!(!action.is_overdue(now()));
        assert_eq!(action.aging_days(now()), 3);
    }

    #[test]
    fn csv_export_matches_queue_columns() {
        let action = item("Send renewal deck", ActionPriority::Critical, ActionStatus::Open);
        let mut buffer = Vec::new();
        write_csv(&mut buffer, &[&action]).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Title,Description,Project,Owner,Priority,Status,Due Date,Source,Created At"
        );
        assert_eq!(
            lines.next().unwrap(),
            "Send renewal deck,,Student Success Platform,Dana Ortiz,Critical,Open,,chat,2026-10-16 12:00"
        );
    }
}
