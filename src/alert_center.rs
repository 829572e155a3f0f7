use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::Serialize;
use uuid::Uuid;

use crate::error::MalformedRecord;

/// How many of the newest notifications are loaded before filtering.
pub const FETCH_LIMIT: i64 = 100;

/// Variant order is severity order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, ValueEnum)]
pub enum AlertSeverity {
    Critical,
    High,
    Medium,
    Low,
}

impl AlertSeverity {
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

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Unread,
    Read,
    Dismissed,
    Actioned,
}

impl AlertStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "unread" => Some(Self::Unread),
            "read" => Some(Self::Read),
            "dismissed" => Some(Self::Dismissed),
            "actioned" => Some(Self::Actioned),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unread => "unread",
            Self::Read => "read",
            Self::Dismissed => "dismissed",
            Self::Actioned => "actioned",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertRuleType {
    HealthChange,
    BlockerThreshold,
    SentimentDrop,
    OverdueActions,
    NoActivity,
    RenewalApproaching,
}

impl AlertRuleType {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "health_change" => Some(Self::HealthChange),
            "blocker_threshold" => Some(Self::BlockerThreshold),
            "sentiment_drop" => Some(Self::SentimentDrop),
            "overdue_actions" => Some(Self::OverdueActions),
            "no_activity" => Some(Self::NoActivity),
            "renewal_approaching" => Some(Self::RenewalApproaching),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::HealthChange => "health_change",
            Self::BlockerThreshold => "blocker_threshold",
            Self::SentimentDrop => "sentiment_drop",
            Self::OverdueActions => "overdue_actions",
            Self::NoActivity => "no_activity",
            Self::RenewalApproaching => "renewal_approaching",
        }
    }
}

/// A notification joined with its project and rule names.
#[derive(Debug, Clone)]
pub struct AlertRow {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub severity: String,
    pub status: String,
    pub project_name: Option<String>,
    pub client_name: Option<String>,
    pub rule_name: Option<String>,
    pub rule_type: Option<String>,
    pub triggered_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub dismissed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertNotification {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub status: AlertStatus,
    pub project_name: Option<String>,
    pub client_name: Option<String>,
    pub rule_name: Option<String>,
    pub rule_type: Option<AlertRuleType>,
    pub triggered_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub dismissed_at: Option<DateTime<Utc>>,
}

fn unrecognized(id: Uuid, field: &'static str, value: &str) -> MalformedRecord {
    MalformedRecord::UnrecognizedValue {
        id,
        field,
        value: value.to_string(),
    }
}

impl TryFrom<AlertRow> for AlertNotification {
    type Error = MalformedRecord;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        let severity = AlertSeverity::parse(&row.severity)
            .ok_or_else(|| unrecognized(row.id, "severity", &row.severity))?;
        let status = AlertStatus::parse(&row.status)
            .ok_or_else(|| unrecognized(row.id, "status", &row.status))?;
        let rule_type = match row.rule_type.as_deref() {
            None => None,
            Some(raw) => Some(
                AlertRuleType::parse(raw).ok_or_else(|| unrecognized(row.id, "rule type", raw))?,
            ),
        };

        Ok(AlertNotification {
            id: row.id,
            title: row.title,
            message: row.message,
            severity,
            status,
            project_name: row.project_name,
            client_name: row.client_name,
            rule_name: row.rule_name,
            rule_type,
            triggered_at: row.triggered_at,
            read_at: row.read_at,
            dismissed_at: row.dismissed_at,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertFilter {
    /// Everything except dismissed alerts.
    All,
    Unread,
    Severity(AlertSeverity),
}

/// Alerts matching `filter`, keeping the input (newest first) order.
pub fn visible<'a>(
    alerts: &'a [AlertNotification],
    filter: AlertFilter,
    limit: usize,
) -> Vec<&'a AlertNotification> {
    alerts
        .iter()
        .filter(|alert| match filter {
            AlertFilter::All => alert.status != AlertStatus::Dismissed,
            AlertFilter::Unread => alert.status == AlertStatus::Unread,
            AlertFilter::Severity(severity) => {
                alert.severity == severity && alert.status != AlertStatus::Dismissed
            }
        })
        .take(limit)
        .collect()
}

pub fn unread_count(alerts: &[AlertNotification]) -> usize {
    alerts
        .iter()
        .filter(|alert| alert.status == AlertStatus::Unread)
        .count()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertAction {
    MarkRead,
    Dismiss,
}

/// Column values written for an alert action. Timestamps left `None` keep
/// whatever is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertTransition {
    pub status: AlertStatus,
    pub read_at: Option<DateTime<Utc>>,
    pub dismissed_at: Option<DateTime<Utc>>,
}

pub fn transition(action: AlertAction, now: DateTime<Utc>) -> AlertTransition {
    match action {
        AlertAction::MarkRead => AlertTransition {
            status: AlertStatus::Read,
            read_at: Some(now),
            dismissed_at: None,
        },
        AlertAction::Dismiss => AlertTransition {
            status: AlertStatus::Dismissed,
            read_at: None,
            dismissed_at: Some(now),
        },
    }
}

#[derive(Debug, Clone)]
pub struct AlertRuleRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub rule_type: String,
    pub severity: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRule {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub rule_type: AlertRuleType,
    pub severity: AlertSeverity,
    pub is_active: bool,
}

impl TryFrom<AlertRuleRow> for AlertRule {
    type Error = MalformedRecord;

    fn try_from(row: AlertRuleRow) -> Result<Self, Self::Error> {
        Ok(AlertRule {
            rule_type: AlertRuleType::parse(&row.rule_type)
                .ok_or_else(|| unrecognized(row.id, "rule type", &row.rule_type))?,
            severity: AlertSeverity::parse(&row.severity)
                .ok_or_else(|| unrecognized(row.id, "severity", &row.severity))?,
            id: row.id,
            name: row.name,
            description: row.description,
            is_active: row.is_active,
        })
    }
}

/// Most severe first, then by name.
pub fn sort_rules(rules: &mut [AlertRule]) {
    rules.sort_by(|a, b| a.severity.cmp(&b.severity).then_with(|| a.name.cmp(&b.name)));
}

pub fn format_line(alert: &AlertNotification) -> String {
    let marker = if alert.status == AlertStatus::Unread { "*" } else { " " };
    format!(
        "{} [{}] {} {} ({}): {}",
        marker,
        alert.severity.as_str(),
        alert.triggered_at.format("%Y-%m-%d %H:%M"),
        alert.title,
        alert.project_name.as_deref().unwrap_or("portfolio"),
        alert.message
    )
}

pub fn write_csv<W: std::io::Write>(
    writer: W,
    alerts: &[&AlertNotification],
) -> anyhow::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record([
        "Title",
        "Message",
        "Severity",
        "Status",
        "Project",
        "Rule Type",
        "Triggered At",
    ])?;

    for alert in alerts {
        csv_writer.write_record([
            alert.title.clone(),
            alert.message.clone(),
            alert.severity.as_str().to_string(),
            alert.status.as_str().to_string(),
            alert.project_name.clone().unwrap_or_default(),
            alert
                .rule_type
                .map(|rule_type| rule_type.as_str().to_string())
                .unwrap_or_default(),
            alert.triggered_at.format("%Y-%m-%d %H:%M").to_string(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}
