use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::MalformedRecord;
use crate::models::HealthStatus;
use crate::risk;

const UPCOMING_WINDOW_DAYS: i64 = 90;
/// Score assumed for projects that have never been scored.
const DEFAULT_HEALTH_SCORE: i32 = 50;

/// Every contract with its latest metrics and action counts, as read from the
/// database. Unlike the renewal cycle, contracts without an end date are kept.
#[derive(Debug, Clone)]
pub struct PortfolioRow {
    pub id: Uuid,
    pub project_name: String,
    pub client_name: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub status: String,
    pub contract_value: Option<f64>,
    pub overall_health: Option<String>,
    pub health_score: Option<i32>,
    pub blocker_count: Option<i32>,
    pub scope_creep_detected: Option<bool>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub open_action_count: i64,
    pub overdue_action_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioProject {
    pub id: Uuid,
    pub project_name: String,
    pub client_name: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub status: String,
    pub contract_value: Option<f64>,
    /// `None` while the project has no health metrics yet.
    pub health: Option<HealthStatus>,
    pub health_score: Option<i32>,
    pub blocker_count: u32,
    pub scope_creep_detected: bool,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub open_action_count: u32,
    pub overdue_action_count: u32,
}

impl TryFrom<PortfolioRow> for PortfolioProject {
    type Error = MalformedRecord;

    fn try_from(row: PortfolioRow) -> Result<Self, Self::Error> {
        let health = match row.overall_health {
            None => None,
            Some(raw) => Some(HealthStatus::parse(&raw).ok_or(MalformedRecord::UnknownHealth {
                contract_id: row.id,
                value: raw,
            })?),
        };

        Ok(PortfolioProject {
            id: row.id,
            project_name: row.project_name,
            client_name: row.client_name,
            start_date: row.start_date,
            end_date: row.end_date,
            status: row.status,
            contract_value: row.contract_value,
            health,
            health_score: row.health_score,
            blocker_count: row.blocker_count.unwrap_or(0).max(0) as u32,
            scope_creep_detected: row.scope_creep_detected.unwrap_or(false),
            last_activity_at: row.last_activity_at,
            open_action_count: count(row.open_action_count),
            overdue_action_count: count(row.overdue_action_count),
        })
    }
}

fn count(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

impl PortfolioProject {
    pub fn days_remaining(&self, now: DateTime<Utc>) -> Option<i64> {
        self.end_date.map(|end_date| risk::days_until(end_date, now))
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.health, None | Some(HealthStatus::Unknown))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PortfolioOverview {
    pub total: usize,
    pub critical: usize,
    pub at_risk: usize,
    pub healthy: usize,
    /// Unknown health or no metrics yet.
    pub pending: usize,
    pub total_blockers: u32,
    pub total_overdue_actions: u32,
    pub total_contract_value: f64,
    pub average_health_score: u8,
    pub upcoming_renewals: usize,
}

pub fn summarize(projects: &[PortfolioProject], now: DateTime<Utc>) -> PortfolioOverview {
    let count_health =
        |status: HealthStatus| projects.iter().filter(|p| p.health == Some(status)).count();

    let average_health_score = if projects.is_empty() {
        0
    } else {
        let total: i64 = projects
            .iter()
            .map(|p| i64::from(p.health_score.unwrap_or(DEFAULT_HEALTH_SCORE)))
            .sum();
        (total as f64 / projects.len() as f64).round().clamp(0.0, 100.0) as u8
    };

    PortfolioOverview {
        total: projects.len(),
        critical: count_health(HealthStatus::Critical),
        at_risk: count_health(HealthStatus::AtRisk),
        healthy: count_health(HealthStatus::Healthy),
        pending: projects.iter().filter(|p| p.is_pending()).count(),
        total_blockers: projects.iter().map(|p| p.blocker_count).sum(),
        total_overdue_actions: projects.iter().map(|p| p.overdue_action_count).sum(),
        total_contract_value: projects.iter().filter_map(|p| p.contract_value).sum(),
        average_health_score,
        upcoming_renewals: projects
            .iter()
            .filter_map(|p| p.days_remaining(now))
            .filter(|days| (1..=UPCOMING_WINDOW_DAYS).contains(days))
            .count(),
    }
}

fn health_rank(health: Option<HealthStatus>) -> u8 {
    match health {
        Some(HealthStatus::Critical) => 0,
        Some(HealthStatus::AtRisk) => 1,
        Some(HealthStatus::Healthy) => 2,
        Some(HealthStatus::Unknown) => 3,
        None => 4,
    }
}

/// Worst health first, then by project name.
pub fn sort_by_health(projects: &mut [PortfolioProject]) {
    projects.sort_by(|a, b| {
        health_rank(a.health)
            .cmp(&health_rank(b.health))
            .then_with(|| a.project_name.cmp(&b.project_name))
    });
}

pub fn format_line(project: &PortfolioProject, now: DateTime<Utc>) -> String {
    let health = project.health.map_or("Pending", HealthStatus::as_str);
    let renewal = match project.days_remaining(now) {
        Some(days) if days > 0 => format!("{days} days left"),
        Some(_) => "ended".to_string(),
        None => "no end date".to_string(),
    };
    format!(
        "- [{}] {} ({}) score {}, {} blocker(s), {} open / {} overdue action(s), {}",
        health,
        project.project_name,
        project.client_name.as_deref().unwrap_or("Unknown Client"),
        project
            .health_score
            .map_or_else(|| "n/a".to_string(), |score| score.to_string()),
        project.blocker_count,
        project.open_action_count,
        project.overdue_action_count,
        renewal
    )
}

pub fn write_csv<W: std::io::Write>(
    writer: W,
    projects: &[PortfolioProject],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record([
        "Project Name",
        "Client",
        "Health Status",
        "Health Score",
        "Blockers",
        "Open Actions",
        "Overdue Actions",
        "Start Date",
        "End Date",
        "Days Remaining",
        "Contract Value",
        "Last Activity",
    ])?;

    for project in projects {
        csv_writer.write_record([
            project.project_name.clone(),
            project.client_name.clone().unwrap_or_default(),
            project
                .health
                .map(|health| health.as_str().to_string())
                .unwrap_or_default(),
            project
                .health_score
                .map(|score| score.to_string())
                .unwrap_or_default(),
            project.blocker_count.to_string(),
            project.open_action_count.to_string(),
            project.overdue_action_count.to_string(),
            project.start_date.to_string(),
            project.end_date.map(|d| d.to_string()).unwrap_or_default(),
            project
                .days_remaining(now)
                .map(|days| days.to_string())
                .unwrap_or_default(),
            project
                .contract_value
                .map(|value| value.to_string())
                .unwrap_or_default(),
            project
                .last_activity_at
                .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}
