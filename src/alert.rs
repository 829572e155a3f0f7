use chrono::{DateTime, Duration, Utc};

use crate::models::{DismissalRecord, HealthStatus};
use crate::portfolio::PortfolioProject;

pub const DISMISSAL_KEY: &str = "critical_alert_dismissed";
const SHOW_WINDOW_MINUTES: i64 = 30;

/// Critical-health projects and their most recent recorded activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CriticalActivity {
    pub critical_count: u32,
    pub latest_activity: Option<DateTime<Utc>>,
}

impl CriticalActivity {
    /// Counts every critical project in the portfolio, including contracts
    /// that have no end date and so never reach a renewal cycle.
    pub fn from_portfolio(projects: &[PortfolioProject]) -> Self {
        projects
            .iter()
            .filter(|project| project.health == Some(HealthStatus::Critical))
            .fold(Self::default(), |acc, project| Self {
                critical_count: acc.critical_count + 1,
                latest_activity: acc.latest_activity.max(project.last_activity_at),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertVisibility {
    Visible,
    NoCriticalProjects,
    NoRecentActivity,
    Dismissed,
}

pub fn critical_alert_visibility(
    now: DateTime<Utc>,
    dismissal: Option<&DismissalRecord>,
    activity: &CriticalActivity,
) -> AlertVisibility {
    if activity.critical_count == 0 {
        return AlertVisibility::NoCriticalProjects;
    }

    let Some(latest) = activity.latest_activity else {
        return AlertVisibility::NoRecentActivity;
    };
    if now - latest > Duration::minutes(SHOW_WINDOW_MINUTES) {
        return AlertVisibility::NoRecentActivity;
    }

    match dismissal {
        Some(record) if latest <= record.dismissed_at => AlertVisibility::Dismissed,
        _ => AlertVisibility::Visible,
    }
}

pub fn dismiss(now: DateTime<Utc>, activity: &CriticalActivity) -> DismissalRecord {
    DismissalRecord {
        dismissed_at: now,
        critical_count: activity.critical_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::PortfolioRow;
    use chrono::{NaiveDate, TimeZone};
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 15, 0, 0).unwrap()
    }

    fn active(minutes_ago: i64) -> CriticalActivity {
        CriticalActivity {
            critical_count: 2,
            latest_activity: Some(now() - Duration::minutes(minutes_ago)),
        }
    }

    fn project(
        health: Option<&str>,
        end_date: Option<NaiveDate>,
        minutes_ago: Option<i64>,
    ) -> PortfolioProject {
        PortfolioProject::try_from(PortfolioRow {
            id: Uuid::new_v4(),
            project_name: "Portal".to_string(),
            client_name: None,
            start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            end_date,
            status: "Active".to_string(),
            contract_value: None,
            overall_health: health.map(str::to_string),
            health_score: None,
            blocker_count: Some(0),
            scope_creep_detected: Some(false),
            last_activity_at: minutes_ago.map(|m| now() - Duration::minutes(m)),
            open_action_count: 0,
            overdue_action_count: 0,
        })
        .unwrap()
    }

    #[test]
    fn hidden_without_critical_projects() {
        assert_eq!(
            critical_alert_visibility(now(), None, &CriticalActivity::default()),
            AlertVisibility::NoCriticalProjects
        );
    }

    #[test]
    fn visible_for_recent_activity_without_dismissal() {
        assert_eq!(
            critical_alert_visibility(now(), None, &active(10)),
            AlertVisibility::Visible
        );
        assert_eq!(
            critical_alert_visibility(now(), None, &active(30)),
            AlertVisibility::Visible
        );
    }

    #[test]
    fn hidden_when_activity_is_stale() {
        assert_eq!(
            critical_alert_visibility(now(), None, &active(31)),
            AlertVisibility::NoRecentActivity
        );
    }

    #[test]
    fn dismissal_holds_until_new_activity() {
        let dismissed = DismissalRecord {
            dismissed_at: now() - Duration::minutes(5),
            critical_count: 2,
        };
        assert_eq!(
            critical_alert_visibility(now(), Some(&dismissed), &active(8)),
            AlertVisibility::Dismissed
        );
        assert_eq!(
            critical_alert_visibility(now(), Some(&dismissed), &active(2)),
            AlertVisibility::Visible
        );
    }

    #[test]
    fn activity_counts_only_critical_projects() {
        let ends = NaiveDate::from_ymd_opt(2027, 1, 1);
        let projects = vec![
            project(Some("Critical"), ends, Some(40)),
            project(Some("Healthy"), ends, Some(1)),
            project(Some("Critical"), ends, Some(12)),
            project(Some("Critical"), ends, None),
            project(None, ends, Some(2)),
        ];
        let activity = CriticalActivity::from_portfolio(&projects);
        assert_eq!(activity.critical_count, 3);
        assert_eq!(
            activity.latest_activity,
            Some(now() - Duration::minutes(12))
        );
    }

    #[test]
    fn critical_project_without_end_date_raises_the_alert() {
        let projects = vec![project(Some("Critical"), None, Some(4))];
        let activity = CriticalActivity::from_portfolio(&projects);
        assert_eq!(activity.critical_count, 1);
        assert_eq!(
            critical_alert_visibility(now(), None, &activity),
            AlertVisibility::Visible
        );
    }

    #[test]
    fn dismiss_records_current_count() {
        let record = dismiss(now(), &active(1));
        assert_eq!(record.dismissed_at, now());
        assert_eq!(record.critical_count, 2);
    }
}
