use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::{PgPool, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::actions::{self, ActionPriority, ActionRow, ActionStatus, StatusChange};
use crate::alert_center::{
    AlertRow, AlertRuleRow, AlertRuleType, AlertSeverity, AlertStatus, AlertTransition,
};
use crate::cycle::RenewalSource;
use crate::error::FetchError;
use crate::models::{CommunicationRow, ContractRow, DismissalRecord};
use crate::portfolio::PortfolioRow;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Postgres-backed source for refresh cycles.
#[derive(Debug, Clone)]
pub struct PgSource {
    pool: PgPool,
}

impl PgSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl RenewalSource for PgSource {
    async fn contracts(&self) -> Result<Vec<ContractRow>, FetchError> {
        fetch_contracts(&self.pool)
            .await
            .map_err(|source| FetchError::Query {
                what: "contracts",
                source,
            })
    }

    async fn communications(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<CommunicationRow>, FetchError> {
        fetch_communications(&self.pool, since)
            .await
            .map_err(|source| FetchError::Query {
                what: "communications",
                source,
            })
    }
}

/// Contracts with an end date, each joined with its latest health metrics.
pub async fn fetch_contracts(pool: &PgPool) -> Result<Vec<ContractRow>, sqlx::Error> {
    let records = sqlx::query(
        r#"
        SELECT c.id, c.project_name, c.client_name, c.end_date, c.renewal_window_start,
               h.overall_health, h.scope_creep_detected, h.blocker_count, h.last_activity_date
        FROM renewal_oracle.sow_contracts c
        LEFT JOIN LATERAL (
            SELECT overall_health, scope_creep_detected, blocker_count, last_activity_date
            FROM renewal_oracle.project_health_metrics m
            WHERE m.project_id = c.id
            ORDER BY m.metric_date DESC, m.created_at DESC
            LIMIT 1
        ) h ON TRUE
        WHERE c.end_date IS NOT NULL
        ORDER BY c.end_date ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut contracts = Vec::with_capacity(records.len());
    for row in records {
        contracts.push(ContractRow {
            id: row.try_get("id")?,
            project_name: row.try_get("project_name")?,
            client_name: row.try_get("client_name")?,
            end_date: row.try_get("end_date")?,
            renewal_window_start: row.try_get("renewal_window_start")?,
            overall_health: row.try_get("overall_health")?,
            scope_creep_detected: row.try_get("scope_creep_detected")?,
            blocker_count: row.try_get("blocker_count")?,
            last_activity_at: row.try_get("last_activity_date")?,
        });
    }

    debug!(count = contracts.len(), "loaded contracts");
    Ok(contracts)
}

/// Communications since `since`, newest first.
pub async fn fetch_communications(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> Result<Vec<CommunicationRow>, sqlx::Error> {
    let records = sqlx::query(
        r#"
        SELECT id, project_id, sentiment, created_at, evidence_link, source, event_type
        FROM renewal_oracle.delivery_intelligence
        WHERE created_at >= $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(since)
    .fetch_all(pool)
    .await?;

    let mut communications = Vec::with_capacity(records.len());
    for row in records {
        communications.push(CommunicationRow {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            sentiment: row.try_get("sentiment")?,
            created_at: row.try_get("created_at")?,
            evidence_link: row.try_get("evidence_link")?,
            source: row.try_get("source")?,
            event_type: row.try_get("event_type")?,
        });
    }

    debug!(count = communications.len(), %since, "loaded communications");
    Ok(communications)
}

pub async fn load_dismissal(pool: &PgPool, key: &str) -> anyhow::Result<Option<DismissalRecord>> {
    let row = sqlx::query(
        "SELECT dismissed_at, critical_count FROM renewal_oracle.alert_dismissals WHERE key = $1",
    )
    .bind(key)
    .fetch_optional(pool)
    .await
    .context("failed to read alert dismissal")?;

    let Some(row) = row else {
        return Ok(None);
    };

    let critical_count: i32 = row.try_get("critical_count")?;
    Ok(Some(DismissalRecord {
        dismissed_at: row.try_get("dismissed_at")?,
        critical_count: critical_count.max(0) as u32,
    }))
}

pub async fn save_dismissal(
    pool: &PgPool,
    key: &str,
    record: &DismissalRecord,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO renewal_oracle.alert_dismissals (key, dismissed_at, critical_count)
        VALUES ($1, $2, $3)
        ON CONFLICT (key) DO UPDATE
        SET dismissed_at = EXCLUDED.dismissed_at, critical_count = EXCLUDED.critical_count
        "#,
    )
    .bind(key)
    .bind(record.dismissed_at)
    .bind(i32::try_from(record.critical_count).unwrap_or(i32::MAX))
    .execute(pool)
    .await
    .context("failed to store alert dismissal")?;
    Ok(())
}

/// Every contract, with or without an end date, joined with its latest
/// health metrics and its open and overdue action counts as of `today`.
pub async fn fetch_portfolio(
    pool: &PgPool,
    today: NaiveDate,
) -> Result<Vec<PortfolioRow>, sqlx::Error> {
    let records = sqlx::query(
        r#"
        SELECT c.id, c.project_name, c.client_name, c.start_date, c.end_date, c.status,
               c.contract_value, h.overall_health, h.health_score, h.blocker_count,
               h.scope_creep_detected, h.last_activity_date,
               a.open_action_count, a.overdue_action_count
        FROM renewal_oracle.sow_contracts c
        LEFT JOIN LATERAL (
            SELECT overall_health, health_score, blocker_count, scope_creep_detected,
                   last_activity_date
            FROM renewal_oracle.project_health_metrics m
            WHERE m.project_id = c.id
            ORDER BY m.metric_date DESC, m.created_at DESC
            LIMIT 1
        ) h ON TRUE
        CROSS JOIN LATERAL (
            SELECT COUNT(*) FILTER (
                       WHERE q.status NOT IN ('Completed', 'Cancelled')
                   ) AS open_action_count,
                   COUNT(*) FILTER (
                       WHERE q.status NOT IN ('Completed', 'Cancelled') AND q.due_date < $1
                   ) AS overdue_action_count
            FROM renewal_oracle.action_queue q
            WHERE q.project_id = c.id
        ) a
        ORDER BY c.project_name ASC
        "#,
    )
    .bind(today)
    .fetch_all(pool)
    .await?;

    let mut projects = Vec::with_capacity(records.len());
    for row in records {
        projects.push(PortfolioRow {
            id: row.try_get("id")?,
            project_name: row.try_get("project_name")?,
            client_name: row.try_get("client_name")?,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            status: row.try_get("status")?,
            contract_value: row.try_get("contract_value")?,
            overall_health: row.try_get("overall_health")?,
            health_score: row.try_get("health_score")?,
            blocker_count: row.try_get("blocker_count")?,
            scope_creep_detected: row.try_get("scope_creep_detected")?,
            last_activity_at: row.try_get("last_activity_date")?,
            open_action_count: row.try_get("open_action_count")?,
            overdue_action_count: row.try_get("overdue_action_count")?,
        });
    }

    debug!(count = projects.len(), "loaded portfolio");
    Ok(projects)
}

pub async fn fetch_actions(pool: &PgPool) -> anyhow::Result<Vec<ActionRow>> {
    let records = sqlx::query(
        r#"
        SELECT q.id, c.project_name, c.client_name, q.title, q.description, q.owner,
               q.priority, q.status, q.due_date, q.evidence_link, q.source_type,
               q.completed_at, q.created_at
        FROM renewal_oracle.action_queue q
        LEFT JOIN renewal_oracle.sow_contracts c ON c.id = q.project_id
        ORDER BY q.created_at ASC
        "#,
    )
    .fetch_all(pool)
    .await
    .context("failed to load action queue")?;

    let mut items = Vec::with_capacity(records.len());
    for row in records {
        items.push(ActionRow {
            id: row.try_get("id")?,
            project_name: row.try_get("project_name")?,
            client_name: row.try_get("client_name")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            owner: row.try_get("owner")?,
            priority: row.try_get("priority")?,
            status: row.try_get("status")?,
            due_date: row.try_get("due_date")?,
            evidence_link: row.try_get("evidence_link")?,
            source_type: row.try_get("source_type")?,
            completed_at: row.try_get("completed_at")?,
            created_at: row.try_get("created_at")?,
        });
    }

    debug!(count = items.len(), "loaded action queue");
    Ok(items)
}

/// Returns false when no action has the given id.
pub async fn update_action_status(
    pool: &PgPool,
    id: Uuid,
    change: &StatusChange,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE renewal_oracle.action_queue
        SET status = $2, completed_at = $3, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(change.status.as_str())
    .bind(change.completed_at)
    .execute(pool)
    .await
    .context("failed to update action status")?;

    Ok(result.rows_affected() > 0)
}

/// Newest first, joined with project and rule names.
pub async fn fetch_alerts(pool: &PgPool, limit: i64) -> anyhow::Result<Vec<AlertRow>> {
    let records = sqlx::query(
        r#"
        SELECT n.id, n.title, n.message, n.severity, n.status, n.triggered_at, n.read_at,
               n.dismissed_at, c.project_name, c.client_name, r.name AS rule_name, r.rule_type
        FROM renewal_oracle.alert_notifications n
        LEFT JOIN renewal_oracle.sow_contracts c ON c.id = n.project_id
        LEFT JOIN renewal_oracle.alert_rules r ON r.id = n.alert_rule_id
        ORDER BY n.triggered_at DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("failed to load alerts")?;

    let mut alerts = Vec::with_capacity(records.len());
    for row in records {
        alerts.push(AlertRow {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            message: row.try_get("message")?,
            severity: row.try_get("severity")?,
            status: row.try_get("status")?,
            project_name: row.try_get("project_name")?,
            client_name: row.try_get("client_name")?,
            rule_name: row.try_get("rule_name")?,
            rule_type: row.try_get("rule_type")?,
            triggered_at: row.try_get("triggered_at")?,
            read_at: row.try_get("read_at")?,
            dismissed_at: row.try_get("dismissed_at")?,
        });
    }

    debug!(count = alerts.len(), "loaded alerts");
    Ok(alerts)
}

/// Returns false when no alert has the given id.
pub async fn apply_alert_transition(
    pool: &PgPool,
    id: Uuid,
    transition: &AlertTransition,
) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE renewal_oracle.alert_notifications
        SET status = $2,
            read_at = COALESCE($3, read_at),
            dismissed_at = COALESCE($4, dismissed_at)
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(transition.status.as_str())
    .bind(transition.read_at)
    .bind(transition.dismissed_at)
    .execute(pool)
    .await
    .context("failed to update alert")?;

    Ok(result.rows_affected() > 0)
}

/// Dismisses every alert that is not dismissed yet; returns how many changed.
pub async fn dismiss_all_alerts(pool: &PgPool, now: DateTime<Utc>) -> anyhow::Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE renewal_oracle.alert_notifications
        SET status = $1, dismissed_at = $2
        WHERE status <> $1
        "#,
    )
    .bind(AlertStatus::Dismissed.as_str())
    .bind(now)
    .execute(pool)
    .await
    .context("failed to clear alerts")?;

    Ok(result.rows_affected())
}

pub async fn fetch_alert_rules(pool: &PgPool) -> anyhow::Result<Vec<AlertRuleRow>> {
    let records = sqlx::query(
        r#"
        SELECT id, name, description, rule_type, severity, is_active
        FROM renewal_oracle.alert_rules
        "#,
    )
    .fetch_all(pool)
    .await
    .context("failed to load alert rules")?;

    let mut rules = Vec::with_capacity(records.len());
    for row in records {
        rules.push(AlertRuleRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            rule_type: row.try_get("rule_type")?,
            severity: row.try_get("severity")?,
            is_active: row.try_get("is_active")?,
        });
    }
    Ok(rules)
}

/// Returns false when no rule has the given id.
pub async fn set_alert_rule_active(pool: &PgPool, id: Uuid, active: bool) -> anyhow::Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE renewal_oracle.alert_rules
        SET is_active = $2, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(active)
    .execute(pool)
    .await
    .context("failed to update alert rule")?;

    Ok(result.rows_affected() > 0)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let now = Utc::now();
    let today = now.date_naive();
    let contracts = vec![
        (
            Uuid::parse_str("6f1c3a52-8d3e-4b8a-9a0e-1f3c2d4b5a60")?,
            "Student Success Platform",
            Some("Northfield University"),
            today - Duration::days(300),
            Some(today + Duration::days(21)),
            Some(180_000.0),
            "Critical",
            Some(28),
            true,
            3,
        ),
        (
            Uuid::parse_str("2b7e9c14-5a61-4f0d-8c3b-7d2e1a9f4c83")?,
            "Admissions CRM Rollout",
            Some("Lakeshore College"),
            today - Duration::days(200),
            Some(today + Duration::days(48)),
            Some(95_000.0),
            "At Risk",
            Some(61),
            false,
            1,
        ),
        (
            Uuid::parse_str("9a4d2f6e-3c1b-4e8a-b7f5-0c6d8e2a1b94")?,
            "Data Warehouse Modernization",
            None,
            today - Duration::days(120),
            Some(today + Duration::days(160)),
            None,
            "Healthy",
            Some(88),
            false,
            0,
        ),
        (
            Uuid::parse_str("c3e8a1d7-4b2f-4a96-8e1c-5d7f9b3a2e61")?,
            "Financial Aid Portal Discovery",
            Some("Riverbend Community College"),
            today - Duration::days(14),
            None,
            Some(40_000.0),
            "Critical",
            None,
            true,
            2,
        ),
    ];

    for (
        id,
        project_name,
        client_name,
        start_date,
        end_date,
        contract_value,
        health,
        health_score,
        scope_creep,
        blockers,
    ) in contracts
    {
        sqlx::query(
            r#"
            INSERT INTO renewal_oracle.sow_contracts
            (id, project_name, client_name, start_date, end_date, renewal_window_start,
             contract_value)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET project_name = EXCLUDED.project_name,
                client_name = EXCLUDED.client_name,
                end_date = EXCLUDED.end_date,
                renewal_window_start = EXCLUDED.renewal_window_start,
                contract_value = EXCLUDED.contract_value
            "#,
        )
        .bind(id)
        .bind(project_name)
        .bind(client_name)
        .bind(start_date)
        .bind(end_date)
        .bind(end_date.map(|end_date| end_date - Duration::days(90)))
        .bind(contract_value)
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO renewal_oracle.project_health_metrics
            (id, project_id, metric_date, overall_health, health_score, scope_creep_detected,
             blocker_count, last_activity_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (project_id, metric_date) DO UPDATE
            SET overall_health = EXCLUDED.overall_health,
                health_score = EXCLUDED.health_score,
                scope_creep_detected = EXCLUDED.scope_creep_detected,
                blocker_count = EXCLUDED.blocker_count,
                last_activity_date = EXCLUDED.last_activity_date
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(id)
        .bind(today)
        .bind(health)
        .bind(health_score)
        .bind(scope_creep)
        .bind(blockers)
        .bind(now - Duration::minutes(12))
        .execute(pool)
        .await?;
    }

    let messages = vec![
        (
            "seed-001",
            "Student Success Platform",
            "Gmail",
            "Email",
            "negative",
            1,
            Some("https://mail.google.com/mail/u/0/#inbox/seed-001"),
        ),
        (
            "seed-002",
            "Student Success Platform",
            "Google Chat",
            "Message",
            "negative",
            2,
            None,
        ),
        (
            "seed-003",
            "Student Success Platform",
            "Google Chat",
            "Message",
            "neutral",
            4,
            None,
        ),
        (
            "seed-004",
            "Admissions CRM Rollout",
            "Google Chat",
            "Message",
            "positive",
            1,
            None,
        ),
        (
            "seed-005",
            "Admissions CRM Rollout",
            "Gmail",
            "Email",
            "negative",
            6,
            Some("https://mail.google.com/mail/u/0/#inbox/seed-005"),
        ),
        (
            "seed-006",
            "Data Warehouse Modernization",
            "Gmail",
            "Email",
            "positive",
            3,
            Some("https://mail.google.com/mail/u/0/#inbox/seed-006"),
        ),
        (
            "seed-007",
            "Data Warehouse Modernization",
            "Google Chat",
            "Message",
            "positive",
            5,
            None,
        ),
    ];

    for (source_key, project_name, source, event_type, sentiment, days_ago, evidence_link) in
        messages
    {
        insert_communication(
            pool,
            project_name,
            source,
            event_type,
            Some(sentiment),
            now - Duration::days(days_ago),
            evidence_link,
            source_key,
        )
        .await?;
    }

    let actions = vec![
        (
            "seed-action-001",
            "Student Success Platform",
            "Resolve SSO outage blocking advisors",
            "Dana Ortiz",
            ActionPriority::Critical,
            ActionStatus::Blocked,
            Some(today - Duration::days(2)),
        ),
        (
            "seed-action-002",
            "Student Success Platform",
            "Schedule renewal review with provost office",
            "Sam Patel",
            ActionPriority::High,
            ActionStatus::Open,
            Some(today + Duration::days(5)),
        ),
        (
            "seed-action-003",
            "Admissions CRM Rollout",
            "Confirm data migration cutover date",
            "Lee Chen",
            ActionPriority::Medium,
            ActionStatus::InProgress,
            Some(today - Duration::days(1)),
        ),
        (
            "seed-action-004",
            "Data Warehouse Modernization",
            "Share quarterly usage report",
            "Sam Patel",
            ActionPriority::Low,
            ActionStatus::Completed,
            None,
        ),
        (
            "seed-action-005",
            "Financial Aid Portal Discovery",
            "Agree on SOW end date",
            "Dana Ortiz",
            ActionPriority::Critical,
            ActionStatus::Open,
            Some(today + Duration::days(3)),
        ),
    ];

    for (source_key, project_name, title, owner, priority, status, due_date) in actions {
        let change = actions::status_change(status, now);
        sqlx::query(
            r#"
            INSERT INTO renewal_oracle.action_queue
            (id, project_id, title, owner, priority, status, due_date, source_type,
             source_key, completed_at)
            SELECT $1, c.id, $3, $4, $5, $6, $7, 'seed', $8, $9
            FROM renewal_oracle.sow_contracts c
            WHERE c.project_name = $2
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(project_name)
        .bind(title)
        .bind(owner)
        .bind(priority.as_str())
        .bind(change.status.as_str())
        .bind(due_date)
        .bind(source_key)
        .bind(change.completed_at)
        .execute(pool)
        .await?;
    }

    let rules = vec![
        (
            Uuid::parse_str("0d9b7c2e-6f4a-4e3b-9a1d-8c5e2f7b4a10")?,
            "Health drops to critical",
            AlertRuleType::HealthChange,
            AlertSeverity::Critical,
        ),
        (
            Uuid::parse_str("5e2a8f1c-3d7b-4c9e-a6f2-1b8d4e7c3a21")?,
            "Three or more blockers",
            AlertRuleType::BlockerThreshold,
            AlertSeverity::High,
        ),
        (
            Uuid::parse_str("a7c4e9b2-1f8d-4b6a-93e5-2d6f8a1c4b32")?,
            "Renewal within 30 days",
            AlertRuleType::RenewalApproaching,
            AlertSeverity::Medium,
        ),
        (
            Uuid::parse_str("e1f6b3d8-9a2c-4d7e-b5f1-3c9a6e2d8b43")?,
            "No activity for a week",
            AlertRuleType::NoActivity,
            AlertSeverity::Low,
        ),
    ];

    for (id, name, rule_type, severity) in rules {
        sqlx::query(
            r#"
            INSERT INTO renewal_oracle.alert_rules (id, name, rule_type, severity)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO UPDATE
            SET rule_type = EXCLUDED.rule_type,
                severity = EXCLUDED.severity
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(rule_type.as_str())
        .bind(severity.as_str())
        .execute(pool)
        .await?;
    }

    let notifications = vec![
        (
            "seed-alert-001",
            "Student Success Platform",
            "Health drops to critical",
            "Project health is critical",
            "Student Success Platform moved from At Risk to Critical.",
            AlertSeverity::Critical,
            30,
        ),
        (
            "seed-alert-002",
            "Student Success Platform",
            "Three or more blockers",
            "Blockers piling up",
            "3 active blockers reported in the latest health check.",
            AlertSeverity::High,
            90,
        ),
        (
            "seed-alert-003",
            "Admissions CRM Rollout",
            "Renewal within 30 days",
            "Renewal approaching",
            "Admissions CRM Rollout renews in under 60 days with an At Risk rating.",
            AlertSeverity::Medium,
            240,
        ),
    ];

    for (source_key, project_name, rule_name, title, message, severity, minutes_ago) in
        notifications
    {
        sqlx::query(
            r#"
            INSERT INTO renewal_oracle.alert_notifications
            (id, alert_rule_id, project_id, title, message, severity, source_key, triggered_at)
            VALUES (
                $1,
                (SELECT id FROM renewal_oracle.alert_rules WHERE name = $3),
                (SELECT id FROM renewal_oracle.sow_contracts WHERE project_name = $2),
                $4, $5, $6, $7, $8
            )
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(project_name)
        .bind(rule_name)
        .bind(title)
        .bind(message)
        .bind(severity.as_str())
        .bind(source_key)
        .bind(now - Duration::minutes(minutes_ago))
        .execute(pool)
        .await?;
    }

    info!("seed data written");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn insert_communication(
    pool: &PgPool,
    project_name: &str,
    source: &str,
    event_type: &str,
    sentiment: Option<&str>,
    created_at: DateTime<Utc>,
    evidence_link: Option<&str>,
    source_key: &str,
) -> anyhow::Result<Option<u64>> {
    let project_id: Option<Uuid> = sqlx::query(
        "SELECT id FROM renewal_oracle.sow_contracts WHERE project_name = $1",
    )
    .bind(project_name)
    .fetch_optional(pool)
    .await?
    .map(|row| row.try_get("id"))
    .transpose()?;

    let Some(project_id) = project_id else {
        return Ok(None);
    };

    let result = sqlx::query(
        r#"
        INSERT INTO renewal_oracle.delivery_intelligence
        (id, project_id, source, event_type, sentiment, evidence_link, created_at, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(project_id)
    .bind(source)
    .bind(event_type)
    .bind(sentiment)
    .bind(evidence_link)
    .bind(created_at)
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(Some(result.rows_affected()))
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub inserted: usize,
    pub duplicates: usize,
    pub unknown_project: usize,
}

#[derive(Debug, serde::Deserialize)]
pub struct CommunicationCsvRow {
    pub project_name: String,
    pub source: String,
    pub event_type: String,
    pub sentiment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub evidence_link: Option<String>,
    pub source_key: Option<String>,
}

pub fn read_communications_csv(
    csv_path: &std::path::Path,
) -> anyhow::Result<Vec<CommunicationCsvRow>> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut rows = Vec::new();
    for (idx, result) in reader.deserialize::<CommunicationCsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid CSV record {}", idx + 1))?;
        rows.push(row);
    }
    Ok(rows)
}

pub async fn import_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<ImportSummary> {
    let rows = read_communications_csv(csv_path)?;
    let mut summary = ImportSummary::default();

    for row in rows {
        let source_key = row
            .source_key
            .unwrap_or_else(|| format!("import-{}", Uuid::new_v4()));

        match insert_communication(
            pool,
            &row.project_name,
            &row.source,
            &row.event_type,
            row.sentiment.as_deref(),
            row.created_at,
            row.evidence_link.as_deref(),
            &source_key,
        )
        .await?
        {
            None => {
                warn!(project = %row.project_name, %source_key, "skipping communication for unknown project");
                summary.unknown_project += 1;
            }
            Some(0) => summary.duplicates += 1,
            Some(_) => summary.inserted += 1,
        }
    }

    info!(
        inserted = summary.inserted,
        duplicates = summary.duplicates,
        unknown_project = summary.unknown_project,
        "communication import finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn csv_rows_parse_optional_columns() {
        let dir = std::env::temp_dir().join(format!("renewal-oracle-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("messages.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "project_name,source,event_type,sentiment,created_at,evidence_link,source_key"
        )
        .unwrap();
        writeln!(
            file,
            "Portal,Gmail,Email,positive,2026-10-01T09:30:00Z,https://mail.example.com/1,k-1"
        )
        .unwrap();
        writeln!(file, "Portal,Google Chat,Message,,2026-10-02T10:00:00Z,,").unwrap();
        drop(file);

        let rows = read_communications_csv(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].sentiment.as_deref(), Some("positive"));
        assert_eq!(rows[0].source_key.as_deref(), Some("k-1"));
        assert!(rows[1].sentiment.is_none());
        assert!(rows[1].evidence_link.is_none());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn invalid_timestamp_reports_record_number() {
        let dir = std::env::temp_dir().join(format!("renewal-oracle-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.csv");
        std::fs::write(
            &path,
            "project_name,source,event_type,sentiment,created_at,evidence_link,source_key\n\
             Portal,Gmail,Email,positive,yesterday,,\n",
        )
        .unwrap();

        let err = read_communications_csv(&path).unwrap_err();
        assert!(err.to_string().contains("record 1"));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
