use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::MalformedRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    Healthy,
    #[serde(rename = "At Risk")]
    AtRisk,
    Critical,
    Unknown,
}

impl HealthStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "Healthy" => Some(Self::Healthy),
            "At Risk" => Some(Self::AtRisk),
            "Critical" => Some(Self::Critical),
            "Unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "Healthy",
            Self::AtRisk => "At Risk",
            Self::Critical => "Critical",
            Self::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    /// Unrecognized labels are treated as absent sentiment.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "positive" => Some(Self::Positive),
            "negative" => Some(Self::Negative),
            "neutral" => Some(Self::Neutral),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Contract {
    pub id: Uuid,
    pub project_name: String,
    pub client_name: Option<String>,
    pub end_date: NaiveDate,
    pub renewal_window_start: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthSnapshot {
    pub overall_health: HealthStatus,
    pub scope_creep_detected: bool,
    pub blocker_count: u32,
    pub last_activity_at: Option<DateTime<Utc>>,
}

/// A contract paired with its most recent health snapshot, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct ContractHealth {
    pub contract: Contract,
    pub health: Option<HealthSnapshot>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommunicationRecord {
    pub contract_id: Uuid,
    pub sentiment: Option<Sentiment>,
    pub created_at: DateTime<Utc>,
    pub evidence_link: Option<String>,
    pub source: String,
    pub event_type: String,
}

impl CommunicationRecord {
    pub fn is_email(&self) -> bool {
        self.source.eq_ignore_ascii_case("gmail") || self.event_type.eq_ignore_ascii_case("email")
    }

    pub fn is_positive(&self) -> bool {
        self.sentiment == Some(Sentiment::Positive)
    }

    pub fn is_negative(&self) -> bool {
        self.sentiment == Some(Sentiment::Negative)
    }
}

/// Contract joined with its latest health metrics, as read from the database.
#[derive(Debug, Clone)]
pub struct ContractRow {
    pub id: Uuid,
    pub project_name: String,
    pub client_name: Option<String>,
    pub end_date: Option<NaiveDate>,
    pub renewal_window_start: Option<NaiveDate>,
    pub overall_health: Option<String>,
    pub scope_creep_detected: Option<bool>,
    pub blocker_count: Option<i32>,
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl TryFrom<ContractRow> for ContractHealth {
    type Error = MalformedRecord;

    fn try_from(row: ContractRow) -> Result<Self, Self::Error> {
        let end_date = row.end_date.ok_or(MalformedRecord::MissingEndDate {
            contract_id: row.id,
        })?;

        let health = match row.overall_health {
            None => None,
            Some(raw) => {
                let overall_health =
                    HealthStatus::parse(&raw).ok_or_else(|| MalformedRecord::UnknownHealth {
                        contract_id: row.id,
                        value: raw.clone(),
                    })?;
                Some(HealthSnapshot {
                    overall_health,
                    scope_creep_detected: row.scope_creep_detected.unwrap_or(false),
                    blocker_count: row.blocker_count.unwrap_or(0).max(0) as u32,
                    last_activity_at: row.last_activity_at,
                })
            }
        };

        Ok(ContractHealth {
            contract: Contract {
                id: row.id,
                project_name: row.project_name,
                client_name: row.client_name,
                end_date,
                renewal_window_start: row.renewal_window_start,
            },
            health,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CommunicationRow {
    pub id: Uuid,
    pub project_id: Option<Uuid>,
    pub sentiment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub evidence_link: Option<String>,
    pub source: String,
    pub event_type: String,
}

impl TryFrom<CommunicationRow> for CommunicationRecord {
    type Error = MalformedRecord;

    fn try_from(row: CommunicationRow) -> Result<Self, Self::Error> {
        let contract_id = row
            .project_id
            .ok_or(MalformedRecord::UnlinkedCommunication { id: row.id })?;

        Ok(CommunicationRecord {
            contract_id,
            sentiment: row.sentiment.as_deref().and_then(Sentiment::parse),
            created_at: row.created_at,
            evidence_link: row.evidence_link.filter(|link| !link.trim().is_empty()),
            source: row.source,
            event_type: row.event_type,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalPolarity {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalSource {
    Email,
    Chat,
    ContractMetadata,
}

impl SignalSource {
    pub fn label(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Chat => "chat",
            Self::ContractMetadata => "contract-metadata",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub polarity: SignalPolarity,
    pub source: SignalSource,
    pub message: String,
    pub weight: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_link: Option<String>,
}

/// Variant order is severity order: most urgent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Critical,
    High,
    Medium,
    Low,
}

impl RiskTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentTrend {
    Improving,
    Declining,
    Stable,
}

impl SentimentTrend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Improving => "improving",
            Self::Declining => "declining",
            Self::Stable => "stable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenewalAssessment {
    pub contract_id: Uuid,
    pub project_name: String,
    pub client_name: String,
    pub end_date: NaiveDate,
    pub renewal_window_start: Option<NaiveDate>,
    pub days_until_renewal: i64,
    pub probability: u8,
    pub risk: RiskTier,
    pub signals: Vec<Signal>,
    pub sentiment_trend: SentimentTrend,
    pub last_positive_interaction: Option<DateTime<Utc>>,
    pub blocker_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortfolioSummary {
    pub total: usize,
    pub critical: usize,
    pub high: usize,
    pub upcoming_renewals: usize,
    pub average_probability: u8,
}

/// Persisted when a user dismisses the critical projects alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DismissalRecord {
    pub dismissed_at: DateTime<Utc>,
    pub critical_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract_row() -> ContractRow {
        ContractRow {
            id: Uuid::new_v4(),
            project_name: "Campus Portal".to_string(),
            client_name: Some("Northfield University".to_string()),
            end_date: NaiveDate::from_ymd_opt(2026, 12, 1),
            renewal_window_start: None,
            overall_health: Some("At Risk".to_string()),
            scope_creep_detected: Some(true),
            blocker_count: Some(2),
            last_activity_at: None,
        }
    }

    #[test]
    fn contract_rows_without_end_date_are_malformed() {
        let mut row = contract_row();
        row.end_date = None;
        let id = row.id;
        let err = ContractHealth::try_from(row).unwrap_err();
        assert_eq!(err, MalformedRecord::MissingEndDate { contract_id: id });
    }

    #[test]
    fn out_of_enumeration_health_is_malformed() {
        let mut row = contract_row();
        row.overall_health = Some("Amber".to_string());
        assert!(matches!(
            ContractHealth::try_from(row),
            Err(MalformedRecord::UnknownHealth { .. })
        ));
    }

    #[test]
    fn contract_without_metrics_has_no_snapshot() {
        let mut row = contract_row();
        row.overall_health = None;
        let parsed = ContractHealth::try_from(row).unwrap();
        assert!(parsed.health.is_none());
    }

    #[test]
    fn snapshot_fields_are_carried_over() {
        let parsed = ContractHealth::try_from(contract_row()).unwrap();
        let health = parsed.health.unwrap();
        assert_eq!(health.overall_health, HealthStatus::AtRisk);
        assert!(health.scope_creep_detected);
        assert_eq!(health.blocker_count, 2);
    }

    #[test]
    fn email_detection_checks_source_and_event_type() {
        let mut record = CommunicationRecord {
            contract_id: Uuid::new_v4(),
            sentiment: None,
            created_at: Utc::now(),
            evidence_link: None,
            source: "Gmail".to_string(),
            event_type: "Thread".to_string(),
        };
        assert!(record.is_email());
        record.source = "Google Chat".to_string();
        assert!(!record.is_email());
        record.event_type = "Email".to_string();
        assert!(record.is_email());
    }

    #[test]
    fn unknown_sentiment_labels_are_absent() {
        assert_eq!(Sentiment::parse("Positive"), Some(Sentiment::Positive));
        assert_eq!(Sentiment::parse("mixed"), None);
    }

    #[test]
    fn risk_tiers_order_by_severity() {
        assert!(RiskTier::Critical < RiskTier::High);
        assert!(RiskTier::High < RiskTier::Medium);
        assert!(RiskTier::Medium < RiskTier::Low);
    }
}
