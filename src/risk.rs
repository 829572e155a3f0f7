use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use crate::models::{
    CommunicationRecord, ContractHealth, PortfolioSummary, RenewalAssessment, RiskTier,
    SentimentTrend, Signal,
};
use crate::signals;

pub const LOOKBACK_DAYS: i64 = 30;
const BASE_PROBABILITY: f64 = 70.0;
const URGENCY_WINDOW_DAYS: i64 = 30;
const URGENCY_PENALTY: f64 = 10.0;
const TREND_WINDOW: usize = 5;
const UPCOMING_WINDOW_DAYS: i64 = 90;

pub fn renewal_probability(signals: &[Signal], days_until_renewal: i64) -> u8 {
    let mut probability = BASE_PROBABILITY;
    for signal in signals {
        probability += signal.weight * 100.0;
    }

    if days_until_renewal < URGENCY_WINDOW_DAYS {
        probability -= URGENCY_PENALTY;
    }

    probability.round().clamp(0.0, 100.0) as u8
}

/// First matching rule wins, so a contract is always placed in the most
/// urgent tier it qualifies for.
pub fn risk_tier(probability: u8, days_until_renewal: i64) -> RiskTier {
    if days_until_renewal < 30 && probability < 50 {
        RiskTier::Critical
    } else if days_until_renewal < 60 && probability < 60 {
        RiskTier::High
    } else if probability < 70 {
        RiskTier::Medium
    } else {
        RiskTier::Low
    }
}

/// Compares positive counts of the five newest communications against the
/// five before them, with a deadband of one.
pub fn sentiment_trend(communications: &[&CommunicationRecord]) -> SentimentTrend {
    if communications.len() < TREND_WINDOW {
        return SentimentTrend::Stable;
    }

    let positives = |window: &[&CommunicationRecord]| {
        window.iter().filter(|record| record.is_positive()).count() as i64
    };
    let recent = positives(&communications[..TREND_WINDOW]);
    let older_end = communications.len().min(TREND_WINDOW * 2);
    let older = positives(&communications[TREND_WINDOW..older_end]);

    if recent > older + 1 {
        SentimentTrend::Improving
    } else if recent < older - 1 {
        SentimentTrend::Declining
    } else {
        SentimentTrend::Stable
    }
}

/// Stable: ties keep their input order.
pub fn rank(assessments: &mut [RenewalAssessment]) {
    assessments.sort_by_key(|assessment| (assessment.risk, assessment.days_until_renewal));
}

/// Whole days from `now` to midnight UTC on `end_date`, truncated toward
/// zero. A contract ending tomorrow is 0 days out once `now` is past midnight.
pub fn days_until(end_date: NaiveDate, now: DateTime<Utc>) -> i64 {
    (end_date.and_time(NaiveTime::MIN).and_utc() - now).num_days()
}

pub fn lookback_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(LOOKBACK_DAYS)
}

pub fn assess_contract(
    entry: &ContractHealth,
    communications: &[&CommunicationRecord],
    now: DateTime<Utc>,
) -> RenewalAssessment {
    let contract = &entry.contract;
    let days_until_renewal = days_until(contract.end_date, now);
    let signals = signals::extract_signals(communications, entry.health.as_ref());
    let probability = renewal_probability(&signals, days_until_renewal);

    RenewalAssessment {
        contract_id: contract.id,
        project_name: contract.project_name.clone(),
        client_name: contract
            .client_name
            .clone()
            .unwrap_or_else(|| "Unknown Client".to_string()),
        end_date: contract.end_date,
        renewal_window_start: contract.renewal_window_start,
        days_until_renewal,
        probability,
        risk: risk_tier(probability, days_until_renewal),
        sentiment_trend: sentiment_trend(communications),
        last_positive_interaction: communications
            .iter()
            .find(|record| record.is_positive())
            .map(|record| record.created_at),
        blocker_count: entry.health.as_ref().map_or(0, |health| health.blocker_count),
        signals,
    }
}

/// Assesses every contract against its own communications and returns the
/// ranked list.
pub fn assess_portfolio(
    contracts: &[ContractHealth],
    communications: &[CommunicationRecord],
    now: DateTime<Utc>,
) -> Vec<RenewalAssessment> {
    let mut by_contract: HashMap<Uuid, Vec<&CommunicationRecord>> = HashMap::new();
    for record in communications {
        by_contract.entry(record.contract_id).or_default().push(record);
    }
    for records in by_contract.values_mut() {
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    }

    let mut assessments: Vec<RenewalAssessment> = contracts
        .iter()
        .map(|entry| {
            let records = by_contract
                .get(&entry.contract.id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            assess_contract(entry, records, now)
        })
        .collect();

    rank(&mut assessments);
    assessments
}

pub fn summarize(assessments: &[RenewalAssessment]) -> PortfolioSummary {
    let count_tier = |tier: RiskTier| assessments.iter().filter(|a| a.risk == tier).count();
    let average_probability = if assessments.is_empty() {
        0
    } else {
        let total: u32 = assessments.iter().map(|a| u32::from(a.probability)).sum();
        (f64::from(total) / assessments.len() as f64).round() as u8
    };

    PortfolioSummary {
        total: assessments.len(),
        critical: count_tier(RiskTier::Critical),
        high: count_tier(RiskTier::High),
        upcoming_renewals: assessments
            .iter()
            .filter(|a| (1..=UPCOMING_WINDOW_DAYS).contains(&a.days_until_renewal))
            .count(),
        average_probability,
    }
}
