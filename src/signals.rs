use crate::models::{
    CommunicationRecord, HealthSnapshot, HealthStatus, Signal, SignalPolarity, SignalSource,
};

const RECENT_MESSAGE_LIMIT: usize = 20;

/// Derives renewal signals from a contract's health snapshot and its
/// communications, which must be ordered newest first.
pub fn extract_signals(
    communications: &[&CommunicationRecord],
    health: Option<&HealthSnapshot>,
) -> Vec<Signal> {
    let mut signals = Vec::new();

    let recent = &communications[..communications.len().min(RECENT_MESSAGE_LIMIT)];
    let (positive, negative) = count_sentiment(recent.iter().copied());
    if positive > negative * 2 {
        signals.push(signal(
            SignalPolarity::Positive,
            SignalSource::Chat,
            "Strong positive sentiment in recent communications".to_string(),
            0.3,
        ));
    } else if negative > positive {
        signals.push(signal(
            SignalPolarity::Negative,
            SignalSource::Chat,
            "Declining sentiment detected in communications".to_string(),
            -0.3,
        ));
    }

    if let Some(health) = health {
        if health.blocker_count > 0 {
            signals.push(signal(
                SignalPolarity::Negative,
                SignalSource::ContractMetadata,
                format!("{} active blocker(s) detected", health.blocker_count),
                -0.2 * f64::from(health.blocker_count),
            ));
        }

        if health.scope_creep_detected {
            signals.push(signal(
                SignalPolarity::Negative,
                SignalSource::ContractMetadata,
                "Scope creep detected - client expectations may not be met".to_string(),
                -0.25,
            ));
        }

        match health.overall_health {
            HealthStatus::Healthy => signals.push(signal(
                SignalPolarity::Positive,
                SignalSource::ContractMetadata,
                "Project health is green".to_string(),
                0.2,
            )),
            HealthStatus::Critical => signals.push(signal(
                SignalPolarity::Negative,
                SignalSource::ContractMetadata,
                "Project health is critical".to_string(),
                -0.4,
            )),
            HealthStatus::AtRisk | HealthStatus::Unknown => {}
        }
    }

    let emails: Vec<&CommunicationRecord> = communications
        .iter()
        .copied()
        .filter(|record| record.is_email())
        .collect();
    let evidence_link = emails.first().and_then(|record| record.evidence_link.clone());
    let (email_positive, email_negative) = count_sentiment(emails.iter().copied());
    if email_positive > email_negative {
        signals.push(Signal {
            evidence_link,
            ..signal(
                SignalPolarity::Positive,
                SignalSource::Email,
                "Positive tone in client emails".to_string(),
                0.25,
            )
        });
    } else if email_negative > email_positive {
        signals.push(Signal {
            evidence_link,
            ..signal(
                SignalPolarity::Negative,
                SignalSource::Email,
                "Concerning tone in client emails".to_string(),
                -0.25,
            )
        });
    }

    signals
}

fn count_sentiment<'a>(records: impl Iterator<Item = &'a CommunicationRecord>) -> (usize, usize) {
    records.fold((0, 0), |(positive, negative), record| {
        (
            positive + usize::from(record.is_positive()),
            negative + usize::from(record.is_negative()),
        )
    })
}

fn signal(polarity: SignalPolarity, source: SignalSource, message: String, weight: f64) -> Signal {
    Signal {
        polarity,
        source,
        message,
        weight,
        evidence_link: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sentiment;
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    fn message(minutes_ago: i64, sentiment: Option<Sentiment>, source: &str) -> CommunicationRecord {
        let base = Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap();
        CommunicationRecord {
            contract_id: Uuid::nil(),
            sentiment,
            created_at: base - Duration::minutes(minutes_ago),
            evidence_link: Some(format!("https://mail.example.com/{minutes_ago}")),
            source: source.to_string(),
            event_type: "Message".to_string(),
        }
    }

    fn chat(count: usize, sentiment: Option<Sentiment>) -> Vec<CommunicationRecord> {
        (0..count)
            .map(|idx| message(idx as i64, sentiment, "Google Chat"))
            .collect()
    }

    fn health(overall_health: HealthStatus, blockers: u32, scope_creep: bool) -> HealthSnapshot {
        HealthSnapshot {
            overall_health,
            scope_creep_detected: scope_creep,
            blocker_count: blockers,
            last_activity_at: None,
        }
    }

    fn refs(records: &[CommunicationRecord]) -> Vec<&CommunicationRecord> {
        records.iter().collect()
    }

    #[test]
    fn no_inputs_yield_no_signals() {
        assert!(extract_signals(&[], None).is_empty());
    }

    #[test]
    fn strong_positive_chat_requires_double_the_negatives() {
        let mut records = chat(5, Some(Sentiment::Positive));
        records.extend(chat(2, Some(Sentiment::Negative)));
        let signals = extract_signals(&refs(&records), None);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].source, SignalSource::Chat);
        assert_eq!(signals[0].weight, 0.3);

        let mut balanced = chat(4, Some(Sentiment::Positive));
        balanced.extend(chat(2, Some(Sentiment::Negative)));
        assert!(extract_signals(&refs(&balanced), None).is_empty());
    }

    #[test]
    fn negative_majority_emits_declining_chat_signal() {
        let mut records = chat(1, Some(Sentiment::Positive));
        records.extend(chat(2, Some(Sentiment::Negative)));
        let signals = extract_signals(&refs(&records), None);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].polarity, SignalPolarity::Negative);
        assert_eq!(signals[0].weight, -0.3);
    }

    #[test]
    fn only_twenty_most_recent_messages_count_for_chat_sentiment() {
        let mut records = chat(20, Some(Sentiment::Neutral));
        records.extend(chat(5, Some(Sentiment::Negative)));
        assert!(extract_signals(&refs(&records), None).is_empty());
    }

    #[test]
    fn blockers_scale_weight_and_quote_count() {
        let snapshot = health(HealthStatus::AtRisk, 3, false);
        let signals = extract_signals(&[], Some(&snapshot));
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].source, SignalSource::ContractMetadata);
        assert!((signals[0].weight + 0.6).abs() < 1e-9);
        assert!(signals[0].message.contains('3'));
    }

    #[test]
    fn scope_creep_and_critical_health_follow_rule_order() {
        let snapshot = health(HealthStatus::Critical, 1, true);
        let signals = extract_signals(&[], Some(&snapshot));
        let weights: Vec<f64> = signals.iter().map(|s| s.weight).collect();
        assert_eq!(weights.len(), 3);
        assert!((weights[0] + 0.2).abs() < 1e-9);
        assert_eq!(weights[1], -0.25);
        assert_eq!(weights[2], -0.4);
    }

    #[test]
    fn healthy_status_is_positive_metadata() {
        let snapshot = health(HealthStatus::Healthy, 0, false);
        let signals = extract_signals(&[], Some(&snapshot));
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].polarity, SignalPolarity::Positive);
        assert_eq!(signals[0].weight, 0.2);
    }

    #[test]
    fn unknown_health_emits_nothing() {
        let snapshot = health(HealthStatus::Unknown, 0, false);
        assert!(extract_signals(&[], Some(&snapshot)).is_empty());
    }

    #[test]
    fn email_signal_carries_first_email_evidence() {
        let records = vec![
            message(1, Some(Sentiment::Negative), "Gmail"),
            message(2, Some(Sentiment::Negative), "Gmail"),
            message(3, Some(Sentiment::Positive), "Gmail"),
        ];
        let signals = extract_signals(&refs(&records), None);
        let email = signals
            .iter()
            .find(|s| s.source == SignalSource::Email)
            .expect("email signal");
        assert_eq!(email.weight, -0.25);
        assert_eq!(
            email.evidence_link.as_deref(),
            Some("https://mail.example.com/1")
        );
        // the chat rule fires alongside it
        assert_eq!(signals[0].source, SignalSource::Chat);
    }

    #[test]
    fn positive_email_signal_links_newest_email() {
        let records = vec![
            message(1, Some(Sentiment::Neutral), "Google Chat"),
            message(2, Some(Sentiment::Positive), "Gmail"),
            message(3, Some(Sentiment::Negative), "Gmail"),
            message(4, Some(Sentiment::Positive), "Gmail"),
        ];
        let signals = extract_signals(&refs(&records), None);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].source, SignalSource::Email);
        assert_eq!(signals[0].polarity, SignalPolarity::Positive);
        assert_eq!(signals[0].weight, 0.25);
        assert_eq!(
            signals[0].evidence_link.as_deref(),
            Some("https://mail.example.com/2")
        );
    }

    #[test]
    fn balanced_email_tone_emits_no_email_signal() {
        let records = vec![
            message(1, Some(Sentiment::Negative), "Gmail"),
            message(2, Some(Sentiment::Positive), "Gmail"),
        ];
        let signals = extract_signals(&refs(&records), None);
        assert!(signals.iter().all(|s| s.source != SignalSource::Email));
    }
}
