use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{RenewalAssessment, SignalPolarity};
use crate::risk;

pub fn renewal_label(days_until_renewal: i64) -> String {
    if days_until_renewal > 0 {
        format!("{days_until_renewal} days")
    } else {
        "Overdue".to_string()
    }
}

pub fn format_line(assessment: &RenewalAssessment) -> String {
    format!(
        "- [{}] {} ({}) renews {} ({}), probability {}%, sentiment {}",
        assessment.risk.as_str(),
        assessment.project_name,
        assessment.client_name,
        assessment.end_date,
        renewal_label(assessment.days_until_renewal),
        assessment.probability,
        assessment.sentiment_trend.as_str()
    )
}

pub fn build_report(today: NaiveDate, assessments: &[RenewalAssessment]) -> String {
    let summary = risk::summarize(assessments);
    let mut output = String::new();

    let _ = writeln!(output, "# Renewal Risk Report");
    let _ = writeln!(
        output,
        "Generated {} from communications since {}",
        today,
        today - chrono::Duration::days(risk::LOOKBACK_DAYS)
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Summary");
    let _ = writeln!(output, "- Critical risk: {}", summary.critical);
    let _ = writeln!(output, "- High risk: {}", summary.high);
    let _ = writeln!(output, "- Upcoming renewals (90 days): {}", summary.upcoming_renewals);
    let _ = writeln!(output, "- Average probability: {}%", summary.average_probability);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Renewal Risk Assessment");

    if assessments.is_empty() {
        let _ = writeln!(output, "No projects with end dates found.");
        return output;
    }

    for assessment in assessments {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "### {} ({})",
            assessment.project_name, assessment.client_name
        );
        let _ = writeln!(
            output,
            "Risk **{}**, probability {}%, renews {} ({}), sentiment {}",
            assessment.risk.as_str(),
            assessment.probability,
            assessment.end_date,
            renewal_label(assessment.days_until_renewal),
            assessment.sentiment_trend.as_str()
        );

        if assessment.signals.is_empty() {
            let _ = writeln!(output, "- No significant signals detected");
        }
        for signal in &assessment.signals {
            let marker = match signal.polarity {
                SignalPolarity::Positive => "+",
                SignalPolarity::Negative => "-",
                SignalPolarity::Neutral => "~",
            };
            let _ = write!(
                output,
                "- {} {}: {}",
                marker,
                signal.source.label(),
                signal.message
            );
            if let Some(link) = &signal.evidence_link {
                let _ = write!(output, " ([evidence]({link}))");
            }
            let _ = writeln!(output);
        }

        if let Some(last_positive) = assessment.last_positive_interaction {
            let _ = writeln!(
                output,
                "Last positive interaction: {}",
                last_positive.format("%b %-d, %Y")
            );
        }
        if assessment.blocker_count > 0 {
            let _ = writeln!(
                output,
                "Active blockers: {}",
                assessment.blocker_count
            );
        }
    }

    output
}

pub fn write_csv<W: std::io::Write>(
    writer: W,
    assessments: &[RenewalAssessment],
) -> anyhow::Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record([
        "Project Name",
        "Client",
        "End Date",
        "Days Until Renewal",
        "Renewal Probability",
        "Risk Level",
        "Sentiment Trend",
        "Blockers",
        "Signals",
        "Last Positive Interaction",
    ])?;

    for assessment in assessments {
        csv_writer.write_record([
            assessment.project_name.clone(),
            assessment.client_name.clone(),
            assessment.end_date.to_string(),
            assessment.days_until_renewal.to_string(),
            assessment.probability.to_string(),
            assessment.risk.as_str().to_string(),
            assessment.sentiment_trend.as_str().to_string(),
            assessment.blocker_count.to_string(),
            assessment.signals.len().to_string(),
            assessment
                .last_positive_interaction
                .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RiskTier, SentimentTrend, Signal, SignalSource};
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn sample() -> RenewalAssessment {
        RenewalAssessment {
            contract_id: Uuid::nil(),
            project_name: "Student Success Platform".to_string(),
            client_name: "Northfield University".to_string(),
            end_date: NaiveDate::from_ymd_opt(2026, 11, 9).unwrap(),
            renewal_window_start: None,
            days_until_renewal: 21,
            probability: 0,
            risk: RiskTier::Critical,
            signals: vec![Signal {
                polarity: SignalPolarity::Negative,
                source: SignalSource::Email,
                message: "Concerning tone in client emails".to_string(),
                weight: -0.25,
                evidence_link: Some("https://mail.example.com/1".to_string()),
            }],
            sentiment_trend: SentimentTrend::Declining,
            last_positive_interaction: Some(Utc.with_ymd_and_hms(2026, 10, 3, 14, 5, 0).unwrap()),
            blocker_count: 3,
        }
    }

    #[test]
    fn overdue_contracts_are_labelled() {
        assert_eq!(renewal_label(0), "Overdue");
        assert_eq!(renewal_label(-4), "Overdue");
        assert_eq!(renewal_label(12), "12 days");
    }

    #[test]
    fn report_lists_signals_and_evidence() {
        let report = build_report(today(), &[sample()]);
        assert!(report.contains("# Renewal Risk Report"));
        assert!(report.contains("- Critical risk: 1"));
        assert!(report.contains("### Student Success Platform (Northfield University)"));
        assert!(report.contains("- - email: Concerning tone in client emails ([evidence](https://mail.example.com/1))"));
        assert!(report.contains("Last positive interaction: Oct 3, 2026"));
        assert!(report.contains("Active blockers: 3"));
    }

    #[test]
    fn metadata_signals_use_the_full_source_label() {
        let mut assessment = sample();
        assessment.signals.push(Signal {
            polarity: SignalPolarity::Negative,
            source: SignalSource::ContractMetadata,
            message: "3 active blocker(s) detected".to_string(),
            weight: -0.6,
            evidence_link: None,
        });
        let report = build_report(today(), &[assessment]);
        assert!(report.contains("- - contract-metadata: 3 active blocker(s) detected\n"));
    }

    #[test]
    fn empty_report_says_so() {
        let report = build_report(today(), &[]);
        assert!(report.contains("No projects with end dates found."));
        assert!(report.contains("- Average probability: 0%"));
    }

    #[test]
    fn csv_export_has_header_and_row() {
        let mut buffer = Vec::new();
        write_csv(&mut buffer, &[sample()]).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("Project Name,Client,End Date"));
        assert_eq!(
            lines.next().unwrap(),
            "Student Success Platform,Northfield University,2026-11-09,21,0,critical,declining,3,1,2026-10-03 14:05"
        );
        assert!(lines.next().is_none());
    }

    #[test]
    fn terminal_line_mentions_tier_and_probability() {
        let line = format_line(&sample());
        assert!(line.starts_with("- [critical] Student Success Platform"));
        assert!(line.contains("probability 0%"));
        assert!(line.contains("21 days"));
    }
}
