use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use uuid::Uuid;

mod actions;
mod alert;
mod alert_center;
mod config;
mod cycle;
mod db;
mod error;
mod models;
mod portfolio;
mod report;
mod risk;
mod signals;
mod telemetry;

use actions::{ActionFilter, ActionItem, ActionPriority, ActionStatus};
use alert::{AlertVisibility, CriticalActivity};
use alert_center::{AlertAction, AlertFilter, AlertNotification, AlertRule, AlertSeverity};
use config::AppConfig;
use cycle::{CycleOutcome, RefreshGate};
use models::RenewalAssessment;
use portfolio::PortfolioProject;

#[derive(Parser)]
#[command(name = "renewal-oracle")]
#[command(about = "Renewal risk scoring for SOW contracts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import client communications from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List contracts ranked by renewal risk
    Renewals {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Generate a markdown renewal report
    Report {
        #[arg(long, default_value = "renewals.md")]
        out: PathBuf,
    },
    /// Export renewal assessments as CSV
    Export {
        #[arg(long, default_value = "renewals.csv")]
        out: PathBuf,
    },
    /// Portfolio overview: health buckets, blockers, overdue actions, contract value
    Portfolio {
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Also write the project list as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Work with the action queue
    Actions {
        #[command(subcommand)]
        command: ActionCommand,
    },
    /// Work with alert notifications and alert rules
    Alerts {
        #[command(subcommand)]
        command: AlertsCommand,
    },
    /// Inspect or dismiss the critical projects banner
    CriticalAlert {
        #[command(subcommand)]
        command: CriticalAlertCommand,
    },
}

#[derive(Subcommand)]
enum ActionCommand {
    /// List actions, most urgent first
    List {
        #[arg(long, value_enum)]
        priority: Option<ActionPriority>,
        /// Include completed and cancelled actions
        #[arg(long)]
        all: bool,
        /// Only critical or blocked actions
        #[arg(long)]
        blockers: bool,
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Move an action to a new status
    SetStatus {
        #[arg(long)]
        id: Uuid,
        #[arg(long, value_enum)]
        status: ActionStatus,
    },
}

#[derive(Subcommand)]
enum AlertsCommand {
    /// List alerts, newest first; dismissed alerts are hidden
    List {
        #[arg(long, conflicts_with = "severity")]
        unread: bool,
        #[arg(long, value_enum)]
        severity: Option<AlertSeverity>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Mark an alert as read
    Read {
        #[arg(long)]
        id: Uuid,
    },
    /// Dismiss an alert
    Dismiss {
        #[arg(long)]
        id: Uuid,
    },
    /// Dismiss every alert
    Clear,
    /// List alert rules by severity
    Rules,
    /// Turn an alert rule on
    EnableRule {
        #[arg(long)]
        id: Uuid,
    },
    /// Turn an alert rule off
    DisableRule {
        #[arg(long)]
        id: Uuid,
    },
}

#[derive(Subcommand)]
enum CriticalAlertCommand {
    /// Show whether the critical projects banner should be displayed
    Status,
    /// Dismiss the banner until critical projects see new activity
    Dismiss,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let summary = db::import_csv(&pool, &csv).await?;
            println!(
                "Inserted {} communications from {} ({} duplicates, {} for unknown projects).",
                summary.inserted,
                csv.display(),
                summary.duplicates,
                summary.unknown_project
            );
        }
        Commands::Renewals { limit, format } => {
            let assessments = refresh(&pool, &config).await?;
            match format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&assessments)?);
                }
                OutputFormat::Text => {
                    if assessments.is_empty() {
                        println!("No projects with end dates found.");
                        return Ok(());
                    }

                    let summary = risk::summarize(&assessments);
                    println!(
                        "{} critical, {} high, {} renewing within 90 days, average probability {}%",
                        summary.critical,
                        summary.high,
                        summary.upcoming_renewals,
                        summary.average_probability
                    );
                    for assessment in assessments.iter().take(limit) {
                        println!("{}", report::format_line(assessment));
                    }
                }
            }
        }
        Commands::Report { out } => {
            let assessments = refresh(&pool, &config).await?;
            let report = report::build_report(Utc::now().date_naive(), &assessments);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { out } => {
            let assessments = refresh(&pool, &config).await?;
            let file = create_file(&out)?;
            report::write_csv(file, &assessments)?;
            println!(
                "Exported {} assessments to {}.",
                assessments.len(),
                out.display()
            );
        }
        Commands::Portfolio { format, csv } => {
            let now = Utc::now();
            let mut projects = load_portfolio(&pool, now).await?;
            portfolio::sort_by_health(&mut projects);
            let overview = portfolio::summarize(&projects, now);

            match format {
                OutputFormat::Json => {
                    let body = serde_json::json!({
                        "overview": overview,
                        "projects": projects,
                    });
                    println!("{}", serde_json::to_string_pretty(&body)?);
                }
                OutputFormat::Text => {
                    println!(
                        "{} projects: {} critical, {} at risk, {} healthy, {} pending",
                        overview.total,
                        overview.critical,
                        overview.at_risk,
                        overview.healthy,
                        overview.pending
                    );
                    println!(
                        "{} blockers, {} overdue actions, {} renewing within 90 days, average health score {}, contract value {:.2}",
                        overview.total_blockers,
                        overview.total_overdue_actions,
                        overview.upcoming_renewals,
                        overview.average_health_score,
                        overview.total_contract_value
                    );
                    for project in &projects {
                        println!("{}", portfolio::format_line(project, now));
                    }
                }
            }

            if let Some(out) = csv {
                let file = create_file(&out)?;
                portfolio::write_csv(file, &projects, now)?;
                println!("Exported {} projects to {}.", projects.len(), out.display());
            }
        }
        Commands::Actions { command } => match command {
            ActionCommand::List {
                priority,
                all,
                blockers,
                format,
                csv,
            } => {
                let now = Utc::now();
                let items: Vec<ActionItem> = cycle::keep_valid(db::fetch_actions(&pool).await?);
                let filter = ActionFilter {
                    priority,
                    include_closed: all,
                    blockers_only: blockers,
                };
                let selected = actions::queue(&items, &filter);

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&selected)?);
                    }
                    OutputFormat::Text => {
                        if selected.is_empty() {
                            println!("No actions match.");
                        }
                        for item in &selected {
                            println!("{}", actions::format_line(item, now));
                        }
                    }
                }

                if let Some(out) = csv {
                    let file = create_file(&out)?;
                    actions::write_csv(file, &selected)?;
                    println!("Exported {} actions to {}.", selected.len(), out.display());
                }
            }
            ActionCommand::SetStatus { id, status } => {
                let change = actions::status_change(status, Utc::now());
                if !db::update_action_status(&pool, id, &change).await? {
                    anyhow::bail!("no action with id {id}");
                }
                info!(%id, status = status.as_str(), "action status updated");
                println!("Action {id} is now {}.", status.as_str());
            }
        },
        Commands::Alerts { command } => match command {
            AlertsCommand::List {
                unread,
                severity,
                limit,
                csv,
            } => {
                let alerts: Vec<AlertNotification> =
                    cycle::keep_valid(db::fetch_alerts(&pool, alert_center::FETCH_LIMIT).await?);
                let filter = match (unread, severity) {
                    (true, _) => AlertFilter::Unread,
                    (false, Some(severity)) => AlertFilter::Severity(severity),
                    (false, None) => AlertFilter::All,
                };
                let shown = alert_center::visible(&alerts, filter, limit);

                println!("{} unread alert(s).", alert_center::unread_count(&alerts));
                for alert in &shown {
                    println!("{}", alert_center::format_line(alert));
                }

                if let Some(out) = csv {
                    let file = create_file(&out)?;
                    alert_center::write_csv(file, &shown)?;
                    println!("Exported {} alerts to {}.", shown.len(), out.display());
                }
            }
            AlertsCommand::Read { id } => {
                update_alert(&pool, id, AlertAction::MarkRead).await?;
                println!("Alert {id} marked as read.");
            }
            AlertsCommand::Dismiss { id } => {
                update_alert(&pool, id, AlertAction::Dismiss).await?;
                println!("Alert {id} dismissed.");
            }
            AlertsCommand::Clear => {
                let cleared = db::dismiss_all_alerts(&pool, Utc::now()).await?;
                info!(cleared, "alerts cleared");
                println!("Dismissed {cleared} alert(s).");
            }
            AlertsCommand::Rules => {
                let mut rules: Vec<AlertRule> =
                    cycle::keep_valid(db::fetch_alert_rules(&pool).await?);
                alert_center::sort_rules(&mut rules);
                for rule in &rules {
                    println!(
                        "- [{}] {} ({}) {} id {}",
                        rule.severity.as_str(),
                        rule.name,
                        rule.rule_type.as_str(),
                        if rule.is_active { "active" } else { "inactive" },
                        rule.id
                    );
                }
            }
            AlertsCommand::EnableRule { id } => set_rule(&pool, id, true).await?,
            AlertsCommand::DisableRule { id } => set_rule(&pool, id, false).await?,
        },
        Commands::CriticalAlert { command } => {
            let now = Utc::now();
            let projects = load_portfolio(&pool, now).await?;
            let activity = CriticalActivity::from_portfolio(&projects);

            match command {
                CriticalAlertCommand::Status => {
                    let dismissal = db::load_dismissal(&pool, alert::DISMISSAL_KEY).await?;
                    match alert::critical_alert_visibility(now, dismissal.as_ref(), &activity) {
                        AlertVisibility::Visible => println!(
                            "{} project(s) in critical state with recent activity. Immediate action required.",
                            activity.critical_count
                        ),
                        AlertVisibility::NoCriticalProjects => {
                            println!("No projects in critical state.")
                        }
                        AlertVisibility::NoRecentActivity => println!(
                            "{} critical project(s), no activity in the last 30 minutes.",
                            activity.critical_count
                        ),
                        AlertVisibility::Dismissed => println!(
                            "Alert dismissed; no new critical activity since dismissal."
                        ),
                    }
                }
                CriticalAlertCommand::Dismiss => {
                    let record = alert::dismiss(now, &activity);
                    db::save_dismissal(&pool, alert::DISMISSAL_KEY, &record).await?;
                    info!(critical_count = record.critical_count, "critical alert dismissed");
                    println!("Critical alert dismissed.");
                }
            }
        }
    }

    Ok(())
}

async fn refresh(
    pool: &sqlx::PgPool,
    config: &AppConfig,
) -> anyhow::Result<Vec<RenewalAssessment>> {
    let source = db::PgSource::new(pool.clone());
    let gate = RefreshGate::default();
    let outcome = cycle::run_cycle(&source, &gate, Utc::now(), config.database.fetch_timeout)
        .await
        .context("renewal data unavailable")?;

    match outcome {
        CycleOutcome::Applied {
            snapshot,
            assessments,
        } => {
            info!(
                contracts = snapshot.contracts.len(),
                communications = snapshot.communications.len(),
                "renewal data loaded"
            );
            Ok(assessments)
        }
        CycleOutcome::Superseded => anyhow::bail!("renewal refresh was superseded"),
    }
}

async fn load_portfolio(
    pool: &sqlx::PgPool,
    now: chrono::DateTime<Utc>,
) -> anyhow::Result<Vec<PortfolioProject>> {
    let rows = db::fetch_portfolio(pool, now.date_naive())
        .await
        .context("portfolio data unavailable")?;
    Ok(cycle::keep_valid(rows))
}

async fn update_alert(pool: &sqlx::PgPool, id: Uuid, action: AlertAction) -> anyhow::Result<()> {
    let transition = alert_center::transition(action, Utc::now());
    if !db::apply_alert_transition(pool, id, &transition).await? {
        anyhow::bail!("no alert with id {id}");
    }
    info!(%id, status = transition.status.as_str(), "alert updated");
    Ok(())
}

async fn set_rule(pool: &sqlx::PgPool, id: Uuid, active: bool) -> anyhow::Result<()> {
    if !db::set_alert_rule_active(pool, id, active).await? {
        anyhow::bail!("no alert rule with id {id}");
    }
    info!(%id, active, "alert rule toggled");
    println!(
        "Alert rule {id} {}.",
        if active { "enabled" } else { "disabled" }
    );
    Ok(())
}

fn create_file(path: &Path) -> anyhow::Result<std::fs::File> {
    std::fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))
}
