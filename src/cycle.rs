use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{FetchError, MalformedRecord};
use crate::models::{
    CommunicationRecord, CommunicationRow, ContractHealth, ContractRow, RenewalAssessment,
};
use crate::risk;

/// Where a refresh cycle reads its source rows from.
pub trait RenewalSource {
    fn contracts(&self) -> impl Future<Output = Result<Vec<ContractRow>, FetchError>> + Send;

    fn communications(
        &self,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<CommunicationRow>, FetchError>> + Send;
}

/// Hands out cycle tickets; starting a cycle supersedes every earlier one.
#[derive(Debug, Default)]
pub struct RefreshGate {
    current: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTicket(u64);

impl RefreshGate {
    pub fn begin(&self) -> RefreshTicket {
        RefreshTicket(self.current.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn is_current(&self, ticket: RefreshTicket) -> bool {
        self.current.load(Ordering::SeqCst) == ticket.0
    }
}

/// Validated rows for one cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleSnapshot {
    pub contracts: Vec<ContractHealth>,
    pub communications: Vec<CommunicationRecord>,
}

#[derive(Debug)]
pub enum CycleOutcome {
    Applied {
        snapshot: CycleSnapshot,
        assessments: Vec<RenewalAssessment>,
    },
    Superseded,
}

pub async fn fetch_snapshot<S: RenewalSource + Sync>(
    source: &S,
    now: DateTime<Utc>,
    fetch_timeout: Duration,
) -> Result<CycleSnapshot, FetchError> {
    let since = risk::lookback_start(now);
    let (contract_rows, communication_rows) = tokio::try_join!(
        bounded("contracts", fetch_timeout, source.contracts()),
        bounded("communications", fetch_timeout, source.communications(since)),
    )?;
    debug!(
        contracts = contract_rows.len(),
        communications = communication_rows.len(),
        "fetched source rows"
    );

    Ok(CycleSnapshot {
        contracts: keep_valid(contract_rows),
        communications: keep_valid(communication_rows),
    })
}

/// Runs one refresh: fetch, validate, assess and rank. The result is only
/// returned as `Applied` if no newer cycle started in the meantime.
pub async fn run_cycle<S: RenewalSource + Sync>(
    source: &S,
    gate: &RefreshGate,
    now: DateTime<Utc>,
    fetch_timeout: Duration,
) -> Result<CycleOutcome, FetchError> {
    let ticket = gate.begin();
    debug!(ticket = ticket.0, "starting renewal refresh");

    let snapshot = fetch_snapshot(source, now, fetch_timeout).await?;
    if !gate.is_current(ticket) {
        info!(ticket = ticket.0, "discarding superseded renewal refresh");
        return Ok(CycleOutcome::Superseded);
    }

    let assessments =
        risk::assess_portfolio(&snapshot.contracts, &snapshot.communications, now);
    info!(
        ticket = ticket.0,
        assessed = assessments.len(),
        "renewal refresh complete"
    );

    Ok(CycleOutcome::Applied {
        snapshot,
        assessments,
    })
}

async fn bounded<T, F>(what: &'static str, after: Duration, fut: F) -> Result<T, FetchError>
where
    F: Future<Output = Result<T, FetchError>>,
{
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| FetchError::TimedOut { what, after })?
}

/// Converts raw rows, logging and dropping the ones that fail validation.
pub fn keep_valid<R, T>(rows: Vec<R>) -> Vec<T>
where
    T: TryFrom<R, Error = MalformedRecord>,
{
    rows.into_iter()
        .filter_map(|row| match T::try_from(row) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(error = %err, "skipping malformed record");
                None
            }
        })
        .collect()
}
