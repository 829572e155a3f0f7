use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Source rows could not be loaded; callers must not treat this as "no data".
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to load {what}: {source}")]
    Query {
        what: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("loading {what} timed out after {after:?}")]
    TimedOut { what: &'static str, after: Duration },
}

/// A single row that cannot take part in an assessment cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedRecord {
    #[error("contract {contract_id} has no end date")]
    MissingEndDate { contract_id: Uuid },

    #[error("contract {contract_id} has unrecognized health value {value:?}")]
    UnknownHealth { contract_id: Uuid, value: String },

    #[error("communication {id} is not linked to a contract")]
    UnlinkedCommunication { id: Uuid },

    #[error("record {id} has unrecognized {field} {value:?}")]
    UnrecognizedValue {
        id: Uuid,
        field: &'static str,
        value: String,
    },
}
