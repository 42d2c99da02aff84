use super::document::DocumentKind;
use super::number::Series;

pub type Result<T, E = LifecycleError> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum LifecycleError {
    #[error("{kind} {id} not found")]
    NotFound { kind: DocumentKind, id: String },
    #[error("malformed {series} number {identifier:?}: {reason}")]
    MalformedIdentifier {
        series: Series,
        identifier: String,
        reason: String,
    },
    #[error("{kind} {id} is already approved")]
    AlreadyApproved { kind: DocumentKind, id: String },
    #[error("{kind} {id} must be approved first")]
    NotApproved { kind: DocumentKind, id: String },
    #[error("quotation {0} has already been converted to a contract")]
    AlreadyConverted(String),
    #[error("draft {kind} {id} rejected: {reason}")]
    InvalidDraft {
        kind: DocumentKind,
        id: String,
        reason: &'static str,
    },
    #[error("{series} counter is already in {stored}, refusing to issue for {requested}")]
    FiscalYearRewound {
        series: String,
        stored: String,
        requested: String,
    },
    #[error("no free {series} number after {attempts} attempts")]
    NumberExhausted { series: Series, attempts: u32 },
    #[error("{kind} {id} changed while {step}")]
    ConcurrentModification {
        kind: DocumentKind,
        id: String,
        step: &'static str,
    },
    #[error("store failure while {step}")]
    StoreFailure {
        step: String,
        #[source]
        source: sled::Error,
    },
    #[error("failed to encode {kind} {id}")]
    Encode {
        kind: DocumentKind,
        id: String,
        #[source]
        source: minicbor::encode::Error<std::convert::Infallible>,
    },
    #[error("failed to decode {kind} {id}")]
    Decode {
        kind: DocumentKind,
        id: String,
        #[source]
        source: minicbor::decode::Error,
    },
    #[error("invalid record id prefix {0:?}")]
    InvalidPrefix(String),
    #[error("{0:?} is not a bech32 record id")]
    InvalidRecordId(String),
}

/// Attaches the sub-step to a raw store error.
pub(crate) trait StoreContext<T> {
    fn during<F: FnOnce() -> String>(self, step: F) -> Result<T>;
}

impl<T> StoreContext<T> for std::result::Result<T, sled::Error> {
    fn during<F: FnOnce() -> String>(self, step: F) -> Result<T> {
        self.map_err(|source| LifecycleError::StoreFailure {
            step: step(),
            source,
        })
    }
}
