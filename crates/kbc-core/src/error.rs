use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KbcError {
    #[error("unknown region '{0}': run 'kbc-admin regions' to list known regions")]
    UnknownRegion(String),

    #[error("missing required input: {0}")]
    MissingInput(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("request {method} {url} failed: {source}")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {url} returned HTTP {status}: {body}")]
    Api {
        method: String,
        url: String,
        status: u16,
        body: Value,
    },

    #[error("response from {method} {url} is not valid JSON: {raw}")]
    Decode {
        method: String,
        url: String,
        raw: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    /// A successful response lacked a field the workflow needs.
    #[error("response has no {0}")]
    Incomplete(String),

    #[error("job {url} did not finish after {attempts} polls (last status: {last_status})")]
    PollTimeout {
        url: String,
        attempts: u32,
        last_status: String,
    },

    #[error("configuration {configuration_id} was created but row #{index} ('{row_name}') failed: {source}")]
    RowClone {
        configuration_id: String,
        index: usize,
        row_name: String,
        #[source]
        source: Box<KbcError>,
    },

    #[error("transfer of table {table_id} failed: {source}")]
    TableTransfer {
        table_id: String,
        #[source]
        source: Box<KbcError>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used when rendering failures to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Raised before any network I/O (bad region, missing input, bad config).
    Configuration,
    Transport,
    RemoteApi,
    Decode,
    Timeout,
    Local,
}

impl KbcError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KbcError::UnknownRegion(_)
            | KbcError::MissingInput(_)
            | KbcError::InvalidInput(_)
            | KbcError::Yaml(_) => ErrorKind::Configuration,
            KbcError::Transport { .. } => ErrorKind::Transport,
            KbcError::Api { .. } | KbcError::NotFound(_) => ErrorKind::RemoteApi,
            KbcError::Decode { .. } | KbcError::Incomplete(_) => ErrorKind::Decode,
            KbcError::PollTimeout { .. } => ErrorKind::Timeout,
            KbcError::RowClone { source, .. } | KbcError::TableTransfer { source, .. } => {
                source.kind()
            }
            KbcError::Io(_) | KbcError::Json(_) => ErrorKind::Local,
        }
    }

    /// HTTP status of the remote failure, if the error carries one.
    pub fn status(&self) -> Option<u16> {
        match self {
            KbcError::Api { status, .. } => Some(*status),
            KbcError::RowClone { source, .. } | KbcError::TableTransfer { source, .. } => {
                source.status()
            }
            _ => None,
        }
    }

    pub fn missing(what: impl Into<String>) -> Self {
        KbcError::MissingInput(what.into())
    }

    pub fn invalid(what: impl Into<String>) -> Self {
        KbcError::InvalidInput(what.into())
    }

    pub fn incomplete(what: impl Into<String>) -> Self {
        KbcError::Incomplete(what.into())
    }
}

pub type Result<T> = std::result::Result<T, KbcError>;
