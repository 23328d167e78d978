use snafu::Snafu;
use strum::{AsRefStr, Display};

/// Coarse classification of an [`Error`], used to bucket failure metrics.
///
/// Every collaborator reports its own category, so the metrics taxonomy does
/// not depend on how an error message happens to be worded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    Database,
    SearchIndex,
    Serialization,
    Unknown,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("database error: {source}"))]
    Sqlx {
        #[snafu(source)]
        source: sqlx::Error,
    },

    #[snafu(display("error running migrations: {source}"))]
    MigrationError {
        #[snafu(source)]
        source: sqlx::migrate::MigrateError,
    },

    #[snafu(display("outbox message {id} not found"))]
    MessageNotFound { id: String },

    #[snafu(display("outbox message {id} is already {status}"))]
    AlreadyFinal { id: String, status: String },

    #[snafu(display("corrupt outbox row {id}: {message}"))]
    CorruptRow { id: String, message: String },

    #[snafu(display("json serialization error: {source}"))]
    Serialization {
        #[snafu(source)]
        source: serde_json::Error,
    },

    #[snafu(display("payload field `{field}` is missing or not a string"))]
    MissingField { field: &'static str },

    #[snafu(display("unknown event type: {event_type}"))]
    UnknownEventType { event_type: String },

    #[snafu(display("search index request failed: {source}"))]
    SearchRequest {
        #[snafu(source)]
        source: reqwest::Error,
    },

    #[snafu(display("search index returned {status} for {operation} of document {id}"))]
    SearchStatus {
        operation: &'static str,
        id: String,
        status: u16,
    },

    #[snafu(display("search index rejected {operation} of document {id}: {message}"))]
    SearchRejected {
        operation: &'static str,
        id: String,
        message: String,
    },

    #[snafu(display("invalid search index url: {source}"))]
    InvalidUrl {
        #[snafu(source)]
        source: url::ParseError,
    },
}

impl From<sqlx::Error> for Error {
    fn from(source: sqlx::Error) -> Self {
        Self::Sqlx { source }
    }
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(source: sqlx::migrate::MigrateError) -> Self {
        Self::MigrationError { source }
    }
}

impl From<serde_json::Error> for Error {
    fn from(source: serde_json::Error) -> Self {
        Self::Serialization { source }
    }
}

impl From<reqwest::Error> for Error {
    fn from(source: reqwest::Error) -> Self {
        Self::SearchRequest { source }
    }
}

impl From<url::ParseError> for Error {
    fn from(source: url::ParseError) -> Self {
        Self::InvalidUrl { source }
    }
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Sqlx { .. }
            | Self::MigrationError { .. }
            | Self::MessageNotFound { .. }
            | Self::AlreadyFinal { .. }
            | Self::CorruptRow { .. } => ErrorCategory::Database,

            Self::Serialization { .. } | Self::MissingField { .. } => ErrorCategory::Serialization,

            Self::SearchRequest { .. }
            | Self::SearchStatus { .. }
            | Self::SearchRejected { .. }
            | Self::InvalidUrl { .. } => ErrorCategory::SearchIndex,

            Self::UnknownEventType { .. } => ErrorCategory::Unknown,
        }
    }

    /// Whether another delivery attempt could succeed.
    ///
    /// An unknown event type can never be dispatched, so it fails the message
    /// on the first attempt instead of burning the retry budget.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::UnknownEventType { .. })
    }

    pub fn not_found(id: impl Into<String>) -> Self {
        Self::MessageNotFound { id: id.into() }
    }

    /// Whether a terminal mark lost to an earlier one. The record is
    /// already retired, so there is nothing left to do.
    pub fn is_already_final(&self) -> bool {
        matches!(self, Self::AlreadyFinal { .. })
    }

    pub fn rejected(
        operation: &'static str,
        id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::SearchRejected {
            operation,
            id: id.into(),
            message: message.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl actix_web::ResponseError for Error {
    fn status_code(&self) -> actix_web::http::StatusCode {
        match self {
            Self::MessageNotFound { .. } => actix_web::http::StatusCode::NOT_FOUND,
            Self::AlreadyFinal { .. } => actix_web::http::StatusCode::CONFLICT,
            _ => actix_web::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
