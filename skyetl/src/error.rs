//! Classified errors for every stage of the ingestion pipeline.
//!
//! An [`EtlError`] is either a single failure, carrying a kind, a static description, optional
//! detail and source, or an aggregation of failures reported by several workers at once.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

pub type EtlResult<T> = Result<T, EtlError>;

/// Failure category, used to decide how a failure is handled and to label metrics.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Upstream stream and search API
    SourceConnectionFailed,
    SourceQueryFailed,

    // Wire decoding
    MalformedFrame,
    MalformedArchive,
    MalformedRecord,
    ConversionError,
    DeserializationError,

    // Batch files and warehouse
    DestinationConnectionFailed,
    DestinationQueryFailed,
    DestinationIoError,
    DestinationTaskPanic,

    AuthenticationError,
    PermissionDenied,
    ConfigError,
    IoError,

    // Pipeline lifecycle
    InvalidState,
    IngestWorkerPanic,
    FlushWorkerPanic,

    Unknown,
}

#[derive(Debug, Clone)]
struct Failure {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

#[derive(Debug, Clone)]
enum Repr {
    Single(Failure),
    Many {
        errors: Vec<EtlError>,
        location: &'static Location<'static>,
    },
}

/// Error type returned by every fallible operation of the crate.
#[derive(Debug, Clone)]
pub struct EtlError {
    repr: Repr,
}

impl EtlError {
    #[track_caller]
    fn single(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        EtlError {
            repr: Repr::Single(Failure {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }

    /// Wraps `err` as the source of a new error, reusing its message as detail.
    #[track_caller]
    fn from_source<E>(kind: ErrorKind, description: &'static str, err: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        let detail = Cow::Owned(err.to_string());
        EtlError::single(
            kind,
            Cow::Borrowed(description),
            Some(detail),
            Some(Arc::new(err)),
        )
    }

    /// Kind of the error; the kind of the first inner error for aggregations.
    pub fn kind(&self) -> ErrorKind {
        match &self.repr {
            Repr::Single(failure) => failure.kind,
            Repr::Many { errors, .. } => errors.first().map_or(ErrorKind::Unknown, EtlError::kind),
        }
    }

    /// Every kind contained in the error, flattening aggregations.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match &self.repr {
            Repr::Single(failure) => vec![failure.kind],
            Repr::Many { errors, .. } => errors.iter().flat_map(EtlError::kinds).collect(),
        }
    }

    pub fn errors(&self) -> Option<&[EtlError]> {
        match &self.repr {
            Repr::Single(_) => None,
            Repr::Many { errors, .. } => Some(errors),
        }
    }

    pub fn description(&self) -> Option<&str> {
        match &self.repr {
            Repr::Single(failure) => Some(&failure.description),
            Repr::Many { errors, .. } => errors.first().and_then(EtlError::description),
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match &self.repr {
            Repr::Single(failure) => failure.detail.as_deref(),
            Repr::Many { errors, .. } => errors.iter().find_map(EtlError::detail),
        }
    }

    /// Backtrace captured where a single error was created.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match &self.repr {
            Repr::Single(failure) => Some(&failure.backtrace),
            Repr::Many { .. } => None,
        }
    }

    /// Attaches the error that caused this one. Ignored on aggregations.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let Repr::Single(failure) = &mut self.repr {
            failure.source = Some(Arc::new(source));
        }

        self
    }
}

impl PartialEq for EtlError {
    /// Errors compare by kind only.
    fn eq(&self, other: &EtlError) -> bool {
        self.kinds() == other.kinds()
    }
}

/// Writes every line of `block` on its own line, indented under `label`.
fn write_block(f: &mut fmt::Formatter<'_>, label: &str, block: &str) -> fmt::Result {
    write!(f, "\n  {label}:")?;
    for line in block.lines() {
        write!(f, "\n    {line}")?;
    }

    Ok(())
}

impl fmt::Display for EtlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Single(failure) => {
                write!(
                    f,
                    "[{:?}] {} @ {}",
                    failure.kind, failure.description, failure.location
                )?;
                if let Some(detail) = &failure.detail {
                    write_block(f, "Detail", detail)?;
                }

                let backtrace = failure.backtrace.to_string();
                if !backtrace.trim().is_empty() {
                    write_block(f, "Backtrace", &backtrace)?;
                }

                Ok(())
            }
            Repr::Many { errors, location } => {
                let plural = if errors.len() == 1 { "" } else { "s" };
                write!(f, "[Many] {} error{plural} aggregated @ {location}", errors.len())?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    let mut lines = rendered.lines();
                    write!(f, "\n  {}. {}", index + 1, lines.next().unwrap_or_default())?;
                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for EtlError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            Repr::Single(failure) => failure
                .source
                .as_deref()
                .map(|source| source as &(dyn error::Error + 'static)),
            Repr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

impl From<(ErrorKind, &'static str)> for EtlError {
    #[track_caller]
    fn from((kind, description): (ErrorKind, &'static str)) -> EtlError {
        EtlError::single(kind, Cow::Borrowed(description), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for EtlError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, description, detail): (ErrorKind, &'static str, D)) -> EtlError {
        EtlError::single(kind, Cow::Borrowed(description), Some(detail.into()), None)
    }
}

/// Aggregates errors. A single error is returned as is.
impl<E> From<Vec<E>> for EtlError
where
    E: Into<EtlError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> EtlError {
        let location = Location::caller();

        let mut errors: Vec<EtlError> = errors.into_iter().map(Into::into).collect();
        match errors.pop() {
            Some(error) if errors.is_empty() => error,
            Some(last) => {
                errors.push(last);
                EtlError {
                    repr: Repr::Many { errors, location },
                }
            }
            None => EtlError {
                repr: Repr::Many { errors, location },
            },
        }
    }
}

/// Converts [`std::io::Error`] to [`EtlError`] with [`ErrorKind::IoError`].
impl From<std::io::Error> for EtlError {
    #[track_caller]
    fn from(err: std::io::Error) -> EtlError {
        EtlError::from_source(ErrorKind::IoError, "I/O operation failed", err)
    }
}

/// Converts [`serde_json::Error`] to [`EtlError`] with the appropriate error kind.
impl From<serde_json::Error> for EtlError {
    #[track_caller]
    fn from(err: serde_json::Error) -> EtlError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        EtlError::from_source(kind, description, err)
    }
}

/// Converts [`reqwest::Error`] to [`EtlError`], classifying HTTP status failures.
impl From<reqwest::Error> for EtlError {
    #[track_caller]
    fn from(err: reqwest::Error) -> EtlError {
        let (kind, description) = match err.status() {
            Some(status) if status.as_u16() == 401 => (
                ErrorKind::AuthenticationError,
                "Bluesky API rejected the credentials",
            ),
            Some(status) if status.as_u16() == 403 => {
                (ErrorKind::PermissionDenied, "Bluesky API denied access")
            }
            Some(_) => (ErrorKind::SourceQueryFailed, "Bluesky API request failed"),
            None if err.is_decode() => (
                ErrorKind::DeserializationError,
                "Bluesky API response could not be decoded",
            ),
            None => (
                ErrorKind::SourceConnectionFailed,
                "Bluesky API could not be reached",
            ),
        };

        EtlError::from_source(kind, description, err)
    }
}

/// Converts [`duckdb::Error`] to [`EtlError`] with [`ErrorKind::DestinationQueryFailed`].
impl From<duckdb::Error> for EtlError {
    #[track_caller]
    fn from(err: duckdb::Error) -> EtlError {
        EtlError::from_source(
            ErrorKind::DestinationQueryFailed,
            "DuckDB operation failed",
            err,
        )
    }
}

/// Converts [`parquet::errors::ParquetError`] to [`EtlError`] with [`ErrorKind::DestinationIoError`].
impl From<parquet::errors::ParquetError> for EtlError {
    #[track_caller]
    fn from(err: parquet::errors::ParquetError) -> EtlError {
        EtlError::from_source(
            ErrorKind::DestinationIoError,
            "Parquet write failed",
            err,
        )
    }
}

/// Converts [`arrow::error::ArrowError`] to [`EtlError`] with [`ErrorKind::ConversionError`].
impl From<arrow::error::ArrowError> for EtlError {
    #[track_caller]
    fn from(err: arrow::error::ArrowError) -> EtlError {
        EtlError::from_source(
            ErrorKind::ConversionError,
            "Arrow record batch construction failed",
            err,
        )
    }
}

/// Converts [`cid::Error`] to [`EtlError`] with [`ErrorKind::MalformedArchive`].
impl From<cid::Error> for EtlError {
    #[track_caller]
    fn from(err: cid::Error) -> EtlError {
        EtlError::from_source(
            ErrorKind::MalformedArchive,
            "Content identifier parsing failed",
            err,
        )
    }
}
