use skyetl::error::EtlError;
use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt::{self, Write};
use thiserror::Error;

pub type ReplicatorResult<T> = Result<T, ReplicatorError>;

/// Backtrace recorded when a replicator-level error is created.
pub struct Trace(Backtrace);

impl Trace {
    fn here() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Error returned by the replicator binary.
#[derive(Debug, Error)]
pub enum ReplicatorError {
    /// Failure raised by the ingestion pipeline.
    #[error(transparent)]
    Etl(#[from] EtlError),

    /// Invalid or incomplete configuration.
    #[error("configuration error: {source}")]
    Config {
        source: Box<dyn Error + Send + Sync>,
        trace: Trace,
    },

    #[error("i/o error: {source}")]
    Io { source: std::io::Error, trace: Trace },
}

impl From<std::io::Error> for ReplicatorError {
    fn from(source: std::io::Error) -> Self {
        ReplicatorError::Io {
            source,
            trace: Trace::here(),
        }
    }
}

impl ReplicatorError {
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        ReplicatorError::Config {
            source: Box::new(err),
            trace: Trace::here(),
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            ReplicatorError::Etl(_) => "pipeline error",
            ReplicatorError::Config { .. } => "configuration error",
            ReplicatorError::Io { .. } => "i/o error",
        }
    }

    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            ReplicatorError::Etl(err) => err.backtrace(),
            ReplicatorError::Config { trace, .. } | ReplicatorError::Io { trace, .. } => {
                Some(&trace.0)
            }
        }
    }

    /// Multi-line report printed to stderr before the process exits.
    ///
    /// The backtrace is only included when `RUST_BACKTRACE` is `1` or `full`.
    pub fn render_report(&self) -> String {
        let mut report = format!(
            "skyetl replicator failed\ncategory: {}\nerror: {self}\n",
            self.category()
        );

        // Aggregations already print every inner failure.
        let aggregated = matches!(self, ReplicatorError::Etl(err) if err.errors().is_some());
        if !aggregated {
            let causes = std::iter::successors(self.source(), |&err| err.source());
            for (depth, cause) in causes.enumerate() {
                let _ = writeln!(report, "cause {}: {cause}", depth + 1);
            }
        }

        let wants_backtrace = matches!(
            std::env::var("RUST_BACKTRACE").as_deref(),
            Ok("1" | "full")
        );
        if let (true, Some(backtrace)) = (wants_backtrace, self.backtrace()) {
            let _ = writeln!(report, "backtrace:\n{}", backtrace.to_string().trim_end());
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyetl::error::ErrorKind;
    use skyetl::etl_error;

    #[test]
    fn report_lists_category_and_causes() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "configuration missing");
        let report = ReplicatorError::config(io).render_report();

        assert!(report.starts_with("skyetl replicator failed\n"));
        assert!(report.contains("category: configuration error"));
        assert!(report.contains("error: configuration error: configuration missing"));
        assert!(report.contains("cause 1: configuration missing"));
    }

    #[test]
    fn pipeline_errors_keep_their_kind() {
        let err: ReplicatorError =
            etl_error!(ErrorKind::AuthenticationError, "Login rejected").into();

        assert_eq!(err.category(), "pipeline error");
        match err {
            ReplicatorError::Etl(err) => assert_eq!(err.kind(), ErrorKind::AuthenticationError),
            other => panic!("unexpected error: {other}"),
        }
    }
}
