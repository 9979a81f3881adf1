//! Error taxonomy for the scheduling engine (see SPEC_FULL.md §7).

use thiserror::Error;

/// Errors surfaced by `jade-core`.
///
/// `TransientClusterError` and `EventSinkFailure` from the taxonomy are
/// deliberately *not* variants here: the former is swallowed and retried
/// inside [`crate::async_batch::AsyncBatch::poll`], the latter is logged via
/// `tracing::warn!` and never returned to a caller. `JobFailure` is not an
/// error at all — a non-zero job return code is just a completed job.
#[derive(Debug, Error)]
pub enum Error {
    /// A `blocked_by` name refers to a job that doesn't exist in the
    /// configuration, or the scheduler made no progress (ready-queue
    /// non-empty, nothing in flight) — almost always a dependency cycle.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// `ClusterManager::submit` returned a non-GOOD status.
    #[error("execution error: {0}")]
    ExecutionError(String),

    /// The cluster manager backend itself failed in a way that isn't
    /// recoverable by retrying (e.g. malformed backend output).
    #[error("cluster manager error: {0}")]
    ClusterError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Build an `Error`-category [`crate::event::Event`] describing an unexpected
/// failure, following `StructuredErrorLogEvent` in the original source: it
/// carries the exception's type name, message, source file, and line.
///
/// Rust has no exception traceback to introspect, so the caller passes the
/// location explicitly (use `#[track_caller]` + `Location::caller()` at the
/// call site, matching `tb.tb_frame`/`tb.tb_lineno` as closely as the
/// language allows).
pub fn unhandled_error_event<E: std::error::Error>(
    source: &str,
    error: &E,
    location: &std::panic::Location<'_>,
) -> crate::event::Event {
    let mut data = serde_json::Map::new();
    data.insert(
        "exception".to_string(),
        serde_json::Value::String(std::any::type_name::<E>().to_string()),
    );
    data.insert(
        "error".to_string(),
        serde_json::Value::String(error.to_string()),
    );
    data.insert(
        "filename".to_string(),
        serde_json::Value::String(location.file().to_string()),
    );
    data.insert(
        "lineno".to_string(),
        serde_json::Value::Number(location.line().into()),
    );

    crate::event::Event {
        timestamp: crate::event::now_timestamp(),
        source: source.to_string(),
        category: crate::event::EVENT_CATEGORY_ERROR.to_string(),
        name: crate::event::EVENT_NAME_UNHANDLED_ERROR.to_string(),
        message: error.to_string(),
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_configuration_display() {
        let err = Error::InvalidConfiguration("unknown blocker '10'".to_string());
        assert!(err.to_string().contains("unknown blocker"));
    }

    #[test]
    #[track_caller]
    fn unhandled_error_event_carries_location() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let location = std::panic::Location::caller();
        let event = unhandled_error_event("test", &io_err, location);
        assert_eq!(event.category, "Error");
        assert_eq!(event.name, "error");
        assert!(event.data.contains_key("filename"));
        assert!(event.data.contains_key("lineno"));
    }
}
