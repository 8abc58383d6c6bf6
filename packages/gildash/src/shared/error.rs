//! Error types for the gildash crate
//!
//! One error struct across all features, categorized by kind. Exceptions
//! originating outside gildash are wrapped with the appropriate kind and the
//! original preserved as `source`; `GildashError` values pass through
//! library code unchanged.

use std::fmt;
use thiserror::Error;

use gildash_store::StoreError;

/// Error kind categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Argument and pre-flight check failures
    Validation,
    /// Store reads or writes outside shutdown
    Store,
    /// Source parse failures
    Parse,
    /// Symbol/relation extraction failures
    Extract,
    /// Index-run failures escalating past per-file isolation
    Index,
    /// Filesystem event subscription or delivery failures
    Watcher,
    /// Re-export/heritage/graph query path failures
    Search,
    /// Semantic bridge failures
    Semantic,
    /// Gated operation called after close
    Closed,
    /// Aggregated close-sequence failures
    Close,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Store => "store",
            ErrorKind::Parse => "parse",
            ErrorKind::Extract => "extract",
            ErrorKind::Index => "index",
            ErrorKind::Watcher => "watcher",
            ErrorKind::Search => "search",
            ErrorKind::Semantic => "semantic",
            ErrorKind::Closed => "closed",
            ErrorKind::Close => "close",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unified error type
#[derive(Debug, Error)]
#[error("[{kind}] {message}")]
pub struct GildashError {
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    pub kind: ErrorKind,
    pub message: String,
}

impl GildashError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    // Convenience constructors
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Store, message)
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    pub fn extract(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Extract, message)
    }

    pub fn index(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Index, message)
    }

    pub fn watcher(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Watcher, message)
    }

    pub fn search(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Search, message)
    }

    pub fn semantic(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Semantic, message)
    }

    pub fn closed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Closed, message)
    }

    /// Aggregate the failures collected during a close sequence into one
    /// `close` error; the individual errors stay reachable as the source.
    pub fn close_aggregate(failures: Vec<GildashError>) -> Self {
        let message = format!(
            "close completed with {} failure(s): {}",
            failures.len(),
            failures
                .iter()
                .map(|err| err.to_string())
                .collect::<Vec<_>>()
                .join("; ")
        );
        Self {
            kind: ErrorKind::Close,
            message,
            source: Some(Box::new(CloseFailures(failures))),
        }
    }
}

/// Ordered list of the failures a close sequence collected.
#[derive(Debug)]
pub struct CloseFailures(pub Vec<GildashError>);

impl fmt::Display for CloseFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CloseFailures {}

impl From<StoreError> for GildashError {
    fn from(err: StoreError) -> Self {
        GildashError::store(err.to_string()).with_source(err)
    }
}

/// Result alias for gildash operations
pub type Result<T> = std::result::Result<T, GildashError>;
