use std::time::Duration;

use thiserror::Error;

use relaycheck_api::ApiError;
use relaycheck_core::CoreError;

#[derive(Error, Debug)]
pub enum CheckError {
    #[error("Timed out after {waited:?} waiting for {what} (last observed: {last_observed})")]
    Timeout {
        what: String,
        waited: Duration,
        last_observed: String,
    },

    #[error("Node rejected {action}: {detail}")]
    Rejected { action: String, detail: String },

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("Node API error: {0}")]
    Api(#[from] ApiError),

    #[error("Invalid node data: {0}")]
    Core(#[from] CoreError),

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cleanup failed: {0}")]
    Cleanup(Box<CheckError>),

    #[error("Scope failed: {body}; cleanup also failed: {cleanup}")]
    ScopeFailed {
        body: Box<CheckError>,
        cleanup: Box<CheckError>,
    },

    #[error("{} channel teardowns failed: {}", .0.len(), join_errors(.0))]
    Teardown(Vec<CheckError>),
}

fn join_errors(errors: &[CheckError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl CheckError {
    pub fn rejected(action: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Rejected {
            action: action.into(),
            detail: detail.into(),
        }
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion(message.into())
    }

    /// Combine the outcome of a scope body with the outcome of its cleanup
    pub fn scoped<T>(body: Result<T>, cleanup: Result<()>) -> Result<T> {
        match (body, cleanup) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(cleanup)) => Err(CheckError::Cleanup(Box::new(cleanup))),
            (Err(body), Ok(())) => Err(body),
            (Err(body), Err(cleanup)) => Err(CheckError::ScopeFailed {
                body: Box::new(body),
                cleanup: Box::new(cleanup),
            }),
        }
    }

    /// Whether this error (or the body part of a scope failure) is a timeout
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::ScopeFailed { body, .. } => body.is_timeout(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CheckError>;
