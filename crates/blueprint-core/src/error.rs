//! Unified Error Model
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error raised by a [`TemplateSource`](crate::template::TemplateSource).
pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// Errors produced by operator callbacks.
#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("OP/UNSUPPORTED: {0}")]
    Unsupported(&'static str),

    #[error("OP/EXEC: {0}")]
    ExecutionFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OperatorError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }
}

/// The four execution phases, in the order the engine runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    CreatePosition,
    CreateData,
    TransformData,
    TransformPosition,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Phase::CreatePosition => write!(f, "create_pos"),
            Phase::CreateData => write!(f, "create_data_for_pos"),
            Phase::TransformData => write!(f, "transform_data"),
            Phase::TransformPosition => write!(f, "transform_pos"),
        }
    }
}

#[derive(Error, Debug)]
pub enum TransactionError {
    /// An operator asked to keep data for a position that has none.
    #[error("CONTRACT/{operator}#{index}: no existing data to keep at {position}")]
    ContractViolation {
        operator: String,
        index: usize,
        position: String,
    },

    #[error("OPERATOR/{operator}#{index} failed during {phase}: {source}")]
    OperatorFailure {
        operator: String,
        index: usize,
        phase: Phase,
        #[source]
        source: OperatorError,
    },

    #[error("CONCURRENT/transaction is already executing")]
    ConcurrentExecution,

    #[error("CONSUMED/transaction has already been executed")]
    AlreadyConsumed,

    #[error("EXEC/{message}")]
    Execution {
        message: String,
        #[source]
        source: Option<SourceError>,
    },
}

/// Fieldless mirror of [`TransactionError`] for matching and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ContractViolation,
    OperatorFailure,
    ConcurrentExecution,
    AlreadyConsumed,
    Execution,
}

impl TransactionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ContractViolation { .. } => ErrorKind::ContractViolation,
            Self::OperatorFailure { .. } => ErrorKind::OperatorFailure,
            Self::ConcurrentExecution => ErrorKind::ConcurrentExecution,
            Self::AlreadyConsumed => ErrorKind::AlreadyConsumed,
            Self::Execution { .. } => ErrorKind::Execution,
        }
    }

    pub(crate) fn source_failure(message: impl Into<String>, source: SourceError) -> Self {
        Self::Execution {
            message: message.into(),
            source: Some(source),
        }
    }

    pub(crate) fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_display_codes() {
        let err = TransactionError::ContractViolation {
            operator: "fill".to_string(),
            index: 2,
            position: "(1, 2, 3)".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "CONTRACT/fill#2: no existing data to keep at (1, 2, 3)"
        );
        assert_eq!(
            TransactionError::AlreadyConsumed.to_string(),
            "CONSUMED/transaction has already been executed"
        );
    }

    #[test]
    fn test_operator_failure_keeps_source() {
        let err = TransactionError::OperatorFailure {
            operator: "rotate".to_string(),
            index: 0,
            phase: Phase::TransformPosition,
            source: OperatorError::failed("bad axis"),
        };
        assert_eq!(err.kind(), ErrorKind::OperatorFailure);
        assert!(err.to_string().contains("transform_pos"));
        assert_eq!(err.source().unwrap().to_string(), "OP/EXEC: bad axis");
    }

    #[test]
    fn test_anyhow_conversion() {
        let err: OperatorError = anyhow::anyhow!("palette lookup failed").into();
        assert!(matches!(err, OperatorError::Other(_)));
        assert_eq!(err.to_string(), "palette lookup failed");
    }

    #[test]
    fn test_phase_serializes_by_name() {
        let json = serde_json::to_string(&Phase::TransformData).unwrap();
        assert_eq!(json, "\"TRANSFORM_DATA\"");
    }
}
