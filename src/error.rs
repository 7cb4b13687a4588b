//! Error taxonomy for the approval engine
use super::code::Segment;
use super::status::Status;

/// Malformed or missing input. Always recoverable by the caller correcting the input.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("segment '{0}' has no value")]
    MissingSegment(Segment),
    #[error("segment '{segment}' value '{value}' is longer than {width} characters")]
    OversizedSegment {
        segment: Segment,
        value: String,
        width: usize,
    },
    #[error("segment '{segment}' value '{value}' must be alphanumeric")]
    InvalidSegment { segment: Segment, value: String },
    #[error("rejection reason must not be empty")]
    EmptyReason,
    #[error("transaction amount is set to zero")]
    ZeroAmount,
    #[error("actor level {0} is outside 0..=4")]
    InvalidActorLevel(u8),
    #[error("transaction is still a draft and has not been submitted for approval")]
    NotSubmitted,
    #[error("transaction must be approved before booking. Current status: {0}")]
    NotApproved(Status),
    #[error("transaction has already been submitted. Current status: {0}")]
    AlreadySubmitted(Status),
    #[error("transaction already carries unique code {0}")]
    CodeAlreadyFinalized(String),
    #[error("transaction has no unique code yet")]
    MissingCode,
    #[error("budget row {id}: remaining {remaining} exceeds allocated {allocated}")]
    RemainingExceedsAllocated {
        id: String,
        allocated: u64,
        remaining: u64,
    },
    #[error("malformed unique code '{0}'")]
    MalformedCode(String),
}

/// A constraint pattern that cannot be classified without guessing.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("pattern '{0}' has a '%' wildcard outside the leading or trailing position")]
    MisplacedWildcard(String),
}

/// Coarse classification of [`EngineError`], used by callers deciding how to surface a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Permission,
    StaleState,
    TerminalState,
    Pattern,
    SequenceExhausted,
    NotFound,
    Infrastructure,
}

#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("actor level {actor_level} may not act on a transaction pending level {required_level}")]
    Permission { actor_level: u8, required_level: u8 },
    #[error("transaction changed concurrently: expected version {expected}, found {actual}")]
    StaleState { expected: u64, actual: u64 },
    #[error("transaction already decided. Current status: {0}")]
    TerminalState(Status),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("sequence counter for scope {scope} is exhausted")]
    SequenceExhausted { scope: String },
    #[error("transaction {0} not found")]
    NotFound(String),
    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("failed to encode or decode a record: {0}")]
    Codec(String),
    #[error("failed to generate an identifier: {0}")]
    Identifier(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::Permission { .. } => ErrorKind::Permission,
            EngineError::StaleState { .. } => ErrorKind::StaleState,
            EngineError::TerminalState(_) => ErrorKind::TerminalState,
            EngineError::Pattern(_) => ErrorKind::Pattern,
            EngineError::SequenceExhausted { .. } => ErrorKind::SequenceExhausted,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Storage(_) | EngineError::Codec(_) | EngineError::Identifier(_) => {
                ErrorKind::Infrastructure
            }
        }
    }

    /// Only a lost compare-and-swap is worth retrying, and only after re-fetching.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::StaleState { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_stale_state_is_retryable() {
        let stale = EngineError::StaleState {
            expected: 1,
            actual: 2,
        };
        assert!(stale.is_retryable());
        assert_eq!(stale.kind(), ErrorKind::StaleState);

        let denied = EngineError::Permission {
            actor_level: 3,
            required_level: 2,
        };
        assert!(!denied.is_retryable());
        assert_eq!(denied.kind(), ErrorKind::Permission);
    }

    #[test]
    fn validation_message_names_segment() {
        let err: EngineError = ValidationError::MissingSegment(Segment::CostCenter).into();
        assert_eq!(err.to_string(), "segment 'costCenter' has no value");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
