//! Configuration errors.
//!
//! Runtime misuse (unknown ids, re-entrant triggers) is reported through
//! boolean returns and log lines instead; only loading/validating a
//! [`crate::MachineConfig`] can fail.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum MachineError {
    #[error("state machine config parse error: {0}")]
    Parse(String),

    #[error("state machine id must not be empty")]
    EmptyMachineId,

    #[error("state id must not be empty")]
    EmptyStateId,

    #[error("duplicate state id: {id}")]
    DuplicateState { id: String },

    #[error("initial state '{id}' is not registered")]
    UnknownInitialState { id: String },
}

impl From<serde_json::Error> for MachineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
