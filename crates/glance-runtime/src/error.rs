use std::fmt;

use glance_core::PolicyError;

/// Display sink write failure. A timeout counts the same as a write error
/// for degraded-state accounting.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkError {
    Write(String),
    Timeout,
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkError::Write(msg) => write!(f, "display write failed: {msg}"),
            SinkError::Timeout => write!(f, "display write timed out"),
        }
    }
}

impl std::error::Error for SinkError {}

/// Why the engine refused to start. These are the only fatal errors; once
/// running, everything is absorbed or degraded.
#[derive(Debug, Clone, PartialEq)]
pub enum StartError {
    Policy(PolicyError),
    DuplicateSource(String),
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartError::Policy(e) => write!(f, "invalid policy: {e}"),
            StartError::DuplicateSource(id) => {
                write!(f, "two adapters claim source id '{id}'")
            }
        }
    }
}

impl std::error::Error for StartError {}

impl From<PolicyError> for StartError {
    fn from(e: PolicyError) -> Self {
        StartError::Policy(e)
    }
}
