use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PostureError>;

#[derive(Error, Debug)]
pub enum PostureError {
    #[error("Inventory error in {file}: {message}")]
    Inventory { file: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Output error: {0}")]
    Output(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PostureError {
    pub fn exit_code(&self) -> i32 {
        2
    }
}

/// Error returned by a `Collector` call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectError {
    /// Timeout, throttling or a provider-side 5xx. Safe to retry.
    #[error("transient provider error in {operation}: {message}")]
    Transient { operation: String, message: String },

    /// The provider answered with a fault that means "nothing is configured"
    /// for this resource (e.g. a ValidationError on an absent setting).
    #[error("nothing configured for {resource}: {detail}")]
    NotConfigured { resource: String, detail: String },

    /// The response did not have the shape the caller expects.
    #[error("incompatible provider response from {operation}: {message}")]
    Contract { operation: String, message: String },
}

impl CollectError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// A provider rule that cannot be turned into a canonical `Rule`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("malformed rule on {owner_id}: {reason}")]
pub struct NormalizeError {
    pub owner_id: String,
    pub reason: String,
}

/// Unrecoverable failure of a single tester run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckError {
    #[error("{operation} still failing after {attempts} attempt(s): {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last: CollectError,
    },

    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("contract violation: {0}")]
    Contract(String),
}

impl CheckError {
    /// Short machine-readable kind, used in reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RetriesExhausted { .. } => "transient_provider_error",
            Self::DeadlineExceeded(_) => "deadline_exceeded",
            Self::Contract(_) => "contract_violation",
        }
    }
}
