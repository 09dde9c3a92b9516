//! Error kinds raised while building a configuration document.
//!
//! Every failure is fatal to the invocation. `main` wraps these in
//! `anyhow::Error` with context; tests match on the variants directly.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfgenError {
    /// Malformed or out-of-range user input (zero slowdown, unknown channel
    /// map, bad target regex, missing output directory, ...).
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// A constructed object does not satisfy the downstream schema.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Strict targeting only: a command addresses no module.
    #[error("command `{cmd}` target {target:?} matches no module")]
    UnmatchedTarget { cmd: String, target: String },

    /// A fault in the generator itself, such as a built-in pattern that does
    /// not compile.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ConfgenError {
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

pub type ConfgenResult<T> = std::result::Result<T, ConfgenError>;
