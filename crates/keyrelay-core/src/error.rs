// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types shared by every keyrelay crate.

use thiserror::Error;

/// The primary error type returned by transport calls and state transitions.
#[derive(Debug, Error)]
pub enum KeyrelayError {
    /// Configuration errors (invalid TOML, missing bot token, bad owner id).
    #[error("configuration error: {0}")]
    Config(String),

    /// Operator input that failed validation (channel id, caption template, key length).
    #[error("invalid input: {0}")]
    Validation(String),

    /// A flow was asked to advance without the data it needs.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Messaging transport errors (send, edit, delete, forward).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Snapshot read, write, or (de)serialization failure.
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl KeyrelayError {
    /// Wraps a transport failure together with the call that produced it.
    pub fn transport<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Wraps a storage failure.
    pub fn storage<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage {
            source: Box::new(source),
        }
    }

    /// True for errors that are answered to the operator and never escalated.
    pub fn is_operator_facing(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Precondition(_))
    }

    /// The short text shown to the operator for operator-facing errors.
    pub fn operator_message(&self) -> Option<&str> {
        match self {
            Self::Validation(msg) | Self::Precondition(msg) => Some(msg),
            _ => None,
        }
    }
}
