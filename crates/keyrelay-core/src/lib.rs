// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for keyrelay.
//!
//! Holds the error taxonomy, typed identifiers, the outbound [`Transport`]
//! seam every flow talks through, and the cancellable countdown used by the
//! batched upload window and the deletion-verification waits.

pub mod countdown;
pub mod error;
pub mod traits;
pub mod types;

pub use countdown::{Countdown, CountdownHandle, CountdownObserver, CountdownOutcome, CountdownSlot};
pub use error::KeyrelayError;
pub use traits::Transport;
pub use types::{
    Button, ButtonAction, CaptionEntity, ChannelPost, ChatRef, EntityKind, FileRef, GroupItem,
    IncomingDocument, KEY_PLACEHOLDER, KeyMode, KeyStyle, Keyboard, MessageId, Sender,
    UploadMethod, UserId,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyrelay_error_has_all_variants() {
        let _config = KeyrelayError::Config("test".into());
        let _validation = KeyrelayError::Validation("test".into());
        let _precondition = KeyrelayError::Precondition("test".into());
        let _transport = KeyrelayError::Transport {
            message: "test".into(),
            source: None,
        };
        let _storage = KeyrelayError::storage(std::io::Error::other("test"));
        let _timeout = KeyrelayError::Timeout {
            duration: std::time::Duration::from_secs(20),
        };
        let _internal = KeyrelayError::Internal("test".into());
    }

    #[test]
    fn only_validation_and_precondition_are_operator_facing() {
        assert!(KeyrelayError::Validation("x".into()).is_operator_facing());
        assert!(KeyrelayError::Precondition("x".into()).is_operator_facing());
        assert!(!KeyrelayError::Internal("x".into()).is_operator_facing());
        assert!(!KeyrelayError::transport("send", std::io::Error::other("x")).is_operator_facing());
    }

    #[test]
    fn transport_error_keeps_source() {
        use std::error::Error as _;
        let err = KeyrelayError::transport("forward failed", std::io::Error::other("gone"));
        assert_eq!(err.to_string(), "transport error: forward failed");
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("gone"));
    }
}
