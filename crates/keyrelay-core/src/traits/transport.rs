// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound messaging primitives.

use async_trait::async_trait;

use crate::error::KeyrelayError;
use crate::types::{ChatRef, FileRef, GroupItem, Keyboard, MessageId, UserId};

/// The outbound half of the messaging platform.
///
/// Text is sent with HTML parse mode. Every call is fallible; callers decide
/// whether a failure is swallowed (UI refreshes) or surfaced (posting,
/// deleting, forwarding the actual package).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a text message, optionally with an inline keyboard.
    async fn send_text(
        &self,
        chat: &ChatRef,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<MessageId, KeyrelayError>;

    /// Sends a single document by file reference.
    async fn send_document(
        &self,
        chat: &ChatRef,
        file: &FileRef,
        caption: Option<&str>,
        silent: bool,
    ) -> Result<MessageId, KeyrelayError>;

    /// Sends documents as one grouped post. Returns ids in item order.
    async fn send_document_group(
        &self,
        chat: &ChatRef,
        items: &[GroupItem],
    ) -> Result<Vec<MessageId>, KeyrelayError>;

    /// Replaces the text (and keyboard) of an earlier message.
    ///
    /// Implementations treat "message is not modified" as success.
    async fn edit_text(
        &self,
        chat: &ChatRef,
        message: MessageId,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<(), KeyrelayError>;

    /// Deletes a message.
    async fn delete_message(&self, chat: &ChatRef, message: MessageId)
    -> Result<(), KeyrelayError>;

    /// Forwards `message` from `from` into `to`. Fails when the source
    /// message no longer exists.
    async fn forward_message(
        &self,
        to: &ChatRef,
        from: &ChatRef,
        message: MessageId,
    ) -> Result<MessageId, KeyrelayError>;

    /// Resolves a chat reference to its numeric id.
    async fn resolve_chat(&self, chat: &ChatRef) -> Result<i64, KeyrelayError>;

    /// Whether `user` (or the bot itself, for `None`) administers `chat`.
    async fn is_admin(&self, chat: &ChatRef, user: Option<UserId>) -> Result<bool, KeyrelayError>;
}
