// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound event builders.

use keyrelay_core::{CaptionEntity, ChannelPost, FileRef, IncomingDocument, MessageId, Sender, UserId};

/// A private-chat sender.
pub fn sender(id: i64, first_name: &str) -> Sender {
    Sender {
        id: UserId(id),
        first_name: first_name.to_string(),
        username: None,
    }
}

/// A package document of `size_mb` mebibytes.
pub fn apk(file_id: &str, file_name: &str, size_mb: f64, caption: Option<&str>) -> IncomingDocument {
    IncomingDocument {
        file: FileRef::new(file_id),
        file_name: Some(file_name.to_string()),
        size_bytes: (size_mb * 1024.0 * 1024.0) as u64,
        caption: caption.map(str::to_string),
        entities: Vec::new(),
    }
}

/// Same as [`apk`], with code annotations over the caption.
pub fn apk_with_entities(
    file_id: &str,
    file_name: &str,
    caption: &str,
    entities: Vec<CaptionEntity>,
) -> IncomingDocument {
    IncomingDocument {
        entities,
        ..apk(file_id, file_name, 5.0, Some(caption))
    }
}

/// A post in channel `chat_id`.
pub fn channel_post(chat_id: i64, message_id: i32, document: Option<IncomingDocument>) -> ChannelPost {
    ChannelPost {
        chat_id,
        chat_username: None,
        message_id: MessageId(message_id),
        document,
    }
}
