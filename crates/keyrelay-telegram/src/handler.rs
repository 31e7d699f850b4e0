// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversion of teloxide updates into the engine's inbound types.

use keyrelay_core::{
    CaptionEntity, ChannelPost, EntityKind, FileRef, IncomingDocument, MessageId, Sender, UserId,
};
use teloxide::types::{ChatKind, Message, MessageEntity, MessageEntityKind, User};

/// Whether the message was sent in a private chat with the bot.
pub fn is_private(msg: &Message) -> bool {
    matches!(msg.chat.kind, ChatKind::Private(_))
}

pub fn sender_of(user: &User) -> Sender {
    Sender {
        id: UserId(user.id.0 as i64),
        first_name: user.first_name.clone(),
        username: user.username.clone(),
    }
}

fn entity_of(entity: &MessageEntity) -> CaptionEntity {
    let kind = match entity.kind {
        MessageEntityKind::Code => EntityKind::Code,
        MessageEntityKind::Pre { .. } => EntityKind::Pre,
        _ => EntityKind::Other,
    };
    CaptionEntity {
        kind,
        offset: entity.offset,
        length: entity.length,
    }
}

/// The attached document, with its caption and caption annotations.
/// Offsets stay in UTF-16 code units as the Bot API reports them.
pub fn document_of(msg: &Message) -> Option<IncomingDocument> {
    let doc = msg.document()?;
    Some(IncomingDocument {
        file: FileRef::new(doc.file.id.0.clone()),
        file_name: doc.file_name.clone(),
        size_bytes: u64::from(doc.file.size),
        caption: msg.caption().map(str::to_string),
        entities: msg
            .caption_entities()
            .map(|entities| entities.iter().map(entity_of).collect())
            .unwrap_or_default(),
    })
}

pub fn channel_post_of(msg: &Message) -> ChannelPost {
    ChannelPost {
        chat_id: msg.chat.id.0,
        chat_username: msg.chat.username().map(str::to_string),
        message_id: MessageId(msg.id.0),
        document: document_of(msg),
    }
}
