// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram adapter for keyrelay.
//!
//! Implements [`Transport`] for the Bot API via teloxide and runs the long
//! polling dispatcher that feeds private messages, button presses, and
//! channel posts into the [`Engine`](keyrelay_engine::Engine).

pub mod dispatch;
pub mod handler;

use async_trait::async_trait;
use keyrelay_config::model::TelegramConfig;
use keyrelay_core::{
    ButtonAction, ChatRef, FileRef, GroupItem, KeyrelayError, Keyboard, MessageId, Transport,
    UserId,
};
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, FileId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, InputMedia,
    InputMediaDocument, ParseMode, Recipient,
};
use tracing::{debug, warn};

pub use dispatch::{CallbackThrottle, run_dispatcher};

/// [`Transport`] over a teloxide [`Bot`]. All text goes out as HTML.
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    /// Creates a transport. Requires `config.bot_token` to be set.
    pub fn new(config: &TelegramConfig) -> Result<Self, KeyrelayError> {
        let token = config.bot_token.as_deref().ok_or_else(|| {
            KeyrelayError::Config("telegram.bot_token is required to serve".into())
        })?;
        if token.trim().is_empty() {
            return Err(KeyrelayError::Config(
                "telegram.bot_token cannot be empty".into(),
            ));
        }
        Ok(Self {
            bot: Bot::new(token.trim()),
        })
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }
}

fn recipient(chat: &ChatRef) -> Recipient {
    match chat {
        ChatRef::Id(id) => Recipient::Id(ChatId(*id)),
        ChatRef::Username(name) => Recipient::ChannelUsername(format!("@{name}")),
    }
}

fn tg_message(message: MessageId) -> teloxide::types::MessageId {
    teloxide::types::MessageId(message.0)
}

fn input_file(file: &FileRef) -> InputFile {
    InputFile::file_id(FileId(file.0.clone()))
}

/// Converts a keyboard to inline markup. URL buttons with unparsable links
/// are dropped.
fn markup(keyboard: Keyboard) -> InlineKeyboardMarkup {
    let rows = keyboard.rows.into_iter().map(|row| {
        row.into_iter()
            .filter_map(|button| match button.action {
                ButtonAction::Callback(data) => {
                    Some(InlineKeyboardButton::callback(button.label, data))
                }
                ButtonAction::Url(link) => match reqwest::Url::parse(&link) {
                    Ok(url) => Some(InlineKeyboardButton::url(button.label, url)),
                    Err(e) => {
                        warn!(link, error = %e, "dropping button with invalid url");
                        None
                    }
                },
            })
            .collect::<Vec<_>>()
    });
    InlineKeyboardMarkup::new(rows)
}

fn is_not_modified(err: &teloxide::RequestError) -> bool {
    err.to_string().contains("message is not modified")
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_text(
        &self,
        chat: &ChatRef,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<MessageId, KeyrelayError> {
        let mut request = self
            .bot
            .send_message(recipient(chat), text)
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(markup(keyboard));
        }
        let sent = request
            .await
            .map_err(|e| KeyrelayError::transport(format!("failed to send message to {chat}"), e))?;
        Ok(MessageId(sent.id.0))
    }

    async fn send_document(
        &self,
        chat: &ChatRef,
        file: &FileRef,
        caption: Option<&str>,
        silent: bool,
    ) -> Result<MessageId, KeyrelayError> {
        let mut request = self
            .bot
            .send_document(recipient(chat), input_file(file))
            .disable_notification(silent);
        if let Some(caption) = caption {
            request = request.caption(caption).parse_mode(ParseMode::Html);
        }
        let sent = request.await.map_err(|e| {
            KeyrelayError::transport(format!("failed to send document to {chat}"), e)
        })?;
        Ok(MessageId(sent.id.0))
    }

    async fn send_document_group(
        &self,
        chat: &ChatRef,
        items: &[GroupItem],
    ) -> Result<Vec<MessageId>, KeyrelayError> {
        let media = items.iter().map(|item| {
            let mut document = InputMediaDocument::new(input_file(&item.file));
            if let Some(caption) = &item.caption {
                document = document.caption(caption).parse_mode(ParseMode::Html);
            }
            InputMedia::Document(document)
        });
        let sent = self
            .bot
            .send_media_group(recipient(chat), media)
            .await
            .map_err(|e| {
                KeyrelayError::transport(format!("failed to send document group to {chat}"), e)
            })?;
        Ok(sent.into_iter().map(|m| MessageId(m.id.0)).collect())
    }

    async fn edit_text(
        &self,
        chat: &ChatRef,
        message: MessageId,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<(), KeyrelayError> {
        let mut request = self
            .bot
            .edit_message_text(recipient(chat), tg_message(message), text)
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(markup(keyboard));
        }
        match request.await {
            Ok(_) => Ok(()),
            Err(e) if is_not_modified(&e) => {
                debug!(%chat, %message, "edit skipped, message not modified");
                Ok(())
            }
            Err(e) => Err(KeyrelayError::transport(
                format!("failed to edit message {message} in {chat}"),
                e,
            )),
        }
    }

    async fn delete_message(
        &self,
        chat: &ChatRef,
        message: MessageId,
    ) -> Result<(), KeyrelayError> {
        self.bot
            .delete_message(recipient(chat), tg_message(message))
            .await
            .map_err(|e| {
                KeyrelayError::transport(format!("failed to delete message {message} in {chat}"), e)
            })?;
        Ok(())
    }

    async fn forward_message(
        &self,
        to: &ChatRef,
        from: &ChatRef,
        message: MessageId,
    ) -> Result<MessageId, KeyrelayError> {
        let forwarded = self
            .bot
            .forward_message(recipient(to), recipient(from), tg_message(message))
            .disable_notification(true)
            .await
            .map_err(|e| {
                KeyrelayError::transport(format!("failed to forward {message} from {from}"), e)
            })?;
        Ok(MessageId(forwarded.id.0))
    }

    async fn resolve_chat(&self, chat: &ChatRef) -> Result<i64, KeyrelayError> {
        if let ChatRef::Id(id) = chat {
            return Ok(*id);
        }
        let info = self
            .bot
            .get_chat(recipient(chat))
            .await
            .map_err(|e| KeyrelayError::transport(format!("failed to resolve {chat}"), e))?;
        Ok(info.id.0)
    }

    async fn is_admin(&self, chat: &ChatRef, user: Option<UserId>) -> Result<bool, KeyrelayError> {
        let user_id = match user {
            Some(user) => {
                let raw = u64::try_from(user.0).map_err(|_| {
                    KeyrelayError::Validation(format!("`{user}` is not a user id"))
                })?;
                teloxide::types::UserId(raw)
            }
            None => {
                self.bot
                    .get_me()
                    .await
                    .map_err(|e| KeyrelayError::transport("failed to fetch bot identity", e))?
                    .id
            }
        };
        let member = self
            .bot
            .get_chat_member(recipient(chat), user_id)
            .await
            .map_err(|e| {
                KeyrelayError::transport(format!("failed to look up membership in {chat}"), e)
            })?;
        Ok(member.is_privileged())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyrelay_core::Button;

    fn config(token: Option<&str>) -> TelegramConfig {
        TelegramConfig {
            bot_token: token.map(str::to_string),
            ..TelegramConfig::default()
        }
    }

    #[test]
    fn new_requires_bot_token() {
        assert!(matches!(
            TelegramTransport::new(&config(None)),
            Err(KeyrelayError::Config(_))
        ));
    }

    #[test]
    fn new_rejects_blank_token() {
        assert!(TelegramTransport::new(&config(Some("  "))).is_err());
    }

    #[test]
    fn new_accepts_valid_token() {
        assert!(TelegramTransport::new(&config(Some("123456:ABC-DEF1234ghIkl"))).is_ok());
    }

    #[test]
    fn usernames_become_channel_recipients() {
        assert_eq!(
            recipient(&ChatRef::Username("apkdrop".into())),
            Recipient::ChannelUsername("@apkdrop".into())
        );
        assert_eq!(
            recipient(&ChatRef::Id(-1001234)),
            Recipient::Id(ChatId(-1001234))
        );
    }

    #[test]
    fn markup_keeps_rows_and_drops_bad_links() {
        let keyboard = Keyboard::new()
            .row([Button::callback("Yes", "share_yes"), Button::callback("No", "share_no")])
            .row([
                Button::url("Open", "https://t.me/apkdrop/7"),
                Button::url("Broken", "not a url"),
            ]);
        let markup = markup(keyboard);
        assert_eq!(markup.inline_keyboard.len(), 2);
        assert_eq!(markup.inline_keyboard[0].len(), 2);
        assert_eq!(markup.inline_keyboard[1].len(), 1);
        assert_eq!(markup.inline_keyboard[1][0].text, "Open");
    }
}
