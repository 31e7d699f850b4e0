// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator channel and caption settings.

use keyrelay_core::{ChatRef, KeyrelayError, Keyboard, MessageId, UserId};
use keyrelay_storage::{OperatorProfile, Status};
use tracing::info;

use crate::caption::{self, escape_html};
use crate::engine::Engine;
use crate::ui;

impl Engine {
    /// Checks that a channel reference is well formed and that both the bot
    /// and the operator administer it.
    async fn validate_channel(&self, user: UserId, input: &str) -> Result<ChatRef, KeyrelayError> {
        let channel = ChatRef::parse_channel(input)?;
        let lookup_failed = |e: KeyrelayError| {
            KeyrelayError::Validation(format!("Could not check {channel}: {e}"))
        };

        let bot_admin = self
            .transport
            .is_admin(&channel, None)
            .await
            .map_err(lookup_failed)?;
        if !bot_admin {
            return Err(KeyrelayError::Validation(format!(
                "The bot is not an admin of {channel}."
            )));
        }
        let user_admin = self
            .transport
            .is_admin(&channel, Some(user))
            .await
            .map_err(lookup_failed)?;
        if !user_admin {
            return Err(KeyrelayError::Validation(format!(
                "You are not an admin of {channel}."
            )));
        }
        Ok(channel)
    }

    async fn update_profile(
        &self,
        user: UserId,
        update: impl FnOnce(&mut OperatorProfile),
    ) -> Result<(), KeyrelayError> {
        {
            let mut store = self.store.lock().await;
            let profile = store
                .profiles
                .get_mut(user)
                .ok_or_else(|| KeyrelayError::Precondition("Send /start first.".into()))?;
            update(profile);
            store.sessions.entry(user).status = Status::Normal;
        }
        self.persist().await;
        Ok(())
    }

    pub(crate) async fn apply_channel(&self, user: UserId, input: &str) -> Result<(), KeyrelayError> {
        let channel = self.validate_channel(user, input).await?;
        let text = format!(
            "✅ Channel set to <code>{}</code>.",
            escape_html(&channel.to_string())
        );
        info!(operator = %user, %channel, "channel set");
        self.update_profile(user, |p| p.channel = Some(channel))
            .await?;
        self.send(user, &text, None).await.map(drop)
    }

    pub(crate) async fn apply_caption(&self, user: UserId, text: &str) -> Result<(), KeyrelayError> {
        if !caption::has_placeholder(text) {
            return Err(KeyrelayError::Validation(
                "The caption must contain `Key -`.".into(),
            ));
        }
        info!(operator = %user, "caption set");
        let template = text.to_string();
        self.update_profile(user, |p| p.caption = Some(template))
            .await?;
        self.send(user, "✅ Caption saved.", None).await.map(drop)
    }

    pub(crate) async fn prompt_channel(
        &self,
        user: UserId,
        origin: Option<MessageId>,
    ) -> Result<(), KeyrelayError> {
        {
            let mut store = self.store.lock().await;
            store.sessions.entry(user).status = Status::WaitingChannel;
        }
        let keyboard = Keyboard::new().row([ui::back_button()]);
        self.show(
            user,
            origin,
            "📢 Send your channel as <code>@name</code> or <code>-100…</code>. The bot and you must be admins there.",
            Some(keyboard),
        )
        .await
        .map(drop)
    }

    pub(crate) async fn prompt_caption(
        &self,
        user: UserId,
        origin: Option<MessageId>,
    ) -> Result<(), KeyrelayError> {
        {
            let mut store = self.store.lock().await;
            store.sessions.entry(user).status = Status::WaitingCaption;
        }
        let keyboard = Keyboard::new().row([ui::back_button()]);
        self.show(
            user,
            origin,
            "📝 Send your caption. Put <code>Key -</code> where the key should go.",
            Some(keyboard),
        )
        .await
        .map(drop)
    }

    pub(crate) async fn reset_channel(
        &self,
        user: UserId,
        origin: Option<MessageId>,
    ) -> Result<(), KeyrelayError> {
        self.update_profile(user, |p| p.channel = None).await?;
        self.show(user, origin, "🧹 Channel removed.", None)
            .await
            .map(drop)
    }

    pub(crate) async fn reset_caption(
        &self,
        user: UserId,
        origin: Option<MessageId>,
    ) -> Result<(), KeyrelayError> {
        self.update_profile(user, |p| p.caption = None).await?;
        self.show(user, origin, "🧹 Caption removed.", None)
            .await
            .map(drop)
    }

    /// Clears channel and caption together.
    pub(crate) async fn reset_profile(&self, user: UserId) -> Result<(), KeyrelayError> {
        self.update_profile(user, |p| {
            p.channel = None;
            p.caption = None;
        })
        .await?;
        info!(operator = %user, "profile reset");
        let keyboard = ui::method_menu(self.is_owner(user).await);
        self.send(
            user,
            "🧹 <b>Your data is cleared.</b>\nNo channel or caption set.",
            Some(keyboard),
        )
        .await
        .map(drop)
    }
}
