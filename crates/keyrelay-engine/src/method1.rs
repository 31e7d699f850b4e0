// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Method 1: one file, one key, one confirmed post.

use chrono::Utc;
use keyrelay_core::{
    FileRef, IncomingDocument, KeyMode, KeyrelayError, MessageId, UploadMethod, UserId,
};
use keyrelay_storage::{PendingFile, PendingPost, PostRef};
use tracing::{debug, info};

use crate::caption::{self, escape_html};
use crate::engine::Engine;
use crate::key;
use crate::ui;

impl Engine {
    pub(crate) async fn m1_receive_file(
        &self,
        user: UserId,
        document: &IncomingDocument,
    ) -> Result<(), KeyrelayError> {
        let name = document.display_name().to_string();
        {
            let mut store = self.store.lock().await;
            let session = store.sessions.entry(user);
            session.tracking.last_apk_at = Some(Utc::now());
            session.tracking.last_method = Some(UploadMethod::Method1);
            session.pending_post = None;
        }

        match key::extract_key(document.caption_text(), &document.entities, KeyMode::Auto) {
            Some(key) => {
                debug!(operator = %user, "key found in caption");
                self.m1_prepare(user, document.file.clone(), &name, &key).await
            }
            None => {
                {
                    let mut store = self.store.lock().await;
                    let session = store.sessions.entry(user);
                    session.pending_file = Some(PendingFile {
                        file: document.file.clone(),
                        file_name: name.clone(),
                    });
                    session.waiting_key = true;
                }
                let text = format!(
                    "🔑 No key in the caption of <b>{}</b>.\nSend the key now.",
                    escape_html(&name)
                );
                self.send(user, &text, None).await.map(drop)
            }
        }
    }

    /// Takes the next text as the key for the stashed file. Any non-empty
    /// text is accepted.
    pub(crate) async fn m1_receive_key(
        &self,
        user: UserId,
        text: &str,
    ) -> Result<(), KeyrelayError> {
        if text.is_empty() {
            return Ok(());
        }
        let pending = {
            let mut store = self.store.lock().await;
            store.sessions.entry(user).pending_file.clone()
        };
        let pending = pending.ok_or_else(|| {
            KeyrelayError::Precondition("No file is waiting for a key. Send the APK again.".into())
        })?;
        self.m1_prepare(user, pending.file, &pending.file_name, text)
            .await
    }

    /// Composes the caption and asks for confirmation. Halts without
    /// touching the session when the channel or template is missing.
    async fn m1_prepare(
        &self,
        user: UserId,
        file: FileRef,
        file_name: &str,
        key: &str,
    ) -> Result<(), KeyrelayError> {
        let (channel, template) = {
            let store = self.store.lock().await;
            let profile = store.profiles.get(user);
            (
                profile.and_then(|p| p.channel.clone()),
                profile.and_then(|p| p.caption.clone()),
            )
        };
        let channel = channel.ok_or_else(|| {
            KeyrelayError::Precondition("Set your channel first with /setchannelid.".into())
        })?;
        let template = template.ok_or_else(|| {
            KeyrelayError::Precondition("Set your caption first with /setcaption.".into())
        })?;

        let caption = caption::single_caption(&template, key);
        let text = format!(
            "📤 <b>Share to {}?</b>\n📄 {}\n\n{caption}",
            escape_html(&channel.to_string()),
            escape_html(file_name)
        );
        let confirm = self.send(user, &text, Some(ui::share_prompt())).await?;

        let mut store = self.store.lock().await;
        let session = store.sessions.entry(user);
        session.pending_post = Some(PendingPost {
            file,
            caption,
            channel,
            confirm_message_id: Some(confirm),
        });
        session.pending_file = None;
        session.waiting_key = false;
        Ok(())
    }

    pub(crate) async fn m1_confirm(
        &self,
        user: UserId,
        origin: Option<MessageId>,
    ) -> Result<(), KeyrelayError> {
        let pending = {
            let mut store = self.store.lock().await;
            store.sessions.entry(user).pending_post.take()
        };
        let pending = pending
            .ok_or_else(|| KeyrelayError::Precondition("Nothing is waiting to be shared.".into()))?;

        let posted = match self
            .transport
            .send_document(&pending.channel, &pending.file, Some(&pending.caption), false)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                let mut store = self.store.lock().await;
                let session = store.sessions.entry(user);
                if session.pending_post.is_none() {
                    session.pending_post = Some(pending);
                }
                return Err(e);
            }
        };

        let link = pending.channel.post_link(posted);
        {
            let mut store = self.store.lock().await;
            let session = store.sessions.entry(user);
            session.stats.record(UploadMethod::Method1, 1, 1);
            session.last_post = Some(PostRef {
                channel: pending.channel.clone(),
                message_id: posted,
            });
            session.tracking.last_used_at = Some(Utc::now());
        }
        info!(operator = %user, channel = %pending.channel, message_id = %posted, "method 1 post sent");
        self.persist().await;

        self.show(
            user,
            origin,
            "✅ <b>Posted.</b>",
            Some(ui::posted_single(link.as_deref())),
        )
        .await
        .map(drop)
    }

    pub(crate) async fn m1_cancel(
        &self,
        user: UserId,
        origin: Option<MessageId>,
    ) -> Result<(), KeyrelayError> {
        {
            let mut store = self.store.lock().await;
            let session = store.sessions.entry(user);
            session.pending_post = None;
            session.pending_file = None;
            session.waiting_key = false;
        }
        self.show(user, origin, "❌ Cancelled.", None).await.map(drop)
    }

    pub(crate) async fn m1_delete_last(
        &self,
        user: UserId,
        origin: Option<MessageId>,
    ) -> Result<(), KeyrelayError> {
        let last = {
            let mut store = self.store.lock().await;
            store.sessions.entry(user).last_post.take()
        };
        let last =
            last.ok_or_else(|| KeyrelayError::Precondition("There is no post to delete.".into()))?;

        if let Err(e) = self
            .transport
            .delete_message(&last.channel, last.message_id)
            .await
        {
            let mut store = self.store.lock().await;
            store.sessions.entry(user).last_post.get_or_insert(last);
            return Err(e);
        }
        info!(operator = %user, channel = %last.channel, message_id = %last.message_id, "method 1 post deleted");
        self.persist().await;
        self.show(user, origin, "🗑 Post deleted.", None).await.map(drop)
    }
}
