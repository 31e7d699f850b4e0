// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Method 2: batches of up to three files sharing one key.
//!
//! Files are collected behind a countdown that restarts on every arrival.
//! The third file, the countdown running out, or the operator pressing
//! "confirm" moves the batch to the key prompt. After the key, the operator
//! picks a style and sends; the posted batch can then be recaptioned or
//! deleted item by item.

use async_trait::async_trait;
use chrono::Utc;
use keyrelay_core::{
    Countdown, CountdownHandle, CountdownObserver, GroupItem, IncomingDocument, KeyStyle,
    KeyrelayError, MessageId, UploadMethod, UserId,
};
use keyrelay_storage::{PostedBatch, Status};
use tracing::{debug, info, warn};

use crate::caption::{self, RecaptionStrategy};
use crate::engine::Engine;
use crate::ui;

/// Most files one batch holds.
pub const MAX_BATCH: usize = 3;

/// Drives the on-screen countdown of one operator's batch.
struct BatchCountdown {
    engine: Engine,
    user: UserId,
}

#[async_trait]
impl CountdownObserver for BatchCountdown {
    async fn on_tick(&self, handle: &CountdownHandle, remaining: u32) {
        let engine = &self.engine;
        let (existing, files) = {
            let mut store = engine.store.lock().await;
            let session = store.sessions.entry(self.user);
            if !session.countdown.is_current(handle) {
                return;
            }
            (session.countdown_msg_id, session.session_filenames.clone())
        };
        let text = ui::countdown_text(&files, remaining);
        let keyboard = ui::countdown_keyboard(files.len());
        let chat = self.user.chat();

        if let Some(message) = existing {
            if let Err(e) = engine
                .transport
                .edit_text(&chat, message, &text, Some(keyboard))
                .await
            {
                debug!(operator = %self.user, remaining, error = %e, "countdown edit failed");
            }
            return;
        }

        match engine.transport.send_text(&chat, &text, Some(keyboard)).await {
            Ok(message) => {
                let orphaned = {
                    let mut store = engine.store.lock().await;
                    let session = store.sessions.entry(self.user);
                    if session.countdown.is_current(handle) && session.countdown_msg_id.is_none() {
                        session.countdown_msg_id = Some(message);
                        false
                    } else {
                        true
                    }
                };
                if orphaned {
                    engine.delete_quietly(&chat, message).await;
                }
            }
            Err(e) => debug!(operator = %self.user, error = %e, "countdown message failed"),
        }
    }

    async fn should_stop(&self, handle: &CountdownHandle) -> bool {
        let store = self.engine.store.lock().await;
        store.sessions.get(self.user).is_none_or(|session| {
            session.file_count() >= MAX_BATCH || !session.countdown.is_current(handle)
        })
    }

    async fn on_complete(&self, handle: &CountdownHandle) {
        if let Err(e) = self.engine.m2_countdown_elapsed(self.user, handle).await {
            self.engine
                .report_failure("method 2 countdown", Some(self.user), &e)
                .await;
        }
    }
}

impl Engine {
    pub(crate) async fn m2_receive_file(
        &self,
        user: UserId,
        document: &IncomingDocument,
    ) -> Result<(), KeyrelayError> {
        let name = document.display_name().to_string();
        let mut stale = Vec::new();

        let prompt = {
            let mut store = self.store.lock().await;
            let session = store.sessions.entry(user);

            if session.key_prompt_sent || session.waiting_key || session.saved_key.is_some() {
                debug!(operator = %user, "new file abandons the batch awaiting its key");
                stale.extend(session.clear_batch());
                stale.extend(session.preview_message_id.take());
                if session.status == Status::WaitingNewCaption {
                    session.status = Status::Normal;
                }
            } else if session.file_count() >= MAX_BATCH {
                debug!(operator = %user, "batch full, starting a new one");
                stale.extend(session.clear_batch());
            }

            session.push_file(document.file.clone(), &name);
            session.tracking.last_apk_at = Some(Utc::now());
            session.tracking.last_method = Some(UploadMethod::Method2);
            session.tracking.last_style = Some(session.key_mode);
            let count = session.file_count();
            debug!(operator = %user, items = count, "file added to batch");

            if count >= MAX_BATCH {
                session.countdown.cancel();
                stale.extend(session.countdown_msg_id.take());
                session.waiting_key = true;
                session.key_prompt_sent = true;
                Some(count)
            } else {
                let handle = Countdown::new(self.settings.countdown_secs)
                    .with_tick(self.settings.tick)
                    .spawn(BatchCountdown {
                        engine: self.clone(),
                        user,
                    });
                session.countdown.arm(handle);
                None
            }
        };

        for message in stale {
            self.delete_quietly(&user.chat(), message).await;
        }
        if let Some(count) = prompt {
            self.send(user, &ui::key_prompt(count), None).await?;
        }
        Ok(())
    }

    async fn m2_countdown_elapsed(
        &self,
        user: UserId,
        handle: &CountdownHandle,
    ) -> Result<(), KeyrelayError> {
        let (message, count) = {
            let mut store = self.store.lock().await;
            let session = store.sessions.entry(user);
            if !session.countdown.release(handle) || session.session_files.is_empty() {
                return Ok(());
            }
            session.waiting_key = true;
            session.key_prompt_sent = true;
            (session.countdown_msg_id.take(), session.file_count())
        };
        debug!(operator = %user, items = count, "countdown elapsed");
        if let Some(message) = message {
            self.delete_quietly(&user.chat(), message).await;
        }
        self.send(user, &ui::key_prompt(count), None).await.map(drop)
    }

    pub(crate) async fn m2_confirm_now(
        &self,
        user: UserId,
        origin: Option<MessageId>,
    ) -> Result<(), KeyrelayError> {
        let (message, count) = {
            let mut store = self.store.lock().await;
            let session = store.sessions.entry(user);
            if session.session_files.is_empty() {
                return Err(KeyrelayError::Precondition("No APKs to confirm.".into()));
            }
            if session.key_prompt_sent {
                return Ok(());
            }
            session.countdown.cancel();
            session.waiting_key = true;
            session.key_prompt_sent = true;
            (session.countdown_msg_id.take(), session.file_count())
        };
        if let Some(message) = message.filter(|m| Some(*m) != origin) {
            self.delete_quietly(&user.chat(), message).await;
        }
        self.show(user, origin, &ui::key_prompt(count), None)
            .await
            .map(drop)
    }

    pub(crate) async fn m2_erase(
        &self,
        user: UserId,
        origin: Option<MessageId>,
    ) -> Result<(), KeyrelayError> {
        let stale = {
            let mut store = self.store.lock().await;
            store.sessions.entry(user).erase_all()
        };
        for message in stale.into_iter().filter(|m| Some(*m) != origin) {
            self.delete_quietly(&user.chat(), message).await;
        }
        info!(operator = %user, "method 2 session erased");
        self.persist().await;
        self.show(
            user,
            origin,
            "🧹 Session cleared. Send APKs to start a new batch.",
            None,
        )
        .await
        .map(drop)
    }

    pub(crate) async fn m2_cancel(
        &self,
        user: UserId,
        origin: Option<MessageId>,
    ) -> Result<(), KeyrelayError> {
        let stale = {
            let mut store = self.store.lock().await;
            let session = store.sessions.entry(user);
            let mut stale: Vec<MessageId> = session.clear_batch().into_iter().collect();
            stale.extend(session.preview_message_id.take());
            if session.status == Status::WaitingNewCaption {
                session.status = Status::Normal;
            }
            stale
        };
        for message in stale.into_iter().filter(|m| Some(*m) != origin) {
            self.delete_quietly(&user.chat(), message).await;
        }
        self.show(user, origin, "❌ Batch cancelled.", None).await.map(drop)
    }

    /// Accepts the batch key. Only active while files are buffered and a key
    /// is expected.
    pub(crate) async fn m2_receive_key(
        &self,
        user: UserId,
        text: &str,
    ) -> Result<(), KeyrelayError> {
        if text.is_empty() {
            return Ok(());
        }
        let stale = {
            let mut store = self.store.lock().await;
            let session = store.sessions.entry(user);
            if session.session_files.is_empty() {
                debug!(operator = %user, "key ignored, no buffered files");
                return Ok(());
            }
            if session.saved_key.is_some()
                || !(session.waiting_key || session.countdown.is_active())
            {
                debug!(operator = %user, "text outside the key window ignored");
                return Ok(());
            }
            let len = text.chars().count();
            if !self.settings.key_len.contains(&len) {
                return Err(KeyrelayError::Validation(format!(
                    "Invalid key: it must be {} to {} characters long.",
                    self.settings.key_len.start(),
                    self.settings.key_len.end()
                )));
            }
            session.countdown.cancel();
            session.saved_key = Some(text.to_string());
            session.waiting_key = false;
            session.key_prompt_sent = false;
            session.countdown_msg_id.take()
        };
        info!(operator = %user, "method 2 key received");
        if let Some(message) = stale {
            self.delete_quietly(&user.chat(), message).await;
        }
        self.m2_render_panel(user, None).await
    }

    /// Shows the post-key control panel, replacing `origin` when given.
    pub(crate) async fn m2_render_panel(
        &self,
        user: UserId,
        origin: Option<MessageId>,
    ) -> Result<(), KeyrelayError> {
        let (files, key, style, template) = {
            let mut store = self.store.lock().await;
            let template = store.profiles.get(user).and_then(|p| p.caption.clone());
            let session = store.sessions.entry(user);
            if session.status == Status::WaitingNewCaption {
                session.status = Status::Normal;
            }
            let key = session
                .saved_key
                .clone()
                .ok_or_else(|| KeyrelayError::Precondition("Send the key first.".into()))?;
            (session.session_filenames.clone(), key, session.key_mode, template)
        };
        let (text, keyboard) = ui::key_panel(&files, &key, style, template.as_deref());
        let panel = self.show(user, origin, &text, Some(keyboard)).await?;

        let previous = {
            let mut store = self.store.lock().await;
            store
                .sessions
                .entry(user)
                .preview_message_id
                .replace(panel)
        };
        if let Some(previous) = previous.filter(|p| *p != panel) {
            self.delete_quietly(&user.chat(), previous).await;
        }
        Ok(())
    }

    pub(crate) async fn m2_set_style(
        &self,
        user: UserId,
        origin: Option<MessageId>,
        style: KeyStyle,
    ) -> Result<(), KeyrelayError> {
        {
            let mut store = self.store.lock().await;
            let session = store.sessions.entry(user);
            if session.saved_key.is_none() {
                return Err(KeyrelayError::Precondition("Send the key first.".into()));
            }
            session.key_mode = style;
            session.tracking.last_style = Some(style);
        }
        debug!(operator = %user, %style, "batch style changed");
        self.m2_render_panel(user, origin).await
    }

    pub(crate) async fn m2_edit_caption(
        &self,
        user: UserId,
        origin: Option<MessageId>,
    ) -> Result<(), KeyrelayError> {
        {
            let mut store = self.store.lock().await;
            let session = store.sessions.entry(user);
            if session.saved_key.is_none() {
                return Err(KeyrelayError::Precondition("Send the key first.".into()));
            }
            session.status = Status::WaitingNewCaption;
        }
        self.show(user, origin, &ui::caption_request(), Some(ui::back_to_panel()))
            .await
            .map(drop)
    }

    /// Stores a replacement template typed after "edit caption".
    pub(crate) async fn replace_batch_caption(
        &self,
        user: UserId,
        text: &str,
    ) -> Result<(), KeyrelayError> {
        if !caption::has_placeholder(text) {
            return Err(KeyrelayError::Validation(
                "The caption must contain `Key -`.".into(),
            ));
        }
        {
            let mut store = self.store.lock().await;
            let profile = store.profiles.get_mut(user).ok_or_else(|| {
                KeyrelayError::Precondition("Send /start first.".into())
            })?;
            profile.caption = Some(text.to_string());
            store.sessions.entry(user).status = Status::Normal;
        }
        info!(operator = %user, "caption replaced from batch panel");
        self.persist().await;
        self.m2_render_panel(user, None).await
    }

    pub(crate) async fn m2_preview(
        &self,
        user: UserId,
        origin: Option<MessageId>,
    ) -> Result<(), KeyrelayError> {
        let (files, key, style, template) = {
            let mut store = self.store.lock().await;
            let template = store.profiles.get(user).and_then(|p| p.caption.clone());
            let session = store.sessions.entry(user);
            let key = session
                .saved_key
                .clone()
                .ok_or_else(|| KeyrelayError::Precondition("Send the key first.".into()))?;
            (session.session_filenames.clone(), key, session.key_mode, template)
        };
        let template = template.ok_or_else(|| {
            KeyrelayError::Precondition("Set your caption first with /setcaption.".into())
        })?;
        let captions = caption::batch_captions(files.len(), &template, &key, style);
        let (text, keyboard) = ui::preview(&files, &captions);
        self.show(user, origin, &text, Some(keyboard)).await.map(drop)
    }

    /// Posts every buffered file. A failed item rolls back the items already
    /// sent and leaves the batch intact for a retry.
    pub(crate) async fn m2_send(
        &self,
        user: UserId,
        origin: Option<MessageId>,
    ) -> Result<(), KeyrelayError> {
        let (files, names, key, style, channel, template) = {
            let mut store = self.store.lock().await;
            let profile = store.profiles.get(user).cloned();
            let session = store.sessions.entry(user);
            let key = session
                .saved_key
                .clone()
                .ok_or_else(|| KeyrelayError::Precondition("Send the key first.".into()))?;
            if session.session_files.is_empty() {
                return Err(KeyrelayError::Precondition("No APKs in this batch.".into()));
            }
            let channel = profile.as_ref().and_then(|p| p.channel.clone()).ok_or_else(|| {
                KeyrelayError::Precondition("Set your channel first with /setchannelid.".into())
            })?;
            let template = profile.and_then(|p| p.caption).ok_or_else(|| {
                KeyrelayError::Precondition("Set your caption first with /setcaption.".into())
            })?;
            (
                session.session_files.clone(),
                session.session_filenames.clone(),
                key,
                session.key_mode,
                channel,
                template,
            )
        };

        let captions = caption::batch_captions(files.len(), &template, &key, style);
        let mut sent = Vec::with_capacity(files.len());
        for (file, caption) in files.iter().zip(&captions) {
            match self
                .transport
                .send_document(&channel, file, Some(caption), false)
                .await
            {
                Ok(message) => sent.push(message),
                Err(e) => {
                    warn!(operator = %user, %channel, sent = sent.len(), "batch send failed, rolling back");
                    for message in sent {
                        self.delete_quietly(&channel, message).await;
                    }
                    return Err(e);
                }
            }
        }

        let link = sent.first().and_then(|m| channel.post_link(*m));
        let batch = PostedBatch {
            file_ids: files,
            filenames: names,
            key,
            key_mode: style,
            caption_template: template,
            channel,
            post_message_ids: sent,
        };
        let stale = {
            let mut store = self.store.lock().await;
            let session = store.sessions.entry(user);
            session
                .stats
                .record(UploadMethod::Method2, batch.file_ids.len() as u64, 1);
            session.set_posted(batch.clone(), link.clone());
            session.tracking.last_used_at = Some(Utc::now());
            let mut stale: Vec<MessageId> = session.clear_batch().into_iter().collect();
            stale.extend(session.preview_message_id.take());
            stale
        };
        info!(
            operator = %user,
            channel = %batch.channel,
            items = batch.post_message_ids.len(),
            "method 2 batch posted"
        );
        self.persist().await;

        for message in stale.into_iter().filter(|m| Some(*m) != origin) {
            self.delete_quietly(&user.chat(), message).await;
        }
        let (text, keyboard) = ui::manage_panel(&batch, link.as_deref());
        self.show(user, origin, &text, Some(keyboard)).await.map(drop)
    }

    /// Replaces the posted batch with a fresh grouped post.
    pub(crate) async fn m2_recaption(
        &self,
        user: UserId,
        origin: Option<MessageId>,
        strategy: RecaptionStrategy,
    ) -> Result<(), KeyrelayError> {
        let (batch, old) = {
            let mut store = self.store.lock().await;
            let session = store.sessions.entry(user);
            let batch = session.last_post_session.clone().ok_or_else(|| {
                KeyrelayError::Precondition("No posted batch to recaption.".into())
            })?;
            (batch, session.posted_ids())
        };

        let captions = strategy.captions(
            batch.file_ids.len(),
            &batch.caption_template,
            &batch.key,
            batch.key_mode,
        );
        let items: Vec<GroupItem> = batch
            .file_ids
            .iter()
            .cloned()
            .zip(captions)
            .map(|(file, caption)| GroupItem { file, caption })
            .collect();
        let fresh = self
            .transport
            .send_document_group(&batch.channel, &items)
            .await?;

        for message in old {
            if let Err(e) = self.transport.delete_message(&batch.channel, message).await {
                warn!(operator = %user, channel = %batch.channel, %message, error = %e, "old post not deleted");
            }
        }

        let link = fresh.first().and_then(|m| batch.channel.post_link(*m));
        let batch = PostedBatch {
            post_message_ids: fresh,
            ..batch
        };
        {
            let mut store = self.store.lock().await;
            store
                .sessions
                .entry(user)
                .set_posted(batch.clone(), link.clone());
        }
        info!(operator = %user, %strategy, items = batch.post_message_ids.len(), "batch recaptioned");
        self.persist().await;

        let (text, keyboard) = ui::manage_panel(&batch, link.as_deref());
        self.show(user, origin, &text, Some(keyboard)).await.map(drop)
    }

    pub(crate) async fn m2_delete_menu(
        &self,
        user: UserId,
        origin: Option<MessageId>,
    ) -> Result<(), KeyrelayError> {
        let batch = self.posted_batch(user).await?;
        let (text, keyboard) = ui::delete_menu(&batch.filenames);
        self.show(user, origin, &text, Some(keyboard)).await.map(drop)
    }

    /// Deletes item `index` (1-based, against the compacted list).
    pub(crate) async fn m2_delete_posted(
        &self,
        user: UserId,
        origin: Option<MessageId>,
        index: usize,
    ) -> Result<(), KeyrelayError> {
        let slot = index.saturating_sub(1);
        let (channel, target) = {
            let mut store = self.store.lock().await;
            let session = store.sessions.entry(user);
            let channel = session
                .last_post_session
                .as_ref()
                .map(|b| b.channel.clone())
                .ok_or_else(|| KeyrelayError::Precondition("No posted batch.".into()))?;
            let target = session
                .apk_posts
                .get(slot)
                .copied()
                .flatten()
                .ok_or_else(|| KeyrelayError::Precondition("That item is already gone.".into()))?;
            (channel, target)
        };

        if let Err(e) = self.transport.delete_message(&channel, target).await {
            warn!(operator = %user, %channel, message = %target, error = %e, "posted item not deleted");
        }

        let remaining = {
            let mut store = self.store.lock().await;
            let session = store.sessions.entry(user);
            if session.apk_posts.get(slot).copied().flatten() == Some(target) {
                session.remove_posted(slot);
            }
            session.last_post_session.clone()
        };
        info!(operator = %user, index, "posted item deleted");
        self.persist().await;

        match remaining {
            Some(batch) => {
                let (text, keyboard) = ui::delete_menu(&batch.filenames);
                self.show(user, origin, &text, Some(keyboard)).await.map(drop)
            }
            None => self
                .show(user, origin, "✅ Batch fully cleared.", None)
                .await
                .map(drop),
        }
    }

    pub(crate) async fn m2_back_to_manage(
        &self,
        user: UserId,
        origin: Option<MessageId>,
    ) -> Result<(), KeyrelayError> {
        let batch = self.posted_batch(user).await?;
        let link = {
            let store = self.store.lock().await;
            store
                .sessions
                .get(user)
                .and_then(|s| s.last_post_link.clone())
        };
        let (text, keyboard) = ui::manage_panel(&batch, link.as_deref());
        self.show(user, origin, &text, Some(keyboard)).await.map(drop)
    }

    async fn posted_batch(&self, user: UserId) -> Result<PostedBatch, KeyrelayError> {
        let store = self.store.lock().await;
        store
            .sessions
            .get(user)
            .and_then(|s| s.last_post_session.clone())
            .ok_or_else(|| KeyrelayError::Precondition("No posted batch.".into()))
    }
}
