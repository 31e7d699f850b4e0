// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The batched auto-forward pipeline (slot 4).
//!
//! The first matching post opens a window; posts arriving before it closes
//! join the same batch. The window stays open through the settle delay and
//! closes only when the buffer is drained, in one step, so a failed run never
//! leaves items behind.

use std::sync::Arc;

use chrono::Utc;
use keyrelay_core::{
    ChannelPost, ChatRef, Countdown, CountdownHandle, CountdownOutcome, IncomingDocument,
    KeyrelayError, MessageId,
};
use keyrelay_storage::{PendingItem, SetupSlot};
use tracing::{debug, info, warn};

use crate::auto::{ProgressBar, completion_notice};
use crate::caption::{self, escape_html};
use crate::engine::Engine;
use crate::key;

impl Engine {
    pub(crate) async fn auto4_enqueue(
        &self,
        post: &ChannelPost,
        document: &IncomingDocument,
    ) -> Result<(), KeyrelayError> {
        let opened = {
            let mut store = self.store.lock().await;
            let batch = &mut store.auto4;
            batch.pending_apks.push(PendingItem {
                file: document.file.clone(),
                caption: document.caption_text().to_string(),
                message_id: post.message_id,
                chat_id: post.chat_id,
                received_at: Utc::now(),
                entities: document.entities.clone(),
            });
            debug!(items = batch.pending_apks.len(), "auto 4 item buffered");

            if batch.timer.current().is_some() {
                None
            } else {
                let handle = CountdownHandle::new();
                batch.timer.arm(handle.clone());
                batch.waiting_since = Some(Utc::now());
                Some(handle)
            }
        };

        if let Some(handle) = opened {
            info!("auto 4 window opened");
            let engine = self.clone();
            tokio::spawn(async move { engine.auto4_window(handle).await });
        }
        Ok(())
    }

    async fn auto4_window(&self, handle: CountdownHandle) {
        let mut progress = ProgressBar {
            transport: Arc::clone(&self.transport),
            owner: self.owner,
            message: None,
            title: "Auto 4 - Waiting...".to_string(),
            total: self.settings.verify_wait_secs,
        };
        let notice = self.notify_owner(&progress.render(0)).await;
        progress.message = notice;

        let window = Countdown::new(self.settings.verify_wait_secs).with_tick(self.settings.tick);
        if window.run(&handle, &progress).await != CountdownOutcome::Completed {
            debug!("auto 4 window cancelled");
            return;
        }
        tokio::time::sleep(self.settings.batch_settle).await;

        let items = {
            let mut store = self.store.lock().await;
            if !store.auto4.timer.release(&handle) {
                None
            } else {
                store.auto4.waiting_since = None;
                Some(std::mem::take(&mut store.auto4.pending_apks))
            }
        };
        let Some(items) = items else {
            debug!("auto 4 window closed while settling");
            return;
        };

        if let Err(e) = self.auto4_process(items, notice).await {
            self.report_failure("auto 4", None, &e).await;
        }
    }

    async fn auto4_process(
        &self,
        items: Vec<PendingItem>,
        notice: Option<MessageId>,
    ) -> Result<(), KeyrelayError> {
        let setup = {
            let store = self.store.lock().await;
            store.setups.get(SetupSlot::BATCHED).clone()
        };
        let received = items.len();

        let mut survivors = Vec::with_capacity(received);
        for item in items {
            if self
                .verify_source(&ChatRef::Id(item.chat_id), item.message_id)
                .await
            {
                survivors.push(item);
            } else {
                info!(message_id = %item.message_id, "auto 4 item deleted during wait");
            }
        }
        if survivors.is_empty() {
            self.update_owner_notice(notice, "❌ <b>Auto 4:</b> all APKs were deleted. Declined.")
                .await;
            return Ok(());
        }

        let key = if let [only] = survivors.as_slice() {
            key::extract_key(&only.caption, &only.entities, setup.key_mode)
        } else {
            tokio::time::sleep(self.settings.reverse_search_delay).await;
            survivors
                .iter()
                .rev()
                .find_map(|item| key::extract_key(&item.caption, &item.entities, setup.key_mode))
        };
        let Some(key) = key else {
            self.update_owner_notice(notice, "❌ <b>Auto 4:</b> no key found in any APK.")
                .await;
            return Ok(());
        };

        let (Some(dest), Some(template)) = (setup.dest_channel.clone(), setup.dest_caption.clone())
        else {
            self.update_owner_notice(
                notice,
                "❌ <b>Auto 4:</b> destination channel or caption missing.",
            )
            .await;
            return Ok(());
        };

        let final_caption = caption::batched_auto_caption(&template, &key, setup.style);
        let mut sent = Vec::with_capacity(survivors.len());
        for item in &survivors {
            match self
                .transport
                .send_document(&dest, &item.file, Some(&final_caption), false)
                .await
            {
                Ok(message) => sent.push(message),
                Err(e) => {
                    warn!(%dest, message_id = %item.message_id, error = %e, "auto 4 item not sent");
                    self.notify_owner(&format!(
                        "❌ <b>Auto 4:</b> failed to send an APK.\n<code>{}</code>",
                        escape_html(&e.to_string())
                    ))
                    .await;
                }
            }
        }
        if sent.is_empty() {
            self.update_owner_notice(notice, "❌ <b>Auto 4:</b> no APK could be sent.")
                .await;
            return Ok(());
        }

        {
            let mut store = self.store.lock().await;
            store.setups.get_mut(SetupSlot::BATCHED).completed_count += 1;
        }
        info!(%dest, received, sent = sent.len(), "auto 4 batch completed");
        self.persist().await;

        let source = setup
            .source_channel
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        let link = sent.first().and_then(|m| dest.post_link(*m));
        let text = completion_notice("Auto 4", &source, &dest, &key, link.as_deref());
        self.update_owner_notice(notice, &text).await;
        Ok(())
    }
}
