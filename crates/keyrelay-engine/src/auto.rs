// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Auto-forward routing and the single-item pipelines (slots 1-3).

use std::sync::Arc;

use async_trait::async_trait;
use keyrelay_core::{
    ChannelPost, ChatRef, Countdown, CountdownHandle, CountdownObserver, CountdownOutcome,
    IncomingDocument, KeyrelayError, MessageId, Transport, UserId,
};
use keyrelay_storage::{AutoSetup, AutoSetupTable, SetupSlot};
use tracing::{debug, info, warn};

use crate::caption::{self, escape_html};
use crate::engine::Engine;
use crate::key;
use crate::ui;

/// Where a channel post goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    Batched,
    Single(SetupSlot),
    /// The source belongs to a slot that is switched off.
    Disabled(SetupSlot),
    Ignore,
}

/// Matches a post to a slot. The batched slot is checked first; among the
/// single slots the lowest enabled match wins.
pub(crate) fn route(setups: &AutoSetupTable, chat_id: i64, username: Option<&str>) -> Route {
    let from_source = |setup: &AutoSetup| {
        setup
            .source_channel
            .as_ref()
            .is_some_and(|source| source.matches(chat_id, username))
    };

    let batched = setups.get(SetupSlot::BATCHED);
    if batched.enabled && from_source(batched) {
        return Route::Batched;
    }
    if let Some(slot) = SetupSlot::SINGLE
        .into_iter()
        .find(|slot| setups.get(*slot).enabled && from_source(setups.get(*slot)))
    {
        return Route::Single(slot);
    }
    SetupSlot::ALL
        .into_iter()
        .find(|slot| from_source(setups.get(*slot)))
        .map_or(Route::Ignore, Route::Disabled)
}

/// Edits the owner's progress message while a verification wait runs.
pub(crate) struct ProgressBar {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) owner: UserId,
    pub(crate) message: Option<MessageId>,
    pub(crate) title: String,
    pub(crate) total: u32,
}

impl ProgressBar {
    pub(crate) fn render(&self, elapsed: u32) -> String {
        format!(
            "⏳ <b>{}</b>\n<code>[{}]</code>",
            self.title,
            ui::progress_bar(elapsed, self.total)
        )
    }
}

#[async_trait]
impl CountdownObserver for ProgressBar {
    async fn on_tick(&self, _handle: &CountdownHandle, remaining: u32) {
        let text = self.render(self.total.saturating_sub(remaining));
        let Some(message) = self.message else {
            return;
        };
        if let Err(e) = self
            .transport
            .edit_text(&self.owner.chat(), message, &text, None)
            .await
        {
            debug!(error = %e, "progress edit failed");
        }
    }

    async fn on_complete(&self, _handle: &CountdownHandle) {}
}

impl Engine {
    pub(crate) async fn route_channel_post(&self, post: ChannelPost) -> Result<(), KeyrelayError> {
        let route = {
            let store = self.store.lock().await;
            route(&store.setups, post.chat_id, post.chat_username.as_deref())
        };
        let source = post
            .chat_username
            .as_ref()
            .map(|u| format!("@{u}"))
            .unwrap_or_else(|| post.chat_id.to_string());

        let document = match (&route, &post.document) {
            (Route::Ignore, _) => {
                debug!(chat = post.chat_id, "post from an unconfigured channel ignored");
                return Ok(());
            }
            (_, Some(document)) if document.is_package() => document.clone(),
            _ => {
                debug!(%source, "non-package post on an auto source");
                self.notify_owner(&format!(
                    "⚠️ <b>Auto:</b> post from {} is not an APK. Declined.",
                    escape_html(&source)
                ))
                .await;
                return Ok(());
            }
        };

        match route {
            Route::Batched => self.auto4_enqueue(&post, &document).await,
            Route::Single(slot) => {
                let engine = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = engine.auto_single(slot, post, document).await {
                        engine
                            .report_failure(&format!("auto {slot}"), None, &e)
                            .await;
                    }
                });
                Ok(())
            }
            Route::Disabled(slot) => {
                info!(%slot, %source, "package on a disabled auto slot");
                self.notify_owner(&format!(
                    "⚠️ <b>Auto {slot} is off.</b> Post from {} declined.",
                    escape_html(&source)
                ))
                .await;
                Ok(())
            }
            Route::Ignore => Ok(()),
        }
    }

    /// One source post through the guard chain to the destination.
    pub(crate) async fn auto_single(
        &self,
        slot: SetupSlot,
        post: ChannelPost,
        document: IncomingDocument,
    ) -> Result<(), KeyrelayError> {
        let setup = {
            let store = self.store.lock().await;
            store.setups.get(slot).clone()
        };

        if let Some(range) = slot.size_range_mb()
            && !range.contains(&document.size_mb())
        {
            warn!(%slot, size_mb = document.size_mb(), "package size outside the slot range");
            self.notify_owner(&format!(
                "⚠️ <b>Auto {slot}:</b> APK size {:.1} MB is outside {}-{} MB. Declined.",
                document.size_mb(),
                range.start(),
                range.end()
            ))
            .await;
            return Ok(());
        }
        let Some(dest) = setup.dest_channel.clone() else {
            self.notify_owner(&format!(
                "⚠️ <b>Auto {slot}:</b> no destination set. Declined."
            ))
            .await;
            return Ok(());
        };

        let mut progress = ProgressBar {
            transport: Arc::clone(&self.transport),
            owner: self.owner,
            message: None,
            title: format!("Auto {slot} - Waiting..."),
            total: self.settings.verify_wait_secs,
        };
        let notice = self.notify_owner(&progress.render(0)).await;
        progress.message = notice;
        let wait = Countdown::new(self.settings.verify_wait_secs).with_tick(self.settings.tick);
        if wait.run(&CountdownHandle::new(), &progress).await != CountdownOutcome::Completed {
            return Ok(());
        }

        if !self.verify_source(&post.chat(), post.message_id).await {
            info!(%slot, message_id = %post.message_id, "source post deleted during wait");
            self.update_owner_notice(
                notice,
                &format!("❌ <b>Auto {slot} declined</b>\nThe post was deleted during the wait."),
            )
            .await;
            return Ok(());
        }

        let Some(key) =
            key::extract_key(document.caption_text(), &document.entities, setup.key_mode)
        else {
            self.update_owner_notice(
                notice,
                &format!("❌ <b>Auto {slot} declined</b>\nNo key found."),
            )
            .await;
            return Ok(());
        };

        let template = setup.dest_caption.clone().unwrap_or_default();
        let final_caption = caption::auto_caption(&template, &key, setup.style);
        let posted = match self
            .transport
            .send_document(&dest, &document.file, Some(&final_caption), true)
            .await
        {
            Ok(message) => message,
            Err(e) => {
                self.update_owner_notice(
                    notice,
                    &format!("❌ <b>Auto {slot}: sending failed.</b>\n<code>{}</code>", escape_html(&e.to_string())),
                )
                .await;
                return Err(e);
            }
        };

        {
            let mut store = self.store.lock().await;
            store.setups.get_mut(slot).completed_count += 1;
        }
        info!(%slot, %dest, message_id = %posted, "auto forward completed");
        self.persist().await;

        let source = post
            .chat_username
            .as_ref()
            .map(|u| format!("@{u}"))
            .unwrap_or_else(|| post.chat_id.to_string());
        let text = completion_notice(
            &format!("Auto {slot}"),
            &source,
            &dest,
            &key,
            dest.post_link(posted).as_deref(),
        );
        self.update_owner_notice(notice, &text).await;
        Ok(())
    }

    /// Forwards the source post to the owner to prove it still exists. The
    /// forwarded copy is removed again.
    pub(crate) async fn verify_source(&self, chat: &ChatRef, message: MessageId) -> bool {
        let owner = self.owner.chat();
        match self.transport.forward_message(&owner, chat, message).await {
            Ok(copy) => {
                self.delete_quietly(&owner, copy).await;
                true
            }
            Err(e) => {
                debug!(%chat, %message, error = %e, "verification forward failed");
                false
            }
        }
    }
}

pub(crate) fn completion_notice(
    title: &str,
    source: &str,
    dest: &ChatRef,
    key: &str,
    link: Option<&str>,
) -> String {
    let link = link.map_or_else(
        || "unavailable".to_string(),
        |url| format!("<a href=\"{url}\">Open</a>"),
    );
    format!(
        "✅ <b>{title} completed</b>\n├─ 👤 Source: <code>{}</code>\n├─ 🎯 Destination: <code>{}</code>\n├─ 📡 Key: <code>{}</code>\n└─ 🔗 Post: {link}",
        escape_html(source),
        escape_html(&dest.to_string()),
        escape_html(key),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> AutoSetupTable {
        let mut setups = AutoSetupTable::default();
        let first = setups.get_mut(SetupSlot::new(1).unwrap());
        first.source_channel = Some(ChatRef::Id(-1001));
        first.enabled = true;
        let second = setups.get_mut(SetupSlot::new(2).unwrap());
        second.source_channel = Some(ChatRef::Username("bigapps".into()));
        second.enabled = false;
        let batched = setups.get_mut(SetupSlot::BATCHED);
        batched.source_channel = Some(ChatRef::Id(-1004));
        batched.enabled = true;
        setups
    }

    #[test]
    fn routes_by_source() {
        let setups = table();
        assert_eq!(
            route(&setups, -1001, None),
            Route::Single(SetupSlot::new(1).unwrap())
        );
        assert_eq!(route(&setups, -1004, None), Route::Batched);
        assert_eq!(
            route(&setups, -1002, Some("BigApps")),
            Route::Disabled(SetupSlot::new(2).unwrap())
        );
        assert_eq!(route(&setups, -1009, Some("other")), Route::Ignore);
    }

    #[test]
    fn batched_slot_wins_over_single_slot_on_shared_source() {
        let mut setups = table();
        setups.get_mut(SetupSlot::BATCHED).source_channel = Some(ChatRef::Id(-1001));
        assert_eq!(route(&setups, -1001, None), Route::Batched);
        setups.get_mut(SetupSlot::BATCHED).enabled = false;
        assert_eq!(
            route(&setups, -1001, None),
            Route::Single(SetupSlot::new(1).unwrap())
        );
    }

    #[test]
    fn completion_notice_links_when_possible() {
        let dest = ChatRef::Username("drop".into());
        let text = completion_notice("Auto 1", "@src", &dest, "K<1>", Some("https://t.me/drop/5"));
        assert!(text.contains("K&lt;1&gt;"));
        assert!(text.contains("https://t.me/drop/5"));
        assert!(completion_notice("Auto 1", "@src", &dest, "K", None).contains("unavailable"));
    }
}
