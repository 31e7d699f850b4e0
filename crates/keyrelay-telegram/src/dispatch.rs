// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long polling dispatcher.
//!
//! Routes private messages, button presses, and channel posts to the
//! [`Engine`]. Handler failures are reported through
//! [`Engine::report_failure`] and the update is dropped.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use keyrelay_core::{MessageId, UserId};
use keyrelay_engine::Engine;
use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::handler;

/// Drops button presses that come in faster than the cooldown.
#[derive(Debug)]
pub struct CallbackThrottle {
    cooldown: Duration,
    last_press: DashMap<UserId, Instant>,
}

impl CallbackThrottle {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_press: DashMap::new(),
        }
    }

    /// Records a press at `now`. Returns false when it follows the previous
    /// accepted press by less than the cooldown.
    pub fn admit(&self, user: UserId, now: Instant) -> bool {
        if self.cooldown.is_zero() {
            return true;
        }
        match self.last_press.entry(user) {
            Entry::Occupied(mut last) => {
                if now.saturating_duration_since(*last.get()) < self.cooldown {
                    false
                } else {
                    last.insert(now);
                    true
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }
}

/// Polls for updates until `cancel` fires or the dispatcher stops.
pub async fn run_dispatcher(
    bot: Bot,
    engine: Engine,
    throttle: Arc<CallbackThrottle>,
    cancel: CancellationToken,
) {
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(on_message))
        .branch(Update::filter_callback_query().endpoint(on_callback))
        .branch(Update::filter_channel_post().endpoint(on_channel_post));

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![engine, throttle])
        .default_handler(|_| async {})
        .build();

    let shutdown = dispatcher.shutdown_token();
    let watcher = tokio::spawn(async move {
        cancel.cancelled().await;
        match shutdown.shutdown() {
            Ok(stopped) => stopped.await,
            Err(e) => debug!(error = %e, "dispatcher was not running"),
        }
    });

    info!("starting Telegram long polling");
    dispatcher.dispatch().await;
    watcher.abort();
    info!("Telegram long polling stopped");
}

async fn on_message(msg: Message, engine: Engine) -> ResponseResult<()> {
    if !handler::is_private(&msg) {
        debug!(chat_id = msg.chat.id.0, "ignoring non-private message");
        return Ok(());
    }
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let from = handler::sender_of(user);

    let result = if let Some(document) = handler::document_of(&msg) {
        engine.handle_document(&from, &document).await
    } else if let Some(text) = msg.text() {
        engine.handle_text(&from, text).await
    } else {
        debug!(msg_id = msg.id.0, "ignoring unsupported message type");
        return Ok(());
    };

    if let Err(e) = result {
        engine.report_failure("message", Some(from.id), &e).await;
    }
    Ok(())
}

async fn on_callback(
    bot: Bot,
    query: CallbackQuery,
    engine: Engine,
    throttle: Arc<CallbackThrottle>,
) -> ResponseResult<()> {
    let from = handler::sender_of(&query.from);

    if !throttle.admit(from.id, Instant::now()) {
        debug!(user = %from.id, "button press throttled");
        if let Err(e) = bot
            .answer_callback_query(query.id.clone())
            .text("⏳ Slow down.")
            .await
        {
            debug!(error = %e, "failed to answer throttled button press");
        }
        return Ok(());
    }
    if let Err(e) = bot.answer_callback_query(query.id.clone()).await {
        debug!(error = %e, "failed to answer button press");
    }

    let Some(payload) = query.data.as_deref() else {
        return Ok(());
    };
    let origin = query.message.as_ref().map(|m| MessageId(m.id().0));
    if let Err(e) = engine.handle_callback(&from, payload, origin).await {
        engine.report_failure("callback", Some(from.id), &e).await;
    }
    Ok(())
}

async fn on_channel_post(msg: Message, engine: Engine) -> ResponseResult<()> {
    let post = handler::channel_post_of(&msg);
    let chat_id = post.chat_id;
    if let Err(e) = engine.handle_channel_post(post).await {
        debug!(chat_id, "channel post handler failed");
        engine.report_failure("channel post", None, &e).await;
    }
    Ok(())
}
