// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The engine handle and inbound event routing.
//!
//! Every public `handle_*` method corresponds to one kind of inbound update.
//! Validation and precondition errors are answered to the operator here;
//! anything else is returned to the dispatcher, which hands it to
//! [`Engine::report_failure`].

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use keyrelay_config::KeyrelayConfig;
use keyrelay_core::{
    ChannelPost, ChatRef, IncomingDocument, KeyrelayError, Keyboard, MessageId, Sender, Transport,
    UploadMethod, UserId,
};
use keyrelay_storage::{SnapshotFiles, Status, Store};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::action::Action;
use crate::alerts::OwnerAlerter;
use crate::ui;

/// Timing and validation knobs.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Method 2 collection window.
    pub countdown_secs: u32,
    /// Auto-forward deletion-verification wait, also the Auto 4 window.
    pub verify_wait_secs: u32,
    pub tick: Duration,
    pub batch_settle: Duration,
    pub reverse_search_delay: Duration,
    pub alert_cooldown: Duration,
    /// Accepted Method 2 key length in characters.
    pub key_len: RangeInclusive<usize>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            countdown_secs: 10,
            verify_wait_secs: 20,
            tick: Duration::from_secs(1),
            batch_settle: Duration::from_secs(1),
            reverse_search_delay: Duration::from_secs(3),
            alert_cooldown: Duration::from_secs(30),
            key_len: 4..=30,
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &KeyrelayConfig) -> Self {
        let timing = &config.timing;
        Self {
            countdown_secs: timing.countdown_secs,
            verify_wait_secs: timing.verify_wait_secs,
            tick: Duration::from_secs(1),
            batch_settle: Duration::from_secs(timing.batch_settle_secs),
            reverse_search_delay: Duration::from_secs(timing.reverse_search_delay_secs),
            alert_cooldown: Duration::from_secs(timing.alert_cooldown_secs),
            key_len: config.keys.min_len..=config.keys.max_len,
        }
    }
}

/// Cheaply cloneable handle to the shared tables and the transport.
#[derive(Clone)]
pub struct Engine {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) store: Arc<Mutex<Store>>,
    pub(crate) snapshots: Option<Arc<SnapshotFiles>>,
    pub(crate) alerts: Arc<OwnerAlerter>,
    pub(crate) settings: Arc<EngineSettings>,
    pub(crate) owner: UserId,
    pub(crate) started: tokio::time::Instant,
}

impl Engine {
    /// Builds an engine over a loaded store. Without `snapshots` nothing is
    /// persisted.
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Store,
        snapshots: Option<Arc<SnapshotFiles>>,
        settings: EngineSettings,
    ) -> Self {
        let owner = store.access.owner;
        let alerts = Arc::new(OwnerAlerter::new(
            Arc::clone(&transport),
            owner,
            settings.alert_cooldown,
        ));
        Self {
            transport,
            store: Arc::new(Mutex::new(store)),
            snapshots,
            alerts,
            settings: Arc::new(settings),
            owner,
            started: tokio::time::Instant::now(),
        }
    }

    pub fn store(&self) -> &Arc<Mutex<Store>> {
        &self.store
    }

    pub fn owner(&self) -> UserId {
        self.owner
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Time since the engine was built.
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Flushes both snapshots. Failures are logged; the next autosave retries.
    pub async fn persist(&self) {
        let Some(files) = &self.snapshots else {
            return;
        };
        if let Err(e) = files.flush_store(&self.store).await {
            warn!(error = %e, "snapshot flush failed");
        }
    }

    /// Handles a private text message or command.
    pub async fn handle_text(&self, from: &Sender, text: &str) -> Result<(), KeyrelayError> {
        if !self.admit(from).await? {
            return Ok(());
        }
        let result = self.route_text(from, text.trim()).await;
        self.settle(from.id, result).await
    }

    /// Handles a document sent in a private chat.
    pub async fn handle_document(
        &self,
        from: &Sender,
        document: &IncomingDocument,
    ) -> Result<(), KeyrelayError> {
        if !self.admit(from).await? {
            return Ok(());
        }
        let result = self.route_document(from.id, document).await;
        self.settle(from.id, result).await
    }

    /// Handles a button press. `origin` is the message carrying the button.
    pub async fn handle_callback(
        &self,
        from: &Sender,
        payload: &str,
        origin: Option<MessageId>,
    ) -> Result<(), KeyrelayError> {
        if !self.admit(from).await? {
            return Ok(());
        }
        let action = match payload.parse::<Action>() {
            Ok(action) => action,
            Err(e) => {
                debug!(operator = %from.id, payload, error = %e, "ignoring unknown button");
                return Ok(());
            }
        };
        debug!(operator = %from.id, %action, "button pressed");
        let result = self.route_action(from.id, action, origin).await;
        self.settle(from.id, result).await
    }

    /// Handles a post in a channel the bot can see.
    pub async fn handle_channel_post(&self, post: ChannelPost) -> Result<(), KeyrelayError> {
        self.route_channel_post(post).await
    }

    /// Logs a handler failure, alerts the owner, and tells the user something
    /// went wrong. Never fails.
    pub async fn report_failure(
        &self,
        context: &str,
        user: Option<UserId>,
        err: &KeyrelayError,
    ) {
        error!(context, user = ?user.map(|u| u.0), error = %err, "handler failed");
        self.alerts.report(context, err).await;
        if let Some(user) = user
            && user != self.owner
            && let Err(e) = self
                .transport
                .send_text(&user.chat(), "⚠️ Something went wrong. Please try again.", None)
                .await
        {
            debug!(error = %e, "failed to tell user about failure");
        }
    }

    /// Registers the sender and checks access. Rejected users get a short
    /// reply and `false`.
    async fn admit(&self, from: &Sender) -> Result<bool, KeyrelayError> {
        let (registered, admitted, bot_active, admin_link) = {
            let mut store = self.store.lock().await;
            let registered = store.profiles.register(from, Utc::now());
            (
                registered,
                store.access.admits(from.id),
                store.access.bot_active,
                store.access.admin_link.clone(),
            )
        };
        if registered {
            info!(user = %from.id, "new user registered");
            self.persist().await;
        }
        if admitted {
            return Ok(true);
        }

        let mut text = if bot_active {
            "🚫 You are not authorized to use this bot.".to_string()
        } else {
            "😴 The bot is switched off right now.".to_string()
        };
        if let Some(link) = admin_link {
            text.push_str(&format!("\nContact: {link}"));
        }
        self.send(from.id, &text, None).await?;
        Ok(false)
    }

    /// Turns operator-facing errors into a reply.
    async fn settle(
        &self,
        user: UserId,
        result: Result<(), KeyrelayError>,
    ) -> Result<(), KeyrelayError> {
        match result {
            Err(e) => match e.operator_message() {
                Some(message) => {
                    debug!(operator = %user, error = %e, "operator error");
                    self.send(user, &format!("⚠️ {message}"), None).await?;
                    Ok(())
                }
                None => Err(e),
            },
            ok => ok,
        }
    }

    async fn route_text(&self, from: &Sender, text: &str) -> Result<(), KeyrelayError> {
        let user = from.id;
        if text.starts_with('/') {
            return self.handle_command(from, text).await;
        }

        let (status, method, waiting_key) = {
            let mut store = self.store.lock().await;
            let session = store.sessions.entry(user);
            (session.status, session.current_method, session.waiting_key)
        };
        match status {
            Status::WaitingChannel => return self.apply_channel(user, text).await,
            Status::WaitingCaption => return self.apply_caption(user, text).await,
            Status::WaitingNewCaption => return self.replace_batch_caption(user, text).await,
            Status::WaitingSetupSource(_)
            | Status::WaitingSetupDest(_)
            | Status::WaitingSetupCaption(_) => {
                return self.apply_setup_text(user, status, text).await;
            }
            Status::Normal | Status::SelectingMethod => {}
        }

        match method {
            Some(UploadMethod::Method1) if waiting_key => self.m1_receive_key(user, text).await,
            Some(UploadMethod::Method2) => self.m2_receive_key(user, text).await,
            Some(UploadMethod::Method1) => {
                debug!(operator = %user, "text outside a waiting state ignored");
                Ok(())
            }
            None => {
                let keyboard = ui::method_menu(self.is_owner(user).await);
                self.send(user, "👋 Pick an upload method first.", Some(keyboard))
                    .await
                    .map(drop)
            }
        }
    }

    async fn route_document(
        &self,
        user: UserId,
        document: &IncomingDocument,
    ) -> Result<(), KeyrelayError> {
        let method = {
            let mut store = self.store.lock().await;
            store.sessions.entry(user).current_method
        };
        let Some(method) = method else {
            let keyboard = ui::method_menu(self.is_owner(user).await);
            self.send(user, "👋 Pick an upload method first.", Some(keyboard))
                .await?;
            return Ok(());
        };
        if !document.is_package() {
            return Err(KeyrelayError::Validation(
                "Only .apk files are accepted.".into(),
            ));
        }
        match method {
            UploadMethod::Method1 => self.m1_receive_file(user, document).await,
            UploadMethod::Method2 => self.m2_receive_file(user, document).await,
        }
    }

    async fn route_action(
        &self,
        user: UserId,
        action: Action,
        origin: Option<MessageId>,
    ) -> Result<(), KeyrelayError> {
        match action {
            Action::SelectMethod(method) => self.select_method(user, method, origin).await,
            Action::AutoMenu => self.show_auto_menu(user, origin).await,
            Action::BackToMethods => {
                let keyboard = ui::method_menu(self.is_owner(user).await);
                self.show(user, origin, "📦 Choose an upload method.", Some(keyboard))
                    .await
                    .map(drop)
            }
            Action::ShareConfirm => self.m1_confirm(user, origin).await,
            Action::ShareCancel => self.m1_cancel(user, origin).await,
            Action::DeleteLastPost => self.m1_delete_last(user, origin).await,
            Action::CountdownConfirm => self.m2_confirm_now(user, origin).await,
            Action::CountdownErase | Action::EraseAll => self.m2_erase(user, origin).await,
            Action::BatchSend => self.m2_send(user, origin).await,
            Action::BatchCancel => self.m2_cancel(user, origin).await,
            Action::BatchStyle(style) => self.m2_set_style(user, origin, style).await,
            Action::BatchEditCaption => self.m2_edit_caption(user, origin).await,
            Action::BatchPreview => self.m2_preview(user, origin).await,
            Action::BatchBack => self.m2_render_panel(user, origin).await,
            Action::Recaption(strategy) => self.m2_recaption(user, origin, strategy).await,
            Action::DeleteMenu => self.m2_delete_menu(user, origin).await,
            Action::DeletePosted(index) => self.m2_delete_posted(user, origin, index).await,
            Action::BackToManage => self.m2_back_to_manage(user, origin).await,
            Action::SetChannel => self.prompt_channel(user, origin).await,
            Action::SetCaption => self.prompt_caption(user, origin).await,
            Action::ResetChannel => self.reset_channel(user, origin).await,
            Action::ResetCaption => self.reset_caption(user, origin).await,
            Action::Setup(slot, setup_action) => {
                self.setup_action(user, origin, slot, setup_action).await
            }
        }
    }

    pub(crate) async fn select_method(
        &self,
        user: UserId,
        method: UploadMethod,
        origin: Option<MessageId>,
    ) -> Result<(), KeyrelayError> {
        let stale = {
            let mut store = self.store.lock().await;
            let session = store.sessions.entry(user);
            let mut stale = Vec::new();
            if session.current_method != Some(method) {
                stale = session.erase_all();
                session.pending_file = None;
                session.pending_post = None;
                session.waiting_key = false;
            }
            session.current_method = Some(method);
            session.status = Status::Normal;
            session.tracking.last_method = Some(method);
            stale
        };
        for id in stale {
            self.delete_quietly(&user.chat(), id).await;
        }
        info!(operator = %user, %method, "method selected");

        let text = match method {
            UploadMethod::Method1 => {
                "📦 <b>Method 1</b>\nSend one APK. Put <code>Key - yourkey</code> in the caption or send the key when asked."
            }
            UploadMethod::Method2 => {
                "📦📦 <b>Method 2</b>\nSend up to 3 APKs, then the key. The batch is posted with one shared key."
            }
        };
        let keyboard = Keyboard::new().row([crate::ui::back_button()]);
        self.show(user, origin, text, Some(keyboard)).await.map(drop)
    }

    pub(crate) async fn is_owner(&self, user: UserId) -> bool {
        self.store.lock().await.access.is_owner(user)
    }

    /// Errors with a precondition failure unless `user` is the owner.
    pub(crate) async fn require_owner(&self, user: UserId) -> Result<(), KeyrelayError> {
        if self.is_owner(user).await {
            Ok(())
        } else {
            Err(KeyrelayError::Precondition(
                "Only the owner can do that.".into(),
            ))
        }
    }

    pub(crate) async fn send(
        &self,
        user: UserId,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<MessageId, KeyrelayError> {
        self.transport.send_text(&user.chat(), text, keyboard).await
    }

    /// Edits `origin` in place, or sends a new message when there is no
    /// origin or the edit fails.
    pub(crate) async fn show(
        &self,
        user: UserId,
        origin: Option<MessageId>,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<MessageId, KeyrelayError> {
        if let Some(message) = origin {
            match self
                .transport
                .edit_text(&user.chat(), message, text, keyboard.clone())
                .await
            {
                Ok(()) => return Ok(message),
                Err(e) => debug!(operator = %user, %message, error = %e, "edit failed, sending instead"),
            }
        }
        self.send(user, text, keyboard).await
    }

    pub(crate) async fn delete_quietly(&self, chat: &ChatRef, message: MessageId) {
        if let Err(e) = self.transport.delete_message(chat, message).await {
            debug!(%chat, %message, error = %e, "delete failed");
        }
    }

    /// Best-effort notice to the owner.
    pub(crate) async fn notify_owner(&self, text: &str) -> Option<MessageId> {
        match self.transport.send_text(&self.owner.chat(), text, None).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "owner notice failed");
                None
            }
        }
    }

    /// Replaces an owner notice in place, falling back to a new message.
    pub(crate) async fn update_owner_notice(&self, notice: Option<MessageId>, text: &str) {
        if let Some(message) = notice
            && self
                .transport
                .edit_text(&self.owner.chat(), message, text, None)
                .await
                .is_ok()
        {
            return;
        }
        self.notify_owner(text).await;
    }
}
