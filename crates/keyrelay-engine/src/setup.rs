// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Owner configuration of the auto-forward slots.

use keyrelay_core::{
    Button, ChatRef, KeyMode, KeyStyle, KeyrelayError, Keyboard, MessageId, UserId,
};
use keyrelay_storage::{SetupSlot, Status};
use tracing::info;

use crate::action::{Action, SetupAction};
use crate::caption;
use crate::engine::Engine;
use crate::ui;

fn back_to_slot(slot: SetupSlot) -> Keyboard {
    Keyboard::new().row([Button::callback(
        "⬅️ Back",
        Action::Setup(slot, SetupAction::Menu).to_string(),
    )])
}

impl Engine {
    pub(crate) async fn show_auto_menu(
        &self,
        user: UserId,
        origin: Option<MessageId>,
    ) -> Result<(), KeyrelayError> {
        self.require_owner(user).await?;
        let (text, keyboard) = {
            let store = self.store.lock().await;
            ui::auto_menu(&store.setups)
        };
        self.show(user, origin, &text, Some(keyboard)).await.map(drop)
    }

    pub(crate) async fn setup_action(
        &self,
        user: UserId,
        origin: Option<MessageId>,
        slot: SetupSlot,
        action: SetupAction,
    ) -> Result<(), KeyrelayError> {
        self.require_owner(user).await?;

        let prompt = match action {
            SetupAction::Source => Some((
                Status::WaitingSetupSource(slot),
                format!("📥 Send the <b>source</b> channel for Auto {slot} (@name or -100…)."),
            )),
            SetupAction::Dest => Some((
                Status::WaitingSetupDest(slot),
                format!("📤 Send the <b>destination</b> channel for Auto {slot} (@name or -100…)."),
            )),
            SetupAction::Caption => Some((
                Status::WaitingSetupCaption(slot),
                format!("📝 Send the caption for Auto {slot}. It must contain <code>Key -</code>."),
            )),
            _ => None,
        };
        if let Some((status, text)) = prompt {
            {
                let mut store = self.store.lock().await;
                store.sessions.entry(user).status = status;
            }
            return self
                .show(user, origin, &text, Some(back_to_slot(slot)))
                .await
                .map(drop);
        }

        if action == SetupAction::View {
            let text = {
                let mut store = self.store.lock().await;
                store.sessions.entry(user).status = Status::Normal;
                ui::setup_summary(slot, store.setups.get(slot))
            };
            return self
                .show(user, origin, &text, Some(back_to_slot(slot)))
                .await
                .map(drop);
        }

        let changed = {
            let mut store = self.store.lock().await;
            store.sessions.entry(user).status = Status::Normal;
            let setup = store.setups.get_mut(slot);
            match action {
                SetupAction::Automated => setup.key_mode = KeyMode::Auto,
                SetupAction::Manual => setup.key_mode = KeyMode::Manual,
                SetupAction::Quote => setup.style = KeyStyle::Quote,
                SetupAction::Mono => setup.style = KeyStyle::Mono,
                SetupAction::On => {
                    if setup.source_channel.is_none() || setup.dest_channel.is_none() {
                        return Err(KeyrelayError::Precondition(format!(
                            "Set the source and destination of Auto {slot} first."
                        )));
                    }
                    setup.enabled = true;
                }
                SetupAction::Off => {
                    setup.enabled = false;
                    if slot.is_batched() {
                        store.auto4.reset();
                    }
                }
                SetupAction::Reset => {
                    store.setups.reset(slot);
                    if slot.is_batched() {
                        store.auto4.reset();
                    }
                }
                SetupAction::Menu
                | SetupAction::Source
                | SetupAction::Dest
                | SetupAction::Caption
                | SetupAction::View => {}
            }
            action != SetupAction::Menu
        };
        if changed {
            info!(%slot, %action, "auto setup changed");
            self.persist().await;
        }
        self.render_setup_panel(user, origin, slot).await
    }

    async fn render_setup_panel(
        &self,
        user: UserId,
        origin: Option<MessageId>,
        slot: SetupSlot,
    ) -> Result<(), KeyrelayError> {
        let (text, keyboard) = {
            let store = self.store.lock().await;
            ui::setup_panel(slot, store.setups.get(slot))
        };
        self.show(user, origin, &text, Some(keyboard)).await.map(drop)
    }

    /// Applies the text answering a setup prompt.
    pub(crate) async fn apply_setup_text(
        &self,
        user: UserId,
        status: Status,
        text: &str,
    ) -> Result<(), KeyrelayError> {
        self.require_owner(user).await?;

        let slot = match status {
            Status::WaitingSetupSource(slot) => {
                let channel = ChatRef::parse_channel(text)?;
                let id = self.transport.resolve_chat(&channel).await.map_err(|e| {
                    KeyrelayError::Validation(format!(
                        "Could not find {channel}. Make sure the bot is a member. ({e})"
                    ))
                })?;
                let mut store = self.store.lock().await;
                store.setups.get_mut(slot).source_channel = Some(ChatRef::Id(id));
                slot
            }
            Status::WaitingSetupDest(slot) => {
                let channel = ChatRef::parse_channel(text)?;
                let mut store = self.store.lock().await;
                store.setups.get_mut(slot).dest_channel = Some(channel);
                slot
            }
            Status::WaitingSetupCaption(slot) => {
                if !caption::has_placeholder(text) {
                    return Err(KeyrelayError::Validation(
                        "The caption must contain `Key -`.".into(),
                    ));
                }
                let mut store = self.store.lock().await;
                store.setups.get_mut(slot).dest_caption = Some(text.to_string());
                slot
            }
            _ => return Ok(()),
        };

        {
            let mut store = self.store.lock().await;
            store.sessions.entry(user).status = Status::Normal;
        }
        info!(%slot, "auto setup updated");
        self.persist().await;
        self.render_setup_panel(user, None, slot).await
    }
}
