// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Slash commands.

use std::fmt::Write as _;

use chrono::Utc;
use keyrelay_core::{KeyrelayError, Sender, UploadMethod, UserId};
use keyrelay_storage::{StatScope, Status};
use tracing::{info, warn};

use crate::caption::escape_html;
use crate::engine::Engine;
use crate::ui;

/// A parsed slash command with its raw argument text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Method1,
    Method2,
    Auto,
    SetChannel(String),
    SetCaption(String),
    ResetChannel,
    ResetCaption,
    Reset,
    Stats,
    ViewSetup,
    Ping,
    AddUser(String),
    RemoveUser(String),
    Users,
    On,
    Off,
    SetAdminLink(String),
    Broadcast(String),
    Report(String),
}

impl Command {
    /// Parses `/name[@bot] args`. Returns `None` for unknown commands.
    pub fn parse(text: &str) -> Option<Self> {
        let body = text.trim().strip_prefix('/')?;
        let (head, rest) = match body.find(char::is_whitespace) {
            Some(at) => (&body[..at], body[at..].trim()),
            None => (body, ""),
        };
        let name = head.split('@').next().unwrap_or_default().to_ascii_lowercase();
        let arg = rest.to_string();

        let command = match name.as_str() {
            "start" => Self::Start,
            "help" => Self::Help,
            "method1" => Self::Method1,
            "method2" => Self::Method2,
            "auto" => Self::Auto,
            "setchannelid" => Self::SetChannel(arg),
            "setcaption" => Self::SetCaption(arg),
            "resetchannelid" => Self::ResetChannel,
            "resetcaption" => Self::ResetCaption,
            "reset" => Self::Reset,
            "stats" => Self::Stats,
            "viewsetup" => Self::ViewSetup,
            "ping" => Self::Ping,
            "adduser" => Self::AddUser(arg),
            "removeuser" => Self::RemoveUser(arg),
            "users" | "userlist" => Self::Users,
            "on" => Self::On,
            "off" => Self::Off,
            "setadminlink" => Self::SetAdminLink(arg),
            "broadcast" => Self::Broadcast(arg),
            "report" => Self::Report(arg),
            _ => return None,
        };
        Some(command)
    }

    fn owner_only(&self) -> bool {
        matches!(
            self,
            Self::AddUser(_)
                | Self::RemoveUser(_)
                | Self::Users
                | Self::On
                | Self::Off
                | Self::SetAdminLink(_)
                | Self::Broadcast(_)
                | Self::Report(_)
                | Self::Auto
        )
    }
}

const HELP: &str = "\
<b>Commands</b>
/start - choose an upload method
/setchannelid @name - set your channel
/setcaption text - set your caption (must contain <code>Key -</code>)
/resetchannelid, /resetcaption, /reset - clear settings
/stats - your usage
/viewsetup - your channel, caption and totals
/ping - bot status

<b>Method 1</b>: one APK, key from the caption or typed after.
<b>Method 2</b>: up to 3 APKs, then one key for all of them.";

impl Engine {
    pub(crate) async fn handle_command(&self, from: &Sender, text: &str) -> Result<(), KeyrelayError> {
        let user = from.id;
        let Some(command) = Command::parse(text) else {
            return Err(KeyrelayError::Validation(
                "Unknown command. Try /help.".into(),
            ));
        };
        if command.owner_only() {
            self.require_owner(user).await?;
        }

        match command {
            Command::Start => {
                {
                    let mut store = self.store.lock().await;
                    store.sessions.entry(user).status = Status::SelectingMethod;
                }
                let text = format!(
                    "👋 Hi {}!\n📦 Choose an upload method.",
                    escape_html(&from.first_name)
                );
                let keyboard = ui::method_menu(self.is_owner(user).await);
                self.send(user, &text, Some(keyboard)).await.map(drop)
            }
            Command::Help => self.send(user, HELP, None).await.map(drop),
            Command::Method1 => self.select_method(user, UploadMethod::Method1, None).await,
            Command::Method2 => self.select_method(user, UploadMethod::Method2, None).await,
            Command::Auto => self.show_auto_menu(user, None).await,
            Command::SetChannel(arg) if arg.is_empty() => self.prompt_channel(user, None).await,
            Command::SetChannel(arg) => self.apply_channel(user, &arg).await,
            Command::SetCaption(arg) if arg.is_empty() => self.prompt_caption(user, None).await,
            Command::SetCaption(arg) => self.apply_caption(user, &arg).await,
            Command::ResetChannel => self.reset_channel(user, None).await,
            Command::ResetCaption => self.reset_caption(user, None).await,
            Command::Reset => self.reset_profile(user).await,
            Command::Stats => self.show_stats(user).await,
            Command::ViewSetup => self.view_setup(user).await,
            Command::Ping => {
                let active = self.store.lock().await.access.bot_active;
                let text = ui::ping_text(self.uptime(), active, env!("CARGO_PKG_VERSION"));
                self.send(user, &text, None).await.map(drop)
            }
            Command::AddUser(arg) => self.add_user(user, &arg).await,
            Command::RemoveUser(arg) => self.remove_user(user, &arg).await,
            Command::Users => self.list_users(user).await,
            Command::On => self.set_bot_active(user, true).await,
            Command::Off => self.set_bot_active(user, false).await,
            Command::SetAdminLink(link) => self.set_admin_link(user, &link).await,
            Command::Broadcast(text) => self.broadcast(user, &text).await,
            Command::Report(scope) => {
                let scope = scope.parse::<StatScope>().map_err(|_| {
                    KeyrelayError::Validation(
                        "Usage: /report 8h|daily|weekly|monthly".into(),
                    )
                })?;
                self.send_report(scope).await
            }
        }
    }

    async fn show_stats(&self, user: UserId) -> Result<(), KeyrelayError> {
        let stats = {
            let mut store = self.store.lock().await;
            store.sessions.entry(user).stats
        };
        let mut text = String::new();
        for scope in [
            StatScope::Lifetime,
            StatScope::Monthly,
            StatScope::Weekly,
            StatScope::Daily,
            StatScope::EightHour,
        ] {
            let _ = writeln!(text, "{}\n", ui::stats_text(ui::scope_title(scope), stats.scope(scope)));
        }
        self.send(user, text.trim_end(), None).await.map(drop)
    }

    async fn view_setup(&self, user: UserId) -> Result<(), KeyrelayError> {
        let text = {
            let mut store = self.store.lock().await;
            let lifetime = store.sessions.entry(user).stats.lifetime;
            let profile = store.profiles.get(user).ok_or_else(|| {
                KeyrelayError::Precondition("No profile yet. Send /start first.".into())
            })?;
            let days_active = (Utc::now() - profile.first_seen).num_days().max(0);
            ui::setup_overview(user, profile, days_active, &lifetime)
        };
        self.send(user, &text, None).await.map(drop)
    }

    async fn add_user(&self, owner: UserId, arg: &str) -> Result<(), KeyrelayError> {
        let target: UserId = arg.parse()?;
        let added = {
            let mut store = self.store.lock().await;
            store.access.allowed.insert(target)
        };
        if added {
            info!(user = %target, "user allowed");
            self.persist().await;
        }
        let text = if added {
            format!("✅ User <code>{target}</code> added.")
        } else {
            format!("ℹ️ User <code>{target}</code> was already allowed.")
        };
        self.send(owner, &text, None).await.map(drop)
    }

    async fn remove_user(&self, owner: UserId, arg: &str) -> Result<(), KeyrelayError> {
        let target: UserId = arg.parse()?;
        if target == self.owner {
            return Err(KeyrelayError::Validation("The owner cannot be removed.".into()));
        }
        let removed = {
            let mut store = self.store.lock().await;
            store.access.allowed.remove(&target)
        };
        if removed {
            info!(user = %target, "user removed");
            self.persist().await;
        }
        let text = if removed {
            format!("🗑 User <code>{target}</code> removed.")
        } else {
            format!("ℹ️ User <code>{target}</code> was not on the list.")
        };
        self.send(owner, &text, None).await.map(drop)
    }

    async fn list_users(&self, owner: UserId) -> Result<(), KeyrelayError> {
        let text = {
            let store = self.store.lock().await;
            let mut text = format!("👥 <b>Allowed users ({})</b>\n", store.access.allowed.len());
            for user in &store.access.allowed {
                let profile = store.profiles.get(*user);
                let name = profile.map_or("unknown", |p| p.first_name.as_str());
                let channel = profile
                    .and_then(|p| p.channel.as_ref())
                    .map_or_else(|| "no channel".to_string(), ToString::to_string);
                let _ = writeln!(
                    text,
                    "• <code>{user}</code> {} ({})",
                    escape_html(name),
                    escape_html(&channel)
                );
            }
            let _ = write!(
                text,
                "\nBot: {}",
                if store.access.bot_active { "🟢 on" } else { "🔴 off" }
            );
            text
        };
        self.send(owner, &text, None).await.map(drop)
    }

    async fn set_bot_active(&self, owner: UserId, active: bool) -> Result<(), KeyrelayError> {
        {
            let mut store = self.store.lock().await;
            store.access.bot_active = active;
        }
        info!(active, "bot switched");
        self.persist().await;
        let text = if active {
            "🟢 Bot is on."
        } else {
            "🔴 Bot is off. Only you can use it."
        };
        self.send(owner, text, None).await.map(drop)
    }

    async fn set_admin_link(&self, owner: UserId, link: &str) -> Result<(), KeyrelayError> {
        if link.is_empty() {
            return Err(KeyrelayError::Validation("Usage: /setadminlink <url>".into()));
        }
        {
            let mut store = self.store.lock().await;
            store.access.admin_link = Some(link.to_string());
        }
        self.persist().await;
        self.send(owner, "✅ Admin link saved.", None).await.map(drop)
    }

    /// Sends `text` once to every known user. No retries.
    async fn broadcast(&self, owner: UserId, text: &str) -> Result<(), KeyrelayError> {
        if text.is_empty() {
            return Err(KeyrelayError::Validation("Usage: /broadcast <text>".into()));
        }
        let recipients: Vec<UserId> = {
            let store = self.store.lock().await;
            store.profiles.users().filter(|u| *u != owner).collect()
        };

        let (mut delivered, mut failed) = (0usize, 0usize);
        for user in recipients {
            match self.send(user, text, None).await {
                Ok(_) => delivered += 1,
                Err(e) => {
                    warn!(%user, error = %e, "broadcast not delivered");
                    failed += 1;
                }
            }
        }
        info!(delivered, failed, "broadcast finished");
        self.send(
            owner,
            &format!("📣 Broadcast done.\n✅ Delivered: {delivered}\n❌ Failed: {failed}"),
            None,
        )
        .await
        .map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_with_arguments() {
        assert_eq!(
            Command::parse("/setchannelid @drop"),
            Some(Command::SetChannel("@drop".into()))
        );
        assert_eq!(
            Command::parse("/setcaption New build\nKey -"),
            Some(Command::SetCaption("New build\nKey -".into()))
        );
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/viewsetup"), Some(Command::ViewSetup));
        assert_eq!(Command::parse("/PING"), Some(Command::Ping));
    }

    #[test]
    fn strips_bot_mention() {
        assert_eq!(Command::parse("/stats@keyrelay_bot"), Some(Command::Stats));
        assert_eq!(
            Command::parse("/adduser@keyrelay_bot 42"),
            Some(Command::AddUser("42".into()))
        );
    }

    #[test]
    fn unknown_and_plain_text() {
        assert_eq!(Command::parse("/fly"), None);
        assert_eq!(Command::parse("hello"), None);
    }

    #[test]
    fn owner_only_commands() {
        assert!(Command::Broadcast(String::new()).owner_only());
        assert!(Command::Auto.owner_only());
        assert!(!Command::Stats.owner_only());
        assert!(!Command::ViewSetup.owner_only());
        assert!(!Command::Ping.owner_only());
    }
}
