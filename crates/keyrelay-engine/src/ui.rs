// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyboards and panel texts.

use std::fmt::Write as _;
use std::time::Duration;

use keyrelay_core::{Button, Keyboard, KeyStyle, UploadMethod, UserId};
use keyrelay_storage::{
    AutoSetup, AutoSetupTable, MethodCounters, OperatorProfile, PostedBatch, SetupSlot, StatScope,
};

use crate::action::{Action, SetupAction};
use crate::caption::{self, RecaptionStrategy, escape_html, short_name};

fn button(label: impl Into<String>, action: Action) -> Button {
    Button::callback(label, action.to_string())
}

pub fn method_menu(is_owner: bool) -> Keyboard {
    let keyboard = Keyboard::new()
        .row([
            button("📦 Method 1", Action::SelectMethod(UploadMethod::Method1)),
            button("📦📦 Method 2", Action::SelectMethod(UploadMethod::Method2)),
        ])
        .row([
            button("📢 Set channel", Action::SetChannel),
            button("📝 Set caption", Action::SetCaption),
        ]);
    if is_owner {
        keyboard.row([button("🤖 Auto setups", Action::AutoMenu)])
    } else {
        keyboard
    }
}

pub fn back_button() -> Button {
    button("⬅️ Back", Action::BackToMethods)
}

pub fn share_prompt() -> Keyboard {
    Keyboard::new().row([
        button("✅ Share", Action::ShareConfirm),
        button("❌ Cancel", Action::ShareCancel),
    ])
}

pub fn posted_single(link: Option<&str>) -> Keyboard {
    Keyboard::new()
        .row(link.map(|url| Button::url("🔗 Open post", url)))
        .row([button("🗑 Delete post", Action::DeleteLastPost)])
}

pub fn countdown_text(files: &[String], remaining: u32) -> String {
    let mut text = format!("📥 <b>{} APK(s) received</b>\n", files.len());
    for name in files {
        let _ = writeln!(text, "• {}", escape_html(name));
    }
    let _ = write!(text, "\n⏳ Waiting {remaining}s for more files…");
    text
}

pub fn countdown_keyboard(count: usize) -> Keyboard {
    Keyboard::new().row([
        button(format!("✅ Confirm {count} APK(s)"), Action::CountdownConfirm),
        button("🗑 Erase all", Action::CountdownErase),
    ])
}

pub fn key_prompt(count: usize) -> String {
    format!("🔑 {count} APK(s) ready. Send the key now.")
}

pub fn key_panel(files: &[String], key: &str, style: KeyStyle, template: Option<&str>) -> (String, Keyboard) {
    let mut text = String::from("📦 <b>Batch ready</b>\n");
    for (i, name) in files.iter().enumerate() {
        let _ = writeln!(text, "{}. {}", i + 1, escape_html(name));
    }
    let _ = write!(
        text,
        "\n{}\nStyle: {style}",
        caption::styled_key_line(key, style)
    );
    if template.is_none() {
        text.push_str("\n\n⚠️ No caption set.");
    }

    let keyboard = Keyboard::new()
        .row([
            button("✅ Send", Action::BatchSend),
            button("❌ Cancel", Action::BatchCancel),
        ])
        .row([
            button("❝ Quote", Action::BatchStyle(KeyStyle::Quote)),
            button("⌨ Mono", Action::BatchStyle(KeyStyle::Mono)),
            button("Aa Normal", Action::BatchStyle(KeyStyle::Normal)),
        ])
        .row([
            button("✏️ Edit caption", Action::BatchEditCaption),
            button("👁 Preview", Action::BatchPreview),
        ])
        .row([button("🧹 Clear all", Action::EraseAll)]);
    (text, keyboard)
}

pub fn preview(files: &[String], captions: &[String]) -> (String, Keyboard) {
    let mut text = String::from("👁 <b>Preview</b>\n");
    for (name, caption) in files.iter().zip(captions) {
        let _ = write!(text, "\n<b>{}</b>\n{caption}\n", escape_html(name));
    }
    (text, back_to_panel())
}

pub fn back_to_panel() -> Keyboard {
    Keyboard::new().row([button("⬅️ Back", Action::BatchBack)])
}

pub fn caption_request() -> String {
    "✏️ Send the new caption. It must contain <code>Key -</code>.".to_string()
}

pub fn manage_panel(batch: &PostedBatch, link: Option<&str>) -> (String, Keyboard) {
    let count = batch.post_message_ids.len();
    let mut text = format!(
        "✅ <b>Posted {count} APK(s)</b> to {}\n{}",
        escape_html(&batch.channel.to_string()),
        caption::styled_key_line(&batch.key, batch.key_mode)
    );
    if let Some(link) = link {
        let _ = write!(text, "\n🔗 {link}");
    }

    let mut keyboard = Keyboard::new();
    if count >= 2 {
        for strategy in RecaptionStrategy::ALL {
            keyboard = keyboard.row([button(strategy.label(), Action::Recaption(strategy))]);
        }
    }
    keyboard = keyboard
        .row(link.map(|url| Button::url("🔗 Open post", url)))
        .row([
            button("🗑 Delete items", Action::DeleteMenu),
            button("🧹 Erase all", Action::EraseAll),
        ]);
    (text, keyboard)
}

pub fn delete_menu(filenames: &[String]) -> (String, Keyboard) {
    let mut keyboard = Keyboard::new();
    for (i, name) in filenames.iter().enumerate() {
        keyboard = keyboard.row([button(
            format!("🗑 {}", short_name(name)),
            Action::DeletePosted(i + 1),
        )]);
    }
    keyboard = keyboard.row([button("⬅️ Back", Action::BackToManage)]);
    ("🗑 Pick an item to delete from the channel.".to_string(), keyboard)
}

pub fn progress_bar(elapsed: u32, total: u32) -> String {
    let filled = elapsed.min(total) as usize;
    let empty = total.saturating_sub(elapsed) as usize;
    format!("{}{} {elapsed}/{total}", "▰".repeat(filled), "▱".repeat(empty))
}

pub fn auto_menu(setups: &AutoSetupTable) -> (String, Keyboard) {
    let mut text = String::from("🤖 <b>Auto setups</b>\n");
    let mut keyboard = Keyboard::new();
    for slot in SetupSlot::ALL {
        let setup = setups.get(slot);
        let _ = writeln!(
            text,
            "Auto {slot}: {} • {} done",
            on_off(setup.enabled),
            setup.completed_count
        );
        keyboard = keyboard.row([button(
            format!("⚙️ Auto {slot}"),
            Action::Setup(slot, SetupAction::Menu),
        )]);
    }
    keyboard = keyboard.row([button("⬅️ Back", Action::BackToMethods)]);
    (text, keyboard)
}

pub fn setup_panel(slot: SetupSlot, setup: &AutoSetup) -> (String, Keyboard) {
    let s = |action| Action::Setup(slot, action);
    let keyboard = Keyboard::new()
        .row([
            button("📥 Source", s(SetupAction::Source)),
            button("📤 Destination", s(SetupAction::Dest)),
        ])
        .row([button("📝 Caption", s(SetupAction::Caption))])
        .row([
            button("🤖 Automated", s(SetupAction::Automated)),
            button("✋ Manual", s(SetupAction::Manual)),
        ])
        .row([
            button("❝ Quote", s(SetupAction::Quote)),
            button("⌨ Mono", s(SetupAction::Mono)),
        ])
        .row([
            button("🟢 On", s(SetupAction::On)),
            button("🔴 Off", s(SetupAction::Off)),
        ])
        .row([
            button("👁 View", s(SetupAction::View)),
            button("♻️ Reset", s(SetupAction::Reset)),
        ])
        .row([button("⬅️ Back", Action::AutoMenu)]);
    (setup_summary(slot, setup), keyboard)
}

pub fn setup_summary(slot: SetupSlot, setup: &AutoSetup) -> String {
    let or_unset = |v: Option<String>| v.map(|s| escape_html(&s)).unwrap_or_else(|| "not set".into());
    let mut text = format!(
        "⚙️ <b>Auto {slot}</b> {}\nSource: {}\nDestination: {}\nCaption: {}\nKey mode: {}\nStyle: {}\nCompleted: {}",
        on_off(setup.enabled),
        or_unset(setup.source_channel.as_ref().map(ToString::to_string)),
        or_unset(setup.dest_channel.as_ref().map(ToString::to_string)),
        or_unset(setup.dest_caption.clone()),
        setup.key_mode,
        setup.style,
        setup.completed_count,
    );
    if let Some(range) = slot.size_range_mb() {
        let _ = write!(text, "\nSize: {}-{} MB", range.start(), range.end());
    }
    text
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "🟢 on" } else { "🔴 off" }
}

pub fn stats_text(title: &str, counters: &MethodCounters) -> String {
    format!(
        "📊 <b>{title}</b>\nMethod 1: {} APKs, {} keys\nMethod 2: {} APKs, {} keys\nTotal: {} APKs, {} keys",
        counters.method1.apks,
        counters.method1.keys,
        counters.method2.apks,
        counters.method2.keys,
        counters.total_apks(),
        counters.total_keys(),
    )
}

/// The operator's own settings and lifetime totals.
pub fn setup_overview(
    user: UserId,
    profile: &OperatorProfile,
    days_active: i64,
    lifetime: &MethodCounters,
) -> String {
    let channel = profile
        .channel
        .as_ref()
        .map_or_else(|| "Not set".to_string(), ToString::to_string);
    let caption = profile.caption.as_deref().unwrap_or("No caption set.");
    format!(
        "🔍 <b>Your setup</b>\n\
         🆔 User: <code>{user}</code>\n\
         🗓 Active since: {days_active} days\n\
         📡 Channel: <code>{}</code>\n\n\
         🖋 <b>Saved caption:</b>\n{}\n\n\
         📦 Method 1: {} APKs / {} keys\n\
         📦 Method 2: {} APKs / {} keys",
        escape_html(&channel),
        escape_html(caption),
        lifetime.method1.apks,
        lifetime.method1.keys,
        lifetime.method2.apks,
        lifetime.method2.keys,
    )
}

pub fn ping_text(uptime: Duration, bot_active: bool, version: &str) -> String {
    let secs = uptime.as_secs();
    let (days, hours, minutes, seconds) =
        (secs / 86_400, secs % 86_400 / 3_600, secs % 3_600 / 60, secs % 60);
    format!(
        "⚙️ <b>Status</b>\n\
         ⏱ Uptime: <code>{days}D {hours}H {minutes}M {seconds}S</code>\n\
         🤖 Bot: {}\n\
         🧾 Version: <code>{version}</code>",
        on_off(bot_active)
    )
}

pub fn scope_title(scope: StatScope) -> &'static str {
    match scope {
        StatScope::Lifetime => "Lifetime",
        StatScope::EightHour => "Last 8 hours",
        StatScope::Daily => "Today",
        StatScope::Weekly => "This week",
        StatScope::Monthly => "This month",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyrelay_core::{ChatRef, FileRef, MessageId};

    #[test]
    fn progress_bar_fills_left_to_right() {
        assert_eq!(progress_bar(0, 4), "▱▱▱▱ 0/4");
        assert_eq!(progress_bar(3, 4), "▰▰▰▱ 3/4");
        assert_eq!(progress_bar(9, 4), "▰▰▰▰ 9/4");
    }

    #[test]
    fn manage_panel_offers_strategies_for_multi_item_batches() {
        let mut batch = PostedBatch {
            file_ids: vec![FileRef::new("a"), FileRef::new("b")],
            filenames: vec!["a.apk".into(), "b.apk".into()],
            key: "K1".into(),
            key_mode: KeyStyle::Mono,
            caption_template: "Key -".into(),
            channel: ChatRef::Username("drop".into()),
            post_message_ids: vec![MessageId(1), MessageId(2)],
        };
        let (_, keyboard) = manage_panel(&batch, None);
        assert!(keyboard.payloads().contains(&"auto_recaption"));
        assert!(keyboard.payloads().contains(&"delete_apk_post"));

        batch.post_message_ids.truncate(1);
        let (_, keyboard) = manage_panel(&batch, None);
        assert!(!keyboard.payloads().contains(&"auto_recaption"));
    }

    #[test]
    fn ping_splits_uptime_into_units() {
        let text = ping_text(Duration::from_secs(90_061), true, "0.1.0");
        assert!(text.contains("1D 1H 1M 1S"));
        assert!(text.contains("🟢 on"));
    }

    #[test]
    fn delete_menu_indices_are_one_based() {
        let (_, keyboard) = delete_menu(&["a.apk".into(), "b.apk".into()]);
        assert_eq!(
            keyboard.payloads(),
            vec!["delete_apk_1", "delete_apk_2", "back_to_manage_post"]
        );
    }
}
