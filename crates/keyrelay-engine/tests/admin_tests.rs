// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Access control, owner commands, alerts, and reports.

mod common;

use std::time::Duration;

use common::{Harness, OPERATOR, OWNER, channel, operator, owner};
use keyrelay_core::{ChatRef, KeyrelayError, UserId};
use keyrelay_storage::StatScope;
use keyrelay_test_utils::fixtures::{apk, sender};

#[tokio::test]
async fn strangers_are_turned_away() {
    let h = Harness::new();
    let stranger = sender(99, "Eve");
    h.engine.handle_text(&stranger, "/start").await.unwrap();

    assert!(h.last_text_to(99).await.contains("not authorized"));
    let store = h.engine.store().lock().await;
    assert!(store.profiles.get(UserId(99)).is_some());
    assert!(store.sessions.get(UserId(99)).is_none());
}

#[tokio::test]
async fn switching_off_admits_only_the_owner() {
    let h = Harness::new();
    {
        let mut store = h.engine.store().lock().await;
        store.access.admin_link = Some("https://t.me/boss".into());
    }
    h.engine.handle_text(&owner(), "/off").await.unwrap();
    h.engine.handle_text(&operator(), "/start").await.unwrap();

    let reply = h.last_text_to(OPERATOR).await;
    assert!(reply.contains("switched off"));
    assert!(reply.contains("https://t.me/boss"));

    h.engine.handle_text(&owner(), "/on").await.unwrap();
    h.engine.handle_text(&operator(), "/start").await.unwrap();
    assert!(h.last_text_to(OPERATOR).await.contains("Choose an upload method"));
}

#[tokio::test]
async fn owner_manages_the_allow_list() {
    let h = Harness::new();
    h.engine.handle_text(&owner(), "/adduser 77").await.unwrap();
    assert!(h.engine.store().lock().await.access.allowed.contains(&UserId(77)));

    h.engine.handle_text(&owner(), "/removeuser 77").await.unwrap();
    assert!(!h.engine.store().lock().await.access.allowed.contains(&UserId(77)));

    h.engine.handle_text(&owner(), "/removeuser 1").await.unwrap();
    assert_eq!(
        h.last_text_to(OWNER).await,
        "⚠️ The owner cannot be removed."
    );

    h.engine.handle_text(&owner(), "/adduser abc").await.unwrap();
    assert!(h.last_text_to(OWNER).await.contains("not a numeric user id"));
}

#[tokio::test]
async fn operators_cannot_use_owner_commands() {
    let h = Harness::new();
    h.engine.handle_text(&operator(), "/adduser 77").await.unwrap();
    assert_eq!(
        h.last_text_to(OPERATOR).await,
        "⚠️ Only the owner can do that."
    );
    assert!(!h.engine.store().lock().await.access.allowed.contains(&UserId(77)));
}

#[tokio::test]
async fn broadcast_counts_deliveries() {
    let h = Harness::new();
    {
        let mut store = h.engine.store().lock().await;
        store.profiles.register(&sender(3, "Bo"), chrono::Utc::now());
    }
    h.transport.make_unreachable(UserId(3)).await;

    h.engine
        .handle_text(&owner(), "/broadcast Maintenance at noon")
        .await
        .unwrap();
    assert_eq!(
        h.texts_to(OPERATOR).await,
        vec!["Maintenance at noon".to_string()]
    );
    let summary = h.last_text_to(OWNER).await;
    assert!(summary.contains("Delivered: 1"));
    assert!(summary.contains("Failed: 1"));
}

#[tokio::test]
async fn channel_setting_checks_admin_rights() {
    let h = Harness::new();
    h.transport.deny_admin(Some(UserId(OPERATOR))).await;
    h.engine
        .handle_text(&operator(), "/setchannelid @other")
        .await
        .unwrap();
    assert!(h.last_text_to(OPERATOR).await.contains("You are not an admin"));

    h.engine
        .handle_text(&operator(), "/setchannelid other")
        .await
        .unwrap();
    assert!(h.last_text_to(OPERATOR).await.contains("must start with @ or -100"));

    let store = h.engine.store().lock().await;
    assert_eq!(
        store.profiles.get(UserId(OPERATOR)).unwrap().channel,
        Some(channel())
    );
}

#[tokio::test]
async fn interactive_caption_requires_the_placeholder() {
    let h = Harness::new();
    h.engine
        .handle_callback(&operator(), "set_caption", None)
        .await
        .unwrap();
    h.engine.handle_text(&operator(), "no marker").await.unwrap();
    assert!(h.last_text_to(OPERATOR).await.contains("must contain"));

    h.engine
        .handle_text(&operator(), "Hot <b>update</b>\nKey -")
        .await
        .unwrap();
    let store = h.engine.store().lock().await;
    assert_eq!(
        store.profiles.get(UserId(OPERATOR)).unwrap().caption.as_deref(),
        Some("Hot <b>update</b>\nKey -")
    );
}

#[tokio::test]
async fn setup_source_is_resolved_to_an_id() {
    let h = Harness::new();
    h.transport.resolve_as("feed", -1005).await;
    h.engine
        .handle_callback(&owner(), "setup2_source", None)
        .await
        .unwrap();
    h.engine.handle_text(&owner(), "@feed").await.unwrap();

    let store = h.engine.store().lock().await;
    let setup = store.setups.get(keyrelay_storage::SetupSlot::new(2).unwrap());
    assert_eq!(setup.source_channel, Some(ChatRef::Id(-1005)));
}

#[tokio::test]
async fn enabling_a_slot_needs_source_and_destination() {
    let h = Harness::new();
    h.engine
        .handle_callback(&owner(), "setup3_on", None)
        .await
        .unwrap();
    assert!(h.last_text_to(OWNER).await.contains("Set the source and destination"));
}

#[tokio::test(start_paused = true)]
async fn alerts_respect_the_cooldown() {
    let h = Harness::new();
    let err = KeyrelayError::Internal("boom".into());
    h.engine.report_failure("test", Some(UserId(OPERATOR)), &err).await;
    h.engine.report_failure("test", Some(UserId(OPERATOR)), &err).await;

    let alerts = |texts: Vec<String>| texts.iter().filter(|t| t.contains("Error in")).count();
    assert_eq!(alerts(h.texts_to(OWNER).await), 1);
    assert_eq!(h.texts_to(OPERATOR).await.len(), 2);

    tokio::time::sleep(Duration::from_secs(31)).await;
    h.engine.report_failure("test", None, &err).await;
    assert_eq!(alerts(h.texts_to(OWNER).await), 2);
}

#[tokio::test]
async fn report_sends_summaries_and_resets_the_scope() {
    let h = Harness::new();
    h.engine.handle_text(&operator(), "/method1").await.unwrap();
    let doc = apk("f1", "game.apk", 12.0, Some("Key - ZX81"));
    h.engine.handle_document(&operator(), &doc).await.unwrap();
    h.engine
        .handle_callback(&operator(), "share_yes", None)
        .await
        .unwrap();

    h.engine.handle_text(&owner(), "/report daily").await.unwrap();

    assert!(h.last_text_to(OPERATOR).await.contains("Today"));
    let rollup = h.last_text_to(OWNER).await;
    assert!(rollup.contains("Active operators: 1"));
    assert!(rollup.contains("Total: 1 APKs, 1 keys"));

    let session = h.session(OPERATOR).await;
    assert!(session.stats.daily.is_empty());
    assert_eq!(session.stats.lifetime.method1.apks, 1);
    assert_eq!(session.stats.weekly.method1.apks, 1);

    h.engine.handle_text(&owner(), "/report yearly").await.unwrap();
    assert!(h.last_text_to(OWNER).await.starts_with("⚠️ Usage: /report"));
}

#[test]
fn report_scope_names_parse() {
    assert_eq!("8h".parse::<StatScope>().unwrap(), StatScope::EightHour);
    assert_eq!("weekly".parse::<StatScope>().unwrap(), StatScope::Weekly);
}

#[tokio::test]
async fn viewsetup_shows_channel_caption_and_totals() {
    let h = Harness::new();
    {
        let mut store = h.engine.store().lock().await;
        let stats = &mut store.sessions.entry(UserId(OPERATOR)).stats;
        stats.lifetime.method1.apks = 4;
        stats.lifetime.method1.keys = 4;
        stats.lifetime.method2.apks = 6;
        stats.lifetime.method2.keys = 2;
    }
    h.engine.handle_text(&operator(), "/viewsetup").await.unwrap();

    let reply = h.last_text_to(OPERATOR).await;
    assert!(reply.contains("Channel: <code>@drop</code>"));
    assert!(reply.contains("New build\nKey -"));
    assert!(reply.contains("Active since: 0 days"));
    assert!(reply.contains("Method 1: 4 APKs / 4 keys"));
    assert!(reply.contains("Method 2: 6 APKs / 2 keys"));
}

#[tokio::test(start_paused = true)]
async fn ping_reports_uptime_and_bot_state() {
    let h = Harness::new();
    tokio::time::advance(Duration::from_secs(3_725)).await;
    h.engine.handle_text(&operator(), "/ping").await.unwrap();

    let reply = h.last_text_to(OPERATOR).await;
    assert!(reply.contains("0D 1H 2M 5S"));
    assert!(reply.contains("🟢 on"));
}
