// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Method 1 single-post flows.

mod common;

use common::{Harness, OPERATOR, channel, operator};
use keyrelay_core::UserId;
use keyrelay_test_utils::fixtures::apk;

#[tokio::test]
async fn key_in_caption_goes_straight_to_confirmation() {
    let h = Harness::new();
    h.engine.handle_text(&operator(), "/method1").await.unwrap();
    let doc = apk("f1", "game.apk", 12.0, Some("Update\nKey - ZX81"));
    h.engine.handle_document(&operator(), &doc).await.unwrap();

    let session = h.session(OPERATOR).await;
    let pending = session.pending_post.expect("pending post");
    assert_eq!(pending.caption, "New build\nKey - <code>ZX81</code>");
    assert!(h.last_text_to(OPERATOR).await.contains("Share to @drop?"));

    h.engine
        .handle_callback(&operator(), "share_yes", pending.confirm_message_id)
        .await
        .unwrap();
    let posted = h.transport.documents_to(&channel()).await;
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].1.as_deref(), Some("New build\nKey - <code>ZX81</code>"));

    let session = h.session(OPERATOR).await;
    assert!(session.pending_post.is_none());
    assert_eq!(session.stats.lifetime.method1.apks, 1);
    assert_eq!(session.stats.daily.method1.keys, 1);
    assert!(session.last_post.is_some());
}

#[tokio::test]
async fn missing_key_is_asked_for() {
    let h = Harness::new();
    h.engine.handle_text(&operator(), "/method1").await.unwrap();
    let doc = apk("f1", "game.apk", 12.0, Some("no key here"));
    h.engine.handle_document(&operator(), &doc).await.unwrap();

    let session = h.session(OPERATOR).await;
    assert!(session.waiting_key);
    assert!(session.pending_file.is_some());

    h.engine.handle_text(&operator(), "TYPED-KEY").await.unwrap();
    let session = h.session(OPERATOR).await;
    assert!(!session.waiting_key);
    assert!(session.pending_file.is_none());
    assert_eq!(
        session.pending_post.expect("pending post").caption,
        "New build\nKey - <code>TYPED-KEY</code>"
    );
}

#[tokio::test]
async fn missing_channel_halts_without_side_effects() {
    let h = Harness::new();
    {
        let mut store = h.engine.store().lock().await;
        store.profiles.get_mut(UserId(OPERATOR)).unwrap().channel = None;
    }
    h.engine.handle_text(&operator(), "/method1").await.unwrap();
    let doc = apk("f1", "game.apk", 12.0, Some("Key - ZX81"));
    h.engine.handle_document(&operator(), &doc).await.unwrap();

    assert!(h.last_text_to(OPERATOR).await.starts_with("⚠️ Set your channel first"));
    assert!(h.session(OPERATOR).await.pending_post.is_none());
    assert!(h.transport.documents_to(&channel()).await.is_empty());
}

#[tokio::test]
async fn cancel_discards_the_pending_post() {
    let h = Harness::new();
    h.engine.handle_text(&operator(), "/method1").await.unwrap();
    let doc = apk("f1", "game.apk", 12.0, Some("Key - ZX81"));
    h.engine.handle_document(&operator(), &doc).await.unwrap();
    h.engine
        .handle_callback(&operator(), "share_no", None)
        .await
        .unwrap();

    assert!(h.session(OPERATOR).await.pending_post.is_none());
    h.engine
        .handle_callback(&operator(), "share_yes", None)
        .await
        .unwrap();
    assert!(h.last_text_to(OPERATOR).await.starts_with("⚠️ Nothing is waiting"));
}

#[tokio::test]
async fn delete_last_removes_the_post() {
    let h = Harness::new();
    h.engine.handle_text(&operator(), "/method1").await.unwrap();
    let doc = apk("f1", "game.apk", 12.0, Some("Key - ZX81"));
    h.engine.handle_document(&operator(), &doc).await.unwrap();
    h.engine
        .handle_callback(&operator(), "share_yes", None)
        .await
        .unwrap();
    let last = h.session(OPERATOR).await.last_post.expect("last post");

    h.engine
        .handle_callback(&operator(), "delete_last", None)
        .await
        .unwrap();
    assert_eq!(h.transport.deleted_in(&channel()).await, vec![last.message_id]);
    assert!(h.session(OPERATOR).await.last_post.is_none());
}

#[tokio::test]
async fn non_package_documents_are_refused() {
    let h = Harness::new();
    h.engine.handle_text(&operator(), "/method1").await.unwrap();
    let doc = apk("f1", "notes.txt", 0.1, Some("Key - ZX81"));
    h.engine.handle_document(&operator(), &doc).await.unwrap();
    assert_eq!(
        h.last_text_to(OPERATOR).await,
        "⚠️ Only .apk files are accepted."
    );
}
