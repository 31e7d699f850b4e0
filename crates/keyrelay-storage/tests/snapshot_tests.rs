// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Snapshot persistence across a simulated restart.

use chrono::Utc;
use keyrelay_core::{
    CaptionEntity, ChatRef, Countdown, CountdownHandle, CountdownObserver, FileRef, KeyMode,
    KeyStyle, MessageId, Sender, UploadMethod, UserId,
};
use keyrelay_storage::{AccessControl, PendingItem, SetupSlot, SnapshotFiles, Status, Store};
use tokio::sync::Mutex;

struct Idle;

#[async_trait::async_trait]
impl CountdownObserver for Idle {
    async fn on_tick(&self, _handle: &CountdownHandle, _remaining: u32) {}
    async fn on_complete(&self, _handle: &CountdownHandle) {}
}

fn seed() -> AccessControl {
    let mut access = AccessControl::new(UserId(1));
    access.allowed.insert(UserId(2));
    access
}

#[tokio::test]
async fn missing_files_load_from_seed() {
    let dir = tempfile::tempdir().unwrap();
    let files = SnapshotFiles::new(dir.path(), "state.json", "config.json");

    let store = files.load(seed()).await.unwrap();
    assert_eq!(store.access.owner, UserId(1));
    assert!(store.access.is_allowed(UserId(2)));
    assert!(store.sessions.is_empty());
}

#[tokio::test]
async fn counters_and_setups_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let files = SnapshotFiles::new(dir.path(), "state.json", "config.json");
    let mut store = files.load(seed()).await.unwrap();

    let operator = Sender {
        id: UserId(2),
        first_name: "Op".into(),
        username: Some("op".into()),
    };
    store.profiles.register(&operator, Utc::now());
    store.profiles.get_mut(UserId(2)).unwrap().channel = Some(ChatRef::Username("drop".into()));

    let session = store.sessions.entry(UserId(2));
    session.stats.record(UploadMethod::Method2, 3, 1);
    session.stats.record(UploadMethod::Method1, 1, 1);
    session.status = Status::WaitingSetupSource(SetupSlot::new(2).unwrap());
    session.key_mode = KeyStyle::Quote;
    session.countdown.arm(Countdown::new(10).spawn(Idle));
    session.countdown_msg_id = Some(MessageId(55));

    let slot = store.setups.get_mut(SetupSlot::new(1).unwrap());
    slot.source_channel = Some(ChatRef::Id(-1001));
    slot.dest_channel = Some(ChatRef::Username("dest".into()));
    slot.dest_caption = Some("Fresh build\nKey -".into());
    slot.key_mode = KeyMode::Manual;
    slot.style = KeyStyle::Quote;
    slot.enabled = true;
    slot.completed_count = 17;

    store.access.bot_active = false;

    let before_stats = store.sessions.get(UserId(2)).unwrap().stats;
    let before_setups = store.setups.clone();
    let before_profiles = store.profiles.clone();

    let shared = Mutex::new(store);
    files.flush_store(&shared).await.unwrap();
    drop(shared);

    let reloaded = files.load(AccessControl::new(UserId(99))).await.unwrap();
    let session = reloaded.sessions.get(UserId(2)).unwrap();

    assert_eq!(session.stats, before_stats);
    assert_eq!(reloaded.setups, before_setups);
    assert_eq!(reloaded.profiles, before_profiles);
    assert_eq!(session.status, Status::WaitingSetupSource(SetupSlot::new(2).unwrap()));
    assert_eq!(session.countdown_msg_id, Some(MessageId(55)));
    assert!(session.countdown.current().is_none());
    assert_eq!(reloaded.access.owner, UserId(1));
    assert!(!reloaded.access.bot_active);
}

#[tokio::test]
async fn leftover_batched_items_are_discarded_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let files = SnapshotFiles::new(dir.path(), "state.json", "config.json");
    let mut store = Store::new(seed());
    store.auto4.pending_apks.push(PendingItem {
        file: FileRef::new("f"),
        caption: "Key - A1B2".into(),
        message_id: MessageId(3),
        chat_id: -1001,
        received_at: Utc::now(),
        entities: vec![CaptionEntity::code(0, 2)],
    });
    store.auto4.waiting_since = Some(Utc::now());

    files.flush(store.state_snapshot(), store.config_snapshot()).await.unwrap();
    let raw = std::fs::read_to_string(files.state_path()).unwrap();
    assert!(raw.contains("pending_apks"));
    assert!(!raw.contains("\"timer\""));

    let reloaded = files.load(seed()).await.unwrap();
    assert!(reloaded.auto4.pending_apks.is_empty());
    assert!(reloaded.auto4.waiting_since.is_none());
}

#[tokio::test]
async fn batch_collecting_at_shutdown_resumes_awaiting_its_key() {
    let dir = tempfile::tempdir().unwrap();
    let files = SnapshotFiles::new(dir.path(), "state.json", "config.json");
    let mut store = Store::new(seed());

    let collecting = store.sessions.entry(UserId(2));
    collecting.current_method = Some(UploadMethod::Method2);
    collecting.push_file(FileRef::new("a"), "a.apk");
    collecting.push_file(FileRef::new("b"), "b.apk");
    collecting.countdown.arm(Countdown::new(10).spawn(Idle));
    collecting.countdown_msg_id = Some(MessageId(70));

    let keyed = store.sessions.entry(UserId(3));
    keyed.push_file(FileRef::new("c"), "c.apk");
    keyed.saved_key = Some("KEY1".into());
    keyed.preview_message_id = Some(MessageId(71));

    files.flush(store.state_snapshot(), store.config_snapshot()).await.unwrap();
    let reloaded = files.load(seed()).await.unwrap();

    let session = reloaded.sessions.get(UserId(2)).unwrap();
    assert_eq!(session.file_count(), 2);
    assert!(session.waiting_key);
    assert!(session.key_prompt_sent);
    assert!(session.countdown_msg_id.is_none());
    assert!(session.countdown.current().is_none());

    let session = reloaded.sessions.get(UserId(3)).unwrap();
    assert!(!session.waiting_key);
    assert!(!session.key_prompt_sent);
    assert_eq!(session.saved_key.as_deref(), Some("KEY1"));
    assert_eq!(session.preview_message_id, Some(MessageId(71)));
}

#[tokio::test]
async fn corrupt_snapshot_is_a_storage_error() {
    let dir = tempfile::tempdir().unwrap();
    let files = SnapshotFiles::new(dir.path(), "state.json", "config.json");
    std::fs::write(files.state_path(), b"{not json").unwrap();

    let err = files.load(seed()).await.unwrap_err();
    assert!(matches!(err, keyrelay_core::KeyrelayError::Storage { .. }));
}
