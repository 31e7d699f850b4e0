// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain records held in the process-wide tables.

use std::fmt;
use std::ops::RangeInclusive;

use chrono::{DateTime, Utc};
use keyrelay_core::{
    CaptionEntity, ChatRef, CountdownSlot, FileRef, KeyMode, KeyStyle, MessageId, UploadMethod,
};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// One of the four auto-forward pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SetupSlot(u8);

impl SetupSlot {
    pub const ALL: [SetupSlot; 4] = [SetupSlot(1), SetupSlot(2), SetupSlot(3), SetupSlot(4)];
    /// Single-item slots handled one post at a time.
    pub const SINGLE: [SetupSlot; 3] = [SetupSlot(1), SetupSlot(2), SetupSlot(3)];
    /// The slot that batches posts before acting.
    pub const BATCHED: SetupSlot = SetupSlot(4);

    pub fn new(number: u8) -> Option<Self> {
        (1..=4).contains(&number).then_some(Self(number))
    }

    pub fn number(self) -> u8 {
        self.0
    }

    pub fn is_batched(self) -> bool {
        self == Self::BATCHED
    }

    /// Accepted package size in MB, for slots that gate on size.
    pub fn size_range_mb(self) -> Option<RangeInclusive<f64>> {
        match self.0 {
            1 => Some(1.0..=50.0),
            2 => Some(80.0..=2048.0),
            _ => None,
        }
    }
}

impl fmt::Display for SetupSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for SetupSlot {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("setup slot must be 1-4, got {value}"))
    }
}

impl From<SetupSlot> for u8 {
    fn from(slot: SetupSlot) -> Self {
        slot.0
    }
}

/// Workflow cursor inside the selected method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "slot", rename_all = "snake_case")]
pub enum Status {
    #[default]
    Normal,
    SelectingMethod,
    WaitingChannel,
    WaitingCaption,
    /// Replacement template for the batch being prepared.
    WaitingNewCaption,
    WaitingSetupSource(SetupSlot),
    WaitingSetupDest(SetupSlot),
    WaitingSetupCaption(SetupSlot),
}

/// A Method 1 file held while the operator types its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFile {
    pub file: FileRef,
    pub file_name: String,
}

/// A composed Method 1 post waiting for confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPost {
    pub file: FileRef,
    pub caption: String,
    pub channel: ChatRef,
    pub confirm_message_id: Option<MessageId>,
}

/// Where a single post landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRef {
    pub channel: ChatRef,
    pub message_id: MessageId,
}

/// What was sent for the most recent Method 2 batch.
///
/// The three lists stay parallel: entry `i` of each describes item `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedBatch {
    pub file_ids: Vec<FileRef>,
    pub filenames: Vec<String>,
    pub key: String,
    pub key_mode: KeyStyle,
    pub caption_template: String,
    pub channel: ChatRef,
    pub post_message_ids: Vec<MessageId>,
}

impl PostedBatch {
    fn remove(&mut self, index: usize) {
        for len in [self.file_ids.len(), self.filenames.len(), self.post_message_ids.len()] {
            if index >= len {
                return;
            }
        }
        self.file_ids.remove(index);
        self.filenames.remove(index);
        self.post_message_ids.remove(index);
    }
}

/// Last activity, kept for the operator overview.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tracking {
    pub last_apk_at: Option<DateTime<Utc>>,
    pub last_method: Option<UploadMethod>,
    pub last_style: Option<KeyStyle>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// Counter windows for usage statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StatScope {
    Lifetime,
    #[strum(to_string = "eight_hour", serialize = "8h")]
    EightHour,
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub apks: u64,
    pub keys: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodCounters {
    pub method1: Counters,
    pub method2: Counters,
}

impl MethodCounters {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn total_apks(&self) -> u64 {
        self.method1.apks + self.method2.apks
    }

    pub fn total_keys(&self) -> u64 {
        self.method1.keys + self.method2.keys
    }

    fn add(&mut self, method: UploadMethod, apks: u64, keys: u64) {
        let counters = match method {
            UploadMethod::Method1 => &mut self.method1,
            UploadMethod::Method2 => &mut self.method2,
        };
        counters.apks += apks;
        counters.keys += keys;
    }
}

/// Per-operator usage counters across every scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageStats {
    pub lifetime: MethodCounters,
    pub eight_hour: MethodCounters,
    pub daily: MethodCounters,
    pub weekly: MethodCounters,
    pub monthly: MethodCounters,
}

impl UsageStats {
    /// Adds one completed post to every scope.
    pub fn record(&mut self, method: UploadMethod, apks: u64, keys: u64) {
        for scope in [
            &mut self.lifetime,
            &mut self.eight_hour,
            &mut self.daily,
            &mut self.weekly,
            &mut self.monthly,
        ] {
            scope.add(method, apks, keys);
        }
    }

    pub fn scope(&self, scope: StatScope) -> &MethodCounters {
        match scope {
            StatScope::Lifetime => &self.lifetime,
            StatScope::EightHour => &self.eight_hour,
            StatScope::Daily => &self.daily,
            StatScope::Weekly => &self.weekly,
            StatScope::Monthly => &self.monthly,
        }
    }

    /// Zeroes one rolling scope. The lifetime scope is never reset.
    pub fn reset(&mut self, scope: StatScope) {
        let target = match scope {
            StatScope::Lifetime => return,
            StatScope::EightHour => &mut self.eight_hour,
            StatScope::Daily => &mut self.daily,
            StatScope::Weekly => &mut self.weekly,
            StatScope::Monthly => &mut self.monthly,
        };
        *target = MethodCounters::default();
    }
}

/// Mutable per-operator workflow state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorSession {
    pub current_method: Option<UploadMethod>,
    pub status: Status,
    pub session_files: Vec<FileRef>,
    pub session_filenames: Vec<String>,
    pub saved_key: Option<String>,
    pub key_mode: KeyStyle,
    pub waiting_key: bool,
    /// A key prompt was shown for the current batch.
    pub key_prompt_sent: bool,
    #[serde(skip)]
    pub countdown: CountdownSlot,
    pub countdown_msg_id: Option<MessageId>,
    pub preview_message_id: Option<MessageId>,
    pub pending_file: Option<PendingFile>,
    pub pending_post: Option<PendingPost>,
    pub last_post: Option<PostRef>,
    pub last_post_session: Option<PostedBatch>,
    /// Posted message ids of the last batch; `None` marks a deleted item
    /// until the list is compacted.
    pub apk_posts: Vec<Option<MessageId>>,
    pub last_post_link: Option<String>,
    pub tracking: Tracking,
    pub stats: UsageStats,
}

impl OperatorSession {
    /// Appends one item to the batch buffer.
    pub fn push_file(&mut self, file: FileRef, name: impl Into<String>) {
        self.session_files.push(file);
        self.session_filenames.push(name.into());
    }

    pub fn file_count(&self) -> usize {
        self.session_files.len()
    }

    /// Drops the batch being collected: buffer, key, prompt flags, style,
    /// and the countdown. Returns the countdown message to delete, if any.
    pub fn clear_batch(&mut self) -> Option<MessageId> {
        self.countdown.cancel();
        self.session_files.clear();
        self.session_filenames.clear();
        self.saved_key = None;
        self.waiting_key = false;
        self.key_prompt_sent = false;
        self.key_mode = KeyStyle::Normal;
        self.countdown_msg_id.take()
    }

    /// Countdowns do not survive a restart. A batch that was still collecting
    /// moves straight to awaiting its key; the countdown message is stale.
    /// Returns whether the session changed.
    pub fn resume_collecting(&mut self) -> bool {
        if self.session_files.is_empty() || self.saved_key.is_some() || self.key_prompt_sent {
            return false;
        }
        self.waiting_key = true;
        self.key_prompt_sent = true;
        self.countdown_msg_id = None;
        true
    }

    /// Clears the posted-batch snapshot and its message list.
    pub fn clear_posted(&mut self) {
        self.last_post_session = None;
        self.apk_posts.clear();
        self.last_post_link = None;
    }

    /// Full Method 2 wipe. Returns panel messages that should disappear.
    pub fn erase_all(&mut self) -> Vec<MessageId> {
        let mut stale: Vec<MessageId> = self.clear_batch().into_iter().collect();
        stale.extend(self.preview_message_id.take());
        self.clear_posted();
        if self.status == Status::WaitingNewCaption {
            self.status = Status::Normal;
        }
        stale
    }

    /// Records a freshly sent batch.
    pub fn set_posted(&mut self, batch: PostedBatch, link: Option<String>) {
        self.apk_posts = batch.post_message_ids.iter().copied().map(Some).collect();
        self.last_post_session = Some(batch);
        self.last_post_link = link;
    }

    /// Live posted message ids in order.
    pub fn posted_ids(&self) -> Vec<MessageId> {
        self.apk_posts.iter().flatten().copied().collect()
    }

    /// Tombstones item `index` and compacts the lists.
    ///
    /// Returns the message that was removed. When nothing is left the whole
    /// snapshot is cleared.
    pub fn remove_posted(&mut self, index: usize) -> Option<MessageId> {
        let removed = self.apk_posts.get_mut(index)?.take()?;
        if let Some(batch) = self.last_post_session.as_mut() {
            batch.remove(index);
        }
        self.apk_posts.retain(Option::is_some);
        if self.apk_posts.is_empty() {
            self.clear_posted();
        }
        Some(removed)
    }
}

/// Settings of a known user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorProfile {
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub channel: Option<ChatRef>,
    #[serde(default)]
    pub caption: Option<String>,
    pub first_seen: DateTime<Utc>,
}

/// One auto-forward pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSetup {
    pub source_channel: Option<ChatRef>,
    pub dest_channel: Option<ChatRef>,
    pub dest_caption: Option<String>,
    pub key_mode: KeyMode,
    pub style: KeyStyle,
    pub enabled: bool,
    pub completed_count: u64,
}

impl Default for AutoSetup {
    fn default() -> Self {
        Self {
            source_channel: None,
            dest_channel: None,
            dest_caption: None,
            key_mode: KeyMode::Auto,
            style: KeyStyle::Mono,
            enabled: false,
            completed_count: 0,
        }
    }
}

/// A channel post captured for the batched slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingItem {
    pub file: FileRef,
    pub caption: String,
    pub message_id: MessageId,
    pub chat_id: i64,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub entities: Vec<CaptionEntity>,
}

/// Process-wide buffer of the batched slot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PendingBatch {
    pub pending_apks: Vec<PendingItem>,
    #[serde(skip)]
    pub timer: CountdownSlot,
    pub waiting_since: Option<DateTime<Utc>>,
}

impl PendingBatch {
    /// Empties the buffer and drops the timer reference.
    pub fn reset(&mut self) -> Vec<PendingItem> {
        self.timer.cancel();
        self.waiting_since = None;
        std::mem::take(&mut self.pending_apks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posted_session(n: i32) -> OperatorSession {
        let mut session = OperatorSession::default();
        let batch = PostedBatch {
            file_ids: (0..n).map(|i| FileRef::new(format!("f{i}"))).collect(),
            filenames: (0..n).map(|i| format!("app{i}.apk")).collect(),
            key: "KEY1".into(),
            key_mode: KeyStyle::Mono,
            caption_template: "New app\nKey -".into(),
            channel: ChatRef::Username("drop".into()),
            post_message_ids: (0..n).map(|i| MessageId(100 + i)).collect(),
        };
        session.set_posted(batch, Some("https://t.me/drop/100".into()));
        session
    }

    #[test]
    fn removing_the_middle_item_keeps_order() {
        let mut session = posted_session(3);
        assert_eq!(session.remove_posted(1), Some(MessageId(101)));

        assert_eq!(session.posted_ids(), vec![MessageId(100), MessageId(102)]);
        let batch = session.last_post_session.as_ref().unwrap();
        assert_eq!(batch.filenames, vec!["app0.apk", "app2.apk"]);
        assert_eq!(batch.file_ids, vec![FileRef::new("f0"), FileRef::new("f2")]);
        assert_eq!(batch.post_message_ids, session.posted_ids());
    }

    #[test]
    fn removing_the_last_remaining_item_clears_the_snapshot() {
        let mut session = posted_session(1);
        assert_eq!(session.remove_posted(0), Some(MessageId(100)));
        assert!(session.last_post_session.is_none());
        assert!(session.apk_posts.is_empty());
        assert!(session.last_post_link.is_none());
    }

    #[test]
    fn removing_out_of_range_is_ignored() {
        let mut session = posted_session(2);
        assert_eq!(session.remove_posted(5), None);
        assert_eq!(session.posted_ids().len(), 2);
    }

    #[test]
    fn clear_batch_keeps_posted_snapshot() {
        let mut session = posted_session(2);
        session.push_file(FileRef::new("n"), "new.apk");
        session.saved_key = Some("KEY2".into());
        session.countdown_msg_id = Some(MessageId(9));

        assert_eq!(session.clear_batch(), Some(MessageId(9)));
        assert_eq!(session.file_count(), 0);
        assert!(session.session_filenames.is_empty());
        assert!(session.saved_key.is_none());
        assert!(session.last_post_session.is_some());
    }

    #[test]
    fn erase_all_wipes_everything() {
        let mut session = posted_session(2);
        session.push_file(FileRef::new("n"), "new.apk");
        session.preview_message_id = Some(MessageId(7));
        session.key_mode = KeyStyle::Quote;

        assert_eq!(session.erase_all(), vec![MessageId(7)]);
        assert_eq!(session.file_count(), 0);
        assert_eq!(session.key_mode, KeyStyle::Normal);
        assert!(session.last_post_session.is_none());
        assert!(session.apk_posts.is_empty());
    }

    #[test]
    fn stats_record_all_scopes_and_reset_one() {
        let mut stats = UsageStats::default();
        stats.record(UploadMethod::Method2, 3, 1);
        stats.record(UploadMethod::Method1, 1, 1);

        assert_eq!(stats.scope(StatScope::Daily).total_apks(), 4);
        assert_eq!(stats.scope(StatScope::Weekly).method2.keys, 1);

        stats.reset(StatScope::Daily);
        stats.reset(StatScope::Lifetime);
        assert!(stats.daily.is_empty());
        assert_eq!(stats.lifetime.total_apks(), 4);
        assert_eq!(stats.monthly.total_keys(), 2);
    }

    #[test]
    fn scope_parses_short_names() {
        assert_eq!("8h".parse::<StatScope>().unwrap(), StatScope::EightHour);
        assert_eq!("weekly".parse::<StatScope>().unwrap(), StatScope::Weekly);
    }

    #[test]
    fn size_gates_per_slot() {
        let one = SetupSlot::new(1).unwrap().size_range_mb().unwrap();
        assert!(one.contains(&50.0));
        assert!(!one.contains(&90.0));
        assert!(SetupSlot::new(3).unwrap().size_range_mb().is_none());
        assert!(SetupSlot::new(0).is_none());
        assert!(SetupSlot::new(5).is_none());
    }

    #[test]
    fn status_serializes_with_slot_payload() {
        let json = serde_json::to_string(&Status::WaitingSetupDest(SetupSlot::BATCHED)).unwrap();
        assert_eq!(json, r#"{"state":"waiting_setup_dest","slot":4}"#);
        let back: Status = serde_json::from_str(r#"{"state":"normal"}"#).unwrap();
        assert_eq!(back, Status::Normal);
    }
}
