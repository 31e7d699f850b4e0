// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identifiers and message shapes shared by the engine and the adapters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::KeyrelayError;

/// Literal marker in caption templates that receives the styled key.
pub const KEY_PLACEHOLDER: &str = "Key -";

/// Numeric identity of a platform user. Private chats share the user's id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    /// The private chat with this user.
    pub fn chat(self) -> ChatRef {
        ChatRef::Id(self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = KeyrelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(UserId)
            .map_err(|_| KeyrelayError::Validation(format!("`{s}` is not a numeric user id")))
    }
}

/// Identifier of a sent message within its chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i32);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque platform handle of an uploaded file. Reposting never re-uploads bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileRef(pub String);

impl FileRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// A chat addressed by public username or by numeric id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ChatRef {
    Id(i64),
    /// Username without the leading `@`.
    Username(String),
}

impl ChatRef {
    /// Parses an operator-supplied channel reference.
    ///
    /// Accepts `@name` or a `-100…` supergroup/channel id only.
    pub fn parse_channel(input: &str) -> Result<Self, KeyrelayError> {
        let input = input.trim();
        if let Some(name) = input.strip_prefix('@') {
            if name.is_empty() || name.chars().any(char::is_whitespace) {
                return Err(KeyrelayError::Validation(format!(
                    "`{input}` is not a valid channel username"
                )));
            }
            return Ok(Self::Username(name.to_string()));
        }
        if input.starts_with("-100") {
            return input.parse::<i64>().map(Self::Id).map_err(|_| {
                KeyrelayError::Validation(format!("`{input}` is not a valid channel id"))
            });
        }
        Err(KeyrelayError::Validation(format!(
            "channel must start with @ or -100, got `{input}`"
        )))
    }

    /// Public link to a message in this chat, when one can be built.
    pub fn post_link(&self, message: MessageId) -> Option<String> {
        match self {
            Self::Username(name) => Some(format!("https://t.me/{name}/{message}")),
            Self::Id(id) => {
                let raw = id.to_string();
                raw.strip_prefix("-100")
                    .filter(|rest| !rest.is_empty())
                    .map(|rest| format!("https://t.me/c/{rest}/{message}"))
            }
        }
    }

    /// Whether an inbound post from `chat_id`/`username` comes from this chat.
    pub fn matches(&self, chat_id: i64, username: Option<&str>) -> bool {
        match self {
            Self::Id(id) => *id == chat_id,
            Self::Username(name) => {
                username.is_some_and(|u| u.trim_start_matches('@').eq_ignore_ascii_case(name))
            }
        }
    }
}

impl fmt::Display for ChatRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Username(name) => write!(f, "@{name}"),
        }
    }
}

impl FromStr for ChatRef {
    type Err = KeyrelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(name) = s.strip_prefix('@') {
            if name.is_empty() {
                return Err(KeyrelayError::Validation("empty chat username".into()));
            }
            return Ok(Self::Username(name.to_string()));
        }
        s.parse::<i64>()
            .map(Self::Id)
            .map_err(|_| KeyrelayError::Validation(format!("`{s}` is not a chat reference")))
    }
}

impl TryFrom<String> for ChatRef {
    type Error = KeyrelayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChatRef> for String {
    fn from(chat: ChatRef) -> Self {
        chat.to_string()
    }
}

/// Rich-text annotation kinds the key extractor cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
    Code,
    Pre,
    Other,
}

/// An annotation span over a caption.
///
/// `offset` and `length` count UTF-16 code units, as the platform reports them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionEntity {
    pub kind: EntityKind,
    pub offset: usize,
    pub length: usize,
}

impl CaptionEntity {
    pub fn code(offset: usize, length: usize) -> Self {
        Self {
            kind: EntityKind::Code,
            offset,
            length,
        }
    }
}

/// A document attached to an inbound message or channel post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingDocument {
    pub file: FileRef,
    pub file_name: Option<String>,
    pub size_bytes: u64,
    pub caption: Option<String>,
    #[serde(default)]
    pub entities: Vec<CaptionEntity>,
}

impl IncomingDocument {
    const PACKAGE_EXTENSION: &'static str = ".apk";

    /// Size in mebibytes.
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }

    /// Whether the file name carries the package extension.
    pub fn is_package(&self) -> bool {
        self.file_name
            .as_deref()
            .is_some_and(|name| name.to_ascii_lowercase().ends_with(Self::PACKAGE_EXTENSION))
    }

    pub fn display_name(&self) -> &str {
        self.file_name.as_deref().unwrap_or("unnamed.apk")
    }

    pub fn caption_text(&self) -> &str {
        self.caption.as_deref().unwrap_or_default()
    }
}

/// A post published in a channel the bot can see.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelPost {
    pub chat_id: i64,
    pub chat_username: Option<String>,
    pub message_id: MessageId,
    pub document: Option<IncomingDocument>,
}

impl ChannelPost {
    pub fn chat(&self) -> ChatRef {
        ChatRef::Id(self.chat_id)
    }
}

/// The user behind a private message or button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: UserId,
    pub first_name: String,
    pub username: Option<String>,
}

/// How the key is rendered inside a caption.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum KeyStyle {
    #[default]
    Normal,
    Quote,
    Mono,
}

/// Key extraction policy of an auto-forward slot.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum KeyMode {
    /// Caption pattern first, then the first code annotation.
    #[default]
    Auto,
    /// Caption pattern only.
    Manual,
}

/// Operator-driven upload workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UploadMethod {
    Method1,
    Method2,
}

/// One element of a grouped document post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupItem {
    pub file: FileRef,
    pub caption: Option<String>,
}

/// What pressing a button does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    /// Opaque payload delivered back as a callback.
    Callback(String),
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: ButtonAction,
}

impl Button {
    pub fn callback(label: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Callback(payload.into()),
        }
    }

    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Url(url.into()),
        }
    }
}

/// Inline keyboard laid out in rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(mut self, buttons: impl IntoIterator<Item = Button>) -> Self {
        let row: Vec<Button> = buttons.into_iter().collect();
        if !row.is_empty() {
            self.rows.push(row);
        }
        self
    }

    /// Every callback payload, row-major. Mostly useful in tests.
    pub fn payloads(&self) -> Vec<&str> {
        self.rows
            .iter()
            .flatten()
            .filter_map(|b| match &b.action {
                ButtonAction::Callback(p) => Some(p.as_str()),
                ButtonAction::Url(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_channel_accepts_username_and_supergroup_id() {
        assert_eq!(
            ChatRef::parse_channel("@apkdrop").unwrap(),
            ChatRef::Username("apkdrop".into())
        );
        assert_eq!(
            ChatRef::parse_channel(" -1001234567890 ").unwrap(),
            ChatRef::Id(-1001234567890)
        );
    }

    #[test]
    fn parse_channel_rejects_other_shapes() {
        for bad in ["apkdrop", "12345", "-12345", "@", "-100abc", ""] {
            assert!(
                matches!(ChatRef::parse_channel(bad), Err(KeyrelayError::Validation(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn post_links() {
        let msg = MessageId(42);
        assert_eq!(
            ChatRef::Username("apkdrop".into()).post_link(msg).as_deref(),
            Some("https://t.me/apkdrop/42")
        );
        assert_eq!(
            ChatRef::Id(-1001234567890).post_link(msg).as_deref(),
            Some("https://t.me/c/1234567890/42")
        );
        assert_eq!(ChatRef::Id(777).post_link(msg), None);
    }

    #[test]
    fn source_matching_by_username_is_case_insensitive() {
        let chat = ChatRef::Username("ApkSource".into());
        assert!(chat.matches(-1001, Some("apksource")));
        assert!(!chat.matches(-1001, None));
        assert!(ChatRef::Id(-1001).matches(-1001, None));
        assert!(!ChatRef::Id(-1001).matches(-1002, Some("apksource")));
    }

    #[test]
    fn chat_ref_serializes_as_string() {
        let json = serde_json::to_string(&ChatRef::Username("drop".into())).unwrap();
        assert_eq!(json, "\"@drop\"");
        let back: ChatRef = serde_json::from_str("\"-1009\"").unwrap();
        assert_eq!(back, ChatRef::Id(-1009));
    }

    #[test]
    fn package_detection_ignores_case() {
        let mut doc = IncomingDocument {
            file: FileRef::new("f"),
            file_name: Some("App.APK".into()),
            size_bytes: 3 * 1024 * 1024,
            caption: None,
            entities: vec![],
        };
        assert!(doc.is_package());
        assert!((doc.size_mb() - 3.0).abs() < f64::EPSILON);
        doc.file_name = Some("notes.txt".into());
        assert!(!doc.is_package());
        doc.file_name = None;
        assert!(!doc.is_package());
    }

    #[test]
    fn key_style_round_trips_through_strum() {
        assert_eq!("quote".parse::<KeyStyle>().unwrap(), KeyStyle::Quote);
        assert_eq!(KeyStyle::Mono.to_string(), "mono");
        assert_eq!(KeyMode::default(), KeyMode::Auto);
    }

    #[test]
    fn keyboard_skips_empty_rows() {
        let kb = Keyboard::new()
            .row([Button::callback("Yes", "share_yes")])
            .row(Vec::new())
            .row([Button::url("Open", "https://t.me/x/1")]);
        assert_eq!(kb.rows.len(), 2);
        assert_eq!(kb.payloads(), vec!["share_yes"]);
    }

    proptest::proptest! {
        #[test]
        fn supergroup_ids_parse_and_link(rest in 1u64..10_000_000_000u64, msg in 1i32..1_000_000) {
            let raw = format!("-100{rest}");
            let chat = ChatRef::parse_channel(&raw).unwrap();
            proptest::prop_assert_eq!(&chat, &ChatRef::Id(raw.parse().unwrap()));
            proptest::prop_assert_eq!(
                chat.post_link(MessageId(msg)),
                Some(format!("https://t.me/c/{rest}/{msg}"))
            );
        }

        #[test]
        fn usernames_survive_the_string_form(name in "[A-Za-z][A-Za-z0-9_]{3,30}") {
            let chat = ChatRef::parse_channel(&format!("@{name}")).unwrap();
            let text: String = chat.clone().into();
            proptest::prop_assert_eq!(text.parse::<ChatRef>().unwrap(), chat);
        }
    }
}
