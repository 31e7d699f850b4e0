// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recording transport for deterministic testing.
//!
//! `MockTransport` implements [`Transport`] by appending every call to a log
//! and handing out increasing message ids. Failures are opt-in: source posts
//! can be marked deleted, document sends can start failing after a quota,
//! and admin checks or chat lookups can be denied.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI32, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use keyrelay_core::{ChatRef, FileRef, GroupItem, KeyrelayError, Keyboard, MessageId, Transport, UserId};

/// One recorded outbound call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SendText {
        chat: ChatRef,
        message: MessageId,
        text: String,
        keyboard: Option<Keyboard>,
    },
    SendDocument {
        chat: ChatRef,
        message: MessageId,
        file: FileRef,
        caption: Option<String>,
        silent: bool,
    },
    SendGroup {
        chat: ChatRef,
        messages: Vec<MessageId>,
        items: Vec<GroupItem>,
    },
    Edit {
        chat: ChatRef,
        message: MessageId,
        text: String,
        keyboard: Option<Keyboard>,
    },
    Delete {
        chat: ChatRef,
        message: MessageId,
    },
    Forward {
        to: ChatRef,
        from: ChatRef,
        message: MessageId,
    },
}

#[derive(Default)]
struct Faults {
    deleted_posts: HashSet<(ChatRef, MessageId)>,
    documents_left: Option<usize>,
    fail_deletes: bool,
    unreachable_users: HashSet<UserId>,
    non_admins: HashSet<Option<UserId>>,
    resolvable: HashMap<String, i64>,
}

/// A transport that records instead of sending.
pub struct MockTransport {
    calls: Mutex<Vec<Call>>,
    faults: Mutex<Faults>,
    next_id: AtomicI32,
}

impl MockTransport {
    /// Create a mock transport with no failures configured.
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            faults: Mutex::new(Faults::default()),
            next_id: AtomicI32::new(100),
        }
    }

    fn next_message(&self) -> MessageId {
        MessageId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn failure(message: impl Into<String>) -> KeyrelayError {
        KeyrelayError::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Forwarding this post fails as if it had been deleted.
    pub async fn delete_source_post(&self, chat: ChatRef, message: MessageId) {
        self.faults.lock().await.deleted_posts.insert((chat, message));
    }

    /// Allow `n` more document sends, then fail every following one.
    pub async fn fail_documents_after(&self, n: usize) {
        self.faults.lock().await.documents_left = Some(n);
    }

    /// Every delete call fails.
    pub async fn fail_deletes(&self) {
        self.faults.lock().await.fail_deletes = true;
    }

    /// Text sends to this user fail.
    pub async fn make_unreachable(&self, user: UserId) {
        self.faults.lock().await.unreachable_users.insert(user);
    }

    /// Admin checks for `user` (the bot itself for `None`) answer no.
    pub async fn deny_admin(&self, user: Option<UserId>) {
        self.faults.lock().await.non_admins.insert(user);
    }

    /// `@username` resolves to `id`. Unknown usernames fail to resolve.
    pub async fn resolve_as(&self, username: &str, id: i64) {
        self.faults
            .lock()
            .await
            .resolvable
            .insert(username.to_ascii_lowercase(), id);
    }

    /// Every call so far, in order.
    pub async fn calls(&self) -> Vec<Call> {
        self.calls.lock().await.clone()
    }

    /// Clear the call log.
    pub async fn clear(&self) {
        self.calls.lock().await.clear();
    }

    /// Texts sent to `chat`, in order.
    pub async fn texts_to(&self, chat: &ChatRef) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                Call::SendText { chat: c, text, .. } if c == chat => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Text of every send or edit aimed at `chat`, in order.
    pub async fn screens_for(&self, chat: &ChatRef) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                Call::SendText { chat: c, text, .. } | Call::Edit { chat: c, text, .. }
                    if c == chat =>
                {
                    Some(text.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// The keyboard of the most recent send or edit aimed at `chat`.
    pub async fn last_keyboard(&self, chat: &ChatRef) -> Option<Keyboard> {
        self.calls
            .lock()
            .await
            .iter()
            .rev()
            .find_map(|call| match call {
                Call::SendText { chat: c, keyboard, .. } | Call::Edit { chat: c, keyboard, .. }
                    if c == chat =>
                {
                    Some(keyboard.clone())
                }
                _ => None,
            })
            .flatten()
    }

    /// `(file, caption)` of every single document posted to `chat`.
    pub async fn documents_to(&self, chat: &ChatRef) -> Vec<(FileRef, Option<String>)> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                Call::SendDocument {
                    chat: c,
                    file,
                    caption,
                    ..
                } if c == chat => Some((file.clone(), caption.clone())),
                _ => None,
            })
            .collect()
    }

    /// Messages deleted from `chat`.
    pub async fn deleted_in(&self, chat: &ChatRef) -> Vec<MessageId> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                Call::Delete { chat: c, message } if c == chat => Some(*message),
                _ => None,
            })
            .collect()
    }

    /// How many forwards were attempted.
    pub async fn forward_count(&self) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|call| matches!(call, Call::Forward { .. }))
            .count()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_text(
        &self,
        chat: &ChatRef,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<MessageId, KeyrelayError> {
        let unreachable = match chat {
            ChatRef::Id(id) => self
                .faults
                .lock()
                .await
                .unreachable_users
                .contains(&UserId(*id)),
            ChatRef::Username(_) => false,
        };
        if unreachable {
            return Err(Self::failure("Forbidden: bot was blocked by the user"));
        }
        let message = self.next_message();
        self.calls.lock().await.push(Call::SendText {
            chat: chat.clone(),
            message,
            text: text.to_string(),
            keyboard,
        });
        Ok(message)
    }

    async fn send_document(
        &self,
        chat: &ChatRef,
        file: &FileRef,
        caption: Option<&str>,
        silent: bool,
    ) -> Result<MessageId, KeyrelayError> {
        {
            let mut faults = self.faults.lock().await;
            if let Some(left) = faults.documents_left.as_mut() {
                if *left == 0 {
                    return Err(Self::failure("Bad Request: chat not found"));
                }
                *left -= 1;
            }
        }
        let message = self.next_message();
        self.calls.lock().await.push(Call::SendDocument {
            chat: chat.clone(),
            message,
            file: file.clone(),
            caption: caption.map(str::to_string),
            silent,
        });
        Ok(message)
    }

    async fn send_document_group(
        &self,
        chat: &ChatRef,
        items: &[GroupItem],
    ) -> Result<Vec<MessageId>, KeyrelayError> {
        let messages: Vec<MessageId> = items.iter().map(|_| self.next_message()).collect();
        self.calls.lock().await.push(Call::SendGroup {
            chat: chat.clone(),
            messages: messages.clone(),
            items: items.to_vec(),
        });
        Ok(messages)
    }

    async fn edit_text(
        &self,
        chat: &ChatRef,
        message: MessageId,
        text: &str,
        keyboard: Option<Keyboard>,
    ) -> Result<(), KeyrelayError> {
        self.calls.lock().await.push(Call::Edit {
            chat: chat.clone(),
            message,
            text: text.to_string(),
            keyboard,
        });
        Ok(())
    }

    async fn delete_message(&self, chat: &ChatRef, message: MessageId) -> Result<(), KeyrelayError> {
        if self.faults.lock().await.fail_deletes {
            return Err(Self::failure("Bad Request: message can't be deleted"));
        }
        self.calls.lock().await.push(Call::Delete {
            chat: chat.clone(),
            message,
        });
        Ok(())
    }

    async fn forward_message(
        &self,
        to: &ChatRef,
        from: &ChatRef,
        message: MessageId,
    ) -> Result<MessageId, KeyrelayError> {
        self.calls.lock().await.push(Call::Forward {
            to: to.clone(),
            from: from.clone(),
            message,
        });
        if self
            .faults
            .lock()
            .await
            .deleted_posts
            .contains(&(from.clone(), message))
        {
            return Err(Self::failure("Bad Request: message to forward not found"));
        }
        Ok(self.next_message())
    }

    async fn resolve_chat(&self, chat: &ChatRef) -> Result<i64, KeyrelayError> {
        match chat {
            ChatRef::Id(id) => Ok(*id),
            ChatRef::Username(name) => self
                .faults
                .lock()
                .await
                .resolvable
                .get(&name.to_ascii_lowercase())
                .copied()
                .ok_or_else(|| Self::failure("Bad Request: chat not found")),
        }
    }

    async fn is_admin(&self, _chat: &ChatRef, user: Option<UserId>) -> Result<bool, KeyrelayError> {
        Ok(!self.faults.lock().await.non_admins.contains(&user))
    }
}
