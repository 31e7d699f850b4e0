// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared harness: an engine over a recording transport with one owner and
//! one operator who has a channel and caption configured.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use keyrelay_core::{ChatRef, Sender, UserId};
use keyrelay_engine::{Engine, EngineSettings};
use keyrelay_storage::{AccessControl, OperatorSession, Store};
use keyrelay_test_utils::MockTransport;
use keyrelay_test_utils::fixtures::sender;

pub const OWNER: i64 = 1;
pub const OPERATOR: i64 = 2;
pub const TEMPLATE: &str = "New build\nKey -";

pub struct Harness {
    pub engine: Engine,
    pub transport: Arc<MockTransport>,
}

impl Harness {
    pub fn new() -> Self {
        let mut access = AccessControl::new(UserId(OWNER));
        access.allowed.insert(UserId(OPERATOR));
        let mut store = Store::new(access);

        let now = Utc::now();
        store.profiles.register(&owner(), now);
        store.profiles.register(&operator(), now);
        let profile = store
            .profiles
            .get_mut(UserId(OPERATOR))
            .expect("operator profile");
        profile.channel = Some(channel());
        profile.caption = Some(TEMPLATE.to_string());

        let transport = Arc::new(MockTransport::new());
        let engine = Engine::new(transport.clone(), store, None, EngineSettings::default());
        Self { engine, transport }
    }

    /// A snapshot of the operator's session.
    pub async fn session(&self, user: i64) -> OperatorSession {
        let mut store = self.engine.store().lock().await;
        store.sessions.entry(UserId(user)).clone()
    }

    pub async fn texts_to(&self, user: i64) -> Vec<String> {
        self.transport.texts_to(&UserId(user).chat()).await
    }

    pub async fn last_text_to(&self, user: i64) -> String {
        self.texts_to(user).await.pop().unwrap_or_default()
    }
}

pub fn owner() -> Sender {
    sender(OWNER, "Owner")
}

pub fn operator() -> Sender {
    sender(OPERATOR, "Ana")
}

pub fn channel() -> ChatRef {
    ChatRef::Username("drop".into())
}

/// Lets spawned tasks run without moving the paused clock far.
pub async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(1)).await;
}
