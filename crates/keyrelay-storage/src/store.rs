// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-wide tables.
//!
//! All tables live in one [`Store`] the engine keeps behind a single async
//! mutex. Handlers lock, mutate, and unlock before any network call.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use keyrelay_core::{Sender, UserId};
use serde::{Deserialize, Serialize};

use crate::models::{AutoSetup, OperatorProfile, OperatorSession, PendingBatch, SetupSlot};

/// Operator id to session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionStore(BTreeMap<UserId, OperatorSession>);

impl SessionStore {
    /// Session of `user`, created on first use.
    pub fn entry(&mut self, user: UserId) -> &mut OperatorSession {
        self.0.entry(user).or_default()
    }

    pub fn get(&self, user: UserId) -> Option<&OperatorSession> {
        self.0.get(&user)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&UserId, &OperatorSession)> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&UserId, &mut OperatorSession)> {
        self.0.iter_mut()
    }

    /// Replaces a session with a fresh one, cancelling its countdown.
    pub fn reset(&mut self, user: UserId) {
        if let Some(mut old) = self.0.insert(user, OperatorSession::default()) {
            old.countdown.cancel();
            self.entry(user).stats = old.stats;
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Known users and their channel/caption settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileTable(BTreeMap<UserId, OperatorProfile>);

impl ProfileTable {
    /// Creates a profile on first contact and refreshes names afterwards.
    /// Returns true when the user was new.
    pub fn register(&mut self, sender: &Sender, now: DateTime<Utc>) -> bool {
        match self.0.get_mut(&sender.id) {
            Some(profile) => {
                profile.first_name.clone_from(&sender.first_name);
                profile.username.clone_from(&sender.username);
                false
            }
            None => {
                self.0.insert(
                    sender.id,
                    OperatorProfile {
                        first_name: sender.first_name.clone(),
                        username: sender.username.clone(),
                        channel: None,
                        caption: None,
                        first_seen: now,
                    },
                );
                true
            }
        }
    }

    pub fn get(&self, user: UserId) -> Option<&OperatorProfile> {
        self.0.get(&user)
    }

    pub fn get_mut(&mut self, user: UserId) -> Option<&mut OperatorProfile> {
        self.0.get_mut(&user)
    }

    pub fn users(&self) -> impl Iterator<Item = UserId> + '_ {
        self.0.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The four auto-forward slots, serialized as `setup1`..`setup4`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSetupTable {
    setup1: AutoSetup,
    setup2: AutoSetup,
    setup3: AutoSetup,
    setup4: AutoSetup,
}

impl AutoSetupTable {
    pub fn get(&self, slot: SetupSlot) -> &AutoSetup {
        match slot.number() {
            1 => &self.setup1,
            2 => &self.setup2,
            3 => &self.setup3,
            _ => &self.setup4,
        }
    }

    pub fn get_mut(&mut self, slot: SetupSlot) -> &mut AutoSetup {
        match slot.number() {
            1 => &mut self.setup1,
            2 => &mut self.setup2,
            3 => &mut self.setup3,
            _ => &mut self.setup4,
        }
    }

    pub fn reset(&mut self, slot: SetupSlot) {
        *self.get_mut(slot) = AutoSetup::default();
    }
}

/// Owner, allow-list, and the global on/off switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessControl {
    pub owner: UserId,
    pub allowed: BTreeSet<UserId>,
    pub bot_active: bool,
    pub admin_link: Option<String>,
}

impl AccessControl {
    pub fn new(owner: UserId) -> Self {
        Self {
            owner,
            allowed: BTreeSet::new(),
            bot_active: true,
            admin_link: None,
        }
    }

    pub fn is_owner(&self, user: UserId) -> bool {
        user == self.owner
    }

    pub fn is_allowed(&self, user: UserId) -> bool {
        self.is_owner(user) || self.allowed.contains(&user)
    }

    /// Whether `user` may use the bot right now.
    pub fn admits(&self, user: UserId) -> bool {
        self.is_owner(user) || (self.bot_active && self.allowed.contains(&user))
    }
}

/// Every process-wide table.
#[derive(Debug, Clone)]
pub struct Store {
    pub sessions: SessionStore,
    pub profiles: ProfileTable,
    pub setups: AutoSetupTable,
    pub auto4: PendingBatch,
    pub access: AccessControl,
}

impl Store {
    pub fn new(access: AccessControl) -> Self {
        Self {
            sessions: SessionStore::default(),
            profiles: ProfileTable::default(),
            setups: AutoSetupTable::default(),
            auto4: PendingBatch::default(),
            access,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyrelay_core::KeyStyle;

    fn sender(id: i64, name: &str) -> Sender {
        Sender {
            id: UserId(id),
            first_name: name.into(),
            username: None,
        }
    }

    #[test]
    fn register_only_creates_once() {
        let mut profiles = ProfileTable::default();
        let now = Utc::now();
        assert!(profiles.register(&sender(1, "Ana"), now));
        assert!(!profiles.register(&sender(1, "Ana B"), now));
        assert_eq!(profiles.get(UserId(1)).unwrap().first_name, "Ana B");
        assert_eq!(profiles.len(), 1);
    }

    #[test]
    fn session_reset_keeps_stats() {
        let mut sessions = SessionStore::default();
        let session = sessions.entry(UserId(5));
        session.stats.lifetime.method1.apks = 3;
        session.key_mode = KeyStyle::Quote;

        sessions.reset(UserId(5));
        let session = sessions.get(UserId(5)).unwrap();
        assert_eq!(session.stats.lifetime.method1.apks, 3);
        assert_eq!(session.key_mode, KeyStyle::Normal);
    }

    #[test]
    fn bot_off_admits_only_the_owner() {
        let mut access = AccessControl::new(UserId(1));
        access.allowed.insert(UserId(2));
        assert!(access.admits(UserId(2)));
        access.bot_active = false;
        assert!(access.admits(UserId(1)));
        assert!(!access.admits(UserId(2)));
        assert!(access.is_allowed(UserId(2)));
        assert!(!access.is_allowed(UserId(3)));
    }

    #[test]
    fn setup_table_serializes_named_slots() {
        let mut table = AutoSetupTable::default();
        table.get_mut(SetupSlot::BATCHED).enabled = true;
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["setup4"]["enabled"], true);
        assert_eq!(json["setup1"]["style"], "mono");
    }
}
