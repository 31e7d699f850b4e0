// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON snapshot files.
//!
//! Two files live side by side: the state snapshot (sessions, batched-slot
//! buffer, auto setups, profiles) and the config snapshot (owner, allow-list,
//! bot switch, plus copies of profiles and auto setups). Each flush
//! serializes to a temp file in the same directory and renames it over the
//! target. Flushes are serialized by an async guard.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use keyrelay_core::{KeyrelayError, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::models::{OperatorSession, PendingBatch};
use crate::store::{AccessControl, AutoSetupTable, ProfileTable, SessionStore, Store};

/// Shape of the state snapshot file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSnapshot {
    pub user_state: BTreeMap<UserId, OperatorSession>,
    pub auto4_state: PendingBatch,
    pub auto_setup: Option<AutoSetupTable>,
    pub user_data: Option<ProfileTable>,
}

/// Shape of the config snapshot file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub owner_id: UserId,
    #[serde(default)]
    pub allowed_users: Vec<UserId>,
    #[serde(default)]
    pub user_data: ProfileTable,
    #[serde(default)]
    pub auto_setup: AutoSetupTable,
    #[serde(default = "default_bot_active")]
    pub bot_active: bool,
    #[serde(default)]
    pub bot_admin_link: Option<String>,
}

fn default_bot_active() -> bool {
    true
}

impl Store {
    /// Copies the state half of the store for writing.
    pub fn state_snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            user_state: self
                .sessions
                .iter()
                .map(|(user, session)| (*user, session.clone()))
                .collect(),
            auto4_state: self.auto4.clone(),
            auto_setup: Some(self.setups.clone()),
            user_data: Some(self.profiles.clone()),
        }
    }

    /// Copies the config half of the store for writing.
    pub fn config_snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            owner_id: self.access.owner,
            allowed_users: self.access.allowed.iter().copied().collect(),
            user_data: self.profiles.clone(),
            auto_setup: self.setups.clone(),
            bot_active: self.access.bot_active,
            bot_admin_link: self.access.admin_link.clone(),
        }
    }

    /// Rebuilds a store from both snapshots. Profiles and setups in the
    /// state snapshot win over the config snapshot copies.
    pub fn from_snapshots(config: ConfigSnapshot, state: StateSnapshot) -> Self {
        let mut access = AccessControl::new(config.owner_id);
        access.allowed = config.allowed_users.into_iter().collect();
        access.bot_active = config.bot_active;
        access.admin_link = config.bot_admin_link;

        let mut sessions = SessionStore::default();
        for (user, mut session) in state.user_state {
            if session.resume_collecting() {
                info!(operator = %user, items = session.file_count(), "batch restored awaiting its key");
            }
            *sessions.entry(user) = session;
        }

        let mut auto4 = state.auto4_state;
        if !auto4.pending_apks.is_empty() {
            warn!(
                items = auto4.pending_apks.len(),
                "discarding batched-slot items left over from the previous run"
            );
            auto4.reset();
        }

        Self {
            sessions,
            profiles: state.user_data.unwrap_or(config.user_data),
            setups: state.auto_setup.unwrap_or(config.auto_setup),
            auto4,
            access,
        }
    }
}

/// Locations of both snapshot files plus the flush guard.
#[derive(Debug)]
pub struct SnapshotFiles {
    state_path: PathBuf,
    config_path: PathBuf,
    flush_lock: Mutex<()>,
}

impl SnapshotFiles {
    pub fn new(data_dir: impl AsRef<Path>, state_file: &str, config_file: &str) -> Self {
        let dir = data_dir.as_ref();
        Self {
            state_path: dir.join(state_file),
            config_path: dir.join(config_file),
            flush_lock: Mutex::new(()),
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Loads the store. Missing files fall back to `seed`.
    pub async fn load(&self, seed: AccessControl) -> Result<Store, KeyrelayError> {
        let config = match read_json::<ConfigSnapshot>(&self.config_path).await? {
            Some(config) => config,
            None => {
                info!(path = %self.config_path.display(), "no config snapshot, seeding from settings");
                ConfigSnapshot {
                    owner_id: seed.owner,
                    allowed_users: seed.allowed.iter().copied().collect(),
                    user_data: ProfileTable::default(),
                    auto_setup: AutoSetupTable::default(),
                    bot_active: seed.bot_active,
                    bot_admin_link: seed.admin_link.clone(),
                }
            }
        };
        let state = read_json::<StateSnapshot>(&self.state_path)
            .await?
            .unwrap_or_default();

        let store = Store::from_snapshots(config, state);
        info!(
            sessions = store.sessions.len(),
            profiles = store.profiles.len(),
            "snapshots loaded"
        );
        Ok(store)
    }

    /// Writes both snapshots, one flush at a time.
    pub async fn flush(
        &self,
        state: StateSnapshot,
        config: ConfigSnapshot,
    ) -> Result<(), KeyrelayError> {
        let _guard = self.flush_lock.lock().await;

        let state_bytes = serde_json::to_vec_pretty(&state).map_err(KeyrelayError::storage)?;
        let config_bytes = serde_json::to_vec_pretty(&config).map_err(KeyrelayError::storage)?;
        let state_path = self.state_path.clone();
        let config_path = self.config_path.clone();

        tokio::task::spawn_blocking(move || {
            write_replace(&state_path, &state_bytes)?;
            write_replace(&config_path, &config_bytes)
        })
        .await
        .map_err(|e| KeyrelayError::Internal(format!("snapshot writer panicked: {e}")))??;

        debug!("snapshots flushed");
        Ok(())
    }

    /// Snapshots `store` and flushes it.
    pub async fn flush_store(&self, store: &Mutex<Store>) -> Result<(), KeyrelayError> {
        let (state, config) = {
            let store = store.lock().await;
            (store.state_snapshot(), store.config_snapshot())
        };
        self.flush(state, config).await
    }
}

async fn read_json<T>(path: &Path) -> Result<Option<T>, KeyrelayError>
where
    T: for<'de> Deserialize<'de>,
{
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(KeyrelayError::storage),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(KeyrelayError::storage(e)),
    }
}

fn write_replace(path: &Path, bytes: &[u8]) -> Result<(), KeyrelayError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(KeyrelayError::storage)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(KeyrelayError::storage)?;
    tmp.write_all(bytes).map_err(KeyrelayError::storage)?;
    tmp.as_file().sync_all().map_err(KeyrelayError::storage)?;
    tmp.persist(path)
        .map_err(|e| KeyrelayError::storage(e.error))?;
    Ok(())
}
