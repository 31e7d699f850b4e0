// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `keyrelay serve` command implementation.
//!
//! Loads the snapshots, builds the engine over the Telegram transport, starts
//! the autosave and report background tasks, and runs the update loop under
//! the restart supervisor until a shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use chrono::FixedOffset;
use keyrelay_config::KeyrelayConfig;
use keyrelay_core::{KeyrelayError, UserId};
use keyrelay_engine::{Engine, EngineSettings, run_report_scheduler, shutdown};
use keyrelay_storage::{AccessControl, SnapshotFiles};
use keyrelay_telegram::{CallbackThrottle, TelegramTransport, run_dispatcher};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::supervisor;

/// Runs the `keyrelay serve` command.
pub async fn run_serve(config: KeyrelayConfig) -> Result<(), KeyrelayError> {
    init_tracing(&config.logging.level);

    info!("starting keyrelay serve");

    let transport = TelegramTransport::new(&config.telegram)?;
    let files = Arc::new(SnapshotFiles::new(
        &config.storage.data_dir,
        &config.storage.state_file,
        &config.storage.config_file,
    ));
    let store = files.load(seed_access(&config)).await?;
    if store.access.owner.0 != config.access.owner_id {
        warn!(
            snapshot_owner = %store.access.owner,
            "access.owner_id differs from the config snapshot, keeping the snapshot owner"
        );
    }

    let engine = Engine::new(
        Arc::new(transport.clone()),
        store,
        Some(files),
        EngineSettings::from_config(&config),
    );

    let cancel = shutdown::install_signal_handler();

    let autosave_every = Duration::from_secs(config.storage.autosave_secs);
    tokio::spawn(autosave(engine.clone(), autosave_every, cancel.clone()));
    info!(every_secs = config.storage.autosave_secs, "autosave started");

    if config.reports.enabled {
        let offset = report_offset(config.reports.utc_offset_minutes)?;
        tokio::spawn(run_report_scheduler(engine.clone(), offset, cancel.clone()));
        info!(%offset, "report scheduler started");
    } else {
        info!("scheduled reports disabled");
    }

    let throttle = Arc::new(CallbackThrottle::new(Duration::from_millis(
        config.telegram.callback_cooldown_ms,
    )));
    let bot = transport.bot().clone();
    supervisor::supervise(
        &engine,
        Duration::from_secs(config.timing.restart_delay_secs),
        cancel.clone(),
        || run_dispatcher(bot.clone(), engine.clone(), Arc::clone(&throttle), cancel.clone()),
    )
    .await;

    engine.persist().await;
    info!("keyrelay serve shutdown complete");
    Ok(())
}

/// Access table used when no config snapshot exists yet.
fn seed_access(config: &KeyrelayConfig) -> AccessControl {
    let mut access = AccessControl::new(UserId(config.access.owner_id));
    access.allowed = config
        .access
        .allowed_users
        .iter()
        .copied()
        .map(UserId)
        .collect();
    access.admin_link = config.access.admin_link.clone();
    access
}

fn report_offset(minutes: i32) -> Result<FixedOffset, KeyrelayError> {
    FixedOffset::east_opt(minutes * 60).ok_or_else(|| {
        KeyrelayError::Config(format!("reports.utc_offset_minutes {minutes} is out of range"))
    })
}

/// Flushes the snapshots every `every` until cancelled.
async fn autosave(engine: Engine, every: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(every);
    // Skip the first immediate tick.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                engine.persist().await;
                debug!("autosave tick");
            }
            _ = cancel.cancelled() => {
                info!("autosave task shutting down");
                break;
            }
        }
    }
}

/// Initialize the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("keyrelay={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_access_copies_the_access_section() {
        let mut config = KeyrelayConfig::default();
        config.access.owner_id = 10;
        config.access.allowed_users = vec![20, 30];
        config.access.admin_link = Some("https://t.me/boss".into());

        let access = seed_access(&config);
        assert_eq!(access.owner, UserId(10));
        assert!(access.allowed.contains(&UserId(20)));
        assert!(access.allowed.contains(&UserId(30)));
        assert!(access.bot_active);
        assert_eq!(access.admin_link.as_deref(), Some("https://t.me/boss"));
    }

    #[test]
    fn report_offset_defaults_to_india_time() {
        let offset = report_offset(330).unwrap();
        assert_eq!(offset.local_minus_utc(), 19_800);
        assert!(report_offset(24 * 60).is_err());
    }
}
