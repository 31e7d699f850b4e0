// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` so a typo in
//! `keyrelay.toml` fails at startup instead of being silently ignored.

use serde::{Deserialize, Serialize};

/// Top-level keyrelay configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KeyrelayConfig {
    /// Bot API credentials and update handling.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Owner identity and the seed allow-list.
    #[serde(default)]
    pub access: AccessConfig,

    /// Snapshot locations and autosave cadence.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Countdown, verification, and alert windows.
    #[serde(default)]
    pub timing: TimingConfig,

    /// Key acceptance bounds for batched uploads.
    #[serde(default)]
    pub keys: KeyConfig,

    /// Scheduled usage reports.
    #[serde(default)]
    pub reports: ReportConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Telegram bot configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Bot API token. Required by `keyrelay serve`.
    #[serde(default)]
    pub bot_token: Option<String>,

    /// Minimum gap between two button presses from one user.
    #[serde(default = "default_callback_cooldown_ms")]
    pub callback_cooldown_ms: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            callback_cooldown_ms: default_callback_cooldown_ms(),
        }
    }
}

fn default_callback_cooldown_ms() -> u64 {
    1000
}

/// Access control configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AccessConfig {
    /// Numeric id of the owner. Must be set.
    #[serde(default)]
    pub owner_id: i64,

    /// Operators allowed on first start, before a config snapshot exists.
    #[serde(default)]
    pub allowed_users: Vec<i64>,

    /// Contact link shown to rejected users.
    #[serde(default)]
    pub admin_link: Option<String>,
}

/// Snapshot storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory holding both snapshot files.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Session, profile, and auto-setup snapshot.
    #[serde(default = "default_state_file")]
    pub state_file: String,

    /// Owner, allow-list, and bot flag snapshot.
    #[serde(default = "default_config_file")]
    pub config_file: String,

    /// Seconds between background flushes.
    #[serde(default = "default_autosave_secs")]
    pub autosave_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            state_file: default_state_file(),
            config_file: default_config_file(),
            autosave_secs: default_autosave_secs(),
        }
    }
}

fn default_data_dir() -> String {
    dirs::data_dir()
        .map(|d| d.join("keyrelay").display().to_string())
        .unwrap_or_else(|| "./keyrelay-data".to_string())
}

fn default_state_file() -> String {
    "state.json".to_string()
}

fn default_config_file() -> String {
    "config.json".to_string()
}

fn default_autosave_secs() -> u64 {
    60
}

/// Timing windows, all in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TimingConfig {
    /// Batched-upload collection window.
    #[serde(default = "default_countdown_secs")]
    pub countdown_secs: u32,

    /// Wait before re-fetching an auto-forward source post.
    #[serde(default = "default_verify_wait_secs")]
    pub verify_wait_secs: u32,

    /// Extra settle time after the batch window closes.
    #[serde(default = "default_batch_settle_secs")]
    pub batch_settle_secs: u64,

    /// Pause before the reverse key search of a multi-item batch.
    #[serde(default = "default_reverse_search_delay_secs")]
    pub reverse_search_delay_secs: u64,

    /// Minimum gap between two owner alerts.
    #[serde(default = "default_alert_cooldown_secs")]
    pub alert_cooldown_secs: u64,

    /// Backoff before the supervisor restarts the bot.
    #[serde(default = "default_restart_delay_secs")]
    pub restart_delay_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            countdown_secs: default_countdown_secs(),
            verify_wait_secs: default_verify_wait_secs(),
            batch_settle_secs: default_batch_settle_secs(),
            reverse_search_delay_secs: default_reverse_search_delay_secs(),
            alert_cooldown_secs: default_alert_cooldown_secs(),
            restart_delay_secs: default_restart_delay_secs(),
        }
    }
}

fn default_countdown_secs() -> u32 {
    10
}

fn default_verify_wait_secs() -> u32 {
    20
}

fn default_batch_settle_secs() -> u64 {
    1
}

fn default_reverse_search_delay_secs() -> u64 {
    3
}

fn default_alert_cooldown_secs() -> u64 {
    30
}

fn default_restart_delay_secs() -> u64 {
    5
}

/// Accepted key length, in characters, inclusive.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KeyConfig {
    #[serde(default = "default_key_min_len")]
    pub min_len: usize,

    #[serde(default = "default_key_max_len")]
    pub max_len: usize,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            min_len: default_key_min_len(),
            max_len: default_key_max_len(),
        }
    }
}

fn default_key_min_len() -> usize {
    4
}

fn default_key_max_len() -> usize {
    30
}

/// Scheduled report configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Offset of the reporting clock from UTC. Defaults to India Standard Time.
    #[serde(default = "default_utc_offset_minutes")]
    pub utc_offset_minutes: i32,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            utc_offset_minutes: default_utc_offset_minutes(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_utc_offset_minutes() -> i32 {
    330
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
