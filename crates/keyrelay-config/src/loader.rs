// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Lookup order, later wins: compiled defaults, `/etc/keyrelay/keyrelay.toml`,
//! `~/.config/keyrelay/keyrelay.toml`, `./keyrelay.toml`, then `KEYRELAY_*`
//! environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::KeyrelayConfig;

pub(crate) const SYSTEM_CONFIG: &str = "/etc/keyrelay/keyrelay.toml";
pub(crate) const LOCAL_CONFIG: &str = "keyrelay.toml";

pub(crate) fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("keyrelay/keyrelay.toml"))
}

/// Builds the standard figment without extracting it.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(KeyrelayConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// Loads configuration from the standard hierarchy.
pub fn load_config() -> Result<KeyrelayConfig, figment::Error> {
    build_figment().extract()
}

/// Loads configuration from one TOML string, without files or env.
pub fn load_config_from_str(toml_content: &str) -> Result<KeyrelayConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KeyrelayConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Loads configuration from an explicit file plus env overrides.
pub fn load_config_from_path(path: &Path) -> Result<KeyrelayConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(KeyrelayConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// `KEYRELAY_*` variables, mapped section-first with `map()` rather than
/// `split("_")` so keys containing underscores survive:
/// `KEYRELAY_TELEGRAM_BOT_TOKEN` becomes `telegram.bot_token`.
fn env_provider() -> Env {
    const SECTIONS: [&str; 7] = [
        "telegram", "access", "storage", "timing", "keys", "reports", "logging",
    ];

    Env::prefixed("KEYRELAY_").map(|key| {
        let key_str = key.as_str().to_ascii_lowercase();
        SECTIONS
            .iter()
            .find_map(|section| {
                key_str
                    .strip_prefix(section)
                    .and_then(|rest| rest.strip_prefix('_'))
                    .map(|rest| format!("{section}.{rest}"))
            })
            .unwrap_or(key_str)
            .into()
    })
}
