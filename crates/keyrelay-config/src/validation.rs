// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic checks serde attributes cannot express.

use crate::diagnostic::ConfigError;
use crate::model::KeyrelayConfig;

/// Largest UTC offset in use anywhere (UTC+14).
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Validates a deserialized configuration, collecting every failure.
pub fn validate_config(config: &KeyrelayConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.access.owner_id == 0 {
        errors.push(ConfigError::validation("access.owner_id must be set"));
    }

    if config.access.allowed_users.contains(&0) {
        errors.push(ConfigError::validation(
            "access.allowed_users must not contain 0",
        ));
    }

    if let Some(token) = &config.telegram.bot_token
        && token.trim().is_empty()
    {
        errors.push(ConfigError::validation(
            "telegram.bot_token must not be empty when set",
        ));
    }

    if config.storage.data_dir.trim().is_empty() {
        errors.push(ConfigError::validation("storage.data_dir must not be empty"));
    }

    if config.storage.state_file.trim().is_empty() || config.storage.config_file.trim().is_empty()
    {
        errors.push(ConfigError::validation(
            "storage.state_file and storage.config_file must not be empty",
        ));
    }

    if config.storage.state_file == config.storage.config_file {
        errors.push(ConfigError::validation(
            "storage.state_file and storage.config_file must differ",
        ));
    }

    if config.storage.autosave_secs == 0 {
        errors.push(ConfigError::validation(
            "storage.autosave_secs must be at least 1",
        ));
    }

    if config.timing.countdown_secs == 0 {
        errors.push(ConfigError::validation(
            "timing.countdown_secs must be at least 1",
        ));
    }

    if config.timing.verify_wait_secs == 0 {
        errors.push(ConfigError::validation(
            "timing.verify_wait_secs must be at least 1",
        ));
    }

    if config.keys.min_len == 0 || config.keys.min_len > config.keys.max_len {
        errors.push(ConfigError::validation(format!(
            "keys.min_len ({}) must be between 1 and keys.max_len ({})",
            config.keys.min_len, config.keys.max_len
        )));
    }

    if config.reports.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
        errors.push(ConfigError::validation(format!(
            "reports.utc_offset_minutes must be within ±{MAX_UTC_OFFSET_MINUTES}, got {}",
            config.reports.utc_offset_minutes
        )));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> KeyrelayConfig {
        let mut config = KeyrelayConfig::default();
        config.access.owner_id = 1001;
        config
    }

    fn has_message(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn defaults_with_owner_validate() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn missing_owner_fails() {
        let errors = validate_config(&KeyrelayConfig::default()).unwrap_err();
        assert!(has_message(&errors, "owner_id"));
    }

    #[test]
    fn inverted_key_bounds_fail() {
        let mut config = valid();
        config.keys.min_len = 31;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "keys.min_len"));
    }

    #[test]
    fn all_errors_are_collected() {
        let mut config = KeyrelayConfig::default();
        config.timing.countdown_secs = 0;
        config.storage.autosave_secs = 0;
        config.reports.utc_offset_minutes = 15 * 60;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn same_snapshot_files_fail() {
        let mut config = valid();
        config.storage.config_file = config.storage.state_file.clone();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_message(&errors, "must differ"));
    }
}
