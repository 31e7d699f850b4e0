// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key extraction from captions.
//!
//! Priority, first match wins:
//! 1. `Key - <token>` in the caption text (whitespace around the hyphen is
//!    tolerated, the token runs until the next whitespace, punctuation included).
//! 2. The first code annotation, sliced out of the caption.
//!
//! [`KeyMode::Manual`] stops after step 1.

use std::sync::LazyLock;

use keyrelay_core::{CaptionEntity, EntityKind, KeyMode};
use regex::Regex;

static KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Key\s*-\s*(\S+)").expect("key pattern is valid"));

/// Extracts the key from a caption and its annotations.
pub fn extract_key(caption: &str, entities: &[CaptionEntity], mode: KeyMode) -> Option<String> {
    if let Some(key) = key_from_text(caption) {
        return Some(key);
    }
    match mode {
        KeyMode::Auto => key_from_code_entity(caption, entities),
        KeyMode::Manual => None,
    }
}

/// Step 1 only: the `Key - <token>` pattern.
pub fn key_from_text(caption: &str) -> Option<String> {
    KEY_PATTERN
        .captures(caption)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Step 2 only: text under the first code annotation.
///
/// Offsets count UTF-16 code units. A span that falls outside the caption
/// yields nothing.
pub fn key_from_code_entity(caption: &str, entities: &[CaptionEntity]) -> Option<String> {
    let entity = entities.iter().find(|e| e.kind == EntityKind::Code)?;
    let units: Vec<u16> = caption.encode_utf16().collect();
    let end = entity.offset.checked_add(entity.length)?;
    let slice = units.get(entity.offset..end)?;
    let text = String::from_utf16_lossy(slice);
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn finds_key_in_caption_text() {
        assert_eq!(
            extract_key("foo bar Key - ABC123", &[], KeyMode::Auto).as_deref(),
            Some("ABC123")
        );
    }

    #[test]
    fn falls_back_to_code_annotation() {
        let caption = "no key here XYZ9";
        let entities = [CaptionEntity::code(12, 4)];
        assert_eq!(
            extract_key(caption, &entities, KeyMode::Auto).as_deref(),
            Some("XYZ9")
        );
    }

    #[test]
    fn text_match_beats_annotation() {
        let caption = "XYZ9 then Key - ABC123";
        let entities = [CaptionEntity::code(0, 4)];
        assert_eq!(
            extract_key(caption, &entities, KeyMode::Auto).as_deref(),
            Some("ABC123")
        );
    }

    #[test]
    fn manual_mode_ignores_annotations() {
        let entities = [CaptionEntity::code(0, 4)];
        assert_eq!(extract_key("XYZ9", &entities, KeyMode::Manual), None);
    }

    #[test]
    fn only_the_first_code_annotation_counts() {
        let caption = "AAAA BBBB";
        let entities = [
            CaptionEntity {
                kind: EntityKind::Other,
                offset: 0,
                length: 4,
            },
            CaptionEntity::code(5, 4),
            CaptionEntity::code(0, 4),
        ];
        assert_eq!(key_from_code_entity(caption, &entities).as_deref(), Some("BBBB"));
    }

    #[test]
    fn whitespace_around_hyphen_is_tolerated() {
        assert_eq!(key_from_text("Key-Q1").as_deref(), Some("Q1"));
        assert_eq!(key_from_text("Key  -\tQ2 tail").as_deref(), Some("Q2"));
        assert_eq!(key_from_text("Key -   "), None);
    }

    #[test]
    fn trailing_punctuation_stays_on_the_token() {
        assert_eq!(key_from_text("Key - ABC123.").as_deref(), Some("ABC123."));
    }

    #[test]
    fn annotation_offsets_count_utf16_units() {
        // The emoji takes two UTF-16 units.
        let caption = "🔥 KEY7";
        let entities = [CaptionEntity::code(3, 4)];
        assert_eq!(key_from_code_entity(caption, &entities).as_deref(), Some("KEY7"));
    }

    #[test]
    fn out_of_range_annotation_yields_nothing() {
        let entities = [CaptionEntity::code(10, 50)];
        assert_eq!(extract_key("short", &entities, KeyMode::Auto), None);
    }

    proptest! {
        #[test]
        fn any_token_after_placeholder_is_extracted(
            prefix in "[a-z ]{0,20}",
            token in "[A-Za-z0-9_.!]{1,30}",
        ) {
            let caption = format!("{prefix}Key - {token}");
            prop_assert_eq!(key_from_text(&caption), Some(token));
        }

        #[test]
        fn extracted_keys_never_contain_whitespace(caption in "\\PC{0,80}") {
            if let Some(key) = key_from_text(&caption) {
                prop_assert!(!key.chars().any(char::is_whitespace));
                prop_assert!(!key.is_empty());
            }
        }
    }
}
