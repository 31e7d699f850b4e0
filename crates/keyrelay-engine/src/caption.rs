// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Caption composition.
//!
//! Templates are HTML. Keys are escaped before they are inserted; template
//! text is passed through untouched.

use keyrelay_core::{KEY_PLACEHOLDER, KeyStyle};
use strum::{Display, EnumString};

/// Escapes the three characters HTML parse mode reserves.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

/// `Key - <key>` in the given style.
pub fn styled_key_line(key: &str, style: KeyStyle) -> String {
    let key = escape_html(key);
    match style {
        KeyStyle::Quote => format!("<blockquote>{KEY_PLACEHOLDER} <code>{key}</code></blockquote>"),
        KeyStyle::Mono => format!("{KEY_PLACEHOLDER} <code>{key}</code>"),
        KeyStyle::Normal => format!("{KEY_PLACEHOLDER} {key}"),
    }
}

/// The key alone, wrapped for the style, without the `Key -` label.
pub fn bare_key(key: &str, style: KeyStyle) -> String {
    let key = escape_html(key);
    match style {
        KeyStyle::Quote => format!("<blockquote><code>{key}</code></blockquote>"),
        KeyStyle::Mono => format!("<code>{key}</code>"),
        KeyStyle::Normal => key,
    }
}

/// Replaces every placeholder in `template` with the styled key line.
pub fn substitute(template: &str, key: &str, style: KeyStyle) -> String {
    template.replace(KEY_PLACEHOLDER, &styled_key_line(key, style))
}

/// Template with the placeholder removed, trimmed.
pub fn strip_placeholder(template: &str) -> String {
    template.replace(KEY_PLACEHOLDER, "").trim().to_string()
}

/// Whether a template can receive a key.
pub fn has_placeholder(template: &str) -> bool {
    template.contains(KEY_PLACEHOLDER)
}

/// Single-file caption: the template with a monospaced key.
pub fn single_caption(template: &str, key: &str) -> String {
    substitute(template, key, KeyStyle::Mono)
}

/// Batch captioning rule: the last item carries the full template, earlier
/// items carry only the styled key line. A batch of one gets the template.
pub fn batch_captions(count: usize, template: &str, key: &str, style: KeyStyle) -> Vec<String> {
    (0..count)
        .map(|i| {
            if i + 1 == count {
                substitute(template, key, style)
            } else {
                styled_key_line(key, style)
            }
        })
        .collect()
}

/// Ways to rebuild a posted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum RecaptionStrategy {
    /// The batch rule again.
    #[strum(serialize = "auto_recaption")]
    RecaptionAll,
    /// Only the last item, with the full template.
    #[strum(serialize = "auto_last_caption")]
    LastOnly,
    /// Only the last item, with the styled key line.
    #[strum(serialize = "last_caption_key")]
    KeyAsFullCaption,
    /// Only the last item, with the bare key.
    #[strum(serialize = "key_after_apks")]
    KeyOnlyMarker,
    /// Only the last item, bare key followed by the template text.
    #[strum(serialize = "caption_plus_key")]
    CaptionPlusKey,
}

impl RecaptionStrategy {
    pub const ALL: [RecaptionStrategy; 5] = [
        Self::RecaptionAll,
        Self::LastOnly,
        Self::KeyAsFullCaption,
        Self::KeyOnlyMarker,
        Self::CaptionPlusKey,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::RecaptionAll => "Recaption all",
            Self::LastOnly => "Caption on last",
            Self::KeyAsFullCaption => "Key line on last",
            Self::KeyOnlyMarker => "Key only on last",
            Self::CaptionPlusKey => "Key + caption on last",
        }
    }

    /// Captions for a regrouped batch of `count` items.
    pub fn captions(
        self,
        count: usize,
        template: &str,
        key: &str,
        style: KeyStyle,
    ) -> Vec<Option<String>> {
        if self == Self::RecaptionAll {
            return batch_captions(count, template, key, style)
                .into_iter()
                .map(Some)
                .collect();
        }
        let last = match self {
            Self::LastOnly => substitute(template, key, style),
            Self::KeyAsFullCaption => styled_key_line(key, style),
            Self::KeyOnlyMarker => bare_key(key, style),
            _ => {
                let rest = strip_placeholder(template);
                let tail = bare_key(key, style);
                if rest.is_empty() { tail } else { format!("{tail}\n{rest}") }
            }
        };
        (0..count)
            .map(|i| (i + 1 == count).then(|| last.clone()))
            .collect()
    }
}

/// Auto-forward caption for single-item slots: the template (placeholder
/// appended when missing) with the key in quote or mono style.
pub fn auto_caption(template: &str, key: &str, style: KeyStyle) -> String {
    let template = if has_placeholder(template) {
        template.to_string()
    } else if template.trim().is_empty() {
        KEY_PLACEHOLDER.to_string()
    } else {
        format!("{template}\n{KEY_PLACEHOLDER}")
    };
    match style {
        KeyStyle::Quote => substitute(&template, key, KeyStyle::Quote),
        _ => substitute(&template, key, KeyStyle::Mono),
    }
}

/// Batched-slot caption: quote style posts the quoted key line alone,
/// anything else substitutes into the template.
pub fn batched_auto_caption(template: &str, key: &str, style: KeyStyle) -> String {
    match style {
        KeyStyle::Quote => styled_key_line(key, KeyStyle::Quote),
        _ => substitute(template, key, KeyStyle::Mono),
    }
}

/// Shortens a file name for button labels.
pub fn short_name(name: &str) -> String {
    if name.chars().count() > 20 {
        let head: String = name.chars().take(17).collect();
        format!("{head}...")
    } else {
        name.to_string()
    }
}
