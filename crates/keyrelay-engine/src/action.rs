// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Button payloads.
//!
//! Every inline button carries one of these as its callback data. Parsing is
//! total over the payloads the bot emits; anything else is rejected.

use std::fmt;
use std::str::FromStr;

use keyrelay_core::{KeyStyle, KeyrelayError, UploadMethod};
use keyrelay_storage::SetupSlot;
use strum::{Display, EnumString};

use crate::caption::RecaptionStrategy;

/// Owner actions on one auto-forward slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum SetupAction {
    Menu,
    Source,
    Dest,
    Caption,
    Automated,
    Manual,
    Quote,
    Mono,
    On,
    Off,
    View,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SelectMethod(UploadMethod),
    AutoMenu,
    BackToMethods,
    ShareConfirm,
    ShareCancel,
    DeleteLastPost,
    CountdownConfirm,
    CountdownErase,
    BatchSend,
    BatchCancel,
    BatchStyle(KeyStyle),
    BatchEditCaption,
    BatchPreview,
    BatchBack,
    EraseAll,
    Recaption(RecaptionStrategy),
    DeleteMenu,
    /// 1-based position in the current (compacted) posted list.
    DeletePosted(usize),
    BackToManage,
    SetChannel,
    SetCaption,
    ResetChannel,
    ResetCaption,
    Setup(SetupSlot, SetupAction),
}

impl FromStr for Action {
    type Err = KeyrelayError;

    fn from_str(payload: &str) -> Result<Self, Self::Err> {
        let action = match payload {
            "method_1" => Self::SelectMethod(UploadMethod::Method1),
            "method_2" => Self::SelectMethod(UploadMethod::Method2),
            "method_3" => Self::AutoMenu,
            "back_to_methods" => Self::BackToMethods,
            "share_yes" => Self::ShareConfirm,
            "share_no" => Self::ShareCancel,
            "delete_last" => Self::DeleteLastPost,
            "method2_confirm_apks" => Self::CountdownConfirm,
            "method2_cancel_session" => Self::CountdownErase,
            "method2_yes" => Self::BatchSend,
            "method2_no" => Self::BatchCancel,
            "method2_quote" => Self::BatchStyle(KeyStyle::Quote),
            "method2_mono" => Self::BatchStyle(KeyStyle::Mono),
            "method2_normal" => Self::BatchStyle(KeyStyle::Normal),
            "method2_edit" => Self::BatchEditCaption,
            "method2_preview" => Self::BatchPreview,
            "method2_back_fullmenu" => Self::BatchBack,
            "erase_all" | "erase_all_session" => Self::EraseAll,
            "delete_apk_post" => Self::DeleteMenu,
            "back_to_manage_post" => Self::BackToManage,
            "set_channel" => Self::SetChannel,
            "set_caption" => Self::SetCaption,
            "reset_channel" => Self::ResetChannel,
            "reset_caption" => Self::ResetCaption,
            other => return parse_parameterized(other),
        };
        Ok(action)
    }
}

fn parse_parameterized(payload: &str) -> Result<Action, KeyrelayError> {
    let unknown = || KeyrelayError::Internal(format!("unknown button payload `{payload}`"));

    if let Ok(strategy) = payload.parse::<RecaptionStrategy>() {
        return Ok(Action::Recaption(strategy));
    }
    if let Some(n) = payload.strip_prefix("delete_apk_") {
        let index = n.parse::<usize>().map_err(|_| unknown())?;
        return if index == 0 {
            Err(unknown())
        } else {
            Ok(Action::DeletePosted(index))
        };
    }
    if let Some(rest) = payload.strip_prefix("setup")
        && let Some((slot, action)) = rest.split_once('_')
    {
        let slot = slot
            .parse::<u8>()
            .ok()
            .and_then(SetupSlot::new)
            .ok_or_else(unknown)?;
        let action = action.parse::<SetupAction>().map_err(|_| unknown())?;
        return Ok(Action::Setup(slot, action));
    }
    Err(unknown())
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelectMethod(UploadMethod::Method1) => f.write_str("method_1"),
            Self::SelectMethod(UploadMethod::Method2) => f.write_str("method_2"),
            Self::AutoMenu => f.write_str("method_3"),
            Self::BackToMethods => f.write_str("back_to_methods"),
            Self::ShareConfirm => f.write_str("share_yes"),
            Self::ShareCancel => f.write_str("share_no"),
            Self::DeleteLastPost => f.write_str("delete_last"),
            Self::CountdownConfirm => f.write_str("method2_confirm_apks"),
            Self::CountdownErase => f.write_str("method2_cancel_session"),
            Self::BatchSend => f.write_str("method2_yes"),
            Self::BatchCancel => f.write_str("method2_no"),
            Self::BatchStyle(style) => write!(f, "method2_{style}"),
            Self::BatchEditCaption => f.write_str("method2_edit"),
            Self::BatchPreview => f.write_str("method2_preview"),
            Self::BatchBack => f.write_str("method2_back_fullmenu"),
            Self::EraseAll => f.write_str("erase_all"),
            Self::Recaption(strategy) => write!(f, "{strategy}"),
            Self::DeleteMenu => f.write_str("delete_apk_post"),
            Self::DeletePosted(index) => write!(f, "delete_apk_{index}"),
            Self::BackToManage => f.write_str("back_to_manage_post"),
            Self::SetChannel => f.write_str("set_channel"),
            Self::SetCaption => f.write_str("set_caption"),
            Self::ResetChannel => f.write_str("reset_channel"),
            Self::ResetCaption => f.write_str("reset_caption"),
            Self::Setup(slot, action) => write!(f, "setup{slot}_{action}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fixed_payloads() {
        assert_eq!("share_yes".parse::<Action>().unwrap(), Action::ShareConfirm);
        assert_eq!(
            "method2_quote".parse::<Action>().unwrap(),
            Action::BatchStyle(KeyStyle::Quote)
        );
        assert_eq!("erase_all_session".parse::<Action>().unwrap(), Action::EraseAll);
    }

    #[test]
    fn parses_parameterized_payloads() {
        assert_eq!("delete_apk_2".parse::<Action>().unwrap(), Action::DeletePosted(2));
        assert_eq!(
            "auto_last_caption".parse::<Action>().unwrap(),
            Action::Recaption(RecaptionStrategy::LastOnly)
        );
        assert_eq!(
            "setup3_automated".parse::<Action>().unwrap(),
            Action::Setup(SetupSlot::new(3).unwrap(), SetupAction::Automated)
        );
    }

    #[test]
    fn rejects_unknown_payloads() {
        for bad in ["", "delete_apk_0", "delete_apk_x", "setup9_on", "setup1_fly", "nope"] {
            assert!(bad.parse::<Action>().is_err(), "{bad}");
        }
    }

    #[test]
    fn display_is_the_payload() {
        for action in [
            Action::SelectMethod(UploadMethod::Method2),
            Action::BatchStyle(KeyStyle::Mono),
            Action::DeletePosted(3),
            Action::Recaption(RecaptionStrategy::CaptionPlusKey),
            Action::Setup(SetupSlot::BATCHED, SetupAction::Dest),
        ] {
            assert_eq!(action.to_string().parse::<Action>().unwrap(), action);
        }
    }
}
