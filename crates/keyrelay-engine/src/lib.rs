// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Workflow engine for keyrelay.
//!
//! The [`Engine`] receives normalized inbound events (private texts,
//! documents, button presses, channel posts) and drives the operator upload
//! workflows and the auto-forward pipelines against a
//! [`Transport`](keyrelay_core::Transport).

pub mod action;
pub mod alerts;
mod auto;
mod auto4;
pub mod caption;
mod commands;
pub mod engine;
pub mod key;
mod method1;
mod method2;
mod profile;
pub mod reports;
mod setup;
pub mod shutdown;
pub mod ui;

pub use action::{Action, SetupAction};
pub use alerts::OwnerAlerter;
pub use commands::Command;
pub use engine::{Engine, EngineSettings};
pub use method2::MAX_BATCH;
pub use reports::{due_scopes, run_report_scheduler};
