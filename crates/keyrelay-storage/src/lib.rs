// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session, profile, and auto-setup tables for keyrelay, persisted as JSON
//! snapshots with write-then-replace semantics.

pub mod models;
pub mod snapshot;
pub mod store;

pub use models::*;
pub use snapshot::{ConfigSnapshot, SnapshotFiles, StateSnapshot};
pub use store::{AccessControl, AutoSetupTable, ProfileTable, SessionStore, Store};
