// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for keyrelay integration tests.
//!
//! Provides a recording transport and message fixtures for fast,
//! deterministic tests without a live bot.
//!
//! # Components
//!
//! - [`MockTransport`] - Records every outbound call, with injectable failures
//! - [`fixtures`] - Builders for senders, documents, and channel posts

pub mod fixtures;
pub mod mock_transport;

pub use mock_transport::{Call, MockTransport};
