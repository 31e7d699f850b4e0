// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter seams. Every outbound call goes through [`Transport`] and uses
//! `#[async_trait]` so flows can hold it as `Arc<dyn Transport>`.

pub mod transport;

pub use transport::Transport;
