// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cancellable, single-flight countdowns.
//!
//! A [`Countdown`] ticks once per interval, reporting the seconds left to a
//! [`CountdownObserver`], and fires `on_complete` when it runs out. Each run
//! is identified by a [`CountdownHandle`]; cancelling a handle is idempotent
//! and a no-op once the countdown has finished. A [`CountdownSlot`] binds at
//! most one live handle to an owner: arming a new handle cancels the old one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

static NEXT_COUNTDOWN_ID: AtomicU64 = AtomicU64::new(1);

/// Reference to one countdown run.
#[derive(Debug, Clone)]
pub struct CountdownHandle {
    id: u64,
    token: CancellationToken,
    finished: Arc<AtomicBool>,
}

impl CountdownHandle {
    /// Creates a fresh, not yet started handle.
    pub fn new() -> Self {
        Self {
            id: NEXT_COUNTDOWN_ID.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stops the countdown at its next check. Safe to call repeatedly.
    pub fn cancel(&self) {
        if !self.is_finished() {
            self.token.cancel();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Neither cancelled nor finished.
    pub fn is_active(&self) -> bool {
        !self.is_cancelled() && !self.is_finished()
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }
}

impl Default for CountdownHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for CountdownHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CountdownHandle {}

/// How a countdown run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownOutcome {
    /// Ran out and `on_complete` was called.
    Completed,
    /// `should_stop` returned true; `on_complete` was not called.
    Stopped,
    /// The handle was cancelled.
    Cancelled,
}

/// Callbacks driven by a countdown.
#[async_trait]
pub trait CountdownObserver: Send + Sync + 'static {
    /// Called with the full duration before the first wait, then once per
    /// tick while time remains. Failures belong to the observer; they never
    /// abort the countdown.
    async fn on_tick(&self, handle: &CountdownHandle, remaining: u32);

    /// Checked after every tick. Returning true ends the countdown without
    /// calling [`on_complete`](Self::on_complete).
    async fn should_stop(&self, _handle: &CountdownHandle) -> bool {
        false
    }

    async fn on_complete(&self, handle: &CountdownHandle);
}

/// Countdown parameters.
#[derive(Debug, Clone, Copy)]
pub struct Countdown {
    total_secs: u32,
    tick: Duration,
}

impl Countdown {
    pub fn new(total_secs: u32) -> Self {
        Self {
            total_secs,
            tick: Duration::from_secs(1),
        }
    }

    /// Overrides the one-second tick interval.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn total_secs(&self) -> u32 {
        self.total_secs
    }

    /// Runs the countdown on the current task.
    pub async fn run<O>(&self, handle: &CountdownHandle, observer: &O) -> CountdownOutcome
    where
        O: CountdownObserver + ?Sized,
    {
        if handle.is_cancelled() {
            return CountdownOutcome::Cancelled;
        }
        observer.on_tick(handle, self.total_secs).await;

        for remaining in (0..self.total_secs).rev() {
            tokio::select! {
                biased;
                _ = handle.token.cancelled() => {
                    debug!(countdown = handle.id, remaining, "countdown cancelled");
                    return CountdownOutcome::Cancelled;
                }
                _ = tokio::time::sleep(self.tick) => {}
            }
            if handle.is_cancelled() {
                return CountdownOutcome::Cancelled;
            }
            if observer.should_stop(handle).await {
                handle.finish();
                debug!(countdown = handle.id, remaining, "countdown stopped early");
                return CountdownOutcome::Stopped;
            }
            if remaining > 0 {
                observer.on_tick(handle, remaining).await;
            }
        }

        if handle.is_cancelled() {
            return CountdownOutcome::Cancelled;
        }
        handle.finish();
        observer.on_complete(handle).await;
        CountdownOutcome::Completed
    }

    /// Runs the countdown on a background task and returns its handle.
    pub fn spawn<O>(self, observer: O) -> CountdownHandle
    where
        O: CountdownObserver,
    {
        let handle = CountdownHandle::new();
        let task_handle = handle.clone();
        tokio::spawn(async move {
            self.run(&task_handle, &observer).await;
        });
        handle
    }
}

/// Holder that keeps at most one live countdown per owner.
#[derive(Debug, Clone, Default)]
pub struct CountdownSlot(Option<CountdownHandle>);

impl CountdownSlot {
    /// Installs `handle`, cancelling whatever was armed before.
    pub fn arm(&mut self, handle: CountdownHandle) {
        if let Some(previous) = self.0.replace(handle) {
            previous.cancel();
        }
    }

    /// Cancels and forgets the armed countdown, if any.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.cancel();
        }
    }

    /// Forgets `handle` if it is still the armed one. Used by completion
    /// callbacks; returns false when the slot was re-armed meanwhile.
    pub fn release(&mut self, handle: &CountdownHandle) -> bool {
        if self.is_current(handle) {
            self.0 = None;
            true
        } else {
            false
        }
    }

    pub fn is_current(&self, handle: &CountdownHandle) -> bool {
        self.0.as_ref() == Some(handle)
    }

    /// Whether a countdown is armed and still running.
    pub fn is_active(&self) -> bool {
        self.0.as_ref().is_some_and(CountdownHandle::is_active)
    }

    pub fn current(&self) -> Option<&CountdownHandle> {
        self.0.as_ref()
    }
}
