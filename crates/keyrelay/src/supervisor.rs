// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Restart-on-failure loop around the update dispatcher.

use std::future::Future;
use std::time::Duration;

use keyrelay_core::KeyrelayError;
use keyrelay_engine::Engine;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Runs `start()` on its own task until `cancel` fires.
///
/// When the task returns or panics without a shutdown having been requested,
/// state is flushed, the owner is alerted (best effort), and the loop is
/// started again after `restart_delay`. Returns the number of restarts.
pub async fn supervise<F, Fut>(
    engine: &Engine,
    restart_delay: Duration,
    cancel: CancellationToken,
    mut start: F,
) -> u32
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut restarts = 0u32;
    loop {
        let outcome = tokio::spawn(start()).await;
        if cancel.is_cancelled() {
            break;
        }

        let err = match outcome {
            Ok(()) => KeyrelayError::Internal("update loop exited unexpectedly".into()),
            Err(e) if e.is_panic() => KeyrelayError::Internal(format!("update loop panicked: {e}")),
            Err(e) => KeyrelayError::Internal(format!("update loop aborted: {e}")),
        };
        restarts += 1;
        error!(
            restarts,
            delay_secs = restart_delay.as_secs(),
            error = %err,
            "update loop stopped, restarting"
        );
        engine.persist().await;
        engine.report_failure("supervisor", None, &err).await;

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(restart_delay) => {}
        }
        info!(restarts, "restarting update loop");
    }
    restarts
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use keyrelay_core::{ChatRef, UserId};
    use keyrelay_engine::EngineSettings;
    use keyrelay_storage::{AccessControl, Store};
    use keyrelay_test_utils::MockTransport;

    const OWNER: i64 = 1;

    fn engine(transport: Arc<MockTransport>) -> Engine {
        let store = Store::new(AccessControl::new(UserId(OWNER)));
        Engine::new(transport, store, None, EngineSettings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_loop_is_restarted_and_reported() {
        let transport = Arc::new(MockTransport::new());
        let engine = engine(Arc::clone(&transport));
        let cancel = CancellationToken::new();
        let runs = Arc::new(AtomicU32::new(0));

        let restarts = supervise(&engine, Duration::from_secs(5), cancel.clone(), || {
            let runs = Arc::clone(&runs);
            let cancel = cancel.clone();
            async move {
                if runs.fetch_add(1, Ordering::SeqCst) < 2 {
                    panic!("poll loop blew up");
                }
                cancel.cancel();
            }
        })
        .await;

        assert_eq!(restarts, 2);
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        let alerts = transport.texts_to(&ChatRef::Id(OWNER)).await;
        assert!(alerts.iter().any(|t| t.contains("supervisor")));
    }

    #[tokio::test(start_paused = true)]
    async fn clean_shutdown_does_not_restart() {
        let transport = Arc::new(MockTransport::new());
        let engine = engine(Arc::clone(&transport));
        let cancel = CancellationToken::new();

        let restarts = supervise(&engine, Duration::from_secs(5), cancel.clone(), || {
            let cancel = cancel.clone();
            async move { cancel.cancel() }
        })
        .await;

        assert_eq!(restarts, 0);
        assert!(transport.calls().await.is_empty());
    }
}
