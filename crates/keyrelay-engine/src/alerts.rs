// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rate-limited error alerts to the owner.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use keyrelay_core::{Transport, UserId};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::caption::escape_html;

/// Most lines of the error chain included in one alert.
const MAX_TRACE_LINES: usize = 25;

/// Sends handler failures to the owner, at most one per cooldown window.
pub struct OwnerAlerter {
    transport: Arc<dyn Transport>,
    owner: UserId,
    cooldown: Duration,
    last_sent: Mutex<Option<Instant>>,
}

impl OwnerAlerter {
    pub fn new(transport: Arc<dyn Transport>, owner: UserId, cooldown: Duration) -> Self {
        Self {
            transport,
            owner,
            cooldown,
            last_sent: Mutex::new(None),
        }
    }

    /// Reports `error` raised in `context`. Returns whether an alert went out.
    pub async fn report(
        &self,
        context: &str,
        error: &(dyn std::error::Error + Send + Sync + 'static),
    ) -> bool {
        if !self.try_acquire() {
            debug!(context, error = %error, "owner alert suppressed by cooldown");
            return false;
        }

        let text = format!(
            "⚠️ <b>Error in {}</b>\n<pre>{}</pre>",
            escape_html(context),
            escape_html(&error_trace(error))
        );
        if let Err(e) = self.transport.send_text(&self.owner.chat(), &text, None).await {
            warn!(error = %e, "failed to deliver owner alert");
            return false;
        }
        true
    }

    fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut last = match self.last_sent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if last.is_some_and(|at| now.duration_since(at) < self.cooldown) {
            return false;
        }
        *last = Some(now);
        true
    }
}

/// The error and its sources, one per line, keeping the last lines.
pub fn error_trace(error: &(dyn std::error::Error + 'static)) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut current = Some(error);
    while let Some(err) = current {
        let prefix = if lines.is_empty() { "" } else { "caused by: " };
        lines.extend(err.to_string().lines().map(|l| format!("{prefix}{l}")));
        current = err.source();
    }
    let skip = lines.len().saturating_sub(MAX_TRACE_LINES);
    lines[skip..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyrelay_core::KeyrelayError;

    #[test]
    fn trace_includes_sources() {
        let err = KeyrelayError::transport("forward failed", std::io::Error::other("message gone"));
        assert_eq!(
            error_trace(&err),
            "transport error: forward failed\ncaused by: message gone"
        );
    }

    #[tokio::test(start_paused = true)]
    #[tracing_test::traced_test]
    async fn second_alert_inside_the_cooldown_is_suppressed() {
        let transport = std::sync::Arc::new(keyrelay_test_utils::MockTransport::new());
        let alerter = OwnerAlerter::new(transport.clone(), UserId(1), Duration::from_secs(30));
        let err = KeyrelayError::Internal("boom".into());

        assert!(alerter.report("callback", &err).await);
        assert!(!alerter.report("callback", &err).await);
        assert!(logs_contain("owner alert suppressed by cooldown"));

        let sent = transport.texts_to(&UserId(1).chat()).await;
        assert_eq!(sent, vec!["⚠️ <b>Error in callback</b>\n<pre>internal error: boom</pre>".to_string()]);
    }

    #[tokio::test]
    async fn alerts_can_be_sent_from_spawned_tasks() {
        let transport = std::sync::Arc::new(keyrelay_test_utils::MockTransport::new());
        let alerter = Arc::new(OwnerAlerter::new(transport.clone(), UserId(1), Duration::ZERO));

        let task = tokio::spawn({
            let alerter = Arc::clone(&alerter);
            async move {
                let err = KeyrelayError::Internal("countdown failed".into());
                alerter.report("method 2 countdown", &err).await
            }
        });
        assert!(task.await.unwrap());
        assert_eq!(transport.texts_to(&UserId(1).chat()).await.len(), 1);
    }

    #[test]
    fn trace_keeps_the_last_lines() {
        let long = (0..40).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let err = KeyrelayError::Internal(long);
        let trace = error_trace(&err);
        assert_eq!(trace.lines().count(), MAX_TRACE_LINES);
        assert!(trace.ends_with("line 39"));
    }
}
