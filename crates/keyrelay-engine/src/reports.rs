// SPDX-FileCopyrightText: 2026 Keyrelay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduled usage reports.
//!
//! Reports fire on a fixed local clock. Each one messages every operator who
//! posted during the window, sends the owner a roll-up, and then zeroes the
//! scope.

use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc, Weekday};
use keyrelay_core::{KeyrelayError, UserId};
use keyrelay_storage::{MethodCounters, StatScope};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::ui;

const SCHEDULER_TICK: Duration = Duration::from_secs(30);

/// Scopes whose report is due at the given local minute.
pub fn due_scopes(now: DateTime<FixedOffset>) -> Vec<StatScope> {
    if now.minute() != 0 {
        return Vec::new();
    }
    let mut due = Vec::new();
    match now.hour() {
        10 => {
            due.push(StatScope::Daily);
            if now.weekday() == Weekday::Sun {
                due.push(StatScope::Weekly);
            }
            let last_of_month = now
                .date_naive()
                .succ_opt()
                .is_none_or(|next| next.month() != now.month());
            if last_of_month {
                due.push(StatScope::Monthly);
            }
        }
        14 | 22 => due.push(StatScope::EightHour),
        _ => {}
    }
    due
}

impl Engine {
    /// Sends the report for `scope` and resets its counters.
    pub async fn send_report(&self, scope: StatScope) -> Result<(), KeyrelayError> {
        let entries: Vec<(UserId, String, MethodCounters)> = {
            let store = self.store.lock().await;
            store
                .sessions
                .iter()
                .map(|(user, session)| (*user, *session.stats.scope(scope)))
                .filter(|(_, counters)| !counters.is_empty())
                .map(|(user, counters)| {
                    let name = store
                        .profiles
                        .get(user)
                        .map_or_else(|| user.to_string(), |p| p.first_name.clone());
                    (user, name, counters)
                })
                .collect()
        };

        let title = ui::scope_title(scope);
        for (user, _, counters) in &entries {
            if let Err(e) = self.send(*user, &ui::stats_text(title, counters), None).await {
                warn!(%user, %scope, error = %e, "report not delivered");
            }
        }
        self.send(self.owner, &rollup(title, &entries), None).await?;

        {
            let mut store = self.store.lock().await;
            for (_, session) in store.sessions.iter_mut() {
                session.stats.reset(scope);
            }
        }
        info!(%scope, operators = entries.len(), "report sent");
        self.persist().await;
        Ok(())
    }
}

fn rollup(title: &str, entries: &[(UserId, String, MethodCounters)]) -> String {
    let (apks, keys) = entries.iter().fold((0, 0), |(apks, keys), (_, _, c)| {
        (apks + c.total_apks(), keys + c.total_keys())
    });
    let mut text = format!(
        "📈 <b>{title} report</b>\nActive operators: {}\nTotal: {apks} APKs, {keys} keys",
        entries.len()
    );
    if !entries.is_empty() {
        text.push('\n');
    }
    for (user, name, counters) in entries {
        let _ = write!(
            text,
            "\n• {} (<code>{user}</code>): {} APKs, {} keys",
            crate::caption::escape_html(name),
            counters.total_apks(),
            counters.total_keys()
        );
    }
    text
}

/// Checks the local clock every 30 seconds and sends due reports. A report
/// fires at most once per local minute.
pub async fn run_report_scheduler(engine: Engine, offset: FixedOffset, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(SCHEDULER_TICK);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_fired: Option<(i32, u32, u32, u32)> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("report scheduler stopped");
                return;
            }
            _ = interval.tick() => {}
        }

        let now = Utc::now().with_timezone(&offset);
        let minute = (now.year(), now.ordinal(), now.hour(), now.minute());
        if last_fired == Some(minute) {
            continue;
        }
        let due = due_scopes(now);
        if due.is_empty() {
            continue;
        }
        last_fired = Some(minute);
        for scope in due {
            if let Err(e) = engine.send_report(scope).await {
                engine.report_failure(&format!("{scope} report"), None, &e).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ist(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(330 * 60)
            .unwrap()
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
    }

    #[test]
    fn daily_at_ten() {
        // 2026-10-14 is a Wednesday.
        assert_eq!(due_scopes(ist(2026, 10, 14, 10, 0)), vec![StatScope::Daily]);
        assert!(due_scopes(ist(2026, 10, 14, 10, 1)).is_empty());
        assert!(due_scopes(ist(2026, 10, 14, 9, 0)).is_empty());
    }

    #[test]
    fn eight_hour_windows() {
        assert_eq!(due_scopes(ist(2026, 10, 14, 14, 0)), vec![StatScope::EightHour]);
        assert_eq!(due_scopes(ist(2026, 10, 14, 22, 0)), vec![StatScope::EightHour]);
        assert!(due_scopes(ist(2026, 10, 14, 6, 0)).is_empty());
    }

    #[test]
    fn weekly_on_sunday_and_monthly_on_last_day() {
        // 2026-05-31 is a Sunday and the last day of May.
        assert_eq!(
            due_scopes(ist(2026, 5, 31, 10, 0)),
            vec![StatScope::Daily, StatScope::Weekly, StatScope::Monthly]
        );
        assert_eq!(
            due_scopes(ist(2026, 2, 28, 10, 0)),
            vec![StatScope::Daily, StatScope::Monthly]
        );
        assert_eq!(due_scopes(ist(2026, 10, 18, 10, 0)), vec![StatScope::Daily, StatScope::Weekly]);
    }

    #[test]
    fn rollup_totals_every_operator() {
        let mut a = MethodCounters::default();
        a.method1.apks = 2;
        a.method1.keys = 2;
        let mut b = MethodCounters::default();
        b.method2.apks = 3;
        b.method2.keys = 1;
        let text = rollup(
            "Today",
            &[(UserId(1), "Ana".into(), a), (UserId(2), "<Bo>".into(), b)],
        );
        assert!(text.contains("Active operators: 2"));
        assert!(text.contains("Total: 5 APKs, 3 keys"));
        assert!(text.contains("&lt;Bo&gt;"));
    }
}
