//! Cron-driven trigger production.
//!
//! A [`CronTimer`] owns a parsed schedule and a handle to the orchestrator.
//! It sleeps until the next tick, fires a cron trigger, and repeats until the
//! orchestrator goes away. Ticks that land while a cycle is still running are
//! coalesced by the orchestrator rather than queued up here.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use crate::error::{Error, Result};
use crate::orchestrator::OrchestratorHandle;
use crate::run::RunTrigger;

/// Fires cron-scheduled refresh triggers at an orchestrator.
#[derive(Debug)]
pub struct CronTimer {
    schedule: Schedule,
    handle: OrchestratorHandle,
}

impl CronTimer {
    /// Parses `expression` as a cron schedule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schedule`] when the expression is not valid cron
    /// syntax.
    pub fn new(expression: &str, handle: OrchestratorHandle) -> Result<Self> {
        let schedule = Schedule::from_str(expression).map_err(|e| Error::Schedule {
            expression: expression.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { schedule, handle })
    }

    /// Returns the next fire time strictly after `now`, or `None` when the
    /// schedule has no future occurrences.
    #[must_use]
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&now).next()
    }

    /// Runs the timer loop until the orchestrator shuts down.
    pub async fn run(self) {
        loop {
            let now = Utc::now();
            let Some(next) = self.next_after(now) else {
                tracing::info!("cron schedule has no future occurrences, timer exiting");
                return;
            };
            let wait = (next - now).to_std().unwrap_or_default();
            tracing::debug!(next = %next, wait_secs = wait.as_secs(), "waiting for next cron tick");
            tokio::time::sleep(wait).await;

            if self.handle.trigger(RunTrigger::cron()).await.is_err() {
                tracing::info!("orchestrator is gone, timer exiting");
                return;
            }
        }
    }
}
