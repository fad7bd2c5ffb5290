//! The device agent: poll the queue, run the job, report back, repeat.
//!
//! Everything happens in sequence on one task. A cycle that finds a job is
//! blocked for the whole of the job; polling resumes one interval after the
//! report.
use std::time::Duration;

use tokio::select;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::AgentError;
use crate::types::outcome::JobOutcome;

pub mod client;
pub mod executor;

pub use client::{AssignedJob, QueueClient};
pub use executor::JobExecutor;

pub struct Agent {
    client: QueueClient,
    executor: JobExecutor,
    poll_interval: Duration,
}

impl Agent {
    pub fn new(
        client: QueueClient,
        executor: JobExecutor,
        poll_interval: Duration,
    ) -> Self {
        Self {
            client,
            executor,
            poll_interval,
        }
    }

    /// Polls until `cancel` fires, then leaves the motor de-energised.
    ///
    /// Cancelling part way through a job abandons it without reporting, so
    /// it stays pending on the queue.
    pub async fn run(
        mut self,
        cancel: CancellationToken,
    ) -> Result<(), AgentError> {
        info!(
            unit_id = %self.client.unit_id(),
            interval_secs = self.poll_interval.as_secs_f64(),
            "agent started"
        );

        let result = self.poll_loop(&cancel).await;

        // Runs on every exit path; if the stop itself fails the unit's state
        // is unknown and that takes precedence over any earlier error.
        if let Err(error) = self.executor.shutdown() {
            error!(%error, "failed to stop motor on shutdown");
            return Err(AgentError::UnsafeStop(error));
        }
        info!("motor stopped, agent exiting");

        result
    }

    async fn poll_loop(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<(), AgentError> {
        loop {
            let cycle = select! {
                cycle = self.cycle() => cycle?,
                _ = cancel.cancelled() => {
                    warn!("interrupted, abandoning current cycle");
                    return Ok(());
                },
            };
            if let Some(outcome) = cycle {
                info!(
                    status = ?outcome.status,
                    "job finished, waiting for next"
                );
            }

            select! {
                _ = sleep(self.poll_interval) => {},
                _ = cancel.cancelled() => return Ok(()),
            }
        }
    }

    /// One poll, and if a job was waiting: execute it and report the
    /// outcome. Returns the outcome of the job, if there was one.
    pub async fn cycle(&mut self) -> Result<Option<JobOutcome>, AgentError> {
        let job = match self.client.poll().await {
            Ok(Some(job)) => job,
            Ok(None) => {
                info!("no job");
                return Ok(None);
            },
            Err(error) => {
                warn!(%error, "failed to poll queue");
                return Ok(None);
            },
        };

        info!(
            action = %job.action,
            requested_at = job.requested_at.as_deref().unwrap_or("-"),
            "job received"
        );

        let outcome = match job.action() {
            Ok(action) => self.executor.execute(action).await?,
            Err(error) => {
                warn!(%error, "rejecting job");
                JobOutcome::failure(self.client.unit_id(), None, error)
            },
        };

        // If this fails the job stays pending on the queue, so a later poll
        // hands it out again.
        match self.client.complete(&outcome).await {
            Ok(()) => info!("completion reported"),
            Err(error) => error!(%error, "failed to report completion"),
        }

        Ok(Some(outcome))
    }
}
