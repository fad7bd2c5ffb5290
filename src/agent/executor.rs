use tracing::{error, info};

use crate::capture::CapturePipeline;
use crate::device::Actuator;
use crate::error::{AgentError, DeviceError};
use crate::types::action::Action;
use crate::types::outcome::JobOutcome;
use crate::types::unit::UnitId;

/// Runs actions on the unit's hardware and turns what happened into a
/// [`JobOutcome`].
pub struct JobExecutor {
    unit_id: UnitId,
    actuator: Actuator,
    capture: CapturePipeline,
}

impl JobExecutor {
    pub fn new(
        unit_id: UnitId,
        actuator: Actuator,
        capture: CapturePipeline,
    ) -> Self {
        Self {
            unit_id,
            actuator,
            capture,
        }
    }

    /// Executes `action` to completion.
    ///
    /// Hardware and capture failures become an error outcome, with the
    /// motor stopped. The only error returned is failing to stop the motor
    /// after such a failure.
    pub async fn execute(
        &mut self,
        action: Action,
    ) -> Result<JobOutcome, AgentError> {
        info!(unit_id = %self.unit_id, %action, "executing job");

        match self.run(action).await {
            Ok(outcome) => {
                info!(%action, "job succeeded");
                Ok(outcome)
            },
            Err(error) => {
                error!(%action, %error, "job aborted");
                self.actuator.stop().map_err(AgentError::UnsafeStop)?;
                Ok(JobOutcome::failure(self.unit_id, Some(action), error))
            },
        }
    }

    async fn run(&mut self, action: Action) -> Result<JobOutcome, DeviceError> {
        let mut outcome = JobOutcome::success(self.unit_id, action);

        match action {
            Action::Raise => {
                let travel = self.actuator.raise().await?;
                self.actuator.finish();
                outcome.duration_secs = Some(travel.as_secs_f64());
            },
            Action::RaiseAndCapture => {
                let travel = self.actuator.raise().await?;
                outcome.duration_secs = Some(travel.as_secs_f64());

                let report = self.capture.run(self.unit_id).await?;
                outcome.files = Some(report.files);
                outcome.backend_response = report.backend_response;
                outcome.backend_error = report.backend_error;

                // Lowering for as long as the raise took brings the net back
                // to where it started.
                self.actuator.lower(travel).await?;
            },
            Action::Lower => {
                let duration = self.actuator.config().lower_duration();
                self.actuator.lower(duration).await?;
                outcome.duration_secs = Some(duration.as_secs_f64());
            },
        }

        Ok(outcome)
    }

    /// Returns the motor to its de-energised state.
    pub fn shutdown(&mut self) -> Result<(), DeviceError> {
        self.actuator.stop()
    }
}
