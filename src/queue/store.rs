//! In-memory job storage keyed by unit.
//!
//! Each unit owns a slot holding its pending job (if any) and its most
//! recently completed job. Mutations for one unit are serialised by that
//! slot's mutex; the table of slots is only write-locked to add a unit the
//! store has never seen before.
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use itertools::Itertools;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::error::{QueueError, Result};
use crate::types::action::Action;
use crate::types::job::Job;
use crate::types::states::JobState;
use crate::types::unit::UnitId;

#[derive(Debug, Default)]
struct UnitSlot {
    pending: Option<Job>,
    completed: Option<Job>,
}

/// Acknowledgement returned when a job is stored.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CreateAck {
    pub job_id: UnitId,
    /// The effective `requested_at` of the stored job.
    pub timestamp: String,
    /// True if this create discarded a job that was still pending.
    #[serde(skip)]
    pub replaced: bool,
}

/// Counts and ids of pending and completed jobs at one point in time.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub pending_count: usize,
    pub completed_count: usize,
    pub pending_ids: Vec<UnitId>,
    pub completed_ids: Vec<UnitId>,
}

/// Holds at most one pending job and one completed job per unit.
///
/// Cheap to clone; clones share the same storage.
#[derive(Clone, Debug, Default)]
pub struct JobStore {
    units: Arc<RwLock<HashMap<UnitId, Arc<Mutex<UnitSlot>>>>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the slot for `unit_id`, creating it if needed.
    async fn slot(&self, unit_id: UnitId) -> Arc<Mutex<UnitSlot>> {
        if let Some(slot) = self.units.read().await.get(&unit_id) {
            return slot.clone();
        }

        self.units.write().await.entry(unit_id).or_default().clone()
    }

    /// Returns the slot for `unit_id` without creating one.
    async fn existing_slot(
        &self,
        unit_id: UnitId,
    ) -> Option<Arc<Mutex<UnitSlot>>> {
        self.units.read().await.get(&unit_id).cloned()
    }

    /// Stores a new pending job for the unit, overwriting any job that is
    /// still pending there.
    pub async fn create_job(
        &self,
        unit_id: UnitId,
        action: Action,
        requested_at: Option<String>,
    ) -> CreateAck {
        let job = Job::new(unit_id, action, requested_at);
        let timestamp = job.requested_at.clone();

        let slot = self.slot(unit_id).await;
        let mut slot = slot.lock().await;
        let previous = slot.pending.replace(job);

        if let Some(previous) = &previous {
            debug!(
                %unit_id,
                previous_action = %previous.action,
                "overwrote pending job"
            );
        }
        info!(%unit_id, %action, "job created");

        CreateAck {
            job_id: unit_id,
            timestamp,
            replaced: previous.is_some(),
        }
    }

    /// Returns a copy of the unit's pending job, if any. Never consumes it.
    pub async fn poll_job(&self, unit_id: UnitId) -> Option<Job> {
        let slot = self.existing_slot(unit_id).await?;
        let slot = slot.lock().await;
        slot.pending.clone()
    }

    /// Moves the unit's pending job to completed, attaching `result`.
    ///
    /// Fails with [`QueueError::NotFound`] when nothing is pending, which
    /// includes a second completion of the same job.
    pub async fn complete_job(
        &self,
        unit_id: UnitId,
        result: Value,
    ) -> Result<Job> {
        let slot = self
            .existing_slot(unit_id)
            .await
            .ok_or(QueueError::NotFound(unit_id))?;
        let mut slot = slot.lock().await;

        let mut job = slot.pending.take().ok_or(QueueError::NotFound(unit_id))?;
        job.state = JobState::Completed {
            completed_at: Utc::now(),
            result,
        };
        slot.completed = Some(job.clone());

        info!(%unit_id, action = %job.action, "job completed");

        Ok(job)
    }

    /// Returns the unit's most recently completed job.
    pub async fn completed_job(&self, unit_id: UnitId) -> Option<Job> {
        let slot = self.existing_slot(unit_id).await?;
        let slot = slot.lock().await;
        slot.completed.clone()
    }

    pub async fn status(&self) -> StatusSnapshot {
        let slots: Vec<_> = self
            .units
            .read()
            .await
            .iter()
            .map(|(id, slot)| (*id, slot.clone()))
            .collect();

        let mut snapshot = StatusSnapshot::default();
        for (unit_id, slot) in slots {
            let slot = slot.lock().await;
            if slot.pending.is_some() {
                snapshot.pending_ids.push(unit_id);
            }
            if slot.completed.is_some() {
                snapshot.completed_ids.push(unit_id);
            }
        }

        snapshot.pending_ids =
            snapshot.pending_ids.into_iter().sorted().collect();
        snapshot.completed_ids =
            snapshot.completed_ids.into_iter().sorted().collect();
        snapshot.pending_count = snapshot.pending_ids.len();
        snapshot.completed_count = snapshot.completed_ids.len();

        snapshot
    }
}
