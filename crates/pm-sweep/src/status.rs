//! Sweep lifecycle tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::minimizer::MinimizationResult;

/// Lifecycle state for a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SweepState {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Aggregate status of one sweep over a grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepStatus {
    pub id: Uuid,
    pub state: SweepState,
    pub total_points: usize,
    /// Points with a selected minimum.
    pub points_solved: usize,
    /// Points where no initial condition converged.
    pub points_absent: usize,
    /// Points whose minimization raised an error.
    pub points_failed: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl SweepStatus {
    pub fn new(total_points: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SweepState::Pending,
            total_points,
            points_solved: 0,
            points_absent: 0,
            points_failed: 0,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    pub fn mark_running(&mut self) {
        self.state = SweepState::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.state = SweepState::Completed;
        self.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, error: String) {
        self.state = SweepState::Failed;
        self.finished_at = Some(Utc::now());
        self.error = Some(error);
    }

    pub fn record(&mut self, result: &MinimizationResult) {
        if result.is_solved() {
            self.points_solved += 1;
        } else {
            self.points_absent += 1;
        }
    }

    pub fn record_failure(&mut self) {
        self.points_failed += 1;
    }

    pub fn duration_seconds(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pm_types::EnvRecord;

    #[test]
    fn sweep_status_lifecycle() {
        let mut status = SweepStatus::new(4);
        assert_eq!(status.state, SweepState::Pending);
        assert!(status.started_at.is_none());

        status.mark_running();
        assert_eq!(status.state, SweepState::Running);
        assert!(status.started_at.is_some());

        status.mark_completed();
        assert_eq!(status.state, SweepState::Completed);
        assert!(status.finished_at.is_some());
        assert!(status.duration_seconds().is_some());
    }

    #[test]
    fn counts_by_outcome() {
        let mut status = SweepStatus::new(3);
        let solved = MinimizationResult::select(vec![Some(
            EnvRecord::new().with("FreeEnergy", -1.0).unwrap(),
        )])
        .unwrap();
        status.record(&solved);
        status.record(&MinimizationResult::failed(2));
        status.record_failure();

        assert_eq!(status.points_solved, 1);
        assert_eq!(status.points_absent, 1);
        assert_eq!(status.points_failed, 1);
    }

    #[test]
    fn sweep_failure() {
        let mut status = SweepStatus::new(1);
        status.mark_running();
        status.mark_failed("solver executable missing".into());
        assert_eq!(status.state, SweepState::Failed);
        assert_eq!(status.error.as_deref(), Some("solver executable missing"));
    }
}
