//! Reconciliation phase and provider statistics.

use crate::change::ChangeSummary;
use std::time::{Duration, Instant};

/// Where a provider is in its reconciliation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePhase {
    /// No reconciliation is scheduled or running.
    Idle,
    /// A reconciliation is scheduled or running.
    Reconciling,
    /// A reconciliation is running and exactly one more will follow it.
    ReconcilingQueued,
}

impl ReconcilePhase {
    /// Returns true if a reconciliation is scheduled or running.
    pub fn is_active(&self) -> bool {
        !matches!(self, ReconcilePhase::Idle)
    }

    /// Applies a trigger. Returns the next phase and whether a new
    /// reconciliation has to be started.
    ///
    /// Triggers received while a follow-up is already queued collapse into
    /// that follow-up.
    pub(crate) fn on_trigger(self) -> (Self, bool) {
        match self {
            ReconcilePhase::Idle => (ReconcilePhase::Reconciling, true),
            ReconcilePhase::Reconciling | ReconcilePhase::ReconcilingQueued => {
                (ReconcilePhase::ReconcilingQueued, false)
            }
        }
    }

    /// Applies the end of a reconciliation. Returns the next phase and
    /// whether the queued follow-up has to run now.
    pub(crate) fn on_finished(self) -> (Self, bool) {
        match self {
            ReconcilePhase::ReconcilingQueued => (ReconcilePhase::Reconciling, true),
            ReconcilePhase::Reconciling | ReconcilePhase::Idle => (ReconcilePhase::Idle, false),
        }
    }
}

/// Statistics about a provider's reconciliations.
#[derive(Debug, Clone, Default)]
pub struct ProviderStats {
    /// Reconciliations that completed and notified observers.
    pub reconciliations: u64,
    /// Reconciliations that failed on the source or the repository.
    pub failures: u64,
    /// Reconciliations abandoned through cancellation.
    pub abandoned: u64,
    /// Triggers folded into an already scheduled reconciliation.
    pub coalesced_triggers: u64,
    /// Total changes persisted across all reconciliations.
    pub changes_applied: u64,
    /// Change counts of the last successful reconciliation.
    pub last_summary: Option<ChangeSummary>,
    /// Duration of the last finished reconciliation.
    pub last_duration: Option<Duration>,
    /// Completion time of the last successful reconciliation.
    pub last_success: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}
