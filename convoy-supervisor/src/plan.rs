//! Pure reconcile planning: compare actual fleet state to desired state and
//! decide what to do, without doing any of it
//!
//! Keeping the decision separate from execution makes the policy directly
//! testable: the supervisor executes whatever the plan says, serially.

use convoy_core::{Fleet, WorkerId};

/// One step of a reconcile pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Launch a fresh worker for an empty slot
    Start(WorkerId),
    /// Tear down a Failed worker and launch a successor under the same id
    Replace(WorkerId),
    /// Drain and remove a worker whose slot is no longer wanted
    Stop(WorkerId),
}

/// Plan the next reconcile pass.
///
/// Excess workers are stopped first, highest id first. At most one launch is
/// planned per pass, and none while a worker is still Starting, so additions
/// are gated on the previous new worker reaching Healthy. Failed workers
/// inside the target range are replaced before empty slots are filled; Failed
/// workers outside it are simply stopped along with the rest of the excess.
pub fn next_actions(fleet: &Fleet) -> Vec<ReconcileAction> {
    let mut actions: Vec<ReconcileAction> = fleet
        .excess_ids()
        .into_iter()
        .map(ReconcileAction::Stop)
        .collect();

    if !fleet.has_starting_worker() {
        let target = fleet.target_count();
        let failed = fleet
            .failed_ids()
            .into_iter()
            .find(|id| id.as_u16() <= target);
        if let Some(id) = failed {
            actions.push(ReconcileAction::Replace(id));
        } else if let Some(id) = fleet.missing_ids().into_iter().next() {
            actions.push(ReconcileAction::Start(id));
        }
    }

    actions
}
