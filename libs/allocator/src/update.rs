//! Reservation update protocol.
//!
//! When a lease moves or a reservation's filters change, every held unit is
//! re-checked against the new request. Units that still qualify stay put;
//! the rest are swapped for fresh matches. Units of an active reservation
//! are in use and are never swapped: such an update fails with
//! [`ReservationError::NotEnoughResourceAvailable`].

use std::net::IpAddr;

use chrono::Duration;
use reserva_id::{ReservationId, UnitId};
use tracing::{debug, info};

use crate::error::{ReservationError, ReservationResult};
use crate::matcher::{match_units, MatchRequest};
use crate::model::{Allocation, ReservationChanges, ReservationRequest, ReservationStatus};
use crate::oracle::PoolOracle;
use crate::window::TimeWindow;

/// Inputs of one update.
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub reservation_id: ReservationId,
    pub status: ReservationStatus,
    /// The reservation as currently booked; its window is the old window.
    pub current: ReservationRequest,
    pub new_window: TimeWindow,
    pub changes: ReservationChanges,
}

impl UpdateRequest {
    pub fn old_window(&self) -> &TimeWindow {
        &self.current.window
    }

    /// The reservation as it will look after the update.
    pub fn target(&self) -> ReservationRequest {
        self.changes.apply(&self.current, self.new_window)
    }

    /// Shrinking a window without touching filters never needs a swap.
    pub fn is_pure_shrink(&self) -> bool {
        self.changes.is_empty() && self.old_window().contains(&self.new_window)
    }
}

/// Result of an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Existing allocations stand.
    Unchanged,
    /// `added` were created, then `removed` were deleted.
    Swapped {
        added: Vec<Allocation>,
        removed: Vec<Allocation>,
    },
}

impl UpdateOutcome {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged)
    }
}

/// Which held allocations go, and what has to replace them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlan {
    pub release: Vec<Allocation>,
    /// Pinned addresses not covered by kept units.
    pub missing_pinned: Vec<IpAddr>,
    /// Number of units to match.
    pub wanted: usize,
    /// Every unit the reservation held before the update.
    pub held: Vec<UnitId>,
}

impl UpdatePlan {
    pub fn is_noop(&self) -> bool {
        self.wanted == 0
    }
}

/// Decide which allocations survive the update.
///
/// A held unit survives when it satisfies the new predicates and its
/// reserved periods across the new effective window are either none at all
/// or exactly its own booking clipped to that window.
pub fn plan_update(
    oracle: &dyn PoolOracle,
    request: &UpdateRequest,
    margin: Duration,
    reserved_span: Duration,
) -> ReservationResult<UpdatePlan> {
    let target = request.target();
    if target.pinned.len() > target.amount {
        return Err(ReservationError::TooManyPinned {
            pinned: target.pinned.len(),
            amount: target.amount,
        });
    }

    let allocations = oracle.allocations_for_reservation(request.reservation_id)?;
    let held: Vec<UnitId> = allocations.iter().map(|a| a.unit_id).collect();

    let candidates = oracle.find_units(&target.predicates())?;
    let probe = request.new_window.with_margin(margin)?;
    let own_booking = request.old_window().intersection(&probe);

    let mut kept = Vec::new();
    let mut release = Vec::new();
    for allocation in allocations {
        let Some(unit) = candidates.iter().find(|u| u.id == allocation.unit_id) else {
            debug!(unit_id = %allocation.unit_id, "Held unit no longer matches filters");
            release.push(allocation);
            continue;
        };

        let reserved = oracle.reserved_periods(unit.id, &probe, reserved_span)?;
        let only_own = match reserved.as_slice() {
            [] => true,
            [period] => Some(*period) == own_booking,
            _ => false,
        };

        if only_own {
            kept.push((allocation, unit.address));
        } else {
            debug!(
                unit_id = %unit.id,
                reserved_periods = reserved.len(),
                "Held unit is booked elsewhere in the new window"
            );
            release.push(allocation);
        }
    }

    let missing_pinned: Vec<IpAddr> = target
        .pinned
        .iter()
        .filter(|addr| !kept.iter().any(|(_, kept_addr)| kept_addr == *addr))
        .copied()
        .collect();

    let shortfall = target.amount.saturating_sub(kept.len() + release.len());

    // Make room for pinned addresses by giving up kept units that are not
    // pinned themselves, last kept first.
    while missing_pinned.len() > release.len() + shortfall {
        let Some(position) = kept
            .iter()
            .rposition(|(_, addr)| !target.pinned.contains(addr))
        else {
            break;
        };
        let (allocation, _) = kept.remove(position);
        release.push(allocation);
    }

    Ok(UpdatePlan {
        wanted: release.len() + shortfall,
        release,
        missing_pinned,
        held,
    })
}

/// Run the update protocol against a pool view.
///
/// The caller must hold the critical section of every pool the
/// reservation is in or moves to for the duration of this call.
pub fn update_allocations(
    oracle: &mut dyn PoolOracle,
    request: &UpdateRequest,
    margin: Duration,
    reserved_span: Duration,
) -> ReservationResult<UpdateOutcome> {
    if request.is_pure_shrink() {
        debug!(reservation_id = %request.reservation_id, "Window shrink only, nothing to update");
        return Ok(UpdateOutcome::Unchanged);
    }

    let plan = plan_update(&*oracle, request, margin, reserved_span)?;
    if plan.is_noop() {
        return Ok(UpdateOutcome::Unchanged);
    }

    if request.status.is_active() {
        info!(
            reservation_id = %request.reservation_id,
            release = plan.release.len(),
            "Refusing to swap units of an active reservation"
        );
        return Err(ReservationError::NotEnoughResourceAvailable);
    }

    let target = request.target();
    let predicates = target.predicates();
    let selected = match_units(
        &*oracle,
        &MatchRequest::new(&request.new_window, &predicates, plan.wanted)
            .margin(margin)
            .pinned(&plan.missing_pinned)
            .exclude(&plan.held),
    )?;

    let mut added = Vec::with_capacity(selected.len());
    for unit_id in selected {
        let id = oracle.create_allocation(unit_id, request.reservation_id)?;
        added.push(Allocation {
            id,
            unit_id,
            reservation_id: request.reservation_id,
        });
    }
    for allocation in &plan.release {
        oracle.delete_allocation(allocation.id)?;
    }

    info!(
        reservation_id = %request.reservation_id,
        added = added.len(),
        removed = plan.release.len(),
        "Reservation allocations swapped"
    );

    Ok(UpdateOutcome::Swapped {
        added,
        removed: plan.release,
    })
}
