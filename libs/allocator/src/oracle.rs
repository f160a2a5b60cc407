//! Seams to the systems this crate does not own.
//!
//! - [`PoolOracle`]: pool inventory, allocation records and free/reserved
//!   period computation over allocation history.
//! - [`PoolStore`]: the per-pool critical section every read-then-write
//!   sequence runs in.
//! - [`NetworkController`]: the transport that actually provisions
//!   addresses.

use std::net::IpAddr;

use chrono::Duration;
use reserva_id::{AllocationId, PoolId, ReservationId, UnitId};
use reserva_networking::Subnet;

use crate::error::ReservationResult;
use crate::model::{Allocation, ResourceUnit};
use crate::requirements::Predicate;
use crate::window::TimeWindow;

/// Transactional view of one pool.
///
/// Implementations must return units and periods in a stable order so that
/// matching is deterministic.
pub trait PoolOracle {
    /// Units satisfying every predicate.
    fn find_units(&self, predicates: &[Predicate]) -> ReservationResult<Vec<ResourceUnit>>;

    fn unit(&self, id: UnitId) -> ReservationResult<Option<ResourceUnit>>;

    fn units(&self) -> ReservationResult<Vec<ResourceUnit>>;

    fn allocations_for_unit(&self, unit: UnitId) -> ReservationResult<Vec<Allocation>>;

    fn allocations_for_reservation(
        &self,
        reservation: ReservationId,
    ) -> ReservationResult<Vec<Allocation>>;

    /// True if any allocation, past or future, references the unit.
    fn has_allocations(&self, unit: UnitId) -> ReservationResult<bool> {
        Ok(!self.allocations_for_unit(unit)?.is_empty())
    }

    /// Disjoint sub-intervals of `window`, in order, during which the unit
    /// is not booked and that last at least `minimum_span`.
    fn free_periods(
        &self,
        unit: UnitId,
        window: &TimeWindow,
        minimum_span: Duration,
    ) -> ReservationResult<Vec<TimeWindow>>;

    /// Disjoint sub-intervals of `window`, in order, during which the unit
    /// is booked, keeping only those lasting at least `minimum_span`.
    fn reserved_periods(
        &self,
        unit: UnitId,
        window: &TimeWindow,
        minimum_span: Duration,
    ) -> ReservationResult<Vec<TimeWindow>>;

    fn create_allocation(
        &mut self,
        unit: UnitId,
        reservation: ReservationId,
    ) -> ReservationResult<AllocationId>;

    fn delete_allocation(&mut self, allocation: AllocationId) -> ReservationResult<()>;

    fn insert_unit(&mut self, unit: ResourceUnit) -> ReservationResult<()>;

    fn remove_unit(&mut self, unit: UnitId) -> ReservationResult<()>;
}

/// Serializes access to pools.
///
/// `transaction` must hold an exclusive lock (or a serializable
/// transaction) on every pool in `pools` for the whole closure and discard
/// every write made through the view when the closure returns `Err`.
/// Callers pass `pools` sorted and deduplicated, so locks taken in slice
/// order are always acquired in the same order. The view exposes units and
/// allocations of all locked pools.
pub trait PoolStore {
    fn transaction<T, F>(&self, pools: &[&PoolId], f: F) -> ReservationResult<T>
    where
        F: FnOnce(&mut dyn PoolOracle) -> ReservationResult<T>;

    /// Read-only access across all pools.
    fn read<T, F>(&self, f: F) -> ReservationResult<T>
    where
        F: FnOnce(&dyn PoolOracle) -> ReservationResult<T>;
}

/// Network controller calls made when leases start and end.
pub trait NetworkController {
    /// The subnet of `pool` that `address` belongs to, if any.
    fn fetch_subnet(&self, pool: &PoolId, address: IpAddr) -> anyhow::Result<Option<Subnet>>;

    /// Create the address on the controller on behalf of a reservation.
    fn create_reserved(
        &self,
        unit: &ResourceUnit,
        reservation: ReservationId,
    ) -> anyhow::Result<()>;

    /// Remove the address from the controller.
    fn delete_reserved(&self, unit: &ResourceUnit) -> anyhow::Result<()>;
}
