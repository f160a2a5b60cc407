//! In-memory pool store.

use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard};

use chrono::Duration;
use reserva_allocator::{
    Allocation, PoolOracle, PoolStore, Predicate, ReservationError, ReservationResult,
    ResourceUnit, TimeWindow,
};
use reserva_id::{AllocationId, PoolId, ReservationId, UnitId};

/// Pool contents plus the windows of the reservations that own allocations.
#[derive(Debug, Clone, Default)]
pub struct PoolState {
    units: Vec<ResourceUnit>,
    allocations: Vec<Allocation>,
    windows: HashMap<ReservationId, TimeWindow>,
}

impl PoolState {
    /// Merged bookings of a unit clipped to `window`, in order.
    fn bookings(&self, unit: UnitId, window: &TimeWindow) -> ReservationResult<Vec<TimeWindow>> {
        let mut clipped = Vec::new();
        for allocation in self.allocations.iter().filter(|a| a.unit_id == unit) {
            let booked = self.windows.get(&allocation.reservation_id).ok_or_else(|| {
                ReservationError::Store(format!(
                    "no window recorded for reservation {}",
                    allocation.reservation_id
                ))
            })?;
            if let Some(part) = booked.intersection(window) {
                clipped.push(part);
            }
        }
        clipped.sort_by_key(|w| w.start());

        let mut merged: Vec<TimeWindow> = Vec::with_capacity(clipped.len());
        for part in clipped {
            match merged.last_mut() {
                Some(last) if part.start() <= last.end() => {
                    if part.end() > last.end() {
                        *last = TimeWindow::new(last.start(), part.end())?;
                    }
                }
                _ => merged.push(part),
            }
        }
        Ok(merged)
    }
}

impl PoolOracle for PoolState {
    fn find_units(&self, predicates: &[Predicate]) -> ReservationResult<Vec<ResourceUnit>> {
        Ok(self
            .units
            .iter()
            .filter(|u| u.satisfies(predicates))
            .cloned()
            .collect())
    }

    fn unit(&self, id: UnitId) -> ReservationResult<Option<ResourceUnit>> {
        Ok(self.units.iter().find(|u| u.id == id).cloned())
    }

    fn units(&self) -> ReservationResult<Vec<ResourceUnit>> {
        Ok(self.units.clone())
    }

    fn allocations_for_unit(&self, unit: UnitId) -> ReservationResult<Vec<Allocation>> {
        Ok(self
            .allocations
            .iter()
            .filter(|a| a.unit_id == unit)
            .cloned()
            .collect())
    }

    fn allocations_for_reservation(
        &self,
        reservation: ReservationId,
    ) -> ReservationResult<Vec<Allocation>> {
        Ok(self
            .allocations
            .iter()
            .filter(|a| a.reservation_id == reservation)
            .cloned()
            .collect())
    }

    fn free_periods(
        &self,
        unit: UnitId,
        window: &TimeWindow,
        minimum_span: Duration,
    ) -> ReservationResult<Vec<TimeWindow>> {
        let mut free = Vec::new();
        let mut cursor = window.start();
        for booked in self.bookings(unit, window)? {
            if cursor < booked.start() {
                free.push(TimeWindow::new(cursor, booked.start())?);
            }
            cursor = cursor.max(booked.end());
        }
        if cursor < window.end() {
            free.push(TimeWindow::new(cursor, window.end())?);
        }
        free.retain(|w| w.duration() >= minimum_span);
        Ok(free)
    }

    fn reserved_periods(
        &self,
        unit: UnitId,
        window: &TimeWindow,
        minimum_span: Duration,
    ) -> ReservationResult<Vec<TimeWindow>> {
        let mut reserved = self.bookings(unit, window)?;
        reserved.retain(|w| w.duration() >= minimum_span);
        Ok(reserved)
    }

    fn create_allocation(
        &mut self,
        unit: UnitId,
        reservation: ReservationId,
    ) -> ReservationResult<AllocationId> {
        if !self.units.iter().any(|u| u.id == unit) {
            return Err(ReservationError::ResourceNotFound(unit.to_string()));
        }
        let id = AllocationId::new();
        self.allocations.push(Allocation {
            id,
            unit_id: unit,
            reservation_id: reservation,
        });
        Ok(id)
    }

    fn delete_allocation(&mut self, allocation: AllocationId) -> ReservationResult<()> {
        let position = self
            .allocations
            .iter()
            .position(|a| a.id == allocation)
            .ok_or(ReservationError::AllocationNotFound(allocation))?;
        self.allocations.remove(position);
        Ok(())
    }

    fn insert_unit(&mut self, unit: ResourceUnit) -> ReservationResult<()> {
        self.units.push(unit);
        Ok(())
    }

    fn remove_unit(&mut self, unit: UnitId) -> ReservationResult<()> {
        let position = self
            .units
            .iter()
            .position(|u| u.id == unit)
            .ok_or_else(|| ReservationError::ResourceNotFound(unit.to_string()))?;
        self.units.remove(position);
        Ok(())
    }
}

/// A [`PoolStore`] keeping everything in one mutex-guarded [`PoolState`].
///
/// Transactions work on a copy that replaces the shared state only when the
/// closure succeeds. The single mutex serializes all pools, which is
/// stricter than the per-pool contract requires.
#[derive(Debug, Default)]
pub struct InMemoryPool {
    state: Mutex<PoolState>,
    locked: Mutex<Vec<Vec<PoolId>>>,
}

impl InMemoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // A panic inside a test closure poisons the lock; the state itself
        // is still consistent because writes land only on commit.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a unit directly, bypassing subnet validation.
    pub fn add_unit(&self, pool: &str, address: &str) -> UnitId {
        self.add_unit_with(pool, address, BTreeMap::new())
    }

    /// Register a unit with properties.
    pub fn add_unit_with(
        &self,
        pool: &str,
        address: &str,
        properties: BTreeMap<String, String>,
    ) -> UnitId {
        let id = UnitId::new();
        let address: IpAddr = address.parse().expect("test address");
        self.lock().units.push(ResourceUnit {
            id,
            pool_id: PoolId::parse(pool).expect("test pool id"),
            subnet_id: format!("{pool}-subnet"),
            address,
            properties,
        });
        id
    }

    /// Record the lease window of a reservation.
    ///
    /// Bookings are derived from these windows, so every reservation that
    /// owns allocations needs one.
    pub fn set_window(&self, reservation: ReservationId, window: TimeWindow) {
        self.lock().windows.insert(reservation, window);
    }

    /// Book `unit` for a reservation outside the manager.
    pub fn book(&self, unit: UnitId, reservation: ReservationId, window: TimeWindow) -> AllocationId {
        let mut state = self.lock();
        state.windows.insert(reservation, window);
        state
            .create_allocation(unit, reservation)
            .expect("unit registered")
    }

    pub fn allocations(&self) -> Vec<Allocation> {
        self.lock().allocations.clone()
    }

    pub fn units_of(&self, reservation: ReservationId) -> Vec<UnitId> {
        self.lock()
            .allocations
            .iter()
            .filter(|a| a.reservation_id == reservation)
            .map(|a| a.unit_id)
            .collect()
    }

    /// Pools named by each transaction so far, oldest first.
    pub fn locked_pools(&self) -> Vec<Vec<PoolId>> {
        self.locked.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> PoolState {
        self.lock().clone()
    }
}

impl PoolStore for InMemoryPool {
    fn transaction<T, F>(&self, pools: &[&PoolId], f: F) -> ReservationResult<T>
    where
        F: FnOnce(&mut dyn PoolOracle) -> ReservationResult<T>,
    {
        self.locked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(pools.iter().map(|p| (*p).clone()).collect());
        let mut state = self.lock();
        let mut working = state.clone();
        let out = f(&mut working)?;
        *state = working;
        Ok(out)
    }

    fn read<T, F>(&self, f: F) -> ReservationResult<T>
    where
        F: FnOnce(&dyn PoolOracle) -> ReservationResult<T>,
    {
        let state = self.lock();
        f(&*state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
    }

    fn window(from: u32, to: u32) -> TimeWindow {
        TimeWindow::new(at(from), at(to)).unwrap()
    }

    #[test]
    fn test_free_and_reserved_periods() {
        let pool = InMemoryPool::new();
        let unit = pool.add_unit("ext", "203.0.113.1");
        pool.book(unit, ReservationId::new(), window(10, 12));
        pool.book(unit, ReservationId::new(), window(11, 13));
        pool.book(unit, ReservationId::new(), window(15, 16));

        let state = pool.snapshot();
        let reserved = state
            .reserved_periods(unit, &window(8, 20), Duration::seconds(1))
            .unwrap();
        assert_eq!(reserved, vec![window(10, 13), window(15, 16)]);

        let free = state
            .free_periods(unit, &window(8, 20), Duration::hours(2))
            .unwrap();
        assert_eq!(free, vec![window(8, 10), window(13, 15), window(16, 20)]);

        let free = state
            .free_periods(unit, &window(8, 20), Duration::hours(3))
            .unwrap();
        assert_eq!(free, vec![window(16, 20)]);
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let pool = InMemoryPool::new();
        let unit = pool.add_unit("ext", "203.0.113.1");
        let pool_id = PoolId::parse("ext").unwrap();

        let result: ReservationResult<()> = pool.transaction(&[&pool_id], |oracle| {
            oracle.create_allocation(unit, ReservationId::new())?;
            Err(ReservationError::NotEnoughResourceAvailable)
        });
        assert!(result.is_err());
        assert!(pool.allocations().is_empty());
    }

    #[test]
    fn test_missing_window_is_a_store_error() {
        let pool = InMemoryPool::new();
        let unit = pool.add_unit("ext", "203.0.113.1");
        let pool_id = PoolId::parse("ext").unwrap();
        pool.transaction(&[&pool_id], |oracle| {
            oracle.create_allocation(unit, ReservationId::new())
        })
        .unwrap();

        let err = pool
            .snapshot()
            .free_periods(unit, &window(8, 9), Duration::seconds(1))
            .unwrap_err();
        assert!(matches!(err, ReservationError::Store(_)));
    }
}
