//! Allocation matching.
//!
//! Selection order is part of the contract:
//!
//! 1. pinned addresses,
//! 2. units that have never been allocated,
//! 3. units allocated elsewhere but free across the whole effective window.
//!
//! Preferring never-allocated units keeps units with bookings free for
//! requests that cannot be placed anywhere else.

use std::net::IpAddr;

use chrono::Duration;
use reserva_id::UnitId;
use tracing::debug;

use crate::error::{ReservationError, ReservationResult};
use crate::oracle::PoolOracle;
use crate::requirements::Predicate;
use crate::window::TimeWindow;

/// Inputs of one matching call.
#[derive(Debug, Clone, Copy)]
pub struct MatchRequest<'a> {
    pub window: &'a TimeWindow,
    /// Padding applied to both ends of `window`.
    pub margin: Duration,
    pub predicates: &'a [Predicate],
    pub pinned: &'a [IpAddr],
    pub amount: usize,
    /// Units that must not be selected (already held by the caller).
    pub exclude: &'a [UnitId],
}

impl<'a> MatchRequest<'a> {
    pub fn new(window: &'a TimeWindow, predicates: &'a [Predicate], amount: usize) -> Self {
        Self {
            window,
            margin: Duration::zero(),
            predicates,
            pinned: &[],
            amount,
            exclude: &[],
        }
    }

    pub fn margin(mut self, margin: Duration) -> Self {
        self.margin = margin;
        self
    }

    pub fn pinned(mut self, pinned: &'a [IpAddr]) -> Self {
        self.pinned = pinned;
        self
    }

    pub fn exclude(mut self, exclude: &'a [UnitId]) -> Self {
        self.exclude = exclude;
        self
    }
}

/// Select `request.amount` units, or fail with
/// [`ReservationError::NotEnoughResourceAvailable`].
///
/// Every pinned address must fit in the selection, so more pinned addresses
/// than `amount` fails with [`ReservationError::TooManyPinned`] before the
/// pool is queried.
pub fn match_units(
    oracle: &dyn PoolOracle,
    request: &MatchRequest<'_>,
) -> ReservationResult<Vec<UnitId>> {
    if request.pinned.len() > request.amount {
        return Err(ReservationError::TooManyPinned {
            pinned: request.pinned.len(),
            amount: request.amount,
        });
    }

    let effective = request.window.with_margin(request.margin)?;
    let span = effective.duration();

    let mut pinned = Vec::new();
    let mut unallocated = Vec::new();
    let mut free_here = Vec::new();

    for unit in oracle.find_units(request.predicates)? {
        if request.exclude.contains(&unit.id) {
            continue;
        }
        let is_pinned = request.pinned.contains(&unit.address);

        if !oracle.has_allocations(unit.id)? {
            if is_pinned {
                pinned.push(unit.id);
            } else {
                unallocated.push(unit.id);
            }
            continue;
        }

        let free = oracle.free_periods(unit.id, &effective, span)?;
        if free.len() == 1 && free[0] == effective {
            if is_pinned {
                pinned.push(unit.id);
            } else {
                free_here.push(unit.id);
            }
        }
    }

    debug!(
        window = %effective,
        pinned = pinned.len(),
        unallocated = unallocated.len(),
        free_here = free_here.len(),
        amount = request.amount,
        "Partitioned candidate units"
    );

    if pinned.len() < request.pinned.len() {
        return Err(ReservationError::NotEnoughResourceAvailable);
    }

    let mut selected = pinned;
    selected.extend(unallocated);
    selected.extend(free_here);

    if selected.len() < request.amount {
        return Err(ReservationError::NotEnoughResourceAvailable);
    }
    selected.truncate(request.amount);
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Allocation, ResourceUnit};
    use chrono::{DateTime, TimeZone, Utc};
    use reserva_id::{AllocationId, PoolId, ReservationId};
    use std::collections::{BTreeMap, HashMap};

    /// Minimal read-only oracle: units plus a fixed busy list per unit.
    #[derive(Default)]
    struct FixedOracle {
        units: Vec<ResourceUnit>,
        busy: HashMap<UnitId, Vec<TimeWindow>>,
    }

    impl FixedOracle {
        fn with_units(count: u8) -> (Self, Vec<UnitId>) {
            let mut oracle = Self::default();
            let mut ids = Vec::new();
            for n in 1..=count {
                let id = UnitId::new();
                ids.push(id);
                oracle.units.push(ResourceUnit {
                    id,
                    pool_id: PoolId::parse("ext").unwrap(),
                    subnet_id: "sub".into(),
                    address: IpAddr::from([203, 0, 113, n]),
                    properties: BTreeMap::new(),
                });
            }
            (oracle, ids)
        }
    }

    impl PoolOracle for FixedOracle {
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
            let count = self.busy.get(&unit).map_or(0, Vec::len);
            Ok((0..count)
                .map(|_| Allocation {
                    id: AllocationId::new(),
                    unit_id: unit,
                    reservation_id: ReservationId::new(),
                })
                .collect())
        }

        fn allocations_for_reservation(
            &self,
            _reservation: ReservationId,
        ) -> ReservationResult<Vec<Allocation>> {
            Ok(Vec::new())
        }

        fn free_periods(
            &self,
            unit: UnitId,
            window: &TimeWindow,
            minimum_span: Duration,
        ) -> ReservationResult<Vec<TimeWindow>> {
            let busy = self.busy.get(&unit).cloned().unwrap_or_default();
            if busy.iter().any(|b| b.overlaps(window)) {
                return Ok(Vec::new());
            }
            Ok(if window.duration() >= minimum_span {
                vec![*window]
            } else {
                Vec::new()
            })
        }

        fn reserved_periods(
            &self,
            _unit: UnitId,
            _window: &TimeWindow,
            _minimum_span: Duration,
        ) -> ReservationResult<Vec<TimeWindow>> {
            Ok(Vec::new())
        }

        fn create_allocation(
            &mut self,
            _unit: UnitId,
            _reservation: ReservationId,
        ) -> ReservationResult<AllocationId> {
            unreachable!("matcher never writes")
        }

        fn delete_allocation(&mut self, _allocation: AllocationId) -> ReservationResult<()> {
            unreachable!("matcher never writes")
        }

        fn insert_unit(&mut self, _unit: ResourceUnit) -> ReservationResult<()> {
            unreachable!("matcher never writes")
        }

        fn remove_unit(&mut self, _unit: UnitId) -> ReservationResult<()> {
            unreachable!("matcher never writes")
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
    }

    fn window(from: u32, to: u32) -> TimeWindow {
        TimeWindow::new(at(from), at(to)).unwrap()
    }

    #[test]
    fn test_pinned_first_then_lowest_order() {
        let (oracle, ids) = FixedOracle::with_units(5);
        let w = window(10, 12);
        let pinned = [IpAddr::from([203, 0, 113, 2])];
        let selected = match_units(&oracle, &MatchRequest::new(&w, &[], 3).pinned(&pinned)).unwrap();
        assert_eq!(selected, vec![ids[1], ids[0], ids[2]]);
    }

    #[test]
    fn test_unallocated_before_allocated_elsewhere() {
        let (mut oracle, ids) = FixedOracle::with_units(5);
        oracle.busy.insert(ids[0], vec![window(1, 2)]);
        let w = window(10, 12);

        let four = match_units(&oracle, &MatchRequest::new(&w, &[], 4)).unwrap();
        assert_eq!(four, ids[1..].to_vec());

        let five = match_units(&oracle, &MatchRequest::new(&w, &[], 5)).unwrap();
        assert_eq!(five.last(), Some(&ids[0]));
    }

    #[test]
    fn test_margin_makes_adjacent_booking_conflict() {
        let (mut oracle, ids) = FixedOracle::with_units(1);
        oracle.busy.insert(ids[0], vec![window(8, 10)]);
        let w = window(10, 12);

        assert!(match_units(&oracle, &MatchRequest::new(&w, &[], 1)).is_ok());
        let err = match_units(
            &oracle,
            &MatchRequest::new(&w, &[], 1).margin(Duration::minutes(30)),
        )
        .unwrap_err();
        assert!(err.is_capacity_error());
    }

    #[test]
    fn test_unavailable_pinned_fails_even_with_capacity() {
        let (mut oracle, ids) = FixedOracle::with_units(5);
        oracle.busy.insert(ids[1], vec![window(9, 11)]);
        let w = window(10, 12);
        let pinned = [IpAddr::from([203, 0, 113, 2])];
        let err = match_units(&oracle, &MatchRequest::new(&w, &[], 1).pinned(&pinned)).unwrap_err();
        assert!(matches!(err, ReservationError::NotEnoughResourceAvailable));
    }

    #[test]
    fn test_more_pinned_than_amount_is_rejected() {
        let (oracle, _) = FixedOracle::with_units(3);
        let w = window(10, 12);
        let pinned = [IpAddr::from([203, 0, 113, 2]), IpAddr::from([203, 0, 113, 3])];
        let err = match_units(&oracle, &MatchRequest::new(&w, &[], 1).pinned(&pinned)).unwrap_err();
        assert!(matches!(err, ReservationError::TooManyPinned { pinned: 2, amount: 1 }));
    }

    #[test]
    fn test_excluded_units_are_skipped() {
        let (oracle, ids) = FixedOracle::with_units(2);
        let w = window(10, 12);
        let exclude = [ids[0]];
        let selected = match_units(&oracle, &MatchRequest::new(&w, &[], 1).exclude(&exclude)).unwrap();
        assert_eq!(selected, vec![ids[1]]);
        assert!(match_units(&oracle, &MatchRequest::new(&w, &[], 2).exclude(&exclude)).is_err());
    }

    #[test]
    fn test_predicates_filter_pool() {
        let (oracle, _) = FixedOracle::with_units(3);
        let w = window(10, 12);
        let other_pool = [Predicate::equals(crate::model::ATTR_POOL, "other")];
        assert!(match_units(&oracle, &MatchRequest::new(&w, &other_pool, 1)).is_err());
    }
}
