//! Reservation manager.
//!
//! Entry points used by the lease scheduler. Every read-then-write sequence
//! runs inside one [`PoolStore::transaction`], so concurrent requests on the
//! same pool cannot pick the same unit, and a failure leaves the pool as it
//! was.

use reserva_id::{PoolId, ReservationId, UnitId};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::config::AllocatorConfig;
use crate::error::{ReservationError, ReservationResult};
use crate::matcher::{match_units, MatchRequest};
use crate::model::{Allocation, ReservationRequest, ReservationStatus, ResourceUnit};
use crate::oracle::{NetworkController, PoolStore};
use crate::params::{check_params, check_unit_params, check_update_params};
use crate::update::{update_allocations, UpdateOutcome, UpdateRequest};

/// Allocates pool units to reservations.
pub struct ReservationManager<S, C> {
    store: S,
    controller: C,
    config: AllocatorConfig,
}

impl<S: PoolStore, C: NetworkController> ReservationManager<S, C> {
    pub fn new(store: S, controller: C, config: AllocatorConfig) -> Self {
        Self {
            store,
            controller,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Validate raw values and reserve.
    pub fn reserve_values(
        &self,
        reservation_id: ReservationId,
        values: &Value,
    ) -> ReservationResult<Vec<Allocation>> {
        let request = check_params(values)?;
        self.reserve(reservation_id, &request)
    }

    /// Select units for a new reservation and record one allocation per
    /// unit.
    #[instrument(skip(self, request), fields(pool_id = %request.pool_id, amount = request.amount))]
    pub fn reserve(
        &self,
        reservation_id: ReservationId,
        request: &ReservationRequest,
    ) -> ReservationResult<Vec<Allocation>> {
        if request.amount == 0 {
            return Err(ReservationError::malformed("amount"));
        }
        if request.pinned.len() > request.amount {
            return Err(ReservationError::TooManyPinned {
                pinned: request.pinned.len(),
                amount: request.amount,
            });
        }

        let predicates = request.predicates();
        let margin = self.config.margin();

        let allocations = self.store.transaction(&[&request.pool_id], |oracle| {
            let selected = match_units(
                &*oracle,
                &MatchRequest::new(&request.window, &predicates, request.amount)
                    .margin(margin)
                    .pinned(&request.pinned),
            )?;

            let mut allocations = Vec::with_capacity(selected.len());
            for unit_id in selected {
                let id = oracle.create_allocation(unit_id, reservation_id)?;
                allocations.push(Allocation {
                    id,
                    unit_id,
                    reservation_id,
                });
            }
            Ok(allocations)
        })?;

        info!(
            reservation_id = %reservation_id,
            allocated = allocations.len(),
            "Reservation allocated"
        );
        Ok(allocations)
    }

    /// Re-check a reservation's allocations after its lease window or
    /// filters changed.
    #[instrument(skip(self, request), fields(reservation_id = %request.reservation_id, status = %request.status))]
    pub fn update(&self, request: &UpdateRequest) -> ReservationResult<UpdateOutcome> {
        if request.is_pure_shrink() {
            return Ok(UpdateOutcome::Unchanged);
        }

        // A pool change releases units in the old pool and selects in the
        // new one, so both are locked.
        let mut pools = vec![&request.current.pool_id];
        pools.extend(request.changes.pool_id.as_ref());
        pools.sort();
        pools.dedup();

        self.store.transaction(&pools, |oracle| {
            update_allocations(
                oracle,
                request,
                self.config.margin(),
                self.config.reserved_span(),
            )
        })
    }

    /// Validate raw update values against the reservation as booked, then
    /// update.
    pub fn update_values(
        &self,
        reservation_id: ReservationId,
        status: ReservationStatus,
        current: &ReservationRequest,
        values: &Value,
    ) -> ReservationResult<UpdateOutcome> {
        let values = check_update_params(values)?;
        self.update(&UpdateRequest {
            reservation_id,
            status,
            current: current.clone(),
            new_window: values.window,
            changes: values.changes,
        })
    }

    /// Provision every allocated address when the lease starts.
    #[instrument(skip(self))]
    pub fn on_start(&self, reservation_id: ReservationId) -> ReservationResult<()> {
        for unit in self.allocated_units(reservation_id)? {
            self.controller
                .create_reserved(&unit, reservation_id)
                .map_err(|e| ReservationError::Provision {
                    reservation: reservation_id,
                    message: e.to_string(),
                })?;
            info!(unit_id = %unit.id, address = %unit.address, "Provisioned reserved address");
        }
        Ok(())
    }

    /// Release every allocated address when the lease ends.
    ///
    /// Keeps going after a failed release so one bad address does not pin
    /// the others; the first failure is returned.
    #[instrument(skip(self))]
    pub fn on_end(&self, reservation_id: ReservationId) -> ReservationResult<()> {
        let mut first_error = None;
        for unit in self.allocated_units(reservation_id)? {
            if let Err(e) = self.controller.delete_reserved(&unit) {
                warn!(unit_id = %unit.id, address = %unit.address, error = %e, "Failed to release reserved address");
                first_error.get_or_insert(ReservationError::Provision {
                    reservation: reservation_id,
                    message: e.to_string(),
                });
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn allocated_units(&self, reservation_id: ReservationId) -> ReservationResult<Vec<ResourceUnit>> {
        self.store.read(|oracle| {
            oracle
                .allocations_for_reservation(reservation_id)?
                .into_iter()
                .map(|a| {
                    oracle
                        .unit(a.unit_id)?
                        .ok_or_else(|| ReservationError::ResourceNotFound(a.unit_id.to_string()))
                })
                .collect()
        })
    }

    // =========================================================================
    // Pool administration
    // =========================================================================

    /// Register an address as a reservable unit.
    ///
    /// The address must sit in one of the pool's subnets and outside that
    /// subnet's dynamic allocation ranges.
    #[instrument(skip(self, values))]
    pub fn create_unit(&self, values: &Value) -> ReservationResult<ResourceUnit> {
        let new_unit = check_unit_params(values)?;

        let subnet = self
            .controller
            .fetch_subnet(&new_unit.pool_id, new_unit.address)
            .map_err(|e| ReservationError::Store(e.to_string()))?
            .ok_or_else(|| {
                info!(
                    pool_id = %new_unit.pool_id,
                    address = %new_unit.address,
                    "Address has no subnet in pool and cannot be reserved"
                );
                ReservationError::ResourceNotFound(format!(
                    "subnet for {} in {}",
                    new_unit.address, new_unit.pool_id
                ))
            })?;
        subnet.check_reservable(new_unit.address)?;

        let unit = ResourceUnit {
            id: UnitId::new(),
            pool_id: new_unit.pool_id,
            subnet_id: subnet.id,
            address: new_unit.address,
            properties: new_unit.properties,
        };

        self.store.transaction(&[&unit.pool_id], |oracle| {
            if oracle.units()?.iter().any(|u| u.address == unit.address) {
                return Err(ReservationError::DuplicateAddress(unit.address));
            }
            oracle.insert_unit(unit.clone())
        })?;

        info!(unit_id = %unit.id, address = %unit.address, "Registered reservable unit");
        Ok(unit)
    }

    pub fn get_unit(&self, id: UnitId) -> ReservationResult<ResourceUnit> {
        self.store
            .read(|oracle| oracle.unit(id))?
            .ok_or_else(|| ReservationError::ResourceNotFound(id.to_string()))
    }

    pub fn list_units(&self) -> ReservationResult<Vec<ResourceUnit>> {
        self.store.read(|oracle| oracle.units())
    }

    /// Remove a unit that no reservation references.
    #[instrument(skip(self))]
    pub fn delete_unit(&self, id: UnitId) -> ReservationResult<()> {
        let pool: PoolId = self.get_unit(id)?.pool_id;
        self.store.transaction(&[&pool], |oracle| {
            let allocations = oracle.allocations_for_unit(id)?;
            if !allocations.is_empty() {
                return Err(ReservationError::UnitInUse {
                    unit: id,
                    allocations: allocations.len(),
                });
            }
            oracle.remove_unit(id)
        })?;
        info!(unit_id = %id, "Removed reservable unit");
        Ok(())
    }
}
