//! Domain records shared by the matcher, the update protocol and the store.

use std::collections::BTreeMap;
use std::net::IpAddr;

use reserva_id::{AllocationId, PoolId, ReservationId, UnitId};
use serde::{Deserialize, Serialize};

use crate::requirements::{Expression, Predicate};
use crate::window::TimeWindow;

/// Attribute naming the pool a unit belongs to.
pub const ATTR_POOL: &str = "floating_network_id";
/// Attribute holding the unit's address.
pub const ATTR_ADDRESS: &str = "floating_ip_address";
/// Attribute holding the unit's subnet.
pub const ATTR_SUBNET: &str = "subnet_id";
/// Attribute holding the unit's id.
pub const ATTR_ID: &str = "id";

/// A reservable address in a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUnit {
    pub id: UnitId,
    pub pool_id: PoolId,
    pub subnet_id: String,
    pub address: IpAddr,

    /// Free-form operator-assigned properties, matched by requirement
    /// predicates.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl ResourceUnit {
    /// Look up an attribute by predicate field name.
    pub fn attribute(&self, field: &str) -> Option<String> {
        match field {
            ATTR_POOL => Some(self.pool_id.to_string()),
            ATTR_ADDRESS => Some(self.address.to_string()),
            ATTR_SUBNET => Some(self.subnet_id.clone()),
            ATTR_ID => Some(self.id.to_string()),
            other => self.properties.get(other).cloned(),
        }
    }

    /// True if every predicate holds for this unit.
    pub fn satisfies(&self, predicates: &[Predicate]) -> bool {
        predicates.iter().all(|p| {
            self.attribute(&p.field)
                .is_some_and(|actual| p.matches(&actual))
        })
    }
}

/// Binding of one unit to one reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: AllocationId,
    pub unit_id: UnitId,
    pub reservation_id: ReservationId,
}

/// Lifecycle of a reservation, owned by the lease scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Active,
    Deleted,
    Error,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Deleted => "deleted",
            Self::Error => "error",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a reservation asks of a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    pub pool_id: PoolId,
    pub amount: usize,
    /// Addresses that must be part of the selection.
    pub pinned: Vec<IpAddr>,
    /// Extra filter on unit properties.
    pub requirements: Expression,
    pub window: TimeWindow,
}

impl ReservationRequest {
    pub fn new(pool_id: PoolId, amount: usize, window: TimeWindow) -> Self {
        Self {
            pool_id,
            amount,
            pinned: Vec::new(),
            requirements: Expression::Empty,
            window,
        }
    }

    pub fn with_pinned(mut self, pinned: Vec<IpAddr>) -> Self {
        self.pinned = pinned;
        self
    }

    pub fn with_requirements(mut self, requirements: Expression) -> Self {
        self.requirements = requirements;
        self
    }

    /// The pool filter followed by the caller's requirements.
    pub fn predicates(&self) -> Vec<Predicate> {
        let mut predicates = vec![Predicate::equals(ATTR_POOL, self.pool_id.as_str())];
        predicates.extend(self.requirements.predicates());
        predicates
    }
}

/// Attributes an update may change. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationChanges {
    pub pool_id: Option<PoolId>,
    pub pinned: Option<Vec<IpAddr>>,
    pub requirements: Option<Expression>,
}

impl ReservationChanges {
    /// True if no filtering attribute is touched.
    pub fn is_empty(&self) -> bool {
        self.pool_id.is_none() && self.pinned.is_none() && self.requirements.is_none()
    }

    /// Apply the changes on top of `current`, moving it to `window`.
    pub fn apply(&self, current: &ReservationRequest, window: TimeWindow) -> ReservationRequest {
        ReservationRequest {
            pool_id: self.pool_id.clone().unwrap_or_else(|| current.pool_id.clone()),
            amount: current.amount,
            pinned: self.pinned.clone().unwrap_or_else(|| current.pinned.clone()),
            requirements: self
                .requirements
                .clone()
                .unwrap_or_else(|| current.requirements.clone()),
            window,
        }
    }
}

/// Validated input for registering a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUnit {
    pub pool_id: PoolId,
    pub address: IpAddr,
    pub properties: BTreeMap<String, String>,
}
