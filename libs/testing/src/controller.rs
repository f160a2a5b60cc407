//! Recording network controller.

use std::net::IpAddr;
use std::sync::Mutex;

use anyhow::bail;
use reserva_allocator::{NetworkController, ResourceUnit};
use reserva_id::{PoolId, ReservationId};
use reserva_networking::{subnet_for, Subnet};

/// Controller call observed by [`FakeController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerCall {
    Created {
        address: IpAddr,
        reservation: ReservationId,
    },
    Deleted {
        address: IpAddr,
    },
}

/// A [`NetworkController`] that records calls instead of making them.
#[derive(Debug, Default)]
pub struct FakeController {
    subnets: Vec<(PoolId, Subnet)>,
    failing: Vec<IpAddr>,
    calls: Mutex<Vec<ControllerCall>>,
}

impl FakeController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a subnet to a pool.
    pub fn with_subnet(mut self, pool: &str, subnet: Subnet) -> Self {
        self.subnets
            .push((PoolId::parse(pool).expect("test pool id"), subnet));
        self
    }

    /// Make every call for `address` fail.
    pub fn failing_on(mut self, address: IpAddr) -> Self {
        self.failing.push(address);
        self
    }

    pub fn calls(&self) -> Vec<ControllerCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, call: ControllerCall) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(call);
    }
}

impl NetworkController for FakeController {
    fn fetch_subnet(&self, pool: &PoolId, address: IpAddr) -> anyhow::Result<Option<Subnet>> {
        let subnets: Vec<Subnet> = self
            .subnets
            .iter()
            .filter(|(p, _)| p == pool)
            .map(|(_, s)| s.clone())
            .collect();
        Ok(subnet_for(&subnets, address).cloned())
    }

    fn create_reserved(
        &self,
        unit: &ResourceUnit,
        reservation: ReservationId,
    ) -> anyhow::Result<()> {
        if self.failing.contains(&unit.address) {
            bail!("controller rejected {}", unit.address);
        }
        self.record(ControllerCall::Created {
            address: unit.address,
            reservation,
        });
        Ok(())
    }

    fn delete_reserved(&self, unit: &ResourceUnit) -> anyhow::Result<()> {
        if self.failing.contains(&unit.address) {
            bail!("controller rejected {}", unit.address);
        }
        self.record(ControllerCall::Deleted {
            address: unit.address,
        });
        Ok(())
    }
}
