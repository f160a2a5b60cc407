#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use reserva_allocator::{AllocatorConfig, ReservationManager, TimeWindow};
use reserva_testing::{init_tracing, FakeController, InMemoryPool};

pub type Manager = ReservationManager<InMemoryPool, FakeController>;

pub const POOL: &str = "ext-net";

pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, hour, minute, 0).unwrap()
}

pub fn window(from: u32, to: u32) -> TimeWindow {
    TimeWindow::new(at(from, 0), at(to, 0)).unwrap()
}

pub fn manager_with_margin(margin: Duration) -> Manager {
    init_tracing();
    let config = AllocatorConfig::default().with_cleaning_time(margin.to_std().unwrap());
    ReservationManager::new(InMemoryPool::new(), FakeController::new(), config)
}

pub fn manager() -> Manager {
    manager_with_margin(Duration::zero())
}

/// Register `203.0.113.1` .. `203.0.113.{count}` in [`POOL`].
pub fn seed(manager: &Manager, count: u8) -> Vec<reserva_id::UnitId> {
    (1..=count)
        .map(|n| manager.store().add_unit(POOL, &format!("203.0.113.{n}")))
        .collect()
}

/// Record the lease window, then reserve, the way the lease scheduler does.
pub fn reserve(
    manager: &Manager,
    request: &reserva_allocator::ReservationRequest,
) -> (
    reserva_id::ReservationId,
    reserva_allocator::ReservationResult<Vec<reserva_allocator::Allocation>>,
) {
    let reservation = reserva_id::ReservationId::new();
    manager.store().set_window(reservation, request.window);
    (reservation, manager.reserve(reservation, request))
}

pub fn request(amount: usize, window: TimeWindow) -> reserva_allocator::ReservationRequest {
    reserva_allocator::ReservationRequest::new(
        reserva_id::PoolId::parse(POOL).unwrap(),
        amount,
        window,
    )
}
