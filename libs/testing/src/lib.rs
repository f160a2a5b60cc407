//! Test doubles for the reservation core.
//!
//! - [`InMemoryPool`]: a transactional [`PoolStore`](reserva_allocator::PoolStore)
//! - [`FakeController`]: a recording network controller
//! - [`init_tracing`]: log capture for test output

mod controller;
mod store;

pub use controller::{ControllerCall, FakeController};
pub use store::{InMemoryPool, PoolState};

use tracing_subscriber::EnvFilter;

/// Install a test-writer subscriber honouring `RUST_LOG`. Safe to call from
/// every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
