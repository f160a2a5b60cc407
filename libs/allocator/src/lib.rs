//! # reserva-allocator
//!
//! Time-bounded reservation of pooled floating addresses.
//!
//! The crate decides, one request at a time, which units of a pool can
//! satisfy a reservation:
//!
//! - [`requirements`] compiles the `["and", ["==", "$field", "value"], ...]`
//!   filter grammar into predicates.
//! - [`matcher`] selects units for a window padded by the cleaning margin.
//! - [`update`] decides whether a reservation's units survive a change of
//!   window or filters, and swaps them when they do not.
//! - [`manager`] validates caller input and runs each of the above inside a
//!   per-pool transaction.
//!
//! Storage, period computation over allocation history and the network
//! controller are reached through the traits in [`oracle`].
//!
//! ## Invariants
//!
//! - A unit is never selected for a window that overlaps any of its
//!   bookings once the window is padded by the margin.
//! - A successful match returns exactly the requested number of units and
//!   contains every pinned address.
//! - Units of an active reservation are never swapped.
//! - A failed reserve or update writes nothing.

pub mod config;
pub mod error;
pub mod manager;
pub mod matcher;
pub mod model;
pub mod oracle;
pub mod params;
pub mod requirements;
pub mod update;
pub mod window;

pub use config::AllocatorConfig;
pub use error::{ReservationError, ReservationResult};
pub use manager::ReservationManager;
pub use matcher::{match_units, MatchRequest};
pub use model::{
    Allocation, NewUnit, ReservationChanges, ReservationRequest, ReservationStatus, ResourceUnit,
};
pub use oracle::{NetworkController, PoolOracle, PoolStore};
pub use requirements::{compile_requirements, compile_requirements_str, Expression, Operator, Predicate};
pub use update::{plan_update, update_allocations, UpdateOutcome, UpdatePlan, UpdateRequest};
pub use window::TimeWindow;
