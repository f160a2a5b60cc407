//! # reserva-id
//!
//! Typed identifiers for everything the reservation core touches.
//!
//! Every id renders as `{prefix}_{ulid}`:
//!
//! - `unit_01HV4Z2WQXKJNM8GPQY6VBKC3D` for a pooled resource unit
//! - `rsv_01HV4Z3MXNKPQR9HSTZ7WCLD4E` for a reservation
//! - `alloc_01HV4Z4NYPLTRS0JTUA8XDME5F` for an allocation
//!
//! Parsing is strict: the prefix must match the target type, so a
//! reservation id can never be passed where a unit id is expected.
//! Pool ids are the exception: a pool is named by the external network
//! controller and is carried as an opaque string (see [`PoolId`]).

mod error;
#[doc(hidden)]
pub mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
