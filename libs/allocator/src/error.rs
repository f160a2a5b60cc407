//! Reservation error types.

use std::net::IpAddr;

use reserva_id::{AllocationId, IdError, ReservationId, UnitId};
use reserva_networking::NetworkError;
use thiserror::Error;

/// Result type for reservation operations.
pub type ReservationResult<T> = Result<T, ReservationError>;

/// Errors returned to callers of the reservation core.
///
/// None of these are retried internally. `NotEnoughResourceAvailable` is an
/// ordinary outcome under load and must be handled as "reject or try later".
#[derive(Debug, Error)]
pub enum ReservationError {
    /// The requirement expression is outside the supported grammar.
    #[error("malformed requirements: {0}")]
    MalformedRequirements(String),

    /// A required request field is absent.
    #[error("missing parameter: {param}")]
    MissingParameter { param: String },

    /// A request field has the wrong type or an invalid value.
    #[error("malformed parameter: {param}")]
    MalformedParameter { param: String },

    /// A pinned address is not a valid IPv4 or IPv6 address.
    #[error("invalid address format: {address}")]
    InvalidAddressFormat { address: String },

    /// More pinned addresses than units requested.
    #[error("{pinned} pinned addresses exceed the requested amount of {amount}")]
    TooManyPinned { pinned: usize, amount: usize },

    /// The pool cannot satisfy the request under current allocations.
    #[error("not enough resources available")]
    NotEnoughResourceAvailable,

    /// A unit lookup failed.
    #[error("resource unit not found: {0}")]
    ResourceNotFound(String),

    /// A unit still has allocations and cannot be removed.
    #[error("resource unit {unit} is still allocated to {allocations} reservation(s)")]
    UnitInUse { unit: UnitId, allocations: usize },

    /// An address is already registered in the pool.
    #[error("address {0} is already registered")]
    DuplicateAddress(IpAddr),

    /// A window with `start >= end`.
    #[error("invalid time window: {0}")]
    InvalidWindow(String),

    /// An address does not fit the subnet it was registered under.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// An identifier failed to parse.
    #[error(transparent)]
    Id(#[from] IdError),

    /// The backing store reported a failure.
    #[error("store error: {0}")]
    Store(String),

    /// An allocation id was not known to the store.
    #[error("allocation not found: {0}")]
    AllocationNotFound(AllocationId),

    /// The network controller failed to provision or release an address.
    #[error("provisioning failed for reservation {reservation}: {message}")]
    Provision {
        reservation: ReservationId,
        message: String,
    },
}

impl ReservationError {
    /// Creates a missing parameter error.
    pub fn missing(param: impl Into<String>) -> Self {
        Self::MissingParameter {
            param: param.into(),
        }
    }

    /// Creates a malformed parameter error.
    pub fn malformed(param: impl Into<String>) -> Self {
        Self::MalformedParameter {
            param: param.into(),
        }
    }

    /// Returns true for the "no capacity right now" outcome.
    pub fn is_capacity_error(&self) -> bool {
        matches!(self, Self::NotEnoughResourceAvailable)
    }

    /// Returns true if the request itself was at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedRequirements(_)
                | Self::MissingParameter { .. }
                | Self::MalformedParameter { .. }
                | Self::InvalidAddressFormat { .. }
                | Self::TooManyPinned { .. }
                | Self::InvalidWindow(_)
                | Self::DuplicateAddress(_)
                | Self::Network(_)
                | Self::Id(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(ReservationError::NotEnoughResourceAvailable.is_capacity_error());
        assert!(!ReservationError::NotEnoughResourceAvailable.is_client_error());
        assert!(ReservationError::missing("amount").is_client_error());
        assert!(ReservationError::TooManyPinned { pinned: 3, amount: 2 }.is_client_error());
        assert!(!ReservationError::Store("boom".into()).is_client_error());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ReservationError::malformed("amount").to_string(),
            "malformed parameter: amount"
        );
        assert_eq!(
            ReservationError::TooManyPinned { pinned: 3, amount: 2 }.to_string(),
            "3 pinned addresses exceed the requested amount of 2"
        );
    }
}
