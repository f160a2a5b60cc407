//! Typed ID definitions for the reservation domain.

use serde::{Deserialize, Serialize};

use crate::{define_id, IdError};

// =============================================================================
// Pool inventory
// =============================================================================

define_id!(
    /// A single reservable unit (one floating address) in a pool.
    UnitId,
    "unit"
);

// =============================================================================
// Leases
// =============================================================================

define_id!(
    /// A lease owning one or more reservations.
    LeaseId,
    "lease"
);
define_id!(
    /// A reservation inside a lease.
    ReservationId,
    "rsv"
);
define_id!(
    /// The binding of one unit to one reservation.
    AllocationId,
    "alloc"
);

// =============================================================================
// Pools
// =============================================================================

/// Identifier of a pool (the external network a unit is routed on).
///
/// Pools are created by the network controller, not by this system, so the
/// id is whatever string the controller uses. It is restricted to a charset
/// that is safe to embed in a requirement predicate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PoolId(String);

impl PoolId {
    /// Parses a pool id.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        let valid = s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'));
        if !valid {
            return Err(IdError::InvalidPool(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Returns the pool id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PoolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for PoolId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PoolId {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<PoolId> for String {
    fn from(id: PoolId) -> Self {
        id.0
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_unit_id_roundtrip() {
        let id = UnitId::new();
        let parsed: UnitId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!(id.to_string().starts_with("unit_"));
    }

    #[test]
    fn test_reservation_id_rejects_unit_prefix() {
        let unit = UnitId::new().to_string();
        let err = ReservationId::parse(&unit).unwrap_err();
        assert!(err.is_prefix_error());
    }

    #[test]
    fn test_missing_separator() {
        let result: Result<AllocationId, _> = "alloc01HV4Z2WQXKJNM8GPQY6VBKC3D".parse();
        assert!(matches!(result.unwrap_err(), IdError::MissingSeparator));
    }

    #[test]
    fn test_empty() {
        assert!(LeaseId::parse("").unwrap_err().is_empty());
        assert!(PoolId::parse("").unwrap_err().is_empty());
    }

    #[test]
    fn test_invalid_ulid() {
        let result: Result<UnitId, _> = "unit_invalid".parse();
        assert!(matches!(result.unwrap_err(), IdError::InvalidUlid(_)));
    }

    #[test]
    fn test_json_uses_string_form() {
        let id = AllocationId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let parsed: AllocationId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_pool_id_rejects_predicate_metacharacters() {
        assert!(PoolId::parse("ext-net-1").is_ok());
        assert!(PoolId::parse("0b3c1c7e-5d1f-4a0e-9b55-2c3a").is_ok());
        assert!(matches!(
            PoolId::parse("net A"),
            Err(IdError::InvalidPool(_))
        ));
        assert!(serde_json::from_str::<PoolId>("\"a b\"").is_err());
    }

    #[test]
    fn test_all_id_prefixes_unique() {
        let prefixes = [
            UnitId::PREFIX,
            LeaseId::PREFIX,
            ReservationId::PREFIX,
            AllocationId::PREFIX,
        ];
        let unique: std::collections::HashSet<_> = prefixes.iter().collect();
        assert_eq!(prefixes.len(), unique.len(), "Duplicate ID prefixes found!");
    }

    proptest! {
        #[test]
        fn prop_unit_id_parses_its_own_display(raw in any::<u128>()) {
            let id = UnitId::from_ulid(crate::Ulid(raw));
            prop_assert_eq!(UnitId::parse(&id.to_string()).unwrap(), id);
        }
    }
}
