//! Networking helpers for floating address pools.
//!
//! This library provides:
//! - Address parsing and validation for IPv4 and IPv6
//! - CIDR prefixes for both address families
//! - Address ranges (the dynamic allocation ranges of a subnet)
//! - Subnet checks deciding whether an address may be handed to the
//!   reservation system

use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Networking errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Invalid IP address.
    #[error("invalid IP address: {0}")]
    InvalidAddress(String),

    /// Invalid CIDR prefix.
    #[error("invalid CIDR prefix: {0}")]
    InvalidPrefix(String),

    /// Invalid address range.
    #[error("invalid address range: {0}")]
    InvalidRange(String),

    /// The address does not belong to the subnet.
    #[error("{address} is not in subnet {cidr}")]
    OutsideSubnet { address: IpAddr, cidr: String },

    /// The address is handed out dynamically by the subnet and cannot be
    /// reserved.
    #[error("{address} is inside allocation range {range} of subnet {cidr}")]
    InsideAllocationRange {
        address: IpAddr,
        range: String,
        cidr: String,
    },
}

// ============================================================================
// Addresses
// ============================================================================

/// Parse a textual IPv4 or IPv6 address.
pub fn parse_address(s: &str) -> Result<IpAddr, NetworkError> {
    IpAddr::from_str(s.trim()).map_err(|_| NetworkError::InvalidAddress(s.to_string()))
}

/// Returns true if `s` is a valid IPv4 or IPv6 address.
pub fn is_valid_address(s: &str) -> bool {
    parse_address(s).is_ok()
}

fn address_bits(addr: IpAddr) -> u128 {
    match addr {
        IpAddr::V4(v4) => u128::from(u32::from(v4)),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

fn family_width(addr: IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

fn from_bits(bits: u128, like: IpAddr) -> IpAddr {
    match like {
        // Truncation is fine: v4 masks never set bits above 32.
        IpAddr::V4(_) => IpAddr::from((bits as u32).to_be_bytes()),
        IpAddr::V6(_) => IpAddr::from(bits.to_be_bytes()),
    }
}

/// Mask an address to a prefix length within its family.
fn mask(addr: IpAddr, prefix_len: u8) -> IpAddr {
    let width = family_width(addr);
    let bits = address_bits(addr);
    let host_bits = u32::from(width.saturating_sub(prefix_len));
    let masked = if host_bits >= 128 {
        0
    } else {
        bits & (u128::MAX << host_bits)
    };
    from_bits(masked, addr)
}

// ============================================================================
// CIDR prefixes
// ============================================================================

/// CIDR prefix of either address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IpPrefix {
    /// Network address (host bits cleared).
    pub address: IpAddr,

    /// Prefix length (e.g., 24 for /24).
    pub prefix_len: u8,
}

impl IpPrefix {
    /// Create a new prefix, masking host bits away.
    pub fn new(address: IpAddr, prefix_len: u8) -> Result<Self, NetworkError> {
        let width = family_width(address);
        if prefix_len > width {
            return Err(NetworkError::InvalidPrefix(format!(
                "prefix length {} exceeds {}",
                prefix_len, width
            )));
        }

        Ok(Self {
            address: mask(address, prefix_len),
            prefix_len,
        })
    }

    /// Parse from CIDR notation (e.g., "203.0.113.0/24" or "2001:db8::/32").
    pub fn from_cidr(s: &str) -> Result<Self, NetworkError> {
        let Some((addr_str, prefix_str)) = s.split_once('/') else {
            return Err(NetworkError::InvalidPrefix(format!(
                "missing '/' in CIDR: {}",
                s
            )));
        };

        let address = parse_address(addr_str)?;
        let prefix_len = prefix_str
            .parse::<u8>()
            .map_err(|_| NetworkError::InvalidPrefix(prefix_str.to_string()))?;

        Self::new(address, prefix_len)
    }

    /// Check if an address is within this prefix.
    ///
    /// Addresses of the other family are never contained.
    pub fn contains(&self, addr: IpAddr) -> bool {
        addr.is_ipv4() == self.address.is_ipv4() && mask(addr, self.prefix_len) == self.address
    }
}

impl std::fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for IpPrefix {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_cidr(s)
    }
}

// ============================================================================
// Address ranges
// ============================================================================

/// Inclusive range of addresses of one family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressRange {
    pub start: IpAddr,
    pub end: IpAddr,
}

impl AddressRange {
    /// Create a range; both ends must share a family and `start <= end`.
    pub fn new(start: IpAddr, end: IpAddr) -> Result<Self, NetworkError> {
        if start.is_ipv4() != end.is_ipv4() {
            return Err(NetworkError::InvalidRange(format!(
                "{start}-{end} mixes address families"
            )));
        }
        if address_bits(start) > address_bits(end) {
            return Err(NetworkError::InvalidRange(format!(
                "{start}-{end} starts after it ends"
            )));
        }
        Ok(Self { start, end })
    }

    /// Check if an address is within the range.
    pub fn contains(&self, addr: IpAddr) -> bool {
        if addr.is_ipv4() != self.start.is_ipv4() {
            return false;
        }
        let bits = address_bits(addr);
        address_bits(self.start) <= bits && bits <= address_bits(self.end)
    }
}

impl std::fmt::Display for AddressRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

// ============================================================================
// Subnets
// ============================================================================

/// A subnet of an external network as reported by the network controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    /// Controller-assigned subnet id.
    pub id: String,

    /// Subnet CIDR.
    pub cidr: IpPrefix,

    /// Ranges the controller hands out on its own.
    #[serde(default)]
    pub allocation_pools: Vec<AddressRange>,
}

impl Subnet {
    /// Create a subnet without dynamic allocation ranges.
    pub fn new(id: impl Into<String>, cidr: IpPrefix) -> Self {
        Self {
            id: id.into(),
            cidr,
            allocation_pools: Vec::new(),
        }
    }

    /// Add a dynamic allocation range.
    pub fn with_allocation_pool(mut self, range: AddressRange) -> Self {
        self.allocation_pools.push(range);
        self
    }

    /// Check that `addr` can be reserved: inside the CIDR and outside
    /// every dynamic allocation range.
    pub fn check_reservable(&self, addr: IpAddr) -> Result<(), NetworkError> {
        if !self.cidr.contains(addr) {
            return Err(NetworkError::OutsideSubnet {
                address: addr,
                cidr: self.cidr.to_string(),
            });
        }
        if let Some(range) = self.allocation_pools.iter().find(|r| r.contains(addr)) {
            return Err(NetworkError::InsideAllocationRange {
                address: addr,
                range: range.to_string(),
                cidr: self.cidr.to_string(),
            });
        }
        Ok(())
    }
}

/// Find the subnet an address belongs to.
pub fn subnet_for(subnets: &[Subnet], addr: IpAddr) -> Option<&Subnet> {
    subnets.iter().find(|s| s.cidr.contains(addr))
}
