//! Validation of raw reservation and unit values.
//!
//! The lease API hands reservation values over as a JSON object. This module
//! turns them into typed requests or reports which parameter is wrong.

use std::collections::BTreeMap;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use reserva_id::PoolId;
use reserva_networking::parse_address;
use serde_json::{Map, Value};

use crate::error::{ReservationError, ReservationResult};
use crate::model::{NewUnit, ReservationChanges, ReservationRequest};
use crate::requirements::Expression;
use crate::window::TimeWindow;

pub const PARAM_NETWORK_ID: &str = "network_id";
pub const PARAM_AMOUNT: &str = "amount";
pub const PARAM_REQUIRED_ADDRESSES: &str = "required_floatingips";
pub const PARAM_RESOURCE_PROPERTIES: &str = "resource_properties";
pub const PARAM_START_DATE: &str = "start_date";
pub const PARAM_END_DATE: &str = "end_date";

pub const PARAM_UNIT_NETWORK_ID: &str = "floating_network_id";
pub const PARAM_UNIT_ADDRESS: &str = "floating_ip_address";
pub const PARAM_UNIT_PROPERTIES: &str = "properties";

fn object(values: &Value) -> ReservationResult<&Map<String, Value>> {
    values
        .as_object()
        .ok_or_else(|| ReservationError::malformed("values"))
}

fn pool_id(map: &Map<String, Value>, param: &str) -> ReservationResult<PoolId> {
    let raw = map.get(param).ok_or_else(|| ReservationError::missing(param))?;
    let s = raw.as_str().ok_or_else(|| ReservationError::malformed(param))?;
    PoolId::parse(s).map_err(|_| ReservationError::malformed(param))
}

/// Integers and strings of decimal digits, at least 1.
fn amount(map: &Map<String, Value>) -> ReservationResult<usize> {
    let raw = map
        .get(PARAM_AMOUNT)
        .ok_or_else(|| ReservationError::missing(PARAM_AMOUNT))?;
    let parsed = match raw {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<usize>().ok(),
        _ => None,
    };
    parsed
        .filter(|n| *n >= 1)
        .ok_or_else(|| ReservationError::malformed(PARAM_AMOUNT))
}

/// A list of distinct, valid addresses.
fn addresses(raw: &Value, param: &str) -> ReservationResult<Vec<IpAddr>> {
    let items = raw.as_array().ok_or_else(|| ReservationError::malformed(param))?;
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let text = item.as_str().ok_or_else(|| ReservationError::malformed(param))?;
        let addr = parse_address(text).map_err(|_| ReservationError::InvalidAddressFormat {
            address: text.to_string(),
        })?;
        if out.contains(&addr) {
            return Err(ReservationError::malformed(param));
        }
        out.push(addr);
    }
    Ok(out)
}

fn date(map: &Map<String, Value>, param: &str) -> ReservationResult<DateTime<Utc>> {
    let raw = map.get(param).ok_or_else(|| ReservationError::missing(param))?;
    let text = raw.as_str().ok_or_else(|| ReservationError::malformed(param))?;
    DateTime::parse_from_rfc3339(text)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| ReservationError::malformed(param))
}

fn window(map: &Map<String, Value>) -> ReservationResult<TimeWindow> {
    let start = date(map, PARAM_START_DATE)?;
    let end = date(map, PARAM_END_DATE)?;
    TimeWindow::new(start, end)
}

/// Validate reservation values and build the request.
///
/// Fails with `TooManyPinned` when more addresses are pinned than
/// requested, before anything touches the pool.
pub fn check_params(values: &Value) -> ReservationResult<ReservationRequest> {
    let map = object(values)?;

    let pool = pool_id(map, PARAM_NETWORK_ID)?;
    let amount = amount(map)?;
    let pinned = match map.get(PARAM_REQUIRED_ADDRESSES) {
        Some(raw) => addresses(raw, PARAM_REQUIRED_ADDRESSES)?,
        None => Vec::new(),
    };
    let requirements = match map.get(PARAM_RESOURCE_PROPERTIES) {
        Some(raw) => Expression::from_json(raw)?,
        None => Expression::Empty,
    };
    let window = window(map)?;

    if pinned.len() > amount {
        return Err(ReservationError::TooManyPinned {
            pinned: pinned.len(),
            amount,
        });
    }

    Ok(ReservationRequest::new(pool, amount, window)
        .with_pinned(pinned)
        .with_requirements(requirements))
}

/// Validated update values: the new window plus any filter changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateValues {
    pub window: TimeWindow,
    pub changes: ReservationChanges,
}

/// Validate update values. Absent filter keys keep their current value.
pub fn check_update_params(values: &Value) -> ReservationResult<UpdateValues> {
    let map = object(values)?;

    let pool_id = if map.contains_key(PARAM_NETWORK_ID) {
        Some(pool_id(map, PARAM_NETWORK_ID)?)
    } else {
        None
    };
    let pinned = map
        .get(PARAM_REQUIRED_ADDRESSES)
        .map(|raw| addresses(raw, PARAM_REQUIRED_ADDRESSES))
        .transpose()?;
    let requirements = map
        .get(PARAM_RESOURCE_PROPERTIES)
        .map(Expression::from_json)
        .transpose()?;

    Ok(UpdateValues {
        window: window(map)?,
        changes: ReservationChanges {
            pool_id,
            pinned,
            requirements,
        },
    })
}

/// Validate values for registering a unit.
pub fn check_unit_params(values: &Value) -> ReservationResult<NewUnit> {
    let map = object(values)?;

    let missing: Vec<&str> = [PARAM_UNIT_NETWORK_ID, PARAM_UNIT_ADDRESS]
        .into_iter()
        .filter(|key| !map.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        return Err(ReservationError::missing(missing.join(",")));
    }

    let pool_id = pool_id(map, PARAM_UNIT_NETWORK_ID)?;
    let text = map[PARAM_UNIT_ADDRESS]
        .as_str()
        .ok_or_else(|| ReservationError::malformed(PARAM_UNIT_ADDRESS))?;
    let address = parse_address(text).map_err(|_| ReservationError::InvalidAddressFormat {
        address: text.to_string(),
    })?;

    let mut properties = BTreeMap::new();
    if let Some(raw) = map.get(PARAM_UNIT_PROPERTIES) {
        let props = raw
            .as_object()
            .ok_or_else(|| ReservationError::malformed(PARAM_UNIT_PROPERTIES))?;
        for (key, value) in props {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return Err(ReservationError::malformed(PARAM_UNIT_PROPERTIES)),
            };
            properties.insert(key.clone(), value);
        }
    }

    Ok(NewUnit {
        pool_id,
        address,
        properties,
    })
}
