//! Validated ledger inputs and the per-device ledger state.
//!
//! Raw caller input (query strings, JSON bodies, CLI arguments) is turned into
//! [`DeviceId`], [`Amount`] and [`RequestId`] before anything touches the
//! store. A value of one of these types is proof that validation passed.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::{LedgerError, Result};

/// Maximum length of a device identifier, in bytes.
pub const MAX_DEVICE_ID_LEN: usize = 128;

/// Maximum length of a client-supplied request id, in bytes.
pub const MAX_REQUEST_ID_LEN: usize = 128;

/// Largest integer a double represents exactly (2^53).
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

// ═══════════════════════════════════════════════════════════════════════════
// Device identifier
// ═══════════════════════════════════════════════════════════════════════════

/// Opaque, caller-supplied identifier of a physical device.
///
/// Used as the partition key of the ledger. Never defaulted: a missing or
/// blank identifier is always rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Validate a device identifier.
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(LedgerError::invalid("deviceId", "deviceId is required"));
        }
        if raw.len() > MAX_DEVICE_ID_LEN {
            return Err(LedgerError::invalid(
                "deviceId",
                format!("must be at most {MAX_DEVICE_ID_LEN} bytes"),
            ));
        }
        if raw.chars().any(char::is_control) {
            return Err(LedgerError::invalid(
                "deviceId",
                "must not contain control characters",
            ));
        }
        Ok(Self(raw.to_string()))
    }

    /// Validate an optional device identifier, treating `None` as missing.
    pub fn parse_opt(raw: Option<&str>) -> Result<Self> {
        match raw {
            Some(raw) => Self::parse(raw),
            None => Err(LedgerError::invalid("deviceId", "deviceId is required")),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Amount
// ═══════════════════════════════════════════════════════════════════════════

/// A strictly positive, finite monetary amount.
///
/// Fractions are allowed; the ledger adds amounts as plain numbers.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Amount(f64);

impl Amount {
    /// Validate an amount, rejecting NaN, infinities, zero and negatives.
    pub fn new(value: f64) -> Result<Self> {
        if !value.is_finite() {
            return Err(LedgerError::invalid("amount", "must be a finite number"));
        }
        if value <= 0.0 {
            return Err(LedgerError::invalid("amount", "must be greater than zero"));
        }
        Ok(Self(value))
    }

    /// Validate an amount taken from a JSON document.
    ///
    /// Missing values, `null`, strings, booleans and other non-numbers are
    /// rejected; numbers go through the same rules as [`Amount::new`].
    pub fn from_json(value: Option<&Value>) -> Result<Self> {
        match value {
            None | Some(Value::Null) => {
                Err(LedgerError::invalid("amount", "amount is required"))
            }
            Some(Value::Number(n)) => match n.as_f64() {
                Some(v) => Self::new(v),
                None => Err(LedgerError::invalid("amount", "must be a number")),
            },
            Some(_) => Err(LedgerError::invalid("amount", "must be a number")),
        }
    }

    pub fn get(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serialize_number(&self.0, serializer)
    }
}

/// Serialize a number as a JSON integer when it is whole and exactly
/// representable, otherwise as a float.
///
/// Keeps `150` on the wire instead of `150.0` for whole totals.
pub fn serialize_number<S: Serializer>(
    value: &f64,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    if value.fract() == 0.0 && value.abs() <= MAX_EXACT_INTEGER {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Request id
// ═══════════════════════════════════════════════════════════════════════════

/// Client-chosen token that makes a retried mutation safe to resend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Err(LedgerError::invalid("requestId", "must not be empty"));
        }
        if raw.len() > MAX_REQUEST_ID_LEN {
            return Err(LedgerError::invalid(
                "requestId",
                format!("must be at most {MAX_REQUEST_ID_LEN} bytes"),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    /// Validate an optional request id; `None` means "not idempotent".
    pub fn parse_opt(raw: Option<&str>) -> Result<Option<Self>> {
        raw.map(Self::parse).transpose()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Ledger state
// ═══════════════════════════════════════════════════════════════════════════

/// The `(total, version)` pair kept for one device.
///
/// An unseen device has the default state `{ total: 0, version: 0 }`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerState {
    /// Running total; never negative, never non-finite.
    #[serde(serialize_with = "serialize_number")]
    pub total: f64,
    /// Number of successful mutations applied to this device.
    pub version: u64,
}

/// A mutation the store can apply to a device record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mutation {
    Increment(Amount),
    Reset,
}

impl Mutation {
    /// Label used in logs and metrics.
    pub fn op(&self) -> &'static str {
        match self {
            Self::Increment(_) => "increment",
            Self::Reset => "reset",
        }
    }
}
