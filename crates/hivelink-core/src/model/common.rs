// ── Core identity types ──
//
// PermAddr and AuxId form the foundation of every domain type. A device
// is keyed by its permanent address; a gadget by the (PermAddr, AuxId)
// pair. Consumers never care what the underlying protocol encodes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ── PermAddr ────────────────────────────────────────────────────────

/// Permanent, protocol-level address of a device.
///
/// The stable primary key within a NetCore. Set exactly once when the
/// driver first reports the device and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermAddr(String);

impl PermAddr {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PermAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PermAddr {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for PermAddr {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PermAddr {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ── AuxId ───────────────────────────────────────────────────────────

/// Auxiliary identifier distinguishing multiple gadgets on one device.
///
/// Protocols disagree on the shape (an endpoint number, a cluster name),
/// so both numeric and string forms are first-class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuxId {
    Num(u64),
    Str(String),
}

impl fmt::Display for AuxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<u64> for AuxId {
    fn from(n: u64) -> Self {
        Self::Num(n)
    }
}

impl From<&str> for AuxId {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<String> for AuxId {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

// ── ProtocolInfo ────────────────────────────────────────────────────

/// Names of the physical and network layers a NetCore speaks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolInfo {
    /// Physical layer name (e.g. `"ieee802.15.4"`).
    pub phy: String,
    /// Network layer name (e.g. `"zigbee"`).
    pub nwk: String,
}

impl ProtocolInfo {
    pub fn new(phy: impl Into<String>, nwk: impl Into<String>) -> Self {
        Self {
            phy: phy.into(),
            nwk: nwk.into(),
        }
    }
}

// ── DevStatus ───────────────────────────────────────────────────────

/// Device reachability as last observed by the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DevStatus {
    #[default]
    Unknown,
    Online,
    Offline,
    Sleep,
}

impl DevStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online)
    }
}

// ── Traffic bookkeeping ─────────────────────────────────────────────

/// Transfer direction, seen from the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

/// Hit/byte counters for one direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrafficRecord {
    pub hits: u64,
    pub bytes: u64,
}

impl TrafficRecord {
    /// Count one transfer of `bytes` bytes.
    pub fn accumulate(&mut self, bytes: u64) {
        self.hits += 1;
        self.bytes += bytes;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Both directions together, as carried by NetCore and Device alike.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traffic {
    pub inbound: TrafficRecord,
    pub outbound: TrafficRecord,
}

impl Traffic {
    pub fn record(&mut self, direction: Direction) -> &mut TrafficRecord {
        match direction {
            Direction::In => &mut self.inbound,
            Direction::Out => &mut self.outbound,
        }
    }

    pub fn get(&self, direction: Direction) -> TrafficRecord {
        match direction {
            Direction::In => self.inbound,
            Direction::Out => self.outbound,
        }
    }
}
