// ── Device ──
//
// A discovered physical endpoint. Created by the external registry in
// reaction to a `devIncoming` announcement; all remote operations are
// delegated by permanent address through the owning NetCore. Local
// mutations run through the watched-path differ so the registry only
// hears about changes that actually happened.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::diff::diff_at_paths;
use crate::error::CoreError;
use crate::event::{CoreEvent, Delta};
use crate::model::common::{AuxId, DevStatus, Direction, PermAddr, Traffic, TrafficRecord};
use crate::netcore::NetCore;

/// Leaves the registry is told about when net info mutates.
const NET_PATHS: &[&str] = &[
    "address.dynamic",
    "role",
    "parent",
    "maySleep",
    "sleepPeriodSecs",
    "status",
];

/// Leaves the registry is told about when props mutate.
const PROPS_PATHS: &[&str] = &["name", "description", "location"];

/// Leaves the registry is told about when attrs mutate. Vendor extras
/// are merged but never announced.
const ATTRS_PATHS: &[&str] = &[
    "manufacturer",
    "model",
    "serial",
    "version.hw",
    "version.sw",
    "version.fw",
    "power.kind",
    "power.voltage",
];

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

// ── Records ─────────────────────────────────────────────────────────

/// Permanent/dynamic address pair. The permanent half is set once at
/// construction and never mutated by any setter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddrPair {
    pub permanent: String,
    pub dynamic: Option<String>,
}

/// Network-level metadata of a device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevNetInfo {
    pub address: AddrPair,
    pub role: Option<String>,
    pub parent: Option<String>,
    pub may_sleep: bool,
    pub sleep_period_secs: Option<u32>,
    pub status: DevStatus,
}

/// Application-facing metadata, owned by whoever names the device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevProps {
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersionInfo {
    pub hw: Option<String>,
    pub sw: Option<String>,
    pub fw: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PowerInfo {
    pub kind: Option<String>,
    pub voltage: Option<String>,
}

/// Vendor attribute record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevAttrs {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub version: VersionInfo,
    pub power: PowerInfo,
    /// Free-form vendor fields; merged, never announced.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Link record binding a gadget to its device. The gadget id stays
/// `None` until the registry assigns one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GadLink {
    pub gad_id: Option<u64>,
    pub aux_id: AuxId,
}

// ── Patches ─────────────────────────────────────────────────────────
//
// Merge-style partial updates: a `Some` field is written, `None` leaves
// the current value alone.

#[derive(Debug, Clone, Default)]
pub struct DevNetPatch {
    pub dyn_addr: Option<String>,
    pub role: Option<String>,
    pub parent: Option<String>,
    pub may_sleep: Option<bool>,
    pub sleep_period_secs: Option<u32>,
    pub status: Option<DevStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct DevPropsPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DevAttrsPatch {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial: Option<String>,
    pub version_hw: Option<String>,
    pub version_sw: Option<String>,
    pub version_fw: Option<String>,
    pub power_kind: Option<String>,
    pub power_voltage: Option<String>,
    /// Merged key-wise into the free-form record.
    pub extra: Map<String, Value>,
}

// ── Snapshot ────────────────────────────────────────────────────────

/// Independent deep copy of a device's public state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    pub netcore: String,
    pub id: Option<u64>,
    pub enabled: bool,
    pub net: DevNetInfo,
    pub props: DevProps,
    pub attrs: DevAttrs,
    pub gads: Vec<GadLink>,
    pub traffic: Traffic,
    pub joined_at: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
}

// ── Device ──────────────────────────────────────────────────────────

/// A discovered physical endpoint with a permanent address.
#[derive(Debug)]
pub struct Device {
    netcore: NetCore,
    perm_addr: PermAddr,
    id: Mutex<Option<u64>>,
    raw: Mutex<Option<Value>>,
    enabled: AtomicBool,
    net: Mutex<DevNetInfo>,
    props: Mutex<DevProps>,
    attrs: Mutex<DevAttrs>,
    gads: Mutex<Vec<GadLink>>,
    traffic: Mutex<Traffic>,
    joined_at: DateTime<Utc>,
    last_seen: Mutex<Option<DateTime<Utc>>>,
}

impl Device {
    /// Create a device bound to `netcore` under `perm_addr`. Starts
    /// disabled; the registry enables it once accepted.
    pub fn new(netcore: NetCore, perm_addr: PermAddr) -> Result<Self, CoreError> {
        if perm_addr.is_empty() {
            return Err(CoreError::invalid("permanent address must not be empty"));
        }

        let net = DevNetInfo {
            address: AddrPair {
                permanent: perm_addr.as_str().to_owned(),
                dynamic: None,
            },
            ..DevNetInfo::default()
        };

        Ok(Self {
            netcore,
            perm_addr,
            id: Mutex::new(None),
            raw: Mutex::new(None),
            enabled: AtomicBool::new(false),
            net: Mutex::new(net),
            props: Mutex::new(DevProps::default()),
            attrs: Mutex::new(DevAttrs::default()),
            gads: Mutex::new(Vec::new()),
            traffic: Mutex::new(Traffic::default()),
            joined_at: Utc::now(),
            last_seen: Mutex::new(None),
        })
    }

    // ── Identity ─────────────────────────────────────────────────────

    pub fn netcore(&self) -> &NetCore {
        &self.netcore
    }

    pub fn perm_addr(&self) -> &PermAddr {
        &self.perm_addr
    }

    /// Current dynamic address, if the driver reported one.
    pub fn dyn_addr(&self) -> Option<String> {
        lock(&self.net).address.dynamic.clone()
    }

    pub fn id(&self) -> Option<u64> {
        *lock(&self.id)
    }

    /// Registry hook: record the assigned id.
    pub fn set_id(&self, id: u64) {
        *lock(&self.id) = Some(id);
    }

    pub fn is_registered(&self) -> bool {
        lock(&self.id).is_some()
    }

    /// Opaque driver-native representation.
    pub fn raw(&self) -> Option<Value> {
        lock(&self.raw).clone()
    }

    pub fn set_raw(&self, raw: Value) {
        *lock(&self.raw) = Some(raw);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> DevStatus {
        lock(&self.net).status
    }

    pub fn joined_at(&self) -> DateTime<Utc> {
        self.joined_at
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        *lock(&self.last_seen)
    }

    // ── Enablement ───────────────────────────────────────────────────

    /// Idempotent; announces `{"enabled": true}` on actual change only.
    pub fn enable(&self) {
        if !self.enabled.swap(true, Ordering::SeqCst) {
            self.emit_net_changed(Self::enabled_delta(true));
        }
    }

    /// Idempotent; announces `{"enabled": false}` on actual change only.
    pub fn disable(&self) {
        if self.enabled.swap(false, Ordering::SeqCst) {
            self.emit_net_changed(Self::enabled_delta(false));
        }
    }

    // ── Partial updates ──────────────────────────────────────────────

    /// Merge network metadata and announce the changed leaves, if any.
    /// The permanent address is never touched.
    pub fn set_net_info(&self, patch: DevNetPatch) -> Delta {
        let delta = {
            let mut net = lock(&self.net);
            let before = to_json(&*net);

            if let Some(dyn_addr) = patch.dyn_addr {
                net.address.dynamic = Some(dyn_addr);
            }
            if let Some(role) = patch.role {
                net.role = Some(role);
            }
            if let Some(parent) = patch.parent {
                net.parent = Some(parent);
            }
            if let Some(may_sleep) = patch.may_sleep {
                net.may_sleep = may_sleep;
            }
            if let Some(period) = patch.sleep_period_secs {
                net.sleep_period_secs = Some(period);
            }
            if let Some(status) = patch.status {
                net.status = status;
            }

            diff_at_paths(NET_PATHS, &before, &to_json(&*net))
        };

        if !delta.is_empty() {
            self.emit_net_changed(delta.clone());
        }
        delta
    }

    /// Shortcut for a status-only net update.
    pub fn set_status(&self, status: DevStatus) -> Delta {
        self.set_net_info(DevNetPatch {
            status: Some(status),
            ..DevNetPatch::default()
        })
    }

    /// Merge props and announce the changed leaves, if any.
    pub fn set_props(&self, patch: DevPropsPatch) -> Delta {
        let delta = {
            let mut props = lock(&self.props);
            let before = to_json(&*props);

            if let Some(name) = patch.name {
                props.name = Some(name);
            }
            if let Some(description) = patch.description {
                props.description = Some(description);
            }
            if let Some(location) = patch.location {
                props.location = Some(location);
            }

            diff_at_paths(PROPS_PATHS, &before, &to_json(&*props))
        };

        if !delta.is_empty() {
            self.netcore.emit(CoreEvent::DevPropsChanged {
                netcore: self.netcore.name().to_owned(),
                perm_addr: self.perm_addr.clone(),
                delta: delta.clone(),
            });
        }
        delta
    }

    /// Merge vendor attributes and announce the changed watched leaves,
    /// if any. Free-form extras merge silently.
    pub fn set_attrs(&self, patch: DevAttrsPatch) -> Delta {
        let delta = {
            let mut attrs = lock(&self.attrs);
            let before = to_json(&*attrs);

            if let Some(manufacturer) = patch.manufacturer {
                attrs.manufacturer = Some(manufacturer);
            }
            if let Some(model) = patch.model {
                attrs.model = Some(model);
            }
            if let Some(serial) = patch.serial {
                attrs.serial = Some(serial);
            }
            if let Some(hw) = patch.version_hw {
                attrs.version.hw = Some(hw);
            }
            if let Some(sw) = patch.version_sw {
                attrs.version.sw = Some(sw);
            }
            if let Some(fw) = patch.version_fw {
                attrs.version.fw = Some(fw);
            }
            if let Some(kind) = patch.power_kind {
                attrs.power.kind = Some(kind);
            }
            if let Some(voltage) = patch.power_voltage {
                attrs.power.voltage = Some(voltage);
            }
            for (key, value) in patch.extra {
                attrs.extra.insert(key, value);
            }

            diff_at_paths(ATTRS_PATHS, &before, &to_json(&*attrs))
        };

        if !delta.is_empty() {
            self.netcore.emit(CoreEvent::DevAttrsChanged {
                netcore: self.netcore.name().to_owned(),
                perm_addr: self.perm_addr.clone(),
                delta: delta.clone(),
            });
        }
        delta
    }

    // ── Record accessors (copy-on-read) ──────────────────────────────

    pub fn net_info(&self) -> DevNetInfo {
        lock(&self.net).clone()
    }

    pub fn props(&self) -> DevProps {
        lock(&self.props).clone()
    }

    pub fn attrs(&self) -> DevAttrs {
        lock(&self.attrs).clone()
    }

    // ── Traffic ──────────────────────────────────────────────────────

    /// Count one transfer of `bytes` bytes in `direction` and refresh
    /// the last-activity timestamp.
    pub fn accumulate(&self, direction: Direction, bytes: u64) {
        lock(&self.traffic).record(direction).accumulate(bytes);
        self.touch();
    }

    pub fn traffic(&self, direction: Direction) -> TrafficRecord {
        lock(&self.traffic).get(direction)
    }

    /// Zero the counters for `direction` and announce the reset record.
    pub fn reset_traffic(&self, direction: Direction) -> TrafficRecord {
        let record = {
            let mut traffic = lock(&self.traffic);
            traffic.record(direction).reset();
            traffic.get(direction)
        };

        let side = match direction {
            Direction::In => "inbound",
            Direction::Out => "outbound",
        };
        let mut inner = Delta::new();
        inner.insert(side.to_owned(), to_json(&record));
        let mut delta = Delta::new();
        delta.insert("traffic".to_owned(), Value::Object(inner));
        self.emit_net_changed(delta);

        record
    }

    // ── Gadget linking ───────────────────────────────────────────────

    /// Register a gadget link for `aux_id`, or return the existing one.
    pub fn link_gad(&self, aux_id: AuxId) -> GadLink {
        let mut gads = lock(&self.gads);
        if let Some(link) = gads.iter().find(|l| l.aux_id == aux_id) {
            return link.clone();
        }
        let link = GadLink {
            gad_id: None,
            aux_id,
        };
        gads.push(link.clone());
        link
    }

    /// Registry hook: fill in the assigned gadget id. Returns `false`
    /// when no link exists for `aux_id`.
    pub fn assign_gad_id(&self, aux_id: &AuxId, gad_id: u64) -> bool {
        let mut gads = lock(&self.gads);
        match gads.iter_mut().find(|l| l.aux_id == *aux_id) {
            Some(link) => {
                link.gad_id = Some(gad_id);
                true
            }
            None => false,
        }
    }

    /// Drop the link for `aux_id`, returning it if it existed.
    pub fn unlink_gad(&self, aux_id: &AuxId) -> Option<GadLink> {
        let mut gads = lock(&self.gads);
        let idx = gads.iter().position(|l| l.aux_id == *aux_id)?;
        Some(gads.remove(idx))
    }

    /// Copy-on-read view of the link table.
    pub fn gad_table(&self) -> Vec<GadLink> {
        lock(&self.gads).clone()
    }

    // ── Remote operations ────────────────────────────────────────────

    /// Read one attribute from the physical device.
    pub async fn read(&self, attr: &str) -> Result<Value, CoreError> {
        self.guard()?;
        let value = self.netcore.dev_read(self.perm_addr.clone(), attr).await?;
        self.touch();
        Ok(value)
    }

    /// Write one attribute to the physical device.
    pub async fn write(&self, attr: &str, value: Value) -> Result<Value, CoreError> {
        self.guard()?;
        let result = self
            .netcore
            .dev_write(self.perm_addr.clone(), attr, value)
            .await?;
        self.touch();
        Ok(result)
    }

    /// Make the physical device identify itself.
    pub async fn identify(&self) -> Result<(), CoreError> {
        self.guard()?;
        self.netcore.identify(self.perm_addr.clone()).await?;
        self.touch();
        Ok(())
    }

    /// Ping the physical device; resolves to the round-trip time in
    /// milliseconds.
    pub async fn ping(&self) -> Result<u32, CoreError> {
        self.guard()?;
        let time_ms = self.netcore.ping(self.perm_addr.clone()).await?;
        self.touch();
        Ok(time_ms)
    }

    // ── Snapshot ─────────────────────────────────────────────────────

    /// Independent deep copy of the public state.
    pub fn dump(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            netcore: self.netcore.name().to_owned(),
            id: self.id(),
            enabled: self.is_enabled(),
            net: self.net_info(),
            props: self.props(),
            attrs: self.attrs(),
            gads: self.gad_table(),
            traffic: *lock(&self.traffic),
            joined_at: self.joined_at,
            last_seen: self.last_seen(),
        }
    }

    // ── Internals ────────────────────────────────────────────────────

    fn guard(&self) -> Result<(), CoreError> {
        if self.is_enabled() {
            Ok(())
        } else {
            Err(CoreError::DevNotEnabled {
                perm_addr: self.perm_addr.to_string(),
            })
        }
    }

    fn touch(&self) {
        *lock(&self.last_seen) = Some(Utc::now());
    }

    fn enabled_delta(enabled: bool) -> Delta {
        let mut delta = Delta::new();
        delta.insert("enabled".to_owned(), Value::Bool(enabled));
        delta
    }

    fn emit_net_changed(&self, delta: Delta) {
        self.netcore.emit(CoreEvent::DevNetChanged {
            netcore: self.netcore.name().to_owned(),
            perm_addr: self.perm_addr.clone(),
            delta,
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::common::ProtocolInfo;
    use serde_json::json;

    fn device() -> Device {
        let core = NetCore::new("zb0", ProtocolInfo::new("ieee802.15.4", "zigbee")).unwrap();
        Device::new(core, PermAddr::new("0x00124b0001ce4b89")).unwrap()
    }

    #[test]
    fn construction_rejects_empty_address() {
        let core = NetCore::new("zb0", ProtocolInfo::new("phy", "nwk")).unwrap();
        assert!(matches!(
            Device::new(core, PermAddr::new("")),
            Err(CoreError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn permanent_address_survives_net_patches() {
        let dev = device();
        dev.set_net_info(DevNetPatch {
            dyn_addr: Some("0x1234".into()),
            role: Some("router".into()),
            ..DevNetPatch::default()
        });
        let net = dev.net_info();
        assert_eq!(net.address.permanent, "0x00124b0001ce4b89");
        assert_eq!(net.address.dynamic.as_deref(), Some("0x1234"));
    }

    #[test]
    fn net_patch_delta_contains_only_changed_leaves() {
        let dev = device();
        let delta = dev.set_net_info(DevNetPatch {
            role: Some("router".into()),
            ..DevNetPatch::default()
        });
        assert_eq!(Value::Object(delta), json!({ "role": "router" }));

        // Same value again: nothing changed, empty delta.
        let delta = dev.set_net_info(DevNetPatch {
            role: Some("router".into()),
            ..DevNetPatch::default()
        });
        assert!(delta.is_empty());
    }

    #[test]
    fn attrs_patch_is_idempotent() {
        let dev = device();
        let delta = dev.set_attrs(DevAttrsPatch {
            manufacturer: Some("acme".into()),
            ..DevAttrsPatch::default()
        });
        assert_eq!(Value::Object(delta), json!({ "manufacturer": "acme" }));

        let delta = dev.set_attrs(DevAttrsPatch {
            manufacturer: Some("acme".into()),
            ..DevAttrsPatch::default()
        });
        assert!(delta.is_empty());
    }

    #[test]
    fn vendor_extras_merge_without_announcement() {
        let dev = device();
        let mut extra = Map::new();
        extra.insert("vendorScratch".to_owned(), json!(42));
        let delta = dev.set_attrs(DevAttrsPatch {
            extra,
            ..DevAttrsPatch::default()
        });
        assert!(delta.is_empty());
        assert_eq!(dev.attrs().extra.get("vendorScratch"), Some(&json!(42)));
    }

    #[test]
    fn enable_then_read_guard() {
        let dev = device();
        assert!(!dev.is_enabled());
        dev.enable();
        dev.enable();
        assert!(dev.is_enabled());
        dev.disable();
        assert!(!dev.is_enabled());
    }

    #[test]
    fn link_gad_is_idempotent_per_aux_id() {
        let dev = device();
        let first = dev.link_gad(AuxId::from(1));
        let second = dev.link_gad(AuxId::from(1));
        assert_eq!(first, second);
        assert_eq!(dev.gad_table().len(), 1);

        dev.link_gad(AuxId::from(2));
        assert_eq!(dev.gad_table().len(), 2);
    }

    #[test]
    fn assign_and_unlink_gad() {
        let dev = device();
        dev.link_gad(AuxId::from(1));
        assert!(dev.assign_gad_id(&AuxId::from(1), 77));
        assert_eq!(dev.gad_table()[0].gad_id, Some(77));

        let removed = dev.unlink_gad(&AuxId::from(1)).unwrap();
        assert_eq!(removed.gad_id, Some(77));
        assert!(dev.gad_table().is_empty());
        assert!(!dev.assign_gad_id(&AuxId::from(1), 78));
    }

    #[test]
    fn traffic_reset_reports_zeroed_record() {
        let dev = device();
        dev.accumulate(Direction::In, 64);
        assert_eq!(dev.traffic(Direction::In).hits, 1);
        assert!(dev.last_seen().is_some());

        let record = dev.reset_traffic(Direction::In);
        assert_eq!(record, TrafficRecord::default());
    }

    #[test]
    fn dump_is_deep_copy() {
        let dev = device();
        dev.set_props(DevPropsPatch {
            name: Some("hall sensor".into()),
            ..DevPropsPatch::default()
        });
        let snapshot = dev.dump();
        dev.set_props(DevPropsPatch {
            name: Some("renamed".into()),
            ..DevPropsPatch::default()
        });
        assert_eq!(snapshot.props.name.as_deref(), Some("hall sensor"));
    }
}
