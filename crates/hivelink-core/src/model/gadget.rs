// ── Gadget ──
//
// A logical sub-component of a device (a sensor channel, a switch
// endpoint), identified by the (device, auxId) pair. Addresses are
// always resolved through the owning device -- a gadget never stores
// them -- so they stay consistent even when the device's address moves.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::diff::diff_at_paths;
use crate::error::CoreError;
use crate::event::{CoreEvent, Delta};
use crate::model::common::{AuxId, PermAddr};
use crate::model::device::Device;

/// Leaves the registry is told about when panel info mutates.
const PANEL_PATHS: &[&str] = &["profile", "classId"];

/// Leaves the registry is told about when props mutate.
const PROPS_PATHS: &[&str] = &["name", "description"];

/// Keys that never resolve through the generic accessor: internal
/// linkage stays internal.
const PROTECTED_KEYS: &[&str] = &["device", "netcore", "id", "enabled"];

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

// ── Records ─────────────────────────────────────────────────────────

/// What the gadget is, in application-profile terms.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GadPanel {
    pub profile: Option<String>,
    pub class_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GadProps {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GadPanelPatch {
    pub profile: Option<String>,
    pub class_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct GadPropsPatch {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Independent deep copy of a gadget's public state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GadgetSnapshot {
    pub netcore: String,
    pub perm_addr: PermAddr,
    pub aux_id: AuxId,
    pub id: Option<u64>,
    pub enabled: bool,
    pub panel: GadPanel,
    pub props: GadProps,
    pub attrs: Map<String, Value>,
    pub extra: Option<Value>,
}

// ── Gadget ──────────────────────────────────────────────────────────

/// A logical sub-device bound to exactly one [`Device`].
#[derive(Debug)]
pub struct Gadget {
    device: Arc<Device>,
    aux_id: AuxId,
    id: Mutex<Option<u64>>,
    enabled: AtomicBool,
    panel: Mutex<GadPanel>,
    props: Mutex<GadProps>,
    attrs: Mutex<Map<String, Value>>,
    extra: Mutex<Option<Value>>,
}

impl Gadget {
    /// Create a gadget on `device` under `aux_id` and register the link
    /// record on the device.
    pub fn new(device: Arc<Device>, aux_id: AuxId) -> Result<Self, CoreError> {
        if let AuxId::Str(s) = &aux_id {
            if s.is_empty() {
                return Err(CoreError::invalid("auxiliary id must not be empty"));
            }
        }
        device.link_gad(aux_id.clone());

        Ok(Self {
            device,
            aux_id,
            id: Mutex::new(None),
            enabled: AtomicBool::new(false),
            panel: Mutex::new(GadPanel::default()),
            props: Mutex::new(GadProps::default()),
            attrs: Mutex::new(Map::new()),
            extra: Mutex::new(None),
        })
    }

    // ── Identity ─────────────────────────────────────────────────────

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn aux_id(&self) -> &AuxId {
        &self.aux_id
    }

    /// Permanent address, always derived from the owning device.
    pub fn perm_addr(&self) -> PermAddr {
        self.device.perm_addr().clone()
    }

    /// Dynamic address, always derived from the owning device.
    pub fn dyn_addr(&self) -> Option<String> {
        self.device.dyn_addr()
    }

    pub fn id(&self) -> Option<u64> {
        *lock(&self.id)
    }

    /// Registry hook: record the assigned id and mirror it into the
    /// device's link table.
    pub fn set_id(&self, id: u64) {
        *lock(&self.id) = Some(id);
        self.device.assign_gad_id(&self.aux_id, id);
    }

    pub fn is_registered(&self) -> bool {
        lock(&self.id).is_some()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    // ── Enablement ───────────────────────────────────────────────────

    /// Idempotent; announces `{"enabled": true}` on actual change only.
    pub fn enable(&self) {
        if !self.enabled.swap(true, Ordering::SeqCst) {
            self.emit_panel_changed(Self::enabled_delta(true));
        }
    }

    /// Idempotent; announces `{"enabled": false}` on actual change only.
    pub fn disable(&self) {
        if self.enabled.swap(false, Ordering::SeqCst) {
            self.emit_panel_changed(Self::enabled_delta(false));
        }
    }

    // ── Partial updates ──────────────────────────────────────────────

    /// Merge panel info and announce the changed leaves, if any.
    pub fn set_panel(&self, patch: GadPanelPatch) -> Delta {
        let delta = {
            let mut panel = lock(&self.panel);
            let before = to_json(&*panel);

            if let Some(profile) = patch.profile {
                panel.profile = Some(profile);
            }
            if let Some(class_id) = patch.class_id {
                panel.class_id = Some(class_id);
            }

            diff_at_paths(PANEL_PATHS, &before, &to_json(&*panel))
        };

        if !delta.is_empty() {
            self.emit_panel_changed(delta.clone());
        }
        delta
    }

    /// Merge props and announce the changed leaves, if any.
    pub fn set_props(&self, patch: GadPropsPatch) -> Delta {
        let delta = {
            let mut props = lock(&self.props);
            let before = to_json(&*props);

            if let Some(name) = patch.name {
                props.name = Some(name);
            }
            if let Some(description) = patch.description {
                props.description = Some(description);
            }

            diff_at_paths(PROPS_PATHS, &before, &to_json(&*props))
        };

        if !delta.is_empty() {
            self.netcore_emit(CoreEvent::GadPropsChanged {
                netcore: self.device.netcore().name().to_owned(),
                perm_addr: self.perm_addr(),
                aux_id: self.aux_id.clone(),
                delta: delta.clone(),
            });
        }
        delta
    }

    /// Merge free-form vendor attributes key-wise and announce the keys
    /// whose values actually changed.
    pub fn set_attrs(&self, patch: Map<String, Value>) -> Delta {
        let delta = {
            let mut attrs = lock(&self.attrs);
            let mut delta = Delta::new();
            for (key, value) in patch {
                if attrs.get(&key) != Some(&value) {
                    delta.insert(key.clone(), value.clone());
                }
                attrs.insert(key, value);
            }
            delta
        };

        if !delta.is_empty() {
            self.netcore_emit(CoreEvent::GadAttrsChanged {
                netcore: self.device.netcore().name().to_owned(),
                perm_addr: self.perm_addr(),
                aux_id: self.aux_id.clone(),
                delta: delta.clone(),
            });
        }
        delta
    }

    /// Attach an opaque application blob.
    pub fn set_extra(&self, extra: Value) {
        *lock(&self.extra) = Some(extra);
    }

    // ── Guarded generic accessor ─────────────────────────────────────

    /// Resolve a key the way the registry's path-based getters do:
    /// protected linkage keys never resolve, public keys resolve against
    /// the gadget, anything else against the vendor attribute record.
    /// Returned values are independent copies.
    pub fn get(&self, key: &str) -> Option<Value> {
        if PROTECTED_KEYS.contains(&key) {
            return None;
        }
        match key {
            "profile" => lock(&self.panel).profile.clone().map(Value::String),
            "classId" => lock(&self.panel).class_id.clone().map(Value::String),
            "auxId" => Some(to_json(&self.aux_id)),
            "attrs" => Some(Value::Object(lock(&self.attrs).clone())),
            "extra" => lock(&self.extra).clone(),
            _ => lock(&self.attrs).get(key).cloned(),
        }
    }

    // ── Record accessors (copy-on-read) ──────────────────────────────

    pub fn panel(&self) -> GadPanel {
        lock(&self.panel).clone()
    }

    pub fn props(&self) -> GadProps {
        lock(&self.props).clone()
    }

    pub fn attrs(&self) -> Map<String, Value> {
        lock(&self.attrs).clone()
    }

    // ── Remote operations ────────────────────────────────────────────

    /// Read one attribute from the physical sub-device.
    pub async fn read(&self, attr: &str) -> Result<Value, CoreError> {
        self.guard()?;
        self.device
            .netcore()
            .gad_read(self.perm_addr(), self.aux_id.clone(), attr)
            .await
    }

    /// Write one attribute to the physical sub-device.
    pub async fn write(&self, attr: &str, value: Value) -> Result<Value, CoreError> {
        self.guard()?;
        self.device
            .netcore()
            .gad_write(self.perm_addr(), self.aux_id.clone(), attr, value)
            .await
    }

    /// Execute a command on the physical sub-device.
    pub async fn exec(&self, attr: &str, args: Vec<Value>) -> Result<Value, CoreError> {
        self.guard()?;
        self.device
            .netcore()
            .gad_exec(self.perm_addr(), self.aux_id.clone(), attr, args)
            .await
    }

    /// Configure attribute reporting.
    pub async fn set_report_cfg(&self, attr: &str, cfg: Value) -> Result<Value, CoreError> {
        self.guard()?;
        self.device
            .netcore()
            .set_report_cfg(self.perm_addr(), self.aux_id.clone(), attr, cfg)
            .await
    }

    /// Read the current reporting configuration.
    pub async fn get_report_cfg(&self, attr: &str) -> Result<Value, CoreError> {
        self.guard()?;
        self.device
            .netcore()
            .get_report_cfg(self.perm_addr(), self.aux_id.clone(), attr)
            .await
    }

    // ── Snapshot ─────────────────────────────────────────────────────

    /// Independent deep copy of the public state.
    pub fn dump(&self) -> GadgetSnapshot {
        GadgetSnapshot {
            netcore: self.device.netcore().name().to_owned(),
            perm_addr: self.perm_addr(),
            aux_id: self.aux_id.clone(),
            id: self.id(),
            enabled: self.is_enabled(),
            panel: self.panel(),
            props: self.props(),
            attrs: self.attrs(),
            extra: lock(&self.extra).clone(),
        }
    }

    // ── Internals ────────────────────────────────────────────────────

    fn guard(&self) -> Result<(), CoreError> {
        if self.is_enabled() {
            Ok(())
        } else {
            Err(CoreError::GadNotEnabled {
                perm_addr: self.perm_addr().to_string(),
                aux_id: self.aux_id.to_string(),
            })
        }
    }

    fn enabled_delta(enabled: bool) -> Delta {
        let mut delta = Delta::new();
        delta.insert("enabled".to_owned(), Value::Bool(enabled));
        delta
    }

    fn emit_panel_changed(&self, delta: Delta) {
        self.netcore_emit(CoreEvent::GadPanelChanged {
            netcore: self.device.netcore().name().to_owned(),
            perm_addr: self.perm_addr(),
            aux_id: self.aux_id.clone(),
            delta,
        });
    }

    fn netcore_emit(&self, event: CoreEvent) {
        self.device.netcore().emit(event);
    }
}
