// ── NetCore ──
//
// The root coordination object of one communication adapter. Owns the
// driver table, the blacklist, the permit-join countdown, and traffic
// counters, and turns raw driver notifications into typed lifecycle
// events for the external registry. It performs no network I/O itself
// and never creates Device/Gadget records -- it gates and announces.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::NetCoreConfig;
use crate::driver::{
    DevDrivers, DriverCategory, DriverTable, GadDrivers, NetDrivers, ResetMode,
};
use crate::error::CoreError;
use crate::event::{CoreEvent, Delta, EventStream};
use crate::model::{AuxId, Direction, PermAddr, ProtocolInfo, Traffic, TrafficRecord};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Active permit-join countdown.
struct JoinWindow {
    cancel: CancellationToken,
    time_left: Arc<AtomicU32>,
}

struct NetCoreInner {
    name: String,
    protocol: ProtocolInfo,
    config: NetCoreConfig,
    enabled: AtomicBool,
    drivers: RwLock<DriverTable>,
    blacklist: Mutex<BTreeSet<PermAddr>>,
    traffic: Mutex<Traffic>,
    started_at: Mutex<Option<DateTime<Utc>>>,
    join: Mutex<Option<JoinWindow>>,
    event_tx: broadcast::Sender<Arc<CoreEvent>>,
}

/// Independent deep copy of a NetCore's public state.
#[derive(Debug, Clone, Serialize)]
pub struct NetCoreSnapshot {
    pub name: String,
    pub enabled: bool,
    pub protocol: ProtocolInfo,
    pub started_at: Option<DateTime<Utc>>,
    pub traffic: Traffic,
    pub join_time_left: u32,
}

/// Handle to one communication adapter.
///
/// Cheaply cloneable via `Arc`. Drivers are registered before `start`;
/// afterwards every remote operation dispatches through the table,
/// gated on enablement. Consumers subscribe to the event feed with
/// [`subscribe`](Self::subscribe) -- with no subscriber attached,
/// emission is a local no-op.
#[derive(Clone)]
pub struct NetCore {
    inner: Arc<NetCoreInner>,
}

impl NetCore {
    /// Create a new NetCore. Does NOT touch any driver -- register the
    /// driver tables, then call [`start`](Self::start).
    pub fn new(name: impl Into<String>, protocol: ProtocolInfo) -> Result<Self, CoreError> {
        Self::with_config(name, protocol, NetCoreConfig::default())
    }

    /// Create a new NetCore with explicit tuning.
    pub fn with_config(
        name: impl Into<String>,
        protocol: ProtocolInfo,
        config: NetCoreConfig,
    ) -> Result<Self, CoreError> {
        let name = name.into();
        if name.is_empty() {
            return Err(CoreError::invalid("netcore name must not be empty"));
        }
        if protocol.phy.is_empty() || protocol.nwk.is_empty() {
            return Err(CoreError::invalid(
                "protocol phy and nwk names must not be empty",
            ));
        }

        let (event_tx, _) = broadcast::channel(config.event_capacity);

        Ok(Self {
            inner: Arc::new(NetCoreInner {
                name,
                protocol,
                config,
                enabled: AtomicBool::new(false),
                drivers: RwLock::new(DriverTable::default()),
                blacklist: Mutex::new(BTreeSet::new()),
                traffic: Mutex::new(Traffic::default()),
                started_at: Mutex::new(None),
                join: Mutex::new(None),
                event_tx,
            }),
        })
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn protocol(&self) -> &ProtocolInfo {
        &self.inner.protocol
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Seconds left in the current join window, 0 when closed.
    pub fn join_time_left(&self) -> u32 {
        lock(&self.inner.join)
            .as_ref()
            .map_or(0, |w| w.time_left.load(Ordering::SeqCst))
    }

    pub fn is_joinable(&self) -> bool {
        self.join_time_left() > 0
    }

    /// Subscribe to the event feed. This is how the external registry
    /// attaches itself.
    pub fn subscribe(&self) -> EventStream {
        EventStream::new(self.inner.event_tx.subscribe())
    }

    /// Independent deep copy of the public state.
    pub fn dump(&self) -> NetCoreSnapshot {
        NetCoreSnapshot {
            name: self.inner.name.clone(),
            enabled: self.is_enabled(),
            protocol: self.inner.protocol.clone(),
            started_at: *lock(&self.inner.started_at),
            traffic: *lock(&self.inner.traffic),
            join_time_left: self.join_time_left(),
        }
    }

    // ── Driver registration ──────────────────────────────────────────

    /// Merge bound `net` slots over the driver table.
    pub fn register_net_drivers(&self, drivers: NetDrivers) {
        self.write_table(|t| t.merge_net(drivers));
    }

    /// Merge bound `dev` slots over the driver table.
    pub fn register_dev_drivers(&self, drivers: DevDrivers) {
        self.write_table(|t| t.merge_dev(drivers));
    }

    /// Merge bound `gad` slots over the driver table.
    pub fn register_gad_drivers(&self, drivers: GadDrivers) {
        self.write_table(|t| t.merge_gad(drivers));
    }

    /// Capability check by wire name.
    pub fn has_driver(&self, category: DriverCategory, name: &str) -> bool {
        self.read_table(|t| t.has(category, name))
    }

    // ── Enablement ───────────────────────────────────────────────────

    /// Open the dispatch gate. Idempotent; emits `enabled` on change only.
    pub fn enable(&self) {
        if !self.inner.enabled.swap(true, Ordering::SeqCst) {
            debug!(netcore = %self.inner.name, "enabled");
            self.emit(CoreEvent::Enabled {
                netcore: self.inner.name.clone(),
            });
        }
    }

    /// Close the dispatch gate and cancel any join countdown. Idempotent;
    /// emits `disabled` on change only. In-flight driver calls are not
    /// cancelled -- only new dispatches are refused.
    pub fn disable(&self) {
        if self.inner.enabled.swap(false, Ordering::SeqCst) {
            self.cancel_join_window();
            debug!(netcore = %self.inner.name, "disabled");
            self.emit(CoreEvent::Disabled {
                netcore: self.inner.name.clone(),
            });
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Validate the driver table and bring the adapter up.
    ///
    /// Fails with [`CoreError::MissingDrivers`] naming every unbound
    /// mandatory slot before any driver is touched. `enabled` changes
    /// only on the success branch.
    pub async fn start(&self) -> Result<(), CoreError> {
        let start_fn = {
            let missing = self.read_table(DriverTable::missing_mandatory);
            if !missing.is_empty() {
                let err = CoreError::MissingDrivers { missing };
                self.emit_error("start", Value::Null, &err);
                return Err(err);
            }
            self.read_table(|t| t.net.start.clone())
                .ok_or(CoreError::DriverNotImplemented {
                    category: DriverCategory::Net,
                    name: "start",
                })?
        };

        match start_fn().await {
            Ok(()) => {
                self.enable();
                *lock(&self.inner.started_at) = Some(Utc::now());
                info!(netcore = %self.inner.name, "started");
                self.emit(CoreEvent::Started {
                    netcore: self.inner.name.clone(),
                });
                Ok(())
            }
            Err(e) => {
                let err = CoreError::from(e);
                self.emit_error("start", Value::Null, &err);
                Err(err)
            }
        }
    }

    /// Bring the adapter down. A no-op on an already-stopped core.
    pub async fn stop(&self) -> Result<(), CoreError> {
        if !self.is_enabled() {
            return Ok(());
        }

        let stop_fn = self
            .read_table(|t| t.net.stop.clone())
            .ok_or(CoreError::DriverNotImplemented {
                category: DriverCategory::Net,
                name: "stop",
            })?;

        match stop_fn().await {
            Ok(()) => {
                self.disable();
                info!(netcore = %self.inner.name, "stopped");
                self.emit(CoreEvent::Stopped {
                    netcore: self.inner.name.clone(),
                });
                Ok(())
            }
            Err(e) => {
                let err = CoreError::from(e);
                self.emit_error("stop", Value::Null, &err);
                Err(err)
            }
        }
    }

    /// Reset the adapter and start it again. A hard reset wipes the
    /// blacklist before touching the radio.
    pub async fn reset(&self, mode: ResetMode) -> Result<(), CoreError> {
        if mode == ResetMode::Hard {
            lock(&self.inner.blacklist).clear();
            debug!(netcore = %self.inner.name, "blacklist cleared for hard reset");
        }
        self.disable();

        let reset_fn = self
            .read_table(|t| t.net.reset.clone())
            .ok_or(CoreError::DriverNotImplemented {
                category: DriverCategory::Net,
                name: "reset",
            })?;

        match reset_fn(mode).await {
            Ok(()) => self.start().await,
            Err(e) => {
                let err = CoreError::from(e);
                self.emit_error("reset", json!({ "mode": mode.to_string() }), &err);
                Err(err)
            }
        }
    }

    /// Open the join window for `duration` seconds (the configured
    /// default when `None`). Restarting replaces any active countdown.
    /// A duration of 0 closes the window and emits a single terminal
    /// zero tick.
    pub async fn permit_join(&self, duration: Option<u32>) -> Result<(), CoreError> {
        self.guard()?;
        let duration = duration.unwrap_or(self.inner.config.default_join_time_secs);

        let join_fn = self
            .read_table(|t| t.net.permit_join.clone())
            .ok_or(CoreError::DriverNotImplemented {
                category: DriverCategory::Net,
                name: "permitJoin",
            })?;

        match join_fn(duration).await {
            Ok(()) => {
                self.cancel_join_window();
                if duration == 0 {
                    self.emit(CoreEvent::PermitJoin {
                        netcore: self.inner.name.clone(),
                        time_left: 0,
                    });
                } else {
                    self.spawn_join_countdown(duration);
                }
                Ok(())
            }
            Err(e) => {
                let err = CoreError::from(e);
                self.emit_error("permitJoin", json!({ "duration": duration }), &err);
                Err(err)
            }
        }
    }

    /// Ask the adapter to remove a device from the network. Local state
    /// is untouched -- the registry reacts to the `devLeaving` event.
    pub async fn remove(&self, perm_addr: PermAddr) -> Result<(), CoreError> {
        self.guard()?;
        Self::check_addr(&perm_addr)?;

        let remove_fn = self
            .read_table(|t| t.net.remove.clone())
            .ok_or(CoreError::DriverNotImplemented {
                category: DriverCategory::Net,
                name: "remove",
            })?;

        match remove_fn(perm_addr.clone()).await {
            Ok(()) => {
                self.emit(CoreEvent::DevLeaving {
                    netcore: self.inner.name.clone(),
                    perm_addr,
                });
                Ok(())
            }
            Err(e) => {
                let err = CoreError::from(e);
                self.emit_error("remove", json!({ "permAddr": perm_addr.as_str() }), &err);
                Err(err)
            }
        }
    }

    /// Put an address on the blacklist.
    ///
    /// The blacklist mutation is the operation's real effect; a bound
    /// `net.ban` driver is a side notification to hardware whose result
    /// gates the mutation. Without one the mutation is unconditional.
    pub async fn ban(&self, perm_addr: PermAddr) -> Result<(), CoreError> {
        Self::check_addr(&perm_addr)?;

        if let Some(ban_fn) = self.read_table(|t| t.net.ban.clone()) {
            self.guard()?;
            if let Err(e) = ban_fn(perm_addr.clone()).await {
                let err = CoreError::from(e);
                self.emit_error("ban", json!({ "permAddr": perm_addr.as_str() }), &err);
                return Err(err);
            }
        }

        lock(&self.inner.blacklist).insert(perm_addr.clone());
        info!(netcore = %self.inner.name, addr = %perm_addr, "banned");
        self.emit(CoreEvent::NetBan {
            netcore: self.inner.name.clone(),
            perm_addr,
        });
        Ok(())
    }

    /// Take an address off the blacklist. Same driver contract as
    /// [`ban`](Self::ban).
    pub async fn unban(&self, perm_addr: PermAddr) -> Result<(), CoreError> {
        Self::check_addr(&perm_addr)?;

        if let Some(unban_fn) = self.read_table(|t| t.net.unban.clone()) {
            self.guard()?;
            if let Err(e) = unban_fn(perm_addr.clone()).await {
                let err = CoreError::from(e);
                self.emit_error("unban", json!({ "permAddr": perm_addr.as_str() }), &err);
                return Err(err);
            }
        }

        lock(&self.inner.blacklist).remove(&perm_addr);
        info!(netcore = %self.inner.name, addr = %perm_addr, "unbanned");
        self.emit(CoreEvent::NetUnban {
            netcore: self.inner.name.clone(),
            perm_addr,
        });
        Ok(())
    }

    // ── Blacklist surface ────────────────────────────────────────────

    /// Copy-on-read view of the blacklist.
    pub fn blacklist(&self) -> Vec<PermAddr> {
        lock(&self.inner.blacklist).iter().cloned().collect()
    }

    pub fn is_blacklisted(&self, perm_addr: &PermAddr) -> bool {
        lock(&self.inner.blacklist).contains(perm_addr)
    }

    pub fn clear_blacklist(&self) {
        lock(&self.inner.blacklist).clear();
    }

    // ── Remote operations (driver dispatch) ──────────────────────────

    /// Ping a device; resolves to the round-trip time in milliseconds.
    pub async fn ping(&self, perm_addr: PermAddr) -> Result<u32, CoreError> {
        self.guard()?;
        Self::check_addr(&perm_addr)?;

        let ping_fn = self
            .read_table(|t| t.net.ping.clone())
            .ok_or(CoreError::DriverNotImplemented {
                category: DriverCategory::Net,
                name: "ping",
            })?;

        match ping_fn(perm_addr.clone()).await {
            Ok(time_ms) => {
                self.emit(CoreEvent::NetPing {
                    netcore: self.inner.name.clone(),
                    perm_addr,
                    time_ms,
                });
                Ok(time_ms)
            }
            Err(e) => {
                let err = CoreError::from(e);
                self.emit_error("ping", json!({ "permAddr": perm_addr.as_str() }), &err);
                Err(err)
            }
        }
    }

    /// Read one device attribute.
    pub async fn dev_read(&self, perm_addr: PermAddr, attr: &str) -> Result<Value, CoreError> {
        self.guard()?;
        Self::check_attr(attr)?;

        let read_fn = self
            .read_table(|t| t.dev.read.clone())
            .ok_or(CoreError::DriverNotImplemented {
                category: DriverCategory::Dev,
                name: "read",
            })?;

        match read_fn(perm_addr.clone(), attr.to_owned()).await {
            Ok(value) => {
                self.emit(CoreEvent::DevRead {
                    netcore: self.inner.name.clone(),
                    perm_addr,
                    data: Self::single(attr, value.clone()),
                });
                Ok(value)
            }
            Err(e) => {
                let err = CoreError::from(e);
                self.emit_error(
                    "devRead",
                    json!({ "permAddr": perm_addr.as_str(), "attr": attr }),
                    &err,
                );
                Err(err)
            }
        }
    }

    /// Write one device attribute. Resolves to the driver's readback, or
    /// the written value when the driver returns none.
    pub async fn dev_write(
        &self,
        perm_addr: PermAddr,
        attr: &str,
        value: Value,
    ) -> Result<Value, CoreError> {
        self.guard()?;
        Self::check_attr(attr)?;

        let write_fn = self
            .read_table(|t| t.dev.write.clone())
            .ok_or(CoreError::DriverNotImplemented {
                category: DriverCategory::Dev,
                name: "write",
            })?;

        match write_fn(perm_addr.clone(), attr.to_owned(), value.clone()).await {
            Ok(readback) => {
                let result = readback.unwrap_or(value);
                self.emit(CoreEvent::DevWrite {
                    netcore: self.inner.name.clone(),
                    perm_addr,
                    data: Self::single(attr, result.clone()),
                });
                Ok(result)
            }
            Err(e) => {
                let err = CoreError::from(e);
                self.emit_error(
                    "devWrite",
                    json!({ "permAddr": perm_addr.as_str(), "attr": attr }),
                    &err,
                );
                Err(err)
            }
        }
    }

    /// Make a device identify itself (optional driver).
    pub async fn identify(&self, perm_addr: PermAddr) -> Result<(), CoreError> {
        self.guard()?;
        Self::check_addr(&perm_addr)?;

        let identify_fn = self
            .read_table(|t| t.dev.identify.clone())
            .ok_or(CoreError::DriverNotImplemented {
                category: DriverCategory::Dev,
                name: "identify",
            })?;

        match identify_fn(perm_addr.clone()).await {
            Ok(()) => {
                self.emit(CoreEvent::DevIdentify {
                    netcore: self.inner.name.clone(),
                    perm_addr,
                });
                Ok(())
            }
            Err(e) => {
                let err = CoreError::from(e);
                self.emit_error("identify", json!({ "permAddr": perm_addr.as_str() }), &err);
                Err(err)
            }
        }
    }

    /// Read one gadget attribute.
    pub async fn gad_read(
        &self,
        perm_addr: PermAddr,
        aux_id: AuxId,
        attr: &str,
    ) -> Result<Value, CoreError> {
        self.guard()?;
        Self::check_attr(attr)?;

        let read_fn = self
            .read_table(|t| t.gad.read.clone())
            .ok_or(CoreError::DriverNotImplemented {
                category: DriverCategory::Gad,
                name: "read",
            })?;

        match read_fn(perm_addr.clone(), aux_id.clone(), attr.to_owned()).await {
            Ok(value) => {
                self.emit(CoreEvent::GadRead {
                    netcore: self.inner.name.clone(),
                    perm_addr,
                    aux_id,
                    data: Self::single(attr, value.clone()),
                });
                Ok(value)
            }
            Err(e) => {
                let err = CoreError::from(e);
                self.emit_error(
                    "gadRead",
                    json!({ "permAddr": perm_addr.as_str(), "auxId": aux_id.to_string(), "attr": attr }),
                    &err,
                );
                Err(err)
            }
        }
    }

    /// Write one gadget attribute; readback falls back to the written value.
    pub async fn gad_write(
        &self,
        perm_addr: PermAddr,
        aux_id: AuxId,
        attr: &str,
        value: Value,
    ) -> Result<Value, CoreError> {
        self.guard()?;
        Self::check_attr(attr)?;

        let write_fn = self
            .read_table(|t| t.gad.write.clone())
            .ok_or(CoreError::DriverNotImplemented {
                category: DriverCategory::Gad,
                name: "write",
            })?;

        match write_fn(perm_addr.clone(), aux_id.clone(), attr.to_owned(), value.clone()).await {
            Ok(readback) => {
                let result = readback.unwrap_or(value);
                self.emit(CoreEvent::GadWrite {
                    netcore: self.inner.name.clone(),
                    perm_addr,
                    aux_id,
                    data: Self::single(attr, result.clone()),
                });
                Ok(result)
            }
            Err(e) => {
                let err = CoreError::from(e);
                self.emit_error(
                    "gadWrite",
                    json!({ "permAddr": perm_addr.as_str(), "auxId": aux_id.to_string(), "attr": attr }),
                    &err,
                );
                Err(err)
            }
        }
    }

    /// Execute a gadget command (optional driver).
    pub async fn gad_exec(
        &self,
        perm_addr: PermAddr,
        aux_id: AuxId,
        attr: &str,
        args: Vec<Value>,
    ) -> Result<Value, CoreError> {
        self.guard()?;
        Self::check_attr(attr)?;

        let exec_fn = self
            .read_table(|t| t.gad.exec.clone())
            .ok_or(CoreError::DriverNotImplemented {
                category: DriverCategory::Gad,
                name: "exec",
            })?;

        match exec_fn(perm_addr.clone(), aux_id.clone(), attr.to_owned(), args).await {
            Ok(value) => {
                self.emit(CoreEvent::GadExec {
                    netcore: self.inner.name.clone(),
                    perm_addr,
                    aux_id,
                    data: Self::single(attr, value.clone()),
                });
                Ok(value)
            }
            Err(e) => {
                let err = CoreError::from(e);
                self.emit_error(
                    "gadExec",
                    json!({ "permAddr": perm_addr.as_str(), "auxId": aux_id.to_string(), "attr": attr }),
                    &err,
                );
                Err(err)
            }
        }
    }

    /// Configure attribute reporting on a gadget (optional driver).
    pub async fn set_report_cfg(
        &self,
        perm_addr: PermAddr,
        aux_id: AuxId,
        attr: &str,
        cfg: Value,
    ) -> Result<Value, CoreError> {
        self.guard()?;
        Self::check_attr(attr)?;

        let set_fn = self
            .read_table(|t| t.gad.set_report_cfg.clone())
            .ok_or(CoreError::DriverNotImplemented {
                category: DriverCategory::Gad,
                name: "setReportCfg",
            })?;

        match set_fn(perm_addr.clone(), aux_id.clone(), attr.to_owned(), cfg).await {
            Ok(value) => {
                self.emit(CoreEvent::GadSetReportCfg {
                    netcore: self.inner.name.clone(),
                    perm_addr,
                    aux_id,
                    data: Self::single(attr, value.clone()),
                });
                Ok(value)
            }
            Err(e) => {
                let err = CoreError::from(e);
                self.emit_error(
                    "gadSetReportCfg",
                    json!({ "permAddr": perm_addr.as_str(), "auxId": aux_id.to_string(), "attr": attr }),
                    &err,
                );
                Err(err)
            }
        }
    }

    /// Read a gadget's reporting configuration (optional driver).
    pub async fn get_report_cfg(
        &self,
        perm_addr: PermAddr,
        aux_id: AuxId,
        attr: &str,
    ) -> Result<Value, CoreError> {
        self.guard()?;
        Self::check_attr(attr)?;

        let get_fn = self
            .read_table(|t| t.gad.get_report_cfg.clone())
            .ok_or(CoreError::DriverNotImplemented {
                category: DriverCategory::Gad,
                name: "getReportCfg",
            })?;

        match get_fn(perm_addr.clone(), aux_id.clone(), attr.to_owned()).await {
            Ok(value) => {
                self.emit(CoreEvent::GadGetReportCfg {
                    netcore: self.inner.name.clone(),
                    perm_addr,
                    aux_id,
                    data: Self::single(attr, value.clone()),
                });
                Ok(value)
            }
            Err(e) => {
                let err = CoreError::from(e);
                self.emit_error(
                    "gadGetReportCfg",
                    json!({ "permAddr": perm_addr.as_str(), "auxId": aux_id.to_string(), "attr": attr }),
                    &err,
                );
                Err(err)
            }
        }
    }

    // ── Reconciliation (gate-and-announce) ───────────────────────────
    //
    // Called by the driver when it observes raw network activity. Each
    // returns whether the notification was committed (announced as a
    // normal lifecycle event). No Device/Gadget object is created or
    // destroyed here.

    /// Announce that the adapter finished its post-start housekeeping.
    pub fn commit_ready(&self) -> bool {
        if !self.is_enabled() {
            return false;
        }
        self.emit(CoreEvent::Ready {
            netcore: self.inner.name.clone(),
        });
        true
    }

    /// A device joined or re-joined the network.
    pub fn commit_dev_incoming(&self, perm_addr: PermAddr, raw: Value) -> bool {
        if !self.is_enabled() {
            return false;
        }
        if self.is_blacklisted(&perm_addr) {
            warn!(netcore = %self.inner.name, addr = %perm_addr, "incoming from banned device");
            self.emit(CoreEvent::BannedDevIncoming {
                netcore: self.inner.name.clone(),
                perm_addr,
                raw,
            });
            return false;
        }
        self.emit(CoreEvent::DevIncoming {
            netcore: self.inner.name.clone(),
            perm_addr,
            raw,
        });
        true
    }

    /// A device left the network. Banned devices still announce --
    /// the registry has cleanup to do either way.
    pub fn commit_dev_leaving(&self, perm_addr: PermAddr) -> bool {
        if !self.is_enabled() {
            return false;
        }
        self.emit(CoreEvent::DevLeaving {
            netcore: self.inner.name.clone(),
            perm_addr,
        });
        true
    }

    /// A gadget was discovered on a device.
    pub fn commit_gad_incoming(&self, perm_addr: PermAddr, aux_id: AuxId, raw: Value) -> bool {
        if !self.is_enabled() {
            return false;
        }
        if self.is_blacklisted(&perm_addr) {
            self.emit(CoreEvent::BannedGadIncoming {
                netcore: self.inner.name.clone(),
                perm_addr,
                aux_id,
                raw,
            });
            return false;
        }
        self.emit(CoreEvent::GadIncoming {
            netcore: self.inner.name.clone(),
            perm_addr,
            aux_id,
            raw,
        });
        true
    }

    /// A device reported attribute changes.
    pub fn commit_dev_reporting(&self, perm_addr: PermAddr, delta: Value) -> bool {
        if !self.is_enabled() {
            return false;
        }
        if self.is_blacklisted(&perm_addr) {
            self.emit(CoreEvent::BannedDevReporting {
                netcore: self.inner.name.clone(),
                perm_addr,
                delta,
            });
            return false;
        }
        self.emit(CoreEvent::DevReporting {
            netcore: self.inner.name.clone(),
            perm_addr,
            delta,
        });
        true
    }

    /// A gadget reported attribute changes.
    pub fn commit_gad_reporting(&self, perm_addr: PermAddr, aux_id: AuxId, delta: Value) -> bool {
        if !self.is_enabled() {
            return false;
        }
        if self.is_blacklisted(&perm_addr) {
            self.emit(CoreEvent::BannedGadReporting {
                netcore: self.inner.name.clone(),
                perm_addr,
                aux_id,
                delta,
            });
            return false;
        }
        self.emit(CoreEvent::GadReporting {
            netcore: self.inner.name.clone(),
            perm_addr,
            aux_id,
            delta,
        });
        true
    }

    /// The driver observed network-level metadata changing on a device
    /// (address, role, sleep behavior). Enablement-gated only.
    pub fn commit_dev_net_changing(&self, perm_addr: PermAddr, delta: Delta) -> bool {
        if !self.is_enabled() {
            return false;
        }
        self.emit(CoreEvent::DevNetChanging {
            netcore: self.inner.name.clone(),
            perm_addr,
            delta,
        });
        true
    }

    // ── Traffic ──────────────────────────────────────────────────────

    /// Count one transfer of `bytes` bytes in `direction`.
    pub fn accumulate(&self, direction: Direction, bytes: u64) {
        lock(&self.inner.traffic).record(direction).accumulate(bytes);
    }

    pub fn traffic(&self, direction: Direction) -> TrafficRecord {
        lock(&self.inner.traffic).get(direction)
    }

    /// Zero the counters for `direction`, returning the zeroed record.
    pub fn reset_traffic(&self, direction: Direction) -> TrafficRecord {
        let mut traffic = lock(&self.inner.traffic);
        traffic.record(direction).reset();
        traffic.get(direction)
    }

    // ── Internals ────────────────────────────────────────────────────

    pub(crate) fn emit(&self, event: CoreEvent) {
        // Zero receivers means the registry has not attached yet; the
        // event is dropped but local state has already been committed.
        let _ = self.inner.event_tx.send(Arc::new(event));
    }

    fn emit_error(&self, operation: &str, args: Value, err: &CoreError) {
        warn!(netcore = %self.inner.name, operation, error = %err, "operation failed");
        self.emit(CoreEvent::NetError {
            netcore: self.inner.name.clone(),
            operation: operation.to_owned(),
            args,
            message: err.to_string(),
        });
    }

    fn guard(&self) -> Result<(), CoreError> {
        if self.is_enabled() {
            Ok(())
        } else {
            Err(CoreError::NotEnabled {
                name: self.inner.name.clone(),
            })
        }
    }

    fn check_addr(perm_addr: &PermAddr) -> Result<(), CoreError> {
        if perm_addr.is_empty() {
            Err(CoreError::invalid("permanent address must not be empty"))
        } else {
            Ok(())
        }
    }

    fn check_attr(attr: &str) -> Result<(), CoreError> {
        if attr.is_empty() {
            Err(CoreError::invalid("attribute name must not be empty"))
        } else {
            Ok(())
        }
    }

    fn single(attr: &str, value: Value) -> Delta {
        let mut data = Delta::new();
        data.insert(attr.to_owned(), value);
        data
    }

    fn read_table<R>(&self, f: impl FnOnce(&DriverTable) -> R) -> R {
        let table = self
            .inner
            .drivers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f(&table)
    }

    fn write_table(&self, f: impl FnOnce(&mut DriverTable)) {
        let mut table = self
            .inner
            .drivers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut table);
    }

    fn cancel_join_window(&self) {
        if let Some(window) = lock(&self.inner.join).take() {
            window.cancel.cancel();
        }
    }

    /// Spawn the 1 Hz countdown emitting `duration, …, 1, 0` ticks,
    /// self-cancelling at the terminal zero.
    fn spawn_join_countdown(&self, duration: u32) {
        let cancel = CancellationToken::new();
        let time_left = Arc::new(AtomicU32::new(duration));
        *lock(&self.inner.join) = Some(JoinWindow {
            cancel: cancel.clone(),
            time_left: Arc::clone(&time_left),
        });

        let core = self.clone();
        tokio::spawn(async move {
            core.emit(CoreEvent::PermitJoin {
                netcore: core.inner.name.clone(),
                time_left: duration,
            });

            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.tick().await; // consume the immediate first tick

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let left = time_left.load(Ordering::SeqCst).saturating_sub(1);
                        time_left.store(left, Ordering::SeqCst);
                        core.emit(CoreEvent::PermitJoin {
                            netcore: core.inner.name.clone(),
                            time_left: left,
                        });
                        if left == 0 {
                            break;
                        }
                    }
                }
            }
        });
    }
}

impl std::fmt::Debug for NetCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetCore")
            .field("name", &self.inner.name)
            .field("protocol", &self.inner.protocol)
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn core() -> NetCore {
        NetCore::new("zb0", ProtocolInfo::new("ieee802.15.4", "zigbee")).unwrap()
    }

    #[test]
    fn construction_rejects_empty_identity() {
        assert!(matches!(
            NetCore::new("", ProtocolInfo::new("phy", "nwk")),
            Err(CoreError::InvalidArgument { .. })
        ));
        assert!(matches!(
            NetCore::new("zb0", ProtocolInfo::new("", "nwk")),
            Err(CoreError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn fresh_core_is_disabled_and_unjoinable() {
        let core = core();
        assert!(!core.is_enabled());
        assert!(!core.is_joinable());
        assert_eq!(core.join_time_left(), 0);
    }

    #[test]
    fn commits_are_refused_while_disabled() {
        let core = core();
        assert!(!core.commit_dev_incoming(PermAddr::new("0x01"), Value::Null));
        assert!(!core.commit_dev_leaving(PermAddr::new("0x01")));
        assert!(!core.commit_ready());
    }

    #[test]
    fn blacklist_is_copy_on_read() {
        let core = core();
        let mut copy = core.blacklist();
        copy.push(PermAddr::new("0xFF"));
        assert!(core.blacklist().is_empty());
    }

    #[test]
    fn dump_is_independent() {
        let core = core();
        core.accumulate(Direction::In, 10);
        let snapshot = core.dump();
        core.accumulate(Direction::In, 10);
        assert_eq!(snapshot.traffic.inbound.bytes, 10);
        assert_eq!(core.traffic(Direction::In).bytes, 20);
        assert_eq!(snapshot.name, "zb0");
    }

    #[test]
    fn traffic_reset_zeroes_one_direction() {
        let core = core();
        core.accumulate(Direction::In, 100);
        core.accumulate(Direction::Out, 7);
        assert_eq!(core.reset_traffic(Direction::In), TrafficRecord::default());
        assert_eq!(core.traffic(Direction::Out).bytes, 7);
    }

    #[test]
    fn enable_disable_are_idempotent() {
        let core = core();
        let mut events = core.subscribe();
        core.enable();
        core.enable();
        core.disable();
        core.disable();

        // Exactly one enabled and one disabled event were broadcast.
        let first = events.try_recv().unwrap();
        let second = events.try_recv().unwrap();
        assert_eq!(first.kind(), "enabled");
        assert_eq!(second.kind(), "disabled");
        assert!(events.try_recv().is_none());
    }
}
