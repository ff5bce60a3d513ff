// ── Vendor driver table ──
//
// A NetCore drives its hardware exclusively through this table: three
// namespaces (`net`, `dev`, `gad`) of named operation slots, each either
// unset or bound to a type-erased async function. Registration merges
// partial tables; `start` refuses to run until every mandatory slot is
// bound. Optional slots are capability-checked at dispatch time.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::error::DriverError;
use crate::model::{AuxId, PermAddr};

/// Future returned by every driver slot.
pub type DriverFuture<T> = Pin<Box<dyn Future<Output = Result<T, DriverError>> + Send>>;

// ── Slot signatures ─────────────────────────────────────────────────

/// `net.start` / `net.stop`.
pub type NetCtlFn = Arc<dyn Fn() -> DriverFuture<()> + Send + Sync>;
/// `net.reset`.
pub type NetResetFn = Arc<dyn Fn(ResetMode) -> DriverFuture<()> + Send + Sync>;
/// `net.permitJoin` -- the open-window length in seconds.
pub type NetJoinFn = Arc<dyn Fn(u32) -> DriverFuture<()> + Send + Sync>;
/// `net.remove` / `net.ban` / `net.unban`.
pub type NetAddrFn = Arc<dyn Fn(PermAddr) -> DriverFuture<()> + Send + Sync>;
/// `net.ping` -- resolves to the round-trip time in milliseconds.
pub type NetPingFn = Arc<dyn Fn(PermAddr) -> DriverFuture<u32> + Send + Sync>;
/// `dev.read`.
pub type DevReadFn = Arc<dyn Fn(PermAddr, String) -> DriverFuture<Value> + Send + Sync>;
/// `dev.write` -- `None` means "no readback, assume the written value".
pub type DevWriteFn =
    Arc<dyn Fn(PermAddr, String, Value) -> DriverFuture<Option<Value>> + Send + Sync>;
/// `dev.identify`.
pub type DevCtlFn = Arc<dyn Fn(PermAddr) -> DriverFuture<()> + Send + Sync>;
/// `gad.read` / `gad.getReportCfg`.
pub type GadReadFn = Arc<dyn Fn(PermAddr, AuxId, String) -> DriverFuture<Value> + Send + Sync>;
/// `gad.write` -- `None` means "no readback, assume the written value".
pub type GadWriteFn =
    Arc<dyn Fn(PermAddr, AuxId, String, Value) -> DriverFuture<Option<Value>> + Send + Sync>;
/// `gad.exec`.
pub type GadExecFn =
    Arc<dyn Fn(PermAddr, AuxId, String, Vec<Value>) -> DriverFuture<Value> + Send + Sync>;
/// `gad.setReportCfg`.
pub type GadCfgFn = Arc<dyn Fn(PermAddr, AuxId, String, Value) -> DriverFuture<Value> + Send + Sync>;

// ── Categories & modes ──────────────────────────────────────────────

/// Driver namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum DriverCategory {
    Net,
    Dev,
    Gad,
}

/// Reset depth. A hard reset wipes the blacklist before touching the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ResetMode {
    Soft,
    Hard,
}

// ── Per-namespace slot records ──────────────────────────────────────

/// `net` namespace slots. `ban`/`unban` are optional side notifications
/// to hardware; the blacklist itself lives in the NetCore.
#[derive(Clone, Default)]
pub struct NetDrivers {
    pub start: Option<NetCtlFn>,
    pub stop: Option<NetCtlFn>,
    pub reset: Option<NetResetFn>,
    pub permit_join: Option<NetJoinFn>,
    pub remove: Option<NetAddrFn>,
    pub ping: Option<NetPingFn>,
    pub ban: Option<NetAddrFn>,
    pub unban: Option<NetAddrFn>,
}

/// `dev` namespace slots.
#[derive(Clone, Default)]
pub struct DevDrivers {
    pub read: Option<DevReadFn>,
    pub write: Option<DevWriteFn>,
    pub identify: Option<DevCtlFn>,
}

/// `gad` namespace slots.
#[derive(Clone, Default)]
pub struct GadDrivers {
    pub read: Option<GadReadFn>,
    pub write: Option<GadWriteFn>,
    pub exec: Option<GadExecFn>,
    pub set_report_cfg: Option<GadCfgFn>,
    pub get_report_cfg: Option<GadReadFn>,
}

// ── The table ───────────────────────────────────────────────────────

/// All driver slots of one NetCore.
#[derive(Clone, Default)]
pub struct DriverTable {
    pub(crate) net: NetDrivers,
    pub(crate) dev: DevDrivers,
    pub(crate) gad: GadDrivers,
}

fn merge_slot<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *slot = incoming;
    }
}

impl DriverTable {
    /// Merge bound slots of `patch` over the `net` namespace.
    pub(crate) fn merge_net(&mut self, patch: NetDrivers) {
        merge_slot(&mut self.net.start, patch.start);
        merge_slot(&mut self.net.stop, patch.stop);
        merge_slot(&mut self.net.reset, patch.reset);
        merge_slot(&mut self.net.permit_join, patch.permit_join);
        merge_slot(&mut self.net.remove, patch.remove);
        merge_slot(&mut self.net.ping, patch.ping);
        merge_slot(&mut self.net.ban, patch.ban);
        merge_slot(&mut self.net.unban, patch.unban);
    }

    /// Merge bound slots of `patch` over the `dev` namespace.
    pub(crate) fn merge_dev(&mut self, patch: DevDrivers) {
        merge_slot(&mut self.dev.read, patch.read);
        merge_slot(&mut self.dev.write, patch.write);
        merge_slot(&mut self.dev.identify, patch.identify);
    }

    /// Merge bound slots of `patch` over the `gad` namespace.
    pub(crate) fn merge_gad(&mut self, patch: GadDrivers) {
        merge_slot(&mut self.gad.read, patch.read);
        merge_slot(&mut self.gad.write, patch.write);
        merge_slot(&mut self.gad.exec, patch.exec);
        merge_slot(&mut self.gad.set_report_cfg, patch.set_report_cfg);
        merge_slot(&mut self.gad.get_report_cfg, patch.get_report_cfg);
    }

    /// Names of mandatory slots that are still unbound, `"net.start"` style.
    pub fn missing_mandatory(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.net.start.is_none() {
            missing.push("net.start");
        }
        if self.net.stop.is_none() {
            missing.push("net.stop");
        }
        if self.net.reset.is_none() {
            missing.push("net.reset");
        }
        if self.net.permit_join.is_none() {
            missing.push("net.permitJoin");
        }
        if self.net.remove.is_none() {
            missing.push("net.remove");
        }
        if self.net.ping.is_none() {
            missing.push("net.ping");
        }
        if self.dev.read.is_none() {
            missing.push("dev.read");
        }
        if self.dev.write.is_none() {
            missing.push("dev.write");
        }
        if self.gad.read.is_none() {
            missing.push("gad.read");
        }
        if self.gad.write.is_none() {
            missing.push("gad.write");
        }
        missing
    }

    /// Capability check by wire name (`has(Gad, "exec")`).
    pub fn has(&self, category: DriverCategory, name: &str) -> bool {
        match category {
            DriverCategory::Net => match name {
                "start" => self.net.start.is_some(),
                "stop" => self.net.stop.is_some(),
                "reset" => self.net.reset.is_some(),
                "permitJoin" => self.net.permit_join.is_some(),
                "remove" => self.net.remove.is_some(),
                "ping" => self.net.ping.is_some(),
                "ban" => self.net.ban.is_some(),
                "unban" => self.net.unban.is_some(),
                _ => false,
            },
            DriverCategory::Dev => match name {
                "read" => self.dev.read.is_some(),
                "write" => self.dev.write.is_some(),
                "identify" => self.dev.identify.is_some(),
                _ => false,
            },
            DriverCategory::Gad => match name {
                "read" => self.gad.read.is_some(),
                "write" => self.gad.write.is_some(),
                "exec" => self.gad.exec.is_some(),
                "setReportCfg" => self.gad.set_report_cfg.is_some(),
                "getReportCfg" => self.gad.get_report_cfg.is_some(),
                _ => false,
            },
        }
    }
}

impl fmt::Debug for DriverTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverTable")
            .field("missing_mandatory", &self.missing_mandatory())
            .field("has_net_ban", &self.net.ban.is_some())
            .field("has_net_unban", &self.net.unban.is_some())
            .field("has_dev_identify", &self.dev.identify.is_some())
            .field("has_gad_exec", &self.gad.exec.is_some())
            .finish_non_exhaustive()
    }
}

// ── Slot adapters ───────────────────────────────────────────────────
//
// Wrap a plain async fn / async closure into the type-erased slot shape
// so vendor code never spells out `Arc::new(move |…| Box::pin(…))`.

pub fn net_ctl_fn<F, Fut>(f: F) -> NetCtlFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), DriverError>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

pub fn net_reset_fn<F, Fut>(f: F) -> NetResetFn
where
    F: Fn(ResetMode) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), DriverError>> + Send + 'static,
{
    Arc::new(move |mode| Box::pin(f(mode)))
}

pub fn net_join_fn<F, Fut>(f: F) -> NetJoinFn
where
    F: Fn(u32) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), DriverError>> + Send + 'static,
{
    Arc::new(move |duration| Box::pin(f(duration)))
}

pub fn net_addr_fn<F, Fut>(f: F) -> NetAddrFn
where
    F: Fn(PermAddr) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), DriverError>> + Send + 'static,
{
    Arc::new(move |addr| Box::pin(f(addr)))
}

pub fn net_ping_fn<F, Fut>(f: F) -> NetPingFn
where
    F: Fn(PermAddr) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<u32, DriverError>> + Send + 'static,
{
    Arc::new(move |addr| Box::pin(f(addr)))
}

pub fn dev_read_fn<F, Fut>(f: F) -> DevReadFn
where
    F: Fn(PermAddr, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, DriverError>> + Send + 'static,
{
    Arc::new(move |addr, attr| Box::pin(f(addr, attr)))
}

pub fn dev_write_fn<F, Fut>(f: F) -> DevWriteFn
where
    F: Fn(PermAddr, String, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Value>, DriverError>> + Send + 'static,
{
    Arc::new(move |addr, attr, value| Box::pin(f(addr, attr, value)))
}

pub fn dev_ctl_fn<F, Fut>(f: F) -> DevCtlFn
where
    F: Fn(PermAddr) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), DriverError>> + Send + 'static,
{
    Arc::new(move |addr| Box::pin(f(addr)))
}

pub fn gad_read_fn<F, Fut>(f: F) -> GadReadFn
where
    F: Fn(PermAddr, AuxId, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, DriverError>> + Send + 'static,
{
    Arc::new(move |addr, aux, attr| Box::pin(f(addr, aux, attr)))
}

pub fn gad_write_fn<F, Fut>(f: F) -> GadWriteFn
where
    F: Fn(PermAddr, AuxId, String, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Value>, DriverError>> + Send + 'static,
{
    Arc::new(move |addr, aux, attr, value| Box::pin(f(addr, aux, attr, value)))
}

pub fn gad_exec_fn<F, Fut>(f: F) -> GadExecFn
where
    F: Fn(PermAddr, AuxId, String, Vec<Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, DriverError>> + Send + 'static,
{
    Arc::new(move |addr, aux, attr, args| Box::pin(f(addr, aux, attr, args)))
}

pub fn gad_cfg_fn<F, Fut>(f: F) -> GadCfgFn
where
    F: Fn(PermAddr, AuxId, String, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, DriverError>> + Send + 'static,
{
    Arc::new(move |addr, aux, attr, cfg| Box::pin(f(addr, aux, attr, cfg)))
}
