// ── Event taxonomy ──
//
// Everything a NetCore tells the outside world flows through one flat
// `CoreEvent` enum, broadcast toward the external registry. The registry
// reacts by creating/updating Device and Gadget records -- the core never
// does that itself. With no subscriber attached ("not yet registered"),
// emission is a local no-op.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::model::{AuxId, PermAddr};

/// Changed-leaves payload produced by the watched-path differ.
pub type Delta = Map<String, Value>;

/// Every event a NetCore can emit.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    // ── Core lifecycle ───────────────────────────────────────────────
    Started {
        netcore: String,
    },
    Stopped {
        netcore: String,
    },
    Enabled {
        netcore: String,
    },
    Disabled {
        netcore: String,
    },
    Ready {
        netcore: String,
    },
    PermitJoin {
        netcore: String,
        time_left: u32,
    },

    // ── Incoming / leaving (gate-and-announce) ───────────────────────
    DevIncoming {
        netcore: String,
        perm_addr: PermAddr,
        raw: Value,
    },
    DevLeaving {
        netcore: String,
        perm_addr: PermAddr,
    },
    GadIncoming {
        netcore: String,
        perm_addr: PermAddr,
        aux_id: AuxId,
        raw: Value,
    },
    DevNetChanging {
        netcore: String,
        perm_addr: PermAddr,
        delta: Delta,
    },

    // ── Reporting ────────────────────────────────────────────────────
    DevReporting {
        netcore: String,
        perm_addr: PermAddr,
        delta: Value,
    },
    GadReporting {
        netcore: String,
        perm_addr: PermAddr,
        aux_id: AuxId,
        delta: Value,
    },

    // ── Banned variants ──────────────────────────────────────────────
    BannedDevIncoming {
        netcore: String,
        perm_addr: PermAddr,
        raw: Value,
    },
    BannedDevReporting {
        netcore: String,
        perm_addr: PermAddr,
        delta: Value,
    },
    BannedGadIncoming {
        netcore: String,
        perm_addr: PermAddr,
        aux_id: AuxId,
        raw: Value,
    },
    BannedGadReporting {
        netcore: String,
        perm_addr: PermAddr,
        aux_id: AuxId,
        delta: Value,
    },

    // ── Per-operation results ────────────────────────────────────────
    NetPing {
        netcore: String,
        perm_addr: PermAddr,
        time_ms: u32,
    },
    NetBan {
        netcore: String,
        perm_addr: PermAddr,
    },
    NetUnban {
        netcore: String,
        perm_addr: PermAddr,
    },
    DevRead {
        netcore: String,
        perm_addr: PermAddr,
        data: Delta,
    },
    DevWrite {
        netcore: String,
        perm_addr: PermAddr,
        data: Delta,
    },
    DevIdentify {
        netcore: String,
        perm_addr: PermAddr,
    },
    GadRead {
        netcore: String,
        perm_addr: PermAddr,
        aux_id: AuxId,
        data: Delta,
    },
    GadWrite {
        netcore: String,
        perm_addr: PermAddr,
        aux_id: AuxId,
        data: Delta,
    },
    GadExec {
        netcore: String,
        perm_addr: PermAddr,
        aux_id: AuxId,
        data: Delta,
    },
    GadSetReportCfg {
        netcore: String,
        perm_addr: PermAddr,
        aux_id: AuxId,
        data: Delta,
    },
    GadGetReportCfg {
        netcore: String,
        perm_addr: PermAddr,
        aux_id: AuxId,
        data: Delta,
    },

    // ── Entity change notifications ──────────────────────────────────
    DevNetChanged {
        netcore: String,
        perm_addr: PermAddr,
        delta: Delta,
    },
    DevPropsChanged {
        netcore: String,
        perm_addr: PermAddr,
        delta: Delta,
    },
    DevAttrsChanged {
        netcore: String,
        perm_addr: PermAddr,
        delta: Delta,
    },
    GadPanelChanged {
        netcore: String,
        perm_addr: PermAddr,
        aux_id: AuxId,
        delta: Delta,
    },
    GadPropsChanged {
        netcore: String,
        perm_addr: PermAddr,
        aux_id: AuxId,
        delta: Delta,
    },
    GadAttrsChanged {
        netcore: String,
        perm_addr: PermAddr,
        aux_id: AuxId,
        delta: Delta,
    },

    // ── Errors ───────────────────────────────────────────────────────
    NetError {
        netcore: String,
        operation: String,
        args: Value,
        message: String,
    },
}

impl CoreEvent {
    /// Namespaced wire name of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Stopped { .. } => "stopped",
            Self::Enabled { .. } => "enabled",
            Self::Disabled { .. } => "disabled",
            Self::Ready { .. } => "ready",
            Self::PermitJoin { .. } => "permitJoin",
            Self::DevIncoming { .. } => "devIncoming",
            Self::DevLeaving { .. } => "devLeaving",
            Self::GadIncoming { .. } => "gadIncoming",
            Self::DevNetChanging { .. } => "devNetChanging",
            Self::DevReporting { .. } => "devReporting",
            Self::GadReporting { .. } => "gadReporting",
            Self::BannedDevIncoming { .. } => "bannedDevIncoming",
            Self::BannedDevReporting { .. } => "bannedDevReporting",
            Self::BannedGadIncoming { .. } => "bannedGadIncoming",
            Self::BannedGadReporting { .. } => "bannedGadReporting",
            Self::NetPing { .. } => "netPing",
            Self::NetBan { .. } => "netBan",
            Self::NetUnban { .. } => "netUnban",
            Self::DevRead { .. } => "devRead",
            Self::DevWrite { .. } => "devWrite",
            Self::DevIdentify { .. } => "devIdentify",
            Self::GadRead { .. } => "gadRead",
            Self::GadWrite { .. } => "gadWrite",
            Self::GadExec { .. } => "gadExec",
            Self::GadSetReportCfg { .. } => "gadSetReportCfg",
            Self::GadGetReportCfg { .. } => "gadGetReportCfg",
            Self::DevNetChanged { .. } => "devNetChanged",
            Self::DevPropsChanged { .. } => "devPropsChanged",
            Self::DevAttrsChanged { .. } => "devAttrsChanged",
            Self::GadPanelChanged { .. } => "gadPanelChanged",
            Self::GadPropsChanged { .. } => "gadPropsChanged",
            Self::GadAttrsChanged { .. } => "gadAttrsChanged",
            Self::NetError { .. } => "netError",
        }
    }

    /// Name of the netcore this event originated from.
    pub fn netcore(&self) -> &str {
        match self {
            Self::Started { netcore }
            | Self::Stopped { netcore }
            | Self::Enabled { netcore }
            | Self::Disabled { netcore }
            | Self::Ready { netcore }
            | Self::PermitJoin { netcore, .. }
            | Self::DevIncoming { netcore, .. }
            | Self::DevLeaving { netcore, .. }
            | Self::GadIncoming { netcore, .. }
            | Self::DevNetChanging { netcore, .. }
            | Self::DevReporting { netcore, .. }
            | Self::GadReporting { netcore, .. }
            | Self::BannedDevIncoming { netcore, .. }
            | Self::BannedDevReporting { netcore, .. }
            | Self::BannedGadIncoming { netcore, .. }
            | Self::BannedGadReporting { netcore, .. }
            | Self::NetPing { netcore, .. }
            | Self::NetBan { netcore, .. }
            | Self::NetUnban { netcore, .. }
            | Self::DevRead { netcore, .. }
            | Self::DevWrite { netcore, .. }
            | Self::DevIdentify { netcore, .. }
            | Self::GadRead { netcore, .. }
            | Self::GadWrite { netcore, .. }
            | Self::GadExec { netcore, .. }
            | Self::GadSetReportCfg { netcore, .. }
            | Self::GadGetReportCfg { netcore, .. }
            | Self::DevNetChanged { netcore, .. }
            | Self::DevPropsChanged { netcore, .. }
            | Self::DevAttrsChanged { netcore, .. }
            | Self::GadPanelChanged { netcore, .. }
            | Self::GadPropsChanged { netcore, .. }
            | Self::GadAttrsChanged { netcore, .. }
            | Self::NetError { netcore, .. } => netcore,
        }
    }
}

// ── Subscription ────────────────────────────────────────────────────

/// A subscription to a NetCore's event feed.
///
/// Backed by a broadcast receiver; a subscriber that falls behind the
/// channel capacity skips the lag gap rather than erroring out.
pub struct EventStream {
    receiver: broadcast::Receiver<Arc<CoreEvent>>,
}

impl EventStream {
    pub(crate) fn new(receiver: broadcast::Receiver<Arc<CoreEvent>>) -> Self {
        Self { receiver }
    }

    /// Wait for the next event. Returns `None` once the NetCore is gone.
    pub async fn recv(&mut self) -> Option<Arc<CoreEvent>> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take an already-buffered event without waiting, or `None` when
    /// the buffer is empty.
    pub fn try_recv(&mut self) -> Option<Arc<CoreEvent>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return None,
            }
        }
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> CoreEventStream {
        CoreEventStream {
            inner: BroadcastStream::new(self.receiver),
        }
    }
}

/// `Stream` adapter over the broadcast receiver; lag gaps are skipped.
pub struct CoreEventStream {
    inner: BroadcastStream<Arc<CoreEvent>>,
}

impl Stream for CoreEventStream {
    type Item = Arc<CoreEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => return Poll::Ready(Some(event)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(_)))) => {}
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_wire_names() {
        let event = CoreEvent::NetBan {
            netcore: "zb0".into(),
            perm_addr: PermAddr::new("0xABCD"),
        };
        assert_eq!(event.kind(), "netBan");

        let event = CoreEvent::PermitJoin {
            netcore: "zb0".into(),
            time_left: 3,
        };
        assert_eq!(event.kind(), "permitJoin");
    }

    #[test]
    fn netcore_accessor_reaches_every_variant() {
        let event = CoreEvent::GadExec {
            netcore: "ble0".into(),
            perm_addr: PermAddr::new("0x01"),
            aux_id: AuxId::from(2),
            data: Delta::new(),
        };
        assert_eq!(event.netcore(), "ble0");
    }
}
