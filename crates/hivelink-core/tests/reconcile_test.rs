// Integration tests for the gate-and-announce reconciliation protocol:
// enablement gating, blacklist routing, and the banned event variants.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use serde_json::json;

use hivelink_core::driver::{
    dev_read_fn, dev_write_fn, gad_read_fn, gad_write_fn, net_addr_fn, net_ctl_fn, net_join_fn,
    net_ping_fn, net_reset_fn,
};
use hivelink_core::{
    AuxId, CoreEvent, DevDrivers, Delta, EventStream, GadDrivers, NetCore, NetDrivers, PermAddr,
    ProtocolInfo,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn started_core() -> NetCore {
    let core = NetCore::new("mock0", ProtocolInfo::new("ieee802.15.4", "zigbee")).unwrap();
    core.register_net_drivers(NetDrivers {
        start: Some(net_ctl_fn(|| async { Ok(()) })),
        stop: Some(net_ctl_fn(|| async { Ok(()) })),
        reset: Some(net_reset_fn(|_| async { Ok(()) })),
        permit_join: Some(net_join_fn(|_| async { Ok(()) })),
        remove: Some(net_addr_fn(|_| async { Ok(()) })),
        ping: Some(net_ping_fn(|_| async { Ok(1) })),
        ban: None,
        unban: None,
    });
    core.register_dev_drivers(DevDrivers {
        read: Some(dev_read_fn(|_, _| async { Ok(json!(0)) })),
        write: Some(dev_write_fn(|_, _, _| async { Ok(None) })),
        identify: None,
    });
    core.register_gad_drivers(GadDrivers {
        read: Some(gad_read_fn(|_, _, _| async { Ok(json!(0)) })),
        write: Some(gad_write_fn(|_, _, _, _| async { Ok(None) })),
        exec: None,
        set_report_cfg: None,
        get_report_cfg: None,
    });
    core.start().await.unwrap();
    core
}

fn drain(events: &mut EventStream) -> Vec<Arc<CoreEvent>> {
    let mut out = Vec::new();
    while let Some(event) = events.try_recv() {
        out.push(event);
    }
    out
}

fn kinds(events: &[Arc<CoreEvent>]) -> Vec<&'static str> {
    events.iter().map(|e| e.kind()).collect()
}

// ── Enablement gating ───────────────────────────────────────────────

#[tokio::test]
async fn commits_are_silent_noops_while_disabled() {
    let core = started_core().await;
    core.stop().await.unwrap();
    let mut events = core.subscribe();

    assert!(!core.commit_dev_incoming(PermAddr::new("0x01"), json!({})));
    assert!(!core.commit_gad_incoming(PermAddr::new("0x01"), AuxId::from(1), json!({})));
    assert!(!core.commit_dev_reporting(PermAddr::new("0x01"), json!({})));
    assert!(!core.commit_gad_reporting(PermAddr::new("0x01"), AuxId::from(1), json!({})));
    assert!(!core.commit_dev_leaving(PermAddr::new("0x01")));
    assert!(!core.commit_dev_net_changing(PermAddr::new("0x01"), Delta::new()));
    assert!(!core.commit_ready());

    assert!(drain(&mut events).is_empty());
}

// ── Blacklist routing ───────────────────────────────────────────────

#[tokio::test]
async fn clean_addresses_commit_and_announce_normal_variants() {
    let core = started_core().await;
    let mut events = core.subscribe();
    let addr = PermAddr::new("0x00124b0001ce4b89");

    assert!(core.commit_dev_incoming(addr.clone(), json!({ "ep": [1, 2] })));
    assert!(core.commit_gad_incoming(addr.clone(), AuxId::from(1), json!({})));
    assert!(core.commit_dev_reporting(addr.clone(), json!({ "manufacturer": "acme" })));
    assert!(core.commit_gad_reporting(addr.clone(), AuxId::from(1), json!({ "onOff": true })));

    assert_eq!(
        kinds(&drain(&mut events)),
        vec!["devIncoming", "gadIncoming", "devReporting", "gadReporting"]
    );
}

#[tokio::test]
async fn banned_addresses_are_gated_and_announced_as_banned() {
    let core = started_core().await;
    let addr = PermAddr::new("0xBAD");
    core.ban(addr.clone()).await.unwrap();
    let mut events = core.subscribe();

    assert!(!core.commit_dev_incoming(addr.clone(), json!({})));
    assert!(!core.commit_gad_incoming(addr.clone(), AuxId::from(7), json!({})));
    assert!(!core.commit_dev_reporting(addr.clone(), json!({})));
    assert!(!core.commit_gad_reporting(addr.clone(), AuxId::from(7), json!({})));

    assert_eq!(
        kinds(&drain(&mut events)),
        vec![
            "bannedDevIncoming",
            "bannedGadIncoming",
            "bannedDevReporting",
            "bannedGadReporting"
        ]
    );
}

#[tokio::test]
async fn banned_and_clean_addresses_route_independently() {
    let core = started_core().await;
    core.ban(PermAddr::new("0xBAD")).await.unwrap();
    let mut events = core.subscribe();

    assert!(core.commit_dev_incoming(PermAddr::new("0xGOOD"), json!({})));
    assert!(!core.commit_dev_incoming(PermAddr::new("0xBAD"), json!({})));

    assert_eq!(
        kinds(&drain(&mut events)),
        vec!["devIncoming", "bannedDevIncoming"]
    );
}

#[tokio::test]
async fn leaving_is_announced_even_for_banned_addresses() {
    let core = started_core().await;
    let addr = PermAddr::new("0xBAD");
    core.ban(addr.clone()).await.unwrap();
    let mut events = core.subscribe();

    assert!(core.commit_dev_leaving(addr));

    assert_eq!(kinds(&drain(&mut events)), vec!["devLeaving"]);
}

#[tokio::test]
async fn net_changing_is_gated_on_enablement_only() {
    let core = started_core().await;
    let addr = PermAddr::new("0xBAD");
    core.ban(addr.clone()).await.unwrap();
    let mut events = core.subscribe();

    let mut delta = Delta::new();
    delta.insert("role".to_owned(), json!("router"));
    assert!(core.commit_dev_net_changing(addr, delta));

    let got = drain(&mut events);
    assert_eq!(kinds(&got), vec!["devNetChanging"]);
    match &*got[0] {
        CoreEvent::DevNetChanging { delta, .. } => {
            assert_eq!(delta.get("role"), Some(&json!("router")));
        }
        other => panic!("expected devNetChanging, got {other:?}"),
    }
}

#[tokio::test]
async fn ready_announces_once_the_core_is_up() {
    let core = started_core().await;
    let mut events = core.subscribe();

    assert!(core.commit_ready());

    assert_eq!(kinds(&drain(&mut events)), vec!["ready"]);
}

#[tokio::test]
async fn incoming_payload_reaches_the_subscriber_intact() {
    let core = started_core().await;
    let mut events = core.subscribe();
    let raw = json!({ "endpoints": [1, 2, 3], "vendor": { "mfr": "acme" } });

    assert!(core.commit_dev_incoming(PermAddr::new("0x42"), raw.clone()));

    let got = drain(&mut events);
    match &*got[0] {
        CoreEvent::DevIncoming {
            netcore,
            perm_addr,
            raw: payload,
        } => {
            assert_eq!(netcore, "mock0");
            assert_eq!(perm_addr.as_str(), "0x42");
            assert_eq!(payload, &raw);
        }
        other => panic!("expected devIncoming, got {other:?}"),
    }
}
