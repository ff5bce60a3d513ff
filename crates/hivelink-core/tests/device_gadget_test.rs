// End-to-end tests for Device and Gadget delegation: operations route
// by permanent address through the owning NetCore, and every gate fires
// before any driver is touched.

#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::{Map, json};

use hivelink_core::driver::{
    dev_read_fn, dev_write_fn, gad_read_fn, gad_write_fn, net_addr_fn, net_ctl_fn, net_join_fn,
    net_ping_fn, net_reset_fn,
};
use hivelink_core::{
    AuxId, CoreError, CoreEvent, DevAttrsPatch, DevDrivers, Device, EventStream, GadDrivers,
    Gadget, NetCore, NetDrivers, PermAddr, ProtocolInfo,
};

// ── Helpers ─────────────────────────────────────────────────────────

const ADDR: &str = "0x00124b0001ce4b89";

async fn started_core() -> NetCore {
    let core = NetCore::new("mock0", ProtocolInfo::new("ieee802.15.4", "zigbee")).unwrap();
    core.register_net_drivers(NetDrivers {
        start: Some(net_ctl_fn(|| async { Ok(()) })),
        stop: Some(net_ctl_fn(|| async { Ok(()) })),
        reset: Some(net_reset_fn(|_| async { Ok(()) })),
        permit_join: Some(net_join_fn(|_| async { Ok(()) })),
        remove: Some(net_addr_fn(|_| async { Ok(()) })),
        ping: Some(net_ping_fn(|_| async { Ok(8) })),
        ban: None,
        unban: None,
    });
    core.register_dev_drivers(DevDrivers {
        read: Some(dev_read_fn(|_, _| async { Ok(json!(21.5)) })),
        write: Some(dev_write_fn(|_, _, _| async { Ok(None) })),
        identify: None,
    });
    core.register_gad_drivers(GadDrivers {
        read: Some(gad_read_fn(|_, _, _| async { Ok(json!("on")) })),
        write: Some(gad_write_fn(|_, _, _, _| async { Ok(None) })),
        exec: None,
        set_report_cfg: None,
        get_report_cfg: None,
    });
    core.start().await.unwrap();
    core
}

fn enabled_device(core: &NetCore) -> Arc<Device> {
    let dev = Arc::new(Device::new(core.clone(), PermAddr::new(ADDR)).unwrap());
    dev.enable();
    dev
}

fn drain(events: &mut EventStream) -> Vec<Arc<CoreEvent>> {
    let mut out = Vec::new();
    while let Some(event) = events.try_recv() {
        out.push(event);
    }
    out
}

// ── Device operations ───────────────────────────────────────────────

#[tokio::test]
async fn device_read_routes_by_permanent_address() {
    let core = started_core().await;
    let seen = Arc::new(Mutex::new(None));
    let capture = Arc::clone(&seen);
    core.register_dev_drivers(DevDrivers {
        read: Some(dev_read_fn(move |addr, attr| {
            let capture = Arc::clone(&capture);
            async move {
                *capture.lock().unwrap() = Some((addr.as_str().to_owned(), attr));
                Ok(json!(42))
            }
        })),
        ..DevDrivers::default()
    });

    let dev = enabled_device(&core);
    assert!(dev.last_seen().is_none());

    let value = dev.read("humidity").await.unwrap();

    assert_eq!(value, json!(42));
    assert_eq!(
        *seen.lock().unwrap(),
        Some((ADDR.to_owned(), "humidity".to_owned()))
    );
    assert!(dev.last_seen().is_some());
}

#[tokio::test]
async fn disabled_device_refuses_before_any_driver_call() {
    let core = started_core().await;
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    core.register_dev_drivers(DevDrivers {
        read: Some(dev_read_fn(move |_, _| {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(json!(0))
            }
        })),
        ..DevDrivers::default()
    });

    let dev = Arc::new(Device::new(core.clone(), PermAddr::new(ADDR)).unwrap());

    let err = dev.read("humidity").await.unwrap_err();

    assert!(matches!(err, CoreError::DevNotEnabled { .. }));
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert!(dev.last_seen().is_none());
}

#[tokio::test]
async fn stopped_core_refuses_device_operations() {
    let core = started_core().await;
    let dev = enabled_device(&core);
    core.stop().await.unwrap();

    let err = dev.write("setpoint", json!(19)).await.unwrap_err();

    assert!(matches!(err, CoreError::NotEnabled { .. }));
}

#[tokio::test]
async fn device_ping_reports_round_trip_time() {
    let core = started_core().await;
    let dev = enabled_device(&core);

    assert_eq!(dev.ping().await.unwrap(), 8);
}

#[tokio::test]
async fn device_identify_without_driver_is_not_implemented() {
    let core = started_core().await;
    let dev = enabled_device(&core);

    let err = dev.identify().await.unwrap_err();

    assert!(matches!(
        err,
        CoreError::DriverNotImplemented { name: "identify", .. }
    ));
}

#[tokio::test]
async fn repeated_set_attrs_announces_once() {
    let core = started_core().await;
    let dev = enabled_device(&core);
    let mut events = core.subscribe();

    dev.set_attrs(DevAttrsPatch {
        manufacturer: Some("acme".into()),
        ..DevAttrsPatch::default()
    });
    dev.set_attrs(DevAttrsPatch {
        manufacturer: Some("acme".into()),
        ..DevAttrsPatch::default()
    });

    let changed: Vec<_> = drain(&mut events)
        .into_iter()
        .filter(|e| e.kind() == "devAttrsChanged")
        .collect();
    assert_eq!(changed.len(), 1);
}

#[tokio::test]
async fn device_enable_announces_the_flag_once() {
    let core = started_core().await;
    let dev = Arc::new(Device::new(core.clone(), PermAddr::new(ADDR)).unwrap());
    let mut events = core.subscribe();

    dev.enable();
    dev.enable();

    let got = drain(&mut events);
    assert_eq!(got.len(), 1);
    match &*got[0] {
        CoreEvent::DevNetChanged { delta, .. } => {
            assert_eq!(delta.get("enabled"), Some(&json!(true)));
        }
        other => panic!("expected devNetChanged, got {other:?}"),
    }
}

// ── Gadget operations ───────────────────────────────────────────────

#[tokio::test]
async fn gadget_operations_resolve_address_through_the_device() {
    let core = started_core().await;
    let seen = Arc::new(Mutex::new(None));
    let capture = Arc::clone(&seen);
    core.register_gad_drivers(GadDrivers {
        read: Some(gad_read_fn(move |addr, aux, attr| {
            let capture = Arc::clone(&capture);
            async move {
                *capture.lock().unwrap() = Some((addr.as_str().to_owned(), aux, attr));
                Ok(json!(17))
            }
        })),
        ..GadDrivers::default()
    });

    let dev = enabled_device(&core);
    let gad = Gadget::new(Arc::clone(&dev), AuxId::from(5)).unwrap();
    gad.enable();

    let value = gad.read("sensorValue").await.unwrap();

    assert_eq!(value, json!(17));
    assert_eq!(
        *seen.lock().unwrap(),
        Some((ADDR.to_owned(), AuxId::from(5), "sensorValue".to_owned()))
    );
}

#[tokio::test]
async fn gadget_exec_without_driver_fails_and_stays_silent() {
    let core = started_core().await;
    let dev = enabled_device(&core);
    let gad = Gadget::new(Arc::clone(&dev), AuxId::from(5)).unwrap();
    gad.enable();
    let mut events = core.subscribe();

    let err = gad.exec("blink", vec![json!(1), json!(2)]).await.unwrap_err();

    assert!(matches!(
        err,
        CoreError::DriverNotImplemented { name: "exec", .. }
    ));
    assert!(
        drain(&mut events)
            .iter()
            .all(|e| e.kind() != "gadExec"),
        "no gadExec event may fire when the driver is unbound"
    );
}

#[tokio::test]
async fn disabled_gadget_refuses_operations() {
    let core = started_core().await;
    let dev = enabled_device(&core);
    let gad = Gadget::new(Arc::clone(&dev), AuxId::from(5)).unwrap();

    let err = gad.read("sensorValue").await.unwrap_err();

    assert!(matches!(err, CoreError::GadNotEnabled { .. }));
}

#[tokio::test]
async fn gadget_write_falls_back_to_the_written_value() {
    let core = started_core().await;
    let dev = enabled_device(&core);
    let gad = Gadget::new(Arc::clone(&dev), AuxId::from(2)).unwrap();
    gad.enable();
    let mut events = core.subscribe();

    let result = gad.write("onOff", json!(true)).await.unwrap();

    assert_eq!(result, json!(true));
    let got = drain(&mut events);
    match &*got[0] {
        CoreEvent::GadWrite { aux_id, data, .. } => {
            assert_eq!(aux_id, &AuxId::from(2));
            assert_eq!(data.get("onOff"), Some(&json!(true)));
        }
        other => panic!("expected gadWrite, got {other:?}"),
    }
}

#[tokio::test]
async fn gadget_report_cfg_without_driver_is_not_implemented() {
    let core = started_core().await;
    let dev = enabled_device(&core);
    let gad = Gadget::new(Arc::clone(&dev), AuxId::from(2)).unwrap();
    gad.enable();

    let mut cfg = Map::new();
    cfg.insert("minIntervalSecs".to_owned(), json!(10));
    let err = gad
        .set_report_cfg("sensorValue", cfg.into())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::DriverNotImplemented { name: "setReportCfg", .. }
    ));

    let err = gad.get_report_cfg("sensorValue").await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::DriverNotImplemented { name: "getReportCfg", .. }
    ));
}
