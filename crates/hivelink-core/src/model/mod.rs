// ── Domain model ──
//
// The entities the coordination layer reasons about. A NetCore announces
// raw observations; the external registry reacts by instantiating the
// Device and Gadget types here and keeps them current through the
// patch-and-diff setters.

pub mod common;
pub mod device;
pub mod gadget;

// ── Re-exports ──────────────────────────────────────────────────────
// Flat access: `use hivelink_core::model::*` gives you everything.

// Core identity
pub use common::{AuxId, PermAddr, ProtocolInfo};

// Common building blocks
pub use common::{DevStatus, Direction, Traffic, TrafficRecord};

// Device
pub use device::{
    AddrPair, DevAttrs, DevAttrsPatch, DevNetInfo, DevNetPatch, DevProps, DevPropsPatch, Device,
    DeviceSnapshot, GadLink, PowerInfo, VersionInfo,
};

// Gadget
pub use gadget::{GadPanel, GadPanelPatch, GadProps, GadPropsPatch, Gadget, GadgetSnapshot};
