// hivelink-core: Coordination layer between vendor protocol drivers and
// the registry that owns durable identity. No network I/O happens here.

pub mod config;
pub mod diff;
pub mod driver;
pub mod error;
pub mod event;
pub mod model;
pub mod netcore;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::NetCoreConfig;
pub use driver::{
    DevDrivers, DriverCategory, DriverTable, GadDrivers, NetDrivers, ResetMode,
};
pub use error::{CoreError, DriverError};
pub use event::{CoreEvent, CoreEventStream, Delta, EventStream};
pub use netcore::{NetCore, NetCoreSnapshot};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    // Core entities
    AuxId, DevStatus, Device, Gadget, PermAddr, ProtocolInfo,
    // Patches
    DevAttrsPatch, DevNetPatch, DevPropsPatch, GadPanelPatch, GadPropsPatch,
    // Supporting types
    Direction, GadLink, Traffic, TrafficRecord,
};
