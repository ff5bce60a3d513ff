// ── Core error types ──
//
// User-facing errors from hivelink-core. These are NOT protocol-specific --
// consumers never see radio stack or transport failures directly. The
// `From<DriverError>` impl translates driver-layer failures into the
// domain-level variant.

use thiserror::Error;

use crate::driver::DriverCategory;

/// Failure reported by a vendor driver.
///
/// The only error type a driver can hand back through its future. Carries
/// a free-form message because the core neither interprets nor retries
/// driver failures -- it surfaces them and mirrors them as error events.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DriverError {
    pub message: String,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<&str> for DriverError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for DriverError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Boundary errors (synchronous, before any driver is touched) ──
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    // ── Gating errors ────────────────────────────────────────────────
    #[error("Netcore {name} is not enabled")]
    NotEnabled { name: String },

    #[error("Device {perm_addr} is not enabled")]
    DevNotEnabled { perm_addr: String },

    #[error("Gadget {perm_addr}/{aux_id} is not enabled")]
    GadNotEnabled { perm_addr: String, aux_id: String },

    // ── Driver-table errors ──────────────────────────────────────────
    #[error("Missing mandatory drivers: {}", missing.join(", "))]
    MissingDrivers { missing: Vec<&'static str> },

    #[error("Driver not implemented: {category}.{name}")]
    DriverNotImplemented {
        category: DriverCategory,
        name: &'static str,
    },

    // ── Driver failures (wrapped, not exposed raw) ───────────────────
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),
}

impl CoreError {
    /// Shorthand for an [`InvalidArgument`](Self::InvalidArgument) error.
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}
