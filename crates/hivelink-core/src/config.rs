// ── Runtime netcore configuration ──
//
// Tuning knobs for a single NetCore instance. The owning application
// constructs a `NetCoreConfig` and hands it in -- the core never reads
// config files.

/// Configuration for a single [`NetCore`](crate::NetCore).
#[derive(Debug, Clone)]
pub struct NetCoreConfig {
    /// Join window length used when `permit_join` is called without an
    /// explicit duration (seconds).
    pub default_join_time_secs: u32,
    /// Capacity of the event broadcast channel. Slow subscribers that
    /// fall more than this many events behind observe a lag gap.
    pub event_capacity: usize,
}

impl Default for NetCoreConfig {
    fn default() -> Self {
        Self {
            default_join_time_secs: 180,
            event_capacity: 256,
        }
    }
}
