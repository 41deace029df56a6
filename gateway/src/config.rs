use serde::Serialize;

const DEFAULT_UPDATES_BROADCAST_BUFFER: usize = 256;
const DEFAULT_MAX_ROOMS: usize = 10_000;

/// Tunables for the in-memory store.
///
/// `None` fields fall back to the defaults above; the struct is serializable
/// so deployments can log their effective configuration.
#[derive(Clone, Debug, Serialize)]
pub struct GatewayConfig {
    /// Capacity of each room's snapshot broadcast channel. Slow subscribers
    /// falling more than this far behind observe a lag and must re-sync via
    /// a fresh read.
    pub updates_broadcast_buffer: Option<usize>,
    /// Upper bound on concurrently live rooms.
    pub max_rooms: Option<usize>,
    /// Reject mutations whose merged record fails invariant validation.
    /// When disabled the violation is logged and committed anyway.
    pub enforce_invariant_validation: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            updates_broadcast_buffer: Some(DEFAULT_UPDATES_BROADCAST_BUFFER),
            max_rooms: Some(DEFAULT_MAX_ROOMS),
            enforce_invariant_validation: true,
        }
    }
}

impl GatewayConfig {
    pub fn updates_broadcast_capacity(&self) -> usize {
        self.updates_broadcast_buffer
            .unwrap_or(DEFAULT_UPDATES_BROADCAST_BUFFER)
            .max(1)
    }

    pub fn max_rooms(&self) -> usize {
        self.max_rooms.unwrap_or(DEFAULT_MAX_ROOMS).max(1)
    }
}
