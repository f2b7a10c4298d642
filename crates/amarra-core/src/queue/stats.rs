use serde::Serialize;

/// Read-only engine health snapshot. Never mutates state; safe to request
/// concurrently at any time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub running: bool,
    /// Number of topics with an active subscription.
    pub subscriptions: usize,
    /// Whether the backing store answered a liveness probe.
    pub store_healthy: bool,
}
