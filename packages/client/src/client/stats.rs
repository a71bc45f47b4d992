//! Pool telemetry snapshots.

/// Point-in-time view of the connection pool.
///
/// Counters are cumulative since the client was created; `idle` and `active`
/// are live totals. A quiescent client upholds
/// `connections_created == closes + idle` and `active == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Checkout attempts, whether satisfied from idle, by dialing, or queued.
    pub checkouts: u64,
    /// Connections actually dialed.
    pub connections_created: u64,
    /// Checkouts satisfied by an idle or handed-off connection.
    pub connections_reused: u64,
    /// Connections returned after a completed exchange.
    pub releases: u64,
    /// Connections closed for any reason.
    pub closes: u64,
    /// Idle connections evicted by the background sweep.
    pub evicted_idle: u64,
    /// Connections currently parked idle.
    pub idle: usize,
    /// Connections currently checked out.
    pub active: usize,
}

impl PoolStats {
    /// Total connections currently open.
    #[must_use]
    pub fn live_connections(&self) -> usize {
        self.idle + self.active
    }
}
