use std::time::{Duration, Instant};

/// Represents a connected datanode and what the namenode has observed about
/// it. The record survives reconnects from the same id.
#[derive(Debug, Clone)]
pub struct DatanodeDetail {
    pub id: String,
    /// flips once the first directory listing from this node was accepted
    pub listed: bool,
    /// cumulative bytes of distinct placements observed on this node
    pub size: u64,
    pub hearbeat_instant: Instant,
}

impl DatanodeDetail {
    pub fn new(id: String) -> Self {
        Self {
            id,
            listed: false,
            size: 0,
            hearbeat_instant: Instant::now(),
        }
    }
    pub fn mark_heartbeat(&mut self) {
        self.hearbeat_instant = Instant::now();
    }
    pub fn mark_listed(&mut self) {
        self.listed = true;
    }
    pub fn record_placement(&mut self, size: u64) {
        self.size += size;
    }
    pub fn is_active(&self, liveness_timeout: Duration) -> bool {
        self.hearbeat_instant.elapsed() <= liveness_timeout
    }
}
