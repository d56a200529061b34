// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

//! Flow statistics feeding the hot region balancers.

mod hot_cache;

pub use self::hot_cache::HotSpotCache;

use std::time::Instant;

use crate::RegionInfo;

/// The heartbeat report interval of a region, in seconds. Used to derive
/// a flow rate from the first heartbeat of a region, before an observed
/// interval exists.
pub const REGION_HEARTBEAT_REPORT_INTERVAL: u64 = 60;

/// The two flow channels tracked independently by the hot spot cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
    Write,
    Read,
}

impl FlowKind {
    pub fn label(self) -> &'static str {
        match self {
            FlowKind::Write => "write",
            FlowKind::Read => "read",
        }
    }
}

/// A fixed ring of recent flow samples used to smooth a region's rate.
#[derive(Clone, Debug)]
pub struct RollingStats {
    samples: Vec<f64>,
    cap: usize,
    // Slot the next sample overwrites once the ring is full.
    next: usize,
}

impl RollingStats {
    pub fn new(cap: usize) -> RollingStats {
        assert!(cap > 0);
        RollingStats {
            samples: Vec::with_capacity(cap),
            cap,
            next: 0,
        }
    }

    pub fn add(&mut self, sample: f64) {
        if self.samples.len() < self.cap {
            self.samples.push(sample);
        } else {
            self.samples[self.next] = sample;
            self.next = (self.next + 1) % self.cap;
        }
    }

    pub fn average(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    pub fn std_deviation(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mean = self.average();
        let variance = self
            .samples
            .iter()
            .map(|s| (s - mean) * (s - mean))
            .sum::<f64>()
            / self.samples.len() as f64;
        variance.sqrt()
    }
}

/// Hot state of one region on one flow channel. Returned stats are shared
/// with schedulers; they treat them as read-only.
#[derive(Clone, Debug)]
pub struct RegionStat {
    pub region_id: u64,
    /// Store of the region leader at observation time.
    pub store_id: u64,
    /// Flow rate of the last observation, bytes per second.
    pub flow_bytes: u64,
    /// Successive observations the region has been seen by the cache;
    /// climbs while the region stays hot, decays one per cold one.
    pub hot_degree: i64,
    /// Cold observations left before the region is dropped.
    pub anti_count: i64,
    pub last_update_time: Instant,
    pub stats: Option<RollingStats>,
}

impl RegionStat {
    pub fn new(region: &RegionInfo, flow_bytes: u64, anti_count: i64) -> RegionStat {
        RegionStat {
            region_id: region.id,
            store_id: region.leader_store_id,
            flow_bytes,
            hot_degree: 0,
            anti_count,
            last_update_time: Instant::now(),
            stats: None,
        }
    }
}

/// Cluster-wide flow totals, bytes per second, as aggregated by the
/// store statistics living outside this crate. The hot spot cache only
/// reads them to size its adaptive thresholds.
#[derive(Clone, Copy, Debug, Default)]
pub struct StoresStats {
    total_bytes_write_rate: f64,
    total_bytes_read_rate: f64,
}

impl StoresStats {
    pub fn new(total_bytes_write_rate: f64, total_bytes_read_rate: f64) -> StoresStats {
        StoresStats {
            total_bytes_write_rate,
            total_bytes_read_rate,
        }
    }

    pub fn total_bytes_write_rate(&self) -> f64 {
        self.total_bytes_write_rate
    }

    pub fn total_bytes_read_rate(&self) -> f64 {
        self.total_bytes_read_rate
    }
}
