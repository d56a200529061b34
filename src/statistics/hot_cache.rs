// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use std::cmp;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::seq::SliceRandom;

use super::{
    FlowKind, RegionStat, RollingStats, StoresStats, REGION_HEARTBEAT_REPORT_INTERVAL,
};
use crate::cache::TwoQueueCache;
use crate::metrics::{HOT_CACHE_EVENT_COUNTER_VEC, HOT_CACHE_STATUS_GAUGE_VEC};
use crate::RegionInfo;

const STAT_CACHE_MAX_LEN: usize = 1000;
const HOT_WRITE_REGION_MIN_FLOW_RATE: u64 = 16 * 1024;
const HOT_READ_REGION_MIN_FLOW_RATE: u64 = 128 * 1024;
// Reports arriving closer together than this carry too much noise to
// re-rate a region.
const MIN_HOT_REGION_REPORT_INTERVAL: u64 = 3;
const HOT_REGION_ANTI_COUNT: i64 = 1;
const ROLLING_WINDOWS_SIZE: usize = 5;

/// A cache holding the write hot and read hot regions of the cluster.
/// The two flow channels are tracked independently; an update to one
/// never orders with an update to the other.
pub struct HotSpotCache {
    write_flow: TwoQueueCache<Arc<RegionStat>>,
    read_flow: TwoQueueCache<Arc<RegionStat>>,
    // Lifts the report interval check; only the simulator turns it on,
    // where heartbeats arrive on accelerated time.
    simulating: AtomicBool,
}

impl Default for HotSpotCache {
    fn default() -> HotSpotCache {
        HotSpotCache::new()
    }
}

impl HotSpotCache {
    pub fn new() -> HotSpotCache {
        HotSpotCache {
            write_flow: TwoQueueCache::new(STAT_CACHE_MAX_LEN),
            read_flow: TwoQueueCache::new(STAT_CACHE_MAX_LEN),
            simulating: AtomicBool::new(false),
        }
    }

    pub fn set_simulating(&self, simulating: bool) {
        self.simulating.store(simulating, Ordering::Relaxed);
    }

    fn flow_cache(&self, kind: FlowKind) -> &TwoQueueCache<Arc<RegionStat>> {
        match kind {
            FlowKind::Write => &self.write_flow,
            FlowKind::Read => &self.read_flow,
        }
    }

    /// Checks the write flow of a region heartbeat. Returns whether the
    /// cache needs an update and, if so, the item to apply: a new stat to
    /// insert, or `None` to drop the region.
    pub fn check_write(
        &self,
        region: &RegionInfo,
        stats: &StoresStats,
    ) -> (bool, Option<RegionStat>) {
        self.check(region, region.bytes_written, stats, FlowKind::Write)
    }

    /// The read flow counterpart of [`check_write`](Self::check_write).
    pub fn check_read(
        &self,
        region: &RegionInfo,
        stats: &StoresStats,
    ) -> (bool, Option<RegionStat>) {
        self.check(region, region.bytes_read, stats, FlowKind::Read)
    }

    fn check(
        &self,
        region: &RegionInfo,
        bytes: u64,
        stats: &StoresStats,
        kind: FlowKind,
    ) -> (bool, Option<RegionStat>) {
        let mut flow_bytes = bytes / REGION_HEARTBEAT_REPORT_INTERVAL;
        let old_item = self.flow_cache(kind).peek(region.id);
        if let Some(old) = &old_item {
            if !self.simulating.load(Ordering::Relaxed) {
                let interval = old.last_update_time.elapsed().as_secs_f64();
                if interval < MIN_HOT_REGION_REPORT_INTERVAL as f64 {
                    return (false, None);
                }
                flow_bytes = (bytes as f64 / interval) as u64;
            }
        }
        let threshold = match kind {
            FlowKind::Write => calculate_write_hot_threshold(stats),
            FlowKind::Read => calculate_read_hot_threshold(stats),
        };
        self.need_update_stat_cache(region, flow_bytes, threshold, old_item.as_deref(), kind)
    }

    fn need_update_stat_cache(
        &self,
        region: &RegionInfo,
        flow_bytes: u64,
        threshold: u64,
        old_item: Option<&RegionStat>,
        kind: FlowKind,
    ) -> (bool, Option<RegionStat>) {
        let mut new_item = RegionStat::new(region, flow_bytes, HOT_REGION_ANTI_COUNT);
        if let Some(old) = old_item {
            new_item.hot_degree = old.hot_degree + 1;
            new_item.stats = old.stats.clone();
        }
        if flow_bytes >= threshold {
            if old_item.is_none() {
                inc_event("add_item", kind);
                new_item.stats = Some(RollingStats::new(ROLLING_WINDOWS_SIZE));
            }
            if let Some(stats) = new_item.stats.as_mut() {
                stats.add(flow_bytes as f64);
            }
            return (true, Some(new_item));
        }
        let old = match old_item {
            None => return (false, Some(new_item)),
            Some(old) => old,
        };
        if old.anti_count <= 0 {
            inc_event("remove_item", kind);
            return (true, None);
        }
        // Hysteresis: decay instead of dropping right away, so a brief
        // dip under the threshold does not evict the region.
        new_item.hot_degree = old.hot_degree - 1;
        new_item.anti_count = old.anti_count - 1;
        if let Some(stats) = new_item.stats.as_mut() {
            stats.add(flow_bytes as f64);
        }
        (true, Some(new_item))
    }

    /// Applies the item a check returned: `None` drops the key, a stat
    /// replaces it.
    pub fn update(&self, key: u64, item: Option<RegionStat>, kind: FlowKind) {
        let cache = self.flow_cache(kind);
        match item {
            None => cache.remove(key),
            Some(item) => {
                cache.put(key, Arc::new(item));
                inc_event("update_item", kind);
            }
        }
    }

    /// Snapshots the hot regions of one flow channel.
    pub fn region_stats(&self, kind: FlowKind) -> Vec<Arc<RegionStat>> {
        self.flow_cache(kind)
            .elems()
            .into_iter()
            .map(|(_, stat)| stat)
            .collect()
    }

    /// Picks a random hot region on `store_id`. The random walk keeps
    /// repeated calls from always returning the same region.
    pub fn rand_hot_region_from_store(
        &self,
        store_id: u64,
        kind: FlowKind,
        hot_threshold: i64,
    ) -> Option<Arc<RegionStat>> {
        let stats = self.region_stats(kind);
        let mut order: Vec<usize> = (0..stats.len()).collect();
        order.shuffle(&mut rand::thread_rng());
        for i in order {
            if stats[i].hot_degree >= hot_threshold && stats[i].store_id == store_id {
                return Some(Arc::clone(&stats[i]));
            }
        }
        None
    }

    /// Whether the region is hot on either channel. The write entry is
    /// authoritative when present; the read entry only answers for
    /// regions without one.
    pub fn is_region_hot(&self, id: u64, hot_threshold: i64) -> bool {
        if let Some(stat) = self.write_flow.peek(id) {
            return stat.hot_degree >= hot_threshold;
        }
        self.read_flow
            .peek(id)
            .map_or(false, |stat| stat.hot_degree >= hot_threshold)
    }

    /// Exports cache sizes and the current thresholds. Does not mutate
    /// any state.
    pub fn collect_metrics(&self, stats: &StoresStats) {
        let gauge = |name: &str, kind: FlowKind, value: u64| {
            HOT_CACHE_STATUS_GAUGE_VEC
                .with_label_values(&[name, kind.label()])
                .set(value as i64);
        };
        gauge("total_length", FlowKind::Write, self.write_flow.len() as u64);
        gauge("total_length", FlowKind::Read, self.read_flow.len() as u64);
        gauge(
            "hotThreshold",
            FlowKind::Write,
            calculate_write_hot_threshold(stats),
        );
        gauge(
            "hotThreshold",
            FlowKind::Read,
            calculate_read_hot_threshold(stats),
        );
    }
}

fn inc_event(event: &str, kind: FlowKind) {
    HOT_CACHE_EVENT_COUNTER_VEC
        .with_label_values(&[event, kind.label()])
        .inc();
}

// Sizes the threshold so that at most about `STAT_CACHE_MAX_LEN` regions
// qualify. Stores report roughly twice the write flow the regions log to
// their storage engine, hence the doubled divisor.
fn calculate_write_hot_threshold(stats: &StoresStats) -> u64 {
    let divisor = (STAT_CACHE_MAX_LEN * 2) as f64;
    let threshold = (stats.total_bytes_write_rate() / divisor) as u64;
    cmp::max(threshold, HOT_WRITE_REGION_MIN_FLOW_RATE)
}

fn calculate_read_hot_threshold(stats: &StoresStats) -> u64 {
    let divisor = STAT_CACHE_MAX_LEN as f64;
    let threshold = (stats.total_bytes_read_rate() / divisor) as u64;
    cmp::max(threshold, HOT_READ_REGION_MIN_FLOW_RATE)
}
