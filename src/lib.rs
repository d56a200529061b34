// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

//! Scheduling core of the placement driver.
//!
//! This crate carries the two pieces of state every placement decision
//! reads: the live-reloadable scheduling policy ([`ScheduleOption`]) and
//! the hot region statistics ([`HotSpotCache`]). Policy snapshots are
//! published copy-on-write so scheduler loops never block each other on
//! configuration reads; hot region detection classifies region flow with
//! adaptive thresholds and hysteresis so the hot region balancers see a
//! stable set of candidates.
//!
//! Region and store metadata, the persistence backend and the scheduler
//! algorithms themselves live outside this crate.

#[macro_use]
extern crate quick_error;
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate slog_global;

pub mod cache;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod option;
pub mod schedule;
pub mod statistics;
pub mod storage;
pub mod util;

pub use crate::config::{Config, StoreLabel};
pub use crate::errors::{Error, Result};
pub use crate::option::ScheduleOption;
pub use crate::statistics::{FlowKind, HotSpotCache, RegionStat, StoresStats};

/// A region as seen by the scheduling core: its identity, the store of
/// its leader peer, and the flow and size figures carried by the last
/// region heartbeat.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RegionInfo {
    pub id: u64,
    pub leader_store_id: u64,
    /// Bytes written to the region within the last report interval.
    pub bytes_written: u64,
    /// Bytes read from the region within the last report interval.
    pub bytes_read: u64,
    pub approximate_size: u64,
    pub approximate_keys: u64,
}

impl RegionInfo {
    pub fn new(id: u64, leader_store_id: u64) -> RegionInfo {
        RegionInfo {
            id,
            leader_store_id,
            ..Default::default()
        }
    }
}
