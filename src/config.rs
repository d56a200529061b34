// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

//! Configuration of the scheduling core.
//!
//! Every struct here is a plain serde value: it is cloned wholesale when
//! mutated and published as an immutable snapshot by
//! [`ScheduleOption`](crate::option::ScheduleOption). Persisted documents
//! use the same serde layout, so a round trip through the config storage
//! reproduces the in-memory value.

use std::collections::HashMap;

use semver::Version;

use crate::errors::{Error, Result};
use crate::metrics::CONFIG_SCHEDULE_GAUGE_VEC;
use crate::util::ReadableDuration;

const DEFAULT_MAX_REPLICAS: u64 = 3;
const DEFAULT_MAX_SNAPSHOT_COUNT: u64 = 3;
const DEFAULT_MAX_PENDING_PEER_COUNT: u64 = 16;
// Merge candidates are capped by size (in MiB) and key count.
const DEFAULT_MAX_MERGE_REGION_SIZE: u64 = 20;
const DEFAULT_MAX_MERGE_REGION_KEYS: u64 = 200_000;
const DEFAULT_SPLIT_MERGE_INTERVAL: ReadableDuration = ReadableDuration::hours(1);
const DEFAULT_PATROL_REGION_INTERVAL: ReadableDuration = ReadableDuration::millis(100);
const DEFAULT_MAX_STORE_DOWN_TIME: ReadableDuration = ReadableDuration::minutes(30);
const DEFAULT_LEADER_SCHEDULE_LIMIT: u64 = 4;
const DEFAULT_REGION_SCHEDULE_LIMIT: u64 = 4;
const DEFAULT_REPLICA_SCHEDULE_LIMIT: u64 = 8;
const DEFAULT_MERGE_SCHEDULE_LIMIT: u64 = 8;
const DEFAULT_HOT_REGION_SCHEDULE_LIMIT: u64 = 2;
const DEFAULT_HOT_REGION_CACHE_HITS_THRESHOLD: u64 = 3;
const DEFAULT_STORE_BALANCE_RATE: f64 = 15.0;
const DEFAULT_TOLERANT_SIZE_RATIO: f64 = 5.0;
const DEFAULT_LOW_SPACE_RATIO: f64 = 0.8;
const DEFAULT_HIGH_SPACE_RATIO: f64 = 0.6;
const DEFAULT_SCHEDULER_MAX_WAITING_OPERATOR: u64 = 3;

/// A `(key, value)` tag attached to a store, matched by label property
/// policies.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreLabel {
    pub key: String,
    pub value: String,
}

impl StoreLabel {
    pub fn new(key: &str, value: &str) -> StoreLabel {
        StoreLabel {
            key: key.to_owned(),
            value: value.to_owned(),
        }
    }
}

/// Identity and switch of one configured scheduler. Two entries denote
/// the same scheduler instance iff both type and args are equal; `disable`
/// is mutable state that marks a removed default scheduler so it survives
/// restarts as a tombstone.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[serde(rename_all = "kebab-case")]
pub struct SchedulerConfig {
    #[serde(rename = "type")]
    pub tp: String,
    pub args: Vec<String>,
    pub disable: bool,
}

impl SchedulerConfig {
    pub fn new(tp: &str, args: Vec<String>) -> SchedulerConfig {
        SchedulerConfig {
            tp: tp.to_owned(),
            args,
            disable: false,
        }
    }

    /// Whether `other` names the same scheduler instance.
    pub fn same_instance(&self, other: &SchedulerConfig) -> bool {
        self.tp == other.tp && self.args == other.args
    }
}

pub type SchedulerConfigs = Vec<SchedulerConfig>;

fn default_schedulers() -> SchedulerConfigs {
    ["balance-region", "balance-leader", "hot-region", "label"]
        .iter()
        .map(|tp| SchedulerConfig::new(tp, vec![]))
        .collect()
}

/// Scheduling limits and feature switches.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[serde(rename_all = "kebab-case")]
pub struct ScheduleConfig {
    /// Refuses to add peers to a store once it holds this many receiving
    /// snapshots.
    pub max_snapshot_count: u64,
    pub max_pending_peer_count: u64,
    /// Regions over this size (MiB) are never merge candidates.
    pub max_merge_region_size: u64,
    pub max_merge_region_keys: u64,
    /// A freshly split region is protected from merging for this long.
    pub split_merge_interval: ReadableDuration,
    pub patrol_region_interval: ReadableDuration,
    pub max_store_down_time: ReadableDuration,
    pub leader_schedule_limit: u64,
    pub region_schedule_limit: u64,
    pub replica_schedule_limit: u64,
    pub merge_schedule_limit: u64,
    pub hot_region_schedule_limit: u64,
    /// How many times a region must be observed hot before the hot region
    /// balancers act on it.
    pub hot_region_cache_hits_threshold: u64,
    pub store_balance_rate: f64,
    pub tolerant_size_ratio: f64,
    pub low_space_ratio: f64,
    pub high_space_ratio: f64,
    pub scheduler_max_waiting_operator: u64,
    pub disable_raft_learner: bool,
    pub disable_remove_down_replica: bool,
    pub disable_replace_offline_replica: bool,
    pub disable_make_up_replica: bool,
    pub disable_remove_extra_replica: bool,
    pub disable_location_replacement: bool,
    pub disable_namespace_relocation: bool,
    pub schedulers: SchedulerConfigs,
}

impl Default for ScheduleConfig {
    fn default() -> ScheduleConfig {
        ScheduleConfig {
            max_snapshot_count: DEFAULT_MAX_SNAPSHOT_COUNT,
            max_pending_peer_count: DEFAULT_MAX_PENDING_PEER_COUNT,
            max_merge_region_size: DEFAULT_MAX_MERGE_REGION_SIZE,
            max_merge_region_keys: DEFAULT_MAX_MERGE_REGION_KEYS,
            split_merge_interval: DEFAULT_SPLIT_MERGE_INTERVAL,
            patrol_region_interval: DEFAULT_PATROL_REGION_INTERVAL,
            max_store_down_time: DEFAULT_MAX_STORE_DOWN_TIME,
            leader_schedule_limit: DEFAULT_LEADER_SCHEDULE_LIMIT,
            region_schedule_limit: DEFAULT_REGION_SCHEDULE_LIMIT,
            replica_schedule_limit: DEFAULT_REPLICA_SCHEDULE_LIMIT,
            merge_schedule_limit: DEFAULT_MERGE_SCHEDULE_LIMIT,
            hot_region_schedule_limit: DEFAULT_HOT_REGION_SCHEDULE_LIMIT,
            hot_region_cache_hits_threshold: DEFAULT_HOT_REGION_CACHE_HITS_THRESHOLD,
            store_balance_rate: DEFAULT_STORE_BALANCE_RATE,
            tolerant_size_ratio: DEFAULT_TOLERANT_SIZE_RATIO,
            low_space_ratio: DEFAULT_LOW_SPACE_RATIO,
            high_space_ratio: DEFAULT_HIGH_SPACE_RATIO,
            scheduler_max_waiting_operator: DEFAULT_SCHEDULER_MAX_WAITING_OPERATOR,
            disable_raft_learner: false,
            disable_remove_down_replica: false,
            disable_replace_offline_replica: false,
            disable_make_up_replica: false,
            disable_remove_extra_replica: false,
            disable_location_replacement: false,
            disable_namespace_relocation: false,
            schedulers: default_schedulers(),
        }
    }
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, ratio) in [
            ("low-space-ratio", self.low_space_ratio),
            ("high-space-ratio", self.high_space_ratio),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(Error::Config(format!(
                    "{} should be between 0 and 1, got {}",
                    name, ratio
                )));
            }
        }
        if self.low_space_ratio <= self.high_space_ratio {
            return Err(Error::Config(format!(
                "low-space-ratio {} should be larger than high-space-ratio {}",
                self.low_space_ratio, self.high_space_ratio
            )));
        }
        if self.tolerant_size_ratio < 0.0 {
            return Err(Error::Config(
                "tolerant-size-ratio should be non-negative".to_owned(),
            ));
        }
        if self.store_balance_rate < 0.0 {
            return Err(Error::Config(
                "store-balance-rate should be non-negative".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn write_into_metrics(&self) {
        let gauge = |name: &str, value: f64| {
            CONFIG_SCHEDULE_GAUGE_VEC
                .with_label_values(&[name])
                .set(value);
        };
        gauge("max-snapshot-count", self.max_snapshot_count as f64);
        gauge("max-pending-peer-count", self.max_pending_peer_count as f64);
        gauge("max-merge-region-size", self.max_merge_region_size as f64);
        gauge("max-merge-region-keys", self.max_merge_region_keys as f64);
        gauge("leader-schedule-limit", self.leader_schedule_limit as f64);
        gauge("region-schedule-limit", self.region_schedule_limit as f64);
        gauge("replica-schedule-limit", self.replica_schedule_limit as f64);
        gauge("merge-schedule-limit", self.merge_schedule_limit as f64);
        gauge(
            "hot-region-schedule-limit",
            self.hot_region_schedule_limit as f64,
        );
        gauge("store-balance-rate", self.store_balance_rate);
        gauge("tolerant-size-ratio", self.tolerant_size_ratio);
        gauge("low-space-ratio", self.low_space_ratio);
        gauge("high-space-ratio", self.high_space_ratio);
        gauge(
            "scheduler-max-waiting-operator",
            self.scheduler_max_waiting_operator as f64,
        );
    }
}

/// Replica count and placement label policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[serde(rename_all = "kebab-case")]
pub struct ReplicationConfig {
    pub max_replicas: u64,
    /// Label keys considered, outermost first, when spreading replicas
    /// across failure domains.
    pub location_labels: Vec<String>,
    /// Reject stores carrying labels outside `location_labels`.
    pub strictly_match_label: bool,
}

impl Default for ReplicationConfig {
    fn default() -> ReplicationConfig {
        ReplicationConfig {
            max_replicas: DEFAULT_MAX_REPLICAS,
            location_labels: vec![],
            strictly_match_label: false,
        }
    }
}

impl ReplicationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_replicas == 0 {
            return Err(Error::Config(
                "max-replicas should be positive".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Per-namespace overrides of the scheduling limits. A zero field is an
/// explicit override to zero, not a fallback: resolution happens per
/// namespace name, not per field.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[serde(rename_all = "kebab-case")]
pub struct NamespaceConfig {
    pub leader_schedule_limit: u64,
    pub region_schedule_limit: u64,
    pub replica_schedule_limit: u64,
    pub merge_schedule_limit: u64,
    pub hot_region_schedule_limit: u64,
    pub max_replicas: u64,
}

/// Store label matchers grouped by property kind, e.g. all the labels
/// whose stores must not take leaders under `"reject-leader"`.
pub type LabelPropertyConfig = HashMap<String, Vec<StoreLabel>>;

/// Settings of the embedding server that scheduling itself does not
/// interpret; held and persisted alongside the scheduling policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[serde(rename_all = "kebab-case")]
pub struct PdServerConfig {
    pub use_region_storage: bool,
}

impl Default for PdServerConfig {
    fn default() -> PdServerConfig {
        PdServerConfig {
            use_region_storage: true,
        }
    }
}

/// The aggregate persisted as a single document by the config storage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    pub schedule: ScheduleConfig,
    pub replication: ReplicationConfig,
    pub namespace: HashMap<String, NamespaceConfig>,
    pub label_property: LabelPropertyConfig,
    pub cluster_version: Version,
    pub pd_server: PdServerConfig,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            schedule: ScheduleConfig::default(),
            replication: ReplicationConfig::default(),
            namespace: HashMap::new(),
            label_property: LabelPropertyConfig::new(),
            cluster_version: Version::new(0, 0, 0),
            pd_server: PdServerConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        self.schedule.validate()?;
        self.replication.validate()
    }
}
