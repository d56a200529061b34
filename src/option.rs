// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

//! Wrappers to access the scheduling configuration safely.
//!
//! Each configuration struct sits behind an [`ArcSwap`] cell: readers
//! take the current snapshot without blocking, mutators clone it, change
//! the clone and publish it atomically. Writers are expected to be
//! serialized by the caller (the API gateway holds one lock around all
//! config mutations); two unserialized writers may lose one update.
//! Snapshots published by different cells are not mutually consistent:
//! a reader can see a new schedule config next to an old replication
//! config while a multi-cell update is in flight.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use semver::Version;

use crate::config::{
    Config, LabelPropertyConfig, NamespaceConfig, PdServerConfig, ReplicationConfig,
    ScheduleConfig, SchedulerConfig, SchedulerConfigs, StoreLabel,
};
use crate::errors::Result;
use crate::schedule::{is_default_scheduler, scheduler_name};
use crate::storage::ConfigStorage;

/// The live scheduling policy registry: the global schedule config, the
/// replication policy, per-namespace overrides, label properties and the
/// cluster version, each in its own copy-on-write cell.
pub struct ScheduleOption {
    schedule: ArcSwap<ScheduleConfig>,
    rep: Replication,
    ns: DashMap<String, NamespaceOption>,
    label_property: ArcSwap<LabelPropertyConfig>,
    cluster_version: ArcSwap<Version>,
    pd_server: ArcSwap<PdServerConfig>,
}

impl ScheduleOption {
    pub fn new(cfg: &Config) -> ScheduleOption {
        let ns = DashMap::new();
        for (name, ns_cfg) in &cfg.namespace {
            ns.insert(name.clone(), NamespaceOption::new(ns_cfg.clone()));
        }
        cfg.schedule.write_into_metrics();
        ScheduleOption {
            schedule: ArcSwap::from_pointee(cfg.schedule.clone()),
            rep: Replication::new(cfg.replication.clone()),
            ns,
            label_property: ArcSwap::from_pointee(cfg.label_property.clone()),
            cluster_version: ArcSwap::from_pointee(cfg.cluster_version.clone()),
            pd_server: ArcSwap::from_pointee(cfg.pd_server.clone()),
        }
    }

    fn load(&self) -> Arc<ScheduleConfig> {
        self.schedule.load_full()
    }

    fn store(&self, cfg: ScheduleConfig) {
        self.schedule.store(Arc::new(cfg));
    }

    pub fn replication(&self) -> &Replication {
        &self.rep
    }

    pub fn get_max_replicas(&self, ns: &str) -> usize {
        if let Some(n) = self.ns.get(ns) {
            return n.max_replicas();
        }
        self.rep.max_replicas()
    }

    pub fn set_max_replicas(&self, replicas: usize) {
        self.rep.set_max_replicas(replicas);
    }

    pub fn get_location_labels(&self) -> Vec<String> {
        self.rep.location_labels()
    }

    pub fn get_max_snapshot_count(&self) -> u64 {
        self.load().max_snapshot_count
    }

    pub fn get_max_pending_peer_count(&self) -> u64 {
        self.load().max_pending_peer_count
    }

    pub fn get_max_merge_region_size(&self) -> u64 {
        self.load().max_merge_region_size
    }

    pub fn get_max_merge_region_keys(&self) -> u64 {
        self.load().max_merge_region_keys
    }

    pub fn get_split_merge_interval(&self) -> Duration {
        self.load().split_merge_interval.0
    }

    pub fn get_patrol_region_interval(&self) -> Duration {
        self.load().patrol_region_interval.0
    }

    pub fn get_max_store_down_time(&self) -> Duration {
        self.load().max_store_down_time.0
    }

    pub fn get_leader_schedule_limit(&self, ns: &str) -> u64 {
        if let Some(n) = self.ns.get(ns) {
            return n.leader_schedule_limit();
        }
        self.load().leader_schedule_limit
    }

    pub fn get_region_schedule_limit(&self, ns: &str) -> u64 {
        if let Some(n) = self.ns.get(ns) {
            return n.region_schedule_limit();
        }
        self.load().region_schedule_limit
    }

    pub fn get_replica_schedule_limit(&self, ns: &str) -> u64 {
        if let Some(n) = self.ns.get(ns) {
            return n.replica_schedule_limit();
        }
        self.load().replica_schedule_limit
    }

    pub fn get_merge_schedule_limit(&self, ns: &str) -> u64 {
        if let Some(n) = self.ns.get(ns) {
            return n.merge_schedule_limit();
        }
        self.load().merge_schedule_limit
    }

    pub fn get_hot_region_schedule_limit(&self, ns: &str) -> u64 {
        if let Some(n) = self.ns.get(ns) {
            return n.hot_region_schedule_limit();
        }
        self.load().hot_region_schedule_limit
    }

    pub fn get_hot_region_cache_hits_threshold(&self) -> i64 {
        self.load().hot_region_cache_hits_threshold as i64
    }

    pub fn get_store_balance_rate(&self) -> f64 {
        self.load().store_balance_rate
    }

    pub fn get_tolerant_size_ratio(&self) -> f64 {
        self.load().tolerant_size_ratio
    }

    pub fn get_low_space_ratio(&self) -> f64 {
        self.load().low_space_ratio
    }

    pub fn get_high_space_ratio(&self) -> f64 {
        self.load().high_space_ratio
    }

    pub fn get_scheduler_max_waiting_operator(&self) -> u64 {
        self.load().scheduler_max_waiting_operator
    }

    pub fn is_raft_learner_enabled(&self) -> bool {
        !self.load().disable_raft_learner
    }

    pub fn is_remove_down_replica_enabled(&self) -> bool {
        !self.load().disable_remove_down_replica
    }

    pub fn is_replace_offline_replica_enabled(&self) -> bool {
        !self.load().disable_replace_offline_replica
    }

    pub fn is_make_up_replica_enabled(&self) -> bool {
        !self.load().disable_make_up_replica
    }

    pub fn is_remove_extra_replica_enabled(&self) -> bool {
        !self.load().disable_remove_extra_replica
    }

    pub fn is_location_replacement_enabled(&self) -> bool {
        !self.load().disable_location_replacement
    }

    pub fn is_namespace_relocation_enabled(&self) -> bool {
        !self.load().disable_namespace_relocation
    }

    pub fn get_schedulers(&self) -> SchedulerConfigs {
        self.load().schedulers.clone()
    }

    /// Registers a scheduler in the config. Re-adding an enabled entry is
    /// a no-op; re-adding a disabled one re-enables it in place.
    pub fn add_scheduler_cfg(&self, tp: &str, args: Vec<String>) {
        let mut v = self.load().as_ref().clone();
        for entry in v.schedulers.iter_mut() {
            if entry.tp == tp && entry.args == args {
                if !entry.disable {
                    return;
                }
                entry.disable = false;
                self.store(v);
                return;
            }
        }
        v.schedulers.push(SchedulerConfig::new(tp, args));
        self.store(v);
    }

    /// Drops the scheduler whose instance name is `name`. Default
    /// schedulers keep their slot with `disable` set so the removal is
    /// still visible after a restart; a name that matches nothing is a
    /// silent success.
    pub fn remove_scheduler_cfg(&self, name: &str) -> Result<()> {
        let mut v = self.load().as_ref().clone();
        for i in 0..v.schedulers.len() {
            let entry = &v.schedulers[i];
            if scheduler_name(&entry.tp, &entry.args)? != name {
                continue;
            }
            if is_default_scheduler(&entry.tp) {
                v.schedulers[i].disable = true;
            } else {
                v.schedulers.remove(i);
            }
            self.store(v);
            return Ok(());
        }
        Ok(())
    }

    pub fn set_label_property(&self, kind: &str, key: &str, value: &str) {
        let mut cfg = self.label_property.load().as_ref().clone();
        let labels = cfg.entry(kind.to_owned()).or_default();
        if labels.iter().any(|l| l.key == key && l.value == value) {
            return;
        }
        labels.push(StoreLabel::new(key, value));
        self.label_property.store(Arc::new(cfg));
    }

    pub fn delete_label_property(&self, kind: &str, key: &str, value: &str) {
        let mut cfg = self.label_property.load().as_ref().clone();
        if let Some(labels) = cfg.get_mut(kind) {
            labels.retain(|l| !(l.key == key && l.value == value));
            if labels.is_empty() {
                cfg.remove(kind);
            }
        }
        self.label_property.store(Arc::new(cfg));
    }

    /// True iff any configured label under `kind` matches any of the
    /// supplied store labels.
    pub fn check_label_property(&self, kind: &str, labels: &[StoreLabel]) -> bool {
        let cfg = self.label_property.load();
        cfg.get(kind).map_or(false, |props| {
            props
                .iter()
                .any(|p| labels.iter().any(|l| l.key == p.key && l.value == p.value))
        })
    }

    pub fn load_label_property_config(&self) -> LabelPropertyConfig {
        self.label_property.load().as_ref().clone()
    }

    pub fn cluster_version(&self) -> Version {
        self.cluster_version.load().as_ref().clone()
    }

    pub fn set_cluster_version(&self, version: Version) {
        self.cluster_version.store(Arc::new(version));
    }

    pub fn pd_server_config(&self) -> Arc<PdServerConfig> {
        self.pd_server.load_full()
    }

    /// Collects all live cells into one aggregate, the shape that is
    /// persisted and reloaded.
    pub fn snapshot(&self) -> Config {
        let mut namespace = HashMap::new();
        for item in self.ns.iter() {
            namespace.insert(item.key().clone(), item.value().load_cfg());
        }
        Config {
            schedule: self.load().as_ref().clone(),
            replication: self.rep.load().as_ref().clone(),
            namespace,
            label_property: self.label_property.load().as_ref().clone(),
            cluster_version: self.cluster_version(),
            pd_server: self.pd_server.load().as_ref().clone(),
        }
    }

    pub fn persist(&self, storage: &dyn ConfigStorage) -> Result<()> {
        let cfg = self.snapshot();
        storage.save_config(&cfg)
    }

    /// Re-reads the persisted document and publishes it into every cell.
    /// The scheduler lists of both sides are merged first so that disable
    /// flags persisted by a previous run win over this run's registration
    /// defaults, and persisted-only entries are restored.
    pub fn reload(&self, storage: &dyn ConfigStorage) -> Result<()> {
        let mut cfg = self.snapshot();
        let exists = storage.load_config(&mut cfg)?;
        self.adjust_schedule_cfg(&mut cfg);
        if exists {
            self.store(cfg.schedule.clone());
            self.rep.store(cfg.replication.clone());
            for (name, ns_cfg) in cfg.namespace {
                // Replace per key so concurrent readers never observe an
                // empty namespace map.
                self.ns.insert(name, NamespaceOption::new(ns_cfg));
            }
            self.label_property.store(Arc::new(cfg.label_property));
            self.cluster_version
                .store(Arc::new(cfg.cluster_version.clone()));
            self.pd_server.store(Arc::new(cfg.pd_server));
            cfg.schedule.write_into_metrics();
            info!("scheduling configuration is reloaded"; "cluster-version" => %cfg.cluster_version);
        }
        Ok(())
    }

    fn adjust_schedule_cfg(&self, persisted: &mut Config) {
        let mut schedule = self.load().as_ref().clone();
        for entry in schedule.schedulers.iter_mut() {
            if let Some(ps) = persisted
                .schedule
                .schedulers
                .iter()
                .find(|ps| ps.same_instance(entry))
            {
                // The persisted flag wins.
                entry.disable = ps.disable;
            }
        }
        let restored: Vec<_> = persisted
            .schedule
            .schedulers
            .iter()
            .filter(|ps| !schedule.schedulers.iter().any(|s| s.same_instance(ps)))
            .cloned()
            .collect();
        schedule.schedulers.extend(restored);
        persisted.schedule.schedulers = schedule.schedulers.clone();
        self.store(schedule);
    }
}

/// Replication policy behind its own copy-on-write cell.
pub struct Replication {
    cfg: ArcSwap<ReplicationConfig>,
}

impl Replication {
    fn new(cfg: ReplicationConfig) -> Replication {
        Replication {
            cfg: ArcSwap::from_pointee(cfg),
        }
    }

    fn load(&self) -> Arc<ReplicationConfig> {
        self.cfg.load_full()
    }

    fn store(&self, cfg: ReplicationConfig) {
        self.cfg.store(Arc::new(cfg));
    }

    pub fn max_replicas(&self) -> usize {
        self.load().max_replicas as usize
    }

    pub fn set_max_replicas(&self, replicas: usize) {
        let mut v = self.load().as_ref().clone();
        v.max_replicas = replicas as u64;
        self.store(v);
    }

    pub fn location_labels(&self) -> Vec<String> {
        self.load().location_labels.clone()
    }

    pub fn strictly_match_label(&self) -> bool {
        self.load().strictly_match_label
    }
}

/// One namespace's scheduling overrides behind a copy-on-write cell.
pub struct NamespaceOption {
    cfg: ArcSwap<NamespaceConfig>,
}

impl NamespaceOption {
    fn new(cfg: NamespaceConfig) -> NamespaceOption {
        NamespaceOption {
            cfg: ArcSwap::from_pointee(cfg),
        }
    }

    fn load_cfg(&self) -> NamespaceConfig {
        self.cfg.load().as_ref().clone()
    }

    pub fn max_replicas(&self) -> usize {
        self.cfg.load().max_replicas as usize
    }

    pub fn leader_schedule_limit(&self) -> u64 {
        self.cfg.load().leader_schedule_limit
    }

    pub fn region_schedule_limit(&self) -> u64 {
        self.cfg.load().region_schedule_limit
    }

    pub fn replica_schedule_limit(&self) -> u64 {
        self.cfg.load().replica_schedule_limit
    }

    pub fn merge_schedule_limit(&self) -> u64 {
        self.cfg.load().merge_schedule_limit
    }

    pub fn hot_region_schedule_limit(&self) -> u64 {
        self.cfg.load().hot_region_schedule_limit
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;
    use crate::storage::MemStorage;

    fn count_schedulers(opt: &ScheduleOption, tp: &str, args: &[&str]) -> usize {
        opt.get_schedulers()
            .iter()
            .filter(|s| s.tp == tp && s.args == args)
            .count()
    }

    #[test]
    fn test_add_scheduler_cfg_idempotent() {
        let opt = ScheduleOption::new(&Config::default());
        let initial = opt.get_schedulers();

        opt.add_scheduler_cfg("evict-leader", vec!["1".to_owned()]);
        opt.add_scheduler_cfg("evict-leader", vec!["1".to_owned()]);
        assert_eq!(count_schedulers(&opt, "evict-leader", &["1"]), 1);
        assert_eq!(opt.get_schedulers().len(), initial.len() + 1);

        // Same type, different args is a different instance.
        opt.add_scheduler_cfg("evict-leader", vec!["2".to_owned()]);
        assert_eq!(count_schedulers(&opt, "evict-leader", &["2"]), 1);
        assert_eq!(opt.get_schedulers().len(), initial.len() + 2);
    }

    #[test]
    fn test_remove_default_scheduler_leaves_tombstone() {
        let opt = ScheduleOption::new(&Config::default());
        opt.remove_scheduler_cfg("balance-leader-scheduler").unwrap();

        let entry = opt
            .get_schedulers()
            .into_iter()
            .find(|s| s.tp == "balance-leader")
            .unwrap();
        assert!(entry.disable);

        // Re-adding it flips the tombstone back instead of duplicating.
        opt.add_scheduler_cfg("balance-leader", vec![]);
        let schedulers = opt.get_schedulers();
        let entries: Vec<_> = schedulers.iter().filter(|s| s.tp == "balance-leader").collect();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].disable);
    }

    #[test]
    fn test_remove_scheduler_by_instance_name() {
        let opt = ScheduleOption::new(&Config::default());
        opt.add_scheduler_cfg("evict-leader", vec!["1".to_owned()]);
        opt.add_scheduler_cfg("evict-leader", vec!["2".to_owned()]);

        opt.remove_scheduler_cfg("evict-leader-scheduler-2").unwrap();
        assert_eq!(count_schedulers(&opt, "evict-leader", &["1"]), 1);
        assert_eq!(count_schedulers(&opt, "evict-leader", &["2"]), 0);

        // Unknown name is a silent success.
        opt.remove_scheduler_cfg("evict-leader-scheduler-9").unwrap();
        assert_eq!(count_schedulers(&opt, "evict-leader", &["1"]), 1);
    }

    #[test]
    fn test_remove_scheduler_unknown_type_fails() {
        let opt = ScheduleOption::new(&Config::default());
        opt.add_scheduler_cfg("foobar", vec![]);
        assert!(opt.remove_scheduler_cfg("whatever").is_err());
        // The list is left unchanged.
        assert_eq!(count_schedulers(&opt, "foobar", &[]), 1);
    }

    #[test]
    fn test_namespace_fallback() {
        let mut cfg = Config::default();
        cfg.namespace.insert(
            "ns1".to_owned(),
            NamespaceConfig {
                leader_schedule_limit: 100,
                max_replicas: 5,
                ..Default::default()
            },
        );
        let opt = ScheduleOption::new(&cfg);

        assert_eq!(opt.get_leader_schedule_limit("ns1"), 100);
        assert_eq!(opt.get_max_replicas("ns1"), 5);
        // A namespace entry overrides every field, even zero ones.
        assert_eq!(opt.get_region_schedule_limit("ns1"), 0);

        // Absent namespaces resolve to the global values.
        assert_eq!(
            opt.get_leader_schedule_limit("other"),
            cfg.schedule.leader_schedule_limit
        );
        assert_eq!(
            opt.get_region_schedule_limit("other"),
            cfg.schedule.region_schedule_limit
        );
        assert_eq!(opt.get_max_replicas("other"), 3);
    }

    #[test]
    fn test_feature_toggles() {
        let mut cfg = Config::default();
        let opt = ScheduleOption::new(&cfg);
        assert!(opt.is_raft_learner_enabled());
        assert!(opt.is_remove_down_replica_enabled());
        assert!(opt.is_replace_offline_replica_enabled());
        assert!(opt.is_make_up_replica_enabled());
        assert!(opt.is_remove_extra_replica_enabled());
        assert!(opt.is_location_replacement_enabled());
        assert!(opt.is_namespace_relocation_enabled());

        cfg.schedule.disable_raft_learner = true;
        cfg.schedule.disable_namespace_relocation = true;
        let opt = ScheduleOption::new(&cfg);
        assert!(!opt.is_raft_learner_enabled());
        assert!(!opt.is_namespace_relocation_enabled());
        assert!(opt.is_remove_down_replica_enabled());
    }

    #[test]
    fn test_label_property() {
        let opt = ScheduleOption::new(&Config::default());
        let store_labels = vec![StoreLabel::new("zone", "z1"), StoreLabel::new("rack", "r2")];

        assert!(!opt.check_label_property("reject-leader", &store_labels));

        opt.set_label_property("reject-leader", "zone", "z1");
        // Setting the same pair again does not duplicate it.
        opt.set_label_property("reject-leader", "zone", "z1");
        assert_eq!(
            opt.load_label_property_config()["reject-leader"].len(),
            1
        );
        assert!(opt.check_label_property("reject-leader", &store_labels));
        // A different property kind does not match.
        assert!(!opt.check_label_property("reject-follower", &store_labels));

        opt.delete_label_property("reject-leader", "zone", "z1");
        assert!(!opt.check_label_property("reject-leader", &store_labels));
        // The emptied kind is dropped entirely.
        assert!(!opt
            .load_label_property_config()
            .contains_key("reject-leader"));
    }

    #[test]
    fn test_persist_reload_round_trip() {
        let storage = MemStorage::new();
        let opt = ScheduleOption::new(&Config::default());
        opt.add_scheduler_cfg("evict-leader", vec!["1".to_owned()]);
        opt.set_label_property("reject-leader", "zone", "z1");
        opt.set_max_replicas(5);
        opt.set_cluster_version(Version::new(3, 0, 0));
        opt.persist(&storage).unwrap();

        let snapshot = opt.snapshot();
        opt.reload(&storage).unwrap();
        assert_eq!(opt.snapshot(), snapshot);

        // A fresh option picks the persisted state up wholesale.
        let fresh = ScheduleOption::new(&Config::default());
        fresh.reload(&storage).unwrap();
        assert_eq!(fresh.snapshot(), snapshot);
        assert_eq!(fresh.get_max_replicas(""), 5);
        assert_eq!(fresh.cluster_version(), Version::new(3, 0, 0));
    }

    #[test]
    fn test_reload_missing_document() {
        let storage = MemStorage::new();
        let opt = ScheduleOption::new(&Config::default());
        let snapshot = opt.snapshot();
        opt.reload(&storage).unwrap();
        assert_eq!(opt.snapshot(), snapshot);
    }

    #[test]
    fn test_reload_restores_persisted_schedulers() {
        let storage = MemStorage::new();

        let mut persisted = Config::default();
        for entry in persisted.schedule.schedulers.iter_mut() {
            if entry.tp == "balance-leader" {
                entry.disable = true;
            }
        }
        persisted
            .schedule
            .schedulers
            .push(SchedulerConfig::new("evict-leader", vec!["7".to_owned()]));
        storage.save_config(&persisted).unwrap();

        let opt = ScheduleOption::new(&Config::default());
        opt.reload(&storage).unwrap();

        let schedulers = opt.get_schedulers();
        let balance_leader = schedulers
            .iter()
            .find(|s| s.tp == "balance-leader")
            .unwrap();
        assert!(balance_leader.disable);
        assert_eq!(count_schedulers(&opt, "evict-leader", &["7"]), 1);
        // In-memory entries come first, restored ones after.
        assert_eq!(schedulers.last().unwrap().tp, "evict-leader");

        // The merge is a fixpoint: reloading again changes nothing.
        let snapshot = opt.snapshot();
        opt.reload(&storage).unwrap();
        assert_eq!(opt.snapshot(), snapshot);
    }

    #[test]
    fn test_concurrent_readers() {
        let opt = Arc::new(ScheduleOption::new(&Config::default()));
        let mut handles = vec![];
        for _ in 0..4 {
            let opt = opt.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    let limit = opt.get_leader_schedule_limit("ns");
                    assert!(limit == 4 || limit == 16);
                }
            }));
        }
        for i in 0..1000 {
            let mut v = opt.load().as_ref().clone();
            v.leader_schedule_limit = if i % 2 == 0 { 16 } else { 4 };
            opt.store(v);
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
