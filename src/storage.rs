// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use std::sync::Mutex;

use crate::config::Config;
use crate::errors::Result;

/// Persists the scheduling configuration as one document.
///
/// The backend decides durability and placement (an etcd prefix on the
/// real deployment); this core only requires that a successful
/// `save_config` is observed by the next `load_config`.
pub trait ConfigStorage: Send + Sync {
    fn save_config(&self, cfg: &Config) -> Result<()>;

    /// Populates `cfg` from the persisted document if one exists and
    /// reports whether it did. On `Ok(false)` the passed value is left
    /// untouched.
    fn load_config(&self, cfg: &mut Config) -> Result<bool>;
}

/// Keeps the document in process memory. Used by tests and by embedding
/// servers that have not been bootstrapped with a real backend yet.
#[derive(Default)]
pub struct MemStorage {
    data: Mutex<Option<String>>,
}

impl MemStorage {
    pub fn new() -> MemStorage {
        MemStorage::default()
    }
}

impl ConfigStorage for MemStorage {
    fn save_config(&self, cfg: &Config) -> Result<()> {
        let value = serde_json::to_string(cfg)?;
        *self.data.lock().unwrap() = Some(value);
        Ok(())
    }

    fn load_config(&self, cfg: &mut Config) -> Result<bool> {
        match self.data.lock().unwrap().as_deref() {
            Some(value) => {
                *cfg = serde_json::from_str(value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mem_storage() {
        let storage = MemStorage::new();
        let mut cfg = Config::default();
        assert!(!storage.load_config(&mut cfg).unwrap());
        assert_eq!(cfg, Config::default());

        cfg.schedule.leader_schedule_limit = 16;
        storage.save_config(&cfg).unwrap();

        let mut loaded = Config::default();
        assert!(storage.load_config(&mut loaded).unwrap());
        assert_eq!(loaded, cfg);
    }
}
