// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use lazy_static::lazy_static;
use prometheus::*;

lazy_static! {
    pub static ref HOT_CACHE_EVENT_COUNTER_VEC: IntCounterVec = register_int_counter_vec!(
        "pd_hotcache_event_total",
        "Total number of hot cache stat operations.",
        &["event", "flow"]
    )
    .unwrap();
    pub static ref HOT_CACHE_STATUS_GAUGE_VEC: IntGaugeVec = register_int_gauge_vec!(
        "pd_hotcache_status",
        "Status of the hot spot cache.",
        &["name", "flow"]
    )
    .unwrap();
    pub static ref CONFIG_SCHEDULE_GAUGE_VEC: GaugeVec = register_gauge_vec!(
        "pd_config_schedule",
        "Config information of schedule.",
        &["name"]
    )
    .unwrap();
}
