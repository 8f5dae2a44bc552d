//! Memory, connections, queues and opcounters.

use crate::doc::{SampleDoc, ServerStatus};
use crate::series::with_keys;

use super::{elapsed_minutes, SeriesSet};

const LEGENDS: [&str; 17] = [
    "mem_resident",
    "mem_virtual",
    "mem_page_faults",
    "conns_active",
    "conns_available",
    "conns_current",
    "conns_created_per_minute",
    "ops_query",
    "ops_insert",
    "ops_update",
    "ops_delete",
    "ops_getmore",
    "ops_command",
    "q_active_read",
    "q_active_write",
    "q_queued_read",
    "q_queued_write",
];

pub(super) fn derive(samples: &[SampleDoc]) -> SeriesSet {
    let mut series = with_keys(&LEGENDS);
    let mut push = |key: &str, v: f64, t: i64| {
        if let Some(s) = series.get_mut(key) {
            s.push(v, t);
        }
    };

    let mut prev: Option<&ServerStatus> = None;
    for cur in samples.iter().filter_map(|s| s.server_status.as_ref()) {
        // a drop in uptime is a restart: skip the sample, keep it as reference
        if cur.uptime > prev.map_or(0.0, |p| p.uptime) {
            let t = cur.local_time;
            push("mem_resident", cur.mem.resident / 1024.0, t);
            push("mem_virtual", cur.mem.virtual_size / 1024.0, t);
            push("conns_active", cur.connections.active, t);
            push("conns_available", cur.connections.available, t);
            push("conns_current", cur.connections.current, t);
            push("q_active_read", cur.global_lock.active_clients.readers, t);
            push("q_active_write", cur.global_lock.active_clients.writers, t);
            push("q_queued_read", cur.global_lock.current_queue.readers, t);
            push("q_queued_write", cur.global_lock.current_queue.writers, t);

            if let Some(p) = prev {
                let minutes = elapsed_minutes(p.local_time, t);
                let (c, o) = (&cur.op_counters, &p.op_counters);
                push("mem_page_faults", cur.extra_info.page_faults - p.extra_info.page_faults, t);
                push(
                    "conns_created_per_minute",
                    (cur.connections.total_created - p.connections.total_created) / minutes,
                    t,
                );
                push("ops_query", c.query - o.query, t);
                push("ops_insert", c.insert - o.insert, t);
                push("ops_update", c.update - o.update, t);
                push("ops_delete", c.delete - o.delete, t);
                push("ops_getmore", c.getmore - o.getmore, t);
                push("ops_command", c.command - o.command, t);
            }
        }
        prev = Some(cur);
    }

    SeriesSet {
        series,
        ..SeriesSet::default()
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::status;
    use super::*;
    use crate::series::DataPoint;

    #[test]
    fn single_sample_has_gauges_but_no_deltas() {
        let set = derive(&[status(100.0, 1_000, |s| {
            s.mem.resident = 2048.0;
            s.op_counters.query = 50.0;
        })]);
        assert_eq!(set.series["mem_resident"].datapoints, vec![DataPoint(2.0, 1_000)]);
        assert!(set.series["ops_query"].is_empty());
        assert!(set.series["conns_created_per_minute"].is_empty());
    }

    #[test]
    fn restart_skips_the_pair_and_advances_reference() {
        let set = derive(&[
            status(100.0, 60_000, |s| s.op_counters.query = 500.0),
            // restart: uptime fell, counters reset
            status(5.0, 120_000, |s| s.op_counters.query = 10.0),
            status(65.0, 180_000, |s| s.op_counters.query = 40.0),
        ]);
        // delta measured against the restarted sample, not the first one
        assert_eq!(set.series["ops_query"].datapoints, vec![DataPoint(30.0, 180_000)]);
        let gauge_ts: Vec<i64> = set.series["conns_current"]
            .datapoints
            .iter()
            .map(DataPoint::timestamp)
            .collect();
        assert_eq!(gauge_ts, vec![60_000, 180_000]);
    }

    #[test]
    fn counter_rollback_is_clamped_to_zero() {
        let set = derive(&[
            status(10.0, 60_000, |s| s.op_counters.insert = 90.0),
            status(20.0, 120_000, |s| s.op_counters.insert = 40.0),
        ]);
        assert_eq!(set.series["ops_insert"].datapoints, vec![DataPoint(0.0, 120_000)]);
    }

    #[test]
    fn connection_rate_is_per_minute() {
        let set = derive(&[
            status(10.0, 0, |s| s.connections.total_created = 100.0),
            status(190.0, 180_000, |s| s.connections.total_created = 160.0),
        ]);
        assert_eq!(
            set.series["conns_created_per_minute"].datapoints,
            vec![DataPoint(20.0, 180_000)]
        );
    }
}
