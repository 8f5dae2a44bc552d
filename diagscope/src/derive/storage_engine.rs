//! WiredTiger cache, tickets, op latencies and query executor scans.

use crate::doc::{SampleDoc, ServerStatus};
use crate::series::with_keys;

use super::{elapsed_minutes, SeriesSet};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

const LEGENDS: [&str; 15] = [
    "latency_read",
    "latency_write",
    "latency_command",
    "scan_keys",
    "scan_objects",
    "scan_sort",
    "wt_cache_max",
    "wt_cache_used",
    "wt_cache_dirty",
    "wt_modified_evicted",
    "wt_unmodified_evicted",
    "wt_read_in_cache",
    "wt_written_from_cache",
    "ticket_avail_read",
    "ticket_avail_write",
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
        if cur.uptime > prev.map_or(0.0, |p| p.uptime) {
            let t = cur.local_time;
            let cache = &cur.wired_tiger.cache;
            let tickets = &cur.wired_tiger.concurrent_transactions;
            push("wt_cache_max", cache.max_bytes_configured / GIB, t);
            push("wt_cache_used", cache.currently_in_cache / GIB, t);
            push("wt_cache_dirty", cache.tracked_dirty_bytes / GIB, t);
            push("ticket_avail_read", tickets.read.available, t);
            push("ticket_avail_write", tickets.write.available, t);
            push("latency_read", cur.op_latencies.reads.average_ms(), t);
            push("latency_write", cur.op_latencies.writes.average_ms(), t);
            push("latency_command", cur.op_latencies.commands.average_ms(), t);

            if let Some(p) = prev {
                let minutes = elapsed_minutes(p.local_time, t);
                let (qe, pqe) = (&cur.metrics.query_executor, &p.metrics.query_executor);
                let pc = &p.wired_tiger.cache;
                push("scan_keys", qe.scanned - pqe.scanned, t);
                push("scan_objects", qe.scanned_objects - pqe.scanned_objects, t);
                push(
                    "scan_sort",
                    cur.metrics.operation.scan_and_order - p.metrics.operation.scan_and_order,
                    t,
                );
                push(
                    "wt_modified_evicted",
                    (cache.modified_pages_evicted - pc.modified_pages_evicted) / minutes,
                    t,
                );
                push(
                    "wt_unmodified_evicted",
                    (cache.unmodified_pages_evicted - pc.unmodified_pages_evicted) / minutes,
                    t,
                );
                push(
                    "wt_read_in_cache",
                    (cache.pages_read_into_cache - pc.pages_read_into_cache) / minutes,
                    t,
                );
                push(
                    "wt_written_from_cache",
                    (cache.pages_written_from_cache - pc.pages_written_from_cache) / minutes,
                    t,
                );
            }
        }
        prev = Some(cur);
    }

    SeriesSet {
        series,
        ..SeriesSet::default()
    }
}
