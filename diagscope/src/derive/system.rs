//! OS counters: CPU mode percentages and per-disk utilization/IOPS.

use std::collections::BTreeMap;

use crate::doc::{SampleDoc, SystemMetrics};
use crate::series::{with_keys, DiskSeries};

use super::{SeriesSet, DISKS_IOPS, DISKS_UTILS};

const LEGENDS: [&str; 9] = [
    "cpu_idle",
    "cpu_iowait",
    "cpu_nice",
    "cpu_softirq",
    "cpu_steal",
    "cpu_system",
    "cpu_user",
    DISKS_UTILS,
    DISKS_IOPS,
];

pub(super) fn derive(samples: &[SampleDoc]) -> SeriesSet {
    let mut series = with_keys(&LEGENDS);
    let mut disks: BTreeMap<String, DiskSeries> = BTreeMap::new();

    let mut prev: Option<&SystemMetrics> = None;
    for cur in samples.iter().filter_map(|s| s.system_metrics.as_ref()) {
        if let Some(p) = prev {
            let t = cur.start;
            let elapsed_secs = (cur.start - p.start) as f64 / 1000.0;
            for (name, d) in &cur.disks {
                let Some(pd) = p.disks.get(name) else {
                    continue;
                };
                let busy =
                    (d.read_time_ms + d.write_time_ms) - (pd.read_time_ms + pd.write_time_ms);
                let util = if busy != 0.0 {
                    100.0 * (d.io_time_ms - pd.io_time_ms) / busy
                } else {
                    0.0
                };
                // counter glitch; drop both points for this disk
                if util > 100.0 {
                    continue;
                }
                let iops = if elapsed_secs > 0.0 {
                    ((d.reads + d.writes) - (pd.reads + pd.writes)) / elapsed_secs
                } else {
                    0.0
                };
                let entry = disks
                    .entry(name.clone())
                    .or_insert_with(|| DiskSeries::new(name));
                entry.utilization.push(util, t);
                entry.iops.push(iops, t);
            }

            let total = cur.cpu.total_ms() - p.cpu.total_ms();
            if total > 0.0 {
                let (c, o) = (&cur.cpu, &p.cpu);
                let modes = [
                    ("cpu_idle", c.idle_ms - o.idle_ms),
                    ("cpu_iowait", c.iowait_ms - o.iowait_ms),
                    ("cpu_nice", c.nice_ms - o.nice_ms),
                    ("cpu_softirq", c.softirq_ms - o.softirq_ms),
                    ("cpu_steal", c.steal_ms - o.steal_ms),
                    ("cpu_system", c.system_ms - o.system_ms),
                    ("cpu_user", c.user_ms - o.user_ms),
                ];
                for (key, delta) in modes {
                    if let Some(s) = series.get_mut(key) {
                        s.push(100.0 * delta / total, t);
                    }
                }
            }
        }
        prev = Some(cur);
    }

    SeriesSet {
        series,
        disks,
        ..SeriesSet::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::{CpuTimes, DiskCounters};
    use crate::series::DataPoint;

    fn sample(start: i64, cpu: CpuTimes, disks: &[(&str, DiskCounters)]) -> SampleDoc {
        SampleDoc {
            start,
            end: start,
            system_metrics: Some(SystemMetrics {
                start,
                cpu,
                disks: disks
                    .iter()
                    .map(|(n, d)| (n.to_string(), d.clone()))
                    .collect(),
            }),
            ..SampleDoc::default()
        }
    }

    fn disk(reads: f64, writes: f64, rw_ms: f64, io_ms: f64) -> DiskCounters {
        DiskCounters {
            reads,
            writes,
            read_time_ms: rw_ms,
            write_time_ms: 0.0,
            io_time_ms: io_ms,
        }
    }

    #[test]
    fn cpu_modes_are_percent_of_total_delta() {
        let set = derive(&[
            sample(
                0,
                CpuTimes {
                    idle_ms: 100.0,
                    user_ms: 100.0,
                    ..CpuTimes::default()
                },
                &[],
            ),
            sample(
                1_000,
                CpuTimes {
                    idle_ms: 175.0,
                    user_ms: 125.0,
                    ..CpuTimes::default()
                },
                &[],
            ),
        ]);
        assert_eq!(set.series["cpu_idle"].datapoints, vec![DataPoint(75.0, 1_000)]);
        assert_eq!(set.series["cpu_user"].datapoints, vec![DataPoint(25.0, 1_000)]);
        assert_eq!(set.series["cpu_steal"].datapoints, vec![DataPoint(0.0, 1_000)]);
    }

    #[test]
    fn idle_cpu_counters_skip_the_point() {
        let cpu = CpuTimes {
            idle_ms: 10.0,
            ..CpuTimes::default()
        };
        let set = derive(&[sample(0, cpu.clone(), &[]), sample(1_000, cpu, &[])]);
        assert!(set.series["cpu_idle"].is_empty());
    }

    #[test]
    fn disk_utilization_and_iops() {
        let set = derive(&[
            sample(0, CpuTimes::default(), &[("sda", disk(10.0, 10.0, 100.0, 40.0))]),
            sample(2_000, CpuTimes::default(), &[("sda", disk(30.0, 50.0, 300.0, 140.0))]),
        ]);
        let sda = &set.disks["sda"];
        assert_eq!(sda.utilization.datapoints, vec![DataPoint(50.0, 2_000)]);
        assert_eq!(sda.iops.datapoints, vec![DataPoint(30.0, 2_000)]);
        assert_eq!(sda.utilization.target, "sda");
    }

    #[test]
    fn glitched_disk_is_omitted_and_new_disks_wait_for_a_pair() {
        let set = derive(&[
            sample(0, CpuTimes::default(), &[("sda", disk(0.0, 0.0, 100.0, 0.0))]),
            sample(
                1_000,
                CpuTimes::default(),
                &[
                    // io time grew 5x the read/write time: utilization > 100
                    ("sda", disk(5.0, 0.0, 110.0, 50.0)),
                    ("sdb", disk(5.0, 0.0, 10.0, 5.0)),
                ],
            ),
        ]);
        assert!(!set.disks.contains_key("sda"));
        assert!(!set.disks.contains_key("sdb"));
    }

    #[test]
    fn idle_disk_reports_zero_utilization() {
        let d = disk(1.0, 1.0, 10.0, 10.0);
        let set = derive(&[
            sample(0, CpuTimes::default(), &[("nvme0n1", d.clone())]),
            sample(1_000, CpuTimes::default(), &[("nvme0n1", d)]),
        ]);
        let nvme = &set.disks["nvme0n1"];
        assert_eq!(nvme.utilization.datapoints, vec![DataPoint(0.0, 1_000)]);
        assert_eq!(nvme.iops.datapoints, vec![DataPoint(0.0, 1_000)]);
    }
}
