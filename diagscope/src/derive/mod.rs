//! Derived series: four independent passes over one ordered corpus.

mod replication;
mod server_status;
mod storage_engine;
mod system;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::aggregate::Corpus;
use crate::doc::SampleDoc;
use crate::error::Result;
use crate::series::{DiskSeries, SeriesMap};

pub use replication::member_legend;

/// Group keys that expand into one series per disk or member at query time.
pub const DISKS_UTILS: &str = "disks_utils";
pub const DISKS_IOPS: &str = "disks_iops";
pub const REPLICATION_LAGS: &str = "replication_lags";

/// Output of one or more passes. Passes write disjoint keys.
#[derive(Debug, Clone, Default)]
pub struct SeriesSet {
    pub series: SeriesMap,
    pub disks: BTreeMap<String, DiskSeries>,
    /// `repl_<n>` -> member legend (`host:port`)
    pub legends: BTreeMap<String, String>,
}

impl SeriesSet {
    fn merge(&mut self, other: SeriesSet) {
        self.series.extend(other.series);
        self.disks.extend(other.disks);
        self.legends.extend(other.legends);
    }

    /// Series holding at least one point, disks counted per series.
    pub fn populated(&self) -> usize {
        let disks: usize = self
            .disks
            .values()
            .map(|d| usize::from(!d.utilization.is_empty()) + usize::from(!d.iops.is_empty()))
            .sum();
        self.series.values().filter(|s| !s.is_empty()).count() + disks
    }
}

/// Run every pass on its own blocking task and merge once all have finished.
pub async fn build(corpus: Arc<Corpus>) -> Result<SeriesSet> {
    let started = Instant::now();
    let run = |pass: fn(&[SampleDoc]) -> SeriesSet| {
        let corpus = Arc::clone(&corpus);
        tokio::task::spawn_blocking(move || pass(&corpus.samples))
    };
    let (status, engine, system, repl) = tokio::try_join!(
        run(server_status::derive),
        run(storage_engine::derive),
        run(system::derive),
        run(replication::derive),
    )?;

    let mut set = SeriesSet::default();
    for part in [status, engine, system, repl] {
        set.merge(part);
    }
    let host = corpus
        .server_info
        .as_ref()
        .and_then(|i| i.hostname())
        .unwrap_or("unknown host");
    info!(
        "data points ready for {host}, {} series, time spent: {:?}",
        set.populated(),
        started.elapsed()
    );
    Ok(set)
}

/// Elapsed minutes between two epoch-ms instants, never below one.
fn elapsed_minutes(prev_ms: i64, cur_ms: i64) -> f64 {
    ((cur_ms - prev_ms) as f64 / 60_000.0).max(1.0)
}
