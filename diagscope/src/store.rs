//! Rebuildable in-memory series store behind a reader/writer lock.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::aggregate::aggregate;
use crate::config::EngineConfig;
use crate::derive::{self, DISKS_IOPS, DISKS_UTILS, REPLICATION_LAGS};
use crate::doc::ServerInfo;
use crate::error::Result;
use crate::query::{QueryRequest, QueryResult, Table, TargetType};
use crate::series::{fmt_millis, DiskSeries, SeriesMap, TimeSeries};

/// Everything one rebuild produced. Replaced wholesale, never patched.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub series: SeriesMap,
    pub disks: BTreeMap<String, DiskSeries>,
    pub legends: BTreeMap<String, String>,
    pub server_info: Option<ServerInfo>,
    /// (first, last) sample time, epoch ms
    pub span: Option<(i64, i64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebuildSummary {
    pub files: usize,
    pub samples: usize,
    pub series: usize,
    pub from: Option<String>,
    pub to: Option<String>,
    /// Dashboard path pinned to the covered range.
    pub endpoint: Option<String>,
}

pub const DASHBOARD_PATH: &str = "/d/diagscope/diagnostics";

pub struct SeriesStore {
    config: EngineConfig,
    snapshot: RwLock<Snapshot>,
    // held across a whole rebuild so installs land in call order
    rebuilding: Mutex<()>,
}

impl SeriesStore {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            snapshot: RwLock::new(Snapshot::default()),
            rebuilding: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Re-run the whole pipeline over `paths`. The current snapshot keeps
    /// serving until the new one is complete; on error it is left untouched.
    /// Concurrent rebuilds run one at a time, in the order they were called.
    pub async fn rebuild(&self, paths: &[PathBuf]) -> Result<RebuildSummary> {
        let _turn = self.rebuilding.lock().await;
        let corpus = Arc::new(aggregate(paths, &self.config).await?);
        let set = derive::build(Arc::clone(&corpus)).await?;
        let span = corpus.time_span();
        let summary = RebuildSummary {
            files: corpus.files,
            samples: corpus.samples.len(),
            series: set.populated(),
            from: span.map(|(f, _)| fmt_millis(f)),
            to: span.map(|(_, t)| fmt_millis(t)),
            endpoint: span.map(|(f, t)| format!("{DASHBOARD_PATH}?orgId=1&from={f}&to={t}")),
        };
        self.install(Snapshot {
            series: set.series,
            disks: set.disks,
            legends: set.legends,
            server_info: corpus.server_info.clone(),
            span,
        })
        .await;
        info!(
            "store rebuilt: {} files, {} samples, {} series",
            summary.files, summary.samples, summary.series
        );
        Ok(summary)
    }

    /// Swap in a complete snapshot.
    pub async fn install(&self, snapshot: Snapshot) {
        *self.snapshot.write().await = snapshot;
    }

    /// One result per timeserie target (groups expand to several), one table
    /// per table target. Unknown keys answer with an empty series.
    pub async fn query(&self, req: &QueryRequest) -> Vec<QueryResult> {
        let snap = self.snapshot.read().await;
        let (from, to) = match &req.time_range {
            Some(r) => {
                let (f, t) = r.bounds_ms();
                (Some(f), Some(t))
            }
            None => (None, None),
        };
        let mut out = Vec::with_capacity(req.targets.len());
        for target in &req.targets {
            match target.kind {
                TargetType::Table => {
                    let rows = snap
                        .server_info
                        .as_ref()
                        .map(ServerInfo::flatten)
                        .unwrap_or_default();
                    out.push(QueryResult::Table(Table::key_value(rows)));
                }
                TargetType::Timeserie => out.extend(
                    snap.resolve(&target.target, from, to)
                        .into_iter()
                        .map(QueryResult::Series),
                ),
            }
        }
        out
    }

    /// Every queryable key, sorted.
    pub async fn search(&self) -> Vec<String> {
        let snap = self.snapshot.read().await;
        let mut keys: Vec<String> = snap.series.keys().cloned().collect();
        for disk in snap.disks.keys() {
            keys.push(format!("{DISKS_UTILS}.{disk}"));
            keys.push(format!("{DISKS_IOPS}.{disk}"));
        }
        keys.sort();
        keys
    }

    pub async fn server_info(&self) -> Option<ServerInfo> {
        self.snapshot.read().await.server_info.clone()
    }

    pub async fn span(&self) -> Option<(i64, i64)> {
        self.snapshot.read().await.span
    }
}

impl Snapshot {
    fn resolve(&self, key: &str, from: Option<i64>, to: Option<i64>) -> Vec<TimeSeries> {
        match key {
            DISKS_UTILS => self
                .disks
                .values()
                .map(|d| d.utilization.window(from, to))
                .collect(),
            DISKS_IOPS => self.disks.values().map(|d| d.iops.window(from, to)).collect(),
            REPLICATION_LAGS => self
                .legends
                .iter()
                .filter_map(|(k, legend)| {
                    self.series
                        .get(k)
                        .map(|s| s.window(from, to).renamed(legend.as_str()))
                })
                .collect(),
            _ => {
                let disk = |prefix: &str| {
                    key.strip_prefix(prefix)
                        .and_then(|rest| rest.strip_prefix('.'))
                        .and_then(|name| self.disks.get(name))
                };
                let found = if let Some(d) = disk(DISKS_UTILS) {
                    Some(&d.utilization)
                } else if let Some(d) = disk(DISKS_IOPS) {
                    Some(&d.iops)
                } else {
                    self.series.get(key)
                };
                let series = match found {
                    Some(s) => s.window(from, to).renamed(key),
                    None => TimeSeries::new(key),
                };
                vec![series]
            }
        }
    }
}
