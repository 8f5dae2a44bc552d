//! Named time series in the charting wire shape: `{target, datapoints: [[v, ms]]}`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// `[value, epoch_ms]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint(pub f64, pub i64);

impl DataPoint {
    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn timestamp(&self) -> i64 {
        self.1
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub target: String,
    pub datapoints: Vec<DataPoint>,
}

pub type SeriesMap = BTreeMap<String, TimeSeries>;

impl TimeSeries {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            datapoints: Vec::new(),
        }
    }

    /// Negative values are recorded as 0; NaN/inf points are dropped.
    pub fn push(&mut self, value: f64, timestamp: i64) {
        if !value.is_finite() {
            return;
        }
        self.datapoints.push(DataPoint(value.max(0.0), timestamp));
    }

    pub fn len(&self) -> usize {
        self.datapoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datapoints.is_empty()
    }

    /// Copy of the points inside the inclusive `[from, to]` window, ascending
    /// by timestamp. `None` bounds are open.
    pub fn window(&self, from: Option<i64>, to: Option<i64>) -> TimeSeries {
        let mut datapoints: Vec<DataPoint> = self
            .datapoints
            .iter()
            .filter(|p| from.map_or(true, |f| p.1 >= f) && to.map_or(true, |t| p.1 <= t))
            .copied()
            .collect();
        datapoints.sort_by_key(|p| p.1);
        TimeSeries {
            target: self.target.clone(),
            datapoints,
        }
    }

    pub fn renamed(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }
}

/// Per-disk utilization (%) and IOPS.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiskSeries {
    pub utilization: TimeSeries,
    pub iops: TimeSeries,
}

impl DiskSeries {
    pub fn new(disk: &str) -> Self {
        Self {
            utilization: TimeSeries::new(disk),
            iops: TimeSeries::new(disk),
        }
    }
}

/// Registers empty series for every key in `keys`.
pub fn with_keys(keys: &[&str]) -> SeriesMap {
    keys.iter()
        .map(|k| (k.to_string(), TimeSeries::new(*k)))
        .collect()
}

pub fn fmt_millis(ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ms.to_string())
}
