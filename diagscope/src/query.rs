//! Wire types for the simple-JSON charting protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::series::TimeSeries;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(rename = "range", default)]
    pub time_range: Option<TimeRange>,
    #[serde(default)]
    pub targets: Vec<Target>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn bounds_ms(&self) -> (i64, i64) {
        (self.from.timestamp_millis(), self.to.timestamp_millis())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Target {
    pub target: String,
    #[serde(rename = "refId", default)]
    pub ref_id: String,
    #[serde(rename = "type", default)]
    pub kind: TargetType,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    #[default]
    Timeserie,
    Table,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Two string columns, `Key` and `Value`.
    pub fn key_value(rows: Vec<(String, String)>) -> Self {
        let column = |text: &str| Column {
            text: text.to_string(),
            kind: "string".to_string(),
        };
        Self {
            kind: "table",
            columns: vec![column("Key"), column("Value")],
            rows: rows.into_iter().map(|(k, v)| vec![k, v]).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    Series(TimeSeries),
    Table(Table),
}
