//! Diagnostic capture decoding and derived time series for charting.
//!
//! [`SeriesStore::rebuild`] expands input paths, decodes capture files on a
//! bounded worker pool, derives per-metric series and swaps them into the
//! store; [`SeriesStore::query`] and [`SeriesStore::search`] answer the
//! simple-JSON charting protocol.

pub mod aggregate;
pub mod codec;
pub mod config;
pub mod derive;
pub mod doc;
pub mod error;
pub mod lines;
pub mod query;
pub mod reader;
pub mod series;
pub mod store;

pub use aggregate::{aggregate, Corpus};
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use query::{QueryRequest, QueryResult, Target, TargetType, TimeRange};
pub use series::{DataPoint, TimeSeries};
pub use store::{RebuildSummary, SeriesStore, Snapshot};
