//! Concurrent decode of a batch of files into one time-ordered corpus.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::codec::{CaptureFile, DecodeError};
use crate::config::EngineConfig;
use crate::doc::{SampleDoc, ServerInfo};
use crate::error::{Error, Result};
use crate::lines::decode_lines;
use crate::reader::{collect_files, read_file, DecodeMode, Resolution};
use crate::series::fmt_millis;

/// Ordered samples plus the server identity they came with.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub server_info: Option<ServerInfo>,
    pub samples: Vec<SampleDoc>,
    /// Files that contributed samples.
    pub files: usize,
}

impl Corpus {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// (first, last) sample time in epoch ms.
    pub fn time_span(&self) -> Option<(i64, i64)> {
        let first = self.samples.first()?.sample_time();
        let last = self.samples.last()?.sample_time();
        Some((first, last))
    }
}

/// Decode `paths` with at most `config.pool_size()` files in flight, then
/// merge per-file results in filename order.
pub async fn aggregate(paths: &[PathBuf], config: &EngineConfig) -> Result<Corpus> {
    let files = collect_files(paths)?;
    let mode = DecodeMode::select(&files, config)?;
    let pool = config.pool_size();
    let started = Instant::now();
    info!(
        "reading {} files with {} second(s) interval, {} workers",
        files.len(),
        config.span,
        pool
    );

    let mut pending = files.iter().cloned();
    let mut set = JoinSet::new();
    let mut decoded: BTreeMap<String, Corpus> = BTreeMap::new();
    loop {
        while set.len() < pool {
            let Some(path) = pending.next() else { break };
            set.spawn_blocking(move || {
                let res = decode_file(&path, mode);
                (path, res)
            });
        }
        let Some(joined) = set.join_next().await else {
            break;
        };
        let (path, res) = joined?;
        let corpus = res?;
        if corpus.is_empty() {
            warn!("{}: no samples decoded, skipping", path.display());
            continue;
        }
        decoded.insert(path.to_string_lossy().into_owned(), corpus);
    }

    let merged = merge(decoded);
    let Some((from, to)) = merged.time_span() else {
        return Err(Error::NoDiagnosticData);
    };
    info!(
        "{} files loaded, {} samples, time spent: {:?}",
        files.len(),
        merged.samples.len(),
        started.elapsed()
    );
    info!("Stats from {} to {}", fmt_millis(from), fmt_millis(to));
    Ok(merged)
}

/// Concatenate in key order; the last non-empty identity document wins. With
/// no identity document at all, one is inferred from the first reported
/// server version.
fn merge(decoded: BTreeMap<String, Corpus>) -> Corpus {
    let mut merged = Corpus {
        files: decoded.len(),
        ..Corpus::default()
    };
    for (_, corpus) in decoded {
        if let Some(info) = corpus.server_info.filter(|i| !i.is_empty()) {
            merged.server_info = Some(info);
        }
        merged.samples.extend(corpus.samples);
    }
    if merged.server_info.is_none() {
        merged.server_info = merged
            .samples
            .iter()
            .filter_map(|s| s.server_status.as_ref())
            .map(|ss| ss.version.as_str())
            .find(|v| !v.is_empty())
            .map(ServerInfo::from_version);
    }
    merged
}

/// Read failures are fatal; anything the codec rejects yields an empty corpus.
fn decode_file(path: &Path, mode: DecodeMode) -> Result<Corpus> {
    let started = Instant::now();
    let buf = read_file(path)?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let corpus = match mode {
        DecodeMode::Lines => decode_lines(&name, &buf),
        DecodeMode::Capture(resolution) => match decode_capture(&buf, resolution) {
            Ok(c) => c,
            Err(e) => {
                warn!("{name}: not a readable capture file: {e}");
                Corpus::default()
            }
        },
    };
    debug!(
        "{name} samples: {}, time: {:?}",
        corpus.samples.len(),
        started.elapsed()
    );
    Ok(corpus)
}

fn decode_capture(buf: &[u8], resolution: Resolution) -> std::result::Result<Corpus, DecodeError> {
    let file = CaptureFile::parse(buf)?;
    let mut corpus = Corpus {
        server_info: file.metadata.map(ServerInfo::from_bson),
        ..Corpus::default()
    };
    for chunk in &file.chunks {
        match resolution {
            Resolution::Summary => corpus.samples.push(chunk.reference_values().sample_doc(0)),
            Resolution::Full { span } => match chunk.decode() {
                Ok(samples) => {
                    for i in (0..samples.len()).step_by(span.max(1) as usize) {
                        corpus.samples.push(samples.sample_doc(i));
                    }
                }
                Err(e) => warn!("skipping chunk of {} samples: {e}", chunk.sample_count()),
            },
        }
    }
    Ok(corpus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::testutil::{chunk_doc, file_bytes, metadata_doc};
    use bson::{doc, Document};
    use std::fs;

    fn sample(t: i64) -> Document {
        doc! {
            "start": bson::DateTime::from_millis(t),
            "serverStatus": {
                "uptime": (t / 1000) as f64,
                "localTime": bson::DateTime::from_millis(t),
                "opcounters": { "query": t / 100 },
            },
            "end": bson::DateTime::from_millis(t),
        }
    }

    fn capture(dir: &Path, name: &str, host: &str, times: &[i64]) -> PathBuf {
        let samples: Vec<Document> = times.iter().map(|t| sample(*t)).collect();
        let meta = metadata_doc(doc! { "hostInfo": { "system": { "hostname": host } } });
        let p = dir.join(name);
        fs::write(&p, file_bytes(&[meta, chunk_doc(&samples)])).unwrap();
        p
    }

    fn config(workers: usize) -> EngineConfig {
        EngineConfig {
            workers: Some(workers),
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn merged_corpus_is_time_ordered() {
        let td = tempfile::tempdir().unwrap();
        // written newest first; names sort chronologically
        capture(td.path(), "metrics.2019-10-03", "c", &[7_000, 8_000, 9_000]);
        capture(td.path(), "metrics.2019-10-01", "a", &[1_000, 2_000, 3_000]);
        capture(td.path(), "metrics.2019-10-02", "b", &[4_000, 5_000, 6_000]);

        let corpus = aggregate(&[td.path().to_path_buf()], &config(3)).await.unwrap();
        let times: Vec<i64> = corpus.samples.iter().map(SampleDoc::sample_time).collect();
        assert_eq!(times.len(), 9);
        assert!(times.windows(2).all(|w| w[0] <= w[1]), "{times:?}");
        assert_eq!(corpus.time_span(), Some((1_000, 9_000)));
        // last file in name order supplies the identity
        assert_eq!(corpus.server_info.unwrap().hostname(), Some("c"));
    }

    #[tokio::test]
    async fn span_subsamples_and_summary_takes_references() {
        let td = tempfile::tempdir().unwrap();
        let times: Vec<i64> = (1..=5).map(|i| i * 1_000).collect();
        let p = capture(td.path(), "metrics.1", "a", &times);

        let full = aggregate(&[p.clone()], &config(1).with_span(2)).await.unwrap();
        let got: Vec<i64> = full.samples.iter().map(SampleDoc::sample_time).collect();
        assert_eq!(got, vec![1_000, 3_000, 5_000]);

        let summary = aggregate(&[p], &config(1).with_span(300)).await.unwrap();
        assert_eq!(summary.samples.len(), 1);
        assert_eq!(summary.samples[0].sample_time(), 1_000);
    }

    #[tokio::test]
    async fn corrupt_files_are_skipped_until_nothing_is_left() {
        let td = tempfile::tempdir().unwrap();
        capture(td.path(), "metrics.1", "a", &[1_000, 2_000]);
        fs::write(td.path().join("metrics.2"), b"garbage").unwrap();
        let corpus = aggregate(&[td.path().to_path_buf()], &config(2)).await.unwrap();
        assert_eq!(corpus.samples.len(), 2);
        assert_eq!(corpus.files, 1);

        let bad = tempfile::tempdir().unwrap();
        fs::write(bad.path().join("metrics.1"), b"garbage").unwrap();
        let err = aggregate(&[bad.path().to_path_buf()], &config(2)).await.unwrap_err();
        assert!(matches!(err, Error::NoDiagnosticData));
    }

    #[tokio::test]
    async fn identity_line_beats_inferred_version() {
        let td = tempfile::tempdir().unwrap();
        let status = r#"[{"version":"4.0.3","uptime":10,"localTime":"2019-10-01T00:00:10Z"}]"#;
        let info = r#"{"hostInfo":{"system":{"hostname":"db1"}}}"#;
        fs::write(td.path().join("keyhole_stats.1"), format!("{info}\n{status}\n")).unwrap();
        fs::write(td.path().join("keyhole_stats.2"), format!("{status}\n")).unwrap();
        let corpus = aggregate(&[td.path().to_path_buf()], &config(2)).await.unwrap();
        assert_eq!(corpus.server_info.unwrap().hostname(), Some("db1"));

        let bare = tempfile::tempdir().unwrap();
        fs::write(bare.path().join("keyhole_stats.1"), format!("{status}\n")).unwrap();
        let corpus = aggregate(&[bare.path().to_path_buf()], &config(1)).await.unwrap();
        assert_eq!(corpus.server_info.unwrap().version(), Some("4.0.3"));
    }
}
