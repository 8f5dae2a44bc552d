//! keyhole_stats files: newline-delimited JSON, one record per line.
//!
//! A line is a batch of server status documents, a batch of replica set
//! status documents, or the server identity document. The role is read off
//! the line's shape, so line order does not matter.

use serde_json::Value;
use tracing::warn;

use crate::aggregate::Corpus;
use crate::doc::{ReplSetStatus, SampleDoc, ServerInfo, ServerStatus};

#[derive(Debug)]
pub enum LineRecord {
    ServerStatus(Vec<ServerStatus>),
    ReplSet(Vec<ReplSetStatus>),
    ServerInfo(ServerInfo),
}

impl LineRecord {
    /// `Ok(None)` for blank lines and records with nothing to contribute.
    pub fn parse(line: &str) -> Result<Option<Self>, serde_json::Error> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        match serde_json::from_str::<Value>(line)? {
            Value::Array(items) if items.is_empty() => Ok(None),
            Value::Array(items) => {
                let is_repl = items
                    .iter()
                    .any(|v| v.get("members").is_some_and(Value::is_array));
                if is_repl {
                    let batch = serde_json::from_value(Value::Array(items))?;
                    Ok(Some(LineRecord::ReplSet(batch)))
                } else {
                    let batch = serde_json::from_value(Value::Array(items))?;
                    Ok(Some(LineRecord::ServerStatus(batch)))
                }
            }
            obj @ Value::Object(_) => Ok(Some(LineRecord::ServerInfo(ServerInfo(obj)))),
            _ => Ok(None),
        }
    }
}

/// Decode one keyhole_stats file. Bad lines are skipped with a warning.
pub fn decode_lines(name: &str, buf: &[u8]) -> Corpus {
    let text = String::from_utf8_lossy(buf);
    let mut corpus = Corpus::default();
    for (n, line) in text.lines().enumerate() {
        let record = match LineRecord::parse(line) {
            Ok(Some(r)) => r,
            Ok(None) => continue,
            Err(e) => {
                warn!("{name}:{}: skipping unreadable line: {e}", n + 1);
                continue;
            }
        };
        match record {
            LineRecord::ServerStatus(batch) => {
                for ss in batch {
                    corpus.samples.push(SampleDoc {
                        start: ss.local_time,
                        end: ss.local_time,
                        server_status: Some(ss),
                        ..SampleDoc::default()
                    });
                }
            }
            LineRecord::ReplSet(batch) => {
                for rs in batch {
                    corpus.samples.push(SampleDoc {
                        start: rs.date,
                        end: rs.date,
                        repl_set: Some(rs),
                        ..SampleDoc::default()
                    });
                }
            }
            LineRecord::ServerInfo(info) => {
                if !info.is_empty() {
                    corpus.server_info = Some(info);
                }
            }
        }
    }
    // batches interleave two streams; restore time order without reordering ties
    corpus.samples.sort_by_key(SampleDoc::sample_time);
    corpus
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &str = r#"[{"version":"4.0.3","uptime":10,"localTime":"2019-10-01T00:00:10Z"},{"version":"4.0.3","uptime":20,"localTime":"2019-10-01T00:00:20Z"}]"#;
    const REPL: &str = r#"[{"date":"2019-10-01T00:00:15Z","members":[{"name":"a:1","state":1,"optime":5}]}]"#;
    const INFO: &str = r#"{"hostInfo":{"system":{"hostname":"db1"}},"buildInfo":{"version":"4.0.3"}}"#;

    #[test]
    fn records_are_tagged_by_shape() {
        assert!(matches!(
            LineRecord::parse(STATUS).unwrap(),
            Some(LineRecord::ServerStatus(v)) if v.len() == 2
        ));
        assert!(matches!(
            LineRecord::parse(REPL).unwrap(),
            Some(LineRecord::ReplSet(v)) if v.len() == 1
        ));
        assert!(matches!(
            LineRecord::parse(INFO).unwrap(),
            Some(LineRecord::ServerInfo(_))
        ));
        assert!(LineRecord::parse("   ").unwrap().is_none());
        assert!(LineRecord::parse("[]").unwrap().is_none());
        assert!(LineRecord::parse("{oops").is_err());
    }

    #[test]
    fn line_order_does_not_matter() {
        let shuffled = format!("{INFO}\n{REPL}\n{STATUS}\n");
        let corpus = decode_lines("keyhole_stats.1", shuffled.as_bytes());
        assert_eq!(corpus.samples.len(), 3);
        let times: Vec<i64> = corpus.samples.iter().map(SampleDoc::sample_time).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
        assert!(corpus.samples[1].repl_set.is_some());
        let info = corpus.server_info.unwrap();
        assert_eq!(info.hostname(), Some("db1"));
    }

    #[test]
    fn status_lines_keep_their_version() {
        let corpus = decode_lines("keyhole_stats.2", format!("{STATUS}\n").as_bytes());
        assert!(corpus.server_info.is_none());
        let ss = corpus.samples[0].server_status.as_ref().unwrap();
        assert_eq!(ss.version, "4.0.3");
    }

    #[test]
    fn bad_lines_are_skipped() {
        let text = format!("not json\n{STATUS}\n");
        let corpus = decode_lines("keyhole_stats.3", text.as_bytes());
        assert_eq!(corpus.samples.len(), 2);
    }
}
