//! Sample documents as decoded from capture files or keyhole_stats lines.
//!
//! Field names mirror the server's own output (`serverStatus`,
//! `replSetGetStatus`, `systemMetrics`) so the same structs deserialize from
//! JSON lines and can be rebuilt from flattened capture field paths.

use std::collections::BTreeMap;

use bson::{Bson, Document};
use serde::{Deserialize, Deserializer, Serialize};

pub const STATE_PRIMARY: i32 = 1;
pub const STATE_SECONDARY: i32 = 2;
pub const STATE_ARBITER: i32 = 7;

/// One snapshot at an instant. Any section may be absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleDoc {
    pub start: i64,
    pub end: i64,
    pub server_status: Option<ServerStatus>,
    pub repl_set: Option<ReplSetStatus>,
    pub system_metrics: Option<SystemMetrics>,
}

impl SampleDoc {
    /// Best timestamp for ordering (epoch ms).
    pub fn sample_time(&self) -> i64 {
        if let Some(ss) = &self.server_status {
            if ss.local_time != 0 {
                return ss.local_time;
            }
        }
        if let Some(rs) = &self.repl_set {
            if rs.date != 0 {
                return rs.date;
            }
        }
        if let Some(sm) = &self.system_metrics {
            if sm.start != 0 {
                return sm.start;
            }
        }
        self.start
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerStatus {
    pub host: String,
    pub version: String,
    pub uptime: f64,
    #[serde(deserialize_with = "epoch_millis")]
    pub local_time: i64,
    pub mem: Mem,
    pub connections: Connections,
    #[serde(rename = "extra_info")]
    pub extra_info: ExtraInfo,
    pub global_lock: GlobalLock,
    #[serde(rename = "opcounters")]
    pub op_counters: OpCounters,
    pub op_latencies: OpLatencies,
    pub metrics: ServerMetrics,
    pub wired_tiger: WiredTiger,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mem {
    pub resident: f64,
    #[serde(rename = "virtual")]
    pub virtual_size: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Connections {
    pub current: f64,
    pub available: f64,
    pub total_created: f64,
    pub active: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtraInfo {
    pub page_faults: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlobalLock {
    pub active_clients: ReadWrite,
    pub current_queue: ReadWrite,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadWrite {
    pub readers: f64,
    pub writers: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpCounters {
    pub query: f64,
    pub insert: f64,
    pub update: f64,
    pub delete: f64,
    pub getmore: f64,
    pub command: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpLatencies {
    pub reads: Latency,
    pub writes: Latency,
    pub commands: Latency,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Latency {
    /// Cumulative microseconds.
    pub latency: f64,
    pub ops: f64,
}

impl Latency {
    /// Average milliseconds per op, zero when no ops were recorded.
    pub fn average_ms(&self) -> f64 {
        if self.ops > 0.0 {
            self.latency / self.ops / 1000.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerMetrics {
    pub query_executor: QueryExecutor,
    pub operation: Operation,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueryExecutor {
    pub scanned: f64,
    pub scanned_objects: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Operation {
    pub scan_and_order: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WiredTiger {
    pub cache: Cache,
    pub concurrent_transactions: ConcurrentTransactions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Cache {
    #[serde(rename = "maximum bytes configured")]
    pub max_bytes_configured: f64,
    #[serde(rename = "bytes currently in the cache")]
    pub currently_in_cache: f64,
    #[serde(rename = "tracked dirty bytes in the cache")]
    pub tracked_dirty_bytes: f64,
    #[serde(rename = "modified pages evicted")]
    pub modified_pages_evicted: f64,
    #[serde(rename = "unmodified pages evicted")]
    pub unmodified_pages_evicted: f64,
    #[serde(rename = "pages read into cache")]
    pub pages_read_into_cache: f64,
    #[serde(rename = "pages written from cache")]
    pub pages_written_from_cache: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrentTransactions {
    pub read: Tickets,
    pub write: Tickets,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tickets {
    pub available: f64,
}

impl ServerStatus {
    /// Rebuild from flattened numeric fields; `get` receives paths relative
    /// to `serverStatus` (e.g. `mem.resident`).
    pub fn from_fields<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<i64>,
    {
        let f = |path: &str| get(path).unwrap_or(0) as f64;
        let latency = |op: &str| Latency {
            latency: f(&format!("opLatencies.{op}.latency")),
            ops: f(&format!("opLatencies.{op}.ops")),
        };
        let cache = |name: &str| f(&format!("wiredTiger.cache.{name}"));
        Self {
            host: String::new(),
            version: String::new(),
            uptime: f("uptime"),
            local_time: get("localTime").unwrap_or(0),
            mem: Mem {
                resident: f("mem.resident"),
                virtual_size: f("mem.virtual"),
            },
            connections: Connections {
                current: f("connections.current"),
                available: f("connections.available"),
                total_created: f("connections.totalCreated"),
                active: f("connections.active"),
            },
            extra_info: ExtraInfo {
                page_faults: f("extra_info.page_faults"),
            },
            global_lock: GlobalLock {
                active_clients: ReadWrite {
                    readers: f("globalLock.activeClients.readers"),
                    writers: f("globalLock.activeClients.writers"),
                },
                current_queue: ReadWrite {
                    readers: f("globalLock.currentQueue.readers"),
                    writers: f("globalLock.currentQueue.writers"),
                },
            },
            op_counters: OpCounters {
                query: f("opcounters.query"),
                insert: f("opcounters.insert"),
                update: f("opcounters.update"),
                delete: f("opcounters.delete"),
                getmore: f("opcounters.getmore"),
                command: f("opcounters.command"),
            },
            op_latencies: OpLatencies {
                reads: latency("reads"),
                writes: latency("writes"),
                commands: latency("commands"),
            },
            metrics: ServerMetrics {
                query_executor: QueryExecutor {
                    scanned: f("metrics.queryExecutor.scanned"),
                    scanned_objects: f("metrics.queryExecutor.scannedObjects"),
                },
                operation: Operation {
                    scan_and_order: f("metrics.operation.scanAndOrder"),
                },
            },
            wired_tiger: WiredTiger {
                cache: Cache {
                    max_bytes_configured: cache("maximum bytes configured"),
                    currently_in_cache: cache("bytes currently in the cache"),
                    tracked_dirty_bytes: cache("tracked dirty bytes in the cache"),
                    modified_pages_evicted: cache("modified pages evicted"),
                    unmodified_pages_evicted: cache("unmodified pages evicted"),
                    pages_read_into_cache: cache("pages read into cache"),
                    pages_written_from_cache: cache("pages written from cache"),
                },
                concurrent_transactions: ConcurrentTransactions {
                    read: Tickets {
                        available: f("wiredTiger.concurrentTransactions.read.available"),
                    },
                    write: Tickets {
                        available: f("wiredTiger.concurrentTransactions.write.available"),
                    },
                },
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplSetStatus {
    #[serde(deserialize_with = "epoch_millis")]
    pub date: i64,
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Member {
    pub name: String,
    pub state: i32,
    /// Replication progress marker, seconds.
    #[serde(deserialize_with = "optime_seconds")]
    pub optime: i64,
}

impl ReplSetStatus {
    /// Read from a capture reference document's `replSetGetStatus` section.
    pub fn from_bson(doc: &Document) -> Option<Self> {
        let members = doc.get_array("members").ok()?;
        let members = members
            .iter()
            .filter_map(|m| match m {
                Bson::Document(m) => Some(Member {
                    name: m.get_str("name").unwrap_or_default().to_string(),
                    state: m.get("state").and_then(bson_i64).unwrap_or(0) as i32,
                    optime: m.get("optime").map(bson_optime).unwrap_or(0),
                }),
                _ => None,
            })
            .collect();
        Some(Self {
            date: doc.get("date").and_then(bson_i64).unwrap_or(0),
            members,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemMetrics {
    pub start: i64,
    pub cpu: CpuTimes,
    pub disks: BTreeMap<String, DiskCounters>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuTimes {
    pub user_ms: f64,
    pub nice_ms: f64,
    pub system_ms: f64,
    pub idle_ms: f64,
    pub iowait_ms: f64,
    pub softirq_ms: f64,
    pub steal_ms: f64,
}

impl CpuTimes {
    pub fn total_ms(&self) -> f64 {
        self.user_ms
            + self.nice_ms
            + self.system_ms
            + self.idle_ms
            + self.iowait_ms
            + self.softirq_ms
            + self.steal_ms
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiskCounters {
    pub reads: f64,
    pub writes: f64,
    pub read_time_ms: f64,
    pub write_time_ms: f64,
    pub io_time_ms: f64,
}

const DISK_FIELDS: [&str; 5] = ["reads", "writes", "read_time_ms", "write_time_ms", "io_time_ms"];

impl SystemMetrics {
    /// Rebuild from flattened fields relative to `systemMetrics`. `paths`
    /// lists every flattened path of the section so disks can be discovered.
    pub fn from_fields<'a, F, I>(paths: I, get: F) -> Self
    where
        F: Fn(&str) -> Option<i64>,
        I: IntoIterator<Item = &'a str>,
    {
        let f = |path: &str| get(path).unwrap_or(0) as f64;
        let mut disks = BTreeMap::new();
        for path in paths {
            let Some(rest) = path.strip_prefix("disks.") else {
                continue;
            };
            // disk names may contain dots; the counter name never does
            if let Some((name, field)) = rest.rsplit_once('.') {
                if DISK_FIELDS.contains(&field) && !disks.contains_key(name) {
                    let at = |c: &str| f(&format!("disks.{name}.{c}"));
                    disks.insert(
                        name.to_string(),
                        DiskCounters {
                            reads: at("reads"),
                            writes: at("writes"),
                            read_time_ms: at("read_time_ms"),
                            write_time_ms: at("write_time_ms"),
                            io_time_ms: at("io_time_ms"),
                        },
                    );
                }
            }
        }
        Self {
            start: get("start").unwrap_or(0),
            cpu: CpuTimes {
                user_ms: f("cpu.user_ms"),
                nice_ms: f("cpu.nice_ms"),
                system_ms: f("cpu.system_ms"),
                idle_ms: f("cpu.idle_ms"),
                iowait_ms: f("cpu.iowait_ms"),
                softirq_ms: f("cpu.softirq_ms"),
                steal_ms: f("cpu.steal_ms"),
            },
            disks,
        }
    }
}

/// The server identity document (hostInfo, buildInfo, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerInfo(pub serde_json::Value);

impl ServerInfo {
    pub fn from_bson(doc: Document) -> Self {
        Self(Bson::Document(doc).into_relaxed_extjson())
    }

    /// Stand-in used when a keyhole_stats file carries no identity line.
    pub fn from_version(version: &str) -> Self {
        Self(serde_json::json!({ "buildInfo": { "version": version } }))
    }

    pub fn is_empty(&self) -> bool {
        match &self.0 {
            serde_json::Value::Null => true,
            serde_json::Value::Object(m) => m.is_empty(),
            _ => false,
        }
    }

    pub fn hostname(&self) -> Option<&str> {
        self.0.pointer("/hostInfo/system/hostname")?.as_str()
    }

    pub fn version(&self) -> Option<&str> {
        self.0.pointer("/buildInfo/version")?.as_str()
    }

    /// Dotted key/value pairs of every scalar leaf, in document order.
    pub fn flatten(&self) -> Vec<(String, String)> {
        fn walk(prefix: &str, v: &serde_json::Value, out: &mut Vec<(String, String)>) {
            let join = |k: &str| {
                if prefix.is_empty() {
                    k.to_string()
                } else {
                    format!("{prefix}.{k}")
                }
            };
            match v {
                serde_json::Value::Object(m) => {
                    for (k, v) in m {
                        walk(&join(k), v, out);
                    }
                }
                serde_json::Value::Array(a) => {
                    for (i, v) in a.iter().enumerate() {
                        walk(&join(&i.to_string()), v, out);
                    }
                }
                serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
                serde_json::Value::Null => {}
                other => out.push((prefix.to_string(), other.to_string())),
            }
        }
        let mut out = Vec::new();
        walk("", &self.0, &mut out);
        out
    }
}

fn bson_i64(v: &Bson) -> Option<i64> {
    match v {
        Bson::Int32(i) => Some(*i as i64),
        Bson::Int64(i) => Some(*i),
        Bson::Double(d) => Some(*d as i64),
        Bson::DateTime(dt) => Some(dt.timestamp_millis()),
        Bson::Boolean(b) => Some(*b as i64),
        _ => None,
    }
}

// optime is a bare Timestamp (pv0) or { ts: Timestamp, t: term } (pv1)
fn bson_optime(v: &Bson) -> i64 {
    match v {
        Bson::Timestamp(ts) => ts.time as i64,
        Bson::Document(d) => d.get("ts").map(bson_optime).unwrap_or(0),
        other => bson_i64(other).unwrap_or(0),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TimeRepr {
    Millis(i64),
    Float(f64),
    Text(String),
    Extended {
        #[serde(rename = "$date")]
        date: Box<TimeRepr>,
    },
    Long {
        #[serde(rename = "$numberLong")]
        value: String,
    },
    Null(()),
}

impl TimeRepr {
    fn millis(self) -> i64 {
        match self {
            TimeRepr::Millis(ms) => ms,
            TimeRepr::Float(ms) => ms as i64,
            TimeRepr::Text(s) => chrono::DateTime::parse_from_rfc3339(&s)
                .map(|t| t.timestamp_millis())
                .unwrap_or(0),
            TimeRepr::Extended { date } => date.millis(),
            TimeRepr::Long { value } => value.parse().unwrap_or(0),
            TimeRepr::Null(()) => 0,
        }
    }
}

/// Accepts epoch millis, RFC 3339 text, or extended JSON `{"$date": ..}`.
fn epoch_millis<'de, D>(d: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(TimeRepr::deserialize(d)?.millis())
}

#[derive(Deserialize)]
struct TimestampParts {
    t: i64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OptimeRepr {
    Seconds(i64),
    Float(f64),
    Extended {
        #[serde(rename = "$timestamp")]
        ts: TimestampParts,
    },
    Go {
        #[serde(rename = "T")]
        t: i64,
    },
    Wrapped {
        ts: Box<OptimeRepr>,
    },
    Null(()),
}

impl OptimeRepr {
    fn seconds(self) -> i64 {
        match self {
            OptimeRepr::Seconds(s) => s,
            OptimeRepr::Float(s) => s as i64,
            OptimeRepr::Extended { ts } => ts.t,
            OptimeRepr::Go { t } => t,
            OptimeRepr::Wrapped { ts } => ts.seconds(),
            OptimeRepr::Null(()) => 0,
        }
    }
}

fn optime_seconds<'de, D>(d: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(OptimeRepr::deserialize(d)?.seconds())
}
