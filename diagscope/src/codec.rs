//! Capture file codec: a file is a run of BSON documents; type 0 carries the
//! server identity, type 1 a zlib chunk of samples delta-encoded against a
//! reference document.

use std::collections::HashMap;
use std::io::Read;

use bson::{Bson, Document};
use bytes::Buf;
use flate2::read::ZlibDecoder;
use tracing::warn;

use crate::doc::{ReplSetStatus, SampleDoc, ServerStatus, SystemMetrics};

const TYPE_METADATA: i32 = 0;
const TYPE_METRIC_CHUNK: i32 = 1;
// refuse absurd length headers from corrupt chunks
const MAX_CHUNK_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("bad bson document: {0}")]
    Bson(#[from] bson::de::Error),
    #[error("chunk inflate failed: {0}")]
    Inflate(#[from] std::io::Error),
    #[error("truncated {0}")]
    Truncated(&'static str),
    #[error("varint longer than 64 bits")]
    VarintOverflow,
    #[error("reference document has {found} metrics, chunk header says {expected}")]
    SchemaMismatch { expected: usize, found: usize },
    #[error("chunk header says {expected} bytes, inflated to {found}")]
    LengthMismatch { expected: usize, found: usize },
    #[error("chunk header claims {samples} samples of {metrics} metrics")]
    Oversized { metrics: usize, samples: usize },
}

/// A parsed capture file: identity document plus undecoded chunks.
#[derive(Debug, Default)]
pub struct CaptureFile {
    pub metadata: Option<Document>,
    pub chunks: Vec<Chunk>,
}

impl CaptureFile {
    /// Split a raw buffer into documents. Fails only if the first document is
    /// unreadable; later damage (an interim file cut mid-write) ends the scan.
    pub fn parse(buf: &[u8]) -> Result<Self, DecodeError> {
        let mut out = CaptureFile::default();
        let mut rest = buf;
        let mut first = true;
        while !rest.is_empty() {
            let doc = match Document::from_reader(&mut rest) {
                Ok(d) => d,
                Err(e) if first => return Err(e.into()),
                Err(e) => {
                    warn!("stopping at damaged capture document: {e}");
                    break;
                }
            };
            first = false;
            match doc.get_i32("type") {
                Ok(TYPE_METADATA) => {
                    if let Ok(meta) = doc.get_document("doc") {
                        out.metadata = Some(meta.clone());
                    }
                }
                Ok(TYPE_METRIC_CHUNK) => {
                    let Ok(data) = doc.get_binary_generic("data") else {
                        continue;
                    };
                    match Chunk::from_payload(data) {
                        Ok(chunk) => out.chunks.push(chunk),
                        Err(e) => warn!("skipping metric chunk: {e}"),
                    }
                }
                // periodic metadata and unknown types carry no samples
                _ => {}
            }
        }
        Ok(out)
    }
}

/// One inflated metric chunk: reference document + compressed deltas.
#[derive(Debug, Clone)]
pub struct Chunk {
    reference: Document,
    metric_count: usize,
    delta_count: usize,
    deltas: Vec<u8>,
}

impl Chunk {
    fn from_payload(data: &[u8]) -> Result<Self, DecodeError> {
        let mut header = data;
        if header.remaining() < 4 {
            return Err(DecodeError::Truncated("chunk length"));
        }
        let raw_len = header.get_u32_le() as usize;
        if raw_len > MAX_CHUNK_BYTES {
            return Err(DecodeError::LengthMismatch {
                expected: raw_len,
                found: 0,
            });
        }
        // one byte past the header length is enough to catch a lie
        let mut raw = Vec::new();
        ZlibDecoder::new(header)
            .take(raw_len as u64 + 1)
            .read_to_end(&mut raw)?;
        if raw.len() != raw_len {
            return Err(DecodeError::LengthMismatch {
                expected: raw_len,
                found: raw.len(),
            });
        }

        let mut rest = raw.as_slice();
        let reference = Document::from_reader(&mut rest)?;
        if rest.remaining() < 8 {
            return Err(DecodeError::Truncated("chunk header"));
        }
        let metric_count = rest.get_u32_le() as usize;
        let delta_count = rest.get_u32_le() as usize;
        let samples = delta_count.saturating_add(1);
        if metric_count.saturating_mul(samples) > MAX_CHUNK_BYTES / 8 {
            return Err(DecodeError::Oversized {
                metrics: metric_count,
                samples,
            });
        }
        Ok(Self {
            reference,
            metric_count,
            delta_count,
            deltas: rest.to_vec(),
        })
    }

    pub fn reference(&self) -> &Document {
        &self.reference
    }

    /// Raw samples in the chunk: the reference plus one per delta.
    pub fn sample_count(&self) -> usize {
        self.delta_count + 1
    }

    /// Field values of the reference sample only; no delta decode.
    pub fn reference_values(&self) -> ChunkSamples {
        let flat = flatten(&self.reference);
        let mut paths = Vec::with_capacity(flat.len());
        let mut columns = Vec::with_capacity(flat.len());
        for (path, v) in flat {
            paths.push(path);
            columns.push(vec![v]);
        }
        ChunkSamples::new(paths, columns, 1, self.repl_set())
    }

    /// Decode every raw sample of the chunk.
    pub fn decode(&self) -> Result<ChunkSamples, DecodeError> {
        let flat = flatten(&self.reference);
        if flat.len() != self.metric_count {
            return Err(DecodeError::SchemaMismatch {
                expected: self.metric_count,
                found: flat.len(),
            });
        }
        let mut cursor = self.deltas.as_slice();
        let mut zeros = 0u64;
        let mut paths = Vec::with_capacity(flat.len());
        let mut columns = Vec::with_capacity(flat.len());
        for (path, base) in flat {
            let mut col = Vec::with_capacity(self.delta_count + 1);
            let mut value = base;
            col.push(value);
            for _ in 0..self.delta_count {
                let delta = if zeros > 0 {
                    zeros -= 1;
                    0
                } else {
                    let d = read_varint(&mut cursor)?;
                    if d == 0 {
                        zeros = read_varint(&mut cursor)?;
                    }
                    d
                };
                value = value.wrapping_add(delta as i64);
                col.push(value);
            }
            paths.push(path);
            columns.push(col);
        }
        Ok(ChunkSamples::new(
            paths,
            columns,
            self.sample_count(),
            self.repl_set(),
        ))
    }

    fn repl_set(&self) -> Option<ReplSetStatus> {
        self.reference
            .get_document("replSetGetStatus")
            .ok()
            .and_then(ReplSetStatus::from_bson)
            .filter(|rs| !rs.members.is_empty())
    }
}

/// Column store of decoded samples keyed by dotted field path.
#[derive(Debug, Clone)]
pub struct ChunkSamples {
    paths: Vec<String>,
    index: HashMap<String, usize>,
    columns: Vec<Vec<i64>>,
    len: usize,
    repl_set: Option<ReplSetStatus>,
}

impl ChunkSamples {
    fn new(
        paths: Vec<String>,
        columns: Vec<Vec<i64>>,
        len: usize,
        repl_set: Option<ReplSetStatus>,
    ) -> Self {
        let index = paths
            .iter()
            .enumerate()
            .map(|(i, p)| (p.clone(), i))
            .collect();
        Self {
            paths,
            index,
            columns,
            len,
            repl_set,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn value(&self, path: &str, sample: usize) -> Option<i64> {
        let col = self.index.get(path)?;
        self.columns[*col].get(sample).copied()
    }

    fn section<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.paths
            .iter()
            .filter_map(move |p| p.strip_prefix(prefix)?.strip_prefix('.'))
    }

    /// Rebuild the sample document at `sample`. Replication status only
    /// exists in the reference, so it is attached to sample 0 alone.
    pub fn sample_doc(&self, sample: usize) -> SampleDoc {
        let at = |path: String| self.value(&path, sample);
        let server_status = self
            .section("serverStatus")
            .next()
            .is_some()
            .then(|| ServerStatus::from_fields(|p| at(format!("serverStatus.{p}"))));
        let system_metrics = self.section("systemMetrics").next().is_some().then(|| {
            SystemMetrics::from_fields(self.section("systemMetrics"), |p| {
                at(format!("systemMetrics.{p}"))
            })
        });
        let start = self.value("start", sample).unwrap_or(0);
        let mut doc = SampleDoc {
            start,
            end: self.value("end", sample).unwrap_or(0),
            server_status,
            repl_set: if sample == 0 { self.repl_set.clone() } else { None },
            system_metrics,
        };
        if let Some(sm) = doc.system_metrics.as_mut() {
            if sm.start == 0 {
                sm.start = start;
            }
        }
        doc
    }
}

/// Numeric leaves of `doc` in document order, the way the writer emits them.
fn flatten(doc: &Document) -> Vec<(String, i64)> {
    let mut out = Vec::new();
    for (k, v) in doc {
        flatten_value(k.clone(), v, &mut out);
    }
    out
}

fn flatten_value(path: String, v: &Bson, out: &mut Vec<(String, i64)>) {
    match v {
        Bson::Double(d) => out.push((path, *d as i64)),
        Bson::Int32(i) => out.push((path, *i as i64)),
        Bson::Int64(i) => out.push((path, *i)),
        Bson::Boolean(b) => out.push((path, *b as i64)),
        Bson::DateTime(dt) => out.push((path, dt.timestamp_millis())),
        Bson::Timestamp(ts) => {
            let inc = format!("{path}.inc");
            out.push((path, ts.time as i64));
            out.push((inc, ts.increment as i64));
        }
        Bson::Document(d) => {
            for (k, v) in d {
                flatten_value(format!("{path}.{k}"), v, out);
            }
        }
        Bson::Array(a) => {
            for (i, v) in a.iter().enumerate() {
                flatten_value(format!("{path}.{i}"), v, out);
            }
        }
        _ => {}
    }
}

fn read_varint(buf: &mut &[u8]) -> Result<u64, DecodeError> {
    let mut result = 0u64;
    let mut shift = 0u32;
    loop {
        let Some((&byte, rest)) = buf.split_first() else {
            return Err(DecodeError::Truncated("delta stream"));
        };
        *buf = rest;
        result |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift > 63 {
            return Err(DecodeError::VarintOverflow);
        }
    }
}
