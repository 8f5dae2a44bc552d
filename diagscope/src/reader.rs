//! Input expansion and decode-mode selection.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

use crate::config::EngineConfig;
use crate::error::{Error, Result};

/// Full-resolution capture files (`diagnostic.data/metrics.*`).
pub const CAPTURE_PREFIX: &str = "metrics.";
/// Periodic summaries written as JSON lines.
pub const LINES_PREFIX: &str = "keyhole_stats.";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// How much of each capture chunk to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Reference sample of each chunk only.
    Summary,
    /// Every raw sample, stepping by `span`.
    Full { span: u32 },
}

/// Chosen once per batch and passed to every decode call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    Lines,
    Capture(Resolution),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Capture,
    Lines,
    Other,
}

fn kind_of(path: &Path) -> FileKind {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();
    if name.starts_with(CAPTURE_PREFIX) {
        FileKind::Capture
    } else if name.starts_with(LINES_PREFIX) {
        FileKind::Lines
    } else {
        FileKind::Other
    }
}

impl DecodeMode {
    /// Pick the mode from the first (sorted) file. Batches mixing both
    /// prefixes are rejected rather than decoded with the wrong codec.
    pub fn select(files: &[PathBuf], config: &EngineConfig) -> Result<Self> {
        let capture = files.iter().find(|f| kind_of(f) == FileKind::Capture);
        let lines = files.iter().find(|f| kind_of(f) == FileKind::Lines);
        if let (Some(capture), Some(lines)) = (capture, lines) {
            return Err(Error::MixedBatch {
                capture: capture.clone(),
                lines: lines.clone(),
            });
        }
        let first = files
            .first()
            .ok_or_else(|| Error::NoMatchingFiles(Vec::new()))?;
        if kind_of(first) == FileKind::Lines {
            return Ok(DecodeMode::Lines);
        }
        let span = config.span.max(1);
        if span >= config.summary_threshold {
            Ok(DecodeMode::Capture(Resolution::Summary))
        } else {
            Ok(DecodeMode::Capture(Resolution::Full { span }))
        }
    }
}

/// Expand directories to their recognized member files; sorted and deduped.
pub fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        let meta = fs::metadata(path).map_err(|_| Error::PathNotFound(path.clone()))?;
        if meta.is_dir() {
            let entries = fs::read_dir(path).map_err(|source| Error::Io {
                path: path.clone(),
                source,
            })?;
            for entry in entries.flatten() {
                let p = entry.path();
                if p.is_file() && kind_of(&p) != FileKind::Other {
                    files.push(p);
                }
            }
        } else if meta.is_file() {
            files.push(path.clone());
        }
    }
    if files.is_empty() {
        return Err(Error::NoMatchingFiles(paths.to_vec()));
    }
    files.sort_by(|a, b| a.to_string_lossy().cmp(&b.to_string_lossy()));
    files.dedup();
    Ok(files)
}

/// Whole file contents, gunzipped when the file is gzip-compressed. Every
/// member of a concatenated gzip stream is inflated.
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    let io_err = |source| Error::Io {
        path: path.to_path_buf(),
        source,
    };
    let raw = fs::read(path).map_err(io_err)?;
    if raw.starts_with(&GZIP_MAGIC) {
        let mut out = Vec::with_capacity(raw.len() * 4);
        MultiGzDecoder::new(raw.as_slice())
            .read_to_end(&mut out)
            .map_err(io_err)?;
        return Ok(out);
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let p = dir.join(name);
        fs::write(&p, b"x").unwrap();
        p
    }

    #[test]
    fn directories_expand_to_known_prefixes_sorted() {
        let td = tempfile::tempdir().unwrap();
        touch(td.path(), "metrics.2019-10-02T00-00-00Z-00000");
        touch(td.path(), "metrics.2019-10-01T00-00-00Z-00000");
        touch(td.path(), "README");
        let files = collect_files(&[td.path().to_path_buf()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "metrics.2019-10-01T00-00-00Z-00000",
                "metrics.2019-10-02T00-00-00Z-00000"
            ]
        );
    }

    #[test]
    fn missing_path_and_empty_dir_are_errors() {
        let td = tempfile::tempdir().unwrap();
        let missing = td.path().join("nope");
        assert!(matches!(
            collect_files(&[missing]),
            Err(Error::PathNotFound(_))
        ));
        touch(td.path(), "other.txt");
        assert!(matches!(
            collect_files(&[td.path().to_path_buf()]),
            Err(Error::NoMatchingFiles(_))
        ));
    }

    #[test]
    fn mode_follows_first_file_and_span() {
        let cfg = EngineConfig::default();
        let capture = vec![PathBuf::from("/d/metrics.1")];
        assert_eq!(
            DecodeMode::select(&capture, &cfg).unwrap(),
            DecodeMode::Capture(Resolution::Full { span: 1 })
        );
        let coarse = cfg.clone().with_span(300);
        assert_eq!(
            DecodeMode::select(&capture, &coarse).unwrap(),
            DecodeMode::Capture(Resolution::Summary)
        );
        let lines = vec![PathBuf::from("/d/keyhole_stats.1"), PathBuf::from("/d/x")];
        assert_eq!(DecodeMode::select(&lines, &cfg).unwrap(), DecodeMode::Lines);
    }

    #[test]
    fn mixed_batch_is_rejected() {
        let files = vec![
            PathBuf::from("/d/keyhole_stats.1"),
            PathBuf::from("/d/metrics.1"),
        ];
        assert!(matches!(
            DecodeMode::select(&files, &EngineConfig::default()),
            Err(Error::MixedBatch { .. })
        ));
    }

    #[test]
    fn gzip_files_are_inflated() {
        let td = tempfile::tempdir().unwrap();
        let p = td.path().join("keyhole_stats.gz");
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(b"[]\n").unwrap();
        fs::write(&p, enc.finish().unwrap()).unwrap();
        assert_eq!(read_file(&p).unwrap(), b"[]\n");
    }

    #[test]
    fn concatenated_gzip_members_are_all_read() {
        let td = tempfile::tempdir().unwrap();
        let p = td.path().join("keyhole_stats.gz");
        let mut bytes = Vec::new();
        for part in [&b"[1]\n"[..], &b"[2]\n"[..]] {
            let mut enc = GzEncoder::new(Vec::new(), Compression::default());
            enc.write_all(part).unwrap();
            bytes.extend(enc.finish().unwrap());
        }
        fs::write(&p, bytes).unwrap();
        assert_eq!(read_file(&p).unwrap(), b"[1]\n[2]\n");
    }

    #[test]
    fn broken_gzip_is_an_io_error() {
        let td = tempfile::tempdir().unwrap();
        let p = td.path().join("keyhole_stats.gz");
        fs::write(&p, [0x1f, 0x8b, b'j', b'u', b'n', b'k']).unwrap();
        match read_file(&p) {
            Err(Error::Io { path, .. }) => assert_eq!(path, p),
            other => panic!("unexpected {other:?}"),
        }
    }
}
