//! Append-only JSON Lines files
//!
//! Reads tolerate bad lines (they are skipped and counted). Appends write one
//! complete line with a single `write_all`, so a record is either fully
//! present or absent. There is no locking: concurrent writers against the
//! same file are not supported.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{EngineError, Result};

/// A line that could not be parsed
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedLine {
    /// 1-based line number
    pub line: usize,
    pub reason: String,
}

/// Parsed entries of a JSONL file plus the lines that were skipped
#[derive(Debug, Clone)]
pub struct LogRead<T> {
    pub entries: Vec<T>,
    pub skipped: Vec<SkippedLine>,
}

impl<T> Default for LogRead<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

/// Read every parseable line of a JSONL file.
///
/// A missing file reads as empty. An unreadable file is logged and also reads
/// as empty; only explicitly requested files are fatal, and logs never are.
pub fn read_jsonl<T: DeserializeOwned>(path: &Path) -> LogRead<T> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("{} does not exist, treating as empty", path.display());
            return LogRead::default();
        }
        Err(e) => {
            warn!("Could not read {}: {}", path.display(), e);
            return LogRead::default();
        }
    };

    let mut read = LogRead::default();
    for (index, raw) in bytes.split(|b| *b == b'\n').enumerate() {
        let line_no = index + 1;
        let parsed = std::str::from_utf8(raw)
            .map_err(|e| e.to_string())
            .and_then(|line| {
                let line = line.trim();
                if line.is_empty() {
                    Ok(None)
                } else {
                    serde_json::from_str::<T>(line).map(Some).map_err(|e| e.to_string())
                }
            });

        match parsed {
            Ok(Some(entry)) => read.entries.push(entry),
            Ok(None) => {}
            Err(reason) => {
                let err = EngineError::MalformedLogLine {
                    path: path.to_path_buf(),
                    line: line_no,
                    reason: reason.clone(),
                };
                warn!("{}, skipping", err);
                read.skipped.push(SkippedLine { line: line_no, reason });
            }
        }
    }

    debug!(
        "Read {} entries from {} ({} skipped)",
        read.entries.len(),
        path.display(),
        read.skipped.len()
    );
    read
}

fn write_failure(path: &Path, source: std::io::Error) -> EngineError {
    EngineError::WriteFailure {
        path: path.to_path_buf(),
        source,
    }
}

/// Append one record as a single line.
///
/// If the file ends in a partial line (a crashed earlier writer), the record
/// starts on a fresh line so it is not glued onto the fragment.
pub fn append_jsonl<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let json = serde_json::to_string(record)
        .map_err(|e| write_failure(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| write_failure(path, e))?;
        }
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .read(true)
        .open(path)
        .map_err(|e| write_failure(path, e))?;

    let mut line = String::with_capacity(json.len() + 2);
    if ends_without_newline(&mut file).map_err(|e| write_failure(path, e))? {
        line.push('\n');
    }
    line.push_str(&json);
    line.push('\n');

    file.write_all(line.as_bytes()).map_err(|e| write_failure(path, e))?;
    file.sync_data().map_err(|e| write_failure(path, e))?;
    Ok(())
}

fn ends_without_newline(file: &mut std::fs::File) -> std::io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// Replace a whole file through a sibling temp file and a rename
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| write_failure(path, e))?;
        }
    }

    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path: PathBuf = path.with_file_name(tmp_name);

    std::fs::write(&tmp_path, contents).map_err(|e| write_failure(path, e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| write_failure(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Row {
        n: u32,
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let read: LogRead<Row> = read_jsonl(&dir.path().join("absent.jsonl"));
        assert!(read.entries.is_empty());
        assert!(read.skipped.is_empty());
    }

    #[test]
    fn test_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        std::fs::write(&path, "{\"n\":1}\nnot json\n\n{\"n\":2}\n{\"m\":3}\n").unwrap();

        let read: LogRead<Row> = read_jsonl(&path);
        assert_eq!(read.entries, vec![Row { n: 1 }, Row { n: 2 }]);
        assert_eq!(read.skipped.len(), 2);
        assert_eq!(read.skipped[0].line, 2);
        assert_eq!(read.skipped[1].line, 5);
    }

    #[test]
    fn test_invalid_utf8_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let mut bytes = b"{\"n\":1}\n".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, b'\n']);
        bytes.extend_from_slice(b"{\"n\":2}\n");
        std::fs::write(&path, bytes).unwrap();

        let read: LogRead<Row> = read_jsonl(&path);
        assert_eq!(read.entries.len(), 2);
        assert_eq!(read.skipped.len(), 1);
    }

    #[test]
    fn test_append_creates_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("log.jsonl");
        append_jsonl(&path, &Row { n: 1 }).unwrap();
        append_jsonl(&path, &Row { n: 2 }).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "{\"n\":1}\n{\"n\":2}\n");
    }

    #[test]
    fn test_append_after_partial_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        std::fs::write(&path, "{\"n\":1}\n{\"n\":").unwrap();
        append_jsonl(&path, &Row { n: 2 }).unwrap();

        let read: LogRead<Row> = read_jsonl(&path);
        assert_eq!(read.entries, vec![Row { n: 1 }, Row { n: 2 }]);
        assert_eq!(read.skipped.len(), 1);
    }

    #[test]
    fn test_write_atomic_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.md");
        write_atomic(&path, "first").unwrap();
        write_atomic(&path, "second").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        assert!(!dir.path().join("tracker.md.tmp").exists());
    }
}
