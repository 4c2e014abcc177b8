//! Durable reading log.
//!
//! Every published classification is appended as one text line:
//!
//! ```text
//! 2025-10-05 10:45:32 -> Valor: 450 | Estado: Regular
//! ```
//!
//! The `Display` and `FromStr` implementations of [`LogEntry`] are the only
//! place this format is defined. The writer ([`DurableLog::append`]) and the
//! tail reader ([`DurableLog::read_last`]) both go through them.

use chrono::{DateTime, Local, NaiveDateTime, SubsecRound};
use std::fmt;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::classify::{AirStatus, Classification};
use crate::error::BridgeResult;

/// Version of the line layout written by [`LogEntry`]'s `Display`
pub const LOG_FORMAT_VERSION: u32 = 1;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const TIMESTAMP_SEPARATOR: &str = "->";
const FIELD_SEPARATOR: &str = "|";
const VALUE_LABEL: &str = "Valor:";
const STATUS_LABEL: &str = "Estado:";

/// Bytes read per backwards step when looking for the final line
const TAIL_BLOCK_SIZE: u64 = 4096;

/// Give up looking for a line start after this many bytes
const MAX_TAIL_BYTES: usize = 64 * 1024;

/// One classification event as stored in the log
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogEntry {
    pub timestamp: NaiveDateTime,
    pub value: f64,
    pub status: AirStatus,
}

impl LogEntry {
    /// Build an entry at second precision
    pub fn new(received_at: DateTime<Local>, classification: Classification) -> Self {
        Self {
            timestamp: received_at.naive_local().trunc_subsecs(0),
            value: classification.value,
            status: classification.status,
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            TIMESTAMP_SEPARATOR,
            VALUE_LABEL,
            self.value,
            FIELD_SEPARATOR,
            STATUS_LABEL,
            self.status
        )
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordParseError {
    #[error("Missing '{0}' marker")]
    MissingMarker(&'static str),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),
}

impl FromStr for LogEntry {
    type Err = RecordParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let (timestamp, fields) = line
            .split_once(TIMESTAMP_SEPARATOR)
            .ok_or(RecordParseError::MissingMarker(TIMESTAMP_SEPARATOR))?;
        let (value, status) = fields
            .split_once(FIELD_SEPARATOR)
            .ok_or(RecordParseError::MissingMarker(FIELD_SEPARATOR))?;

        let value = value
            .trim()
            .strip_prefix(VALUE_LABEL)
            .ok_or(RecordParseError::MissingMarker(VALUE_LABEL))?
            .trim();
        let status = status
            .trim()
            .strip_prefix(STATUS_LABEL)
            .ok_or(RecordParseError::MissingMarker(STATUS_LABEL))?
            .trim();

        let timestamp = NaiveDateTime::parse_from_str(timestamp.trim(), TIMESTAMP_FORMAT)
            .map_err(|_| RecordParseError::InvalidTimestamp(timestamp.trim().to_string()))?;
        let value = value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| RecordParseError::InvalidValue(value.to_string()))?;
        let status = status
            .parse::<AirStatus>()
            .map_err(|_| RecordParseError::InvalidStatus(status.to_string()))?;

        Ok(Self {
            timestamp,
            value,
            status,
        })
    }
}

/// What the tail of the log currently holds
#[derive(Debug, Clone, PartialEq)]
pub enum LastRecord {
    /// Log file absent or without any non-empty line
    NoData,
    /// Final line could not be parsed
    Malformed { line: String, reason: RecordParseError },
    Entry(LogEntry),
}

/// Append-only log file. Each operation opens the file on its own.
#[derive(Debug, Clone)]
pub struct DurableLog {
    path: PathBuf,
}

impl DurableLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry, creating the file if needed
    pub async fn append(&self, entry: &LogEntry) -> BridgeResult<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        let line = format!("{}\n", entry);
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }

    /// Parse the final non-empty line of the log
    pub async fn read_last(&self) -> BridgeResult<LastRecord> {
        let Some(line) = read_last_line(&self.path).await? else {
            return Ok(LastRecord::NoData);
        };

        Ok(match line.parse::<LogEntry>() {
            Ok(entry) => LastRecord::Entry(entry),
            Err(reason) => LastRecord::Malformed { line, reason },
        })
    }
}

/// Read the last non-empty line by scanning backwards from the end of file.
///
/// Returns `None` when the file does not exist or holds only whitespace.
async fn read_last_line(path: &Path) -> std::io::Result<Option<String>> {
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut end = file.metadata().await?.len();
    let mut tail: Vec<u8> = Vec::new();

    while end > 0 && tail.len() < MAX_TAIL_BYTES {
        let start = end.saturating_sub(TAIL_BLOCK_SIZE);
        let mut block = vec![0u8; (end - start) as usize];
        file.seek(SeekFrom::Start(start)).await?;
        file.read_exact(&mut block).await?;
        block.extend_from_slice(&tail);
        tail = block;
        end = start;

        if let Some(line) = last_complete_line(&tail) {
            return Ok(Some(line));
        }
    }

    // Either the whole file is one line or the line exceeds the scan limit
    Ok(trim_line(&tail))
}

/// Last non-empty line in `buf`, only if a newline precedes it
fn last_complete_line(buf: &[u8]) -> Option<String> {
    let content_end = buf.iter().rposition(|b| !b.is_ascii_whitespace())? + 1;
    let line_start = buf[..content_end].iter().rposition(|&b| b == b'\n')? + 1;
    trim_line(&buf[line_start..content_end])
}

fn trim_line(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};
    use tempfile::TempDir;

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 10, 5)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_format_matches_wire_layout() {
        let entry = LogEntry {
            timestamp: ts(10, 45, 32),
            value: 450.0,
            status: AirStatus::Regular,
        };
        assert_eq!(
            entry.to_string(),
            "2025-10-05 10:45:32 -> Valor: 450 | Estado: Regular"
        );

        let fractional = LogEntry {
            value: 1200.5,
            status: AirStatus::Poor,
            ..entry
        };
        assert_eq!(
            fractional.to_string(),
            "2025-10-05 10:45:32 -> Valor: 1200.5 | Estado: Poor"
        );
    }

    #[test]
    fn test_parse_known_line() {
        let entry: LogEntry = "2025-10-05 10:45:32 -> Valor: 450 | Estado: Regular"
            .parse()
            .unwrap();
        assert_eq!(entry.timestamp, ts(10, 45, 32));
        assert_eq!(entry.value, 450.0);
        assert_eq!(entry.status, AirStatus::Regular);
    }

    #[test]
    fn test_written_entries_parse_back() {
        for (value, status) in [
            (0.0, AirStatus::Good),
            (720.1, AirStatus::Regular),
            (2999.9, AirStatus::Poor),
        ] {
            let entry = LogEntry {
                timestamp: ts(23, 59, 59),
                value,
                status,
            };
            assert_eq!(entry.to_string().parse::<LogEntry>().unwrap(), entry);
        }
    }

    #[test]
    fn test_parse_rejects_missing_markers() {
        assert_eq!(
            "2025-10-05 10:45:32 Valor: 450 | Estado: Regular".parse::<LogEntry>(),
            Err(RecordParseError::MissingMarker("->"))
        );
        assert_eq!(
            "2025-10-05 10:45:32 -> Valor: 450 Estado: Regular".parse::<LogEntry>(),
            Err(RecordParseError::MissingMarker("|"))
        );
        assert_eq!(
            "2025-10-05 10:45:32 -> Value: 450 | Estado: Regular".parse::<LogEntry>(),
            Err(RecordParseError::MissingMarker("Valor:"))
        );
        assert!(matches!(
            "2025-10-05 10:45:32 -> Valor: abc | Estado: Regular".parse::<LogEntry>(),
            Err(RecordParseError::InvalidValue(_))
        ));
        assert!(matches!(
            "2025-10-05 10:45:32 -> Valor: 450 | Estado: Bueno".parse::<LogEntry>(),
            Err(RecordParseError::InvalidStatus(_))
        ));
        assert!(matches!(
            "yesterday -> Valor: 450 | Estado: Good".parse::<LogEntry>(),
            Err(RecordParseError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_entry_truncates_to_seconds() {
        let received_at = Local::now();
        let entry = LogEntry::new(
            received_at,
            Classification {
                value: 500.0,
                status: AirStatus::Good,
            },
        );
        assert_eq!(entry.timestamp.nanosecond(), 0);
        assert_eq!(entry.to_string().parse::<LogEntry>().unwrap(), entry);
    }

    #[tokio::test]
    async fn test_missing_file_is_no_data() {
        let dir = TempDir::new().unwrap();
        let log = DurableLog::new(dir.path().join("absent.log"));
        assert_eq!(log.read_last().await.unwrap(), LastRecord::NoData);
    }

    #[tokio::test]
    async fn test_empty_file_is_no_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.log");
        std::fs::write(&path, "\n\n  \n").unwrap();
        let log = DurableLog::new(path);
        assert_eq!(log.read_last().await.unwrap(), LastRecord::NoData);
    }

    #[tokio::test]
    async fn test_append_then_read_last() {
        let dir = TempDir::new().unwrap();
        let log = DurableLog::new(dir.path().join("sensor.log"));

        let first = LogEntry {
            timestamp: ts(10, 0, 0),
            value: 400.0,
            status: AirStatus::Good,
        };
        let second = LogEntry {
            timestamp: ts(10, 0, 1),
            value: 1500.0,
            status: AirStatus::Poor,
        };
        log.append(&first).await.unwrap();
        log.append(&second).await.unwrap();

        assert_eq!(log.read_last().await.unwrap(), LastRecord::Entry(second));

        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_read_last_skips_trailing_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sensor.log");
        std::fs::write(
            &path,
            "2025-10-05 10:45:31 -> Valor: 800 | Estado: Regular\n\
             2025-10-05 10:45:32 -> Valor: 450 | Estado: Regular\n\n\r\n",
        )
        .unwrap();

        let LastRecord::Entry(entry) = DurableLog::new(path).read_last().await.unwrap() else {
            panic!("expected an entry");
        };
        assert_eq!(entry.value, 450.0);
        assert_eq!(entry.status, AirStatus::Regular);
    }

    #[tokio::test]
    async fn test_read_last_spans_block_boundaries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sensor.log");

        let mut contents = String::new();
        for i in 0..500 {
            let entry = LogEntry {
                timestamp: ts(12, (i / 60) as u32, (i % 60) as u32),
                value: 300.0 + i as f64,
                status: AirStatus::Good,
            };
            contents.push_str(&format!("{}\n", entry));
        }
        assert!(contents.len() as u64 > TAIL_BLOCK_SIZE * 2);
        std::fs::write(&path, &contents).unwrap();

        let LastRecord::Entry(entry) = DurableLog::new(path).read_last().await.unwrap() else {
            panic!("expected an entry");
        };
        assert_eq!(entry.value, 799.0);
        assert_eq!(entry.timestamp, ts(12, 8, 19));
    }

    #[tokio::test]
    async fn test_single_line_without_newline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sensor.log");
        std::fs::write(&path, "2025-10-05 10:45:32 -> Valor: 450 | Estado: Regular").unwrap();

        assert!(matches!(
            DurableLog::new(path).read_last().await.unwrap(),
            LastRecord::Entry(_)
        ));
    }

    #[tokio::test]
    async fn test_malformed_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sensor.log");
        std::fs::write(
            &path,
            "2025-10-05 10:45:32 -> Valor: 450 | Estado: Regular\nhalf a li",
        )
        .unwrap();

        match DurableLog::new(path).read_last().await.unwrap() {
            LastRecord::Malformed { line, reason } => {
                assert_eq!(line, "half a li");
                assert_eq!(reason, RecordParseError::MissingMarker("->"));
            }
            other => panic!("expected malformed tail, got {:?}", other),
        }
    }
}
