// Ingestion loop - owns the device connection
//
// For every line the device prints:
// - decode and parse it (noise and malformed records are counted and dropped)
// - classify the concentration
// - publish the classification to the shared state
// - append it to the durable log before reading the next line
//
// Connection failures never end the loop: it waits the retry interval and
// reopens the device. The loop stops only when its CancellationToken fires.

use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classify::{classify, Classification};
use crate::reading::{decode_ignoring_invalid, parse_line, LineOutcome};
use crate::record::{DurableLog, LogEntry};
use crate::source::{DeviceConnector, DeviceStream};
use crate::state::{IngestStats, SharedState};

/// Longest device line kept; anything longer is dropped as noise
pub const MAX_LINE_BYTES: usize = 4096;

/// Consecutive transient read errors tolerated before reconnecting
const TRANSIENT_RETRY_LIMIT: u32 = 20;

/// Pause after a transient read error
const TRANSIENT_BACKOFF: Duration = Duration::from_millis(25);

/// Timing knobs for the ingestion loop
#[derive(Debug, Clone, Copy)]
pub struct IngestConfig {
    /// Pause after opening the device before trusting its output
    pub settle_delay: Duration,
    /// Wait between reconnect attempts
    pub retry_interval: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(2),
            retry_interval: Duration::from_secs(2),
        }
    }
}

/// What happened to a single device line
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineResult {
    Published(Classification),
    Skipped,
    Rejected,
}

/// Why a device stream stopped being read
#[derive(Debug)]
enum StreamEnd {
    Cancelled,
    Eof,
    Failed(std::io::Error),
}

pub struct IngestLoop {
    connector: Arc<dyn DeviceConnector>,
    state: SharedState,
    log: DurableLog,
    stats: Arc<IngestStats>,
    config: IngestConfig,
}

/// Running ingestion task
pub struct IngestHandle {
    cancel_token: CancellationToken,
    task: JoinHandle<()>,
}

impl IngestHandle {
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Cancel the loop and wait for it to exit
    pub async fn shutdown(self) {
        self.cancel_token.cancel();
        if let Err(e) = self.task.await {
            warn!("Ingestion task ended abnormally: {}", e);
        }
    }
}

impl IngestLoop {
    pub fn new(
        connector: Arc<dyn DeviceConnector>,
        state: SharedState,
        log: DurableLog,
        stats: Arc<IngestStats>,
        config: IngestConfig,
    ) -> Self {
        Self {
            connector,
            state,
            log,
            stats,
            config,
        }
    }

    /// Run the loop on a background task bound to `cancel_token`
    pub fn spawn(self, cancel_token: CancellationToken) -> IngestHandle {
        let task = {
            let cancel_token = cancel_token.clone();
            tokio::spawn(async move { self.run(cancel_token).await })
        };

        IngestHandle { cancel_token, task }
    }

    pub async fn run(&self, cancel_token: CancellationToken) {
        let endpoint = self.connector.describe();
        info!("Ingestion loop started for {}", endpoint);

        while !cancel_token.is_cancelled() {
            self.stats.record_connection_attempt();

            let connected = tokio::select! {
                _ = cancel_token.cancelled() => break,
                result = self.connector.connect() => result,
            };

            match connected {
                Ok(stream) => {
                    info!("Connected to {}", endpoint);
                    self.stats.set_connected(true);

                    let end = if sleep_or_cancel(self.config.settle_delay, &cancel_token).await {
                        self.read_lines(stream, &cancel_token).await
                    } else {
                        StreamEnd::Cancelled
                    };
                    self.stats.set_connected(false);

                    match end {
                        StreamEnd::Cancelled => break,
                        StreamEnd::Eof => {
                            warn!(
                                "Device stream on {} closed, reconnecting in {:?}",
                                endpoint, self.config.retry_interval
                            );
                        }
                        StreamEnd::Failed(e) => {
                            warn!(
                                "Device read on {} failed ({}), reconnecting in {:?}",
                                endpoint, e, self.config.retry_interval
                            );
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        "Could not open {}: {} (retrying in {:?})",
                        endpoint, e, self.config.retry_interval
                    );
                }
            }

            if !sleep_or_cancel(self.config.retry_interval, &cancel_token).await {
                break;
            }
        }

        self.stats.set_connected(false);
        info!("Ingestion loop for {} stopped", endpoint);
    }

    async fn read_lines(&self, stream: DeviceStream, cancel_token: &CancellationToken) -> StreamEnd {
        let mut reader = BufReader::new(stream);
        let mut line = Vec::with_capacity(MAX_LINE_BYTES);
        let mut discarding = false;
        let mut transient_errors = 0u32;

        loop {
            line.clear();

            let read = tokio::select! {
                _ = cancel_token.cancelled() => return StreamEnd::Cancelled,
                read = read_line_capped(&mut reader, &mut line) => read,
            };

            match read {
                Ok(0) => return StreamEnd::Eof,
                Ok(_) => {
                    transient_errors = 0;
                    let complete = line.last() == Some(&b'\n');

                    if discarding {
                        // Still inside an oversized line; resync at its newline
                        discarding = !complete;
                    } else if !complete && line.len() >= MAX_LINE_BYTES {
                        discarding = true;
                        self.stats.record_line();
                        self.stats.record_skipped();
                        warn!(
                            "Dropping device line longer than {} bytes",
                            MAX_LINE_BYTES
                        );
                    } else {
                        self.handle_line(&line).await;
                    }
                }
                Err(e) if is_transient(&e) => {
                    transient_errors += 1;
                    if transient_errors >= TRANSIENT_RETRY_LIMIT {
                        return StreamEnd::Failed(e);
                    }
                    debug!("Transient device read error: {}", e);
                    if !sleep_or_cancel(TRANSIENT_BACKOFF, cancel_token).await {
                        return StreamEnd::Cancelled;
                    }
                }
                Err(e) => return StreamEnd::Failed(e),
            }
        }
    }

    /// Process one raw device line.
    ///
    /// A published reading is appended to the durable log before this
    /// returns. Log failures are counted but do not undo the publish.
    pub async fn handle_line(&self, raw: &[u8]) -> LineResult {
        self.stats.record_line();

        let reading = match parse_line(raw) {
            Ok(LineOutcome::Reading(reading)) => reading,
            Ok(LineOutcome::Noise) => {
                self.stats.record_skipped();
                return LineResult::Skipped;
            }
            Err(e) => {
                self.stats.record_rejected();
                debug!(
                    "Rejected device line {:?}: {}",
                    decode_ignoring_invalid(raw).trim(),
                    e
                );
                return LineResult::Rejected;
            }
        };

        let classification = classify(reading.raw_value);
        self.state.publish(classification);
        self.stats.record_published(reading.received_at);

        let entry = LogEntry::new(reading.received_at, classification);
        if let Err(e) = self.log.append(&entry).await {
            self.stats.record_log_failure();
            warn!(
                "Failed to append reading to {}: {}",
                self.log.path().display(),
                e
            );
        }

        debug!("{}", entry);
        LineResult::Published(classification)
    }
}

/// Read up to the next newline, stopping after `MAX_LINE_BYTES`
async fn read_line_capped<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    (&mut *reader)
        .take(MAX_LINE_BYTES as u64)
        .read_until(b'\n', buf)
        .await
}

fn is_transient(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock
    )
}

/// Sleep for `duration`; returns false if cancelled first
async fn sleep_or_cancel(duration: Duration, cancel_token: &CancellationToken) -> bool {
    if duration.is_zero() {
        return !cancel_token.is_cancelled();
    }

    tokio::select! {
        _ = cancel_token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}
