//! Bounded retry with a fixed backoff for sink reads and writes

use crate::error::{Result, StockRankError};
use crate::sink::{BatchSink, Row};
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

/// Attempts and pause between them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Sleep after a failed attempt when another one follows
    #[serde(rename = "backoff_ms", with = "millis")]
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Result<Self> {
        if max_attempts == 0 {
            return Err(StockRankError::ConfigError(
                "retry max_attempts must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            max_attempts,
            backoff,
        })
    }

    /// Policy without sleeps, for tests and dry runs
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Duration::ZERO,
        }
    }

    /// Run `op` until it succeeds or attempts run out.
    ///
    /// `op` receives the 1-based attempt number.
    pub fn run<T, F>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        for attempt in 1..=self.max_attempts {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    log::warn!("{} failed: {}. attempt: {}", operation, e, attempt);
                    if attempt < self.max_attempts && !self.backoff.is_zero() {
                        thread::sleep(self.backoff);
                    }
                }
            }
        }

        log::error!(
            "{} failed. attempt: {}. reached max attempts",
            operation,
            self.max_attempts
        );
        Err(StockRankError::RetryExhausted {
            operation: operation.to_string(),
            attempts: self.max_attempts,
        })
    }
}

/// Rows submitted versus rows confirmed written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    pub target: usize,
    pub written: usize,
    pub attempts: u32,
}

impl WriteOutcome {
    pub fn is_complete(&self) -> bool {
        self.target == self.written
    }

    /// Turn a shortfall into the fatal error the orchestration reports
    pub fn ensure_complete(self) -> Result<Self> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(StockRankError::IncompleteWrite {
                target: self.target,
                written: self.written,
            })
        }
    }

    fn absorb(&mut self, other: WriteOutcome) {
        self.target += other.target;
        self.written += other.written;
        self.attempts += other.attempts;
    }
}

/// Writes whole batches or nothing, reporting counts instead of failing
#[derive(Debug, Clone, Default)]
pub struct RetryingBatchWriter {
    policy: RetryPolicy,
}

impl RetryingBatchWriter {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Submit one batch; `written` is either all rows or zero
    pub fn write<B: BatchSink + ?Sized>(&self, sink: &mut B, rows: &[Row]) -> WriteOutcome {
        let target = rows.len();
        if target == 0 {
            return WriteOutcome::default();
        }
        log::info!("insert target num: {}", target);

        let mut attempts = 0;
        let result = self.policy.run("batch write", |attempt| {
            attempts = attempt;
            sink.submit(rows)
        });

        let written = match result {
            Ok(()) => target,
            Err(_) => 0,
        };
        WriteOutcome {
            target,
            written,
            attempts,
        }
    }

    /// Split `rows` into batches of `batch_size` and write them in order.
    ///
    /// Stops at the first batch that exhausts its retries; `target` still
    /// counts every row so the shortfall is visible to the caller.
    pub fn write_batches<B: BatchSink + ?Sized>(
        &self,
        sink: &mut B,
        rows: &[Row],
        batch_size: usize,
    ) -> WriteOutcome {
        let mut total = WriteOutcome::default();
        let batch_size = batch_size.max(1);

        for (index, batch) in rows.chunks(batch_size).enumerate() {
            let outcome = self.write(sink, batch);
            total.absorb(outcome);
            if !outcome.is_complete() {
                log::error!(
                    "batch {} failed after {} attempts, skipping remaining batches",
                    index,
                    outcome.attempts
                );
                total.target = rows.len();
                break;
            }
        }

        total
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
