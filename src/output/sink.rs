//! Periodic, crash-tolerant persistence of page records
//!
//! The sink keeps every record of the run in memory and rewrites the whole
//! array through its `RecordStore` every `save_interval` new records and once
//! more at shutdown. A failed flush keeps the pending records for the next
//! attempt; too many failures in a row are reported as fatal.

use crate::output::traits::{OutputResult, RecordStore};
use crate::output::PageRecord;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// What happened when the sink was asked to flush
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing due yet
    Skipped,

    /// All records were persisted
    Flushed { records: usize },

    /// The store rejected the write; records are kept for the next attempt
    Failed {
        message: String,
        consecutive: u32,
        fatal: bool,
    },
}

impl FlushOutcome {
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Failed { fatal: true, .. })
    }
}

/// Buffers page records and persists them through a `RecordStore`
pub struct ResultSink {
    store: Box<dyn RecordStore>,
    records: Vec<PageRecord>,
    /// url -> position in `records`
    positions: HashMap<String, usize>,
    pending: usize,
    /// Records added since the last flush attempt, successful or not
    since_attempt: usize,
    /// Record count at the last successful write
    persisted: usize,
    save_interval: usize,
    max_flush_failures: u32,
    consecutive_failures: u32,
    written: bool,
}

impl ResultSink {
    /// Opens a sink over `store`
    ///
    /// With `keep_existing` the records already in the store are loaded and
    /// kept; a record for the same URL produced by this run replaces the old
    /// one. A store whose contents cannot be parsed is an error rather than
    /// being silently overwritten.
    pub fn open(
        store: Box<dyn RecordStore>,
        save_interval: usize,
        max_flush_failures: u32,
        keep_existing: bool,
    ) -> OutputResult<Self> {
        let mut sink = Self {
            store,
            records: Vec::new(),
            positions: HashMap::new(),
            pending: 0,
            since_attempt: 0,
            persisted: 0,
            save_interval: save_interval.max(1),
            max_flush_failures: max_flush_failures.max(1),
            consecutive_failures: 0,
            written: false,
        };

        if keep_existing {
            let existing = sink.store.load()?;
            info!(
                "Keeping {} existing records from {}",
                existing.len(),
                sink.store.location()
            );
            for record in existing {
                sink.insert(record);
            }
        }

        Ok(sink)
    }

    /// Adds a record and flushes when the save interval is reached
    ///
    /// After a failed flush the next attempt waits for another full interval;
    /// the records of both intervals go out together.
    pub fn push(&mut self, record: PageRecord) -> FlushOutcome {
        self.insert(record);
        self.pending += 1;
        self.since_attempt += 1;

        if self.since_attempt >= self.save_interval {
            self.flush()
        } else {
            FlushOutcome::Skipped
        }
    }

    /// Persists all records if anything changed since the last successful write
    ///
    /// The first call always writes, so a run that produced nothing still
    /// leaves a valid (possibly empty) array behind.
    pub fn flush(&mut self) -> FlushOutcome {
        if self.written && self.pending == 0 {
            return FlushOutcome::Skipped;
        }

        self.since_attempt = 0;
        match self.store.write_all(&self.records) {
            Ok(()) => {
                debug!(
                    "Flushed {} records ({} new) to {}",
                    self.records.len(),
                    self.pending,
                    self.store.location()
                );
                self.pending = 0;
                self.persisted = self.records.len();
                self.consecutive_failures = 0;
                self.written = true;
                FlushOutcome::Flushed {
                    records: self.records.len(),
                }
            }
            Err(e) => {
                self.consecutive_failures += 1;
                let fatal = self.consecutive_failures >= self.max_flush_failures;
                if fatal {
                    error!(
                        "Flush to {} failed {} times in a row: {}",
                        self.store.location(),
                        self.consecutive_failures,
                        e
                    );
                } else {
                    warn!(
                        "Flush to {} failed ({} pending records kept): {}",
                        self.store.location(),
                        self.pending,
                        e
                    );
                }
                FlushOutcome::Failed {
                    message: e.to_string(),
                    consecutive: self.consecutive_failures,
                    fatal,
                }
            }
        }
    }

    /// Records added since the last successful flush
    pub fn pending(&self) -> usize {
        self.pending
    }

    /// Records in the store as of the last successful flush
    pub fn persisted(&self) -> usize {
        self.persisted
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[PageRecord] {
        &self.records
    }

    pub fn location(&self) -> String {
        self.store.location()
    }

    fn insert(&mut self, record: PageRecord) {
        match self.positions.get(&record.url) {
            Some(&index) => self.records[index] = record,
            None => {
                self.positions.insert(record.url.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }
}
