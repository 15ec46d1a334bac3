//! Append-only record sink
//!
//! Shared by every in-flight request of one phase. Each push appends one
//! whole record under the lock, so concurrent appends never interleave.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::record::RequestRecord;

/// Thread-safe, append-only collection of request records
#[derive(Debug, Clone, Default)]
pub struct RecordSink {
    records: Arc<Mutex<Vec<RequestRecord>>>,
}

impl RecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Arc::new(Mutex::new(Vec::with_capacity(capacity))),
        }
    }

    /// Append one record
    pub fn push(&self, record: RequestRecord) {
        self.records.lock().push(record);
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Take all records collected so far, leaving the sink empty
    pub fn drain(&self) -> Vec<RequestRecord> {
        std::mem::take(&mut *self.records.lock())
    }
}
