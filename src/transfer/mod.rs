// MIT License - Copyright (c) 2026 The codeless-dsps developers
// CodeLess / DSPS protocol engine

//! DSPS transfer operations.
//!
//! Operations are created detached, registered with the manager by
//! `start_transfer` and handed back by `stop_transfer` so they can be resumed.

pub mod file_receive;
pub mod file_send;
pub mod periodic;
pub mod stats;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub use file_receive::{FileHeader, FileReceive, HeaderParse, ReceiveUpdate};
pub use file_send::FileSend;
pub use periodic::{PeriodicPayload, PeriodicSend};
pub use stats::{StatsSample, TransferStats};

use crate::dsps::DspsChunk;

/// Identifies a transfer operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(pub u64);

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

impl OperationId {
    pub(crate) fn next() -> Self {
        OperationId(NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Created,
    Started,
    Stopped,
    Complete,
    Aborted,
}

/// Whether a periodic action is due at `now`.
pub(crate) fn is_due(last: Option<Instant>, period: Duration, now: Instant) -> bool {
    last.map_or(true, |last| now.saturating_duration_since(last) >= period)
}

/// What a write completion meant for its transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkProgress {
    FileChunk { index: usize, total: usize, complete: bool },
    Pattern { counter: u64 },
    Periodic { count: u64 },
    /// Intermediate part of a multi-chunk payload.
    Partial,
}

/// An outbound transfer registered with the manager.
#[derive(Debug)]
pub enum Transfer {
    FileSend(FileSend),
    Periodic(PeriodicSend),
}

impl From<FileSend> for Transfer {
    fn from(op: FileSend) -> Self {
        Transfer::FileSend(op)
    }
}

impl From<PeriodicSend> for Transfer {
    fn from(op: PeriodicSend) -> Self {
        Transfer::Periodic(op)
    }
}

impl Transfer {
    pub fn id(&self) -> OperationId {
        match self {
            Transfer::FileSend(op) => op.id(),
            Transfer::Periodic(op) => op.id(),
        }
    }

    pub fn state(&self) -> TransferState {
        match self {
            Transfer::FileSend(op) => op.state(),
            Transfer::Periodic(op) => op.state(),
        }
    }

    pub fn chunk_size(&self) -> usize {
        match self {
            Transfer::FileSend(op) => op.chunk_size(),
            Transfer::Periodic(op) => op.chunk_size(),
        }
    }

    pub fn stats(&self) -> &TransferStats {
        match self {
            Transfer::FileSend(op) => op.stats(),
            Transfer::Periodic(op) => op.stats(),
        }
    }

    pub(crate) fn stats_mut(&mut self) -> &mut TransferStats {
        match self {
            Transfer::FileSend(op) => op.stats_mut(),
            Transfer::Periodic(op) => op.stats_mut(),
        }
    }

    pub(crate) fn start(&mut self, now: Instant) {
        match self {
            Transfer::FileSend(op) => op.start(now),
            Transfer::Periodic(op) => op.start(now),
        }
    }

    /// Chunks to submit at `now`.
    pub(crate) fn take_due(&mut self, now: Instant, tx_on: bool) -> Vec<DspsChunk> {
        match self {
            Transfer::FileSend(op) => op.take_due(now, tx_on),
            Transfer::Periodic(op) => op.take_due(now, tx_on),
        }
    }

    pub(crate) fn on_chunk_written(&mut self, chunk: &crate::dsps::ChunkTag, now: Instant) -> ChunkProgress {
        self.stats_mut().record(chunk.len as u64);
        match self {
            Transfer::FileSend(op) => op.on_chunk_written(chunk.index as usize, now),
            Transfer::Periodic(op) => op.on_chunk_written(chunk),
        }
    }

    /// Freeze the operation. `first_unsent` is the earliest purged chunk tag index.
    pub(crate) fn stop(&mut self, first_unsent: Option<u64>, now: Instant) {
        match self {
            Transfer::FileSend(op) => op.stop(first_unsent.map(|i| i as usize), now),
            Transfer::Periodic(op) => op.stop(first_unsent, now),
        }
    }

    pub(crate) fn abort(&mut self, now: Instant) {
        match self {
            Transfer::FileSend(op) => op.abort(now),
            Transfer::Periodic(op) => op.abort(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_ids_are_unique() {
        let a = OperationId::next();
        let b = OperationId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_is_due() {
        let t0 = Instant::now();
        let period = Duration::from_millis(10);
        assert!(is_due(None, period, t0));
        assert!(!is_due(Some(t0), period, t0 + Duration::from_millis(5)));
        assert!(is_due(Some(t0), period, t0 + period));
    }
}
