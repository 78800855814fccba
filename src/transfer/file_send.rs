// MIT License - Copyright (c) 2026 The codeless-dsps developers
// CodeLess / DSPS protocol engine

use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::{is_due, ChunkProgress, OperationId, TransferState, TransferStats};
use crate::dsps::{split_chunks, DspsChunk};
use crate::error::{CodelessError, Result};
use crate::queue::Priority;

/// Sends a file over DSPS, one chunk per period or all at once.
#[derive(Debug)]
pub struct FileSend {
    id: OperationId,
    name: String,
    chunks: Vec<Vec<u8>>,
    chunk_size: usize,
    period: Duration,
    priority: Priority,
    /// Next chunk to hand to the channel.
    next_index: usize,
    state: TransferState,
    last_emit: Option<Instant>,
    stats: TransferStats,
}

impl FileSend {
    /// Load a file and split it into chunks.
    pub fn open(path: impl AsRef<Path>, chunk_size: usize, period: Duration) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            CodelessError::resource(format!("failed to read {}: {e}", path.display()))
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::from_bytes(name, &data, chunk_size, period)
    }

    pub fn from_bytes(
        name: impl Into<String>,
        data: impl AsRef<[u8]>,
        chunk_size: usize,
        period: Duration,
    ) -> Result<Self> {
        let data = data.as_ref();
        if chunk_size == 0 {
            return Err(CodelessError::validation("chunk size must be positive"));
        }
        let name = name.into();
        let chunks = split_chunks(data, chunk_size);
        debug!("File {}: {} bytes in {} chunks", name, data.len(), chunks.len());
        Ok(Self {
            id: OperationId::next(),
            name,
            chunks,
            chunk_size,
            period,
            priority: Priority::Low,
            next_index: 0,
            state: TransferState::Created,
            last_emit: None,
            stats: TransferStats::new(),
        })
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn total_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn chunk(&self, index: usize) -> Option<&[u8]> {
        self.chunks.get(index).map(Vec::as_slice)
    }

    /// Index of the next chunk to be submitted.
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// Every chunk has reached the transport.
    pub fn is_exhausted(&self) -> bool {
        self.next_index >= self.chunks.len()
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == TransferState::Complete
    }

    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut TransferStats {
        &mut self.stats
    }

    pub(crate) fn set_priority(&mut self, priority: Priority) {
        self.priority = priority;
    }

    pub(crate) fn start(&mut self, now: Instant) {
        self.state = TransferState::Started;
        self.last_emit = None;
        self.stats.start(now);
        info!("File send {} started at chunk {}/{}", self.name, self.next_index, self.chunks.len());
    }

    fn make_chunk(&self, index: usize) -> DspsChunk {
        DspsChunk::new(self.chunks[index].clone(), Some(self.id), index as u64, self.priority)
    }

    /// Chunks to submit at `now`. Nothing is released while TX flow is off.
    pub(crate) fn take_due(&mut self, now: Instant, tx_on: bool) -> Vec<DspsChunk> {
        if self.state != TransferState::Started || !tx_on || self.next_index >= self.chunks.len() {
            return Vec::new();
        }
        if self.period.is_zero() {
            let out = (self.next_index..self.chunks.len())
                .map(|i| self.make_chunk(i))
                .collect();
            self.next_index = self.chunks.len();
            return out;
        }
        if !is_due(self.last_emit, self.period, now) {
            return Vec::new();
        }
        self.last_emit = Some(now);
        let chunk = self.make_chunk(self.next_index);
        self.next_index += 1;
        vec![chunk]
    }

    pub(crate) fn on_chunk_written(&mut self, index: usize, now: Instant) -> ChunkProgress {
        let total = self.chunks.len();
        let complete = index + 1 == total && self.state == TransferState::Started;
        if complete {
            self.state = TransferState::Complete;
            self.stats.stop(now);
            info!("File send {} complete", self.name);
        }
        ChunkProgress::FileChunk {
            index,
            total,
            complete,
        }
    }

    /// Freeze at the earliest chunk that never reached the transport.
    pub(crate) fn stop(&mut self, first_unsent: Option<usize>, now: Instant) {
        if let Some(index) = first_unsent {
            self.next_index = self.next_index.min(index);
        }
        self.state = TransferState::Stopped;
        self.last_emit = None;
        self.stats.stop(now);
        info!("File send {} stopped, resumes at chunk {}", self.name, self.next_index);
    }

    /// Complete without sending anything more.
    pub(crate) fn finish(&mut self, now: Instant) {
        self.stats.start(now);
        self.state = TransferState::Complete;
        self.stats.stop(now);
        info!("File send {} complete, nothing left to send", self.name);
    }

    pub(crate) fn abort(&mut self, now: Instant) {
        self.state = TransferState::Aborted;
        self.stats.stop(now);
    }
}
