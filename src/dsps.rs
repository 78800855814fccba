// MIT License - Copyright (c) 2026 The codeless-dsps developers
// CodeLess / DSPS protocol engine

use std::collections::VecDeque;

use tracing::debug;

use crate::config::CodelessConfig;
use crate::constants::{MTU_DEFAULT, MTU_OVERHEAD};
use crate::error::{CodelessError, Result};
use crate::queue::Priority;
use crate::transfer::OperationId;

/// Identity of a chunk while it travels through the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkTag {
    /// Owning transfer, `None` for interactive sends and echo.
    pub operation: Option<OperationId>,
    /// File chunk index, pattern counter or periodic count.
    pub index: u64,
    pub len: usize,
    /// Last chunk of its payload.
    pub last_part: bool,
}

/// A chunk of binary data ready to be written to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DspsChunk {
    pub data: Vec<u8>,
    pub tag: ChunkTag,
    pub priority: Priority,
}

impl DspsChunk {
    pub fn new(data: Vec<u8>, operation: Option<OperationId>, index: u64, priority: Priority) -> Self {
        let len = data.len();
        Self {
            data,
            tag: ChunkTag {
                operation,
                index,
                len,
                last_part: true,
            },
            priority,
        }
    }
}

/// Split a payload into chunks of at most `chunk_size` bytes.
pub fn split_chunks(data: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
    data.chunks(chunk_size.max(1)).map(<[u8]>::to_vec).collect()
}

/// Split a payload into tagged chunks. Only the final chunk is marked `last_part`.
pub fn payload_chunks(
    data: &[u8],
    chunk_size: usize,
    operation: Option<OperationId>,
    index: u64,
    priority: Priority,
) -> Vec<DspsChunk> {
    let parts = split_chunks(data, chunk_size);
    let count = parts.len();
    parts
        .into_iter()
        .enumerate()
        .map(|(i, part)| {
            let mut chunk = DspsChunk::new(part, operation, index, priority);
            chunk.tag.last_part = i + 1 == count;
            chunk
        })
        .collect()
}

/// Chunking, flow control and the pending buffer of the DSPS channel.
#[derive(Debug)]
pub struct DspsState {
    mtu: u16,
    chunk_size: usize,
    rx_flow_on: bool,
    tx_flow_on: bool,
    pending: VecDeque<DspsChunk>,
    pending_max: usize,
    rx_bytes: u64,
}

impl DspsState {
    pub fn new(config: &CodelessConfig) -> Self {
        let bound = MTU_DEFAULT as usize - MTU_OVERHEAD;
        Self {
            mtu: MTU_DEFAULT,
            chunk_size: config.default_dsps_chunk_size.clamp(1, bound),
            rx_flow_on: config.default_dsps_rx_flow_control,
            tx_flow_on: config.default_dsps_tx_flow_control,
            pending: VecDeque::new(),
            pending_max: config.dsps_pending_max_size,
            rx_bytes: 0,
        }
    }

    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    /// Largest chunk the current MTU can carry.
    pub fn max_chunk_size(&self) -> usize {
        (self.mtu as usize).saturating_sub(MTU_OVERHEAD).max(1)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn set_chunk_size(&mut self, size: usize) -> Result<()> {
        let max = self.max_chunk_size();
        if size == 0 || size > max {
            return Err(CodelessError::validation(format!(
                "chunk size {size} out of range 1..={max}"
            )));
        }
        self.chunk_size = size;
        Ok(())
    }

    /// Apply a renegotiated MTU. The chunk size never exceeds the new bound.
    pub fn set_mtu(&mut self, mtu: u16, wanted_chunk_size: Option<usize>) {
        self.mtu = mtu;
        let max = self.max_chunk_size();
        let wanted = wanted_chunk_size.unwrap_or(self.chunk_size);
        self.chunk_size = wanted.clamp(1, max);
        debug!("MTU {} -> chunk size {}", mtu, self.chunk_size);
    }

    pub fn rx_flow_on(&self) -> bool {
        self.rx_flow_on
    }

    pub fn set_rx_flow(&mut self, on: bool) {
        self.rx_flow_on = on;
    }

    pub fn tx_flow_on(&self) -> bool {
        self.tx_flow_on
    }

    pub fn set_tx_flow(&mut self, on: bool) {
        self.tx_flow_on = on;
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Buffer chunks while TX flow is off. All or nothing.
    pub fn push_pending(&mut self, chunks: Vec<DspsChunk>) -> Result<()> {
        if self.pending.len() + chunks.len() > self.pending_max {
            return Err(CodelessError::PendingOverflow {
                limit: self.pending_max,
            });
        }
        self.pending.extend(chunks);
        Ok(())
    }

    /// Put chunks pulled back from the queue ahead of the buffered ones.
    pub fn requeue_front(&mut self, chunks: Vec<DspsChunk>) {
        for chunk in chunks.into_iter().rev() {
            self.pending.push_front(chunk);
        }
    }

    /// Take every buffered chunk, oldest first.
    pub fn take_pending(&mut self) -> Vec<DspsChunk> {
        self.pending.drain(..).collect()
    }

    /// Remove the buffered chunks of one operation.
    pub fn purge(&mut self, operation: OperationId) -> Vec<DspsChunk> {
        let (removed, kept): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|c| c.tag.operation == Some(operation));
        self.pending = kept.into();
        removed
    }

    pub fn record_rx(&mut self, len: usize) {
        self.rx_bytes += len as u64;
    }

    pub fn rx_bytes(&self) -> u64 {
        self.rx_bytes
    }

    /// Back to connection defaults.
    pub fn reset(&mut self, config: &CodelessConfig) {
        *self = Self::new(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(op: Option<OperationId>, index: u64) -> DspsChunk {
        DspsChunk::new(vec![index as u8], op, index, Priority::High)
    }

    #[test]
    fn test_split_chunks() {
        let parts = split_chunks(&[0u8; 45], 20);
        assert_eq!(parts.iter().map(Vec::len).collect::<Vec<_>>(), vec![20, 20, 5]);
        assert!(split_chunks(&[], 20).is_empty());
    }

    #[test]
    fn test_payload_chunks_mark_last() {
        let chunks = payload_chunks(&[1u8; 30], 20, None, 7, Priority::Low);
        assert_eq!(chunks.len(), 2);
        assert!(!chunks[0].tag.last_part);
        assert!(chunks[1].tag.last_part);
        assert_eq!(chunks[1].tag.index, 7);
        assert_eq!(chunks[1].tag.len, 10);
    }

    #[test]
    fn test_chunk_size_bounded_by_mtu() {
        let mut dsps = DspsState::new(&CodelessConfig::default());
        assert_eq!(dsps.chunk_size(), 20);
        assert!(dsps.set_chunk_size(21).is_err());
        assert!(dsps.set_chunk_size(0).is_err());
        dsps.set_mtu(247, Some(128));
        assert_eq!(dsps.chunk_size(), 128);
        dsps.set_mtu(100, None);
        assert_eq!(dsps.chunk_size(), 97);
    }

    #[test]
    fn test_pending_overflow_rejects_whole_submission() {
        let config = CodelessConfig::builder().dsps_pending_max_size(3).build();
        let mut dsps = DspsState::new(&config);
        dsps.push_pending(vec![chunk(None, 0), chunk(None, 1)]).unwrap();
        let err = dsps.push_pending(vec![chunk(None, 2), chunk(None, 3)]).unwrap_err();
        assert!(matches!(err, CodelessError::PendingOverflow { limit: 3 }));
        assert_eq!(dsps.pending_len(), 2);
    }

    #[test]
    fn test_requeue_front_and_purge() {
        let mut dsps = DspsState::new(&CodelessConfig::default());
        let op = OperationId(42);
        dsps.push_pending(vec![chunk(Some(op), 3), chunk(None, 9)]).unwrap();
        dsps.requeue_front(vec![chunk(Some(op), 1), chunk(Some(op), 2)]);
        let purged = dsps.purge(op);
        assert_eq!(purged.iter().map(|c| c.tag.index).collect::<Vec<_>>(), vec![1, 2, 3]);
        let rest = dsps.take_pending();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].tag.index, 9);
    }
}
