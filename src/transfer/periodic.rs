// MIT License - Copyright (c) 2026 The codeless-dsps developers
// CodeLess / DSPS protocol engine

use std::path::Path;
use std::time::{Duration, Instant};

use tracing::info;

use super::{is_due, ChunkProgress, OperationId, TransferState, TransferStats};
use crate::dsps::{payload_chunks, ChunkTag, DspsChunk};
use crate::error::{CodelessError, Result};
use crate::queue::Priority;

/// What a periodic send puts on the wire each period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodicPayload {
    /// The same bytes every time, split into chunks as needed.
    Data(Vec<u8>),
    /// `prefix + counter + suffix`, the counter zero padded to `digits`.
    Pattern {
        prefix: Vec<u8>,
        digits: u32,
        suffix: Vec<u8>,
    },
}

/// Periodic data or pattern send.
#[derive(Debug)]
pub struct PeriodicSend {
    id: OperationId,
    payload: PeriodicPayload,
    period: Duration,
    chunk_size: usize,
    priority: Priority,
    counter: u64,
    state: TransferState,
    last_emit: Option<Instant>,
    stats: TransferStats,
}

impl PeriodicSend {
    /// Resend `data` every `period`.
    pub fn data(data: impl Into<Vec<u8>>, chunk_size: usize, period: Duration) -> Result<Self> {
        let data = data.into();
        if data.is_empty() {
            return Err(CodelessError::validation("periodic data is empty"));
        }
        Self::build(PeriodicPayload::Data(data), chunk_size, period)
    }

    /// Counter pattern. The prefix is cut so every packet fits one chunk.
    pub fn pattern(
        prefix: &[u8],
        digits: u32,
        suffix: &[u8],
        chunk_size: usize,
        period: Duration,
    ) -> Result<Self> {
        if digits == 0 || digits > 18 {
            return Err(CodelessError::validation(format!("pattern digits {digits} out of range 1..=18")));
        }
        let fixed = digits as usize + suffix.len();
        if chunk_size < fixed {
            return Err(CodelessError::validation(format!(
                "chunk size {chunk_size} too small for {digits} digits and {} suffix bytes",
                suffix.len()
            )));
        }
        let keep = prefix.len().min(chunk_size - fixed);
        let payload = PeriodicPayload::Pattern {
            prefix: prefix[..keep].to_vec(),
            digits,
            suffix: suffix.to_vec(),
        };
        Self::build(payload, chunk_size, period)
    }

    /// Pattern whose prefix is read from a file.
    pub fn pattern_from_file(
        path: impl AsRef<Path>,
        digits: u32,
        suffix: &[u8],
        chunk_size: usize,
        period: Duration,
    ) -> Result<Self> {
        let path = path.as_ref();
        let prefix = std::fs::read(path).map_err(|e| {
            CodelessError::resource(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::pattern(&prefix, digits, suffix, chunk_size, period)
    }

    fn build(payload: PeriodicPayload, chunk_size: usize, period: Duration) -> Result<Self> {
        if chunk_size == 0 {
            return Err(CodelessError::validation("chunk size must be positive"));
        }
        if period.is_zero() {
            return Err(CodelessError::validation("period must be positive"));
        }
        Ok(Self {
            id: OperationId::next(),
            payload,
            period,
            chunk_size,
            priority: Priority::Low,
            counter: 0,
            state: TransferState::Created,
            last_emit: None,
            stats: TransferStats::new(),
        })
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn payload(&self) -> &PeriodicPayload {
        &self.payload
    }

    pub fn is_pattern(&self) -> bool {
        matches!(self.payload, PeriodicPayload::Pattern { .. })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Counter value of the next packet.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn state(&self) -> TransferState {
        self.state
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

    /// Packet for a given counter value.
    pub fn packet(&self, counter: u64) -> Vec<u8> {
        match &self.payload {
            PeriodicPayload::Data(data) => data.clone(),
            PeriodicPayload::Pattern {
                prefix,
                digits,
                suffix,
            } => {
                let mut packet = prefix.clone();
                packet.extend_from_slice(format!("{:0width$}", counter, width = *digits as usize).as_bytes());
                packet.extend_from_slice(suffix);
                packet
            }
        }
    }

    fn advance(&mut self) {
        self.counter = match &self.payload {
            PeriodicPayload::Pattern { digits, .. } => (self.counter + 1) % 10u64.pow(*digits),
            PeriodicPayload::Data(_) => self.counter + 1,
        };
    }

    pub(crate) fn start(&mut self, now: Instant) {
        self.state = TransferState::Started;
        self.last_emit = None;
        self.stats.start(now);
        info!("Periodic send {} started at counter {}", self.id, self.counter);
    }

    pub(crate) fn take_due(&mut self, now: Instant, tx_on: bool) -> Vec<DspsChunk> {
        if self.state != TransferState::Started || !tx_on || !is_due(self.last_emit, self.period, now) {
            return Vec::new();
        }
        self.last_emit = Some(now);
        let packet = self.packet(self.counter);
        let chunks = payload_chunks(&packet, self.chunk_size, Some(self.id), self.counter, self.priority);
        self.advance();
        chunks
    }

    pub(crate) fn on_chunk_written(&mut self, tag: &ChunkTag) -> ChunkProgress {
        if !tag.last_part {
            return ChunkProgress::Partial;
        }
        if self.is_pattern() {
            ChunkProgress::Pattern { counter: tag.index }
        } else {
            ChunkProgress::Periodic { count: tag.index }
        }
    }

    /// Freeze at the first packet that never reached the transport.
    pub(crate) fn stop(&mut self, first_unsent: Option<u64>, now: Instant) {
        if let Some(counter) = first_unsent {
            self.counter = counter;
        }
        self.state = TransferState::Stopped;
        self.last_emit = None;
        self.stats.stop(now);
        info!("Periodic send {} stopped, resumes at counter {}", self.id, self.counter);
    }

    pub(crate) fn abort(&mut self, now: Instant) {
        self.state = TransferState::Aborted;
        self.stats.stop(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(chunks: &[DspsChunk]) -> Vec<String> {
        chunks.iter().map(|c| String::from_utf8_lossy(&c.data).into_owned()).collect()
    }

    #[test]
    fn test_pattern_counter_wraps() {
        let t0 = Instant::now();
        let period = Duration::from_millis(1);
        let mut op = PeriodicSend::pattern(b"abcdefgh", 4, b"", 20, period).unwrap();
        op.start(t0);
        assert_eq!(text(&op.take_due(t0, true)), vec!["abcdefgh0000"]);
        assert_eq!(text(&op.take_due(t0 + period, true)), vec!["abcdefgh0001"]);
        op.counter = 9999;
        assert_eq!(text(&op.take_due(t0 + 2 * period, true)), vec!["abcdefgh9999"]);
        assert_eq!(text(&op.take_due(t0 + 3 * period, true)), vec!["abcdefgh0000"]);
    }

    #[test]
    fn test_pattern_prefix_truncated_to_chunk() {
        let op = PeriodicSend::pattern(b"abcdefgh", 4, b"\r\n", 10, Duration::from_millis(1)).unwrap();
        assert_eq!(op.packet(7), b"abcd0007\r\n".to_vec());
        assert!(PeriodicSend::pattern(b"ab", 4, b"\r\n", 5, Duration::from_millis(1)).is_err());
    }

    #[test]
    fn test_data_spans_chunks() {
        let t0 = Instant::now();
        let mut op = PeriodicSend::data(vec![1u8; 30], 20, Duration::from_millis(5)).unwrap();
        op.start(t0);
        let chunks = op.take_due(t0, true);
        assert_eq!(chunks.len(), 2);
        assert_eq!(op.on_chunk_written(&chunks[0].tag), ChunkProgress::Partial);
        assert_eq!(op.on_chunk_written(&chunks[1].tag), ChunkProgress::Periodic { count: 0 });
        assert!(op.take_due(t0, true).is_empty());
    }

    #[test]
    fn test_stop_preserves_next_counter() {
        let t0 = Instant::now();
        let period = Duration::from_millis(1);
        let mut op = PeriodicSend::pattern(b"x", 2, b"", 20, period).unwrap();
        op.start(t0);
        op.take_due(t0, true);
        op.take_due(t0 + period, true);
        op.stop(Some(1), t0 + period);
        assert_eq!(op.counter(), 1);
        op.start(t0 + 2 * period);
        assert_eq!(text(&op.take_due(t0 + 2 * period, true)), vec!["x01"]);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(PeriodicSend::data(Vec::new(), 20, Duration::from_millis(1)).is_err());
        assert!(PeriodicSend::data(vec![1], 20, Duration::ZERO).is_err());
        assert!(PeriodicSend::pattern(b"x", 0, b"", 20, Duration::from_millis(1)).is_err());
    }
}
