// MIT License - Copyright (c) 2026 The codeless-dsps developers
// CodeLess / DSPS protocol engine

use std::fmt;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::{OperationId, TransferState, TransferStats};
use crate::error::Result;
use crate::sink::{Sink, SinkProvider};

const NAME_TAG: &[u8] = b"Name:";
const SIZE_TAG: &[u8] = b"Size:";
const CRC_TAG: &[u8] = b"CRC:";
const END_TAG: &[u8] = b"END";
const NAME_MAX: usize = 100;
const SIZE_DIGITS_MAX: usize = 9;
const CRC_DIGITS: usize = 8;

/// Parsed file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub name: String,
    pub size: usize,
    pub crc: Option<u32>,
}

/// Outcome of scanning a buffer for a file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderParse {
    /// Header found. `consumed` counts every byte up to the first data byte.
    Complete { header: FileHeader, consumed: usize },
    /// A header starts but the buffer ends before its terminator.
    Incomplete,
    /// The candidate at the front is not a header. Drop `skip` bytes and rescan.
    Invalid { skip: usize },
    /// No header start. The first `discard` bytes can never be part of one.
    NotFound { discard: usize },
}

enum Step<T> {
    Done(T),
    More,
    Bad,
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn skip_ws(&mut self) {
        while self.pos < self.buf.len() && self.buf[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos.min(self.buf.len())..]
    }

    /// Match a literal, which may be cut by the end of the buffer.
    fn literal(&mut self, tag: &[u8]) -> Step<()> {
        let rest = self.rest();
        if rest.len() < tag.len() {
            return if tag.starts_with(rest) { Step::More } else { Step::Bad };
        }
        if rest.starts_with(tag) {
            self.pos += tag.len();
            Step::Done(())
        } else {
            Step::Bad
        }
    }

    /// Take 1..=max bytes matching `accept`. Ends on the first other byte.
    fn token(&mut self, max: usize, accept: impl Fn(u8) -> bool) -> Step<&'a [u8]> {
        let start = self.pos;
        while self.pos < self.buf.len() && accept(self.buf[self.pos]) {
            self.pos += 1;
            if self.pos - start > max {
                return Step::Bad;
            }
        }
        if self.at_end() {
            return Step::More;
        }
        if self.pos == start {
            return Step::Bad;
        }
        Step::Done(&self.buf[start..self.pos])
    }
}

macro_rules! step {
    ($e:expr) => {
        match $e {
            Step::Done(v) => v,
            Step::More => return Ok(None),
            Step::Bad => return Err(()),
        }
    };
}

/// Parse a header starting right after `Name:`. `Ok(None)` means more bytes are needed.
fn parse_fields(cur: &mut Cursor<'_>) -> std::result::Result<Option<FileHeader>, ()> {
    cur.skip_ws();
    let name = step!(cur.token(NAME_MAX, |b| !b.is_ascii_whitespace()));
    let name = String::from_utf8_lossy(name).into_owned();
    cur.skip_ws();
    step!(cur.literal(SIZE_TAG));
    cur.skip_ws();
    let digits = step!(cur.token(SIZE_DIGITS_MAX, |b| b.is_ascii_digit()));
    let size = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or(())?;
    cur.skip_ws();
    if cur.at_end() {
        return Ok(None);
    }
    let mut crc = None;
    if cur.rest()[0] == CRC_TAG[0] {
        step!(cur.literal(CRC_TAG));
        cur.skip_ws();
        let hex = step!(cur.token(CRC_DIGITS, |b| matches!(b, b'0'..=b'9' | b'a'..=b'f')));
        if hex.len() != CRC_DIGITS {
            return Err(());
        }
        let value = std::str::from_utf8(hex)
            .ok()
            .and_then(|s| u32::from_str_radix(s, 16).ok())
            .ok_or(())?;
        crc = Some(value);
        cur.skip_ws();
        if cur.at_end() {
            return Ok(None);
        }
    }
    if cur.rest()[0] == 0 {
        cur.pos += 1;
    } else {
        step!(cur.literal(END_TAG));
        cur.skip_ws();
    }
    Ok(Some(FileHeader { name, size, crc }))
}

/// Scan `buf` for a file header.
pub fn parse_header(buf: &[u8]) -> HeaderParse {
    let Some(start) = buf.windows(NAME_TAG.len()).position(|w| w == NAME_TAG) else {
        // Keep a tail that could be the beginning of a split tag.
        return HeaderParse::NotFound {
            discard: buf.len().saturating_sub(NAME_TAG.len() - 1),
        };
    };
    let mut cur = Cursor {
        buf,
        pos: start + NAME_TAG.len(),
    };
    match parse_fields(&mut cur) {
        Ok(Some(header)) => HeaderParse::Complete {
            header,
            consumed: cur.pos,
        },
        Ok(None) if start > 0 => HeaderParse::Invalid { skip: start },
        Ok(None) => HeaderParse::Incomplete,
        Err(()) => HeaderParse::Invalid {
            skip: start + NAME_TAG.len(),
        },
    }
}

/// Progress reported by [`FileReceive::on_data`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveUpdate {
    Header(FileHeader),
    Data { received: usize, size: usize },
    Crc { ok: bool, expected: u32, computed: u32 },
    Complete,
}

/// Receives one file announced by an in-band header.
pub struct FileReceive {
    id: OperationId,
    provider: Box<dyn SinkProvider>,
    buffer: Vec<u8>,
    header: Option<FileHeader>,
    sink: Option<Box<dyn Sink>>,
    received: usize,
    hasher: crc32fast::Hasher,
    state: TransferState,
    stats: TransferStats,
}

impl fmt::Debug for FileReceive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileReceive")
            .field("id", &self.id)
            .field("header", &self.header)
            .field("received", &self.received)
            .field("state", &self.state)
            .finish()
    }
}

impl FileReceive {
    pub fn new(provider: impl SinkProvider + 'static) -> Self {
        Self {
            id: OperationId::next(),
            provider: Box::new(provider),
            buffer: Vec::new(),
            header: None,
            sink: None,
            received: 0,
            hasher: crc32fast::Hasher::new(),
            state: TransferState::Created,
            stats: TransferStats::new(),
        }
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn header(&self) -> Option<&FileHeader> {
        self.header.as_ref()
    }

    pub fn name(&self) -> Option<&str> {
        self.header.as_ref().map(|h| h.name.as_str())
    }

    pub fn received(&self) -> usize {
        self.received
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

    pub(crate) fn start(&mut self, now: Instant) {
        self.state = TransferState::Started;
        self.stats.start(now);
    }

    pub(crate) fn stop(&mut self, now: Instant) {
        if self.state == TransferState::Started {
            self.state = TransferState::Stopped;
        }
        self.stats.stop(now);
    }

    pub(crate) fn abort(&mut self, now: Instant) {
        self.state = TransferState::Aborted;
        self.stats.stop(now);
    }

    /// Feed received DSPS bytes. Sink failures are returned as errors.
    pub fn on_data(&mut self, data: &[u8], now: Instant) -> Result<Vec<ReceiveUpdate>> {
        let mut updates = Vec::new();
        if self.state != TransferState::Started {
            return Ok(updates);
        }
        if self.header.is_some() {
            self.append(data, now, &mut updates)?;
            return Ok(updates);
        }
        self.buffer.extend_from_slice(data);
        loop {
            match parse_header(&self.buffer) {
                HeaderParse::NotFound { discard } => {
                    self.buffer.drain(..discard);
                    return Ok(updates);
                }
                HeaderParse::Incomplete => return Ok(updates),
                HeaderParse::Invalid { skip } => {
                    debug!("Skipping {} bytes of invalid file header", skip);
                    self.buffer.drain(..skip);
                }
                HeaderParse::Complete { header, consumed } => {
                    info!("Receiving file {} ({} bytes)", header.name, header.size);
                    self.sink = Some(self.provider.create(&header.name)?);
                    self.buffer.drain(..consumed);
                    self.header = Some(header.clone());
                    updates.push(ReceiveUpdate::Header(header));
                    let rest = std::mem::take(&mut self.buffer);
                    self.append(&rest, now, &mut updates)?;
                    return Ok(updates);
                }
            }
        }
    }

    fn append(&mut self, data: &[u8], now: Instant, updates: &mut Vec<ReceiveUpdate>) -> Result<()> {
        let Some(header) = self.header.clone() else {
            return Ok(());
        };
        let take = header.size.saturating_sub(self.received).min(data.len());
        if take > 0 {
            let part = &data[..take];
            if let Some(sink) = self.sink.as_mut() {
                sink.append(part)?;
            }
            self.hasher.update(part);
            self.received += take;
            self.stats.record(take as u64);
            updates.push(ReceiveUpdate::Data {
                received: self.received,
                size: header.size,
            });
        }
        if self.received == header.size {
            let computed = self.hasher.clone().finalize();
            if let Some(expected) = header.crc {
                let ok = expected == computed;
                if !ok {
                    warn!("File {} CRC mismatch: expected {:08x}, got {:08x}", header.name, expected, computed);
                }
                updates.push(ReceiveUpdate::Crc { ok, expected, computed });
            }
            self.state = TransferState::Complete;
            self.stats.stop(now);
            self.sink = None;
            updates.push(ReceiveUpdate::Complete);
            info!("File {} received", header.name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySinkProvider;

    const PAYLOAD: [u8; 4] = [1, 2, 3, 4];

    fn stream() -> Vec<u8> {
        let mut data = b"junkName: a.bin\nSize: 4\nCRC: b63cfbcd\nEND".to_vec();
        data.extend_from_slice(&PAYLOAD);
        data
    }

    #[test]
    fn test_crc_of_payload() {
        assert_eq!(crc32fast::hash(&PAYLOAD), 0xb63cfbcd);
    }

    #[test]
    fn test_parse_complete_header() {
        let data = stream();
        match parse_header(&data) {
            HeaderParse::Complete { header, consumed } => {
                assert_eq!(header.name, "a.bin");
                assert_eq!(header.size, 4);
                assert_eq!(header.crc, Some(0xb63cfbcd));
                assert_eq!(&data[consumed..], &PAYLOAD);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_nul_terminator_without_crc() {
        let data = b"Name: f Size: 12\0xyz";
        match parse_header(data) {
            HeaderParse::Complete { header, consumed } => {
                assert_eq!(header.crc, None);
                assert_eq!(header.size, 12);
                assert_eq!(&data[consumed..], b"xyz");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_incomplete_and_invalid() {
        assert_eq!(parse_header(b"Name: a.bin\nSiz"), HeaderParse::Incomplete);
        assert_eq!(parse_header(b"Name: a.bin\nSize: 4\nEN"), HeaderParse::Incomplete);
        assert_eq!(parse_header(b"xxName: a"), HeaderParse::Invalid { skip: 2 });
        assert_eq!(
            parse_header(b"Name: a.bin\nLength: 4"),
            HeaderParse::Invalid { skip: 5 }
        );
        assert_eq!(
            parse_header(b"Name: a Size: 1234567890 END"),
            HeaderParse::Invalid { skip: 5 }
        );
        assert_eq!(
            parse_header(b"Name: a Size: 4 CRC: B63CFBCD END"),
            HeaderParse::Invalid { skip: 5 }
        );
        assert_eq!(parse_header(b"garbage"), HeaderParse::NotFound { discard: 3 });
    }

    #[test]
    fn test_name_length_limit() {
        let long = format!("Name: {} Size: 1 END", "n".repeat(101));
        assert_eq!(parse_header(long.as_bytes()), HeaderParse::Invalid { skip: 5 });
    }

    #[test]
    fn test_receive_any_fragmentation() {
        let data = stream();
        for size in 1..=data.len() {
            let sinks = MemorySinkProvider::new();
            let mut op = FileReceive::new(sinks.clone());
            let t0 = Instant::now();
            op.start(t0);
            let mut updates = Vec::new();
            for fragment in data.chunks(size) {
                updates.extend(op.on_data(fragment, t0).unwrap());
            }
            assert!(op.is_complete(), "fragment size {size}");
            assert_eq!(sinks.file("a.bin"), Some(PAYLOAD.to_vec()), "fragment size {size}");
            assert!(updates.contains(&ReceiveUpdate::Crc {
                ok: true,
                expected: 0xb63cfbcd,
                computed: 0xb63cfbcd
            }));
        }
    }

    #[test]
    fn test_extra_bytes_ignored() {
        let sinks = MemorySinkProvider::new();
        let mut op = FileReceive::new(sinks.clone());
        let t0 = Instant::now();
        op.start(t0);
        let mut data = stream();
        data.extend_from_slice(b"trailing");
        op.on_data(&data, t0).unwrap();
        assert!(op.on_data(b"more", t0).unwrap().is_empty());
        assert_eq!(sinks.file("a.bin"), Some(PAYLOAD.to_vec()));
    }

    #[test]
    fn test_crc_mismatch_reported() {
        let sinks = MemorySinkProvider::new();
        let mut op = FileReceive::new(sinks);
        let t0 = Instant::now();
        op.start(t0);
        let updates = op
            .on_data(b"Name: b Size: 2 CRC: 00000000 END\x01\x02", t0)
            .unwrap();
        assert!(updates
            .iter()
            .any(|u| matches!(u, ReceiveUpdate::Crc { ok: false, .. })));
        assert!(op.is_complete());
    }
}
