// MIT License - Copyright (c) 2026 The codeless-dsps developers
// CodeLess / DSPS protocol engine

use crate::error::{CodelessError, Result};

/// Byte order used by a [`ByteBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    BigEndian,
    LittleEndian,
}

/// Read/write cursor over a byte sequence with a fixed byte order.
///
/// Writes append to the end of the buffer. Reads advance a separate cursor
/// and fail with a resource error when fewer bytes remain than requested.
#[derive(Debug, Clone)]
pub struct ByteBuffer {
    data: Vec<u8>,
    position: usize,
    order: ByteOrder,
}

impl ByteBuffer {
    pub fn new(order: ByteOrder) -> Self {
        Self {
            data: Vec::new(),
            position: 0,
            order,
        }
    }

    pub fn with_capacity(capacity: usize, order: ByteOrder) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            position: 0,
            order,
        }
    }

    /// Wrap existing bytes for reading.
    pub fn wrap(data: impl Into<Vec<u8>>, order: ByteOrder) -> Self {
        Self {
            data: data.into(),
            position: 0,
            order,
        }
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn set_position(&mut self, position: usize) -> Result<()> {
        if position > self.data.len() {
            return Err(CodelessError::resource(format!(
                "position {position} beyond buffer size {}",
                self.data.len()
            )));
        }
        self.position = position;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.data.push(value);
        self
    }

    pub fn put_u16(&mut self, value: u16) -> &mut Self {
        match self.order {
            ByteOrder::BigEndian => self.data.extend_from_slice(&value.to_be_bytes()),
            ByteOrder::LittleEndian => self.data.extend_from_slice(&value.to_le_bytes()),
        }
        self
    }

    /// Write the low 24 bits of `value`.
    pub fn put_u24(&mut self, value: u32) -> &mut Self {
        let bytes = match self.order {
            ByteOrder::BigEndian => value.to_be_bytes(),
            ByteOrder::LittleEndian => value.to_le_bytes(),
        };
        match self.order {
            ByteOrder::BigEndian => self.data.extend_from_slice(&bytes[1..]),
            ByteOrder::LittleEndian => self.data.extend_from_slice(&bytes[..3]),
        }
        self
    }

    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        match self.order {
            ByteOrder::BigEndian => self.data.extend_from_slice(&value.to_be_bytes()),
            ByteOrder::LittleEndian => self.data.extend_from_slice(&value.to_le_bytes()),
        }
        self
    }

    pub fn put_u64(&mut self, value: u64) -> &mut Self {
        match self.order {
            ByteOrder::BigEndian => self.data.extend_from_slice(&value.to_be_bytes()),
            ByteOrder::LittleEndian => self.data.extend_from_slice(&value.to_le_bytes()),
        }
        self
    }

    /// Append raw bytes without reordering.
    pub fn put_data(&mut self, data: &[u8]) -> &mut Self {
        self.data.extend_from_slice(data);
        self
    }

    fn take(&mut self, count: usize) -> Result<&[u8]> {
        if self.remaining() < count {
            return Err(CodelessError::resource(format!(
                "buffer underflow: need {count} bytes, {} remaining",
                self.remaining()
            )));
        }
        let start = self.position;
        self.position += count;
        Ok(&self.data[start..start + count])
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        let bytes = self.take_array::<2>()?;
        Ok(match self.order {
            ByteOrder::BigEndian => u16::from_be_bytes(bytes),
            ByteOrder::LittleEndian => u16::from_le_bytes(bytes),
        })
    }

    pub fn get_u24(&mut self) -> Result<u32> {
        let bytes = self.take_array::<3>()?;
        Ok(match self.order {
            ByteOrder::BigEndian => u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]),
            ByteOrder::LittleEndian => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]),
        })
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        let bytes = self.take_array::<4>()?;
        Ok(match self.order {
            ByteOrder::BigEndian => u32::from_be_bytes(bytes),
            ByteOrder::LittleEndian => u32::from_le_bytes(bytes),
        })
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        let bytes = self.take_array::<8>()?;
        Ok(match self.order {
            ByteOrder::BigEndian => u64::from_be_bytes(bytes),
            ByteOrder::LittleEndian => u64::from_le_bytes(bytes),
        })
    }

    pub fn get_data(&mut self, count: usize) -> Result<Vec<u8>> {
        Ok(self.take(count)?.to_vec())
    }

    /// Read a u8 at an absolute position without moving the cursor.
    pub fn get_u8_at(&self, index: usize) -> Result<u8> {
        self.data.get(index).copied().ok_or_else(|| {
            CodelessError::resource(format!("index {index} beyond buffer size {}", self.data.len()))
        })
    }

    /// Read a u16 at an absolute position without moving the cursor.
    pub fn get_u16_at(&self, index: usize) -> Result<u16> {
        let mut view = ByteBuffer::wrap(self.slice_at(index, 2)?, self.order);
        view.get_u16()
    }

    /// Read a u32 at an absolute position without moving the cursor.
    pub fn get_u32_at(&self, index: usize) -> Result<u32> {
        let mut view = ByteBuffer::wrap(self.slice_at(index, 4)?, self.order);
        view.get_u32()
    }

    fn slice_at(&self, index: usize, count: usize) -> Result<Vec<u8>> {
        self.data
            .get(index..index + count)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| {
                CodelessError::resource(format!(
                    "range {index}..{} beyond buffer size {}",
                    index + count,
                    self.data.len()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_layout() {
        let mut buf = ByteBuffer::new(ByteOrder::BigEndian);
        buf.put_u8(0x01).put_u16(0x0203).put_u32(0x04050607);
        assert_eq!(buf.as_bytes(), &[1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_little_endian_layout() {
        let mut buf = ByteBuffer::new(ByteOrder::LittleEndian);
        buf.put_u16(0x0203).put_u32(0x04050607);
        assert_eq!(buf.as_bytes(), &[3, 2, 7, 6, 5, 4]);
    }

    #[test]
    fn test_u24_both_orders() {
        let mut be = ByteBuffer::new(ByteOrder::BigEndian);
        be.put_u24(0x00aabbcc);
        assert_eq!(be.as_bytes(), &[0xaa, 0xbb, 0xcc]);
        assert_eq!(be.get_u24().unwrap(), 0xaabbcc);

        let mut le = ByteBuffer::new(ByteOrder::LittleEndian);
        le.put_u24(0x12aabbcc);
        assert_eq!(le.as_bytes(), &[0xcc, 0xbb, 0xaa]);
        assert_eq!(le.get_u24().unwrap(), 0xaabbcc);
    }

    #[test]
    fn test_sequential_reads_advance_cursor() {
        let mut buf = ByteBuffer::wrap(vec![0x12, 0x34, 0x56, 0x78, 0x9a], ByteOrder::BigEndian);
        assert_eq!(buf.get_u16().unwrap(), 0x1234);
        assert_eq!(buf.position(), 2);
        assert_eq!(buf.remaining(), 3);
        assert_eq!(buf.get_data(2).unwrap(), vec![0x56, 0x78]);
        assert_eq!(buf.get_u8().unwrap(), 0x9a);
        assert!(!buf.has_remaining());
    }

    #[test]
    fn test_underflow_is_error_and_keeps_position() {
        let mut buf = ByteBuffer::wrap(vec![1, 2, 3], ByteOrder::LittleEndian);
        assert!(buf.get_u32().is_err());
        assert_eq!(buf.position(), 0);
        assert_eq!(buf.get_u16().unwrap(), 0x0201);
    }

    #[test]
    fn test_absolute_reads() {
        let buf = ByteBuffer::wrap(vec![0, 0x11, 0x22, 0x33, 0x44], ByteOrder::LittleEndian);
        assert_eq!(buf.get_u8_at(1).unwrap(), 0x11);
        assert_eq!(buf.get_u16_at(1).unwrap(), 0x2211);
        assert_eq!(buf.get_u32_at(1).unwrap(), 0x44332211);
        assert!(buf.get_u32_at(2).is_err());
        assert_eq!(buf.position(), 0);
    }

    #[test]
    fn test_u64() {
        let mut buf = ByteBuffer::new(ByteOrder::BigEndian);
        buf.put_u64(0x0102030405060708);
        assert_eq!(buf.get_u64().unwrap(), 0x0102030405060708);
    }
}
