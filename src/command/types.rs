// MIT License - Copyright (c) 2026 The codeless-dsps developers
// CodeLess / DSPS protocol engine

use crate::buffer::{ByteBuffer, ByteOrder};
use crate::constants::{BINESC_TIME_AFTER_DEFAULT, BINESC_TIME_PRIOR_DEFAULT, GPIO_INVALID};
use crate::error::{CodelessError, Result};

/// A GPIO pin on the peer, addressed as `10 * port + pin` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gpio {
    pub port: i64,
    pub pin: i64,
    /// Pin function (0..=28), or -1 when unknown.
    pub function: i64,
    /// Output level or input state, or -1 when unknown.
    pub state: i64,
}

impl Gpio {
    pub fn new(port: i64, pin: i64) -> Self {
        Self {
            port,
            pin,
            function: GPIO_INVALID,
            state: GPIO_INVALID,
        }
    }

    pub fn from_pack(pack: i64) -> Self {
        Self::new(pack / 10, pack % 10)
    }

    pub fn with_function(mut self, function: i64) -> Self {
        self.function = function;
        self
    }

    pub fn with_state(mut self, state: i64) -> Self {
        self.state = state;
        self
    }

    pub fn pack(&self) -> i64 {
        10 * self.port + self.pin
    }

    pub fn is_binary_state(state: i64) -> bool {
        state == 0 || state == 1
    }
}

/// Escape sequence used by the peer to leave binary mode on its UART.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinEscape {
    /// 24-bit escape byte sequence.
    pub sequence: u32,
    /// Guard time before the sequence (ms).
    pub time_prior: u16,
    /// Guard time after the sequence (ms).
    pub time_after: u16,
}

impl BinEscape {
    pub fn new(sequence: u32) -> Self {
        Self {
            sequence: sequence & 0x00ff_ffff,
            time_prior: BINESC_TIME_PRIOR_DEFAULT,
            time_after: BINESC_TIME_AFTER_DEFAULT,
        }
    }

    /// The three escape bytes in transmission order.
    pub fn sequence_bytes(&self) -> Vec<u8> {
        let mut buf = ByteBuffer::with_capacity(3, ByteOrder::BigEndian);
        buf.put_u24(self.sequence);
        buf.into_bytes()
    }

    pub fn from_sequence_bytes(bytes: &[u8]) -> Result<Self> {
        let mut buf = ByteBuffer::wrap(bytes.to_vec(), ByteOrder::BigEndian);
        Ok(Self::new(buf.get_u24()?))
    }
}

impl Default for BinEscape {
    fn default() -> Self {
        Self::new(0x2b2b2b)
    }
}

/// One entry of the peer's bonding database, as exchanged by `AT+IEBNDE`.
///
/// The wire form is the little-endian packed record, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BondingEntry {
    pub ltk: [u8; 16],
    pub ediv: u16,
    pub rand: [u8; 8],
    pub key_size: u8,
    pub csrk: [u8; 16],
    pub bluetooth_address: [u8; 6],
    pub address_type: u8,
    pub auth_level: u8,
    pub bonding_db_slot: u8,
    pub irk: [u8; 16],
    pub persistence_status: u8,
    pub timestamp: u32,
}

impl BondingEntry {
    /// Packed record size in bytes.
    pub const SIZE: usize = 16 + 2 + 8 + 1 + 16 + 6 + 1 + 1 + 1 + 16 + 1 + 4;

    pub fn pack(&self) -> Vec<u8> {
        let mut buf = ByteBuffer::with_capacity(Self::SIZE, ByteOrder::LittleEndian);
        buf.put_data(&self.ltk)
            .put_u16(self.ediv)
            .put_data(&self.rand)
            .put_u8(self.key_size)
            .put_data(&self.csrk)
            .put_data(&self.bluetooth_address)
            .put_u8(self.address_type)
            .put_u8(self.auth_level)
            .put_u8(self.bonding_db_slot)
            .put_data(&self.irk)
            .put_u8(self.persistence_status)
            .put_u32(self.timestamp);
        buf.into_bytes()
    }

    pub fn unpack(data: &[u8]) -> Result<Self> {
        if data.len() != Self::SIZE {
            return Err(CodelessError::validation(format!(
                "bonding entry must be {} bytes, got {}",
                Self::SIZE,
                data.len()
            )));
        }
        let mut buf = ByteBuffer::wrap(data.to_vec(), ByteOrder::LittleEndian);
        let mut entry = BondingEntry::default();
        entry.ltk.copy_from_slice(&buf.get_data(16)?);
        entry.ediv = buf.get_u16()?;
        entry.rand.copy_from_slice(&buf.get_data(8)?);
        entry.key_size = buf.get_u8()?;
        entry.csrk.copy_from_slice(&buf.get_data(16)?);
        entry.bluetooth_address.copy_from_slice(&buf.get_data(6)?);
        entry.address_type = buf.get_u8()?;
        entry.auth_level = buf.get_u8()?;
        entry.bonding_db_slot = buf.get_u8()?;
        entry.irk.copy_from_slice(&buf.get_data(16)?);
        entry.persistence_status = buf.get_u8()?;
        entry.timestamp = buf.get_u32()?;
        Ok(entry)
    }

    /// Hex form used as the IEBNDE argument.
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.pack())
    }

    pub fn from_hex(text: &str) -> Result<Self> {
        let data = hex::decode(text.trim())
            .map_err(|e| CodelessError::parse(format!("bonding entry hex: {e}")))?;
        Self::unpack(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpio_pack() {
        let gpio = Gpio::new(1, 3);
        assert_eq!(gpio.pack(), 13);
        let back = Gpio::from_pack(13);
        assert_eq!((back.port, back.pin), (1, 3));
        assert_eq!(back.function, GPIO_INVALID);
        assert!(Gpio::is_binary_state(1));
        assert!(!Gpio::is_binary_state(2));
    }

    #[test]
    fn test_bin_escape_bytes() {
        let esc = BinEscape::new(0x11aabbcc);
        assert_eq!(esc.sequence, 0xaabbcc);
        assert_eq!(esc.sequence_bytes(), vec![0xaa, 0xbb, 0xcc]);
        assert_eq!(BinEscape::from_sequence_bytes(&[0xaa, 0xbb, 0xcc]).unwrap(), esc);
        assert_eq!(esc.time_prior, 1000);
    }

    #[test]
    fn test_bonding_entry_layout() {
        let entry = BondingEntry {
            ediv: 0x1234,
            key_size: 16,
            bluetooth_address: [1, 2, 3, 4, 5, 6],
            timestamp: 0xdeadbeef,
            ..Default::default()
        };
        let packed = entry.pack();
        assert_eq!(packed.len(), BondingEntry::SIZE);
        // ediv follows the 16-byte LTK, little-endian
        assert_eq!(&packed[16..18], &[0x34, 0x12]);
        assert_eq!(&packed[BondingEntry::SIZE - 4..], &[0xef, 0xbe, 0xad, 0xde]);
        assert_eq!(BondingEntry::from_hex(&entry.to_hex()).unwrap(), entry);
    }

    #[test]
    fn test_bonding_entry_wrong_size() {
        assert!(BondingEntry::unpack(&[0u8; 10]).is_err());
        assert!(BondingEntry::from_hex("zz").is_err());
    }
}
