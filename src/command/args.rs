// MIT License - Copyright (c) 2026 The codeless-dsps developers
// CodeLess / DSPS protocol engine

use std::fmt;

use crate::constants::{
    BONDING_DATABASE_ALL_VALUES, BONDING_DATABASE_INDEX_MAX, BONDING_DATABASE_INDEX_MIN,
    GAP_ADDRESS_TYPE_PUBLIC, GAP_ADDRESS_TYPE_RANDOM,
};
use crate::protocol::{check_bluetooth_address, hex_to_bytes};

/// A parsed command argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    Int(i64),
    Text(String),
}

impl Argument {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Argument::Int(v) => Some(*v),
            Argument::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Argument::Text(s) => Some(s),
            Argument::Int(_) => None,
        }
    }
}

impl From<i64> for Argument {
    fn from(v: i64) -> Self {
        Argument::Int(v)
    }
}

impl From<&str> for Argument {
    fn from(s: &str) -> Self {
        Argument::Text(s.to_string())
    }
}

impl From<String> for Argument {
    fn from(s: String) -> Self {
        Argument::Text(s)
    }
}

/// Grammar of a single argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    /// Decimal integer in an inclusive range.
    Int { min: i64, max: i64 },
    /// Hexadecimal integer (`0x` optional) in an inclusive range, packed as `0xNN`.
    HexInt { min: i64, max: i64 },
    /// Bonding database index (1..=5) or `0xFF` for all entries.
    BondIndex,
    /// Hex string with an inclusive character-length range.
    HexString { min_chars: usize, max_chars: usize },
    /// Colon separated hex bytes (`02:01:06`), at most `max_bytes` bytes.
    HexBytes { max_bytes: usize },
    /// Bluetooth address `XX:XX:XX:XX:XX:XX`.
    Address,
    /// GAP address type, `P` or `R`.
    AddressType,
    /// One of a fixed set of literal values.
    Choice(&'static [&'static str]),
    /// Free text to the end of the line, length in characters.
    Text { min: usize, max: usize },
}

/// Reason an argument did not match its grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgError {
    /// The text does not have the expected shape.
    Malformed,
    /// The text has the right shape but the value is out of range.
    OutOfRange,
}

impl fmt::Display for ArgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgError::Malformed => write!(f, "malformed"),
            ArgError::OutOfRange => write!(f, "out of range"),
        }
    }
}

fn parse_hex_int(text: &str) -> Option<i64> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    i64::from_str_radix(digits, 16).ok()
}

fn check_range(value: i64, min: i64, max: i64) -> Result<i64, ArgError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ArgError::OutOfRange)
    }
}

impl ArgType {
    /// Whether this argument swallows the rest of the line, commas included.
    pub fn is_greedy(&self) -> bool {
        matches!(self, ArgType::Text { .. })
    }

    /// Parse and validate one argument from its wire text.
    pub fn parse(&self, text: &str) -> Result<Argument, ArgError> {
        match *self {
            ArgType::Int { min, max } => {
                let text = text.trim();
                let value = text.parse::<i64>().map_err(|_| ArgError::Malformed)?;
                check_range(value, min, max).map(Argument::Int)
            }
            ArgType::HexInt { min, max } => {
                let value = parse_hex_int(text.trim()).ok_or(ArgError::Malformed)?;
                check_range(value, min, max).map(Argument::Int)
            }
            ArgType::BondIndex => {
                let text = text.trim();
                let value = if text.starts_with("0x") || text.starts_with("0X") {
                    parse_hex_int(text).ok_or(ArgError::Malformed)?
                } else {
                    text.parse::<i64>().map_err(|_| ArgError::Malformed)?
                };
                self.validate(&Argument::Int(value))?;
                Ok(Argument::Int(value))
            }
            ArgType::Text { .. } | ArgType::Choice(_) | ArgType::AddressType => {
                let arg = Argument::Text(text.to_string());
                self.validate(&arg)?;
                Ok(arg)
            }
            ArgType::HexString { .. } | ArgType::HexBytes { .. } | ArgType::Address => {
                let arg = Argument::Text(text.trim().to_ascii_uppercase());
                self.validate(&arg)?;
                Ok(arg)
            }
        }
    }

    /// Validate an argument value against this grammar.
    pub fn validate(&self, arg: &Argument) -> Result<(), ArgError> {
        match (*self, arg) {
            (ArgType::Int { min, max }, Argument::Int(v))
            | (ArgType::HexInt { min, max }, Argument::Int(v)) => {
                check_range(*v, min, max).map(|_| ())
            }
            (ArgType::BondIndex, Argument::Int(v)) => {
                if (BONDING_DATABASE_INDEX_MIN..=BONDING_DATABASE_INDEX_MAX).contains(v)
                    || *v == BONDING_DATABASE_ALL_VALUES
                {
                    Ok(())
                } else {
                    Err(ArgError::OutOfRange)
                }
            }
            (ArgType::HexString { min_chars, max_chars }, Argument::Text(s)) => {
                if !s.chars().all(|c| c.is_ascii_hexdigit()) || s.len() % 2 != 0 {
                    Err(ArgError::Malformed)
                } else if s.len() < min_chars || s.len() > max_chars {
                    Err(ArgError::OutOfRange)
                } else {
                    Ok(())
                }
            }
            (ArgType::HexBytes { max_bytes }, Argument::Text(s)) => {
                let well_formed = s
                    .split(':')
                    .all(|b| b.len() == 2 && b.chars().all(|c| c.is_ascii_hexdigit()));
                if !well_formed {
                    return Err(ArgError::Malformed);
                }
                match hex_to_bytes(s) {
                    Some(bytes) if bytes.len() <= max_bytes => Ok(()),
                    Some(_) => Err(ArgError::OutOfRange),
                    None => Err(ArgError::Malformed),
                }
            }
            (ArgType::Address, Argument::Text(s)) => {
                if check_bluetooth_address(s) {
                    Ok(())
                } else {
                    Err(ArgError::Malformed)
                }
            }
            (ArgType::AddressType, Argument::Text(s)) => {
                if s == GAP_ADDRESS_TYPE_PUBLIC || s == GAP_ADDRESS_TYPE_RANDOM {
                    Ok(())
                } else {
                    Err(ArgError::Malformed)
                }
            }
            (ArgType::Choice(values), Argument::Text(s)) => {
                if values.contains(&s.as_str()) {
                    Ok(())
                } else {
                    Err(ArgError::OutOfRange)
                }
            }
            (ArgType::Text { min, max }, Argument::Text(s)) => {
                let len = s.chars().count();
                if len < min || len > max {
                    Err(ArgError::OutOfRange)
                } else {
                    Ok(())
                }
            }
            _ => Err(ArgError::Malformed),
        }
    }

    /// Wire text of a validated argument.
    pub fn format(&self, arg: &Argument) -> String {
        match (*self, arg) {
            (ArgType::HexInt { .. }, Argument::Int(v)) => format!("0x{v:02X}"),
            (ArgType::BondIndex, Argument::Int(v)) if *v == BONDING_DATABASE_ALL_VALUES => "0xFF".to_string(),
            (_, Argument::Int(v)) => v.to_string(),
            (_, Argument::Text(s)) => s.clone(),
        }
    }
}
