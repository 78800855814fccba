// MIT License - Copyright (c) 2026 The codeless-dsps developers
// CodeLess / DSPS protocol engine

use super::types::BondingEntry;

/// Decoded response of a completed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseValue {
    Int(i64),
    Ints(Vec<i64>),
    Text(String),
    Lines(Vec<String>),
    Address { address: String, random: bool },
    Bonding(BondingEntry),
}

/// How the response lines of a command kind are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// No response text expected.
    None,
    /// Single decimal number.
    Int,
    /// Comma separated numbers, possibly spread over several lines.
    Ints,
    /// Single text line.
    Text,
    /// Every line kept as is.
    Lines,
    /// Bluetooth address, optionally followed by `,P` or `,R`.
    Address,
    /// Hex encoded bonding entry.
    Bonding,
}

fn parse_number(text: &str) -> Option<i64> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

impl ResponseShape {
    /// Decode a single response line. Used by kinds that parse partial responses.
    pub fn decode_line(&self, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() {
            None
        } else {
            Some(line.to_string())
        }
    }

    /// Decode all response lines once the command completed.
    ///
    /// Empty lines are ignored. Returns `None` when nothing decodable was
    /// received, which is normal for set-style invocations.
    pub fn decode(&self, lines: &[String]) -> Option<ResponseValue> {
        let lines: Vec<&str> = lines
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect();
        let last = lines.last().copied();
        match self {
            ResponseShape::None => None,
            ResponseShape::Int => last.and_then(parse_number).map(ResponseValue::Int),
            ResponseShape::Ints => {
                let values: Option<Vec<i64>> = lines
                    .iter()
                    .flat_map(|l| l.split(','))
                    .map(parse_number)
                    .collect();
                match values {
                    Some(v) if !v.is_empty() => Some(ResponseValue::Ints(v)),
                    _ => None,
                }
            }
            ResponseShape::Text => last.map(|l| ResponseValue::Text(l.to_string())),
            ResponseShape::Lines => {
                if lines.is_empty() {
                    None
                } else {
                    Some(ResponseValue::Lines(
                        lines.iter().map(|l| l.to_string()).collect(),
                    ))
                }
            }
            ResponseShape::Address => {
                let line = last?;
                let (address, kind) = match line.split_once(',') {
                    Some((a, k)) => (a.trim(), k.trim()),
                    None => (line, "P"),
                };
                crate::protocol::check_bluetooth_address(address).then(|| {
                    ResponseValue::Address {
                        address: address.to_ascii_uppercase(),
                        random: kind.eq_ignore_ascii_case("R"),
                    }
                })
            }
            ResponseShape::Bonding => last
                .and_then(|l| BondingEntry::from_hex(l).ok())
                .map(ResponseValue::Bonding),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_int_uses_last_line() {
        assert_eq!(
            ResponseShape::Int.decode(&lines(&["", "87"])),
            Some(ResponseValue::Int(87))
        );
        assert_eq!(ResponseShape::Int.decode(&lines(&["abc"])), None);
        assert_eq!(ResponseShape::Int.decode(&[]), None);
    }

    #[test]
    fn test_ints_across_lines() {
        assert_eq!(
            ResponseShape::Ints.decode(&lines(&["1,2", "3"])),
            Some(ResponseValue::Ints(vec![1, 2, 3]))
        );
        assert_eq!(ResponseShape::Ints.decode(&lines(&["1,x"])), None);
    }

    #[test]
    fn test_address() {
        assert_eq!(
            ResponseShape::Address.decode(&lines(&["80:ea:ca:00:11:22,R"])),
            Some(ResponseValue::Address {
                address: "80:EA:CA:00:11:22".to_string(),
                random: true
            })
        );
        assert_eq!(ResponseShape::Address.decode(&lines(&["nope"])), None);
    }

    #[test]
    fn test_lines_and_none() {
        assert_eq!(
            ResponseShape::Lines.decode(&lines(&["a", "", "b"])),
            Some(ResponseValue::Lines(lines(&["a", "b"])))
        );
        assert_eq!(ResponseShape::None.decode(&lines(&["x"])), None);
    }

    #[test]
    fn test_bonding() {
        let entry = BondingEntry {
            key_size: 16,
            ..Default::default()
        };
        assert_eq!(
            ResponseShape::Bonding.decode(&lines(&[&entry.to_hex()])),
            Some(ResponseValue::Bonding(entry))
        );
    }
}
