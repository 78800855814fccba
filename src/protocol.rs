// MIT License - Copyright (c) 2026 The codeless-dsps developers
// CodeLess / DSPS protocol engine

use crate::constants::{
    CODELESS_DATA_PENDING, DSPS_XOFF, DSPS_XON, ERROR, EXTENDED_MARKER, OK, PEER_INVALID_COMMAND,
    PREFIX,
};
use crate::error::ErrorCodeMessage;

/// Text command split into its wire parts.
///
/// `ATr+IO=10,1` splits into prefix `ATr`, extended `true`, identifier `IO`
/// and arguments `10,1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandParts<'a> {
    pub prefix: &'a str,
    pub extended: bool,
    pub identifier: String,
    pub arguments: Option<&'a str>,
}

/// Whether the text starts with the `AT` prefix.
pub fn has_prefix(text: &str) -> bool {
    text.trim_start()
        .get(..PREFIX.len())
        .is_some_and(|p| p.eq_ignore_ascii_case(PREFIX))
}

/// Split a command into prefix, identifier and argument text.
///
/// Returns `None` when the text does not start with `AT`.
pub fn split_command(text: &str) -> Option<CommandParts<'_>> {
    let text = text.trim();
    if !has_prefix(text) {
        return None;
    }
    let mut rest = &text[PREFIX.len()..];
    let mut prefix_len = PREFIX.len();
    // A bare trailing `r` is the ATR command, not the remote prefix.
    if rest.starts_with('r') && rest.len() > 1 {
        rest = &rest[1..];
        prefix_len += 1;
    }
    let prefix = &text[..prefix_len];
    let extended = rest.starts_with(EXTENDED_MARKER);
    if extended {
        rest = &rest[1..];
    }
    let (identifier, arguments) = match rest.split_once('=') {
        Some((id, args)) => (id, Some(args)),
        None => (rest, None),
    };
    Some(CommandParts {
        prefix,
        extended,
        identifier: identifier.trim().to_ascii_uppercase(),
        arguments,
    })
}

/// Whether the command text carries non-empty arguments.
pub fn has_arguments(text: &str) -> bool {
    split_command(text)
        .and_then(|parts| parts.arguments)
        .is_some_and(|args| !args.is_empty())
}

/// Number of arguments separated by `split`. Empty argument text counts as zero.
pub fn count_arguments(arguments: &str, split: char) -> usize {
    if arguments.is_empty() {
        0
    } else {
        arguments.split(split).count()
    }
}

/// Whether a response line is the success token.
pub fn is_success(line: &str) -> bool {
    line.trim() == OK
}

/// Whether a response line is the error token, with or without a message.
pub fn is_error(line: &str) -> bool {
    let line = line.trim();
    line == ERROR || is_error_message(line)
}

/// Whether a response line is `ERROR: <message>`.
pub fn is_error_message(line: &str) -> bool {
    line.trim()
        .strip_prefix(ERROR)
        .is_some_and(|rest| rest.trim_start().starts_with(':'))
}

/// Extract the message of an `ERROR: <message>` line.
pub fn error_message(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix(ERROR)?.trim_start();
    rest.strip_prefix(':').map(str::trim)
}

/// Whether the peer rejected our command as invalid.
pub fn is_peer_invalid_command(message: &str) -> bool {
    message.trim() == PEER_INVALID_COMMAND
}

/// Whether an error message carries a `<code>,<message>` pair.
pub fn is_error_code_message(message: &str) -> bool {
    ErrorCodeMessage::parse(message).is_some()
}

/// Parse a `<code>,<message>` error.
pub fn parse_error_code_message(message: &str) -> Option<ErrorCodeMessage> {
    ErrorCodeMessage::parse(message)
}

/// Whether a CodeLess flow-control notification signals a pending response.
pub fn is_data_pending(value: &[u8]) -> bool {
    value.first() == Some(&CODELESS_DATA_PENDING)
}

/// Decode a DSPS flow-control byte. `None` for unknown values.
pub fn decode_flow(value: &[u8]) -> Option<bool> {
    match value.first() {
        Some(&DSPS_XON) => Some(true),
        Some(&DSPS_XOFF) => Some(false),
        _ => None,
    }
}

/// Encode a DSPS flow-control byte.
pub fn encode_flow(on: bool) -> u8 {
    if on {
        DSPS_XON
    } else {
        DSPS_XOFF
    }
}

/// Decode the text carried by a CodeLess read, dropping trailing NUL bytes.
pub fn decode_text(data: &[u8]) -> String {
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&data[..end]).into_owned()
}

/// Split received text into lines. CR LF and bare LF both terminate a line.
pub fn split_lines(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = text
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
        .collect();
    if text.ends_with('\n') {
        lines.pop();
    }
    lines
}

/// Direction of a text line relative to this side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineDirection {
    Inbound,
    Outbound,
}

/// Classification of a logged text line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineType {
    Command,
    Response,
    Ok,
    Error,
    Empty,
}

/// One text line exchanged with the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub direction: LineDirection,
    pub line_type: LineType,
    pub text: String,
}

impl Line {
    pub fn new(direction: LineDirection, line_type: LineType, text: impl Into<String>) -> Self {
        Self {
            direction,
            line_type,
            text: text.into(),
        }
    }

    /// Classify a response line by its content.
    pub fn response(direction: LineDirection, text: &str) -> Self {
        let line_type = if text.trim().is_empty() {
            LineType::Empty
        } else if is_success(text) {
            LineType::Ok
        } else if is_error(text) {
            LineType::Error
        } else {
            LineType::Response
        };
        Self::new(direction, line_type, text)
    }
}

/// Whether a string is a Bluetooth address (`XX:XX:XX:XX:XX:XX`).
pub fn check_bluetooth_address(address: &str) -> bool {
    let parts: Vec<&str> = address.split(':').collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Hex string of `data`, upper case, optionally with a separator between bytes.
pub fn hex_string(data: &[u8], separator: Option<char>) -> String {
    let hex = hex::encode_upper(data);
    match separator {
        None => hex,
        Some(sep) => hex
            .as_bytes()
            .chunks(2)
            .map(|pair| String::from_utf8_lossy(pair).into_owned())
            .collect::<Vec<_>>()
            .join(&sep.to_string()),
    }
}

/// Decode a hex string. Colons, spaces and a leading `0x` are ignored.
pub fn hex_to_bytes(text: &str) -> Option<Vec<u8>> {
    let text = text.trim();
    let text = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    let cleaned: String = text.chars().filter(|c| *c != ':' && *c != ' ').collect();
    hex::decode(cleaned).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_remote_extended() {
        let parts = split_command("ATr+IO=10,1").unwrap();
        assert_eq!(parts.prefix, "ATr");
        assert!(parts.extended);
        assert_eq!(parts.identifier, "IO");
        assert_eq!(parts.arguments, Some("10,1"));
    }

    #[test]
    fn test_split_basic() {
        let parts = split_command("ATI").unwrap();
        assert_eq!(parts.prefix, "AT");
        assert!(!parts.extended);
        assert_eq!(parts.identifier, "I");
        assert_eq!(parts.arguments, None);

        let parts = split_command("AT").unwrap();
        assert_eq!(parts.identifier, "");
    }

    #[test]
    fn test_split_reset_io_config() {
        for text in ["ATR", "atr", "ATr"] {
            let parts = split_command(text).unwrap();
            assert_eq!(parts.prefix, "AT", "{text}");
            assert_eq!(parts.identifier, "R", "{text}");
        }
        let parts = split_command("ATrI").unwrap();
        assert_eq!(parts.prefix, "ATr");
        assert_eq!(parts.identifier, "I");

        let command = crate::command::Command::parse("atr", crate::command::Direction::Inbound);
        assert_eq!(command.kind(), crate::command::CommandKind::ResetIoConfig);
    }

    #[test]
    fn test_split_requires_prefix() {
        assert!(split_command("+IO=1").is_none());
        assert!(split_command("hello").is_none());
        assert!(has_prefix("at+binreq"));
        assert_eq!(split_command("at+binreq").unwrap().identifier, "BINREQ");
    }

    #[test]
    fn test_has_arguments() {
        assert!(has_arguments("AT+IO=10"));
        assert!(!has_arguments("AT+IO="));
        assert!(!has_arguments("AT+IO"));
        assert_eq!(count_arguments("1,2,3", ','), 3);
        assert_eq!(count_arguments("", ','), 0);
    }

    #[test]
    fn test_success_and_error_tokens() {
        assert!(is_success("OK"));
        assert!(is_success(" OK\r"));
        assert!(!is_success("OKAY"));
        assert!(is_error("ERROR"));
        assert!(is_error("ERROR: Invalid command"));
        assert!(!is_error("ERRORS"));
        assert_eq!(error_message("ERROR: Invalid command"), Some("Invalid command"));
        assert_eq!(error_message("ERROR"), None);
    }

    #[test]
    fn test_peer_error_forms() {
        assert!(is_peer_invalid_command("INVALID COMMAND"));
        assert!(is_error_code_message("5,Bad value"));
        let parsed = parse_error_code_message("5,Bad value").unwrap();
        assert_eq!(parsed.code, 5);
    }

    #[test]
    fn test_flow_bytes() {
        assert_eq!(decode_flow(&[0x01]), Some(true));
        assert_eq!(decode_flow(&[0x02]), Some(false));
        assert_eq!(decode_flow(&[0x07]), None);
        assert_eq!(encode_flow(true), 0x01);
        assert!(is_data_pending(&[0x01]));
    }

    #[test]
    fn test_decode_text_and_lines() {
        let text = decode_text(b"\r\nOK\r\n\0");
        assert_eq!(text, "\r\nOK\r\n");
        assert_eq!(split_lines(&text), vec!["".to_string(), "OK".to_string()]);
        assert_eq!(split_lines("a\nb"), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_line_classification() {
        assert_eq!(Line::response(LineDirection::Inbound, "OK").line_type, LineType::Ok);
        assert_eq!(Line::response(LineDirection::Inbound, "").line_type, LineType::Empty);
        assert_eq!(
            Line::response(LineDirection::Inbound, "ERROR: x").line_type,
            LineType::Error
        );
        assert_eq!(
            Line::response(LineDirection::Inbound, "42").line_type,
            LineType::Response
        );
    }

    #[test]
    fn test_bluetooth_address() {
        assert!(check_bluetooth_address("80:EA:CA:00:11:22"));
        assert!(!check_bluetooth_address("80:EA:CA:00:11"));
        assert!(!check_bluetooth_address("80:EA:CA:00:11:ZZ"));
    }

    #[test]
    fn test_hex_helpers() {
        assert_eq!(hex_string(&[0x02, 0x01, 0x06], Some(':')), "02:01:06");
        assert_eq!(hex_string(&[0xab], None), "AB");
        assert_eq!(hex_to_bytes("02:01:06"), Some(vec![2, 1, 6]));
        assert_eq!(hex_to_bytes("0x0a0B"), Some(vec![0x0a, 0x0b]));
        assert_eq!(hex_to_bytes("abc"), None);
    }
}
