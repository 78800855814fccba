// MIT License - Copyright (c) 2026 The codeless-dsps developers
// CodeLess / DSPS protocol engine

pub mod args;
pub mod kind;
pub mod response;
pub mod types;

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::constants::{
    EXTENDED_MARKER, INVALID_ARGUMENTS, INVALID_COMMAND, NO_ARGUMENTS, PREFIX_LOCAL,
    PREFIX_REMOTE, WRONG_NUMBER_OF_ARGUMENTS,
};
use crate::error::{CodelessError, ErrorCodeMessage, Result};
use crate::protocol::{self, split_command};
use crate::script::ScriptId;

pub use args::{ArgError, ArgType, Argument};
pub use kind::{CommandKind, CommandSpec};
pub use response::{ResponseShape, ResponseValue};
pub use types::{BinEscape, BondingEntry, Gpio};

/// Identifies a command for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub u64);

static NEXT_COMMAND_ID: AtomicU64 = AtomicU64::new(1);

impl CommandId {
    fn next() -> Self {
        CommandId(NEXT_COMMAND_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Whether a command was sent by us or received from the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Created,
    Pending,
    Complete,
}

/// One CodeLess exchange.
///
/// Created by [`Command::new`] (outbound, validated arguments) or by
/// [`Command::parse`] (text, possibly invalid). Completes exactly once.
#[derive(Debug, Clone)]
pub struct Command {
    id: CommandId,
    kind: CommandKind,
    direction: Direction,
    text: String,
    prefix: Option<String>,
    arguments: Vec<Argument>,
    response: Vec<String>,
    partial: Vec<String>,
    value: Option<ResponseValue>,
    status: CommandStatus,
    invalid: bool,
    peer_invalid: bool,
    error: Option<String>,
    error_code: Option<i32>,
    script: Option<ScriptId>,
}

impl Command {
    fn blank(kind: CommandKind, direction: Direction) -> Self {
        Self {
            id: CommandId::next(),
            kind,
            direction,
            text: String::new(),
            prefix: None,
            arguments: Vec::new(),
            response: Vec::new(),
            partial: Vec::new(),
            value: None,
            status: CommandStatus::Created,
            invalid: false,
            peer_invalid: false,
            error: None,
            error_code: None,
            script: None,
        }
    }

    /// Build an outbound command from validated arguments.
    pub fn new(kind: CommandKind, arguments: Vec<Argument>) -> Result<Self> {
        if kind == CommandKind::Custom {
            return Err(CodelessError::validation("custom commands are built from text"));
        }
        let spec = kind.spec();
        if !spec.accepts_count(arguments.len()) {
            return Err(CodelessError::validation(format!(
                "{}: {} ({})",
                kind,
                WRONG_NUMBER_OF_ARGUMENTS,
                arguments.len()
            )));
        }
        for (i, (arg, ty)) in arguments.iter().zip(spec.args).enumerate() {
            ty.validate(arg).map_err(|e| {
                CodelessError::validation(format!("{kind}: argument {} {e}", i + 1))
            })?;
        }
        let mut cmd = Self::blank(kind, Direction::Outbound);
        cmd.arguments = arguments;
        cmd.text = cmd.pack_command();
        Ok(cmd)
    }

    /// Build a command without arguments.
    pub fn simple(kind: CommandKind) -> Result<Self> {
        Self::new(kind, Vec::new())
    }

    /// Parse command text. Never fails: problems mark the command invalid.
    pub fn parse(text: &str, direction: Direction) -> Self {
        let text = text.trim();
        let Some(parts) = split_command(text) else {
            let mut cmd = Self::blank(CommandKind::Custom, direction);
            cmd.text = text.to_string();
            cmd.mark_invalid(INVALID_COMMAND);
            return cmd;
        };
        let kind = CommandKind::from_identifier(&parts.identifier).unwrap_or(CommandKind::Custom);
        let mut cmd = Self::blank(kind, direction);
        cmd.text = text.to_string();
        cmd.prefix = Some(parts.prefix.to_string());
        if kind == CommandKind::Custom {
            debug!("Unidentified command: {}", text);
            return cmd;
        }
        if let Err(msg) = cmd.parse_arguments(parts.arguments.unwrap_or("")) {
            cmd.mark_invalid(msg);
        }
        cmd
    }

    /// Check presence, count and grammar of the argument text.
    fn parse_arguments(&mut self, text: &str) -> std::result::Result<(), &'static str> {
        let spec = self.kind.spec();
        if text.is_empty() {
            if spec.requires_arguments() {
                return Err(NO_ARGUMENTS);
            }
            return Ok(());
        }
        let max = spec.max_arguments();
        let greedy = spec.args.last().is_some_and(ArgType::is_greedy);
        let pieces: Vec<&str> = if greedy && max > 0 {
            text.splitn(max, ',').collect()
        } else {
            text.split(',').collect()
        };
        if !spec.accepts_count(pieces.len()) {
            return Err(WRONG_NUMBER_OF_ARGUMENTS);
        }
        let mut arguments = Vec::with_capacity(pieces.len());
        for (piece, ty) in pieces.iter().zip(spec.args) {
            arguments.push(ty.parse(piece).map_err(|_| INVALID_ARGUMENTS)?);
        }
        self.arguments = arguments;
        Ok(())
    }

    fn mark_invalid(&mut self, message: &str) {
        self.invalid = true;
        self.error = Some(message.to_string());
    }

    /// Identifier plus arguments, without prefix.
    fn pack_body(&self) -> String {
        let spec = self.kind.spec();
        let mut out = String::new();
        if spec.extended {
            out.push(EXTENDED_MARKER);
        }
        out.push_str(spec.identifier);
        if !self.arguments.is_empty() {
            out.push('=');
            let packed: Vec<String> = self
                .arguments
                .iter()
                .zip(spec.args)
                .map(|(arg, ty)| ty.format(arg))
                .collect();
            out.push_str(&packed.join(","));
        }
        out
    }

    /// Full command text using the stored prefix (local prefix if none).
    pub fn pack_command(&self) -> String {
        let prefix = self.prefix.as_deref().unwrap_or(PREFIX_LOCAL);
        format!("{prefix}{}", self.pack_body())
    }

    /// Text to put on the wire for an outbound command.
    ///
    /// Custom commands go out verbatim. Mode commands always use the local
    /// prefix. Others keep an explicit prefix, or get the remote one when
    /// `auto_prefix` is set.
    pub fn wire_text(&self, auto_prefix: bool) -> String {
        if self.kind == CommandKind::Custom {
            return self.text.clone();
        }
        let prefix = if self.kind.is_mode_command() {
            PREFIX_LOCAL
        } else {
            match self.prefix.as_deref() {
                Some(p) => p,
                None if auto_prefix => PREFIX_REMOTE,
                None => PREFIX_LOCAL,
            }
        };
        format!("{prefix}{}", self.pack_body())
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_inbound(&self) -> bool {
        self.direction == Direction::Inbound
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn has_prefix(&self) -> bool {
        self.prefix.is_some()
    }

    /// Use the prefix of the given text for this command.
    pub fn set_prefix(&mut self, prefix: impl Into<String>) {
        self.prefix = Some(prefix.into());
    }

    /// Drop the prefix so the wire prefix follows the auto-prefix policy.
    pub(crate) fn clear_prefix(&mut self) {
        self.prefix = None;
    }

    pub fn arguments(&self) -> &[Argument] {
        &self.arguments
    }

    pub fn has_arguments(&self) -> bool {
        !self.arguments.is_empty()
    }

    pub fn int_argument(&self, index: usize) -> Option<i64> {
        self.arguments.get(index).and_then(Argument::as_int)
    }

    pub fn text_argument(&self, index: usize) -> Option<&str> {
        self.arguments.get(index).and_then(Argument::as_text)
    }

    pub fn response(&self) -> &[String] {
        &self.response
    }

    /// Lines decoded as they arrived, for kinds with partial parsing.
    pub fn partial_response(&self) -> &[String] {
        &self.partial
    }

    pub fn value(&self) -> Option<&ResponseValue> {
        self.value.as_ref()
    }

    pub fn status(&self) -> CommandStatus {
        self.status
    }

    pub fn is_complete(&self) -> bool {
        self.status == CommandStatus::Complete
    }

    pub fn is_valid(&self) -> bool {
        !self.invalid
    }

    pub fn is_peer_invalid(&self) -> bool {
        self.peer_invalid
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn error_code(&self) -> Option<i32> {
        self.error_code
    }

    pub fn script(&self) -> Option<ScriptId> {
        self.script
    }

    pub(crate) fn set_script(&mut self, script: ScriptId) {
        self.script = Some(script);
    }

    pub(crate) fn set_pending(&mut self) {
        self.status = CommandStatus::Pending;
    }

    /// Whether this kind decodes response lines as they arrive.
    pub fn parse_partial_response(&self) -> bool {
        self.kind.spec().partial
    }

    /// Accumulate one response line.
    pub(crate) fn add_response_line(&mut self, line: &str) {
        self.response.push(line.to_string());
        if self.parse_partial_response() {
            if let Some(item) = self.kind.spec().response.decode_line(line) {
                self.partial.push(item);
            }
        }
    }

    /// Complete successfully. Returns false if already complete.
    pub(crate) fn complete_success(&mut self) -> bool {
        if self.is_complete() {
            return false;
        }
        self.status = CommandStatus::Complete;
        self.value = self.kind.spec().response.decode(&self.response);
        true
    }

    /// Complete with an error. Returns false if already complete.
    pub(crate) fn complete_error(&mut self, message: &str) -> bool {
        if self.is_complete() {
            return false;
        }
        self.status = CommandStatus::Complete;
        if protocol::is_peer_invalid_command(message) {
            self.peer_invalid = true;
        }
        if let Some(ErrorCodeMessage { code, message }) = ErrorCodeMessage::parse(message) {
            self.error_code = Some(code);
            self.error = Some(message);
        } else {
            self.error = Some(message.to_string());
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_ranges() {
        assert!(Command::new(CommandKind::TimerStop, vec![Argument::Int(2)]).is_ok());
        assert!(Command::new(CommandKind::TimerStop, vec![Argument::Int(4)]).is_err());
        assert!(Command::new(CommandKind::TimerStop, vec![]).is_err());
        assert!(Command::new(CommandKind::Custom, vec![]).is_err());
    }

    #[test]
    fn test_pack_local_and_remote() {
        let cmd = Command::new(CommandKind::IoStatus, vec![10.into(), 1.into()]).unwrap();
        assert_eq!(cmd.text(), "AT+IO=10,1");
        assert_eq!(cmd.wire_text(true), "ATr+IO=10,1");
        assert_eq!(cmd.wire_text(false), "AT+IO=10,1");

        let info = Command::simple(CommandKind::DeviceInformation).unwrap();
        assert_eq!(info.wire_text(true), "ATrI");
    }

    #[test]
    fn test_mode_commands_use_local_prefix() {
        let cmd = Command::simple(CommandKind::BinRequest).unwrap();
        assert_eq!(cmd.wire_text(true), "AT+BINREQ");
    }

    #[test]
    fn test_custom_sent_verbatim() {
        let cmd = Command::parse("AT+FOO=1,2", Direction::Outbound);
        assert_eq!(cmd.kind(), CommandKind::Custom);
        assert!(cmd.is_valid());
        assert_eq!(cmd.wire_text(true), "AT+FOO=1,2");
    }

    #[test]
    fn test_parse_valid() {
        let cmd = Command::parse("AT+IOCFG=13,4,1", Direction::Inbound);
        assert_eq!(cmd.kind(), CommandKind::IoConfig);
        assert!(cmd.is_valid());
        assert_eq!(cmd.prefix(), Some("AT"));
        assert_eq!(cmd.int_argument(0), Some(13));
        assert_eq!(cmd.int_argument(2), Some(1));
    }

    #[test]
    fn test_parse_missing_arguments() {
        let cmd = Command::parse("AT+PRINT", Direction::Inbound);
        assert!(!cmd.is_valid());
        assert_eq!(cmd.error(), Some(NO_ARGUMENTS));
    }

    #[test]
    fn test_parse_wrong_count() {
        let cmd = Command::parse("AT+IOCFG=13", Direction::Inbound);
        assert!(!cmd.is_valid());
        assert_eq!(cmd.error(), Some(WRONG_NUMBER_OF_ARGUMENTS));
    }

    #[test]
    fn test_parse_bad_argument() {
        let cmd = Command::parse("AT+IOCFG=13,99", Direction::Inbound);
        assert!(!cmd.is_valid());
        assert_eq!(cmd.error(), Some(INVALID_ARGUMENTS));
    }

    #[test]
    fn test_parse_without_prefix() {
        let cmd = Command::parse("hello", Direction::Inbound);
        assert!(!cmd.is_valid());
        assert_eq!(cmd.kind(), CommandKind::Custom);
        assert_eq!(cmd.error(), Some(INVALID_COMMAND));
    }

    #[test]
    fn test_greedy_text_argument() {
        let cmd = Command::parse("AT+CMDSTORE=1,AT+IO=10,1;AT+ADC=11", Direction::Inbound);
        assert!(cmd.is_valid());
        assert_eq!(cmd.text_argument(1), Some("AT+IO=10,1;AT+ADC=11"));
    }

    #[test]
    fn test_complete_once() {
        let mut cmd = Command::simple(CommandKind::Battery).unwrap();
        cmd.add_response_line("87");
        assert!(cmd.complete_success());
        assert!(!cmd.complete_success());
        assert!(!cmd.complete_error("late"));
        assert_eq!(cmd.value(), Some(&ResponseValue::Int(87)));
        assert!(!cmd.failed());
    }

    #[test]
    fn test_complete_error_code() {
        let mut cmd = Command::simple(CommandKind::Battery).unwrap();
        assert!(cmd.complete_error("7,Busy"));
        assert_eq!(cmd.error_code(), Some(7));
        assert_eq!(cmd.error(), Some("Busy"));

        let mut cmd = Command::simple(CommandKind::Battery).unwrap();
        cmd.complete_error("INVALID COMMAND");
        assert!(cmd.is_peer_invalid());
    }

    #[test]
    fn test_partial_response() {
        let mut cmd = Command::simple(CommandKind::GapScan).unwrap();
        assert!(cmd.parse_partial_response());
        cmd.add_response_line("( ) 80:EA:CA:00:00:01,P, Type: ADV, RSSI:-60");
        cmd.add_response_line("");
        assert_eq!(cmd.partial_response().len(), 1);
    }

    #[test]
    fn test_round_trip_every_kind() {
        for kind in CommandKind::all() {
            let spec = kind.spec();
            let count = spec.max_arguments();
            let args: Vec<Argument> = spec.args[..count]
                .iter()
                .map(|ty| sample_argument(*ty))
                .collect();
            let outbound = Command::new(kind, args.clone())
                .unwrap_or_else(|e| panic!("{kind}: {e}"));
            let inbound = Command::parse(&outbound.wire_text(true), Direction::Inbound);
            assert_eq!(inbound.kind(), kind, "{}", outbound.wire_text(true));
            assert!(inbound.is_valid(), "{}: {:?}", outbound.wire_text(true), inbound.error());
            assert_eq!(inbound.arguments(), &args[..], "{kind}");
        }
    }

    fn sample_argument(ty: ArgType) -> Argument {
        match ty {
            ArgType::Int { min, max } | ArgType::HexInt { min, max } => {
                Argument::Int(min + (max - min) / 2)
            }
            ArgType::BondIndex => Argument::Int(0xff),
            ArgType::HexString { min_chars, .. } => Argument::Text("AB".repeat(min_chars / 2)),
            ArgType::HexBytes { .. } => Argument::Text("02:01:06".to_string()),
            ArgType::Address => Argument::Text("80:EA:CA:00:11:22".to_string()),
            ArgType::AddressType => Argument::Text("R".to_string()),
            ArgType::Choice(values) => Argument::Text(values[0].to_string()),
            ArgType::Text { max, .. } => Argument::Text("x,y".chars().cycle().take(max.min(5)).collect()),
        }
    }
}
