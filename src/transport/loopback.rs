// MIT License - Copyright (c) 2026 The codeless-dsps developers
// CodeLess / DSPS protocol engine

//! In-process peer for tests and the command line tool.
//!
//! [`LoopbackPeer`] behaves like a CodeLess / DSPS device on the far side of
//! the link. Requests are answered synchronously by queueing the matching
//! [`TransportEvent`]s, which the owner feeds back with
//! [`drive`] or its own `poll_event` loop.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, trace};

use crate::command::{Command, CommandKind, Direction};
use crate::constants::{ERROR_PREFIX, MTU_DEFAULT, OK, PEER_INVALID_COMMAND};
use crate::error::{CodelessError, Result};
use crate::manager::Manager;
use crate::protocol;
use crate::transport::{Characteristic, Transport, TransportEvent};

/// Simulated CodeLess / DSPS device.
#[derive(Debug)]
pub struct LoopbackPeer {
    codeless: bool,
    dsps: bool,
    mtu: u16,
    connected: bool,
    events: VecDeque<TransportEvent>,
    outbound: VecDeque<String>,
    commands: Vec<String>,
    text_writes: Vec<String>,
    responses: HashMap<String, Vec<String>>,
    failing: HashSet<String>,
    received: Vec<u8>,
    /// Whether the host accepts our data.
    host_flow: bool,
    held: VecDeque<Vec<u8>>,
    binary: bool,
    fail_writes: bool,
    info: String,
}

impl Default for LoopbackPeer {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackPeer {
    pub fn new() -> Self {
        Self {
            codeless: true,
            dsps: true,
            mtu: MTU_DEFAULT,
            connected: false,
            events: VecDeque::new(),
            outbound: VecDeque::new(),
            commands: Vec::new(),
            text_writes: Vec::new(),
            responses: HashMap::new(),
            failing: HashSet::new(),
            received: Vec::new(),
            host_flow: true,
            held: VecDeque::new(),
            binary: false,
            fail_writes: false,
            info: "DA14585 loopback".to_string(),
        }
    }

    pub fn with_services(mut self, codeless: bool, dsps: bool) -> Self {
        self.codeless = codeless;
        self.dsps = dsps;
        self
    }

    /// MTU reported after connecting.
    pub fn with_mtu(mut self, mtu: u16) -> Self {
        self.mtu = mtu;
        self
    }

    /// Lines returned before `OK` for a command identifier, e.g. `BATT`.
    pub fn respond_with<I, S>(mut self, identifier: &str, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.responses.insert(
            identifier.to_ascii_uppercase(),
            lines.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Answer every command with this identifier with an error.
    pub fn fail_on(&mut self, identifier: &str) {
        self.failing.insert(identifier.to_ascii_uppercase());
    }

    /// Report every following write as failed.
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn poll_event(&mut self) -> Option<TransportEvent> {
        self.events.pop_front()
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether the peer considers binary mode active.
    pub fn is_binary(&self) -> bool {
        self.binary
    }

    /// Command lines received from the host, in order.
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Every text write from the host, decoded.
    pub fn text_writes(&self) -> &[String] {
        &self.text_writes
    }

    /// DSPS data received from the host.
    pub fn received_data(&self) -> &[u8] {
        &self.received
    }

    pub fn clear_received(&mut self) {
        self.received.clear();
    }

    /// Send a line of text (a command or a response) to the host.
    pub fn send_text(&mut self, text: &str) {
        debug!("Peer -> host: {}", text);
        self.outbound.push_back(format!("{text}\r\n"));
        self.events.push_back(TransportEvent::Notification {
            characteristic: Characteristic::CodelessFlowControl,
            data: vec![crate::constants::CODELESS_DATA_PENDING],
        });
    }

    /// Send DSPS data. Held back while the host has flow off.
    pub fn send_data(&mut self, data: &[u8]) {
        if self.host_flow {
            self.events.push_back(TransportEvent::Notification {
                characteristic: Characteristic::DspsServerTx,
                data: data.to_vec(),
            });
        } else {
            self.held.push_back(data.to_vec());
        }
    }

    /// Tell the host whether we accept data.
    pub fn set_flow(&mut self, on: bool) {
        self.events.push_back(TransportEvent::Notification {
            characteristic: Characteristic::DspsFlowControl,
            data: vec![protocol::encode_flow(on)],
        });
    }

    /// Drop the link from the peer side.
    pub fn drop_link(&mut self, reason: &str) {
        self.connected = false;
        self.events.push_back(TransportEvent::Disconnected {
            reason: Some(reason.to_string()),
        });
    }

    fn require_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(CodelessError::transport("loopback peer not connected"))
        }
    }

    fn on_host_text(&mut self, data: &[u8]) {
        let text = protocol::decode_text(data);
        self.text_writes.push(text.clone());
        for line in protocol::split_lines(&text) {
            let line = line.trim();
            if !protocol::has_prefix(line) {
                trace!("Peer ignores {:?}", line);
                continue;
            }
            self.commands.push(line.to_string());
            self.execute(line);
        }
    }

    fn execute(&mut self, line: &str) {
        let command = Command::parse(line, Direction::Inbound);
        let identifier = command.kind().identifier().to_string();
        if !command.is_valid() || command.kind() == CommandKind::Custom {
            self.send_text(&format!("{ERROR_PREFIX}{PEER_INVALID_COMMAND}"));
            return;
        }
        if self.failing.contains(&identifier) {
            self.send_text(&format!("{ERROR_PREFIX}5,Failed"));
            return;
        }
        match command.kind() {
            CommandKind::DeviceInformation => {
                let info = self.info.clone();
                self.send_text(&info);
            }
            CommandKind::BinRequest => {
                self.binary = true;
                self.send_text(OK);
                self.send_text("AT+BINREQACK");
                return;
            }
            CommandKind::BinRequestAck => self.binary = true,
            CommandKind::BinExit => {
                self.binary = false;
                self.send_text(OK);
                self.send_text("AT+BINREQEXITACK");
                return;
            }
            CommandKind::BinExitAck => self.binary = false,
            _ => {
                if let Some(lines) = self.responses.get(&identifier).cloned() {
                    for line in lines {
                        self.send_text(&line);
                    }
                }
            }
        }
        self.send_text(OK);
    }

    fn on_host_flow(&mut self, data: &[u8]) {
        if let Some(on) = protocol::decode_flow(data) {
            self.host_flow = on;
            if on {
                while let Some(data) = self.held.pop_front() {
                    self.send_data(&data);
                }
            }
        }
    }
}

impl Transport for LoopbackPeer {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        self.events.push_back(TransportEvent::Connected);
        if self.mtu != MTU_DEFAULT {
            self.events.push_back(TransportEvent::MtuChanged { mtu: self.mtu });
        }
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        if self.connected {
            self.connected = false;
            self.outbound.clear();
            self.events.push_back(TransportEvent::Disconnected { reason: None });
        }
        Ok(())
    }

    fn discover_services(&mut self) -> Result<()> {
        self.require_connected()?;
        self.events.push_back(TransportEvent::ServicesDiscovered {
            codeless: self.codeless,
            dsps: self.dsps,
        });
        Ok(())
    }

    fn write(&mut self, characteristic: Characteristic, data: &[u8]) -> Result<()> {
        self.require_connected()?;
        if self.fail_writes {
            self.events.push_back(TransportEvent::WriteComplete {
                characteristic,
                success: false,
            });
            return Ok(());
        }
        self.events.push_back(TransportEvent::WriteComplete {
            characteristic,
            success: true,
        });
        match characteristic {
            Characteristic::CodelessInbound => self.on_host_text(data),
            Characteristic::DspsServerRx => self.received.extend_from_slice(data),
            Characteristic::DspsFlowControl => self.on_host_flow(data),
            other => debug!("Peer ignores write to {}", other),
        }
        Ok(())
    }

    fn read(&mut self, characteristic: Characteristic) -> Result<()> {
        self.require_connected()?;
        let result = match (characteristic, self.outbound.pop_front()) {
            (Characteristic::CodelessOutbound, Some(text)) => Ok(text.into_bytes()),
            (Characteristic::CodelessOutbound, None) => Err("nothing to read".to_string()),
            _ => Err(format!("{characteristic} is not readable")),
        };
        self.events.push_back(TransportEvent::ReadComplete {
            characteristic,
            result,
        });
        Ok(())
    }

    fn set_notify(&mut self, characteristic: Characteristic, _enable: bool) -> Result<()> {
        self.require_connected()?;
        self.events.push_back(TransportEvent::NotifyEnableComplete {
            characteristic,
            success: true,
        });
        Ok(())
    }
}

/// Feed queued peer events to the manager until both sides are idle.
/// Returns the number of events delivered.
pub fn drive(manager: &mut Manager<LoopbackPeer>) -> usize {
    let mut count = 0;
    while let Some(event) = manager.transport_mut().poll_event() {
        manager.handle(event);
        count += 1;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(peer: &mut LoopbackPeer) -> Vec<TransportEvent> {
        std::iter::from_fn(|| peer.poll_event()).collect()
    }

    #[test]
    fn test_connect_sequence() {
        let mut peer = LoopbackPeer::new().with_mtu(247);
        assert!(peer.discover_services().is_err());
        peer.connect().unwrap();
        peer.discover_services().unwrap();
        assert_eq!(
            drain(&mut peer),
            vec![
                TransportEvent::Connected,
                TransportEvent::MtuChanged { mtu: 247 },
                TransportEvent::ServicesDiscovered {
                    codeless: true,
                    dsps: true
                },
            ]
        );
    }

    #[test]
    fn test_answers_commands() {
        let mut peer = LoopbackPeer::new().respond_with("batt", ["87"]);
        peer.connect().unwrap();
        drain(&mut peer);
        peer.write(Characteristic::CodelessInbound, b"ATr+BATT\0").unwrap();
        let events = drain(&mut peer);
        assert_eq!(events.len(), 3);
        for expected in ["87\r\n", "OK\r\n"] {
            peer.read(Characteristic::CodelessOutbound).unwrap();
            assert_eq!(
                peer.poll_event(),
                Some(TransportEvent::ReadComplete {
                    characteristic: Characteristic::CodelessOutbound,
                    result: Ok(expected.as_bytes().to_vec()),
                })
            );
        }
        assert_eq!(peer.commands(), ["ATr+BATT"]);
    }

    #[test]
    fn test_invalid_and_failing_commands() {
        let mut peer = LoopbackPeer::new();
        peer.fail_on("IO");
        peer.connect().unwrap();
        peer.write(Characteristic::CodelessInbound, b"AT+NOPE\r\nAT+IO=10\r\n").unwrap();
        peer.write(Characteristic::CodelessInbound, b"\r\nOK\r\n").unwrap();
        let mut lines = Vec::new();
        while peer.read(Characteristic::CodelessOutbound).is_ok() {
            match peer.events.pop_back() {
                Some(TransportEvent::ReadComplete { result: Ok(data), .. }) => {
                    lines.push(String::from_utf8(data).unwrap())
                }
                _ => break,
            }
        }
        assert_eq!(lines, vec!["ERROR: INVALID COMMAND\r\n", "ERROR: 5,Failed\r\n"]);
        assert_eq!(peer.commands().len(), 2);
    }

    #[test]
    fn test_data_held_while_host_flow_off() {
        let mut peer = LoopbackPeer::new();
        peer.connect().unwrap();
        drain(&mut peer);
        peer.write(Characteristic::DspsFlowControl, &[2]).unwrap();
        peer.send_data(b"abc");
        assert_eq!(drain(&mut peer).len(), 1);
        peer.write(Characteristic::DspsFlowControl, &[1]).unwrap();
        let events = drain(&mut peer);
        assert_eq!(
            events.last(),
            Some(&TransportEvent::Notification {
                characteristic: Characteristic::DspsServerTx,
                data: b"abc".to_vec(),
            })
        );
    }
}
