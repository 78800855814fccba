// MIT License - Copyright (c) 2026 The codeless-dsps developers
// CodeLess / DSPS protocol engine

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::command::{Command, CommandId, CommandKind, Direction};
use crate::config::CodelessConfig;
use crate::constants::{
    COMMAND_NOT_ALLOWED_IN_BINARY_MODE, COMMAND_NOT_SUPPORTED, DISCONNECTED, ERROR, ERROR_PREFIX,
    GATT_OPERATION_ERROR, INVALID_COMMAND, OK,
};
use crate::dsps::{payload_chunks, ChunkTag, DspsChunk, DspsState};
use crate::error::{CodelessError, Result};
use crate::event::{
    event_channel, CodelessEvent, ConnectionState, EventReceiver, EventSender, FlowDirection,
    OperationMode, ServiceSupport,
};
use crate::protocol::{self, Line, LineDirection, LineType};
use crate::queue::{GattOperation, GattQueue, Priority, QueuedOperation};
use crate::script::{Script, ScriptId, ScriptState};
use crate::sink::SinkProvider;
use crate::transfer::{
    ChunkProgress, FileReceive, FileSend, OperationId, PeriodicSend, ReceiveUpdate, Transfer,
    TransferState, TransferStats,
};
use crate::transport::{Characteristic, Transport, TransportEvent};

const EVENT_CHANNEL_CAPACITY: usize = 4096;

/// Who is waiting for a queued transport operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Setup,
    Command { id: CommandId, kind: CommandKind },
    Response,
    Dsps(ChunkTag),
    Flow,
    InboundRead,
}

#[derive(Debug)]
enum Completion {
    Write(bool),
    Read(std::result::Result<Vec<u8>, String>),
    Notify(bool),
    /// The request could not be issued.
    Failed,
}

impl Completion {
    fn success(&self) -> bool {
        match self {
            Completion::Write(ok) | Completion::Notify(ok) => *ok,
            Completion::Read(result) => result.is_ok(),
            Completion::Failed => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModeTransition {
    /// We sent a binary request and wait for the peer's ack.
    EnterRequested,
    /// The peer asked and the caller has to accept.
    PeerRequested,
    ExitRequested,
}

fn into_chunk(entry: QueuedOperation<Origin>) -> Option<DspsChunk> {
    match (entry.operation, entry.origin) {
        (GattOperation::Write { data, .. }, Origin::Dsps(tag)) => Some(DspsChunk {
            data,
            tag,
            priority: entry.priority,
        }),
        _ => None,
    }
}

/// The CodeLess / DSPS protocol engine for one peer.
///
/// Single threaded and cooperative: nothing blocks, every transition happens
/// in [`handle`](Manager::handle) (transport completions) or
/// [`tick`](Manager::tick) (timers), and every step is reported on the event
/// channel.
///
/// # Example
///
/// ```
/// use codeless_dsps::{CodelessConfig, CodelessEvent, Manager};
/// use codeless_dsps::transport::loopback::LoopbackPeer;
///
/// let mut manager = Manager::new(LoopbackPeer::new(), CodelessConfig::default());
/// let mut events = manager.subscribe();
/// manager.connect().unwrap();
/// while let Some(event) = manager.transport_mut().poll_event() {
///     manager.handle(event);
/// }
/// assert!(manager.is_ready());
///
/// manager.send_text_command("ATI").unwrap();
/// while let Some(event) = manager.transport_mut().poll_event() {
///     manager.handle(event);
/// }
/// while let Ok(event) = events.try_recv() {
///     if let CodelessEvent::CommandSuccess { command } = event {
///         println!("{} -> {:?}", command.text(), command.response());
///     }
/// }
/// ```
pub struct Manager<T: Transport> {
    transport: T,
    config: CodelessConfig,
    event_tx: EventSender,
    state: ConnectionState,
    support: ServiceSupport,
    setup_pending: usize,
    mode: OperationMode,
    mode_transition: Option<ModeTransition>,
    queue: GattQueue<Origin>,
    /// Outbound command waiting for its response.
    command: Option<Command>,
    /// Mode acknowledgments waiting for the command slot.
    deferred: VecDeque<Command>,
    /// Inbound command being answered.
    inbound: Option<Command>,
    inbound_response: Vec<String>,
    inbound_lines: usize,
    inbound_backlog: VecDeque<String>,
    dsps: DspsState,
    transfers: BTreeMap<OperationId, Transfer>,
    receive: Option<FileReceive>,
    script: Option<Script>,
    script_sent: bool,
    rx_stats: TransferStats,
}

impl<T: Transport> Manager<T> {
    pub fn new(transport: T, config: CodelessConfig) -> Self {
        let (event_tx, _) = event_channel(EVENT_CHANNEL_CAPACITY);
        let dsps = DspsState::new(&config);
        Self {
            transport,
            config,
            event_tx,
            state: ConnectionState::Disconnected,
            support: ServiceSupport::empty(),
            setup_pending: 0,
            mode: OperationMode::Command,
            mode_transition: None,
            queue: GattQueue::new(),
            command: None,
            deferred: VecDeque::new(),
            inbound: None,
            inbound_response: Vec::new(),
            inbound_lines: 0,
            inbound_backlog: VecDeque::new(),
            dsps,
            transfers: BTreeMap::new(),
            receive: None,
            script: None,
            script_sent: false,
            rx_stats: TransferStats::new(),
        }
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> EventReceiver {
        self.event_tx.subscribe()
    }

    pub fn config(&self) -> &CodelessConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    pub fn support(&self) -> ServiceSupport {
        self.support
    }

    pub fn mode(&self) -> OperationMode {
        self.mode
    }

    pub fn is_binary_mode(&self) -> bool {
        self.mode == OperationMode::Binary
    }

    /// Outbound command waiting for a response.
    pub fn pending_command(&self) -> Option<&Command> {
        self.command.as_ref()
    }

    /// Inbound command waiting for an answer.
    pub fn inbound_command(&self) -> Option<&Command> {
        self.inbound.as_ref()
    }

    /// Transport operations waiting behind the one in flight.
    pub fn queued_operations(&self) -> usize {
        self.queue.len()
    }

    pub fn is_transport_busy(&self) -> bool {
        self.queue.is_busy()
    }

    fn emit(&self, event: CodelessEvent) {
        let _ = self.event_tx.send(event);
    }

    fn emit_error(&self, error: CodelessError) {
        error!("{}", error);
        self.emit(CodelessEvent::Error { error });
    }

    fn emit_line(&self, line: Line) {
        if self.config.line_events {
            self.emit(CodelessEvent::Line { line });
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!("Connection state {:?} -> {:?}", self.state, state);
            self.state = state;
            self.emit(CodelessEvent::ConnectionStateChanged { state });
        }
    }

    fn require_ready(&self) -> Result<()> {
        if self.state == ConnectionState::Ready {
            Ok(())
        } else {
            Err(CodelessError::NotReady {
                state: format!("{:?}", self.state),
            })
        }
    }

    fn require_service(&self, service: ServiceSupport, name: &str) -> Result<()> {
        self.require_ready()?;
        if self.support.contains(service) {
            Ok(())
        } else {
            Err(CodelessError::protocol(format!("{name} service not available")))
        }
    }

    fn require_codeless(&self) -> Result<()> {
        self.require_service(ServiceSupport::CODELESS, "CodeLess")
    }

    fn require_dsps(&self) -> Result<()> {
        self.require_service(ServiceSupport::DSPS, "DSPS")
    }

    // ---------------------------------------------------------------------
    // Connection
    // ---------------------------------------------------------------------

    /// Start connecting. Only valid while disconnected.
    pub fn connect(&mut self) -> Result<()> {
        if self.state != ConnectionState::Disconnected {
            return Err(CodelessError::protocol(format!(
                "cannot connect in state {:?}",
                self.state
            )));
        }
        info!("Connecting");
        self.set_state(ConnectionState::Connecting);
        if let Err(e) = self.transport.connect() {
            self.set_state(ConnectionState::Disconnected);
            return Err(e);
        }
        Ok(())
    }

    /// Drop the connection. Pending work fails immediately.
    pub fn disconnect(&mut self) -> Result<()> {
        if self.state == ConnectionState::Disconnected {
            return Ok(());
        }
        info!("Disconnecting");
        let result = self.transport.disconnect();
        self.reset(DISCONNECTED);
        result
    }

    fn fail_connection(&mut self, message: &str) {
        self.emit_error(CodelessError::transport(message));
        if let Err(e) = self.transport.disconnect() {
            warn!("Error disconnecting transport: {e}");
        }
        self.reset(message);
    }

    /// Fail everything in progress and return to Disconnected.
    fn reset(&mut self, reason: &str) {
        info!("Connection reset: {}", reason);
        self.queue.clear();
        self.deferred.clear();
        if let Some(command) = self.command.take() {
            self.finish_command(command, Err(reason.to_string()));
        }
        self.inbound = None;
        self.inbound_response.clear();
        self.inbound_lines = 0;
        self.inbound_backlog.clear();

        let now = Instant::now();
        for (id, mut transfer) in std::mem::take(&mut self.transfers) {
            transfer.abort(now);
            self.emit(CodelessEvent::TransferAborted {
                operation: id,
                reason: reason.to_string(),
            });
        }
        if let Some(mut receive) = self.receive.take() {
            if receive.state() == TransferState::Started {
                receive.abort(now);
                self.emit(CodelessEvent::TransferAborted {
                    operation: receive.id(),
                    reason: reason.to_string(),
                });
            }
        }
        if self.script.is_some() {
            self.end_script(Some(reason.to_string()));
        }

        self.dsps.reset(&self.config);
        self.rx_stats = TransferStats::new();
        self.mode = OperationMode::Command;
        self.mode_transition = None;
        self.support = ServiceSupport::empty();
        self.setup_pending = 0;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Feed a transport completion or notification.
    pub fn handle(&mut self, event: TransportEvent) {
        debug!("Transport event: {:?}", event);
        match event {
            TransportEvent::Connected => self.on_connected(),
            TransportEvent::Disconnected { reason } => {
                if self.state != ConnectionState::Disconnected {
                    let reason = reason.unwrap_or_else(|| DISCONNECTED.to_string());
                    self.reset(&reason);
                }
            }
            TransportEvent::ServicesDiscovered { codeless, dsps } => self.on_services(codeless, dsps),
            TransportEvent::WriteComplete {
                characteristic,
                success,
            } => self.on_completion(characteristic, Completion::Write(success)),
            TransportEvent::ReadComplete {
                characteristic,
                result,
            } => self.on_completion(characteristic, Completion::Read(result)),
            TransportEvent::NotifyEnableComplete {
                characteristic,
                success,
            } => self.on_completion(characteristic, Completion::Notify(success)),
            TransportEvent::Notification {
                characteristic,
                data,
            } => self.on_notification(characteristic, data),
            TransportEvent::MtuChanged { mtu } => self.on_mtu(mtu),
        }
        self.pump();
    }

    fn on_connected(&mut self) {
        if self.state != ConnectionState::Connecting {
            warn!("Connected event in state {:?}", self.state);
            return;
        }
        self.set_state(ConnectionState::Connected);
        if let Err(e) = self.transport.discover_services() {
            self.fail_connection(&format!("service discovery failed: {e}"));
        }
    }

    fn on_services(&mut self, codeless: bool, dsps: bool) {
        if self.state != ConnectionState::Connected {
            warn!("Services discovered in state {:?}", self.state);
            return;
        }
        self.support.set(ServiceSupport::CODELESS, codeless);
        self.support.set(ServiceSupport::DSPS, dsps);
        info!("Services: codeless={} dsps={}", codeless, dsps);
        self.set_state(ConnectionState::ServiceDiscovery);
        if !codeless && !dsps {
            self.fail_connection("no CodeLess or DSPS service");
            return;
        }
        let mut notify = Vec::new();
        if codeless {
            notify.push(Characteristic::CodelessFlowControl);
        }
        if dsps {
            notify.push(Characteristic::DspsServerTx);
            notify.push(Characteristic::DspsFlowControl);
        }
        self.setup_pending = notify.len();
        for characteristic in notify {
            self.queue.enqueue(
                GattOperation::EnableNotify { characteristic },
                Origin::Setup,
                Priority::High,
            );
        }
    }

    fn on_setup_complete(&mut self, characteristic: Characteristic, ok: bool) {
        if self.state != ConnectionState::ServiceDiscovery {
            return;
        }
        if !ok {
            self.fail_connection(&format!("failed to enable notifications on {characteristic}"));
            return;
        }
        self.setup_pending = self.setup_pending.saturating_sub(1);
        if self.setup_pending == 0 {
            self.on_ready();
        }
    }

    fn on_ready(&mut self) {
        self.mode = if self.support.contains(ServiceSupport::CODELESS) && self.config.start_in_command_mode {
            OperationMode::Command
        } else {
            OperationMode::Binary
        };
        self.set_state(ConnectionState::Ready);
        self.rx_stats.start(Instant::now());
        info!("Ready ({:?}, {:?} mode)", self.support, self.mode);
        self.emit(CodelessEvent::Ready {
            support: self.support,
        });
        if self.support.contains(ServiceSupport::DSPS) && self.config.set_flow_control_on_connection {
            self.write_rx_flow(self.dsps.rx_flow_on());
        }
    }

    fn on_mtu(&mut self, mtu: u16) {
        let wanted = if self.config.dsps_chunk_size_increase_to_mtu {
            usize::MAX
        } else {
            self.config.default_dsps_chunk_size
        };
        self.dsps.set_mtu(mtu, Some(wanted));
        info!("MTU {}, DSPS chunk size {}", mtu, self.dsps.chunk_size());
    }

    // ---------------------------------------------------------------------
    // Queue
    // ---------------------------------------------------------------------

    /// Issue the next queued operation if the transport is idle.
    fn pump(&mut self) {
        loop {
            let Some(entry) = self.queue.issue_next() else {
                return;
            };
            let operation = entry.operation.clone();
            let result = match &operation {
                GattOperation::Write {
                    characteristic,
                    data,
                } => self.transport.write(*characteristic, data),
                GattOperation::Read { characteristic } => self.transport.read(*characteristic),
                GattOperation::EnableNotify { characteristic } => {
                    self.transport.set_notify(*characteristic, true)
                }
            };
            match result {
                Ok(()) => return,
                Err(e) => {
                    warn!("Failed to issue {:?}: {}", operation, e);
                    if let Some(entry) = self.queue.complete() {
                        self.process_completion(entry, Completion::Failed);
                    }
                }
            }
        }
    }

    fn on_completion(&mut self, characteristic: Characteristic, completion: Completion) {
        match self.queue.in_flight() {
            Some(entry) if entry.operation.characteristic() == characteristic => {}
            _ => {
                warn!("Unexpected completion on {}", characteristic);
                return;
            }
        }
        let Some(entry) = self.queue.complete() else {
            return;
        };
        if self.config.gatt_dequeue_before_processing {
            self.pump();
        }
        self.process_completion(entry, completion);
    }

    fn process_completion(&mut self, entry: QueuedOperation<Origin>, completion: Completion) {
        let ok = completion.success();
        let characteristic = entry.operation.characteristic();
        match entry.origin {
            Origin::Setup => self.on_setup_complete(characteristic, ok),
            Origin::Command { id, kind } => self.on_command_written(id, kind, ok),
            Origin::Response => {
                if !ok {
                    self.emit_error(CodelessError::transport("failed to write response"));
                }
            }
            Origin::Dsps(tag) => self.on_chunk_written(tag, ok),
            Origin::Flow => {
                if !ok {
                    self.emit_error(CodelessError::transport("failed to write flow control"));
                }
            }
            Origin::InboundRead => match completion {
                Completion::Read(Ok(data)) => self.on_inbound_text(&data),
                Completion::Read(Err(message)) => {
                    self.emit_error(CodelessError::transport(format!("read failed: {message}")))
                }
                _ => self.emit_error(CodelessError::transport("read failed")),
            },
        }
    }

    fn write_text(&mut self, text: String, origin: Origin) {
        let mut data = text.into_bytes();
        if self.config.trailing_zero {
            data.push(0);
        }
        self.queue.enqueue(
            GattOperation::Write {
                characteristic: Characteristic::CodelessInbound,
                data,
            },
            origin,
            Priority::High,
        );
    }

    // ---------------------------------------------------------------------
    // Outbound commands
    // ---------------------------------------------------------------------

    /// Parse text the way [`send_text_command`](Manager::send_text_command) would.
    pub fn parse_text_command(&self, text: &str) -> Command {
        Command::parse(text, Direction::Outbound)
    }

    /// Send a typed command. Fails if another command is pending.
    pub fn send_command(&mut self, command: Command) -> Result<CommandId> {
        self.require_codeless()?;
        if self.command.is_some() {
            return Err(CodelessError::overflow("command"));
        }
        self.check_outbound_command(&command)?;
        let id = self.dispatch_command(command);
        self.pump();
        Ok(id)
    }

    /// Send command text. Without an `AT` prefix the text is matched against
    /// the known commands and sent with the remote prefix.
    pub fn send_text_command(&mut self, text: &str) -> Result<CommandId> {
        let text = text.trim();
        let command = if protocol::has_prefix(text) {
            Command::parse(text, Direction::Outbound)
        } else {
            let known = if self.config.auto_add_prefix {
                [format!("AT+{text}"), format!("AT{text}")]
                    .iter()
                    .map(|t| Command::parse(t, Direction::Outbound))
                    .find(|c| c.kind() != CommandKind::Custom)
            } else {
                None
            };
            match known {
                Some(mut command) => {
                    command.clear_prefix();
                    command
                }
                None if self.config.disallow_invalid_prefix => {
                    return Err(CodelessError::parse(format!("missing AT prefix: {text}")));
                }
                None => Command::parse(text, Direction::Outbound),
            }
        };
        self.send_command(command)
    }

    /// Run a list of commands as an anonymous script.
    pub fn send_commands(&mut self, commands: Vec<Command>) -> Result<ScriptId> {
        self.start_script(Script::from_commands("commands", commands))
    }

    fn check_outbound_command(&self, command: &Command) -> Result<()> {
        if command.is_complete() {
            return Err(CodelessError::validation("command already complete"));
        }
        if self.mode == OperationMode::Binary
            && !command.kind().is_mode_command()
            && !self.config.allow_outbound_command_in_binary_mode
        {
            return Err(CodelessError::protocol(COMMAND_NOT_ALLOWED_IN_BINARY_MODE));
        }
        if !command.is_valid() && self.config.disallow_invalid_command {
            return Err(CodelessError::validation(format!(
                "{}: {}",
                command.text(),
                command.error().unwrap_or(INVALID_COMMAND)
            )));
        }
        Ok(())
    }

    /// Put a command in the slot and queue its text. The slot must be free.
    fn dispatch_command(&mut self, mut command: Command) -> CommandId {
        let text = command.wire_text(self.config.auto_add_prefix);
        let mut wire = text.clone();
        if self.config.end_of_line_after_command {
            wire.push_str(&self.config.end_of_line);
        }
        match command.kind() {
            CommandKind::BinRequest => self.mode_transition = Some(ModeTransition::EnterRequested),
            CommandKind::BinExit => self.mode_transition = Some(ModeTransition::ExitRequested),
            _ => {}
        }
        debug!("Sending command: {}", text);
        self.emit_line(Line::new(LineDirection::Outbound, LineType::Command, text));
        command.set_pending();
        let id = command.id();
        self.write_text(
            wire,
            Origin::Command {
                id,
                kind: command.kind(),
            },
        );
        self.command = Some(command);
        id
    }

    fn on_command_written(&mut self, id: CommandId, kind: CommandKind, ok: bool) {
        if ok {
            match kind {
                CommandKind::BinRequestAck => self.commit_mode(OperationMode::Binary),
                CommandKind::BinExitAck => self.commit_mode(OperationMode::Command),
                _ => {}
            }
            return;
        }
        if self.command.as_ref().is_some_and(|c| c.id() == id) {
            if let Some(command) = self.command.take() {
                self.finish_command(command, Err(GATT_OPERATION_ERROR.to_string()));
            }
            self.service_command_slot();
        }
    }

    /// Complete an outbound command exactly once and report it.
    fn finish_command(&mut self, mut command: Command, result: std::result::Result<(), String>) {
        let completed = match &result {
            Ok(()) => command.complete_success(),
            Err(message) => command.complete_error(message),
        };
        if !completed {
            return;
        }
        match command.error() {
            Some(message) => {
                debug!("Command {} failed: {}", command.text(), message);
                if matches!(command.kind(), CommandKind::BinRequest | CommandKind::BinExit) {
                    self.mode_transition = None;
                }
                self.emit(CodelessEvent::CommandError {
                    command: command.clone(),
                    message: message.to_string(),
                });
            }
            None => {
                debug!("Command {} complete", command.text());
                self.emit(CodelessEvent::CommandSuccess {
                    command: command.clone(),
                });
            }
        }
        let running = self.script.as_ref().map(Script::id);
        if command.script().is_some() && command.script() == running {
            self.script_command_done(command);
        }
    }

    /// Fill a free command slot: mode acks first, then the running script.
    fn service_command_slot(&mut self) {
        if self.command.is_some() || self.state != ConnectionState::Ready {
            return;
        }
        if let Some(command) = self.deferred.pop_front() {
            self.dispatch_command(command);
            return;
        }
        self.send_script_command();
    }

    fn queue_mode_ack(&mut self, kind: CommandKind) {
        match Command::simple(kind) {
            Ok(command) => {
                self.deferred.push_back(command);
                self.service_command_slot();
            }
            Err(e) => self.emit_error(e),
        }
    }

    fn commit_mode(&mut self, mode: OperationMode) {
        self.mode_transition = None;
        if self.mode != mode {
            info!("Operation mode {:?}", mode);
            self.mode = mode;
            self.emit(CodelessEvent::ModeChanged { mode });
        }
    }

    /// Switch to binary mode, negotiated or forced per configuration.
    pub fn enter_binary_mode(&mut self) -> Result<CommandId> {
        self.require_codeless()?;
        if self.mode == OperationMode::Binary {
            return Err(CodelessError::protocol("already in binary mode"));
        }
        let kind = if self.config.mode_change_send_binary_request {
            CommandKind::BinRequest
        } else {
            CommandKind::BinRequestAck
        };
        self.send_command(Command::simple(kind)?)
    }

    /// Ask the peer to return to command mode.
    pub fn exit_binary_mode(&mut self) -> Result<CommandId> {
        self.require_codeless()?;
        if self.mode == OperationMode::Command {
            return Err(CodelessError::protocol("not in binary mode"));
        }
        self.send_command(Command::simple(CommandKind::BinExit)?)
    }

    /// Accept a binary request previously surfaced as `BinaryModeRequest`.
    pub fn accept_binary_mode_request(&mut self) -> Result<()> {
        if self.mode_transition != Some(ModeTransition::PeerRequested) {
            return Err(CodelessError::protocol("no binary mode request to accept"));
        }
        self.queue_mode_ack(CommandKind::BinRequestAck);
        self.pump();
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Inbound text
    // ---------------------------------------------------------------------

    fn on_inbound_text(&mut self, data: &[u8]) {
        let text = protocol::decode_text(data);
        for line in protocol::split_lines(&text) {
            self.on_line(line);
        }
    }

    fn on_line(&mut self, line: String) {
        let mode_command = protocol::split_command(&line)
            .and_then(|parts| CommandKind::from_identifier(&parts.identifier))
            .is_some_and(CommandKind::is_mode_command);
        if self.command.is_some() && !mode_command {
            self.on_response_line(line);
            return;
        }
        if line.trim().is_empty() {
            return;
        }
        if protocol::is_success(&line) || protocol::is_error(&line) {
            warn!("Unexpected response: {}", line);
            self.emit_line(Line::response(LineDirection::Inbound, &line));
            return;
        }
        self.emit_line(Line::new(LineDirection::Inbound, LineType::Command, line.as_str()));
        if self.inbound.is_some() {
            debug!("Inbound command busy, holding {}", line);
            self.inbound_backlog.push_back(line);
            return;
        }
        self.process_inbound(line);
        self.process_inbound_backlog();
    }

    fn on_response_line(&mut self, line: String) {
        self.emit_line(Line::response(LineDirection::Inbound, &line));
        if protocol::is_success(&line) {
            if let Some(command) = self.command.take() {
                self.finish_command(command, Ok(()));
            }
            self.service_command_slot();
        } else if protocol::is_error(&line) {
            if let Some(command) = self.command.take() {
                let message = protocol::error_message(&line)
                    .filter(|m| !m.is_empty())
                    .map(str::to_string)
                    .or_else(|| command.response().last().cloned())
                    .unwrap_or_else(|| ERROR.to_string());
                self.finish_command(command, Err(message));
            }
            self.service_command_slot();
        } else if !line.trim().is_empty() {
            if let Some(command) = self.command.as_mut() {
                command.add_response_line(&line);
            }
        }
    }

    fn process_inbound_backlog(&mut self) {
        while self.inbound.is_none() {
            let Some(line) = self.inbound_backlog.pop_front() else {
                break;
            };
            self.process_inbound(line);
        }
    }

    fn process_inbound(&mut self, text: String) {
        let command = Command::parse(&text, Direction::Inbound);
        debug!("Inbound command: {} ({:?})", text, command.kind());
        self.inbound = Some(command.clone());
        self.inbound_lines = 0;
        self.inbound_response.clear();

        if !command.is_valid() {
            let message = command.error().unwrap_or(INVALID_COMMAND).to_string();
            if !self.config.disallow_invalid_parsed_command {
                self.emit(CodelessEvent::InboundCommand { command });
            }
            self.finish_inbound(Err(message));
            return;
        }
        let kind = command.kind();
        if self.mode == OperationMode::Binary
            && !kind.is_mode_command()
            && !self.config.allow_inbound_command_in_binary_mode
        {
            self.finish_inbound(Err(COMMAND_NOT_ALLOWED_IN_BINARY_MODE.to_string()));
            return;
        }
        if kind == CommandKind::Custom {
            if self.config.host_invalid_commands {
                self.emit(CodelessEvent::InboundCommand { command });
            } else {
                self.finish_inbound(Err(INVALID_COMMAND.to_string()));
            }
            return;
        }
        if self.config.is_host_command(kind) {
            self.emit(CodelessEvent::InboundCommand { command });
            return;
        }
        if self.config.is_supported(kind) {
            self.run_inbound_hook(kind);
            return;
        }
        if self.config.host_unsupported_commands {
            self.emit(CodelessEvent::InboundCommand { command });
        } else {
            self.finish_inbound(Err(COMMAND_NOT_SUPPORTED.to_string()));
        }
    }

    /// Answer a supported inbound command.
    fn run_inbound_hook(&mut self, kind: CommandKind) {
        match kind {
            CommandKind::DeviceInformation => {
                let info = self.config.device_information.clone();
                self.add_inbound_response(info);
                self.finish_inbound(Ok(()));
            }
            CommandKind::GapStatus => {
                self.add_inbound_response("1,1".to_string());
                self.finish_inbound(Ok(()));
            }
            CommandKind::BinRequest => {
                self.finish_inbound(Ok(()));
                if self.mode == OperationMode::Binary {
                    return;
                }
                if self.config.host_binary_request {
                    self.mode_transition = Some(ModeTransition::PeerRequested);
                    self.emit(CodelessEvent::BinaryModeRequest);
                } else {
                    self.queue_mode_ack(CommandKind::BinRequestAck);
                }
            }
            CommandKind::BinRequestAck => {
                self.commit_mode(OperationMode::Binary);
                self.finish_inbound(Ok(()));
            }
            CommandKind::BinExit => {
                self.finish_inbound(Ok(()));
                self.queue_mode_ack(CommandKind::BinExitAck);
            }
            CommandKind::BinExitAck => {
                self.commit_mode(OperationMode::Command);
                self.finish_inbound(Ok(()));
            }
            _ => self.finish_inbound(Ok(())),
        }
    }

    fn add_inbound_response(&mut self, line: String) {
        self.inbound_lines += 1;
        if self.config.single_write_response {
            self.inbound_response.push(line);
        } else {
            self.write_response_lines(&[line]);
        }
    }

    fn write_response_lines(&mut self, lines: &[String]) {
        let mut text = String::new();
        for line in lines {
            text.push_str(line);
            if self.config.append_end_of_line {
                text.push_str(&self.config.end_of_line);
            }
            self.emit_line(Line::response(LineDirection::Outbound, line));
        }
        self.write_text(text, Origin::Response);
    }

    /// Write the final status of the inbound command and free its slot.
    fn finish_inbound(&mut self, result: std::result::Result<(), String>) {
        let Some(mut command) = self.inbound.take() else {
            return;
        };
        let (status, empty_first) = match &result {
            Ok(()) => (OK.to_string(), self.config.empty_line_before_ok),
            Err(message) if message.is_empty() => (ERROR.to_string(), self.config.empty_line_before_error),
            Err(message) => (format!("{ERROR_PREFIX}{message}"), self.config.empty_line_before_error),
        };
        let mut lines = std::mem::take(&mut self.inbound_response);
        if self.inbound_lines == 0 && empty_first {
            lines.push(String::new());
        }
        lines.push(status);
        if self.config.single_write_response {
            self.write_response_lines(&lines);
        } else {
            for line in lines {
                self.write_response_lines(&[line]);
            }
        }
        self.inbound_lines = 0;
        match result {
            Ok(()) => command.complete_success(),
            Err(message) => command.complete_error(&message),
        };
        debug!("Answered inbound {}", command.text());
    }

    fn require_inbound(&self) -> Result<()> {
        if self.inbound.is_some() {
            Ok(())
        } else {
            Err(CodelessError::protocol("no inbound command to answer"))
        }
    }

    /// Add a response line to the inbound command being answered.
    pub fn send_response(&mut self, line: &str) -> Result<()> {
        self.require_inbound()?;
        self.add_inbound_response(line.to_string());
        self.pump();
        Ok(())
    }

    /// Answer the inbound command with success, optionally with a last response line.
    pub fn send_success(&mut self, line: Option<&str>) -> Result<()> {
        self.require_inbound()?;
        if let Some(line) = line {
            self.add_inbound_response(line.to_string());
        }
        self.finish_inbound(Ok(()));
        self.process_inbound_backlog();
        self.pump();
        Ok(())
    }

    /// Answer the inbound command with an error.
    pub fn send_error(&mut self, message: &str) -> Result<()> {
        self.require_inbound()?;
        self.finish_inbound(Err(message.to_string()));
        self.process_inbound_backlog();
        self.pump();
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Notifications and DSPS
    // ---------------------------------------------------------------------

    fn on_notification(&mut self, characteristic: Characteristic, data: Vec<u8>) {
        if self.state != ConnectionState::Ready {
            debug!("Notification on {} before ready", characteristic);
            return;
        }
        match characteristic {
            Characteristic::CodelessFlowControl => {
                if protocol::is_data_pending(&data) {
                    self.queue.enqueue(
                        GattOperation::Read {
                            characteristic: Characteristic::CodelessOutbound,
                        },
                        Origin::InboundRead,
                        Priority::High,
                    );
                }
            }
            Characteristic::DspsFlowControl => match protocol::decode_flow(&data) {
                Some(on) => self.apply_tx_flow(on),
                None => warn!("Unknown DSPS flow value {:?}", data),
            },
            Characteristic::DspsServerTx => self.on_dsps_data(data),
            other => warn!("Unexpected notification on {}", other),
        }
    }

    fn on_dsps_data(&mut self, data: Vec<u8>) {
        if self.support.contains(ServiceSupport::CODELESS)
            && self.mode == OperationMode::Command
            && !self.config.allow_inbound_binary_in_command_mode
        {
            warn!("Dropping {} bytes of binary data in command mode", data.len());
            return;
        }
        let now = Instant::now();
        self.dsps.record_rx(data.len());
        self.rx_stats.record(data.len() as u64);
        self.emit(CodelessEvent::DspsRxData { data: data.clone() });

        if let Some(receive) = self.receive.as_mut() {
            let id = receive.id();
            match receive.on_data(&data, now) {
                Ok(updates) => {
                    let name = receive.name().unwrap_or_default().to_string();
                    for update in updates {
                        self.emit_receive_update(id, &name, update);
                    }
                }
                Err(e) => {
                    receive.abort(now);
                    self.receive = None;
                    self.emit(CodelessEvent::DspsFileError {
                        operation: Some(id),
                        message: e.to_string(),
                    });
                }
            }
        }

        if self.config.dsps_echo {
            let chunks = payload_chunks(&data, self.dsps.chunk_size(), None, 0, Priority::High);
            if let Err(e) = self.submit_chunks(chunks) {
                self.emit_error(e);
            }
        }
    }

    fn emit_receive_update(&self, operation: OperationId, name: &str, update: ReceiveUpdate) {
        match update {
            ReceiveUpdate::Header(header) => {
                debug!("File header {:?}", header);
            }
            ReceiveUpdate::Data { received, size } => self.emit(CodelessEvent::DspsRxFileData {
                operation,
                name: name.to_string(),
                size,
                received,
            }),
            ReceiveUpdate::Crc {
                ok,
                expected,
                computed,
            } => self.emit(CodelessEvent::DspsRxFileCrc {
                operation,
                name: name.to_string(),
                ok,
                expected,
                computed,
            }),
            ReceiveUpdate::Complete => info!("File receive {} complete", operation),
        }
    }

    fn binary_send_allowed(&self) -> Result<()> {
        if self.support.contains(ServiceSupport::CODELESS)
            && self.mode == OperationMode::Command
            && !self.config.allow_outbound_binary_in_command_mode
        {
            return Err(CodelessError::protocol("binary data not allowed in command mode"));
        }
        Ok(())
    }

    fn enqueue_chunk(&mut self, chunk: DspsChunk) {
        self.queue.enqueue(
            GattOperation::Write {
                characteristic: Characteristic::DspsServerRx,
                data: chunk.data,
            },
            Origin::Dsps(chunk.tag),
            chunk.priority,
        );
    }

    /// Queue chunks, or buffer them while TX flow is off.
    fn submit_chunks(&mut self, chunks: Vec<DspsChunk>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        if self.dsps.tx_flow_on() {
            for chunk in chunks {
                self.enqueue_chunk(chunk);
            }
            Ok(())
        } else {
            self.dsps.push_pending(chunks)
        }
    }

    fn apply_tx_flow(&mut self, on: bool) {
        debug!("DSPS TX flow {}", if on { "on" } else { "off" });
        self.dsps.set_tx_flow(on);
        if on {
            for chunk in self.dsps.take_pending() {
                self.enqueue_chunk(chunk);
            }
        } else {
            let pulled: Vec<DspsChunk> = self
                .queue
                .extract(|e| matches!(e.origin, Origin::Dsps(_)))
                .into_iter()
                .filter_map(into_chunk)
                .collect();
            if !pulled.is_empty() {
                debug!("Moved {} queued chunks back to pending", pulled.len());
            }
            self.dsps.requeue_front(pulled);
        }
        self.emit(CodelessEvent::DspsFlowChanged {
            direction: FlowDirection::Tx,
            on,
        });
    }

    fn write_rx_flow(&mut self, on: bool) {
        self.queue.enqueue(
            GattOperation::Write {
                characteristic: Characteristic::DspsFlowControl,
                data: vec![protocol::encode_flow(on)],
            },
            Origin::Flow,
            Priority::High,
        );
    }

    /// Send binary data as interactive (high priority) chunks.
    pub fn dsps_send(&mut self, data: &[u8]) -> Result<()> {
        self.require_dsps()?;
        self.binary_send_allowed()?;
        let chunks = payload_chunks(data, self.dsps.chunk_size(), None, 0, Priority::High);
        self.submit_chunks(chunks)?;
        self.pump();
        Ok(())
    }

    pub fn chunk_size(&self) -> usize {
        self.dsps.chunk_size()
    }

    /// Set the DSPS chunk size, bounded by MTU - 3.
    pub fn set_chunk_size(&mut self, size: usize) -> Result<()> {
        self.dsps.set_chunk_size(size)
    }

    pub fn mtu(&self) -> u16 {
        self.dsps.mtu()
    }

    pub fn rx_flow(&self) -> bool {
        self.dsps.rx_flow_on()
    }

    pub fn tx_flow(&self) -> bool {
        self.dsps.tx_flow_on()
    }

    /// Chunks buffered while TX flow is off.
    pub fn pending_dsps_chunks(&self) -> usize {
        self.dsps.pending_len()
    }

    pub fn dsps_rx_bytes(&self) -> u64 {
        self.dsps.rx_bytes()
    }

    /// Tell the peer whether we accept data.
    pub fn set_rx_flow(&mut self, on: bool) -> Result<()> {
        self.require_dsps()?;
        self.dsps.set_rx_flow(on);
        self.write_rx_flow(on);
        self.emit(CodelessEvent::DspsFlowChanged {
            direction: FlowDirection::Rx,
            on,
        });
        self.pump();
        Ok(())
    }

    /// Override the TX flow state locally, as if the peer had notified it.
    pub fn set_tx_flow(&mut self, on: bool) {
        self.apply_tx_flow(on);
        self.pump();
    }

    // ---------------------------------------------------------------------
    // Transfers
    // ---------------------------------------------------------------------

    /// Load a file for sending. Failures are also reported as `DspsFileError`.
    pub fn load_file_send(
        &self,
        path: impl AsRef<Path>,
        chunk_size: Option<usize>,
        period: Duration,
    ) -> Result<FileSend> {
        let chunk_size = chunk_size.unwrap_or(self.dsps.chunk_size());
        FileSend::open(path, chunk_size, period).map_err(|e| {
            self.emit(CodelessEvent::DspsFileError {
                operation: None,
                message: e.to_string(),
            });
            e
        })
    }

    /// Load a pattern prefix file. Failures are also reported as `DspsPatternFileError`.
    pub fn load_pattern_send(
        &self,
        path: impl AsRef<Path>,
        chunk_size: Option<usize>,
        period: Duration,
    ) -> Result<PeriodicSend> {
        let chunk_size = chunk_size.unwrap_or(self.dsps.chunk_size());
        PeriodicSend::pattern_from_file(
            path,
            self.config.dsps_pattern_digits,
            &self.config.dsps_pattern_suffix,
            chunk_size,
            period,
        )
        .map_err(|e| {
            self.emit(CodelessEvent::DspsPatternFileError {
                message: e.to_string(),
            });
            e
        })
    }

    /// Register and start (or resume) a transfer.
    pub fn start_transfer(&mut self, transfer: impl Into<Transfer>) -> Result<OperationId> {
        let mut transfer = transfer.into();
        let id = transfer.id();
        self.require_dsps()?;
        self.binary_send_allowed()?;
        match transfer.state() {
            TransferState::Created | TransferState::Stopped => {}
            state => {
                return Err(CodelessError::validation(format!(
                    "transfer {id} cannot start in state {state:?}"
                )))
            }
        }
        if self.transfers.contains_key(&id) {
            return Err(CodelessError::overflow(format!("transfer {id}")));
        }
        if transfer.chunk_size() > self.dsps.max_chunk_size() {
            return Err(CodelessError::validation(format!(
                "chunk size {} exceeds {}",
                transfer.chunk_size(),
                self.dsps.max_chunk_size()
            )));
        }
        let priority = if self.config.gatt_queue_priority {
            Priority::Low
        } else {
            Priority::High
        };
        let now = Instant::now();
        let release_now = match &mut transfer {
            Transfer::FileSend(op) => {
                op.set_priority(priority);
                // Empty file, or stopped with its last chunk already on the way.
                if op.is_exhausted() {
                    op.finish(now);
                    self.emit_final_stats(id, op.stats(), now);
                    self.emit(CodelessEvent::DspsFileComplete { operation: id });
                    return Ok(id);
                }
                op.period().is_zero()
            }
            Transfer::Periodic(op) => {
                op.set_priority(priority);
                false
            }
        };
        transfer.start(now);
        self.transfers.insert(id, transfer);
        if release_now {
            self.release_due(id, now);
        }
        self.pump();
        Ok(id)
    }

    /// Unregister a transfer, pulling its unsent chunks. The returned
    /// operation can be passed to `start_transfer` to resume.
    pub fn stop_transfer(&mut self, id: OperationId) -> Result<Transfer> {
        let mut transfer = self
            .transfers
            .remove(&id)
            .ok_or_else(|| CodelessError::validation(format!("unknown transfer {id}")))?;
        let first_unsent = self.purge_chunks(id);
        transfer.stop(first_unsent, Instant::now());
        Ok(transfer)
    }

    pub fn transfer(&self, id: OperationId) -> Option<&Transfer> {
        self.transfers.get(&id)
    }

    pub fn active_transfers(&self) -> Vec<OperationId> {
        self.transfers.keys().copied().collect()
    }

    /// Remove queued and buffered chunks of an operation. Returns the
    /// earliest removed index.
    fn purge_chunks(&mut self, id: OperationId) -> Option<u64> {
        let queued = self
            .queue
            .extract(|e| matches!(e.origin, Origin::Dsps(tag) if tag.operation == Some(id)));
        let pending = self.dsps.purge(id);
        let first_queued = queued.first().and_then(|e| match e.origin {
            Origin::Dsps(tag) => Some(tag.index),
            _ => None,
        });
        first_queued.or_else(|| pending.first().map(|c| c.tag.index))
    }

    fn abort_transfer(&mut self, id: OperationId, reason: &str) {
        if let Some(mut transfer) = self.transfers.remove(&id) {
            self.purge_chunks(id);
            transfer.abort(Instant::now());
            warn!("Transfer {} aborted: {}", id, reason);
            self.emit(CodelessEvent::TransferAborted {
                operation: id,
                reason: reason.to_string(),
            });
        }
    }

    fn release_due(&mut self, id: OperationId, now: Instant) {
        let tx_on = self.dsps.tx_flow_on();
        let chunks = match self.transfers.get_mut(&id) {
            Some(transfer) => transfer.take_due(now, tx_on),
            None => return,
        };
        if let Err(e) = self.submit_chunks(chunks) {
            self.abort_transfer(id, &e.to_string());
        }
    }

    fn on_chunk_written(&mut self, tag: ChunkTag, ok: bool) {
        let Some(id) = tag.operation else {
            if !ok {
                self.emit_error(CodelessError::transport("DSPS write failed"));
            }
            return;
        };
        if !ok {
            self.abort_transfer(id, GATT_OPERATION_ERROR);
            return;
        }
        let now = Instant::now();
        let progress = match self.transfers.get_mut(&id) {
            Some(transfer) => transfer.on_chunk_written(&tag, now),
            None => return,
        };
        match progress {
            ChunkProgress::FileChunk {
                index,
                total,
                complete,
            } => {
                self.emit(CodelessEvent::DspsFileChunkSent {
                    operation: id,
                    index,
                    total,
                });
                if complete {
                    if let Some(transfer) = self.transfers.remove(&id) {
                        self.emit_final_stats(id, transfer.stats(), now);
                    }
                    self.emit(CodelessEvent::DspsFileComplete { operation: id });
                }
            }
            ChunkProgress::Pattern { counter } => {
                self.emit(CodelessEvent::DspsPatternChunkSent {
                    operation: id,
                    counter,
                })
            }
            ChunkProgress::Periodic { count } => self.emit(CodelessEvent::DspsPeriodicChunkSent {
                operation: id,
                count,
            }),
            ChunkProgress::Partial => {}
        }
    }

    fn emit_final_stats(&self, id: OperationId, stats: &TransferStats, now: Instant) {
        if self.config.dsps_stats {
            let average = stats.average_speed(now);
            self.emit(CodelessEvent::DspsStats {
                operation: Some(id),
                bytes: stats.bytes(),
                current_speed: average,
                average_speed: average,
            });
        }
    }

    /// Start receiving a file announced by an in-band header.
    pub fn start_file_receive(&mut self, provider: impl SinkProvider + 'static) -> Result<OperationId> {
        self.require_dsps()?;
        if self
            .receive
            .as_ref()
            .is_some_and(|r| r.state() == TransferState::Started)
        {
            return Err(CodelessError::overflow("file receive"));
        }
        let mut receive = FileReceive::new(provider);
        receive.start(Instant::now());
        let id = receive.id();
        info!("File receive {} started", id);
        self.receive = Some(receive);
        Ok(id)
    }

    pub fn stop_file_receive(&mut self) -> Option<FileReceive> {
        let mut receive = self.receive.take()?;
        receive.stop(Instant::now());
        Some(receive)
    }

    pub fn file_receive(&self) -> Option<&FileReceive> {
        self.receive.as_ref()
    }

    // ---------------------------------------------------------------------
    // Scripts
    // ---------------------------------------------------------------------

    /// Run a script. Only one script runs at a time.
    pub fn start_script(&mut self, mut script: Script) -> Result<ScriptId> {
        self.require_codeless()?;
        if self.script.is_some() {
            return Err(CodelessError::overflow("script"));
        }
        if script.state() != ScriptState::Created {
            return Err(CodelessError::validation("script already used"));
        }
        if script.is_empty() {
            return Err(CodelessError::validation("script is empty"));
        }
        if script.is_invalid() && self.config.disallow_invalid_command {
            return Err(CodelessError::validation(format!(
                "script {} contains invalid commands",
                script.name()
            )));
        }
        script.set_running();
        let id = script.id();
        info!("Script {} ({}) started", script.name(), id);
        self.script = Some(script);
        self.script_sent = false;
        self.emit(CodelessEvent::ScriptStart { script: id });
        self.service_command_slot();
        self.pump();
        Ok(id)
    }

    /// Halt the running script. A command already sent still completes.
    pub fn stop_script(&mut self) -> Option<Script> {
        let mut script = self.script.take()?;
        script.stop();
        self.script_sent = false;
        info!("Script {} stopped", script.id());
        self.emit(CodelessEvent::ScriptEnd {
            script: script.id(),
            error: Some("stopped".to_string()),
        });
        Some(script)
    }

    pub fn script(&self) -> Option<&Script> {
        self.script.as_ref()
    }

    fn send_script_command(&mut self) {
        loop {
            if self.command.is_some() || self.script_sent {
                return;
            }
            let Some(script) = self.script.as_ref() else {
                return;
            };
            if script.state() != ScriptState::Running {
                return;
            }
            let script_id = script.id();
            let Some(mut command) = script.current().cloned() else {
                self.end_script(None);
                return;
            };
            command.set_script(script_id);
            match self.check_outbound_command(&command) {
                Ok(()) => {
                    self.script_sent = true;
                    self.dispatch_command(command);
                    return;
                }
                Err(e) => {
                    command.complete_error(&e.to_string());
                    self.emit(CodelessEvent::CommandError {
                        command: command.clone(),
                        message: e.to_string(),
                    });
                    if !self.script_command_done(command) {
                        return;
                    }
                }
            }
        }
    }

    /// Record a finished script command. Returns true if the script goes on.
    fn script_command_done(&mut self, command: Command) -> bool {
        self.script_sent = false;
        let Some(script) = self.script.as_ref() else {
            return false;
        };
        let script_id = script.id();
        let index = script.index();
        let stop = command.failed() && script.stop_on_error();
        let error = command.error().map(str::to_string);
        self.emit(CodelessEvent::ScriptCommand {
            script: script_id,
            index,
            command: command.clone(),
        });
        let Some(script) = self.script.as_mut() else {
            return false;
        };
        if stop {
            script.record(command);
            self.end_script(error);
            return false;
        }
        if script.advance(command) {
            true
        } else {
            self.end_script(None);
            false
        }
    }

    fn end_script(&mut self, error: Option<String>) {
        self.script_sent = false;
        if let Some(mut script) = self.script.take() {
            script.stop();
            match &error {
                Some(e) => warn!("Script {} ended with error: {}", script.id(), e),
                None => info!("Script {} complete", script.id()),
            }
            self.emit(CodelessEvent::ScriptEnd {
                script: script.id(),
                error,
            });
        }
    }

    // ---------------------------------------------------------------------
    // Timers
    // ---------------------------------------------------------------------

    /// Drive periodic transfers and statistics.
    pub fn tick(&mut self, now: Instant) {
        if self.state != ConnectionState::Ready {
            return;
        }
        let ids: Vec<OperationId> = self.transfers.keys().copied().collect();
        for id in ids {
            self.release_due(id, now);
        }
        if self.config.dsps_stats {
            self.emit_stats(now);
        }
        self.pump();
    }

    fn emit_stats(&mut self, now: Instant) {
        let interval = self.config.dsps_stats_interval;
        let mut samples = Vec::new();
        for (id, transfer) in self.transfers.iter_mut() {
            if let Some(sample) = transfer.stats_mut().sample(now, interval) {
                samples.push((Some(*id), sample));
            }
        }
        if let Some(receive) = self.receive.as_mut() {
            if let Some(sample) = receive.stats_mut().sample(now, interval) {
                samples.push((Some(receive.id()), sample));
            }
        }
        if self.support.contains(ServiceSupport::DSPS) {
            if let Some(sample) = self.rx_stats.sample(now, interval) {
                samples.push((None, sample));
            }
        }
        for (operation, sample) in samples {
            self.emit(CodelessEvent::DspsStats {
                operation,
                bytes: sample.bytes,
                current_speed: sample.current_speed,
                average_speed: sample.average_speed,
            });
        }
    }
}
