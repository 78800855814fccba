// MIT License - Copyright (c) 2026 The codeless-dsps developers
// CodeLess / DSPS protocol engine

use bitflags::bitflags;

use crate::command::Command;
use crate::error::CodelessError;
use crate::protocol::Line;
use crate::script::ScriptId;
use crate::transfer::OperationId;

bitflags! {
    /// Services found on the peer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ServiceSupport: u8 {
        const CODELESS = 0x01;
        const DSPS     = 0x02;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    ServiceDiscovery,
    Ready,
}

/// Whether the CodeLess channel currently carries commands or the link is
/// dedicated to DSPS data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    Command,
    Binary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowDirection {
    /// Data from the peer to us. Controlled by us.
    Rx,
    /// Data from us to the peer. Controlled by the peer.
    Tx,
}

/// All events emitted by the manager.
///
/// Users subscribe via `manager.subscribe()` to receive a
/// `tokio::sync::broadcast::Receiver<CodelessEvent>`.
#[derive(Debug, Clone)]
pub enum CodelessEvent {
    ConnectionStateChanged {
        state: ConnectionState,
    },
    /// Notifications enabled, traffic may start.
    Ready {
        support: ServiceSupport,
    },
    ModeChanged {
        mode: OperationMode,
    },
    /// The peer asked for binary mode; accept with `accept_binary_mode_request`.
    BinaryModeRequest,
    CommandSuccess {
        command: Command,
    },
    CommandError {
        command: Command,
        message: String,
    },
    /// Inbound command that needs an answer from the caller, or an invalid
    /// one surfaced for information.
    InboundCommand {
        command: Command,
    },
    Line {
        line: Line,
    },
    DspsRxData {
        data: Vec<u8>,
    },
    DspsFlowChanged {
        direction: FlowDirection,
        on: bool,
    },
    DspsFileChunkSent {
        operation: OperationId,
        index: usize,
        total: usize,
    },
    DspsFileComplete {
        operation: OperationId,
    },
    DspsFileError {
        operation: Option<OperationId>,
        message: String,
    },
    DspsRxFileData {
        operation: OperationId,
        name: String,
        size: usize,
        received: usize,
    },
    DspsRxFileCrc {
        operation: OperationId,
        name: String,
        ok: bool,
        expected: u32,
        computed: u32,
    },
    DspsPatternChunkSent {
        operation: OperationId,
        counter: u64,
    },
    DspsPeriodicChunkSent {
        operation: OperationId,
        count: u64,
    },
    DspsPatternFileError {
        message: String,
    },
    /// Throughput sample. `operation` is `None` for the DSPS receive counter.
    DspsStats {
        operation: Option<OperationId>,
        bytes: u64,
        current_speed: u64,
        average_speed: u64,
    },
    TransferAborted {
        operation: OperationId,
        reason: String,
    },
    ScriptStart {
        script: ScriptId,
    },
    ScriptCommand {
        script: ScriptId,
        index: usize,
        command: Command,
    },
    ScriptEnd {
        script: ScriptId,
        error: Option<String>,
    },
    Error {
        error: CodelessError,
    },
}

/// Type alias for the broadcast sender.
pub type EventSender = tokio::sync::broadcast::Sender<CodelessEvent>;

/// Type alias for the broadcast receiver.
pub type EventReceiver = tokio::sync::broadcast::Receiver<CodelessEvent>;

/// Create a new event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    tokio::sync::broadcast::channel(capacity)
}
