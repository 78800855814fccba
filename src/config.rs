// MIT License - Copyright (c) 2026 The codeless-dsps developers
// CodeLess / DSPS protocol engine

use std::collections::HashSet;
use std::time::Duration;

use crate::command::CommandKind;

/// Policy and tuning for a [`Manager`](crate::manager::Manager).
///
/// Every flag the engine consults lives here. The config is immutable once
/// handed to the manager.
#[derive(Debug, Clone)]
pub struct CodelessConfig {
    /// Transfer operations enqueue their writes on the low priority band.
    pub gatt_queue_priority: bool,
    /// Issue the next queued operation before handling the completed one.
    pub gatt_dequeue_before_processing: bool,
    /// Line terminator on the text channel.
    pub end_of_line: String,
    /// Terminate every response line written to the peer.
    pub append_end_of_line: bool,
    /// Terminate outbound command text.
    pub end_of_line_after_command: bool,
    /// Write an empty line before `OK` when no response text was produced.
    pub empty_line_before_ok: bool,
    /// Write an empty line before `ERROR` when no response text was produced.
    pub empty_line_before_error: bool,
    /// Append a 0x00 byte to every text write.
    pub trailing_zero: bool,
    /// Coalesce response lines and the final status into one write.
    pub single_write_response: bool,
    /// Answer invalid inbound commands at the boundary, without an event.
    pub disallow_invalid_parsed_command: bool,
    /// Refuse to send commands that failed to parse.
    pub disallow_invalid_command: bool,
    /// Refuse to send text without the `AT` prefix (unless auto-prefix applies).
    pub disallow_invalid_prefix: bool,
    /// Add the remote prefix to commands constructed or typed without one.
    pub auto_add_prefix: bool,
    /// Emit a line event for every text line sent or received.
    pub line_events: bool,
    /// Start in command mode when the CodeLess service is present.
    pub start_in_command_mode: bool,
    /// A peer binary request must be accepted by the caller.
    pub host_binary_request: bool,
    /// Entering binary mode sends a request first instead of a direct ack.
    pub mode_change_send_binary_request: bool,
    pub allow_inbound_binary_in_command_mode: bool,
    pub allow_outbound_binary_in_command_mode: bool,
    pub allow_inbound_command_in_binary_mode: bool,
    pub allow_outbound_command_in_binary_mode: bool,
    /// Initial DSPS chunk size. Must not exceed MTU - 3.
    pub default_dsps_chunk_size: usize,
    /// Raise the chunk size to MTU - 3 after an MTU exchange.
    pub dsps_chunk_size_increase_to_mtu: bool,
    /// Maximum number of chunks held while TX flow is off.
    pub dsps_pending_max_size: usize,
    pub default_dsps_rx_flow_control: bool,
    pub default_dsps_tx_flow_control: bool,
    /// Write the RX flow state once the connection is ready.
    pub set_flow_control_on_connection: bool,
    /// Counter width of pattern packets.
    pub dsps_pattern_digits: u32,
    /// Bytes appended after the pattern counter.
    pub dsps_pattern_suffix: Vec<u8>,
    /// Send all received binary data back to the peer.
    pub dsps_echo: bool,
    pub dsps_stats: bool,
    pub dsps_stats_interval: Duration,
    /// Forward known but unsupported inbound commands to the caller.
    pub host_unsupported_commands: bool,
    /// Forward unidentified inbound commands to the caller.
    pub host_invalid_commands: bool,
    /// Inbound commands answered by the library itself.
    pub supported_commands: HashSet<CommandKind>,
    /// Inbound commands forwarded to the caller, who must respond.
    pub host_commands: HashSet<CommandKind>,
    /// Response to an inbound `ATI`.
    pub device_information: String,
}

impl Default for CodelessConfig {
    fn default() -> Self {
        Self {
            gatt_queue_priority: true,
            gatt_dequeue_before_processing: true,
            end_of_line: "\r\n".to_string(),
            append_end_of_line: true,
            end_of_line_after_command: false,
            empty_line_before_ok: true,
            empty_line_before_error: true,
            trailing_zero: true,
            single_write_response: true,
            disallow_invalid_parsed_command: false,
            disallow_invalid_command: true,
            disallow_invalid_prefix: true,
            auto_add_prefix: true,
            line_events: true,
            start_in_command_mode: true,
            host_binary_request: true,
            mode_change_send_binary_request: true,
            allow_inbound_binary_in_command_mode: false,
            allow_outbound_binary_in_command_mode: false,
            allow_inbound_command_in_binary_mode: false,
            allow_outbound_command_in_binary_mode: false,
            default_dsps_chunk_size: 128,
            dsps_chunk_size_increase_to_mtu: true,
            dsps_pending_max_size: 1000,
            default_dsps_rx_flow_control: true,
            default_dsps_tx_flow_control: true,
            set_flow_control_on_connection: true,
            dsps_pattern_digits: 4,
            dsps_pattern_suffix: Vec::new(),
            dsps_echo: false,
            dsps_stats: true,
            dsps_stats_interval: Duration::from_millis(1000),
            host_unsupported_commands: false,
            host_invalid_commands: false,
            supported_commands: default_supported_commands(),
            host_commands: default_host_commands(),
            device_information: format!("codeless-dsps {}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Commands the library answers on its own.
pub fn default_supported_commands() -> HashSet<CommandKind> {
    [
        CommandKind::At,
        CommandKind::DeviceInformation,
        CommandKind::BinRequest,
        CommandKind::BinRequestAck,
        CommandKind::BinExit,
        CommandKind::BinExitAck,
        CommandKind::GapStatus,
    ]
    .into_iter()
    .collect()
}

/// Commands forwarded to the caller.
pub fn default_host_commands() -> HashSet<CommandKind> {
    [CommandKind::Print].into_iter().collect()
}

impl CodelessConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> CodelessConfigBuilder {
        CodelessConfigBuilder::default()
    }

    /// Whether the library answers this inbound command itself.
    pub fn is_supported(&self, kind: CommandKind) -> bool {
        self.supported_commands.contains(&kind)
    }

    /// Whether this inbound command goes to the caller.
    pub fn is_host_command(&self, kind: CommandKind) -> bool {
        self.host_commands.contains(&kind)
    }
}

/// Builder for CodelessConfig.
#[derive(Debug, Clone, Default)]
pub struct CodelessConfigBuilder {
    config: CodelessConfig,
}

impl CodelessConfigBuilder {
    pub fn gatt_queue_priority(mut self, enabled: bool) -> Self {
        self.config.gatt_queue_priority = enabled;
        self
    }

    pub fn gatt_dequeue_before_processing(mut self, enabled: bool) -> Self {
        self.config.gatt_dequeue_before_processing = enabled;
        self
    }

    pub fn end_of_line(mut self, eol: impl Into<String>) -> Self {
        self.config.end_of_line = eol.into();
        self
    }

    pub fn append_end_of_line(mut self, enabled: bool) -> Self {
        self.config.append_end_of_line = enabled;
        self
    }

    pub fn end_of_line_after_command(mut self, enabled: bool) -> Self {
        self.config.end_of_line_after_command = enabled;
        self
    }

    pub fn empty_line_before_ok(mut self, enabled: bool) -> Self {
        self.config.empty_line_before_ok = enabled;
        self
    }

    pub fn empty_line_before_error(mut self, enabled: bool) -> Self {
        self.config.empty_line_before_error = enabled;
        self
    }

    pub fn trailing_zero(mut self, enabled: bool) -> Self {
        self.config.trailing_zero = enabled;
        self
    }

    pub fn single_write_response(mut self, enabled: bool) -> Self {
        self.config.single_write_response = enabled;
        self
    }

    pub fn disallow_invalid_parsed_command(mut self, enabled: bool) -> Self {
        self.config.disallow_invalid_parsed_command = enabled;
        self
    }

    pub fn disallow_invalid_command(mut self, enabled: bool) -> Self {
        self.config.disallow_invalid_command = enabled;
        self
    }

    pub fn disallow_invalid_prefix(mut self, enabled: bool) -> Self {
        self.config.disallow_invalid_prefix = enabled;
        self
    }

    pub fn auto_add_prefix(mut self, enabled: bool) -> Self {
        self.config.auto_add_prefix = enabled;
        self
    }

    pub fn line_events(mut self, enabled: bool) -> Self {
        self.config.line_events = enabled;
        self
    }

    pub fn start_in_command_mode(mut self, enabled: bool) -> Self {
        self.config.start_in_command_mode = enabled;
        self
    }

    pub fn host_binary_request(mut self, enabled: bool) -> Self {
        self.config.host_binary_request = enabled;
        self
    }

    pub fn mode_change_send_binary_request(mut self, enabled: bool) -> Self {
        self.config.mode_change_send_binary_request = enabled;
        self
    }

    pub fn allow_inbound_binary_in_command_mode(mut self, allow: bool) -> Self {
        self.config.allow_inbound_binary_in_command_mode = allow;
        self
    }

    pub fn allow_outbound_binary_in_command_mode(mut self, allow: bool) -> Self {
        self.config.allow_outbound_binary_in_command_mode = allow;
        self
    }

    pub fn allow_inbound_command_in_binary_mode(mut self, allow: bool) -> Self {
        self.config.allow_inbound_command_in_binary_mode = allow;
        self
    }

    pub fn allow_outbound_command_in_binary_mode(mut self, allow: bool) -> Self {
        self.config.allow_outbound_command_in_binary_mode = allow;
        self
    }

    pub fn default_dsps_chunk_size(mut self, size: usize) -> Self {
        self.config.default_dsps_chunk_size = size;
        self
    }

    pub fn dsps_chunk_size_increase_to_mtu(mut self, enabled: bool) -> Self {
        self.config.dsps_chunk_size_increase_to_mtu = enabled;
        self
    }

    pub fn dsps_pending_max_size(mut self, size: usize) -> Self {
        self.config.dsps_pending_max_size = size;
        self
    }

    pub fn default_dsps_rx_flow_control(mut self, on: bool) -> Self {
        self.config.default_dsps_rx_flow_control = on;
        self
    }

    pub fn default_dsps_tx_flow_control(mut self, on: bool) -> Self {
        self.config.default_dsps_tx_flow_control = on;
        self
    }

    pub fn set_flow_control_on_connection(mut self, enabled: bool) -> Self {
        self.config.set_flow_control_on_connection = enabled;
        self
    }

    pub fn dsps_pattern_digits(mut self, digits: u32) -> Self {
        self.config.dsps_pattern_digits = digits;
        self
    }

    pub fn dsps_pattern_suffix(mut self, suffix: impl Into<Vec<u8>>) -> Self {
        self.config.dsps_pattern_suffix = suffix.into();
        self
    }

    pub fn dsps_echo(mut self, enabled: bool) -> Self {
        self.config.dsps_echo = enabled;
        self
    }

    pub fn dsps_stats(mut self, enabled: bool) -> Self {
        self.config.dsps_stats = enabled;
        self
    }

    pub fn dsps_stats_interval_ms(mut self, ms: u64) -> Self {
        self.config.dsps_stats_interval = Duration::from_millis(ms);
        self
    }

    pub fn host_unsupported_commands(mut self, enabled: bool) -> Self {
        self.config.host_unsupported_commands = enabled;
        self
    }

    pub fn host_invalid_commands(mut self, enabled: bool) -> Self {
        self.config.host_invalid_commands = enabled;
        self
    }

    pub fn supported_commands(mut self, kinds: impl IntoIterator<Item = CommandKind>) -> Self {
        self.config.supported_commands = kinds.into_iter().collect();
        self
    }

    pub fn host_commands(mut self, kinds: impl IntoIterator<Item = CommandKind>) -> Self {
        self.config.host_commands = kinds.into_iter().collect();
        self
    }

    pub fn device_information(mut self, info: impl Into<String>) -> Self {
        self.config.device_information = info.into();
        self
    }

    pub fn build(self) -> CodelessConfig {
        self.config
    }
}
