// MIT License - Copyright (c) 2026 The codeless-dsps developers
// CodeLess / DSPS protocol engine

use std::collections::HashMap;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use codeless_dsps::transport::loopback::{drive, LoopbackPeer};
use codeless_dsps::{
    CodelessConfig, CodelessConfigBuilder, CodelessEvent, EventReceiver, Manager, Script,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "codeless-cli")]
#[command(about = "Drive the CodeLess / DSPS engine against a simulated peer")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<String>,

    /// Command to send, e.g. "ATI" or "BATT" (repeatable)
    #[arg(long = "command", short = 'c')]
    commands: Vec<String>,

    /// Script file with one command per line
    #[arg(long)]
    script: Option<String>,

    /// Switch to binary mode before any transfer
    #[arg(long)]
    binary: bool,

    /// File to send over DSPS
    #[arg(long)]
    send_file: Option<String>,

    /// File whose content is the prefix of a counter pattern
    #[arg(long)]
    pattern: Option<String>,

    /// Transfer period in milliseconds (0 sends a file as fast as possible)
    #[arg(long, default_value_t = 0)]
    period_ms: u64,

    /// Engine tick interval in milliseconds
    #[arg(long, default_value_t = 10)]
    tick_ms: u64,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct Config {
    #[serde(default)]
    codeless: CodelessToml,
    #[serde(default)]
    peer: PeerToml,
}

/// Overrides of the engine defaults. Missing keys keep the default.
#[derive(Debug, Default, Deserialize)]
struct CodelessToml {
    gatt_queue_priority: Option<bool>,
    end_of_line: Option<String>,
    trailing_zero: Option<bool>,
    single_write_response: Option<bool>,
    auto_add_prefix: Option<bool>,
    start_in_command_mode: Option<bool>,
    host_binary_request: Option<bool>,
    mode_change_send_binary_request: Option<bool>,
    allow_outbound_binary_in_command_mode: Option<bool>,
    allow_inbound_binary_in_command_mode: Option<bool>,
    host_unsupported_commands: Option<bool>,
    chunk_size: Option<usize>,
    chunk_size_increase_to_mtu: Option<bool>,
    pending_max_size: Option<usize>,
    pattern_digits: Option<u32>,
    pattern_suffix: Option<String>,
    echo: Option<bool>,
    stats: Option<bool>,
    stats_interval_ms: Option<u64>,
    device_information: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PeerToml {
    #[serde(default = "default_true")]
    codeless: bool,
    #[serde(default = "default_true")]
    dsps: bool,
    #[serde(default = "default_mtu")]
    mtu: u16,
    /// Response lines per command identifier, e.g. `BATT = ["87"]`
    #[serde(default)]
    responses: HashMap<String, Vec<String>>,
    /// Identifiers the peer answers with an error
    #[serde(default)]
    fail: Vec<String>,
}

impl Default for PeerToml {
    fn default() -> Self {
        Self {
            codeless: true,
            dsps: true,
            mtu: default_mtu(),
            responses: HashMap::new(),
            fail: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_mtu() -> u16 {
    247
}

fn load_config(path: Option<&str>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = std::fs::read_to_string(path).context("Failed to read config file")?;
    toml::from_str(&text).context("Failed to parse config file")
}

macro_rules! apply {
    ($builder:ident, $toml:ident, $($field:ident => $setter:ident),* $(,)?) => {
        $(
            if let Some(value) = $toml.$field.clone() {
                $builder = $builder.$setter(value);
            }
        )*
    };
}

fn build_codeless_config(toml: &CodelessToml) -> CodelessConfig {
    let mut builder: CodelessConfigBuilder = CodelessConfig::builder();
    apply!(builder, toml,
        gatt_queue_priority => gatt_queue_priority,
        end_of_line => end_of_line,
        trailing_zero => trailing_zero,
        single_write_response => single_write_response,
        auto_add_prefix => auto_add_prefix,
        start_in_command_mode => start_in_command_mode,
        host_binary_request => host_binary_request,
        mode_change_send_binary_request => mode_change_send_binary_request,
        allow_outbound_binary_in_command_mode => allow_outbound_binary_in_command_mode,
        allow_inbound_binary_in_command_mode => allow_inbound_binary_in_command_mode,
        host_unsupported_commands => host_unsupported_commands,
        chunk_size => default_dsps_chunk_size,
        chunk_size_increase_to_mtu => dsps_chunk_size_increase_to_mtu,
        pending_max_size => dsps_pending_max_size,
        pattern_digits => dsps_pattern_digits,
        echo => dsps_echo,
        stats => dsps_stats,
        stats_interval_ms => dsps_stats_interval_ms,
        device_information => device_information,
    );
    if let Some(suffix) = &toml.pattern_suffix {
        builder = builder.dsps_pattern_suffix(unescape(suffix));
    }
    builder.build()
}

/// `\r`, `\n`, `\t` and `\0` escapes for byte strings given in TOML literals.
fn unescape(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('r') => out.push(b'\r'),
            Some('n') => out.push(b'\n'),
            Some('t') => out.push(b'\t'),
            Some('0') => out.push(0),
            Some(other) => {
                out.push(b'\\');
                let mut buf = [0u8; 4];
                out.extend_from_slice(other.encode_utf8(&mut buf).as_bytes());
            }
            None => out.push(b'\\'),
        }
    }
    out
}

fn build_peer(toml: &PeerToml) -> LoopbackPeer {
    let mut peer = LoopbackPeer::new()
        .with_services(toml.codeless, toml.dsps)
        .with_mtu(toml.mtu);
    for (identifier, lines) in &toml.responses {
        peer = peer.respond_with(identifier, lines.clone());
    }
    for identifier in &toml.fail {
        peer.fail_on(identifier);
    }
    peer
}

// ---------------------------------------------------------------------------
// Event output
// ---------------------------------------------------------------------------

// JSON lines share a flat {now, op, detail} structure
#[derive(Serialize)]
struct EventRecord {
    now: u64,
    op: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

fn now_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

fn describe(event: &CodelessEvent) -> (&'static str, Option<String>) {
    match event {
        CodelessEvent::ConnectionStateChanged { state } => ("state", Some(format!("{state:?}"))),
        CodelessEvent::Ready { support } => ("ready", Some(format!("{support:?}"))),
        CodelessEvent::ModeChanged { mode } => ("mode", Some(format!("{mode:?}"))),
        CodelessEvent::BinaryModeRequest => ("binary_request", None),
        CodelessEvent::CommandSuccess { command } => (
            "command_ok",
            Some(format!("{} {:?}", command.text(), command.response())),
        ),
        CodelessEvent::CommandError { command, message } => {
            ("command_error", Some(format!("{}: {}", command.text(), message)))
        }
        CodelessEvent::InboundCommand { command } => ("inbound", Some(command.text().to_string())),
        CodelessEvent::Line { line } => (
            "line",
            Some(format!("{:?} {:?} {:?}", line.direction, line.line_type, line.text)),
        ),
        CodelessEvent::DspsRxData { data } => ("rx_data", Some(format!("{} bytes", data.len()))),
        CodelessEvent::DspsFlowChanged { direction, on } => {
            ("flow", Some(format!("{direction:?} {}", if *on { "on" } else { "off" })))
        }
        CodelessEvent::DspsFileChunkSent {
            operation,
            index,
            total,
        } => ("file_chunk", Some(format!("{operation} {}/{total}", index + 1))),
        CodelessEvent::DspsFileComplete { operation } => ("file_complete", Some(operation.to_string())),
        CodelessEvent::DspsFileError { operation, message } => (
            "file_error",
            Some(match operation {
                Some(op) => format!("{op}: {message}"),
                None => message.clone(),
            }),
        ),
        CodelessEvent::DspsRxFileData {
            operation,
            name,
            size,
            received,
        } => ("rx_file", Some(format!("{operation} {name} {received}/{size}"))),
        CodelessEvent::DspsRxFileCrc {
            operation,
            name,
            ok,
            expected,
            computed,
        } => (
            "rx_file_crc",
            Some(format!("{operation} {name} ok={ok} expected={expected:08x} computed={computed:08x}")),
        ),
        CodelessEvent::DspsPatternChunkSent { operation, counter } => {
            ("pattern_chunk", Some(format!("{operation} {counter}")))
        }
        CodelessEvent::DspsPeriodicChunkSent { operation, count } => {
            ("periodic_chunk", Some(format!("{operation} {count}")))
        }
        CodelessEvent::DspsPatternFileError { message } => ("pattern_error", Some(message.clone())),
        CodelessEvent::DspsStats {
            operation,
            bytes,
            current_speed,
            average_speed,
        } => (
            "stats",
            Some(format!(
                "{} bytes={bytes} current={current_speed}B/s average={average_speed}B/s",
                operation.as_ref().map(|o| o.to_string()).unwrap_or_else(|| "rx".to_string())
            )),
        ),
        CodelessEvent::TransferAborted { operation, reason } => {
            ("aborted", Some(format!("{operation}: {reason}")))
        }
        CodelessEvent::ScriptStart { script } => ("script_start", Some(script.to_string())),
        CodelessEvent::ScriptCommand {
            script,
            index,
            command,
        } => ("script_command", Some(format!("{script} [{index}] {}", command.text()))),
        CodelessEvent::ScriptEnd { script, error } => (
            "script_end",
            Some(match error {
                Some(e) => format!("{script}: {e}"),
                None => script.to_string(),
            }),
        ),
        CodelessEvent::Error { error } => ("error", Some(error.to_string())),
    }
}

async fn print_events(mut rx: EventReceiver, json: bool) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let (op, detail) = describe(&event);
                if json {
                    let record = EventRecord {
                        now: now_epoch_ms(),
                        op: op.to_string(),
                        detail,
                    };
                    match serde_json::to_string(&record) {
                        Ok(line) => println!("{line}"),
                        Err(e) => warn!("Failed to serialize event: {e}"),
                    }
                } else {
                    let ts = Utc::now().format("%H:%M:%S%.3f");
                    match detail {
                        Some(detail) => println!("{ts} {op:<15} {detail}"),
                        None => println!("{ts} {op}"),
                    }
                }
            }
            Err(RecvError::Lagged(n)) => warn!("Event printer lagged, {n} events dropped"),
            Err(RecvError::Closed) => break,
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

/// Run queued work until no command or script is outstanding.
fn settle(manager: &mut Manager<LoopbackPeer>) {
    loop {
        drive(manager);
        if manager.pending_command().is_none() && manager.script().is_none() {
            break;
        }
        if !manager.transport().has_events() {
            warn!("Peer went quiet with a command outstanding");
            break;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or RUST_LOG=codeless_dsps=trace).
    // Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let mut manager = Manager::new(build_peer(&config.peer), build_codeless_config(&config.codeless));
    let printer = tokio::spawn(print_events(manager.subscribe(), cli.json));
    let mut sigterm = signal(SignalKind::terminate())?;

    manager.connect().context("Failed to connect")?;
    drive(&mut manager);
    if !manager.is_ready() {
        bail!("Peer did not become ready (state {:?})", manager.state());
    }
    info!("Connected, MTU {}, chunk size {}", manager.mtu(), manager.chunk_size());

    for text in &cli.commands {
        manager
            .send_text_command(text)
            .with_context(|| format!("Failed to send {text}"))?;
        settle(&mut manager);
    }

    if let Some(path) = &cli.script {
        let script = Script::load(path).context("Failed to load script")?;
        manager.start_script(script).context("Failed to start script")?;
        settle(&mut manager);
    }

    if cli.binary && !manager.is_binary_mode() {
        manager.enter_binary_mode().context("Failed to enter binary mode")?;
        settle(&mut manager);
        drive(&mut manager);
    }

    let period = Duration::from_millis(cli.period_ms);
    let mut transfers = Vec::new();
    if let Some(path) = &cli.send_file {
        let file = manager.load_file_send(path, None, period)?;
        info!("Sending {} in {} chunks", file.name(), file.total_chunks());
        transfers.push(manager.start_transfer(file)?);
    }
    if let Some(path) = &cli.pattern {
        let period = if period.is_zero() { Duration::from_millis(100) } else { period };
        let pattern = manager.load_pattern_send(path, None, period)?;
        transfers.push(manager.start_transfer(pattern)?);
    }
    drive(&mut manager);

    if !transfers.is_empty() {
        let mut ticker = interval(Duration::from_millis(cli.tick_ms.max(1)));
        info!("Transfers running. Send SIGINT/SIGTERM to stop.");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    manager.tick(Instant::now());
                    drive(&mut manager);
                    if manager.active_transfers().is_empty() {
                        info!("All transfers finished");
                        break;
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received SIGINT, shutting down...");
                    break;
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down...");
                    break;
                }
            }
        }
        for id in manager.active_transfers() {
            if let Ok(transfer) = manager.stop_transfer(id) {
                debug!("Stopped {} ({} bytes)", id, transfer.stats().bytes());
            }
        }
    }

    info!("Peer received {} bytes of DSPS data", manager.transport().received_data().len());
    if let Err(e) = manager.disconnect() {
        warn!("Error disconnecting: {e}");
    }
    drive(&mut manager);

    // Dropping the manager closes the event channel and ends the printer.
    drop(manager);
    if let Err(e) = printer.await {
        warn!("Event printer failed: {e}");
    }
    Ok(())
}
