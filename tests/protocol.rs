// CodeLess command channel tests against the loopback peer
//
// Each test connects a Manager to a LoopbackPeer, drives both sides until
// idle and checks the events and the text the peer saw.

use codeless_dsps::transport::loopback::{drive, LoopbackPeer};
use codeless_dsps::{
    CodelessConfig, CodelessError, CodelessEvent, Command, CommandKind, ConnectionState,
    EventReceiver, Manager, OperationMode, ResponseValue, Script,
};

fn connect(peer: LoopbackPeer, config: CodelessConfig) -> (Manager<LoopbackPeer>, EventReceiver) {
    let mut manager = Manager::new(peer, config);
    let events = manager.subscribe();
    manager.connect().unwrap();
    drive(&mut manager);
    assert!(manager.is_ready(), "state {:?}", manager.state());
    (manager, events)
}

fn collect(rx: &mut EventReceiver) -> Vec<CodelessEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

fn successes(events: &[CodelessEvent]) -> Vec<Command> {
    events
        .iter()
        .filter_map(|e| match e {
            CodelessEvent::CommandSuccess { command } => Some(command.clone()),
            _ => None,
        })
        .collect()
}

fn errors(events: &[CodelessEvent]) -> Vec<(Command, String)> {
    events
        .iter()
        .filter_map(|e| match e {
            CodelessEvent::CommandError { command, message } => Some((command.clone(), message.clone())),
            _ => None,
        })
        .collect()
}

#[test]
fn test_connect_reports_states_in_order() {
    let (_manager, mut rx) = connect(LoopbackPeer::new(), CodelessConfig::default());
    let states: Vec<ConnectionState> = collect(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            CodelessEvent::ConnectionStateChanged { state } => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::ServiceDiscovery,
            ConnectionState::Ready,
        ]
    );
}

#[test]
fn test_command_response_value() {
    let peer = LoopbackPeer::new().respond_with("BATT", ["87"]);
    let (mut manager, mut rx) = connect(peer, CodelessConfig::default());

    let id = manager.send_text_command("BATT").unwrap();
    drive(&mut manager);

    assert_eq!(manager.transport().commands(), ["ATr+BATT"]);
    let done = successes(&collect(&mut rx));
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].id(), id);
    assert_eq!(done[0].response(), ["87".to_string()]);
    assert_eq!(done[0].value(), Some(&ResponseValue::Int(87)));
    assert!(manager.pending_command().is_none());
}

#[test]
fn test_typed_command_uses_remote_prefix() {
    let (mut manager, mut rx) = connect(LoopbackPeer::new(), CodelessConfig::default());
    let command = Command::new(CommandKind::IoStatus, vec![10.into(), 1.into()]).unwrap();
    manager.send_command(command).unwrap();
    drive(&mut manager);
    assert_eq!(manager.transport().commands(), ["ATr+IO=10,1"]);
    assert_eq!(successes(&collect(&mut rx)).len(), 1);
}

#[test]
fn test_second_command_rejected_while_pending() {
    let (mut manager, mut rx) = connect(LoopbackPeer::new(), CodelessConfig::default());
    manager.send_text_command("ATI").unwrap();
    let err = manager.send_text_command("AT").unwrap_err();
    assert!(matches!(err, CodelessError::Overflow { .. }));
    drive(&mut manager);

    assert_eq!(manager.transport().commands(), ["ATI"]);
    let done = successes(&collect(&mut rx));
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].response(), ["DA14585 loopback".to_string()]);

    manager.send_text_command("AT").unwrap();
    drive(&mut manager);
    assert_eq!(successes(&collect(&mut rx)).len(), 1);
}

#[test]
fn test_peer_error_code_and_invalid_command() {
    let mut peer = LoopbackPeer::new();
    peer.fail_on("IO");
    let (mut manager, mut rx) = connect(peer, CodelessConfig::default());

    manager.send_text_command("AT+IO=10").unwrap();
    drive(&mut manager);
    manager.send_text_command("AT+FOO").unwrap();
    drive(&mut manager);

    let failed = errors(&collect(&mut rx));
    assert_eq!(failed.len(), 2);
    assert_eq!(failed[0].1, "Failed");
    assert_eq!(failed[0].0.error_code(), Some(5));
    assert!(!failed[0].0.is_peer_invalid());
    assert!(failed[1].0.is_peer_invalid());
    assert_eq!(failed[1].0.kind(), CommandKind::Custom);
}

#[test]
fn test_invalid_outbound_command_rejected_locally() {
    let (mut manager, _rx) = connect(LoopbackPeer::new(), CodelessConfig::default());
    assert!(manager.send_text_command("AT+IO=99").is_err());
    assert!(manager.send_text_command("hello").is_err());
    assert!(manager.transport().commands().is_empty());
}

#[test]
fn test_negotiated_binary_mode_round_trip() {
    let (mut manager, mut rx) = connect(LoopbackPeer::new(), CodelessConfig::default());

    manager.enter_binary_mode().unwrap();
    drive(&mut manager);
    assert_eq!(manager.mode(), OperationMode::Binary);
    assert!(manager.transport().is_binary());
    assert!(manager.send_text_command("ATI").is_err());

    manager.exit_binary_mode().unwrap();
    drive(&mut manager);
    assert_eq!(manager.mode(), OperationMode::Command);
    assert!(!manager.transport().is_binary());

    let modes: Vec<OperationMode> = collect(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            CodelessEvent::ModeChanged { mode } => Some(mode),
            _ => None,
        })
        .collect();
    assert_eq!(modes, vec![OperationMode::Binary, OperationMode::Command]);
    assert_eq!(manager.transport().commands(), ["AT+BINREQ", "AT+BINREQEXIT"]);
}

#[test]
fn test_forced_binary_mode_switches_when_ack_is_written() {
    let config = CodelessConfig::builder()
        .mode_change_send_binary_request(false)
        .build();
    let (mut manager, mut rx) = connect(LoopbackPeer::new(), config);

    manager.enter_binary_mode().unwrap();
    drive(&mut manager);

    let events = collect(&mut rx);
    let mode_at = events
        .iter()
        .position(|e| matches!(e, CodelessEvent::ModeChanged { mode: OperationMode::Binary }))
        .unwrap();
    let ok_at = events
        .iter()
        .position(|e| matches!(e, CodelessEvent::CommandSuccess { .. }))
        .unwrap();
    assert!(mode_at < ok_at);
    assert_eq!(manager.transport().commands(), ["AT+BINREQACK"]);
}

#[test]
fn test_peer_binary_request_accepted_by_caller() {
    let (mut manager, mut rx) = connect(LoopbackPeer::new(), CodelessConfig::default());

    manager.transport_mut().send_text("AT+BINREQ");
    drive(&mut manager);
    assert!(collect(&mut rx)
        .iter()
        .any(|e| matches!(e, CodelessEvent::BinaryModeRequest)));
    assert_eq!(manager.mode(), OperationMode::Command);

    manager.accept_binary_mode_request().unwrap();
    drive(&mut manager);
    assert_eq!(manager.mode(), OperationMode::Binary);
    assert!(manager.transport().is_binary());
    assert!(manager.pending_command().is_none());
}

#[test]
fn test_peer_binary_request_acked_automatically() {
    let config = CodelessConfig::builder().host_binary_request(false).build();
    let (mut manager, _rx) = connect(LoopbackPeer::new(), config);
    manager.transport_mut().send_text("AT+BINREQ");
    drive(&mut manager);
    assert_eq!(manager.mode(), OperationMode::Binary);
    assert_eq!(manager.transport().commands(), ["AT+BINREQACK"]);
}

#[test]
fn test_inbound_command_answered_by_library() {
    let (mut manager, _rx) = connect(LoopbackPeer::new(), CodelessConfig::default());
    manager.transport_mut().send_text("AT+GAPSTATUS");
    drive(&mut manager);
    assert_eq!(manager.transport().text_writes(), ["1,1\r\nOK\r\n"]);
}

#[test]
fn test_inbound_host_command() {
    let (mut manager, mut rx) = connect(LoopbackPeer::new(), CodelessConfig::default());
    manager.transport_mut().send_text("AT+PRINT=hello");
    drive(&mut manager);

    let inbound = collect(&mut rx).into_iter().find_map(|e| match e {
        CodelessEvent::InboundCommand { command } => Some(command),
        _ => None,
    });
    let inbound = inbound.unwrap();
    assert_eq!(inbound.kind(), CommandKind::Print);
    assert_eq!(inbound.text_argument(0), Some("hello"));
    assert!(manager.inbound_command().is_some());

    manager.send_success(Some("printed")).unwrap();
    drive(&mut manager);
    assert_eq!(manager.transport().text_writes(), ["printed\r\nOK\r\n"]);
    assert!(manager.inbound_command().is_none());
}

#[test]
fn test_script_stops_on_error() {
    let mut peer = LoopbackPeer::new();
    peer.fail_on("BATT");
    let (mut manager, mut rx) = connect(peer, CodelessConfig::default());

    let script = Script::parse("setup", "AT\nAT+BATT\nATI\nAT+IO=10\nAT\n");
    let id = manager.start_script(script).unwrap();
    drive(&mut manager);

    assert_eq!(manager.transport().commands(), ["AT", "AT+BATT"]);
    assert!(manager.script().is_none());
    let events = collect(&mut rx);
    let steps = events
        .iter()
        .filter(|e| matches!(e, CodelessEvent::ScriptCommand { .. }))
        .count();
    assert_eq!(steps, 2);
    let end = events.iter().find_map(|e| match e {
        CodelessEvent::ScriptEnd { script, error } => Some((*script, error.clone())),
        _ => None,
    });
    assert_eq!(end, Some((id, Some("Failed".to_string()))));
}

#[test]
fn test_script_continues_past_errors() {
    let mut peer = LoopbackPeer::new();
    peer.fail_on("BATT");
    let (mut manager, mut rx) = connect(peer, CodelessConfig::default());

    let script = Script::parse("all", "AT\nAT+BATT\nATI").with_stop_on_error(false);
    manager.start_script(script).unwrap();
    drive(&mut manager);

    assert_eq!(manager.transport().commands(), ["AT", "AT+BATT", "ATI"]);
    let end = collect(&mut rx).into_iter().find_map(|e| match e {
        CodelessEvent::ScriptEnd { error, .. } => Some(error),
        _ => None,
    });
    assert_eq!(end, Some(None));
}

#[test]
fn test_disconnect_fails_pending_command_once() {
    let (mut manager, mut rx) = connect(LoopbackPeer::new(), CodelessConfig::default());
    manager.send_text_command("ATI").unwrap();
    manager.disconnect().unwrap();
    drive(&mut manager);

    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert!(!manager.is_transport_busy());
    assert_eq!(manager.queued_operations(), 0);
    assert!(manager.pending_command().is_none());
    let failed = errors(&collect(&mut rx));
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].1, "Disconnected");
}

#[test]
fn test_reconnect_after_link_loss() {
    let (mut manager, mut rx) = connect(LoopbackPeer::new(), CodelessConfig::default());
    manager.transport_mut().drop_link("supervision timeout");
    drive(&mut manager);
    assert_eq!(manager.state(), ConnectionState::Disconnected);

    manager.connect().unwrap();
    drive(&mut manager);
    assert!(manager.is_ready());
    manager.send_text_command("AT").unwrap();
    drive(&mut manager);
    assert_eq!(successes(&collect(&mut rx)).len(), 1);
}

#[test]
fn test_failed_write_fails_command() {
    let (mut manager, mut rx) = connect(LoopbackPeer::new(), CodelessConfig::default());
    manager.transport_mut().set_fail_writes(true);
    manager.send_text_command("ATI").unwrap();
    drive(&mut manager);
    assert!(manager.is_ready());
    let failed = errors(&collect(&mut rx));
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].1, "Gatt operation error");
}
