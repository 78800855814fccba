// DSPS data channel tests against the loopback peer
//
// The manager starts in binary mode unless a test needs command mode, so
// data is accepted in both directions from the first tick.

use std::time::{Duration, Instant};

use codeless_dsps::transport::loopback::{drive, LoopbackPeer};
use codeless_dsps::{
    CodelessConfig, CodelessError, CodelessEvent, EventReceiver, FileSend, Manager,
    MemorySinkProvider, PeriodicSend, TransferState,
};

fn binary_config() -> CodelessConfig {
    CodelessConfig::builder().start_in_command_mode(false).build()
}

fn connect(peer: LoopbackPeer, config: CodelessConfig) -> (Manager<LoopbackPeer>, EventReceiver) {
    let mut manager = Manager::new(peer, config);
    let events = manager.subscribe();
    manager.connect().unwrap();
    drive(&mut manager);
    assert!(manager.is_ready());
    (manager, events)
}

fn collect(rx: &mut EventReceiver) -> Vec<CodelessEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn test_send_splits_into_chunks() {
    let (mut manager, _rx) = connect(LoopbackPeer::new(), binary_config());
    assert_eq!(manager.chunk_size(), 20);
    let data = payload(50);
    manager.dsps_send(&data).unwrap();
    drive(&mut manager);
    assert_eq!(manager.transport().received_data(), data.as_slice());
}

#[test]
fn test_mtu_sets_chunk_size() {
    let (manager, _rx) = connect(LoopbackPeer::new().with_mtu(247), binary_config());
    assert_eq!(manager.mtu(), 247);
    assert_eq!(manager.chunk_size(), 244);

    let config = CodelessConfig::builder()
        .start_in_command_mode(false)
        .dsps_chunk_size_increase_to_mtu(false)
        .default_dsps_chunk_size(100)
        .build();
    let (manager, _rx) = connect(LoopbackPeer::new().with_mtu(247), config);
    assert_eq!(manager.chunk_size(), 100);
}

#[test]
fn test_binary_data_blocked_in_command_mode() {
    let (mut manager, mut rx) = connect(LoopbackPeer::new(), CodelessConfig::default());
    assert!(manager.dsps_send(b"data").is_err());
    manager.transport_mut().send_data(b"data");
    drive(&mut manager);
    assert!(!collect(&mut rx)
        .iter()
        .any(|e| matches!(e, CodelessEvent::DspsRxData { .. })));
}

#[test]
fn test_tx_flow_off_holds_chunks_in_order() {
    let (mut manager, mut rx) = connect(LoopbackPeer::new(), binary_config());
    let data = payload(100);
    let file = FileSend::from_bytes("f.bin", &data, 20, Duration::ZERO).unwrap();
    let id = manager.start_transfer(file).unwrap();

    // The first chunk is already on the wire.
    manager.transport_mut().set_flow(false);
    drive(&mut manager);
    assert!(!manager.tx_flow());
    assert_eq!(manager.transport().received_data(), &data[..40]);
    assert_eq!(manager.pending_dsps_chunks(), 3);

    manager.dsps_send(b"tail").unwrap();
    drive(&mut manager);
    assert_eq!(manager.transport().received_data().len(), 40);

    manager.transport_mut().set_flow(true);
    drive(&mut manager);
    // Interactive data overtakes the low priority file chunks.
    let mut expected = data[..40].to_vec();
    expected.extend_from_slice(b"tail");
    expected.extend_from_slice(&data[40..]);
    assert_eq!(manager.transport().received_data(), expected.as_slice());

    let complete = collect(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, CodelessEvent::DspsFileComplete { operation } if *operation == id))
        .count();
    assert_eq!(complete, 1);
}

#[test]
fn test_pending_overflow_is_all_or_nothing() {
    let config = CodelessConfig::builder()
        .start_in_command_mode(false)
        .dsps_pending_max_size(2)
        .build();
    let (mut manager, _rx) = connect(LoopbackPeer::new(), config);
    manager.set_tx_flow(false);
    let err = manager.dsps_send(&payload(60)).unwrap_err();
    assert!(matches!(err, CodelessError::PendingOverflow { limit: 2 }));
    assert_eq!(manager.pending_dsps_chunks(), 0);
    manager.dsps_send(&payload(40)).unwrap();
    assert_eq!(manager.pending_dsps_chunks(), 2);
}

#[test]
fn test_file_stop_and_resume_sends_each_byte_once() {
    let (mut manager, mut rx) = connect(LoopbackPeer::new(), binary_config());
    let data = payload(200);
    let file = FileSend::from_bytes("f.bin", &data, 20, Duration::ZERO).unwrap();
    let id = manager.start_transfer(file).unwrap();

    let stopped = manager.stop_transfer(id).unwrap();
    assert_eq!(stopped.state(), TransferState::Stopped);
    drive(&mut manager);
    assert_eq!(manager.transport().received_data(), &data[..20]);
    assert!(manager.transfer(id).is_none());

    manager.start_transfer(stopped).unwrap();
    drive(&mut manager);
    assert_eq!(manager.transport().received_data(), data.as_slice());
    assert!(collect(&mut rx)
        .iter()
        .any(|e| matches!(e, CodelessEvent::DspsFileComplete { operation } if *operation == id)));
}

#[test]
fn test_resume_after_last_chunk_sent_completes() {
    let (mut manager, mut rx) = connect(LoopbackPeer::new(), binary_config());
    let data = payload(10);
    let file = FileSend::from_bytes("f.bin", &data, 20, Duration::ZERO).unwrap();
    let id = manager.start_transfer(file).unwrap();

    // The only chunk is in flight when the transfer stops.
    let stopped = manager.stop_transfer(id).unwrap();
    drive(&mut manager);
    assert_eq!(manager.transport().received_data(), data.as_slice());

    manager.start_transfer(stopped).unwrap();
    for _ in 0..5 {
        manager.tick(Instant::now());
        drive(&mut manager);
    }
    assert!(manager.active_transfers().is_empty());
    assert!(manager.transfer(id).is_none());
    assert_eq!(manager.transport().received_data(), data.as_slice());
    let complete = collect(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, CodelessEvent::DspsFileComplete { operation } if *operation == id))
        .count();
    assert_eq!(complete, 1);
}

#[test]
fn test_periodic_file_send_one_chunk_per_period() {
    let (mut manager, mut rx) = connect(LoopbackPeer::new(), binary_config());
    let period = Duration::from_millis(10);
    let file = FileSend::from_bytes("f.bin", payload(50), 20, period).unwrap();
    manager.start_transfer(file).unwrap();
    drive(&mut manager);
    assert!(manager.transport().received_data().is_empty());

    let t0 = Instant::now();
    manager.tick(t0);
    drive(&mut manager);
    assert_eq!(manager.transport().received_data().len(), 20);
    manager.tick(t0 + Duration::from_millis(5));
    drive(&mut manager);
    assert_eq!(manager.transport().received_data().len(), 20);
    manager.tick(t0 + period);
    manager.tick(t0 + 2 * period);
    drive(&mut manager);
    assert_eq!(manager.transport().received_data().len(), 50);

    let sent: Vec<(usize, usize)> = collect(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            CodelessEvent::DspsFileChunkSent { index, total, .. } => Some((index, total)),
            _ => None,
        })
        .collect();
    assert_eq!(sent, vec![(0, 3), (1, 3), (2, 3)]);
}

#[test]
fn test_pattern_counter_on_the_wire() {
    let (mut manager, mut rx) = connect(LoopbackPeer::new(), binary_config());
    let period = Duration::from_millis(10);
    let pattern = PeriodicSend::pattern(b"abcdefgh", 4, b"", 20, period).unwrap();
    let id = manager.start_transfer(pattern).unwrap();

    let t0 = Instant::now();
    manager.tick(t0);
    drive(&mut manager);
    manager.tick(t0 + period);
    drive(&mut manager);
    assert_eq!(manager.transport().received_data(), b"abcdefgh0000abcdefgh0001");

    let counters: Vec<u64> = collect(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            CodelessEvent::DspsPatternChunkSent { operation, counter } if operation == id => Some(counter),
            _ => None,
        })
        .collect();
    assert_eq!(counters, vec![0, 1]);
}

#[test]
fn test_pattern_file_error_reported() {
    let (manager, mut rx) = connect(LoopbackPeer::new(), binary_config());
    let dir = tempfile::tempdir().unwrap();
    assert!(manager
        .load_pattern_send(dir.path().join("missing"), None, Duration::from_millis(10))
        .is_err());
    assert!(manager
        .load_file_send(dir.path().join("missing"), None, Duration::ZERO)
        .is_err());
    let events = collect(&mut rx);
    assert!(events
        .iter()
        .any(|e| matches!(e, CodelessEvent::DspsPatternFileError { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, CodelessEvent::DspsFileError { operation: None, .. })));
}

#[test]
fn test_file_send_from_disk() {
    let (mut manager, _rx) = connect(LoopbackPeer::new().with_mtu(100), binary_config());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.bin");
    let data = payload(1000);
    std::fs::write(&path, &data).unwrap();

    let file = manager.load_file_send(&path, None, Duration::ZERO).unwrap();
    assert_eq!(file.chunk_size(), 97);
    assert_eq!(file.total_chunks(), 11);
    manager.start_transfer(file).unwrap();
    drive(&mut manager);
    assert_eq!(manager.transport().received_data(), data.as_slice());
    assert!(manager.active_transfers().is_empty());
}

#[test]
fn test_chunk_size_larger_than_mtu_rejected() {
    let (mut manager, _rx) = connect(LoopbackPeer::new(), binary_config());
    let file = FileSend::from_bytes("f.bin", payload(50), 40, Duration::ZERO).unwrap();
    assert!(manager.start_transfer(file).is_err());
}

#[test]
fn test_file_receive_with_crc() {
    let (mut manager, mut rx) = connect(LoopbackPeer::new(), binary_config());
    let sink = MemorySinkProvider::new();
    let id = manager.start_file_receive(sink.clone()).unwrap();

    let mut first = b"Name: a.bin\nSize: 4\nCRC: b63cfbcd\nEND".to_vec();
    first.extend_from_slice(&[1, 2]);
    manager.transport_mut().send_data(&first);
    manager.transport_mut().send_data(&[3, 4]);
    drive(&mut manager);

    assert_eq!(sink.file("a.bin"), Some(vec![1, 2, 3, 4]));
    let events = collect(&mut rx);
    let progress: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            CodelessEvent::DspsRxFileData { operation, received, .. } if *operation == id => Some(*received),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![2, 4]);
    let crc = events.iter().find_map(|e| match e {
        CodelessEvent::DspsRxFileCrc { ok, computed, .. } => Some((*ok, *computed)),
        _ => None,
    });
    assert_eq!(crc, Some((true, 0xb63cfbcd)));
    assert!(manager.file_receive().is_some_and(|r| r.is_complete()));
}

#[test]
fn test_echo_returns_received_data() {
    let config = CodelessConfig::builder()
        .start_in_command_mode(false)
        .dsps_echo(true)
        .build();
    let (mut manager, mut rx) = connect(LoopbackPeer::new(), config);
    manager.transport_mut().send_data(b"ping");
    drive(&mut manager);
    assert_eq!(manager.transport().received_data(), b"ping");
    assert_eq!(manager.dsps_rx_bytes(), 4);
    assert!(collect(&mut rx)
        .iter()
        .any(|e| matches!(e, CodelessEvent::DspsRxData { data } if data == b"ping")));
}

#[test]
fn test_rx_flow_stops_peer() {
    let (mut manager, _rx) = connect(LoopbackPeer::new(), binary_config());
    manager.set_rx_flow(false).unwrap();
    drive(&mut manager);
    manager.transport_mut().send_data(b"held");
    drive(&mut manager);
    assert_eq!(manager.dsps_rx_bytes(), 0);

    manager.set_rx_flow(true).unwrap();
    drive(&mut manager);
    assert_eq!(manager.dsps_rx_bytes(), 4);
}

#[test]
fn test_link_loss_aborts_transfers_once() {
    let (mut manager, mut rx) = connect(LoopbackPeer::new(), binary_config());
    let pattern = PeriodicSend::pattern(b"x", 4, b"", 20, Duration::from_millis(10)).unwrap();
    let id = manager.start_transfer(pattern).unwrap();
    manager.tick(Instant::now());
    manager.transport_mut().drop_link("gone");
    drive(&mut manager);

    assert!(manager.active_transfers().is_empty());
    assert_eq!(manager.pending_dsps_chunks(), 0);
    assert_eq!(manager.queued_operations(), 0);
    let aborted: Vec<String> = collect(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            CodelessEvent::TransferAborted { operation, reason } if operation == id => Some(reason),
            _ => None,
        })
        .collect();
    assert_eq!(aborted, vec!["gone".to_string()]);
}
