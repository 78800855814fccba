// MIT License - Copyright (c) 2026 The codeless-dsps developers
// CodeLess / DSPS protocol engine
//
//! # codeless-dsps
//!
//! Host side of the Dialog CodeLess (AT commands over GATT) and DSPS
//! (serial port over GATT) protocols.
//!
//! The engine does not own a Bluetooth stack. It issues requests through a
//! [`Transport`] implementation and is fed the completions and notifications
//! back as [`TransportEvent`]s. Everything it does is reported on a broadcast
//! channel of [`CodelessEvent`]s.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::time::{Duration, Instant};
//!
//! use codeless_dsps::transport::loopback::{drive, LoopbackPeer};
//! use codeless_dsps::{CodelessConfig, CodelessEvent, FileSend, Manager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = CodelessConfig::builder()
//!         .default_dsps_chunk_size(128)
//!         .mode_change_send_binary_request(false)
//!         .build();
//!
//!     let mut manager = Manager::new(LoopbackPeer::new().with_mtu(247), config);
//!     let mut events = manager.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     manager.connect()?;
//!     drive(&mut manager);
//!
//!     manager.send_text_command("ATI")?;
//!     drive(&mut manager);
//!
//!     manager.enter_binary_mode()?;
//!     drive(&mut manager);
//!
//!     let file = FileSend::open("firmware.bin", manager.chunk_size(), Duration::ZERO)?;
//!     manager.start_transfer(file)?;
//!     let mut ticker = tokio::time::interval(Duration::from_millis(10));
//!     while !manager.active_transfers().is_empty() {
//!         ticker.tick().await;
//!         manager.tick(Instant::now());
//!         drive(&mut manager);
//!     }
//!
//!     manager.disconnect()?;
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod command;
pub mod config;
pub mod constants;
pub mod dsps;
pub mod error;
pub mod event;
pub mod manager;
pub mod protocol;
pub mod queue;
pub mod script;
pub mod sink;
pub mod transfer;
pub mod transport;

// Re-exports for convenience
pub use command::{Argument, Command, CommandId, CommandKind, Direction, ResponseValue};
pub use config::{CodelessConfig, CodelessConfigBuilder};
pub use error::{CodelessError, ErrorCodeMessage, Result};
pub use event::{
    CodelessEvent, ConnectionState, EventReceiver, FlowDirection, OperationMode, ServiceSupport,
};
pub use manager::Manager;
pub use script::{Script, ScriptId};
pub use sink::{FsSinkProvider, MemorySinkProvider, Sink, SinkProvider};
pub use transfer::{FileReceive, FileSend, OperationId, PeriodicSend, Transfer, TransferState};
pub use transport::{Characteristic, Transport, TransportEvent};
