// MIT License - Copyright (c) 2026 The codeless-dsps developers
// CodeLess / DSPS protocol engine

pub mod discovery;
pub mod loopback;

use std::fmt;

use uuid::Uuid;

use crate::constants::{
    CODELESS_FLOW_CONTROL, CODELESS_INBOUND_COMMAND, CODELESS_OUTBOUND_COMMAND, DSPS_FLOW_CONTROL,
    DSPS_SERVER_RX, DSPS_SERVER_TX,
};
use crate::error::Result;

/// The GATT characteristics the engine talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Characteristic {
    /// Command and response text written by us.
    CodelessInbound,
    /// Command and response text read from the peer.
    CodelessOutbound,
    /// Peer notifies `0x01` when outbound text is waiting.
    CodelessFlowControl,
    /// Binary data written by us.
    DspsServerRx,
    /// Binary data notified by the peer.
    DspsServerTx,
    /// Flow bytes in both directions.
    DspsFlowControl,
}

impl Characteristic {
    pub fn uuid(self) -> Uuid {
        match self {
            Characteristic::CodelessInbound => CODELESS_INBOUND_COMMAND,
            Characteristic::CodelessOutbound => CODELESS_OUTBOUND_COMMAND,
            Characteristic::CodelessFlowControl => CODELESS_FLOW_CONTROL,
            Characteristic::DspsServerRx => DSPS_SERVER_RX,
            Characteristic::DspsServerTx => DSPS_SERVER_TX,
            Characteristic::DspsFlowControl => DSPS_FLOW_CONTROL,
        }
    }

    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        [
            Characteristic::CodelessInbound,
            Characteristic::CodelessOutbound,
            Characteristic::CodelessFlowControl,
            Characteristic::DspsServerRx,
            Characteristic::DspsServerTx,
            Characteristic::DspsFlowControl,
        ]
        .into_iter()
        .find(|c| c.uuid() == uuid)
    }

    pub fn is_codeless(self) -> bool {
        matches!(
            self,
            Characteristic::CodelessInbound
                | Characteristic::CodelessOutbound
                | Characteristic::CodelessFlowControl
        )
    }
}

impl fmt::Display for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Completion or unsolicited signal from the transport.
///
/// Fed to [`Manager::handle`](crate::manager::Manager::handle) by whoever
/// owns the Bluetooth stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected { reason: Option<String> },
    ServicesDiscovered { codeless: bool, dsps: bool },
    WriteComplete { characteristic: Characteristic, success: bool },
    ReadComplete {
        characteristic: Characteristic,
        result: std::result::Result<Vec<u8>, String>,
    },
    NotifyEnableComplete { characteristic: Characteristic, success: bool },
    Notification { characteristic: Characteristic, data: Vec<u8> },
    MtuChanged { mtu: u16 },
}

/// Request side of a Bluetooth LE link.
///
/// Every call only issues the request; the outcome arrives later as a
/// [`TransportEvent`]. An `Err` means the request could not be issued at all.
pub trait Transport {
    fn connect(&mut self) -> Result<()>;

    fn disconnect(&mut self) -> Result<()>;

    fn discover_services(&mut self) -> Result<()>;

    fn write(&mut self, characteristic: Characteristic, data: &[u8]) -> Result<()>;

    fn read(&mut self, characteristic: Characteristic) -> Result<()>;

    fn set_notify(&mut self, characteristic: Characteristic, enable: bool) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_characteristic_uuid_lookup() {
        for c in [
            Characteristic::CodelessInbound,
            Characteristic::DspsServerTx,
            Characteristic::DspsFlowControl,
        ] {
            assert_eq!(Characteristic::from_uuid(c.uuid()), Some(c));
        }
        assert_eq!(Characteristic::from_uuid(Uuid::nil()), None);
        assert!(Characteristic::CodelessFlowControl.is_codeless());
        assert!(!Characteristic::DspsServerRx.is_codeless());
    }
}
