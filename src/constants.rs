// MIT License - Copyright (c) 2026 The codeless-dsps developers
// CodeLess / DSPS protocol engine

use uuid::Uuid;

/// CodeLess service and characteristics.
pub const CODELESS_SERVICE: Uuid = Uuid::from_u128(0x866d3b04_e674_40dc_9c05_b7f91bec6e83);
pub const CODELESS_INBOUND_COMMAND: Uuid = Uuid::from_u128(0x914f8fb9_e8cd_411d_b7d1_14594de45425);
pub const CODELESS_OUTBOUND_COMMAND: Uuid = Uuid::from_u128(0x3bb535aa_50b2_4fbe_aa09_6b06dc59a404);
pub const CODELESS_FLOW_CONTROL: Uuid = Uuid::from_u128(0xe2048b39_d4f9_4a45_9f25_1856c10d5639);

/// DSPS service and characteristics.
pub const DSPS_SERVICE: Uuid = Uuid::from_u128(0x0783b03e_8535_b5a0_7140_a304d2495cb7);
pub const DSPS_SERVER_TX: Uuid = Uuid::from_u128(0x0783b03e_8535_b5a0_7140_a304d2495cb8);
pub const DSPS_SERVER_RX: Uuid = Uuid::from_u128(0x0783b03e_8535_b5a0_7140_a304d2495cba);
pub const DSPS_FLOW_CONTROL: Uuid = Uuid::from_u128(0x0783b03e_8535_b5a0_7140_a304d2495cb9);

/// Default ATT MTU before any exchange.
pub const MTU_DEFAULT: u16 = 23;
/// ATT write header overhead subtracted from the MTU to get the usable payload.
pub const MTU_OVERHEAD: usize = 3;

/// DSPS flow control values.
pub const DSPS_XON: u8 = 0x01;
pub const DSPS_XOFF: u8 = 0x02;

/// Value notified on the CodeLess flow control characteristic when a response is ready.
pub const CODELESS_DATA_PENDING: u8 = 0x01;

/// Command prefixes. `+` after the prefix marks an extended command (`AT+IO`).
pub const PREFIX: &str = "AT";
pub const PREFIX_LOCAL: &str = "AT";
pub const PREFIX_REMOTE: &str = "ATr";
pub const EXTENDED_MARKER: char = '+';

/// Response tokens.
pub const OK: &str = "OK";
pub const ERROR: &str = "ERROR";
pub const ERROR_PREFIX: &str = "ERROR: ";

/// Error messages sent to, or matched from, the peer.
pub const INVALID_COMMAND: &str = "Invalid command";
pub const COMMAND_NOT_SUPPORTED: &str = "Command not supported";
pub const NO_ARGUMENTS: &str = "No arguments";
pub const WRONG_NUMBER_OF_ARGUMENTS: &str = "Wrong number of arguments";
pub const INVALID_ARGUMENTS: &str = "Invalid arguments";
pub const GATT_OPERATION_ERROR: &str = "Gatt operation error";
pub const COMMAND_NOT_ALLOWED_IN_BINARY_MODE: &str = "Command not allowed in binary mode";
pub const PEER_INVALID_COMMAND: &str = "INVALID COMMAND";
pub const DISCONNECTED: &str = "Disconnected";

/// BINESC defaults (ms).
pub const BINESC_TIME_PRIOR_DEFAULT: u16 = 1000;
pub const BINESC_TIME_AFTER_DEFAULT: u16 = 1000;

/// GPIO function range for IOCFG.
pub const GPIO_FUNCTION_MIN: i64 = 0;
pub const GPIO_FUNCTION_MAX: i64 = 28;
pub const GPIO_INVALID: i64 = -1;

/// Timer, stored command and memory slot indexes.
pub const TIMER_INDEX_MAX: i64 = 3;
pub const COMMAND_INDEX_MAX: i64 = 3;
pub const MEM_INDEX_MAX: i64 = 3;
pub const MEM_MAX_CHAR_COUNT: usize = 100;

pub const ADVERTISING_INTERVAL_MIN: i64 = 100;
pub const ADVERTISING_INTERVAL_MAX: i64 = 3000;

pub const SPI_MAX_BYTE_READ: i64 = 64;
pub const SPI_HEX_STRING_CHAR_SIZE_MIN: usize = 2;
pub const SPI_HEX_STRING_CHAR_SIZE_MAX: usize = 64;

pub const PWM_FREQUENCY_MIN: i64 = 1000;
pub const PWM_FREQUENCY_MAX: i64 = 500_000;
pub const PWM_DUTY_CYCLE_MIN: i64 = 0;
pub const PWM_DUTY_CYCLE_MAX: i64 = 100;
pub const PWM_DURATION_MIN: i64 = 100;
pub const PWM_DURATION_MAX: i64 = 10_000;

pub const BONDING_DATABASE_INDEX_MIN: i64 = 1;
pub const BONDING_DATABASE_INDEX_MAX: i64 = 5;
pub const BONDING_DATABASE_ALL_VALUES: i64 = 0xff;

pub const CONNECTION_INTERVAL_MIN: i64 = 6;
pub const CONNECTION_INTERVAL_MAX: i64 = 3200;
pub const SLAVE_LATENCY_MIN: i64 = 0;
pub const SLAVE_LATENCY_MAX: i64 = 500;
pub const SUPERVISION_TIMEOUT_MIN: i64 = 10;
pub const SUPERVISION_TIMEOUT_MAX: i64 = 3200;
pub const PARAMETER_UPDATE_ACTION_MAX: i64 = 3;

pub const MTU_MIN: i64 = 23;
pub const MTU_MAX: i64 = 512;

pub const DLE_PACKET_LENGTH_MIN: i64 = 27;
pub const DLE_PACKET_LENGTH_MAX: i64 = 251;

pub const EVENT_MIN: i64 = 1;
pub const EVENT_MAX: i64 = 4;

/// UART baud rates accepted by `AT+BAUD`.
pub const BAUD_RATES: &[&str] = &[
    "2400", "4800", "9600", "19200", "38400", "57600", "115200", "230400", "460800", "921600",
    "1000000",
];

/// GAP address type markers used by `AT+GAPCONNECT`.
pub const GAP_ADDRESS_TYPE_PUBLIC: &str = "P";
pub const GAP_ADDRESS_TYPE_RANDOM: &str = "R";
