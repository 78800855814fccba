// MIT License - Copyright (c) 2026 The codeless-dsps developers
// CodeLess / DSPS protocol engine

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use super::args::ArgType;
use super::response::ResponseShape;
use crate::constants::{
    ADVERTISING_INTERVAL_MAX, ADVERTISING_INTERVAL_MIN, BAUD_RATES, COMMAND_INDEX_MAX,
    CONNECTION_INTERVAL_MAX, CONNECTION_INTERVAL_MIN, DLE_PACKET_LENGTH_MAX,
    DLE_PACKET_LENGTH_MIN, EVENT_MAX, EVENT_MIN, GPIO_FUNCTION_MAX, GPIO_FUNCTION_MIN,
    MEM_INDEX_MAX, MEM_MAX_CHAR_COUNT, MTU_MAX, MTU_MIN, PARAMETER_UPDATE_ACTION_MAX,
    PWM_DURATION_MAX, PWM_DURATION_MIN, PWM_DUTY_CYCLE_MAX, PWM_DUTY_CYCLE_MIN,
    PWM_FREQUENCY_MAX, PWM_FREQUENCY_MIN, SLAVE_LATENCY_MAX, SLAVE_LATENCY_MIN,
    SPI_HEX_STRING_CHAR_SIZE_MAX, SPI_HEX_STRING_CHAR_SIZE_MIN, SPI_MAX_BYTE_READ,
    SUPERVISION_TIMEOUT_MAX, SUPERVISION_TIMEOUT_MIN, TIMER_INDEX_MAX,
};

/// Every command the engine knows, plus `Custom` for unidentified text.
///
/// The discriminant indexes [`COMMAND_TABLE`], so the variant order and the
/// table order must match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// `AT` - ping.
    At,
    /// `ATI` - device information.
    DeviceInformation,
    /// `ATE` - UART echo.
    UartEcho,
    /// `ATZ` - software reset.
    Reset,
    /// `ATF` - error reporting.
    ErrorReporting,
    /// `ATR` - restore IO configuration.
    ResetIoConfig,
    /// `AT+BINREQ` - request binary mode.
    BinRequest,
    /// `AT+BINREQACK` - accept binary mode.
    BinRequestAck,
    /// `AT+BINREQEXIT` - request command mode.
    BinExit,
    /// `AT+BINREQEXITACK` - accept command mode.
    BinExitAck,
    BinResume,
    BinEscape,
    TimerStart,
    TimerStop,
    Cursor,
    Random,
    Battery,
    BluetoothAddress,
    Rssi,
    FlowControl,
    Sleep,
    IoConfig,
    IoStatus,
    AdcRead,
    I2cScan,
    I2cConfig,
    I2cRead,
    I2cWrite,
    Print,
    Memory,
    Pin,
    StoreCommand,
    PlayCommand,
    ShowCommands,
    AdvertisingStop,
    AdvertisingStart,
    AdvertisingData,
    AdvertisingResponse,
    Central,
    Peripheral,
    Broadcaster,
    GapStatus,
    GapScan,
    GapConnect,
    GapDisconnect,
    ConnectionParameters,
    MaxMtu,
    DataLengthEnable,
    HostSleep,
    SpiConfig,
    SpiWrite,
    SpiRead,
    SpiTransfer,
    Baud,
    PowerLevel,
    Pwm,
    EventConfig,
    BondingEntryClear,
    BondingEntryStatus,
    BondingEntryTransfer,
    EventHandler,
    Security,
    Heartbeat,
    /// Unidentified command, sent and received verbatim.
    Custom,
}

/// Parse/pack rules of one command kind.
#[derive(Debug)]
pub struct CommandSpec {
    pub kind: CommandKind,
    /// Text identifier after the prefix (`IO` in `AT+IO`).
    pub identifier: &'static str,
    /// Whether the identifier follows a `+`.
    pub extended: bool,
    pub name: &'static str,
    /// Accepted argument counts. The first `n` entries of `args` apply.
    pub counts: &'static [usize],
    pub args: &'static [ArgType],
    pub response: ResponseShape,
    /// Response lines are decoded as they arrive.
    pub partial: bool,
}

impl CommandSpec {
    pub fn requires_arguments(&self) -> bool {
        !self.counts.contains(&0)
    }

    pub fn accepts_count(&self, count: usize) -> bool {
        self.counts.contains(&count)
    }

    pub fn max_arguments(&self) -> usize {
        self.counts.iter().copied().max().unwrap_or(0)
    }
}

const fn int(min: i64, max: i64) -> ArgType {
    ArgType::Int { min, max }
}

const fn hex_int(min: i64, max: i64) -> ArgType {
    ArgType::HexInt { min, max }
}

const BOOL: ArgType = int(0, 1);
const GPIO: ArgType = int(0, 49);
const U16: ArgType = int(0, 0xffff);
const NONE: &[usize] = &[0];

macro_rules! spec {
    ($kind:ident, $id:expr, $ext:expr, $name:expr, $counts:expr, $args:expr, $resp:ident) => {
        spec!($kind, $id, $ext, $name, $counts, $args, $resp, false)
    };
    ($kind:ident, $id:expr, $ext:expr, $name:expr, $counts:expr, $args:expr, $resp:ident, $partial:expr) => {
        CommandSpec {
            kind: CommandKind::$kind,
            identifier: $id,
            extended: $ext,
            name: $name,
            counts: $counts,
            args: $args,
            response: ResponseShape::$resp,
            partial: $partial,
        }
    };
}

/// Kind-indexed parse/pack table.
pub static COMMAND_TABLE: [CommandSpec; 63] = [
    spec!(At, "", false, "AT", NONE, &[], None),
    spec!(DeviceInformation, "I", false, "Device information", NONE, &[], Text),
    spec!(UartEcho, "E", false, "UART echo", &[0, 1], &[BOOL], Int),
    spec!(Reset, "Z", false, "Reset", NONE, &[], None),
    spec!(ErrorReporting, "F", false, "Error reporting", &[0, 1], &[BOOL], Int),
    spec!(ResetIoConfig, "R", false, "Reset IO configuration", NONE, &[], None),
    spec!(BinRequest, "BINREQ", true, "Binary mode request", NONE, &[], None),
    spec!(BinRequestAck, "BINREQACK", true, "Binary mode accept", NONE, &[], None),
    spec!(BinExit, "BINREQEXIT", true, "Binary mode exit", NONE, &[], None),
    spec!(BinExitAck, "BINREQEXITACK", true, "Binary mode exit accept", NONE, &[], None),
    spec!(BinResume, "BINRESUME", true, "Binary mode resume", NONE, &[], None),
    spec!(
        BinEscape,
        "BINESC",
        true,
        "Binary escape sequence",
        &[0, 1, 3],
        &[int(0, 0x00ff_ffff), U16, U16],
        Ints
    ),
    spec!(
        TimerStart,
        "TMRSTART",
        true,
        "Timer start",
        &[3],
        &[int(0, TIMER_INDEX_MAX), int(0, COMMAND_INDEX_MAX), int(1, i32::MAX as i64)],
        None
    ),
    spec!(TimerStop, "TMRSTOP", true, "Timer stop", &[1], &[int(0, TIMER_INDEX_MAX)], None),
    spec!(Cursor, "CURSOR", true, "Time cursor", NONE, &[], None),
    spec!(Random, "RANDOM", true, "Random number", NONE, &[], Text),
    spec!(Battery, "BATT", true, "Battery level", NONE, &[], Int),
    spec!(BluetoothAddress, "BDADDR", true, "Bluetooth address", NONE, &[], Address),
    spec!(Rssi, "RSSI", true, "RSSI", NONE, &[], Int),
    spec!(
        FlowControl,
        "FLOWCONTROL",
        true,
        "UART flow control",
        &[0, 3],
        &[BOOL, GPIO, GPIO],
        Ints
    ),
    spec!(Sleep, "SLEEP", true, "Sleep", &[0, 1], &[BOOL], Int),
    spec!(
        IoConfig,
        "IOCFG",
        true,
        "IO configuration",
        &[0, 2, 3],
        &[GPIO, int(GPIO_FUNCTION_MIN, GPIO_FUNCTION_MAX), BOOL],
        Ints
    ),
    spec!(IoStatus, "IO", true, "IO status", &[1, 2], &[GPIO, BOOL], Int),
    spec!(AdcRead, "ADC", true, "ADC read", &[1], &[GPIO], Int),
    spec!(I2cScan, "I2CSCAN", true, "I2C scan", NONE, &[], Lines, true),
    spec!(
        I2cConfig,
        "I2CCFG",
        true,
        "I2C configuration",
        &[3],
        &[BOOL, int(100, 400), int(8, 16)],
        None
    ),
    spec!(
        I2cRead,
        "I2CREAD",
        true,
        "I2C read",
        &[2, 3],
        &[hex_int(0, 0x3ff), hex_int(0, 0xffff), int(1, 64)],
        Ints
    ),
    spec!(
        I2cWrite,
        "I2CWRITE",
        true,
        "I2C write",
        &[3],
        &[hex_int(0, 0x3ff), hex_int(0, 0xffff), hex_int(0, 0xff)],
        None
    ),
    spec!(Print, "PRINT", true, "Print", &[1], &[ArgType::Text { min: 1, max: 100 }], None),
    spec!(
        Memory,
        "MEM",
        true,
        "Memory slot",
        &[1, 2],
        &[int(0, MEM_INDEX_MAX), ArgType::Text { min: 0, max: MEM_MAX_CHAR_COUNT }],
        Text
    ),
    spec!(Pin, "PIN", true, "PIN code", &[0, 1], &[int(0, 999_999)], Int),
    spec!(
        StoreCommand,
        "CMDSTORE",
        true,
        "Store command",
        &[2],
        &[int(0, COMMAND_INDEX_MAX), ArgType::Text { min: 1, max: MEM_MAX_CHAR_COUNT }],
        None
    ),
    spec!(PlayCommand, "CMDPLAY", true, "Play command", &[1], &[int(0, COMMAND_INDEX_MAX)], None),
    spec!(
        ShowCommands,
        "CMD",
        true,
        "Stored commands",
        &[0, 1],
        &[int(0, COMMAND_INDEX_MAX)],
        Lines,
        true
    ),
    spec!(AdvertisingStop, "ADVSTOP", true, "Advertising stop", NONE, &[], None),
    spec!(
        AdvertisingStart,
        "ADVSTART",
        true,
        "Advertising start",
        &[0, 1],
        &[int(ADVERTISING_INTERVAL_MIN, ADVERTISING_INTERVAL_MAX)],
        None
    ),
    spec!(
        AdvertisingData,
        "ADVDATA",
        true,
        "Advertising data",
        &[0, 1],
        &[ArgType::HexBytes { max_bytes: 28 }],
        Text
    ),
    spec!(
        AdvertisingResponse,
        "ADVRESP",
        true,
        "Scan response data",
        &[0, 1],
        &[ArgType::HexBytes { max_bytes: 31 }],
        Text
    ),
    spec!(Central, "CENTRAL", true, "Central role", NONE, &[], None),
    spec!(Peripheral, "PERIPHERAL", true, "Peripheral role", NONE, &[], None),
    spec!(Broadcaster, "BROADCASTER", true, "Broadcaster role", NONE, &[], None),
    spec!(GapStatus, "GAPSTATUS", true, "GAP status", NONE, &[], Ints),
    spec!(GapScan, "GAPSCAN", true, "GAP scan", NONE, &[], Lines, true),
    spec!(
        GapConnect,
        "GAPCONNECT",
        true,
        "GAP connect",
        &[2],
        &[ArgType::Address, ArgType::AddressType],
        None
    ),
    spec!(GapDisconnect, "GAPDISCONNECT", true, "GAP disconnect", NONE, &[], None),
    spec!(
        ConnectionParameters,
        "CONPAR",
        true,
        "Connection parameters",
        &[0, 4],
        &[
            int(CONNECTION_INTERVAL_MIN, CONNECTION_INTERVAL_MAX),
            int(SLAVE_LATENCY_MIN, SLAVE_LATENCY_MAX),
            int(SUPERVISION_TIMEOUT_MIN, SUPERVISION_TIMEOUT_MAX),
            int(0, PARAMETER_UPDATE_ACTION_MAX),
        ],
        Ints
    ),
    spec!(MaxMtu, "MAXMTU", true, "Maximum MTU", &[0, 1], &[int(MTU_MIN, MTU_MAX)], Int),
    spec!(
        DataLengthEnable,
        "DLEEN",
        true,
        "Data length extension",
        &[0, 1, 3],
        &[
            BOOL,
            int(DLE_PACKET_LENGTH_MIN, DLE_PACKET_LENGTH_MAX),
            int(DLE_PACKET_LENGTH_MIN, DLE_PACKET_LENGTH_MAX),
        ],
        Ints
    ),
    spec!(
        HostSleep,
        "HOSTSLP",
        true,
        "Host sleep",
        &[0, 4],
        &[BOOL, int(0, 0xff), U16, int(0, 0xff)],
        Ints
    ),
    spec!(
        SpiConfig,
        "SPICFG",
        true,
        "SPI configuration",
        &[0, 3],
        &[int(0, 2), int(0, 3), int(8, 32)],
        Ints
    ),
    spec!(
        SpiWrite,
        "SPIWR",
        true,
        "SPI write",
        &[1],
        &[ArgType::HexString {
            min_chars: SPI_HEX_STRING_CHAR_SIZE_MIN,
            max_chars: SPI_HEX_STRING_CHAR_SIZE_MAX,
        }],
        None
    ),
    spec!(SpiRead, "SPIRD", true, "SPI read", &[1], &[int(1, SPI_MAX_BYTE_READ)], Text),
    spec!(
        SpiTransfer,
        "SPITR",
        true,
        "SPI transfer",
        &[1],
        &[ArgType::HexString {
            min_chars: SPI_HEX_STRING_CHAR_SIZE_MIN,
            max_chars: SPI_HEX_STRING_CHAR_SIZE_MAX,
        }],
        Text
    ),
    spec!(Baud, "BAUD", true, "UART baud rate", &[0, 1], &[ArgType::Choice(BAUD_RATES)], Int),
    spec!(PowerLevel, "PWRLVL", true, "Output power level", &[0, 1], &[int(1, 12)], Text),
    spec!(
        Pwm,
        "PWM",
        true,
        "PWM",
        &[0, 3],
        &[
            int(PWM_FREQUENCY_MIN, PWM_FREQUENCY_MAX),
            int(PWM_DUTY_CYCLE_MIN, PWM_DUTY_CYCLE_MAX),
            int(PWM_DURATION_MIN, PWM_DURATION_MAX),
        ],
        Ints
    ),
    spec!(
        EventConfig,
        "EVENT",
        true,
        "Event configuration",
        &[0, 2],
        &[int(EVENT_MIN, EVENT_MAX), BOOL],
        Lines,
        true
    ),
    spec!(BondingEntryClear, "CLRBNDE", true, "Clear bonding entry", &[1], &[ArgType::BondIndex], None),
    spec!(
        BondingEntryStatus,
        "CHGBNDP",
        true,
        "Bonding entry persistence",
        &[0, 2],
        &[ArgType::BondIndex, BOOL],
        Lines,
        true
    ),
    spec!(
        BondingEntryTransfer,
        "IEBNDE",
        true,
        "Bonding entry transfer",
        &[1, 2],
        &[
            int(1, 5),
            ArgType::HexString {
                min_chars: 146,
                max_chars: 146,
            },
        ],
        Bonding
    ),
    spec!(
        EventHandler,
        "HNDL",
        true,
        "Event handler",
        &[0, 1, 2],
        &[int(EVENT_MIN, EVENT_MAX), ArgType::Text { min: 0, max: MEM_MAX_CHAR_COUNT }],
        Lines,
        true
    ),
    spec!(Security, "SEC", true, "Security mode", &[0, 1], &[int(0, 3)], Int),
    spec!(Heartbeat, "HRTBT", true, "Heartbeat", &[0, 1], &[BOOL], Int),
];

static CUSTOM_SPEC: CommandSpec = spec!(Custom, "", false, "Custom", &[], &[], Lines);

fn registry() -> &'static HashMap<&'static str, CommandKind> {
    static REGISTRY: OnceLock<HashMap<&'static str, CommandKind>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        COMMAND_TABLE
            .iter()
            .map(|spec| (spec.identifier, spec.kind))
            .collect()
    })
}

impl CommandKind {
    /// Look up a kind by its text identifier (upper case, without prefix or `+`).
    pub fn from_identifier(identifier: &str) -> Option<CommandKind> {
        registry().get(identifier).copied()
    }

    pub fn spec(self) -> &'static CommandSpec {
        match self {
            CommandKind::Custom => &CUSTOM_SPEC,
            kind => &COMMAND_TABLE[kind as usize],
        }
    }

    pub fn identifier(self) -> &'static str {
        self.spec().identifier
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    /// The four commands of the binary mode handshake.
    pub fn is_mode_command(self) -> bool {
        matches!(
            self,
            CommandKind::BinRequest
                | CommandKind::BinRequestAck
                | CommandKind::BinExit
                | CommandKind::BinExitAck
        )
    }

    /// All known kinds, in table order.
    pub fn all() -> impl Iterator<Item = CommandKind> {
        COMMAND_TABLE.iter().map(|spec| spec.kind)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let spec = self.spec();
        if *self == CommandKind::Custom {
            write!(f, "Custom")
        } else if spec.extended {
            write!(f, "AT+{}", spec.identifier)
        } else {
            write!(f, "AT{}", spec.identifier)
        }
    }
}
