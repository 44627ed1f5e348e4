//! Protocol constants and session configuration.
//!
//! Everything the transmitter protocol fixes (UUIDs, envelope layout,
//! command bytes, timing) lives here so it can be tuned in one place.

use uuid::Uuid;

// BLE profile

/// Transmitter data service (Nordic UART style).
pub const DATA_SERVICE_UUID: Uuid = Uuid::from_u128(0x6E400001_B5A3_F393_E0A9_E50E24DCCA9E);

/// RX characteristic - host writes commands here.
pub const RX_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x6E400002_B5A3_F393_E0A9_E50E24DCCA9E);

/// TX characteristic - device notifies packet fragments here.
pub const TX_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x6E400003_B5A3_F393_E0A9_E50E24DCCA9E);

/// Client Characteristic Configuration Descriptor (0x2902).
pub const CCCD_UUID: Uuid = Uuid::from_u128(0x00002902_0000_1000_8000_00805F9B34FB);

/// Largest notification payload we buffer (ATT MTU 247 minus 3 header bytes).
pub const MAX_FRAGMENT_LEN: usize = 244;

/// Depth of the fragment hand-off channel.
///
/// Must hold one whole envelope at the minimum ATT MTU (19 x 20-byte
/// fragments) plus the close marker: a full channel drops notifications
/// and the next envelope comes out byte-shifted.
pub const FRAGMENT_CHANNEL_DEPTH: usize = 32;

const _: () = assert!(FRAGMENT_CHANNEL_DEPTH > PACKET_LEN.div_ceil(20));

// Commands

/// CCCD value that enables notifications.
pub const ENABLE_NOTIFICATIONS: [u8; 2] = [0x01, 0x00];

/// Wakes the device and asks it to start streaming a packet.
pub const WAKE_COMMAND: [u8; 1] = [0xF0];

/// Acknowledges a newly inserted sensor.
pub const ACCEPT_SENSOR_COMMAND: [u8; 2] = [0xD3, 0xD1];

/// Responses the device sends after an accept; dropped unread.
pub const ACCEPT_FLUSH_FRAGMENTS: usize = 2;

// Envelope layout (363 bytes)

/// Size of a reassembled envelope packet.
pub const PACKET_LEN: usize = 363;

/// First byte of a sensor-data envelope.
pub const PACKET_START_MARKER: u8 = 0x28;

/// Last byte of a sensor-data envelope.
pub const PACKET_END_MARKER: u8 = 0x29;

/// First byte of a "no sensor attached" notification.
pub const NO_SENSOR_MARKER: u8 = 0x34;

/// First byte of a "new sensor awaiting acceptance" notification.
pub const NEW_SENSOR_MARKER: u8 = 0x32;

pub const PACKET_LENGTH_OFFSET: usize = 1;
pub const SERIAL_OFFSET: usize = 5;
pub const SERIAL_LEN: usize = 6;
pub const BATTERY_OFFSET: usize = 13;
pub const FIRMWARE_OFFSET: usize = 14;
pub const HARDWARE_OFFSET: usize = 16;

/// Embedded sensor payload occupies envelope bytes `18..362`.
pub const PAYLOAD_OFFSET: usize = 18;
pub const PAYLOAD_LEN: usize = 344;

// Sensor payload layout (344 bytes)

/// Little-endian CRC words stored by the sensor (not verified).
pub const CRC_OFFSETS: [usize; 3] = [0, 24, 320];

pub const STATUS_OFFSET: usize = 4;
pub const TREND_INDEX_OFFSET: usize = 26;
pub const HISTORY_INDEX_OFFSET: usize = 27;
pub const MINUTES_OFFSET: usize = 335;

pub const TREND_OFFSET: usize = 46;
pub const TREND_ENTRIES: usize = 16;
pub const HISTORY_OFFSET: usize = 142;
pub const HISTORY_ENTRIES: usize = 32;

/// Size of one raw glucose sample.
pub const SAMPLE_LEN: usize = 6;

/// Minutes of sensor age per unit of the payload minute counter.
///
/// Calibration constant: needs confirmation against real hardware.
pub const SENSOR_AGE_MINUTES_PER_COUNT: u32 = 5;

// Timing

/// Emission interval negotiated on subscribe (the device only knows one).
pub const EMIT_INTERVAL_MINUTES: u32 = 5;

/// Runtime options for a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SessionConfig {
    /// Acknowledge a newly paired sensor automatically while emitting.
    pub auto_accept_new_sensor: bool,
    /// Report a missing start/end marker as `Error::MalformedPacket`
    /// instead of only logging it.
    pub strict_framing: bool,
}
