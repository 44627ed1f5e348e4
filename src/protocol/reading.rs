//! Device reading decoded from a sensor-data envelope.
//!
//! Envelope layout:
//! ```text
//! 0        0x28 start marker
//! 1..3     packet length (BE)
//! 5..11    sensor serial ID
//! 13       battery percent
//! 14..16   firmware version (BE)
//! 16..18   hardware version (BE)
//! 18..362  embedded sensor payload
//! 362      0x29 end marker
//! ```

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::config::{
    BATTERY_OFFSET, FIRMWARE_OFFSET, HARDWARE_OFFSET, PACKET_END_MARKER, PACKET_LEN,
    PACKET_LENGTH_OFFSET, PACKET_START_MARKER, PAYLOAD_LEN, PAYLOAD_OFFSET, SERIAL_LEN,
    SERIAL_OFFSET,
};
use crate::error::{Error, MalformedPacket};
use crate::protocol::packet::DevicePacket;
use crate::protocol::sensor::SensorPayload;
use crate::protocol::serial::SerialNumber;
use crate::state::DeviceState;
use crate::Timestamp;

/// One complete transmitter reading.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceReading {
    pub raw: Vec<u8, PACKET_LEN>,
    pub packet_length: u16,
    pub serial: SerialNumber,
    pub firmware_version: u16,
    pub hardware_version: u16,
    pub battery_percent: u8,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub sensor_payload: SensorPayload,
}

impl DeviceReading {
    /// Decode a reporting packet.
    ///
    /// Only the kind is checked; bad framing markers still decode (see
    /// [`check_framing`](Self::check_framing)).
    pub fn from_packet(packet: &DevicePacket) -> Result<Self, Error> {
        if packet.kind != DeviceState::Reporting {
            return Err(Error::NotASensorReading(packet.kind));
        }
        let end_time = packet.end_time.unwrap_or(packet.start_time);
        Ok(Self::decode(&packet.payload, packet.start_time, end_time))
    }

    /// Decode any 363-byte envelope. Total: never fails.
    pub fn decode(data: &[u8; PACKET_LEN], start_time: Timestamp, end_time: Timestamp) -> Self {
        let serial = SerialNumber::decode(&array_at::<SERIAL_LEN>(data, SERIAL_OFFSET));
        let payload = array_at::<PAYLOAD_LEN>(data, PAYLOAD_OFFSET);

        let reading = Self {
            raw: Vec::from_slice(data).unwrap_or_default(),
            packet_length: be_u16(data, PACKET_LENGTH_OFFSET),
            serial: serial.clone(),
            firmware_version: be_u16(data, FIRMWARE_OFFSET),
            hardware_version: be_u16(data, HARDWARE_OFFSET),
            battery_percent: data[BATTERY_OFFSET],
            start_time,
            end_time,
            sensor_payload: SensorPayload::decode(&payload, serial, end_time),
        };

        if let Err(e) = reading.check_framing() {
            warn!("{}", e);
        }
        reading
    }

    /// Verify the start and end markers of the raw envelope.
    pub fn check_framing(&self) -> Result<(), MalformedPacket> {
        let first = self.raw.first().copied().unwrap_or(0);
        if first != PACKET_START_MARKER {
            return Err(MalformedPacket::MissingStart(first));
        }
        let last = self.raw.get(PACKET_LEN - 1).copied().unwrap_or(0);
        if last != PACKET_END_MARKER {
            return Err(MalformedPacket::MissingEnd(last));
        }
        Ok(())
    }

    /// Time between the first and last fragment of the envelope.
    pub fn capture_duration_ms(&self) -> u64 {
        self.end_time.millis_since(self.start_time)
    }
}

fn array_at<const N: usize>(data: &[u8], offset: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&data[offset..offset + N]);
    out
}

fn be_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}
