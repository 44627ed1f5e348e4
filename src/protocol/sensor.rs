//! Embedded sensor payload (344 bytes).
//!
//! Layout of the fields we decode:
//! ```text
//! 0..2     CRC word (header)
//! 4        sensor status
//! 24..26   CRC word (body)
//! 26       trend write index   (ring of 16)
//! 27       history write index (ring of 32)
//! 46..142  trend ring,   16 x 6-byte samples
//! 142..334 history ring, 32 x 6-byte samples
//! 320..322 CRC word (footer)
//! 335..337 minute counter (LE)
//! ```
//!
//! The device overwrites both rings circularly; the write index is the
//! only anchor, so samples are re-ordered most-recent-first on decode.
//! Decoding is total: any 344-byte buffer decodes.

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::config::{
    CRC_OFFSETS, HISTORY_ENTRIES, HISTORY_INDEX_OFFSET, HISTORY_OFFSET, MINUTES_OFFSET,
    PAYLOAD_LEN, SAMPLE_LEN, SENSOR_AGE_MINUTES_PER_COUNT, STATUS_OFFSET, TREND_ENTRIES,
    TREND_INDEX_OFFSET, TREND_OFFSET,
};
use crate::protocol::serial::SerialNumber;
use crate::Timestamp;

/// One raw 6-byte glucose sample, kept opaque.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SensorReading {
    pub data: [u8; SAMPLE_LEN],
}

impl SensorReading {
    /// The three little-endian sub-values, unscaled.
    pub fn raw_values(&self) -> [u16; 3] {
        let d = &self.data;
        [
            u16::from_le_bytes([d[0], d[1]]),
            u16::from_le_bytes([d[2], d[3]]),
            u16::from_le_bytes([d[4], d[5]]),
        ]
    }
}

/// Sensor lifecycle state as stored in the payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorStatus {
    #[default]
    Unknown,
    /// Powered but not started.
    NotStarted,
    /// Warm-up (first 12 h).
    Starting,
    /// Normal operation (12 h - 15 d).
    Ready,
    /// Expired; last reading repeated (15 d - 15 d 12 h).
    Expired,
    /// End of life.
    Shutdown,
    Failed,
}

impl From<u8> for SensorStatus {
    fn from(code: u8) -> Self {
        match code {
            0x01 => SensorStatus::NotStarted,
            0x02 => SensorStatus::Starting,
            0x03 => SensorStatus::Ready,
            0x04 => SensorStatus::Expired,
            0x05 => SensorStatus::Shutdown,
            0x06 => SensorStatus::Failed,
            _ => SensorStatus::Unknown,
        }
    }
}

/// Decoded embedded payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorPayload {
    pub raw: Vec<u8, PAYLOAD_LEN>,
    pub serial: SerialNumber,
    pub status: SensorStatus,
    /// Most recent first.
    pub trend: [SensorReading; TREND_ENTRIES],
    /// Most recent first.
    pub history: [SensorReading; HISTORY_ENTRIES],
    pub trend_write_index: u8,
    pub history_write_index: u8,
    pub minutes_elapsed: u16,
    /// Minutes since sensor start (`minutes_elapsed` x scale).
    pub sensor_age_minutes: u32,
    pub sensor_start_time: Timestamp,
    pub capture_time: Timestamp,
    /// Stored as sent; never verified.
    pub crc_fields: [u16; 3],
}

impl SensorPayload {
    /// Decode a payload captured at `capture_time`.
    pub fn decode(raw: &[u8; PAYLOAD_LEN], serial: SerialNumber, capture_time: Timestamp) -> Self {
        let crc_fields = CRC_OFFSETS.map(|offset| le_u16(raw, offset));
        let minutes_elapsed = le_u16(raw, MINUTES_OFFSET);
        let sensor_age_minutes = sensor_age_minutes(minutes_elapsed);
        let trend_write_index = raw[TREND_INDEX_OFFSET];
        let history_write_index = raw[HISTORY_INDEX_OFFSET];

        Self {
            // Capacity equals the input length.
            raw: Vec::from_slice(raw).unwrap_or_default(),
            serial,
            status: SensorStatus::from(raw[STATUS_OFFSET]),
            trend: ring_most_recent_first(raw, TREND_OFFSET, trend_write_index),
            history: ring_most_recent_first(raw, HISTORY_OFFSET, history_write_index),
            trend_write_index,
            history_write_index,
            minutes_elapsed,
            sensor_age_minutes,
            sensor_start_time: capture_time.sub_minutes(sensor_age_minutes),
            capture_time,
            crc_fields,
        }
    }

    /// Sensor age in whole days.
    pub fn sensor_age_days(&self) -> u32 {
        self.sensor_age_minutes / (24 * 60)
    }
}

/// Sensor age implied by the payload minute counter.
pub const fn sensor_age_minutes(minutes_elapsed: u16) -> u32 {
    minutes_elapsed as u32 * SENSOR_AGE_MINUTES_PER_COUNT
}

/// Ring slot holding the `nth` most recent sample, given the device's
/// write index (the slot it will write next).
pub const fn ring_slot(write_index: u8, nth: usize, entries: usize) -> usize {
    (write_index as usize + entries - 1 - nth) % entries
}

fn ring_most_recent_first<const N: usize>(
    raw: &[u8; PAYLOAD_LEN],
    base: usize,
    write_index: u8,
) -> [SensorReading; N] {
    core::array::from_fn(|nth| {
        let start = base + ring_slot(write_index, nth, N) * SAMPLE_LEN;
        let mut data = [0u8; SAMPLE_LEN];
        data.copy_from_slice(&raw[start..start + SAMPLE_LEN]);
        SensorReading { data }
    })
}

fn le_u16(raw: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([raw[offset], raw[offset + 1]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serial() -> SerialNumber {
        SerialNumber::decode(&[0x00, 0x00, 0x03, 0x00, 0x00, 0x01])
    }

    /// Payload whose samples encode their own slot number so ordering
    /// can be read back.
    fn tagged_payload(trend_index: u8, history_index: u8) -> [u8; PAYLOAD_LEN] {
        let mut raw = [0u8; PAYLOAD_LEN];
        for slot in 0..TREND_ENTRIES {
            let start = TREND_OFFSET + slot * SAMPLE_LEN;
            raw[start..start + SAMPLE_LEN].fill(slot as u8);
        }
        for slot in 0..HISTORY_ENTRIES {
            let start = HISTORY_OFFSET + slot * SAMPLE_LEN;
            raw[start..start + SAMPLE_LEN].fill(0x80 | slot as u8);
        }
        raw[TREND_INDEX_OFFSET] = trend_index;
        raw[HISTORY_INDEX_OFFSET] = history_index;
        raw
    }

    #[test]
    fn sensor_age_uses_five_minute_counts() {
        assert_eq!(sensor_age_minutes(12), 60);

        let mut raw = [0u8; PAYLOAD_LEN];
        raw[MINUTES_OFFSET..MINUTES_OFFSET + 2].copy_from_slice(&12u16.to_le_bytes());
        let capture = Timestamp::from_millis(10 * 3_600_000);
        let payload = SensorPayload::decode(&raw, serial(), capture);

        assert_eq!(payload.minutes_elapsed, 12);
        assert_eq!(payload.sensor_age_minutes, 60);
        assert_eq!(payload.sensor_start_time, Timestamp::from_millis(9 * 3_600_000));
        assert_eq!(payload.capture_time, capture);
    }

    #[test]
    fn sensor_age_does_not_overflow() {
        assert_eq!(sensor_age_minutes(u16::MAX), 65_535 * 5);
    }

    #[test]
    fn trend_and_history_most_recent_first() {
        let payload = SensorPayload::decode(&tagged_payload(5, 20), serial(), Timestamp::default());

        assert_eq!(payload.trend[0].data, [4; 6]);
        assert_eq!(payload.trend[1].data, [3; 6]);
        assert_eq!(payload.trend[4].data, [0; 6]);
        assert_eq!(payload.trend[5].data, [15; 6]);
        assert_eq!(payload.trend[15].data, [5; 6]);

        assert_eq!(payload.history[0].data, [0x80 | 19; 6]);
        assert_eq!(payload.history[19].data, [0x80; 6]);
        assert_eq!(payload.history[20].data, [0x80 | 31; 6]);
        assert_eq!(payload.history[31].data, [0x80 | 20; 6]);
    }

    #[test]
    fn write_index_zero_wraps_to_last_slot() {
        let payload = SensorPayload::decode(&tagged_payload(0, 0), serial(), Timestamp::default());
        assert_eq!(payload.trend[0].data, [15; 6]);
        assert_eq!(payload.history[0].data, [0x80 | 31; 6]);
    }

    #[test]
    fn newest_trend_matches_bytes_before_write_cursor() {
        for index in 0..TREND_ENTRIES as u8 {
            let raw = tagged_payload(index, 0);
            let payload = SensorPayload::decode(&raw, serial(), Timestamp::default());
            let slot = (usize::from(index) + TREND_ENTRIES - 1) % TREND_ENTRIES;
            let start = TREND_OFFSET + slot * SAMPLE_LEN;
            assert_eq!(&payload.trend[0].data[..], &raw[start..start + SAMPLE_LEN]);
        }
    }

    #[test]
    fn out_of_range_write_index_stays_in_ring() {
        for index in [16u8, 31, 32, 200, 255] {
            for nth in 0..HISTORY_ENTRIES {
                assert!(ring_slot(index, nth, HISTORY_ENTRIES) < HISTORY_ENTRIES);
            }
            for nth in 0..TREND_ENTRIES {
                assert!(ring_slot(index, nth, TREND_ENTRIES) < TREND_ENTRIES);
            }
        }
        let payload = SensorPayload::decode(&tagged_payload(255, 255), serial(), Timestamp::default());
        assert_eq!(payload.trend.len(), TREND_ENTRIES);
        assert_eq!(payload.history.len(), HISTORY_ENTRIES);
        assert_eq!(payload.trend_write_index, 255);
    }

    #[test]
    fn crc_fields_are_read_not_checked() {
        let mut raw = [0u8; PAYLOAD_LEN];
        raw[0..2].copy_from_slice(&0xBEEFu16.to_le_bytes());
        raw[24..26].copy_from_slice(&0x1234u16.to_le_bytes());
        raw[320..322].copy_from_slice(&0xA55Au16.to_le_bytes());
        let payload = SensorPayload::decode(&raw, serial(), Timestamp::default());
        assert_eq!(payload.crc_fields, [0xBEEF, 0x1234, 0xA55A]);
    }

    #[test]
    fn status_byte() {
        let mut raw = [0u8; PAYLOAD_LEN];
        raw[STATUS_OFFSET] = 0x03;
        let payload = SensorPayload::decode(&raw, serial(), Timestamp::default());
        assert_eq!(payload.status, SensorStatus::Ready);
        assert_eq!(SensorStatus::from(0x42), SensorStatus::Unknown);
    }

    #[test]
    fn sample_sub_values() {
        let reading = SensorReading {
            data: [0x34, 0x12, 0xCD, 0xAB, 0x01, 0x00],
        };
        assert_eq!(reading.raw_values(), [0x1234, 0xABCD, 0x0001]);
    }

    #[test]
    fn age_in_days() {
        let mut raw = [0u8; PAYLOAD_LEN];
        // 2 days = 2880 minutes = 576 counts
        raw[MINUTES_OFFSET..MINUTES_OFFSET + 2].copy_from_slice(&576u16.to_le_bytes());
        let payload = SensorPayload::decode(&raw, serial(), Timestamp::from_millis(u64::MAX));
        assert_eq!(payload.sensor_age_days(), 2);
    }
}
