//! Envelope packet reassembly.
//!
//! The device streams a 363-byte envelope as a run of BLE notifications.
//! The first byte tells us what we are receiving:
//!
//! ```text
//! 0x28  sensor data  - keep collecting until 363 bytes
//! 0x34  no sensor    - single short notification, done
//! 0x32  new sensor   - single short notification, done
//! else  unknown      - keep collecting until 363 bytes
//! ```
//!
//! The kind is fixed as soon as byte 0 lands and never revisited.

use crate::ble::FragmentSource;
use crate::config::PACKET_LEN;
use crate::error::Error;
use crate::state::{ConnectionState, DeviceState};
use crate::Timestamp;

/// One reassembled envelope.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DevicePacket {
    pub kind: DeviceState,
    pub payload: [u8; PACKET_LEN],
    /// Bytes actually received (`PACKET_LEN` for a full envelope).
    pub len: usize,
    pub start_time: Timestamp,
    /// Arrival of the fragment that completed the buffer.
    pub end_time: Option<Timestamp>,
}

impl DevicePacket {
    fn empty() -> Self {
        Self {
            kind: DeviceState::Unknown,
            payload: [0; PACKET_LEN],
            len: 0,
            start_time: Timestamp::default(),
            end_time: None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.len == PACKET_LEN
    }

    /// Bytes received so far.
    pub fn received(&self) -> &[u8] {
        &self.payload[..self.len]
    }
}

/// Incremental reassembler. Feed it fragments until it reports done.
#[derive(Clone, Debug)]
pub struct Reassembler {
    packet: DevicePacket,
    started: bool,
}

/// Outcome of feeding one fragment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Progress {
    NeedMore,
    Done,
}

impl Reassembler {
    pub fn new() -> Self {
        Self {
            packet: DevicePacket::empty(),
            started: false,
        }
    }

    /// Kind classified so far.
    pub fn kind(&self) -> DeviceState {
        self.packet.kind
    }

    pub fn offset(&self) -> usize {
        self.packet.len
    }

    /// Copy one fragment into the envelope buffer.
    pub fn feed(&mut self, bytes: &[u8], arrival: Timestamp) -> Progress {
        if !self.started {
            self.started = true;
            self.packet.start_time = arrival;
        }

        if bytes.is_empty() {
            debug!("zero-length fragment ignored");
            return Progress::NeedMore;
        }

        let offset = self.packet.len;
        let copied = bytes.len().min(PACKET_LEN - offset);
        if copied < bytes.len() {
            warn!(
                "fragment overruns envelope - {} of {} bytes used",
                copied,
                bytes.len()
            );
        }
        self.packet.payload[offset..offset + copied].copy_from_slice(&bytes[..copied]);
        self.packet.len += copied;

        if offset == 0 {
            self.packet.kind = DeviceState::from_marker(self.packet.payload[0]);
            debug!("packet kind {:?}", self.packet.kind);
            if self.packet.kind.is_short() {
                return Progress::Done;
            }
        }

        if self.packet.len == PACKET_LEN {
            self.packet.end_time = Some(arrival);
            debug!("envelope complete ({} bytes)", self.packet.len);
            return Progress::Done;
        }

        Progress::NeedMore
    }

    pub fn finish(self) -> DevicePacket {
        self.packet
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Drain `source` until one packet is complete, keeping `state` in step.
///
/// Fails with [`Error::ChannelClosed`] if the source closes first.
pub async fn reassemble<S: FragmentSource>(
    source: &mut S,
    state: &mut ConnectionState,
) -> Result<DevicePacket, Error> {
    let mut reassembler = Reassembler::new();
    loop {
        let Some(fragment) = source.next_fragment().await else {
            warn!(
                "fragment source closed after {} bytes",
                reassembler.offset()
            );
            return Err(Error::ChannelClosed);
        };

        state.on_fragment(fragment.arrival);
        let was_unclassified = reassembler.offset() == 0;
        let progress = reassembler.feed(&fragment.bytes, fragment.arrival);
        if was_unclassified && reassembler.offset() > 0 {
            state.on_classified(reassembler.kind());
        }

        if progress == Progress::Done {
            state.on_packet_complete();
            return Ok(reassembler.finish());
        }
    }
}
