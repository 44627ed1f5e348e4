//! Device state machine.
//!
//! Two axes are tracked per session:
//!
//! - **Link** - `Idle -> Subscribed -> Receiving`. `Receiving` is a
//!   momentary marker set while a packet is streaming in and cleared
//!   back to `Subscribed` once it is complete.
//! - **Device** - what the transmitter last reported, mirrored from the
//!   kind of the most recent packet.

use serde::{Deserialize, Serialize};

use crate::config::{
    EMIT_INTERVAL_MINUTES, NEW_SENSOR_MARKER, NO_SENSOR_MARKER, PACKET_START_MARKER,
};
use crate::Timestamp;

/// Connection-level state of a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    #[default]
    Idle,
    Subscribed,
    Receiving,
}

/// Application-level state reported by the transmitter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceState {
    /// Nothing classified yet, or an unrecognised first byte.
    #[default]
    Unknown,
    /// Streaming a full sensor-data envelope.
    Reporting,
    /// No sensor attached.
    NoSensor,
    /// A sensor is attached but has not been accepted.
    NewSensorPending,
}

impl DeviceState {
    /// Classify a packet from its first byte.
    pub const fn from_marker(byte: u8) -> Self {
        match byte {
            PACKET_START_MARKER => DeviceState::Reporting,
            NO_SENSOR_MARKER => DeviceState::NoSensor,
            NEW_SENSOR_MARKER => DeviceState::NewSensorPending,
            _ => DeviceState::Unknown,
        }
    }

    /// `true` for kinds that end with their first fragment.
    pub const fn is_short(self) -> bool {
        matches!(self, DeviceState::NoSensor | DeviceState::NewSensorPending)
    }
}

/// Per-session mutable state, owned by the session task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionState {
    pub link: LinkState,
    pub device: DeviceState,
    /// Arrival of the first fragment of the latest notified packet.
    pub last_emit: Option<Timestamp>,
    /// Advisory: when the device is expected to notify next.
    pub next_emit: Option<Timestamp>,
    /// Minutes between device notifications; zero until subscribed.
    pub emit_interval_minutes: u32,
}

impl ConnectionState {
    pub const fn new() -> Self {
        Self {
            link: LinkState::Idle,
            device: DeviceState::Unknown,
            last_emit: None,
            next_emit: None,
            emit_interval_minutes: 0,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.link == LinkState::Idle
    }

    /// Record a completed subscription.
    pub fn mark_subscribed(&mut self) {
        self.link = LinkState::Subscribed;
        self.emit_interval_minutes = EMIT_INTERVAL_MINUTES;
    }

    /// A fragment arrived. Only the first one after a subscribed phase
    /// flips the link to `Receiving` and stamps `last_emit`.
    pub fn on_fragment(&mut self, arrival: Timestamp) {
        if self.link == LinkState::Subscribed {
            self.link = LinkState::Receiving;
            self.last_emit = Some(arrival);
        }
    }

    /// The first byte of a packet has been classified.
    pub fn on_classified(&mut self, kind: DeviceState) {
        self.device = kind;
    }

    /// A packet finished reassembling.
    pub fn on_packet_complete(&mut self) {
        if self.link == LinkState::Receiving {
            self.link = LinkState::Subscribed;
        }
    }

    /// Advance the advisory emission schedule from `last_emit`.
    pub fn schedule_next_emit(&mut self) {
        self.next_emit = self
            .last_emit
            .map(|last| last.add_minutes(self.emit_interval_minutes));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_classify() {
        assert_eq!(DeviceState::from_marker(0x28), DeviceState::Reporting);
        assert_eq!(DeviceState::from_marker(0x34), DeviceState::NoSensor);
        assert_eq!(DeviceState::from_marker(0x32), DeviceState::NewSensorPending);
        assert_eq!(DeviceState::from_marker(0x00), DeviceState::Unknown);
        assert_eq!(DeviceState::from_marker(0x29), DeviceState::Unknown);
        assert_eq!(DeviceState::from_marker(0xFF), DeviceState::Unknown);
    }

    #[test]
    fn short_kinds() {
        assert!(DeviceState::NoSensor.is_short());
        assert!(DeviceState::NewSensorPending.is_short());
        assert!(!DeviceState::Reporting.is_short());
        assert!(!DeviceState::Unknown.is_short());
    }

    #[test]
    fn subscribe_fixes_interval() {
        let mut state = ConnectionState::new();
        assert!(state.is_idle());
        assert_eq!(state.emit_interval_minutes, 0);

        state.mark_subscribed();
        assert_eq!(state.link, LinkState::Subscribed);
        assert_eq!(state.emit_interval_minutes, 5);
    }

    #[test]
    fn only_first_fragment_stamps_last_emit() {
        let mut state = ConnectionState::new();
        state.mark_subscribed();

        state.on_fragment(Timestamp::from_millis(1_000));
        assert_eq!(state.link, LinkState::Receiving);
        assert_eq!(state.last_emit, Some(Timestamp::from_millis(1_000)));

        state.on_fragment(Timestamp::from_millis(1_050));
        assert_eq!(state.last_emit, Some(Timestamp::from_millis(1_000)));

        state.on_packet_complete();
        assert_eq!(state.link, LinkState::Subscribed);

        state.on_fragment(Timestamp::from_millis(301_000));
        assert_eq!(state.last_emit, Some(Timestamp::from_millis(301_000)));
    }

    #[test]
    fn idle_fragments_do_not_stamp() {
        let mut state = ConnectionState::new();
        state.on_fragment(Timestamp::from_millis(5));
        assert_eq!(state.link, LinkState::Idle);
        assert_eq!(state.last_emit, None);
    }

    #[test]
    fn next_emit_follows_last_emit() {
        let mut state = ConnectionState::new();
        state.schedule_next_emit();
        assert_eq!(state.next_emit, None);

        state.mark_subscribed();
        state.on_fragment(Timestamp::from_millis(60_000));
        state.schedule_next_emit();
        assert_eq!(state.next_emit, Some(Timestamp::from_millis(360_000)));
    }
}
