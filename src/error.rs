//! Error types for miaolink.
//!
//! No `alloc` - every variant carries only fixed-size data.
//! Implements `defmt::Format` when the `defmt` feature is enabled.

use thiserror::Error;

use crate::state::DeviceState;

/// Failure reported by the BLE transport collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// GATT service/characteristic discovery failed.
    #[error("GATT discovery failed")]
    Discovery,
    /// Notification subscription could not be set up.
    #[error("notification subscribe failed")]
    Subscribe,
    /// A descriptor or characteristic write failed.
    #[error("GATT write failed")]
    Write,
    /// The link went away.
    #[error("link disconnected")]
    Disconnected,
    /// Stack-specific raw error code.
    #[error("transport error code {0:#x}")]
    Raw(u32),
}

/// Why a connected peripheral could not be attached as a transmitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AttachError {
    #[error("service discovery failed: {0}")]
    Discovery(TransportError),
    #[error("data service missing")]
    ServiceMissing,
    #[error("RX characteristic missing")]
    RxCharacteristicMissing,
    #[error("TX characteristic missing")]
    TxCharacteristicMissing,
    #[error("TX client configuration descriptor missing")]
    CccdMissing,
}

/// Which framing marker of an envelope packet was wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MalformedPacket {
    #[error("start of packet missing (found {0:#04x})")]
    MissingStart(u8),
    #[error("end of packet missing (found {0:#04x})")]
    MissingEnd(u8),
}

/// Top-level error type for session operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The transport failed outside subscribe/accept. Fatal to the session.
    #[error("transport failure: {0}")]
    Transport(TransportError),

    /// Enabling notifications or waking the device failed.
    #[error("subscription failed: {0}")]
    SubscriptionFailed(TransportError),

    /// One of the new-sensor acknowledgment writes failed.
    #[error("accepting new sensor failed: {0}")]
    AcceptFailed(TransportError),

    /// `subscribe` called on a session that is not idle.
    #[error("session already subscribed")]
    AlreadySubscribed,

    /// The fragment source closed before a packet was complete.
    #[error("fragment channel closed")]
    ChannelClosed,

    /// A reading was required but the device reported something else.
    #[error("not a sensor reading (device state {0:?})")]
    NotASensorReading(DeviceState),

    /// Envelope framing markers were wrong (strict framing only).
    #[error("malformed packet: {0}")]
    MalformedPacket(MalformedPacket),
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport(e)
    }
}

impl From<MalformedPacket> for Error {
    fn from(e: MalformedPacket) -> Self {
        Error::MalformedPacket(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::SubscriptionFailed(TransportError::Write);
        assert_eq!(err.to_string(), "subscription failed: GATT write failed");

        let err = Error::NotASensorReading(DeviceState::NoSensor);
        assert_eq!(err.to_string(), "not a sensor reading (device state NoSensor)");

        let err = Error::from(MalformedPacket::MissingEnd(0x00));
        assert_eq!(err.to_string(), "malformed packet: end of packet missing (found 0x00)");

        let err = AttachError::Discovery(TransportError::Raw(0x3101));
        assert_eq!(
            err.to_string(),
            "service discovery failed: transport error code 0x3101"
        );
    }

    #[test]
    fn transport_error_converts_to_transport_failure() {
        let err: Error = TransportError::Disconnected.into();
        assert_eq!(err, Error::Transport(TransportError::Disconnected));
    }
}
