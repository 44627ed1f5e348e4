//! Bluetooth Low Energy seams.
//!
//! The driver does not own the radio. A platform stack implements
//! [`Transport`] for GATT discovery and writes, and pushes TX
//! notifications into a [`channel::FragmentChannel`], whose receiving end
//! is the [`FragmentSource`] the reassembler drains:
//!
//! 1. **Transport** - discovery, subscribe, descriptor/characteristic writes.
//! 2. **Fragment channel** - bounded, ordered hand-off with an explicit
//!    close signal for link loss.
//! 3. **NUS client** (`embedded` feature) - nrf-softdevice implementation
//!    of both.

pub mod channel;
#[cfg(feature = "embedded")]
pub mod nus_client;

use heapless::Vec;
use uuid::Uuid;

use crate::config::{
    CCCD_UUID, DATA_SERVICE_UUID, MAX_FRAGMENT_LEN, RX_CHARACTERISTIC_UUID, TX_CHARACTERISTIC_UUID,
};
use crate::error::{AttachError, TransportError};
use crate::Timestamp;

/// Maximum services reported by one discovery pass.
pub const MAX_SERVICES: usize = 8;
/// Maximum characteristics tracked per service.
pub const MAX_CHARACTERISTICS: usize = 8;
/// Maximum descriptors tracked per characteristic.
pub const MAX_DESCRIPTORS: usize = 4;

/// One BLE notification payload and when it arrived.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RawFragment {
    pub bytes: Vec<u8, MAX_FRAGMENT_LEN>,
    pub arrival: Timestamp,
}

impl RawFragment {
    /// Copy a notification, truncating anything beyond [`MAX_FRAGMENT_LEN`].
    pub fn new(data: &[u8], arrival: Timestamp) -> Self {
        let len = data.len().min(MAX_FRAGMENT_LEN);
        if len < data.len() {
            warn!("fragment of {} bytes truncated", data.len());
        }
        let mut bytes = Vec::new();
        // Length clamped to capacity above.
        let _ = bytes.extend_from_slice(&data[..len]);
        Self { bytes, arrival }
    }
}

/// Ordered stream of notification fragments.
///
/// `None` means the source is closed (link lost or session ended) and
/// no further fragments will arrive.
#[allow(async_fn_in_trait)]
pub trait FragmentSource {
    async fn next_fragment(&mut self) -> Option<RawFragment>;
}

/// Handle of a discovered GATT descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorInfo {
    pub uuid: Uuid,
    pub handle: u16,
}

/// A discovered GATT characteristic and its descriptors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CharacteristicInfo {
    pub uuid: Uuid,
    pub value_handle: u16,
    pub descriptors: Vec<DescriptorInfo, MAX_DESCRIPTORS>,
}

/// A discovered GATT primary service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceInfo {
    pub uuid: Uuid,
    pub characteristics: Vec<CharacteristicInfo, MAX_CHARACTERISTICS>,
}

pub type GattProfile = Vec<ServiceInfo, MAX_SERVICES>;

/// GATT client operations the driver needs from the platform stack.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Discover primary services, characteristics and descriptors.
    async fn discover_services(&mut self) -> Result<GattProfile, TransportError>;

    /// Route notifications of `characteristic` into the session's
    /// fragment channel.
    async fn subscribe(&mut self, characteristic: u16) -> Result<(), TransportError>;

    async fn write_descriptor(&mut self, descriptor: u16, bytes: &[u8]) -> Result<(), TransportError>;

    async fn write_characteristic(
        &mut self,
        characteristic: u16,
        bytes: &[u8],
    ) -> Result<(), TransportError>;
}

impl<T: Transport> Transport for &mut T {
    async fn discover_services(&mut self) -> Result<GattProfile, TransportError> {
        (**self).discover_services().await
    }

    async fn subscribe(&mut self, characteristic: u16) -> Result<(), TransportError> {
        (**self).subscribe(characteristic).await
    }

    async fn write_descriptor(&mut self, descriptor: u16, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).write_descriptor(descriptor, bytes).await
    }

    async fn write_characteristic(
        &mut self,
        characteristic: u16,
        bytes: &[u8],
    ) -> Result<(), TransportError> {
        (**self).write_characteristic(characteristic, bytes).await
    }
}

impl<S: FragmentSource> FragmentSource for &mut S {
    async fn next_fragment(&mut self) -> Option<RawFragment> {
        (**self).next_fragment().await
    }
}

/// Handles of the transmitter's data service, resolved at attach time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataServiceHandles {
    /// Host -> device command characteristic.
    pub rx: u16,
    /// Device -> host notify characteristic.
    pub tx: u16,
    /// Client configuration descriptor of `tx`.
    pub tx_cccd: u16,
}

impl DataServiceHandles {
    /// Locate the data service, its RX/TX characteristics and the TX
    /// CCCD in a discovered profile.
    pub fn resolve(profile: &[ServiceInfo]) -> Result<Self, AttachError> {
        let service = profile
            .iter()
            .find(|s| s.uuid == DATA_SERVICE_UUID)
            .ok_or(AttachError::ServiceMissing)?;

        let find = |uuid: Uuid| service.characteristics.iter().find(|c| c.uuid == uuid);

        let rx = find(RX_CHARACTERISTIC_UUID).ok_or(AttachError::RxCharacteristicMissing)?;
        let tx = find(TX_CHARACTERISTIC_UUID).ok_or(AttachError::TxCharacteristicMissing)?;
        let cccd = tx
            .descriptors
            .iter()
            .find(|d| d.uuid == CCCD_UUID)
            .ok_or(AttachError::CccdMissing)?;

        Ok(Self {
            rx: rx.value_handle,
            tx: tx.value_handle,
            tx_cccd: cccd.handle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn characteristic(uuid: Uuid, value_handle: u16, cccd: Option<u16>) -> CharacteristicInfo {
        let mut descriptors = Vec::new();
        if let Some(handle) = cccd {
            descriptors
                .push(DescriptorInfo {
                    uuid: CCCD_UUID,
                    handle,
                })
                .unwrap();
        }
        CharacteristicInfo {
            uuid,
            value_handle,
            descriptors,
        }
    }

    fn data_service(rx: bool, tx: bool, cccd: bool) -> ServiceInfo {
        let mut characteristics = Vec::new();
        if rx {
            characteristics
                .push(characteristic(RX_CHARACTERISTIC_UUID, 0x10, None))
                .unwrap();
        }
        if tx {
            characteristics
                .push(characteristic(TX_CHARACTERISTIC_UUID, 0x12, cccd.then_some(0x13)))
                .unwrap();
        }
        ServiceInfo {
            uuid: DATA_SERVICE_UUID,
            characteristics,
        }
    }

    fn battery_service() -> ServiceInfo {
        ServiceInfo {
            uuid: Uuid::from_u128(0x0000180F_0000_1000_8000_00805F9B34FB),
            characteristics: Vec::new(),
        }
    }

    #[test]
    fn resolves_handles_past_other_services() {
        let profile = [battery_service(), data_service(true, true, true)];
        let handles = DataServiceHandles::resolve(&profile).unwrap();
        assert_eq!(
            handles,
            DataServiceHandles {
                rx: 0x10,
                tx: 0x12,
                tx_cccd: 0x13
            }
        );
    }

    #[test]
    fn reports_each_missing_piece() {
        assert_eq!(
            DataServiceHandles::resolve(&[battery_service()]),
            Err(AttachError::ServiceMissing)
        );
        assert_eq!(
            DataServiceHandles::resolve(&[data_service(false, true, true)]),
            Err(AttachError::RxCharacteristicMissing)
        );
        assert_eq!(
            DataServiceHandles::resolve(&[data_service(true, false, false)]),
            Err(AttachError::TxCharacteristicMissing)
        );
        assert_eq!(
            DataServiceHandles::resolve(&[data_service(true, true, false)]),
            Err(AttachError::CccdMissing)
        );
    }

    #[test]
    fn oversized_notification_is_truncated() {
        let data = [0xAA; MAX_FRAGMENT_LEN + 10];
        let fragment = RawFragment::new(&data, Timestamp::from_millis(7));
        assert_eq!(fragment.bytes.len(), MAX_FRAGMENT_LEN);
        assert_eq!(fragment.arrival.as_millis(), 7);
    }
}
