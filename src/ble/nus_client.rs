//! nrf-softdevice GATT client for the transmitter's Nordic UART service.
//!
//! After the GAP connection is up:
//! 1. [`discover`] finds the NUS service and its RX/TX characteristics.
//! 2. [`NusTransport`] hands those handles to the session, which enables
//!    TX notifications and writes commands to RX.
//! 3. [`run_notification_loop`] runs alongside the session and forwards
//!    every TX notification into the fragment channel, closing it when
//!    the link drops.

use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;
use nrf_softdevice::ble::gatt_client::WriteError;
use nrf_softdevice::ble::{gatt_client, Connection};

use crate::ble::channel::FragmentSender;
use crate::ble::{CharacteristicInfo, DescriptorInfo, GattProfile, ServiceInfo, Transport};
use crate::config::{CCCD_UUID, DATA_SERVICE_UUID, RX_CHARACTERISTIC_UUID, TX_CHARACTERISTIC_UUID};
use crate::error::TransportError;
use crate::Timestamp;

/// GATT client for the NUS data service.
#[nrf_softdevice::gatt_client(uuid = "6e400001-b5a3-f393-e0a9-e50e24dcca9e")]
pub struct NusClient {
    /// Host -> transmitter commands.
    #[characteristic(uuid = "6e400002-b5a3-f393-e0a9-e50e24dcca9e", write)]
    pub rx: Vec<u8, 20>,

    /// Transmitter -> host envelope fragments.
    #[characteristic(uuid = "6e400003-b5a3-f393-e0a9-e50e24dcca9e", notify)]
    pub tx: Vec<u8, 244>,
}

/// Discover the NUS service on a connected peripheral.
pub async fn discover(conn: &Connection) -> Result<NusClient, TransportError> {
    info!("Discovering NUS service...");
    let client: NusClient = gatt_client::discover(conn)
        .await
        .map_err(|_| TransportError::Discovery)?;
    info!(
        "NUS service discovered (rx={} tx={} cccd={})",
        client.rx_value_handle, client.tx_value_handle, client.tx_cccd_handle
    );
    Ok(client)
}

/// [`Transport`] over one softdevice connection.
///
/// Holds only the handles found by [`discover`], so the client itself
/// stays free for [`run_notification_loop`].
pub struct NusTransport<'a> {
    conn: &'a Connection,
    rx: u16,
    tx: u16,
    tx_cccd: u16,
}

impl<'a> NusTransport<'a> {
    pub fn new(conn: &'a Connection, client: &NusClient) -> Self {
        Self {
            conn,
            rx: client.rx_value_handle,
            tx: client.tx_value_handle,
            tx_cccd: client.tx_cccd_handle,
        }
    }

    async fn write(&self, handle: u16, bytes: &[u8]) -> Result<(), TransportError> {
        gatt_client::write(self.conn, handle, bytes)
            .await
            .map_err(|e| match e {
                WriteError::Disconnected => TransportError::Disconnected,
                _ => TransportError::Write,
            })
    }
}

impl Transport for NusTransport<'_> {
    async fn discover_services(&mut self) -> Result<GattProfile, TransportError> {
        let mut tx_descriptors = Vec::new();
        let _ = tx_descriptors.push(DescriptorInfo {
            uuid: CCCD_UUID,
            handle: self.tx_cccd,
        });

        let mut characteristics = Vec::new();
        let _ = characteristics.push(CharacteristicInfo {
            uuid: RX_CHARACTERISTIC_UUID,
            value_handle: self.rx,
            descriptors: Vec::new(),
        });
        let _ = characteristics.push(CharacteristicInfo {
            uuid: TX_CHARACTERISTIC_UUID,
            value_handle: self.tx,
            descriptors: tx_descriptors,
        });

        let mut profile = GattProfile::new();
        let _ = profile.push(ServiceInfo {
            uuid: DATA_SERVICE_UUID,
            characteristics,
        });
        Ok(profile)
    }

    async fn subscribe(&mut self, characteristic: u16) -> Result<(), TransportError> {
        // gatt_client::run delivers TX notifications; only TX is routable.
        if characteristic != self.tx {
            warn!("cannot subscribe to handle {}", characteristic);
            return Err(TransportError::Subscribe);
        }
        Ok(())
    }

    async fn write_descriptor(&mut self, descriptor: u16, bytes: &[u8]) -> Result<(), TransportError> {
        self.write(descriptor, bytes).await
    }

    async fn write_characteristic(
        &mut self,
        characteristic: u16,
        bytes: &[u8],
    ) -> Result<(), TransportError> {
        self.write(characteristic, bytes).await
    }
}

/// Forward TX notifications into `fragments` until the connection drops.
///
/// Each fragment is stamped with the uptime clock on arrival. The channel
/// is closed on exit so the session sees the link loss.
pub async fn run_notification_loop<M: RawMutex, const N: usize>(
    conn: &Connection,
    client: &NusClient,
    fragments: FragmentSender<'_, M, N>,
) {
    info!("NUS notification loop started");

    let _result = gatt_client::run(conn, client, |event| match event {
        NusClientEvent::TxNotification(data) => {
            let arrival = Timestamp::from_millis(embassy_time::Instant::now().as_millis());
            // forward() already logs the drop.
            let _ = fragments.forward(&data, arrival);
        }
    })
    .await;

    info!("NUS notification loop ended (connection closed)");
    fragments.close().await;
}
