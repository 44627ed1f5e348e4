//! Transmitter session: the reading pipeline.
//!
//! A [`Session`] owns the transport, the fragment source and the
//! per-device [`ConnectionState`]. Every operation takes `&mut self`,
//! so exactly one reassembly can be in flight at a time.
//!
//! ```text
//! attach ──> subscribe ──> poll_once ──> read_once / emitter
//!  (Idle)   (Subscribed)  (Receiving while a packet streams in)
//! ```

use crate::ble::{DataServiceHandles, FragmentSource, Transport};
use crate::config::{
    SessionConfig, ACCEPT_FLUSH_FRAGMENTS, ACCEPT_SENSOR_COMMAND, ENABLE_NOTIFICATIONS,
    WAKE_COMMAND,
};
use crate::error::{AttachError, Error};
use crate::protocol::{reassemble, DevicePacket, DeviceReading};
use crate::state::{ConnectionState, DeviceState};

pub struct Session<T, S> {
    transport: T,
    fragments: S,
    handles: DataServiceHandles,
    state: ConnectionState,
    config: SessionConfig,
}

impl<T: Transport, S: FragmentSource> Session<T, S> {
    /// Discover the transmitter's data service on an already connected
    /// peripheral. Fails if this is not a transmitter.
    pub async fn attach(transport: T, fragments: S) -> Result<Self, AttachError> {
        Self::attach_with_config(transport, fragments, SessionConfig::default()).await
    }

    pub async fn attach_with_config(
        mut transport: T,
        fragments: S,
        config: SessionConfig,
    ) -> Result<Self, AttachError> {
        let profile = transport
            .discover_services()
            .await
            .map_err(AttachError::Discovery)?;
        let handles = DataServiceHandles::resolve(&profile)?;
        info!(
            "transmitter attached (rx {}, tx {}, cccd {})",
            handles.rx,
            handles.tx,
            handles.tx_cccd
        );

        Ok(Self {
            transport,
            fragments,
            handles,
            state: ConnectionState::new(),
            config,
        })
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn handles(&self) -> DataServiceHandles {
        self.handles
    }

    /// Tear the session down, handing back the transport and source.
    pub fn into_parts(self) -> (T, S) {
        (self.transport, self.fragments)
    }

    /// Enable TX notifications and wake the device. Only legal when idle.
    pub async fn subscribe(&mut self) -> Result<(), Error> {
        if !self.state.is_idle() {
            return Err(Error::AlreadySubscribed);
        }

        let handles = self.handles;
        let result = async {
            self.transport.subscribe(handles.tx).await?;
            self.transport
                .write_descriptor(handles.tx_cccd, &ENABLE_NOTIFICATIONS)
                .await?;
            self.transport
                .write_characteristic(handles.rx, &WAKE_COMMAND)
                .await
        }
        .await;

        match result {
            Ok(()) => {
                self.state.mark_subscribed();
                info!("subscribed - emit interval {} min", self.state.emit_interval_minutes);
                Ok(())
            }
            Err(e) => {
                warn!("subscribe failed: {}", e);
                Err(Error::SubscriptionFailed(e))
            }
        }
    }

    /// Make sure we are subscribed, then reassemble one packet.
    pub async fn poll_once(&mut self) -> Result<DevicePacket, Error> {
        if self.state.is_idle() {
            self.subscribe().await?;
        }
        reassemble(&mut self.fragments, &mut self.state).await
    }

    /// Poll once and report only the device state.
    pub async fn device_status(&mut self) -> Result<DeviceState, Error> {
        let packet = self.poll_once().await?;
        Ok(packet.kind)
    }

    /// Acknowledge a newly inserted sensor.
    ///
    /// Both writes are always attempted, then the next
    /// [`ACCEPT_FLUSH_FRAGMENTS`] notifications are read and dropped
    /// whatever the write results were.
    pub async fn accept_new_sensor(&mut self) -> Result<(), Error> {
        let rx = self.handles.rx;
        let accept = self
            .transport
            .write_characteristic(rx, &ACCEPT_SENSOR_COMMAND)
            .await;
        let wake = self.transport.write_characteristic(rx, &WAKE_COMMAND).await;

        let mut flushed = 0;
        while flushed < ACCEPT_FLUSH_FRAGMENTS {
            match self.fragments.next_fragment().await {
                Some(fragment) => {
                    trace!("dropping accept response ({} bytes)", fragment.bytes.len());
                    flushed += 1;
                }
                None => break,
            }
        }

        accept.and(wake).map_err(Error::AcceptFailed)?;
        if flushed < ACCEPT_FLUSH_FRAGMENTS {
            return Err(Error::ChannelClosed);
        }
        Ok(())
    }

    /// Poll once and decode a reading.
    ///
    /// Fails with [`Error::NotASensorReading`] when the device reports
    /// anything but sensor data; the caller may simply retry.
    pub async fn read_once(&mut self) -> Result<DeviceReading, Error> {
        let packet = self.poll_once().await?;
        self.decode(&packet)
    }

    fn decode(&self, packet: &DevicePacket) -> Result<DeviceReading, Error> {
        let reading = DeviceReading::from_packet(packet)?;
        if self.config.strict_framing {
            reading.check_framing()?;
        }
        Ok(reading)
    }

    /// Endless stream of readings (see [`Emitter`]).
    pub fn continuous_emit(&mut self, auto_accept: bool) -> Emitter<'_, T, S> {
        Emitter {
            session: self,
            auto_accept,
            done: false,
        }
    }

    /// [`continuous_emit`](Self::continuous_emit) using
    /// [`SessionConfig::auto_accept_new_sensor`].
    pub fn emitter(&mut self) -> Emitter<'_, T, S> {
        let auto_accept = self.config.auto_accept_new_sensor;
        self.continuous_emit(auto_accept)
    }
}

/// Lazy, endless sequence of readings.
///
/// Each [`next`](Self::next) polls until the device reports sensor data.
/// No-sensor packets are skipped; new-sensor packets are acknowledged
/// first when `auto_accept` is set. Once the fragment source closes, or
/// any other error ends the session, the emitter is exhausted for good.
pub struct Emitter<'a, T, S> {
    session: &'a mut Session<T, S>,
    auto_accept: bool,
    done: bool,
}

impl<T: Transport, S: FragmentSource> Emitter<'_, T, S> {
    pub async fn next(&mut self) -> Option<DeviceReading> {
        while !self.done {
            let packet = match self.session.poll_once().await {
                Ok(packet) => packet,
                Err(e) => {
                    info!("emitter ended: {}", e);
                    self.done = true;
                    break;
                }
            };
            self.session.state.schedule_next_emit();

            match packet.kind {
                DeviceState::Reporting => match self.session.decode(&packet) {
                    Ok(reading) => return Some(reading),
                    Err(e) => warn!("skipping packet: {}", e),
                },
                DeviceState::NewSensorPending if self.auto_accept => {
                    match self.session.accept_new_sensor().await {
                        Ok(()) => info!("new sensor accepted"),
                        Err(Error::ChannelClosed) => {
                            info!("emitter ended: fragment channel closed");
                            self.done = true;
                        }
                        Err(e) => warn!("new sensor accept failed: {}", e),
                    }
                }
                kind => debug!("no reading this cycle ({:?})", kind),
            }
        }
        None
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Read-only view of the session state between readings.
    pub fn state(&self) -> &ConnectionState {
        self.session.state()
    }
}
