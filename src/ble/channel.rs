//! Fragment hand-off between the BLE notification callback and the
//! reassembler.
//!
//! The callback side must never block, so [`FragmentSender::forward`]
//! uses `try_send` and reports a full channel instead of waiting.
//! Link loss is signalled in-band with [`LinkEvent::Closed`] so the
//! reassembler sees closure in arrival order, after every fragment that
//! was already queued.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, TrySendError};

use crate::ble::{FragmentSource, RawFragment};
use crate::Timestamp;

/// Item carried by the hand-off channel.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkEvent {
    Fragment(RawFragment),
    Closed,
}

/// Channel full - the reassembler has fallen `N` fragments behind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelFull;

/// Bounded single-producer/single-consumer fragment channel.
pub struct FragmentChannel<M: RawMutex, const N: usize> {
    inner: Channel<M, LinkEvent, N>,
}

impl<M: RawMutex, const N: usize> FragmentChannel<M, N> {
    pub const fn new() -> Self {
        Self {
            inner: Channel::new(),
        }
    }

    pub fn sender(&self) -> FragmentSender<'_, M, N> {
        FragmentSender { channel: self }
    }

    pub fn receiver(&self) -> FragmentReceiver<'_, M, N> {
        FragmentReceiver {
            channel: self,
            closed: false,
        }
    }
}

impl<M: RawMutex, const N: usize> Default for FragmentChannel<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer half, held by the transport's notification handler.
pub struct FragmentSender<'a, M: RawMutex, const N: usize> {
    channel: &'a FragmentChannel<M, N>,
}

impl<M: RawMutex, const N: usize> Clone for FragmentSender<'_, M, N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: RawMutex, const N: usize> Copy for FragmentSender<'_, M, N> {}

impl<M: RawMutex, const N: usize> FragmentSender<'_, M, N> {
    /// Queue one notification without blocking.
    pub fn forward(&self, data: &[u8], arrival: Timestamp) -> Result<(), ChannelFull> {
        match self
            .channel
            .inner
            .try_send(LinkEvent::Fragment(RawFragment::new(data, arrival)))
        {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!("fragment channel full - dropping {} bytes", data.len());
                Err(ChannelFull)
            }
        }
    }

    /// Signal that no more fragments will arrive. Waits for room so the
    /// close marker is never lost.
    pub async fn close(&self) {
        self.channel.inner.send(LinkEvent::Closed).await;
    }

    /// Non-blocking variant of [`close`](Self::close).
    pub fn try_close(&self) -> Result<(), ChannelFull> {
        self.channel
            .inner
            .try_send(LinkEvent::Closed)
            .map_err(|_| ChannelFull)
    }
}

/// Consumer half, drained by the session. Closure is latched.
pub struct FragmentReceiver<'a, M: RawMutex, const N: usize> {
    channel: &'a FragmentChannel<M, N>,
    closed: bool,
}

impl<M: RawMutex, const N: usize> FragmentReceiver<'_, M, N> {
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<M: RawMutex, const N: usize> FragmentSource for FragmentReceiver<'_, M, N> {
    async fn next_fragment(&mut self) -> Option<RawFragment> {
        if self.closed {
            return None;
        }
        match self.channel.inner.receive().await {
            LinkEvent::Fragment(fragment) => Some(fragment),
            LinkEvent::Closed => {
                debug!("fragment channel closed");
                self.closed = true;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    #[test]
    fn fragments_arrive_in_order_then_close() {
        let channel: FragmentChannel<NoopRawMutex, 4> = FragmentChannel::new();
        let tx = channel.sender();
        let mut rx = channel.receiver();

        tx.forward(&[1, 2], Timestamp::from_millis(10)).unwrap();
        tx.forward(&[3], Timestamp::from_millis(20)).unwrap();
        tx.try_close().unwrap();

        block_on(async {
            let first = rx.next_fragment().await.unwrap();
            assert_eq!(&first.bytes[..], &[1, 2]);
            assert_eq!(first.arrival, Timestamp::from_millis(10));

            let second = rx.next_fragment().await.unwrap();
            assert_eq!(&second.bytes[..], &[3]);

            assert!(rx.next_fragment().await.is_none());
            assert!(rx.is_closed());
            // Latched: later fragments are never delivered.
            tx.forward(&[9], Timestamp::from_millis(30)).unwrap();
            assert!(rx.next_fragment().await.is_none());
        });
    }

    #[test]
    fn forward_reports_full_channel() {
        let channel: FragmentChannel<NoopRawMutex, 2> = FragmentChannel::new();
        let tx = channel.sender();

        assert_eq!(tx.forward(&[1], Timestamp::default()), Ok(()));
        assert_eq!(tx.forward(&[2], Timestamp::default()), Ok(()));
        assert_eq!(tx.forward(&[3], Timestamp::default()), Err(ChannelFull));
        assert_eq!(tx.try_close(), Err(ChannelFull));
    }

    #[test]
    fn async_close_waits_for_room() {
        let channel: FragmentChannel<NoopRawMutex, 1> = FragmentChannel::new();
        let tx = channel.sender();
        let mut rx = channel.receiver();

        tx.forward(&[0x34], Timestamp::default()).unwrap();

        let (_, (first, second)) = block_on(embassy_futures::join::join(tx.close(), async {
            let first = rx.next_fragment().await;
            let second = rx.next_fragment().await;
            (first, second)
        }));
        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[test]
    fn default_depth_holds_whole_envelope() {
        use crate::config::{FRAGMENT_CHANNEL_DEPTH, PACKET_LEN};

        let channel: FragmentChannel<NoopRawMutex, FRAGMENT_CHANNEL_DEPTH> = FragmentChannel::new();
        let tx = channel.sender();
        let envelope = [0x28u8; PACKET_LEN];
        for chunk in envelope.chunks(20) {
            assert_eq!(tx.forward(chunk, Timestamp::default()), Ok(()));
        }
        assert_eq!(tx.try_close(), Ok(()));
    }
}
