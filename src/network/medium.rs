use std::net::{SocketAddr, UdpSocket};
use std::sync::RwLock;

use bytes::BytesMut;
use futures::StreamExt;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::task::JoinHandle;
use tokio_util::codec::Encoder;
use tokio_util::udp::UdpFramed;
use tracing::{debug, info, warn};

use crate::core::{Error, Result};
use crate::protocol::codec::{AirCodec, AirFrame};
use super::radio::{Radio, RxMetadata};
use super::FrameSender;

/// Simulated radio carrying frames as UDP datagrams
///
/// Every transmitted frame is sent to each configured neighbour; there is no
/// loopback, so a node never hears itself.
#[derive(Debug)]
pub struct UdpMedium {
    socket: UdpSocket,
    neighbours: RwLock<Vec<SocketAddr>>,
    rssi: i8,
    channel: u8,
}

impl UdpMedium {
    /// Binds a non-blocking socket at `addr`
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_broadcast(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        let socket: UdpSocket = socket.into();
        info!(addr = %socket.local_addr()?, "UDP medium bound");

        Ok(UdpMedium {
            socket,
            neighbours: RwLock::new(Vec::new()),
            rssi: -40,
            channel: 6,
        })
    }

    /// Signal metadata stamped on outgoing datagrams
    pub fn with_signal(mut self, rssi: i8, channel: u8) -> Self {
        self.rssi = rssi;
        self.channel = channel;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn add_neighbour(&self, addr: SocketAddr) {
        let mut neighbours = self
            .neighbours
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !neighbours.contains(&addr) {
            neighbours.push(addr);
        }
    }

    pub fn neighbours(&self) -> Vec<SocketAddr> {
        self.neighbours
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Starts feeding received datagrams into `sender`
    ///
    /// Must be called from within a tokio runtime. The task ends when the
    /// node behind `sender` goes away or the socket fails.
    pub fn spawn_receiver(&self, sender: FrameSender) -> Result<JoinHandle<()>> {
        let socket = tokio::net::UdpSocket::from_std(self.socket.try_clone()?)?;
        let mut framed = UdpFramed::new(socket, AirCodec::new());

        Ok(tokio::spawn(async move {
            while let Some(item) = framed.next().await {
                match item {
                    Ok((air, from)) => {
                        let meta = RxMetadata {
                            rssi: air.rssi,
                            channel: air.channel,
                            fcs_len: 0,
                        };
                        if !sender.on_frame(air.frame, meta) && sender.is_closed() {
                            break;
                        }
                        debug!(%from, "Datagram received");
                    }
                    Err(Error::Io(e)) => {
                        warn!("UDP medium receive failed: {}", e);
                        break;
                    }
                    Err(e) => debug!("Discarding datagram: {}", e),
                }
            }
            debug!("UDP medium receiver stopped");
        }))
    }
}

impl Radio for UdpMedium {
    fn transmit(&self, frame: &[u8]) -> Result<()> {
        let mut buf = BytesMut::new();
        AirCodec::new().encode(
            AirFrame {
                rssi: self.rssi,
                channel: self.channel,
                frame: bytes::Bytes::copy_from_slice(frame),
            },
            &mut buf,
        )?;

        for addr in self.neighbours() {
            self.socket
                .send_to(&buf, addr)
                .map_err(|e| Error::transmit(e.raw_os_error().unwrap_or(-1)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use crate::core::MAX_FRAME_SIZE;
    use crate::network::Command;

    fn localhost() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn test_frames_reach_neighbour() {
        let a = UdpMedium::bind(localhost()).unwrap().with_signal(-55, 11);
        let b = UdpMedium::bind(localhost()).unwrap();
        a.add_neighbour(b.local_addr().unwrap());
        a.add_neighbour(b.local_addr().unwrap());
        assert_eq!(a.neighbours().len(), 1);

        let (tx, mut rx) = mpsc::channel(8);
        let sender = FrameSender::new(tx, Arc::new(AtomicU64::new(0)));
        let task = b.spawn_receiver(sender).unwrap();

        a.transmit(&[0x80, 1, 2, 3]).unwrap();

        let command = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        match command {
            Command::Frame { frame, meta } => {
                assert_eq!(frame.as_ref(), &[0x80, 1, 2, 3]);
                assert_eq!(meta.rssi, -55);
                assert_eq!(meta.channel, 11);
                assert_eq!(meta.fcs_len, 0);
            }
            _ => panic!("expected a frame"),
        }
        task.abort();
    }

    #[tokio::test]
    async fn test_oversized_frame_is_rejected() {
        let a = UdpMedium::bind(localhost()).unwrap();
        a.add_neighbour(localhost());
        let err = a.transmit(&[0u8; MAX_FRAME_SIZE + 1]).unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_receiver_stops_with_node() {
        let a = UdpMedium::bind(localhost()).unwrap();
        let b = UdpMedium::bind(localhost()).unwrap();
        a.add_neighbour(b.local_addr().unwrap());

        let (tx, rx) = mpsc::channel(1);
        let dropped = Arc::new(AtomicU64::new(0));
        let task = b.spawn_receiver(FrameSender::new(tx, dropped.clone())).unwrap();
        drop(rx);

        a.transmit(&[0x80]).unwrap();
        timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
        assert_eq!(dropped.load(Ordering::Relaxed), 0);
    }
}
