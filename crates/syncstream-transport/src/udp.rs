//! UDP command transport
//!
//! Each command is one datagram sent to every peer. Delivery is
//! at-least-once at best: loss, duplication and reordering are left to the
//! receiver's sequence guard and catch-up policy.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, error::TryRecvError};

use syncstream_core::{ControlCommand, SyncError, SyncResult};
use syncstream_time::WallClock;
use syncstream_wire::{CommandFrame, MAX_FRAME_SIZE};

use crate::{CommandSource, CommandTransport, ReceivedCommand};

/// Default receive queue depth
pub const DEFAULT_RECEIVE_BUFFER: usize = 1024;

/// UDP transport for control commands
pub struct UdpCommandTransport {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    peers: RwLock<Vec<SocketAddr>>,
    wall: Arc<dyn WallClock>,
}

impl UdpCommandTransport {
    /// Bind to a local address; `wall` stamps each frame's send time
    pub async fn bind(addr: SocketAddr, wall: Arc<dyn WallClock>) -> SyncResult<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| SyncError::ChannelUnavailable(format!("bind {addr}: {e}")))?;

        let local_addr = socket
            .local_addr()
            .map_err(|e| SyncError::ChannelUnavailable(e.to_string()))?;

        Ok(UdpCommandTransport {
            socket: Arc::new(socket),
            local_addr,
            peers: RwLock::new(Vec::new()),
            wall,
        })
    }

    /// Get local address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn add_peer(&self, peer: SocketAddr) {
        let mut peers = self.peers.write();
        if !peers.contains(&peer) {
            peers.push(peer);
        }
    }

    pub fn peers(&self) -> Vec<SocketAddr> {
        self.peers.read().clone()
    }

    /// Send one frame to a destination
    pub async fn send_to(&self, frame: &CommandFrame, dest: SocketAddr) -> SyncResult<()> {
        let bytes = frame.serialize()?;
        self.socket
            .send_to(&bytes, dest)
            .await
            .map_err(|e| SyncError::ChannelUnavailable(e.to_string()))?;
        Ok(())
    }

    /// Start the background receive loop and return its command source
    pub fn subscribe(&self, buffer_size: usize) -> UdpCommandSource {
        UdpCommandSource {
            rx: start_receive_loop(Arc::clone(&self.socket), buffer_size),
        }
    }
}

impl CommandTransport for UdpCommandTransport {
    fn broadcast(&self, command: &Arc<ControlCommand>) -> SyncResult<()> {
        let frame = CommandFrame::new(ControlCommand::clone(command), self.wall.now());
        let bytes = frame.serialize()?;

        let peers = self.peers.read();
        if peers.is_empty() {
            return Err(SyncError::ChannelUnavailable("no peers configured".into()));
        }
        for peer in peers.iter() {
            self.socket
                .try_send_to(&bytes, *peer)
                .map_err(|e| SyncError::ChannelUnavailable(format!("send to {peer}: {e}")))?;
        }
        Ok(())
    }
}

/// Datagram receiver channel
pub type DatagramReceiver = mpsc::Receiver<(Vec<u8>, SocketAddr)>;

/// Start a background receive loop
pub fn start_receive_loop(socket: Arc<UdpSocket>, buffer_size: usize) -> DatagramReceiver {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));

    tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_FRAME_SIZE];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, addr)) => {
                    let datagram = buf[..len].to_vec();
                    if tx.send((datagram, addr)).await.is_err() {
                        break; // Source dropped
                    }
                }
                Err(e) => {
                    tracing::warn!("UDP receive error: {}", e);
                }
            }
        }
    });

    rx
}

/// Commands decoded from a UDP receive loop
pub struct UdpCommandSource {
    rx: DatagramReceiver,
}

impl UdpCommandSource {
    pub fn new(rx: DatagramReceiver) -> Self {
        UdpCommandSource { rx }
    }
}

impl CommandSource for UdpCommandSource {
    fn try_recv(&mut self) -> SyncResult<Option<ReceivedCommand>> {
        loop {
            let (datagram, from) = match self.rx.try_recv() {
                Ok(item) => item,
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => {
                    return Err(SyncError::ChannelUnavailable("UDP receive loop ended".into()));
                }
            };
            match CommandFrame::parse(&datagram) {
                Ok(frame) => {
                    return Ok(Some(ReceivedCommand {
                        command: Arc::new(frame.command),
                        sent_at: Some(frame.sent_at),
                    }));
                }
                Err(e) => {
                    tracing::warn!(%from, error = %e, "discarding malformed command frame");
                }
            }
        }
    }
}
