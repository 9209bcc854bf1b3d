//! UDP transport for OSC control traffic
//!
//! Two sockets, never swapped:
//! - outbound: ephemeral local port, every command goes to
//!   `(mixer_ip, send_port)` (TotalMix "Port incoming")
//! - inbound: bound to `0.0.0.0:receive_port` (TotalMix "Port outgoing"),
//!   drained by a dedicated task that decodes feedback
//!
//! Delivery is best effort. A successful `send` only means the OS accepted
//! the datagram; nothing is acknowledged or retried.

use async_trait::async_trait;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::TransportError;
use crate::osc::{format_hex, OscMessage, OscPacket};

/// Largest UDP payload we are prepared to receive
const MAX_DATAGRAM: usize = 65_536;

/// Callback invoked for every decoded feedback message
pub type FeedbackCallback = Arc<dyn Fn(OscMessage) + Send + Sync>;

/// Anything that can carry a control message towards the mixer
///
/// The controller only needs this seam; tests substitute a recorder.
#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Transmit one message, single attempt
    async fn send(&self, message: &OscMessage) -> Result<(), TransportError>;
}

/// Outbound socket plus the ability to start the feedback listener
pub struct Transport {
    socket: UdpSocket,
    target: SocketAddr,
}

impl Transport {
    /// Open the outbound socket on an ephemeral port for `target`
    pub async fn open(target: SocketAddr) -> Result<Self, TransportError> {
        let local: SocketAddr = if target.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(local)
            .await
            .map_err(TransportError::Outbound)?;

        if let Ok(addr) = socket.local_addr() {
            debug!(local = %addr, %target, "Outbound OSC socket ready");
        }

        Ok(Self { socket, target })
    }

    /// Where commands are sent
    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Bind the feedback port and spawn the receive loop
    ///
    /// Returns `TransportError::Bind` if the port is taken; sending keeps
    /// working regardless.
    pub async fn start_receiving(
        &self,
        receive_port: u16,
        on_message: FeedbackCallback,
    ) -> Result<ReceiverHandle, TransportError> {
        let addr: SocketAddr = if self.target.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, receive_port).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, receive_port).into()
        };
        listen(addr, on_message).await
    }
}

/// Bind `addr` and deliver every decoded message to `on_message`
pub async fn listen(
    addr: SocketAddr,
    on_message: FeedbackCallback,
) -> Result<ReceiverHandle, TransportError> {
    let socket = UdpSocket::bind(addr)
        .await
        .map_err(|source| TransportError::Bind { addr, source })?;
    let local_addr = socket.local_addr().unwrap_or(addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(receive_loop(socket, on_message, shutdown_rx));

    info!("Listening for feedback on {}", local_addr);

    Ok(ReceiverHandle {
        local_addr,
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}

#[async_trait]
impl CommandSink for Transport {
    async fn send(&self, message: &OscMessage) -> Result<(), TransportError> {
        let bytes = message.encode();
        self.socket
            .send_to(&bytes, self.target)
            .await
            .map_err(|source| TransportError::Send {
                target: self.target,
                source,
            })?;
        trace!(target = %self.target, "OSC TX {}", message);
        Ok(())
    }
}

/// Running receive loop
///
/// Dropping the handle also ends the loop; `stop` additionally waits for
/// the socket to be released.
pub struct ReceiverHandle {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ReceiverHandle {
    /// Address the feedback socket is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Close the feedback socket and wait for the loop to exit
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Receive loop ended abnormally: {}", e);
            }
        }
        debug!("Feedback socket {} closed", self.local_addr);
    }
}

async fn receive_loop(
    socket: UdpSocket,
    on_message: FeedbackCallback,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        tokio::select! {
            // Fires on explicit stop and when the handle is dropped
            _ = &mut shutdown_rx => break,

            res = socket.recv_from(&mut buf) => match res {
                Ok((len, from)) => {
                    let data = &buf[..len];
                    match OscPacket::decode(data) {
                        Ok(packet) => {
                            for message in packet.into_messages() {
                                trace!(%from, "OSC RX {}", message);
                                on_message(message);
                            }
                        }
                        Err(e) => {
                            warn!(%from, "Dropping malformed datagram: {}", e);
                            debug!("Malformed datagram bytes: {}", format_hex(data));
                        }
                    }
                }
                // e.g. ICMP port unreachable surfacing on Windows
                Err(e) => warn!("Feedback receive error: {}", e),
            }
        }
    }

    debug!("Receive loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn loopback(port: u16) -> SocketAddr {
        (Ipv4Addr::LOCALHOST, port).into()
    }

    fn channel_callback() -> (FeedbackCallback, mpsc::UnboundedReceiver<OscMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback: FeedbackCallback = Arc::new(move |msg| {
            let _ = tx.send(msg);
        });
        (callback, rx)
    }

    #[tokio::test]
    async fn test_send_reaches_target() {
        let mixer = UdpSocket::bind(loopback(0)).await.unwrap();
        let transport = Transport::open(mixer.local_addr().unwrap()).await.unwrap();

        let msg = OscMessage::float("/1/mastervolume", 0.5);
        transport.send(&msg).await.unwrap();

        let mut buf = [0u8; 512];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), mixer.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(OscMessage::decode(&buf[..len]).unwrap(), msg);
    }

    #[tokio::test]
    async fn test_feedback_is_decoded_and_delivered() {
        let transport = Transport::open(loopback(9)).await.unwrap();
        let (callback, mut rx) = channel_callback();
        let handle = transport.start_receiving(0, callback).await.unwrap();
        let port = handle.local_addr().port();

        let mixer = UdpSocket::bind(loopback(0)).await.unwrap();
        let feedback = OscMessage::float("/1/volume1", 0.33);
        mixer
            .send_to(&feedback.encode(), loopback(port))
            .await
            .unwrap();

        let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, feedback);

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_malformed_datagram_does_not_end_loop() {
        let transport = Transport::open(loopback(9)).await.unwrap();
        let (callback, mut rx) = channel_callback();
        let handle = transport.start_receiving(0, callback).await.unwrap();
        let port = handle.local_addr().port();

        let mixer = UdpSocket::bind(loopback(0)).await.unwrap();
        mixer.send_to(b"/broken", loopback(port)).await.unwrap();
        let valid = OscMessage::float("/1/mainMute", 1.0);
        mixer.send_to(&valid.encode(), loopback(port)).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, valid);

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_bundle_delivers_every_message() {
        let transport = Transport::open(loopback(9)).await.unwrap();
        let (callback, mut rx) = channel_callback();
        let handle = transport.start_receiving(0, callback).await.unwrap();
        let port = handle.local_addr().port();

        let first = OscMessage::float("/1/volume1", 0.1);
        let second = OscMessage::float("/1/volume2", 0.2);
        let bundle = OscPacket::Bundle(crate::osc::OscBundle {
            timetag: crate::osc::bundle::IMMEDIATELY,
            content: vec![first.clone().into(), second.clone().into()],
        });

        let mixer = UdpSocket::bind(loopback(0)).await.unwrap();
        mixer.send_to(&bundle.encode(), loopback(port)).await.unwrap();

        for expected in [first, second] {
            let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(received, expected);
        }

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_port_in_use_reports_bind_failure() {
        let holder = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await.unwrap();
        let port = holder.local_addr().unwrap().port();

        let transport = Transport::open(loopback(9)).await.unwrap();
        let (callback, _rx) = channel_callback();
        let result = transport.start_receiving(port, callback).await;
        assert!(matches!(result, Err(TransportError::Bind { .. })));

        // Sending is unaffected
        let msg = OscMessage::float("/1/busOutput", 1.0);
        assert!(transport.send(&msg).await.is_ok());
    }

    #[tokio::test]
    async fn test_stop_releases_port() {
        let transport = Transport::open(loopback(9)).await.unwrap();
        let (callback, _rx) = channel_callback();
        let handle = transport.start_receiving(0, callback).await.unwrap();
        let port = handle.local_addr().port();

        handle.stop().await;

        assert!(UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await.is_ok());
    }
}
