use super::browser::{BrowseState, MdnsService};
use super::codec::{Packet, TYPE_PTR};
use crate::poll::{publish_distinct, TaskGuard};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;

pub const MDNS_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);
pub const MDNS_PORT: u16 = 5353;

/// Browses one service type on the local link.
///
/// Subscribers always see a value: the list starts out empty and only
/// changes when the set of resolved instances does.
#[derive(Clone)]
pub struct MdnsBrowser {
    services: watch::Receiver<Option<Vec<MdnsService>>>,
    _task: Arc<TaskGuard>,
}

impl MdnsBrowser {
    pub fn spawn(service_type: &str) -> Self {
        let (tx, services) = watch::channel(Some(Vec::new()));
        let task = TaskGuard::spawn(browse(service_type.to_string(), tx));

        Self {
            services,
            _task: Arc::new(task),
        }
    }

    pub fn services(&self) -> watch::Receiver<Option<Vec<MdnsService>>> {
        self.services.clone()
    }
}

fn bind_multicast() -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
    socket.set_reuse_port(true)?;
    socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, MDNS_PORT).into())?;
    socket.join_multicast_v4(&MDNS_GROUP, &Ipv4Addr::UNSPECIFIED)?;
    socket.set_multicast_loop_v4(true)?;
    socket.set_nonblocking(true)?;

    UdpSocket::from_std(socket.into())
}

const RECEIVE_RETRY_MIN: Duration = Duration::from_millis(50);
const RECEIVE_RETRY_MAX: Duration = Duration::from_secs(2);

#[async_trait]
trait Datagrams: Send + Sync {
    async fn receive(&self, buffer: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
}

#[async_trait]
impl Datagrams for UdpSocket {
    async fn receive(&self, buffer: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.recv_from(buffer).await
    }
}

async fn browse(service_type: String, tx: watch::Sender<Option<Vec<MdnsService>>>) {
    let socket = match bind_multicast() {
        Ok(socket) => socket,
        Err(e) => {
            tracing::warn!("mDNS browsing unavailable: {}", e);
            // Keep the empty list alive for subscribers.
            tx.closed().await;
            return;
        }
    };

    // Listening is already set up, so no answer to this query can be missed.
    let query = Packet::query(&service_type, TYPE_PTR).encode();
    let group = SocketAddr::V4(SocketAddrV4::new(MDNS_GROUP, MDNS_PORT));
    if let Err(e) = socket.send_to(&query, group).await {
        tracing::warn!("mDNS query for {} failed: {}", service_type, e);
    }

    receive_responses(&socket, &service_type, &tx).await;
}

async fn receive_responses(
    socket: &dyn Datagrams,
    service_type: &str,
    tx: &watch::Sender<Option<Vec<MdnsService>>>,
) {
    let mut state = BrowseState::new(service_type);
    let mut buffer = vec![0u8; 9000];
    let mut retry = RECEIVE_RETRY_MIN;

    loop {
        tokio::select! {
            received = socket.receive(&mut buffer) => {
                let (len, from) = match received {
                    Ok(received) => {
                        retry = RECEIVE_RETRY_MIN;
                        received
                    }
                    Err(e) => {
                        tracing::debug!("mDNS receive failed, retrying in {:?}: {}", retry, e);
                        tokio::select! {
                            _ = tokio::time::sleep(retry) => {}
                            _ = tx.closed() => return,
                        }
                        retry = (retry * 2).min(RECEIVE_RETRY_MAX);
                        continue;
                    }
                };

                let packet = match Packet::decode(&buffer[..len]) {
                    Ok(packet) => packet,
                    Err(e) => {
                        tracing::trace!("Undecodable mDNS packet from {}: {}", from, e);
                        continue;
                    }
                };

                if !packet.is_response() || !state.is_relevant(&packet) {
                    continue;
                }

                state.apply(&packet);
                let services = state.services();
                let count = services.len();
                if publish_distinct(tx, services, |a, b| a == b) {
                    tracing::info!(instances = count, "mDNS services changed");
                }
            }
            _ = tx.closed() => return,
        }
    }
}
