//! TCP control layer.
//!
//! [`TCP`] drives IPv4 and IPv6 stream sockets: it dials non-blocking
//! connections, probes them until the kernel reports the outcome, fetches
//! peer names and emits the PROXY protocol header when asked to.
//!
//! The raw [`recv`] and [`send`] helpers are meant for data layers that
//! forward bytes as-is.

use crate::connection::{Connection, PeerAddr, Transport};
use crate::error::{Error, Result};
use crate::ops::CtrlOps;
use crate::poller::Readiness;
use crate::poller::platform::{
    bytes_to_storage, domain_of, sockaddr_storage_to_socketaddr, sys_connect, sys_peername,
    sys_recv, sys_send, sys_set_nonblocking, sys_shutdown, sys_socket, sys_sockname,
    sys_take_socket_error,
};

use log::{debug, warn};
use std::io;
use std::net::{Shutdown, SocketAddr};
use std::os::fd::RawFd;

/// Control operations for TCP sockets.
pub struct TcpCtrl;

/// The shared TCP control layer.
pub static TCP: TcpCtrl = TcpCtrl;

impl CtrlOps for TcpCtrl {
    fn name(&self) -> &'static str {
        "tcp"
    }

    /// Creates a non-blocking socket and starts connecting it.
    ///
    /// When the kernel cannot complete the connection right away, the
    /// connection waits for L4 and the socket layer polls for write.
    fn connect(&self, conn: &mut Connection, target: SocketAddr) -> Result<()> {
        let fd = sys_socket(domain_of(&target))?;
        conn.set_transport(Transport::Socket { fd });

        match sys_connect(fd, &target) {
            Ok(()) => {
                debug!("fd={fd} connected to {target} immediately");
                conn.set_connected();

                if conn.flags().status().in_handshake() {
                    conn.sock_want_send();
                }
            }
            Err(e) if e.raw_os_error() == Some(libc::EINPROGRESS) => {
                debug!("fd={fd} connecting to {target}");
                conn.set_wait_l4_conn(true);
                conn.sock_poll_send();
            }
            Err(e) => {
                conn.set_error();
                return Err(e.into());
            }
        }

        Ok(())
    }

    /// Probes a pending connect.
    fn handle_ready(&self, conn: &mut Connection, ready: Readiness) {
        if !conn.flags().status().waits_l4_conn() {
            return;
        }

        let fd = match conn.fd() {
            Ok(fd) => fd,
            Err(e) => {
                warn!("connect probe without socket: {e}");
                conn.set_error();
                return;
            }
        };

        match sys_take_socket_error(fd) {
            Ok(None) if ready.write => {
                debug!("fd={fd} L4 connection established");
                conn.set_wait_l4_conn(false);
                conn.sock_stop_both();
                conn.set_connected();
                conn.request_notify();
            }
            Ok(None) => conn.sock_poll_send(),
            Ok(Some(e)) | Err(e) => {
                debug!("fd={fd} connect failed: {e}");
                conn.set_wait_l4_conn(false);
                conn.set_error();
                conn.request_notify();
            }
        }
    }

    fn get_peer_name(&self, conn: &mut Connection) -> Result<()> {
        let fd = conn.fd()?;
        let bytes = sys_peername(fd)?;
        conn.set_peer_addr(PeerAddr::new(bytes));
        Ok(())
    }

    /// Sends a PROXY protocol v1 header announcing the connection's local
    /// and peer endpoints.
    ///
    /// The header is sent in a single call: a partial write is fatal since
    /// the peer would parse garbage.
    fn send_proxy_header(&self, conn: &mut Connection) -> Result<bool> {
        let fd = conn.fd()?;

        if conn.peer_addr().is_none() {
            self.get_peer_name(conn)?;
        }

        let src = sys_sockname(fd)?;
        let dst = match conn.peer_addr() {
            Some(peer) => peer_socket_addr(peer)?,
            None => return Err(io::Error::from(io::ErrorKind::NotConnected).into()),
        };

        let line = proxy_v1_line(&src, &dst);
        match sys_send(fd, line.as_bytes()) {
            Ok(n) if n == line.len() => Ok(true),
            Ok(n) => Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("partial PROXY header ({n}/{} bytes)", line.len()),
            )
            .into()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                conn.sock_poll_send();
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn shutw(&self, conn: &mut Connection) {
        if !conn.sock_shutw() {
            return;
        }

        if let Ok(fd) = conn.fd() {
            if let Err(e) = sys_shutdown(fd, Shutdown::Write) {
                debug!("fd={fd} shutdown(write) failed: {e}");
            }
        }
    }
}

/// Installs an accepted socket into `conn`.
///
/// The descriptor is switched to non-blocking mode, the connection is
/// marked connected and its peer address is fetched.
pub fn attach(conn: &mut Connection, fd: RawFd) -> Result<()> {
    sys_set_nonblocking(fd)?;
    conn.set_transport(Transport::Socket { fd });
    conn.set_connected();

    let ctrl = conn.ctrl();
    ctrl.get_peer_name(conn)
}

/// Interprets stored peer address bytes.
pub fn peer_socket_addr(peer: &PeerAddr) -> Result<SocketAddr> {
    let storage = bytes_to_storage(peer.as_bytes());

    match sockaddr_storage_to_socketaddr(&storage) {
        Ok(addr) => Ok(addr),
        Err(_) => Err(Error::AddressFamily(storage.ss_family as i32)),
    }
}

/// Receives into `buffer`.
///
/// Returns `Ok(None)` when the socket would block and `Ok(Some(0))` at end
/// of stream.
pub fn recv(conn: &Connection, buffer: &mut [u8]) -> Result<Option<usize>> {
    would_block(sys_recv(conn.fd()?, buffer))
}

/// Sends from `buffer`. Returns `Ok(None)` when the socket would block.
pub fn send(conn: &Connection, buffer: &[u8]) -> Result<Option<usize>> {
    would_block(sys_send(conn.fd()?, buffer))
}

fn would_block(res: io::Result<usize>) -> Result<Option<usize>> {
    match res {
        Ok(n) => Ok(Some(n)),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Builds a PROXY protocol v1 line.
pub fn proxy_v1_line(src: &SocketAddr, dst: &SocketAddr) -> String {
    match (src, dst) {
        (SocketAddr::V4(s), SocketAddr::V4(d)) => format!(
            "PROXY TCP4 {} {} {} {}\r\n",
            s.ip(),
            d.ip(),
            s.port(),
            d.port()
        ),
        (SocketAddr::V6(s), SocketAddr::V6(d)) => format!(
            "PROXY TCP6 {} {} {} {}\r\n",
            s.ip(),
            d.ip(),
            s.port(),
            d.port()
        ),
        _ => "PROXY UNKNOWN\r\n".to_string(),
    }
}
