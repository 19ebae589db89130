//! Layer operations.
//!
//! A connection is driven by two independent layers. The data layer deals
//! with payload (raw forwarding, encryption, applet shims); the control
//! layer deals with the transport (connecting, probing, peer addresses,
//! handshakes). Both are bound once per connection as `&'static` trait
//! objects shared by every connection of the same kind.

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::poller::Readiness;

use std::net::SocketAddr;

/// Operations of the data layer.
pub trait DataOps: Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Prepares the connection for this layer, usually by declaring an
    /// initial polling intent or attaching a context.
    fn init(&self, conn: &mut Connection) -> Result<()>;

    /// Called by the owning loop when the connection may make progress.
    ///
    /// Implementations try their I/O and declare what they need next with
    /// the `data_*` mutators. A would-block result is expressed with
    /// `data_poll_recv`/`data_poll_send`.
    fn handle_ready(&self, conn: &mut Connection, ready: Readiness);

    /// The transport will not deliver more data.
    fn shutr(&self, conn: &mut Connection);

    /// No more data will be sent through this layer.
    fn shutw(&self, conn: &mut Connection);

    /// Delivers a pending upstream notification.
    fn wake(&self, _conn: &mut Connection) {}
}

/// Operations of the control layer.
pub trait CtrlOps: Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Starts connecting the connection to `target`.
    fn connect(&self, conn: &mut Connection, target: SocketAddr) -> Result<()>;

    /// Called by the owning loop while the socket layer drives polling.
    fn handle_ready(&self, conn: &mut Connection, ready: Readiness);

    /// Retrieves the peer's address into the connection.
    fn get_peer_name(&self, conn: &mut Connection) -> Result<()>;

    /// Emits the PROXY protocol header.
    ///
    /// Returns `Ok(true)` once the header is out and `Ok(false)` when the
    /// socket would block, after declaring socket-layer write polling.
    fn send_proxy_header(&self, _conn: &mut Connection) -> Result<bool> {
        Err(Error::Unsupported("PROXY protocol header"))
    }

    /// Shuts the transport down for writing.
    fn shutw(&self, conn: &mut Connection) {
        conn.sock_shutw();
    }
}
