//! The connection record.
//!
//! A [`Connection`] is the single object the event loop drives for every
//! transport kind. It binds a data layer and a control layer, owns the
//! transport handle and the peer address, and carries the [`Flags`] through
//! which both layers declare what they expect from the poller.
//!
//! Callers never touch flag bits directly: every change goes through a
//! named mutator working on a whole direction of a whole layer, and the
//! armed polling state is only written by [`Connection::update_polling`].

pub mod addr;
pub mod flags;
pub mod transport;

pub use addr::PeerAddr;
pub use flags::{Direction, Flags, Intent, Layer, PollBits, PollState};
pub use transport::Transport;

use crate::error::{Error, Result};
use crate::ops::{CtrlOps, DataOps};
use crate::poller::{Poller, Readiness};
use crate::reconcile::{self, PollChange, PollPlan};

use log::{debug, trace, warn};
use std::any::Any;
use std::fmt;
use std::io;
use std::os::fd::RawFd;

/// A connection to a client, a server or an applet.
pub struct Connection {
    data: &'static dyn DataOps,
    ctrl: &'static dyn CtrlOps,
    transport: Option<Transport>,
    flags: Flags,
    data_state: i32,
    data_ctx: Option<Box<dyn Any>>,
    peer: Option<PeerAddr>,
}

impl Connection {
    /// Creates a connection bound to its two layers.
    ///
    /// The data layer is not initialized here; the owner calls
    /// [`init_data`](Self::init_data) once it is ready to drive the
    /// connection.
    pub fn new(
        data: &'static dyn DataOps,
        ctrl: &'static dyn CtrlOps,
        transport: Option<Transport>,
    ) -> Self {
        Self {
            data,
            ctrl,
            transport,
            flags: Flags::default(),
            data_state: 0,
            data_ctx: None,
            peer: None,
        }
    }

    pub fn data(&self) -> &'static dyn DataOps {
        self.data
    }

    pub fn ctrl(&self) -> &'static dyn CtrlOps {
        self.ctrl
    }

    /// Runs the data layer's initialization.
    pub fn init_data(&mut self) -> Result<()> {
        let data = self.data;
        data.init(self)
    }

    /// Replaces the data layer in place.
    ///
    /// The state and context belonged to the previous layer: the state is
    /// reset to zero and the context is handed back to the caller.
    pub fn rebind_data(&mut self, data: &'static dyn DataOps) -> Option<Box<dyn Any>> {
        debug!("rebinding data layer {} -> {}", self.data.name(), data.name());

        self.data = data;
        self.data_state = 0;
        self.data_ctx.take()
    }

    /// Replaces the control layer in place.
    pub fn rebind_ctrl(&mut self, ctrl: &'static dyn CtrlOps) {
        debug!("rebinding control layer {} -> {}", self.ctrl.name(), ctrl.name());
        self.ctrl = ctrl;
    }

    // ---- transport ----

    pub fn transport(&self) -> Option<&Transport> {
        self.transport.as_ref()
    }

    /// Returns the descriptor of a socket transport.
    pub fn fd(&self) -> Result<RawFd> {
        match &self.transport {
            Some(transport) => transport.fd().ok_or(Error::NoDescriptor),
            None => Err(Error::Released),
        }
    }

    /// Installs the transport handle, typically once a socket exists.
    ///
    /// A different handle that was already installed is released first.
    /// Installing the current handle again does nothing.
    pub fn set_transport(&mut self, transport: Transport) {
        if self.transport.as_ref() == Some(&transport) {
            return;
        }

        if let Some(prev) = self.transport.replace(transport) {
            warn!("replacing live transport {prev:?}");
            prev.release();
        }
    }

    /// Releases the transport handle. Later calls do nothing.
    pub fn close_transport(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.release();
        }
    }

    // ---- flags ----

    pub fn flags(&self) -> &Flags {
        &self.flags
    }

    fn intent(&mut self, layer: Layer, dir: Direction) -> &mut PollBits {
        self.flags.intent_mut(layer).get_mut(dir)
    }

    /// Overwrites a layer's declared intent for one direction.
    pub fn set_intent(&mut self, layer: Layer, dir: Direction, bits: PollBits) {
        *self.intent(layer, dir) = bits;
    }

    pub fn want(&mut self, layer: Layer, dir: Direction) {
        self.intent(layer, dir).want();
    }

    pub fn stop(&mut self, layer: Layer, dir: Direction) {
        self.intent(layer, dir).stop();
    }

    pub fn poll(&mut self, layer: Layer, dir: Direction) {
        self.intent(layer, dir).poll();
    }

    pub fn data_want_recv(&mut self) {
        self.want(Layer::Data, Direction::Read);
    }

    pub fn data_stop_recv(&mut self) {
        self.stop(Layer::Data, Direction::Read);
    }

    pub fn data_poll_recv(&mut self) {
        self.poll(Layer::Data, Direction::Read);
    }

    pub fn data_want_send(&mut self) {
        self.want(Layer::Data, Direction::Write);
    }

    pub fn data_stop_send(&mut self) {
        self.stop(Layer::Data, Direction::Write);
    }

    pub fn data_poll_send(&mut self) {
        self.poll(Layer::Data, Direction::Write);
    }

    pub fn data_stop_both(&mut self) {
        self.data_stop_recv();
        self.data_stop_send();
    }

    pub fn sock_want_recv(&mut self) {
        self.want(Layer::Sock, Direction::Read);
    }

    pub fn sock_stop_recv(&mut self) {
        self.stop(Layer::Sock, Direction::Read);
    }

    pub fn sock_poll_recv(&mut self) {
        self.poll(Layer::Sock, Direction::Read);
    }

    pub fn sock_want_send(&mut self) {
        self.want(Layer::Sock, Direction::Write);
    }

    pub fn sock_stop_send(&mut self) {
        self.stop(Layer::Sock, Direction::Write);
    }

    pub fn sock_poll_send(&mut self) {
        self.poll(Layer::Sock, Direction::Write);
    }

    pub fn sock_stop_both(&mut self) {
        self.sock_stop_recv();
        self.sock_stop_send();
    }

    /// Records a readiness edge reported by the poller.
    ///
    /// Every ready direction no longer needs polling, in either layer.
    pub fn on_ready(&mut self, ready: Readiness) {
        for dir in Direction::ALL {
            let is_ready = match dir {
                Direction::Read => ready.read,
                Direction::Write => ready.write,
            };

            if is_ready {
                self.flags.data.get_mut(dir).ready();
                self.flags.sock.get_mut(dir).ready();
            }
        }
    }

    // ---- status ----

    /// Marks the connection as failed. The error is never cleared.
    pub fn set_error(&mut self) {
        if !self.flags.status.error {
            debug!("connection error: {}", self.flags);
        }
        self.flags.status.error = true;
    }

    pub fn set_connected(&mut self) {
        self.flags.status.connected = true;
    }

    pub fn set_wait_l4_conn(&mut self, waiting: bool) {
        self.flags.status.wait_l4_conn = waiting;
    }

    pub fn set_wait_l6_conn(&mut self, waiting: bool) {
        self.flags.status.wait_l6_conn = waiting;
    }

    pub fn set_send_proxy(&mut self, pending: bool) {
        self.flags.status.send_proxy = pending;
    }

    /// Asks for the data layer to be woken up after the current I/O pass.
    pub fn request_notify(&mut self) {
        self.flags.status.notify_upstream = true;
    }

    /// Consumes a pending notification request.
    pub fn take_notify(&mut self) -> bool {
        std::mem::take(&mut self.flags.status.notify_upstream)
    }

    // ---- shutdowns ----

    /// Latches a shutdown edge.
    ///
    /// Returns `true` to the first caller only; every later call for the
    /// same layer and direction returns `false`.
    pub fn latch_shutdown(&mut self, layer: Layer, dir: Direction) -> bool {
        self.flags.shut.check_and_set(layer, dir)
    }

    pub fn is_shut(&self, layer: Layer, dir: Direction) -> bool {
        self.flags.shut.is_set(layer, dir)
    }

    /// The data layer learns that nothing more will be received.
    pub fn data_read0(&mut self) -> bool {
        self.data_stop_recv();
        self.latch_shutdown(Layer::Data, Direction::Read)
    }

    /// The data layer will not send anything more.
    pub fn data_shutw(&mut self) -> bool {
        self.data_stop_send();
        self.latch_shutdown(Layer::Data, Direction::Write)
    }

    /// The socket layer learns that nothing more will be received.
    pub fn sock_read0(&mut self) -> bool {
        self.sock_stop_recv();
        self.latch_shutdown(Layer::Sock, Direction::Read)
    }

    /// The socket layer will not send anything more.
    pub fn sock_shutw(&mut self) -> bool {
        self.sock_stop_send();
        self.latch_shutdown(Layer::Sock, Direction::Write)
    }

    /// The connection may be destroyed: it failed, or both layers are shut
    /// in both directions.
    pub fn is_finished(&self) -> bool {
        self.flags.status.error || self.flags.shut.all_set()
    }

    // ---- data layer private state ----

    pub fn data_state(&self) -> i32 {
        self.data_state
    }

    pub fn set_data_state(&mut self, state: i32) {
        self.data_state = state;
    }

    /// Attaches the data layer's context, returning the previous one.
    pub fn attach_ctx(&mut self, ctx: Box<dyn Any>) -> Option<Box<dyn Any>> {
        self.data_ctx.replace(ctx)
    }

    pub fn detach_ctx(&mut self) -> Option<Box<dyn Any>> {
        self.data_ctx.take()
    }

    pub fn ctx<T: Any>(&self) -> Option<&T> {
        self.data_ctx.as_deref()?.downcast_ref()
    }

    pub fn ctx_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.data_ctx.as_deref_mut()?.downcast_mut()
    }

    // ---- peer address ----

    pub fn peer_addr(&self) -> Option<&PeerAddr> {
        self.peer.as_ref()
    }

    /// Length of the peer address, `0` when unset.
    pub fn peer_len(&self) -> usize {
        self.peer.as_ref().map_or(0, PeerAddr::len)
    }

    pub fn set_peer_addr(&mut self, peer: Option<PeerAddr>) {
        self.peer = peer;
    }

    // ---- polling ----

    /// Pushes the difference between declared and armed polling to the
    /// poller.
    ///
    /// Each direction's armed state is committed only after the poller
    /// accepted the change, so a failing call leaves it at the last state
    /// the poller knows about. Connections without a descriptor commit
    /// without calling the poller.
    pub fn update_polling<P>(&mut self, poller: &mut P) -> io::Result<PollPlan>
    where
        P: Poller + ?Sized,
    {
        let plan = reconcile::plan(&self.flags, poller.mode());
        if plan.is_noop() {
            return Ok(plan);
        }

        trace!(
            "reconcile: {} -> read={} write={}",
            self.flags, plan.read, plan.write
        );

        let fd = match &self.transport {
            Some(Transport::Socket { fd }) => Some(*fd),
            Some(Transport::Applet { .. }) | None => None,
        };

        for dir in Direction::ALL {
            let change = plan.change(dir);

            if let Some(fd) = fd {
                match change {
                    PollChange::Unchanged => continue,
                    PollChange::Enable => poller.want(fd, dir)?,
                    PollChange::Arm => poller.arm(fd, dir)?,
                    PollChange::Stop => poller.stop(fd, dir)?,
                }
            }

            self.flags.commit(dir, plan.target.get(dir));
        }

        Ok(plan)
    }

    /// Runs one I/O pass after the poller reported `ready`.
    ///
    /// The readiness edge is recorded first. While the socket layer drives
    /// polling, the control layer gets the event and pending handshakes are
    /// advanced; the data layer is only called once no handshake is left.
    /// A pending upstream notification is delivered last.
    pub fn handle_io(&mut self, ready: Readiness) {
        self.on_ready(ready);

        let ctrl = self.ctrl;
        let data = self.data;

        if !self.flags.status.error && self.flags.status.polls_sock() {
            if self.flags.status.wait_l4_conn || self.flags.status.wait_l6_conn {
                ctrl.handle_ready(self, ready);
            }

            while !self.flags.status.error
                && !self.flags.status.wait_l4_conn
                && self.flags.status.in_handshake()
            {
                if !self.advance_handshake(ctrl) {
                    break;
                }
            }
        }

        if !self.flags.status.error && !self.flags.status.polls_sock() {
            data.handle_ready(self, ready);
        }

        if self.take_notify() {
            data.wake(self);
        }
    }

    /// Runs one handshake step. Returns `false` when the step must wait.
    fn advance_handshake(&mut self, ctrl: &'static dyn CtrlOps) -> bool {
        if self.flags.status.send_proxy {
            match ctrl.send_proxy_header(self) {
                Ok(true) => {
                    debug!("PROXY header sent by {}", ctrl.name());
                    self.flags.status.send_proxy = false;
                    self.sock_stop_send();
                    self.request_notify();
                }
                Ok(false) => return false,
                Err(e) => {
                    warn!("PROXY header failed: {e}");
                    self.set_error();
                    return false;
                }
            }
        }

        true
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close_transport();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("data", &self.data.name())
            .field("ctrl", &self.ctrl.name())
            .field("transport", &self.transport)
            .field("flags", &format_args!("{}", self.flags))
            .field("data_state", &self.data_state)
            .field("peer", &self.peer)
            .finish()
    }
}
