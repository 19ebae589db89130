#![allow(dead_code)]

use conduit::connection::{Direction, PeerAddr, Transport};
use conduit::{Connection, CtrlOps, DataOps, Event, PollMode, Poller, Readiness, Result};

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::os::fd::{IntoRawFd, RawFd};
use std::time::Duration;

/// A poller call, as seen by [`RecordingPoller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Want(RawFd, Direction),
    Arm(RawFd, Direction),
    Stop(RawFd, Direction),
    Forget(RawFd),
}

/// Poller that records every call and replays queued events.
pub struct RecordingPoller {
    pub mode: PollMode,
    pub calls: Vec<Call>,
    pub fail_on: Option<Direction>,
    pub pending: Vec<Event>,
}

impl RecordingPoller {
    pub fn new(mode: PollMode) -> Self {
        Self {
            mode,
            calls: Vec::new(),
            fail_on: None,
            pending: Vec::new(),
        }
    }

    pub fn take_calls(&mut self) -> Vec<Call> {
        std::mem::take(&mut self.calls)
    }

    fn record(&mut self, dir: Direction, call: Call) -> io::Result<()> {
        if self.fail_on == Some(dir) {
            return Err(io::Error::other("injected poller failure"));
        }

        self.calls.push(call);
        Ok(())
    }
}

impl Poller for RecordingPoller {
    fn mode(&self) -> PollMode {
        self.mode
    }

    fn want(&mut self, fd: RawFd, dir: Direction) -> io::Result<()> {
        self.record(dir, Call::Want(fd, dir))
    }

    fn arm(&mut self, fd: RawFd, dir: Direction) -> io::Result<()> {
        self.record(dir, Call::Arm(fd, dir))
    }

    fn stop(&mut self, fd: RawFd, dir: Direction) -> io::Result<()> {
        self.record(dir, Call::Stop(fd, dir))
    }

    fn forget(&mut self, fd: RawFd) -> io::Result<()> {
        self.calls.push(Call::Forget(fd));
        Ok(())
    }

    fn wait(&mut self, events: &mut Vec<Event>, _timeout: Option<Duration>) -> io::Result<()> {
        events.clear();
        events.append(&mut self.pending);
        Ok(())
    }
}

/// What a [`Recorder`] data layer was asked to do.
#[derive(Debug, Default)]
pub struct Calls(pub Vec<&'static str>);

/// Data layer logging its callbacks into the connection context.
pub struct Recorder;

pub static RECORDER: Recorder = Recorder;

fn log_call(conn: &mut Connection, name: &'static str) {
    if let Some(calls) = conn.ctx_mut::<Calls>() {
        calls.0.push(name);
    }
}

impl DataOps for Recorder {
    fn name(&self) -> &'static str {
        "recorder"
    }

    fn init(&self, conn: &mut Connection) -> Result<()> {
        conn.attach_ctx(Box::new(Calls::default()));
        Ok(())
    }

    fn handle_ready(&self, conn: &mut Connection, _ready: Readiness) {
        log_call(conn, "ready");
    }

    fn shutr(&self, conn: &mut Connection) {
        log_call(conn, "shutr");
    }

    fn shutw(&self, conn: &mut Connection) {
        log_call(conn, "shutw");
    }

    fn wake(&self, conn: &mut Connection) {
        log_call(conn, "wake");
    }
}

pub fn calls(conn: &Connection) -> Vec<&'static str> {
    conn.ctx::<Calls>().map(|c| c.0.clone()).unwrap_or_default()
}

/// Control layer completing L4 connects on the first writable event.
///
/// `PROXY` headers are not supported.
pub struct Scripted;

pub static SCRIPTED: Scripted = Scripted;

impl CtrlOps for Scripted {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn connect(&self, conn: &mut Connection, _target: SocketAddr) -> Result<()> {
        conn.set_wait_l4_conn(true);
        conn.sock_poll_send();
        Ok(())
    }

    fn handle_ready(&self, conn: &mut Connection, ready: Readiness) {
        if conn.flags().status().waits_l4_conn() && ready.write {
            conn.set_wait_l4_conn(false);
            conn.sock_stop_both();
            conn.set_connected();
            conn.request_notify();
        }
    }

    fn get_peer_name(&self, conn: &mut Connection) -> Result<()> {
        conn.set_peer_addr(PeerAddr::new(vec![10, 0, 0, 1]));
        Ok(())
    }
}

/// Control layer whose PROXY header always hits a full socket buffer.
pub struct ProxyBlocked;

pub static PROXY_BLOCKED: ProxyBlocked = ProxyBlocked;

impl CtrlOps for ProxyBlocked {
    fn name(&self) -> &'static str {
        "proxy-blocked"
    }

    fn connect(&self, _conn: &mut Connection, _target: SocketAddr) -> Result<()> {
        Ok(())
    }

    fn handle_ready(&self, _conn: &mut Connection, _ready: Readiness) {}

    fn get_peer_name(&self, _conn: &mut Connection) -> Result<()> {
        Ok(())
    }

    fn send_proxy_header(&self, conn: &mut Connection) -> Result<bool> {
        conn.sock_poll_send();
        Ok(false)
    }
}

/// Control layer sending its PROXY header at once.
pub struct ProxyReady;

pub static PROXY_READY: ProxyReady = ProxyReady;

impl CtrlOps for ProxyReady {
    fn name(&self) -> &'static str {
        "proxy-ready"
    }

    fn connect(&self, _conn: &mut Connection, _target: SocketAddr) -> Result<()> {
        Ok(())
    }

    fn handle_ready(&self, _conn: &mut Connection, _ready: Readiness) {}

    fn get_peer_name(&self, _conn: &mut Connection) -> Result<()> {
        Ok(())
    }

    fn send_proxy_header(&self, _conn: &mut Connection) -> Result<bool> {
        Ok(true)
    }
}

/// A connection over a real descriptor the connection may close.
pub fn socket_conn(data: &'static dyn DataOps, ctrl: &'static dyn CtrlOps) -> (Connection, RawFd) {
    let fd = UdpSocket::bind("127.0.0.1:0")
        .expect("Failed to bind socket")
        .into_raw_fd();

    (Connection::new(data, ctrl, Some(Transport::Socket { fd })), fd)
}

/// A connection without descriptor.
pub fn applet_conn(data: &'static dyn DataOps, ctrl: &'static dyn CtrlOps) -> Connection {
    Connection::new(data, ctrl, Some(Transport::Applet { id: 7 }))
}

pub fn read_only() -> Readiness {
    Readiness {
        read: true,
        write: false,
    }
}

pub fn write_only() -> Readiness {
    Readiness {
        read: false,
        write: true,
    }
}

pub fn proptest_config(cases: u32) -> proptest::test_runner::Config {
    proptest::test_runner::Config {
        cases,
        ..proptest::test_runner::Config::default()
    }
}

/// Whether `fd` still names an open descriptor.
pub fn fd_is_open(fd: RawFd) -> bool {
    unsafe { libc::fcntl(fd, libc::F_GETFD) != -1 }
}
