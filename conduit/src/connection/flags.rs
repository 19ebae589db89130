//! Structured connection flags.
//!
//! Every connection carries five families of state:
//!
//! - the polling intent declared by the data layer,
//! - the polling intent declared by the socket (control) layer,
//! - the polling state currently armed in the poller,
//! - lifecycle status (error, connected, handshakes in progress),
//! - one-shot shutdown latches per layer and direction.
//!
//! Polling intent is expressed per direction with two bits. `enabled` says
//! that any suspected activity may call the layer back; `polled` says the
//! last attempt hit a would-block condition and the poller must report
//! readiness before trying again:
//!
//! | polled | enabled | state   |
//! |--------|---------|---------|
//! |   0    |    0    | STOPPED |
//! |   0    |    1    | ENABLED |
//! |   1    |    0    | STOPPED |
//! |   1    |    1    | POLLED  |
//!
//! For pollers that cannot do speculative I/O, POLLED and ENABLED mean the
//! same thing and `polled` can be ignored.

use std::fmt;

/// An I/O direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    /// Both directions, read first.
    pub const ALL: [Direction; 2] = [Direction::Read, Direction::Write];
}

/// The layer declaring a polling intent or observing a shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    /// Payload handling: raw forwarding, TLS, applet shims.
    Data,
    /// Transport mechanics: connect, accept, handshake sequencing.
    Sock,
}

/// The polling state of a single direction, as seen by the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Stopped,
    Enabled,
    Polled,
}

/// Polling bits of one direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollBits {
    enabled: bool,
    polled: bool,
}

impl PollBits {
    pub const STOPPED: PollBits = PollBits::new(false, false);
    pub const ENABLED: PollBits = PollBits::new(true, false);
    pub const POLLED: PollBits = PollBits::new(true, true);

    pub const fn new(enabled: bool, polled: bool) -> Self {
        Self { enabled, polled }
    }

    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub const fn needs_poll(&self) -> bool {
        self.polled
    }

    /// Collapses the two bits into their meaning.
    ///
    /// A `polled` bit without `enabled` carries no meaning and reads as
    /// stopped.
    pub const fn state(&self) -> PollState {
        match (self.enabled, self.polled) {
            (false, _) => PollState::Stopped,
            (true, false) => PollState::Enabled,
            (true, true) => PollState::Polled,
        }
    }

    pub(crate) fn want(&mut self) {
        self.enabled = true;
    }

    pub(crate) fn stop(&mut self) {
        self.enabled = false;
        self.polled = false;
    }

    pub(crate) fn poll(&mut self) {
        self.enabled = true;
        self.polled = true;
    }

    /// A readiness edge was reported for this direction.
    pub(crate) fn ready(&mut self) {
        self.polled = false;
    }
}

/// Polling bits for both directions of one layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Intent {
    pub read: PollBits,
    pub write: PollBits,
}

impl Intent {
    pub const STOPPED: Intent = Intent {
        read: PollBits::STOPPED,
        write: PollBits::STOPPED,
    };

    pub const fn new(read: PollBits, write: PollBits) -> Self {
        Self { read, write }
    }

    pub fn get(&self, dir: Direction) -> PollBits {
        match dir {
            Direction::Read => self.read,
            Direction::Write => self.write,
        }
    }

    pub(crate) fn get_mut(&mut self, dir: Direction) -> &mut PollBits {
        match dir {
            Direction::Read => &mut self.read,
            Direction::Write => &mut self.write,
        }
    }
}

/// Lifecycle and handshake status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Status {
    /// A fatal error was reported. Sticky.
    pub(crate) error: bool,
    /// The transport is established.
    pub(crate) connected: bool,
    /// Waiting for the transport (L4) to connect.
    pub(crate) wait_l4_conn: bool,
    /// Waiting for the session (L6) to connect, e.g. a TLS handshake.
    pub(crate) wait_l6_conn: bool,
    /// A PROXY protocol header must be sent before any data.
    pub(crate) send_proxy: bool,
    /// The upper layer asked to be told about a change.
    pub(crate) notify_upstream: bool,
}

impl Status {
    pub fn is_error(&self) -> bool {
        self.error
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn waits_l4_conn(&self) -> bool {
        self.wait_l4_conn
    }

    pub fn waits_l6_conn(&self) -> bool {
        self.wait_l6_conn
    }

    pub fn sends_proxy(&self) -> bool {
        self.send_proxy
    }

    pub fn notify_pending(&self) -> bool {
        self.notify_upstream
    }

    /// Any handshake step is still pending.
    ///
    /// New handshake kinds are added to this disjunction.
    pub fn in_handshake(&self) -> bool {
        self.send_proxy
    }

    /// Polling is driven by the socket layer instead of the data layer.
    pub fn polls_sock(&self) -> bool {
        self.in_handshake() || self.wait_l4_conn || self.wait_l6_conn
    }
}

/// One-shot shutdown records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownLatches {
    /// The data layer was told about a read shutdown.
    data_read: bool,
    /// The data layer asked for a write shutdown.
    data_write: bool,
    /// The socket layer was told about a read shutdown.
    sock_read: bool,
    /// The socket layer asked for a write shutdown.
    sock_write: bool,
}

impl ShutdownLatches {
    pub fn is_set(&self, layer: Layer, dir: Direction) -> bool {
        match (layer, dir) {
            (Layer::Data, Direction::Read) => self.data_read,
            (Layer::Data, Direction::Write) => self.data_write,
            (Layer::Sock, Direction::Read) => self.sock_read,
            (Layer::Sock, Direction::Write) => self.sock_write,
        }
    }

    /// Sets the latch and returns `true` if this call was the one setting it.
    pub(crate) fn check_and_set(&mut self, layer: Layer, dir: Direction) -> bool {
        let latch = match (layer, dir) {
            (Layer::Data, Direction::Read) => &mut self.data_read,
            (Layer::Data, Direction::Write) => &mut self.data_write,
            (Layer::Sock, Direction::Read) => &mut self.sock_read,
            (Layer::Sock, Direction::Write) => &mut self.sock_write,
        };

        !std::mem::replace(latch, true)
    }

    pub fn all_set(&self) -> bool {
        self.data_read && self.data_write && self.sock_read && self.sock_write
    }
}

/// The complete flag set of a connection.
///
/// Upper layers change declared intents and status through
/// [`Connection`](super::Connection); the current polling state is written
/// only by the reconciler after the poller accepted a change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub(crate) data: Intent,
    pub(crate) sock: Intent,
    curr: Intent,
    pub(crate) status: Status,
    pub(crate) shut: ShutdownLatches,
}

impl Flags {
    pub fn data(&self) -> Intent {
        self.data
    }

    pub fn sock(&self) -> Intent {
        self.sock
    }

    /// The polling state last communicated to the poller.
    pub fn curr(&self) -> Intent {
        self.curr
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn shutdowns(&self) -> &ShutdownLatches {
        &self.shut
    }

    pub(crate) fn intent_mut(&mut self, layer: Layer) -> &mut Intent {
        match layer {
            Layer::Data => &mut self.data,
            Layer::Sock => &mut self.sock,
        }
    }

    /// The intent that currently drives polling.
    pub fn effective(&self) -> Intent {
        if self.status.polls_sock() {
            self.sock
        } else {
            self.data
        }
    }

    /// Records what the poller accepted for `dir`.
    pub(crate) fn commit(&mut self, dir: Direction, bits: PollBits) {
        *self.curr.get_mut(dir) = bits;
    }
}

impl fmt::Display for PollBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self.state() {
            PollState::Stopped => "-",
            PollState::Enabled => "E",
            PollState::Polled => "P",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}w{}", self.read, self.write)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data={} sock={} curr={}", self.data, self.sock, self.curr)?;

        let status = [
            (self.status.error, "ERR"),
            (self.status.connected, "CONN"),
            (self.status.wait_l4_conn, "L4"),
            (self.status.wait_l6_conn, "L6"),
            (self.status.send_proxy, "PROXY"),
            (self.status.notify_upstream, "NOTIFY"),
        ];
        for (set, name) in status {
            if set {
                write!(f, " {name}")?;
            }
        }

        let shut = [
            (self.shut.data_read, "DRSH"),
            (self.shut.data_write, "DWSH"),
            (self.shut.sock_read, "SRSH"),
            (self.shut.sock_write, "SWSH"),
        ];
        for (set, name) in shut {
            if set {
                write!(f, " {name}")?;
            }
        }

        Ok(())
    }
}
