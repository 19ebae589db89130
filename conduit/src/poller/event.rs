use std::os::fd::RawFd;

/// An I/O event reported by the poller.
///
/// An `Event` represents readiness information for a descriptor. It is
/// produced by the poller and consumed by the reactor, which hands it to
/// the connection owning the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// The descriptor the event is about.
    pub fd: RawFd,

    /// Indicates that the descriptor is readable. Errors and hang-ups are
    /// reported as readable.
    pub readable: bool,

    /// Indicates that the descriptor is writable.
    pub writable: bool,
}

impl Event {
    pub fn readiness(&self) -> Readiness {
        Readiness {
            read: self.readable,
            write: self.writable,
        }
    }
}

/// The directions a layer may make progress on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    pub read: bool,
    pub write: bool,
}

impl Readiness {
    pub const NONE: Readiness = Readiness {
        read: false,
        write: false,
    };

    pub const BOTH: Readiness = Readiness {
        read: true,
        write: true,
    };

    pub fn is_empty(&self) -> bool {
        !self.read && !self.write
    }
}
