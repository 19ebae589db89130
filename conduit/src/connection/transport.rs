use crate::poller::platform::sys_close;

use std::os::fd::RawFd;

/// Transport-specific identity of a connection.
///
/// Socket-based connections are identified by their descriptor. Applets run
/// in-process and are identified by the id their owner hands out. New kinds
/// of transports get a new variant; code keyed on the transport kind matches
/// exhaustively.
///
/// A handle owns what it names and is neither `Clone` nor `Copy`.
#[derive(Debug, PartialEq, Eq)]
pub enum Transport {
    /// A stream socket. The connection owns the descriptor.
    Socket { fd: RawFd },

    /// An in-process service standing in for a socket.
    Applet { id: usize },
}

impl Transport {
    /// Returns the descriptor of socket transports.
    pub fn fd(&self) -> Option<RawFd> {
        match self {
            Transport::Socket { fd } => Some(*fd),
            Transport::Applet { .. } => None,
        }
    }

    /// Releases the resources behind the handle.
    ///
    /// Consumes the handle so it cannot be released twice.
    pub(crate) fn release(self) {
        match self {
            Transport::Socket { fd } => {
                log::debug!("closing socket fd={fd}");
                sys_close(fd);
            }
            Transport::Applet { id } => {
                log::debug!("detaching applet id={id}");
            }
        }
    }
}
