//! Poller abstraction.
//!
//! A poller turns the polling changes computed by the reconciler into
//! readiness notifications. The reconciler only ever asks for three things
//! per direction:
//!
//! - `want`: the direction may be tried speculatively,
//! - `arm`: the direction must be watched for readiness,
//! - `stop`: the direction must not be watched any more.
//!
//! The concrete implementation is selected at compile time depending on
//! the target operating system. Tests provide their own implementations of
//! [`Poller`].

mod event;

pub use event::{Event, Readiness};

#[cfg(unix)]
pub(crate) mod unix;

#[cfg(unix)]
pub(crate) use unix as platform;

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(target_os = "linux")]
pub use epoll::{EpollPoller, MAX_EVENTS};

use crate::connection::flags::Direction;
use crate::reconcile::PollMode;

use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

/// Readiness notification backend.
pub trait Poller {
    /// Whether enabled directions may be tried before being polled.
    fn mode(&self) -> PollMode;

    /// Enables speculative I/O on `dir`.
    fn want(&mut self, fd: RawFd, dir: Direction) -> io::Result<()>;

    /// Watches `dir` for readiness.
    fn arm(&mut self, fd: RawFd, dir: Direction) -> io::Result<()>;

    /// Stops watching `dir`.
    fn stop(&mut self, fd: RawFd, dir: Direction) -> io::Result<()>;

    /// Drops every state kept for `fd`. Called right before the descriptor
    /// is closed.
    fn forget(&mut self, fd: RawFd) -> io::Result<()>;

    /// Collects readiness into `events`.
    ///
    /// Blocks until at least one descriptor is ready or the optional
    /// timeout expires.
    fn wait(&mut self, events: &mut Vec<Event>, timeout: Option<Duration>) -> io::Result<()>;
}
