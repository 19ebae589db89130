//! Linux `epoll`-based poller implementation.
//!
//! Each direction of a descriptor is in one of three states:
//!
//! - stopped: ignored,
//! - speculative: reported ready on every wait without asking the kernel,
//!   until the owner declares it must be polled,
//! - polled: registered in the epoll set.
//!
//! Only transitions that change the registered epoll mask cost a syscall,
//! so enabling speculative I/O on a direction that was not polled is free.

use super::event::Event;
use super::Poller;
use crate::config::PollerConfig;
use crate::connection::flags::Direction;
use crate::reconcile::PollMode;

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, EPOLLERR, EPOLLHUP, EPOLLIN,
    EPOLLOUT, epoll_create1, epoll_ctl, epoll_event, epoll_wait,
};
use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum DirState {
    #[default]
    Stopped,
    Speculative,
    Polled,
}

#[derive(Debug, Clone, Copy, Default)]
struct FdState {
    read: DirState,
    write: DirState,
    /// Mask currently registered in the epoll set, `0` when unregistered.
    mask: u32,
}

impl FdState {
    fn set(&mut self, dir: Direction, state: DirState) {
        match dir {
            Direction::Read => self.read = state,
            Direction::Write => self.write = state,
        }
    }

    fn wanted_mask(&self) -> u32 {
        let mut mask = 0;

        if self.read == DirState::Polled {
            mask |= EPOLLIN as u32;
        }
        if self.write == DirState::Polled {
            mask |= EPOLLOUT as u32;
        }

        mask
    }

    fn is_idle(&self) -> bool {
        self.read == DirState::Stopped && self.write == DirState::Stopped && self.mask == 0
    }
}

/// Upper bound of events collected per `epoll_wait`.
pub const MAX_EVENTS: usize = 1 << 16;

/// Linux `epoll` poller.
pub struct EpollPoller {
    /// Epoll file descriptor.
    epoll: RawFd,

    mode: PollMode,

    /// Reusable buffer for epoll events.
    events: Vec<epoll_event>,

    /// Events collected per wait, within `1..=MAX_EVENTS`.
    max_events: usize,

    fds: HashMap<RawFd, FdState>,
}

impl EpollPoller {
    pub fn new(mode: PollMode) -> io::Result<Self> {
        Self::with_config(&PollerConfig {
            mode,
            ..PollerConfig::default()
        })
    }

    /// Creates a poller from its configuration. `max_events` is clamped
    /// to `1..=MAX_EVENTS`.
    pub fn with_config(config: &PollerConfig) -> io::Result<Self> {
        let max_events = config.max_events.clamp(1, MAX_EVENTS);

        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            epoll,
            mode: config.mode,
            events: Vec::with_capacity(max_events),
            max_events,
            fds: HashMap::new(),
        })
    }

    pub fn max_events(&self) -> usize {
        self.max_events
    }

    fn ctl(&self, op: i32, fd: RawFd, mask: u32) -> io::Result<()> {
        let mut event = epoll_event {
            events: mask,
            u64: fd as u64,
        };

        let rc = unsafe { epoll_ctl(self.epoll, op, fd, &mut event) };
        if rc < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    fn transition(&mut self, fd: RawFd, dir: Direction, state: DirState) -> io::Result<()> {
        let prev = self.fds.get(&fd).copied().unwrap_or_default();
        let mut next = prev;
        next.set(dir, state);

        let mask = next.wanted_mask();
        if mask != prev.mask {
            let op = match (prev.mask, mask) {
                (0, _) => EPOLL_CTL_ADD,
                (_, 0) => EPOLL_CTL_DEL,
                _ => EPOLL_CTL_MOD,
            };

            log::trace!("epoll_ctl op={op} fd={fd} mask={mask:#x}");
            self.ctl(op, fd, mask)?;
            next.mask = mask;
        }

        if next.is_idle() {
            self.fds.remove(&fd);
        } else {
            self.fds.insert(fd, next);
        }

        Ok(())
    }
}

impl Poller for EpollPoller {
    fn mode(&self) -> PollMode {
        self.mode
    }

    fn want(&mut self, fd: RawFd, dir: Direction) -> io::Result<()> {
        self.transition(fd, dir, DirState::Speculative)
    }

    fn arm(&mut self, fd: RawFd, dir: Direction) -> io::Result<()> {
        self.transition(fd, dir, DirState::Polled)
    }

    fn stop(&mut self, fd: RawFd, dir: Direction) -> io::Result<()> {
        self.transition(fd, dir, DirState::Stopped)
    }

    fn forget(&mut self, fd: RawFd) -> io::Result<()> {
        match self.fds.remove(&fd) {
            Some(state) if state.mask != 0 => self.ctl(EPOLL_CTL_DEL, fd, 0),
            _ => Ok(()),
        }
    }

    /// Speculative directions are reported first, and make the wait
    /// non-blocking so they are serviced on this very turn.
    fn wait(&mut self, events: &mut Vec<Event>, timeout: Option<Duration>) -> io::Result<()> {
        events.clear();

        for (&fd, state) in &self.fds {
            let readable = state.read == DirState::Speculative;
            let writable = state.write == DirState::Speculative;

            if readable || writable {
                events.push(Event {
                    fd,
                    readable,
                    writable,
                });
            }
        }

        let timeout_ms = if !events.is_empty() {
            0
        } else {
            timeout
                .map(|t| t.as_millis().min(i32::MAX as u128) as i32)
                .unwrap_or(-1)
        };

        unsafe {
            self.events.set_len(0);
        }

        let n = unsafe {
            epoll_wait(
                self.epoll,
                self.events.as_mut_ptr(),
                self.max_events as i32,
                timeout_ms,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        unsafe {
            self.events.set_len(n as usize);
        }

        for ev in &self.events {
            let fd = ev.u64 as RawFd;

            let readable = ev.events & ((EPOLLIN | EPOLLERR | EPOLLHUP) as u32) != 0;
            let writable = ev.events & (EPOLLOUT as u32) != 0;

            if let Some(e) = events.iter_mut().find(|e| e.fd == fd) {
                e.readable |= readable;
                e.writable |= writable;
            } else {
                events.push(Event {
                    fd,
                    readable,
                    writable,
                });
            }
        }

        Ok(())
    }
}

impl Drop for EpollPoller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epoll);
        }
    }
}
