//! Single-threaded reactor.
//!
//! The reactor owns socket connections keyed by descriptor. Each turn it:
//!
//! 1. pushes pending polling changes and reaps finished connections,
//! 2. waits for readiness from the poller,
//! 3. runs the I/O pass of every connection that got an event,
//! 4. pushes the resulting polling changes back to the poller,
//! 5. destroys connections that failed or finished shutting down.
//!
//! Connections are only ever touched from the thread calling
//! [`Reactor::turn`].

use crate::connection::Connection;
use crate::error::Result;
use crate::poller::{Event, Poller};

use log::{debug, trace, warn};
use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

pub struct Reactor<P: Poller> {
    poller: P,
    events: Vec<Event>,
    conns: HashMap<RawFd, Connection>,
}

impl<P: Poller> Reactor<P> {
    pub fn new(poller: P) -> Self {
        Self {
            poller,
            events: Vec::with_capacity(64),
            conns: HashMap::new(),
        }
    }

    pub fn poller(&self) -> &P {
        &self.poller
    }

    pub fn poller_mut(&mut self) -> &mut P {
        &mut self.poller
    }

    /// Takes ownership of a socket connection.
    ///
    /// The data layer is initialized and the initial polling intent is
    /// pushed to the poller. On failure the connection is dropped, which
    /// releases its transport.
    pub fn register(&mut self, mut conn: Connection) -> Result<RawFd> {
        let fd = conn.fd()?;

        conn.init_data()?;
        conn.update_polling(&mut self.poller)?;

        debug!("registered fd={fd} data={} ctrl={}", conn.data().name(), conn.ctrl().name());
        self.conns.insert(fd, conn);

        Ok(fd)
    }

    /// Hands a connection back to the caller without closing it.
    pub fn deregister(&mut self, fd: RawFd) -> Option<Connection> {
        let conn = self.conns.remove(&fd)?;

        if let Err(e) = self.poller.forget(fd) {
            debug!("fd={fd} forget failed: {e}");
        }

        Some(conn)
    }

    pub fn get(&self, fd: RawFd) -> Option<&Connection> {
        self.conns.get(&fd)
    }

    pub fn get_mut(&mut self, fd: RawFd) -> Option<&mut Connection> {
        self.conns.get_mut(&fd)
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// Runs one poll/dispatch cycle. Returns the number of events handled.
    ///
    /// Changes made through [`get_mut`](Self::get_mut) since the last turn
    /// are pushed to the poller first, and connections that finished in
    /// the meantime are reaped without waiting for an event.
    pub fn turn(&mut self, timeout: Option<Duration>) -> io::Result<usize> {
        self.settle();
        if self.conns.is_empty() {
            return Ok(0);
        }

        let mut events = std::mem::take(&mut self.events);
        self.poller.wait(&mut events, timeout)?;

        for event in &events {
            self.handle_event(*event);
        }

        let handled = events.len();
        self.events = events;

        Ok(handled)
    }

    /// Turns until every connection is gone or `max_turns` were run.
    /// Returns the number of turns run.
    pub fn run(&mut self, max_turns: usize, timeout: Option<Duration>) -> io::Result<usize> {
        let mut turns = 0;

        while !self.conns.is_empty() && turns < max_turns {
            self.turn(timeout)?;
            turns += 1;
        }

        Ok(turns)
    }

    fn handle_event(&mut self, event: Event) {
        let Some(conn) = self.conns.get_mut(&event.fd) else {
            trace!("event for unknown fd={}", event.fd);
            return;
        };

        conn.handle_io(event.readiness());

        if let Err(e) = conn.update_polling(&mut self.poller) {
            warn!("fd={} polling update failed: {e}", event.fd);
            conn.set_error();
        }

        if conn.is_finished() {
            self.reap(event.fd);
        }
    }

    /// Reconciles every connection and reaps the finished ones.
    fn settle(&mut self) {
        let mut finished = Vec::new();

        for (&fd, conn) in self.conns.iter_mut() {
            if let Err(e) = conn.update_polling(&mut self.poller) {
                warn!("fd={fd} polling update failed: {e}");
                conn.set_error();
            }

            if conn.is_finished() {
                finished.push(fd);
            }
        }

        for fd in finished {
            self.reap(fd);
        }
    }

    fn reap(&mut self, fd: RawFd) {
        if let Some(mut conn) = self.deregister(fd) {
            debug!("reaping fd={fd}: {}", conn.flags());
            conn.close_transport();
        }
    }
}
