//! # Conduit
//!
//! **Conduit** is the connection abstraction layer of an event-driven proxy.
//! It gives every transport kind (plain sockets, in-process applets, and
//! anything a data layer such as TLS builds on top of them) a single
//! per-connection object and a single polling contract, so that one event
//! loop can drive any number of connections through the OS readiness
//! facility without special-casing transports.
//!
//! The heart of the crate is the polling-intent state machine:
//!
//! - the data layer and the socket layer each declare, per direction,
//!   whether they want to do I/O and whether they must wait for readiness
//!   first,
//! - the [`reconcile`] module merges both declarations (the socket layer
//!   wins while a handshake is pending) and diffs the result against what
//!   the poller was last told,
//! - only the difference is pushed to the [`Poller`], and the armed state
//!   is remembered once the poller accepted it,
//! - shutdown edges are latched so each layer hears about each of them at
//!   most once.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use conduit::poller::EpollPoller;
//! use conduit::reconcile::PollMode;
//! use conduit::{Connection, Reactor, tcp};
//!
//! let mut conn = Connection::new(&MY_DATA_LAYER, &tcp::TCP, None);
//! conn.ctrl().connect(&mut conn, "127.0.0.1:8080".parse()?)?;
//!
//! let mut reactor = Reactor::new(EpollPoller::new(PollMode::Speculative)?);
//! reactor.register(conn)?;
//! reactor.run(usize::MAX, None)?;
//! ```
//!
//! ## Modules
//!
//! - [`connection`] — The connection record and its flags
//! - [`reconcile`] — Polling-intent reconciliation
//! - [`ops`] — Data-layer and control-layer operations
//! - [`poller`] — Poller interface and the epoll backend
//! - [`tcp`] — TCP control layer
//! - [`reactor`] — A single-threaded loop driving connections
//! - [`config`] — TOML configuration

pub mod config;
pub mod connection;
pub mod error;
pub mod ops;
pub mod poller;
pub mod reactor;
pub mod reconcile;
pub mod tcp;

pub use config::Config;
pub use connection::{Connection, Direction, Layer, PeerAddr, Transport};
pub use error::{Error, Result};
pub use ops::{CtrlOps, DataOps};
pub use poller::{Event, Poller, Readiness};
pub use reactor::Reactor;
pub use reconcile::{PollChange, PollMode, PollPlan};
