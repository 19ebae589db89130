//! Dials a TCP server, sends one line and prints everything it answers
//! until it closes the connection.
//!
//! ```text
//! cargo run --example dial -- 127.0.0.1:8080 [config.toml]
//! RUST_LOG=trace cargo run --example dial -- 127.0.0.1:8080
//! ```

use conduit::poller::EpollPoller;
use conduit::tcp::{self, TCP};
use conduit::{Config, Connection, CtrlOps, DataOps, Reactor, Readiness, Result};

use log::{error, info};
use std::io::Write;
use std::net::SocketAddr;
use std::time::Duration;

const REQUEST: &[u8] = b"GET / HTTP/1.0\r\n\r\n";

struct Dump {
    sent: usize,
}

struct Dumper;

static DUMPER: Dumper = Dumper;

impl DataOps for Dumper {
    fn name(&self) -> &'static str {
        "dumper"
    }

    fn init(&self, conn: &mut Connection) -> Result<()> {
        conn.attach_ctx(Box::new(Dump { sent: 0 }));
        conn.data_want_send();
        conn.data_want_recv();
        Ok(())
    }

    fn handle_ready(&self, conn: &mut Connection, _ready: Readiness) {
        let sent = conn.ctx::<Dump>().map_or(REQUEST.len(), |d| d.sent);

        if sent < REQUEST.len() {
            match tcp::send(conn, &REQUEST[sent..]) {
                Ok(Some(n)) => {
                    if let Some(d) = conn.ctx_mut::<Dump>() {
                        d.sent += n;
                        if d.sent == REQUEST.len() {
                            conn.data_stop_send();
                        }
                    }
                }
                Ok(None) => conn.data_poll_send(),
                Err(e) => {
                    error!("send failed: {e}");
                    conn.set_error();
                    return;
                }
            }
        }

        let mut buffer = [0u8; 4096];
        loop {
            match tcp::recv(conn, &mut buffer) {
                Ok(Some(0)) => {
                    info!("server closed the connection");
                    self.shutr(conn);
                    self.shutw(conn);
                    return;
                }
                Ok(Some(n)) => {
                    let _ = std::io::stdout().write_all(&buffer[..n]);
                }
                Ok(None) => {
                    conn.data_poll_recv();
                    return;
                }
                Err(e) => {
                    error!("recv failed: {e}");
                    conn.set_error();
                    return;
                }
            }
        }
    }

    fn shutr(&self, conn: &mut Connection) {
        conn.data_read0();
        conn.sock_read0();
    }

    fn shutw(&self, conn: &mut Connection) {
        if conn.data_shutw() {
            let ctrl = conn.ctrl();
            ctrl.shutw(conn);
        }
    }

    fn wake(&self, conn: &mut Connection) {
        info!("connected: {}", conn.flags());
    }
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let _logger = flexi_logger::Logger::try_with_env_or_str("info")?.start()?;

    let mut args = std::env::args().skip(1);
    let target: SocketAddr = args
        .next()
        .ok_or("usage: dial <addr> [config.toml]")?
        .parse()?;

    let config = match args.next() {
        Some(path) => Config::from_path(path)?,
        None => Config::default(),
    };
    info!("poller mode {:?}, dialing {target}", config.poller.mode);

    let mut conn = Connection::new(&DUMPER, &TCP, None);
    let ctrl = conn.ctrl();
    ctrl.connect(&mut conn, target)?;

    let mut reactor = Reactor::new(EpollPoller::with_config(&config.poller)?);
    reactor.register(conn)?;

    let turns = reactor.run(usize::MAX, Some(Duration::from_secs(30)))?;
    info!("done after {turns} turns");

    Ok(())
}
