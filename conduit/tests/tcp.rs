#[cfg(target_os = "linux")]
mod tests {
    use conduit::connection::{Direction, Layer};
    use conduit::config::PollerConfig;
    use conduit::poller::{EpollPoller, MAX_EVENTS};
    use conduit::tcp::{self, TCP};
    use conduit::{Connection, CtrlOps, DataOps, PollMode, Poller, Reactor, Readiness, Result};

    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{SocketAddr, TcpListener, TcpStream};
    use std::os::fd::IntoRawFd;
    use std::sync::mpsc::{self, Sender};
    use std::thread;
    use std::time::Duration;

    const HELLO: &[u8] = b"hello";

    /// Per-connection state of [`Greeter`].
    struct Greeting {
        sent: usize,
        received: Vec<u8>,
        done: Option<Sender<Vec<u8>>>,
    }

    /// Data layer sending `hello`, closing its write side and collecting
    /// whatever comes back until end of stream.
    struct Greeter;

    static GREETER: Greeter = Greeter;

    impl Greeter {
        fn flush(&self, conn: &mut Connection) {
            let Some(sent) = conn.ctx::<Greeting>().map(|g| g.sent) else {
                return;
            };

            if sent < HELLO.len() {
                match tcp::send(conn, &HELLO[sent..]) {
                    Ok(Some(n)) => {
                        if let Some(g) = conn.ctx_mut::<Greeting>() {
                            g.sent += n;
                        }
                    }
                    Ok(None) => {
                        conn.data_poll_send();
                        return;
                    }
                    Err(_) => {
                        conn.set_error();
                        return;
                    }
                }
            }

            let done = conn.ctx::<Greeting>().is_some_and(|g| g.sent == HELLO.len());
            if done && conn.data_shutw() {
                let ctrl = conn.ctrl();
                ctrl.shutw(conn);
            }
        }

        fn drain(&self, conn: &mut Connection) {
            if conn.is_shut(Layer::Data, Direction::Read) {
                return;
            }

            let mut buffer = [0u8; 64];
            loop {
                match tcp::recv(conn, &mut buffer) {
                    Ok(Some(0)) => {
                        conn.data_read0();
                        conn.sock_read0();
                        if let Some(g) = conn.ctx_mut::<Greeting>() {
                            if let Some(done) = g.done.take() {
                                let _ = done.send(std::mem::take(&mut g.received));
                            }
                        }
                        return;
                    }
                    Ok(Some(n)) => {
                        if let Some(g) = conn.ctx_mut::<Greeting>() {
                            g.received.extend_from_slice(&buffer[..n]);
                        }
                    }
                    Ok(None) => {
                        conn.data_poll_recv();
                        return;
                    }
                    Err(_) => {
                        conn.set_error();
                        return;
                    }
                }
            }
        }
    }

    impl DataOps for Greeter {
        fn name(&self) -> &'static str {
            "greeter"
        }

        fn init(&self, conn: &mut Connection) -> Result<()> {
            conn.data_want_send();
            conn.data_want_recv();
            Ok(())
        }

        fn handle_ready(&self, conn: &mut Connection, _ready: Readiness) {
            self.flush(conn);
            self.drain(conn);
        }

        fn shutr(&self, conn: &mut Connection) {
            conn.data_read0();
        }

        fn shutw(&self, conn: &mut Connection) {
            conn.data_shutw();
        }
    }

    fn greeting_conn() -> (Connection, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel();
        let mut conn = Connection::new(&GREETER, &TCP, None);
        conn.attach_ctx(Box::new(Greeting {
            sent: 0,
            received: Vec::new(),
            done: Some(tx),
        }));

        (conn, rx)
    }

    /// Accepts one client, expects `hello`, answers `world` and waits for
    /// the client to close. Returns the PROXY line if one was expected.
    fn spawn_server(
        listener: TcpListener,
        expect_proxy: bool,
    ) -> thread::JoinHandle<(Option<String>, SocketAddr)> {
        thread::spawn(move || {
            let (stream, client) = listener.accept().expect("Failed to accept connection");
            let mut reader = BufReader::new(stream);

            let line = expect_proxy.then(|| {
                let mut line = String::new();
                reader
                    .read_line(&mut line)
                    .expect("Failed to read PROXY line");
                line
            });

            let mut buffer = [0; 5];
            reader
                .read_exact(&mut buffer)
                .expect("Failed to read from stream");
            assert_eq!(&buffer, HELLO);

            reader
                .get_mut()
                .write_all(b"world")
                .expect("Failed to write to stream");

            let mut rest = Vec::new();
            reader
                .read_to_end(&mut rest)
                .expect("Failed to read until close");
            assert!(rest.is_empty());

            (line, client)
        })
    }

    fn exchange(mode: PollMode, send_proxy: bool) -> (Vec<u8>, Option<String>, SocketAddr, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
        let addr = listener.local_addr().expect("Failed to get local address");
        let server = spawn_server(listener, send_proxy);

        let (mut conn, rx) = greeting_conn();
        conn.set_send_proxy(send_proxy);

        let ctrl = conn.ctrl();
        ctrl.connect(&mut conn, addr).expect("Failed to connect");

        let poller = EpollPoller::new(mode).expect("Failed to create poller");
        let mut reactor = Reactor::new(poller);
        reactor.register(conn).expect("Failed to register");

        reactor
            .run(1000, Some(Duration::from_millis(100)))
            .expect("Reactor failed");
        assert!(reactor.is_empty(), "connection must be reaped");

        let received = rx
            .recv_timeout(Duration::from_secs(1))
            .expect("No data reported");
        let (line, client) = server.join().expect("Thread panicked");

        (received, line, client, addr.port())
    }

    #[test]
    fn test_exchange_speculative() {
        let (received, _, _, _) = exchange(PollMode::Speculative, false);
        assert_eq!(received, b"world");
    }

    #[test]
    fn test_exchange_poll_required() {
        let (received, _, _, _) = exchange(PollMode::PollRequired, false);
        assert_eq!(received, b"world");
    }

    #[test]
    fn test_proxy_header_precedes_data() {
        for mode in [PollMode::Speculative, PollMode::PollRequired] {
            let (received, line, client, port) = exchange(mode, true);

            assert_eq!(received, b"world");
            assert_eq!(
                line.as_deref(),
                Some(format!("PROXY TCP4 127.0.0.1 127.0.0.1 {} {}\r\n", client.port(), port).as_str())
            );
        }
    }

    #[test]
    fn test_refused_connect_poisons_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
        let addr = listener.local_addr().expect("Failed to get local address");
        drop(listener);

        let (mut conn, rx) = greeting_conn();
        let ctrl = conn.ctrl();

        if ctrl.connect(&mut conn, addr).is_err() {
            assert!(conn.flags().status().is_error());
            return;
        }

        let poller = EpollPoller::new(PollMode::Speculative).expect("Failed to create poller");
        let mut reactor = Reactor::new(poller);
        reactor.register(conn).expect("Failed to register");

        reactor
            .run(100, Some(Duration::from_millis(100)))
            .expect("Reactor failed");

        assert!(reactor.is_empty());
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn test_attach_accepted_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind listener");
        let addr = listener.local_addr().expect("Failed to get local address");

        let mut client = TcpStream::connect(addr).expect("Failed to connect to listener");
        let (stream, _) = listener.accept().expect("Failed to accept connection");

        let (mut conn, _rx) = greeting_conn();
        tcp::attach(&mut conn, stream.into_raw_fd()).expect("Failed to attach");

        assert!(conn.flags().status().is_connected());
        let peer = conn.peer_addr().expect("peer address");
        assert_eq!(
            tcp::peer_socket_addr(peer).expect("inet address"),
            client.local_addr().expect("Failed to get local address")
        );

        let mut buffer = [0; 4];
        assert_eq!(tcp::recv(&conn, &mut buffer).expect("recv"), None);

        assert_eq!(tcp::send(&conn, b"ping").expect("send"), Some(4));
        client
            .read_exact(&mut buffer)
            .expect("Failed to read from stream");
        assert_eq!(&buffer, b"ping");

        drop(conn);
        let mut rest = Vec::new();
        client
            .read_to_end(&mut rest)
            .expect("Failed to read until close");
        assert!(rest.is_empty(), "dropping the connection closes the socket");
    }

    #[test]
    fn test_proxy_v1_lines() {
        let addr = |s: &str| s.parse::<SocketAddr>().expect("addr");

        assert_eq!(
            tcp::proxy_v1_line(&addr("10.0.0.1:4000"), &addr("10.0.0.2:80")),
            "PROXY TCP4 10.0.0.1 10.0.0.2 4000 80\r\n"
        );
        assert_eq!(
            tcp::proxy_v1_line(&addr("[::1]:4000"), &addr("[2001:db8::1]:443")),
            "PROXY TCP6 ::1 2001:db8::1 4000 443\r\n"
        );
        assert_eq!(
            tcp::proxy_v1_line(&addr("10.0.0.1:4000"), &addr("[::1]:443")),
            "PROXY UNKNOWN\r\n"
        );
    }

    #[test]
    fn test_max_events_is_clamped() {
        let config = |max_events| PollerConfig {
            mode: PollMode::PollRequired,
            max_events,
        };

        let poller = EpollPoller::with_config(&config(usize::MAX)).expect("Failed to create poller");
        assert_eq!(poller.max_events(), MAX_EVENTS);

        let poller = EpollPoller::with_config(&config(0)).expect("Failed to create poller");
        assert_eq!(poller.max_events(), 1);

        let mut poller = EpollPoller::with_config(&config(i32::MAX as usize + 1))
            .expect("Failed to create poller");
        let mut events = Vec::new();
        poller
            .wait(&mut events, Some(Duration::from_millis(1)))
            .expect("wait must not fail");
        assert!(events.is_empty());
    }
}
