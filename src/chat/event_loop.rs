/*!
 * Event loop for the broadcast chat server.
 *
 * Single-threaded, built on `mio::Poll`. Each iteration: wait for readiness,
 * accept every queued connection on the listener, read once from each
 * readable client and broadcast what was read, then flush every writable
 * client. The only suspension point is `Poll::poll`.
 */
use crate::chat::conn::{ConnectionTable, FlushOutcome};
use crate::chat::transform::uppercase_ascii;
use crate::chat::{LISTEN_BACKLOG, READ_BUF};
use anyhow::{Context, Result};
use log::{info, warn};
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token};
use socket2::{Domain, Socket, Type};
use std::io::{ErrorKind, Read};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const LISTENER: Token = Token(0);
/// Soft ceiling on simultaneously live client connections.
const MAX_CONNECTIONS: usize = 4096;

/// Drives the accept/read/write cycle over a `ConnectionTable` until the
/// stop flag is observed.
pub struct EventLoop {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    table: ConnectionTable,
    next_token: usize,
    stop: Arc<AtomicBool>,
}

impl EventLoop {
    pub fn new(addr: SocketAddr, stop: Arc<AtomicBool>) -> Result<Self> {
        let poll = Poll::new().context("creating mio Poll")?;
        let mut listener = bind_listener(addr)?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .context("registering listener")?;

        Ok(EventLoop {
            poll,
            events: Events::with_capacity(1024),
            listener,
            table: ConnectionTable::new(LISTENER, MAX_CONNECTIONS),
            next_token: 1,
            stop,
        })
    }

    /// The bound listener's local address, for tests that bind to port 0
    /// and need to discover the assigned ephemeral port.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run until the stop flag is set. On return, every connection has been
    /// removed and the listener has been dropped.
    pub fn run(&mut self) -> Result<()> {
        info!("chat server listening");
        // `mio::Poll` has no way to be woken by a Ctrl-C handler directly,
        // so the stop flag is checked on a short timeout rather than an
        // unbounded wait - the loop still spends nearly all of its time
        // blocked in the syscall, just never longer than this interval.
        let poll_timeout = Some(std::time::Duration::from_millis(200));
        while !self.stop.load(Ordering::SeqCst) {
            match self.poll.poll(&mut self.events, poll_timeout) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    if self.stop.load(Ordering::SeqCst) {
                        break;
                    }
                    warn!("poll error: {e}");
                    continue;
                }
            }

            // mio::Events borrowed immutably while we need &mut self below;
            // collect the small per-iteration decisions first.
            let mut listener_ready = false;
            let mut readable: Vec<Token> = Vec::new();
            for ev in self.events.iter() {
                if ev.token() == LISTENER {
                    listener_ready = true;
                    continue;
                }
                if ev.is_readable() {
                    readable.push(ev.token());
                }
            }

            if listener_ready {
                self.accept_all();
            }
            for token in readable {
                self.handle_readable(token);
            }

            // mio's writable events are edge-triggered: a socket that was
            // already writable before this poll call emits none, even
            // though a broadcast enqueued above may have just given it data
            // to send. Flush off the readiness set's own bookkeeping
            // instead of the poll events, so every connection with pending
            // output gets a write attempt this iteration regardless of
            // whether mio reported it writable.
            let writable: Vec<Token> = self.table.readiness().writable_tokens().collect();
            for token in writable {
                self.handle_writable(token);
            }
        }

        self.shutdown();
        Ok(())
    }

    fn accept_all(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut socket, addr)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;
                    if let Err(e) = self.poll.registry().register(
                        &mut socket,
                        token,
                        Interest::READABLE | Interest::WRITABLE,
                    ) {
                        warn!("failed to register client {addr}: {e}");
                        continue;
                    }
                    match self.table.insert(token, socket) {
                        Ok(()) => info!("accepted connection {addr} as {token:?}"),
                        Err(e) => warn!("rejecting connection {addr}: {e}"),
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("accept error: {e}");
                    break;
                }
            }
        }
    }

    fn handle_readable(&mut self, token: Token) {
        if !self.table.contains(token) {
            return;
        }
        let mut buf = [0u8; READ_BUF];
        let read_result = {
            let conn = self.table.get_mut(token).expect("checked contains above");
            conn.socket.read(&mut buf)
        };
        match read_result {
            Ok(0) => {
                info!("connection {token:?} closed by peer");
                self.remove(token);
            }
            Ok(n) => {
                let upper = uppercase_ascii(&buf[..n]);
                self.table.broadcast(token, &upper);
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                warn!("read error on {token:?}: {e}");
                self.remove(token);
            }
        }
    }

    fn handle_writable(&mut self, token: Token) {
        if !self.table.contains(token) {
            return;
        }
        match self.table.flush(token) {
            FlushOutcome::Drained | FlushOutcome::WouldBlock => {}
            FlushOutcome::Disconnect => {
                warn!("write error on {token:?}, dropping connection");
                self.remove(token);
            }
        }
    }

    fn remove(&mut self, token: Token) {
        if let Some(conn) = self.table.get_mut(token) {
            let _ = self.poll.registry().deregister(&mut conn.socket);
        }
        self.table.remove(token);
    }

    fn shutdown(&mut self) {
        let tokens: Vec<Token> = self.table.tokens().collect();
        for token in tokens {
            self.remove(token);
        }
        let _ = self.poll.registry().deregister(&mut self.listener);
        info!("chat server shut down cleanly");
    }
}

/// Bind with `SO_REUSEADDR` and a fixed backlog of 32, then hand the socket
/// to mio. `mio::net::TcpListener::bind` does not expose a backlog
/// parameter, so the listener is built with `socket2` and adopted via
/// `TcpListener::from_std`.
fn bind_listener(addr: SocketAddr) -> Result<TcpListener> {
    let domain = Domain::for_address(addr);
    let socket = Socket::new(domain, Type::STREAM, None).context("creating listener socket")?;
    socket.set_reuse_address(true).context("setting SO_REUSEADDR")?;
    socket.set_nonblocking(true).context("setting listener non-blocking")?;
    socket.bind(&addr.into()).with_context(|| format!("binding chat listener to {addr}"))?;
    socket
        .listen(LISTEN_BACKLOG as i32)
        .context("listening on chat socket")?;
    Ok(TcpListener::from_std(socket.into()))
}

/// Entry point used by the `chat-server` binary: bind, install the stop
/// flag, and run until it is set.
pub fn run_chat_server(port: u16, stop: Arc<AtomicBool>) -> Result<()> {
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse().context("building bind address")?;
    let mut event_loop = EventLoop::new(addr, stop)?;
    event_loop.run()
}
