/*!
 * Connection table and readiness bookkeeping.
 *
 * An ordered collection of live connections plus the readable/writable
 * interest sets the event loop drives off of. `mio::Poll` performs the
 * actual readiness syscall; this module tracks the same bookkeeping
 * explicitly so "handle present in a set iff some condition holds" stays
 * directly inspectable and testable, not just implied by mio's internal
 * state.
 */
use mio::net::TcpStream;
use mio::Token;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{ErrorKind, Write};

/// A single live client connection: its socket plus a FIFO of buffers
/// waiting to be written to it.
pub struct Connection {
    pub token: Token,
    pub socket: TcpStream,
    outbound: VecDeque<Vec<u8>>,
}

impl Connection {
    fn new(token: Token, socket: TcpStream) -> Self {
        Connection {
            token,
            socket,
            outbound: VecDeque::new(),
        }
    }

    /// Number of buffers currently queued for this connection.
    pub fn pending_messages(&self) -> usize {
        self.outbound.len()
    }
}

/// Outcome of draining a connection's outbound FIFO.
#[derive(Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Every queued buffer was written; the FIFO is now empty.
    Drained,
    /// The socket would block before the FIFO was fully drained; some bytes
    /// remain queued for the next writable event.
    WouldBlock,
    /// A write failed unrecoverably; the caller must remove the connection.
    Disconnect,
}

/// Raised when `insert` would exceed the table's configured capacity.
#[derive(Debug, thiserror::Error)]
#[error("resource exhausted: connection table is at capacity ({0})")]
pub struct ResourceExhausted(pub usize);

/// Ordered collection of live connections keyed by `Token`, plus the
/// readable/writable interest bookkeeping the event loop consults each
/// iteration.
pub struct ConnectionTable {
    listener_token: Token,
    connections: HashMap<Token, Connection>,
    order: Vec<Token>,
    capacity: usize,
    readiness: ReadinessSet,
}

impl ConnectionTable {
    /// Create an empty table. `listener_token` seeds the readable interest
    /// set and the initial max-handle floor. `capacity` bounds the number of
    /// simultaneously live client connections.
    pub fn new(listener_token: Token, capacity: usize) -> Self {
        let mut readiness = ReadinessSet::new();
        readiness.mark_readable(listener_token);
        ConnectionTable {
            listener_token,
            connections: HashMap::new(),
            order: Vec::new(),
            capacity,
            readiness,
        }
    }

    /// Insert a newly accepted connection with an empty outbound FIFO.
    pub fn insert(&mut self, token: Token, socket: TcpStream) -> Result<(), ResourceExhausted> {
        if self.connections.len() >= self.capacity {
            return Err(ResourceExhausted(self.capacity));
        }
        self.readiness.mark_readable(token);
        self.connections.insert(token, Connection::new(token, socket));
        self.order.push(token);
        Ok(())
    }

    /// Remove a connection: drop its socket and FIFO, and clear both
    /// interest sets for its handle.
    pub fn remove(&mut self, token: Token) {
        if self.connections.remove(&token).is_some() {
            self.order.retain(|t| *t != token);
        }
        self.readiness.clear(token);
    }

    pub fn contains(&self, token: Token) -> bool {
        self.connections.contains_key(&token)
    }

    pub fn get(&self, token: Token) -> Option<&Connection> {
        self.connections.get(&token)
    }

    pub fn get_mut(&mut self, token: Token) -> Option<&mut Connection> {
        self.connections.get_mut(&token)
    }

    /// Iterate live connection tokens in insertion order (stable, arbitrary).
    pub fn tokens(&self) -> impl Iterator<Item = Token> + '_ {
        self.order.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// The highest live handle value, or the listener token if no clients
    /// are connected. Recomputed on every removal so it never refers to a
    /// freed handle.
    pub fn max_token(&self) -> Token {
        self.order
            .iter()
            .copied()
            .max_by_key(|t| t.0)
            .map(|t| if t.0 > self.listener_token.0 { t } else { self.listener_token })
            .unwrap_or(self.listener_token)
    }

    pub fn readiness(&self) -> &ReadinessSet {
        &self.readiness
    }

    /// Append a copy of `bytes` to `token`'s FIFO and mark it writable.
    /// No-op if the token is not a live connection (it may have just been
    /// removed in the same loop iteration).
    pub fn enqueue(&mut self, token: Token, bytes: &[u8]) {
        if let Some(conn) = self.connections.get_mut(&token) {
            conn.outbound.push_back(bytes.to_vec());
            self.readiness.mark_writable(token);
        }
    }

    /// Enqueue `bytes` to every connection other than `sender`.
    pub fn broadcast(&mut self, sender: Token, bytes: &[u8]) {
        let targets: Vec<Token> = self.order.iter().copied().filter(|t| *t != sender).collect();
        for t in targets {
            self.enqueue(t, bytes);
        }
    }

    /// Write queued buffers to `token`'s socket in FIFO order until the
    /// FIFO empties, a write would block, or a write fails unrecoverably.
    pub fn flush(&mut self, token: Token) -> FlushOutcome {
        let conn = match self.connections.get_mut(&token) {
            Some(c) => c,
            None => return FlushOutcome::Drained,
        };
        while let Some(front) = conn.outbound.front() {
            match conn.socket.write(front) {
                Ok(0) => return FlushOutcome::Disconnect,
                Ok(n) if n == front.len() => {
                    conn.outbound.pop_front();
                }
                Ok(n) => {
                    // Partial write: keep the unwritten remainder at the front.
                    let remaining = front[n..].to_vec();
                    conn.outbound.pop_front();
                    conn.outbound.push_front(remaining);
                    return FlushOutcome::WouldBlock;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::Interrupted => {
                    return FlushOutcome::WouldBlock;
                }
                Err(_) => return FlushOutcome::Disconnect,
            }
        }
        self.readiness.clear_writable(token);
        FlushOutcome::Drained
    }
}

/// Two disjoint interest sets keyed by socket handle: readable (listener +
/// every client) and writable (every client with a non-empty FIFO).
#[derive(Default)]
pub struct ReadinessSet {
    readable: HashSet<Token>,
    writable: HashSet<Token>,
}

impl ReadinessSet {
    pub fn new() -> Self {
        ReadinessSet::default()
    }

    pub fn mark_readable(&mut self, token: Token) {
        debug_assert!(!is_std_handle(token), "stdio handles must never be tracked");
        self.readable.insert(token);
    }

    pub fn mark_writable(&mut self, token: Token) {
        debug_assert!(!is_std_handle(token), "stdio handles must never be tracked");
        self.writable.insert(token);
    }

    pub fn clear_writable(&mut self, token: Token) {
        self.writable.remove(&token);
    }

    /// Remove `token` from both interest sets (used on connection teardown).
    pub fn clear(&mut self, token: Token) {
        self.readable.remove(&token);
        self.writable.remove(&token);
    }

    pub fn is_readable(&self, token: Token) -> bool {
        self.readable.contains(&token)
    }

    pub fn is_writable(&self, token: Token) -> bool {
        self.writable.contains(&token)
    }

    pub fn writable_tokens(&self) -> impl Iterator<Item = Token> + '_ {
        self.writable.iter().copied()
    }
}

fn is_std_handle(token: Token) -> bool {
    token.0 <= 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::net::TcpListener;

    fn loopback_pair() -> (TcpStream, TcpListener) {
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        client.set_nonblocking(true).unwrap();
        (TcpStream::from_std(client), listener)
    }

    #[test]
    fn insert_adds_readable_not_writable() {
        let mut table = ConnectionTable::new(Token(0), 16);
        let (sock, _listener) = loopback_pair();
        table.insert(Token(1), sock).unwrap();
        assert!(table.readiness().is_readable(Token(1)));
        assert!(!table.readiness().is_writable(Token(1)));
    }

    #[test]
    fn enqueue_marks_writable() {
        let mut table = ConnectionTable::new(Token(0), 16);
        let (sock, _listener) = loopback_pair();
        table.insert(Token(1), sock).unwrap();
        table.enqueue(Token(1), b"hi");
        assert!(table.readiness().is_writable(Token(1)));
    }

    #[test]
    fn remove_clears_both_sets_and_drops_fifo() {
        let mut table = ConnectionTable::new(Token(0), 16);
        let (sock, _listener) = loopback_pair();
        table.insert(Token(1), sock).unwrap();
        table.enqueue(Token(1), b"hi");
        table.remove(Token(1));
        assert!(!table.readiness().is_readable(Token(1)));
        assert!(!table.readiness().is_writable(Token(1)));
        assert!(!table.contains(Token(1)));
    }

    #[test]
    fn broadcast_skips_sender() {
        let mut table = ConnectionTable::new(Token(0), 16);
        let (a, _la) = loopback_pair();
        let (b, _lb) = loopback_pair();
        table.insert(Token(1), a).unwrap();
        table.insert(Token(2), b).unwrap();
        table.broadcast(Token(1), b"hello");
        assert!(!table.readiness().is_writable(Token(1)));
        assert!(table.readiness().is_writable(Token(2)));
        assert_eq!(table.get(Token(2)).unwrap().pending_messages(), 1);
    }

    #[test]
    fn max_token_recomputes_after_removal() {
        let mut table = ConnectionTable::new(Token(0), 16);
        let (a, _la) = loopback_pair();
        let (b, _lb) = loopback_pair();
        table.insert(Token(1), a).unwrap();
        table.insert(Token(2), b).unwrap();
        assert_eq!(table.max_token(), Token(2));
        table.remove(Token(2));
        assert_eq!(table.max_token(), Token(1));
        table.remove(Token(1));
        assert_eq!(table.max_token(), Token(0));
    }

    #[test]
    fn insert_fails_at_capacity() {
        let mut table = ConnectionTable::new(Token(0), 1);
        let (a, _la) = loopback_pair();
        let (b, _lb) = loopback_pair();
        table.insert(Token(1), a).unwrap();
        assert!(table.insert(Token(2), b).is_err());
    }

    #[test]
    fn flush_drains_and_clears_writable() {
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        client.set_nonblocking(true).unwrap();
        let mut table = ConnectionTable::new(Token(0), 16);
        table.insert(Token(1), TcpStream::from_std(client)).unwrap();
        table.enqueue(Token(1), b"hello");
        let outcome = table.flush(Token(1));
        assert!(matches!(outcome, FlushOutcome::Drained | FlushOutcome::WouldBlock));
        if outcome == FlushOutcome::Drained {
            assert!(!table.readiness().is_writable(Token(1)));
        }
    }
}
