/*!
 * Per-request state machine: receive, parse, filter, connect, relay.
 */
use crate::proxy::filter::FilterList;
use crate::proxy::http::{parse_request, render_error_response, rewrite_connection_close, split_host_port, ErrorStatus};
use crate::proxy::BIG_BUFFER_SIZE;
use log::{debug, warn};
use std::io::{ErrorKind, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;

/// Executes one accepted connection's full request/response cycle. Stateless
/// beyond the shared, read-only filter list.
pub struct RequestHandler {
    filters: Arc<FilterList>,
}

impl RequestHandler {
    pub fn new(filters: Arc<FilterList>) -> Self {
        RequestHandler { filters }
    }

    /// Run the full pipeline for one client connection. The client socket is
    /// always closed by the time this returns (by virtue of `client` being
    /// dropped at the end of the call).
    pub fn handle(&self, mut client: TcpStream) {
        let mut buf = [0u8; BIG_BUFFER_SIZE];
        let n = match client.read(&mut buf) {
            Ok(0) => return,
            Ok(n) => n,
            Err(_) => return,
        };
        let request = &buf[..n];

        let parsed = match parse_request(request) {
            Some(p) => p,
            None => {
                self.respond_error(&mut client, ErrorStatus::BadRequest);
                return;
            }
        };

        if parsed.method != "GET" {
            self.respond_error(&mut client, ErrorStatus::NotSupported);
            return;
        }

        let (hostname, port) = split_host_port(&parsed.host);

        let addresses = match resolve_ipv4(hostname) {
            Some(addrs) if !addrs.is_empty() => addrs,
            _ => {
                self.respond_error(&mut client, ErrorStatus::NotFound);
                return;
            }
        };

        if self.filters.is_blocked(&addresses, &parsed.host) {
            warn!("blocked request for host {}", parsed.host);
            self.respond_error(&mut client, ErrorStatus::Forbidden);
            return;
        }

        debug!("GET {} -> {}:{}", parsed.path, hostname, port);
        let origin_addr = SocketAddr::from((addresses[0], port));
        // Connecting to the origin is an infrastructure failure, not a
        // protocol one: close the client socket silently rather than
        // synthesizing a response.
        let mut origin = match TcpStream::connect(origin_addr) {
            Ok(s) => s,
            Err(e) => {
                warn!("connect to {origin_addr} failed: {e}");
                return;
            }
        };

        let rewritten = rewrite_connection_close(request);
        if origin.write_all(&rewritten).is_err() {
            return;
        }

        relay(&mut origin, &mut client);
    }

    fn respond_error(&self, client: &mut TcpStream, status: ErrorStatus) {
        let response = render_error_response(status);
        let _ = client.write_all(&response);
    }
}

/// Resolve a hostname to its IPv4 addresses via the platform resolver.
/// `None` signals resolution failure; `Some(vec![])` is possible too and is
/// treated identically by the caller (both map to `404`).
fn resolve_ipv4(hostname: &str) -> Option<Vec<Ipv4Addr>> {
    let addrs = (hostname, 0u16).to_socket_addrs().ok()?;
    Some(
        addrs
            .filter_map(|a| match a {
                SocketAddr::V4(v4) => Some(*v4.ip()),
                SocketAddr::V6(_) => None,
            })
            .collect(),
    )
}

/// Relay bytes origin -> client until either side signals EOF/error. A
/// broken-pipe error writing to the client is treated as a graceful
/// disconnect, not a logged failure.
fn relay(origin: &mut TcpStream, client: &mut TcpStream) {
    let mut buf = [0u8; BIG_BUFFER_SIZE];
    loop {
        let n = match origin.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };
        match client.write_all(&buf[..n]) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::BrokenPipe => break,
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::filter::FilterEntry;
    use std::net::TcpListener;
    use std::thread;

    fn spawn_echo_origin() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            if let Ok((mut sock, _)) = listener.accept() {
                let mut buf = [0u8; 1024];
                let n = sock.read(&mut buf).unwrap_or(0);
                let _ = sock.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok");
                let _ = n;
            }
        });
        addr
    }

    #[test]
    fn post_request_yields_501() {
        let handler = RequestHandler::new(Arc::new(FilterList::default()));
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (sock, _) = listener.accept().unwrap();
            handler.handle(sock);
        });
        let mut client = TcpStream::connect(addr).unwrap();
        client
            .write_all(b"POST / HTTP/1.1\r\nHost: example.com\r\n\r\n")
            .unwrap();
        let mut resp = Vec::new();
        client.read_to_end(&mut resp).unwrap();
        server.join().unwrap();
        let text = String::from_utf8_lossy(&resp);
        assert!(text.starts_with("HTTP/1.1 501"));
        assert!(text.contains("Method is not supported."));
    }

    #[test]
    fn missing_host_yields_400() {
        let handler = RequestHandler::new(Arc::new(FilterList::default()));
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (sock, _) = listener.accept().unwrap();
            handler.handle(sock);
        });
        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        let mut resp = Vec::new();
        client.read_to_end(&mut resp).unwrap();
        server.join().unwrap();
        assert!(String::from_utf8_lossy(&resp).starts_with("HTTP/1.1 400"));
    }

    #[test]
    fn filtered_host_yields_403() {
        let origin_addr = spawn_echo_origin();
        let filters = Arc::new(FilterList::from_entries(vec![FilterEntry::parse(&format!(
            "{}/32",
            origin_addr.ip()
        ))]));
        let handler = RequestHandler::new(filters);
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (sock, _) = listener.accept().unwrap();
            handler.handle(sock);
        });
        let mut client = TcpStream::connect(addr).unwrap();
        client
            .write_all(format!("GET / HTTP/1.1\r\nHost: 127.0.0.1:{}\r\n\r\n", origin_addr.port()).as_bytes())
            .unwrap();
        let mut resp = Vec::new();
        client.read_to_end(&mut resp).unwrap();
        server.join().unwrap();
        assert!(String::from_utf8_lossy(&resp).starts_with("HTTP/1.1 403"));
    }

    #[test]
    fn valid_get_relays_origin_bytes() {
        let origin_addr = spawn_echo_origin();
        let handler = RequestHandler::new(Arc::new(FilterList::default()));
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let server = thread::spawn(move || {
            let (sock, _) = listener.accept().unwrap();
            handler.handle(sock);
        });
        let mut client = TcpStream::connect(addr).unwrap();
        client
            .write_all(format!("GET / HTTP/1.1\r\nHost: 127.0.0.1:{}\r\n\r\n", origin_addr.port()).as_bytes())
            .unwrap();
        let mut resp = Vec::new();
        client.read_to_end(&mut resp).unwrap();
        server.join().unwrap();
        assert!(String::from_utf8_lossy(&resp).starts_with("HTTP/1.1 200 OK"));
    }
}
