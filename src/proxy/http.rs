/*!
 * Minimal HTTP/1.x request parsing, header rewriting, and error-response
 * rendering.
 *
 * Parsing never mutates the request bytes that will later be forwarded;
 * everything operates on byte-offset slices into the original buffer
 * rather than tokenizing the buffer in place.
 */
use crate::proxy::{MEDIUM_BUFFER_SIZE, SMALL_BUFFER_SIZE};

/// An HTTP status this proxy can emit itself (never 200 - success responses
/// are relayed verbatim from the origin).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStatus {
    BadRequest,
    Forbidden,
    NotFound,
    InternalError,
    NotSupported,
}

impl ErrorStatus {
    pub fn code(self) -> u16 {
        match self {
            ErrorStatus::BadRequest => 400,
            ErrorStatus::Forbidden => 403,
            ErrorStatus::NotFound => 404,
            ErrorStatus::InternalError => 500,
            ErrorStatus::NotSupported => 501,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            ErrorStatus::BadRequest => "Bad Request",
            ErrorStatus::Forbidden => "Forbidden",
            ErrorStatus::NotFound => "Not Found",
            ErrorStatus::InternalError => "Internal Server Err",
            ErrorStatus::NotSupported => "Not supported",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            ErrorStatus::BadRequest => "Bad Request.",
            ErrorStatus::Forbidden => "Access denied.",
            ErrorStatus::NotFound => "File not found.",
            ErrorStatus::InternalError => "Some server side error.",
            ErrorStatus::NotSupported => "Method is not supported.",
        }
    }
}

/// The three request-line tokens plus the `Host:` header value, truncated
/// to fixed conceptual buffer sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub method: String,
    pub path: String,
    pub protocol: String,
    pub host: String,
}

const SUPPORTED_PROTOCOLS: [&str; 3] = ["HTTP/1.0", "HTTP/1.1", "HTTP/2.0"];

/// Parse the request line and `Host:` header out of a raw request buffer.
/// Returns `None` if method, path, protocol, or host cannot be determined,
/// which the caller maps to a `400`.
pub fn parse_request(buf: &[u8]) -> Option<ParsedRequest> {
    let text = String::from_utf8_lossy(buf);
    let line_end = text.find("\r\n").or_else(|| text.find('\n')).unwrap_or(text.len());
    let request_line = &text[..line_end];

    let mut parts = request_line.splitn(3, ' ');
    let method = parts.next()?.trim();
    let path = parts.next()?.trim();
    let protocol = parts.next()?.trim_end_matches('\r').trim();

    if method.is_empty() || path.is_empty() || !SUPPORTED_PROTOCOLS.contains(&protocol) {
        return None;
    }

    let host = find_host(&text)?;

    Some(ParsedRequest {
        method: truncate(method, SMALL_BUFFER_SIZE),
        path: truncate(path, MEDIUM_BUFFER_SIZE),
        protocol: truncate(protocol, SMALL_BUFFER_SIZE),
        host: truncate(&host, MEDIUM_BUFFER_SIZE),
    })
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Find the first `Host: ` occurrence anywhere in the request and return
/// its whitespace-delimited value token.
fn find_host(text: &str) -> Option<String> {
    let idx = text.find("Host: ")?;
    let rest = &text[idx + "Host: ".len()..];
    let value_end = rest.find(|c: char| c.is_whitespace()).unwrap_or(rest.len());
    let value = rest[..value_end].trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Split a `Host:` value into `(hostname, port)`. The rightmost `:` in the
/// value marks the port if the suffix is a valid `[1, 65535]` integer;
/// otherwise the whole value is the hostname and the port defaults to 80.
pub fn split_host_port(host_value: &str) -> (&str, u16) {
    if let Some(idx) = host_value.rfind(':') {
        let (name, port_str) = (&host_value[..idx], &host_value[idx + 1..]);
        if let Ok(port) = port_str.parse::<u16>() {
            if port >= 1 {
                return (name, port);
            }
        }
    }
    (host_value, 80)
}

/// Ensure the request carries `Connection: close`, rewriting in place where
/// possible and inserting a new header only when neither `close` nor
/// `keep-alive` is already present. Idempotent: rewriting the output of this
/// function returns the same bytes unchanged.
pub fn rewrite_connection_close(request: &[u8]) -> Vec<u8> {
    const CLOSE: &[u8] = b"Connection: close";
    const KEEP_ALIVE: &[u8] = b"Connection: keep-alive";

    if contains(request, CLOSE) {
        return request.to_vec();
    }
    if let Some(pos) = find(request, KEEP_ALIVE) {
        let mut out = Vec::with_capacity(request.len());
        out.extend_from_slice(&request[..pos]);
        out.extend_from_slice(CLOSE);
        out.extend_from_slice(&request[pos + KEEP_ALIVE.len()..]);
        return out;
    }
    if let Some(pos) = find(request, b"\r\n\r\n") {
        let mut out = Vec::with_capacity(request.len() + CLOSE.len() + 2);
        out.extend_from_slice(&request[..pos + 2]);
        out.extend_from_slice(CLOSE);
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&request[pos + 2..]);
        return out;
    }
    request.to_vec()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len().max(1)).position(|w| w == needle)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    find(haystack, needle).is_some()
}

/// Render a complete HTTP/1.1 error response: status line, headers
/// (`Server`, `Date`, `Content-Type`, `Content-Length`, `Connection:
/// close`), a blank line, then an HTML body naming the status.
pub fn render_error_response(status: ErrorStatus) -> Vec<u8> {
    let code = status.code();
    let reason = status.reason();
    let message = status.message();
    let body = format!(
        "<HTML><HEAD><TITLE>{code} {reason}</TITLE></HEAD>\r\n<BODY><H4>{code} {reason}</H4>\r\n{message}\r\n</BODY></HTML>"
    );
    let headers = format!(
        "HTTP/1.1 {code} {reason}\r\n\
         Server: webserver/1.0\r\n\
         Date: {date}\r\n\
         Content-Type: text/html\r\n\
         Content-Length: {len}\r\n\
         Connection: close\r\n\
         \r\n",
        date = rfc1123_now(),
        len = body.len(),
    );
    let mut out = headers.into_bytes();
    out.extend_from_slice(body.as_bytes());
    out
}

/// Minimal RFC 1123 GMT timestamp (`Tue, 15 Nov 1994 08:12:31 GMT`),
/// computed from the system clock without pulling in a date/time crate.
fn rfc1123_now() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format_civil_gmt(secs)
}

fn format_civil_gmt(unix_secs: u64) -> String {
    const WEEKDAYS: [&str; 7] = ["Thu", "Fri", "Sat", "Sun", "Mon", "Tue", "Wed"]; // epoch was a Thursday
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];

    let days = unix_secs / 86_400;
    let rem = unix_secs % 86_400;
    let (hour, minute, second) = (rem / 3600, (rem % 3600) / 60, rem % 60);
    let weekday = WEEKDAYS[(days % 7) as usize];

    // Civil-from-days (Howard Hinnant's algorithm).
    let z = days as i64 + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if month <= 2 { y + 1 } else { y };

    format!(
        "{weekday}, {day:02} {month} {year} {hour:02}:{minute:02}:{second:02} GMT",
        month = MONTHS[(month - 1) as usize]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_get_request_line_and_host() {
        let req = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\nUser-Agent: x\r\n\r\n";
        let parsed = parse_request(req).unwrap();
        assert_eq!(parsed.method, "GET");
        assert_eq!(parsed.path, "/index.html");
        assert_eq!(parsed.protocol, "HTTP/1.1");
        assert_eq!(parsed.host, "example.com");
    }

    #[test]
    fn missing_host_header_fails_parse() {
        let req = b"GET / HTTP/1.1\r\nUser-Agent: x\r\n\r\n";
        assert!(parse_request(req).is_none());
    }

    #[test]
    fn unsupported_protocol_fails_parse() {
        let req = b"GET / HTTP/0.9\r\nHost: example.com\r\n\r\n";
        assert!(parse_request(req).is_none());
    }

    #[test]
    fn post_method_parses_but_is_not_get() {
        let req = b"POST / HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let parsed = parse_request(req).unwrap();
        assert_eq!(parsed.method, "POST");
    }

    #[test]
    fn host_port_extraction() {
        assert_eq!(split_host_port("example.com"), ("example.com", 80));
        assert_eq!(split_host_port("example.com:8080"), ("example.com", 8080));
        assert_eq!(split_host_port("example.com:notaport"), ("example.com:notaport", 80));
    }

    #[test]
    fn rewrite_replaces_keep_alive_preserving_header_count() {
        let req = b"GET / HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n";
        let out = rewrite_connection_close(req);
        let out_text = String::from_utf8(out).unwrap();
        assert!(out_text.contains("Connection: close"));
        assert!(!out_text.contains("keep-alive"));
        assert_eq!(out_text.lines().count(), req_line_count(req));
    }

    #[test]
    fn rewrite_inserts_header_when_absent() {
        let req = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";
        let out = rewrite_connection_close(req);
        let out_text = String::from_utf8(out).unwrap();
        assert!(out_text.contains("Connection: close"));
    }

    #[test]
    fn rewrite_is_idempotent() {
        let req = b"GET / HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n";
        let once = rewrite_connection_close(req);
        let twice = rewrite_connection_close(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn rewrite_leaves_existing_close_unchanged() {
        let req = b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n";
        assert_eq!(rewrite_connection_close(req), req.to_vec());
    }

    #[test]
    fn error_response_has_expected_status_line_and_body() {
        let out = render_error_response(ErrorStatus::NotSupported);
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("HTTP/1.1 501 Not supported\r\n"));
        assert!(text.contains("Content-Length:"));
        assert!(text.contains("Connection: close"));
        assert!(text.contains("501 Not supported"));
        assert!(text.contains("Method is not supported."));
    }

    fn req_line_count(req: &[u8]) -> usize {
        String::from_utf8_lossy(req).lines().count()
    }
}
