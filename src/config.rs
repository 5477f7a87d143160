/*!
 * CLI Configuration
 *
 * Positional-argument parsing for the two binaries. Neither server takes a
 * config file; everything is a handful of required positional values with a
 * fixed usage string, so this is hand-rolled rather than pulled in through a
 * derive-based argument parser.
 */

/// Port bound by the chat server, validated to be in `[1, 65535]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatConfig {
    pub port: u16,
}

/// Usage string printed to stderr on any chat-server argument error.
pub const CHAT_USAGE: &str = "Usage: chat-server <port>";

/// Parse `chat-server <port>` arguments (excluding argv[0]).
///
/// Accepts exactly one argument: a base-10 integer in `[1, 65535]`. Any other
/// shape - wrong arg count, non-numeric token, leading/trailing junk, or an
/// out-of-range value - is rejected.
pub fn parse_chat_args(args: &[String]) -> Result<ChatConfig, &'static str> {
    if args.len() != 1 {
        return Err(CHAT_USAGE);
    }
    let port = parse_port_strict(&args[0]).ok_or(CHAT_USAGE)?;
    Ok(ChatConfig { port })
}

/// Full configuration for the proxy server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub port: u16,
    pub pool_size: usize,
    pub max_requests: usize,
    pub filter_path: String,
}

/// Usage string printed to stderr on any proxy-server argument error.
pub const PROXY_USAGE: &str = "Usage: proxy-server <port> <pool-size> <max-number-of-requests> <filter>";

/// Parse `proxy-server <port> <pool-size> <max-number-of-requests> <filter>`.
///
/// `port`, `pool-size`, and `max-number-of-requests` must all be positive
/// base-10 integers; `port` is additionally bounded to `<= 65535`. `filter`
/// is taken verbatim as a file path.
pub fn parse_proxy_args(args: &[String]) -> Result<ProxyConfig, &'static str> {
    if args.len() != 4 {
        return Err(PROXY_USAGE);
    }
    let port = parse_port_strict(&args[0]).ok_or(PROXY_USAGE)?;
    let pool_size = parse_positive_usize(&args[1]).ok_or(PROXY_USAGE)?;
    let max_requests = parse_positive_usize(&args[2]).ok_or(PROXY_USAGE)?;
    let filter_path = args[3].clone();
    Ok(ProxyConfig {
        port,
        pool_size,
        max_requests,
        filter_path,
    })
}

/// Parse a base-10 port number in `[1, 65535]`, rejecting any non-numeric
/// trailer (e.g. `"80x"`) the way `strtol` + an endptr check would.
fn parse_port_strict(s: &str) -> Option<u16> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let v: i64 = s.parse().ok()?;
    if v < 1 || v > 65535 {
        return None;
    }
    Some(v as u16)
}

/// Parse a positive base-10 integer with no sign and no non-digit trailer.
fn parse_positive_usize(s: &str) -> Option<usize> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let v: usize = s.parse().ok()?;
    if v == 0 {
        return None;
    }
    Some(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_port_boundaries() {
        for bad in ["0", "65536", "-1", "abc", "", "80x"] {
            assert!(
                parse_chat_args(&[bad.to_string()]).is_err(),
                "expected {bad:?} to be rejected"
            );
        }
        assert_eq!(
            parse_chat_args(&["8080".to_string()]),
            Ok(ChatConfig { port: 8080 })
        );
        assert_eq!(
            parse_chat_args(&["1".to_string()]),
            Ok(ChatConfig { port: 1 })
        );
        assert_eq!(
            parse_chat_args(&["65535".to_string()]),
            Ok(ChatConfig { port: 65535 })
        );
    }

    #[test]
    fn chat_wrong_arg_count() {
        assert!(parse_chat_args(&[]).is_err());
        assert!(parse_chat_args(&["80".to_string(), "81".to_string()]).is_err());
    }

    #[test]
    fn proxy_args_happy_path() {
        let cfg = parse_proxy_args(&[
            "8080".to_string(),
            "4".to_string(),
            "100".to_string(),
            "filter.txt".to_string(),
        ])
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.pool_size, 4);
        assert_eq!(cfg.max_requests, 100);
        assert_eq!(cfg.filter_path, "filter.txt");
    }

    #[test]
    fn proxy_args_reject_zero_and_negative() {
        assert!(parse_proxy_args(&[
            "8080".to_string(),
            "0".to_string(),
            "100".to_string(),
            "f".to_string()
        ])
        .is_err());
        assert!(parse_proxy_args(&[
            "70000".to_string(),
            "4".to_string(),
            "100".to_string(),
            "f".to_string()
        ])
        .is_err());
    }
}
