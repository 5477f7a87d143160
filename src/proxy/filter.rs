/*!
 * Host/IP blocklist.
 *
 * Each line of the filter file is either a CIDR network or a literal
 * hostname; a resolved request is rejected if any resolved address matches
 * a CIDR entry or the original host string matches a literal entry.
 */
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;

/// A single blocklist entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterEntry {
    /// `network` holds only the masked top `prefix` bits.
    Cidr { network: Ipv4Addr, prefix: u8 },
    /// Compared string-equal against the request's `Host:` value.
    Literal(String),
}

impl FilterEntry {
    /// Parse one filter-file line. CIDR iff the first byte is an ASCII
    /// digit; a bare address implies `/32`.
    pub fn parse(line: &str) -> Self {
        if line.as_bytes().first().is_some_and(u8::is_ascii_digit) {
            let (addr_part, prefix) = match line.split_once('/') {
                Some((addr, p)) => (addr, p.parse::<u8>().unwrap_or(32).min(32)),
                None => (line, 32u8),
            };
            let addr = addr_part.parse::<Ipv4Addr>().unwrap_or(Ipv4Addr::UNSPECIFIED);
            FilterEntry::Cidr {
                network: mask(addr, prefix),
                prefix,
            }
        } else {
            FilterEntry::Literal(line.to_string())
        }
    }

    /// Does this entry match the given resolved address / original host?
    pub fn matches(&self, addr: Ipv4Addr, host: &str) -> bool {
        match self {
            FilterEntry::Cidr { network, prefix } => mask(addr, *prefix) == *network,
            FilterEntry::Literal(h) => h == host,
        }
    }
}

/// Zero out every bit below the top `prefix` bits of `addr`.
fn mask(addr: Ipv4Addr, prefix: u8) -> Ipv4Addr {
    let bits = u32::from(addr);
    let mask = if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix as u32)
    };
    Ipv4Addr::from(bits & mask)
}

/// The full blocklist loaded from the filter file, read-only for the
/// lifetime of the server.
#[derive(Debug, Default)]
pub struct FilterList {
    entries: Vec<FilterEntry>,
}

impl FilterList {
    pub fn from_entries(entries: Vec<FilterEntry>) -> Self {
        FilterList { entries }
    }

    /// Load a filter file: one entry per line, newline-stripped; empty
    /// lines become (never-matching-by-accident) empty literal entries.
    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let entries = contents.lines().map(FilterEntry::parse).collect();
        Ok(FilterList { entries })
    }

    /// True if any resolved address or the original host string matches any
    /// entry. Scans every entry; the first match wins but the result is the
    /// same regardless of scan order.
    pub fn is_blocked(&self, addresses: &[Ipv4Addr], host: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| addresses.iter().any(|addr| entry.matches(*addr, host)))
    }
}
