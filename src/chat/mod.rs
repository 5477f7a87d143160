/*!
 * Broadcast Chat Server
 *
 * A single-threaded, non-blocking event loop that fans out every byte
 * received from one client to every other connected client, upper-cased.
 */
pub mod conn;
pub mod event_loop;
pub mod transform;

pub use conn::{Connection, ConnectionTable, ReadinessSet};
pub use event_loop::{run_chat_server, EventLoop};
pub use transform::uppercase_ascii;

/// Per-connection read buffer size.
pub const READ_BUF: usize = 1024;

/// Listen backlog for the chat listener.
pub const LISTEN_BACKLOG: u32 = 32;
