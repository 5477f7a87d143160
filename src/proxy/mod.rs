/*!
 * Filtering Forward Proxy
 *
 * A bounded worker pool serves GET requests, applying a host/IP blocklist
 * before forwarding to the origin and relaying bytes back to the client.
 */
pub mod acceptor;
pub mod filter;
pub mod handler;
pub mod http;
pub mod pool;
pub mod queue;

pub use acceptor::{run_proxy_server, Acceptor};
pub use filter::{FilterEntry, FilterList};
pub use handler::RequestHandler;
pub use pool::WorkerPool;
pub use queue::{Task, TaskQueue};

/// Upper bound on the worker-pool size.
pub const MAX_WORKERS: usize = 256;

/// Buffer size for reading a client request and relaying origin bytes.
pub const BIG_BUFFER_SIZE: usize = 8 * 1024;
/// Conceptual bound on method/protocol token length.
pub const SMALL_BUFFER_SIZE: usize = 128;
/// Conceptual bound on path/host token length.
pub const MEDIUM_BUFFER_SIZE: usize = 512;
