// Core modules for relaynet: a broadcast chat server and a filtering forward proxy
pub mod chat; // ConnectionTable, ReadinessSet, EventLoop
pub mod config; // CLI argument parsing shared by both binaries
pub mod proxy; // TaskQueue, WorkerPool, RequestHandler, Acceptor

pub use chat::*;
pub use config::*;
pub use proxy::*;
