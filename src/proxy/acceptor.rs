/*!
 * Accept loop for the proxy server: the main thread accepts up to a
 * configured number of connections and dispatches each to the worker pool.
 */
use crate::proxy::filter::FilterList;
use crate::proxy::handler::RequestHandler;
use crate::proxy::pool::WorkerPool;
use crate::config::ProxyConfig;
use anyhow::{Context, Result};
use log::{error, info};
use socket2::{Domain, Socket, Type};
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

/// Accepts connections on a bound listener and hands each off to a
/// `WorkerPool` as a task, stopping after `max_requests` accepts.
pub struct Acceptor {
    listener: TcpListener,
    pool: WorkerPool,
    handler: Arc<RequestHandler>,
    max_requests: usize,
}

impl Acceptor {
    pub fn new(listener: TcpListener, pool: WorkerPool, filters: FilterList, max_requests: usize) -> Self {
        Acceptor {
            listener,
            pool,
            handler: Arc::new(RequestHandler::new(Arc::new(filters))),
            max_requests,
        }
    }

    /// Accept exactly `max_requests` connections (or until accept fails
    /// repeatedly), dispatching each as a task, then tear down the pool.
    pub fn run(self) {
        info!("proxy accepting up to {} requests", self.max_requests);
        for i in 0..self.max_requests {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    info!("accepted request {} from {addr}", i + 1);
                    let handler = Arc::clone(&self.handler);
                    self.pool.dispatch(Box::new(move || handler.handle(stream)));
                }
                Err(e) => {
                    error!("accept error: {e}");
                    // An accept failure does not remove any existing
                    // connection; simply try the next one.
                }
            }
        }
        info!("reached max-requests limit, shutting down pool");
        self.pool.shutdown();
    }
}

/// Bind with `SO_REUSEADDR` and a backlog equal to `max_requests`.
fn bind_listener(port: u16, backlog: usize) -> Result<TcpListener> {
    let addr: SocketAddr = format!("0.0.0.0:{port}").parse().context("building bind address")?;
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)
        .context("creating proxy listener socket")?;
    socket.set_reuse_address(true).context("setting SO_REUSEADDR")?;
    socket.bind(&addr.into()).with_context(|| format!("binding proxy listener to {addr}"))?;
    socket
        .listen(backlog.min(i32::MAX as usize) as i32)
        .context("listening on proxy socket")?;
    Ok(socket.into())
}

/// Entry point used by the `proxy-server` binary.
pub fn run_proxy_server(config: ProxyConfig) -> Result<()> {
    let filters = FilterList::load(&config.filter_path)
        .with_context(|| format!("loading filter file {}", config.filter_path))?;
    let listener = bind_listener(config.port, config.max_requests)?;
    let pool = WorkerPool::new(config.pool_size).context("starting worker pool")?;
    let acceptor = Acceptor::new(listener, pool, filters, config.max_requests);
    acceptor.run();
    Ok(())
}
