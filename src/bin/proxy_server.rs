/*!
 * Proxy Server Entry Point
 *
 * Parses CLI arguments, loads the filter file, starts the worker pool, and
 * runs the accept loop for exactly `max-number-of-requests` connections.
 */
use anyhow::Result;
use relaynet::config::{parse_proxy_args, PROXY_USAGE};
use relaynet::run_proxy_server;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match parse_proxy_args(&args) {
        Ok(c) => c,
        Err(_) => {
            eprintln!("{PROXY_USAGE}");
            std::process::exit(1);
        }
    };

    run_proxy_server(config)
}
