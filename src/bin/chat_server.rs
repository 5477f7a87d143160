/*!
 * Chat Server Entry Point
 *
 * Parses the port argument, installs a Ctrl-C stop flag, and runs the
 * single-threaded broadcast event loop until it is signaled to stop.
 */
use anyhow::Result;
use relaynet::config::{parse_chat_args, CHAT_USAGE};
use relaynet::run_chat_server;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match parse_chat_args(&args) {
        Ok(c) => c,
        Err(_) => {
            eprintln!("{CHAT_USAGE}");
            std::process::exit(1);
        }
    };

    let stop = Arc::new(AtomicBool::new(false));
    let stop_for_handler = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        stop_for_handler.store(true, Ordering::SeqCst);
    })
    .expect("installing SIGINT handler");

    run_chat_server(config.port, stop)
}
