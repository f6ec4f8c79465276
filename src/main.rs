// ABOUTME: rube-proxy entry point - loads configuration, installs logging and
// ABOUTME: runs the proxy, mapping its outcome to the process exit code.

use clap::Parser;
use tracing::error;

use rube_proxy::config::ProxyConfig;
use rube_proxy::{ProxyError, logging, proxy};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let _ = dotenvy::dotenv();

    let config = match ProxyConfig::try_parse() {
        Ok(config) => config,
        Err(e) => {
            let _ = e.print();
            // Help and version go to stdout and are not failures
            std::process::exit(if e.use_stderr() { 1 } else { 0 });
        }
    };

    if let Err(e) = logging::init(&config.proxy_name, &config.log_filter) {
        let e = ProxyError::Config(format!("{:#}", e));
        eprintln!("[{}] ERROR: {}", config.proxy_name, e);
        std::process::exit(e.exit_code());
    }

    match proxy::run(config).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            error!("Fatal proxy error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}
