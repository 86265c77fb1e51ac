use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

mod config;
mod handler;
mod http;
mod logger;
mod server;
mod storage;

use storage::{GithubClient, RemoteStore};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Optional first argument: config file path without extension
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config".to_string());
    let cfg = config::Config::load_from(&config_path)?;
    logger::init(&cfg)?;

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build()?;

    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: config::Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = cfg.get_socket_addr()?;

    let remote = GithubClient::from_config(&cfg.github)?;
    let github_location = remote.as_ref().map(RemoteStore::location);
    let remote = remote.map(|client| Arc::new(client) as Arc<dyn RemoteStore>);

    let state = Arc::new(config::AppState::new(cfg, remote));

    // Pages directory and manifest exist before the first request
    state.pages.ensure_dir().await?;
    state.pages.refresh_manifest().await;
    logger::log_info(&format!("Pages directory: {}", state.pages.dir().display()));

    let listener = server::create_reusable_listener(addr)?;
    logger::log_server_start(&addr, &state.config, github_location.as_deref());

    let signals = Arc::new(server::SignalHandler::new());
    server::start_signal_handler(Arc::clone(&signals));

    // LocalSet for spawn_local support
    let local = tokio::task::LocalSet::new();
    let result = local
        .run_until(server::start_server_loop(
            listener,
            state,
            Arc::new(AtomicUsize::new(0)),
            Arc::clone(&signals.shutdown),
        ))
        .await;

    if signals.shutdown_requested.load(Ordering::SeqCst) {
        logger::log_info("Shutdown complete");
    }
    result
}
