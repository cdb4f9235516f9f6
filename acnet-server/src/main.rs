// acnet dedicated server: accepts game clients, checks registrations, echoes opaque traffic.

mod app;
mod config;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use acnet_net::ServerTransport;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("acnet-server {}", VERSION);
            return Ok(());
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("acnet_server=info".parse()?)
                .add_directive("acnet_net=info".parse()?),
        )
        .init();

    let cfg = config::load();
    let tick = Duration::from_millis(cfg.tick_ms.max(1));

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .context("installing shutdown handler")?;

    let mut transport = ServerTransport::new(cfg.transport.clone());
    transport
        .open(cfg.port)
        .with_context(|| format!("listening on port {}", cfg.port))?;
    info!("acnet-server {} ticking every {:?}", VERSION, tick);

    let mut server = app::EchoServer::default();
    while running.load(Ordering::SeqCst) {
        let started = Instant::now();
        transport.update(&mut server);
        server.flush(&mut transport);
        if let Some(rest) = tick.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    info!("shutting down, {} registered clients", server.registered());
    transport.close(&mut server);
    Ok(())
}
