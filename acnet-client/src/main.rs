// acnet game client: connects, registers, sends heartbeats until removed or disconnected.

mod app;
mod config;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use acnet_core::{Platform, RegistrationInfo};
use acnet_net::ClientTransport;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() -> anyhow::Result<()> {
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("acnet-client {}", VERSION);
            return Ok(());
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("acnet_client=info".parse()?)
                .add_directive("acnet_net=info".parse()?),
        )
        .init();

    let cfg = config::load();
    let platform: Platform = cfg
        .platform
        .parse()
        .with_context(|| format!("platform {:?}", cfg.platform))?;
    let tick = Duration::from_millis(cfg.tick_ms.max(1));

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .context("installing shutdown handler")?;

    let mut transport = ClientTransport::new(cfg.transport.clone());
    transport
        .connect(&cfg.host, cfg.port)
        .with_context(|| format!("connecting to {}:{}", cfg.host, cfg.port))?;

    let registration = RegistrationInfo {
        product_user_id: cfg.product_user_id.clone(),
        connect_id_token: cfg.token.clone(),
        platform,
    };
    transport
        .send(&registration.into())
        .context("sending registration")?;

    let mut client = app::GameClient::default();
    while running.load(Ordering::SeqCst) {
        let started = Instant::now();
        transport.update(&mut client);
        if let Some(exit) = client.exit() {
            info!("stopping: {:?}", exit);
            break;
        }
        if let Some(beat) = client.tick() {
            if let Err(e) = transport.send(&beat) {
                warn!("heartbeat failed: {}", e);
                if !transport.is_connected() {
                    break;
                }
            }
        }
        if let Some(rest) = tick.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    info!("received {} echoes", client.echoes());
    transport.disconnect();
    Ok(())
}
