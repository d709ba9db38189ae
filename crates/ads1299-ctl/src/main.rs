mod cli;
mod linux;

use std::time::Duration;

use ads1299::liveness::DEFAULT_PERIOD_MS;
use ads1299::{Ads1299, LivenessPoller};
use anyhow::{Context, Result};
use clap::Parser;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::linux::LinuxBoard;

/// `DelayNs` on top of the tokio timer.
struct TokioDelay;

impl embedded_hal_async::delay::DelayNs for TokioDelay {
    async fn delay_ns(&mut self, ns: u32) {
        tokio::time::sleep(Duration::from_nanos(ns.into())).await;
    }

    async fn delay_ms(&mut self, ms: u32) {
        tokio::time::sleep(Duration::from_millis(ms.into())).await;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let board = LinuxBoard::new(&cli.gpio_chip);
    let ads = Ads1299::<NoopRawMutex, _, _>::new(board, TokioDelay, cli.board_config());

    if let Err(e) = ads.init().await {
        if let Err(e) = ads.shutdown().await {
            warn!(error = %e, "cleanup after failed init");
        }
        return Err(e).context("ADS1299 initialization failed");
    }

    let result = session(&ads, cli.watch).await;
    ads.shutdown().await.context("shutting down ADS1299")?;
    result
}

async fn session(
    ads: &Ads1299<NoopRawMutex, LinuxBoard, TokioDelay>,
    watch: Option<u64>,
) -> Result<()> {
    let id = ads.read_id().await.context("reading ID register")?;
    println!("ID: 0x{:02x}", id.bits());

    let dump = match ads.dump_registers().await {
        Ok(dump) => dump,
        Err(e) => {
            print!("{}", e.partial);
            return Err(e).context("dumping registers");
        }
    };
    print!("{dump}");

    let Some(secs) = watch else {
        return Ok(());
    };

    info!(secs, "watching ID register");
    let poller = LivenessPoller::<NoopRawMutex>::new();
    let run = poller.run(ads, TokioDelay, DEFAULT_PERIOD_MS);
    tokio::pin!(run);
    let readings = tokio::select! {
        result = &mut run => result,
        _ = tokio::time::sleep(Duration::from_secs(secs)) => {
            poller.stop();
            run.await
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted");
            poller.stop();
            run.await
        }
    };
    let readings = readings.context("liveness poll")?;
    info!(readings, "liveness poll finished");
    Ok(())
}
