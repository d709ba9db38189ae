use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;
use embedded_hal_async::delay::DelayNs;
use portable_atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use crate::board::Board;
use crate::errors::Error;
use crate::registers::Register;
use crate::Ads1299;

/// Default interval between ID reads, in milliseconds.
pub const DEFAULT_PERIOD_MS: u32 = 500;

/// Periodic read of the ID register confirming the chip still answers.
///
/// [`run`](Self::run) is driven by the caller on whatever executor it uses;
/// [`stop`](Self::stop) ends it at the next wake-up. Each reading takes the
/// driver lock like any foreground call.
pub struct LivenessPoller<M: RawMutex> {
    stop: Signal<M, ()>,
    running: AtomicBool,
}

impl<M: RawMutex> Default for LivenessPoller<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex> LivenessPoller<M> {
    pub const fn new() -> Self {
        Self { stop: Signal::new(), running: AtomicBool::new(false) }
    }

    /// Poll until stopped or until a read fails.
    ///
    /// Returns the number of successful readings when stopped, or the
    /// error of the first failed read.
    pub async fn run<B, D, T>(
        &self,
        ads: &Ads1299<M, B, D>,
        mut timer: T,
        period_ms: u32,
    ) -> Result<u32, Error<B::Error>>
    where
        B: Board,
        D: DelayNs,
        T: DelayNs,
    {
        // A stop issued while no run was active does not carry over.
        self.stop.reset();
        self.running.store(true, Ordering::SeqCst);
        let mut readings = 0;
        let result = loop {
            match select(self.stop.wait(), timer.delay_ms(period_ms)).await {
                Either::First(()) => break Ok(readings),
                Either::Second(()) => {}
            }
            match ads.read_register(Register::ID).await {
                Ok(id) => {
                    readings += 1;
                    info!(register = %Register::ID, value = id, "liveness");
                }
                Err(e) => {
                    warn!(register = %Register::ID, error = ?e, "liveness read failed");
                    break Err(e);
                }
            }
        };
        self.stop.reset();
        self.running.store(false, Ordering::SeqCst);
        result
    }

    /// End the active [`run`](Self::run). Has no effect when nothing runs.
    pub fn stop(&self) {
        self.stop.signal(());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
