mod common;

use std::time::Duration;

use ads1299::{Ads1299, Error, LivenessPoller, Register};
use common::*;
use embassy_futures::join::join;
use embassy_futures::yield_now;
use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, NoopRawMutex};
use embedded_hal::spi;
use futures::executor::block_on;

fn make<M: embassy_sync::blocking_mutex::raw::RawMutex>(
) -> (Ads1299<M, MockBoard, MockDelay>, Shared) {
    let chip = chip();
    let ads = Ads1299::new(
        MockBoard { chip: chip.clone() },
        MockDelay { chip: chip.clone() },
        config(),
    );
    (ads, chip)
}

fn id_reads(chip: &Shared) -> usize {
    chip.lock()
        .unwrap()
        .frames()
        .iter()
        .filter(|f| f.as_slice() == [0x20, 0x00, 0x00])
        .count()
}

// ---------------------------------------------------------------------------
// Single task
// ---------------------------------------------------------------------------

#[futures_test::test]
async fn poller_reads_id_until_stopped() {
    let (ads, chip) = make::<NoopRawMutex>();
    ads.init().await.unwrap();
    chip.lock().unwrap().events.clear();

    let poller = LivenessPoller::<NoopRawMutex>::new();
    assert!(!poller.is_running());

    let (result, ()) = join(poller.run(&ads, YieldTimer, 500), async {
        for _ in 0..10 {
            yield_now().await;
        }
        assert!(poller.is_running());
        poller.stop();
    })
    .await;

    let readings = result.unwrap();
    assert!(readings >= 1);
    assert_eq!(id_reads(&chip), readings as usize);
    assert!(!poller.is_running());
}

#[futures_test::test]
async fn poller_stops_on_failed_read() {
    let (ads, chip) = make::<NoopRawMutex>();
    ads.init().await.unwrap();
    chip.lock().unwrap().fail_read_at = Some(Register::ID.addr());

    let poller = LivenessPoller::<NoopRawMutex>::new();
    let result = poller.run(&ads, YieldTimer, 500).await;

    assert_eq!(result, Err(Error::Transport(spi::ErrorKind::Other)));
    assert!(!poller.is_running());
}

#[futures_test::test]
async fn poller_refuses_driver_that_is_not_ready() {
    let (ads, _chip) = make::<NoopRawMutex>();

    let poller = LivenessPoller::<NoopRawMutex>::new();
    let result = poller.run(&ads, YieldTimer, 500).await;

    assert_eq!(result, Err(Error::NotReady(ads1299::Lifecycle::Uninitialized)));
}

#[futures_test::test]
async fn poller_can_run_again_after_stop() {
    let (ads, _chip) = make::<NoopRawMutex>();
    ads.init().await.unwrap();
    let poller = LivenessPoller::<NoopRawMutex>::new();

    for _ in 0..2 {
        let (result, ()) = join(poller.run(&ads, YieldTimer, 500), async {
            yield_now().await;
            yield_now().await;
            poller.stop();
        })
        .await;
        assert!(result.is_ok());
    }
}

#[futures_test::test]
async fn stop_without_active_run_is_ignored() {
    let (ads, chip) = make::<NoopRawMutex>();
    ads.init().await.unwrap();
    chip.lock().unwrap().events.clear();
    let poller = LivenessPoller::<NoopRawMutex>::new();

    poller.stop();
    let (result, ()) = join(poller.run(&ads, YieldTimer, 500), async {
        for _ in 0..20 {
            yield_now().await;
        }
        poller.stop();
    })
    .await;

    let readings = result.unwrap();
    assert!(readings > 0);
    assert_eq!(id_reads(&chip), readings as usize);
}

#[futures_test::test]
async fn stop_after_failed_run_does_not_cancel_next_run() {
    let (ads, chip) = make::<NoopRawMutex>();
    ads.init().await.unwrap();
    let poller = LivenessPoller::<NoopRawMutex>::new();

    chip.lock().unwrap().fail_read_at = Some(Register::ID.addr());
    assert!(poller.run(&ads, YieldTimer, 500).await.is_err());
    poller.stop();

    chip.lock().unwrap().fail_read_at = None;
    let (result, ()) = join(poller.run(&ads, YieldTimer, 500), async {
        for _ in 0..20 {
            yield_now().await;
        }
        poller.stop();
    })
    .await;
    assert!(result.unwrap() > 0);
}

// ---------------------------------------------------------------------------
// Threads
// ---------------------------------------------------------------------------

#[test]
fn poller_and_foreground_never_overlap_on_the_bus() {
    let (ads, chip) = make::<CriticalSectionRawMutex>();
    block_on(ads.init()).unwrap();
    {
        let mut chip = chip.lock().unwrap();
        chip.events.clear();
        chip.intervals.clear();
        chip.busy = Some(Duration::from_micros(100));
    }

    let poller = LivenessPoller::<CriticalSectionRawMutex>::new();

    let readings = std::thread::scope(|s| {
        let background = s.spawn(|| block_on(poller.run(&ads, ThreadTimer, 1)));

        let mut writes = 0u32;
        while writes < 50 || id_reads(&chip) < 3 {
            block_on(ads.write_register(Register::CH1SET, writes as u8)).unwrap();
            writes += 1;
        }

        poller.stop();
        background.join().unwrap()
    })
    .unwrap();
    assert!(readings >= 3);

    let mut intervals = chip.lock().unwrap().intervals.clone();
    intervals.sort_by_key(|(start, _)| *start);
    for pair in intervals.windows(2) {
        assert!(pair[1].0 >= pair[0].1, "bus transactions overlap");
    }
}
