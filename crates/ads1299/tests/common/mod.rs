#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ads1299::{Board, BoardConfig, BusConfig, Edge, Pull, Role};
use embedded_hal::digital;
use embedded_hal::spi::{self, Operation};

// ---------------------------------------------------------------------------
// Recorded activity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Acquire(Role),
    /// Line driven; `true` is high.
    Pin(Role, bool),
    Delay(u64),
    OpenBus,
    CloseBus,
    /// Bytes clocked out in one transaction.
    Frame(Vec<u8>),
}

/// Shared state of the simulated chip and its wiring.
pub struct Chip {
    pub events: Vec<Event>,
    pub regs: [u8; 24],
    /// Number of upcoming register writes the chip silently drops.
    pub ignore_writes: usize,
    /// Drop every register write.
    pub stubborn: bool,
    /// Reads starting at this address fail.
    pub fail_read_at: Option<u8>,
    /// Single-byte writes (commands) fail.
    pub fail_commands: bool,
    pub fail_acquire: Option<Role>,
    /// Driving this line to this level fails.
    pub fail_drive: Option<(Role, bool)>,
    pub fail_open: bool,
    pub fail_close: bool,
    pub drdy_low: bool,
    /// Time each transaction occupies the bus.
    pub busy: Option<Duration>,
    pub intervals: Vec<(Instant, Instant)>,
}

impl Chip {
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Frame(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    /// Register write frames sent so far.
    pub fn write_frames(&self) -> Vec<Vec<u8>> {
        self.frames()
            .into_iter()
            .filter(|f| f.len() == 3 && f[0] & 0xE0 == 0x40)
            .collect()
    }
}

pub const POWER_ON_REGS: [u8; 24] = [
    0x3E, 0x96, 0xC0, 0x60, 0x00, 0x61, 0x61, 0x61, 0x61, 0x61, 0x61, 0x61,
    0x61, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0F, 0x00, 0x00, 0x00,
];

pub type Shared = Arc<Mutex<Chip>>;

pub fn chip() -> Shared {
    Arc::new(Mutex::new(Chip {
        events: Vec::new(),
        regs: POWER_ON_REGS,
        ignore_writes: 0,
        stubborn: false,
        fail_read_at: None,
        fail_commands: false,
        fail_acquire: None,
        fail_drive: None,
        fail_open: false,
        fail_close: false,
        drdy_low: false,
        busy: None,
        intervals: Vec::new(),
    }))
}

fn record(chip: &Shared, event: Event) {
    chip.lock().unwrap().events.push(event);
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
pub struct MockBoardError(pub &'static str);

impl std::fmt::Display for MockBoardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

pub struct MockBoard {
    pub chip: Shared,
}

impl Board for MockBoard {
    type Error = MockBoardError;
    type Spi = MockSpi;
    type Output = MockPin;
    type Input = MockInput;

    fn output(&mut self, role: Role, _name: &str) -> Result<MockPin, MockBoardError> {
        if self.chip.lock().unwrap().fail_acquire == Some(role) {
            return Err(MockBoardError("no such line"));
        }
        record(&self.chip, Event::Acquire(role));
        Ok(MockPin { role, chip: self.chip.clone() })
    }

    fn input(
        &mut self,
        role: Role,
        _name: &str,
        pull: Pull,
        edge: Edge,
    ) -> Result<MockInput, MockBoardError> {
        assert_eq!((pull, edge), (Pull::Up, Edge::Falling));
        if self.chip.lock().unwrap().fail_acquire == Some(role) {
            return Err(MockBoardError("no such line"));
        }
        record(&self.chip, Event::Acquire(role));
        Ok(MockInput { chip: self.chip.clone() })
    }

    fn open_bus(&mut self, _config: &BusConfig) -> Result<MockSpi, MockBoardError> {
        if self.chip.lock().unwrap().fail_open {
            return Err(MockBoardError("no such port"));
        }
        record(&self.chip, Event::OpenBus);
        Ok(MockSpi { chip: self.chip.clone() })
    }

    fn close_bus(&mut self, _bus: MockSpi) -> Result<(), MockBoardError> {
        record(&self.chip, Event::CloseBus);
        if self.chip.lock().unwrap().fail_close {
            return Err(MockBoardError("close failed"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Lines
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct MockPinError;

impl digital::Error for MockPinError {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

pub struct MockPin {
    role: Role,
    chip: Shared,
}

impl MockPin {
    fn drive(&mut self, high: bool) -> Result<(), MockPinError> {
        let mut chip = self.chip.lock().unwrap();
        if chip.fail_drive == Some((self.role, high)) {
            return Err(MockPinError);
        }
        chip.events.push(Event::Pin(self.role, high));
        Ok(())
    }
}

impl digital::ErrorType for MockPin {
    type Error = MockPinError;
}

impl digital::OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.drive(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.drive(true)
    }
}

pub struct MockInput {
    chip: Shared,
}

impl digital::ErrorType for MockInput {
    type Error = core::convert::Infallible;
}

impl digital::InputPin for MockInput {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.chip.lock().unwrap().drdy_low)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(self.chip.lock().unwrap().drdy_low)
    }
}

// ---------------------------------------------------------------------------
// SPI
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct MockSpiError;

impl spi::Error for MockSpiError {
    fn kind(&self) -> spi::ErrorKind {
        spi::ErrorKind::Other
    }
}

pub struct MockSpi {
    chip: Shared,
}

impl spi::ErrorType for MockSpi {
    type Error = MockSpiError;
}

impl MockSpi {
    fn exchange(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), MockSpiError> {
        let mut chip = self.chip.lock().unwrap();
        chip.events.push(Event::Frame(write.to_vec()));

        match (write.first().copied(), write.len()) {
            (Some(_), 1) => {
                if chip.fail_commands {
                    return Err(MockSpiError);
                }
            }
            (Some(header), 3) if header & 0xE0 == 0x40 && read.is_empty() => {
                let addr = (header & 0x1F) as usize;
                if chip.ignore_writes > 0 {
                    chip.ignore_writes -= 1;
                } else if !chip.stubborn {
                    chip.regs[addr] = write[2];
                }
            }
            (Some(header), len) if header & 0xE0 == 0x20 => {
                let addr = header & 0x1F;
                if chip.fail_read_at == Some(addr) {
                    return Err(MockSpiError);
                }
                let count = write[1] as usize;
                assert_eq!(len, count + 3, "read frame length");
                for i in 0..=count {
                    read[2 + i] = chip.regs[addr as usize + i];
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl embedded_hal_async::spi::SpiDevice for MockSpi {
    async fn transaction(
        &mut self,
        operations: &mut [Operation<'_, u8>],
    ) -> Result<(), Self::Error> {
        let start = Instant::now();
        let busy = self.chip.lock().unwrap().busy;
        if let Some(busy) = busy {
            std::thread::sleep(busy);
        }

        for op in operations.iter_mut() {
            match op {
                Operation::Write(buf) => self.exchange(&mut [], buf)?,
                Operation::Transfer(read, write) => self.exchange(read, write)?,
                Operation::Read(buf) => buf.fill(0),
                Operation::TransferInPlace(buf) => {
                    let write = buf.to_vec();
                    self.exchange(buf, &write)?
                }
                Operation::DelayNs(_) => {}
            }
        }

        let end = Instant::now();
        self.chip.lock().unwrap().intervals.push((start, end));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Delays
// ---------------------------------------------------------------------------

/// Records requested delays and returns at once.
pub struct MockDelay {
    pub chip: Shared,
}

impl embedded_hal_async::delay::DelayNs for MockDelay {
    async fn delay_ns(&mut self, ns: u32) {
        record(&self.chip, Event::Delay(ns.into()));
    }
}

/// Yields to the executor once instead of sleeping.
pub struct YieldTimer;

impl embedded_hal_async::delay::DelayNs for YieldTimer {
    async fn delay_ns(&mut self, _ns: u32) {
        embassy_futures::yield_now().await;
    }
}

/// Blocks the calling thread for the requested time.
pub struct ThreadTimer;

impl embedded_hal_async::delay::DelayNs for ThreadTimer {
    async fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(ns.into()));
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn config() -> BoardConfig {
    BoardConfig::default()
}

/// Clock period of the default configuration.
pub const CLK: u64 = 700;
