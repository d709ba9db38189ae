//! Control driver for the TI ADS1299 analog front end.
//!
//! Powers the chip up in the order its datasheet requires, issues commands
//! and reads/writes registers over SPI. All access to the bus and control
//! lines goes through one async mutex, so a [`LivenessPoller`] can run next
//! to foreground calls without two transactions ever overlapping.
//!
//! Configuration ([`BoardConfig`]) is owned heap data built once by the
//! caller. The transfer path never allocates: frames are fixed-size arrays,
//! read results and the register dump are `heapless` vectors.

use core::fmt;
use core::result::Result;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal::digital::{Error as _, InputPin, OutputPin};
use embedded_hal::spi::Error as _;
use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::spi::SpiDevice;
use heapless::Vec;
use tracing::{debug, info, warn};

pub use crate::board::*;
pub use crate::errors::*;
pub use crate::liveness::LivenessPoller;
pub use crate::registers::*;

pub mod board;
pub mod errors;
pub mod liveness;
pub mod registers;

/// Number of registers in the map.
pub const REGISTER_COUNT: usize = LAST_ADDRESS as usize + 1;
/// Registers covered by [`Ads1299::dump_registers`] (ID through MISC2).
pub const DUMP_LEN: usize = 23;

// Header, count, then one byte per register.
const MAX_FRAME: usize = 2 + REGISTER_COUNT;

/// Where the driver is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Ready,
    /// Initialization failed; only `shutdown` is accepted.
    Faulted,
    ShutDown,
}

struct Lines<B: Board> {
    power_down: Option<B::Output>,
    reset: Option<B::Output>,
    clock_select: Option<B::Output>,
    start: Option<B::Output>,
    data_ready: Option<B::Input>,
}

impl<B: Board> Default for Lines<B> {
    fn default() -> Self {
        Self {
            power_down: None,
            reset: None,
            clock_select: None,
            start: None,
            data_ready: None,
        }
    }
}

struct Inner<B: Board, D> {
    board: B,
    delay: D,
    config: BoardConfig,
    lines: Lines<B>,
    spi: Option<B::Spi>,
    state: Lifecycle,
}

pub struct Ads1299<M: RawMutex, B: Board, D> {
    inner: Mutex<M, Inner<B, D>>,
}

impl<M, B, D> Ads1299<M, B, D>
where
    M: RawMutex,
    B: Board,
    D: DelayNs,
{
    pub fn new(board: B, delay: D, config: BoardConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                board,
                delay,
                config,
                lines: Lines::default(),
                spi: None,
                state: Lifecycle::Uninitialized,
            }),
        }
    }

    pub async fn state(&self) -> Lifecycle {
        self.inner.lock().await.state
    }

    /// Run the power-up sequence, open the bus and bring the chip into a
    /// command-accepting state.
    ///
    /// Any failure is final: the driver moves to [`Lifecycle::Faulted`] and
    /// only [`shutdown`](Self::shutdown) remains possible.
    pub async fn init(&self) -> Result<(), Error<B::Error>> {
        let mut inner = self.inner.lock().await;
        if inner.state != Lifecycle::Uninitialized {
            return Err(Error::NotReady(inner.state));
        }

        info!("powering up ADS1299");
        match inner.power_up().await {
            Ok(()) => {
                inner.state = Lifecycle::Ready;
                info!("ADS1299 ready");
                Ok(())
            }
            Err(e) => {
                inner.state = Lifecycle::Faulted;
                warn!(error = ?e, "ADS1299 initialization failed");
                Err(e)
            }
        }
    }

    /// Power the chip down and release the bus.
    ///
    /// Both steps are attempted even if the first one fails; the first
    /// error is returned. Afterwards every other operation is refused.
    pub async fn shutdown(&self) -> Result<(), Error<B::Error>> {
        let mut inner = self.inner.lock().await;
        let result = inner.release().await;
        inner.state = Lifecycle::ShutDown;
        info!("ADS1299 shut down");
        result
    }

    pub async fn cmd(&self, command: Command) -> Result<(), Error<B::Error>> {
        let mut inner = self.inner.lock().await;
        inner.ensure_ready()?;
        inner.command(command).await
    }

    /// Read `count + 1` consecutive registers starting at `reg`.
    pub async fn read_registers(
        &self,
        reg: Register,
        count: u8,
    ) -> Result<Vec<u8, REGISTER_COUNT>, Error<B::Error>> {
        let mut inner = self.inner.lock().await;
        inner.ensure_ready()?;
        inner.read(reg, count).await
    }

    pub async fn read_register(
        &self,
        reg: Register,
    ) -> Result<u8, Error<B::Error>> {
        let mut inner = self.inner.lock().await;
        inner.ensure_ready()?;
        inner.read_one(reg).await
    }

    /// Write one register, verifying it when the board asks for it.
    pub async fn write_register(
        &self,
        reg: Register,
        val: u8,
    ) -> Result<(), Error<B::Error>> {
        let mut inner = self.inner.lock().await;
        inner.ensure_ready()?;
        inner.write(reg, val).await
    }

    pub async fn modify_register<F>(
        &self,
        register: Register,
        f: F,
    ) -> Result<(), Error<B::Error>>
    where
        F: FnOnce(u8) -> u8,
    {
        let mut inner = self.inner.lock().await;
        inner.ensure_ready()?;
        let value = inner.read_one(register).await?;
        inner.write(register, f(value)).await
    }

    /// Read ID through MISC2 one register at a time.
    ///
    /// Stops at the first failing read; the error carries what was read
    /// before it.
    pub async fn dump_registers(
        &self,
    ) -> Result<RegisterDump, DumpError<B::Error>> {
        let mut dump = RegisterDump::default();
        for reg in &Register::ALL[..DUMP_LEN] {
            match self.read_register(*reg).await {
                Ok(value) => {
                    // One push per register of a DUMP_LEN slice into a
                    // DUMP_LEN vector; never full.
                    let _ = dump.values.push(value);
                }
                Err(error) => return Err(DumpError { partial: dump, error }),
            }
        }
        Ok(dump)
    }

    pub async fn read_id(&self) -> Result<Id, Error<B::Error>> {
        let reg_value = self.read_register(Register::ID).await?;
        Ok(Id::from_bits_retain(reg_value))
    }

    pub async fn smell(&self) -> Result<(), Error<B::Error>> {
        self.read_id().await?.smell().map_err(|e| e.into())
    }

    pub async fn num_channels(&self) -> Result<u8, Error<B::Error>> {
        self.read_id().await?.num_chs().map_err(Error::from)
    }

    pub async fn sample_rate(&self) -> Result<SampleRate, Error<B::Error>> {
        let reg_value = self.read_register(Register::CONFIG1).await?;
        Config1::from_bits_retain(reg_value).odr().map_err(Error::from)
    }

    pub async fn set_sample_rate(
        &self,
        sample_rate: SampleRate,
    ) -> Result<(), Error<B::Error>> {
        self.modify_register(Register::CONFIG1, |reg_value| {
            Config1::from_bits_retain(reg_value).with_odr(sample_rate).bits()
        })
        .await
    }

    /// Level of the DRDY line (active low), or `None` when the board has no
    /// data-ready line configured.
    pub async fn data_ready(&self) -> Result<Option<bool>, Error<B::Error>> {
        let mut inner = self.inner.lock().await;
        inner.ensure_ready()?;
        match inner.lines.data_ready.as_mut() {
            Some(drdy) => {
                drdy.is_low().map(Some).map_err(|e| Error::Pin(e.kind()))
            }
            None => Ok(None),
        }
    }
}

impl<B: Board, D: DelayNs> Inner<B, D> {
    fn ensure_ready(&self) -> Result<(), Error<B::Error>> {
        match self.state {
            Lifecycle::Ready => Ok(()),
            state => Err(Error::NotReady(state)),
        }
    }

    fn bus(&mut self) -> Result<&mut B::Spi, Error<B::Error>> {
        let state = self.state;
        self.spi.as_mut().ok_or(Error::NotReady(state))
    }

    async fn settle(&mut self, clks: u32) {
        let ns = self.config.clks_to_ns(clks);
        match u32::try_from(ns) {
            Ok(ns) => self.delay.delay_ns(ns).await,
            Err(_) => {
                let us = ns.div_ceil(1_000);
                self.delay.delay_us(u32::try_from(us).unwrap_or(u32::MAX)).await
            }
        }
    }

    async fn power_up(&mut self) -> Result<(), Error<B::Error>> {
        let pins = self.config.pins.clone();

        let pwdn = self.output_low(Role::PowerDown, &pins.power_down)?;
        self.lines.power_down = Some(pwdn);
        let reset = self.output_low(Role::Reset, &pins.reset)?;
        self.lines.reset = Some(reset);
        if let Some(name) = &pins.clock_select {
            let clksel = self.output_low(Role::ClockSelect, name)?;
            self.lines.clock_select = Some(clksel);
        }
        if let Some(name) = &pins.start {
            let start = self.output_low(Role::Start, name)?;
            self.lines.start = Some(start);
        }
        if let Some(name) = &pins.data_ready {
            let drdy = self
                .board
                .input(Role::DataReady, name, Pull::Up, Edge::Falling)
                .map_err(|e| Error::Setup {
                    stage: Stage::Acquire(Role::DataReady),
                    source: Fault::Board(e),
                })?;
            self.lines.data_ready = Some(drdy);
        }

        debug!("waiting for oscillator to settle");
        self.settle(T_POR_CLKS).await;
        self.set_line(Role::PowerDown, true)?;
        debug!("waiting for power-on reset");
        self.settle(T_POR_CLKS).await;
        self.set_line(Role::Reset, true)?;
        self.settle(RST_WAIT_CLKS).await;

        let bus = &self.config.bus;
        debug!(port = %bus.port, hz = bus.max_speed_hz, "opening SPI bus");
        let spi = self.board.open_bus(bus).map_err(|e| Error::Setup {
            stage: Stage::OpenBus,
            source: Fault::Board(e),
        })?;
        self.spi = Some(spi);

        // The chip may come up streaming; RESET then SDATAC puts it in a
        // known command mode.
        for command in [Command::RESET, Command::SDATAC] {
            self.command(command).await.map_err(|e| match e {
                Error::Transport(kind) => Error::Setup {
                    stage: Stage::Command(command),
                    source: Fault::Spi(kind),
                },
                other => other,
            })?;
        }

        for (reg, value) in self.config.startup_registers.clone() {
            self.write(reg, value).await?;
        }

        let id = Id::from_bits_retain(self.read_one(Register::ID).await?);
        match (id.smell(), id.num_chs()) {
            (Ok(()), Ok(chs)) => {
                info!(revision = id.revision(), channels = chs, "ADS1299 detected")
            }
            _ => warn!(id = id.bits(), "ID register does not identify an ADS1299"),
        }
        Ok(())
    }

    async fn release(&mut self) -> Result<(), Error<B::Error>> {
        let mut first = None;
        if let Some(spi) = self.spi.take() {
            match self.set_line(Role::PowerDown, false) {
                Ok(()) => self.settle(T_POR_CLKS).await,
                Err(e) => first = Some(e),
            }
            if let Err(e) = self.board.close_bus(spi) {
                warn!(error = ?e, "failed to close SPI bus");
                first.get_or_insert(Error::Setup {
                    stage: Stage::CloseBus,
                    source: Fault::Board(e),
                });
            }
        }
        self.lines = Lines::default();
        first.map_or(Ok(()), Err)
    }

    fn output_low(
        &mut self,
        role: Role,
        name: &str,
    ) -> Result<B::Output, Error<B::Error>> {
        let mut line = self.board.output(role, name).map_err(|e| {
            Error::Setup { stage: Stage::Acquire(role), source: Fault::Board(e) }
        })?;
        line.set_low().map_err(|e| Error::Setup {
            stage: Stage::DriveLow(role),
            source: Fault::Pin(e.kind()),
        })?;
        debug!(line = %role, name, "driven low");
        Ok(line)
    }

    fn set_line(&mut self, role: Role, high: bool) -> Result<(), Error<B::Error>> {
        let line = match role {
            Role::PowerDown => self.lines.power_down.as_mut(),
            Role::Reset => self.lines.reset.as_mut(),
            Role::ClockSelect => self.lines.clock_select.as_mut(),
            Role::Start => self.lines.start.as_mut(),
            Role::DataReady => None,
        };
        let Some(line) = line else {
            return Ok(());
        };
        let (result, stage) = if high {
            (line.set_high(), Stage::DriveHigh(role))
        } else {
            (line.set_low(), Stage::DriveLow(role))
        };
        result.map_err(|e| Error::Setup { stage, source: Fault::Pin(e.kind()) })?;
        debug!(line = %role, high, "line driven");
        Ok(())
    }

    async fn command(&mut self, command: Command) -> Result<(), Error<B::Error>> {
        let (buf, len) = command.into();
        self.bus()?
            .write(&buf[0..len])
            .await
            .map_err(|e| Error::Transport(e.kind()))?;
        debug!(?command, "command sent");
        self.settle(command.settle_clks()).await;
        Ok(())
    }

    async fn read(
        &mut self,
        reg: Register,
        count: u8,
    ) -> Result<Vec<u8, REGISTER_COUNT>, Error<B::Error>> {
        if count > reg.max_count() {
            return Err(Error::CountOutOfRange { register: reg, count });
        }
        let len = count as usize + 3;
        let (header, _): ([u8; 2], usize) = Command::RREG(reg, count).into();
        let mut write = [0u8; MAX_FRAME];
        write[..2].copy_from_slice(&header);
        let mut read = [0u8; MAX_FRAME];

        self.bus()?
            .transfer(&mut read[..len], &write[..len])
            .await
            .map_err(|e| Error::Transport(e.kind()))?;
        debug!(register = %reg, values = ?&read[2..len], "registers read");
        Ok(read[2..len].iter().copied().collect())
    }

    async fn read_one(&mut self, reg: Register) -> Result<u8, Error<B::Error>> {
        let values = self.read(reg, 0).await?;
        Ok(values[0])
    }

    async fn write(&mut self, reg: Register, value: u8) -> Result<(), Error<B::Error>> {
        let verify = self.config.write_verify;
        let attempts = verify.map_or(1, |v| v.attempts.max(1));
        let (header, _): ([u8; 2], usize) = Command::WREG(reg, 0).into();
        let frame = [header[0], header[1], value];

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.bus()?
                .write(&frame)
                .await
                .map_err(|e| Error::Transport(e.kind()))?;
            debug!(register = %reg, value, attempt, "register written");

            let Some(verify) = verify else {
                return Ok(());
            };
            let read_back = self.read_one(reg).await?;
            if read_back == value {
                return Ok(());
            }
            warn!(register = %reg, value, read_back, attempt, "register write did not verify");
            if attempt >= attempts {
                return Err(Error::WriteVerification {
                    register: reg,
                    written: value,
                    read_back,
                    attempts: attempt,
                });
            }
            self.settle(verify.retry_delay_clks).await;
        }
    }
}

/// Values of registers ID through MISC2, in address order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterDump {
    values: Vec<u8, DUMP_LEN>,
}

impl RegisterDump {
    pub fn values(&self) -> &[u8] {
        &self.values
    }

    pub fn get(&self, reg: Register) -> Option<u8> {
        self.values.get(reg.addr() as usize).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Register, u8)> + '_ {
        Register::ALL.iter().copied().zip(self.values.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for RegisterDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (reg, value) in self.iter() {
            writeln!(f, "{:<11} 0x{:02x}", format!("{:?}", reg), value)?;
        }
        Ok(())
    }
}

/// A register dump cut short by a failed read.
#[derive(Debug)]
pub struct DumpError<E> {
    /// Registers read before the failure.
    pub partial: RegisterDump,
    pub error: Error<E>,
}

impl<E: fmt::Display> fmt::Display for DumpError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "register dump stopped after {} registers: {}",
            self.partial.len(),
            self.error
        )
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for DumpError<E> {}
