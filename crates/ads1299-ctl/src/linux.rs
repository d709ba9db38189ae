//! Linux board: control lines through the GPIO character device, the bus
//! through spidev.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ads1299::{Board, BusConfig, Edge, Pull, Role};
use embedded_hal::digital;
use embedded_hal::spi::{self, Operation, Phase, Polarity};
use gpiocdev::line::{Bias, EdgeDetection, Value};
use gpiocdev::Request;
use spidev::{SpiModeFlags, Spidev, SpidevOptions, SpidevTransfer};
use tracing::debug;

const CONSUMER: &str = "ads1299";

#[derive(Debug)]
pub enum BoardError {
    LineNotFound(String),
    Gpio(gpiocdev::Error),
    Spi(io::Error),
}

impl fmt::Display for BoardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoardError::LineNotFound(name) => write!(f, "no GPIO line named {name:?}"),
            BoardError::Gpio(e) => write!(f, "GPIO: {e}"),
            BoardError::Spi(e) => write!(f, "SPI: {e}"),
        }
    }
}

impl std::error::Error for BoardError {}

impl From<gpiocdev::Error> for BoardError {
    fn from(e: gpiocdev::Error) -> Self {
        BoardError::Gpio(e)
    }
}

pub struct LinuxBoard {
    chip: PathBuf,
}

impl LinuxBoard {
    /// Numeric line names are offsets on `chip`; anything else is looked up
    /// by name across all chips.
    pub fn new(chip: impl AsRef<Path>) -> Self {
        Self { chip: chip.as_ref().to_path_buf() }
    }

    fn resolve(&self, name: &str) -> Result<(PathBuf, u32), BoardError> {
        if let Ok(offset) = name.parse::<u32>() {
            return Ok((self.chip.clone(), offset));
        }
        let found = gpiocdev::find_named_line(name)
            .ok_or_else(|| BoardError::LineNotFound(name.to_string()))?;
        Ok((found.chip, found.info.offset))
    }
}

impl Board for LinuxBoard {
    type Error = BoardError;
    type Spi = LinuxSpi;
    type Output = Line;
    type Input = Line;

    fn output(&mut self, role: Role, name: &str) -> Result<Line, BoardError> {
        let (chip, offset) = self.resolve(name)?;
        let request = Request::builder()
            .on_chip(&chip)
            .with_consumer(CONSUMER)
            .with_line(offset)
            .as_output(Value::Inactive)
            .request()?;
        debug!(line = %role, chip = %chip.display(), offset, "output requested");
        Ok(Line { request, offset })
    }

    fn input(
        &mut self,
        role: Role,
        name: &str,
        pull: Pull,
        edge: Edge,
    ) -> Result<Line, BoardError> {
        let (chip, offset) = self.resolve(name)?;
        let bias = match pull {
            Pull::None => Bias::Disabled,
            Pull::Up => Bias::PullUp,
            Pull::Down => Bias::PullDown,
        };
        let mut builder = Request::builder();
        builder
            .on_chip(&chip)
            .with_consumer(CONSUMER)
            .with_line(offset)
            .as_input()
            .with_bias(bias);
        match edge {
            Edge::None => {}
            Edge::Rising => {
                builder.with_edge_detection(EdgeDetection::RisingEdge);
            }
            Edge::Falling => {
                builder.with_edge_detection(EdgeDetection::FallingEdge);
            }
        }
        let request = builder.request()?;
        debug!(line = %role, chip = %chip.display(), offset, "input requested");
        Ok(Line { request, offset })
    }

    fn open_bus(&mut self, config: &BusConfig) -> Result<LinuxSpi, BoardError> {
        let mut dev = Spidev::open(&config.port).map_err(BoardError::Spi)?;
        let mut mode = match (config.mode.polarity, config.mode.phase) {
            (Polarity::IdleLow, Phase::CaptureOnFirstTransition) => SpiModeFlags::SPI_MODE_0,
            (Polarity::IdleLow, Phase::CaptureOnSecondTransition) => SpiModeFlags::SPI_MODE_1,
            (Polarity::IdleHigh, Phase::CaptureOnFirstTransition) => SpiModeFlags::SPI_MODE_2,
            (Polarity::IdleHigh, Phase::CaptureOnSecondTransition) => SpiModeFlags::SPI_MODE_3,
        };
        if !config.chip_select {
            mode |= SpiModeFlags::SPI_NO_CS;
        }
        let options = SpidevOptions::new()
            .bits_per_word(8)
            .max_speed_hz(config.max_speed_hz)
            .mode(mode)
            .build();
        dev.configure(&options).map_err(BoardError::Spi)?;
        Ok(LinuxSpi { dev })
    }

    fn close_bus(&mut self, bus: LinuxSpi) -> Result<(), BoardError> {
        drop(bus);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// GPIO line
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct GpioError(gpiocdev::Error);

impl digital::Error for GpioError {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

/// One requested line. Released when dropped.
pub struct Line {
    request: Request,
    offset: u32,
}

impl Line {
    fn set(&mut self, value: Value) -> Result<(), GpioError> {
        self.request.set_value(self.offset, value).map(drop).map_err(GpioError)
    }

    fn get(&mut self) -> Result<Value, GpioError> {
        self.request.value(self.offset).map_err(GpioError)
    }
}

impl digital::ErrorType for Line {
    type Error = GpioError;
}

impl digital::OutputPin for Line {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.set(Value::Inactive)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.set(Value::Active)
    }
}

impl digital::InputPin for Line {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.get()? == Value::Active)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(self.get()? == Value::Inactive)
    }
}

// ---------------------------------------------------------------------------
// SPI
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct SpiError(io::Error);

impl spi::Error for SpiError {
    fn kind(&self) -> spi::ErrorKind {
        spi::ErrorKind::Other
    }
}

/// spidev handle. Transfers block the calling thread; every operation of a
/// transaction goes out in one ioctl so chip select stays asserted.
pub struct LinuxSpi {
    dev: Spidev,
}

impl spi::ErrorType for LinuxSpi {
    type Error = SpiError;
}

impl embedded_hal_async::spi::SpiDevice for LinuxSpi {
    async fn transaction(
        &mut self,
        operations: &mut [Operation<'_, u8>],
    ) -> Result<(), Self::Error> {
        let mut transfers = Vec::with_capacity(operations.len());
        for op in operations.iter_mut() {
            match op {
                Operation::Read(buf) => transfers.push(SpidevTransfer::read(buf)),
                Operation::Write(buf) => transfers.push(SpidevTransfer::write(buf)),
                Operation::Transfer(read, write) => {
                    let n = read.len().min(write.len());
                    let (read_head, read_tail) = read.split_at_mut(n);
                    let (write_head, write_tail) = write.split_at(n);
                    transfers.push(SpidevTransfer::read_write(write_head, read_head));
                    if !read_tail.is_empty() {
                        transfers.push(SpidevTransfer::read(read_tail));
                    }
                    if !write_tail.is_empty() {
                        transfers.push(SpidevTransfer::write(write_tail));
                    }
                }
                Operation::TransferInPlace(buf) => {
                    transfers.push(SpidevTransfer::read_write_in_place(buf))
                }
                Operation::DelayNs(ns) => {
                    let us = Duration::from_nanos((*ns).into()).as_micros();
                    transfers.push(SpidevTransfer::delay(
                        u16::try_from(us.max(1)).unwrap_or(u16::MAX),
                    ));
                }
            }
        }
        self.dev.transfer_multiple(&mut transfers).map_err(SpiError)
    }
}
