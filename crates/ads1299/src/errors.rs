use core::fmt;

use embedded_hal::{digital, spi};

use crate::board::Role;
use crate::registers::{Command, Register};
use crate::Lifecycle;

/// Step of the power sequence (or of shutdown) that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Acquire(Role),
    DriveLow(Role),
    DriveHigh(Role),
    OpenBus,
    Command(Command),
    CloseBus,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Acquire(role) => write!(f, "acquiring {} line", role),
            Stage::DriveLow(role) => write!(f, "driving {} low", role),
            Stage::DriveHigh(role) => write!(f, "driving {} high", role),
            Stage::OpenBus => write!(f, "opening SPI bus"),
            Stage::Command(cmd) => write!(f, "sending {:?}", cmd),
            Stage::CloseBus => write!(f, "closing SPI bus"),
        }
    }
}

/// Underlying cause of a [`Error::Setup`].
#[derive(Debug, PartialEq)]
pub enum Fault<E> {
    /// The board could not resolve a line or open/close the bus.
    Board(E),
    Pin(digital::ErrorKind),
    Spi(spi::ErrorKind),
}

impl<E: fmt::Display> fmt::Display for Fault<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Board(err) => write!(f, "{}", err),
            Fault::Pin(kind) => write!(f, "GPIO error: {}", kind),
            Fault::Spi(kind) => write!(f, "SPI error: {}", kind),
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum Error<E> {
    /// A control line or the bus could not be acquired, driven or released.
    Setup { stage: Stage, source: Fault<E> },
    /// SPI communication error.
    Transport(spi::ErrorKind),
    /// Multi-register access past the last register; nothing was sent.
    CountOutOfRange { register: Register, count: u8 },
    /// The chip never echoed back the written value.
    WriteVerification {
        register: Register,
        written: u8,
        read_back: u8,
        attempts: u8,
    },
    /// The operation is not legal in the driver's current state.
    NotReady(Lifecycle),
    /// Reading the data-ready line failed.
    Pin(digital::ErrorKind),
    RegisterError(RegisterError),
}

impl<E: fmt::Display> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Setup { stage, source } => {
                write!(f, "setup failed while {}: {}", stage, source)
            }
            Error::Transport(kind) => {
                write!(f, "SPI communication error: {}", kind)
            }
            Error::CountOutOfRange { register, count } => write!(
                f,
                "count ({}) must not exceed 0x17 - register {} ({})",
                count,
                register,
                register.max_count()
            ),
            Error::WriteVerification { register, written, read_back, attempts } => {
                write!(
                    f,
                    "wrote 0x{:02x} to {} but read back 0x{:02x} after {} attempts",
                    written, register, read_back, attempts
                )
            }
            Error::NotReady(state) => {
                write!(f, "driver is not ready (state: {:?})", state)
            }
            Error::Pin(kind) => write!(f, "GPIO error: {}", kind),
            Error::RegisterError(value) => {
                write!(f, "Register Error: {}", value)
            }
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for Error<E> {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    InvalidAddress(u8),
    InvalidSamplingRate(u8),
    InvalidChannelCount(u8),
    AdsNotDetected,
}

impl fmt::Display for RegisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterError::InvalidAddress(value) => {
                write!(f, "Invalid register address: 0x{:02x}", value)
            }
            RegisterError::InvalidSamplingRate(value) => {
                write!(f, "Invalid sampling rate value: {}", value)
            }
            RegisterError::InvalidChannelCount(value) => {
                write!(f, "Invalid channel count value: {}", value)
            }
            RegisterError::AdsNotDetected => {
                write!(f, "Ads not detected!")
            }
        }
    }
}

impl<E> From<RegisterError> for Error<E> {
    fn from(e: RegisterError) -> Self {
        Error::RegisterError(e)
    }
}
