//! Board abstraction: how control lines and the SPI bus are obtained.
//!
//! The driver never looks pins or ports up by itself. A [`Board`] resolves
//! role names to line handles and opens the bus with a [`BusConfig`]; a
//! [`BoardConfig`] carries everything that differs between hardware
//! revisions (pin names, bus clock and mode, timing, write verification).

use core::fmt;

use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::{Mode, MODE_1};
use embedded_hal_async::spi::SpiDevice;

use crate::registers::{Config3, Register};

/// Worst-case ADS clock period, in nanoseconds.
pub const MAX_ADS_CLK_PER_NS: u32 = 700;

/// Clock cycles the oscillator and regulators need to settle (tPOR).
pub const T_POR_CLKS: u32 = 1 << 18;
/// Clock cycles to wait after releasing reset before the first command.
pub const RST_WAIT_CLKS: u32 = 18;

/// Function of a control line on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    PowerDown,
    Reset,
    ClockSelect,
    Start,
    DataReady,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::PowerDown => "PWDN",
            Role::Reset => "RESET",
            Role::ClockSelect => "CLKSEL",
            Role::Start => "START",
            Role::DataReady => "DRDY",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    None,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    None,
    Rising,
    Falling,
}

/// Resolves control lines and the SPI bus for the driver.
pub trait Board {
    type Error: fmt::Debug;
    /// The bus, opened and ready for transfers.
    type Spi: SpiDevice;
    type Output: OutputPin;
    type Input: InputPin;

    /// Resolve `name` to an output line for `role`.
    fn output(
        &mut self,
        role: Role,
        name: &str,
    ) -> Result<Self::Output, Self::Error>;

    /// Resolve `name` to an input line for `role` with the given bias and
    /// edge sensitivity.
    fn input(
        &mut self,
        role: Role,
        name: &str,
        pull: Pull,
        edge: Edge,
    ) -> Result<Self::Input, Self::Error>;

    fn open_bus(&mut self, config: &BusConfig) -> Result<Self::Spi, Self::Error>;

    /// Release a bus obtained from [`open_bus`](Self::open_bus).
    fn close_bus(&mut self, bus: Self::Spi) -> Result<(), Self::Error>;
}

/// Names of the control lines, as understood by the [`Board`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinNames {
    pub power_down: String,
    pub reset: String,
    pub clock_select: Option<String>,
    pub start: Option<String>,
    pub data_ready: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Port identifier, e.g. `/dev/spidev0.0`.
    pub port: String,
    pub max_speed_hz: u32,
    pub mode: Mode,
    /// Let the controller drive chip select. When false the chip select
    /// line is left alone (tied low on the board).
    pub chip_select: bool,
}

/// Read-after-write verification of register writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteVerify {
    /// Total number of writes before giving up. Zero behaves like one.
    pub attempts: u8,
    /// Clock cycles to wait between attempts.
    pub retry_delay_clks: u32,
}

impl Default for WriteVerify {
    fn default() -> Self {
        Self { attempts: 5, retry_delay_clks: 4 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardConfig {
    pub pins: PinNames,
    pub bus: BusConfig,
    /// ADS master clock period used for every settle time, in nanoseconds.
    pub clk_period_ns: u32,
    /// `None` sends each register write once without reading it back.
    pub write_verify: Option<WriteVerify>,
    /// Registers written, in order, at the end of initialization.
    pub startup_registers: Vec<(Register, u8)>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            pins: PinNames {
                power_down: "13".into(),
                reset: "6".into(),
                clock_select: None,
                start: Some("26".into()),
                data_ready: None,
            },
            bus: BusConfig {
                port: "/dev/spidev0.0".into(),
                max_speed_hz: 200_000,
                mode: MODE_1,
                chip_select: true,
            },
            clk_period_ns: MAX_ADS_CLK_PER_NS,
            write_verify: Some(WriteVerify::default()),
            // Internal reference buffer on.
            startup_registers: vec![(
                Register::CONFIG3,
                Config3::default().with_pd_refbuf(true).bits(),
            )],
        }
    }
}

impl BoardConfig {
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.bus.port = port.into();
        self
    }

    pub fn with_max_speed_hz(mut self, hz: u32) -> Self {
        self.bus.max_speed_hz = hz;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.bus.mode = mode;
        self
    }

    pub fn with_chip_select(mut self, enabled: bool) -> Self {
        self.bus.chip_select = enabled;
        self
    }

    pub fn with_pins(mut self, pins: PinNames) -> Self {
        self.pins = pins;
        self
    }

    pub fn with_clk_period_ns(mut self, ns: u32) -> Self {
        self.clk_period_ns = ns;
        self
    }

    pub fn with_write_verify(mut self, verify: Option<WriteVerify>) -> Self {
        self.write_verify = verify;
        self
    }

    pub fn with_startup_registers(mut self, writes: Vec<(Register, u8)>) -> Self {
        self.startup_registers = writes;
        self
    }

    /// Nanoseconds spanned by `clks` ADS clock cycles.
    pub fn clks_to_ns(&self, clks: u32) -> u64 {
        u64::from(clks) * u64::from(self.clk_period_ns)
    }
}
