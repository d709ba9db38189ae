use std::path::PathBuf;

use ads1299::{BoardConfig, PinNames};
use clap::Parser;

#[derive(Parser)]
#[command(author, version, about = "Power up an ADS1299 and dump its registers", long_about = None)]
pub struct Cli {
    /// SPI device node
    #[arg(long, default_value = "/dev/spidev0.0")]
    pub spi: String,

    /// SPI clock in Hz
    #[arg(long, default_value_t = 200_000)]
    pub speed: u32,

    /// GPIO chip used for numeric line names
    #[arg(long, default_value = "/dev/gpiochip0")]
    pub gpio_chip: PathBuf,

    /// Power-down line (offset or line name)
    #[arg(long, default_value = "13")]
    pub pwdn: String,

    /// Reset line
    #[arg(long, default_value = "6")]
    pub reset: String,

    /// Start line
    #[arg(long, default_value = "26")]
    pub start: String,

    /// Clock-select line, if wired
    #[arg(long)]
    pub clksel: Option<String>,

    /// Data-ready line, if wired
    #[arg(long)]
    pub drdy: Option<String>,

    /// Leave chip select to the board instead of the SPI controller
    #[arg(long)]
    pub no_cs: bool,

    /// Send register writes once without reading them back
    #[arg(long)]
    pub no_verify: bool,

    /// Keep polling the ID register for this many seconds
    #[arg(long, value_name = "SECS")]
    pub watch: Option<u64>,
}

impl Cli {
    pub fn board_config(&self) -> BoardConfig {
        let pins = PinNames {
            power_down: self.pwdn.clone(),
            reset: self.reset.clone(),
            clock_select: self.clksel.clone(),
            start: Some(self.start.clone()),
            data_ready: self.drdy.clone(),
        };
        let mut config = BoardConfig::default()
            .with_port(self.spi.clone())
            .with_max_speed_hz(self.speed)
            .with_chip_select(!self.no_cs)
            .with_pins(pins);
        if self.no_verify {
            config = config.with_write_verify(None);
        }
        config
    }
}
