use super::errors::RegisterError;
use bitflags::bitflags;

/// Read-register opcode prefix, OR-ed with the start address.
pub const RREG: u8 = 0x20;
/// Write-register opcode prefix, OR-ed with the start address.
pub const WREG: u8 = 0x40;

/// Highest addressable register.
pub const LAST_ADDRESS: u8 = 0x17;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Command {
    WAKEUP,
    STANDBY,
    RESET,
    START,
    STOP,
    RDATAC,
    SDATAC,
    /// Register read header: start register and count (registers - 1).
    RREG(Register, u8),
    /// Register write header: start register and count (registers - 1).
    WREG(Register, u8),
}

impl Command {
    /// Clock cycles the chip needs before it accepts the next command.
    pub const fn settle_clks(&self) -> u32 {
        match self {
            Command::RESET => 18,
            _ => 4,
        }
    }
}

impl From<Command> for ([u8; 2], usize) {
    fn from(val: Command) -> Self {
        match val {
            Command::WAKEUP => ([0x02, 0], 1),
            Command::STANDBY => ([0x04, 0], 1),
            Command::RESET => ([0x06, 0], 1),
            Command::START => ([0x08, 0], 1),
            Command::STOP => ([0x0A, 0], 1),
            Command::RDATAC => ([0x10, 0], 1),
            Command::SDATAC => ([0x11, 0], 1),
            Command::RREG(reg, count) => ([RREG | reg as u8, count], 2),
            Command::WREG(reg, count) => ([WREG | reg as u8, count], 2),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum SampleRate {
    #[default]
    Sps250,
    Sps500,
    KSps1,
    KSps2,
    KSps4,
    KSps8,
    KSps16,
}

///
/// Read / write-able registers
///
#[allow(non_camel_case_types)]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    /// ID Control Register (Factory-Programmed, Read-Only)
    ID = 0x00,
    /// Configuration Register 1
    CONFIG1 = 0x01,
    /// Configuration Register 2
    CONFIG2 = 0x02,
    /// Configuration Register 3
    CONFIG3 = 0x03,
    /// Lead-Off Control Register
    LOFF = 0x04,
    /// Channel 1 Settings
    CH1SET = 0x05,
    /// Channel 2 Settings
    CH2SET = 0x06,
    /// Channel 3 Settings
    CH3SET = 0x07,
    /// Channel 4 Settings
    CH4SET = 0x08,
    /// Channel 5 Settings
    CH5SET = 0x09,
    /// Channel 6 Settings
    CH6SET = 0x0A,
    /// Channel 7 Settings
    CH7SET = 0x0B,
    /// Channel 8 Settings
    CH8SET = 0x0C,
    /// Bias Sense Positive
    BIAS_SENSP = 0x0D,
    /// Bias Sense Negative
    BIAS_SENSN = 0x0E,
    /// Lead-Off Sense Positive
    LOFF_SENSP = 0x0F,
    /// Lead-Off Sense Negative
    LOFF_SENSN = 0x10,
    /// Lead-Off Flip
    LOFF_FLIP = 0x11,
    /// Lead-Off Stat Positive (Read-Only)
    LOFF_STATP = 0x12,
    /// Lead-Off Stat Negative (Read-Only)
    LOFF_STATN = 0x13,
    /// General-Purpose I/O Register
    GPIO = 0x14,
    /// Miscellaneous 1 Register
    MISC1 = 0x15,
    /// Miscellaneous 2 Register
    MISC2 = 0x16,
    /// Configuration Register 4
    CONFIG4 = 0x17,
}

impl Register {
    /// Every register, in address order.
    pub const ALL: [Register; 24] = [
        Self::ID,
        Self::CONFIG1,
        Self::CONFIG2,
        Self::CONFIG3,
        Self::LOFF,
        Self::CH1SET,
        Self::CH2SET,
        Self::CH3SET,
        Self::CH4SET,
        Self::CH5SET,
        Self::CH6SET,
        Self::CH7SET,
        Self::CH8SET,
        Self::BIAS_SENSP,
        Self::BIAS_SENSN,
        Self::LOFF_SENSP,
        Self::LOFF_SENSN,
        Self::LOFF_FLIP,
        Self::LOFF_STATP,
        Self::LOFF_STATN,
        Self::GPIO,
        Self::MISC1,
        Self::MISC2,
        Self::CONFIG4,
    ];

    pub const fn addr(self) -> u8 {
        self as u8
    }

    /// Largest count (registers - 1) a multi-register access starting
    /// here may use.
    pub const fn max_count(self) -> u8 {
        LAST_ADDRESS - self as u8
    }

    /// Factory-programmed or status registers that ignore writes.
    pub const fn is_read_only(self) -> bool {
        matches!(self, Self::ID | Self::LOFF_STATP | Self::LOFF_STATN)
    }
}

impl TryFrom<u8> for Register {
    type Error = RegisterError;

    fn try_from(addr: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .get(addr as usize)
            .copied()
            .ok_or(RegisterError::InvalidAddress(addr))
    }
}

impl core::fmt::Display for Register {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?} (0x{:02x})", self, *self as u8)
    }
}

bitflags! {
    /// ID
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct Id: u8 {
        const REV_ID2 = 0b1000_0000;
        const REV_ID1 = 0b0100_0000;
        const REV_ID0 = 0b0010_0000;
        const DEV_ID1 = 0b0000_1000;
        const DEV_ID0 = 0b0000_0100;
        const NU_CH1  = 0b0000_0010;
        const NU_CH0  = 0b0000_0001;

        const REV_ID = Self::REV_ID2.bits() | Self::REV_ID1.bits() | Self::REV_ID0.bits();
        const DEV_ID = Self::DEV_ID1.bits() | Self::DEV_ID0.bits();
        const NU_CH = Self::NU_CH1.bits() | Self::NU_CH0.bits();
    }
}

impl Id {
    pub const fn revision(&self) -> u8 {
        self.intersection(Self::REV_ID).bits() >> 5
    }

    pub const fn num_chs(&self) -> Result<u8, RegisterError> {
        let channel_count = match self.intersection(Self::NU_CH).bits() {
            0b00 => 4,
            0b01 => 6,
            0b10 => 8,
            e => return Err(RegisterError::InvalidChannelCount(e)),
        };
        Ok(channel_count)
    }

    pub const fn smell(&self) -> Result<(), RegisterError> {
        // First, check if channel count is valid.
        match self.num_chs() {
            Ok(_) => {}
            Err(_) => return Err(RegisterError::AdsNotDetected),
        }
        // If Ok, make sure device ID bits match as well.
        match self.intersection(Self::DEV_ID).bits() >> 2 {
            0b11 => Ok(()),
            _ => Err(RegisterError::AdsNotDetected),
        }
    }
}

bitflags! {
    /// CONFIG1
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct Config1: u8 {
        const DAISY_EN = 0b0100_0000;
        const CLK_EN   = 0b0010_0000;
        const DR2      = 0b0000_0100;
        const DR1      = 0b0000_0010;
        const DR0      = 0b0000_0001;

        const DR = Self::DR2.bits() | Self::DR1.bits() | Self::DR0.bits();
    }
}

impl Default for Config1 {
    fn default() -> Config1 {
        Self::from_bits_retain(0x96)
    }
}

impl Config1 {
    pub const fn odr(&self) -> Result<SampleRate, RegisterError> {
        let sample_rate = match self.intersection(Self::DR).bits() {
            0b000 => SampleRate::KSps16,
            0b001 => SampleRate::KSps8,
            0b010 => SampleRate::KSps4,
            0b011 => SampleRate::KSps2,
            0b100 => SampleRate::KSps1,
            0b101 => SampleRate::Sps500,
            0b110 => SampleRate::Sps250,
            e => return Err(RegisterError::InvalidSamplingRate(e)),
        };
        Ok(sample_rate)
    }

    pub const fn with_odr(self, sample_rate: SampleRate) -> Self {
        let reg = self.difference(Self::DR);
        match sample_rate {
            SampleRate::KSps16 => reg,
            SampleRate::KSps8 => reg.union(Self::DR0),
            SampleRate::KSps4 => reg.union(Self::DR1),
            SampleRate::KSps2 => reg.union(Self::DR1).union(Self::DR0),
            SampleRate::KSps1 => reg.union(Self::DR2),
            SampleRate::Sps500 => reg.union(Self::DR2).union(Self::DR0),
            SampleRate::Sps250 => reg.union(Self::DR2).union(Self::DR1),
        }
    }
}

bitflags! {
    /// CONFIG3
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct Config3: u8 {
        const PD_REFBUF      = 0b1000_0000;
        const BIAS_MEAS      = 0b0001_0000;
        const BIASREF_INT    = 0b0000_1000;
        const PD_BIAS        = 0b0000_0100;
        const BIAS_LOFF_SENS = 0b0000_0010;
        const BIAS_STAT      = 0b0000_0001;
    }
}

impl Default for Config3 {
    fn default() -> Self {
        Self::from_bits_retain(0x60)
    }
}

impl Config3 {
    /// Check if the internal reference buffer is enabled
    pub const fn pd_refbuf(&self) -> bool {
        self.contains(Self::PD_REFBUF)
    }

    /// Enable or disable the internal reference buffer
    pub const fn with_pd_refbuf(self, pd_refbuf: bool) -> Self {
        let reg = self.difference(Self::PD_REFBUF);
        match pd_refbuf {
            false => reg,
            true => reg.union(Self::PD_REFBUF),
        }
    }
}
