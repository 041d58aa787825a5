//! The Serial Interface Engine (SIE) of the SoC's USB 1.1 host port
//!
//! The SIE is a register-compatible superset of the ultraembedded `core_usb_host`: software
//! loads a packet into the transmit FIFO, writes a token, and the engine runs one transaction
//! (token, optional data, handshake) on its own, reporting the outcome in RXSTS. There is a single
//! root port and a single transceiver; every device on the bus, including those behind hubs, is
//! reached through it.
use crate::usb::Pid;

mod regs;

pub use self::regs::Usb11Regs;

/// Word offsets of the registers in the SIE block.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Reg {
    Ctrl = 0x00,
    Stat = 0x01,
    IrqAck = 0x02,
    IrqSts = 0x03,
    IrqMask = 0x04,
    TxLen = 0x05,
    Token = 0x06,
    RxSts = 0x07,
    Data = 0x08,
}

bitflags::bitflags! {
    /// Transceiver control. OPMODE and XCVRSEL are two-bit fields spelled out as their values.
    pub struct Ctrl: u32 {
        const SOF_EN = 0x0001;
        const OPMODE_NORMAL = 0x0000;
        const OPMODE_NON_DRIVING = 0x0002;
        const OPMODE_NO_STUFF = 0x0004;
        const XCVRSEL_HS = 0x0000;
        const XCVRSEL_FS = 0x0008;
        const XCVRSEL_LS = 0x0010;
        const XCVRSEL_LS_ON_FS = 0x0018;
        const TERMSEL = 0x0020;
        const DP_PULLDOWN = 0x0040;
        const DN_PULLDOWN = 0x0080;
        const TX_FLUSH = 0x0100;
    }
}

bitflags::bitflags! {
    /// Line state as seen by the root port.
    pub struct Stat: u32 {
        /// D+ high, i.e. a full-speed device is pulling up.
        const DP = 0x0001;
        const DN = 0x0002;
        const PHY_ERROR = 0x0004;
        const DETECT = 0x0008;
    }
}

bitflags::bitflags! {
    /// Control bits of the TOKEN register; PID, address and endpoint are fields below them.
    pub struct TokenFlags: u32 {
        /// Written 1 to launch, reads back 0 once the engine accepted the token.
        const START = 1 << 31;
        const IN = 1 << 30;
        /// Expect a handshake from the device.
        const HANDSHAKE = 1 << 29;
        const DATA1 = 1 << 28;
    }
}

/// Builds a TOKEN register value.
pub fn token(pid: Pid, addr: u8, endpoint: u8, flags: TokenFlags) -> u32 {
    ((pid as u32) << 16) | ((u32::from(addr) & 0x7F) << 9) | ((u32::from(endpoint) & 0xF) << 5) | flags.bits()
}

/// A decoded RXSTS value.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RxStatus(pub u32);

impl RxStatus {
    pub const QUEUED: u32 = 1 << 31;
    pub const CRC_ERROR: u32 = 1 << 30;
    pub const TIMEOUT: u32 = 1 << 29;
    pub const SIE_IDLE: u32 = 1 << 28;

    pub fn is_idle(self) -> bool {
        self.0 & Self::SIE_IDLE != 0
    }

    pub fn timed_out(self) -> bool {
        self.0 & Self::TIMEOUT != 0
    }

    pub fn crc_error(self) -> bool {
        self.0 & Self::CRC_ERROR != 0
    }

    /// The PID of the handshake or data packet the device answered with.
    pub fn pid(self) -> u8 {
        (self.0 >> 16) as u8
    }

    /// Bytes waiting in the receive FIFO.
    pub fn count(self) -> u16 {
        self.0 as u16
    }
}

/// Bus speed of a port, and how the shared transceiver must be set up to reach it.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Speed {
    #[default]
    Full,
    Low,
    /// A low-speed device behind a full-speed hub: full-speed signalling with a PRE preamble
    /// before each low-speed packet.
    Mixed,
}

impl Speed {
    fn xcvr(self) -> Ctrl {
        match self {
            Speed::Full => Ctrl::XCVRSEL_FS,
            Speed::Low => Ctrl::XCVRSEL_LS,
            Speed::Mixed => Ctrl::XCVRSEL_LS_ON_FS,
        }
    }
}

/// Register access to an SIE.
///
/// Implemented by the memory-mapped [Usb11Regs] and, in tests, by a simulated bus.
pub trait Sie {
    fn read(&self, reg: Reg) -> u32;
    fn write(&mut self, reg: Reg, value: u32);

    fn status(&self) -> Stat {
        Stat::from_bits_truncate(self.read(Reg::Stat))
    }

    fn rx_status(&self) -> RxStatus {
        RxStatus(self.read(Reg::RxSts))
    }

    fn sof_enabled(&self) -> bool {
        self.read(Reg::Ctrl) & Ctrl::SOF_EN.bits() != 0
    }

    /// Sets up the root transceiver for `speed`, flushing the transmit FIFO.
    ///
    /// There is only one transceiver, so this runs before every transaction: consecutive
    /// transactions may target devices at different speeds behind a hub.
    fn configure_port(&mut self, speed: Speed, sof: bool) {
        let mut ctrl = speed.xcvr()
            | Ctrl::OPMODE_NORMAL
            | Ctrl::TERMSEL
            | Ctrl::DP_PULLDOWN
            | Ctrl::DN_PULLDOWN
            | Ctrl::TX_FLUSH;
        ctrl.set(Ctrl::SOF_EN, sof);
        self.write(Reg::Ctrl, ctrl.bits());
    }

    /// Drives SE0 on the root port: UTMI+ bit-stuffing disabled, terminations off, both pulldowns.
    fn reset_port(&mut self) {
        let ctrl = Ctrl::OPMODE_NO_STUFF | Ctrl::XCVRSEL_HS | Ctrl::DP_PULLDOWN | Ctrl::DN_PULLDOWN;
        self.write(Reg::Ctrl, ctrl.bits());
    }
}

impl<S: Sie + ?Sized> Sie for &mut S {
    fn read(&self, reg: Reg) -> u32 {
        (**self).read(reg)
    }

    fn write(&mut self, reg: Reg, value: u32) {
        (**self).write(reg, value)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn token_fields() {
        let value = token(Pid::Setup, 5, 0, TokenFlags::START | TokenFlags::HANDSHAKE);
        assert_eq!(value, 0xA02D_0A00);

        let value = token(Pid::In, 0x7F, 0xF, TokenFlags::IN | TokenFlags::DATA1);
        assert_eq!(value >> 16 & 0xFF, Pid::In as u32);
        assert_eq!(value >> 9 & 0x7F, 0x7F);
        assert_eq!(value >> 5 & 0xF, 0xF);
        assert_ne!(value & TokenFlags::DATA1.bits(), 0);
    }

    #[test]
    fn rx_status_fields() {
        let sts = RxStatus(RxStatus::SIE_IDLE | (0x4B << 16) | 8);
        assert!(sts.is_idle());
        assert!(!sts.timed_out());
        assert_eq!(sts.pid(), Pid::Data1 as u8);
        assert_eq!(sts.count(), 8);
    }
}
