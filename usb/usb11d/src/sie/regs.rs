use common::io::{Io, Mmio, ReadOnly, WriteOnly};

use super::{Reg, Sie};

/// The memory-mapped SIE register block, one 32-bit word per register.
///
/// Overlaid on the controller's address window by the daemon; see [Reg] for the offsets.
#[repr(C)]
pub struct Usb11Regs {
    pub ctrl: Mmio<u32>,
    pub stat: ReadOnly<Mmio<u32>>,
    pub irq_ack: WriteOnly<Mmio<u32>>,
    pub irq_sts: ReadOnly<Mmio<u32>>,
    pub irq_mask: Mmio<u32>,
    pub tx_len: WriteOnly<Mmio<u32>>,
    pub token: Mmio<u32>,
    pub rx_sts: ReadOnly<Mmio<u32>>,
    /// Writes push a byte into the transmit FIFO, reads pop one from the receive FIFO.
    pub data: Mmio<u32>,
}

impl Sie for Usb11Regs {
    fn read(&self, reg: Reg) -> u32 {
        match reg {
            Reg::Ctrl => self.ctrl.read(),
            Reg::Stat => self.stat.read(),
            Reg::IrqSts => self.irq_sts.read(),
            Reg::IrqMask => self.irq_mask.read(),
            Reg::Token => self.token.read(),
            Reg::RxSts => self.rx_sts.read(),
            Reg::Data => self.data.read(),
            Reg::IrqAck | Reg::TxLen => {
                log::trace!("read of write-only register {:?}", reg);
                0
            }
        }
    }

    fn write(&mut self, reg: Reg, value: u32) {
        match reg {
            Reg::Ctrl => self.ctrl.write(value),
            Reg::IrqAck => self.irq_ack.write(value),
            Reg::IrqMask => self.irq_mask.write(value),
            Reg::TxLen => self.tx_len.write(value),
            Reg::Token => self.token.write(value),
            Reg::Data => self.data.write(value),
            Reg::Stat | Reg::IrqSts | Reg::RxSts => {
                log::trace!("write {:#x} to read-only register {:?} dropped", value, reg);
            }
        }
    }
}
