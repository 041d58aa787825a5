//! A simulated SIE, bus and clock for tests
//!
//! [FakeSie] runs each launched token against either a script of canned replies or, once the
//! script is empty, the [FakeDevice]s attached to the bus, routed by address. Every transaction
//! is recorded so tests can check what went out on the wire.
use std::cell::{Cell, RefCell};
use std::cmp;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use common::clock::Clock;

use crate::sie::{Ctrl, Reg, RxStatus, Sie, Stat, TokenFlags};
use crate::usb::{Pid, Setup, SetupReq};

#[rustfmt::skip]
pub const KEYBOARD_DEVICE: [u8; 18] = [
    0x12, 0x01, 0x10, 0x01, 0x00, 0x00, 0x00, 0x08,
    0x6D, 0x04, 0x1D, 0xC3, 0x00, 0x01, 0x01, 0x02, 0x00, 0x01,
];

#[rustfmt::skip]
pub const KEYBOARD_CONFIG: [u8; 34] = [
    0x09, 0x02, 0x22, 0x00, 0x01, 0x01, 0x00, 0xA0, 0x32,
    0x09, 0x04, 0x00, 0x00, 0x01, 0x03, 0x01, 0x01, 0x00,
    0x09, 0x21, 0x11, 0x01, 0x00, 0x01, 0x22, 0x3F, 0x00,
    0x07, 0x05, 0x81, 0x03, 0x08, 0x00, 0x0A,
];

/// A keyboard with a built-in pointing device.
#[rustfmt::skip]
pub const COMBO_CONFIG: [u8; 59] = [
    0x09, 0x02, 0x3B, 0x00, 0x02, 0x01, 0x00, 0xA0, 0x32,
    0x09, 0x04, 0x00, 0x00, 0x01, 0x03, 0x01, 0x01, 0x00,
    0x09, 0x21, 0x11, 0x01, 0x00, 0x01, 0x22, 0x3F, 0x00,
    0x07, 0x05, 0x81, 0x03, 0x08, 0x00, 0x0A,
    0x09, 0x04, 0x01, 0x00, 0x01, 0x03, 0x01, 0x02, 0x00,
    0x09, 0x21, 0x11, 0x01, 0x00, 0x01, 0x22, 0x34, 0x00,
    0x07, 0x05, 0x82, 0x03, 0x04, 0x00, 0x0A,
];

#[derive(Clone, Debug)]
pub enum Reply {
    Ack,
    Nak,
    Stall,
    Timeout,
    /// A data packet that failed its CRC.
    Crc,
    Data0(Vec<u8>),
    Data1(Vec<u8>),
    /// Any other PID, for garbage on the line.
    Pid(u8),
}

/// A transaction as seen on the wire.
#[derive(Clone, Debug)]
pub struct SentTxn {
    pub pid: Pid,
    pub addr: u8,
    pub ep: u8,
    pub data1: bool,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, Default)]
pub struct FakeClock(Rc<Cell<u32>>);

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u32) {
        self.0.set(self.0.get().wrapping_add(ms));
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u32 {
        self.0.get()
    }

    fn wait_ms(&self, ms: u32) {
        self.advance(ms);
    }
}

/// A device that answers the standard requests enumeration sends, and interrupt IN with queued
/// reports. Its data PIDs follow the host's toggle.
pub struct FakeDevice {
    addr: u8,
    pending_addr: Option<u8>,
    configuration: Option<u8>,
    device_desc: Vec<u8>,
    config: Vec<u8>,
    max_packet: usize,
    /// Rest of the data stage of the current control read.
    control_in: Option<VecDeque<u8>>,
    reports: HashMap<u8, VecDeque<Vec<u8>>>,
}

impl FakeDevice {
    pub fn new(device_desc: &[u8], config: &[u8]) -> Self {
        Self {
            addr: 0,
            pending_addr: None,
            configuration: None,
            device_desc: device_desc.to_vec(),
            config: config.to_vec(),
            max_packet: usize::from(device_desc[7]),
            control_in: None,
            reports: HashMap::new(),
        }
    }

    pub fn queue_report(&mut self, ep: u8, report: &[u8]) {
        self.reports.entry(ep).or_default().push_back(report.to_vec());
    }

    pub fn address(&self) -> u8 {
        self.addr
    }

    pub fn configuration(&self) -> Option<u8> {
        self.configuration
    }

    fn setup(&mut self, setup: Setup) -> Reply {
        let (value, length) = (setup.value, setup.length);
        self.control_in = None;
        self.pending_addr = None;
        match setup.request {
            req if req == SetupReq::GetDescriptor as u8 && setup.kind == 0x80 => {
                let desc = match value >> 8 {
                    1 => &self.device_desc,
                    2 => &self.config,
                    _ => return Reply::Stall,
                };
                let len = cmp::min(usize::from(length), desc.len());
                self.control_in = Some(desc[..len].iter().copied().collect());
            }
            req if req == SetupReq::SetAddress as u8 => self.pending_addr = Some(value as u8),
            req if req == SetupReq::SetConfiguration as u8 => self.configuration = Some(value as u8),
            _ => return Reply::Stall,
        }
        Reply::Ack
    }

    fn handle(&mut self, txn: &SentTxn) -> Reply {
        let data = |bytes: Vec<u8>| {
            if txn.data1 {
                Reply::Data1(bytes)
            } else {
                Reply::Data0(bytes)
            }
        };
        match (txn.pid, txn.ep) {
            (Pid::Setup, 0) => match <[u8; 8]>::try_from(txn.data.as_slice()) {
                Ok(raw) => self.setup(Setup::from_bytes(&raw)),
                Err(_) => Reply::Timeout,
            },
            (Pid::In, 0) => match &mut self.control_in {
                Some(stage) => {
                    let len = cmp::min(self.max_packet, stage.len());
                    data(stage.drain(..len).collect())
                }
                None => {
                    // Status stage of a control write; a new address takes effect here.
                    if let Some(addr) = self.pending_addr.take() {
                        self.addr = addr;
                    }
                    data(Vec::new())
                }
            },
            (Pid::Out, 0) => {
                self.control_in = None;
                Reply::Ack
            }
            (Pid::In, ep) => match self.reports.get_mut(&ep).and_then(VecDeque::pop_front) {
                Some(report) => data(report),
                None => Reply::Nak,
            },
            _ => Reply::Stall,
        }
    }
}

pub struct FakeSie {
    ctrl: u32,
    ctrl_log: Vec<u32>,
    line: Stat,
    tx_fifo: Vec<u8>,
    tx_len: usize,
    rx_fifo: RefCell<VecDeque<u8>>,
    rx_sts: u32,
    token: u32,
    script: VecDeque<Reply>,
    devices: Vec<FakeDevice>,
    sent: Vec<SentTxn>,
}

impl FakeSie {
    pub fn new() -> Self {
        Self {
            ctrl: 0,
            ctrl_log: Vec::new(),
            line: Stat::empty(),
            tx_fifo: Vec::new(),
            tx_len: 0,
            rx_fifo: RefCell::new(VecDeque::new()),
            rx_sts: RxStatus::SIE_IDLE,
            token: 0,
            script: VecDeque::new(),
            devices: Vec::new(),
            sent: Vec::new(),
        }
    }

    /// Queues replies to be used, in order, before any attached device is asked.
    pub fn script(&mut self, replies: impl IntoIterator<Item = Reply>) {
        self.script.extend(replies);
    }

    pub fn set_line(&mut self, line: Stat) {
        self.line = line;
    }

    pub fn attach(&mut self, device: FakeDevice, line: Stat) {
        self.devices.push(device);
        self.line = line;
    }

    pub fn detach(&mut self) {
        self.devices.clear();
        self.line = Stat::empty();
    }

    pub fn device(&self, index: usize) -> &FakeDevice {
        &self.devices[index]
    }

    pub fn sent(&self) -> &[SentTxn] {
        &self.sent
    }

    pub fn ctrl(&self) -> u32 {
        self.ctrl
    }

    pub fn ctrl_log(&self) -> &[u32] {
        &self.ctrl_log
    }

    fn launch(&mut self, token: u32) {
        let raw = (token >> 16) as u8;
        let pid = Pid::from_u8(raw).unwrap_or_else(|| panic!("bad token PID {:#x}", raw));
        let txn = SentTxn {
            pid,
            addr: ((token >> 9) & 0x7F) as u8,
            ep: ((token >> 5) & 0xF) as u8,
            data1: token & TokenFlags::DATA1.bits() != 0,
            data: self.tx_fifo.drain(..).take(self.tx_len).collect(),
        };

        let reply = match self.script.pop_front() {
            Some(reply) => reply,
            None => self
                .devices
                .iter_mut()
                .find(|device| device.addr == txn.addr)
                .map_or(Reply::Timeout, |device| device.handle(&txn)),
        };
        self.sent.push(txn);

        let mut rx_fifo = self.rx_fifo.borrow_mut();
        rx_fifo.clear();
        let sts = match reply {
            Reply::Ack => (Pid::Ack as u32) << 16,
            Reply::Nak => (Pid::Nak as u32) << 16,
            Reply::Stall => (Pid::Stall as u32) << 16,
            Reply::Timeout => RxStatus::TIMEOUT,
            Reply::Crc => RxStatus::CRC_ERROR | (Pid::Data0 as u32) << 16,
            Reply::Pid(raw) => u32::from(raw) << 16,
            Reply::Data0(bytes) => {
                rx_fifo.extend(&bytes);
                (Pid::Data0 as u32) << 16 | bytes.len() as u32
            }
            Reply::Data1(bytes) => {
                rx_fifo.extend(&bytes);
                (Pid::Data1 as u32) << 16 | bytes.len() as u32
            }
        };
        self.rx_sts = RxStatus::SIE_IDLE | sts;
        self.token = token & !TokenFlags::START.bits();
    }
}

impl Sie for FakeSie {
    fn read(&self, reg: Reg) -> u32 {
        match reg {
            Reg::Ctrl => self.ctrl,
            Reg::Stat => self.line.bits(),
            Reg::Token => self.token,
            Reg::RxSts => self.rx_sts,
            Reg::Data => self.rx_fifo.borrow_mut().pop_front().map_or(0, u32::from),
            _ => 0,
        }
    }

    fn write(&mut self, reg: Reg, value: u32) {
        match reg {
            Reg::Ctrl => {
                if value & Ctrl::TX_FLUSH.bits() != 0 {
                    self.tx_fifo.clear();
                }
                self.ctrl = value;
                self.ctrl_log.push(value);
            }
            Reg::TxLen => self.tx_len = value as usize,
            Reg::Data => self.tx_fifo.push(value as u8),
            Reg::Token => self.launch(value),
            _ => {}
        }
    }
}
