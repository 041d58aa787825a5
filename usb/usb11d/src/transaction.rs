//! The transaction engine
//!
//! A [Request] is one logical transfer: a control transfer (SETUP, optional data stage, status
//! stage) or an interrupt/bulk transfer. The engine advances it by at most one packet per call
//! to [request_step], so many devices can make progress from a single event loop without ever
//! waiting on each other. A NAK or a silent device reschedules the request a couple of
//! milliseconds out instead of spinning.
use std::{cmp, hint};

use common::clock::is_due;
use log::{trace, warn};
use thiserror::Error;

use crate::sie::{self, Reg, Sie, TokenFlags};
use crate::task::Task;
use crate::usb::{Pid, ReqDirection, Setup};

/// Size of the per-request data buffer. Bounds the largest configuration bundle a device may
/// present.
pub const SCRATCH_LEN: usize = 256;

/// Retry budget of each packet of a control transfer.
pub const CONTROL_RETRIES: u8 = 25;

/// Retry budget of an interrupt or bulk transfer. A NAK on an interrupt endpoint just means
/// "nothing new", so the transfer ends and the driver polls again on its own schedule.
pub const DATA_RETRIES: u8 = 1;

/// Delay before retrying a packet that was NAKed or timed out.
pub const NAK_BACKOFF_MS: u32 = 2;

/// Endpoint zero packet size every device supports before its descriptor has been read.
pub const DEFAULT_MAX_PACKET: u16 = 8;

/// Upper bound on register polls while waiting for the SIE; a transaction takes microseconds.
const SPIN_LIMIT: u32 = 100_000;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RqState {
    Idle,
    /// Control transfer, SETUP packet.
    Setup,
    /// Control transfer, data stage.
    SetupData,
    /// Control transfer, zero length status stage in the opposite direction.
    SetupStatus,
    /// Interrupt or bulk IN.
    In,
    /// Interrupt or bulk OUT.
    Out,
}

#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum TxnError {
    #[error("endpoint stalled")]
    Stall,

    #[error("device busy (NAK)")]
    Nak,

    #[error("no response from device")]
    Timeout,

    #[error("CRC error in data packet")]
    Crc,

    #[error("data toggle mismatch, device sent {0:?}")]
    Toggle(Pid),

    #[error("unexpected response PID {0:#04x}")]
    Pid(u8),
}

impl TxnError {
    /// Link-level damage that says nothing about the device; retried without using up budget.
    pub fn is_transient(&self) -> bool {
        matches!(self, TxnError::Crc | TxnError::Toggle(_))
    }
}

/// Direction of an interrupt or bulk transfer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    In,
    Out,
}

/// A single logical transfer on one endpoint of a task's device.
pub struct Request {
    state: RqState,
    ep: u8,
    pid: Pid,
    /// Bytes left in the current stage.
    len: u16,
    /// Cursor into the stage's buffer.
    pos: usize,
    max_packet: u16,
    data: [u8; SCRATCH_LEN],
    /// Bytes moved in the data stage, for short transfers.
    actual: usize,
    toggle: bool,
    retry: u8,
    retry_limit: u8,
    resp: Result<(), TxnError>,
    /// Set while backing off after a NAK or timeout.
    when: Option<u32>,
}

impl Request {
    pub fn new() -> Self {
        Self {
            state: RqState::Idle,
            ep: 0,
            pid: Pid::Setup,
            len: 0,
            pos: 0,
            max_packet: DEFAULT_MAX_PACKET,
            data: [0; SCRATCH_LEN],
            actual: 0,
            toggle: false,
            retry: 0,
            retry_limit: 0,
            resp: Ok(()),
            when: None,
        }
    }

    pub fn state(&self) -> RqState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == RqState::Idle
    }

    /// Outcome of the last packet, or of the whole transfer once idle.
    pub fn resp(&self) -> Result<(), TxnError> {
        self.resp
    }

    pub fn is_stalled(&self) -> bool {
        self.resp == Err(TxnError::Stall)
    }

    /// The data stage as received so far.
    pub fn data(&self) -> &[u8] {
        &self.data[..self.actual]
    }

    pub fn endpoint(&self) -> u8 {
        self.ep
    }

    /// The toggle the next data packet will carry.
    pub fn toggle(&self) -> bool {
        self.toggle
    }

    /// Resumes the toggle sequence of an interrupt endpoint between transfers.
    pub fn set_toggle(&mut self, toggle: bool) {
        self.toggle = toggle;
    }

    pub fn retries_left(&self) -> u8 {
        self.retry
    }

    /// When the next retry is due, if backing off.
    pub fn when(&self) -> Option<u32> {
        self.when
    }

    /// Starts a control transfer on endpoint zero; the SETUP packet itself lives in the task.
    pub(crate) fn start_control(&mut self, max_packet: u16) {
        self.state = RqState::Setup;
        self.ep = 0;
        self.pid = Pid::Setup;
        self.len = 8;
        self.pos = 0;
        self.actual = 0;
        self.max_packet = max_packet;
        self.toggle = false;
        self.retry = CONTROL_RETRIES;
        self.retry_limit = CONTROL_RETRIES;
        self.resp = Ok(());
        self.when = None;
    }

    /// Starts an interrupt or bulk IN transfer of up to `len` bytes. The caller restores the
    /// endpoint's toggle afterwards.
    pub(crate) fn start_in(&mut self, ep: u8, len: u16, max_packet: u16) {
        self.start_data(ep, Direction::In, len, max_packet);
    }

    /// Starts an interrupt or bulk OUT transfer of `bytes`.
    pub(crate) fn start_out(&mut self, ep: u8, bytes: &[u8], max_packet: u16) {
        let len = cmp::min(bytes.len(), SCRATCH_LEN);
        self.data[..len].copy_from_slice(&bytes[..len]);
        self.start_data(ep, Direction::Out, len as u16, max_packet);
    }

    fn start_data(&mut self, ep: u8, dir: Direction, len: u16, max_packet: u16) {
        self.ep = ep;
        self.len = cmp::min(len, SCRATCH_LEN as u16);
        self.pos = 0;
        self.actual = 0;
        self.max_packet = max_packet;
        self.retry = DATA_RETRIES;
        self.retry_limit = DATA_RETRIES;
        self.resp = Ok(());
        self.when = None;
        (self.state, self.pid) = match dir {
            Direction::In => (RqState::In, Pid::In),
            Direction::Out => (RqState::Out, Pid::Out),
        };
    }

    fn in_data_stage(&self) -> bool {
        matches!(self.state, RqState::SetupData | RqState::In | RqState::Out)
    }

    /// Moves to the next stage once the current one has transferred everything.
    fn next_state(&mut self, setup: &Setup) {
        let dir_in = setup.direction() == ReqDirection::DeviceToHost;
        match self.state {
            RqState::Setup if setup.data_len() > 0 => {
                let len = setup.data_len();
                if len as usize > SCRATCH_LEN {
                    warn!("data stage of {} bytes truncated to {}", len, SCRATCH_LEN);
                }
                self.len = cmp::min(len, SCRATCH_LEN as u16);
                self.pos = 0;
                self.pid = if dir_in { Pid::In } else { Pid::Out };
                self.toggle = true;
                self.state = RqState::SetupData;
            }
            RqState::Setup | RqState::SetupData => {
                self.len = 0;
                self.pid = if dir_in { Pid::Out } else { Pid::In };
                self.toggle = true;
                self.state = RqState::SetupStatus;
            }
            _ => self.state = RqState::Idle,
        }
    }

    #[cfg(test)]
    pub(crate) fn finish(&mut self, resp: Result<(), TxnError>, data: &[u8]) {
        self.data[..data.len()].copy_from_slice(data);
        self.actual = data.len();
        self.resp = resp;
        self.state = RqState::Idle;
    }
}

impl Default for Request {
    fn default() -> Self {
        Self::new()
    }
}

fn wait_accept<S: Sie + ?Sized>(sie: &S) -> Result<(), TxnError> {
    for _ in 0..SPIN_LIMIT {
        if sie.read(Reg::Token) & TokenFlags::START.bits() == 0 {
            return Ok(());
        }
        hint::spin_loop();
    }
    warn!("SIE did not accept token");
    Err(TxnError::Timeout)
}

fn wait_idle<S: Sie + ?Sized>(sie: &S) -> Result<sie::RxStatus, TxnError> {
    for _ in 0..SPIN_LIMIT {
        let sts = sie.rx_status();
        if sts.is_idle() {
            return Ok(sts);
        }
        hint::spin_loop();
    }
    warn!("SIE stuck in transaction");
    Err(TxnError::Timeout)
}

fn handshake(sts: sie::RxStatus) -> Result<(), TxnError> {
    if sts.timed_out() {
        return Err(TxnError::Timeout);
    }
    match Pid::from_u8(sts.pid()) {
        Some(Pid::Ack) => Ok(()),
        Some(Pid::Nak) => Err(TxnError::Nak),
        Some(Pid::Stall) => Err(TxnError::Stall),
        _ => Err(TxnError::Pid(sts.pid())),
    }
}

fn token_flags(toggle: bool) -> TokenFlags {
    let mut flags = TokenFlags::START | TokenFlags::HANDSHAKE;
    flags.set(TokenFlags::DATA1, toggle);
    flags
}

/// Sends one OUT or SETUP packet and collects the handshake. Returns the bytes sent.
fn out_txn<S: Sie + ?Sized>(sie: &mut S, req: &Request, addr: u8, setup: &[u8; 8]) -> Result<usize, TxnError> {
    let len = cmp::min(req.len, req.max_packet) as usize;
    let src = match req.state {
        RqState::Setup => &setup[req.pos..req.pos + len],
        _ => &req.data[req.pos..req.pos + len],
    };
    for &byte in src {
        sie.write(Reg::Data, byte.into());
    }
    sie.write(Reg::TxLen, len as u32);

    sie.write(Reg::Token, sie::token(req.pid, addr, req.ep, token_flags(req.toggle)));
    wait_accept(sie)?;

    let sts = wait_idle(sie)?;
    handshake(sts)?;
    Ok(len)
}

/// Requests one IN packet. Returns the bytes received.
fn in_txn<S: Sie + ?Sized>(sie: &mut S, req: &mut Request, addr: u8) -> Result<usize, TxnError> {
    sie.write(Reg::TxLen, 0);
    let flags = token_flags(req.toggle) | TokenFlags::IN;
    sie.write(Reg::Token, sie::token(Pid::In, addr, req.ep, flags));
    wait_accept(sie)?;

    let sts = wait_idle(sie)?;
    if sts.timed_out() {
        return Err(TxnError::Timeout);
    }
    if !Pid::is_data(sts.pid()) {
        // A handshake instead of data: NAK or STALL, anything else is garbage.
        return handshake(sts).and(Err(TxnError::Pid(sts.pid())));
    }
    if sts.crc_error() {
        return Err(TxnError::Crc);
    }
    let pid = if sts.pid() == Pid::Data1 as u8 { Pid::Data1 } else { Pid::Data0 };
    if (pid == Pid::Data1) != req.toggle {
        // Retransmission of a packet we already have; the SIE has ACKed it, drop it.
        return Err(TxnError::Toggle(pid));
    }

    let size = cmp::min(sts.count(), req.len) as usize;
    for byte in &mut req.data[req.pos..req.pos + size] {
        *byte = sie.read(Reg::Data) as u8;
    }
    Ok(size)
}

fn do_txn<S: Sie + ?Sized>(sie: &mut S, task: &mut Task) -> Result<usize, TxnError> {
    let sof = sie.sof_enabled();
    sie.configure_port(task.speed, sof);
    if task.req.pid == Pid::In {
        in_txn(sie, &mut task.req, task.addr)
    } else {
        let setup = task.setup.to_bytes();
        out_txn(sie, &task.req, task.addr, &setup)
    }
}

/// Advances the task's request by one packet, if it is due.
pub fn request_step<S: Sie + ?Sized>(sie: &mut S, now: u32, task: &mut Task) {
    {
        let req = &task.req;
        if req.state == RqState::Idle || req.retry == 0 {
            return;
        }
        if req.when.map_or(false, |when| !is_due(when, now)) {
            return;
        }
    }

    let result = do_txn(sie, task);
    let req = &mut task.req;
    match result {
        Ok(size) => {
            req.retry = req.retry_limit;
            req.when = None;
            req.len -= cmp::min(size, req.len as usize) as u16;
            req.pos += size;
            let short = req.pid == Pid::In && req.in_data_stage() && size < req.max_packet as usize;
            if req.in_data_stage() {
                req.actual += size;
            }
            req.toggle = !req.toggle;
            if req.len == 0 || short {
                req.next_state(&task.setup);
            }
            req.resp = Ok(());
        }
        Err(TxnError::Stall) => {
            trace!("addr {} ep {} stalled in {:?}", task.addr, req.ep, req.state);
            req.state = RqState::Idle;
            req.resp = Err(TxnError::Stall);
        }
        Err(err) if err.is_transient() => {
            trace!("addr {} ep {}: {}, retrying", task.addr, req.ep, err);
            req.resp = Err(err);
        }
        Err(err @ (TxnError::Nak | TxnError::Timeout)) => {
            if err == TxnError::Nak {
                task.nak = task.nak.wrapping_add(1);
            } else {
                task.tout = task.tout.wrapping_add(1);
            }
            req.resp = Err(err);
            req.retry -= 1;
            if req.retry == 0 {
                req.state = RqState::Idle;
            } else {
                req.when = Some(now.wrapping_add(NAK_BACKOFF_MS));
            }
        }
        Err(err) => {
            warn!("addr {} ep {}: {}", task.addr, req.ep, err);
            req.state = RqState::Idle;
            req.resp = Err(err);
        }
    }
}
