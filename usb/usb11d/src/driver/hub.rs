//! Hub class driver
//!
//! A hub gets one task per downstream port. The driver then walks its ports round-robin, one
//! GET_PORT_STATUS every [IDLE_POLL_MS], powering ports, resetting newly connected devices and
//! binding the enumeration driver once a port comes up enabled. A port whose device went away is
//! freed together with everything below it and power cycled.
//!
//! Only one device on the whole bus may sit at address zero, so resets are serialized by the
//! bus-wide reset lock: a port that wants a reset while another port holds the lock is skipped
//! until a later round.
use log::{debug, error, info, warn};
use smallvec::SmallVec;

use super::{Bus, Driver, Enumerate, IDLE_POLL_MS};
use crate::sie::Speed;
use crate::task::{PortFlags, TaskId};
use crate::usb::{parse, HubDescriptor, HubPortFeature, HubPortStatus, Setup};

/// Ports beyond this are ignored.
pub const MAX_PORTS: usize = 8;

/// Settle time between a port coming up enabled and its enumeration.
const PORT_ENABLE_DELAY_MS: u32 = 100;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HubState {
    Init,
    BuildPorts,
    GetStatus,
    ActStatus,
    DoNext,
    /// A port command was sent; check it went through.
    CmdWait,
    Stall,
}

struct HubPorts {
    /// Port being looked at, 1-based as on the wire.
    idx: u8,
    children: SmallVec<[TaskId; MAX_PORTS]>,
}

pub struct Hub {
    state: HubState,
    ports: Option<Box<HubPorts>>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            state: HubState::Init,
            ports: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_children(children: &[TaskId]) -> Self {
        Self {
            state: HubState::GetStatus,
            ports: Some(Box::new(HubPorts {
                idx: 1,
                children: children.iter().copied().collect(),
            })),
        }
    }

    pub fn state(&self) -> HubState {
        self.state
    }

    pub fn children(&self) -> &[TaskId] {
        self.ports.as_ref().map_or(&[], |ports| &ports.children)
    }

    pub fn is_stalled(&self) -> bool {
        self.state == HubState::Stall
    }

    fn fail(&mut self, id: TaskId, why: impl std::fmt::Display) {
        error!("{}: hub failed in {:?}: {}", id, self.state, why);
        self.state = HubState::Stall;
    }

    pub fn step(&mut self, bus: &mut Bus, id: TaskId, now: u32) {
        if matches!(self.state, HubState::BuildPorts | HubState::ActStatus | HubState::CmdWait) {
            if let Err(err) = bus.pool[id].req.resp() {
                self.fail(id, err);
                return;
            }
        }

        match self.state {
            HubState::Init => {
                info!("{}: hub at address {}", id, bus.pool[id].addr);
                bus.pool[id].setup_req(Setup::get_hub_descriptor(HubDescriptor::SIZE as u16));
                self.state = HubState::BuildPorts;
            }
            HubState::BuildPorts => {
                let desc = match parse::<HubDescriptor>(bus.pool[id].req.data()) {
                    Ok(desc) => desc,
                    Err(err) => return self.fail(id, err),
                };
                let mut nports = desc.ports as usize;
                if nports > MAX_PORTS {
                    warn!("{}: hub has {} ports, using the first {}", id, nports, MAX_PORTS);
                    nports = MAX_PORTS;
                }
                if nports == 0 {
                    return self.fail(id, "hub has no ports");
                }
                debug!("{}: {} ports, power good after {} ms", id, nports, desc.power_on_delay_ms());

                let mut ports = Box::new(HubPorts {
                    idx: 1,
                    children: SmallVec::new(),
                });
                for _ in 0..nports {
                    match bus.pool.alloc(PortFlags::HUB_PORT) {
                        Ok(child) => ports.children.push(child),
                        Err(err) => {
                            // Keep what was allocated so freeing the hub returns it.
                            self.ports = Some(ports);
                            return self.fail(id, err);
                        }
                    }
                }
                self.ports = Some(ports);
                self.state = HubState::GetStatus;
            }
            HubState::GetStatus => {
                let Some(ports) = &self.ports else {
                    return self.fail(id, "no ports");
                };
                bus.pool[id].setup_req(Setup::get_port_status(ports.idx));
                self.state = HubState::ActStatus;
            }
            HubState::ActStatus => self.act_status(bus, id, now),
            HubState::DoNext => {
                if let Some(ports) = &mut self.ports {
                    ports.idx += 1;
                    if ports.idx as usize > ports.children.len() {
                        ports.idx = 1;
                    }
                }
                self.hub_wait(bus, id, now);
            }
            HubState::CmdWait => self.hub_wait(bus, id, now),
            HubState::Stall => {
                bus.pool[id].when = now.wrapping_add(IDLE_POLL_MS);
            }
        }
    }

    fn hub_wait(&mut self, bus: &mut Bus, id: TaskId, now: u32) {
        bus.pool[id].when = now.wrapping_add(IDLE_POLL_MS);
        self.state = HubState::GetStatus;
    }

    fn act_status(&mut self, bus: &mut Bus, id: TaskId, now: u32) {
        let Some(ports) = &self.ports else {
            return self.fail(id, "no ports");
        };
        let idx = ports.idx;
        let child = ports.children[idx as usize - 1];
        let data = bus.pool[id].req.data();
        let Ok(raw) = <[u8; 4]>::try_from(data) else {
            let len = data.len();
            return self.fail(id, format_args!("port status of {} bytes", len));
        };
        let status = HubPortStatus::from_le_bytes(raw);

        bus.release_reset_lock();

        let flags = bus.pool[child].flags;
        if (!status.is_enabled() && flags.contains(PortFlags::ENABLED)) || flags.contains(PortFlags::STALLED) {
            info!("{}: port {} powered down", id, idx);
            bus.free(child);
            bus.pool[child].flags = PortFlags::HUB_PORT;
            bus.pool[id].setup_req(Setup::clear_port_feature(HubPortFeature::PortPower, idx));
            self.state = HubState::CmdWait;
            return;
        }

        self.state = if !status.is_powered() {
            bus.pool[id].setup_req(Setup::set_port_feature(HubPortFeature::PortPower, idx));
            HubState::CmdWait
        } else if !status.is_connected() {
            if flags.contains(PortFlags::CONNECTED) {
                // Gone before it came up enabled, possibly holding the reset lock.
                info!("{}: port {} disconnected", id, idx);
                bus.free(child);
            }
            bus.pool[child].flags = PortFlags::HUB_PORT | PortFlags::POWERED;
            HubState::DoNext
        } else if !status.has_reset() {
            bus.pool[child].flags |= PortFlags::CONNECTED;
            if bus.try_lock_reset(child) {
                debug!("{}: resetting port {}", id, idx);
                bus.pool[id].setup_req(Setup::set_port_feature(HubPortFeature::PortReset, idx));
                HubState::CmdWait
            } else {
                HubState::DoNext
            }
        } else if status.is_enabled() {
            let port = &mut bus.pool[child];
            if !port.flags.contains(PortFlags::ENABLED) {
                info!("{}: port {} connected, status {:#010x}", id, idx, status.bits());
                port.flags |= PortFlags::RESET_DONE | PortFlags::ENABLED;
                port.speed = if status.is_low_speed() { Speed::Mixed } else { Speed::Full };
                port.driver = Driver::Enumerate(Enumerate::new());
                port.when = now.wrapping_add(PORT_ENABLE_DELAY_MS);
            }
            HubState::DoNext
        } else {
            HubState::DoNext
        };
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}
