//! Takes a freshly reset device from address zero to configured, then hands it to a class driver.
use log::{debug, error, info, warn};

use super::{hid::Hid, Bus, Driver, Hub, IDLE_POLL_MS};
use crate::task::TaskId;
use crate::transaction::SCRATCH_LEN;
use crate::usb::{
    find_desc, parse, ConfigDescriptor, DescIter, DescriptorKind, DeviceDescriptor, EndpointDescriptor,
    InterfaceDescriptor, Setup, CLASS_HID, CLASS_HUB,
};

/// Recovery time after SET_ADDRESS. (USB2 9.2.6.3)
const SET_ADDRESS_DELAY_MS: u32 = 50;
const SET_CONFIG_DELAY_MS: u32 = 10;

/// Each state issues one request; the next state checks its outcome.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EnumState {
    SetAddress,
    GetDeviceDesc,
    GetConfigHeader,
    SetConfig,
    GetFullConfig,
    Enumerated,
    Stall,
}

pub struct Enumerate {
    state: EnumState,
    /// Address sent in SET_ADDRESS, adopted once the device acknowledged it.
    pending_addr: u8,
    total_len: u16,
}

impl Enumerate {
    pub fn new() -> Self {
        Self {
            state: EnumState::SetAddress,
            pending_addr: 0,
            total_len: 0,
        }
    }

    pub fn state(&self) -> EnumState {
        self.state
    }

    pub fn is_stalled(&self) -> bool {
        self.state == EnumState::Stall
    }

    fn fail(&mut self, id: TaskId, why: impl std::fmt::Display) {
        error!("{}: enumeration failed in {:?}: {}", id, self.state, why);
        self.state = EnumState::Stall;
    }

    /// Runs one state. Returns the class driver to bind once enumeration is done.
    pub fn step(&mut self, bus: &mut Bus, id: TaskId, now: u32) -> Option<Driver> {
        let task = &mut bus.pool[id];
        if self.state != EnumState::SetAddress && self.state != EnumState::Stall {
            if let Err(err) = task.req.resp() {
                self.fail(id, err);
                return None;
            }
        }

        match self.state {
            EnumState::SetAddress => {
                task.addr = 0;
                let Some(addr) = bus.alloc_address() else {
                    self.fail(id, "out of bus addresses");
                    return None;
                };
                let task = &mut bus.pool[id];
                self.pending_addr = addr;
                task.setup_req(Setup::set_address(addr));
                task.when = now.wrapping_add(SET_ADDRESS_DELAY_MS);
                self.state = EnumState::GetDeviceDesc;
            }
            EnumState::GetDeviceDesc => {
                task.addr = self.pending_addr;
                debug!("{}: address {}", id, task.addr);
                task.setup_req(Setup::get_descriptor(DescriptorKind::Device, 0, DeviceDescriptor::SIZE as u16));
                self.state = EnumState::GetConfigHeader;
            }
            EnumState::GetConfigHeader => {
                let desc = match parse::<DeviceDescriptor>(task.req.data()) {
                    Ok(desc) => desc,
                    Err(err) => {
                        self.fail(id, err);
                        return None;
                    }
                };
                if desc.ep0_packet_size().is_none() {
                    warn!("{}: invalid endpoint zero size {}, using 8", id, desc.packet_size);
                }
                task.dev_desc = Some(desc);
                task.setup_req(Setup::get_descriptor(
                    DescriptorKind::Configuration,
                    0,
                    ConfigDescriptor::SIZE as u16,
                ));
                self.state = EnumState::SetConfig;
            }
            EnumState::SetConfig => {
                let conf = match parse::<ConfigDescriptor>(task.req.data()) {
                    Ok(conf) => conf,
                    Err(err) => {
                        self.fail(id, err);
                        return None;
                    }
                };
                self.total_len = conf.total_length();
                task.setup_req(Setup::set_configuration(1));
                task.when = now.wrapping_add(SET_CONFIG_DELAY_MS);
                self.state = EnumState::GetFullConfig;
            }
            EnumState::GetFullConfig => {
                let total = self.total_len;
                if total as usize > SCRATCH_LEN {
                    self.fail(id, format_args!("configuration of {} bytes exceeds {}", total, SCRATCH_LEN));
                    return None;
                }
                if (total as usize) < ConfigDescriptor::SIZE {
                    self.fail(id, format_args!("configuration of {} bytes is malformed", total));
                    return None;
                }
                task.setup_req(Setup::get_descriptor(DescriptorKind::Configuration, 0, total));
                self.state = EnumState::Enumerated;
            }
            EnumState::Enumerated => {
                let config = task.req.data();
                if let Some(desc) = &task.dev_desc {
                    let (vendor, product) = (desc.vendor(), desc.product());
                    info!("{}: device {:04x}:{:04x} at address {}", id, vendor, product, task.addr);
                    log_device(desc);
                }
                log_config(config);
                debug!("{}: {} NAKs, {} timeouts during enumeration", id, task.nak, task.tout);
                return Some(select_driver(id, config));
            }
            EnumState::Stall => {
                task.when = now.wrapping_add(IDLE_POLL_MS);
            }
        }
        None
    }
}

impl Default for Enumerate {
    fn default() -> Self {
        Self::new()
    }
}

/// Binds by the class of the first interface in the bundle.
fn select_driver(id: TaskId, config: &[u8]) -> Driver {
    let iface = find_desc(config, DescriptorKind::Interface).map(parse::<InterfaceDescriptor>);
    match iface {
        Some(Ok(iface)) if iface.class == CLASS_HID => Driver::Hid(Hid::new()),
        Some(Ok(iface)) if iface.class == CLASS_HUB => Driver::Hub(Hub::new()),
        Some(Ok(iface)) => {
            warn!("{}: no driver for interface class {:#04x}", id, iface.class);
            Driver::Unknown
        }
        Some(Err(err)) => {
            warn!("{}: bad interface descriptor: {}", id, err);
            Driver::Unknown
        }
        None => {
            warn!("{}: configuration has no interfaces", id);
            Driver::Unknown
        }
    }
}

fn log_device(desc: &DeviceDescriptor) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    debug!(
        "  usb {:x} class {:x}/{:x}/{:x} ep0 {} release {:x} configurations {}",
        desc.usb_version(),
        desc.class,
        desc.sub_class,
        desc.protocol,
        desc.packet_size,
        desc.release(),
        desc.configurations,
    );
}

fn log_config(config: &[u8]) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    for (any, bytes) in DescIter::new(config) {
        if any.kind == DescriptorKind::Configuration as u8 {
            if let Ok(conf) = parse::<ConfigDescriptor>(bytes) {
                debug!(
                    "  configuration {}: {} bytes, {} interfaces, attributes {:x}, {} mA",
                    conf.configuration_value,
                    conf.total_length(),
                    conf.interfaces,
                    conf.attributes,
                    u32::from(conf.max_power) * 2,
                );
                continue;
            }
        } else if any.kind == DescriptorKind::Interface as u8 {
            if let Ok(iface) = parse::<InterfaceDescriptor>(bytes) {
                debug!(
                    "  interface {} alt {}: {} endpoints, class {:x}/{:x}/{:x}",
                    iface.number, iface.alternate_setting, iface.endpoints, iface.class, iface.sub_class, iface.protocol,
                );
                continue;
            }
        } else if any.kind == DescriptorKind::Endpoint as u8 {
            if let Ok(endp) = parse::<EndpointDescriptor>(bytes) {
                debug!(
                    "  endpoint {:x}: {:?}, {} bytes, interval {}",
                    endp.address,
                    endp.ty(),
                    endp.max_packet_size(),
                    endp.interval,
                );
                continue;
            }
        }
        let (length, kind) = (any.length, any.kind);
        debug!("  descriptor {:#04x}, {} bytes", kind, length);
    }
}
