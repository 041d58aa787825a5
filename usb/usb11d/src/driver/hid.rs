//! Boot protocol keyboards and mice (HID1 Appendix B)
//!
//! Only the fixed 8-byte boot reports are understood, so no report descriptor is fetched. A
//! combined device, such as a keyboard with a trackpad, has both endpoints polled in turn.
use std::{cmp, fmt};

use log::{info, trace, warn};

use super::{Bus, IDLE_POLL_MS};
use crate::task::TaskId;
use crate::transaction::{TxnError, DEFAULT_MAX_PACKET};
use crate::usb::{
    find_desc, parse, DescriptorKind, EndpointDescriptor, InterfaceDescriptor, CLASS_HID, HID_PROTOCOL_KEYBOARD,
    HID_PROTOCOL_MOUSE, HID_SUBCLASS_BOOT,
};

/// Length of a boot protocol report.
pub const REPORT_LEN: u16 = 8;

/// Gap between two report requests.
const POLL_INTERVAL_MS: u32 = 10;

bitflags::bitflags! {
    #[derive(Default)]
    pub struct Modifiers: u8 {
        const LEFT_CTRL = 1 << 0;
        const LEFT_SHIFT = 1 << 1;
        const LEFT_ALT = 1 << 2;
        const LEFT_GUI = 1 << 3;
        const RIGHT_CTRL = 1 << 4;
        const RIGHT_SHIFT = 1 << 5;
        const RIGHT_ALT = 1 << 6;
        const RIGHT_GUI = 1 << 7;
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct KeyboardReport {
    pub modifiers: Modifiers,
    /// Usage IDs of up to six pressed keys, zero for none.
    pub keys: [u8; 6],
}

impl KeyboardReport {
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < REPORT_LEN as usize {
            return None;
        }
        let mut keys = [0; 6];
        keys.copy_from_slice(&bytes[2..8]);
        Some(Self {
            modifiers: Modifiers::from_bits_truncate(bytes[0]),
            keys,
        })
    }

    pub fn pressed(&self) -> impl Iterator<Item = u8> + '_ {
        self.keys.iter().copied().filter(|&key| key != 0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MouseReport {
    pub buttons: u8,
    pub dx: i8,
    pub dy: i8,
    /// Zero for mice that send no wheel byte.
    pub wheel: i8,
}

impl MouseReport {
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 3 {
            return None;
        }
        Some(Self {
            buttons: bytes[0],
            dx: bytes[1] as i8,
            dy: bytes[2] as i8,
            wheel: bytes.get(3).map_or(0, |&b| b as i8),
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HidReport {
    Keyboard(KeyboardReport),
    Mouse(MouseReport),
}

/// A report together with the address of the device that sent it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HidEvent {
    pub addr: u8,
    pub report: HidReport,
}

impl fmt::Display for HidEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.report {
            HidReport::Keyboard(kbd) => {
                write!(f, "keyboard {}: modifiers {:?} keys", self.addr, kbd.modifiers)?;
                for key in kbd.pressed() {
                    write!(f, " {:#04x}", key)?;
                }
                Ok(())
            }
            HidReport::Mouse(mouse) => write!(
                f,
                "mouse {}: buttons {:#04x} dx {} dy {} wheel {}",
                self.addr, mouse.buttons, mouse.dx, mouse.dy, mouse.wheel
            ),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HidState {
    Init,
    MouseRequest,
    MouseReport,
    KeyboardRequest,
    KeyboardReport,
    Idle,
}

#[derive(Clone, Copy, Debug)]
struct BootEndpoint {
    number: u8,
    max_packet: u16,
    /// Toggle to resume with, kept across transfers.
    toggle: bool,
}

#[derive(Default)]
struct HidData {
    keyboard: Option<BootEndpoint>,
    mouse: Option<BootEndpoint>,
}

pub struct Hid {
    state: HidState,
    data: Option<Box<HidData>>,
}

impl Hid {
    pub fn new() -> Self {
        Self {
            state: HidState::Init,
            data: None,
        }
    }

    pub fn state(&self) -> HidState {
        self.state
    }

    pub fn has_keyboard(&self) -> bool {
        self.data.as_ref().map_or(false, |data| data.keyboard.is_some())
    }

    pub fn has_mouse(&self) -> bool {
        self.data.as_ref().map_or(false, |data| data.mouse.is_some())
    }

    pub fn step(&mut self, bus: &mut Bus, id: TaskId, now: u32) {
        let Some(data) = &mut self.data else {
            self.init(bus, id, now);
            return;
        };

        let task = &mut bus.pool[id];
        match self.state {
            HidState::Init => {}
            HidState::MouseRequest | HidState::KeyboardRequest => {
                let keyboard = self.state == HidState::KeyboardRequest;
                let ep = if keyboard { data.keyboard } else { data.mouse };
                let Some(ep) = ep else {
                    self.state = HidState::Idle;
                    return;
                };
                // Boot mice may use packets smaller than a report; one packet is one report.
                task.data_req_in(ep.number, cmp::min(REPORT_LEN, ep.max_packet), ep.max_packet);
                task.req.set_toggle(ep.toggle);
                self.state = if keyboard {
                    HidState::KeyboardReport
                } else {
                    HidState::MouseReport
                };
            }
            HidState::MouseReport | HidState::KeyboardReport => {
                let keyboard = self.state == HidState::KeyboardReport;
                if task.req.is_stalled() {
                    warn!("{}: {} endpoint stalled", id, if keyboard { "keyboard" } else { "mouse" });
                    self.state = HidState::Idle;
                    return;
                }

                let other = if keyboard { data.mouse.is_some() } else { data.keyboard.is_some() };
                self.state = match (keyboard, other) {
                    (true, true) | (false, false) => HidState::MouseRequest,
                    (true, false) | (false, true) => HidState::KeyboardRequest,
                };
                task.when = now.wrapping_add(POLL_INTERVAL_MS);

                match task.req.resp() {
                    Ok(()) => {
                        let ep = if keyboard { &mut data.keyboard } else { &mut data.mouse };
                        if let Some(ep) = ep {
                            ep.toggle = task.req.toggle();
                        }
                        let bytes = task.req.data();
                        trace!("{}: report {:x?}", id, bytes);
                        let report = if keyboard {
                            KeyboardReport::parse(bytes).map(HidReport::Keyboard)
                        } else {
                            MouseReport::parse(bytes).map(HidReport::Mouse)
                        };
                        let (addr, len) = (task.addr, bytes.len());
                        match report {
                            Some(report) => bus.push_event(HidEvent { addr, report }),
                            None => warn!("{}: short report of {} bytes", id, len),
                        }
                    }
                    Err(TxnError::Nak) => {}
                    Err(err) => trace!("{}: no report: {}", id, err),
                }
            }
            HidState::Idle => {
                task.when = now.wrapping_add(IDLE_POLL_MS);
            }
        }
    }

    /// Finds boot keyboard and mouse interfaces in the configuration bundle left in the request.
    fn init(&mut self, bus: &mut Bus, id: TaskId, now: u32) {
        let task = &bus.pool[id];
        info!("{}: HID device at address {}", id, task.addr);

        let mut data = HidData::default();
        let mut first = HidState::Idle;
        let mut rest = task.req.data();
        while let Some(bytes) = find_desc(rest, DescriptorKind::Interface) {
            let iface = match parse::<InterfaceDescriptor>(bytes) {
                Ok(iface) => iface,
                Err(err) => {
                    warn!("{}: {}", id, err);
                    break;
                }
            };
            rest = &bytes[iface.length as usize..];
            if iface.class != CLASS_HID || iface.sub_class != HID_SUBCLASS_BOOT {
                continue;
            }

            let slot = match iface.protocol {
                HID_PROTOCOL_KEYBOARD => &mut data.keyboard,
                HID_PROTOCOL_MOUSE => &mut data.mouse,
                other => {
                    warn!("{}: HID boot protocol {} not recognised", id, other);
                    continue;
                }
            };
            let Some(endp) = find_desc(rest, DescriptorKind::Endpoint).and_then(|b| parse::<EndpointDescriptor>(b).ok())
            else {
                warn!("{}: boot interface {} has no endpoint", id, iface.number);
                continue;
            };
            let ep = BootEndpoint {
                number: endp.number(),
                max_packet: match endp.max_packet_size() {
                    0 => DEFAULT_MAX_PACKET,
                    size => size,
                },
                toggle: false,
            };
            if iface.protocol == HID_PROTOCOL_KEYBOARD {
                info!("{}: boot keyboard on endpoint {}", id, ep.number);
                first = HidState::KeyboardRequest;
            } else {
                info!("{}: boot mouse on endpoint {}", id, ep.number);
                first = HidState::MouseRequest;
            }
            *slot = Some(ep);
        }

        if first == HidState::Idle {
            warn!("{}: no boot keyboard or mouse found", id);
        }
        self.data = Some(Box::new(data));
        self.state = first;
        if first != HidState::Idle {
            // Start polling right away; the first request goes out on this tick.
            self.step(bus, id, now);
        }
    }
}

impl Default for Hid {
    fn default() -> Self {
        Self::new()
    }
}
