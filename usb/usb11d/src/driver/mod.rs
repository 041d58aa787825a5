//! Per-device state machines
//!
//! Each enabled task has exactly one [Driver]. Drivers never block: a step looks at the outcome
//! of the task's last request, issues at most one new request and returns. The dispatcher in
//! [crate::host] calls a driver only while its task has no transfer in flight and the task's
//! `when` has passed.
use std::collections::VecDeque;
use std::mem;

use log::{debug, warn};

use crate::task::{TaskId, TaskPool};

pub mod enumerate;
pub mod hid;
pub mod hub;

pub use self::enumerate::Enumerate;
pub use self::hid::{HidEvent, HidReport, KeyboardReport, MouseReport};
pub use self::hub::Hub;

/// Re-poll interval of a driver with nothing to do, and of a stalled one.
pub const IDLE_POLL_MS: u32 = 255;

/// Highest address a device can be given. (USB2 9.6.6)
pub const MAX_ADDRESS: u8 = 127;

/// Decoded input reports kept for the consumer before the oldest are dropped.
pub const EVENT_QUEUE_LEN: usize = 64;

#[derive(Default)]
pub enum Driver {
    /// Free task, or a hub port with nothing enabled on it.
    #[default]
    None,
    Enumerate(Enumerate),
    Hub(Hub),
    Hid(hid::Hid),
    /// Enumerated, but no driver claims its first interface.
    Unknown,
}

impl Driver {
    pub fn name(&self) -> &'static str {
        match self {
            Driver::None => "none",
            Driver::Enumerate(_) => "enumeration",
            Driver::Hub(_) => "hub",
            Driver::Hid(_) => "hid",
            Driver::Unknown => "unknown",
        }
    }

    /// Tasks owned by this driver, freed along with it.
    pub fn children(&self) -> Option<&[TaskId]> {
        match self {
            Driver::Hub(hub) => Some(hub.children()),
            _ => None,
        }
    }

    /// The driver reached a state it cannot leave without the device being unplugged.
    pub fn is_stalled(&self) -> bool {
        match self {
            Driver::Enumerate(enumerate) => enumerate.is_stalled(),
            Driver::Hub(hub) => hub.is_stalled(),
            _ => false,
        }
    }

    fn step(&mut self, bus: &mut Bus, id: TaskId, now: u32) {
        let next = match self {
            Driver::None | Driver::Unknown => None,
            Driver::Enumerate(enumerate) => enumerate.step(bus, id, now),
            Driver::Hub(hub) => {
                hub.step(bus, id, now);
                None
            }
            Driver::Hid(hid) => {
                hid.step(bus, id, now);
                None
            }
        };
        if let Some(next) = next {
            debug!("{}: binding {} driver", id, next.name());
            *self = next;
            // The class driver picks up the configuration bundle still held by the request.
            self.step(bus, id, now);
        }
    }
}

/// Bus-wide state shared by every driver.
pub struct Bus {
    pub pool: TaskPool,
    next_addr: u8,
    /// The one port allowed to hold a device at address zero.
    reset_lock: Option<TaskId>,
    events: VecDeque<HidEvent>,
}

impl Bus {
    pub fn new(capacity: usize) -> Self {
        Self {
            pool: TaskPool::new(capacity),
            next_addr: 1,
            reset_lock: None,
            events: VecDeque::with_capacity(EVENT_QUEUE_LEN),
        }
    }

    /// Hands out the next unused bus address. Addresses are never reused.
    pub fn alloc_address(&mut self) -> Option<u8> {
        if self.next_addr > MAX_ADDRESS {
            return None;
        }
        let addr = self.next_addr;
        self.next_addr += 1;
        Some(addr)
    }

    pub fn reset_lock(&self) -> Option<TaskId> {
        self.reset_lock
    }

    /// Takes the reset lock for `id`. Fails if another port holds it.
    pub fn try_lock_reset(&mut self, id: TaskId) -> bool {
        match self.reset_lock {
            Some(holder) => holder == id,
            None => {
                debug!("{}: reset lock taken", id);
                self.reset_lock = Some(id);
                true
            }
        }
    }

    /// Drops the reset lock once its holder has left address zero, one way or another.
    pub fn release_reset_lock(&mut self) {
        let Some(holder) = self.reset_lock else {
            return;
        };
        let task = &self.pool[holder];
        if task.addr != 0 || task.flags.contains(crate::task::PortFlags::STALLED) {
            debug!("{}: reset lock released", holder);
            self.reset_lock = None;
        }
    }

    /// Frees a task and everything below it, releasing the reset lock if one of them held it.
    pub fn free(&mut self, id: TaskId) {
        for freed in self.pool.clear(id) {
            if self.reset_lock == Some(freed) {
                debug!("{}: reset lock released on free", freed);
                self.reset_lock = None;
            }
        }
    }

    pub fn push_event(&mut self, event: HidEvent) {
        if self.events.len() == EVENT_QUEUE_LEN {
            warn!("input event queue full, dropping oldest");
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    pub fn take_events(&mut self) -> Vec<HidEvent> {
        self.events.drain(..).collect()
    }
}

/// Runs the driver of `id` once.
pub fn step(bus: &mut Bus, id: TaskId, now: u32) {
    let mut driver = mem::take(&mut bus.pool[id].driver);
    driver.step(bus, id, now);
    bus.pool[id].driver = driver;
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::task::PortFlags;

    #[test]
    fn addresses_monotonic_until_exhausted() {
        let mut bus = Bus::new(1);
        let addrs: Vec<_> = std::iter::from_fn(|| bus.alloc_address()).collect();
        assert_eq!(addrs.len(), MAX_ADDRESS as usize);
        assert!(addrs.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(addrs[0], 1);
        assert_eq!(bus.alloc_address(), None);
    }

    #[test]
    fn reset_lock_single_holder() {
        let mut bus = Bus::new(3);
        let a = bus.pool.alloc(PortFlags::HUB_PORT).unwrap();
        let b = bus.pool.alloc(PortFlags::HUB_PORT).unwrap();

        assert!(bus.try_lock_reset(a));
        assert!(!bus.try_lock_reset(b));
        assert!(bus.try_lock_reset(a));

        bus.release_reset_lock();
        assert_eq!(bus.reset_lock(), Some(a));

        bus.pool[a].addr = 4;
        bus.release_reset_lock();
        assert_eq!(bus.reset_lock(), None);
        assert!(bus.try_lock_reset(b));

        bus.pool[b].flags |= PortFlags::STALLED;
        bus.release_reset_lock();
        assert_eq!(bus.reset_lock(), None);
    }

    #[test]
    fn free_releases_reset_lock() {
        let mut bus = Bus::new(3);
        let hub = bus.pool.alloc(PortFlags::ROOT).unwrap();
        let port = bus.pool.alloc(PortFlags::HUB_PORT).unwrap();
        bus.pool[hub].driver = Driver::Hub(Hub::with_children(&[port]));
        assert!(bus.try_lock_reset(port));

        bus.free(hub);
        assert_eq!(bus.reset_lock(), None);
        assert!(bus.pool[port].is_free());
    }

    #[test]
    fn event_queue_bounded() {
        let mut bus = Bus::new(1);
        for i in 0..EVENT_QUEUE_LEN + 3 {
            bus.push_event(HidEvent {
                addr: 1,
                report: HidReport::Mouse(MouseReport {
                    buttons: 0,
                    dx: i as i8,
                    dy: 0,
                    wheel: 0,
                }),
            });
        }
        let events = bus.take_events();
        assert_eq!(events.len(), EVENT_QUEUE_LEN);
        assert!(matches!(events[0].report, HidReport::Mouse(MouseReport { dx: 3, .. })));
        assert!(bus.take_events().is_empty());
    }

    #[test]
    fn unknown_driver_never_stalls() {
        let mut bus = Bus::new(1);
        let id = bus.pool.alloc(PortFlags::ROOT).unwrap();
        bus.pool[id].driver = Driver::Unknown;
        step(&mut bus, id, 0);
        assert!(matches!(bus.pool[id].driver, Driver::Unknown));
        assert!(!bus.pool[id].driver.is_stalled());
        assert!(bus.pool[id].request().is_idle());
    }
}
