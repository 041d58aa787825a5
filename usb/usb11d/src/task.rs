//! Device tasks and the fixed pool they live in
//!
//! A [Task] is the host's view of one port and whatever device sits behind it: its position in
//! the connect/reset/enable sequence, its bus address and speed, the class driver bound to it and
//! the single transfer it has in flight. Tasks are handed out from a [TaskPool] of fixed capacity
//! and referred to by [TaskId]; hubs keep the ids of their downstream ports, so freeing a hub
//! frees the whole subtree below it.
use std::{fmt, mem, ops};

use thiserror::Error;

use crate::driver::Driver;
use crate::sie::Speed;
use crate::transaction::{Request, DEFAULT_MAX_PACKET};
use crate::usb::{DeviceDescriptor, Setup};

/// Pool size used when the configuration does not say otherwise.
pub const DEFAULT_CAPACITY: usize = 12;

bitflags::bitflags! {
    /// Where a port is in bringing up its device. The bits are set in order; a task with neither
    /// `ROOT` nor `HUB_PORT` is free.
    #[derive(Default)]
    pub struct PortFlags: u32 {
        const ROOT = 0x01;
        const HUB_PORT = 0x02;
        const POWERED = 0x04;
        const CONNECTED = 0x08;
        const RESET_DONE = 0x10;
        const ENABLED = 0x20;
        /// The driver gave up; nothing happens until the device is unplugged.
        const STALLED = 0x40;
    }
}

impl PortFlags {
    pub const IN_USE: Self = Self::from_bits_truncate(Self::ROOT.bits() | Self::HUB_PORT.bits());
}

/// Handle to a task in a [TaskPool].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TaskId(pub(crate) usize);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "task {}", self.0)
    }
}

pub struct Task {
    pub flags: PortFlags,
    pub speed: Speed,
    /// Bus address, zero until SET_ADDRESS succeeded.
    pub addr: u8,
    /// Earliest time the driver wants to run again.
    pub when: u32,
    /// NAKs and timeouts seen, for diagnostics only.
    pub nak: u16,
    pub tout: u16,
    pub driver: Driver,
    pub dev_desc: Option<DeviceDescriptor>,
    pub(crate) setup: Setup,
    pub(crate) req: Request,
}

impl Task {
    pub fn new() -> Self {
        Self {
            flags: PortFlags::empty(),
            speed: Speed::Full,
            addr: 0,
            when: 0,
            nak: 0,
            tout: 0,
            driver: Driver::None,
            dev_desc: None,
            setup: Setup::default(),
            req: Request::new(),
        }
    }

    pub fn is_free(&self) -> bool {
        !self.flags.intersects(PortFlags::IN_USE)
    }

    pub fn request(&self) -> &Request {
        &self.req
    }

    /// Packet size of endpoint zero, known once the device descriptor has been read.
    pub fn ep0_max_packet(&self) -> u16 {
        self.dev_desc
            .and_then(|desc| desc.ep0_packet_size())
            .unwrap_or(DEFAULT_MAX_PACKET)
    }

    /// Starts a control transfer on endpoint zero.
    pub fn setup_req(&mut self, setup: Setup) {
        self.setup = setup;
        let max_packet = self.ep0_max_packet();
        self.req.start_control(max_packet);
    }

    pub fn data_req_in(&mut self, ep: u8, len: u16, max_packet: u16) {
        self.req.start_in(ep, len, max_packet);
    }

    pub fn data_req_out(&mut self, ep: u8, bytes: &[u8], max_packet: u16) {
        self.req.start_out(ep, bytes, max_packet);
    }
}

impl Default for Task {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum PoolError {
    #[error("all {0} tasks are in use")]
    Exhausted(usize),
}

pub struct TaskPool {
    tasks: Vec<Task>,
}

impl TaskPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            tasks: (0..capacity).map(|_| Task::new()).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.tasks.len()
    }

    pub fn ids(&self) -> impl Iterator<Item = TaskId> {
        (0..self.tasks.len()).map(TaskId)
    }

    pub fn in_use(&self) -> usize {
        self.tasks.iter().filter(|task| !task.is_free()).count()
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(id.0)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(id.0)
    }

    /// Claims the first free task and marks it with `flags`, which must include `ROOT` or
    /// `HUB_PORT`.
    pub fn alloc(&mut self, flags: PortFlags) -> Result<TaskId, PoolError> {
        debug_assert!(flags.intersects(PortFlags::IN_USE));
        let index = self
            .tasks
            .iter()
            .position(Task::is_free)
            .ok_or(PoolError::Exhausted(self.tasks.len()))?;
        let task = &mut self.tasks[index];
        *task = Task::new();
        task.flags = flags;
        log::trace!("allocated task {} ({:?})", index, flags);
        Ok(TaskId(index))
    }

    /// Resets a task to its free state, along with every task its driver owns.
    ///
    /// Returns the ids that were reset, `id` first. Driver state is dropped exactly once, here.
    pub fn clear(&mut self, id: TaskId) -> Vec<TaskId> {
        let mut freed = Vec::new();
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            let Some(slot) = self.tasks.get_mut(id.0) else {
                log::warn!("clearing nonexistent {}", id);
                continue;
            };
            let task = mem::take(slot);
            if let Some(children) = task.driver.children() {
                pending.extend(children.iter().rev().copied());
            }
            if !task.is_free() {
                log::trace!("freed {} (addr {})", id, task.addr);
            }
            freed.push(id);
        }
        freed
    }
}

impl ops::Index<TaskId> for TaskPool {
    type Output = Task;

    fn index(&self, id: TaskId) -> &Task {
        &self.tasks[id.0]
    }
}

impl ops::IndexMut<TaskId> for TaskPool {
    fn index_mut(&mut self, id: TaskId) -> &mut Task {
        &mut self.tasks[id.0]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::driver::hub::Hub;

    #[test]
    fn alloc_first_free() {
        let mut pool = TaskPool::new(3);
        let a = pool.alloc(PortFlags::ROOT).unwrap();
        let b = pool.alloc(PortFlags::HUB_PORT).unwrap();
        assert_eq!((a, b), (TaskId(0), TaskId(1)));

        pool.clear(a);
        assert!(pool[a].is_free());
        assert_eq!(pool.alloc(PortFlags::HUB_PORT).unwrap(), a);
        assert_eq!(pool.in_use(), 2);
    }

    #[test]
    fn alloc_exhausted() {
        let mut pool = TaskPool::new(2);
        pool.alloc(PortFlags::ROOT).unwrap();
        pool.alloc(PortFlags::HUB_PORT).unwrap();
        assert_eq!(pool.alloc(PortFlags::HUB_PORT), Err(PoolError::Exhausted(2)));
    }

    #[test]
    fn alloc_resets_state() {
        let mut pool = TaskPool::new(1);
        let id = pool.alloc(PortFlags::HUB_PORT).unwrap();
        pool[id].addr = 9;
        pool[id].flags = PortFlags::empty();
        let id = pool.alloc(PortFlags::HUB_PORT).unwrap();
        assert_eq!(pool[id].addr, 0);
        assert_eq!(pool[id].ep0_max_packet(), DEFAULT_MAX_PACKET);
    }

    #[test]
    fn clear_cascades_through_hubs() {
        let mut pool = TaskPool::new(6);
        let root = pool.alloc(PortFlags::ROOT).unwrap();
        let ports: Vec<_> = (0..2).map(|_| pool.alloc(PortFlags::HUB_PORT).unwrap()).collect();
        let nested = pool.alloc(PortFlags::HUB_PORT).unwrap();
        let other = pool.alloc(PortFlags::HUB_PORT).unwrap();

        pool[root].driver = Driver::Hub(Hub::with_children(&ports));
        pool[ports[1]].driver = Driver::Hub(Hub::with_children(&[nested]));

        let freed = pool.clear(root);
        assert_eq!(freed, [root, ports[0], ports[1], nested]);
        assert!(freed.iter().all(|&id| pool[id].is_free()));
        assert!(matches!(pool[root].driver, Driver::None));
        assert!(!pool[other].is_free());
        assert_eq!(pool.in_use(), 1);
    }

    #[test]
    fn clear_resets_request() {
        let mut pool = TaskPool::new(1);
        let id = pool.alloc(PortFlags::ROOT).unwrap();
        pool[id].setup_req(Setup::set_address(1));
        assert!(!pool[id].request().is_idle());
        pool.clear(id);
        assert!(pool[id].request().is_idle());
    }
}
