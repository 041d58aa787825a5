//! The event loop
//!
//! [Host::poll] makes one pass over the task pool. Every in-use task gets, in this order: a root
//! port check if it is the root task, then either one packet of its pending request or, once the
//! request is idle and the task is due, one step of its driver. Nothing in a pass blocks except
//! the fixed settle times of the root port sequence.
use common::clock::{is_due, Clock};
use log::{debug, info};

use crate::config::Config;
use crate::driver::{self, Bus, HidEvent};
use crate::root::check_root;
use crate::sie::{Sie, Speed};
use crate::task::{PoolError, PortFlags, TaskId, TaskPool};
use crate::transaction::request_step;

pub struct Host<S: Sie, C: Clock> {
    sie: S,
    clock: C,
    bus: Bus,
    root: TaskId,
    simulation: bool,
}

impl<S: Sie, C: Clock> Host<S, C> {
    /// Claims the root task and leaves the root port powered at full speed without SOF.
    pub fn new(mut sie: S, clock: C, capacity: usize, simulation: bool) -> Result<Self, PoolError> {
        let mut bus = Bus::new(capacity);
        let root = bus.pool.alloc(PortFlags::ROOT | PortFlags::POWERED)?;
        sie.configure_port(Speed::Full, false);
        info!("USB host up, {} tasks{}", capacity, if simulation { ", simulation" } else { "" });
        Ok(Self {
            sie,
            clock,
            bus,
            root,
            simulation,
        })
    }

    pub fn from_config(sie: S, clock: C, config: &Config) -> Result<Self, PoolError> {
        Self::new(sie, clock, config.tasks.capacity, config.controller.simulation)
    }

    /// Runs one pass over all tasks.
    pub fn poll(&mut self) {
        for id in self.bus.pool.ids() {
            let flags = self.bus.pool[id].flags;
            if !flags.intersects(PortFlags::IN_USE) {
                continue;
            }
            if flags.contains(PortFlags::ROOT) {
                check_root(&mut self.sie, &self.clock, &mut self.bus, id, self.simulation);
            }

            let now = self.clock.now_ms();
            let task = &mut self.bus.pool[id];
            if !task.flags.contains(PortFlags::ENABLED) {
                continue;
            }
            if !task.req.is_idle() {
                request_step(&mut self.sie, now, task);
            } else if self.simulation || is_due(task.when, now) {
                driver::step(&mut self.bus, id, now);
                let task = &mut self.bus.pool[id];
                if task.driver.is_stalled() && !task.flags.contains(PortFlags::STALLED) {
                    debug!("{}: {} driver stalled", id, task.driver.name());
                    task.flags |= PortFlags::STALLED;
                }
            }
        }
    }

    /// Input reports decoded since the last call, oldest first.
    pub fn take_events(&mut self) -> Vec<HidEvent> {
        self.bus.take_events()
    }

    pub fn root(&self) -> TaskId {
        self.root
    }

    pub fn pool(&self) -> &TaskPool {
        &self.bus.pool
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn sie(&self) -> &S {
        &self.sie
    }

    pub fn sie_mut(&mut self) -> &mut S {
        &mut self.sie
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}
