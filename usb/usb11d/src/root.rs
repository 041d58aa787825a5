//! The root port
//!
//! The SIE reports a device on the root port through the DETECT line state bit. Bringing the
//! port up is a short sequence with fixed settle times in between, run on the root task's flags:
//! connect, bus reset, then bind the enumeration driver. Losing DETECT at any point frees the root
//! task, and with it every device on the bus.
use common::clock::Clock;
use log::{debug, info};

use crate::driver::{Bus, Driver, Enumerate};
use crate::sie::{Sie, Speed, Stat};
use crate::task::{PortFlags, TaskId};

/// Debounce after a device first shows up. (USB2 7.1.7.3)
const CONNECT_DEBOUNCE_MS: u32 = 20;
/// How long SE0 is driven to reset the device. (USB2 7.1.7.5)
const RESET_HOLD_MS: u32 = 50;
/// Recovery time after reset before the first request.
const RESET_RECOVERY_MS: u32 = 100;

/// Runs one step of the root port sequence.
///
/// `simulation` keeps start-of-frame generation off, so a simulated bus is not flooded with SOF
/// packets.
pub fn check_root<S: Sie + ?Sized, C: Clock>(sie: &mut S, clock: &C, bus: &mut Bus, id: TaskId, simulation: bool) {
    let stat = sie.status();
    if !stat.contains(Stat::DETECT) {
        if bus.pool[id].flags.contains(PortFlags::CONNECTED) {
            info!("root port: device disconnected");
        }
        bus.free(id);
        sie.configure_port(Speed::Full, false);
        bus.pool[id].flags = PortFlags::ROOT | PortFlags::POWERED;
        return;
    }

    let task = &mut bus.pool[id];
    if task.flags.intersects(PortFlags::STALLED | PortFlags::ENABLED) {
        return;
    }

    if !task.flags.contains(PortFlags::CONNECTED) {
        task.speed = if stat.contains(Stat::DP) { Speed::Full } else { Speed::Low };
        task.flags |= PortFlags::CONNECTED;
        info!("root port: {:?} speed device connected", task.speed);
        clock.wait_ms(CONNECT_DEBOUNCE_MS);
    }

    if !task.flags.contains(PortFlags::RESET_DONE) {
        debug!("root port: reset");
        sie.reset_port();
        clock.wait_ms(RESET_HOLD_MS);
        sie.configure_port(task.speed, !simulation);
        task.flags |= PortFlags::RESET_DONE;
    }

    clock.wait_ms(RESET_RECOVERY_MS);
    task.driver = Driver::Enumerate(Enumerate::new());
    task.flags |= PortFlags::ENABLED;
    task.when = clock.now_ms();
}
