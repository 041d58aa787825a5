//! Host side of a single USB 1.1 root port
//!
//! The port is driven by a small Serial Interface Engine that runs one transaction at a time.
//! Everything above it is software: a transaction engine that breaks transfers into packets, a
//! fixed pool of device tasks, the root port monitor, and per-device drivers for enumeration,
//! hubs and boot protocol keyboards and mice, all stepped from one cooperative event loop
//! ([host::Host::poll]). There are no interrupts and no threads; nothing waits on a device.
//!
//! Section numbers in comments refer to these documents:
//!
//! - USB2: Universal Serial Bus Specification, Revision 2.0
//! - HID1: Device Class Definition for Human Interface Devices, Version 1.11

pub mod config;
pub mod driver;
pub mod host;
pub mod root;
pub mod sie;
pub mod task;
pub mod transaction;
pub mod usb;

#[cfg(test)]
mod testing;

pub use config::{Config, ConfigError, DEFAULT_CONFIG};
pub use driver::{HidEvent, HidReport, KeyboardReport, MouseReport};
pub use host::Host;
pub use sie::{Sie, Usb11Regs};
