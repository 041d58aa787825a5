use std::env;
use std::path::Path;

use common::clock::MonotonicClock;
use usb11d::{Config, Host, Usb11Regs, DEFAULT_CONFIG};

fn main() {
    let config = match env::args().nth(1) {
        Some(path) => Config::load(Path::new(&path)).unwrap_or_else(|err| {
            eprintln!("usb11d: {}: {}", path, err);
            std::process::exit(1);
        }),
        None => DEFAULT_CONFIG.clone(),
    };

    common::setup_logging("usb", "usb11d", config.log_level());

    log::info!("USB 1.1 SIE at {:#x}", config.controller.base);

    // The monitor maps SoC peripherals one to one and gives drivers exclusive use of them.
    let regs = unsafe { &mut *(config.controller.base as *mut Usb11Regs) };

    let mut host = Host::from_config(regs, MonotonicClock::new(), &config).expect("usb11d: failed to set up root port");

    loop {
        host.poll();
        for event in host.take_events() {
            log::info!("{}", event);
        }
    }
}
