//! Infrastructure shared by the SoC peripheral drivers: volatile register access, the
//! millisecond clock the cooperative schedulers run on, and logger setup.

pub mod clock;
pub mod io;
mod logger;

pub use logger::setup_logging;
