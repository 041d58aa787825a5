use redox_log::{OutputBuilder, RedoxLogger};

/// Configures logging for a single driver.
///
/// There is no log scheme on the SoC, so everything goes to stderr, which the monitor forwards
/// to the serial console. `category` and `name` prefix the first line so interleaved output from
/// several drivers stays attributable.
pub fn setup_logging(category: &str, name: &str, output_level: log::LevelFilter) {
    let logger = RedoxLogger::new().with_output(
        OutputBuilder::stderr()
            .with_filter(output_level)
            .with_ansi_escape_codes()
            .flush_on_newline(true)
            .build(),
    );

    logger.enable().expect("failed to set default logger");

    log::info!("{}: {} logging at {}", category, name, output_level);
}
