// File: ./src/logging.rs
// Terminal logger setup for the binaries. The library only uses the `log` macros.
use anyhow::Result;
use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};

/// Installs a stderr logger at `level`. Calling it twice is an error.
pub fn init(level: LevelFilter) -> Result<()> {
    let config = ConfigBuilder::new()
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .set_time_level(LevelFilter::Debug)
        .add_filter_allow_str("itinerary")
        .build();

    TermLogger::init(level, config, TerminalMode::Stderr, ColorChoice::Auto)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))
}

/// Level for the CLI: `--verbose` wins over the configured one.
pub fn level_for(configured: LevelFilter, verbose: bool) -> LevelFilter {
    if verbose { LevelFilter::Debug } else { configured }
}
