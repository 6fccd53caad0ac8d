//! Logging setup for the binary.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Maps the number of `-v` flags to the default log level.
#[must_use]
pub const fn level_for(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    }
}

/// Installs a stderr `fmt` subscriber filtered by `RUST_LOG`, with the level
/// from [`level_for`] added as a directive.
///
/// Calling it twice is harmless; the second subscriber is not installed.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::from_default_env().add_directive(level_for(verbosity).into());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0, Level::WARN)]
    #[case(1, Level::INFO)]
    #[case(2, Level::DEBUG)]
    #[case(7, Level::DEBUG)]
    fn verbosity_raises_level(#[case] verbosity: u8, #[case] expected: Level) {
        assert_eq!(level_for(verbosity), expected);
    }
}
