//! Tracing setup for the bot.

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Level used when `LOG_LEVEL` is unset or not a level name
pub const DEFAULT_LEVEL: LevelFilter = LevelFilter::INFO;

/// Parse a level name such as `debug` or `WARN`
pub fn parse_level(value: Option<&str>) -> LevelFilter {
    value
        .and_then(|v| v.trim().parse::<LevelFilter>().ok())
        .unwrap_or(DEFAULT_LEVEL)
}

/// Install the global subscriber
pub fn init() {
    let level = parse_level(std::env::var("LOG_LEVEL").ok().as_deref());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true),
        )
        .with(level)
        .init();
}
