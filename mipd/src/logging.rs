//! Logging setup (§4.A, ambient stack).

use log::LevelFilter;

pub fn init(debug: bool) {
    let level = if debug { LevelFilter::Debug } else { LevelFilter::Info };
    env_logger::Builder::from_default_env().filter_level(level).format_timestamp_millis().init();
}
