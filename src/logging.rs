use std::io::Write;

use chrono::Local;
use env_logger::{Builder, Env};
use log::LevelFilter;

/// Initializes the global logger. `RUST_LOG` wins over `default_level`.
pub fn init(default_level: LevelFilter) {
    let env = Env::default().default_filter_or(default_level.as_str());

    let result = Builder::from_env(env)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}: {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init();

    match result {
        Ok(()) => log::info!("Logging initialized"),
        Err(e) => eprintln!("Logger already initialized: {}", e),
    }
}
