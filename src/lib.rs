pub mod aggregator;
pub mod arbiter;
pub mod browser;
pub mod clock;
pub mod config;
pub mod context;
pub mod daemon;
pub mod db;
pub mod error;
pub mod integrity;
pub mod keepalive;
pub mod models;
pub mod peripherals;
pub mod programs;
pub mod recorder;
pub mod settings;
mod utils;

use std::{sync::Arc, time::Duration};

use clock::SystemClock;
use config::TrackerConfig;

const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// Process entry point. Returns the exit code: 0 after a clean shutdown,
/// 1 when initialization fails.
pub fn run() -> i32 {
    let config = match TrackerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("activity-tracker: invalid configuration: {err:?}");
            return 1;
        }
    };

    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(if config.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    log::info!("activity tracker starting up...");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("activity-tracker")
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("failed to build async runtime: {err}");
            return 1;
        }
    };

    let outcome = runtime.block_on(daemon::run(config, Arc::new(SystemClock)));
    // Stdin reads park a blocking thread that never returns on its own.
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);

    match outcome {
        Ok(()) => 0,
        Err(err) => {
            log::error!("{err:?}");
            1
        }
    }
}
