use std::{env, path::PathBuf, time::Duration};

use anyhow::{anyhow, Context, Result};

use crate::clock::UserLocalTime;
use crate::db::BatchConfig;
use crate::peripherals::PeripheralTimeouts;

const DB_FILE_NAME: &str = "activity-tracker.sqlite3";

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub local: UserLocalTime,
    pub db_path: PathBuf,
    pub settings_path: Option<PathBuf>,
    pub debug: bool,
    pub tick_interval: Duration,
    pub peripheral_timeouts: PeripheralTimeouts,
    pub tab_debounce: Duration,
    pub batch: BatchConfig,
    pub timeline_merge_threshold: Duration,
}

impl TrackerConfig {
    pub fn new(local: UserLocalTime, db_path: PathBuf) -> Self {
        Self {
            local,
            db_path,
            settings_path: None,
            debug: false,
            tick_interval: Duration::from_secs(1),
            peripheral_timeouts: PeripheralTimeouts::default(),
            tab_debounce: Duration::from_millis(150),
            batch: BatchConfig::default(),
            timeline_merge_threshold: Duration::from_millis(1000),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let zone = lookup("LOCAL_TIME_ZONE")
            .ok_or_else(|| anyhow!("LOCAL_TIME_ZONE must name an IANA time zone"))?;
        let local = UserLocalTime::from_name(zone.trim())?;

        let db_path = match lookup("ACTIVITY_TRACKER_DB") {
            Some(path) => PathBuf::from(path),
            None => dirs::data_dir()
                .map(|dir| dir.join("activity-tracker").join(DB_FILE_NAME))
                .context("no data directory; set ACTIVITY_TRACKER_DB")?,
        };

        let mut config = Self::new(local, db_path);
        config.settings_path = lookup("ACTIVITY_TRACKER_SETTINGS").map(PathBuf::from);
        config.debug = lookup("ACTIVITY_TRACKER_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn reads_zone_paths_and_debug_flag() {
        let config = TrackerConfig::from_lookup(lookup(&[
            ("LOCAL_TIME_ZONE", "America/Chicago"),
            ("ACTIVITY_TRACKER_DB", "/tmp/tracker.db"),
            ("ACTIVITY_TRACKER_DEBUG", "TRUE"),
        ]))
        .unwrap();

        assert_eq!(config.local.zone(), chrono_tz::America::Chicago);
        assert_eq!(config.db_path, PathBuf::from("/tmp/tracker.db"));
        assert!(config.debug);
        assert!(config.settings_path.is_none());
        assert_eq!(config.batch.max_batch_size, 30);
        assert_eq!(config.tab_debounce, Duration::from_millis(150));
    }

    #[test]
    fn missing_or_unknown_zone_fails() {
        assert!(TrackerConfig::from_lookup(lookup(&[])).is_err());
        assert!(TrackerConfig::from_lookup(lookup(&[("LOCAL_TIME_ZONE", "Nowhere/Land")])).is_err());
    }
}
