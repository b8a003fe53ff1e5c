//! Foreground-window observations turned into program sessions.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use serde::Deserialize;
use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::clock::{parse_aware, UserLocalTime};
use crate::models::ProgramSession;
use crate::settings::SettingsStore;

/// A foreground-window change as reported by the OS facade.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WindowChange {
    pub window_title: String,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub exe_path: Option<String>,
    #[serde(default)]
    pub process_name: Option<String>,
    /// ISO-8601 with offset.
    pub start_time: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInfo {
    pub exe_path: String,
    pub process_name: String,
}

pub trait ProcessResolver: Send {
    fn resolve(&mut self, pid: u32) -> Option<ProcessInfo>;
}

/// Looks processes up in the OS process table, one PID per refresh.
pub struct SysinfoResolver {
    system: System,
}

impl SysinfoResolver {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SysinfoResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessResolver for SysinfoResolver {
    fn resolve(&mut self, pid: u32) -> Option<ProcessInfo> {
        let pid = Pid::from_u32(pid);
        self.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
        let process = self.system.process(pid)?;
        Some(ProcessInfo {
            exe_path: process
                .exe()
                .map(|path| path.to_string_lossy().into_owned())
                .unwrap_or_default(),
            process_name: process.name().to_string_lossy().into_owned(),
        })
    }
}

/// Splits "detail - detail - Program" titles into the program part and the
/// rest. Titles without a separator are all program.
pub fn split_title(title: &str) -> (String, String) {
    let title = title.trim();
    for separator in [" - ", " \u{2014} ", " | "] {
        if let Some((detail, name)) = title.rsplit_once(separator) {
            if !name.trim().is_empty() {
                return (name.trim().to_string(), detail.trim().to_string());
            }
        }
    }
    (title.to_string(), String::new())
}

pub struct ProgramSessionFactory {
    local: UserLocalTime,
    settings: Arc<SettingsStore>,
    resolver: Mutex<Box<dyn ProcessResolver>>,
}

impl ProgramSessionFactory {
    pub fn new(
        local: UserLocalTime,
        settings: Arc<SettingsStore>,
        resolver: Box<dyn ProcessResolver>,
    ) -> Self {
        Self {
            local,
            settings,
            resolver: Mutex::new(resolver),
        }
    }

    /// Explicit process fields win over PID resolution; a naive start time
    /// is rejected.
    pub fn to_session(&self, change: &WindowChange) -> Result<ProgramSession> {
        let start = parse_aware(&change.start_time)?;
        let resolved = match (change.pid, &change.exe_path, &change.process_name) {
            (Some(pid), None, _) | (Some(pid), _, None) => self
                .resolver
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .resolve(pid),
            _ => None,
        };

        let (window_title, detail) = split_title(&change.window_title);
        let process_name = change
            .process_name
            .clone()
            .or_else(|| resolved.as_ref().map(|p| p.process_name.clone()))
            .unwrap_or_else(|| window_title.clone());
        let exe_path = change
            .exe_path
            .clone()
            .or_else(|| resolved.map(|p| p.exe_path))
            .unwrap_or_default();
        let productive = self
            .settings
            .classification()
            .is_productive_program(&process_name);

        Ok(ProgramSession {
            exe_path,
            process_name,
            window_title,
            detail,
            start_time: self.local.localize(start),
            productive,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{is_kind, TrackerError};

    struct FixedResolver;

    impl ProcessResolver for FixedResolver {
        fn resolve(&mut self, pid: u32) -> Option<ProcessInfo> {
            (pid == 42).then(|| ProcessInfo {
                exe_path: "/usr/share/code/code".into(),
                process_name: "code".into(),
            })
        }
    }

    fn factory() -> ProgramSessionFactory {
        ProgramSessionFactory::new(
            UserLocalTime::from_name("Europe/Berlin").unwrap(),
            Arc::new(SettingsStore::new(None).unwrap()),
            Box::new(FixedResolver),
        )
    }

    #[test]
    fn title_splits_into_program_and_detail() {
        assert_eq!(
            split_title("main.rs - crate - Visual Studio Code"),
            ("Visual Studio Code".to_string(), "main.rs - crate".to_string())
        );
        assert_eq!(split_title("Slack"), ("Slack".to_string(), String::new()));
    }

    #[test]
    fn pid_fills_in_missing_process_fields() {
        let change = WindowChange {
            window_title: "lib.rs - Visual Studio Code".into(),
            pid: Some(42),
            exe_path: None,
            process_name: None,
            start_time: "2025-03-01T09:00:00Z".into(),
        };

        let session = factory().to_session(&change).unwrap();

        assert_eq!(session.process_name, "code");
        assert_eq!(session.exe_path, "/usr/share/code/code");
        assert_eq!(session.window_title, "Visual Studio Code");
        assert_eq!(session.detail, "lib.rs");
        assert!(session.productive);
        assert_eq!(session.start_time.to_rfc3339(), "2025-03-01T10:00:00+01:00");
    }

    #[test]
    fn naive_start_time_is_rejected() {
        let change = WindowChange {
            window_title: "Slack".into(),
            pid: None,
            exe_path: Some("/usr/bin/slack".into()),
            process_name: Some("slack".into()),
            start_time: "2025-03-01T09:00:00".into(),
        };

        let err = factory().to_session(&change).unwrap_err();
        assert!(is_kind(&err, |e| matches!(e, TrackerError::TimezoneUnaware(_))));
    }
}
