use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fs, path::PathBuf, sync::RwLock};

/// Which programs and domains count as productive. Matching is
/// case-insensitive; domains also match their subdomains.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ClassificationSettings {
    pub productive_programs: BTreeSet<String>,
    pub productive_domains: BTreeSet<String>,
}

impl Default for ClassificationSettings {
    fn default() -> Self {
        Self {
            productive_programs: ["code", "nvim", "terminal", "alacritty", "intellij idea"]
                .into_iter()
                .map(String::from)
                .collect(),
            productive_domains: ["github.com", "docs.rs", "stackoverflow.com"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl ClassificationSettings {
    pub fn is_productive_program(&self, process_name: &str) -> bool {
        let name = process_name.to_lowercase();
        let stem = name.strip_suffix(".exe").unwrap_or(&name);
        self.productive_programs
            .iter()
            .any(|p| p.to_lowercase() == stem)
    }

    pub fn is_productive_domain(&self, domain: &str) -> bool {
        let domain = domain.to_lowercase();
        self.productive_domains.iter().any(|d| {
            let d = d.to_lowercase();
            domain == d || domain.ends_with(&format!(".{d}"))
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct UserSettings {
    classification: ClassificationSettings,
}

pub struct SettingsStore {
    path: Option<PathBuf>,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    /// Loads settings from `path`. A missing or unreadable file yields defaults.
    pub fn new(path: Option<PathBuf>) -> Result<Self> {
        let data = match &path {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read settings from {}", path.display()))?;
                serde_json::from_str(&contents).unwrap_or_default()
            }
            _ => UserSettings::default(),
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn classification(&self) -> ClassificationSettings {
        self.data
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .classification
            .clone()
    }

    pub fn update_classification(&self, settings: ClassificationSettings) -> Result<()> {
        let mut guard = self.data.write().unwrap_or_else(|p| p.into_inner());
        guard.classification = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    pub fn reload(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let contents = fs::read_to_string(path)?;
        let data: UserSettings = serde_json::from_str(&contents)?;
        *self.data.write().unwrap_or_else(|p| p.into_inner()) = data;
        Ok(())
    }
}
