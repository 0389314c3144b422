//! Per-user console preferences
//!
//! Remembers how the backup table was last sorted and the default value of
//! the auto-start toggle in the restore dialog.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::PathBuf;
use xo_console_common::{BackupColumn, SortOrder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ConsolePreferences {
    #[serde(default)]
    pub sort_column: BackupColumn,

    #[serde(default)]
    pub sort_order: SortOrder,

    /// Start restored VMs by default
    #[serde(default)]
    pub auto_start: bool,
}

pub struct UserPreferencesManager {
    preferences_file: PathBuf,
}

impl UserPreferencesManager {
    /// Create a manager for `~/.local/share/xo-console/preferences.json`
    pub fn new() -> Result<Self> {
        let preferences_file = if let Some(data_dir) = dirs::data_dir() {
            let console_dir = data_dir.join("xo-console");

            fs::create_dir_all(&console_dir)
                .context("Failed to create user preferences directory")?;

            console_dir.join("preferences.json")
        } else {
            std::env::temp_dir().join("xo-console-preferences.json")
        };

        Ok(Self { preferences_file })
    }

    pub fn with_path(preferences_file: PathBuf) -> Self {
        Self { preferences_file }
    }

    /// Load preferences, defaulting when the file does not exist
    pub fn load(&self) -> Result<ConsolePreferences> {
        if !self.preferences_file.exists() {
            return Ok(ConsolePreferences::default());
        }

        let mut file = self.locked_file(false)?;
        let mut content = String::new();
        file.read_to_string(&mut content)
            .context("Failed to read user preferences")?;
        fs2::FileExt::unlock(&file).ok();

        if content.trim().is_empty() {
            return Ok(ConsolePreferences::default());
        }

        serde_json::from_str(&content).context("Failed to parse user preferences")
    }

    pub fn save(&self, preferences: &ConsolePreferences) -> Result<()> {
        let content = serde_json::to_string_pretty(preferences)
            .context("Failed to serialize user preferences")?;

        let _lock = self.locked_file(true)?;
        let tmp_path = self.preferences_file.with_extension("tmp");

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)
                .with_context(|| {
                    format!(
                        "Failed to open temporary preferences file {}",
                        tmp_path.display()
                    )
                })?;
            file.write_all(content.as_bytes())
                .context("Failed to write user preferences")?;
            file.sync_all().context("Failed to sync user preferences")?;
        }

        fs::rename(&tmp_path, &self.preferences_file)
            .with_context(|| format!("Failed to replace {}", self.preferences_file.display()))?;

        Ok(())
    }

    /// Persist the backup table sort
    pub fn set_sort(&self, column: BackupColumn, order: SortOrder) -> Result<()> {
        let mut prefs = self.load()?;
        prefs.sort_column = column;
        prefs.sort_order = order;
        self.save(&prefs)
    }

    pub fn set_auto_start(&self, auto_start: bool) -> Result<()> {
        let mut prefs = self.load()?;
        prefs.auto_start = auto_start;
        self.save(&prefs)
    }

    fn locked_file(&self, write: bool) -> Result<std::fs::File> {
        let file = OpenOptions::new()
            .read(true)
            .write(write)
            .create(write)
            .truncate(false)
            .open(&self.preferences_file)
            .with_context(|| format!("Failed to open {}", self.preferences_file.display()))?;

        if write {
            fs2::FileExt::lock_exclusive(&file)
                .context("Failed to lock preferences for writing")?;
        } else {
            fs2::FileExt::lock_shared(&file).context("Failed to lock preferences for reading")?;
        }

        Ok(file)
    }
}
