//! Read-only user settings. The daemon never writes this file; the settings
//! UI (or the user's editor) owns it, so it is re-read on every tick.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::sampling::SamplePermissions;

pub const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    pub user_id: String,
    pub is_blocking_on_focus_mode: bool,
    pub accessibility_permission: bool,
    pub screen_recording_permission: bool,
    pub blocked_apps: Vec<String>,
    pub blocked_domains: Vec<String>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            user_id: "local".into(),
            is_blocking_on_focus_mode: false,
            // Permissions are assumed granted until the OS proves otherwise.
            accessibility_permission: true,
            screen_recording_permission: true,
            blocked_apps: vec![],
            blocked_domains: vec![],
        }
    }
}

impl UserSettings {
    pub fn permissions(&self) -> SamplePermissions {
        SamplePermissions {
            accessibility: self.accessibility_permission,
            screen_recording: self.screen_recording_permission,
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(application_dir: &Path) -> Self {
        Self {
            path: application_dir.join(SETTINGS_FILE),
        }
    }

    /// Current settings. A missing file yields the defaults, a malformed one
    /// is an error the caller surfaces.
    pub async fn current(&self) -> Result<UserSettings> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(UserSettings::default()),
            Err(e) => Err(e.into()),
        }
    }
}
