use std::{fs, path::Path};

use serde::Deserialize;
use tracing::warn;
use url::Url;

pub const SETTINGS_FILE: &str = "ticket_watch.toml";
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5000/api";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub backend_url: String,
    /// Capacity of the session event channel.
    pub event_buffer: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.into(),
            event_buffer: 256,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    backend_url: Option<String>,
    event_buffer: Option<usize>,
}

pub fn load_settings() -> ClientSettings {
    let settings = load_settings_from(Path::new(SETTINGS_FILE));
    apply_env_overrides(settings, |key| std::env::var(key).ok())
}

pub fn load_settings_from(path: &Path) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => {
                if let Some(v) = file_cfg.backend_url {
                    settings.backend_url = normalize_backend_url(&v);
                }
                if let Some(v) = file_cfg.event_buffer {
                    settings.event_buffer = v.max(1);
                }
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "ignoring unreadable settings file");
            }
        }
    }

    settings
}

pub fn apply_env_overrides(
    mut settings: ClientSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> ClientSettings {
    if let Some(v) = lookup("TICKET_WATCH_BACKEND_URL") {
        settings.backend_url = normalize_backend_url(&v);
    }
    if let Some(v) = lookup("APP__BACKEND_URL") {
        settings.backend_url = normalize_backend_url(&v);
    }

    if let Some(v) = lookup("APP__EVENT_BUFFER") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.event_buffer = parsed.max(1);
        }
    }

    settings
}

pub fn normalize_backend_url(raw: &str) -> String {
    let raw = raw.trim().trim_end_matches('/');
    if raw.is_empty() {
        return DEFAULT_BACKEND_URL.to_string();
    }

    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };

    match Url::parse(&candidate) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => candidate,
        _ => {
            warn!(url = raw, "invalid backend url; falling back to default");
            DEFAULT_BACKEND_URL.to_string()
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
