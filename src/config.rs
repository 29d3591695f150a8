use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_API_URL: &str = "https://playground.4geeks.com/contact";
pub const DEFAULT_AGENDA_SLUG: &str = "default-agenda";
pub const DEFAULT_IMAGE_HOST: &str = "https://api.cloudinary.com";

const DRAFT_FILE: &str = "contactFormDraft.json";

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_agenda_slug() -> String {
    DEFAULT_AGENDA_SLUG.to_string()
}

fn default_image_host() -> String {
    DEFAULT_IMAGE_HOST.to_string()
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("agenda")
}

/// Credentials and endpoint for the image host.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct PhotoConfig {
    pub host: String,
    pub cloud_name: String,
    pub upload_preset: String,
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            host: default_image_host(),
            cloud_name: String::new(),
            upload_preset: String::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct AgendaConfig {
    pub api_url: String,
    pub agenda_slug: String,
    pub photos: PhotoConfig,
    pub data_directory: PathBuf,
    pub debug_logging: bool,
}

impl Default for AgendaConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            agenda_slug: default_agenda_slug(),
            photos: PhotoConfig::default(),
            data_directory: default_data_dir(),
            debug_logging: false,
        }
    }
}

impl AgendaConfig {
    /// Location of the optional JSON config file.
    pub fn file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("agenda").join("config.json"))
    }

    /// Defaults, then the config file, then `AGENDA_*` environment variables.
    pub fn load() -> Self {
        let mut config = Self::file_path()
            .and_then(|path| Self::read_file(&path))
            .unwrap_or_default();
        config.apply_env(|key| std::env::var(key).ok());
        config.normalize();
        config
    }

    fn read_file(path: &std::path::Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(cfg) => Some(cfg),
            Err(e) => {
                log::warn!("Ignoring malformed config {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Overlay values from an environment lookup. Empty values count as unset.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("AGENDA_API_URL") {
            self.api_url = v;
        }
        if let Some(v) = get("AGENDA_SLUG") {
            self.agenda_slug = v;
        }
        if let Some(v) = get("AGENDA_IMAGE_HOST") {
            self.photos.host = v;
        }
        if let Some(v) = get("AGENDA_CLOUDINARY_CLOUD_NAME") {
            self.photos.cloud_name = v;
        }
        if let Some(v) = get("AGENDA_CLOUDINARY_UPLOAD_PRESET") {
            self.photos.upload_preset = v;
        }
        if let Some(v) = get("AGENDA_DATA_DIR") {
            self.data_directory = PathBuf::from(v);
        }
        if let Some(v) = get("AGENDA_DEBUG") {
            self.debug_logging = matches!(v.as_str(), "1" | "true" | "yes");
        }
    }

    fn normalize(&mut self) {
        self.api_url = self.api_url.trim_end_matches('/').to_string();
        self.photos.host = self.photos.host.trim_end_matches('/').to_string();
        if self.api_url.is_empty() {
            self.api_url = default_api_url();
        }
        if self.agenda_slug.is_empty() {
            self.agenda_slug = default_agenda_slug();
        }
    }

    pub fn draft_path(&self) -> PathBuf {
        self.data_directory.join(DRAFT_FILE)
    }
}
