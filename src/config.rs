use std::env;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};

/// Config key under which the whole settings document is stored.
pub const APP_CONFIG_KEY: &str = "app_config";

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_DB_FILE: &str = "taskdesk.db";
const DEFAULT_IMAGES_DIR: &str = "images";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub db_file: String,
    pub images_dir: PathBuf,
}

impl AppConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            images_dir: data_dir.join(DEFAULT_IMAGES_DIR),
            db_file: DEFAULT_DB_FILE.to_string(),
            data_dir,
        }
    }

    /// Reads `TASKDESK_DATA_DIR`, `TASKDESK_DB_FILE` and `TASKDESK_IMAGES_DIR`;
    /// unset variables fall back to `./data`, `taskdesk.db` and `<data>/images`.
    pub fn new_from_env() -> Self {
        let mut config = Self::new(
            env::var("TASKDESK_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string()),
        );
        if let Ok(db_file) = env::var("TASKDESK_DB_FILE") {
            config.db_file = db_file;
        }
        if let Ok(images_dir) = env::var("TASKDESK_IMAGES_DIR") {
            config.images_dir = PathBuf::from(images_dir);
        }
        config
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

/// Settings document used when nothing has been saved yet.
pub fn default_app_config() -> Value {
    json!({
        "taskTypes": [
            { "name": "feature", "color": "#409eff" },
            { "name": "bug", "color": "#f56c6c" },
            { "name": "optimization", "color": "#67c23a" },
        ],
        "general": {}
    })
}
